//! Exploration session over a fixed item collection.
//!
//! An [`Explorer`] owns N items (identifier, feature vector, target value,
//! optional target uncertainty), the linked projection and detail views, a
//! label input control and the label store. A session runs reductions to
//! replace the 2-D embedding, picks items from the projection, edits the
//! label value and confirms it into the store. Every state change is
//! announced to registered callbacks so an embedding host can mirror the
//! session without polling.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::path::Path;
use std::sync::{Arc, Mutex};

use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView2};

use reduce::{Reducer, Reduction};

use crate::callback::{CallbackId, ExplorerCallback, ExplorerEvent};
use crate::error::ExplorerError;
use crate::label_input::LabelInput;
use crate::view::{
    DetailConfig, DetailRenderer, DetailScene, DetailView, ProjectionConfig, ProjectionFrame,
    ProjectionView,
};

/// Construction-time knobs beyond the item collection itself.
pub struct ExplorerOptions<I> {
    pub projection: ProjectionConfig,
    pub detail: DetailConfig,
    /// Replaces the default spectrum renderer of the detail view.
    pub detail_renderer: Option<DetailRenderer<I>>,
    /// Replaces the default label input control, observers and all.
    pub label_input: Option<LabelInput>,
    /// Starting value when no label input is supplied.
    pub initial_label: f64,
}

impl<I> Default for ExplorerOptions<I> {
    fn default() -> Self {
        Self {
            projection: ProjectionConfig::default(),
            detail: DetailConfig::default(),
            detail_renderer: None,
            label_input: None,
            initial_label: 0.0,
        }
    }
}

/// Embedding produced by the most recent reduction run.
struct Embedding {
    method: &'static str,
    coords: Array2<f64>,
}

/// Interactive embedding explorer with linked views and a label store.
pub struct Explorer<I> {
    ids: Vec<I>,
    features: Array2<f64>,
    targets: Array1<f64>,
    uncertainties: Option<Array1<f64>>,
    embedding: Option<Embedding>,
    selection: Option<usize>,
    labels: HashMap<I, f64>,
    label_input: LabelInput,
    projection: ProjectionView,
    detail: DetailView<I>,
    callbacks: Arc<Mutex<HashMap<CallbackId, ExplorerCallback<I>>>>,
    next_callback_id: Arc<Mutex<CallbackId>>,
}

impl<I: Clone + Eq + Hash + fmt::Display + 'static> Explorer<I> {
    /// Builds a session over the given collection with default views.
    ///
    /// All per-item arrays must agree on length. On a mismatch this fails
    /// with [`ExplorerError::ShapeMismatch`] before any view is touched.
    pub fn new(
        ids: Vec<I>,
        features: Array2<f64>,
        targets: Array1<f64>,
        uncertainties: Option<Array1<f64>>,
    ) -> Result<Self, ExplorerError> {
        Self::with_options(ids, features, targets, uncertainties, ExplorerOptions::default())
    }

    pub fn with_options(
        ids: Vec<I>,
        features: Array2<f64>,
        targets: Array1<f64>,
        uncertainties: Option<Array1<f64>>,
        options: ExplorerOptions<I>,
    ) -> Result<Self, ExplorerError> {
        let n = ids.len();
        if features.nrows() != n {
            return Err(ExplorerError::ShapeMismatch {
                field: "features",
                expected: n,
                actual: features.nrows(),
            });
        }
        if targets.len() != n {
            return Err(ExplorerError::ShapeMismatch {
                field: "targets",
                expected: n,
                actual: targets.len(),
            });
        }
        if let Some(u) = &uncertainties {
            if u.len() != n {
                return Err(ExplorerError::ShapeMismatch {
                    field: "uncertainties",
                    expected: n,
                    actual: u.len(),
                });
            }
        }

        let detail = match options.detail_renderer {
            Some(renderer) => DetailView::with_renderer(options.detail, renderer),
            None => DetailView::new(options.detail),
        };
        let label_input = options
            .label_input
            .unwrap_or_else(|| LabelInput::new(options.initial_label));

        Ok(Self {
            ids,
            features,
            targets,
            uncertainties,
            embedding: None,
            selection: None,
            labels: HashMap::new(),
            label_input,
            projection: ProjectionView::new(options.projection),
            detail,
            callbacks: Arc::new(Mutex::new(HashMap::new())),
            next_callback_id: Arc::new(Mutex::new(0)),
        })
    }

    /// Number of items in the collection.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[I] {
        &self.ids
    }

    /// Runs a reduction and redraws the projection from its result.
    ///
    /// Parameters are validated against the collection size first and the
    /// new embedding replaces the old one only once it has been drawn, so
    /// any failure leaves the previous embedding and plot untouched.
    pub fn run_reduction(&mut self, reduction: &Reduction) -> Result<(), ExplorerError> {
        let n = self.ids.len();
        reduction.validate(n)?;
        info!("running {} over {} items", reduction.name(), n);

        let coords = reduction.reduce(self.features.view())?;
        let frame = self.projection_frame(reduction.name(), &coords);
        self.projection.replace(frame)?;
        self.embedding = Some(Embedding {
            method: reduction.name(),
            coords,
        });

        self.emit(&ExplorerEvent::EmbeddingReplaced {
            method: reduction.name(),
            n_items: n,
        });
        Ok(())
    }

    /// Picks an item: selects it, prefills the label input with its target
    /// and redraws the detail view. Picking the same item again repeats the
    /// same steps.
    pub fn pick(&mut self, index: usize) -> Result<(), ExplorerError> {
        let n = self.ids.len();
        if index >= n {
            return Err(ExplorerError::OutOfRange { index, len: n });
        }

        self.selection = Some(index);
        let target = self.targets[index];
        self.label_input.set(target);
        self.redraw_detail()?;

        debug!("picked item {} ({})", index, self.ids[index]);
        self.emit(&ExplorerEvent::PointPicked {
            index,
            identifier: self.ids[index].clone(),
            target,
        });
        Ok(())
    }

    /// Resolves a click on the projection canvas to the nearest rendered
    /// point and picks it. Returns the picked index, or `None` when no
    /// embedding has been drawn yet.
    pub fn pick_at(&mut self, px: i32, py: i32) -> Result<Option<usize>, ExplorerError> {
        match self.projection.nearest_point(px, py) {
            Some(index) => {
                self.pick(index)?;
                Ok(Some(index))
            }
            None => Ok(None),
        }
    }

    /// Sets the label input to `value`. With an item picked, the detail
    /// view is redrawn so its line markers follow the new value.
    pub fn edit_label(&mut self, value: f64) -> Result<(), ExplorerError> {
        self.label_input.set(value);
        if self.selection.is_some() {
            self.redraw_detail()?;
        }
        self.emit(&ExplorerEvent::LabelEdited { value });
        Ok(())
    }

    /// Records the current label input value for the picked item,
    /// overwriting any earlier label for the same identifier. Without a
    /// picked item this does nothing.
    pub fn confirm_label(&mut self) {
        let Some(index) = self.selection else {
            debug!("confirm ignored, nothing picked");
            return;
        };

        let identifier = self.ids[index].clone();
        let value = self.label_input.value();
        info!("recorded label {:.4} for {}", value, identifier);
        self.labels.insert(identifier.clone(), value);
        self.emit(&ExplorerEvent::LabelRecorded { identifier, value });
    }

    /// Index of the picked item, if any.
    pub fn selection(&self) -> Option<usize> {
        self.selection
    }

    /// Labels recorded so far, keyed by identifier.
    pub fn labels(&self) -> &HashMap<I, f64> {
        &self.labels
    }

    /// The label input control, for observing value changes.
    pub fn label_input(&self) -> &LabelInput {
        &self.label_input
    }

    /// Coordinates of the current embedding, if a reduction has run.
    pub fn embedding(&self) -> Option<ArrayView2<'_, f64>> {
        self.embedding.as_ref().map(|e| e.coords.view())
    }

    /// Name of the method that produced the current embedding.
    pub fn embedding_method(&self) -> Option<&'static str> {
        self.embedding.as_ref().map(|e| e.method)
    }

    pub fn projection(&self) -> &ProjectionView {
        &self.projection
    }

    pub fn detail(&self) -> &DetailView<I> {
        &self.detail
    }

    /// Writes the projection canvas to a PNG file.
    pub fn save_projection(&self, path: &Path) -> Result<(), ExplorerError> {
        self.projection.save(path)
    }

    /// Writes the detail canvas to a PNG file.
    pub fn save_detail(&self, path: &Path) -> Result<(), ExplorerError> {
        self.detail.save(path)
    }

    /// Register a callback invoked on every explorer event.
    ///
    /// Returns an ID that can be used to deregister the callback later.
    pub fn register_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&ExplorerEvent<I>) + Send + Sync + 'static,
    {
        let mut callbacks = self.callbacks.lock().unwrap();
        let mut next_id = self.next_callback_id.lock().unwrap();
        let id = *next_id;
        *next_id += 1;
        callbacks.insert(id, Arc::new(callback));
        id
    }

    /// Deregister a callback by ID. Returns true if it was registered.
    pub fn deregister_callback(&self, id: CallbackId) -> bool {
        self.callbacks.lock().unwrap().remove(&id).is_some()
    }

    /// Number of registered callbacks.
    pub fn callback_count(&self) -> usize {
        self.callbacks.lock().unwrap().len()
    }

    fn emit(&self, event: &ExplorerEvent<I>) {
        let callbacks = self.callbacks.lock().unwrap();
        for callback in callbacks.values() {
            callback(event);
        }
    }

    fn redraw_detail(&mut self) -> Result<(), ExplorerError> {
        let Some(index) = self.selection else {
            return Ok(());
        };
        let scene = DetailScene {
            identifier: self.ids[index].clone(),
            features: self.features.row(index).to_owned(),
            target: self.targets[index],
            label: self.label_input.value(),
            uncertainty: self.uncertainties.as_ref().map(|u| u[index]),
        };
        self.detail.redraw(scene)
    }

    fn projection_frame(&self, method: &'static str, coords: &Array2<f64>) -> ProjectionFrame {
        let points = coords.rows().into_iter().map(|r| (r[0], r[1])).collect();
        let (coloring, color_label) = match &self.uncertainties {
            Some(u) => (u.to_vec(), "uncertainty"),
            None => (self.targets.to_vec(), "target"),
        };
        ProjectionFrame {
            method,
            points,
            coloring,
            color_label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_items() -> (Vec<&'static str>, Array2<f64>, Array1<f64>) {
        let features =
            Array2::from_shape_vec((3, 3), vec![0.0, 0.1, 0.2, 1.0, 1.1, 1.2, 2.0, 2.1, 2.2])
                .unwrap();
        (vec!["A", "B", "C"], features, Array1::from(vec![0.1, 0.2, 0.3]))
    }

    #[test]
    fn test_mismatched_targets_fail_construction() {
        let (ids, features, _) = three_items();
        let result = Explorer::new(ids, features, Array1::from(vec![0.1, 0.2]), None);
        assert!(matches!(
            result,
            Err(ExplorerError::ShapeMismatch {
                field: "targets",
                expected: 3,
                actual: 2,
            })
        ));
    }

    #[test]
    fn test_mismatched_feature_rows_fail_construction() {
        let (ids, features, targets) = three_items();
        let short = features.slice(ndarray::s![..2, ..]).to_owned();
        let result = Explorer::new(ids, short, targets, None);
        assert!(matches!(
            result,
            Err(ExplorerError::ShapeMismatch {
                field: "features",
                expected: 3,
                actual: 2,
            })
        ));
    }

    #[test]
    fn test_mismatched_uncertainties_fail_construction() {
        let (ids, features, targets) = three_items();
        let result = Explorer::new(ids, features, targets, Some(Array1::from(vec![0.01])));
        assert!(matches!(
            result,
            Err(ExplorerError::ShapeMismatch {
                field: "uncertainties",
                ..
            })
        ));
    }

    #[test]
    fn test_pick_out_of_range_is_rejected() {
        let (ids, features, targets) = three_items();
        let mut explorer = Explorer::new(ids, features, targets, None).unwrap();
        assert!(matches!(
            explorer.pick(3),
            Err(ExplorerError::OutOfRange { index: 3, len: 3 })
        ));
        assert_eq!(explorer.selection(), None);
    }

    #[test]
    fn test_confirm_without_pick_records_nothing() {
        let (ids, features, targets) = three_items();
        let mut explorer = Explorer::new(ids, features, targets, None).unwrap();
        explorer.confirm_label();
        assert!(explorer.labels().is_empty());
    }

    #[test]
    fn test_pick_at_without_embedding_is_none() {
        let (ids, features, targets) = three_items();
        let mut explorer = Explorer::new(ids, features, targets, None).unwrap();
        assert_eq!(explorer.pick_at(100, 100).unwrap(), None);
    }

    #[test]
    fn test_supplied_label_input_is_used() {
        let (ids, features, targets) = three_items();
        let explorer = Explorer::with_options(
            ids,
            features,
            targets,
            None,
            ExplorerOptions {
                label_input: Some(LabelInput::new(1.5)),
                ..ExplorerOptions::default()
            },
        )
        .unwrap();
        assert_eq!(explorer.label_input().value(), 1.5);
    }
}
