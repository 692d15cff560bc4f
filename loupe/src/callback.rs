//! Event types emitted by an exploration session.

use std::sync::Arc;

/// Handle returned when registering a callback, used for deregistration.
pub type CallbackId = u64;

/// Callback invoked on every explorer event.
pub type ExplorerCallback<I> = Arc<dyn Fn(&ExplorerEvent<I>) + Send + Sync>;

/// Events emitted by [`Explorer`](crate::Explorer) as the session advances.
#[derive(Debug, Clone, PartialEq)]
pub enum ExplorerEvent<I> {
    /// A reduction finished and the projection was redrawn.
    EmbeddingReplaced {
        /// Name of the reduction method that produced the embedding.
        method: &'static str,
        /// Number of embedded items.
        n_items: usize,
    },
    /// An item was picked, by index or through the projection canvas.
    PointPicked {
        /// Index into the item collection.
        index: usize,
        /// Identifier of the picked item.
        identifier: I,
        /// Catalog value the label input was prefilled with.
        target: f64,
    },
    /// The label input value changed through an edit.
    LabelEdited { value: f64 },
    /// A label was committed to the store.
    LabelRecorded {
        /// Identifier the label was recorded under.
        identifier: I,
        /// Recorded value.
        value: f64,
    },
}
