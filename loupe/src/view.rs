//! Linked plot views of an exploration session.
//!
//! [`ProjectionView`] draws the 2-D embedding as a colored scatter and keeps
//! the backend pixel position of every point so a click on the canvas can be
//! resolved back to an item index. [`DetailView`] draws the spectrum of the
//! picked item with the prominent emission lines shifted to the current
//! label value.
//!
//! Both views render into an owned RGB buffer, so a session needs no
//! filesystem access until [`ProjectionView::save`] or [`DetailView::save`]
//! is called. Every redraw replaces the whole canvas.

use std::fmt;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::series::DashedLineSeries;

use ndarray::Array1;
use spectra::{LogLamGrid, LINES};

use crate::error::{render_err, ExplorerError};

/// Fraction of the data span added on each side of an axis.
const AXIS_PAD: f64 = 0.05;

fn buffer_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

/// Maps a normalized value to a cold-to-warm color.
fn ramp(t: f64) -> HSLColor {
    HSLColor(2.0 / 3.0 * (1.0 - t), 0.85, 0.45)
}

/// Normalizes coloring values to [0, 1]. A constant column maps to 0.5.
fn color_scale(values: &[f64]) -> Vec<f64> {
    let lo = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let span = hi - lo;
    if !(span > 0.0) {
        return vec![0.5; values.len()];
    }
    values.iter().map(|v| (v - lo) / span).collect()
}

/// Data bounds padded by [`AXIS_PAD`], widened when degenerate so the
/// coordinate mapping never sees a zero-width range.
fn padded_range(lo: f64, hi: f64) -> Range<f64> {
    if !lo.is_finite() || !hi.is_finite() {
        return -1.0..1.0;
    }
    let pad = ((hi - lo) * AXIS_PAD).max(1e-6);
    (lo - pad)..(hi + pad)
}

// ---------------------------------------------------------------------------
// Projection view
// ---------------------------------------------------------------------------

/// Canvas geometry for the projection scatter.
#[derive(Debug, Clone)]
pub struct ProjectionConfig {
    pub width: u32,
    pub height: u32,
    /// Marker radius in pixels.
    pub point_radius: i32,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            width: 900,
            height: 600,
            point_radius: 3,
        }
    }
}

/// One rendered embedding: coordinates plus the per-item coloring column.
#[derive(Debug, Clone)]
pub struct ProjectionFrame {
    /// Name of the reduction method that produced the coordinates.
    pub method: &'static str,
    pub points: Vec<(f64, f64)>,
    /// One value per point, mapped onto the color ramp.
    pub coloring: Vec<f64>,
    /// What the coloring column holds, for the caption.
    pub color_label: &'static str,
}

/// Pickable scatter plot of the current embedding.
pub struct ProjectionView {
    config: ProjectionConfig,
    frame: Option<ProjectionFrame>,
    buffer: Vec<u8>,
    positions: Vec<(i32, i32)>,
}

impl ProjectionView {
    pub fn new(config: ProjectionConfig) -> Self {
        let buffer = vec![255; buffer_len(config.width, config.height)];
        Self {
            config,
            frame: None,
            buffer,
            positions: Vec::new(),
        }
    }

    /// Replaces the canvas with a fresh drawing of `frame`.
    ///
    /// Draws into a new buffer first and commits only on success, so a
    /// failed redraw leaves the previous plot and pick positions intact.
    pub fn replace(&mut self, frame: ProjectionFrame) -> Result<(), ExplorerError> {
        let mut buffer = vec![255; buffer_len(self.config.width, self.config.height)];
        let positions = {
            let root = BitMapBackend::with_buffer(
                &mut buffer,
                (self.config.width, self.config.height),
            )
            .into_drawing_area();
            let positions = draw_projection(&root, &frame, self.config.point_radius)?;
            root.present().map_err(render_err)?;
            positions
        };
        self.buffer = buffer;
        self.positions = positions;
        self.frame = Some(frame);
        Ok(())
    }

    /// Index of the rendered point closest to a canvas pixel, or `None`
    /// when nothing has been drawn yet.
    pub fn nearest_point(&self, px: i32, py: i32) -> Option<usize> {
        self.positions
            .iter()
            .enumerate()
            .min_by_key(|(_, &(x, y))| {
                let dx = i64::from(x - px);
                let dy = i64::from(y - py);
                dx * dx + dy * dy
            })
            .map(|(index, _)| index)
    }

    /// Writes the current plot to a PNG file.
    pub fn save(&self, path: &Path) -> Result<(), ExplorerError> {
        let frame = self
            .frame
            .as_ref()
            .ok_or_else(|| ExplorerError::Render("no embedding drawn yet".to_string()))?;
        let root = BitMapBackend::new(path, (self.config.width, self.config.height))
            .into_drawing_area();
        draw_projection(&root, frame, self.config.point_radius)?;
        root.present().map_err(render_err)?;
        println!("Projection saved to: {}", path.display());
        Ok(())
    }

    /// Last frame drawn, if any.
    pub fn frame(&self) -> Option<&ProjectionFrame> {
        self.frame.as_ref()
    }

    /// Backend pixel position of every rendered point, in item order.
    pub fn pixel_positions(&self) -> &[(i32, i32)] {
        &self.positions
    }

    /// Raw RGB canvas contents, row-major.
    pub fn rgb_buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }
}

impl Default for ProjectionView {
    fn default() -> Self {
        Self::new(ProjectionConfig::default())
    }
}

/// Draws the scatter and returns the backend coordinates of each point.
fn draw_projection(
    area: &DrawingArea<BitMapBackend, Shift>,
    frame: &ProjectionFrame,
    point_radius: i32,
) -> Result<Vec<(i32, i32)>, ExplorerError> {
    area.fill(&WHITE).map_err(render_err)?;

    let mut x_lo = f64::INFINITY;
    let mut x_hi = f64::NEG_INFINITY;
    let mut y_lo = f64::INFINITY;
    let mut y_hi = f64::NEG_INFINITY;
    for &(x, y) in &frame.points {
        x_lo = x_lo.min(x);
        x_hi = x_hi.max(x);
        y_lo = y_lo.min(y);
        y_hi = y_hi.max(y);
    }

    let caption = format!("{} embedding, colored by {}", frame.method, frame.color_label);
    let mut chart = ChartBuilder::on(area)
        .caption(caption, ("sans-serif", 25))
        .margin(5)
        .x_label_area_size(35)
        .y_label_area_size(45)
        .build_cartesian_2d(padded_range(x_lo, x_hi), padded_range(y_lo, y_hi))
        .map_err(render_err)?;

    chart
        .configure_mesh()
        .x_desc(format!("{} 1", frame.method))
        .y_desc(format!("{} 2", frame.method))
        .x_label_formatter(&|x| format!("{x:.1}"))
        .y_label_formatter(&|y| format!("{y:.1}"))
        .draw()
        .map_err(render_err)?;

    let shades = color_scale(&frame.coloring);
    chart
        .draw_series(
            frame
                .points
                .iter()
                .zip(shades)
                .map(|(&(x, y), t)| Circle::new((x, y), point_radius, ramp(t).filled())),
        )
        .map_err(render_err)?;

    Ok(frame
        .points
        .iter()
        .map(|&(x, y)| chart.backend_coord(&(x, y)))
        .collect())
}

// ---------------------------------------------------------------------------
// Detail view
// ---------------------------------------------------------------------------

/// Canvas geometry for the spectrum detail plot.
#[derive(Debug, Clone)]
pub struct DetailConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for DetailConfig {
    fn default() -> Self {
        Self {
            width: 900,
            height: 500,
        }
    }
}

/// Everything a detail renderer needs for one picked item.
#[derive(Debug, Clone)]
pub struct DetailScene<I> {
    pub identifier: I,
    /// Feature vector of the picked item, plotted as the spectrum.
    pub features: Array1<f64>,
    /// Catalog value the item came with.
    pub target: f64,
    /// Current value of the label input.
    pub label: f64,
    /// Target uncertainty, when the collection carries one.
    pub uncertainty: Option<f64>,
}

/// Pluggable drawing routine for the detail view.
pub type DetailRenderer<I> = Arc<
    dyn for<'a> Fn(&DrawingArea<BitMapBackend<'a>, Shift>, &DetailScene<I>) -> Result<(), ExplorerError>
        + Send
        + Sync,
>;

/// Spectrum plot of the currently picked item.
pub struct DetailView<I> {
    config: DetailConfig,
    renderer: DetailRenderer<I>,
    scene: Option<DetailScene<I>>,
    buffer: Vec<u8>,
}

impl<I: Clone + fmt::Display + 'static> DetailView<I> {
    pub fn new(config: DetailConfig) -> Self {
        Self::with_renderer(config, Arc::new(draw_spectrum))
    }

    /// Builds a view that draws with a caller-supplied renderer.
    pub fn with_renderer(config: DetailConfig, renderer: DetailRenderer<I>) -> Self {
        let buffer = vec![255; buffer_len(config.width, config.height)];
        Self {
            config,
            renderer,
            scene: None,
            buffer,
        }
    }

    pub fn set_renderer(&mut self, renderer: DetailRenderer<I>) {
        self.renderer = renderer;
    }

    /// Replaces the canvas with a fresh drawing of `scene`.
    pub fn redraw(&mut self, scene: DetailScene<I>) -> Result<(), ExplorerError> {
        let mut buffer = vec![255; buffer_len(self.config.width, self.config.height)];
        {
            let root = BitMapBackend::with_buffer(
                &mut buffer,
                (self.config.width, self.config.height),
            )
            .into_drawing_area();
            (self.renderer)(&root, &scene)?;
            root.present().map_err(render_err)?;
        }
        self.buffer = buffer;
        self.scene = Some(scene);
        Ok(())
    }

    /// Writes the current plot to a PNG file.
    pub fn save(&self, path: &Path) -> Result<(), ExplorerError> {
        let scene = self
            .scene
            .as_ref()
            .ok_or_else(|| ExplorerError::Render("nothing picked yet".to_string()))?;
        let root = BitMapBackend::new(path, (self.config.width, self.config.height))
            .into_drawing_area();
        (self.renderer)(&root, scene)?;
        root.present().map_err(render_err)?;
        println!("Spectrum detail saved to: {}", path.display());
        Ok(())
    }

    /// Scene of the last redraw, if any.
    pub fn scene(&self) -> Option<&DetailScene<I>> {
        self.scene.as_ref()
    }

    /// Raw RGB canvas contents, row-major.
    pub fn rgb_buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }
}

impl<I: Clone + fmt::Display + 'static> Default for DetailView<I> {
    fn default() -> Self {
        Self::new(DetailConfig::default())
    }
}

/// Default detail renderer: flux against observed wavelength with the
/// quasar emission lines shifted to the scene's label value.
///
/// Feature vectors on the standard grid get a wavelength axis in Angstrom,
/// dashed line markers and, when an uncertainty is present, a shaded band
/// per line covering the 95% interval of the shift. Vectors of any other
/// length are plotted against their bin index without line markers.
pub fn draw_spectrum<I: fmt::Display>(
    area: &DrawingArea<BitMapBackend, Shift>,
    scene: &DetailScene<I>,
) -> Result<(), ExplorerError> {
    area.fill(&WHITE).map_err(render_err)?;

    let grid = LogLamGrid::features();
    let on_wavelength_axis = scene.features.len() == grid.len();
    let x: Vec<f64> = if on_wavelength_axis {
        grid.wavelengths().to_vec()
    } else {
        (0..scene.features.len()).map(|i| i as f64).collect()
    };

    let mut f_lo = f64::INFINITY;
    let mut f_hi = f64::NEG_INFINITY;
    for &v in &scene.features {
        f_lo = f_lo.min(v);
        f_hi = f_hi.max(v);
    }
    let x_range = padded_range(
        x.first().copied().unwrap_or(0.0),
        x.last().copied().unwrap_or(0.0),
    );
    let y_range = padded_range(f_lo, f_hi);
    let (y_lo, y_hi) = (y_range.start, y_range.end);

    let caption = format!(
        "{} (catalog {:.4}, label {:.4})",
        scene.identifier, scene.target, scene.label
    );
    let mut chart = ChartBuilder::on(area)
        .caption(caption, ("sans-serif", 25))
        .margin(5)
        .x_label_area_size(35)
        .y_label_area_size(45)
        .build_cartesian_2d(x_range.clone(), y_range)
        .map_err(render_err)?;

    let x_desc = if on_wavelength_axis {
        "wavelength [Angstrom]"
    } else {
        "feature index"
    };
    chart
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc("normalized flux")
        .x_label_formatter(&|x| format!("{x:.0}"))
        .draw()
        .map_err(render_err)?;

    chart
        .draw_series(LineSeries::new(
            x.iter().cloned().zip(scene.features.iter().cloned()),
            &BLUE,
        ))
        .map_err(render_err)?;

    if !on_wavelength_axis {
        return Ok(());
    }

    let mut labeled = false;
    for line in LINES {
        let shifted = line.shifted(scene.label);
        if shifted < x_range.start || shifted > x_range.end {
            continue;
        }
        if let Some(sigma) = scene.uncertainty {
            let (lo, hi) = line.confidence_interval(scene.label, sigma);
            chart
                .draw_series(std::iter::once(Rectangle::new(
                    [
                        (lo.max(x_range.start), y_lo),
                        (hi.min(x_range.end), y_hi),
                    ],
                    RED.mix(0.15).filled(),
                )))
                .map_err(render_err)?;
        }
        chart
            .draw_series(DashedLineSeries::new(
                vec![(shifted, y_lo), (shifted, y_hi)],
                4,
                3,
                RED.mix(0.6).stroke_width(1),
            ))
            .map_err(render_err)?
            .label(line.name)
            .legend(|(lx, ly)| PathElement::new(vec![(lx, ly), (lx + 10, ly)], RED.mix(0.6)));
        labeled = true;
    }

    if labeled {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(render_err)?;
    }

    Ok(())
}
