//! Interactive exploration of spectrum collections through 2-D embeddings.
//!
//! A session puts a prepared collection behind three linked pieces: a
//! pickable projection of the current embedding, a spectrum detail view of
//! the picked item and a label input whose confirmed values accumulate in a
//! per-identifier store. Reductions come from the `reduce` crate and can be
//! swapped at any point without losing picks or recorded labels.

pub mod callback;
pub mod error;
pub mod explorer;
pub mod label_input;
pub mod view;

// Re-exports for easier access
pub use callback::{CallbackId, ExplorerCallback, ExplorerEvent};
pub use error::ExplorerError;
pub use explorer::{Explorer, ExplorerOptions};
pub use label_input::LabelInput;
pub use view::{
    draw_spectrum, DetailConfig, DetailRenderer, DetailScene, DetailView, ProjectionConfig,
    ProjectionFrame, ProjectionView,
};
