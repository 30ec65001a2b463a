//! cg-core: shared types, IDs, errors, configuration, and progress events.
//!
//! This crate is the foundational dependency for the other cg-* crates,
//! providing type-safe identifiers, a unified error type, the conversion
//! request model, application configuration, and the progress/job event
//! types that flow from the pipeline to subscribers.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod request;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::*;
pub use request::{ConversionRequest, LoopMode};
