//! Core types shared across all Safekeep crates

pub mod error;
pub mod problemdetails;
pub mod types;

pub use error::*;
pub use problemdetails::{Problem, ProblemDetails};
pub use types::*;

// Re-export external dependencies
pub use anyhow;
pub use chrono;
pub use serde_json;
pub use tracing;
