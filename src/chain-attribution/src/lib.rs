//! Chain Attribution — builds conversion chains from a customer event table
//! and reports per-channel attribution.

pub mod io;
pub mod pipeline;

pub use pipeline::{Pipeline, PipelineOutput, RunSummary};
