//! codepair-core
//!
//! Core library for building paired source/decompiled function datasets.
//!
//! This crate defines the function model, the language extractors and
//! decompiler adapters, the worker pools that drive them, and the dataset
//! types that pair decompiled functions with their source.
//!
//! All substantive logic lives here so it is fully testable and reusable
//! from multiple frontends (CLI, scripts, notebooks).

pub mod config;
pub mod dataset;
pub mod model;
pub mod pipeline;
pub mod services;

pub use config::PipelineConfig;
pub use pipeline::Pipeline;

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
