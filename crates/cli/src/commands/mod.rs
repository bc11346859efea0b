pub mod dataset;
pub mod registry;

pub use dataset::*;
pub use registry::*;
