pub mod ghidra;

pub use ghidra::Ghidra;
