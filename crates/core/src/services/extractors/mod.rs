pub mod c;

pub use c::CExtractor;
