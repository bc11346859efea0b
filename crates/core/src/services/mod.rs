pub mod decompiler;
pub mod decompilers;
pub mod extractor;
pub mod extractors;
pub mod pool;
