pub mod extractor;
pub mod storage;
