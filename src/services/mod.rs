pub mod extractor;
pub mod jobs;
pub mod pool;
pub mod storage;
pub mod worker;
