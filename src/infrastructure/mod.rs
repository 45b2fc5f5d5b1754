pub mod storage;
pub mod transcriber;
