pub mod audio;
pub mod staging;
pub mod transcriber;
