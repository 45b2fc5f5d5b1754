pub mod health;
pub mod transcribe;
