pub mod asr;
pub mod engine;
pub mod error;

pub use engine::{DecodeEngine, RunSummary};
pub use error::AppError;
