pub mod config;
mod inference;
mod model;
mod scorer;

pub use config::{AsrError, LengthNorm, NBestEntry, SearchConfig, Transcript};
pub use inference::{build_transcript, decode_utterance};
pub use model::{log_softmax, Activation, Dense, NetworkStats, TransducerModel};
pub use scorer::Scorer;
