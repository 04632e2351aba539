use thiserror::Error;

use crate::asr::AsrError;

/// Run-level errors: anything that stops a whole decoding run rather than a
/// single utterance.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("ASR: {0}")]
    Asr(#[from] AsrError),

    #[error("Config: {0}")]
    Config(String),
}
