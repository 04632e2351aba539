use crate::asr::recognizer::{AsrError, Scorer, SearchConfig};

pub(crate) mod search;
pub(crate) mod session;
pub(crate) mod state;

pub use search::{normalize_and_rank, Overflow, SearchOutcome};
pub use session::{DecoderSession, SessionStats};
pub use state::*;

impl DecoderSession {
    pub fn decode_sequence<S: Scorer>(
        &mut self,
        scorer: &mut S,
        encodings: &ndarray::ArrayView2<f32>,
        config: &SearchConfig,
    ) -> Result<SearchOutcome, AsrError> {
        if config.uses_greedy() {
            log::debug!("Decoding (Greedy) frames_len={}", encodings.nrows());
            return search::decode_sequence_greedy(self, scorer, encodings, config);
        }
        log::debug!(
            "Decoding (Beam={}, Expand={}) frames_len={}",
            config.beam_size,
            config.expand_beam,
            encodings.nrows()
        );
        search::decode_sequence_beam(self, scorer, encodings, config)
    }
}
