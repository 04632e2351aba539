use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use super::config::AsrError;

/// Scoring oracle over an encoder/decoder/joiner network.
///
/// Implementations must be pure with respect to their inputs: the same prefix
/// always yields the same decoder output, and `joint` keeps no state between
/// calls. Search code relies on this to cache decoder outputs per hypothesis.
pub trait Scorer {
    /// Output vocabulary size, blank included as the last index.
    fn vocab_size(&self) -> usize;

    /// Runs the encoder over a whole utterance laid out as `(frames, features)`.
    fn encode(&mut self, frames: ArrayView2<f32>) -> Result<Array2<f32>, AsrError>;

    /// Decoder output for a label prefix (blank excluded).
    fn decoder_step(&mut self, prefix: &[i32]) -> Result<Array1<f32>, AsrError>;

    /// Log-probabilities over the vocabulary for one encoder frame.
    fn joint(
        &mut self,
        encoder_frame: ArrayView1<f32>,
        decoder_output: ArrayView1<f32>,
    ) -> Result<Array1<f32>, AsrError>;

    fn blank_idx(&self) -> i32 {
        self.vocab_size() as i32 - 1
    }
}

impl<S: Scorer + ?Sized> Scorer for &mut S {
    fn vocab_size(&self) -> usize {
        (**self).vocab_size()
    }

    fn encode(&mut self, frames: ArrayView2<f32>) -> Result<Array2<f32>, AsrError> {
        (**self).encode(frames)
    }

    fn decoder_step(&mut self, prefix: &[i32]) -> Result<Array1<f32>, AsrError> {
        (**self).decoder_step(prefix)
    }

    fn joint(
        &mut self,
        encoder_frame: ArrayView1<f32>,
        decoder_output: ArrayView1<f32>,
    ) -> Result<Array1<f32>, AsrError> {
        (**self).joint(encoder_frame, decoder_output)
    }
}
