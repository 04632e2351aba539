use ndarray::{Array1, ArrayView1};

use crate::asr::recognizer::{AsrError, Scorer};

use super::state::{extract_top_tokens, DecoderCache, Hypothesis, StepScores};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub decoder_steps: usize,
    pub cache_hits: usize,
    pub joint_evals: usize,
}

/// Per-utterance bridge between the search loops and a [`Scorer`]: keeps
/// hypothesis decoder caches current and validates what the network returns.
pub struct DecoderSession {
    pub(crate) vocab_size: usize,
    pub(crate) blank_idx: i32,
    stats: SessionStats,
}

impl DecoderSession {
    pub fn new<S: Scorer>(scorer: &S) -> Result<Self, AsrError> {
        let vocab_size = scorer.vocab_size();
        if vocab_size < 2 {
            return Err(AsrError::InvalidInput(format!(
                "vocabulary of size {vocab_size} leaves no room for labels besides blank"
            )));
        }
        Ok(Self {
            vocab_size,
            blank_idx: scorer.blank_idx(),
            stats: SessionStats::default(),
        })
    }

    pub fn blank_idx(&self) -> i32 {
        self.blank_idx
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Recomputes the decoder output only if the label history grew since the
    /// cache was filled.
    pub fn ensure_decoder_output<S: Scorer>(
        &mut self,
        scorer: &mut S,
        hyp: &mut Hypothesis,
    ) -> Result<(), AsrError> {
        if hyp.has_current_cache() {
            self.stats.cache_hits += 1;
            return Ok(());
        }
        let output = scorer.decoder_step(&hyp.tokens)?;
        if output.iter().any(|v| !v.is_finite()) {
            return Err(AsrError::ScoringFailure(format!(
                "decoder output for a {}-label prefix is not finite",
                hyp.tokens.len()
            )));
        }
        hyp.cache = Some(DecoderCache {
            output,
            prefix_len: hyp.tokens.len(),
        });
        self.stats.decoder_steps += 1;
        Ok(())
    }

    pub fn log_probs<S: Scorer>(
        &mut self,
        scorer: &mut S,
        encoder_step: ArrayView1<f32>,
        hyp: &mut Hypothesis,
    ) -> Result<Array1<f32>, AsrError> {
        self.ensure_decoder_output(scorer, hyp)?;
        let decoder_output = hyp
            .decoder_output()
            .ok_or_else(|| AsrError::ScoringFailure("decoder cache missing".into()))?;

        let log_probs = scorer.joint(encoder_step, decoder_output.view())?;
        self.stats.joint_evals += 1;

        if log_probs.len() != self.vocab_size {
            return Err(AsrError::InvalidInput(format!(
                "joiner returned {} scores for a vocabulary of {}",
                log_probs.len(),
                self.vocab_size
            )));
        }
        // -inf is a legitimate zero probability; NaN and +inf are not.
        if log_probs.iter().any(|v| v.is_nan() || *v == f32::INFINITY) {
            return Err(AsrError::ScoringFailure(
                "joiner returned non-finite log-probabilities".into(),
            ));
        }
        Ok(log_probs)
    }

    pub fn step_scores<S: Scorer>(
        &mut self,
        scorer: &mut S,
        encoder_step: ArrayView1<f32>,
        hyp: &mut Hypothesis,
        expand_beam: usize,
    ) -> Result<StepScores, AsrError> {
        let log_probs = self.log_probs(scorer, encoder_step, hyp)?;
        let top_tokens = match log_probs.as_slice() {
            Some(slice) => extract_top_tokens(slice, expand_beam),
            None => extract_top_tokens(&log_probs.to_vec(), expand_beam),
        };
        if top_tokens.is_empty() {
            return Err(AsrError::ScoringFailure(
                "joiner assigned zero probability to every label".into(),
            ));
        }
        Ok(StepScores { top_tokens })
    }
}
