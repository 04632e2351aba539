#![allow(dead_code)]

use ndarray::{array, Array1, Array2, ArrayView1, ArrayView2};
use rnnt_engine_lib::asr::{AsrError, Scorer};

/// Scorer whose joiner output is a function of `(frame index, label prefix)`.
/// The encoder maps frame `t` to `[t]` and the decoder maps a prefix to its
/// slot in a registry, so the script sees exactly what the search asked for.
pub struct ScriptedScorer<F> {
    vocab_size: usize,
    script: F,
    prefixes: Vec<Vec<i32>>,
    pub encode_calls: usize,
    pub decoder_calls: usize,
    pub joint_calls: usize,
}

impl<F> ScriptedScorer<F>
where
    F: FnMut(usize, &[i32]) -> Vec<f32>,
{
    pub fn new(vocab_size: usize, script: F) -> Self {
        Self {
            vocab_size,
            script,
            prefixes: Vec::new(),
            encode_calls: 0,
            decoder_calls: 0,
            joint_calls: 0,
        }
    }

    pub fn decoded_prefixes(&self) -> &[Vec<i32>] {
        &self.prefixes
    }
}

impl<F> Scorer for ScriptedScorer<F>
where
    F: FnMut(usize, &[i32]) -> Vec<f32>,
{
    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn encode(&mut self, frames: ArrayView2<f32>) -> Result<Array2<f32>, AsrError> {
        self.encode_calls += 1;
        Ok(Array2::from_shape_fn((frames.nrows(), 1), |(t, _)| t as f32))
    }

    fn decoder_step(&mut self, prefix: &[i32]) -> Result<Array1<f32>, AsrError> {
        self.decoder_calls += 1;
        self.prefixes.push(prefix.to_vec());
        Ok(array![(self.prefixes.len() - 1) as f32])
    }

    fn joint(
        &mut self,
        encoder_frame: ArrayView1<f32>,
        decoder_output: ArrayView1<f32>,
    ) -> Result<Array1<f32>, AsrError> {
        self.joint_calls += 1;
        let t = encoder_frame[0] as usize;
        let prefix = self.prefixes[decoder_output[0] as usize].clone();
        Ok(Array1::from_vec((self.script)(t, &prefix)))
    }
}

/// Probabilities to log-probabilities; zero becomes `-inf`.
pub fn log_dist(probs: &[f32]) -> Vec<f32> {
    probs.iter().map(|p| p.ln()).collect()
}

/// `n` single-feature frames. The scripted encoder ignores their values.
pub fn frames(n: usize) -> Array2<f32> {
    Array2::zeros((n, 1))
}

/// Deterministic, label-history dependent scores for comparison tests.
pub fn wavy_script(vocab_size: usize) -> impl FnMut(usize, &[i32]) -> Vec<f32> {
    move |t, prefix| {
        let h: f32 = prefix
            .iter()
            .enumerate()
            .map(|(i, &l)| (l as f32 + 1.0) * (i as f32 + 1.3))
            .sum();
        let logits: Vec<f32> = (0..vocab_size)
            .map(|v| {
                let base = ((t as f32 * 1.7 + v as f32 * 2.3 + h * 0.9).sin()) * 2.0;
                // Blank gets stronger as the prefix grows so emission stays finite.
                if v == vocab_size - 1 {
                    base + 0.8 * prefix.len() as f32
                } else {
                    base
                }
            })
            .collect();
        let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let lse = logits.iter().map(|l| (l - max).exp()).sum::<f32>().ln() + max;
        logits.iter().map(|l| l - lse).collect()
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
