use std::collections::HashMap;

use ndarray::Array1;

/// Top candidates of one joiner evaluation, best first. Blank competes with
/// the real labels for a slot.
pub struct StepScores {
    pub top_tokens: Vec<(usize, f32)>,
}

/// Decoder output memoized for the first `prefix_len` labels of a hypothesis.
#[derive(Debug, Clone)]
pub struct DecoderCache {
    pub(crate) output: Array1<f32>,
    pub(crate) prefix_len: usize,
}

#[derive(Debug, Clone)]
pub struct Hypothesis {
    pub tokens: Vec<i32>,
    pub timestamps: Vec<usize>,
    pub score: f32,
    pub(crate) cache: Option<DecoderCache>,
}

impl Hypothesis {
    pub fn initial() -> Self {
        Self {
            tokens: Vec::new(),
            timestamps: Vec::new(),
            score: 0.0,
            cache: None,
        }
    }

    pub fn new(tokens: Vec<i32>, score: f32) -> Self {
        Self {
            timestamps: vec![0; tokens.len()],
            tokens,
            score,
            cache: None,
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn has_current_cache(&self) -> bool {
        self.cache
            .as_ref()
            .is_some_and(|c| c.prefix_len == self.tokens.len())
    }

    pub fn decoder_output(&self) -> Option<&Array1<f32>> {
        self.cache
            .as_ref()
            .filter(|c| c.prefix_len == self.tokens.len())
            .map(|c| &c.output)
    }

    /// Same history with a new score; the decoder cache carries over.
    pub fn with_score(&self, score: f32) -> Self {
        Self {
            score,
            ..self.clone()
        }
    }

    /// Child hypothesis with one more label. Its cache is left stale and is
    /// recomputed only when the child gets scored.
    pub fn extend(&self, token: i32, score: f32, frame: usize) -> Self {
        let mut tokens = Vec::with_capacity(self.tokens.len() + 1);
        tokens.extend_from_slice(&self.tokens);
        tokens.push(token);
        let mut timestamps = Vec::with_capacity(self.timestamps.len() + 1);
        timestamps.extend_from_slice(&self.timestamps);
        timestamps.push(frame);
        Self {
            tokens,
            timestamps,
            score,
            cache: None,
        }
    }
}

/// `ln(exp(a) + exp(b))` without overflow.
pub fn log_add(a: f32, b: f32) -> f32 {
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    if hi == f32::NEG_INFINITY {
        return f32::NEG_INFINITY;
    }
    if hi == f32::INFINITY {
        return f32::INFINITY;
    }
    hi + (lo - hi).exp().ln_1p()
}

/// Partial top-k over a log-probability vector, result sorted best first.
/// Non-finite scores never make the cut.
pub fn extract_top_tokens(log_probs: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut candidates: Vec<(usize, f32)> = log_probs
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, s)| s.is_finite())
        .collect();
    let k = k.max(1).min(candidates.len());
    if k == 0 {
        return candidates;
    }
    if k < candidates.len() {
        candidates.select_nth_unstable_by(k - 1, rank);
        candidates.truncate(k);
    }
    candidates.sort_by(rank);
    candidates
}

// Higher score first; ties go to the lower vocabulary id.
fn rank(a: &(usize, f32), b: &(usize, f32)) -> std::cmp::Ordering {
    b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
}

pub(crate) fn best_index(hyps: &[Hypothesis]) -> Option<usize> {
    hyps.iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.score.total_cmp(&b.score))
        .map(|(i, _)| i)
}

pub(crate) fn best_score(hyps: &[Hypothesis]) -> f32 {
    hyps.iter()
        .map(|h| h.score)
        .fold(f32::NEG_INFINITY, f32::max)
}

/// Sorts by score, best first, and drops everything past `k`.
pub fn retain_top_k(hyps: &mut Vec<Hypothesis>, k: usize) {
    hyps.sort_by(|a, b| b.score.total_cmp(&a.score));
    hyps.truncate(k.max(1));
}

/// Hypotheses that finished a frame on blank, keyed by label history so that
/// equivalent paths collapse into one entry.
#[derive(Debug, Default)]
pub struct BeamSet {
    hyps: Vec<Hypothesis>,
    index: HashMap<Vec<i32>, usize>,
    best: Option<f32>,
}

impl BeamSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.hyps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hyps.is_empty()
    }

    pub fn best_score(&self) -> f32 {
        self.best.unwrap_or(f32::NEG_INFINITY)
    }

    pub fn hypotheses(&self) -> &[Hypothesis] {
        &self.hyps
    }

    /// Inserts `hyp`, or folds its probability mass into the entry with the
    /// same labels. The merged entry keeps the alignment of the stronger path.
    /// Returns true when a merge happened.
    pub fn insert_or_merge(&mut self, hyp: Hypothesis) -> bool {
        if let Some(&idx) = self.index.get(&hyp.tokens) {
            let existing = &mut self.hyps[idx];
            let combined = log_add(existing.score, hyp.score);
            if hyp.score > existing.score {
                existing.timestamps = hyp.timestamps;
                if existing.cache.is_none() {
                    existing.cache = hyp.cache;
                }
            }
            existing.score = combined;
            self.best = Some(self.best_score().max(combined));
            true
        } else {
            self.best = Some(self.best_score().max(hyp.score));
            self.index.insert(hyp.tokens.clone(), self.hyps.len());
            self.hyps.push(hyp);
            false
        }
    }

    /// Keeps the `beam_size` best entries; the rest are dropped here.
    pub fn into_pruned(self, beam_size: usize) -> Vec<Hypothesis> {
        let mut hyps = self.hyps;
        retain_top_k(&mut hyps, beam_size);
        hyps
    }
}
