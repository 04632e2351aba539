use std::time::Instant;

use ndarray::ArrayView2;

use crate::asr::recognizer::{AsrError, LengthNorm, Scorer, SearchConfig};

use super::session::DecoderSession;
use super::state::{best_index, best_score, retain_top_k, BeamSet, Hypothesis};

/// Where a search stopped because an iteration cap was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overflow {
    pub frame: usize,
    pub steps: usize,
}

impl Overflow {
    pub fn to_error(self) -> AsrError {
        AsrError::ExpansionOverflow {
            frame: self.frame,
            steps: self.steps,
        }
    }
}

/// Survivors of a search, best first, with length-normalized scores.
#[derive(Debug)]
pub struct SearchOutcome {
    pub hypotheses: Vec<Hypothesis>,
    pub frames_decoded: usize,
    pub overflow: Option<Overflow>,
}

/// Divides every score by the configured length divisor and orders the list
/// best first.
pub fn normalize_and_rank(hyps: &mut [Hypothesis], norm: LengthNorm) {
    for hyp in hyps.iter_mut() {
        hyp.score = norm.apply(hyp.score, hyp.len());
    }
    hyps.sort_by(|a, b| b.score.total_cmp(&a.score));
}

pub(crate) fn decode_sequence_greedy<S: Scorer>(
    session: &mut DecoderSession,
    scorer: &mut S,
    encodings: &ArrayView2<f32>,
    config: &SearchConfig,
) -> Result<SearchOutcome, AsrError> {
    let decode_start = Instant::now();
    let max_steps = config.max_decode_steps.max(1);
    let mut hyp = Hypothesis::initial();
    let mut overflow = None;
    let mut frames_decoded = 0;

    'frames: for (t, step) in encodings.outer_iter().enumerate() {
        loop {
            let scores = session.step_scores(scorer, step, &mut hyp, 1)?;
            let (token, logp) = scores.top_tokens[0];
            if token as i32 == session.blank_idx {
                hyp.score += logp;
                break;
            }
            if hyp.len() >= max_steps {
                overflow = Some(Overflow {
                    frame: t,
                    steps: hyp.len(),
                });
                break 'frames;
            }
            hyp = hyp.extend(token as i32, hyp.score + logp, t);
        }
        frames_decoded = t + 1;
    }

    if let Some(o) = overflow {
        log::warn!("Greedy decode stopped: {}", o.to_error());
    }
    log::debug!(
        "Greedy decode completed in {:?} (frames: {}, labels: {})",
        decode_start.elapsed(),
        frames_decoded,
        hyp.len()
    );

    let mut hypotheses = vec![hyp];
    normalize_and_rank(&mut hypotheses, config.length_norm);
    Ok(SearchOutcome {
        hypotheses,
        frames_decoded,
        overflow,
    })
}

pub(crate) fn decode_sequence_beam<S: Scorer>(
    session: &mut DecoderSession,
    scorer: &mut S,
    encodings: &ArrayView2<f32>,
    config: &SearchConfig,
) -> Result<SearchOutcome, AsrError> {
    let decode_start = Instant::now();
    let beam_size = config.beam_size.max(1);
    let expand_beam = config.expand_beam.clamp(1, session.vocab_size);
    let max_expansions = config.max_expansions_per_frame.max(1);

    let mut beam = vec![Hypothesis::initial()];
    let mut overflow = None;
    let mut frames_decoded = 0;

    for (t, step) in encodings.outer_iter().enumerate() {
        let mut current = std::mem::take(&mut beam);
        let mut next = BeamSet::new();
        let mut expansions = 0;
        let mut merges = 0;

        while let Some(idx) = best_index(&current) {
            if expansions >= max_expansions {
                overflow = Some(Overflow {
                    frame: t,
                    steps: expansions,
                });
                break;
            }
            let mut hyp = current.swap_remove(idx);
            expansions += 1;

            let scores = session.step_scores(scorer, step, &mut hyp, expand_beam)?;
            for &(token, logp) in &scores.top_tokens {
                let score = hyp.score + logp;
                if token as i32 == session.blank_idx {
                    if next.insert_or_merge(hyp.with_score(score)) {
                        merges += 1;
                    }
                } else {
                    current.push(hyp.extend(token as i32, score, t));
                }
            }

            // Nothing left in `current` can outrank what already finished.
            if next.len() > beam_size && next.best_score() > best_score(&current) {
                break;
            }
        }

        if let Some(o) = overflow {
            log::warn!("{}; keeping best hypotheses so far", o.to_error());
            beam = if next.is_empty() {
                retain_top_k(&mut current, beam_size);
                current
            } else {
                next.into_pruned(beam_size)
            };
            break;
        }

        log::trace!(
            "frame {t}: {expansions} expansions, {} finished, {merges} merged",
            next.len()
        );
        beam = next.into_pruned(beam_size);
        frames_decoded = t + 1;
    }

    normalize_and_rank(&mut beam, config.length_norm);

    log::debug!(
        "Beam decode completed in {:?} (frames: {}, survivors: {}, best labels: {})",
        decode_start.elapsed(),
        frames_decoded,
        beam.len(),
        beam.first().map(Hypothesis::len).unwrap_or(0)
    );

    Ok(SearchOutcome {
        hypotheses: beam,
        frames_decoded,
        overflow,
    })
}
