use std::time::Instant;

use ndarray::ArrayView2;

use crate::asr::decoder::{DecoderSession, SearchOutcome};

use super::config::{AsrError, NBestEntry, SearchConfig, Transcript};
use super::scorer::Scorer;

/// Encodes one utterance and searches it. Nothing is carried over between
/// calls, so a failure here never affects the next utterance.
pub fn decode_utterance<S: Scorer>(
    scorer: &mut S,
    frames: ArrayView2<f32>,
    config: &SearchConfig,
) -> Result<Transcript, AsrError> {
    let start = Instant::now();
    if frames.nrows() == 0 || frames.ncols() == 0 {
        return Err(AsrError::InvalidInput(format!(
            "utterance shape {:?} is empty",
            frames.shape()
        )));
    }
    if frames.iter().any(|v| !v.is_finite()) {
        return Err(AsrError::InvalidInput(
            "utterance contains non-finite features".into(),
        ));
    }

    let encodings = scorer.encode(frames)?;
    log::debug!("Encoder completed in {:?}", start.elapsed());
    if encodings.nrows() == 0 {
        return Err(AsrError::InvalidInput("encoder produced no frames".into()));
    }
    if encodings.iter().any(|v| !v.is_finite()) {
        return Err(AsrError::ScoringFailure(
            "encoder output is not finite".into(),
        ));
    }

    let mut session = DecoderSession::new(&*scorer)?;
    let outcome = session.decode_sequence(scorer, &encodings.view(), config)?;
    let stats = session.stats();
    log::debug!(
        "decode_utterance completed in {:?} (frames: {}/{}, decoder steps: {}, cache hits: {}, joint evals: {})",
        start.elapsed(),
        outcome.frames_decoded,
        encodings.nrows(),
        stats.decoder_steps,
        stats.cache_hits,
        stats.joint_evals
    );

    Ok(build_transcript(outcome, session.blank_idx(), config.nbest))
}

/// Turns search survivors into the output record. An utterance whose best path
/// emitted nothing is reported as a single blank so the result is never empty.
pub fn build_transcript(outcome: SearchOutcome, blank_idx: i32, nbest: usize) -> Transcript {
    let limit = if nbest == 0 {
        outcome.hypotheses.len()
    } else {
        nbest
    };
    let entries: Vec<NBestEntry> = outcome
        .hypotheses
        .iter()
        .take(limit)
        .map(|h| NBestEntry {
            labels: h.tokens.clone(),
            score: h.score,
        })
        .collect();

    let truncated = outcome.overflow.is_some();
    let (labels, timestamps, score) = match outcome.hypotheses.into_iter().next() {
        Some(best) if !best.is_empty() => (best.tokens, best.timestamps, best.score),
        Some(best) => (vec![blank_idx], Vec::new(), best.score),
        None => (vec![blank_idx], Vec::new(), f32::NEG_INFINITY),
    };

    Transcript {
        frame_count: labels.len(),
        labels,
        timestamps,
        score,
        nbest: entries,
        truncated,
    }
}
