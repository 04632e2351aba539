//! Utterance-by-utterance decoding driver.

use std::time::Instant;

use serde::Serialize;

use crate::asr::{
    decode_utterance, AsrError, Scorer, SearchConfig, Transcript, TranscriptSink, Utterance,
};
use crate::error::AppError;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub decoded: usize,
    pub failed: usize,
    pub truncated: usize,
}

pub struct DecodeEngine<S: Scorer> {
    scorer: S,
    config: SearchConfig,
}

impl<S: Scorer> DecodeEngine<S> {
    pub fn new(scorer: S, mut config: SearchConfig) -> Self {
        config.clamp();
        Self { scorer, config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn scorer(&self) -> &S {
        &self.scorer
    }

    pub fn decode(&mut self, utterance: &Utterance) -> Result<Transcript, AsrError> {
        let frames = utterance.to_array()?;
        log::debug!(
            "Decoding '{}' ({} frames)",
            utterance.id,
            utterance.num_frames()
        );
        decode_utterance(&mut self.scorer, frames.view(), &self.config)
    }

    /// Decodes utterances in order and hands each result to `sink`. A failed
    /// utterance is logged and counted; only sink or read I/O errors end the run.
    pub fn run<I, K>(&mut self, utterances: I, sink: &mut K) -> Result<RunSummary, AppError>
    where
        I: IntoIterator<Item = Result<Utterance, AsrError>>,
        K: TranscriptSink + ?Sized,
    {
        let run_start = Instant::now();
        let mut summary = RunSummary::default();

        for (n, item) in utterances.into_iter().enumerate() {
            let utterance = match item {
                Ok(u) => u,
                Err(err) if err.is_recoverable() => {
                    log::error!("Skipping input #{n}: {err}");
                    summary.failed += 1;
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            match self.decode(&utterance) {
                Ok(transcript) => {
                    if transcript.truncated {
                        log::warn!("'{}': {}", utterance.id, TRUNCATED_NOTE);
                        summary.truncated += 1;
                    }
                    sink.save(&utterance.id, &transcript)?;
                    summary.decoded += 1;
                }
                Err(err) => {
                    log::error!(
                        "Failed to decode '{}': {err}. {}",
                        utterance.id,
                        err.user_message()
                    );
                    summary.failed += 1;
                }
            }
        }

        sink.finish()?;
        log::info!(
            "Decoded {} utterance(s), {} failed, {} truncated in {:?}",
            summary.decoded,
            summary.failed,
            summary.truncated,
            run_start.elapsed()
        );
        Ok(summary)
    }
}

const TRUNCATED_NOTE: &str =
    "Decoding stopped early for this utterance; the best partial result was kept.";
