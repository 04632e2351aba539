use std::io::Write;

use ndarray::Array2;
use serde::Serialize;

use crate::asr::recognizer::{AsrError, Transcript};

/// Label ids as one-hot columns, shape `(vocab_size, labels.len())`.
pub fn one_hot(labels: &[i32], vocab_size: usize) -> Result<Array2<f32>, AsrError> {
    let mut out = Array2::zeros((vocab_size, labels.len()));
    for (col, &label) in labels.iter().enumerate() {
        let row = usize::try_from(label)
            .ok()
            .filter(|&r| r < vocab_size)
            .ok_or_else(|| {
                AsrError::InvalidInput(format!(
                    "label {label} outside vocabulary of {vocab_size}"
                ))
            })?;
        out[[row, col]] = 1.0;
    }
    Ok(out)
}

impl Transcript {
    pub fn to_one_hot(&self, vocab_size: usize) -> Result<Array2<f32>, AsrError> {
        one_hot(&self.labels, vocab_size)
    }
}

/// Destination for decoded utterances.
pub trait TranscriptSink {
    fn save(&mut self, id: &str, transcript: &Transcript) -> Result<(), AsrError>;

    fn finish(&mut self) -> Result<(), AsrError> {
        Ok(())
    }
}

#[derive(Serialize)]
struct Record<'a> {
    id: &'a str,
    #[serde(flatten)]
    transcript: &'a Transcript,
}

/// Writes one JSON object per utterance.
pub struct JsonLinesWriter<W: Write> {
    out: W,
    written: usize,
}

impl<W: Write> JsonLinesWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, written: 0 }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> TranscriptSink for JsonLinesWriter<W> {
    fn save(&mut self, id: &str, transcript: &Transcript) -> Result<(), AsrError> {
        serde_json::to_writer(&mut self.out, &Record { id, transcript })?;
        writeln!(self.out)?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), AsrError> {
        self.out.flush()?;
        Ok(())
    }
}

/// Keeps results in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<(String, Transcript)>,
}

impl TranscriptSink for MemorySink {
    fn save(&mut self, id: &str, transcript: &Transcript) -> Result<(), AsrError> {
        self.records.push((id.to_string(), transcript.clone()));
        Ok(())
    }
}
