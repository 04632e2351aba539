use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Lines};
use std::path::Path;
use std::time::Instant;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::asr::recognizer::AsrError;

/// One utterance of input features, one row per frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub id: String,
    pub frames: Vec<Vec<f32>>,
}

impl Utterance {
    pub fn new(id: impl Into<String>, frames: Vec<Vec<f32>>) -> Self {
        Self {
            id: id.into(),
            frames,
        }
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// Features as a `(frames, dim)` matrix.
    pub fn to_array(&self) -> Result<Array2<f32>, AsrError> {
        let dim = self.frames.first().map(Vec::len).unwrap_or(0);
        if dim == 0 {
            return Err(AsrError::InvalidInput(format!(
                "utterance '{}' has no features",
                self.id
            )));
        }
        if let Some(bad) = self.frames.iter().position(|f| f.len() != dim) {
            return Err(AsrError::InvalidInput(format!(
                "utterance '{}': frame {bad} has {} features, expected {dim}",
                self.id,
                self.frames[bad].len()
            )));
        }
        let flat: Vec<f32> = self.frames.iter().flatten().copied().collect();
        Ok(Array2::from_shape_vec((self.frames.len(), dim), flat)?)
    }
}

/// Reads a JSON array of utterances. Only the array itself must parse; an
/// element that is not a valid utterance fails on its own.
pub fn load_utterances(path: &Path) -> Result<Vec<Result<Utterance, AsrError>>, AsrError> {
    let io_start = Instant::now();
    let file = File::open(path)?;
    let elements: Vec<serde_json::Value> = serde_json::from_reader(BufReader::new(file))?;
    let utterances = parse_elements(elements);
    log::debug!(
        "Loaded {} utterance(s) from {} in {:?}",
        utterances.len(),
        path.display(),
        io_start.elapsed()
    );
    Ok(utterances)
}

fn parse_elements(elements: Vec<serde_json::Value>) -> Vec<Result<Utterance, AsrError>> {
    elements
        .into_iter()
        .enumerate()
        .map(|(n, value)| {
            serde_json::from_value(value)
                .map_err(|e| AsrError::InvalidInput(format!("element {n}: {e}")))
        })
        .collect()
}

/// Streams utterances from JSON lines, one per line. A bad line fails only
/// the utterance it holds.
pub struct FeatureReader<R> {
    lines: Lines<R>,
    line_no: usize,
}

impl FeatureReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, AsrError> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> FeatureReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

impl<R: BufRead> Iterator for FeatureReader<R> {
    type Item = Result<Utterance, AsrError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line_no += 1;
            let line = match line {
                Ok(line) => line,
                // The undecodable line is already consumed; later lines still read.
                Err(e) if e.kind() == ErrorKind::InvalidData => {
                    return Some(Err(AsrError::InvalidInput(format!(
                        "line {}: {e}",
                        self.line_no
                    ))));
                }
                Err(e) => return Some(Err(AsrError::Io(e))),
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(serde_json::from_str(&line).map_err(|e| {
                AsrError::InvalidInput(format!("line {}: {e}", self.line_no))
            }));
        }
    }
}

pub fn is_json_lines(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("jsonl") | Some("ndjson")
    )
}
