use ndarray::ShapeError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NBestEntry {
    pub labels: Vec<i32>,
    pub score: f32,
}

/// Decoding result for one utterance.
///
/// `labels` is never empty: an utterance that produced no real label carries a
/// single blank placeholder, and `frame_count` is the number of output columns.
#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    pub labels: Vec<i32>,
    pub timestamps: Vec<usize>,
    pub score: f32,
    pub frame_count: usize,
    pub nbest: Vec<NBestEntry>,
    pub truncated: bool,
}

impl Transcript {
    pub fn is_placeholder(&self, blank_idx: i32) -> bool {
        self.labels.len() == 1 && self.labels[0] == blank_idx && self.timestamps.is_empty()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AsrError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Scoring failed: {0}")]
    ScoringFailure(String),
    #[error("Expansion did not stabilize at frame {frame} after {steps} steps")]
    ExpansionOverflow { frame: usize, steps: usize },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ndarray shape error: {0}")]
    Shape(#[from] ShapeError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AsrError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) | Self::Shape(_) => {
                "The utterance could not be decoded because its features are malformed."
            }
            Self::ScoringFailure(_) => {
                "The network produced unusable scores for this utterance; it was skipped."
            }
            Self::ExpansionOverflow { .. } => {
                "Decoding stopped early for this utterance; the best partial result was kept."
            }
            Self::Io(_) => "Could not read or write decoder files. Check paths and permissions.",
            Self::Json(_) => "A model, config or feature file is not valid JSON.",
        }
    }

    /// Whether the run may continue with the next utterance after this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}

/// Divisor applied to a survivor's cumulative score before final selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthNorm {
    /// Raw cumulative log-probability.
    None,
    /// Divide by the number of emitted labels (at least 1).
    #[default]
    Labels,
    /// Divide by the number of emitted labels plus the start symbol.
    LabelsWithStart,
}

impl LengthNorm {
    pub fn apply(self, score: f32, num_labels: usize) -> f32 {
        match self {
            Self::None => score,
            Self::Labels => score / num_labels.max(1) as f32,
            Self::LabelsWithStart => score / (num_labels + 1) as f32,
        }
    }
}

impl FromStr for LengthNorm {
    type Err = AsrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "labels" => Ok(Self::Labels),
            "labels_with_start" => Ok(Self::LabelsWithStart),
            other => Err(AsrError::InvalidInput(format!(
                "unknown length normalization '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub beam_size: usize,
    pub expand_beam: usize,
    pub max_decode_steps: usize,
    pub max_expansions_per_frame: usize,
    pub length_norm: LengthNorm,
    pub nbest: usize,
    pub force_beam: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            beam_size: 10,
            expand_beam: 20,
            max_decode_steps: 2000,
            max_expansions_per_frame: 2000,
            length_norm: LengthNorm::Labels,
            nbest: 0,
            force_beam: false,
        }
    }
}

impl SearchConfig {
    pub fn greedy() -> Self {
        Self {
            beam_size: 1,
            expand_beam: 1,
            ..Default::default()
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AsrError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        log::debug!("Loaded search config from {}", path.as_ref().display());
        Ok(config)
    }

    /// Greedy decoding is the beam(1, 1) special case.
    pub fn uses_greedy(&self) -> bool {
        self.beam_size <= 1 && self.expand_beam <= 1 && !self.force_beam
    }

    /// Rejects settings no search can run with. Every config source goes
    /// through this, so a zero beam fails the same way from a file, the
    /// environment or a flag.
    pub fn validate(&self) -> Result<(), AsrError> {
        if self.beam_size == 0 || self.expand_beam == 0 {
            return Err(AsrError::InvalidInput(
                "beam size and expand beam must be at least 1".into(),
            ));
        }
        if self.max_decode_steps == 0 || self.max_expansions_per_frame == 0 {
            return Err(AsrError::InvalidInput(
                "iteration caps must be at least 1".into(),
            ));
        }
        if self.nbest > self.beam_size {
            return Err(AsrError::InvalidInput(format!(
                "cannot report {} N-best entries from a beam of {}",
                self.nbest, self.beam_size
            )));
        }
        Ok(())
    }

    pub fn apply_env_overrides(&mut self, prefix: &str) {
        let parse_env = |suffix: &str| std::env::var(format!("{prefix}{suffix}")).ok();
        let apply = |suffix: &str, target: &mut usize| {
            if let Some(v) = parse_env(suffix).and_then(|s| s.parse().ok()) {
                *target = v;
            }
        };

        apply("BEAM_SIZE", &mut self.beam_size);
        apply("EXPAND_BEAM", &mut self.expand_beam);
        apply("MAX_DECODE_STEPS", &mut self.max_decode_steps);
        apply("MAX_EXPANSIONS_PER_FRAME", &mut self.max_expansions_per_frame);
        apply("NBEST", &mut self.nbest);

        if let Some(v) = parse_env("LENGTH_NORM") {
            match v.parse() {
                Ok(norm) => self.length_norm = norm,
                Err(e) => log::warn!("Ignoring {prefix}LENGTH_NORM: {e}"),
            }
        }
    }

    pub(crate) fn clamp(&mut self) {
        self.beam_size = self.beam_size.max(1);
        self.expand_beam = self.expand_beam.max(1);
        self.max_decode_steps = self.max_decode_steps.max(1);
        self.max_expansions_per_frame = self.max_expansions_per_frame.max(1);
    }
}
