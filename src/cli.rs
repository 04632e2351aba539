use std::path::PathBuf;

use clap::Parser;
use rnnt_engine_lib::asr::{LengthNorm, SearchConfig};
use rnnt_engine_lib::AppError;

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum LengthNormArg {
    /// Rank by raw cumulative log-probability.
    None,
    /// Divide by the number of emitted labels.
    Labels,
    /// Divide by the number of emitted labels plus the start symbol.
    LabelsWithStart,
}

impl From<LengthNormArg> for LengthNorm {
    fn from(arg: LengthNormArg) -> Self {
        match arg {
            LengthNormArg::None => LengthNorm::None,
            LengthNormArg::Labels => LengthNorm::Labels,
            LengthNormArg::LabelsWithStart => LengthNorm::LabelsWithStart,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Greedy and beam search decoding for transducer models")]
pub struct Args {
    /// Model weights (JSON).
    #[arg(long)]
    pub model: PathBuf,

    /// Utterance features: a JSON array, or JSON lines for .jsonl / .ndjson files.
    #[arg(long)]
    pub input: PathBuf,

    /// Search settings (JSON). RNNT_* environment variables override the file,
    /// command-line flags override both.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Hypotheses kept per frame.
    #[arg(long)]
    pub beam_size: Option<usize>,

    /// Candidates explored per hypothesis expansion.
    #[arg(long)]
    pub expand_beam: Option<usize>,

    /// Label cap per utterance in greedy mode.
    #[arg(long)]
    pub max_decode_steps: Option<usize>,

    /// Hypotheses popped per frame before beam search gives up on the utterance.
    #[arg(long)]
    pub max_expansions_per_frame: Option<usize>,

    /// Score normalization applied before picking the best hypothesis.
    #[arg(long, value_enum)]
    pub length_norm: Option<LengthNormArg>,

    /// Number of N-best entries to report (0 reports every survivor).
    #[arg(long)]
    pub nbest: Option<usize>,

    /// Single-hypothesis arg-max decoding.
    #[arg(long, conflicts_with_all = ["beam_size", "expand_beam"])]
    pub greedy: bool,

    /// Write JSON lines here instead of stdout.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

impl Args {
    pub fn search_config(&self) -> Result<SearchConfig, AppError> {
        let mut config = match &self.config {
            Some(path) => SearchConfig::from_file(path)?,
            None => SearchConfig::default(),
        };
        config.apply_env_overrides("RNNT_");

        if self.greedy {
            config.beam_size = 1;
            config.expand_beam = 1;
            config.force_beam = false;
        }
        if let Some(v) = self.beam_size {
            config.beam_size = v;
            config.force_beam = v > 1;
        }
        if let Some(v) = self.expand_beam {
            config.expand_beam = v;
        }
        if let Some(v) = self.max_decode_steps {
            config.max_decode_steps = v;
        }
        if let Some(v) = self.max_expansions_per_frame {
            config.max_expansions_per_frame = v;
        }
        if let Some(v) = self.length_norm {
            config.length_norm = v.into();
        }
        if let Some(v) = self.nbest {
            config.nbest = v;
        }

        config
            .validate()
            .map_err(|e| AppError::Config(e.to_string()))?;
        Ok(config)
    }
}
