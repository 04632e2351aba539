use std::fs::File;
use std::io::{self, BufWriter};

use anyhow::{Context, Result};
use clap::Parser;
use rnnt_engine_lib::asr::{
    is_json_lines, load_utterances, AsrError, FeatureReader, JsonLinesWriter, TransducerModel,
    TranscriptSink, Utterance,
};
use rnnt_engine_lib::DecodeEngine;

mod cli;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = cli::Args::parse();
    let config = args.search_config()?;
    log::info!(
        "Search: {} (beam={}, expand={}, norm={:?})",
        if config.uses_greedy() { "greedy" } else { "beam" },
        config.beam_size,
        config.expand_beam,
        config.length_norm
    );

    let model = TransducerModel::load(&args.model)
        .with_context(|| format!("failed to load model {}", args.model.display()))?;
    let mut engine = DecodeEngine::new(model, config);

    let utterances: Box<dyn Iterator<Item = Result<Utterance, AsrError>>> =
        if is_json_lines(&args.input) {
            Box::new(FeatureReader::open(&args.input)?)
        } else {
            Box::new(load_utterances(&args.input)?.into_iter())
        };

    let mut sink: Box<dyn TranscriptSink> = match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Box::new(JsonLinesWriter::new(BufWriter::new(file)))
        }
        None => Box::new(JsonLinesWriter::new(io::stdout().lock())),
    };

    let summary = engine.run(utterances, sink.as_mut())?;
    if summary.failed > 0 {
        log::warn!("{} utterance(s) could not be decoded", summary.failed);
    }
    Ok(())
}
