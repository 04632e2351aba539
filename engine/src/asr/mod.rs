pub mod decoder;
pub mod feature_io;
pub mod output;
mod recognizer;

pub use feature_io::{is_json_lines, load_utterances, FeatureReader, Utterance};
pub use output::{one_hot, JsonLinesWriter, MemorySink, TranscriptSink};
pub use recognizer::{
    build_transcript, decode_utterance, log_softmax, Activation, AsrError, Dense, LengthNorm,
    NBestEntry, NetworkStats, Scorer, SearchConfig, Transcript, TransducerModel,
};
