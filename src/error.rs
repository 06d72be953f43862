use crate::script::SpeakerId;
use crate::SynthesisError;

/// Errors that abort a script synthesis request.
///
/// Every variant raised while processing a script names the segment index
/// or speaker it concerns.
#[derive(thiserror::Error, Debug)]
pub enum ScriptError {
    #[error("Speaker '{speaker}' is mapped to voice '{voice}', which is not in the voice catalog")]
    Configuration { speaker: String, voice: String },
    #[error("Segment {index} ({speaker}) has no resolved voice")]
    UnresolvedSpeaker { index: usize, speaker: SpeakerId },
    #[error("Synthesis failed for segment {index} ({speaker}): {source}")]
    Synthesis {
        index: usize,
        speaker: SpeakerId,
        #[source]
        source: SynthesisError,
    },
    #[error("Audio for segment {index} cannot be spliced: {reason}")]
    IncompatibleAudio { index: usize, reason: String },
    #[error("Synthesis request was cancelled")]
    Cancelled,
    #[error("Invalid voice catalog: {0}")]
    Catalog(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Failed to start synthesis workers: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WAV encoding error: {0}")]
    Wav(#[from] hound::Error),
}
