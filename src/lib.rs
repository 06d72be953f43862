//! # script-tts
//!
//! A Rust library that turns a multi-character script into one stitched audio
//! track, routing each speaker's lines to a distinct synthetic voice.
//!
//! ## Features
//!
//! - **Script parsing**: `NAME: line`, `[NAME] line`, `(NAME) line` and
//!   `**NAME** line` speaker labels, mixed freely within one script
//! - **Voice resolution**: explicit mappings, narrator aliases and gendered
//!   name lists, with deterministic round-robin defaults
//! - **Audio assembly**: resampling, channel reconciliation, crossfades or
//!   silence gaps between segments
//! - **Parallel synthesis**: segments are synthesized on a worker pool and
//!   spliced back in script order
//!
//! ## Quick Start
//!
//! ```ignore
//! use script_tts::{
//!     CancellationToken, PipelineConfig, ScriptSynthesizer, SynthesisRequest, VoiceCatalog,
//! };
//!
//! // `engine` is any type implementing `script_tts::Synthesizer`
//! let synth = ScriptSynthesizer::new(engine, VoiceCatalog::kokoro(), PipelineConfig::default())?;
//!
//! let script = "NARRATOR: The story begins.\nJOHN: Hello?\nSARAH: I'm here.";
//! let track = synth.synthesize_script(script, &SynthesisRequest::default(), &CancellationToken::new())?;
//! track.write_wav(std::path::Path::new("story.wav"))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod audio;
pub mod error;
pub mod pipeline;
pub mod script;
pub mod voices;

use std::sync::Arc;
use std::time::Duration;

pub use audio::{AssembledTrack, Assembler, AssemblerConfig, SegmentTiming};
pub use error::ScriptError;
pub use pipeline::{CancellationToken, PipelineConfig, ScriptSynthesizer, SynthesisRequest};
pub use script::{ParserConfig, ScriptParser, Segment, SpeakerId};
pub use voices::{
    AssignmentSource, Gender, ResolverConfig, VoiceCatalog, VoiceEntry, VoiceMappingTable,
    VoiceResolver,
};

/// Audio produced by a synthesizer for one segment.
///
/// Samples are interleaved when `channels > 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Raw audio samples as f32 values
    pub samples: Vec<f32>,
    /// Sample rate of the audio (24000 for Kokoro)
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
}

impl AudioBuffer {
    /// Single-channel buffer.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
        }
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        match self.channels {
            0 => 0,
            ch => self.samples.len() / ch as usize,
        }
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Duration of the audio, exact to the nanosecond.
    pub fn duration(&self) -> Duration {
        audio::frames_to_duration(self.frames(), self.sample_rate)
    }
}

/// Errors reported by a [`Synthesizer`] backend.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SynthesisError {
    #[error("Voice '{0}' is not recognized by the synthesizer")]
    UnknownVoice(String),
    #[error("Cannot synthesize empty text")]
    EmptyText,
    #[error("Synthesis backend failed: {message}")]
    Backend { message: String, transient: bool },
}

impl SynthesisError {
    /// A permanent backend fault.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            transient: false,
        }
    }

    /// A backend fault worth retrying (timeouts, resource exhaustion).
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            transient: true,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Backend { transient: true, .. })
    }
}

/// Common interface for text-to-speech backends driven by the pipeline.
///
/// The pipeline calls `synthesize` from several worker threads at once, so
/// implementations must be `Send + Sync`. Implementations must reject empty
/// text with [`SynthesisError::EmptyText`] and voices they do not know with
/// [`SynthesisError::UnknownVoice`].
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` with the given voice. `speed` is passed through from
    /// the request without interpretation.
    fn synthesize(
        &self,
        text: &str,
        voice: &str,
        speed: f32,
    ) -> Result<AudioBuffer, SynthesisError>;
}

impl<T: Synthesizer + ?Sized> Synthesizer for Arc<T> {
    fn synthesize(
        &self,
        text: &str,
        voice: &str,
        speed: f32,
    ) -> Result<AudioBuffer, SynthesisError> {
        (**self).synthesize(text, voice, speed)
    }
}

impl<T: Synthesizer + ?Sized> Synthesizer for Box<T> {
    fn synthesize(
        &self,
        text: &str,
        voice: &str,
        speed: f32,
    ) -> Result<AudioBuffer, SynthesisError> {
        (**self).synthesize(text, voice, speed)
    }
}
