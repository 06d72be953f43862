use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use super::resample::{downmix_to_mono, resample};
use super::track::{AssembledTrack, SegmentTiming};
use super::{duration_to_frames, frames_to_duration};
use crate::error::ScriptError;
use crate::script::Segment;
use crate::AudioBuffer;

/// Output sample rate of the Kokoro model, used for empty tracks.
pub const DEFAULT_SAMPLE_RATE: u32 = 24000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[builder(default)]
#[serde(default)]
pub struct AssemblerConfig {
    /// Silence inserted between segments when the crossfade is under one frame.
    pub silence_gap_ms: u64,
    /// Sample rate reported by an empty track.
    pub empty_sample_rate: u32,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            silence_gap_ms: 150,
            empty_sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

impl AssemblerConfig {
    pub fn silence_gap(&self) -> Duration {
        Duration::from_millis(self.silence_gap_ms)
    }
}

/// Splices per-segment buffers into one [`AssembledTrack`].
#[derive(Debug, Clone, Default)]
pub struct Assembler {
    config: AssemblerConfig,
}

/// Assemble with the default silence gap.
pub fn assemble(
    pairs: Vec<(Segment, AudioBuffer)>,
    crossfade: Duration,
) -> Result<AssembledTrack, ScriptError> {
    Assembler::default().assemble(pairs, crossfade)
}

impl Assembler {
    pub fn new(config: AssemblerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Splice `pairs` in order.
    ///
    /// Every buffer is first converted to the sample rate of the first
    /// buffer holding audio, and to mono unless all buffers share one channel
    /// count. A crossfade of at least one frame overlaps adjacent segments by
    /// up to that long, clamped to either segment's length. A shorter one puts
    /// the configured silence gap between segments instead.
    pub fn assemble(
        &self,
        pairs: Vec<(Segment, AudioBuffer)>,
        crossfade: Duration,
    ) -> Result<AssembledTrack, ScriptError> {
        if pairs.is_empty() {
            log::info!("Nothing to assemble, returning empty track");
            return Ok(AssembledTrack::empty(self.config.empty_sample_rate));
        }

        for (segment, buffer) in &pairs {
            validate(segment, buffer)?;
        }
        let sample_rate = pairs
            .iter()
            .find(|(_, b)| b.frames() > 0)
            .unwrap_or(&pairs[0])
            .1
            .sample_rate;
        let first_channels = pairs[0].1.channels;
        let channels = if pairs.iter().all(|(_, b)| b.channels == first_channels) {
            first_channels
        } else {
            1
        };
        let ch = channels as usize;

        let crossfade_frames = duration_to_frames(crossfade, sample_rate);
        let gap_frames = if crossfade_frames == 0 {
            duration_to_frames(self.config.silence_gap(), sample_rate)
        } else {
            0
        };

        let mut output: Vec<f32> = Vec::new();
        let mut timings = Vec::with_capacity(pairs.len());
        let mut prev_frames = 0usize;
        let mut overlapped = 0usize;

        for (i, (segment, buffer)) in pairs.into_iter().enumerate() {
            let samples = conform(buffer, sample_rate, channels, segment.sequence_index)?;
            let frames = samples.len() / ch;
            let output_frames = output.len() / ch;

            let start = if i == 0 {
                output.extend_from_slice(&samples);
                0
            } else if crossfade_frames == 0 {
                output.resize(output.len() + gap_frames * ch, 0.0);
                output.extend_from_slice(&samples);
                output_frames + gap_frames
            } else {
                let overlap = crossfade_frames.min(prev_frames).min(frames);
                append_with_crossfade(&mut output, &samples, overlap, ch);
                overlapped += overlap;
                output_frames - overlap
            };

            timings.push(SegmentTiming {
                sequence_index: segment.sequence_index,
                start: frames_to_duration(start, sample_rate),
                end: frames_to_duration(output.len() / ch, sample_rate),
            });
            prev_frames = frames;
        }

        let track = AssembledTrack::new(output, sample_rate, channels, timings);
        log::info!(
            "Assembled {} segments: {:.2}s at {}Hz, {} channel(s), {} frames overlapped",
            track.timings().len(),
            track.duration_secs(),
            sample_rate,
            channels,
            overlapped
        );
        Ok(track)
    }
}

fn validate(segment: &Segment, buffer: &AudioBuffer) -> Result<(), ScriptError> {
    let reason = if buffer.sample_rate == 0 {
        Some("sample rate is zero".to_string())
    } else if buffer.channels == 0 {
        Some("channel count is zero".to_string())
    } else if buffer.samples.len() % buffer.channels as usize != 0 {
        Some(format!(
            "{} samples do not divide into {} channels",
            buffer.samples.len(),
            buffer.channels
        ))
    } else if buffer.samples.iter().any(|s| !s.is_finite()) {
        Some("buffer contains non-finite samples".to_string())
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ScriptError::IncompatibleAudio {
            index: segment.sequence_index,
            reason,
        }),
        None => Ok(()),
    }
}

/// Bring one buffer to the target rate and channel layout. `channels` is
/// either the buffer's own count or 1.
fn conform(
    buffer: AudioBuffer,
    sample_rate: u32,
    channels: u16,
    index: usize,
) -> Result<Vec<f32>, ScriptError> {
    let mut samples = buffer.samples;
    let mut ch = buffer.channels as usize;
    if buffer.channels != channels {
        log::debug!(
            "Segment {index}: downmixing {} channels to mono",
            buffer.channels
        );
        samples = downmix_to_mono(&samples, ch);
        ch = 1;
    }
    if buffer.sample_rate != sample_rate {
        log::debug!(
            "Segment {index}: resampling {}Hz -> {sample_rate}Hz",
            buffer.sample_rate
        );
        samples = resample(&samples, ch, buffer.sample_rate, sample_rate).map_err(|e| {
            ScriptError::IncompatibleAudio {
                index,
                reason: e.to_string(),
            }
        })?;
    }
    Ok(samples)
}

/// Blend the last `overlap_frames` of `dst` with the head of `src`, then
/// append the rest of `src`. Fade weights sum to 1 at every frame.
fn append_with_crossfade(dst: &mut Vec<f32>, src: &[f32], overlap_frames: usize, channels: usize) {
    if overlap_frames == 0 {
        dst.extend_from_slice(src);
        return;
    }

    let overlap = overlap_frames * channels;
    let dst_start = dst.len() - overlap;
    for frame in 0..overlap_frames {
        let t = frame as f32 / overlap_frames as f32;
        for c in 0..channels {
            let k = frame * channels + c;
            let left = dst[dst_start + k] * (1.0 - t);
            let right = src[k] * t;
            dst[dst_start + k] = left + right;
        }
    }

    dst.extend_from_slice(&src[overlap..]);
}
