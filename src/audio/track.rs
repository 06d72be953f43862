use std::io::{Seek, Write};
use std::path::Path;
use std::time::Duration;

use serde::Serialize;

use super::frames_to_duration;
use crate::error::ScriptError;

/// Where one segment sits in the assembled track.
///
/// With a crossfade, a segment's start overlaps the previous segment's end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SegmentTiming {
    pub sequence_index: usize,
    pub start: Duration,
    pub end: Duration,
}

/// The final stitched waveform of one script.
///
/// An empty track (zero duration) is the valid result of a script with
/// nothing to say.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledTrack {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
    total_duration: Duration,
    timings: Vec<SegmentTiming>,
}

impl AssembledTrack {
    pub(crate) fn new(
        samples: Vec<f32>,
        sample_rate: u32,
        channels: u16,
        timings: Vec<SegmentTiming>,
    ) -> Self {
        let frames = samples.len() / channels.max(1) as usize;
        Self {
            total_duration: frames_to_duration(frames, sample_rate),
            samples,
            sample_rate,
            channels,
            timings,
        }
    }

    pub(crate) fn empty(sample_rate: u32) -> Self {
        Self::new(Vec::new(), sample_rate, 1, Vec::new())
    }

    /// Interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn total_duration(&self) -> Duration {
        self.total_duration
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.total_duration.as_secs_f64()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn timings(&self) -> &[SegmentTiming] {
        &self.timings
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
    }

    /// Write the track to a 32-bit float WAV file.
    ///
    /// Tracks that exceed full scale are peak-normalized to [-1, 1] on the
    /// way out; the track itself is left untouched.
    pub fn write_wav(&self, path: &Path) -> Result<(), ScriptError> {
        let writer = hound::WavWriter::create(path, self.wav_spec())?;
        self.write_samples(writer)?;
        log::info!("Saved audio to {}", path.display());
        Ok(())
    }

    /// Like [`write_wav`](Self::write_wav), into any seekable writer.
    pub fn write_wav_to<W: Write + Seek>(&self, writer: W) -> Result<(), ScriptError> {
        let writer = hound::WavWriter::new(writer, self.wav_spec())?;
        self.write_samples(writer)
    }

    fn wav_spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channels.max(1),
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        }
    }

    fn write_samples<W: Write + Seek>(
        &self,
        mut writer: hound::WavWriter<W>,
    ) -> Result<(), ScriptError> {
        let peak = self.peak();
        let gain = if peak > 1.0 { 1.0 / peak } else { 1.0 };
        for &sample in &self.samples {
            writer.write_sample(sample * gain)?;
        }
        writer.finalize()?;
        Ok(())
    }
}
