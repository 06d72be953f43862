//! Sample-rate and channel conversion for interleaved f32 audio.

use rubato::{FftFixedIn, Resampler};

/// Input frames handed to the FFT resampler per call.
const CHUNK_FRAMES: usize = 1024;
const SUB_CHUNKS: usize = 2;

#[derive(thiserror::Error, Debug)]
pub enum ResampleError {
    #[error("cannot build resampler: {0}")]
    Setup(#[from] rubato::ResamplerConstructionError),
    #[error("resampling failed: {0}")]
    Process(#[from] rubato::ResampleError),
}

/// Band-limited resampling of interleaved audio.
///
/// Identical rates return the input unchanged. Otherwise every channel goes
/// through an FFT resampler whose low-pass removes content above the lower
/// Nyquist frequency. The filter delay is trimmed, so the output holds
/// exactly `ceil(frames * to_rate / from_rate)` frames aligned with the input.
pub fn resample(
    samples: &[f32],
    channels: usize,
    from_rate: u32,
    to_rate: u32,
) -> Result<Vec<f32>, ResampleError> {
    if from_rate == to_rate || channels == 0 || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let frames = samples.len() / channels;
    let expected = (frames as u64 * to_rate as u64).div_ceil(from_rate as u64) as usize;

    let mut resampler = FftFixedIn::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        CHUNK_FRAMES,
        SUB_CHUNKS,
        channels,
    )?;
    let delay = resampler.output_delay();
    let input = deinterleave(samples, channels);

    let mut planes: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + delay); channels];
    let mut block: Vec<Vec<f32>> = vec![Vec::new(); channels];
    let mut pos = 0;
    // Zero-padded chunks keep flowing until the delayed tail is out.
    while planes[0].len() < delay + expected {
        let needed = resampler.input_frames_next();
        let end = (pos + needed).min(frames);
        for (chunk, plane) in block.iter_mut().zip(&input) {
            chunk.clear();
            if pos < end {
                chunk.extend_from_slice(&plane[pos..end]);
            }
            chunk.resize(needed, 0.0);
        }
        pos += needed;

        let out = resampler.process(&block, None)?;
        for (plane, chunk) in planes.iter_mut().zip(out) {
            plane.extend_from_slice(&chunk);
        }
    }

    let mut output = Vec::with_capacity(expected * channels);
    for frame in delay..delay + expected {
        output.extend(planes.iter().map(|plane| plane[frame]));
    }
    Ok(output)
}

fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    (0..channels)
        .map(|c| samples.iter().skip(c).step_by(channels).copied().collect())
        .collect()
}

/// Average interleaved frames down to one channel.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}
