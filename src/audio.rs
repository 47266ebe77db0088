//! Microphone input plumbing: device configuration, mono mixdown, and
//! streaming resampling to the recognizer's sample rate.

use anyhow::{Context, Result};
use audioadapter_buffers::direct::InterleavedSlice;
use cpal::traits::DeviceTrait;
use cpal::{Device, SampleFormat, SupportedStreamConfig, SupportedStreamConfigRange};
use rubato::{Fft, FixedSync, Resampler};

/// Chunk size for FFT-based resampling.
const CHUNK_SIZE: usize = 1024;

/// Sub-chunks per FFT chunk (higher = better quality, more CPU).
const SUB_CHUNKS: usize = 2;

/// Human-readable device name for logs.
pub fn device_name(device: &Device) -> String {
    device.description().ok().map(|desc| desc.name().to_string()).unwrap_or_else(|| "Unknown".to_string())
}

/// Pick an input configuration: mono or stereo, F32 samples, at the target
/// rate when the device supports it, otherwise the nearest supported rate
/// (the stream then goes through the resampler).
pub fn pick_input_config(configs: impl Iterator<Item = SupportedStreamConfigRange>, target_rate: u32) -> Result<SupportedStreamConfig> {
    let candidates: Vec<SupportedStreamConfigRange> =
        configs.filter(|c| c.channels() <= 2 && c.sample_format() == SampleFormat::F32).collect();

    if candidates.is_empty() {
        anyhow::bail!("No F32 mono/stereo input configuration available");
    }

    for config in &candidates {
        if (config.min_sample_rate()..=config.max_sample_rate()).contains(&target_rate) {
            return Ok((*config).with_sample_rate(target_rate));
        }
    }

    let config = &candidates[0];
    let rate = if target_rate < config.min_sample_rate() { config.min_sample_rate() } else { config.max_sample_rate() };
    Ok((*config).with_sample_rate(rate))
}

/// Mix interleaved frames down to mono by channel averaging.
pub fn mix_to_mono(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        data.to_vec()
    } else {
        data.chunks(channels).map(|frame| frame.iter().sum::<f32>() / channels as f32).collect()
    }
}

/// Streaming mono resampler for the capture callback. Accumulates incoming
/// samples until a full FFT chunk is available, then emits resampled output.
pub struct StreamResampler {
    resampler: Fft<f32>,
    input: Vec<f32>,
    output: Vec<f32>,
    output_frames_max: usize,
}

impl StreamResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self> {
        let resampler =
            Fft::<f32>::new(from_rate as usize, to_rate as usize, CHUNK_SIZE, SUB_CHUNKS, 1, FixedSync::Input).context("Failed to create resampler")?;
        let output_frames_max = resampler.output_frames_max();
        Ok(Self { resampler, input: Vec::with_capacity(CHUNK_SIZE * 2), output: vec![0.0; output_frames_max], output_frames_max })
    }

    /// Feed callback samples; returns resampled output once a full chunk has
    /// been consumed, `None` while accumulating.
    pub fn push(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        self.input.extend_from_slice(samples);
        if self.input.len() < CHUNK_SIZE {
            return None;
        }

        let mut produced = Vec::new();
        while self.input.len() >= CHUNK_SIZE {
            let chunk: Vec<f32> = self.input.drain(..CHUNK_SIZE).collect();
            let input_adapter = InterleavedSlice::new(&chunk, 1, CHUNK_SIZE).ok()?;
            let mut output_adapter = InterleavedSlice::new_mut(&mut self.output, 1, self.output_frames_max).ok()?;
            let (_, frames_written) = self.resampler.process_into_buffer(&input_adapter, &mut output_adapter, None).ok()?;
            produced.extend_from_slice(&self.output[..frames_written]);
        }

        if produced.is_empty() { None } else { Some(produced) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_passthrough() {
        let data = vec![0.1f32, 0.2, 0.3];
        assert_eq!(mix_to_mono(&data, 1), data);
    }

    #[test]
    fn stereo_averages_channels() {
        let data = vec![0.5f32, 1.0, -0.5, -1.0];
        let mono = mix_to_mono(&data, 2);
        assert_eq!(mono, vec![0.75, -0.75]);
    }

    #[test]
    fn resampler_accumulates_until_a_full_chunk() {
        let mut rs = StreamResampler::new(48000, 16000).unwrap();
        // Below CHUNK_SIZE: nothing out yet
        assert!(rs.push(&vec![0.0; 512]).is_none());
        // Crossing CHUNK_SIZE produces output at roughly 1/3 the rate
        let out = rs.push(&vec![0.0; 1024]).expect("chunk should flush");
        assert!(!out.is_empty());
    }
}
