// SPDX-License-Identifier: AGPL-3.0-or-later
// Part of ModalTorch — Licensed under AGPL-3.0-or-later.

//! Waveform framing and log-mel feature extraction.

use super::min_max_normalize;
use crate::error::{NnError, NnResult};
use mt_tensor::Tensor;

/// Turns a mono waveform into a fixed grid of log-mel band energies.
///
/// The waveform is cut into Hann-windowed frames, each frame goes through a
/// magnitude spectrum and a triangular mel filterbank, and the log energies
/// are min-max normalized. Short clips are padded with silent frames and
/// long clips truncated, so the output grid is always `frames x bands`.
#[derive(Debug, Clone)]
pub struct AudioPipeline {
    frames: usize,
    bands: usize,
    frame_len: usize,
    hop: usize,
    sample_rate: u32,
}

impl AudioPipeline {
    pub fn new(frames: usize, bands: usize) -> NnResult<Self> {
        if frames == 0 || bands == 0 {
            return Err(NnError::configuration(format!(
                "feature grid {frames}x{bands} must be non-zero"
            )));
        }
        Ok(Self {
            frames,
            bands,
            frame_len: 256,
            hop: 128,
            sample_rate: 22_050,
        })
    }

    /// Overrides the framing parameters.
    pub fn with_framing(mut self, frame_len: usize, hop: usize, sample_rate: u32) -> NnResult<Self> {
        if frame_len == 0 || hop == 0 || sample_rate == 0 {
            return Err(NnError::configuration(
                "frame length, hop, and sample rate must be positive",
            ));
        }
        self.frame_len = frame_len;
        self.hop = hop;
        self.sample_rate = sample_rate;
        Ok(self)
    }

    pub fn output_shape(&self) -> Vec<usize> {
        vec![self.frames, self.bands]
    }

    /// Extracts the feature grid from a waveform captured at an arbitrary
    /// rate, linearly resampling it to the pipeline's rate first.
    pub fn compute_resampled(&self, samples: &[f32], source_rate: u32) -> NnResult<Tensor> {
        if source_rate == 0 {
            return Err(NnError::configuration("source sample rate must be positive"));
        }
        if source_rate == self.sample_rate || samples.is_empty() {
            return self.compute(samples);
        }
        let ratio = source_rate as f32 / self.sample_rate as f32;
        let out_len = ((samples.len() as f32 / ratio).round() as usize).max(1);
        let mut resampled = Vec::with_capacity(out_len);
        for i in 0..out_len {
            let position = i as f32 * ratio;
            let left = (position.floor() as usize).min(samples.len() - 1);
            let right = (left + 1).min(samples.len() - 1);
            let frac = position - left as f32;
            resampled.push(samples[left] * (1.0 - frac) + samples[right] * frac);
        }
        self.compute(&resampled)
    }

    /// Extracts the normalized feature grid from a mono waveform already at
    /// the pipeline's sample rate.
    pub fn compute(&self, samples: &[f32]) -> NnResult<Tensor> {
        if samples.is_empty() {
            return Err(NnError::conversion("waveform is empty"));
        }
        if samples.iter().any(|value| !value.is_finite()) {
            return Err(NnError::conversion("waveform contains non-finite samples"));
        }
        let filterbank = self.mel_filterbank();
        let mut features = vec![0.0f32; self.frames * self.bands];
        for frame_idx in 0..self.frames {
            let start = frame_idx * self.hop;
            if start >= samples.len() {
                // Remaining frames stay silent; log(floor) for every band.
                for band in 0..self.bands {
                    features[frame_idx * self.bands + band] = 1e-10f32.ln();
                }
                continue;
            }
            let spectrum = self.power_spectrum(&samples[start..]);
            for (band, filter) in filterbank.iter().enumerate() {
                let mut energy = 0.0f32;
                for (bin, weight) in filter {
                    energy += spectrum[*bin] * weight;
                }
                features[frame_idx * self.bands + band] = energy.max(1e-10).ln();
            }
        }
        min_max_normalize(&mut features);
        Ok(Tensor::from_vec(1, self.frames * self.bands, features)?)
    }

    fn power_spectrum(&self, samples: &[f32]) -> Vec<f32> {
        let n = self.frame_len;
        let mut windowed = vec![0.0f32; n];
        let count = samples.len().min(n);
        for i in 0..count {
            let hann =
                0.5 - 0.5 * (std::f32::consts::TAU * i as f32 / (n - 1) as f32).cos();
            windowed[i] = samples[i] * hann;
        }
        let bins = n / 2 + 1;
        let mut spectrum = vec![0.0f32; bins];
        for bin in 0..bins {
            let mut real = 0.0f32;
            let mut imag = 0.0f32;
            for (i, &value) in windowed.iter().enumerate() {
                let angle = std::f32::consts::TAU * bin as f32 * i as f32 / n as f32;
                real += value * angle.cos();
                imag -= value * angle.sin();
            }
            spectrum[bin] = (real * real + imag * imag) / n as f32;
        }
        spectrum
    }

    /// Triangular filters spaced evenly on the mel scale, as `(bin, weight)`
    /// pairs over the non-zero support of each filter.
    fn mel_filterbank(&self) -> Vec<Vec<(usize, f32)>> {
        fn hz_to_mel(hz: f32) -> f32 {
            2595.0 * (1.0 + hz / 700.0).log10()
        }
        fn mel_to_hz(mel: f32) -> f32 {
            700.0 * (10.0f32.powf(mel / 2595.0) - 1.0)
        }
        let bins = self.frame_len / 2 + 1;
        let nyquist = self.sample_rate as f32 / 2.0;
        let mel_max = hz_to_mel(nyquist);
        let edges: Vec<f32> = (0..self.bands + 2)
            .map(|i| {
                let hz = mel_to_hz(mel_max * i as f32 / (self.bands + 1) as f32);
                hz / nyquist * (bins - 1) as f32
            })
            .collect();
        let mut filters = Vec::with_capacity(self.bands);
        for band in 0..self.bands {
            let (left, center, right) = (edges[band], edges[band + 1], edges[band + 2]);
            let mut filter = Vec::new();
            for bin in left.floor() as usize..=(right.ceil() as usize).min(bins - 1) {
                let position = bin as f32;
                let weight = if position < center {
                    (position - left) / (center - left).max(f32::EPSILON)
                } else {
                    (right - position) / (right - center).max(f32::EPSILON)
                };
                if weight > 0.0 {
                    filter.push((bin, weight));
                }
            }
            filters.push(filter);
        }
        filters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (std::f32::consts::TAU * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn features_have_fixed_grid_shape() {
        let pipeline = AudioPipeline::new(10, 8).unwrap();
        let wave = tone(440.0, 22_050.0, 4000);
        let features = pipeline.compute(&wave).unwrap();
        assert_eq!(features.shape(), (1, 80));
        for value in features.data() {
            assert!(*value >= 0.0 && *value <= 1.0);
        }
    }

    #[test]
    fn short_clips_are_padded() {
        let pipeline = AudioPipeline::new(10, 8).unwrap();
        let wave = tone(440.0, 22_050.0, 300);
        let features = pipeline.compute(&wave).unwrap();
        assert_eq!(features.shape(), (1, 80));
    }

    #[test]
    fn louder_band_carries_more_energy() {
        let pipeline = AudioPipeline::new(4, 8).unwrap();
        let low = tone(200.0, 22_050.0, 2000);
        let high = tone(5000.0, 22_050.0, 2000);
        let low_features = pipeline.compute(&low).unwrap();
        let high_features = pipeline.compute(&high).unwrap();
        // Peaks land in different mel bands for well-separated tones.
        let argmax = |t: &Tensor| {
            t.data()[..8]
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                .unwrap()
        };
        assert!(argmax(&low_features) < argmax(&high_features));
    }

    #[test]
    fn resampling_preserves_the_dominant_band() {
        let pipeline = AudioPipeline::new(4, 8).unwrap();
        let native = pipeline.compute(&tone(440.0, 22_050.0, 2000)).unwrap();
        let resampled = pipeline
            .compute_resampled(&tone(440.0, 44_100.0, 4000), 44_100)
            .unwrap();
        assert_eq!(resampled.shape(), native.shape());
        let argmax = |t: &Tensor| {
            t.data()[..8]
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                .unwrap()
        };
        assert_eq!(argmax(&native), argmax(&resampled));
    }

    #[test]
    fn zero_source_rate_is_rejected() {
        let pipeline = AudioPipeline::new(4, 4).unwrap();
        assert!(matches!(
            pipeline.compute_resampled(&[0.1, 0.2], 0),
            Err(NnError::Configuration { .. })
        ));
    }

    #[test]
    fn empty_waveform_is_rejected() {
        let pipeline = AudioPipeline::new(4, 4).unwrap();
        assert!(matches!(
            pipeline.compute(&[]),
            Err(NnError::Conversion { .. })
        ));
    }
}
