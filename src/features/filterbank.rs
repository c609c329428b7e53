use super::{FeatureVector, FrameProcessor};
use crate::defaults::{FEATURE_DIM, FILTER_EDGES, WINDOW_SAMPLES};
use rustfft::{Fft, FftPlanner, num_complex::Complex32};
use std::f32::consts::PI;
use std::sync::Arc;

/// Log filterbank energies of a Hamming-windowed 256-point power spectrum.
///
/// Band `i` collects the power bins between `FILTER_EDGES[i]` and
/// `FILTER_EDGES[i + 1]`, edges at half weight (bin 0 at full weight), and
/// is compressed with `log2(x + 1)`. With mean subtraction enabled the
/// per-channel mean of the recording setup is removed afterwards.
///
/// All scratch buffers are allocated in `new`.
pub struct FilterbankExtractor {
    fft: Arc<dyn Fft<f32>>,
    fft_buf: Vec<Complex32>,
    hamming: Vec<f32>,
    power: Vec<f32>,
    channel_mean: FeatureVector,
    mean_subtraction: bool,
}

impl FilterbankExtractor {
    pub fn new(channel_mean: FeatureVector, mean_subtraction: bool) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(WINDOW_SAMPLES);
        Self {
            fft,
            fft_buf: vec![Complex32::new(0.0, 0.0); WINDOW_SAMPLES],
            hamming: hamming_window(WINDOW_SAMPLES),
            power: vec![0.0; WINDOW_SAMPLES / 2],
            channel_mean,
            mean_subtraction,
        }
    }

    /// Extractor without channel-mean correction.
    pub fn plain() -> Self {
        Self::new([0.0; FEATURE_DIM], false)
    }

    fn power_spectrum(&mut self, window: &[i16]) {
        for (i, dst) in self.fft_buf.iter_mut().enumerate() {
            let sample = window.get(i).copied().unwrap_or(0) as f32;
            *dst = Complex32::new(sample * self.hamming[i], 0.0);
        }
        self.fft.process(&mut self.fft_buf);

        for (p, c) in self.power.iter_mut().zip(&self.fft_buf) {
            *p = c.norm_sqr();
        }
    }
}

impl FrameProcessor for FilterbankExtractor {
    fn window_len(&self) -> usize {
        WINDOW_SAMPLES
    }

    fn process(&mut self, window: &[i16]) -> FeatureVector {
        self.power_spectrum(window);

        let mut features = [0.0f32; FEATURE_DIM];
        for (i, value) in features.iter_mut().enumerate() {
            let from = FILTER_EDGES[i];
            let to = FILTER_EDGES[i + 1];

            let mut energy = if from == 0 {
                self.power[0]
            } else {
                self.power[from] / 2.0
            };
            energy += self.power[to] / 2.0;
            energy += self.power[from + 1..to].iter().sum::<f32>();

            *value = (energy + 1.0).log2();
            if self.mean_subtraction {
                *value -= self.channel_mean[i];
            }
        }
        features
    }
}

/// `0.54 - 0.46 cos(2πi / (n - 1))`
pub fn hamming_window(n: usize) -> Vec<f32> {
    if n < 2 {
        return vec![1.0; n];
    }
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f32 / (n - 1) as f32).cos())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq_hz: f32, amplitude: f32) -> Vec<i16> {
        (0..WINDOW_SAMPLES)
            .map(|i| {
                let t = i as f32 / crate::defaults::SAMPLE_RATE as f32;
                (amplitude * (2.0 * PI * freq_hz * t).sin()) as i16
            })
            .collect()
    }

    #[test]
    fn test_hamming_window_shape() {
        let w = hamming_window(WINDOW_SAMPLES);
        assert_eq!(w.len(), WINDOW_SAMPLES);
        assert!((w[0] - 0.08).abs() < 1e-6);
        assert!((w[WINDOW_SAMPLES - 1] - 0.08).abs() < 1e-5);
        // symmetric
        for i in 0..WINDOW_SAMPLES / 2 {
            assert!((w[i] - w[WINDOW_SAMPLES - 1 - i]).abs() < 1e-5);
        }
    }

    #[test]
    fn test_silence_gives_zero_features() {
        let mut extractor = FilterbankExtractor::plain();
        let features = extractor.process(&[0i16; WINDOW_SAMPLES]);
        assert!(features.iter().all(|&f| f == 0.0));
    }

    #[test]
    fn test_filter_edges_cover_power_spectrum() {
        assert_eq!(FILTER_EDGES[0], 0);
        assert!(FILTER_EDGES.windows(2).all(|w| w[0] < w[1]));
        assert!(FILTER_EDGES[FEATURE_DIM] < WINDOW_SAMPLES / 2);
    }

    #[test]
    fn test_tone_energy_lands_in_matching_band() {
        // 1000 Hz at 16kHz / 256 points = bin 16, inside band 4 (14..18)
        let mut extractor = FilterbankExtractor::plain();
        let features = extractor.process(&sine(1000.0, 8000.0));

        let loudest = features
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(loudest, Some(4));
    }

    #[test]
    fn test_louder_input_raises_tone_band() {
        let mut extractor = FilterbankExtractor::plain();
        let quiet = extractor.process(&sine(1000.0, 1000.0));
        let loud = extractor.process(&sine(1000.0, 16000.0));
        // 16x amplitude is 256x power, 8 octaves in log2
        assert!((loud[4] - quiet[4] - 8.0).abs() < 0.1);
    }

    #[test]
    fn test_channel_mean_is_subtracted() {
        let window = sine(440.0, 5000.0);
        let mut mean = [0.0; FEATURE_DIM];
        mean[3] = 2.5;

        let plain = FilterbankExtractor::plain().process(&window);
        let corrected = FilterbankExtractor::new(mean, true).process(&window);
        let disabled = FilterbankExtractor::new(mean, false).process(&window);

        assert!((plain[3] - 2.5 - corrected[3]).abs() < 1e-5);
        assert_eq!(plain[0], corrected[0]);
        assert_eq!(plain, disabled);
    }

    #[test]
    fn test_short_window_is_zero_padded() {
        let mut extractor = FilterbankExtractor::plain();
        let features = extractor.process(&[100i16; 10]);
        assert!(features.iter().all(|f| f.is_finite()));
    }
}
