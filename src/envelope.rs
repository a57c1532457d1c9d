//! Envelope normalizer (analytic-signal AGC).
//!
//! Flattens slow amplitude drift out of a window before it is transformed.
//! The instantaneous envelope comes from the discrete analytic signal:
//! forward FFT, zero the negative-frequency bins, double the positive ones
//! (DC stays at unit gain, and so does the Nyquist bin when the window length
//! is even), inverse FFT, take the complex magnitude. A per-sample
//! exponentially weighted average of that envelope tracks the long-term
//! level, and each sample is divided by `max(average, floor)`.
//!
//! The running average is pipeline state: it persists across windows and
//! across toggling the stage on/off (frozen while off, never reset). Because
//! the division happens in the same buffer that is transformed afterwards, an
//! enabled normalizer intentionally reshapes the spectrum.

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Fraction of the old average retained per sample.
pub const DEFAULT_DECAY: f64 = 0.999;
/// Lower bound on the divisor, so a quiet stretch cannot blow samples up.
pub const DEFAULT_FLOOR: f64 = 1.0;

/// Analytic-signal amplitude normalizer with persistent FFT plans.
pub struct EnvelopeNormalizer {
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    /// In-place transform work buffer, length W
    spectrum: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
    /// Instantaneous envelope of the current window
    envelope: Vec<f64>,
    window_len: usize,
    running_avg: f64,
    decay: f64,
    floor: f64,
}

impl EnvelopeNormalizer {
    /// Create a normalizer for windows of `window_len` samples.
    ///
    /// Both plans are created here and reused for every window.
    #[must_use]
    pub fn new(window_len: usize) -> Self {
        Self::with_params(window_len, DEFAULT_DECAY, DEFAULT_FLOOR)
    }

    /// Create a normalizer with explicit decay and floor.
    #[must_use]
    pub fn with_params(window_len: usize, decay: f64, floor: f64) -> Self {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(window_len);
        let inverse = planner.plan_fft_inverse(window_len);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());

        Self {
            forward,
            inverse,
            spectrum: vec![Complex::new(0.0, 0.0); window_len],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            envelope: vec![0.0; window_len],
            window_len,
            running_avg: 0.0,
            decay,
            floor,
        }
    }

    /// Window length this normalizer was planned for.
    #[must_use]
    pub fn window_len(&self) -> usize {
        self.window_len
    }

    /// Current long-term level estimate.
    #[must_use]
    pub fn running_average(&self) -> f64 {
        self.running_avg
    }

    /// Normalize a window in place.
    ///
    /// Updates the running average from the window's envelope, then divides
    /// every sample by `max(average, floor)`.
    pub fn normalize(&mut self, samples: &mut [f64]) {
        debug_assert_eq!(samples.len(), self.window_len);

        self.compute_envelope(samples);
        for (sample, env) in samples.iter_mut().zip(&self.envelope) {
            self.running_avg = self.decay * self.running_avg + (1.0 - self.decay) * env;
            *sample /= self.running_avg.max(self.floor);
        }
    }

    /// Fill `self.envelope` with the analytic-signal magnitude of `samples`.
    fn compute_envelope(&mut self, samples: &[f64]) {
        let w = self.window_len;
        for (bin, &sample) in self.spectrum.iter_mut().zip(samples) {
            *bin = Complex::new(sample, 0.0);
        }
        self.forward
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);

        // Analytic signal: keep DC, double the positive frequencies, zero the
        // negatives. An even-length window has a Nyquist bin at W/2 which
        // stays at unit gain.
        for bin in &mut self.spectrum[1..(w + 1) / 2] {
            *bin *= 2.0;
        }
        for bin in &mut self.spectrum[w / 2 + 1..] {
            *bin = Complex::new(0.0, 0.0);
        }

        self.inverse
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);

        let scale = 1.0 / w as f64;
        for (env, bin) in self.envelope.iter_mut().zip(&self.spectrum) {
            *env = bin.norm() * scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine_window(len: usize, cycles: usize, amplitude: f64) -> Vec<f64> {
        (0..len)
            .map(|n| amplitude * (2.0 * PI * cycles as f64 * n as f64 / len as f64).sin())
            .collect()
    }

    #[test]
    fn test_envelope_of_pure_tone_is_flat() {
        let mut agc = EnvelopeNormalizer::new(256);
        let samples = sine_window(256, 8, 3.0);

        agc.compute_envelope(&samples);
        for &env in &agc.envelope {
            assert!((env - 3.0).abs() < 1e-9, "envelope {} should be 3.0", env);
        }
    }

    #[test]
    fn test_envelope_odd_window_length() {
        // Odd lengths have no Nyquist bin; the parity branch must still give
        // a flat envelope for an integer-cycle tone.
        let mut agc = EnvelopeNormalizer::new(255);
        let samples = sine_window(255, 5, 2.0);

        agc.compute_envelope(&samples);
        for &env in &agc.envelope {
            assert!((env - 2.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_envelope_of_constant_window() {
        let mut agc = EnvelopeNormalizer::new(64);
        let samples = vec![5.0; 64];

        agc.compute_envelope(&samples);
        for &env in &agc.envelope {
            assert!((env - 5.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_floor_leaves_quiet_signal_untouched() {
        let mut agc = EnvelopeNormalizer::new(64);
        let mut samples = sine_window(64, 4, 0.01);
        let original = samples.clone();

        agc.normalize(&mut samples);
        // Average stays far below the floor of 1.0, so the divisor is 1.0.
        for (out, orig) in samples.iter().zip(&original) {
            assert!((out - orig).abs() < 1e-12);
        }
        assert!(agc.running_average() < 1.0);
    }

    #[test]
    fn test_running_average_adapts_and_persists() {
        let mut agc = EnvelopeNormalizer::new(128);

        let mut last_avg = 0.0;
        for _ in 0..10 {
            let mut samples = sine_window(128, 4, 100.0);
            agc.normalize(&mut samples);
            assert!(agc.running_average() > last_avg);
            last_avg = agc.running_average();
        }
        // 1280 samples of decay toward 100: well past the floor by now.
        assert!(last_avg > 1.0);

        // A loud history attenuates the next window.
        let mut samples = sine_window(128, 4, 100.0);
        agc.normalize(&mut samples);
        let peak = samples.iter().fold(0.0f64, |m, &s| m.max(s.abs()));
        assert!(peak < 100.0);
    }

    #[test]
    fn test_normalize_changes_transform_input_in_place() {
        let mut agc = EnvelopeNormalizer::with_params(64, 0.0, 1e-6);
        // decay 0 makes the average equal the instantaneous envelope, so a
        // tone collapses to roughly unit amplitude immediately.
        let mut samples = sine_window(64, 4, 50.0);
        agc.normalize(&mut samples);
        let peak = samples.iter().fold(0.0f64, |m, &s| m.max(s.abs()));
        assert!((peak - 1.0).abs() < 0.05, "peak was {}", peak);
    }
}
