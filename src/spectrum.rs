//! Published spectral results.
//!
//! Workers finish windows out of order, and every finished window overwrites
//! the whole published record under one lock: magnitudes, peak bin, peak
//! magnitude and peak frequency always describe the same window. A monotonic
//! generation counter replaces the usual "fresh" flag so any number of
//! consumers can each track what they have already seen without stealing
//! freshness from one another.

use parking_lot::Mutex;
use std::sync::Arc;

/// One published result, copied out wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumSnapshot {
    /// Magnitudes for bins `0..=W/2`.
    pub magnitudes: Vec<f64>,
    /// Bin index of the scanned peak.
    pub peak_bin: usize,
    /// Magnitude at the peak bin.
    pub peak_magnitude: f64,
    /// Peak frequency in display units (MHz or kHz depending on mode).
    pub peak_frequency: f64,
    /// Publication counter, bumped once per published window.
    pub generation: u64,
}

#[derive(Debug)]
struct SpectralInner {
    magnitudes: Vec<f64>,
    peak_bin: usize,
    peak_magnitude: f64,
    peak_frequency: f64,
    generation: u64,
}

/// Latest-window spectral state shared between workers and consumers.
#[derive(Debug)]
pub struct SpectralState {
    inner: Mutex<SpectralInner>,
}

impl SpectralState {
    /// Create state sized for `fft_bins` magnitude bins, generation zero.
    #[must_use]
    pub fn new(fft_bins: usize) -> Self {
        Self {
            inner: Mutex::new(SpectralInner {
                magnitudes: vec![0.0; fft_bins],
                peak_bin: 0,
                peak_magnitude: 0.0,
                peak_frequency: 0.0,
                generation: 0,
            }),
        }
    }

    /// Overwrite the published record with a newly transformed window.
    ///
    /// All fields are replaced together and the generation is bumped once.
    pub fn publish(
        &self,
        magnitudes: &[f64],
        peak_bin: usize,
        peak_magnitude: f64,
        peak_frequency: f64,
    ) {
        let mut inner = self.inner.lock();
        inner.magnitudes.clear();
        inner.magnitudes.extend_from_slice(magnitudes);
        inner.peak_bin = peak_bin;
        inner.peak_magnitude = peak_magnitude;
        inner.peak_frequency = peak_frequency;
        inner.generation += 1;
    }

    /// Zero the magnitudes and peak fields for a new bin count.
    ///
    /// Used when the mode switch changes the spectral axis. The generation is
    /// left alone: zeroed placeholders are not a new result, and consumers
    /// keep waiting for the first real window of the new mode.
    pub fn reset(&self, fft_bins: usize) {
        let mut inner = self.inner.lock();
        inner.magnitudes.clear();
        inner.magnitudes.resize(fft_bins, 0.0);
        inner.peak_bin = 0;
        inner.peak_magnitude = 0.0;
        inner.peak_frequency = 0.0;
    }

    /// Copy of the current record, fresh or not.
    #[must_use]
    pub fn latest(&self) -> SpectrumSnapshot {
        let inner = self.inner.lock();
        SpectrumSnapshot {
            magnitudes: inner.magnitudes.clone(),
            peak_bin: inner.peak_bin,
            peak_magnitude: inner.peak_magnitude,
            peak_frequency: inner.peak_frequency,
            generation: inner.generation,
        }
    }

    /// Number of published windows so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// A consumer handle with its own freshness cursor.
    #[must_use]
    pub fn reader(self: &Arc<Self>) -> SpectrumReader {
        SpectrumReader {
            state: Arc::clone(self),
            seen: 0,
        }
    }
}

/// Per-consumer view of [`SpectralState`].
///
/// Each reader remembers the last generation it consumed, so several readers
/// polling the same state each see every published window exactly once.
#[derive(Debug)]
pub struct SpectrumReader {
    state: Arc<SpectralState>,
    seen: u64,
}

impl SpectrumReader {
    /// Copy the magnitudes into `dst` if a window newer than the last call
    /// has been published.
    ///
    /// Returns `false` and leaves `dst` untouched when nothing new arrived.
    /// `dst` must hold at least `fft_bins` values; extra tail is untouched.
    pub fn magnitudes_into(&mut self, dst: &mut [f64]) -> bool {
        let inner = self.state.inner.lock();
        if inner.generation == self.seen {
            return false;
        }
        self.seen = inner.generation;
        let n = inner.magnitudes.len().min(dst.len());
        dst[..n].copy_from_slice(&inner.magnitudes[..n]);
        true
    }

    /// Snapshot the full record if it is newer than the last call.
    pub fn snapshot(&mut self) -> Option<SpectrumSnapshot> {
        let inner = self.state.inner.lock();
        if inner.generation == self.seen {
            return None;
        }
        self.seen = inner.generation;
        Some(SpectrumSnapshot {
            magnitudes: inner.magnitudes.clone(),
            peak_bin: inner.peak_bin,
            peak_magnitude: inner.peak_magnitude,
            peak_frequency: inner.peak_frequency,
            generation: inner.generation,
        })
    }

    /// True if a window newer than the last consumed one is available.
    #[must_use]
    pub fn has_fresh(&self) -> bool {
        self.state.inner.lock().generation != self.seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_bumps_generation_and_overwrites() {
        let state = Arc::new(SpectralState::new(4));
        assert_eq!(state.generation(), 0);

        state.publish(&[1.0, 2.0, 3.0, 2.0], 2, 3.0, 37.5);
        let snap = state.latest();
        assert_eq!(snap.generation, 1);
        assert_eq!(snap.magnitudes, vec![1.0, 2.0, 3.0, 2.0]);
        assert_eq!(snap.peak_bin, 2);
        assert_eq!(snap.peak_magnitude, 3.0);
        assert_eq!(snap.peak_frequency, 37.5);

        state.publish(&[9.0, 0.0, 0.0, 0.0], 0, 9.0, 0.0);
        let snap = state.latest();
        assert_eq!(snap.generation, 2);
        assert_eq!(snap.magnitudes, vec![9.0, 0.0, 0.0, 0.0]);
        assert_eq!(snap.peak_bin, 0);
    }

    #[test]
    fn test_reader_sees_each_generation_once() {
        let state = Arc::new(SpectralState::new(3));
        let mut reader = state.reader();
        let mut buf = vec![0.0; 3];

        assert!(!reader.has_fresh());
        assert!(!reader.magnitudes_into(&mut buf));
        assert_eq!(buf, vec![0.0; 3], "stale read must not touch dst");

        state.publish(&[4.0, 5.0, 6.0], 2, 6.0, 1.0);
        assert!(reader.has_fresh());
        assert!(reader.magnitudes_into(&mut buf));
        assert_eq!(buf, vec![4.0, 5.0, 6.0]);

        // Same generation again: stale.
        assert!(!reader.magnitudes_into(&mut buf));
    }

    #[test]
    fn test_readers_have_independent_cursors() {
        let state = Arc::new(SpectralState::new(2));
        let mut a = state.reader();
        let mut b = state.reader();
        let mut buf = vec![0.0; 2];

        state.publish(&[1.0, 2.0], 1, 2.0, 0.5);
        assert!(a.magnitudes_into(&mut buf));
        // `a` consuming the window must not mark it stale for `b`.
        assert!(b.magnitudes_into(&mut buf));
        assert!(!a.magnitudes_into(&mut buf));
        assert!(!b.magnitudes_into(&mut buf));
    }

    #[test]
    fn test_reader_skips_to_newest_generation() {
        let state = Arc::new(SpectralState::new(1));
        let mut reader = state.reader();

        state.publish(&[1.0], 0, 1.0, 0.0);
        state.publish(&[2.0], 0, 2.0, 0.0);
        state.publish(&[3.0], 0, 3.0, 0.0);

        let snap = reader.snapshot();
        assert!(snap.is_some());
        let snap = snap.unwrap();
        assert_eq!(snap.generation, 3);
        assert_eq!(snap.magnitudes, vec![3.0]);
        assert!(reader.snapshot().is_none());
    }

    #[test]
    fn test_reset_resizes_without_new_generation() {
        let state = Arc::new(SpectralState::new(4));
        let mut reader = state.reader();
        let mut buf = vec![0.0; 8];

        state.publish(&[1.0, 1.0, 1.0, 1.0], 0, 1.0, 0.0);
        assert!(reader.magnitudes_into(&mut buf));

        state.reset(8);
        // Zeroed placeholders are not a fresh result.
        assert!(!reader.has_fresh());
        assert!(!reader.magnitudes_into(&mut buf));

        let snap = state.latest();
        assert_eq!(snap.magnitudes.len(), 8);
        assert!(snap.magnitudes.iter().all(|&m| m == 0.0));
        assert_eq!(snap.peak_magnitude, 0.0);
        assert_eq!(snap.generation, 1, "reset must not bump the generation");
    }
}
