//! Spectral transform stage: worker threads draining the window queue.
//!
//! Each worker owns its complex buffer, FFT scratch and magnitude buffer for
//! its whole lifetime; the FFT plan itself is shared, planned once per pool.
//! Workers block on [`WindowQueue::pop_wait`], transform, publish to the
//! shared [`SpectralState`] and return the window's storage to the pool by
//! dropping it. A closed queue wakes every worker with `None` and the thread
//! exits without draining leftovers; shutdown reclaims those.

use crate::config::{Mode, PipelineConfig};
use crate::error::Result;
use crate::queue::WindowQueue;
use crate::spectrum::SpectralState;
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info};

/// Single-window spectral transform with persistent buffers.
///
/// Turns one time-domain window into one-sided magnitudes plus the scanned
/// peak. Reused across windows so the per-window cost is the FFT itself.
pub struct WindowTransform {
    fft: Arc<dyn Fft<f64>>,
    buffer: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
    magnitudes: Vec<f64>,
    scan: Range<usize>,
    window_len: usize,
    /// Hz per bin at the mode's analysis rate
    bin_hz: f64,
    /// Divisor from Hz to the display unit (1e6 for MHz, 1e3 for kHz)
    freq_scale: f64,
}

/// Peak found by one [`WindowTransform::process`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakReading {
    /// Bin index within the scan range.
    pub bin: usize,
    /// Magnitude at that bin.
    pub magnitude: f64,
    /// Bin center frequency in display units.
    pub frequency: f64,
}

impl WindowTransform {
    /// Plan a transform for `mode` using a shared plan.
    #[must_use]
    pub fn with_plan(config: &PipelineConfig, mode: Mode, fft: Arc<dyn Fft<f64>>) -> Self {
        let window_len = config.window_size;
        let scratch_len = fft.get_inplace_scratch_len();
        Self {
            fft,
            buffer: vec![Complex::new(0.0, 0.0); window_len],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            magnitudes: vec![0.0; config.fft_bins()],
            scan: config.peak_scan_range(),
            window_len,
            bin_hz: config.bin_resolution_hz(mode),
            freq_scale: config.frequency_scale(mode),
        }
    }

    /// Plan a transform for `mode` with its own plan.
    #[must_use]
    pub fn new(config: &PipelineConfig, mode: Mode) -> Self {
        let fft = FftPlanner::new().plan_fft_forward(config.window_size);
        Self::with_plan(config, mode, fft)
    }

    /// Transform one window and locate the peak in the scan range.
    pub fn process(&mut self, samples: &[f64]) -> PeakReading {
        debug_assert_eq!(samples.len(), self.window_len);

        for (bin, &sample) in self.buffer.iter_mut().zip(samples) {
            *bin = Complex::new(sample, 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        for (mag, bin) in self.magnitudes.iter_mut().zip(&self.buffer) {
            *mag = bin.norm();
        }

        let mut peak = PeakReading {
            bin: 0,
            magnitude: 0.0,
            frequency: 0.0,
        };
        if !self.scan.is_empty() {
            peak.bin = self.scan.start;
            peak.magnitude = self.magnitudes[self.scan.start];
            for bin in self.scan.clone().skip(1) {
                if self.magnitudes[bin] > peak.magnitude {
                    peak.bin = bin;
                    peak.magnitude = self.magnitudes[bin];
                }
            }
        }
        peak.frequency = peak.bin as f64 * self.bin_hz / self.freq_scale;
        peak
    }

    /// One-sided magnitudes of the last processed window.
    #[must_use]
    pub fn magnitudes(&self) -> &[f64] {
        &self.magnitudes
    }
}

/// Threads consuming the window queue and publishing spectra.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    queue: Arc<WindowQueue>,
    windows_processed: Arc<AtomicU64>,
}

impl WorkerPool {
    /// Spawn `config.workers` named threads for `mode`.
    ///
    /// The FFT is planned once; workers share the plan and own their buffers.
    pub fn spawn(
        config: &PipelineConfig,
        mode: Mode,
        queue: Arc<WindowQueue>,
        state: Arc<SpectralState>,
    ) -> Result<Self> {
        let fft = FftPlanner::new().plan_fft_forward(config.window_size);
        let windows_processed = Arc::new(AtomicU64::new(0));
        let mut handles = Vec::with_capacity(config.workers);

        for index in 0..config.workers {
            let mut transform = WindowTransform::with_plan(config, mode, Arc::clone(&fft));
            let queue = Arc::clone(&queue);
            let state = Arc::clone(&state);
            let processed = Arc::clone(&windows_processed);

            let handle = std::thread::Builder::new()
                .name(format!("fft-worker-{index}"))
                .spawn(move || {
                    debug!(index, "transform worker started");
                    while let Some(window) = queue.pop_wait() {
                        let peak = transform.process(window.as_slice());
                        state.publish(
                            transform.magnitudes(),
                            peak.bin,
                            peak.magnitude,
                            peak.frequency,
                        );
                        processed.fetch_add(1, Ordering::Relaxed);
                        drop(window);
                    }
                    debug!(index, "transform worker exiting");
                })?;
            handles.push(handle);
        }

        info!(
            workers = handles.len(),
            window_size = config.window_size,
            mode = mode.label(),
            "transform workers spawned"
        );
        Ok(Self {
            handles,
            queue,
            windows_processed,
        })
    }

    /// Number of worker threads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// True when no workers were spawned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Windows transformed since spawn.
    #[must_use]
    pub fn windows_processed(&self) -> u64 {
        self.windows_processed.load(Ordering::Relaxed)
    }

    /// Close the queue and wait for every worker to exit.
    pub fn join(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        self.queue.close();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                error!("transform worker panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
