//! Acquisition front-end: the never-blocking producer side of the pipeline.
//!
//! [`FrontEnd::consume`] accepts raw ADC chunks from the device callback and
//! must return quickly no matter what the rest of the pipeline is doing. Per
//! chunk it:
//!
//! 1. decimates to the mode's analysis rate (keep every Nth sample, with the
//!    phase carried across chunk boundaries),
//! 2. forwards the kept raw samples to the time-domain ring,
//! 3. assembles kept samples into pooled windows with the configured overlap,
//! 4. hands each completed window to the transform queue, or drops it when
//!    the pool and queue are saturated.
//!
//! Saturation never blocks: a window that cannot be handed off is recycled in
//! place by sliding its overlap tail to the front, so the next completed
//! window is still a true sliding window over the samples that were kept.

use crate::config::{Mode, PipelineConfig};
use crate::envelope::EnvelopeNormalizer;
use crate::pool::WindowPool;
use crate::queue::WindowQueue;
use crate::ring::TimeRing;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Producer-side counters, shared with the pipeline for stats reporting.
#[derive(Debug, Default)]
pub struct AcquireCounters {
    samples_in: AtomicU64,
    samples_kept: AtomicU64,
    windows_enqueued: AtomicU64,
    windows_dropped: AtomicU64,
    overrun_recoveries: AtomicU64,
    data_loss_events: AtomicU64,
}

impl AcquireCounters {
    /// Raw samples delivered by the device.
    #[must_use]
    pub fn samples_in(&self) -> u64 {
        self.samples_in.load(Ordering::Relaxed)
    }

    /// Samples surviving decimation.
    #[must_use]
    pub fn samples_kept(&self) -> u64 {
        self.samples_kept.load(Ordering::Relaxed)
    }

    /// Windows handed to the transform queue.
    #[must_use]
    pub fn windows_enqueued(&self) -> u64 {
        self.windows_enqueued.load(Ordering::Relaxed)
    }

    /// Completed windows discarded because pool and queue were saturated.
    #[must_use]
    pub fn windows_dropped(&self) -> u64 {
        self.windows_dropped.load(Ordering::Relaxed)
    }

    /// Times the assembly offset was found past the window end.
    #[must_use]
    pub fn overrun_recoveries(&self) -> u64 {
        self.overrun_recoveries.load(Ordering::Relaxed)
    }

    /// Chunks the device flagged as preceded by sample loss.
    #[must_use]
    pub fn data_loss_events(&self) -> u64 {
        self.data_loss_events.load(Ordering::Relaxed)
    }
}

/// Stream assembly state owned by the acquisition thread.
///
/// Not internally synchronized; the pipeline wraps it in a mutex so mode
/// switches and the delivery thread cannot interleave.
pub struct FrontEnd {
    window_len: usize,
    hop: usize,
    overlap_len: usize,
    downsample: usize,
    envelope_enabled: bool,
    envelope: EnvelopeNormalizer,
    /// Decimation phase, 0 means the next sample is kept
    phase: usize,
    /// Fill offset into `current`
    offset: usize,
    current: Option<crate::pool::Window>,
    /// Kept raw samples for this chunk, written to the ring in one call
    ring_batch: Vec<u16>,
    pool: Arc<WindowPool>,
    queue: Arc<WindowQueue>,
    ring: Arc<TimeRing>,
    counters: Arc<AcquireCounters>,
}

impl FrontEnd {
    /// Build a front-end for `mode` over shared pipeline stages.
    #[must_use]
    pub fn new(
        config: &PipelineConfig,
        mode: Mode,
        pool: Arc<WindowPool>,
        queue: Arc<WindowQueue>,
        ring: Arc<TimeRing>,
        counters: Arc<AcquireCounters>,
    ) -> Self {
        Self {
            window_len: config.window_size,
            hop: config.hop(),
            overlap_len: config.overlap_len(),
            downsample: config.downsample_factor(mode),
            envelope_enabled: config.envelope_enabled,
            envelope: EnvelopeNormalizer::new(config.window_size),
            phase: 0,
            offset: 0,
            current: None,
            ring_batch: Vec::new(),
            pool,
            queue,
            ring,
            counters,
        }
    }

    /// Ingest one device chunk. Never blocks on downstream stages.
    ///
    /// `data_loss` is the device's flag that samples were lost before this
    /// chunk; it is counted and logged but the chunk is still processed.
    pub fn consume(&mut self, samples: &[u16], data_loss: bool) {
        self.counters
            .samples_in
            .fetch_add(samples.len() as u64, Ordering::Relaxed);
        if data_loss {
            let events = self.counters.data_loss_events.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(events, "device reported sample loss before this chunk");
        }

        self.ring_batch.clear();
        let mut skip_assembly = false;

        for &raw in samples {
            let keep = self.phase == 0;
            self.phase += 1;
            if self.phase == self.downsample {
                self.phase = 0;
            }
            if !keep {
                continue;
            }

            self.ring_batch.push(raw);
            if skip_assembly {
                continue;
            }

            if self.current.is_none() {
                match self.pool.try_acquire() {
                    Some(window) => {
                        self.offset = 0;
                        self.current = Some(window);
                    }
                    None => {
                        debug!("no pool window for assembly, skipping chunk remainder");
                        skip_assembly = true;
                        continue;
                    }
                }
            }

            if self.offset >= self.window_len {
                // Cannot be reached through this loop; recover like a
                // dropped window and give up on the rest of the chunk.
                self.counters.overrun_recoveries.fetch_add(1, Ordering::Relaxed);
                error!(
                    offset = self.offset,
                    window_len = self.window_len,
                    "window offset past end, resuming at overlap"
                );
                self.slide_current_tail();
                skip_assembly = true;
                continue;
            }

            if let Some(window) = self.current.as_mut() {
                window.as_mut_slice()[self.offset] = f64::from(raw);
                self.offset += 1;
                if self.offset == self.window_len {
                    self.finish_window();
                }
            }
        }

        self.counters
            .samples_kept
            .fetch_add(self.ring_batch.len() as u64, Ordering::Relaxed);
        if !self.ring_batch.is_empty() {
            self.ring.write(&self.ring_batch);
        }
    }

    /// Hand the full window downstream and start its overlapped successor.
    fn finish_window(&mut self) {
        let Some(mut full) = self.current.take() else {
            return;
        };

        if self.envelope_enabled {
            self.envelope.normalize(full.as_mut_slice());
        }

        let Some(mut next) = self.pool.try_acquire() else {
            // Every slot is in flight: drop this window, keep its tail.
            self.counters.windows_dropped.fetch_add(1, Ordering::Relaxed);
            debug!(slot = full.slot(), "window pool exhausted, dropping window");
            let samples = full.as_mut_slice();
            samples.copy_within(self.hop.., 0);
            self.offset = self.overlap_len;
            self.current = Some(full);
            return;
        };

        next.as_mut_slice()[..self.overlap_len].copy_from_slice(&full.as_slice()[self.hop..]);

        match self.queue.try_push(full) {
            Ok(()) => {
                self.counters.windows_enqueued.fetch_add(1, Ordering::Relaxed);
            }
            Err(rejected) => {
                // Queue full or closed: the seeded replacement already holds
                // the overlap tail, so the rejected window just goes back.
                self.counters.windows_dropped.fetch_add(1, Ordering::Relaxed);
                debug!(slot = rejected.slot(), "window queue rejected window, dropping");
                drop(rejected);
            }
        }
        self.current = Some(next);
        self.offset = self.overlap_len;
    }

    /// Slide the overlap tail of the current window to its front.
    fn slide_current_tail(&mut self) {
        if let Some(window) = self.current.as_mut() {
            window.as_mut_slice().copy_within(self.hop.., 0);
        }
        self.offset = self.overlap_len;
    }

    /// Drop the in-progress window and restart assembly from scratch.
    ///
    /// The envelope normalizer's running average is deliberately preserved.
    pub fn reset_assembly(&mut self) {
        self.current = None;
        self.offset = 0;
        self.phase = 0;
        self.ring_batch.clear();
    }

    /// Change the decimation factor, restarting assembly.
    pub fn set_downsample_factor(&mut self, downsample: usize) {
        self.downsample = downsample.max(1);
        self.reset_assembly();
    }

    /// Current decimation factor.
    #[must_use]
    pub fn downsample_factor(&self) -> usize {
        self.downsample
    }

    /// Enable or disable the envelope stage. The stage's running average is
    /// frozen while disabled, not cleared.
    pub fn set_envelope_enabled(&mut self, enabled: bool) {
        self.envelope_enabled = enabled;
    }

    /// Whether completed windows are envelope-normalized.
    #[must_use]
    pub fn envelope_enabled(&self) -> bool {
        self.envelope_enabled
    }

    /// Long-term envelope level estimate.
    #[must_use]
    pub fn envelope_average(&self) -> f64 {
        self.envelope.running_average()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    struct Rig {
        fe: FrontEnd,
        pool: Arc<WindowPool>,
        queue: Arc<WindowQueue>,
        ring: Arc<TimeRing>,
        counters: Arc<AcquireCounters>,
    }

    fn test_front_end(config: &PipelineConfig, pool_size: usize, ring_len: usize) -> Rig {
        let pool = Arc::new(WindowPool::new(pool_size, config.window_size));
        let queue = Arc::new(WindowQueue::new(config.queue_capacity));
        let ring = Arc::new(TimeRing::new(ring_len));
        let counters = Arc::new(AcquireCounters::default());
        let fe = FrontEnd::new(
            config,
            config.mode,
            Arc::clone(&pool),
            Arc::clone(&queue),
            Arc::clone(&ring),
            Arc::clone(&counters),
        );
        Rig {
            fe,
            pool,
            queue,
            ring,
            counters,
        }
    }

    fn small_config() -> PipelineConfig {
        PipelineConfig::builder()
            .window_size(16)
            .overlap(0.5)
            .queue_capacity(4)
            .workers(1)
            .build()
            .unwrap()
    }

    #[test]
    fn test_windows_overlap_by_configured_fraction() {
        let config = small_config();
        let mut rig = test_front_end(&config, 4, 64);

        let samples: Vec<u16> = (0..24).collect();
        rig.fe.consume(&samples, false);
        // 16 samples fill the first window; the next 8 complete the second.
        assert_eq!(rig.counters.windows_enqueued(), 2);
        assert_eq!(rig.counters.windows_dropped(), 0);

        let first = rig.queue.pop_wait().unwrap();
        let expected: Vec<f64> = (0..16).map(f64::from).collect();
        assert_eq!(first.as_slice(), expected.as_slice());

        let second = rig.queue.pop_wait().unwrap();
        let expected: Vec<f64> = (8..24).map(f64::from).collect();
        assert_eq!(second.as_slice(), expected.as_slice());
    }

    #[test]
    fn test_overlap_survives_chunk_boundaries() {
        let config = small_config();
        let mut rig = test_front_end(&config, 4, 64);

        // Same 24 samples as above, delivered in awkward chunk sizes.
        let samples: Vec<u16> = (0..24).collect();
        for chunk in samples.chunks(5) {
            rig.fe.consume(chunk, false);
        }
        assert_eq!(rig.counters.windows_enqueued(), 2);

        let first = rig.queue.pop_wait().unwrap();
        assert_eq!(first.as_slice()[0], 0.0);
        assert_eq!(first.as_slice()[15], 15.0);
        let second = rig.queue.pop_wait().unwrap();
        assert_eq!(second.as_slice()[0], 8.0);
        assert_eq!(second.as_slice()[15], 23.0);
    }

    #[test]
    fn test_downsample_phase_persists_across_chunks() {
        let config = PipelineConfig::builder()
            .window_size(16)
            .overlap(0.5)
            .queue_capacity(4)
            .workers(1)
            .mode(Mode::LowBandwidth)
            .hardware_rate_hz(8.0)
            .low_bandwidth_rate_hz(2.0)
            .time_window_secs(8.0)
            .build()
            .unwrap();
        assert_eq!(config.downsample_factor(Mode::LowBandwidth), 4);

        let mut rig = test_front_end(&config, 4, 16);

        // 12 samples in chunks of 6: keeps land at global indices 0, 4, 8.
        let samples: Vec<u16> = (100..112).collect();
        rig.fe.consume(&samples[..6], false);
        rig.fe.consume(&samples[6..], false);

        assert_eq!(rig.counters.samples_in(), 12);
        assert_eq!(rig.counters.samples_kept(), 3);

        let mut history = vec![0u16; 16];
        let n = rig.ring.read_into(&mut history);
        assert_eq!(&history[..n], &[100, 104, 108]);
    }

    #[test]
    fn test_saturation_drops_instead_of_blocking() {
        let config = PipelineConfig::builder()
            .window_size(16)
            .overlap(0.5)
            .queue_capacity(2)
            .workers(1)
            .build()
            .unwrap();
        // Two slots, no consumer: the second completed window finds the pool
        // empty (one window in queue, one in hand).
        let mut rig = test_front_end(&config, 2, 64);

        let samples: Vec<u16> = (0..64).collect();
        rig.fe.consume(&samples, false);

        assert_eq!(rig.counters.windows_enqueued(), 1);
        // Windows complete at sample 16 and then every 8 kept samples.
        assert_eq!(rig.counters.windows_dropped(), 6);
        assert_eq!(rig.queue.len(), 1);

        // The ring still saw every sample even while windows were dropping.
        assert_eq!(rig.counters.samples_kept(), 64);
    }

    #[test]
    fn test_dropped_window_tail_slides_to_front() {
        let config = PipelineConfig::builder()
            .window_size(16)
            .overlap(0.5)
            .queue_capacity(2)
            .workers(1)
            .build()
            .unwrap();
        let mut rig = test_front_end(&config, 2, 64);

        // Fill and enqueue the first window (0..16), then saturate so the
        // window covering 8..24 is dropped.
        let samples: Vec<u16> = (0..24).collect();
        rig.fe.consume(&samples, false);
        assert_eq!(rig.counters.windows_dropped(), 1);

        // Free a slot and finish the in-progress window. Its front must be
        // the dropped window's tail (16..24), not stale data.
        drop(rig.queue.pop_wait().unwrap());
        let more: Vec<u16> = (24..32).collect();
        rig.fe.consume(&more, false);
        assert_eq!(rig.counters.windows_enqueued(), 2);

        let window = rig.queue.pop_wait().unwrap();
        let expected: Vec<f64> = (16..32).map(f64::from).collect();
        assert_eq!(window.as_slice(), expected.as_slice());
    }

    #[test]
    #[traced_test]
    fn test_loss_flag_counts_and_warns() {
        let config = small_config();
        let mut rig = test_front_end(&config, 4, 64);

        rig.fe.consume(&[1, 2, 3], true);
        rig.fe.consume(&[], true);
        rig.fe.consume(&[4, 5], false);

        assert_eq!(rig.counters.data_loss_events(), 2);
        assert_eq!(rig.counters.samples_in(), 5);
        assert!(logs_contain("device reported sample loss"));
    }

    #[test]
    fn test_envelope_average_frozen_while_disabled() {
        let config = small_config();
        let mut rig = test_front_end(&config, 4, 64);
        assert!(!rig.fe.envelope_enabled());

        let loud = vec![40_000u16; 16];
        rig.fe.consume(&loud, false);
        drop(rig.queue.pop_wait().unwrap());
        assert_eq!(rig.fe.envelope_average(), 0.0);

        rig.fe.set_envelope_enabled(true);
        rig.fe.consume(&loud, false);
        drop(rig.queue.pop_wait().unwrap());
        let grown = rig.fe.envelope_average();
        assert!(grown > 0.0);

        rig.fe.set_envelope_enabled(false);
        rig.fe.consume(&loud, false);
        assert_eq!(rig.fe.envelope_average(), grown);
    }

    #[test]
    fn test_reset_assembly_returns_window_and_keeps_envelope_state() {
        let config = small_config();
        let mut rig = test_front_end(&config, 4, 64);
        rig.fe.set_envelope_enabled(true);

        let loud = vec![40_000u16; 20];
        rig.fe.consume(&loud, false);
        drop(rig.queue.pop_wait().unwrap());
        let avg = rig.fe.envelope_average();
        assert!(avg > 0.0);
        // One slot is mid-fill, three are free.
        assert_eq!(rig.pool.available(), 3);

        rig.fe.reset_assembly();
        assert_eq!(rig.pool.available(), 4);
        assert!(rig.fe.envelope_average() >= avg);
    }
}
