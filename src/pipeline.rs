//! Pipeline assembly and lifecycle.
//!
//! [`Pipeline`] owns every stage: the window pool, the bounded queue, the
//! time-domain ring, the published spectral state, the acquisition front-end
//! and the transform workers. All cross-thread state lives behind this one
//! handle; two pipelines in one process do not share anything.
//!
//! # Lifecycle
//!
//! A pipeline is created stopped. [`Pipeline::start`] opens the queue and
//! spawns the workers; [`Pipeline::stop`] closes the queue, joins every
//! worker, reclaims queued windows and abandons the partial window so the
//! pool is full again. Both are idempotent. Mode switches are only legal
//! while stopped; [`Pipeline::set_mode`] re-derives the decimation factor,
//! resizes the ring and zeroes the published spectrum.

use crate::acquire::{AcquireCounters, FrontEnd};
use crate::config::{Mode, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::pool::WindowPool;
use crate::queue::WindowQueue;
use crate::ring::TimeRing;
use crate::source::StreamControl;
use crate::spectrum::{SpectralState, SpectrumReader, SpectrumSnapshot};
use crate::transform::WorkerPool;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Point-in-time counters for logging or a stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    /// Active bandwidth mode.
    pub mode: Mode,
    /// Whether workers are currently running.
    pub running: bool,
    /// Raw samples delivered by the device.
    pub samples_in: u64,
    /// Samples surviving decimation.
    pub samples_kept: u64,
    /// Windows handed to the transform queue.
    pub windows_enqueued: u64,
    /// Windows dropped under saturation.
    pub windows_dropped: u64,
    /// Device-reported loss events.
    pub data_loss_events: u64,
    /// Defensive assembly recoveries.
    pub overrun_recoveries: u64,
    /// Ring writes skipped because a reader held the lock.
    pub ring_skipped_writes: u64,
    /// Windows sitting in the queue right now.
    pub queue_depth: usize,
    /// Free pool slots right now.
    pub pool_available: usize,
    /// Spectra published since creation.
    pub spectra_published: u64,
    /// Whether the envelope stage is applied to completed windows.
    pub envelope_enabled: bool,
    /// Long-term envelope level estimate.
    pub envelope_average: f64,
}

/// A complete acquisition/transform pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    mode: Mutex<Mode>,
    front_end: Mutex<FrontEnd>,
    pool: Arc<WindowPool>,
    queue: Arc<WindowQueue>,
    ring: Arc<TimeRing>,
    state: Arc<SpectralState>,
    counters: Arc<AcquireCounters>,
    workers: Mutex<Option<WorkerPool>>,
    running: AtomicBool,
}

impl Pipeline {
    /// Build a stopped pipeline from a validated configuration.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let mode = config.mode;

        // The pool and queue share one capacity: every slot can be in
        // flight at once, and a free slot implies a free queue position.
        let pool = Arc::new(WindowPool::new(config.queue_capacity, config.window_size));
        let queue = Arc::new(WindowQueue::new(config.queue_capacity));
        let ring = Arc::new(TimeRing::new(config.ring_len(mode)));
        let state = Arc::new(SpectralState::new(config.fft_bins()));
        let counters = Arc::new(AcquireCounters::default());
        let front_end = FrontEnd::new(
            &config,
            mode,
            Arc::clone(&pool),
            Arc::clone(&queue),
            Arc::clone(&ring),
            Arc::clone(&counters),
        );

        info!(
            window_size = config.window_size,
            queue_capacity = config.queue_capacity,
            workers = config.workers,
            mode = mode.label(),
            ring_len = ring.len(),
            "pipeline created"
        );
        Ok(Self {
            config,
            mode: Mutex::new(mode),
            front_end: Mutex::new(front_end),
            pool,
            queue,
            ring,
            state,
            counters,
            workers: Mutex::new(None),
            running: AtomicBool::new(false),
        })
    }

    /// Open the queue and spawn the transform workers.
    ///
    /// A no-op (with a warning) if the pipeline is already running.
    pub fn start(&self) -> Result<()> {
        let mut workers = self.workers.lock();
        if workers.is_some() {
            warn!("pipeline already running, start ignored");
            return Ok(());
        }
        let mode = *self.mode.lock();
        self.queue.reopen();
        *workers = Some(WorkerPool::spawn(
            &self.config,
            mode,
            Arc::clone(&self.queue),
            Arc::clone(&self.state),
        )?);
        self.running.store(true, Ordering::SeqCst);
        info!(mode = mode.label(), "pipeline started");
        Ok(())
    }

    /// Stop the stream: close the queue, join workers, reclaim windows.
    ///
    /// After this returns every pool slot is free again and the published
    /// spectrum holds the last completed window. A no-op (with a warning)
    /// if the pipeline is not running.
    pub fn stop(&self) {
        let mut workers = self.workers.lock();
        let Some(active) = workers.take() else {
            warn!("pipeline not running, stop ignored");
            return;
        };
        // Stop accepting chunks first so nothing races the close.
        self.running.store(false, Ordering::SeqCst);
        active.join();

        // Workers exit without draining; queued windows come back here.
        let leftovers = self.queue.drain();
        let reclaimed = leftovers.len();
        drop(leftovers);
        self.front_end.lock().reset_assembly();
        info!(reclaimed, "pipeline stopped");
    }

    /// Ingest one device chunk.
    ///
    /// Never blocks on downstream stages; returns [`StreamControl::Stop`]
    /// once the pipeline has been stopped so the delivery loop can exit.
    pub fn consume(&self, samples: &[u16], data_loss: bool) -> StreamControl {
        if !self.running.load(Ordering::SeqCst) {
            return StreamControl::Stop;
        }
        self.front_end.lock().consume(samples, data_loss);
        StreamControl::Continue
    }

    /// Switch bandwidth mode. The stream must be stopped first.
    ///
    /// Re-derives the decimation factor, resizes the time ring (keeping the
    /// old buffer if the new one cannot be allocated) and zeroes the
    /// published magnitudes without advancing the generation.
    pub fn set_mode(&self, mode: Mode) -> Result<()> {
        let workers = self.workers.lock();
        if workers.is_some() {
            return Err(PipelineError::stream_active(
                "stop the stream before switching modes",
            ));
        }
        let mut current = self.mode.lock();
        if *current == mode {
            debug!(mode = mode.label(), "mode unchanged");
            return Ok(());
        }
        *current = mode;

        let downsample = self.config.downsample_factor(mode);
        self.front_end.lock().set_downsample_factor(downsample);
        if let Err(err) = self.ring.resize(self.config.ring_len(mode)) {
            warn!(error = %err, "ring resize failed, keeping previous history buffer");
        }
        self.state.reset(self.config.fft_bins());
        info!(mode = mode.label(), downsample, "mode switched");
        Ok(())
    }

    /// Active bandwidth mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        *self.mode.lock()
    }

    /// Whether workers are running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Enable or disable envelope normalization of completed windows.
    pub fn set_envelope_enabled(&self, enabled: bool) {
        self.front_end.lock().set_envelope_enabled(enabled);
        debug!(enabled, "envelope stage toggled");
    }

    /// Whether the envelope stage is enabled.
    #[must_use]
    pub fn envelope_enabled(&self) -> bool {
        self.front_end.lock().envelope_enabled()
    }

    /// A freshness-tracking consumer of the published spectrum.
    #[must_use]
    pub fn spectrum_reader(&self) -> SpectrumReader {
        self.state.reader()
    }

    /// Copy of the current published spectrum, fresh or not.
    #[must_use]
    pub fn latest_spectrum(&self) -> SpectrumSnapshot {
        self.state.latest()
    }

    /// Copy the most recent time-domain history into `dst`, oldest first.
    ///
    /// Returns how many samples were written.
    pub fn time_history_into(&self, dst: &mut [u16]) -> usize {
        self.ring.read_into(dst)
    }

    /// Samples currently held in the time ring.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.ring.sample_count()
    }

    /// The configuration this pipeline was built from.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Snapshot every counter for logging or serialization.
    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        let (envelope_enabled, envelope_average) = {
            let fe = self.front_end.lock();
            (fe.envelope_enabled(), fe.envelope_average())
        };
        PipelineStats {
            mode: self.mode(),
            running: self.is_running(),
            samples_in: self.counters.samples_in(),
            samples_kept: self.counters.samples_kept(),
            windows_enqueued: self.counters.windows_enqueued(),
            windows_dropped: self.counters.windows_dropped(),
            data_loss_events: self.counters.data_loss_events(),
            overrun_recoveries: self.counters.overrun_recoveries(),
            ring_skipped_writes: self.ring.skipped_writes(),
            queue_depth: self.queue.len(),
            pool_available: self.pool.available(),
            spectra_published: self.state.generation(),
            envelope_enabled,
            envelope_average,
        }
    }
}
