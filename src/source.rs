//! Sample sources and the delivery loop.
//!
//! The pipeline itself is pull-agnostic: anything that can hand it `u16`
//! chunks through [`Pipeline::consume`] works. [`DeviceSource`] is the
//! blocking-driver shape of that contract (open, run a delivery loop,
//! close), [`SimulatedDevice`] is a deterministic software implementation of
//! it, and [`DeviceRunner`] owns the thread that marries a source to a
//! pipeline for the duration of a session.
//!
//! [`Pipeline::consume`]: crate::pipeline::Pipeline::consume

use crate::error::{PipelineError, Result};
use crate::pipeline::Pipeline;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Flow decision returned to the delivery loop for every chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamControl {
    /// Keep delivering chunks.
    Continue,
    /// End the stream; the device should wind down.
    Stop,
}

/// A blocking sample stream.
///
/// `run` delivers chunks to the callback until the stream ends or the
/// callback answers [`StreamControl::Stop`]. The `bool` argument flags that
/// the device lost samples since the previous chunk.
pub trait DeviceSource: Send {
    /// Acquire the hardware (or its stand-in) and arm the stream.
    fn open(&mut self) -> Result<()>;

    /// Block, delivering chunks until the stream ends or the callback
    /// requests a stop.
    fn run(&mut self, deliver: &mut dyn FnMut(&[u16], bool) -> StreamControl) -> Result<()>;

    /// Release the hardware.
    fn close(&mut self) -> Result<()>;
}

/// One spectral line produced by the simulator.
#[derive(Debug, Clone, Copy)]
pub struct ToneComponent {
    /// Tone frequency in Hz.
    pub frequency_hz: f64,
    /// Peak amplitude in raw ADC counts.
    pub amplitude: f64,
}

/// Deterministic software ADC.
///
/// Generates a configurable mix of tones plus uniform noise around a raw
/// offset, chunk by chunk, with optional real-time pacing and periodic loss
/// flags. Seeded, so a given configuration always produces the same stream.
pub struct SimulatedDevice {
    sample_rate_hz: f64,
    chunk_size: usize,
    offset: f64,
    tones: Vec<ToneComponent>,
    noise_amplitude: f64,
    seed: u64,
    paced: bool,
    max_chunks: Option<u64>,
    loss_every: Option<u64>,
    opened: bool,
    sample_index: u64,
    chunk_index: u64,
    rng: StdRng,
    chunk: Vec<u16>,
}

impl SimulatedDevice {
    /// Create a silent device at `sample_rate_hz` delivering `chunk_size`
    /// samples per callback.
    #[must_use]
    pub fn new(sample_rate_hz: f64, chunk_size: usize) -> Self {
        Self {
            sample_rate_hz,
            chunk_size,
            offset: f64::from(u16::MAX / 2),
            tones: Vec::new(),
            noise_amplitude: 0.0,
            seed: 0,
            paced: false,
            max_chunks: None,
            loss_every: None,
            opened: false,
            sample_index: 0,
            chunk_index: 0,
            rng: StdRng::seed_from_u64(0),
            chunk: Vec::new(),
        }
    }

    /// Add a tone to the generated mix.
    #[must_use]
    pub fn with_tone(mut self, frequency_hz: f64, amplitude: f64) -> Self {
        self.tones.push(ToneComponent {
            frequency_hz,
            amplitude,
        });
        self
    }

    /// Uniform noise amplitude in raw counts.
    #[must_use]
    pub fn with_noise(mut self, amplitude: f64) -> Self {
        self.noise_amplitude = amplitude;
        self
    }

    /// Raw-count offset the mix is centered on.
    #[must_use]
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    /// Noise seed; a fixed seed reproduces the stream exactly.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sleep one chunk period per chunk to approximate real time.
    #[must_use]
    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    /// End the stream after this many chunks instead of running forever.
    #[must_use]
    pub fn with_max_chunks(mut self, chunks: u64) -> Self {
        self.max_chunks = Some(chunks);
        self
    }

    /// Raise the loss flag on every `n`th chunk.
    #[must_use]
    pub fn with_loss_every(mut self, n: u64) -> Self {
        self.loss_every = Some(n);
        self
    }

    fn fill_chunk(&mut self) {
        for slot in self.chunk.iter_mut() {
            let t = self.sample_index as f64 / self.sample_rate_hz;
            let mut value = self.offset;
            for tone in &self.tones {
                value += tone.amplitude * (TAU * tone.frequency_hz * t).sin();
            }
            if self.noise_amplitude > 0.0 {
                value += self.rng.gen_range(-self.noise_amplitude..=self.noise_amplitude);
            }
            *slot = value.round().clamp(0.0, f64::from(u16::MAX)) as u16;
            self.sample_index += 1;
        }
    }
}

impl DeviceSource for SimulatedDevice {
    fn open(&mut self) -> Result<()> {
        if self.sample_rate_hz <= 0.0 || self.chunk_size == 0 {
            return Err(PipelineError::invalid_config(
                "simulated device needs a positive rate and chunk size",
            ));
        }
        self.rng = StdRng::seed_from_u64(self.seed);
        self.sample_index = 0;
        self.chunk_index = 0;
        self.chunk = vec![0; self.chunk_size];
        self.opened = true;
        info!(
            rate_hz = self.sample_rate_hz,
            chunk_size = self.chunk_size,
            tones = self.tones.len(),
            "simulated device opened"
        );
        Ok(())
    }

    fn run(&mut self, deliver: &mut dyn FnMut(&[u16], bool) -> StreamControl) -> Result<()> {
        if !self.opened {
            return Err(PipelineError::DeviceUnavailable {
                message: "simulated device is not open".into(),
            });
        }
        let chunk_period = Duration::from_secs_f64(self.chunk_size as f64 / self.sample_rate_hz);

        loop {
            if let Some(max) = self.max_chunks {
                if self.chunk_index >= max {
                    debug!(chunks = self.chunk_index, "simulated stream exhausted");
                    break;
                }
            }
            self.fill_chunk();
            let loss = self
                .loss_every
                .map_or(false, |n| n > 0 && (self.chunk_index + 1) % n == 0);
            if self.paced {
                std::thread::sleep(chunk_period);
            }
            self.chunk_index += 1;
            if deliver(&self.chunk, loss) == StreamControl::Stop {
                debug!(chunks = self.chunk_index, "consumer ended simulated stream");
                break;
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.opened = false;
        info!(
            chunks = self.chunk_index,
            samples = self.sample_index,
            "simulated device closed"
        );
        Ok(())
    }
}

/// Owns the delivery thread joining a [`DeviceSource`] to a [`Pipeline`].
///
/// While running, the device lives on the delivery thread; stopping joins
/// the thread and takes the device back, so a runner can be started again
/// (for instance after a mode switch).
pub struct DeviceRunner {
    pipeline: Arc<Pipeline>,
    device: Option<Box<dyn DeviceSource>>,
    handle: Option<JoinHandle<Box<dyn DeviceSource>>>,
    active: Arc<AtomicBool>,
}

impl DeviceRunner {
    /// Pair a device with a pipeline. Nothing runs until [`start`].
    ///
    /// [`start`]: DeviceRunner::start
    #[must_use]
    pub fn new(device: Box<dyn DeviceSource>, pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            device: Some(device),
            handle: None,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the pipeline workers, open the device and begin delivery.
    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            warn!("device runner already started");
            return Ok(());
        }
        let mut device = self.device.take().ok_or_else(|| {
            PipelineError::DeviceUnavailable {
                message: "device was lost by a previous failed session".into(),
            }
        })?;
        if let Err(err) = device.open() {
            self.device = Some(device);
            return Err(err);
        }
        // Workers first, so the earliest chunks already find an open queue.
        if let Err(err) = self.pipeline.start() {
            let _ = device.close();
            self.device = Some(device);
            return Err(err);
        }

        self.active.store(true, Ordering::SeqCst);
        let active = Arc::clone(&self.active);
        let pipeline = Arc::clone(&self.pipeline);
        let handle = std::thread::Builder::new()
            .name("device-delivery".into())
            .spawn(move || {
                let result = device.run(&mut |chunk, loss| {
                    if !active.load(Ordering::SeqCst) {
                        return StreamControl::Stop;
                    }
                    pipeline.consume(chunk, loss)
                });
                if let Err(err) = result {
                    error!(error = %err, "device stream failed");
                }
                if let Err(err) = device.close() {
                    warn!(error = %err, "device close failed");
                }
                device
            })?;
        self.handle = Some(handle);
        info!("device delivery started");
        Ok(())
    }

    /// Stop delivery, join the thread, take the device back and stop the
    /// pipeline. A no-op if not running.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.active.store(false, Ordering::SeqCst);
        match handle.join() {
            Ok(device) => self.device = Some(device),
            Err(_) => error!("device delivery thread panicked"),
        }
        self.pipeline.stop();
        info!("device delivery stopped");
    }

    /// Whether the delivery thread is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Switch bandwidth mode through the safe sequence: stop the session,
    /// apply the mode, and restart if it was running.
    pub fn switch_mode(&mut self, mode: crate::config::Mode) -> Result<()> {
        let was_running = self.handle.is_some();
        if was_running {
            self.stop();
        }
        self.pipeline.set_mode(mode)?;
        if was_running {
            self.start()?;
        }
        Ok(())
    }
}

impl Drop for DeviceRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;

    #[test]
    fn test_simulated_stream_is_deterministic() {
        let collect = |seed| {
            let mut device = SimulatedDevice::new(64.0, 16)
                .with_tone(8.0, 1000.0)
                .with_noise(50.0)
                .with_seed(seed)
                .with_max_chunks(4);
            device.open().unwrap();
            let mut samples = Vec::new();
            device
                .run(&mut |chunk, _| {
                    samples.extend_from_slice(chunk);
                    StreamControl::Continue
                })
                .unwrap();
            device.close().unwrap();
            samples
        };

        let a = collect(7);
        let b = collect(7);
        let c = collect(8);
        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_simulated_tone_centers_on_offset() {
        let mut device = SimulatedDevice::new(64.0, 64)
            .with_tone(8.0, 1000.0)
            .with_offset(30_000.0)
            .with_max_chunks(1);
        device.open().unwrap();
        let mut samples = Vec::new();
        device
            .run(&mut |chunk, _| {
                samples.extend_from_slice(chunk);
                StreamControl::Continue
            })
            .unwrap();

        // One full second of an 8 Hz tone: integer cycles, mean = offset.
        let mean = samples.iter().map(|&s| f64::from(s)).sum::<f64>() / samples.len() as f64;
        assert!((mean - 30_000.0).abs() < 1.0);
        let max = samples.iter().copied().max().unwrap();
        let min = samples.iter().copied().min().unwrap();
        assert!(max <= 31_000 && max > 30_900);
        assert!(min >= 29_000 && min < 29_100);
    }

    #[test]
    fn test_loss_flag_period() {
        let mut device = SimulatedDevice::new(64.0, 8)
            .with_loss_every(3)
            .with_max_chunks(7);
        device.open().unwrap();
        let mut flags = Vec::new();
        device
            .run(&mut |_, loss| {
                flags.push(loss);
                StreamControl::Continue
            })
            .unwrap();
        assert_eq!(flags, vec![false, false, true, false, false, true, false]);
    }

    #[test]
    fn test_stop_control_ends_run() {
        let mut device = SimulatedDevice::new(64.0, 8);
        device.open().unwrap();
        let mut delivered = 0;
        device
            .run(&mut |_, _| {
                delivered += 1;
                if delivered == 2 {
                    StreamControl::Stop
                } else {
                    StreamControl::Continue
                }
            })
            .unwrap();
        assert_eq!(delivered, 2);
    }

    #[test]
    fn test_run_requires_open() {
        let mut device = SimulatedDevice::new(64.0, 8);
        let err = device
            .run(&mut |_, _| StreamControl::Continue)
            .unwrap_err();
        assert!(err.is_device_unavailable());
    }

    #[test]
    fn test_runner_feeds_pipeline_and_recovers_device() {
        let config = PipelineConfig::builder()
            .window_size(16)
            .overlap(0.5)
            .queue_capacity(4)
            .workers(1)
            .hardware_rate_hz(64.0)
            .low_bandwidth_rate_hz(16.0)
            .time_window_secs(0.5)
            .build()
            .unwrap();
        let pipeline = Arc::new(Pipeline::new(config).unwrap());
        let device = SimulatedDevice::new(64.0, 16)
            .with_tone(8.0, 1000.0)
            .with_max_chunks(6);

        let mut runner = DeviceRunner::new(Box::new(device), Arc::clone(&pipeline));
        runner.start().unwrap();

        // The bounded stream ends on its own; wait for all six chunks.
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while pipeline.stats().samples_in < 96 && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        runner.stop();

        let stats = pipeline.stats();
        assert_eq!(stats.samples_in, 96);
        assert!(stats.windows_enqueued > 0);
        assert!(!runner.is_running());

        // The device came back; a second session streams the same chunks.
        runner.start().unwrap();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while pipeline.stats().samples_in < 192 && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        runner.stop();
        assert_eq!(pipeline.stats().samples_in, 192);
    }
}
