//! # Spectra DAQ
//!
//! This crate is a realtime spectral analysis engine for a streaming ADC:
//! a device delivers raw `u16` chunks at up to the full hardware rate, and
//! the pipeline turns them into a continuously refreshed magnitude spectrum,
//! a scanned peak reading and a rolling time-domain history, without ever
//! blocking the delivery thread. Saturation sheds windows instead of
//! stalling the device, and every shared stage is owned by one [`Pipeline`]
//! value so several engines can coexist in a process.
//!
//! ## Crate Structure
//!
//! - **`config`**: Pipeline parameters with TOML/environment loading,
//!   validation and the derived per-mode quantities (decimation factor,
//!   hop, ring length, frequency axis).
//! - **`error`**: The [`PipelineError`] enum shared by every module.
//! - **`logging`**: `tracing` subscriber setup for the binary and tests.
//! - **`pool`**: Fixed set of preallocated window buffers with per-slot
//!   ownership tracking.
//! - **`queue`**: Bounded FIFO of completed windows between the producer
//!   and the transform workers.
//! - **`ring`**: Lock-skipping ring of raw samples backing the time view.
//! - **`envelope`**: Analytic-signal amplitude normalizer with a running
//!   average that survives toggling.
//! - **`acquire`**: The never-blocking front-end: decimation, window
//!   assembly, overlap seeding and drop accounting.
//! - **`transform`**: FFT workers draining the queue and the reusable
//!   single-window transform they are built on.
//! - **`spectrum`**: Published magnitudes and peak with a generation
//!   counter for any number of freshness-tracking readers.
//! - **`pipeline`**: Assembly and lifecycle of all of the above.
//! - **`source`**: The device contract, a deterministic simulator and the
//!   delivery-thread runner.
//! - **`export`**: CSV writers for the spectrum and the time history
//!   (behind the `export_csv` feature).
//!
//! ## Example
//!
//! ```no_run
//! use spectra_daq::{DeviceRunner, Pipeline, PipelineConfig, Result, SimulatedDevice};
//! use std::sync::Arc;
//!
//! fn main() -> Result<()> {
//!     let config = PipelineConfig::default();
//!     let pipeline = Arc::new(Pipeline::new(config)?);
//!
//!     let device = SimulatedDevice::new(80e6, 65_536)
//!         .with_tone(12.5e6, 8_000.0)
//!         .with_noise(200.0)
//!         .paced(true);
//!     let mut runner = DeviceRunner::new(Box::new(device), Arc::clone(&pipeline));
//!
//!     runner.start()?;
//!     std::thread::sleep(std::time::Duration::from_secs(1));
//!     runner.stop();
//!
//!     let spectrum = pipeline.latest_spectrum();
//!     println!("peak at {:.3} MHz", spectrum.peak_frequency);
//!     Ok(())
//! }
//! ```

pub mod acquire;
pub mod config;
pub mod envelope;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod pool;
pub mod queue;
pub mod ring;
pub mod source;
pub mod spectrum;
pub mod transform;

#[cfg(feature = "export_csv")]
pub mod export;

pub use config::{Mode, PipelineConfig, PipelineConfigBuilder};
pub use error::{PipelineError, Result};
pub use pipeline::{Pipeline, PipelineStats};
pub use source::{DeviceRunner, DeviceSource, SimulatedDevice, StreamControl, ToneComponent};
pub use spectrum::{SpectrumReader, SpectrumSnapshot};

#[cfg(feature = "export_csv")]
pub use export::{write_spectrum_csv, write_time_csv};
