//! Pipeline configuration.
//!
//! Strongly-typed configuration for the acquisition/transform engine, loaded
//! from a TOML file plus `SPECTRA_DAQ_*` environment overrides (double
//! underscore separates nesting, e.g. `SPECTRA_DAQ_LOGGING__LEVEL=debug`).
//! All geometry derived from the raw fields (downsample factor, hop, bin
//! count, peak scan range, ring length) is computed here so the rest of the
//! pipeline never repeats the arithmetic.
//!
//! # Example
//! ```
//! use spectra_daq::config::{Mode, PipelineConfig};
//!
//! # fn main() -> spectra_daq::Result<()> {
//! let config = PipelineConfig::builder()
//!     .window_size(1024)
//!     .overlap(0.5)
//!     .workers(3)
//!     .mode(Mode::LowBandwidth)
//!     .build()?;
//!
//! assert_eq!(config.hop(), 512);
//! assert_eq!(config.fft_bins(), 513);
//! # Ok(())
//! # }
//! ```

use std::ops::Range;
use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Default configuration file path, overridable on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "config/spectra_daq.toml";

/// Acquisition mode selecting a predefined target-rate parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Analyze at the full hardware rate (no downsampling)
    #[default]
    FullBandwidth,
    /// Downsample to the low-bandwidth analysis rate
    LowBandwidth,
}

impl Mode {
    /// Human-readable mode name.
    pub fn label(self) -> &'static str {
        match self {
            Self::FullBandwidth => "full-bandwidth",
            Self::LowBandwidth => "low-bandwidth",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Calibration constants for converting raw ADC counts to physical units.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Raw ADC count corresponding to zero optical power
    #[serde(default = "default_adc_offset")]
    pub adc_offset: f64,
    /// Scale from offset-corrected counts to microwatts
    #[serde(default = "default_adc_to_microwatts")]
    pub adc_to_microwatts: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            adc_offset: default_adc_offset(),
            adc_to_microwatts: default_adc_to_microwatts(),
        }
    }
}

/// Logging section of the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Configuration for the streaming acquisition/transform pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Analysis window length W in samples
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Fraction of each window shared with the next (0.0 ..= 1 - 1/W)
    #[serde(default = "default_overlap")]
    pub overlap: f64,
    /// Bounded queue capacity K; the window pool holds the same count
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Number of transform worker threads P
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Whether the envelope normalizer runs on each completed window
    #[serde(default)]
    pub envelope_enabled: bool,
    /// Mode the pipeline starts in
    #[serde(default)]
    pub mode: Mode,
    /// Fixed hardware ADC rate in Hz
    #[serde(default = "default_hardware_rate")]
    pub hardware_rate_hz: f64,
    /// Target analysis rate for [`Mode::LowBandwidth`] in Hz
    #[serde(default = "default_low_rate")]
    pub low_bandwidth_rate_hz: f64,
    /// Span of retained time-domain history in seconds
    #[serde(default = "default_time_window")]
    pub time_window_secs: f64,
    /// Lower bound of the peak scan as a fraction of the bin count
    #[serde(default = "default_peak_low")]
    pub peak_low_fraction: f64,
    /// Upper bound of the peak scan as a fraction of the bin count
    #[serde(default = "default_peak_high")]
    pub peak_high_fraction: f64,
    /// Raw-count calibration for export
    #[serde(default)]
    pub calibration: CalibrationConfig,
    /// Logging level and format
    #[serde(default)]
    pub logging: LoggingSection,
}

// Default value functions
fn default_window_size() -> usize {
    4096
}

fn default_overlap() -> f64 {
    0.5
}

fn default_queue_capacity() -> usize {
    8
}

fn default_workers() -> usize {
    // Transform throughput stops improving past three workers on the
    // target hardware.
    3
}

fn default_hardware_rate() -> f64 {
    80_000_000.0
}

fn default_low_rate() -> f64 {
    200_000.0
}

fn default_time_window() -> f64 {
    100e-6
}

fn default_peak_low() -> f64 {
    0.10
}

fn default_peak_high() -> f64 {
    0.99
}

fn default_adc_offset() -> f64 {
    49_555.0
}

fn default_adc_to_microwatts() -> f64 {
    0.0147
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            overlap: default_overlap(),
            queue_capacity: default_queue_capacity(),
            workers: default_workers(),
            envelope_enabled: false,
            mode: Mode::default(),
            hardware_rate_hz: default_hardware_rate(),
            low_bandwidth_rate_hz: default_low_rate(),
            time_window_secs: default_time_window(),
            peak_low_fraction: default_peak_low(),
            peak_high_fraction: default_peak_high(),
            calibration: CalibrationConfig::default(),
            logging: LoggingSection::default(),
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for pipeline configuration.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Load configuration from the default path and environment variables.
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific TOML file plus environment overrides.
    ///
    /// A missing file is not an error; every field has a default.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("SPECTRA_DAQ_").split("__"))
            .extract()
            .map_err(|e| PipelineError::InvalidConfig {
                message: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.window_size < 16 {
            return Err(PipelineError::invalid_config(format!(
                "window_size must be at least 16, got {}",
                self.window_size
            )));
        }

        if !(0.0..1.0).contains(&self.overlap) {
            return Err(PipelineError::invalid_config(format!(
                "overlap must be in [0, 1), got {}",
                self.overlap
            )));
        }

        if self.hop() == 0 {
            return Err(PipelineError::invalid_config(format!(
                "overlap {} leaves no hop for window_size {}",
                self.overlap, self.window_size
            )));
        }

        if self.queue_capacity == 0 {
            return Err(PipelineError::invalid_config(
                "queue_capacity must be greater than 0",
            ));
        }

        if self.workers == 0 {
            return Err(PipelineError::invalid_config(
                "workers must be greater than 0",
            ));
        }

        if self.hardware_rate_hz <= 0.0 {
            return Err(PipelineError::invalid_config(format!(
                "Invalid hardware rate: {}",
                self.hardware_rate_hz
            )));
        }

        if self.low_bandwidth_rate_hz <= 0.0 || self.low_bandwidth_rate_hz > self.hardware_rate_hz
        {
            return Err(PipelineError::invalid_config(format!(
                "low_bandwidth_rate_hz must be in (0, {}], got {}",
                self.hardware_rate_hz, self.low_bandwidth_rate_hz
            )));
        }

        if self.time_window_secs <= 0.0 {
            return Err(PipelineError::invalid_config(format!(
                "time_window_secs must be positive, got {}",
                self.time_window_secs
            )));
        }

        for mode in [Mode::FullBandwidth, Mode::LowBandwidth] {
            if self.ring_len(mode) == 0 {
                return Err(PipelineError::invalid_config(format!(
                    "time window {} s spans no samples at the {} rate",
                    self.time_window_secs, mode
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.peak_low_fraction)
            || !(0.0..=1.0).contains(&self.peak_high_fraction)
            || self.peak_low_fraction >= self.peak_high_fraction
        {
            return Err(PipelineError::invalid_config(format!(
                "peak scan fractions must satisfy 0 <= low < high <= 1, got {} and {}",
                self.peak_low_fraction, self.peak_high_fraction
            )));
        }

        let scan = self.peak_scan_range();
        if scan.start >= scan.end {
            return Err(PipelineError::invalid_config(format!(
                "peak scan fractions select no bins for window_size {}",
                self.window_size
            )));
        }

        Ok(())
    }

    /// Target analysis rate in Hz for the given mode.
    pub fn target_rate_hz(&self, mode: Mode) -> f64 {
        match mode {
            Mode::FullBandwidth => self.hardware_rate_hz,
            Mode::LowBandwidth => self.low_bandwidth_rate_hz,
        }
    }

    /// Keep-every-Nth downsample factor for the given mode (at least 1).
    pub fn downsample_factor(&self, mode: Mode) -> usize {
        let factor = (self.hardware_rate_hz / self.target_rate_hz(mode)).round() as usize;
        factor.max(1)
    }

    /// Samples advanced between consecutive overlapping windows.
    pub fn hop(&self) -> usize {
        (self.window_size as f64 * (1.0 - self.overlap)).round() as usize
    }

    /// Number of samples each new window inherits from its predecessor.
    pub fn overlap_len(&self) -> usize {
        self.window_size - self.hop()
    }

    /// Number of frequency bins produced per window (W/2 + 1).
    pub fn fft_bins(&self) -> usize {
        self.window_size / 2 + 1
    }

    /// Half-open bin range scanned for the peak.
    ///
    /// A non-zero low fraction always excludes bin 0 so a DC-dominated window
    /// can never win the scan.
    pub fn peak_scan_range(&self) -> Range<usize> {
        let bins = self.fft_bins();
        let mut start = (bins as f64 * self.peak_low_fraction) as usize;
        if self.peak_low_fraction > 0.0 {
            start = start.max(1);
        }
        let end = ((bins as f64 * self.peak_high_fraction) as usize).min(bins);
        start..end
    }

    /// Time-domain ring length for the given mode.
    pub fn ring_len(&self, mode: Mode) -> usize {
        (self.target_rate_hz(mode) * self.time_window_secs) as usize
    }

    /// Display scale divisor for peak frequencies at the given mode's rate.
    ///
    /// Rates above 1 MHz report in MHz, everything else in kHz, matching the
    /// export header units.
    pub fn frequency_scale(&self, mode: Mode) -> f64 {
        if self.target_rate_hz(mode) > 1e6 {
            1e6
        } else {
            1e3
        }
    }

    /// Unit label paired with [`Self::frequency_scale`].
    pub fn frequency_unit(&self, mode: Mode) -> &'static str {
        if self.target_rate_hz(mode) > 1e6 {
            "MHz"
        } else {
            "KHz"
        }
    }

    /// Frequency of one bin in Hz at the given mode's rate.
    pub fn bin_resolution_hz(&self, mode: Mode) -> f64 {
        self.target_rate_hz(mode) / self.window_size as f64
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Set the analysis window length W.
    pub fn window_size(mut self, size: usize) -> Self {
        self.config.window_size = size;
        self
    }

    /// Set the window overlap fraction.
    pub fn overlap(mut self, overlap: f64) -> Self {
        self.config.overlap = overlap;
        self
    }

    /// Set the queue capacity (and pool size) K.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Set the transform worker count P.
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// Enable or disable the envelope normalizer.
    pub fn envelope_enabled(mut self, enabled: bool) -> Self {
        self.config.envelope_enabled = enabled;
        self
    }

    /// Set the starting mode.
    pub fn mode(mut self, mode: Mode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Set the hardware ADC rate in Hz.
    pub fn hardware_rate_hz(mut self, rate: f64) -> Self {
        self.config.hardware_rate_hz = rate;
        self
    }

    /// Set the low-bandwidth analysis rate in Hz.
    pub fn low_bandwidth_rate_hz(mut self, rate: f64) -> Self {
        self.config.low_bandwidth_rate_hz = rate;
        self
    }

    /// Set the retained time-history span in seconds.
    pub fn time_window_secs(mut self, secs: f64) -> Self {
        self.config.time_window_secs = secs;
        self
    }

    /// Set the peak scan bounds as fractions of the bin count.
    pub fn peak_scan_fractions(mut self, low: f64, high: f64) -> Self {
        self.config.peak_low_fraction = low;
        self.config.peak_high_fraction = high;
        self
    }

    /// Set the raw-count calibration.
    pub fn calibration(mut self, calibration: CalibrationConfig) -> Self {
        self.config.calibration = calibration;
        self
    }

    /// Build the configuration, validating it.
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
