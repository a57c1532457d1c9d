//! CSV export of the published spectrum and the time-domain history.
//!
//! Both writers emit a fixed two-column layout meant for plotting tools:
//! the spectrum as display-unit frequency against log magnitude, the time
//! trace as microseconds against calibrated microwatts.

use crate::config::{Mode, PipelineConfig};
use crate::error::Result;
use crate::spectrum::SpectrumSnapshot;
use std::path::Path;
use tracing::info;

/// Magnitude floor applied before the log so empty bins stay finite.
const LOG_FLOOR: f64 = 1e-12;

/// Timestamped default file name for a spectrum export.
#[must_use]
pub fn spectrum_file_name() -> String {
    format!("spectrum_{}.csv", chrono::Utc::now().format("%Y%m%d_%H%M%S"))
}

/// Timestamped default file name for a time-trace export.
#[must_use]
pub fn time_trace_file_name() -> String {
    format!(
        "time_trace_{}.csv",
        chrono::Utc::now().format("%Y%m%d_%H%M%S")
    )
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Write the published magnitudes as `frequency,log10(magnitude)` rows.
///
/// The frequency column is in the mode's display unit (MHz above 1 MHz of
/// analysis bandwidth, kHz below), one row per bin from DC to Nyquist.
pub fn write_spectrum_csv<P: AsRef<Path>>(
    path: P,
    snapshot: &SpectrumSnapshot,
    config: &PipelineConfig,
    mode: Mode,
) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;

    writer.write_record([
        format!("Frequency ({})", config.frequency_unit(mode)),
        "Log Magnitude".to_string(),
    ])?;

    let bin_hz = config.bin_resolution_hz(mode);
    let scale = config.frequency_scale(mode);
    for (bin, &magnitude) in snapshot.magnitudes.iter().enumerate() {
        let frequency = bin as f64 * bin_hz / scale;
        let log_magnitude = magnitude.max(LOG_FLOOR).log10();
        writer.write_record([format!("{frequency:.6}"), format!("{log_magnitude:.6}")])?;
    }
    writer.flush()?;

    info!(
        path = %path.display(),
        bins = snapshot.magnitudes.len(),
        generation = snapshot.generation,
        "spectrum exported"
    );
    Ok(())
}

/// Write raw history samples as `time_us,power_uw` rows.
///
/// Samples are taken to be consecutive at the mode's analysis rate, oldest
/// first, and converted to microwatts with the configured calibration.
pub fn write_time_csv<P: AsRef<Path>>(
    path: P,
    samples: &[u16],
    config: &PipelineConfig,
    mode: Mode,
) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;

    writer.write_record(["Time (us)", "Power (uW)"])?;

    let rate = config.target_rate_hz(mode);
    let calibration = &config.calibration;
    for (index, &raw) in samples.iter().enumerate() {
        let time_us = index as f64 * 1e6 / rate;
        let power_uw = (f64::from(raw) - calibration.adc_offset) * calibration.adc_to_microwatts;
        writer.write_record([format!("{time_us:.6}"), format!("{power_uw:.6}")])?;
    }
    writer.flush()?;

    info!(
        path = %path.display(),
        samples = samples.len(),
        "time trace exported"
    );
    Ok(())
}
