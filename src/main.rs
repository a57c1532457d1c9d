//! CLI entry point for spectra-daq.
//!
//! Provides a command-line interface for:
//! - Running an acquisition session against the simulated ADC
//! - Inspecting the effective configuration
//!
//! # Architecture
//!
//! The binary is a thin shell over the library: it loads the configuration,
//! builds one [`Pipeline`], pairs it with a [`SimulatedDevice`] through a
//! [`DeviceRunner`], and polls the published spectrum while the session
//! runs. Everything interesting happens in the library crate.
//!
//! # Usage
//!
//! Run a two-second full-bandwidth session:
//! ```bash
//! spectra_daq run --duration 2
//! ```
//!
//! Low-bandwidth session with CSV exports:
//! ```bash
//! spectra_daq run --mode low --spectrum-csv spectrum.csv --time-csv trace.csv
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use spectra_daq::config::DEFAULT_CONFIG_PATH;
use spectra_daq::logging::{self, LoggingConfig};
use spectra_daq::{DeviceRunner, Mode, Pipeline, PipelineConfig, SimulatedDevice};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "spectra_daq")]
#[command(about = "Streaming ADC spectrum analysis engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an acquisition session against the simulated device
    Run {
        /// Session length in seconds
        #[arg(long, default_value = "2.0")]
        duration: f64,

        /// Bandwidth mode: "full" or "low"
        #[arg(long, default_value = "full")]
        mode: String,

        /// Simulated tone frequency in Hz
        #[arg(long, default_value = "12.5e6")]
        tone: f64,

        /// Simulated tone amplitude in raw counts
        #[arg(long, default_value = "8000.0")]
        amplitude: f64,

        /// Simulated uniform noise amplitude in raw counts
        #[arg(long, default_value = "200.0")]
        noise: f64,

        /// Device chunk size in samples
        #[arg(long, default_value = "65536")]
        chunk_size: usize,

        /// Enable the envelope normalizer
        #[arg(long)]
        envelope: bool,

        /// Optional configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write the final spectrum to this CSV file
        #[cfg(feature = "export_csv")]
        #[arg(long)]
        spectrum_csv: Option<PathBuf>,

        /// Write the final time history to this CSV file
        #[cfg(feature = "export_csv")]
        #[arg(long)]
        time_csv: Option<PathBuf>,

        /// Print pipeline counters as JSON after the session
        #[arg(long)]
        stats_json: bool,
    },

    /// Print the effective configuration as TOML
    ShowConfig {
        /// Optional configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    println!("🚀 spectra-daq - Streaming Spectrum Analysis");
    println!();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            duration,
            mode,
            tone,
            amplitude,
            noise,
            chunk_size,
            envelope,
            config,
            #[cfg(feature = "export_csv")]
            spectrum_csv,
            #[cfg(feature = "export_csv")]
            time_csv,
            stats_json,
        } => {
            let session = SessionArgs {
                duration,
                mode: parse_mode(&mode)?,
                tone,
                amplitude,
                noise,
                chunk_size,
                envelope,
                config,
                #[cfg(feature = "export_csv")]
                spectrum_csv,
                #[cfg(feature = "export_csv")]
                time_csv,
                stats_json,
            };
            run_session(session)
        }
        Commands::ShowConfig { config } => show_config(config),
    }
}

struct SessionArgs {
    duration: f64,
    mode: Mode,
    tone: f64,
    amplitude: f64,
    noise: f64,
    chunk_size: usize,
    envelope: bool,
    config: Option<PathBuf>,
    #[cfg(feature = "export_csv")]
    spectrum_csv: Option<PathBuf>,
    #[cfg(feature = "export_csv")]
    time_csv: Option<PathBuf>,
    stats_json: bool,
}

fn parse_mode(mode: &str) -> Result<Mode> {
    match mode.to_lowercase().as_str() {
        "full" | "full_bandwidth" | "full-bandwidth" => Ok(Mode::FullBandwidth),
        "low" | "low_bandwidth" | "low-bandwidth" => Ok(Mode::LowBandwidth),
        other => anyhow::bail!("invalid mode '{other}', expected 'full' or 'low'"),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::load_from(path)?,
        None => PipelineConfig::load()?,
    };
    Ok(config)
}

fn run_session(args: SessionArgs) -> Result<()> {
    let mut config = load_config(args.config.as_ref())?;
    config.mode = args.mode;
    config.envelope_enabled = args.envelope;
    config.validate()?;

    let level = logging::parse_log_level(&config.logging.level).map_err(anyhow::Error::msg)?;
    let format = logging::parse_output_format(&config.logging.format).map_err(anyhow::Error::msg)?;
    logging::init(LoggingConfig::new(level).with_format(format)).map_err(anyhow::Error::msg)?;

    println!("🔧 Mode: {}", config.mode);
    println!(
        "   Window: {} samples, overlap {:.0}%, {} workers, queue depth {}",
        config.window_size,
        config.overlap * 100.0,
        config.workers,
        config.queue_capacity
    );
    println!(
        "   Analysis rate: {:.3e} Hz ({:.3} Hz per bin)",
        config.target_rate_hz(config.mode),
        config.bin_resolution_hz(config.mode)
    );
    println!();

    let mode = config.mode;
    let unit = config.frequency_unit(mode);
    let pipeline = Arc::new(Pipeline::new(config.clone())?);

    println!("⚙️  Simulated device: {:.3e} Hz tone, ±{:.0} counts noise", args.tone, args.noise);
    let device = SimulatedDevice::new(config.hardware_rate_hz, args.chunk_size)
        .with_tone(args.tone, args.amplitude)
        .with_noise(args.noise)
        .with_offset(config.calibration.adc_offset)
        .with_seed(1)
        .paced(true);

    let mut runner = DeviceRunner::new(Box::new(device), Arc::clone(&pipeline));
    runner.start()?;
    println!("▶️  Session running for {:.1} s", args.duration);
    println!();

    let mut reader = pipeline.spectrum_reader();
    let deadline = Instant::now() + Duration::from_secs_f64(args.duration.max(0.0));
    while Instant::now() < deadline {
        let remaining = deadline.saturating_duration_since(Instant::now());
        std::thread::sleep(Duration::from_millis(500).min(remaining));
        if let Some(snapshot) = reader.snapshot() {
            println!(
                "📈 peak {:.4} {} (magnitude {:.1}, window #{})",
                snapshot.peak_frequency, unit, snapshot.peak_magnitude, snapshot.generation
            );
        }
    }

    runner.stop();
    println!();

    let spectrum = pipeline.latest_spectrum();
    let stats = pipeline.stats();
    println!("✅ Session complete");
    println!(
        "   {} samples in, {} kept, {} windows transformed, {} dropped",
        stats.samples_in, stats.samples_kept, stats.spectra_published, stats.windows_dropped
    );
    println!("   Final peak: {:.4} {unit}", spectrum.peak_frequency);

    #[cfg(feature = "export_csv")]
    {
        if let Some(path) = args.spectrum_csv {
            spectra_daq::write_spectrum_csv(&path, &spectrum, &config, mode)?;
            println!("💾 Spectrum written to {}", path.display());
        }
        if let Some(path) = args.time_csv {
            let mut history = vec![0u16; config.ring_len(mode)];
            let filled = pipeline.time_history_into(&mut history);
            spectra_daq::write_time_csv(&path, &history[..filled], &config, mode)?;
            println!("💾 Time trace written to {}", path.display());
        }
    }

    if args.stats_json {
        println!();
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }
    Ok(())
}

fn show_config(path: Option<PathBuf>) -> Result<()> {
    let config = load_config(path.as_ref())?;
    config.validate()?;
    println!("# effective configuration, after file and SPECTRA_DAQ_* overrides");
    println!("# default file: {DEFAULT_CONFIG_PATH}");
    println!();
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
