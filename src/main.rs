mod capture;
mod cli;
mod config;
mod error;
mod pipeline;
mod spectrum;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;

use capture::source::{IqSource, ReplaySource};
use cli::Cli;
use config::DeviceConfig;
use pipeline::PipelineContext;
use spectrum::analysis::SpectrumAnalyzer;
use spectrum::consumer::SpectrumConsumer;
use spectrum::sink::{JsonLinesSink, LogSink, SpectrumSink, TeeSink};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    // Config values apply only when the CLI is at its default
    if let Some(path) = config::find_config(cli.config.as_deref()) {
        match config::load_config(&path) {
            Ok(cfg) => {
                log::info!("Loaded config from {}", path.display());
                if cli.device == 0 { cli.device = cfg.device.index; }
                if cli.frequency == config::DEFAULT_CENTER_FREQ { cli.frequency = cfg.device.center_freq; }
                if cli.sample_rate == config::DEFAULT_SAMPLE_RATE { cli.sample_rate = cfg.device.sample_rate; }
                if cli.gain == 0.0 { cli.gain = cfg.device.gain_db; }
                if cli.ppm == 0 { cli.ppm = cfg.device.ppm; }
                if cli.buf_len == config::DEFAULT_BUF_LENGTH { cli.buf_len = cfg.device.buf_len; }
                if cli.fft_len == capture::block::FFT_LEN { cli.fft_len = cfg.pipeline.fft_len; }
                if cli.log_every == 50 { cli.log_every = cfg.output.log_every; }
                if cli.output.is_none() { cli.output = cfg.output.path; }
            }
            Err(err) => log::warn!("{:#}", err),
        }
    }

    if cli.fft_len == 0 {
        anyhow::bail!("--fft-len must be at least 1");
    }

    let device = DeviceConfig {
        index: cli.device,
        sample_rate: cli.sample_rate,
        center_freq: cli.frequency,
        gain_db: cli.gain,
        ppm: cli.ppm,
        buf_len: config::validated_buf_len(cli.buf_len),
    };

    log::info!("rtl-spectrum - running power spectrum");
    log::info!(
        "Center: {} Hz, rate: {} S/s, FFT: {} bins, delivery: {} bytes",
        device.center_freq,
        device.sample_rate,
        cli.fft_len,
        device.buf_len
    );

    let ctx = Arc::new(PipelineContext::new(cli.fft_len));

    // Install before the device is opened so an early Ctrl-C is not lost
    {
        let ctx = ctx.clone();
        ctrlc::set_handler(move || {
            log::warn!("Signal caught, exiting!");
            ctx.shutdown.trigger(pipeline::shutdown::ShutdownReason::Signal);
        })
        .context("Failed to install signal handler")?;
    }

    let source = open_source(&cli, &device)?;
    let sink = build_sink(&cli)?;
    let consumer = SpectrumConsumer::new(SpectrumAnalyzer::new(cli.fft_len), sink);

    let report = pipeline::run(ctx, source, consumer)?;

    log::info!(
        "Stopped ({}): {} blocks published, {} coalesced, {} spectra",
        report.reason,
        report.stats.published,
        report.stats.coalesced,
        report.spectra
    );

    if report.reason.is_failure() {
        anyhow::bail!("Pipeline stopped on {}", report.reason);
    }
    Ok(())
}

fn open_source(cli: &Cli, device: &DeviceConfig) -> Result<Box<dyn IqSource>> {
    let Some(ref input) = cli.input else {
        return open_device(device);
    };

    let pacing = if cli.realtime { device.sample_rate } else { 0 };
    if input == Path::new("-") {
        return Ok(Box::new(
            ReplaySource::from_stdin(device.buf_len).with_realtime(pacing),
        ));
    }
    let source = ReplaySource::from_file(input, device.buf_len)
        .with_context(|| format!("Failed to open capture: {}", input.display()))?;
    Ok(Box::new(source.with_realtime(pacing)))
}

#[cfg(feature = "rtlsdr")]
fn open_device(device: &DeviceConfig) -> Result<Box<dyn IqSource>> {
    let source = capture::rtlsdr::RtlSdrSource::open(device, device.buf_len)
        .context("Failed to open RTL-SDR device")?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "rtlsdr"))]
fn open_device(_device: &DeviceConfig) -> Result<Box<dyn IqSource>> {
    Err(error::SourceError::Unsupported(
        "live capture requires the 'rtlsdr' feature. \
         Rebuild with: cargo build --features rtlsdr, or pass --input"
            .into(),
    ))
    .context("No sample source available")
}

fn build_sink(cli: &Cli) -> Result<Box<dyn SpectrumSink>> {
    let log_sink: Box<dyn SpectrumSink> = Box::new(LogSink::new(cli.log_every));
    let Some(ref path) = cli.output else {
        return Ok(log_sink);
    };

    let json: Box<dyn SpectrumSink> = if path == Path::new("-") {
        Box::new(JsonLinesSink::stdout())
    } else {
        let sink = JsonLinesSink::create(path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        log::info!("Writing spectra to {}", path.display());
        Box::new(sink)
    };
    Ok(Box::new(TeeSink::new(vec![json, log_sink])))
}
