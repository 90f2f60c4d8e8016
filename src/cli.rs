use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rtl_spectrum", about = "Running power spectrum from an RTL-SDR receiver")]
pub struct Cli {
    /// Replay a raw unsigned 8-bit I/Q capture instead of a live device ("-" for stdin)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Device index
    #[arg(short, long, default_value_t = 0)]
    pub device: u32,

    /// Center frequency in Hz
    #[arg(short, long, default_value_t = 100_000_000)]
    pub frequency: u32,

    /// Sample rate in Hz
    #[arg(short, long, default_value_t = 2_048_000)]
    pub sample_rate: u32,

    /// Tuner gain in dB (0 = automatic)
    #[arg(short, long, default_value_t = 0.0)]
    pub gain: f32,

    /// Frequency correction in ppm
    #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
    pub ppm: i32,

    /// Bytes per driver delivery (multiple of 512)
    #[arg(short, long, default_value_t = 16 * 16384)]
    pub buf_len: usize,

    /// Transform length in complex samples
    #[arg(long, default_value_t = 4096)]
    pub fft_len: usize,

    /// Pace replayed input at the sample rate
    #[arg(long)]
    pub realtime: bool,

    /// Write spectra as JSON lines to this file ("-" for stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Log a spectrum summary every N spectra (0 disables)
    #[arg(long, default_value_t = 50)]
    pub log_every: u64,

    /// Config file (defaults to rtl-spectrum.toml or the user config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,
}
