use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use super::analysis::SpectrumResult;
use crate::error::SinkError;

/// Destination for computed spectra.
pub trait SpectrumSink: Send {
    fn emit(&mut self, spectrum: &SpectrumResult) -> Result<(), SinkError>;

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// One JSON object per line: `{"seq":N,"bins_db":[...]}`.
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl JsonLinesSink<BufWriter<File>> {
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl JsonLinesSink<BufWriter<io::Stdout>> {
    pub fn stdout() -> Self {
        Self::new(BufWriter::new(io::stdout()))
    }
}

impl<W: Write + Send> SpectrumSink for JsonLinesSink<W> {
    fn emit(&mut self, spectrum: &SpectrumResult) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, spectrum)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Logs a one-line summary every `every` spectra.
pub struct LogSink {
    every: u64,
    seen: u64,
}

impl LogSink {
    pub fn new(every: u64) -> Self {
        Self { every, seen: 0 }
    }

    #[cfg(test)]
    pub fn seen(&self) -> u64 {
        self.seen
    }
}

impl SpectrumSink for LogSink {
    fn emit(&mut self, spectrum: &SpectrumResult) -> Result<(), SinkError> {
        self.seen += 1;
        if self.every == 0 || self.seen % self.every != 0 {
            log::trace!("spectrum {} ({} bins)", spectrum.seq, spectrum.bins_db.len());
            return Ok(());
        }
        if let Some((bin, db)) = spectrum.peak() {
            log::info!(
                "spectrum #{} (block {}): peak bin {} at {:.1} dB, mean {:.1} dB",
                self.seen,
                spectrum.seq,
                bin,
                db,
                spectrum.mean_db()
            );
        }
        Ok(())
    }
}

/// Hands every spectrum to each inner sink in turn.
pub struct TeeSink {
    sinks: Vec<Box<dyn SpectrumSink>>,
}

impl TeeSink {
    pub fn new(sinks: Vec<Box<dyn SpectrumSink>>) -> Self {
        Self { sinks }
    }
}

impl SpectrumSink for TeeSink {
    fn emit(&mut self, spectrum: &SpectrumResult) -> Result<(), SinkError> {
        for sink in &mut self.sinks {
            sink.emit(spectrum)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        for sink in &mut self.sinks {
            sink.flush()?;
        }
        Ok(())
    }
}

/// Collects spectra in memory, shared with the test body.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MemorySink(pub std::sync::Arc<std::sync::Mutex<Vec<SpectrumResult>>>);

#[cfg(test)]
impl MemorySink {
    pub fn seqs(&self) -> Vec<u64> {
        self.0.lock().unwrap().iter().map(|s| s.seq).collect()
    }
}

#[cfg(test)]
impl SpectrumSink for MemorySink {
    fn emit(&mut self, spectrum: &SpectrumResult) -> Result<(), SinkError> {
        self.0.lock().unwrap().push(spectrum.clone());
        Ok(())
    }
}
