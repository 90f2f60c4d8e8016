use super::analysis::SpectrumAnalyzer;
use super::sink::SpectrumSink;
use crate::capture::block::SampleBlock;
use crate::error::SinkError;
use crate::pipeline::PipelineContext;

/// Worker that turns published blocks into spectra.
pub struct SpectrumConsumer {
    analyzer: SpectrumAnalyzer,
    sink: Box<dyn SpectrumSink>,
    emitted: u64,
}

impl SpectrumConsumer {
    pub fn new(analyzer: SpectrumAnalyzer, sink: Box<dyn SpectrumSink>) -> Self {
        Self {
            analyzer,
            sink,
            emitted: 0,
        }
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Consumer thread entry point. Returns once the channel is closed and
    /// drained, or as soon as the sink fails.
    ///
    /// The channel lock is only held inside `take_into`; the transform and the
    /// sink run on the private copy.
    pub fn run(&mut self, ctx: &PipelineContext) -> Result<(), SinkError> {
        let mut block = SampleBlock::zeroed(ctx.fft_len());
        log::info!("spectrum worker started ({} bins)", self.analyzer.fft_len());

        while ctx.channel.take_into(&mut block) {
            let spectrum = self.analyzer.process(&block);
            self.sink.emit(&spectrum)?;
            self.emitted += 1;
        }

        self.sink.flush()?;
        log::info!("spectrum worker stopped after {} spectra", self.emitted);
        Ok(())
    }
}
