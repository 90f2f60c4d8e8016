use crate::capture::block::{normalize, SampleBlock};
use crate::capture::source::IqSource;
use crate::error::SourceError;
use crate::pipeline::PipelineContext;

/// Turns driver deliveries of arbitrary size into complete sample blocks.
///
/// Runs inside the driver callback, so it only normalizes, copies and
/// publishes. It never waits on the consumer.
pub struct CaptureProducer<'a> {
    ctx: &'a PipelineContext,
    block: SampleBlock,
    /// Values written into `block` since the last publication.
    filled: usize,
    next_seq: u64,
}

impl<'a> CaptureProducer<'a> {
    pub fn new(ctx: &'a PipelineContext) -> Self {
        Self {
            ctx,
            block: SampleBlock::zeroed(ctx.fft_len()),
            filled: 0,
            next_seq: 0,
        }
    }

    /// Driver callback body.
    pub fn on_samples(&mut self, raw: &[u8]) {
        // The driver may still call back while it is being torn down.
        if self.ctx.shutdown.is_requested() {
            return;
        }

        let block_len = self.block.raw_len();
        let mut rest = raw;
        while !rest.is_empty() {
            let take = (block_len - self.filled).min(rest.len());
            let (head, tail) = rest.split_at(take);
            let dst = &mut self.block.as_mut_slice()[self.filled..self.filled + take];
            for (d, &s) in dst.iter_mut().zip(head) {
                *d = normalize(s);
            }
            self.filled += take;
            rest = tail;

            if self.filled == block_len {
                self.publish();
            }
        }
    }

    fn publish(&mut self) {
        self.block.seq = self.next_seq;
        self.next_seq += 1;
        self.filled = 0;
        if !self.ctx.channel.publish(&self.block) {
            log::trace!("block {} dropped, channel closed", self.block.seq);
        }
    }

    /// Blocks handed to the channel so far.
    pub fn published(&self) -> u64 {
        self.next_seq
    }

    /// Raw values waiting for the next block to complete.
    pub fn buffered(&self) -> usize {
        self.filled
    }
}

/// Producer thread entry point: drive `source` until it returns.
pub fn run(ctx: &PipelineContext, source: &mut dyn IqSource) -> Result<(), SourceError> {
    let mut producer = CaptureProducer::new(ctx);
    log::info!("capture started: {}", source.describe());

    let result = source.read_async(&mut |buf: &[u8]| producer.on_samples(buf));

    log::info!(
        "capture stopped after {} blocks ({} values discarded)",
        producer.published(),
        producer.buffered()
    );
    result
}
