//! Single-slot, latest-wins handoff between the capture and spectrum threads.
//!
//! The slot owns one block buffer. `publish` copies into it under the mutex
//! and `take` copies out of it under the same mutex, so the producer and the
//! consumer never touch the same storage at the same time and neither side
//! ever observes a half-written block. The condition variable is only a hint:
//! the waiter re-checks `ready`/`closed` under the lock after every wakeup.
//!
//! An unconsumed block is overwritten by the next publication. Consumers get
//! the freshest block, not every block.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::capture::block::SampleBlock;

/// Counters describing what passed through the channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HandoffStats {
    /// Blocks accepted by `publish`.
    pub published: u64,
    /// Blocks overwritten before any consumer took them.
    pub coalesced: u64,
    /// Blocks copied out by `take`.
    pub taken: u64,
}

struct Slot {
    block: SampleBlock,
    ready: bool,
    closed: bool,
    stats: HandoffStats,
}

pub struct HandoffChannel {
    slot: Mutex<Slot>,
    ready: Condvar,
    fft_len: usize,
}

impl HandoffChannel {
    pub fn new(fft_len: usize) -> Self {
        Self {
            slot: Mutex::new(Slot {
                block: SampleBlock::zeroed(fft_len),
                ready: false,
                closed: false,
                stats: HandoffStats::default(),
            }),
            ready: Condvar::new(),
            fft_len,
        }
    }

    pub fn fft_len(&self) -> usize {
        self.fft_len
    }

    // A panic on either side must not wedge the other one, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy `block` into the slot, replacing any pending block.
    ///
    /// Never waits for the consumer: the lock is only held for the copy.
    /// Returns `false` if the channel is already closed and the block was dropped.
    pub fn publish(&self, block: &SampleBlock) -> bool {
        {
            let mut slot = self.lock();
            if slot.closed {
                return false;
            }
            if slot.ready {
                slot.stats.coalesced += 1;
                log::trace!("block {} overwritten by {}", slot.block.seq, block.seq);
            }
            slot.block.copy_from(block);
            slot.ready = true;
            slot.stats.published += 1;
        }
        // Signal strictly after the payload and flag have landed.
        self.ready.notify_one();
        true
    }

    /// Block until a publication is pending or the channel is closed, then copy
    /// the pending block into `out`.
    ///
    /// Returns `false` once the channel is closed and nothing is pending. A block
    /// that was pending when the channel closed is still delivered once.
    pub fn take_into(&self, out: &mut SampleBlock) -> bool {
        let mut slot = self.lock();
        while !slot.ready && !slot.closed {
            slot = self
                .ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if !slot.ready {
            return false;
        }
        out.copy_from(&slot.block);
        slot.ready = false;
        slot.stats.taken += 1;
        true
    }

    /// Allocating form of [`take_into`](Self::take_into).
    #[cfg(test)]
    pub fn take(&self) -> Option<SampleBlock> {
        let mut out = SampleBlock::zeroed(self.fft_len);
        self.take_into(&mut out).then_some(out)
    }

    /// Mark the channel closed and wake every waiter. Idempotent.
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Blocks awaiting consumption: 0 or 1.
    #[cfg(test)]
    pub fn pending(&self) -> usize {
        usize::from(self.lock().ready)
    }

    pub fn stats(&self) -> HandoffStats {
        self.lock().stats
    }
}
