use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::Serialize;
use std::sync::Arc;

use crate::capture::block::SampleBlock;

/// Magnitudes are clamped to this before the logarithm.
pub const MAGNITUDE_FLOOR: f32 = 1e-6;
/// `20 * log10(MAGNITUDE_FLOOR)`: the value reported for an empty bin.
pub const FLOOR_DB: f32 = -120.0;

/// Power per frequency bin for one sample block, in natural FFT bin order.
#[derive(Clone, Debug, Serialize)]
pub struct SpectrumResult {
    /// Sequence stamp of the block this spectrum was computed from.
    pub seq: u64,
    pub bins_db: Vec<f32>,
}

impl SpectrumResult {
    /// Strongest bin and its level.
    pub fn peak(&self) -> Option<(usize, f32)> {
        self.bins_db
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best, (i, db)| match best {
                Some((_, best_db)) if best_db >= db => best,
                _ => Some((i, db)),
            })
    }

    pub fn mean_db(&self) -> f32 {
        if self.bins_db.is_empty() {
            return FLOOR_DB;
        }
        self.bins_db.iter().sum::<f32>() / self.bins_db.len() as f32
    }
}

/// `20 * log10(|c|)` with the magnitude clamped to `MAGNITUDE_FLOOR`.
#[inline]
pub fn magnitude_db(c: Complex<f32>) -> f32 {
    20.0 * c.norm().max(MAGNITUDE_FLOOR).log10()
}

/// Forward FFT plus dB conversion over fixed-length blocks.
///
/// The plan, input buffer and scratch space are allocated once and reused for
/// every block.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl SpectrumAnalyzer {
    pub fn new(fft_len: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_len);
        let scratch_len = fft.get_inplace_scratch_len();
        Self {
            fft,
            buffer: vec![Complex::new(0.0, 0.0); fft_len],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
        }
    }

    pub fn fft_len(&self) -> usize {
        self.buffer.len()
    }

    /// Transform one block. The block length must equal the plan length; the
    /// producer only ever publishes complete blocks, so a mismatch is a bug.
    pub fn process(&mut self, block: &SampleBlock) -> SpectrumResult {
        assert_eq!(
            block.len(),
            self.buffer.len(),
            "block length {} != FFT size {}",
            block.len(),
            self.buffer.len()
        );

        for (slot, (i, q)) in self.buffer.iter_mut().zip(block.pairs()) {
            *slot = Complex::new(i as f32, q as f32);
        }
        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        SpectrumResult {
            seq: block.seq,
            bins_db: self.buffer.iter().map(|&c| magnitude_db(c)).collect(),
        }
    }
}
