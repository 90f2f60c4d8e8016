/// Default transform length in complex samples.
pub const FFT_LEN: usize = 4096;

/// Midpoint of the unsigned 8-bit sample range produced by RTL2832 dongles.
pub const SAMPLE_MIDPOINT: i16 = 127;

/// Center a raw unsigned sample: 127 -> 0, 255 -> 128, 0 -> -127.
#[inline]
pub fn normalize(raw: u8) -> i16 {
    raw as i16 - SAMPLE_MIDPOINT
}

/// A fixed-length block of interleaved I/Q samples (I, Q, I, Q, ...).
#[derive(Clone, Debug, PartialEq)]
pub struct SampleBlock {
    /// Sequence stamp assigned by the producer at publication.
    pub seq: u64,
    data: Vec<i16>,
}

impl SampleBlock {
    /// An all-zero block holding `fft_len` complex samples.
    pub fn zeroed(fft_len: usize) -> Self {
        Self {
            seq: 0,
            data: vec![0; fft_len * 2],
        }
    }

    /// Number of complex samples.
    pub fn len(&self) -> usize {
        self.data.len() / 2
    }

    /// Number of interleaved values (twice `len()`); equals the raw byte count.
    pub fn raw_len(&self) -> usize {
        self.data.len()
    }

    #[cfg(test)]
    pub fn as_slice(&self) -> &[i16] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [i16] {
        &mut self.data
    }

    /// Iterate over (I, Q) pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (i16, i16)> + '_ {
        self.data.chunks_exact(2).map(|c| (c[0], c[1]))
    }

    /// Overwrite this block with the contents of `other` without reallocating.
    pub fn copy_from(&mut self, other: &SampleBlock) {
        assert_eq!(
            self.data.len(),
            other.data.len(),
            "block length {} != {}",
            self.data.len(),
            other.data.len()
        );
        self.data.copy_from_slice(&other.data);
        self.seq = other.seq;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_around_midpoint() {
        assert_eq!(normalize(127), 0);
        assert_eq!(normalize(255), 128);
        assert_eq!(normalize(0), -127);
        assert_eq!(normalize(128), 1);
    }

    #[test]
    fn zeroed_block_dimensions() {
        let block = SampleBlock::zeroed(FFT_LEN);
        assert_eq!(block.len(), FFT_LEN);
        assert_eq!(block.raw_len(), FFT_LEN * 2);
        assert!(block.as_slice().iter().all(|&s| s == 0));
    }

    #[test]
    fn pairs_follow_interleaving() {
        let mut block = SampleBlock::zeroed(2);
        block.as_mut_slice().copy_from_slice(&[1, -1, 2, -2]);
        let pairs: Vec<_> = block.pairs().collect();
        assert_eq!(pairs, vec![(1, -1), (2, -2)]);
    }

    #[test]
    fn copy_from_carries_seq_and_payload() {
        let mut src = SampleBlock::zeroed(4);
        src.seq = 9;
        src.as_mut_slice().fill(42);
        let mut dst = SampleBlock::zeroed(4);
        dst.copy_from(&src);
        assert_eq!(dst, src);
    }

    #[test]
    #[should_panic(expected = "block length")]
    fn copy_from_rejects_mismatched_length() {
        let mut dst = SampleBlock::zeroed(4);
        dst.copy_from(&SampleBlock::zeroed(8));
    }
}
