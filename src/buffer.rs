use crate::block::{Block, BLOCK_SIZE};
use core::fmt;
use zeroize::Zeroize;

/// Per-session stream state: at most one block of plaintext that has not
/// been submitted yet, plus a count of bytes already forwarded.
///
/// Bytes past `used` are always zero, so padding only has to place the
/// `0x80` marker.
#[derive(Default)]
pub struct StreamBuffer {
    block: Block,
    used: usize,
    byte_count: u64,
}

impl StreamBuffer {
    /// Empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently held.
    pub fn used(&self) -> usize {
        self.used
    }

    /// Bytes forwarded to the engine so far. Padding is not counted.
    pub fn byte_count(&self) -> u64 {
        self.byte_count
    }

    /// No bytes held.
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// A whole block is held.
    pub fn is_full(&self) -> bool {
        self.used == BLOCK_SIZE
    }

    /// Whether every byte of the working block is zero.
    pub fn is_wiped(&self) -> bool {
        self.block.iter().all(|&b| b == 0)
    }

    /// Copy as much of `data` as fits and return how many bytes were taken.
    pub(crate) fn absorb(&mut self, data: &[u8]) -> usize {
        let n = core::cmp::min(BLOCK_SIZE - self.used, data.len());
        self.block[self.used..self.used + n].copy_from_slice(&data[..n]);
        self.used += n;
        n
    }

    pub(crate) fn block(&self) -> &Block {
        &self.block
    }

    /// Scratch access for callers that need an empty, contiguous block.
    pub(crate) fn scratch(&mut self) -> &mut Block {
        debug_assert!(self.is_empty());
        &mut self.block
    }

    /// Apply `10*` padding after the held bytes. Only valid when not full.
    pub(crate) fn pad(&mut self) {
        debug_assert!(self.used < BLOCK_SIZE);
        self.block[self.used] = 0x80;
    }

    /// Account for `n` bytes handed to the engine.
    pub(crate) fn record_forwarded(&mut self, n: usize) {
        self.byte_count += n as u64;
    }

    /// Drop the held bytes without touching the byte counter.
    pub(crate) fn clear(&mut self) {
        self.block.zeroize();
        self.used = 0;
    }
}

impl Zeroize for StreamBuffer {
    fn zeroize(&mut self) {
        self.clear();
        self.byte_count = 0;
    }
}

impl Drop for StreamBuffer {
    fn drop(&mut self) {
        self.block.zeroize();
    }
}

impl fmt::Debug for StreamBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamBuffer")
            .field("used", &self.used)
            .field("byte_count", &self.byte_count)
            .finish_non_exhaustive()
    }
}
