//! Splitting of full-block spans at physical-memory boundaries.
//!
//! Spans handed straight to the engine must not cross a region boundary and
//! must not exceed the engine's maximum transfer size. A block that straddles
//! a boundary is reported as staged so the caller copies it through a
//! contiguous buffer instead.

use crate::block::BLOCK_SIZE;
use crate::error::{CmacError, Result};

/// Answers how many bytes starting at an address are physically contiguous.
pub trait ContiguityProvider {
    /// Number of contiguous bytes at `addr`, looking at most `remaining`
    /// bytes ahead.
    fn contiguous_run(&self, addr: usize, remaining: usize) -> Result<usize>;
}

impl<T: ContiguityProvider + ?Sized> ContiguityProvider for &T {
    fn contiguous_run(&self, addr: usize, remaining: usize) -> Result<usize> {
        (**self).contiguous_run(addr, remaining)
    }
}

/// Treats all memory as one region.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysContiguous;

impl ContiguityProvider for AlwaysContiguous {
    fn contiguous_run(&self, _addr: usize, remaining: usize) -> Result<usize> {
        Ok(remaining)
    }
}

/// Assumes contiguity only within fixed-size, aligned pages.
#[derive(Clone, Copy, Debug)]
pub struct PageBoundary {
    page_size: usize,
}

impl PageBoundary {
    /// `page_size` must be a non-zero power of two.
    pub fn new(page_size: usize) -> Result<Self> {
        if !page_size.is_power_of_two() {
            return Err(CmacError::PreconditionFailed(
                "page size must be a non-zero power of two",
            ));
        }
        Ok(Self { page_size })
    }

    /// Page size in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }
}

impl ContiguityProvider for PageBoundary {
    fn contiguous_run(&self, addr: usize, remaining: usize) -> Result<usize> {
        let to_boundary = self.page_size - (addr & (self.page_size - 1));
        Ok(to_boundary.min(remaining))
    }
}

/// One piece of a split span.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span<'a> {
    /// Bytes of this piece; always a whole number of blocks.
    pub bytes: &'a [u8],
    /// Set when the piece crosses a boundary and must be copied to a
    /// contiguous buffer before submission. Staged pieces are one block.
    pub staged: bool,
}

/// Splits full-block spans for submission to the engine.
pub struct RegionSplitter<'p> {
    provider: &'p dyn ContiguityProvider,
    max_transfer: usize,
}

impl<'p> RegionSplitter<'p> {
    /// `max_transfer` is rounded down to a whole number of blocks, with a
    /// floor of one block.
    pub fn new(provider: &'p dyn ContiguityProvider, max_transfer: usize) -> Self {
        let max_transfer = (max_transfer - max_transfer % BLOCK_SIZE).max(BLOCK_SIZE);
        Self {
            provider,
            max_transfer,
        }
    }

    /// Iterate over the pieces of `data`, whose length must be a multiple of
    /// the block size.
    pub fn split<'a>(&self, data: &'a [u8]) -> Spans<'a, 'p> {
        debug_assert_eq!(data.len() % BLOCK_SIZE, 0);
        Spans {
            provider: self.provider,
            max_transfer: self.max_transfer,
            rest: data,
        }
    }
}

/// Iterator returned by [`RegionSplitter::split`].
pub struct Spans<'a, 'p> {
    provider: &'p dyn ContiguityProvider,
    max_transfer: usize,
    rest: &'a [u8],
}

impl<'a> Iterator for Spans<'a, '_> {
    type Item = Result<Span<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let addr = self.rest.as_ptr() as usize;
        let run = match self.provider.contiguous_run(addr, self.rest.len()) {
            Ok(0) => Err(CmacError::UnsupportedRegion { addr }),
            other => other,
        };
        let run = match run {
            Ok(run) => run.min(self.rest.len()).min(self.max_transfer),
            Err(e) => {
                self.rest = &[];
                return Some(Err(e));
            }
        };

        let aligned = run - run % BLOCK_SIZE;
        let (take, staged) = if aligned == 0 {
            (BLOCK_SIZE, true)
        } else {
            (aligned, false)
        };
        let (bytes, rest) = self.rest.split_at(take);
        self.rest = rest;
        Some(Ok(Span { bytes, staged }))
    }
}
