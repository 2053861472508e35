use crate::block::BLOCK_SIZE;
use crate::error::{CmacError, Result};
use crate::region::{AlwaysContiguous, ContiguityProvider, PageBoundary};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Largest single transfer the engine accepts by default (16 MiB).
pub const DEFAULT_MAX_TRANSFER: usize = 16 * 1024 * 1024;

/// How spans are checked for physical contiguity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RegionMode {
    /// Memory is treated as contiguous; spans are only split by size.
    #[default]
    Contiguous,
    /// Spans are split at every `page_size` boundary.
    Paged {
        /// Page size in bytes; a power of two.
        page_size: usize,
    },
}

/// Engine parameters fixed for the lifetime of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EngineConfig {
    /// Largest batch handed to the engine in one call, in bytes. A non-zero
    /// multiple of the block size.
    pub max_transfer: usize,
    /// Contiguity model used to split batches.
    pub region: RegionMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_transfer: DEFAULT_MAX_TRANSFER,
            region: RegionMode::Contiguous,
        }
    }
}

impl EngineConfig {
    /// Replace the transfer limit.
    pub fn with_max_transfer(mut self, max_transfer: usize) -> Self {
        self.max_transfer = max_transfer;
        self
    }

    /// Replace the contiguity model.
    pub fn with_region(mut self, region: RegionMode) -> Self {
        self.region = region;
        self
    }

    /// Check the parameters without building anything.
    pub fn validate(&self) -> Result<()> {
        if self.max_transfer == 0 || self.max_transfer % BLOCK_SIZE != 0 {
            return Err(CmacError::PreconditionFailed(
                "max transfer must be a non-zero multiple of the block size",
            ));
        }
        if let RegionMode::Paged { page_size } = self.region {
            PageBoundary::new(page_size)?;
        }
        Ok(())
    }

    /// Build the contiguity provider selected by `region`.
    pub(crate) fn provider(&self) -> Result<Box<dyn ContiguityProvider + Send>> {
        self.validate()?;
        Ok(match self.region {
            RegionMode::Contiguous => Box::new(AlwaysContiguous),
            RegionMode::Paged { page_size } => Box::new(PageBoundary::new(page_size)?),
        })
    }
}
