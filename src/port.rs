//! Boundary to the block-cipher engine.
//!
//! The engine itself lives outside this crate. It is reached through
//! [`BlockCipherPort`], which owns the key table and one CBC chaining value
//! per open [`ChainToken`]. Access to a shared engine is serialized by
//! [`SharedEngine`], whose [`EngineGuard`] releases the engine when it goes
//! out of scope.

use crate::block::Block;
use crate::error::{CmacError, Result};
use core::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard};

/// Opaque reference to a key held by the engine's key-management side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyHandle(u32);

impl KeyHandle {
    /// Wrap a raw engine key identifier.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw engine key identifier.
    pub const fn id(self) -> u32 {
        self.0
    }
}

/// One CBC chain opened on the engine, bound to a key.
///
/// Chains are independent: any number may be open on the same key at once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChainToken {
    key: KeyHandle,
    id: u64,
}

impl ChainToken {
    /// Token for chain `id` under `key`. Issued by port implementations.
    pub const fn new(key: KeyHandle, id: u64) -> Self {
        Self { key, id }
    }

    /// Key the chain encrypts under.
    pub const fn key(self) -> KeyHandle {
        self.key
    }

    /// Engine-assigned chain identifier.
    pub const fn id(self) -> u64 {
        self.id
    }
}

/// Hardware block-cipher primitive.
pub trait BlockCipherPort {
    /// Encrypt a single block in place under `key`, outside of any chain.
    fn encrypt_block(&mut self, key: KeyHandle, block: &mut Block) -> Result<()>;

    /// Open a fresh chain with a zero chaining value under `key`.
    fn open_chain(&mut self, key: KeyHandle) -> Result<ChainToken>;

    /// Feed `blocks` into `chain`.
    ///
    /// `blocks.len()` must be a multiple of the block size. The chaining
    /// value is only released when `final_batch` is set, in which case the
    /// chain is closed and the last cipher block is returned.
    fn encrypt_blocks(
        &mut self,
        chain: ChainToken,
        blocks: &[u8],
        final_batch: bool,
    ) -> Result<Option<Block>>;

    /// Wipe and close `chain`. Closing an unknown chain does nothing.
    fn close_chain(&mut self, chain: ChainToken);
}

impl<P: BlockCipherPort + ?Sized> BlockCipherPort for &mut P {
    fn encrypt_block(&mut self, key: KeyHandle, block: &mut Block) -> Result<()> {
        (**self).encrypt_block(key, block)
    }

    fn open_chain(&mut self, key: KeyHandle) -> Result<ChainToken> {
        (**self).open_chain(key)
    }

    fn encrypt_blocks(
        &mut self,
        chain: ChainToken,
        blocks: &[u8],
        final_batch: bool,
    ) -> Result<Option<Block>> {
        (**self).encrypt_blocks(chain, blocks, final_batch)
    }

    fn close_chain(&mut self, chain: ChainToken) {
        (**self).close_chain(chain)
    }
}

/// A block-cipher engine shared by every caller in the process.
#[derive(Debug, Default)]
pub struct SharedEngine<P> {
    inner: Mutex<P>,
}

impl<P: BlockCipherPort> SharedEngine<P> {
    /// Wrap `port` for shared use.
    pub fn new(port: P) -> Self {
        Self {
            inner: Mutex::new(port),
        }
    }

    /// Take exclusive access to the engine.
    ///
    /// Chains are per session, so a guard may be held for a whole stream
    /// or taken again for every call.
    pub fn acquire(&self) -> Result<EngineGuard<'_, P>> {
        let guard = self.inner.lock().map_err(|_| {
            tracing::warn!("engine mutex poisoned");
            CmacError::EngineFault { status: u32::MAX }
        })?;
        tracing::trace!("engine acquired");
        Ok(EngineGuard { guard })
    }

    /// Unwrap the port.
    pub fn into_inner(self) -> Result<P> {
        self.inner
            .into_inner()
            .map_err(|_| CmacError::EngineFault { status: u32::MAX })
    }
}

/// Scoped exclusive access to a [`SharedEngine`].
pub struct EngineGuard<'a, P> {
    guard: MutexGuard<'a, P>,
}

impl<P> Deref for EngineGuard<'_, P> {
    type Target = P;

    fn deref(&self) -> &P {
        &self.guard
    }
}

impl<P> DerefMut for EngineGuard<'_, P> {
    fn deref_mut(&mut self) -> &mut P {
        &mut self.guard
    }
}

impl<P> Drop for EngineGuard<'_, P> {
    fn drop(&mut self) {
        tracing::trace!("engine released");
    }
}
