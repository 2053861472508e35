//! Software stand-in for the block-cipher engine, backed by the `aes` crate.

use crate::block::{Block, BLOCK_SIZE};
use crate::error::{CmacError, Result};
use crate::port::{BlockCipherPort, ChainToken, KeyHandle};
use aes::{Aes128, Aes192, Aes256};
use cipher::{
    consts::U16, generic_array::GenericArray, BlockBackend, BlockClosure, BlockEncrypt,
    BlockSizeUser, KeyInit,
};
use std::collections::HashMap;
use zeroize::Zeroize;

enum SoftKey {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl SoftKey {
    fn new(key: &[u8]) -> Result<Self> {
        let bad_len = |_| CmacError::PreconditionFailed("AES key must be 16, 24 or 32 bytes");
        Ok(match key.len() {
            16 => SoftKey::Aes128(Aes128::new_from_slice(key).map_err(bad_len)?),
            24 => SoftKey::Aes192(Aes192::new_from_slice(key).map_err(bad_len)?),
            32 => SoftKey::Aes256(Aes256::new_from_slice(key).map_err(bad_len)?),
            _ => return Err(CmacError::PreconditionFailed("AES key must be 16, 24 or 32 bytes")),
        })
    }

    fn encrypt_with_backend(&self, f: impl BlockClosure<BlockSize = U16>) {
        match self {
            SoftKey::Aes128(c) => c.encrypt_with_backend(f),
            SoftKey::Aes192(c) => c.encrypt_with_backend(f),
            SoftKey::Aes256(c) => c.encrypt_with_backend(f),
        }
    }

    fn encrypt_block(&self, block: &mut Block) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            SoftKey::Aes128(c) => c.encrypt_block(block),
            SoftKey::Aes192(c) => c.encrypt_block(block),
            SoftKey::Aes256(c) => c.encrypt_block(block),
        }
    }
}

struct CbcCtx<'a> {
    state: &'a mut GenericArray<u8, U16>,
    blocks: &'a [u8],
}

impl BlockSizeUser for CbcCtx<'_> {
    type BlockSize = U16;
}

impl BlockClosure for CbcCtx<'_> {
    #[inline(always)]
    fn call<B: BlockBackend<BlockSize = Self::BlockSize>>(self, backend: &mut B) {
        let Self { state, blocks } = self;
        for block in blocks.chunks_exact(BLOCK_SIZE) {
            for (s, b) in state.iter_mut().zip(block) {
                *s ^= *b;
            }
            backend.proc_block((&mut *state).into());
        }
    }
}

/// In-memory [`BlockCipherPort`].
///
/// Keeps one CBC chaining value per open chain. A log of the batches it was
/// handed can be switched on with [`SoftAesPort::with_batch_log`] so callers
/// can observe how a stream was split.
#[derive(Default)]
pub struct SoftAesPort {
    keys: HashMap<KeyHandle, SoftKey>,
    chains: HashMap<u64, (KeyHandle, Block)>,
    next_id: u32,
    next_chain: u64,
    batch_log: Option<Vec<(usize, bool)>>,
    ops: usize,
    fault: Option<(usize, u32)>,
}

impl SoftAesPort {
    /// Empty engine with no keys installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the `(length, final)` of every chained batch.
    pub fn with_batch_log(mut self) -> Self {
        self.batch_log = Some(Vec::new());
        self
    }

    /// Install an AES-128/192/256 key and return its handle.
    pub fn install_key(&mut self, key: &[u8]) -> Result<KeyHandle> {
        let soft = SoftKey::new(key)?;
        let handle = KeyHandle::new(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.keys.insert(handle, soft);
        Ok(handle)
    }

    /// Forget `key` and close every chain open under it.
    pub fn remove_key(&mut self, key: KeyHandle) {
        self.keys.remove(&key);
        self.chains.retain(|_, (owner, chain)| {
            if *owner == key {
                chain.zeroize();
                false
            } else {
                true
            }
        });
    }

    /// Make the engine report `status` once `after` further operations have
    /// succeeded.
    pub fn inject_fault(&mut self, after: usize, status: u32) {
        self.fault = Some((self.ops + after, status));
    }

    /// Logged batches, oldest first. Empty unless the log is enabled.
    pub fn batches(&self) -> &[(usize, bool)] {
        self.batch_log.as_deref().unwrap_or(&[])
    }

    /// Drop the logged batches, keeping the log enabled.
    pub fn clear_batches(&mut self) {
        if let Some(log) = &mut self.batch_log {
            log.clear();
        }
    }

    /// Whether `chain` is still open.
    pub fn has_chain(&self, chain: ChainToken) -> bool {
        self.chains.contains_key(&chain.id())
    }

    /// Number of open chains.
    pub fn open_chains(&self) -> usize {
        self.chains.len()
    }

    fn begin_op(&mut self) -> Result<()> {
        if let Some((at, status)) = self.fault {
            if self.ops >= at {
                self.fault = None;
                return Err(CmacError::EngineFault { status });
            }
        }
        self.ops += 1;
        Ok(())
    }

    fn key(&self, key: KeyHandle) -> Result<&SoftKey> {
        self.keys
            .get(&key)
            .ok_or(CmacError::PreconditionFailed("unknown key handle"))
    }
}

impl BlockCipherPort for SoftAesPort {
    fn encrypt_block(&mut self, key: KeyHandle, block: &mut Block) -> Result<()> {
        self.key(key)?;
        self.begin_op()?;
        self.key(key)?.encrypt_block(block);
        Ok(())
    }

    fn open_chain(&mut self, key: KeyHandle) -> Result<ChainToken> {
        self.key(key)?;
        let chain = ChainToken::new(key, self.next_chain);
        self.next_chain = self.next_chain.wrapping_add(1);
        self.chains.insert(chain.id(), (key, Block::default()));
        Ok(chain)
    }

    fn encrypt_blocks(
        &mut self,
        chain: ChainToken,
        blocks: &[u8],
        final_batch: bool,
    ) -> Result<Option<Block>> {
        if blocks.len() % BLOCK_SIZE != 0 {
            return Err(CmacError::PreconditionFailed(
                "batch length is not a multiple of the block size",
            ));
        }
        match self.chains.get(&chain.id()) {
            Some((owner, _)) if *owner == chain.key() => {}
            _ => return Err(CmacError::InvalidState("chain is not open")),
        }
        self.key(chain.key())?;
        self.begin_op()?;
        if let Some(log) = &mut self.batch_log {
            log.push((blocks.len(), final_batch));
        }

        let Self { keys, chains, .. } = &mut *self;
        let (cipher, state) = match (keys.get(&chain.key()), chains.get_mut(&chain.id())) {
            (Some(cipher), Some((_, state))) => (cipher, state),
            _ => return Err(CmacError::InvalidState("chain is not open")),
        };
        cipher.encrypt_with_backend(CbcCtx {
            state: GenericArray::from_mut_slice(state),
            blocks,
        });

        if final_batch {
            let out = *state;
            self.close_chain(chain);
            Ok(Some(out))
        } else {
            Ok(None)
        }
    }

    fn close_chain(&mut self, chain: ChainToken) {
        if let Some((_, mut state)) = self.chains.remove(&chain.id()) {
            state.zeroize();
        }
    }
}

impl Drop for SoftAesPort {
    fn drop(&mut self) {
        for (_, chain) in self.chains.values_mut() {
            chain.zeroize();
        }
    }
}
