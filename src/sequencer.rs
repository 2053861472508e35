//! Streaming CMAC over a [`BlockCipherPort`].
//!
//! Input arrives in arbitrary pieces. Whole blocks are passed to the engine
//! as soon as it is certain they are not the last block of the message; the
//! final 1..=16 bytes are always held back until the caller declares the
//! last call, because only then is it known whether the last block is
//! finished with K1 or padded and finished with K2.

use crate::block::{xor, Block, Tag, BLOCK_SIZE};
use crate::buffer::StreamBuffer;
use crate::config::EngineConfig;
use crate::error::{CmacError, Result};
use crate::key::MacKeyContext;
use crate::keyslot::{KeySlot, KeyStore, ShadowContext};
use crate::port::{BlockCipherPort, ChainToken};
use crate::region::{ContiguityProvider, RegionSplitter};
use core::fmt;
use zeroize::Zeroize;

/// Lifecycle of a [`CmacSequencer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing consumed yet.
    Idle,
    /// Bytes are being consumed; more may follow.
    Accumulating,
    /// Terminal. Reached on the last call or on any error.
    Finalized,
}

/// One CMAC session.
///
/// The sequencer owns the working buffer and borrows the key context. It
/// does not hold the engine: every call takes the port explicitly. The CBC
/// chaining value lives in the engine under a [`ChainToken`] opened when the
/// session starts, so several sessions may share one key handle and one
/// engine, and engine access may be held for the whole stream or taken per
/// call.
///
/// Dropping a session mid-stream leaves its chain open in the engine; call
/// [`CmacSequencer::discard`] to release it.
pub struct CmacSequencer<'k> {
    key: &'k mut MacKeyContext,
    buffer: StreamBuffer,
    state: SessionState,
    chain: Option<ChainToken>,
    max_transfer: usize,
    provider: Box<dyn ContiguityProvider + Send>,
}

impl<'k> CmacSequencer<'k> {
    /// Session with the default [`EngineConfig`].
    pub fn new(key: &'k mut MacKeyContext) -> Self {
        let config = EngineConfig::default();
        Self {
            key,
            buffer: StreamBuffer::new(),
            state: SessionState::Idle,
            chain: None,
            max_transfer: config.max_transfer,
            provider: Box::new(crate::region::AlwaysContiguous),
        }
    }

    /// Session whose contiguity provider and transfer limit come from
    /// `config`.
    pub fn with_config(key: &'k mut MacKeyContext, config: &EngineConfig) -> Result<Self> {
        let provider = config.provider()?;
        Ok(Self {
            max_transfer: config.max_transfer,
            provider,
            ..Self::new(key)
        })
    }

    /// Session with a caller-supplied contiguity provider.
    pub fn with_provider(
        key: &'k mut MacKeyContext,
        max_transfer: usize,
        provider: Box<dyn ContiguityProvider + Send>,
    ) -> Result<Self> {
        EngineConfig::default()
            .with_max_transfer(max_transfer)
            .validate()?;
        Ok(Self {
            max_transfer,
            provider,
            ..Self::new(key)
        })
    }

    /// Where the session is in its lifecycle.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Bytes forwarded to the engine so far.
    pub fn byte_count(&self) -> u64 {
        self.buffer.byte_count()
    }

    /// Read-only view of the working buffer.
    pub fn buffer(&self) -> &StreamBuffer {
        &self.buffer
    }

    /// Consume `data`. When `is_final` is set this is the last call of the
    /// session and the tag is returned.
    ///
    /// Any error ends the session: the working buffer is wiped, the engine
    /// chain is dropped and later calls fail with
    /// [`CmacError::InvalidState`].
    pub fn update<P>(&mut self, port: &mut P, data: &[u8], is_final: bool) -> Result<Option<Tag>>
    where
        P: BlockCipherPort + ?Sized,
    {
        self.check_open()?;
        let res = self.step(port, data, is_final);
        if let Err(e) = &res {
            self.fail(port, e);
        }
        res
    }

    /// Finish the session without further data.
    pub fn finalize<P>(&mut self, port: &mut P) -> Result<Tag>
    where
        P: BlockCipherPort + ?Sized,
    {
        self.update(port, &[], true)?
            .ok_or(CmacError::InvalidState("final call produced no tag"))
    }

    /// Run `message` through the session and install the resulting block
    /// into `slot` of `store` instead of returning it.
    ///
    /// Only a fresh session is accepted. Like every other error, rejecting a
    /// session that has already consumed input ends it.
    pub fn derive_into_keyslot<P, S>(
        &mut self,
        port: &mut P,
        store: &mut S,
        slot: KeySlot,
        message: &[u8],
    ) -> Result<()>
    where
        P: BlockCipherPort + ?Sized,
        S: KeyStore,
    {
        self.check_open()?;
        let res = if self.state == SessionState::Idle {
            self.derive_into_keyslot_inner(port, store, slot, message)
        } else {
            Err(CmacError::InvalidState(
                "keyslot derivation needs a fresh session",
            ))
        };
        if let Err(e) = &res {
            self.fail(port, e);
        }
        res
    }

    /// Abandon the session, wiping buffered plaintext and closing this
    /// session's engine chain. Other sessions on the same key are untouched.
    pub fn discard<P>(&mut self, port: &mut P)
    where
        P: BlockCipherPort + ?Sized,
    {
        self.buffer.clear();
        if let Some(chain) = self.chain.take() {
            port.close_chain(chain);
        }
        self.state = SessionState::Finalized;
    }

    fn chain(&self) -> Result<ChainToken> {
        self.chain
            .ok_or(CmacError::InvalidState("session has no engine chain"))
    }

    fn check_open(&self) -> Result<()> {
        if self.state == SessionState::Finalized {
            tracing::warn!("update on a finalized CMAC session");
            return Err(CmacError::InvalidState("session already finalized"));
        }
        Ok(())
    }

    fn fail<P>(&mut self, port: &mut P, e: &CmacError)
    where
        P: BlockCipherPort + ?Sized,
    {
        tracing::warn!(error = %e, "CMAC session aborted");
        self.discard(port);
    }

    fn begin<P>(&mut self, port: &mut P) -> Result<()>
    where
        P: BlockCipherPort + ?Sized,
    {
        if self.state == SessionState::Idle {
            self.key.ensure_subkeys(port, &mut self.buffer)?;
            self.chain = Some(port.open_chain(self.key.handle())?);
            self.state = SessionState::Accumulating;
            tracing::debug!(key = self.key.handle().id(), "CMAC session started");
        }
        Ok(())
    }

    fn step<P>(&mut self, port: &mut P, data: &[u8], is_final: bool) -> Result<Option<Tag>>
    where
        P: BlockCipherPort + ?Sized,
    {
        self.begin(port)?;
        self.absorb(port, data)?;
        if !is_final {
            return Ok(None);
        }

        let chain = self.chain()?;
        let (mut last, pending) = self.last_block()?;
        let res = port.encrypt_blocks(chain, &last, true);
        last.zeroize();
        let mut out = res?.ok_or(CmacError::EngineFault { status: 0 })?;
        self.chain = None;
        self.buffer.record_forwarded(pending);
        self.state = SessionState::Finalized;
        tracing::debug!(bytes = self.buffer.byte_count(), "CMAC session finalized");

        let tag = Tag::new(out);
        out.zeroize();
        Ok(Some(tag))
    }

    fn derive_into_keyslot_inner<P, S>(
        &mut self,
        port: &mut P,
        store: &mut S,
        slot: KeySlot,
        message: &[u8],
    ) -> Result<()>
    where
        P: BlockCipherPort + ?Sized,
        S: KeyStore,
    {
        self.begin(port)?;
        self.absorb(port, message)?;

        let chain = self.chain()?;
        let (mut last, pending) = self.last_block()?;
        {
            let mut shadow = ShadowContext::new(&mut *port, chain, slot, &mut last);
            store.install_from_cipher_output(slot, &mut shadow)?;
        }
        self.chain = None;
        self.buffer.record_forwarded(pending);
        self.state = SessionState::Finalized;
        tracing::debug!(
            bytes = self.buffer.byte_count(),
            slot = slot.index(),
            "CMAC result installed into keyslot"
        );
        Ok(())
    }

    /// Take in `data`, forwarding every block that is known not to be last.
    fn absorb<P>(&mut self, port: &mut P, mut data: &[u8]) -> Result<()>
    where
        P: BlockCipherPort + ?Sized,
    {
        if data.is_empty() {
            return Ok(());
        }

        if !self.buffer.is_empty() {
            let n = self.buffer.absorb(data);
            data = &data[n..];
            if data.is_empty() {
                return Ok(());
            }
            // buffer is full and more input follows
            self.flush(port)?;
        }

        // hold back 1..=16 bytes
        let direct = (data.len() - 1) / BLOCK_SIZE * BLOCK_SIZE;
        let (blocks, tail) = data.split_at(direct);
        self.submit(port, blocks)?;
        self.buffer.absorb(tail);
        Ok(())
    }

    fn flush<P>(&mut self, port: &mut P) -> Result<()>
    where
        P: BlockCipherPort + ?Sized,
    {
        debug_assert!(self.buffer.is_full());
        tracing::trace!(len = BLOCK_SIZE, "submitting buffered block");
        port.encrypt_blocks(self.chain()?, self.buffer.block(), false)?;
        self.buffer.record_forwarded(BLOCK_SIZE);
        self.buffer.clear();
        Ok(())
    }

    fn submit<P>(&mut self, port: &mut P, blocks: &[u8]) -> Result<()>
    where
        P: BlockCipherPort + ?Sized,
    {
        if blocks.is_empty() {
            return Ok(());
        }
        let chain = self.chain()?;
        let splitter = RegionSplitter::new(&*self.provider, self.max_transfer);
        for span in splitter.split(blocks) {
            let span = span?;
            tracing::trace!(len = span.bytes.len(), staged = span.staged, "submitting span");
            if span.staged {
                let mut staged = Block::default();
                staged.copy_from_slice(span.bytes);
                let res = port.encrypt_blocks(chain, &staged, false);
                staged.zeroize();
                res?;
            } else {
                port.encrypt_blocks(chain, span.bytes, false)?;
            }
            self.buffer.record_forwarded(span.bytes.len());
        }
        Ok(())
    }

    /// Build the finished last block and wipe the working buffer. Returns
    /// the block and the number of message bytes it carries.
    fn last_block(&mut self) -> Result<(Block, usize)> {
        let subkeys = self.key.subkeys()?;
        let pending = self.buffer.used();
        let last = if self.buffer.is_full() {
            let mut last = *self.buffer.block();
            xor(&mut last, &subkeys.k1);
            last
        } else {
            self.buffer.pad();
            let mut last = *self.buffer.block();
            xor(&mut last, &subkeys.k2);
            last
        };
        self.buffer.clear();
        Ok((last, pending))
    }
}

impl fmt::Debug for CmacSequencer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CmacSequencer")
            .field("key", &self.key.handle())
            .field("state", &self.state)
            .field("chain", &self.chain)
            .field("buffer", &self.buffer)
            .field("max_transfer", &self.max_transfer)
            .finish_non_exhaustive()
    }
}

/// Compute the tag of `message` in one call.
pub fn compute_tag<P>(port: &mut P, key: &mut MacKeyContext, message: &[u8]) -> Result<Tag>
where
    P: BlockCipherPort + ?Sized,
{
    let mut seq = CmacSequencer::new(key);
    seq.update(port, message, true)?
        .ok_or(CmacError::InvalidState("final call produced no tag"))
}
