//! Installing a CMAC result directly into engine key storage.
//!
//! Instead of returning the last cipher block, the session hands a
//! [`ShadowContext`] to a [`KeyStore`]. The shadow continues the session's
//! engine chain, is marked as a final encrypt whose destination
//! is a keyslot, and is torn down as soon as it goes out of scope whether or
//! not the store used it.

use crate::block::{Block, BLOCK_SIZE};
use crate::error::{CmacError, Result};
use crate::port::{BlockCipherPort, ChainToken, KeyHandle};
use std::collections::HashMap;
use zeroize::Zeroize;

/// Index of a hardware key-storage slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeySlot(u8);

impl KeySlot {
    /// Slot number `index`.
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    /// Slot number.
    pub const fn index(self) -> u8 {
        self.0
    }
}

/// Operation descriptor carried by a [`ShadowContext`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShadowOp {
    /// Always `true`: CMAC only encrypts.
    pub encrypt: bool,
    /// Always `true`: the shadow finishes the chain.
    pub final_block: bool,
    /// Slot that receives the output.
    pub destination: KeySlot,
}

/// Short-lived cipher context that processes exactly one final block.
pub struct ShadowContext<'a, P: BlockCipherPort + ?Sized> {
    port: &'a mut P,
    chain: ChainToken,
    op: ShadowOp,
    block: Block,
    done: bool,
}

impl<'a, P: BlockCipherPort + ?Sized> ShadowContext<'a, P> {
    /// Takes over `block`, leaving zeros behind in the caller's copy.
    pub(crate) fn new(
        port: &'a mut P,
        chain: ChainToken,
        slot: KeySlot,
        block: &mut Block,
    ) -> Self {
        tracing::trace!(
            key = chain.key().id(),
            slot = slot.index(),
            "shadow context created"
        );
        let pending = *block;
        block.zeroize();
        Self {
            port,
            chain,
            op: ShadowOp {
                encrypt: true,
                final_block: true,
                destination: slot,
            },
            block: pending,
            done: false,
        }
    }

    /// Key the shadow encrypts under.
    pub fn key(&self) -> KeyHandle {
        self.chain.key()
    }

    /// What the shadow will do when run.
    pub fn op(&self) -> ShadowOp {
        self.op
    }

    /// Encrypt the pending block and write the result into `dest`, which
    /// must be the key storage for the destination slot. May run once.
    pub fn process_into(&mut self, dest: &mut [u8]) -> Result<()> {
        if self.done {
            return Err(CmacError::InvalidState("shadow context already used"));
        }
        if dest.len() != BLOCK_SIZE {
            return Err(CmacError::PreconditionFailed(
                "keyslot destination must be one block",
            ));
        }
        self.done = true;
        let res = self.port.encrypt_blocks(self.chain, &self.block, true);
        self.block.zeroize();
        let mut out = res?.ok_or(CmacError::EngineFault { status: 0 })?;
        dest.copy_from_slice(&out);
        out.zeroize();
        Ok(())
    }
}

impl<P: BlockCipherPort + ?Sized> Drop for ShadowContext<'_, P> {
    fn drop(&mut self) {
        self.block.zeroize();
        self.port.close_chain(self.chain);
        tracing::trace!(slot = self.op.destination.index(), "shadow context destroyed");
    }
}

/// Hardware key storage that can be filled from cipher output.
pub trait KeyStore {
    /// Run `shadow` and place its output in `slot`.
    fn install_from_cipher_output<P>(
        &mut self,
        slot: KeySlot,
        shadow: &mut ShadowContext<'_, P>,
    ) -> Result<()>
    where
        P: BlockCipherPort + ?Sized;
}

/// In-memory key storage with a fixed number of slots.
#[derive(Debug)]
pub struct SoftKeyStore {
    capacity: u8,
    slots: HashMap<KeySlot, Block>,
}

impl SoftKeyStore {
    /// Store with slots `0..capacity`, all empty.
    pub fn new(capacity: u8) -> Self {
        Self {
            capacity,
            slots: HashMap::new(),
        }
    }

    /// Whether `slot` holds a key.
    pub fn is_occupied(&self, slot: KeySlot) -> bool {
        self.slots.contains_key(&slot)
    }

    /// Read back a slot. Only a software store can do this.
    pub fn read(&self, slot: KeySlot) -> Option<&Block> {
        self.slots.get(&slot)
    }

    /// Wipe and free `slot`.
    pub fn clear(&mut self, slot: KeySlot) {
        if let Some(mut key) = self.slots.remove(&slot) {
            key.zeroize();
        }
    }
}

impl KeyStore for SoftKeyStore {
    fn install_from_cipher_output<P>(
        &mut self,
        slot: KeySlot,
        shadow: &mut ShadowContext<'_, P>,
    ) -> Result<()>
    where
        P: BlockCipherPort + ?Sized,
    {
        if slot.index() >= self.capacity {
            return Err(CmacError::PreconditionFailed("keyslot out of range"));
        }
        let mut key = Block::default();
        let res = shadow.process_into(&mut key);
        if let Err(e) = res {
            key.zeroize();
            return Err(e);
        }
        self.clear(slot);
        self.slots.insert(slot, key);
        Ok(())
    }
}

impl Drop for SoftKeyStore {
    fn drop(&mut self) {
        for key in self.slots.values_mut() {
            key.zeroize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soft::SoftAesPort;

    #[test]
    fn shadow_runs_once() {
        let mut port = SoftAesPort::new();
        let key = port.install_key(&[5u8; 16]).unwrap();
        let chain = port.open_chain(key).unwrap();
        let mut dest = [0u8; 16];
        {
            let mut block = [1u8; 16];
            let mut shadow = ShadowContext::new(&mut port, chain, KeySlot::new(0), &mut block);
            assert_eq!(shadow.key(), key);
            assert_eq!(shadow.op().destination, KeySlot::new(0));
            assert!(shadow.op().encrypt && shadow.op().final_block);
            shadow.process_into(&mut dest).unwrap();
            assert!(matches!(
                shadow.process_into(&mut dest),
                Err(CmacError::InvalidState(_))
            ));
        }
        let mut expected = [1u8; 16];
        port.encrypt_block(key, &mut expected).unwrap();
        assert_eq!(dest, expected);
    }

    #[test]
    fn shadow_takes_the_block() {
        let mut port = SoftAesPort::new();
        let key = port.install_key(&[5u8; 16]).unwrap();
        let chain = port.open_chain(key).unwrap();
        let mut block = [0xa5u8; 16];
        let shadow = ShadowContext::new(&mut port, chain, KeySlot::new(0), &mut block);
        drop(shadow);
        assert_eq!(block, [0u8; 16]);
    }

    #[test]
    fn unused_shadow_drops_chain() {
        let mut port = SoftAesPort::new();
        let key = port.install_key(&[5u8; 16]).unwrap();
        let chain = port.open_chain(key).unwrap();
        let other = port.open_chain(key).unwrap();
        port.encrypt_blocks(chain, &[0u8; 16], false).unwrap();
        drop(ShadowContext::new(&mut port, chain, KeySlot::new(1), &mut [0u8; 16]));
        assert!(!port.has_chain(chain));
        assert!(port.has_chain(other));
    }

    #[test]
    fn store_rejects_out_of_range_slot() {
        let mut port = SoftAesPort::new();
        let key = port.install_key(&[5u8; 16]).unwrap();
        let chain = port.open_chain(key).unwrap();
        let mut store = SoftKeyStore::new(2);
        let mut block = [0u8; 16];
        let mut shadow = ShadowContext::new(&mut port, chain, KeySlot::new(2), &mut block);
        assert!(matches!(
            store.install_from_cipher_output(KeySlot::new(2), &mut shadow),
            Err(CmacError::PreconditionFailed(_))
        ));
        assert!(!store.is_occupied(KeySlot::new(2)));
    }
}
