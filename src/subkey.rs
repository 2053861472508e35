//! K1/K2 subkey derivation (RFC 4493 section 2.3).

use crate::block::Block;
use crate::buffer::StreamBuffer;
use crate::error::{CmacError, Result};
use crate::port::{BlockCipherPort, KeyHandle};
use cipher::{consts::U16, generic_array::GenericArray};
use core::fmt;
use dbl::Dbl;
use zeroize::Zeroize;

/// The pair of finalization subkeys for one cipher key.
#[derive(Clone)]
pub struct Subkeys {
    pub(crate) k1: Block,
    pub(crate) k2: Block,
}

impl Subkeys {
    /// Derive K1 and K2 for `key`.
    ///
    /// The zero block is built in `scratch`, which must be empty; both the
    /// scratch block and `L` are wiped before returning, on success or
    /// failure.
    pub fn derive<P>(port: &mut P, key: KeyHandle, scratch: &mut StreamBuffer) -> Result<Self>
    where
        P: BlockCipherPort + ?Sized,
    {
        if !scratch.is_empty() {
            return Err(CmacError::PreconditionFailed(
                "subkey derivation needs an empty working buffer",
            ));
        }

        let block = scratch.scratch();
        block.zeroize();
        let res = port.encrypt_block(key, block);
        let mut l: Block = *block;
        block.zeroize();
        if let Err(e) = res {
            l.zeroize();
            tracing::warn!(?e, "subkey derivation failed");
            return Err(e);
        }

        let mut keys = Self {
            k1: Block::default(),
            k2: Block::default(),
        };
        let Self { k1, k2 } = &mut keys;
        dbl_into(&l, k1);
        l.zeroize();
        dbl_into(k1, k2);
        tracing::debug!(key = key.id(), "derived CMAC subkeys");
        Ok(keys)
    }
}

/// `dst = dbl(src)` in GF(2^128), wiping the intermediate array.
fn dbl_into(src: &Block, dst: &mut Block) {
    let mut out = GenericArray::<u8, U16>::clone_from_slice(src).dbl();
    dst.copy_from_slice(&out);
    out.as_mut_slice().zeroize();
}

impl Zeroize for Subkeys {
    fn zeroize(&mut self) {
        self.k1.zeroize();
        self.k2.zeroize();
    }
}

impl Drop for Subkeys {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl fmt::Debug for Subkeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Subkeys { ... }")
    }
}
