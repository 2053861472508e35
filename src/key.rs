use crate::buffer::StreamBuffer;
use crate::error::{CmacError, Result};
use crate::port::{BlockCipherPort, KeyHandle};
use crate::subkey::Subkeys;
use zeroize::Zeroize;

/// Key material for one MAC session: a borrowed engine key plus the
/// subkeys derived from it, cached for the lifetime of the context.
#[derive(Debug)]
pub struct MacKeyContext {
    handle: KeyHandle,
    subkeys: Option<Subkeys>,
}

impl MacKeyContext {
    /// Context for `handle`; subkeys are derived on first use.
    pub fn new(handle: KeyHandle) -> Self {
        Self {
            handle,
            subkeys: None,
        }
    }

    /// Context with subkeys derived up front.
    pub fn precomputed<P>(port: &mut P, handle: KeyHandle) -> Result<Self>
    where
        P: BlockCipherPort + ?Sized,
    {
        let mut ctx = Self::new(handle);
        let mut scratch = StreamBuffer::new();
        ctx.ensure_subkeys(port, &mut scratch)?;
        Ok(ctx)
    }

    /// Engine key this context refers to.
    pub fn handle(&self) -> KeyHandle {
        self.handle
    }

    /// Whether K1 and K2 are cached.
    pub fn has_subkeys(&self) -> bool {
        self.subkeys.is_some()
    }

    /// Derive the subkeys if they are not cached yet.
    pub(crate) fn ensure_subkeys<P>(
        &mut self,
        port: &mut P,
        scratch: &mut StreamBuffer,
    ) -> Result<()>
    where
        P: BlockCipherPort + ?Sized,
    {
        if self.subkeys.is_none() {
            self.subkeys = Some(Subkeys::derive(port, self.handle, scratch)?);
        }
        Ok(())
    }

    pub(crate) fn subkeys(&self) -> Result<&Subkeys> {
        self.subkeys
            .as_ref()
            .ok_or(CmacError::PreconditionFailed("subkeys have not been derived"))
    }
}

impl Zeroize for MacKeyContext {
    fn zeroize(&mut self) {
        if let Some(mut keys) = self.subkeys.take() {
            keys.zeroize();
        }
    }
}

impl Drop for MacKeyContext {
    fn drop(&mut self) {
        self.zeroize();
    }
}
