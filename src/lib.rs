//! AES-CMAC ([RFC 4493], NIST SP 800-38B) sequenced over a block-cipher
//! engine.
//!
//! The engine is reached through [`BlockCipherPort`]; this crate supplies
//! the buffering, subkey derivation and block sequencing that turn an
//! arbitrarily chunked byte stream into the CBC-MAC batches the engine
//! consumes, and the final tag.
//!
//! # Usage
//!
//! ```
//! use inve_cmac_engine::{CmacSequencer, MacKeyContext, SoftAesPort};
//! use hex_literal::hex;
//!
//! let mut port = SoftAesPort::new();
//! let handle = port.install_key(&hex!("2b7e151628aed2a6abf7158809cf4f3c")).unwrap();
//! let mut key = MacKeyContext::new(handle);
//!
//! let mut mac = CmacSequencer::new(&mut key);
//! mac.update(&mut port, &hex!("6bc1bee22e409f96"), false).unwrap();
//! let tag = mac
//!     .update(&mut port, &hex!("e93d7e117393172a"), true)
//!     .unwrap()
//!     .unwrap();
//! assert!(tag.verify(&hex!("070a16b46b4d4144f79bdd9dd04a287c")));
//! ```
//!
//! [RFC 4493]: https://www.rfc-editor.org/rfc/rfc4493

#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs, rust_2018_idioms)]

mod block;
mod buffer;
mod config;
mod error;
mod key;
mod keyslot;
mod port;
mod region;
mod sequencer;
mod soft;
mod subkey;

pub use crate::block::{Block, Tag, BLOCK_SIZE};
pub use crate::buffer::StreamBuffer;
pub use crate::config::{EngineConfig, RegionMode, DEFAULT_MAX_TRANSFER};
pub use crate::error::{CmacError, Result};
pub use crate::key::MacKeyContext;
pub use crate::keyslot::{KeySlot, KeyStore, ShadowContext, ShadowOp, SoftKeyStore};
pub use crate::port::{BlockCipherPort, ChainToken, EngineGuard, KeyHandle, SharedEngine};
pub use crate::region::{
    AlwaysContiguous, ContiguityProvider, PageBoundary, RegionSplitter, Span, Spans,
};
pub use crate::sequencer::{compute_tag, CmacSequencer, SessionState};
pub use crate::soft::SoftAesPort;
pub use crate::subkey::Subkeys;
