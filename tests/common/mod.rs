#![allow(dead_code)]

use aes::Aes128;
use cmac::{Cmac, Mac};
use hex_literal::hex;
use inve_cmac_engine::{CmacSequencer, MacKeyContext, SoftAesPort, Tag};
use tracing_subscriber::EnvFilter;

pub const KEY: [u8; 16] = hex!("2b7e151628aed2a6abf7158809cf4f3c");

pub const MSG64: [u8; 64] = hex!(
    "6bc1bee22e409f96e93d7e117393172a"
    "ae2d8a571e03ac9c9eb76fac45af8e51"
    "30c81c46a35ce411e5fbc1191a0a52ef"
    "f69f2445df4f9b17ad2b417be66c3710"
);

/// Install a test subscriber once per test binary. Honors `RUST_LOG`.
pub fn init_tracing() {
    static ONCE: std::sync::Once = std::sync::Once::new();

    ONCE.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_test_writer()
            .try_init();
    });
}

pub fn engine() -> (SoftAesPort, MacKeyContext) {
    init_tracing();
    let mut port = SoftAesPort::new().with_batch_log();
    let handle = port.install_key(&KEY).expect("install key");
    (port, MacKeyContext::new(handle))
}

/// Feed `msg` in pieces of the given sizes, cycling through `sizes` until
/// the message is exhausted, then finalize with an empty call.
pub fn chunked_tag(msg: &[u8], sizes: &[usize]) -> Tag {
    let (mut port, mut key) = engine();
    let mut seq = CmacSequencer::new(&mut key);
    let mut rest = msg;
    let mut sizes = sizes.iter().cycle();
    while !rest.is_empty() {
        let n = (*sizes.next().expect("non-empty sizes")).min(rest.len());
        let (head, tail) = rest.split_at(n);
        assert_eq!(seq.update(&mut port, head, false).expect("update"), None);
        rest = tail;
    }
    let tag = seq.finalize(&mut port).expect("finalize");
    assert!(seq.buffer().is_wiped());
    tag
}

pub fn reference_tag(key: &[u8], msg: &[u8]) -> [u8; 16] {
    let mut mac = <Cmac<Aes128> as Mac>::new_from_slice(key).expect("key length");
    mac.update(msg);
    mac.finalize().into_bytes().into()
}

pub fn message(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 + 7) as u8).collect()
}
