mod common;

use common::{chunked_tag, engine, message, MSG64};
use hex_literal::hex;
use inve_cmac_engine::{compute_tag, BlockCipherPort, CmacSequencer, MacKeyContext};

const K1: [u8; 16] = hex!("fbeed618357133667c85e08f7236a8de");
const K2: [u8; 16] = hex!("f7ddac306ae266ccf90bc11ee46d513b");

fn tag_of(msg: &[u8]) -> [u8; 16] {
    let (mut port, mut key) = engine();
    compute_tag(&mut port, &mut key, msg).unwrap().to_bytes()
}

#[test]
fn example_1_empty() {
    assert_eq!(tag_of(&[]), hex!("bb1d6929e95937287fa37d129b756746"));
}

#[test]
fn example_2_one_block() {
    assert_eq!(tag_of(&MSG64[..16]), hex!("070a16b46b4d4144f79bdd9dd04a287c"));
}

#[test]
fn example_3_forty_bytes() {
    assert_eq!(tag_of(&MSG64[..40]), hex!("dfa66747de9ae63030ca32611497c827"));
}

#[test]
fn example_4_four_blocks() {
    assert_eq!(tag_of(&MSG64), hex!("51f0bebf7e3b9d92fc49741779363cfe"));
}

#[test]
fn chunking_does_not_change_tag() {
    for len in [0usize, 1, 15, 16, 17, 31, 32, 33, 1000] {
        let msg = message(len);
        let whole = tag_of(&msg);

        assert_eq!(chunked_tag(&msg, &[1]).to_bytes(), whole, "1-byte chunks, len {}", len);
        assert_eq!(chunked_tag(&msg, &[16]).to_bytes(), whole, "16-byte chunks, len {}", len);
        if len > 1 {
            assert_eq!(
                chunked_tag(&msg, &[len - 1, 1]).to_bytes(),
                whole,
                "len-1 then 1, len {}",
                len
            );
        }
        assert_eq!(
            chunked_tag(&msg, &[0, 3, 0, 16, 29]).to_bytes(),
            whole,
            "mixed chunks, len {}",
            len
        );
    }
}

#[test]
fn last_piece_may_carry_data() {
    let (mut port, mut key) = engine();
    let mut seq = CmacSequencer::new(&mut key);
    seq.update(&mut port, &MSG64[..17], false).unwrap();
    let tag = seq.update(&mut port, &MSG64[17..], true).unwrap().unwrap();
    assert!(tag.verify(&hex!("51f0bebf7e3b9d92fc49741779363cfe")));
}

#[test]
fn deterministic_across_sessions() {
    let msg = message(77);
    assert_eq!(chunked_tag(&msg, &[5, 11]), chunked_tag(&msg, &[5, 11]));
}

#[test]
fn aligned_message_uses_k1() {
    let (mut port, mut key) = engine();
    let handle = key.handle();
    let tag = compute_tag(&mut port, &mut key, &MSG64[..16]).unwrap();

    let mut block = [0u8; 16];
    for ((b, m), k) in block.iter_mut().zip(&MSG64[..16]).zip(&K1) {
        *b = m ^ k;
    }
    port.encrypt_block(handle, &mut block).unwrap();
    assert_eq!(tag.to_bytes(), block);
}

#[test]
fn ragged_message_uses_k2_and_padding() {
    let (mut port, mut key) = engine();
    let handle = key.handle();
    let tag = compute_tag(&mut port, &mut key, &MSG64[..17]).unwrap();

    let mut chain = [0u8; 16];
    chain.copy_from_slice(&MSG64[..16]);
    port.encrypt_block(handle, &mut chain).unwrap();

    let mut last = [0u8; 16];
    last[0] = MSG64[16];
    last[1] = 0x80;
    for ((l, c), k) in last.iter_mut().zip(&chain).zip(&K2) {
        *l ^= c ^ k;
    }
    port.encrypt_block(handle, &mut last).unwrap();
    assert_eq!(tag.to_bytes(), last);
}

#[test]
fn precomputed_subkeys_give_same_tag() {
    let (mut port, key) = engine();
    let mut pre = MacKeyContext::precomputed(&mut port, key.handle()).unwrap();
    assert!(pre.has_subkeys());
    let tag = compute_tag(&mut port, &mut pre, &MSG64[..40]).unwrap();
    assert!(tag.verify(&hex!("dfa66747de9ae63030ca32611497c827")));
}
