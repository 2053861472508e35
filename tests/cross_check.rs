mod common;

use common::{chunked_tag, init_tracing, reference_tag, KEY};
use inve_cmac_engine::{compute_tag, CmacSequencer, MacKeyContext, SoftAesPort};
use proptest::prelude::*;

#[test]
fn matches_reference_for_all_small_lengths() {
    init_tracing();
    for len in 0..=100 {
        let msg = common::message(len);
        assert_eq!(
            chunked_tag(&msg, &[7]).to_bytes(),
            reference_tag(&KEY, &msg),
            "len {}",
            len
        );
    }
}

#[test]
fn aes256_keys() {
    let key = [0x60u8; 32];
    let mut port = SoftAesPort::new();
    let handle = port.install_key(&key).unwrap();
    let mut ctx = MacKeyContext::new(handle);
    let msg = common::message(45);
    let tag = compute_tag(&mut port, &mut ctx, &msg).unwrap();

    let mut mac = <cmac::Cmac<aes::Aes256> as cmac::Mac>::new_from_slice(&key).unwrap();
    cmac::Mac::update(&mut mac, &msg);
    let expected: [u8; 16] = cmac::Mac::finalize(mac).into_bytes().into();
    assert_eq!(tag.to_bytes(), expected);
}

proptest! {
    #[test]
    fn prop_random_chunking_matches_reference(
        key in any::<[u8; 16]>(),
        msg in proptest::collection::vec(any::<u8>(), 0..300),
        cuts in proptest::collection::vec(0usize..40, 1..20),
    ) {
        let mut port = SoftAesPort::new();
        let handle = port.install_key(&key).unwrap();
        let mut ctx = MacKeyContext::new(handle);
        let mut seq = CmacSequencer::new(&mut ctx);

        let mut rest = msg.as_slice();
        for &cut in &cuts {
            let n = cut.min(rest.len());
            let (head, tail) = rest.split_at(n);
            prop_assert_eq!(seq.update(&mut port, head, false).unwrap(), None);
            prop_assert!(seq.buffer().used() <= 16);
            rest = tail;
        }
        let tag = seq.update(&mut port, rest, true).unwrap().unwrap();

        prop_assert_eq!(tag.to_bytes(), reference_tag(&key, &msg));
        prop_assert_eq!(seq.byte_count(), msg.len() as u64);
        prop_assert!(seq.buffer().is_wiped());
    }
}
