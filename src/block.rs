use core::fmt;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// Cipher block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// A single cipher block.
pub type Block = [u8; BLOCK_SIZE];

#[inline(always)]
pub(crate) fn xor(buf: &mut Block, data: &Block) {
    for (a, b) in buf.iter_mut().zip(data) {
        *a ^= *b;
    }
}

/// A 16-byte CMAC authentication tag.
///
/// Equality is evaluated in constant time.
#[derive(Clone)]
pub struct Tag(Block);

impl Tag {
    pub(crate) fn new(bytes: Block) -> Self {
        Self(bytes)
    }

    /// Raw tag bytes.
    pub fn as_bytes(&self) -> &Block {
        &self.0
    }

    /// Copy the tag out.
    pub fn to_bytes(&self) -> Block {
        self.0
    }

    /// Check `expected` against this tag in constant time.
    ///
    /// Tags of any length other than [`BLOCK_SIZE`] never match.
    #[must_use]
    pub fn verify(&self, expected: &[u8]) -> bool {
        if expected.len() != BLOCK_SIZE {
            return false;
        }
        self.0[..].ct_eq(expected).into()
    }
}

impl AsRef<[u8]> for Tag {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl ConstantTimeEq for Tag {
    fn ct_eq(&self, other: &Self) -> subtle::Choice {
        self.0[..].ct_eq(&other.0[..])
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other).into()
    }
}

impl Eq for Tag {}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Tag(")?;
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        f.write_str(")")
    }
}

impl Zeroize for Tag {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn xor_in_place() {
        let mut a = hex!("00ff00ff00ff00ff00ff00ff00ff00ff");
        xor(&mut a, &hex!("ffffffffffffffff0000000000000000"));
        assert_eq!(a, hex!("ff00ff00ff00ff0000ff00ff00ff00ff"));
    }

    #[test]
    fn verify_rejects_wrong_length() {
        let tag = Tag::new(hex!("070a16b46b4d4144f79bdd9dd04a287c"));
        assert!(tag.verify(&hex!("070a16b46b4d4144f79bdd9dd04a287c")));
        assert!(!tag.verify(&hex!("070a16b46b4d4144f79bdd9dd04a28")));
        assert!(!tag.verify(&hex!("070a16b46b4d4144f79bdd9dd04a287d")));
        assert!(!tag.verify(&[]));
    }

    #[test]
    fn debug_is_hex() {
        let tag = Tag::new(hex!("bb1d6929e95937287fa37d129b756746"));
        assert_eq!(format!("{:?}", tag), "Tag(bb1d6929e95937287fa37d129b756746)");
    }
}
