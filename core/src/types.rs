use crate::codec::{CodecError, Decode, Encode, Reader, Writer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{Read, Write};

/// SHA-256 digest (32 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash([u8; 32]);

impl Hash {
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// Hash arbitrary bytes
    pub fn new(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Hash(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl Default for Hash {
    fn default() -> Self {
        Hash::ZERO
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

// Fixed-size, so written raw with no length prefix
impl Encode for Hash {
    fn encode<W: Write>(&self, w: &mut Writer<W>) -> Result<(), CodecError> {
        w.write_raw(&self.0)
    }
}

impl Decode for Hash {
    fn decode<R: Read>(r: &mut Reader<R>) -> Result<Self, CodecError> {
        let mut bytes = [0u8; 32];
        r.read_raw(&mut bytes, "hash")?;
        Ok(Hash(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_from_slice, encode_to_vec};

    #[test]
    fn hash_is_deterministic() {
        let a = Hash::new(b"hello");
        let b = Hash::new(b"hello");
        assert_eq!(a, b);
        assert_ne!(a, Hash::new(b"world"));
        assert_ne!(a, Hash::ZERO);
    }

    #[test]
    fn hash_round_trip() {
        let h = Hash::new(b"round trip");
        let bytes = encode_to_vec(&h).unwrap();
        assert_eq!(bytes.len(), 32);
        let back: Hash = decode_from_slice(&bytes).unwrap();
        assert_eq!(h, back);
    }
}
