use crate::codec::{CodecError, Decode, Encode, Reader, Writer};
use crate::transaction::SignedTx;
use crate::types::Hash;
use crate::{BlockId, Slot, Timestamp};
use std::io::{Read, Write};

/// One block of the chain
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    /// Position in the chain, also the storage block id
    pub index: BlockId,
    /// Creation time (Unix seconds)
    pub timestamp: Timestamp,
    /// Hash of the preceding block, `Hash::ZERO` for the first block
    pub previous_hash: Hash,
    /// Opaque payload (the producer stores the encoded transaction batch)
    pub data: Vec<u8>,
    /// Hash over every other field
    pub hash: Hash,
    /// Slot the block was produced in; non-decreasing along the chain
    pub slot: Slot,
    /// Id of the stakeholder that produced the block
    pub slot_leader: String,
    /// Transactions carried by the block
    pub signed_txes: Vec<SignedTx>,
}

impl Block {
    /// Build a block and seal it with its hash.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: BlockId,
        timestamp: Timestamp,
        previous_hash: Hash,
        data: Vec<u8>,
        slot: Slot,
        slot_leader: String,
        signed_txes: Vec<SignedTx>,
    ) -> Self {
        let mut block = Block {
            index,
            timestamp,
            previous_hash,
            data,
            hash: Hash::ZERO,
            slot,
            slot_leader,
            signed_txes,
        };
        block.hash = block.compute_hash();
        block
    }

    /// Canonical block hash: SHA-256 over the length-prefixed big-endian
    /// encoding of every field except `hash`, in declaration order.
    pub fn compute_hash(&self) -> Hash {
        let mut buf = Vec::new();
        let mut w = Writer::new(&mut buf);
        // Writes into a Vec cannot fail.
        let _ = self.encode_hash_input(&mut w);
        Hash::new(&buf)
    }

    fn encode_hash_input<W: Write>(&self, w: &mut Writer<W>) -> Result<(), CodecError> {
        w.write_u64(self.index)?;
        w.write_i64(self.timestamp)?;
        w.write_bytes(&self.data)?;
        self.previous_hash.encode(w)?;
        w.write_u64(self.slot)?;
        w.write_string(&self.slot_leader)?;
        self.signed_txes.encode(w)
    }

    /// True when `hash` matches the recomputed canonical hash.
    pub fn hash_is_valid(&self) -> bool {
        self.hash == self.compute_hash()
    }
}

impl Encode for Block {
    fn encode<W: Write>(&self, w: &mut Writer<W>) -> Result<(), CodecError> {
        w.write_u64(self.index)?;
        w.write_i64(self.timestamp)?;
        w.write_bytes(&self.data)?;
        self.previous_hash.encode(w)?;
        self.hash.encode(w)?;
        w.write_u64(self.slot)?;
        w.write_string(&self.slot_leader)?;
        self.signed_txes.encode(w)
    }
}

impl Decode for Block {
    fn decode<R: Read>(r: &mut Reader<R>) -> Result<Self, CodecError> {
        Ok(Block {
            index: r.read_u64()?,
            timestamp: r.read_i64()?,
            data: r.read_bytes()?,
            previous_hash: Hash::decode(r)?,
            hash: Hash::decode(r)?,
            slot: r.read_u64()?,
            slot_leader: r.read_string()?,
            signed_txes: Vec::<SignedTx>::decode(r)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_from_slice, encode_to_vec};
    use crate::transaction::Transaction;

    fn sample_block() -> Block {
        Block::new(
            3,
            1_700_000_000,
            Hash::new(b"prev"),
            b"payload".to_vec(),
            17,
            "m1".to_string(),
            vec![SignedTx::unsigned(Transaction::transfer(1, 2, 30))],
        )
    }

    #[test]
    fn hash_covers_every_field() {
        let block = sample_block();
        assert!(block.hash_is_valid());

        let mut tampered = block.clone();
        tampered.slot += 1;
        assert!(!tampered.hash_is_valid());

        let mut tampered = block.clone();
        tampered.data.push(0);
        assert!(!tampered.hash_is_valid());

        let mut tampered = block;
        tampered.slot_leader = "m2".to_string();
        assert!(!tampered.hash_is_valid());
    }

    #[test]
    fn block_round_trip() {
        let block = sample_block();
        let bytes = encode_to_vec(&block).unwrap();
        let back: Block = decode_from_slice(&bytes).unwrap();
        assert_eq!(block, back);
        assert!(back.hash_is_valid());
    }

    #[test]
    fn hash_is_stable_across_rebuilds() {
        let a = sample_block();
        let b = sample_block();
        assert_eq!(a.hash, b.hash);
    }
}
