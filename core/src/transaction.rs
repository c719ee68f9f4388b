use crate::codec::{CodecError, Decode, Encode, Reader, Writer};
use crate::{Balance, WalletId};
use std::io::{Read, Write};

/// Plain wallet-to-wallet transfer
pub const TX_TRANSFER: u16 = 1;

/// Transfer between two wallets
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    /// Transaction kind (currently only transfers)
    pub tx_type: u16,
    /// Source wallet
    pub from_wallet: WalletId,
    /// Destination wallet
    pub to_wallet: WalletId,
    /// Amount to move
    pub amount: Balance,
    /// Opaque application data
    pub meta: Vec<u8>,
}

impl Transaction {
    pub fn transfer(from_wallet: WalletId, to_wallet: WalletId, amount: Balance) -> Self {
        Transaction {
            tx_type: TX_TRANSFER,
            from_wallet,
            to_wallet,
            amount,
            meta: Vec::new(),
        }
    }
}

impl Encode for Transaction {
    fn encode<W: Write>(&self, w: &mut Writer<W>) -> Result<(), CodecError> {
        w.write_u16(self.tx_type)?;
        w.write_u64(self.from_wallet)?;
        w.write_u64(self.to_wallet)?;
        w.write_i64(self.amount)?;
        w.write_bytes(&self.meta)
    }
}

impl Decode for Transaction {
    fn decode<R: Read>(r: &mut Reader<R>) -> Result<Self, CodecError> {
        Ok(Transaction {
            tx_type: r.read_u16()?,
            from_wallet: r.read_u64()?,
            to_wallet: r.read_u64()?,
            amount: r.read_i64()?,
            meta: r.read_bytes()?,
        })
    }
}

/// Transaction plus its signature bytes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTx {
    pub tx: Transaction,
    pub signature: Vec<u8>,
}

impl SignedTx {
    pub fn unsigned(tx: Transaction) -> Self {
        SignedTx {
            tx,
            signature: Vec::new(),
        }
    }
}

impl Encode for SignedTx {
    fn encode<W: Write>(&self, w: &mut Writer<W>) -> Result<(), CodecError> {
        self.tx.encode(w)?;
        w.write_bytes(&self.signature)
    }
}

impl Decode for SignedTx {
    fn decode<R: Read>(r: &mut Reader<R>) -> Result<Self, CodecError> {
        Ok(SignedTx {
            tx: Transaction::decode(r)?,
            signature: r.read_bytes()?,
        })
    }
}

/// Signature verification capability. The ledger checks every incoming
/// transaction through this seam; real key handling plugs in here.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, signed: &SignedTx) -> bool;
}

/// Accepts every signature. Stands in until real key material is wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissiveVerifier;

impl SignatureVerifier for PermissiveVerifier {
    fn verify(&self, _signed: &SignedTx) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_from_slice, encode_to_vec};

    #[test]
    fn signed_tx_round_trip() {
        let signed = SignedTx {
            tx: Transaction::transfer(1, 2, 500),
            signature: vec![0xAA; 64],
        };
        let bytes = encode_to_vec(&signed).unwrap();
        let back: SignedTx = decode_from_slice(&bytes).unwrap();
        assert_eq!(signed, back);
    }

    #[test]
    fn permissive_verifier_accepts_everything() {
        let verifier = PermissiveVerifier;
        let signed = SignedTx::unsigned(Transaction::transfer(1, 2, 1));
        assert!(verifier.verify(&signed));
    }
}
