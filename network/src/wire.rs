// Framed request/response envelopes
// One request per connection; the client half-closes, the server answers
// and closes.

use plid_core::{CodecError, Decode, Encode, Reader, Writer};
use std::io::{Read, Write};

pub const WIRE_VERSION: u16 = 1;

/// Stable request type codes. 1–9 are the required set; 10–14 carry the
/// beacon's stakeholder and consensus operations.
pub mod request_type {
    pub const STATUS: u16 = 1;
    pub const BLOCK_GET: u16 = 2;
    pub const BLOCK_ADD: u16 = 3;
    pub const ACCOUNT_GET: u16 = 4;
    pub const TX_ADD: u16 = 5;
    pub const TX_GET_BY_WALLET: u16 = 6;
    pub const REGISTER: u16 = 7;
    pub const STAKEHOLDER_LIST: u16 = 8;
    pub const CONSENSUS_CURRENT_SLOT: u16 = 9;
    pub const STAKEHOLDER_ADD: u16 = 10;
    pub const STAKEHOLDER_REMOVE: u16 = 11;
    pub const STAKEHOLDER_UPDATE_STAKE: u16 = 12;
    pub const CONSENSUS_CURRENT_EPOCH: u16 = 13;
    pub const CONSENSUS_SLOT_LEADER: u16 = 14;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    Ok = 0,
    BadRequest = 1,
    NotFound = 2,
    VersionMismatch = 3,
    Internal = 4,
    Timeout = 5,
}

impl ErrorCode {
    pub fn from_u16(code: u16) -> Option<ErrorCode> {
        match code {
            0 => Some(ErrorCode::Ok),
            1 => Some(ErrorCode::BadRequest),
            2 => Some(ErrorCode::NotFound),
            3 => Some(ErrorCode::VersionMismatch),
            4 => Some(ErrorCode::Internal),
            5 => Some(ErrorCode::Timeout),
            _ => None,
        }
    }
}

/// `[version u16][type u16][len u64][payload]`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub version: u16,
    pub req_type: u16,
    pub payload: Vec<u8>,
}

impl Request {
    pub fn new(req_type: u16, payload: Vec<u8>) -> Self {
        Request {
            version: WIRE_VERSION,
            req_type,
            payload,
        }
    }

    pub fn empty(req_type: u16) -> Self {
        Request::new(req_type, Vec::new())
    }
}

impl Encode for Request {
    fn encode<W: Write>(&self, w: &mut Writer<W>) -> Result<(), CodecError> {
        w.write_u16(self.version)?;
        w.write_u16(self.req_type)?;
        w.write_bytes(&self.payload)
    }
}

impl Decode for Request {
    fn decode<R: Read>(r: &mut Reader<R>) -> Result<Self, CodecError> {
        Ok(Request {
            version: r.read_u16()?,
            req_type: r.read_u16()?,
            payload: r.read_bytes()?,
        })
    }
}

/// `[version u16][errorCode u16][len u64][payload]`. Error responses carry
/// an encoded message string as their payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub version: u16,
    pub error_code: u16,
    pub payload: Vec<u8>,
}

impl Response {
    pub fn ok(payload: Vec<u8>) -> Self {
        Response {
            version: WIRE_VERSION,
            error_code: ErrorCode::Ok as u16,
            payload,
        }
    }

    pub fn failure(code: ErrorCode, message: &str) -> Self {
        let payload = plid_core::encode_to_vec(&message.to_string()).unwrap_or_default();
        Response {
            version: WIRE_VERSION,
            error_code: code as u16,
            payload,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error_code == ErrorCode::Ok as u16
    }

    /// Message string of an error response, if decodable.
    pub fn error_message(&self) -> Option<String> {
        if self.is_ok() {
            return None;
        }
        plid_core::decode_from_slice::<String>(&self.payload).ok()
    }
}

impl Encode for Response {
    fn encode<W: Write>(&self, w: &mut Writer<W>) -> Result<(), CodecError> {
        w.write_u16(self.version)?;
        w.write_u16(self.error_code)?;
        w.write_bytes(&self.payload)
    }
}

impl Decode for Response {
    fn decode<R: Read>(r: &mut Reader<R>) -> Result<Self, CodecError> {
        Ok(Response {
            version: r.read_u16()?,
            error_code: r.read_u16()?,
            payload: r.read_bytes()?,
        })
    }
}

/// Payload of a `status` response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusInfo {
    pub current_slot: u64,
    pub current_epoch: u64,
    pub next_block_id: u64,
    pub checkpoint_ids: Vec<u64>,
}

impl Encode for StatusInfo {
    fn encode<W: Write>(&self, w: &mut Writer<W>) -> Result<(), CodecError> {
        w.write_u64(self.current_slot)?;
        w.write_u64(self.current_epoch)?;
        w.write_u64(self.next_block_id)?;
        self.checkpoint_ids.encode(w)
    }
}

impl Decode for StatusInfo {
    fn decode<R: Read>(r: &mut Reader<R>) -> Result<Self, CodecError> {
        Ok(StatusInfo {
            current_slot: r.read_u64()?,
            current_epoch: r.read_u64()?,
            next_block_id: r.read_u64()?,
            checkpoint_ids: Vec::<u64>::decode(r)?,
        })
    }
}

/// Payload of a `register` request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Encode for Endpoint {
    fn encode<W: Write>(&self, w: &mut Writer<W>) -> Result<(), CodecError> {
        w.write_string(&self.host)?;
        w.write_u16(self.port)
    }
}

impl Decode for Endpoint {
    fn decode<R: Read>(r: &mut Reader<R>) -> Result<Self, CodecError> {
        Ok(Endpoint {
            host: r.read_string()?,
            port: r.read_u16()?,
        })
    }
}

/// Payload of `account.get` responses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletInfo {
    pub id: u64,
    pub balance: i64,
}

impl Encode for WalletInfo {
    fn encode<W: Write>(&self, w: &mut Writer<W>) -> Result<(), CodecError> {
        w.write_u64(self.id)?;
        w.write_i64(self.balance)
    }
}

impl Decode for WalletInfo {
    fn decode<R: Read>(r: &mut Reader<R>) -> Result<Self, CodecError> {
        Ok(WalletInfo {
            id: r.read_u64()?,
            balance: r.read_i64()?,
        })
    }
}

/// Payload of `tx.getByWallet` requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxByWalletQuery {
    pub wallet_id: u64,
    pub before_block_id: u64,
}

impl Encode for TxByWalletQuery {
    fn encode<W: Write>(&self, w: &mut Writer<W>) -> Result<(), CodecError> {
        w.write_u64(self.wallet_id)?;
        w.write_u64(self.before_block_id)
    }
}

impl Decode for TxByWalletQuery {
    fn decode<R: Read>(r: &mut Reader<R>) -> Result<Self, CodecError> {
        Ok(TxByWalletQuery {
            wallet_id: r.read_u64()?,
            before_block_id: r.read_u64()?,
        })
    }
}

/// Payload of `stakeholder.updateStake` requests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StakeUpdate {
    pub id: String,
    pub stake: u64,
}

impl Encode for StakeUpdate {
    fn encode<W: Write>(&self, w: &mut Writer<W>) -> Result<(), CodecError> {
        w.write_string(&self.id)?;
        w.write_u64(self.stake)
    }
}

impl Decode for StakeUpdate {
    fn decode<R: Read>(r: &mut Reader<R>) -> Result<Self, CodecError> {
        Ok(StakeUpdate {
            id: r.read_string()?,
            stake: r.read_u64()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plid_core::{decode_from_slice, encode_to_vec};

    #[test]
    fn request_round_trip() {
        let request = Request::new(request_type::BLOCK_GET, vec![0, 0, 0, 0, 0, 0, 0, 7]);
        let bytes = encode_to_vec(&request).unwrap();
        let back: Request = decode_from_slice(&bytes).unwrap();
        assert_eq!(request, back);
        assert_eq!(back.version, WIRE_VERSION);
    }

    #[test]
    fn request_frame_layout() {
        let request = Request::new(request_type::STATUS, b"xy".to_vec());
        let bytes = encode_to_vec(&request).unwrap();
        // version, type, u64 length, payload
        assert_eq!(
            bytes,
            vec![0, 1, 0, 1, 0, 0, 0, 0, 0, 0, 0, 2, b'x', b'y']
        );
    }

    #[test]
    fn error_response_carries_message() {
        let response = Response::failure(ErrorCode::NotFound, "block 9 not found");
        assert!(!response.is_ok());
        let bytes = encode_to_vec(&response).unwrap();
        let back: Response = decode_from_slice(&bytes).unwrap();
        assert_eq!(back.error_code, 2);
        assert_eq!(back.error_message().unwrap(), "block 9 not found");
    }

    #[test]
    fn status_info_round_trip() {
        let status = StatusInfo {
            current_slot: 88,
            current_epoch: 2,
            next_block_id: 41,
            checkpoint_ids: vec![0, 12, 30],
        };
        let bytes = encode_to_vec(&status).unwrap();
        let back: StatusInfo = decode_from_slice(&bytes).unwrap();
        assert_eq!(status, back);
    }

    #[test]
    fn zero_length_payload_is_valid() {
        let request = Request::empty(request_type::STATUS);
        let bytes = encode_to_vec(&request).unwrap();
        let back: Request = decode_from_slice(&bytes).unwrap();
        assert!(back.payload.is_empty());
    }

    #[test]
    fn error_code_mapping() {
        assert_eq!(ErrorCode::from_u16(0), Some(ErrorCode::Ok));
        assert_eq!(ErrorCode::from_u16(5), Some(ErrorCode::Timeout));
        assert_eq!(ErrorCode::from_u16(42), None);
    }
}
