// Deterministic binary codec
// Big-endian, length-prefixed, machine-independent wire and disk format

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use thiserror::Error;

/// Upper bound for any length prefix read from untrusted input.
/// Keeps a corrupt or hostile length field from driving a huge allocation.
pub const MAX_DECODE_LEN: u64 = 256 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("short read while decoding {0}")]
    ShortRead(&'static str),
    #[error("unsupported format version {found} (current: {current})")]
    UnsupportedVersion { found: u32, current: u32 },
    #[error("length prefix {0} exceeds decoding limit")]
    LengthOverflow(u64),
    #[error("string field is not valid utf-8")]
    InvalidString,
    #[error("i/o error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for CodecError {
    fn from(err: io::Error) -> Self {
        CodecError::Io(err)
    }
}

fn map_read_err(err: io::Error, what: &'static str) -> CodecError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        CodecError::ShortRead(what)
    } else {
        CodecError::Io(err)
    }
}

/// Encoding side of the archive. All multi-byte integers are big-endian,
/// booleans are one byte, byte strings and containers carry a u64 length.
pub struct Writer<W: Write> {
    out: W,
}

impl<W: Write> Writer<W> {
    pub fn new(out: W) -> Self {
        Writer { out }
    }

    pub fn write_bool(&mut self, value: bool) -> Result<(), CodecError> {
        self.out.write_u8(u8::from(value))?;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), CodecError> {
        self.out.write_u8(value)?;
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), CodecError> {
        self.out.write_u16::<BigEndian>(value)?;
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), CodecError> {
        self.out.write_u32::<BigEndian>(value)?;
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<(), CodecError> {
        self.out.write_u64::<BigEndian>(value)?;
        Ok(())
    }

    pub fn write_i64(&mut self, value: i64) -> Result<(), CodecError> {
        self.out.write_i64::<BigEndian>(value)?;
        Ok(())
    }

    /// Length-prefixed byte string
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<(), CodecError> {
        self.write_u64(value.len() as u64)?;
        self.out.write_all(value)?;
        Ok(())
    }

    /// Length-prefixed UTF-8 string
    pub fn write_string(&mut self, value: &str) -> Result<(), CodecError> {
        self.write_bytes(value.as_bytes())
    }

    /// Raw bytes with no length prefix (fixed-size fields)
    pub fn write_raw(&mut self, value: &[u8]) -> Result<(), CodecError> {
        self.out.write_all(value)?;
        Ok(())
    }
}

/// Decoding side of the archive. Every read is fallible and reports the
/// first short read by the name of the field kind it was decoding.
pub struct Reader<R: Read> {
    input: R,
}

impl<R: Read> Reader<R> {
    pub fn new(input: R) -> Self {
        Reader { input }
    }

    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        let byte = self.input.read_u8().map_err(|e| map_read_err(e, "bool"))?;
        Ok(byte != 0)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        self.input.read_u8().map_err(|e| map_read_err(e, "u8"))
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        self.input
            .read_u16::<BigEndian>()
            .map_err(|e| map_read_err(e, "u16"))
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        self.input
            .read_u32::<BigEndian>()
            .map_err(|e| map_read_err(e, "u32"))
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        self.input
            .read_u64::<BigEndian>()
            .map_err(|e| map_read_err(e, "u64"))
    }

    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        self.input
            .read_i64::<BigEndian>()
            .map_err(|e| map_read_err(e, "i64"))
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.read_u64()?;
        if len > MAX_DECODE_LEN {
            return Err(CodecError::LengthOverflow(len));
        }
        let mut buf = vec![0u8; len as usize];
        self.input
            .read_exact(&mut buf)
            .map_err(|e| map_read_err(e, "bytes"))?;
        Ok(buf)
    }

    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes).map_err(|_| CodecError::InvalidString)
    }

    pub fn read_raw(&mut self, buf: &mut [u8], what: &'static str) -> Result<(), CodecError> {
        self.input
            .read_exact(buf)
            .map_err(|e| map_read_err(e, what))
    }
}

/// A record that emits its fields to an archive in a fixed order.
pub trait Encode {
    fn encode<W: Write>(&self, w: &mut Writer<W>) -> Result<(), CodecError>;
}

/// A record that can be rebuilt from an archive. Field order must match
/// the `Encode` implementation exactly.
pub trait Decode: Sized {
    fn decode<R: Read>(r: &mut Reader<R>) -> Result<Self, CodecError>;
}

impl Encode for bool {
    fn encode<W: Write>(&self, w: &mut Writer<W>) -> Result<(), CodecError> {
        w.write_bool(*self)
    }
}

impl Decode for bool {
    fn decode<R: Read>(r: &mut Reader<R>) -> Result<Self, CodecError> {
        r.read_bool()
    }
}

impl Encode for u8 {
    fn encode<W: Write>(&self, w: &mut Writer<W>) -> Result<(), CodecError> {
        w.write_u8(*self)
    }
}

impl Decode for u8 {
    fn decode<R: Read>(r: &mut Reader<R>) -> Result<Self, CodecError> {
        r.read_u8()
    }
}

impl Encode for u16 {
    fn encode<W: Write>(&self, w: &mut Writer<W>) -> Result<(), CodecError> {
        w.write_u16(*self)
    }
}

impl Decode for u16 {
    fn decode<R: Read>(r: &mut Reader<R>) -> Result<Self, CodecError> {
        r.read_u16()
    }
}

impl Encode for u32 {
    fn encode<W: Write>(&self, w: &mut Writer<W>) -> Result<(), CodecError> {
        w.write_u32(*self)
    }
}

impl Decode for u32 {
    fn decode<R: Read>(r: &mut Reader<R>) -> Result<Self, CodecError> {
        r.read_u32()
    }
}

impl Encode for u64 {
    fn encode<W: Write>(&self, w: &mut Writer<W>) -> Result<(), CodecError> {
        w.write_u64(*self)
    }
}

impl Decode for u64 {
    fn decode<R: Read>(r: &mut Reader<R>) -> Result<Self, CodecError> {
        r.read_u64()
    }
}

impl Encode for i64 {
    fn encode<W: Write>(&self, w: &mut Writer<W>) -> Result<(), CodecError> {
        w.write_i64(*self)
    }
}

impl Decode for i64 {
    fn decode<R: Read>(r: &mut Reader<R>) -> Result<Self, CodecError> {
        r.read_i64()
    }
}

impl Encode for String {
    fn encode<W: Write>(&self, w: &mut Writer<W>) -> Result<(), CodecError> {
        w.write_string(self)
    }
}

impl Decode for String {
    fn decode<R: Read>(r: &mut Reader<R>) -> Result<Self, CodecError> {
        r.read_string()
    }
}

// Ordered containers carry a u64 length prefix. Vec<u8> through this impl is
// byte-identical to a length-prefixed byte string.
impl<T: Encode> Encode for Vec<T> {
    fn encode<W: Write>(&self, w: &mut Writer<W>) -> Result<(), CodecError> {
        w.write_u64(self.len() as u64)?;
        for item in self {
            item.encode(w)?;
        }
        Ok(())
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode<R: Read>(r: &mut Reader<R>) -> Result<Self, CodecError> {
        let len = r.read_u64()?;
        if len > MAX_DECODE_LEN {
            return Err(CodecError::LengthOverflow(len));
        }
        let mut items = Vec::with_capacity(len.min(4096) as usize);
        for _ in 0..len {
            items.push(T::decode(r)?);
        }
        Ok(items)
    }
}

/// Encode a record into a fresh buffer.
pub fn encode_to_vec<T: Encode>(value: &T) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    let mut writer = Writer::new(&mut buf);
    value.encode(&mut writer)?;
    Ok(buf)
}

/// Decode a record from a byte slice.
pub fn decode_from_slice<T: Decode>(bytes: &[u8]) -> Result<T, CodecError> {
    let mut reader = Reader::new(bytes);
    T::decode(&mut reader)
}
