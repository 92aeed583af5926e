//! MessagePack tag reader
//!
//! Reads one tag at a time without materializing payloads. Str, bin and
//! ext tags carry only their length; the payload is read (or skipped)
//! separately, either through [`BinaryReader::read_bytes`] or by using the
//! reader itself as an [`io::Read`] limited to that length.

use std::io::{self, Read};

use rmp::Marker;
use tracing::trace;

use crate::error::{Error, Result};

/// Largest buffer growth step for payloads
const READ_CHUNK: usize = 64 * 1024;

/// Header of one MessagePack value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tag {
    Nil,
    Bool(bool),
    /// Signed integer encodings (negative fixint, int8..int64)
    Int(i64),
    /// Unsigned integer encodings (positive fixint, uint8..uint64)
    UInt(u64),
    F32(f32),
    F64(f64),
    /// String of the given byte length
    Str(u32),
    /// Bin of the given byte length
    Bin(u32),
    /// Ext type and byte length
    Ext(i8, u32),
    /// Array with the given element count
    Array(u32),
    /// Map with the given pair count
    Map(u32),
}

impl Tag {
    /// Name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Tag::Nil => "nil",
            Tag::Bool(_) => "bool",
            Tag::Int(_) => "int",
            Tag::UInt(_) => "uint",
            Tag::F32(_) => "float",
            Tag::F64(_) => "double",
            Tag::Str(_) => "str",
            Tag::Bin(_) => "bin",
            Tag::Ext(..) => "ext",
            Tag::Array(_) => "array",
            Tag::Map(_) => "map",
        }
    }
}

/// Pull-style MessagePack reader over any byte source
pub struct BinaryReader<R> {
    inner: R,
    /// Byte read ahead by `is_exhausted`
    peeked: Option<u8>,
    /// Bytes consumed so far
    offset: u64,
}

impl<R: Read> BinaryReader<R> {
    /// Wrap a byte source
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            peeked: None,
            offset: 0,
        }
    }

    /// Number of bytes consumed so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Unwrap the byte source
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Look ahead one byte: true if the source ended cleanly.
    ///
    /// Nothing is consumed; a following `read_tag` sees the peeked byte.
    pub fn is_exhausted(&mut self) -> Result<bool> {
        if self.peeked.is_some() {
            return Ok(false);
        }
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return Ok(true),
                Ok(_) => {
                    self.peeked = Some(byte[0]);
                    return Ok(false);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    /// Read the next tag
    pub fn read_tag(&mut self) -> Result<Tag> {
        let start = self.offset;
        if self.is_exhausted()? {
            return Err(Error::grammar(start, "unexpected end of input, expected a value"));
        }
        let byte = self.fixed::<1>()?[0];

        let tag = match Marker::from_u8(byte) {
            Marker::FixPos(n) => Tag::UInt(n as u64),
            Marker::FixNeg(n) => Tag::Int(n as i64),
            Marker::Null => Tag::Nil,
            Marker::True => Tag::Bool(true),
            Marker::False => Tag::Bool(false),
            Marker::U8 => Tag::UInt(self.fixed::<1>()?[0] as u64),
            Marker::U16 => Tag::UInt(u16::from_be_bytes(self.fixed()?) as u64),
            Marker::U32 => Tag::UInt(u32::from_be_bytes(self.fixed()?) as u64),
            Marker::U64 => Tag::UInt(u64::from_be_bytes(self.fixed()?)),
            Marker::I8 => Tag::Int(i8::from_be_bytes(self.fixed()?) as i64),
            Marker::I16 => Tag::Int(i16::from_be_bytes(self.fixed()?) as i64),
            Marker::I32 => Tag::Int(i32::from_be_bytes(self.fixed()?) as i64),
            Marker::I64 => Tag::Int(i64::from_be_bytes(self.fixed()?)),
            Marker::F32 => Tag::F32(f32::from_be_bytes(self.fixed()?)),
            Marker::F64 => Tag::F64(f64::from_be_bytes(self.fixed()?)),
            Marker::FixStr(len) => Tag::Str(len as u32),
            Marker::Str8 => Tag::Str(self.len8()?),
            Marker::Str16 => Tag::Str(self.len16()?),
            Marker::Str32 => Tag::Str(self.len32()?),
            Marker::Bin8 => Tag::Bin(self.len8()?),
            Marker::Bin16 => Tag::Bin(self.len16()?),
            Marker::Bin32 => Tag::Bin(self.len32()?),
            Marker::FixArray(len) => Tag::Array(len as u32),
            Marker::Array16 => Tag::Array(self.len16()?),
            Marker::Array32 => Tag::Array(self.len32()?),
            Marker::FixMap(len) => Tag::Map(len as u32),
            Marker::Map16 => Tag::Map(self.len16()?),
            Marker::Map32 => Tag::Map(self.len32()?),
            Marker::FixExt1 => Tag::Ext(self.exttype()?, 1),
            Marker::FixExt2 => Tag::Ext(self.exttype()?, 2),
            Marker::FixExt4 => Tag::Ext(self.exttype()?, 4),
            Marker::FixExt8 => Tag::Ext(self.exttype()?, 8),
            Marker::FixExt16 => Tag::Ext(self.exttype()?, 16),
            Marker::Ext8 => {
                let len = self.len8()?;
                Tag::Ext(self.exttype()?, len)
            }
            Marker::Ext16 => {
                let len = self.len16()?;
                Tag::Ext(self.exttype()?, len)
            }
            Marker::Ext32 => {
                let len = self.len32()?;
                Tag::Ext(self.exttype()?, len)
            }
            Marker::Reserved => {
                return Err(Error::grammar(start, format!("invalid type marker 0x{:02X}", byte)));
            }
        };

        trace!(offset = start, ?tag, "read tag");
        Ok(tag)
    }

    /// Read exactly `len` payload bytes into a new buffer.
    ///
    /// The buffer grows with the data actually read, so a declared length
    /// larger than the input fails as truncated instead of allocating it.
    pub fn read_bytes(&mut self, len: u32) -> Result<Vec<u8>> {
        let start = self.offset;
        let size = len as usize;
        let mut buf = Vec::new();
        while buf.len() < size {
            let chunk = (size - buf.len()).min(READ_CHUNK);
            buf.try_reserve_exact(chunk).map_err(|_| Error::Alloc { size })?;
            let read = self.by_ref().take(chunk as u64).read_to_end(&mut buf)?;
            if read < chunk {
                return Err(truncated(start));
            }
        }
        Ok(buf)
    }

    /// Discard `len` payload bytes
    pub fn skip_bytes(&mut self, len: u32) -> Result<()> {
        let start = self.offset;
        let skipped = io::copy(&mut self.by_ref().take(len as u64), &mut io::sink())?;
        if skipped < len as u64 {
            return Err(truncated(start));
        }
        Ok(())
    }

    /// Fill `buf` completely, treating a short read as truncated input
    pub fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        let start = self.offset;
        self.read_exact(buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => truncated(start),
            _ => Error::Io(e),
        })
    }

    fn fixed<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.fill(&mut buf)?;
        Ok(buf)
    }

    fn len8(&mut self) -> Result<u32> {
        Ok(self.fixed::<1>()?[0] as u32)
    }

    fn len16(&mut self) -> Result<u32> {
        Ok(u16::from_be_bytes(self.fixed()?) as u32)
    }

    fn len32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.fixed()?))
    }

    fn exttype(&mut self) -> Result<i8> {
        Ok(i8::from_be_bytes(self.fixed()?))
    }
}

impl<R: Read> Read for BinaryReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if let Some(byte) = self.peeked.take() {
            buf[0] = byte;
            self.offset += 1;
            return Ok(1);
        }
        let n = self.inner.read(buf)?;
        self.offset += n as u64;
        Ok(n)
    }
}

fn truncated(offset: u64) -> Error {
    Error::grammar(offset, "unexpected end of input, data is truncated")
}
