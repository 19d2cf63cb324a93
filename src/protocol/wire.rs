//! Wire codec
//!
//! Message framing and field encoding for the socket protocol. Every
//! message is an 8-byte header (object id, opcode, total length including
//! the header, all little-endian) followed by a 4-byte-aligned body.
//!
//! Field types: u32/i32 words, 24.8 fixed-point reals, length-prefixed
//! NUL-terminated strings padded to 4 bytes, and byte-length-prefixed
//! arrays. File descriptors travel out-of-band as ancillary data and never
//! appear in the body.

use crate::error::ProtocolError;

/// Header size in bytes.
pub const HEADER_LEN: usize = 8;

/// A decoded inbound message: header fields plus the raw body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub object_id: u32,
    pub opcode: u16,
    pub body: Vec<u8>,
}

impl Message {
    /// Decode a header; returns (object id, opcode, declared body length).
    pub fn decode_header(header: &[u8; HEADER_LEN]) -> Result<(u32, u16, usize), ProtocolError> {
        let object_id = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let opcode = u16::from_le_bytes([header[4], header[5]]);
        let total = u16::from_le_bytes([header[6], header[7]]) as usize;
        if total < HEADER_LEN {
            return Err(ProtocolError::Malformed("declared length below header size"));
        }
        Ok((object_id, opcode, total - HEADER_LEN))
    }

    pub fn new(object_id: u32, opcode: u16, body: Vec<u8>) -> Self {
        Self {
            object_id,
            opcode,
            body,
        }
    }

    /// A cursor over the body fields.
    pub fn reader(&self) -> Reader<'_> {
        Reader {
            buf: &self.body,
            pos: 0,
        }
    }
}

/// Sequential field reader over a message body.
#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], ProtocolError> {
        if self.pos + n > self.buf.len() {
            return Err(ProtocolError::Truncated(field));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn u32(&mut self, field: &'static str) -> Result<u32, ProtocolError> {
        let b = self.take(4, field)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn i32(&mut self, field: &'static str) -> Result<i32, ProtocolError> {
        Ok(self.u32(field)? as i32)
    }

    /// A 24.8 fixed-point real.
    pub fn fixed(&mut self, field: &'static str) -> Result<f32, ProtocolError> {
        Ok(self.u32(field)? as i32 as f32 / 256.0)
    }

    /// A length-prefixed NUL-terminated string, padded to 4 bytes. A zero
    /// length is the null string (no bytes follow, not even a NUL) and
    /// decodes as empty; writers always emit at least the NUL.
    pub fn string(&mut self, field: &'static str) -> Result<String, ProtocolError> {
        let len = self.u32(field)? as usize;
        if len == 0 {
            return Ok(String::new());
        }
        let padded = (len + 3) & !3;
        let raw = self.take(padded, field)?;
        let text = &raw[..len - 1];
        String::from_utf8(text.to_vec()).map_err(|_| ProtocolError::Malformed(field))
    }

    /// A byte-length-prefixed array, padded to 4 bytes.
    pub fn array(&mut self, field: &'static str) -> Result<&'a [u8], ProtocolError> {
        let len = self.u32(field)? as usize;
        let padded = (len + 3) & !3;
        let raw = self.take(padded, field)?;
        Ok(&raw[..len])
    }
}

/// Builder for outbound messages; `build` patches the length word.
#[derive(Debug)]
pub struct MessageBuilder {
    buf: Vec<u8>,
}

impl MessageBuilder {
    pub fn new(object_id: u32, opcode: u16) -> Self {
        let mut buf = Vec::with_capacity(HEADER_LEN + 16);
        buf.extend_from_slice(&object_id.to_le_bytes());
        buf.extend_from_slice(&opcode.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        Self { buf }
    }

    pub fn u32(mut self, v: u32) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn i32(self, v: i32) -> Self {
        self.u32(v as u32)
    }

    /// Encode a 24.8 fixed-point real via the double-mantissa bias trick:
    /// adding 3 * 2^43 places value * 256 in the low mantissa bits.
    pub fn fixed(self, v: f64) -> Self {
        let bits = (v + (3i64 << 43) as f64).to_bits();
        self.u32(bits as u32)
    }

    pub fn string(mut self, s: &str) -> Self {
        let len = s.len() + 1;
        self.buf.extend_from_slice(&(len as u32).to_le_bytes());
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
        while self.buf.len() % 4 != 0 {
            self.buf.push(0);
        }
        self
    }

    pub fn array_bytes(mut self, bytes: &[u8]) -> Self {
        self.buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(bytes);
        while self.buf.len() % 4 != 0 {
            self.buf.push(0);
        }
        self
    }

    pub fn array_u32(self, words: &[u32]) -> Self {
        let mut bytes = Vec::with_capacity(words.len() * 4);
        for w in words {
            bytes.extend_from_slice(&w.to_le_bytes());
        }
        self.array_bytes(&bytes)
    }

    /// Finish the message, writing the total length into the header.
    pub fn build(mut self) -> Vec<u8> {
        let total = self.buf.len() as u16;
        self.buf[6..8].copy_from_slice(&total.to_le_bytes());
        self.buf
    }
}
