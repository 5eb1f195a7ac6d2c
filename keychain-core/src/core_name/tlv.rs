//! TLV primitives
//!
//! VAR-NUMBER and non-negative integer encodings plus a small reader that
//! walks a buffer of `(type, value)` elements without copying.

use thiserror::Error;

/// TLV type codes used by this crate
pub mod types {
    pub const INTEREST: u64 = 0x05;
    pub const DATA: u64 = 0x06;
    pub const NAME: u64 = 0x07;
    pub const NAME_COMPONENT: u64 = 0x08;
    pub const CONTENT: u64 = 0x15;
    pub const SIGNATURE_INFO: u64 = 0x16;
    pub const SIGNATURE_VALUE: u64 = 0x17;
    pub const SIGNATURE_TYPE: u64 = 0x1b;
    pub const KEY_LOCATOR: u64 = 0x1c;
}

/// TLV decoding errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TlvError {
    #[error("Truncated TLV input")]
    Truncated,

    #[error("TLV length {0} exceeds remaining input")]
    LengthOverflow(u64),

    #[error("Unexpected TLV type: expected {expected}, found {found}")]
    UnexpectedType { expected: u64, found: u64 },

    #[error("Invalid non-negative integer of length {0}")]
    InvalidInteger(usize),
}

/// Append a VAR-NUMBER
pub fn write_var_number(out: &mut Vec<u8>, n: u64) {
    if n < 253 {
        out.push(n as u8);
    } else if n <= u16::MAX as u64 {
        out.push(0xFD);
        out.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= u32::MAX as u64 {
        out.push(0xFE);
        out.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        out.push(0xFF);
        out.extend_from_slice(&n.to_be_bytes());
    }
}

/// Read a VAR-NUMBER, returning the value and the bytes consumed
pub fn read_var_number(input: &[u8]) -> Result<(u64, usize), TlvError> {
    let first = *input.first().ok_or(TlvError::Truncated)?;
    let width = match first {
        0xFD => 2,
        0xFE => 4,
        0xFF => 8,
        n => return Ok((n as u64, 1)),
    };
    let bytes = input.get(1..1 + width).ok_or(TlvError::Truncated)?;
    let value = bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64);
    Ok((value, 1 + width))
}

/// Shortest big-endian encoding of `n` in 1, 2, 4 or 8 bytes
pub fn encode_nonneg_integer(n: u64) -> Vec<u8> {
    if n <= u8::MAX as u64 {
        vec![n as u8]
    } else if n <= u16::MAX as u64 {
        (n as u16).to_be_bytes().to_vec()
    } else if n <= u32::MAX as u64 {
        (n as u32).to_be_bytes().to_vec()
    } else {
        n.to_be_bytes().to_vec()
    }
}

/// Decode a non-negative integer; only 1, 2, 4 and 8 byte forms are valid
pub fn decode_nonneg_integer(bytes: &[u8]) -> Result<u64, TlvError> {
    match bytes.len() {
        1 | 2 | 4 | 8 => Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)),
        len => Err(TlvError::InvalidInteger(len)),
    }
}

/// Append a complete TLV element
pub fn write_tlv(out: &mut Vec<u8>, tlv_type: u64, value: &[u8]) {
    write_var_number(out, tlv_type);
    write_var_number(out, value.len() as u64);
    out.extend_from_slice(value);
}

/// Encode a complete TLV element into a fresh buffer
pub fn encode_tlv(tlv_type: u64, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() + 4);
    write_tlv(&mut out, tlv_type, value);
    out
}

/// Iterates over consecutive TLV elements in a buffer
pub struct TlvReader<'a> {
    input: &'a [u8],
}

impl<'a> TlvReader<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self { input }
    }

    /// Remaining undecoded bytes
    pub fn remaining(&self) -> &'a [u8] {
        self.input
    }

    /// Read the next element, requiring a specific type
    pub fn expect(&mut self, tlv_type: u64) -> Result<&'a [u8], TlvError> {
        match self.next() {
            Some(Ok((found, value))) if found == tlv_type => Ok(value),
            Some(Ok((found, _))) => Err(TlvError::UnexpectedType {
                expected: tlv_type,
                found,
            }),
            Some(Err(e)) => Err(e),
            None => Err(TlvError::Truncated),
        }
    }

    fn read_element(&mut self) -> Result<(u64, &'a [u8]), TlvError> {
        let (tlv_type, type_len) = read_var_number(self.input)?;
        let (length, len_len) = read_var_number(&self.input[type_len..])?;
        let start = type_len + len_len;
        let end = start
            .checked_add(usize::try_from(length).map_err(|_| TlvError::LengthOverflow(length))?)
            .ok_or(TlvError::LengthOverflow(length))?;
        if end > self.input.len() {
            return Err(TlvError::LengthOverflow(length));
        }
        let value = &self.input[start..end];
        self.input = &self.input[end..];
        Ok((tlv_type, value))
    }
}

impl<'a> Iterator for TlvReader<'a> {
    type Item = Result<(u64, &'a [u8]), TlvError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.input.is_empty() {
            return None;
        }
        let item = self.read_element();
        if item.is_err() {
            // stop after the first malformed element
            self.input = &[];
        }
        Some(item)
    }
}
