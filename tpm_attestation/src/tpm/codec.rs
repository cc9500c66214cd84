//! Big-endian readers and writers for TPM 2.0 wire structures.

use super::errors::TpmParseError;

/// Forward-only reader over an immutable byte slice.
///
/// A failed read leaves the position untouched.
#[derive(Debug, Clone)]
pub(crate) struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], TpmParseError> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(TpmParseError::Truncated {
                needed: len,
                remaining,
            });
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub(crate) fn read_array<const N: usize>(&mut self) -> Result<[u8; N], TpmParseError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, TpmParseError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, TpmParseError> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, TpmParseError> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    /// Reads a TPM2B: a 16-bit size followed by exactly that many bytes.
    ///
    /// The prefix is only consumed if the body is fully present.
    pub(crate) fn read_sized(&mut self) -> Result<&'a [u8], TpmParseError> {
        let start = self.pos;
        let len = self.read_u16()? as usize;
        match self.read_bytes(len) {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                self.pos = start;
                Err(e)
            }
        }
    }

    /// Hands the unread tail to a different decoder.
    pub(crate) fn into_remaining(self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    /// Closes the structure: any unread byte is an error.
    pub(crate) fn finish(self) -> Result<(), TpmParseError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(TpmParseError::TrailingData(n)),
        }
    }
}

pub(crate) fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub(crate) fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Appends `bytes` prefixed with its 16-bit length.
///
/// Callers only pass buffers that were themselves read through `read_sized`,
/// so the length always fits.
pub(crate) fn put_sized(out: &mut Vec<u8>, bytes: &[u8]) {
    let len = u16::try_from(bytes.len()).unwrap_or(u16::MAX);
    put_u16(out, len);
    out.extend_from_slice(&bytes[..len as usize]);
}
