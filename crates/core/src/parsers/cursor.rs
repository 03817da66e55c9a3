use serde::Serialize;
use thiserror::Error;

/// Byte order of the machine that wrote a metric's index and data files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    pub fn u16(self, bytes: [u8; 2]) -> u16 {
        match self {
            Self::Little => u16::from_le_bytes(bytes),
            Self::Big => u16::from_be_bytes(bytes),
        }
    }

    pub fn u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            Self::Little => u32::from_le_bytes(bytes),
            Self::Big => u32::from_be_bytes(bytes),
        }
    }

    pub fn u64(self, bytes: [u8; 8]) -> u64 {
        match self {
            Self::Little => u64::from_le_bytes(bytes),
            Self::Big => u64::from_be_bytes(bytes),
        }
    }

    pub fn f64(self, bytes: [u8; 8]) -> f64 {
        f64::from_bits(self.u64(bytes))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unexpected end of input: needed {needed} bytes, {remaining} remaining")]
pub struct UnexpectedEof {
    pub needed: usize,
    pub remaining: usize,
}

/// Copy the first `N` bytes of `bytes`. Callers slice exact-size chunks.
pub(crate) fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

/// Forward-only reader over an in-memory member.
#[derive(Debug, Clone)]
pub struct BinaryCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BinaryCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], UnexpectedEof> {
        if n > self.remaining() {
            return Err(UnexpectedEof {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Everything not yet consumed.
    pub fn rest(&mut self) -> &'a [u8] {
        let out = &self.data[self.pos..];
        self.pos = self.data.len();
        out
    }

    pub fn read_u8(&mut self) -> Result<u8, UnexpectedEof> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i16(&mut self, order: ByteOrder) -> Result<i16, UnexpectedEof> {
        Ok(order.u16(array(self.take(2)?)) as i16)
    }

    pub fn read_i32(&mut self, order: ByteOrder) -> Result<i32, UnexpectedEof> {
        Ok(order.u32(array(self.take(4)?)) as i32)
    }

    pub fn read_i64(&mut self, order: ByteOrder) -> Result<i64, UnexpectedEof> {
        Ok(order.u64(array(self.take(8)?)) as i64)
    }
}
