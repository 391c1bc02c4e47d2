//! Block-wise transfer options (RFC 7959)
//!
//! The endpoint core only constructs the *first* block of an oversized
//! notification in-place; everything else about segmentation belongs to the
//! block layer sitting on top of the endpoint. This module carries just the
//! option value type that both sides agree on.

use bytes::Bytes;
use std::fmt;

/// Negotiable block size. The wire encoding (szx) is `log2(size) - 4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockSize {
    S16,
    S32,
    S64,
    S128,
    S256,
    S512,
    S1024,
}

impl BlockSize {
    /// Block size in bytes.
    pub fn size(&self) -> usize {
        match self {
            BlockSize::S16 => 16,
            BlockSize::S32 => 32,
            BlockSize::S64 => 64,
            BlockSize::S128 => 128,
            BlockSize::S256 => 256,
            BlockSize::S512 => 512,
            BlockSize::S1024 => 1024,
        }
    }

    /// The szx exponent carried on the wire.
    pub fn szx(&self) -> u8 {
        (self.size().trailing_zeros() as u8) - 4
    }
}

/// A decoded block1/block2 option value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockOption {
    /// Block number within the transfer
    pub num: u32,
    /// Negotiated block size
    pub size: BlockSize,
    /// More blocks follow this one
    pub more: bool,
}

impl BlockOption {
    pub fn new(num: u32, size: BlockSize, more: bool) -> Self {
        Self { num, size, more }
    }

    /// Slice the block this option describes out of a full payload.
    pub fn block_part(&self, payload: &Bytes) -> Bytes {
        let block = self.size.size();
        let from = (self.num as usize).saturating_mul(block).min(payload.len());
        let to = (from + block).min(payload.len());
        payload.slice(from..to)
    }
}

impl fmt::Display for BlockOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.num, if self.more { "M" } else { "-" }, self.size.size())
    }
}
