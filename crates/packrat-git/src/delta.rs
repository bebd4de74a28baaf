//! Git delta instruction streams.
//!
//! A delta starts with two little-endian base-128 varints (source size,
//! target size) followed by instructions. A control byte with the high
//! bit clear inserts the next `n` literal bytes (`n` = low seven bits).
//! With the high bit set, bits 0-3 select which bytes of a 4-byte
//! little-endian offset follow and bits 4-6 which bytes of a 3-byte
//! length; the named range of the base is copied, and a length of zero
//! means `0x10000`.

use crate::{GitError, Result};
use bytes::Bytes;
use packrat_storage::ObjectId;

/// Copy length used when the encoded length is zero.
pub const DEFAULT_COPY_LEN: usize = 0x10000;

/// A ref-delta waiting for its base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaRecord {
    /// Id of the base object.
    pub base: ObjectId,
    /// Decompressed instruction stream.
    pub instructions: Bytes,
}

/// Size fields at the start of a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaHeader {
    /// Declared base size.
    pub source_size: u64,
    /// Declared result size.
    pub target_size: u64,
}

/// One delta instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaInstruction<'a> {
    /// Copy `length` bytes of the base starting at `offset`.
    Copy {
        /// Start offset in the base.
        offset: usize,
        /// Number of bytes to copy.
        length: usize,
    },
    /// Append literal bytes.
    Insert(&'a [u8]),
}

impl<'a> DeltaInstruction<'a> {
    /// Parses every instruction after the size header.
    pub fn parse_all(stream: &'a [u8]) -> Result<Vec<Self>> {
        parse_delta(stream).map(|(_, instructions)| instructions)
    }
}

/// Reads a little-endian base-128 varint at `*pos`.
fn read_varint(data: &[u8], pos: &mut usize) -> Result<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = *data
            .get(*pos)
            .ok_or_else(|| GitError::InvalidDelta("truncated size header".to_string()))?;
        *pos += 1;
        if shift > 63 {
            return Err(GitError::InvalidDelta("size header overflows u64".to_string()));
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

/// Gathers the bytes selected by `mask` into a little-endian integer.
fn read_sparse(data: &[u8], pos: &mut usize, mask: u8, width: u32) -> Result<usize> {
    let mut value = 0usize;
    for i in 0..width {
        if mask & (1 << i) != 0 {
            let byte = *data
                .get(*pos)
                .ok_or_else(|| GitError::InvalidDelta("truncated copy instruction".to_string()))?;
            *pos += 1;
            value |= usize::from(byte) << (8 * i);
        }
    }
    Ok(value)
}

/// Parses a whole instruction stream.
pub fn parse_delta(stream: &[u8]) -> Result<(DeltaHeader, Vec<DeltaInstruction<'_>>)> {
    let mut pos = 0;
    let header = DeltaHeader {
        source_size: read_varint(stream, &mut pos)?,
        target_size: read_varint(stream, &mut pos)?,
    };

    let mut instructions = Vec::new();
    while pos < stream.len() {
        let control = stream[pos];
        pos += 1;

        if control & 0x80 == 0 {
            if control == 0 {
                return Err(GitError::InvalidDelta("reserved instruction 0x00".to_string()));
            }
            let end = pos + usize::from(control);
            let literal = stream
                .get(pos..end)
                .ok_or_else(|| GitError::InvalidDelta("truncated insert instruction".to_string()))?;
            instructions.push(DeltaInstruction::Insert(literal));
            pos = end;
        } else {
            let offset = read_sparse(stream, &mut pos, control & 0x0f, 4)?;
            let length = match read_sparse(stream, &mut pos, (control >> 4) & 0x07, 3)? {
                0 => DEFAULT_COPY_LEN,
                n => n,
            };
            instructions.push(DeltaInstruction::Copy { offset, length });
        }
    }

    Ok((header, instructions))
}

/// Applies a delta to `base` and returns the reconstructed bytes.
///
/// Every copy must satisfy `offset + length <= base.len()`. The declared
/// sizes are not checked against the base or the output.
pub fn apply_delta(base: &[u8], stream: &[u8]) -> Result<Vec<u8>> {
    let (header, instructions) = parse_delta(stream)?;
    let mut out = Vec::with_capacity(usize::try_from(header.target_size).unwrap_or(0).min(1 << 24));

    for instruction in instructions {
        match instruction {
            DeltaInstruction::Insert(literal) => out.extend_from_slice(literal),
            DeltaInstruction::Copy { offset, length } => {
                let range = offset
                    .checked_add(length)
                    .filter(|end| *end <= base.len())
                    .map(|end| offset..end)
                    .ok_or_else(|| {
                        GitError::InvalidDelta(format!(
                            "copy of {} bytes at offset {} exceeds base of {} bytes",
                            length,
                            offset,
                            base.len()
                        ))
                    })?;
                out.extend_from_slice(&base[range]);
            }
        }
    }

    if out.len() as u64 != header.target_size {
        tracing::debug!(
            declared = header.target_size,
            actual = out.len(),
            "delta result size differs from header"
        );
    }
    Ok(out)
}
