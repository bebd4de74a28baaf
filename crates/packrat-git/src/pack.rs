//! Git pack stream decoding.
//!
//! A pack is `"PACK"`, a big-endian u32 version, a big-endian u32 entry
//! count, then that many entries. Each entry starts with a type/size
//! header and continues with a zlib stream; ref-deltas put the 20-byte
//! base id between the two.
//! See: https://git-scm.com/docs/pack-format

use crate::sideband::{PACK_HEADER_LEN, PACK_SIGNATURE};
use crate::{GitError, Result};
use bytes::Bytes;
use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use packrat_storage::{ObjectId, ObjectType};
use sha1::{Digest, Sha1};
use std::io::Write;

/// Pack type code for a delta against a base named by id.
pub const REF_DELTA: u8 = 7;

/// Upper bound on the buffer reserved up front from a declared size.
const MAX_PREALLOC: usize = 1 << 20;

/// Parsed pack header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackHeader {
    /// Pack format version (2 or 3).
    pub version: u32,
    /// Number of entries that follow.
    pub object_count: u32,
}

impl PackHeader {
    /// Parses and validates the 12-byte pack header.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < PACK_HEADER_LEN {
            return Err(GitError::ProtocolFraming("pack too small".to_string()));
        }
        if &data[0..4] != PACK_SIGNATURE {
            return Err(GitError::ProtocolFraming("invalid pack signature".to_string()));
        }

        let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if version != 2 && version != 3 {
            return Err(GitError::ProtocolFraming(format!(
                "unsupported pack version: {}",
                version
            )));
        }

        let object_count = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
        Ok(Self {
            version,
            object_count,
        })
    }
}

/// Type and declared size of one pack entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    /// Raw type code (bits 4-6 of the first byte).
    pub type_code: u8,
    /// Declared uncompressed size; informational only.
    pub size: u64,
}

/// Reads an entry's type/size header, returning it with the number of
/// bytes consumed.
///
/// The first byte holds a continuation bit, three type bits and the low
/// four size bits; each following byte adds seven more size bits,
/// little-endian, while its continuation bit is set.
pub fn read_entry_header(data: &[u8]) -> Result<(EntryHeader, usize)> {
    let first = *data
        .first()
        .ok_or_else(|| GitError::ProtocolFraming("unexpected end of pack".to_string()))?;

    let type_code = (first >> 4) & 0x07;
    let mut size = u64::from(first & 0x0f);
    let mut shift = 4u32;
    let mut pos = 1;
    let mut more = first & 0x80 != 0;

    while more {
        let byte = *data
            .get(pos)
            .ok_or_else(|| GitError::ProtocolFraming("unexpected end in entry size".to_string()))?;
        pos += 1;
        if shift > 57 {
            return Err(GitError::ProtocolFraming("entry size overflows u64".to_string()));
        }
        size |= u64::from(byte & 0x7f) << shift;
        shift += 7;
        more = byte & 0x80 != 0;
    }

    Ok((EntryHeader { type_code, size }, pos))
}

/// Inflates one zlib stream from the front of `input`.
///
/// Returns the decompressed bytes and the number of input bytes the
/// stream occupied; anything after the stream end is left alone.
pub fn inflate(input: &[u8], size_hint: usize) -> Result<(Vec<u8>, usize)> {
    let mut inflater = Decompress::new(true);
    let mut out = Vec::with_capacity(size_hint.clamp(64, MAX_PREALLOC));

    loop {
        let consumed_before = inflater.total_in() as usize;
        let produced_before = out.len();

        let status = inflater
            .decompress_vec(&input[consumed_before..], &mut out, FlushDecompress::None)
            .map_err(|e| GitError::Decompression(e.to_string()))?;

        let consumed = inflater.total_in() as usize;
        match status {
            Status::StreamEnd => return Ok((out, consumed)),
            Status::Ok | Status::BufError => {
                if out.len() == out.capacity() {
                    out.reserve(out.capacity().max(64));
                    continue;
                }
                if consumed == input.len() {
                    return Err(GitError::Decompression("truncated zlib stream".to_string()));
                }
                if consumed == consumed_before && out.len() == produced_before {
                    return Err(GitError::Decompression("zlib stream made no progress".to_string()));
                }
            }
        }
    }
}

/// A decoded pack entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackEntry {
    /// Whole commit payload.
    Commit(Bytes),
    /// Whole tree payload.
    Tree(Bytes),
    /// Whole blob payload.
    Blob(Bytes),
    /// Delta instructions against the object `base`.
    RefDelta {
        /// Id of the base object.
        base: ObjectId,
        /// Decompressed instruction stream.
        instructions: Bytes,
    },
}

impl PackEntry {
    /// Returns the entry's kind for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Commit(_) => "commit",
            Self::Tree(_) => "tree",
            Self::Blob(_) => "blob",
            Self::RefDelta { .. } => "ref-delta",
        }
    }
}

/// Decodes the entries of a pack stream in order.
///
/// Iteration yields `Err` at most once; any error ends the stream since
/// a partial pack is not usable.
pub struct PackDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    header: PackHeader,
    remaining: u32,
}

impl<'a> PackDecoder<'a> {
    /// Validates the pack header. Fails before any entry is decoded.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let header = PackHeader::parse(data)?;
        tracing::debug!(
            version = header.version,
            objects = header.object_count,
            "pack header"
        );
        Ok(Self {
            data,
            pos: PACK_HEADER_LEN,
            header,
            remaining: header.object_count,
        })
    }

    /// Returns the parsed header.
    pub fn header(&self) -> PackHeader {
        self.header
    }

    /// Returns the offset of the next unread byte.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Decodes the next entry, or `None` once all entries are read.
    pub fn next_entry(&mut self) -> Result<Option<PackEntry>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        match self.decode_entry() {
            Ok(entry) => {
                self.remaining -= 1;
                Ok(Some(entry))
            }
            Err(e) => {
                self.remaining = 0;
                Err(e)
            }
        }
    }

    fn decode_entry(&mut self) -> Result<PackEntry> {
        let offset = self.pos;
        let (header, used) = read_entry_header(&self.data[self.pos..])?;
        self.pos += used;

        let size_hint = usize::try_from(header.size).unwrap_or(MAX_PREALLOC);
        let entry = match header.type_code {
            code @ 1..=3 => {
                let payload = self.inflate_next(size_hint)?;
                match ObjectType::from_pack_type(code) {
                    Some(ObjectType::Commit) => PackEntry::Commit(payload),
                    Some(ObjectType::Tree) => PackEntry::Tree(payload),
                    _ => PackEntry::Blob(payload),
                }
            }
            REF_DELTA => {
                let end = self.pos + ObjectId::LEN;
                let raw = self.data.get(self.pos..end).ok_or_else(|| {
                    GitError::ProtocolFraming("unexpected end in delta base id".to_string())
                })?;
                let base = ObjectId::from_slice(raw)?;
                self.pos = end;
                let instructions = self.inflate_next(size_hint)?;
                PackEntry::RefDelta { base, instructions }
            }
            other => return Err(GitError::UnknownObjectType(other)),
        };

        tracing::trace!(offset, kind = entry.kind(), size = header.size, "decoded pack entry");
        Ok(entry)
    }

    fn inflate_next(&mut self, size_hint: usize) -> Result<Bytes> {
        let (payload, consumed) = inflate(&self.data[self.pos..], size_hint)?;
        self.pos += consumed;
        Ok(Bytes::from(payload))
    }
}

impl Iterator for PackDecoder<'_> {
    type Item = Result<PackEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

/// Builds pack streams, including ref-delta entries.
///
/// Produces exactly what a remote sends: header, entries and a SHA-1
/// trailer over everything before it.
#[derive(Debug, Default)]
pub struct PackBuilder {
    entries: Vec<(u8, Option<ObjectId>, Vec<u8>)>,
}

impl PackBuilder {
    /// Creates a new pack builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a whole object.
    pub fn add(&mut self, object_type: ObjectType, data: impl Into<Vec<u8>>) -> &mut Self {
        self.entries
            .push((object_type.pack_type(), None, data.into()));
        self
    }

    /// Adds a ref-delta entry against `base`.
    pub fn add_ref_delta(&mut self, base: ObjectId, instructions: impl Into<Vec<u8>>) -> &mut Self {
        self.entries
            .push((REF_DELTA, Some(base), instructions.into()));
        self
    }

    /// Builds the pack stream.
    pub fn build(&self) -> Result<Vec<u8>> {
        let mut pack = Vec::new();

        pack.extend_from_slice(PACK_SIGNATURE);
        pack.extend_from_slice(&2u32.to_be_bytes());
        pack.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());

        for (type_code, base, data) in &self.entries {
            write_entry_header(&mut pack, *type_code, data.len());
            if let Some(base) = base {
                pack.extend_from_slice(base.as_bytes());
            }
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data)?;
            pack.extend_from_slice(&encoder.finish()?);
        }

        let checksum = Sha1::digest(&pack);
        pack.extend_from_slice(&checksum);
        Ok(pack)
    }
}

fn write_entry_header(pack: &mut Vec<u8>, type_code: u8, size: usize) {
    let mut first_byte = (type_code << 4) | ((size & 0x0f) as u8);
    let mut remaining = size >> 4;
    if remaining > 0 {
        first_byte |= 0x80;
    }
    pack.push(first_byte);

    while remaining > 0 {
        let mut byte = (remaining & 0x7f) as u8;
        remaining >>= 7;
        if remaining > 0 {
            byte |= 0x80;
        }
        pack.push(byte);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip_trailer(mut pack: Vec<u8>) -> Vec<u8> {
        pack.truncate(pack.len() - 20);
        pack
    }

    #[test]
    fn test_read_entry_header_multibyte() {
        // type 3 (blob), size 0x5 | (0x12 << 4) = 293
        let (header, used) = read_entry_header(&[0xb5, 0x12, 0xff]).unwrap();
        assert_eq!(header.type_code, 3);
        assert_eq!(header.size, 293);
        assert_eq!(used, 2);
    }

    #[test]
    fn test_read_entry_header_truncated() {
        assert!(read_entry_header(&[]).is_err());
        assert!(read_entry_header(&[0x95, 0x80]).is_err());
    }

    #[test]
    fn test_builder_header_matches_reader() {
        for size in [0usize, 15, 16, 2047, 1 << 20] {
            let mut buf = Vec::new();
            write_entry_header(&mut buf, 2, size);
            let (header, used) = read_entry_header(&buf).unwrap();
            assert_eq!(header.type_code, 2);
            assert_eq!(header.size, size as u64);
            assert_eq!(used, buf.len());
        }
    }

    #[test]
    fn test_decode_whole_objects_in_order() {
        let tree_raw = b"100644 a\0aaaaaaaaaaaaaaaaaaaa".to_vec();
        let pack = PackBuilder::new()
            .add(ObjectType::Commit, b"tree x\n".to_vec())
            .add(ObjectType::Tree, tree_raw.clone())
            .add(ObjectType::Blob, b"hello".to_vec())
            .build()
            .unwrap();

        let decoder = PackDecoder::new(&pack).unwrap();
        assert_eq!(decoder.header(), PackHeader { version: 2, object_count: 3 });
        let entries: Vec<PackEntry> = decoder.collect::<Result<_>>().unwrap();
        assert_eq!(
            entries,
            vec![
                PackEntry::Commit(Bytes::from_static(b"tree x\n")),
                PackEntry::Tree(Bytes::from(tree_raw)),
                PackEntry::Blob(Bytes::from_static(b"hello")),
            ]
        );
    }

    #[test]
    fn test_decode_ignores_missing_trailer() {
        let pack = strip_trailer(
            PackBuilder::new()
                .add(ObjectType::Blob, b"no checksum needed".to_vec())
                .build()
                .unwrap(),
        );
        let mut decoder = PackDecoder::new(&pack).unwrap();
        assert!(matches!(decoder.next_entry().unwrap(), Some(PackEntry::Blob(_))));
        assert_eq!(decoder.position(), pack.len());
        assert!(decoder.next_entry().unwrap().is_none());
    }

    #[test]
    fn test_decode_ref_delta() {
        let base = ObjectId::from_bytes([0x42; 20]);
        let pack = PackBuilder::new()
            .add_ref_delta(base, vec![0x05, 0x03, 0x03, b'a', b'b', b'c'])
            .build()
            .unwrap();

        let mut decoder = PackDecoder::new(&pack).unwrap();
        match decoder.next_entry().unwrap() {
            Some(PackEntry::RefDelta {
                base: got,
                instructions,
            }) => {
                assert_eq!(got, base);
                assert_eq!(instructions.as_ref(), &[0x05, 0x03, 0x03, b'a', b'b', b'c']);
            }
            other => panic!("unexpected entry {other:?}"),
        }
    }

    #[test]
    fn test_bad_magic_fails_before_decoding() {
        let mut pack = PackBuilder::new()
            .add(ObjectType::Blob, b"x".to_vec())
            .build()
            .unwrap();
        pack[3] = b'X';
        assert!(matches!(
            PackDecoder::new(&pack),
            Err(GitError::ProtocolFraming(_))
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let mut pack = b"PACK".to_vec();
        pack.extend_from_slice(&99u32.to_be_bytes());
        pack.extend_from_slice(&0u32.to_be_bytes());
        assert!(matches!(
            PackDecoder::new(&pack),
            Err(GitError::ProtocolFraming(_))
        ));
    }

    #[test]
    fn test_unknown_object_type() {
        let mut pack = b"PACK".to_vec();
        pack.extend_from_slice(&2u32.to_be_bytes());
        pack.extend_from_slice(&1u32.to_be_bytes());
        pack.push(0x60); // type 6 (ofs-delta), size 0

        let mut decoder = PackDecoder::new(&pack).unwrap();
        assert!(matches!(
            decoder.next_entry(),
            Err(GitError::UnknownObjectType(6))
        ));
        assert!(decoder.next_entry().unwrap().is_none());
    }

    #[test]
    fn test_tag_type_is_unknown() {
        let mut pack = b"PACK".to_vec();
        pack.extend_from_slice(&2u32.to_be_bytes());
        pack.extend_from_slice(&1u32.to_be_bytes());
        pack.push(0x40);
        let mut decoder = PackDecoder::new(&pack).unwrap();
        assert!(matches!(
            decoder.next_entry(),
            Err(GitError::UnknownObjectType(4))
        ));
    }

    #[test]
    fn test_truncated_payload() {
        let pack = PackBuilder::new()
            .add(ObjectType::Blob, (0..4096u32).map(|i| (i * 31 % 251) as u8).collect::<Vec<_>>())
            .build()
            .unwrap();
        let cut = &pack[..pack.len() - 30];
        let mut decoder = PackDecoder::new(cut).unwrap();
        assert!(matches!(
            decoder.next_entry(),
            Err(GitError::Decompression(_))
        ));
    }

    #[test]
    fn test_corrupt_payload() {
        let mut pack = b"PACK".to_vec();
        pack.extend_from_slice(&2u32.to_be_bytes());
        pack.extend_from_slice(&1u32.to_be_bytes());
        pack.push(0x35);
        pack.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef, 0x00, 0x11]);
        let mut decoder = PackDecoder::new(&pack).unwrap();
        assert!(matches!(
            decoder.next_entry(),
            Err(GitError::Decompression(_))
        ));
    }

    #[test]
    fn test_more_entries_declared_than_present() {
        let mut pack = strip_trailer(
            PackBuilder::new()
                .add(ObjectType::Blob, b"only one".to_vec())
                .build()
                .unwrap(),
        );
        pack[11] = 2;
        let results: Vec<_> = PackDecoder::new(&pack).unwrap().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(GitError::ProtocolFraming(_))));
    }

    #[test]
    fn test_inflate_reports_consumed_length() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"payload").unwrap();
        let mut stream = encoder.finish().unwrap();
        let len = stream.len();
        stream.extend_from_slice(b"next entry");

        let (out, consumed) = inflate(&stream, 0).unwrap();
        assert_eq!(out, b"payload");
        assert_eq!(consumed, len);
    }

    #[test]
    fn test_inflate_grows_past_size_hint() {
        let data = vec![1u8; 10_000];
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&data).unwrap();
        let stream = encoder.finish().unwrap();

        let (out, _) = inflate(&stream, 3).unwrap();
        assert_eq!(out, data);
    }
}
