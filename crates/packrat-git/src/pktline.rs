//! Git pkt-line format implementation.
//!
//! Every protocol line is prefixed with a 4-character hex length that
//! counts the prefix itself. `0000` is a flush packet, `0001` a delimiter
//! and `0002` a response-end marker; none of them carry a payload.

use crate::{GitError, Result};
use std::io::{Read, Write};

/// Largest length a pkt-line prefix may declare.
pub const MAX_PKT_LEN: usize = 65520;

/// A pkt-line packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    /// Data line with content.
    Data(Vec<u8>),
    /// Flush packet (0000).
    Flush,
    /// Delimiter packet (0001).
    Delimiter,
    /// Response-end packet (0002).
    ResponseEnd,
}

impl PktLine {
    /// Creates a data packet from a string slice.
    pub fn from_string(s: &str) -> Self {
        Self::Data(s.as_bytes().to_vec())
    }

    /// Encodes the packet to bytes.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Data(data) => {
                let mut result = format!("{:04x}", data.len() + 4).into_bytes();
                result.extend_from_slice(data);
                result
            }
            Self::Flush => b"0000".to_vec(),
            Self::Delimiter => b"0001".to_vec(),
            Self::ResponseEnd => b"0002".to_vec(),
        }
    }

    /// Returns the data content, or None for special packets.
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Self::Data(data) => Some(data),
            _ => None,
        }
    }

    /// Returns the data as a string, trimming any trailing newline.
    pub fn as_str(&self) -> Option<&str> {
        self.data()
            .and_then(|d| std::str::from_utf8(d).ok())
            .map(|s| s.trim_end_matches('\n'))
    }
}

/// Parses a 4-byte hex length prefix.
pub fn parse_length(prefix: &[u8]) -> Result<usize> {
    if prefix.len() != 4 || !prefix.iter().all(u8::is_ascii_hexdigit) {
        return Err(GitError::ProtocolFraming(format!(
            "invalid length prefix {:?}",
            String::from_utf8_lossy(prefix)
        )));
    }
    // All four bytes are ASCII hex digits, so this cannot fail.
    let text = std::str::from_utf8(prefix).unwrap_or_default();
    usize::from_str_radix(text, 16)
        .map_err(|_| GitError::ProtocolFraming("invalid length prefix".to_string()))
}

/// Reader for pkt-line format.
pub struct PktLineReader<R> {
    reader: R,
}

impl<R: Read> PktLineReader<R> {
    /// Creates a new pkt-line reader.
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads the next packet, or `None` at a clean end of input.
    pub fn read(&mut self) -> Result<Option<PktLine>> {
        let mut len_buf = [0u8; 4];
        match self.reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        match &len_buf {
            b"0000" => Ok(Some(PktLine::Flush)),
            b"0001" => Ok(Some(PktLine::Delimiter)),
            b"0002" => Ok(Some(PktLine::ResponseEnd)),
            _ => {
                let len = parse_length(&len_buf)?;
                if len < 4 {
                    return Err(GitError::ProtocolFraming(format!(
                        "pkt-line length {} too small",
                        len
                    )));
                }
                if len > MAX_PKT_LEN {
                    return Err(GitError::ProtocolFraming(format!(
                        "pkt-line length {} exceeds {}",
                        len, MAX_PKT_LEN
                    )));
                }

                let mut data = vec![0u8; len - 4];
                self.reader.read_exact(&mut data).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::UnexpectedEof {
                        GitError::ProtocolFraming("truncated pkt-line".to_string())
                    } else {
                        e.into()
                    }
                })?;

                Ok(Some(PktLine::Data(data)))
            }
        }
    }

    /// Reads all packets until a flush packet or end of input.
    pub fn read_until_flush(&mut self) -> Result<Vec<PktLine>> {
        let mut packets = Vec::new();
        loop {
            match self.read()? {
                Some(PktLine::Flush) | None => break,
                Some(pkt) => packets.push(pkt),
            }
        }
        Ok(packets)
    }
}

/// Writer for pkt-line format.
pub struct PktLineWriter<W> {
    writer: W,
}

impl<W: Write> PktLineWriter<W> {
    /// Creates a new pkt-line writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a packet.
    pub fn write(&mut self, pkt: &PktLine) -> Result<()> {
        self.writer.write_all(&pkt.encode())?;
        Ok(())
    }

    /// Writes a string line (with newline).
    pub fn write_line(&mut self, s: &str) -> Result<()> {
        let mut data = s.as_bytes().to_vec();
        if !s.ends_with('\n') {
            data.push(b'\n');
        }
        if data.len() + 4 > MAX_PKT_LEN {
            return Err(GitError::ProtocolFraming("line too long for pkt-line".to_string()));
        }
        self.write(&PktLine::Data(data))
    }

    /// Writes a delimiter packet.
    pub fn delimiter_pkt(&mut self) -> Result<()> {
        self.write(&PktLine::Delimiter)
    }

    /// Writes a flush packet.
    pub fn flush_pkt(&mut self) -> Result<()> {
        self.write(&PktLine::Flush)
    }

    /// Returns the inner writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_pktline_encode() {
        assert_eq!(PktLine::from_string("hello\n").encode(), b"000ahello\n");
        assert_eq!(PktLine::from_string("command=ls-refs\n").encode(), b"0014command=ls-refs\n");
        assert_eq!(PktLine::Flush.encode(), b"0000");
        assert_eq!(PktLine::Delimiter.encode(), b"0001");
        assert_eq!(PktLine::ResponseEnd.encode(), b"0002");
    }

    #[test]
    fn test_pktline_roundtrip() {
        let mut buf = Vec::new();
        {
            let mut writer = PktLineWriter::new(&mut buf);
            writer.write_line("hello").unwrap();
            writer.delimiter_pkt().unwrap();
            writer.write_line("world\n").unwrap();
            writer.flush_pkt().unwrap();
        }

        let mut reader = PktLineReader::new(Cursor::new(buf));
        assert_eq!(reader.read().unwrap(), Some(PktLine::from_string("hello\n")));
        assert_eq!(reader.read().unwrap(), Some(PktLine::Delimiter));
        assert_eq!(reader.read().unwrap(), Some(PktLine::from_string("world\n")));
        assert_eq!(reader.read().unwrap(), Some(PktLine::Flush));
        assert_eq!(reader.read().unwrap(), None);
    }

    #[test]
    fn test_pktline_as_str() {
        assert_eq!(PktLine::from_string("hello\n").as_str(), Some("hello"));
        assert_eq!(PktLine::Data(vec![0xff, 0xfe]).as_str(), None);
        assert!(PktLine::Flush.data().is_none());
    }

    #[test]
    fn test_pktline_read_until_flush() {
        let mut buf = Vec::new();
        {
            let mut writer = PktLineWriter::new(&mut buf);
            writer.write_line("line1").unwrap();
            writer.write_line("line2").unwrap();
            writer.flush_pkt().unwrap();
            writer.write_line("line3").unwrap();
        }

        let mut reader = PktLineReader::new(Cursor::new(buf));
        assert_eq!(reader.read_until_flush().unwrap().len(), 2);
        assert_eq!(reader.read().unwrap(), Some(PktLine::from_string("line3\n")));
    }

    #[test]
    fn test_pktline_read_invalid_lengths() {
        for bad in [&b"0003"[..], b"zz10", b"fff5"] {
            let mut reader = PktLineReader::new(Cursor::new(bad.to_vec()));
            assert!(matches!(reader.read(), Err(GitError::ProtocolFraming(_))));
        }
    }

    #[test]
    fn test_pktline_truncated_payload() {
        let mut reader = PktLineReader::new(Cursor::new(b"000ahel".to_vec()));
        assert!(matches!(reader.read(), Err(GitError::ProtocolFraming(_))));
    }

    #[test]
    fn test_parse_length() {
        assert_eq!(parse_length(b"0032").unwrap(), 0x32);
        assert_eq!(parse_length(b"FFF0").unwrap(), 0xfff0);
        assert!(parse_length(b"00g1").is_err());
        assert!(parse_length(b"001").is_err());
    }

    #[test]
    fn test_pktline_empty_data() {
        let encoded = PktLine::Data(Vec::new()).encode();
        assert_eq!(encoded, b"0004");
    }
}
