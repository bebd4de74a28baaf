//! Locating and demultiplexing the pack stream in a fetch response.
//!
//! A protocol v2 `fetch` response carries the pack inside the `packfile`
//! section as side-band pkt-lines: `<4 hex len><band><payload>`. Band 1 is
//! pack data, band 2 progress text, band 3 a fatal error from the remote.

use crate::pktline::{PktLine, PktLineReader};
use crate::{GitError, Result};

/// Magic bytes at the start of a pack stream.
pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";

/// Length of the trailing pack checksum.
pub const PACK_TRAILER_LEN: usize = 20;

/// Length of the pack header (signature, version, object count).
pub const PACK_HEADER_LEN: usize = 12;

const BAND_DATA: u8 = 1;
const BAND_PROGRESS: u8 = 2;
const BAND_ERROR: u8 = 3;

/// Returns the offset of the first `<4 hex digits><band byte>PACK` run,
/// i.e. the start of the pkt-line that opens the pack stream.
pub fn locate_pack(body: &[u8]) -> Result<usize> {
    body.windows(PACK_SIGNATURE.len())
        .enumerate()
        .filter(|(pos, window)| *pos >= 5 && *window == PACK_SIGNATURE)
        .map(|(pos, _)| pos - 5)
        .find(|start| body[*start..*start + 4].iter().all(u8::is_ascii_hexdigit))
        .ok_or_else(|| GitError::ProtocolFraming("no PACK marker in fetch response".to_string()))
}

/// Extracts the pack stream from a fetch response body.
///
/// Starting at [`locate_pack`], side-band frames are read until a flush
/// packet or the end of input; each frame's length prefix bounds exactly
/// the bytes taken from it. The trailing pack checksum is dropped
/// without being verified.
pub fn extract_pack(body: &[u8]) -> Result<Vec<u8>> {
    let start = locate_pack(body)?;
    let mut reader = PktLineReader::new(&body[start..]);
    let mut pack = Vec::new();
    let mut frames = 0usize;

    loop {
        match reader.read()? {
            Some(PktLine::Data(data)) => {
                let Some((&band, payload)) = data.split_first() else {
                    continue;
                };
                match band {
                    BAND_DATA => {
                        pack.extend_from_slice(payload);
                        frames += 1;
                    }
                    BAND_PROGRESS => {
                        tracing::debug!(
                            progress = %String::from_utf8_lossy(payload).trim_end(),
                            "remote progress"
                        );
                    }
                    BAND_ERROR => {
                        return Err(GitError::Protocol(format!(
                            "remote error: {}",
                            String::from_utf8_lossy(payload).trim_end()
                        )));
                    }
                    other => {
                        return Err(GitError::ProtocolFraming(format!(
                            "unknown side-band channel {}",
                            other
                        )));
                    }
                }
            }
            Some(PktLine::Delimiter) => continue,
            Some(PktLine::Flush) | Some(PktLine::ResponseEnd) | None => break,
        }
    }

    if pack.len() < PACK_HEADER_LEN + PACK_TRAILER_LEN {
        return Err(GitError::ProtocolFraming(format!(
            "pack stream of {} bytes is shorter than header and checksum",
            pack.len()
        )));
    }
    pack.truncate(pack.len() - PACK_TRAILER_LEN);

    tracing::debug!(frames, bytes = pack.len(), "extracted pack stream");
    Ok(pack)
}
