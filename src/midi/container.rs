//! Container signature detection.
//!
//! Recognizes a bare Standard MIDI File and the RIFF-based RMID wrapper,
//! and locates the byte range holding the SMF payload. Only the headers
//! are read here; the payload itself is read during prepare.

use crate::error::{EngineError, Result};
use crate::source::ByteSource;

const SMF_MAGIC: &[u8; 4] = b"MThd";
const RIFF_MAGIC: &[u8; 4] = b"RIFF";
const RMID_FORM: &[u8; 4] = b"RMID";
const DATA_CHUNK: &[u8; 4] = b"data";

/// Which wrapper the MIDI data arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// Standard MIDI File starting at offset 0.
    Smf,
    /// RIFF RMID file with the SMF inside its `data` chunk.
    Rmid,
}

/// Location of the SMF payload within a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Container {
    /// Detected wrapper.
    pub kind: ContainerKind,
    /// Offset of the `MThd` header within the source.
    pub payload_offset: u64,
    /// Length of the SMF payload in bytes.
    pub payload_len: u64,
}

impl Container {
    /// Identifies the container held by `source`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Format`] if no known signature is found, and
    /// [`EngineError::Io`] if the source fails to read.
    pub fn detect(source: &mut dyn ByteSource) -> Result<Self> {
        let size = source.size();
        let mut header = [0u8; 12];
        let n = source.read_fully_at(0, &mut header)?;

        if n >= 4 && &header[..4] == SMF_MAGIC {
            return Ok(Self {
                kind: ContainerKind::Smf,
                payload_offset: 0,
                payload_len: size,
            });
        }

        if n == 12 && &header[..4] == RIFF_MAGIC && &header[8..12] == RMID_FORM {
            return Self::find_rmid_data(source, size);
        }

        Err(EngineError::Format(
            "unrecognized container signature".to_string(),
        ))
    }

    /// Walks the RIFF chunks after the form type looking for `data`.
    fn find_rmid_data(source: &mut dyn ByteSource, size: u64) -> Result<Self> {
        let mut offset = 12u64;
        while offset + 8 <= size {
            let mut chunk = [0u8; 8];
            if source.read_fully_at(offset, &mut chunk)? < 8 {
                break;
            }
            let chunk_len = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]) as u64;
            let body = offset + 8;

            if &chunk[..4] == DATA_CHUNK {
                let mut magic = [0u8; 4];
                let n = source.read_fully_at(body, &mut magic)?;
                if n < 4 || &magic != SMF_MAGIC {
                    return Err(EngineError::Format(
                        "RMID data chunk does not hold a MIDI file".to_string(),
                    ));
                }
                return Ok(Self {
                    kind: ContainerKind::Rmid,
                    payload_offset: body,
                    payload_len: chunk_len.min(size - body),
                });
            }

            // RIFF chunks are padded to even lengths
            offset = body + chunk_len + (chunk_len & 1);
        }

        Err(EngineError::Format(
            "RMID file has no data chunk".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::fixtures;
    use crate::source::MemorySource;

    fn rmid(smf: &[u8], leading_chunk: Option<&[u8]>) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(RMID_FORM);
        if let Some(extra) = leading_chunk {
            body.extend_from_slice(b"INFO");
            body.extend_from_slice(&(extra.len() as u32).to_le_bytes());
            body.extend_from_slice(extra);
            if extra.len() % 2 == 1 {
                body.push(0);
            }
        }
        body.extend_from_slice(DATA_CHUNK);
        body.extend_from_slice(&(smf.len() as u32).to_le_bytes());
        body.extend_from_slice(smf);

        let mut out = Vec::new();
        out.extend_from_slice(RIFF_MAGIC);
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn test_detect_smf() {
        let bytes = fixtures::two_second_song();
        let len = bytes.len() as u64;
        let mut source = MemorySource::new(bytes);
        let container = Container::detect(&mut source).unwrap();
        assert_eq!(container.kind, ContainerKind::Smf);
        assert_eq!(container.payload_offset, 0);
        assert_eq!(container.payload_len, len);
    }

    #[test]
    fn test_detect_rmid_with_odd_leading_chunk() {
        let smf = fixtures::two_second_song();
        let mut source = MemorySource::new(rmid(&smf, Some(b"abc")));
        let container = Container::detect(&mut source).unwrap();
        assert_eq!(container.kind, ContainerKind::Rmid);
        // RIFF(8) + RMID(4) + INFO header(8) + 3 bytes + pad + data header(8)
        assert_eq!(container.payload_offset, 32);
        assert_eq!(container.payload_len, smf.len() as u64);
    }

    #[test]
    fn test_rmid_without_data_chunk() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(RIFF_MAGIC);
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(RMID_FORM);
        let mut source = MemorySource::new(bytes);
        assert!(matches!(
            Container::detect(&mut source),
            Err(EngineError::Format(_))
        ));
    }

    #[test]
    fn test_unknown_signature() {
        let mut source = MemorySource::new(b"OggS not midi".to_vec());
        assert!(matches!(
            Container::detect(&mut source),
            Err(EngineError::Format(_))
        ));

        let mut empty = MemorySource::new(Vec::new());
        assert!(matches!(
            Container::detect(&mut empty),
            Err(EngineError::Format(_))
        ));
    }
}
