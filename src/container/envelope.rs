//! The packed-binary-payload-then-JSON-header file layout shared by every
//! native container (movie, cell set, vessel set, events/gpio/imu):
//!
//! ```text
//! [0 .. P)             packed binary payload
//! [P .. P+L)           UTF-8 JSON header text
//! [EOF-8 .. EOF)       little-endian u64 = P
//! ```
//!
//! Adapted from `rust_daq::data::ring_buffer`'s memory-mapped container
//! (fixed 128-byte magic/header region, `memmap2`-backed, validated on
//! open) to this format's append-only body with a variable-length header
//! trailing instead of leading.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CoreError, CoreResult};

pub const TRAILER_LEN: u64 = 8;

/// Streams a payload to disk and seals it with a JSON header once all
/// records have been written. Any `write_payload` call after `seal`
/// panics in debug builds (programmer error — the writer is consumed by
/// `seal`).
pub struct EnvelopeWriter {
    path: PathBuf,
    file: BufWriter<File>,
    payload_bytes: u64,
}

impl EnvelopeWriter {
    /// Opens `path` for writing, failing if it already exists.
    pub fn create(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| CoreError::file_io_source("failed to create container file", &path, e))?;
        Ok(Self {
            path,
            file: BufWriter::new(file),
            payload_bytes: 0,
        })
    }

    pub fn payload_bytes_written(&self) -> u64 {
        self.payload_bytes
    }

    /// Appends raw record bytes to the payload region.
    pub fn write_payload(&mut self, bytes: &[u8]) -> CoreResult<()> {
        self.file
            .write_all(bytes)
            .map_err(|e| CoreError::file_io_source("failed to write payload bytes", &self.path, e))?;
        self.payload_bytes += bytes.len() as u64;
        Ok(())
    }

    /// Writes the JSON header and the trailing offset, then flushes.
    /// Consumes the writer: once sealed, a container is immutable.
    pub fn seal<H: Serialize>(mut self, header: &H) -> CoreResult<()> {
        let json = serde_json::to_vec(header)?;
        self.file
            .write_all(&json)
            .map_err(|e| CoreError::file_io_source("failed to write header", &self.path, e))?;
        self.file
            .write_all(&self.payload_bytes.to_le_bytes())
            .map_err(|e| CoreError::file_io_source("failed to write trailer", &self.path, e))?;
        self.file
            .flush()
            .map_err(|e| CoreError::file_io_source("failed to flush container file", &self.path, e))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A sealed container, opened read-only. Holds the memory map and the
/// validated payload length; callers parse the header into whatever
/// modality-specific struct they need.
pub struct EnvelopeReader {
    mmap: Mmap,
    payload_len: u64,
}

impl EnvelopeReader {
    pub fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| CoreError::file_io_source("failed to open container file", path, e))?;
        let mmap = unsafe {
            Mmap::map(&file)
                .map_err(|e| CoreError::file_io_source("failed to mmap container file", path, e))?
        };
        let len = mmap.len() as u64;
        if len < TRAILER_LEN {
            return Err(CoreError::data_io_at(
                "container file is smaller than the trailer",
                path,
            ));
        }
        let trailer_bytes: [u8; 8] = mmap[(len - TRAILER_LEN) as usize..len as usize]
            .try_into()
            .unwrap();
        let payload_len = u64::from_le_bytes(trailer_bytes);
        if payload_len > len - TRAILER_LEN {
            return Err(CoreError::data_io_at(
                "container trailer offset points outside the file",
                path,
            ));
        }
        Ok(Self { mmap, payload_len })
    }

    pub fn payload(&self) -> &[u8] {
        &self.mmap[0..self.payload_len as usize]
    }

    /// The raw header JSON text, between the payload and the trailer.
    pub fn header_text(&self) -> CoreResult<&str> {
        let start = self.payload_len as usize;
        let end = self.mmap.len() - TRAILER_LEN as usize;
        std::str::from_utf8(&self.mmap[start..end])
            .map_err(|_| CoreError::data_io("container header is not valid UTF-8"))
    }

    pub fn header<H: DeserializeOwned>(&self) -> CoreResult<H> {
        serde_json::from_str(self.header_text()?).map_err(CoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct TestHeader {
        version: u32,
        note: String,
    }

    #[test]
    fn round_trips_payload_and_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.bin");
        let mut w = EnvelopeWriter::create(&path).unwrap();
        w.write_payload(&[1, 2, 3, 4]).unwrap();
        w.write_payload(&[5, 6]).unwrap();
        w.seal(&TestHeader {
            version: 1,
            note: "hi".into(),
        })
        .unwrap();

        let r = EnvelopeReader::open(&path).unwrap();
        assert_eq!(r.payload(), &[1, 2, 3, 4, 5, 6]);
        let header: TestHeader = r.header().unwrap();
        assert_eq!(
            header,
            TestHeader {
                version: 1,
                note: "hi".into()
            }
        );
    }

    #[test]
    fn create_fails_if_path_exists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.bin");
        EnvelopeWriter::create(&path)
            .unwrap()
            .seal(&TestHeader {
                version: 1,
                note: String::new(),
            })
            .unwrap();
        assert!(EnvelopeWriter::create(&path).is_err());
    }

    #[test]
    fn truncated_trailer_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.bin");
        let mut w = EnvelopeWriter::create(&path).unwrap();
        w.write_payload(&[1, 2, 3, 4]).unwrap();
        w.seal(&TestHeader {
            version: 1,
            note: "x".into(),
        })
        .unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();

        let err = EnvelopeReader::open(&path).unwrap_err();
        assert!(matches!(err, CoreError::DataIo { .. }));
    }

    #[test]
    fn trailer_past_eof_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.bin");
        std::fs::write(&path, (u64::MAX).to_le_bytes()).unwrap();
        assert!(EnvelopeReader::open(&path).is_err());
    }
}
