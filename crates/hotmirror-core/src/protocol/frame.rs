//! Binary bulk-transfer frame.
//!
//! A bulk frame carries a whole project as a zip archive:
//!
//! ```text
//! ┌──────────────┬────────────┬─────────────────────────┬──────────────┐
//! │ project name │ size (i32) │ embedded folder change  │   payload    │
//! │   string     │ big-endian │ string, Embedded only   │ `size` bytes │
//! └──────────────┴────────────┴─────────────────────────┴──────────────┘
//! ```
//!
//! A string is a big-endian `u32` byte length followed by that many bytes of
//! UTF-8. The length `0xFFFF_FFFF` marks an absent string. Whether the
//! embedded folder change is present on the wire depends on the
//! [`FrameVersion`] agreed out of band. Bytes after the payload are ignored.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Length value marking an absent string.
const NULL_STRING: u32 = u32::MAX;

/// Bulk frame layout spoken by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameVersion {
    /// Name, size, payload
    Legacy,
    /// Name, size, embedded folder change, payload
    #[default]
    Embedded,
}

/// A decoded bulk transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkTransferFrame {
    /// Name of the project directory to populate
    pub project_name: String,
    /// Folder change message to apply after extraction
    pub embedded_folder_change: Option<String>,
    /// Zip archive bytes
    pub payload: Vec<u8>,
}

impl BulkTransferFrame {
    /// Create a frame.
    pub fn new(project_name: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            project_name: project_name.into(),
            embedded_folder_change: None,
            payload,
        }
    }

    /// Attach a folder change to apply after extraction.
    #[must_use]
    pub fn with_folder_change(mut self, message: impl Into<String>) -> Self {
        self.embedded_folder_change = Some(message.into());
        self
    }

    /// Declared payload size, as written in the header.
    pub fn payload_size(&self) -> i32 {
        i32::try_from(self.payload.len()).unwrap_or(i32::MAX)
    }

    /// Encode the frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Framing`] if the payload does not fit an `i32`, or
    /// if a legacy frame is asked to carry an embedded folder change.
    pub fn encode(&self, version: FrameVersion) -> Result<Vec<u8>> {
        let size = i32::try_from(self.payload.len())
            .map_err(|_| Error::Framing("payload exceeds i32::MAX bytes".to_string()))?;

        let mut out = Vec::with_capacity(self.payload.len() + self.project_name.len() + 16);
        write_string(&mut out, Some(&self.project_name))?;
        out.extend_from_slice(&size.to_be_bytes());

        match version {
            FrameVersion::Embedded => {
                write_string(&mut out, self.embedded_folder_change.as_deref())?;
            }
            FrameVersion::Legacy if self.embedded_folder_change.is_some() => {
                return Err(Error::Framing(
                    "legacy frames cannot carry a folder change".to_string(),
                ));
            }
            FrameVersion::Legacy => {}
        }

        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    /// Decode a frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Framing`] when the header is truncated, a string is
    /// not UTF-8, the project name is missing, or the declared size is
    /// negative, above `max_payload`, or larger than the bytes that follow.
    pub fn decode(data: &[u8], version: FrameVersion, max_payload: usize) -> Result<Self> {
        let mut reader = FrameReader::new(data);

        let project_name = reader
            .read_string("project name")?
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::Framing("missing project name".to_string()))?;

        let size = reader.read_i32("payload size")?;
        let size = usize::try_from(size)
            .map_err(|_| Error::Framing(format!("negative payload size {size}")))?;
        if size > max_payload {
            return Err(Error::Framing(format!(
                "payload size {size} exceeds limit of {max_payload} bytes"
            )));
        }

        let embedded_folder_change = match version {
            FrameVersion::Embedded => reader.read_string("embedded folder change")?,
            FrameVersion::Legacy => None,
        };

        let payload = reader.read_bytes(size, "payload")?.to_vec();

        Ok(Self {
            project_name,
            embedded_folder_change,
            payload,
        })
    }
}

fn write_string(out: &mut Vec<u8>, value: Option<&str>) -> Result<()> {
    match value {
        Some(s) => {
            let len = u32::try_from(s.len())
                .ok()
                .filter(|len| *len != NULL_STRING)
                .ok_or_else(|| Error::Framing("string too long for frame".to_string()))?;
            out.extend_from_slice(&len.to_be_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        None => out.extend_from_slice(&NULL_STRING.to_be_bytes()),
    }
    Ok(())
}

/// Bounds-checked cursor over a frame.
struct FrameReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_bytes(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(Error::Framing(format!(
                "{what} too short: need {len} bytes, have {}",
                self.remaining()
            )));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self, what: &str) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.read_bytes(N, what)?);
        Ok(buf)
    }

    fn read_i32(&mut self, what: &str) -> Result<i32> {
        self.read_array::<4>(what).map(i32::from_be_bytes)
    }

    fn read_string(&mut self, what: &str) -> Result<Option<String>> {
        let len = u32::from_be_bytes(self.read_array::<4>(what)?);
        if len == NULL_STRING {
            return Ok(None);
        }
        let len = usize::try_from(len)
            .map_err(|_| Error::Framing(format!("{what} length does not fit in memory")))?;
        let bytes = self.read_bytes(len, what)?;
        String::from_utf8(bytes.to_vec())
            .map(Some)
            .map_err(|_| Error::Framing(format!("{what} is not valid UTF-8")))
    }
}
