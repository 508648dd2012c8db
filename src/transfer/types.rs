use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::StorageDirs;
use crate::error::{Result, SdfsError};

pub const MAX_ID_LEN: u64 = 1024;
pub const MAX_NAME_LEN: u64 = 4096;
/// Longest accepted file name. Staging names and transmission ids embed it.
pub const MAX_FILE_NAME_LEN: usize = 200;
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Selects the destination directory on the receiving node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiverTag {
    SdfsStorage,
    ClientLocal,
    JobInput,
    JobOutput,
}

impl ReceiverTag {
    pub fn as_byte(self) -> u8 {
        match self {
            ReceiverTag::SdfsStorage => 10,
            ReceiverTag::ClientLocal => 11,
            ReceiverTag::JobInput => 12,
            ReceiverTag::JobOutput => 13,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            10 => Some(ReceiverTag::SdfsStorage),
            11 => Some(ReceiverTag::ClientLocal),
            12 => Some(ReceiverTag::JobInput),
            13 => Some(ReceiverTag::JobOutput),
            _ => None,
        }
    }

    pub fn dir(self, dirs: &StorageDirs) -> &Path {
        match self {
            ReceiverTag::SdfsStorage => &dirs.sdfs,
            ReceiverTag::ClientLocal => &dirs.local,
            ReceiverTag::JobInput => &dirs.job_input,
            ReceiverTag::JobOutput => &dirs.job_output,
        }
    }

    pub fn path(self, dirs: &StorageDirs, file_name: &str) -> PathBuf {
        self.dir(dirs).join(file_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteMode {
    /// Create or truncate.
    Truncate,
    /// Append, creating the file if missing.
    Append,
}

impl WriteMode {
    pub fn as_byte(self) -> u8 {
        match self {
            WriteMode::Truncate => 0,
            WriteMode::Append => 1,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(WriteMode::Truncate),
            1 => Some(WriteMode::Append),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub transmission_id: String,
    pub file_name: String,
    pub tag: ReceiverTag,
    pub mode: WriteMode,
}

impl FrameHeader {
    pub fn new(
        transmission_id: impl Into<String>,
        file_name: impl Into<String>,
        tag: ReceiverTag,
        mode: WriteMode,
    ) -> Self {
        Self {
            transmission_id: transmission_id.into(),
            file_name: file_name.into(),
            tag,
            mode,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let id = self.transmission_id.as_bytes();
        let name = self.file_name.as_bytes();
        let mut buf = Vec::with_capacity(18 + id.len() + name.len());
        buf.extend_from_slice(&(id.len() as u64).to_le_bytes());
        buf.extend_from_slice(id);
        buf.extend_from_slice(&(name.len() as u64).to_le_bytes());
        buf.extend_from_slice(name);
        buf.push(self.tag.as_byte());
        buf.push(self.mode.as_byte());
        buf
    }

    /// Reads and validates a header, leaving the stream positioned at the body.
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self> {
        let id_len = read_u64_le(reader).await?;
        if id_len > MAX_ID_LEN {
            return Err(SdfsError::InvalidArgument(format!(
                "transmission id length {id_len} exceeds {MAX_ID_LEN}"
            )));
        }
        let transmission_id = read_string(reader, id_len).await?;

        let name_len = read_u64_le(reader).await?;
        if name_len > MAX_NAME_LEN {
            return Err(SdfsError::InvalidArgument(format!(
                "file name length {name_len} exceeds {MAX_NAME_LEN}"
            )));
        }
        let file_name = read_string(reader, name_len).await?;
        validate_file_name(&file_name)?;

        let mut trailer = [0u8; 2];
        reader.read_exact(&mut trailer).await.map_err(truncated)?;
        let tag = ReceiverTag::from_byte(trailer[0]).ok_or_else(|| {
            SdfsError::InvalidArgument(format!("unknown receiver tag {}", trailer[0]))
        })?;
        let mode = WriteMode::from_byte(trailer[1]).ok_or_else(|| {
            SdfsError::InvalidArgument(format!("unknown write mode {}", trailer[1]))
        })?;

        Ok(Self {
            transmission_id,
            file_name,
            tag,
            mode,
        })
    }
}

/// Names are flat: no separators, no parent references.
pub fn validate_file_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SdfsError::InvalidArgument("empty file name".to_string()));
    }
    if name.len() > MAX_FILE_NAME_LEN {
        return Err(SdfsError::InvalidArgument(format!(
            "file name is {} bytes, the limit is {MAX_FILE_NAME_LEN}",
            name.len()
        )));
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(SdfsError::InvalidArgument(format!(
            "file name {name:?} must not contain path components"
        )));
    }
    Ok(())
}

async fn read_u64_le<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u64> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes).await.map_err(truncated)?;
    Ok(u64::from_le_bytes(bytes))
}

async fn read_string<R: AsyncRead + Unpin>(reader: &mut R, len: u64) -> Result<String> {
    let mut bytes = vec![0u8; len as usize];
    reader.read_exact(&mut bytes).await.map_err(truncated)?;
    String::from_utf8(bytes)
        .map_err(|_| SdfsError::InvalidArgument("header field is not UTF-8".to_string()))
}

fn truncated(e: std::io::Error) -> SdfsError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        SdfsError::InvalidArgument("truncated frame header".to_string())
    } else {
        SdfsError::Io(e)
    }
}
