use std::{
    fs,
    io::{BufWriter, ErrorKind, Read, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::error::{DemandError, DemandResult, ExperimentError, IoError};

/// Default buffer size for artifact reads and writes (128 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 128 * 1024;

// ================================================================================================
// Serde Formats
// ================================================================================================

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    PartialOrd,
    Eq,
    Hash,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    IntoStaticStr,
    Default,
)]
#[strum(serialize_all = "lowercase")]
pub enum SerdeFormat {
    #[default]
    Postcard,
}

impl SerdeFormat {
    pub fn from_path(path: &Path) -> DemandResult<Self> {
        let path = path.to_string_lossy();
        match path
            .rsplit_once('.')
            .ok_or_else(|| err(&path, true))?
            .1
            .to_lowercase()
            .as_str()
        {
            "postcard" => Ok(Self::Postcard),
            ext => Err(err(ext, false)),
        }
    }

    /// File extension used for artifacts written in this format.
    pub fn extension(&self) -> &'static str {
        self.into()
    }
}

fn err(s: &str, missing_extension: bool) -> DemandError {
    let msg = if missing_extension {
        format!("Unsupported file format: missing or invalid extension in path '{s}'")
    } else {
        format!("Unsupported file format: '{s}'")
    };
    IoError::UnsupportedFormat(msg).into()
}

// ================================================================================================
// File helpers
// ================================================================================================

/// Creates `path` and fails if it already exists.
///
/// Run directories are never reused, so a concurrent runner that picked the
/// same run id loses loudly instead of overwriting the other run's artifacts.
pub(crate) fn create_dir_exclusive(path: &Path) -> DemandResult<()> {
    match fs::create_dir(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            Err(ExperimentError::RunDirExists(path.display().to_string()).into())
        }
        Err(e) => Err(IoError::FileSystem(format!(
            "Failed to create directory {}: {e}",
            path.display()
        ))
        .into()),
    }
}

pub(crate) fn write_bytes(path: &Path, chunks: &[&[u8]]) -> DemandResult<()> {
    let file = fs::File::create(path)
        .map_err(|e| IoError::WriteFailed(format!("{}: {e}", path.display())))?;
    let mut writer = BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file);
    for chunk in chunks {
        writer
            .write_all(chunk)
            .map_err(|e| IoError::WriteFailed(format!("{}: {e}", path.display())))?;
    }
    writer
        .flush()
        .map_err(|e| IoError::WriteFailed(format!("{}: {e}", path.display())))?;
    Ok(())
}

pub(crate) fn read_bytes(path: &Path) -> DemandResult<Vec<u8>> {
    let mut file = fs::File::open(path)
        .map_err(|e| IoError::ReadFailed(format!("{}: {e}", path.display())))?;
    let capacity = file
        .metadata()
        .map(|m| m.len() as usize)
        .unwrap_or(DEFAULT_BUFFER_SIZE);
    let mut data = Vec::with_capacity(capacity);
    file.read_to_end(&mut data)
        .map_err(|e| IoError::ReadFailed(format!("{}: {e}", path.display())))?;
    Ok(data)
}
