//! Cache store - Atomic JSON persistence for the index and render state
//!
//! Writes go to a sibling temp file which is flushed and renamed over the
//! target, so a crash mid-write leaves the previous valid file in place.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::core::error::{ReelError, Result};

/// Ensure a directory exists
pub fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "store".to_string());
    path.with_file_name(format!(".{}.{}.tmp", name, std::process::id()))
}

/// Serialize `value` as pretty JSON and atomically replace `path`
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| ReelError::index_io(path, std::io::Error::new(ErrorKind::InvalidData, e)))?;

    if let Some(parent) = path.parent() {
        ensure_dir(parent).map_err(|e| ReelError::index_io(path, e))?;
    }

    let tmp = temp_sibling(path);
    let written = (|| -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(&json)?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(ReelError::index_io(path, e));
    }
    Ok(())
}

/// Read a JSON document, returning `T::default()` when the file does not exist
pub fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(ReelError::index_io(path, e)),
    };

    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(T::default());
    }

    serde_json::from_slice(&bytes)
        .map_err(|e| ReelError::index_io(path, std::io::Error::new(ErrorKind::InvalidData, e)))
}
