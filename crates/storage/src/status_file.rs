// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The durable backend-status file (§4.2, §6).
//!
//! Two on-disk formats are understood: a legacy fixed-size binary record
//! (read-only, for upgrades) and the current newline-delimited ASCII form
//! (`up` / `down` / `unused` per line). Only the ASCII form is written.

use poolguard_core::BackendStatus;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("status file is corrupt: {0}")]
    Corrupt(String),
}

/// One legacy binary record: a 4-byte little-endian status code,
/// repeated once per backend, with no separators. Kept only so upgrades
/// from the legacy format can recover a prior run's state.
const LEGACY_RECORD_SIZE: usize = 4;

/// Read the status file at `path`.
///
/// If `discard` is set, the file is unlinked (if present) and every
/// backend is reported as `CONNECT_WAIT` — this is the "discard status"
/// startup path requested by the operator. Otherwise the file is parsed;
/// if parsing finds no entry that is `UP` or `CONNECT_WAIT`, the whole
/// file is treated as bogus and every backend resets to `CONNECT_WAIT`
/// (§4.2 policy).
pub fn read_status_file(
    path: &Path,
    discard: bool,
    num_backends: usize,
) -> Result<Vec<BackendStatus>, StorageError> {
    if discard {
        if path.exists() {
            fs::remove_file(path)?;
        }
        return Ok(vec![BackendStatus::ConnectWait; num_backends]);
    }

    let Ok(mut file) = File::open(path) else {
        return Ok(vec![BackendStatus::ConnectWait; num_backends]);
    };

    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;

    let parsed = if looks_like_ascii(&buf) {
        parse_ascii(&buf)?
    } else {
        parse_legacy_binary(&buf)?
    };

    let has_usable = parsed
        .iter()
        .any(|s| matches!(s, BackendStatus::Up | BackendStatus::ConnectWait));

    if !has_usable || parsed.len() != num_backends {
        tracing::warn!(
            path = %path.display(),
            "status file has no usable entries or wrong backend count, treating as bogus"
        );
        return Ok(vec![BackendStatus::ConnectWait; num_backends]);
    }

    Ok(parsed)
}

fn looks_like_ascii(buf: &[u8]) -> bool {
    buf.iter()
        .all(|b| b.is_ascii_alphanumeric() || *b == b'\n' || *b == b'\r')
}

fn parse_ascii(buf: &[u8]) -> Result<Vec<BackendStatus>, StorageError> {
    let text = std::str::from_utf8(buf)
        .map_err(|e| StorageError::Corrupt(format!("not valid utf8: {e}")))?;
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| match line.trim() {
            "up" => Ok(BackendStatus::Up),
            "down" => Ok(BackendStatus::Down),
            "unused" => Ok(BackendStatus::Unused),
            other => Err(StorageError::Corrupt(format!("unknown status line: {other}"))),
        })
        .collect()
}

fn parse_legacy_binary(buf: &[u8]) -> Result<Vec<BackendStatus>, StorageError> {
    if buf.len() % LEGACY_RECORD_SIZE != 0 {
        return Err(StorageError::Corrupt(
            "legacy status file size is not a multiple of the record size".into(),
        ));
    }
    buf.chunks(LEGACY_RECORD_SIZE)
        .map(|chunk| {
            let code = u32::from_le_bytes(chunk.try_into().expect("chunked to exact size"));
            match code {
                0 => Ok(BackendStatus::Unused),
                1 => Ok(BackendStatus::ConnectWait),
                2 => Ok(BackendStatus::Up),
                3 => Ok(BackendStatus::Down),
                other => Err(StorageError::Corrupt(format!(
                    "unknown legacy status code: {other}"
                ))),
            }
        })
        .collect()
}

/// Write the ASCII status file, flushed and fsynced.
///
/// Per §4.2's invariant: if every backend is currently down, the write is
/// skipped entirely — the last non-all-down snapshot remains the durable
/// record so a total outage doesn't erase recoverable history.
pub fn write_status_file(path: &Path, statuses: &[BackendStatus]) -> Result<(), StorageError> {
    if statuses.iter().all(|s| matches!(s, BackendStatus::Down)) {
        tracing::debug!("all backends down, skipping status file write");
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("tmp");
    let mut file = File::create(&tmp_path)?;
    for status in statuses {
        writeln!(file, "{}", status.as_ascii())?;
    }
    file.flush()?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("poolguard_status");
        let statuses = vec![BackendStatus::Down, BackendStatus::Up];
        write_status_file(&path, &statuses).unwrap();
        let read_back = read_status_file(&path, false, 2).unwrap();
        assert_eq!(read_back, vec![BackendStatus::Down, BackendStatus::Up]);
    }

    #[test]
    fn write_skips_when_all_down() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("poolguard_status");
        write_status_file(&path, &[BackendStatus::Up, BackendStatus::Up]).unwrap();
        write_status_file(&path, &[BackendStatus::Down, BackendStatus::Down]).unwrap();
        let read_back = read_status_file(&path, false, 2).unwrap();
        assert_eq!(read_back, vec![BackendStatus::Up, BackendStatus::Up]);
    }

    #[test]
    fn discard_resets_to_connect_wait_and_removes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("poolguard_status");
        write_status_file(&path, &[BackendStatus::Up, BackendStatus::Down]).unwrap();
        let read_back = read_status_file(&path, true, 2).unwrap();
        assert_eq!(
            read_back,
            vec![BackendStatus::ConnectWait, BackendStatus::ConnectWait]
        );
        assert!(!path.exists());
    }

    #[test]
    fn missing_file_reports_connect_wait() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("does-not-exist");
        let read_back = read_status_file(&path, false, 3).unwrap();
        assert_eq!(read_back, vec![BackendStatus::ConnectWait; 3]);
    }

    #[test]
    fn bogus_file_with_no_usable_entries_resets() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("poolguard_status");
        fs::write(&path, "unused\nunused\n").unwrap();
        let read_back = read_status_file(&path, false, 2).unwrap();
        assert_eq!(
            read_back,
            vec![BackendStatus::ConnectWait, BackendStatus::ConnectWait]
        );
    }

    #[test]
    fn legacy_binary_format_is_readable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("poolguard_status");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&2u32.to_le_bytes()); // Up
        bytes.extend_from_slice(&3u32.to_le_bytes()); // Down
        fs::write(&path, &bytes).unwrap();
        let read_back = read_status_file(&path, false, 2).unwrap();
        assert_eq!(read_back, vec![BackendStatus::Up, BackendStatus::Down]);
    }
}
