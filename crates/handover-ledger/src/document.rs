//! Ledger document storage: one pretty-printed JSON document per ledger.
//!
//! Loading validates the raw bytes before parsing. Saving writes a sibling
//! temp file, syncs it, and renames it over the target so a failed save never
//! leaves a partially written ledger behind.

use crate::error::LedgerError;
use crate::ledger::MigrationLedger;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Parse a ledger from a reader. `origin` is only used in error messages.
pub fn read_ledger(mut reader: impl Read, origin: &str) -> Result<MigrationLedger, LedgerError> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| LedgerError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
    parse_ledger_bytes(origin, &bytes)
}

/// Render the canonical document text (pretty JSON with a trailing newline).
pub fn render_ledger(ledger: &MigrationLedger) -> Result<String, LedgerError> {
    let mut text = serde_json::to_string_pretty(ledger)
        .map_err(|e| LedgerError::Serialize(e.to_string()))?;
    text.push('\n');
    Ok(text)
}

/// Load a ledger from disk.
pub fn load(path: impl AsRef<Path>) -> Result<MigrationLedger, LedgerError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            LedgerError::NotFound(path.display().to_string())
        } else {
            LedgerError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            }
        }
    })?;
    validate_document_bytes(path, &bytes)?;
    let ledger = parse_ledger_bytes(&path.display().to_string(), &bytes)?;
    tracing::debug!(
        path = %path.display(),
        groups = ledger.groups.len(),
        entries = ledger.entry_count(),
        "loaded ledger"
    );
    Ok(ledger)
}

/// Atomically replace the ledger at `path`.
pub fn save(ledger: &MigrationLedger, path: impl AsRef<Path>) -> Result<(), LedgerError> {
    let path = path.as_ref();
    let text = render_ledger(ledger)?;
    write_atomic(path, &text)?;
    tracing::debug!(path = %path.display(), "saved ledger");
    Ok(())
}

/// Replace `path` with `text` through a synced sibling temp file and a
/// rename. On failure the temp file is removed and the target is untouched.
pub fn write_atomic(path: &Path, text: &str) -> Result<(), LedgerError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .map_err(|e| LedgerError::Persist(format!("{}: {e}", parent.display())))?;
    }

    let tmp_path = tmp_write_path(path);
    let write_result = (|| -> Result<(), LedgerError> {
        let file = File::create(&tmp_path)
            .map_err(|e| LedgerError::Persist(format!("{}: {e}", tmp_path.display())))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(text.as_bytes())
            .map_err(|e| LedgerError::Persist(format!("{}: {e}", tmp_path.display())))?;
        let file = writer
            .into_inner()
            .map_err(|e| LedgerError::Persist(format!("{}: {e}", tmp_path.display())))?;
        file.sync_all()
            .map_err(|e| LedgerError::Persist(format!("{}: {e}", tmp_path.display())))?;
        Ok(())
    })();

    if let Err(error) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(error);
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        LedgerError::Persist(format!(
            "{} -> {}: {e}",
            tmp_path.display(),
            path.display()
        ))
    })?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        let dir = File::open(parent)
            .map_err(|e| LedgerError::Persist(format!("{}: {e}", parent.display())))?;
        dir.sync_all()
            .map_err(|e| LedgerError::Persist(format!("{}: {e}", parent.display())))?;
    }
    Ok(())
}

fn parse_ledger_bytes(origin: &str, bytes: &[u8]) -> Result<MigrationLedger, LedgerError> {
    serde_json::from_slice(bytes).map_err(|e| LedgerError::Parse {
        path: origin.to_string(),
        message: e.to_string(),
    })
}

fn tmp_write_path(path: &Path) -> PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut tmp: OsString = path.as_os_str().to_os_string();
    tmp.push(format!(".tmp.{}.{}", std::process::id(), unique));
    PathBuf::from(tmp)
}

fn validate_document_bytes(path: &Path, bytes: &[u8]) -> Result<(), LedgerError> {
    if bytes.contains(&0) {
        return Err(LedgerError::Corrupt(format!(
            "{}: contains NUL byte(s)",
            path.display()
        )));
    }
    if std::str::from_utf8(bytes).is_err() {
        return Err(LedgerError::Corrupt(format!(
            "{}: contains non-UTF-8 byte sequence(s)",
            path.display()
        )));
    }
    Ok(())
}
