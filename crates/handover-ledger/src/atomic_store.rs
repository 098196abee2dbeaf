//! Ledger lock file and lock-scoped read → mutate → write.
//!
//! The lock is a `<ledger>.lock` sidecar created exclusively. Its body is a
//! few `key=value` lines naming the holder, so an operator who hits a busy
//! lock can see which command on which group is editing the ledger.

use crate::document::{load, save};
use crate::error::LedgerError;
use crate::ledger::MigrationLedger;
use chrono::{DateTime, SecondsFormat, Utc};
use std::ffi::OsString;
use std::fmt::{Display, Formatter};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub fn ledger_lock_path(ledger_path: &Path) -> PathBuf {
    let mut path: OsString = ledger_path.as_os_str().to_os_string();
    path.push(".lock");
    PathBuf::from(path)
}

/// The command about to edit the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationIntent<'a> {
    pub action: &'a str,
    pub group: Option<&'a str>,
}

impl<'a> MutationIntent<'a> {
    pub fn new(action: &'a str, group: &'a str) -> Self {
        Self {
            action,
            group: Some(group),
        }
    }
}

/// Holder recorded in a lock file. Fields a foreign or truncated lock body
/// does not provide stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockHolder {
    pub pid: Option<u32>,
    pub since: Option<DateTime<Utc>>,
    pub action: Option<String>,
    pub group: Option<String>,
}

impl LockHolder {
    fn current(intent: &MutationIntent<'_>) -> Self {
        Self {
            pid: Some(std::process::id()),
            since: Some(Utc::now()),
            action: Some(intent.action.to_string()),
            group: intent.group.map(str::to_string),
        }
    }

    pub fn parse(body: &str) -> Self {
        let mut holder = Self::default();
        for (key, value) in body
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| (key.trim(), value.trim()))
        {
            match key {
                "pid" => holder.pid = value.parse().ok(),
                "utc" => {
                    holder.since = DateTime::parse_from_rfc3339(value)
                        .ok()
                        .map(|at| at.with_timezone(&Utc));
                }
                "action" if !value.is_empty() => holder.action = Some(value.to_string()),
                "group" if !value.is_empty() => holder.group = Some(value.to_string()),
                _ => {}
            }
        }
        holder
    }

    fn render(&self) -> String {
        let mut body = String::new();
        if let Some(pid) = self.pid {
            body.push_str(&format!("pid={pid}\n"));
        }
        if let Some(since) = self.since {
            body.push_str(&format!(
                "utc={}\n",
                since.to_rfc3339_opts(SecondsFormat::Secs, true)
            ));
        }
        if let Some(action) = &self.action {
            body.push_str(&format!("action={action}\n"));
        }
        if let Some(group) = &self.group {
            body.push_str(&format!("group={group}\n"));
        }
        body
    }
}

impl Display for LockHolder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.pid {
            Some(pid) => write!(f, "pid {pid}")?,
            None => write!(f, "unknown process")?,
        }
        match (&self.action, &self.group) {
            (Some(action), Some(group)) => write!(f, " running `{action}` on group `{group}`")?,
            (Some(action), None) => write!(f, " running `{action}`")?,
            _ => {}
        }
        if let Some(since) = self.since {
            write!(f, " since {}", since.to_rfc3339_opts(SecondsFormat::Secs, true))?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerMutationError<E> {
    #[error("ledger lock busy: {lock_path} (held by {holder})")]
    LockBusy { lock_path: String, holder: LockHolder },

    #[error("failed to acquire ledger lock {lock_path}: {message}")]
    LockIo { lock_path: String, message: String },

    #[error(transparent)]
    Ledger(LedgerError),

    #[error("{0}")]
    Mutation(E),
}

/// Execute one lock-scoped mutation against the ledger at `path`.
///
/// The mutator returns `(value, changed)`; the ledger is written back only
/// when `changed` is true, before the lock is released.
pub fn mutate_ledger<T, E, F>(
    path: impl AsRef<Path>,
    intent: &MutationIntent<'_>,
    mutator: F,
) -> Result<T, LedgerMutationError<E>>
where
    F: FnOnce(&mut MigrationLedger) -> Result<(T, bool), E>,
{
    let path = path.as_ref();
    let _guard = LedgerLock::acquire(path, intent)?;

    let mut ledger = load(path).map_err(LedgerMutationError::Ledger)?;
    let (value, changed) = mutator(&mut ledger).map_err(LedgerMutationError::Mutation)?;
    if changed {
        save(&ledger, path).map_err(LedgerMutationError::Ledger)?;
        tracing::info!(
            path = %path.display(),
            action = intent.action,
            group = intent.group.unwrap_or_default(),
            "persisted ledger mutation"
        );
    }
    Ok(value)
}

/// Held for the duration of one mutation; removes the lock file on drop.
struct LedgerLock {
    lock_path: PathBuf,
    file: File,
}

impl LedgerLock {
    fn acquire<E>(
        ledger_path: &Path,
        intent: &MutationIntent<'_>,
    ) -> Result<Self, LedgerMutationError<E>> {
        let lock_path = ledger_lock_path(ledger_path);
        let lock_io = |message: String| LedgerMutationError::LockIo {
            lock_path: lock_path.display().to_string(),
            message,
        };

        let file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(&lock_path)
                    .map(|body| LockHolder::parse(&body))
                    .unwrap_or_default();
                tracing::debug!(lock = %lock_path.display(), %holder, "ledger lock busy");
                return Err(LedgerMutationError::LockBusy {
                    lock_path: lock_path.display().to_string(),
                    holder,
                });
            }
            Err(err) => return Err(lock_io(err.to_string())),
        };

        // Dropping `lock` on a failed body write removes the file again.
        let lock = Self {
            lock_path: lock_path.clone(),
            file,
        };
        (&lock.file)
            .write_all(LockHolder::current(intent).render().as_bytes())
            .and_then(|()| lock.file.sync_all())
            .map_err(|e| lock_io(e.to_string()))?;
        Ok(lock)
    }
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}
