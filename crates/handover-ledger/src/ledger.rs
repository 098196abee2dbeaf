//! Canonical in-memory ledger.
//!
//! The ledger is the root persistence unit: project locations plus an ordered
//! list of migration groups, each owning its ordered mapping entries. All
//! mutation here is in-memory; persistence is a separate step in
//! [`crate::document`].

use crate::entry::{Disposition, MappingEntry, validate_address, validate_identifier};
use crate::error::LedgerError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Where the source and target programs live.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProjectLocations {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target: String,
    /// Target project name used in identifier derivation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

impl ProjectLocations {
    /// Explicit project name, falling back to the last component of the
    /// target directory.
    pub fn project_name(&self) -> Option<String> {
        if let Some(name) = self.project.as_deref().filter(|n| !n.is_empty()) {
            return Some(name.to_string());
        }
        Path::new(&self.target)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .filter(|name| !name.is_empty())
    }
}

/// One migration group (a source state paired with a target stack).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationGroup {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_location: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cache_files: Vec<String>,
    #[serde(rename = "resources", default, skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<MappingEntry>,
}

/// Result of [`MigrationGroup::upsert_entry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Updated { index: usize, cleared_skip: bool },
    Appended { index: usize },
}

impl UpsertOutcome {
    pub fn index(&self) -> usize {
        match self {
            Self::Updated { index, .. } | Self::Appended { index } => *index,
        }
    }
}

impl MigrationGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Lookup the entry governing `address`.
    ///
    /// An active entry wins over excluded ones; otherwise the first entry
    /// recorded for the address is returned.
    pub fn find_entry(&self, address: &str) -> Option<&MappingEntry> {
        self.governing_index(address).map(|index| &self.entries[index])
    }

    fn governing_index(&self, address: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.has_address(address) && e.is_active())
            .or_else(|| self.entries.iter().position(|e| e.has_address(address)))
    }

    /// Bind `address` to `identifier`.
    ///
    /// The entry `find_entry` returns is replaced with an updated copy; a
    /// `Skip` disposition is cleared back to `Unset`. Without an existing
    /// entry a new active one is appended.
    pub fn upsert_entry(
        &mut self,
        address: &str,
        identifier: &str,
    ) -> Result<UpsertOutcome, LedgerError> {
        validate_address(address)?;
        validate_identifier(identifier)?;

        match self.governing_index(address) {
            Some(index) => {
                let mut updated = self.entries[index].clone();
                updated.target_identifier = Some(identifier.to_string());
                let cleared_skip = updated.disposition == Disposition::Skip;
                if cleared_skip {
                    updated.disposition = Disposition::Unset;
                }
                self.entries[index] = updated;
                Ok(UpsertOutcome::Updated {
                    index,
                    cleared_skip,
                })
            }
            None => {
                self.entries.push(MappingEntry::tracked(address, identifier));
                Ok(UpsertOutcome::Appended {
                    index: self.entries.len() - 1,
                })
            }
        }
    }

    /// Mark every entry for `address` with a non-active disposition,
    /// appending one when the address is not yet recorded.
    ///
    /// Returns the number of entries touched.
    pub fn skip_entry(
        &mut self,
        address: &str,
        disposition: Disposition,
    ) -> Result<usize, LedgerError> {
        validate_address(address)?;
        if disposition.is_unset() {
            return Err(LedgerError::validation(
                "disposition",
                "skipping requires a non-unset disposition",
            ));
        }

        let indices: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.has_address(address))
            .map(|(idx, _)| idx)
            .collect();

        if indices.is_empty() {
            self.entries.push(MappingEntry::excluded(address, disposition));
            return Ok(1);
        }

        for &index in &indices {
            let mut updated = self.entries[index].clone();
            updated.disposition = disposition;
            self.entries[index] = updated;
        }
        Ok(indices.len())
    }

    /// Drop every entry recorded for `address`. Returns how many were removed.
    pub fn remove_entries(&mut self, address: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !e.has_address(address));
        before - self.entries.len()
    }

    /// Entries that take part in reconciliation.
    pub fn active_entries(&self) -> impl Iterator<Item = &MappingEntry> {
        self.entries.iter().filter(|e| e.is_active())
    }

    /// Every auxiliary path the group references, state location first.
    pub fn referenced_paths(&self) -> impl Iterator<Item = &str> {
        self.state_location
            .as_deref()
            .into_iter()
            .chain(self.cache_files.iter().map(String::as_str))
    }
}

/// Root persistence unit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MigrationLedger {
    #[serde(default)]
    pub projects: ProjectLocations,
    #[serde(default)]
    pub groups: Vec<MigrationGroup>,
}

impl MigrationLedger {
    pub fn group(&self, name: &str) -> Result<&MigrationGroup, LedgerError> {
        self.groups
            .iter()
            .find(|g| g.name == name)
            .ok_or_else(|| LedgerError::GroupNotFound(name.to_string()))
    }

    pub fn group_mut(&mut self, name: &str) -> Result<&mut MigrationGroup, LedgerError> {
        self.groups
            .iter_mut()
            .find(|g| g.name == name)
            .ok_or_else(|| LedgerError::GroupNotFound(name.to_string()))
    }

    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|g| g.name.as_str())
    }

    /// Total entries across all groups.
    pub fn entry_count(&self) -> usize {
        self.groups.iter().map(|g| g.entries.len()).sum()
    }

    /// Content digest of the canonical document form.
    ///
    /// Two ledgers with equal digests serialize identically.
    pub fn digest(&self) -> Result<String, LedgerError> {
        let bytes =
            serde_json::to_vec(self).map_err(|e| LedgerError::Serialize(e.to_string()))?;
        let hash = Sha256::digest(bytes);
        Ok(format!("ledger1_{}", hex_lower(&hash)))
    }
}

fn hex_lower(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
