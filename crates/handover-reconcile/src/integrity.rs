//! Ledger integrity checking.
//!
//! Three passes, always all run, findings concatenated in this order:
//!
//! 1. file existence of every referenced state/cache path
//! 2. bidirectional uniqueness among active entries
//! 3. consistency between ledger addresses and the live inventory
//!
//! Findings are soft: they are collected, never raised. Only a live
//! inventory that exists but cannot be read aborts the check.

use crate::identity::similar_addresses;
use crate::inventory::{InventoryError, InventoryReader, read_inventory};
use handover_ledger::{MigrationGroup, MigrationLedger};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

/// Category of one integrity finding, in pass order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingCategory {
    FileMissing,
    DuplicateAddress,
    DuplicateIdentifier,
    UntrackedResource,
    OrphanedEntry,
}

impl FindingCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileMissing => "file-missing",
            Self::DuplicateAddress => "duplicate-address",
            Self::DuplicateIdentifier => "duplicate-identifier",
            Self::UntrackedResource => "untracked-resource",
            Self::OrphanedEntry => "orphaned-entry",
        }
    }

    /// One example command showing how this category is usually fixed.
    pub fn example_remediation(&self) -> &'static str {
        match self {
            Self::FileMissing => {
                "restore the file, or edit the group's stateLocation/cacheFiles in the ledger"
            }
            Self::DuplicateAddress => "handover untrack --group <group> --address <address>",
            Self::DuplicateIdentifier => {
                "handover set-association --group <group> --address <address> --identifier <identifier>"
            }
            Self::UntrackedResource => "handover skip --group <group> --address <address>",
            Self::OrphanedEntry => "handover untrack --group <group> --address <address>",
        }
    }
}

impl fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckFinding {
    pub category: FindingCategory,
    pub group: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl CheckFinding {
    fn new(category: FindingCategory, group: &str, message: String) -> Self {
        Self {
            category,
            group: group.to_string(),
            message,
            suggestion: None,
        }
    }

    fn with_suggestion(mut self, suggestion: String) -> Self {
        self.suggestion = Some(suggestion);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub errors: Vec<CheckFinding>,
}

impl CheckResult {
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn accepted(&self) -> bool {
        self.errors.is_empty()
    }

    /// Findings grouped by category, categories in pass order.
    pub fn by_category(&self) -> BTreeMap<FindingCategory, Vec<&CheckFinding>> {
        let mut grouped: BTreeMap<FindingCategory, Vec<&CheckFinding>> = BTreeMap::new();
        for finding in &self.errors {
            grouped.entry(finding.category).or_default().push(finding);
        }
        grouped
    }

    pub fn categories(&self) -> Vec<FindingCategory> {
        self.errors
            .iter()
            .map(|f| f.category)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("group `{group}`: failed to read live inventory: {source}")]
    Inventory {
        group: String,
        #[source]
        source: InventoryError,
    },
}

/// Run all three passes. `base_dir` resolves relative ledger paths.
pub fn check(
    ledger: &MigrationLedger,
    base_dir: &Path,
    reader: &dyn InventoryReader,
) -> Result<CheckResult, CheckError> {
    let mut errors = check_files(ledger, base_dir);
    errors.extend(check_unique_mappings(ledger));
    errors.extend(check_state_consistency(ledger, base_dir, reader)?);
    tracing::debug!(findings = errors.len(), "integrity check finished");
    Ok(CheckResult { errors })
}

/// Pass 1: every referenced auxiliary path must exist.
pub fn check_files(ledger: &MigrationLedger, base_dir: &Path) -> Vec<CheckFinding> {
    let mut findings = Vec::new();
    for group in &ledger.groups {
        for referenced in group.referenced_paths() {
            let path = base_dir.join(referenced);
            if !path.exists() {
                findings.push(CheckFinding::new(
                    FindingCategory::FileMissing,
                    &group.name,
                    format!("referenced file does not exist: {}", path.display()),
                ));
            }
        }
    }
    findings
}

/// Pass 2: among active entries with both fields set, addresses and
/// identifiers must each be unique. One finding per duplicated key.
pub fn check_unique_mappings(ledger: &MigrationLedger) -> Vec<CheckFinding> {
    let mut findings = Vec::new();
    for group in &ledger.groups {
        let (by_address, by_identifier) = mapping_multimaps(group);

        for (address, identifiers) in by_address {
            if identifiers.len() < 2 {
                continue;
            }
            findings.push(
                CheckFinding::new(
                    FindingCategory::DuplicateAddress,
                    &group.name,
                    format!(
                        "address `{address}` is mapped to {} identifiers: {}",
                        identifiers.len(),
                        identifiers.join(", ")
                    ),
                )
                .with_suggestion(format!(
                    "handover untrack --group {group} --address {address}\n\
                     handover set-association --group {group} --address {address} --identifier {first}",
                    group = group.name,
                    first = identifiers[0],
                )),
            );
        }

        for (identifier, addresses) in by_identifier {
            if addresses.len() < 2 {
                continue;
            }
            let reassign: Vec<String> = addresses[1..]
                .iter()
                .map(|address| {
                    format!(
                        "handover set-association --group {} --address {address} --identifier <identifier>",
                        group.name
                    )
                })
                .collect();
            findings.push(
                CheckFinding::new(
                    FindingCategory::DuplicateIdentifier,
                    &group.name,
                    format!(
                        "identifier `{identifier}` is claimed by {} addresses: {}",
                        addresses.len(),
                        addresses.join(", ")
                    ),
                )
                .with_suggestion(reassign.join("\n")),
            );
        }
    }
    findings
}

type Multimap<'a> = BTreeMap<&'a str, Vec<&'a str>>;

fn mapping_multimaps(group: &MigrationGroup) -> (Multimap<'_>, Multimap<'_>) {
    let mut by_address: Multimap<'_> = BTreeMap::new();
    let mut by_identifier: Multimap<'_> = BTreeMap::new();
    for entry in group.active_entries() {
        let (Some(address), Some(identifier)) = (entry.address(), entry.identifier()) else {
            continue;
        };
        by_address.entry(address).or_default().push(identifier);
        by_identifier.entry(identifier).or_default().push(address);
    }
    (by_address, by_identifier)
}

/// Pass 3: ledger addresses against the live inventory of each group with a
/// state location. Groups whose state file is missing are left to pass 1.
pub fn check_state_consistency(
    ledger: &MigrationLedger,
    base_dir: &Path,
    reader: &dyn InventoryReader,
) -> Result<Vec<CheckFinding>, CheckError> {
    let mut findings = Vec::new();
    for group in &ledger.groups {
        let Some(location) = group.state_location.as_deref() else {
            continue;
        };
        let path = base_dir.join(location);
        if !path.exists() {
            tracing::debug!(
                group = %group.name,
                "state location missing; skipping consistency pass"
            );
            continue;
        }

        let inventory = read_inventory(reader, &path).map_err(|source| CheckError::Inventory {
            group: group.name.clone(),
            source,
        })?;
        let live: BTreeSet<&str> = inventory.iter().map(|r| r.address.as_str()).collect();

        let mut tracked: Vec<&str> = Vec::new();
        for address in group.entries.iter().filter_map(|e| e.address()) {
            if !tracked.contains(&address) {
                tracked.push(address);
            }
        }
        let orphans: Vec<&str> = tracked
            .iter()
            .copied()
            .filter(|address| !live.contains(address))
            .collect();

        for resource in &inventory {
            let address = resource.address.as_str();
            if tracked.contains(&address) {
                continue;
            }
            let mut suggestion =
                format!("handover skip --group {} --address {address}", group.name);
            let renames = similar_addresses(address, orphans.iter().copied());
            if !renames.is_empty() {
                suggestion.push_str(&format!(
                    "\ndid you mean a renamed entry: {}",
                    renames.join(", ")
                ));
            }
            findings.push(
                CheckFinding::new(
                    FindingCategory::UntrackedResource,
                    &group.name,
                    format!("live resource `{address}` has no ledger entry"),
                )
                .with_suggestion(suggestion),
            );
        }

        for address in &orphans {
            findings.push(
                CheckFinding::new(
                    FindingCategory::OrphanedEntry,
                    &group.name,
                    format!("ledger entry `{address}` is not in the live inventory"),
                )
                .with_suggestion(format!(
                    "handover untrack --group {} --address {address}",
                    group.name
                )),
            );
        }
    }
    Ok(findings)
}
