//! Per-resource migration status.
//!
//! Every inventory address gets exactly one status, evaluated independently
//! in a fixed priority order:
//!
//! ```text
//! no entry                       → NotTracked
//! entry, disposition ≠ Unset     → Skipped
//! entry, Unset, no identifier    → NotTracked
//! entry, Unset, identifier       → Translated { sub-status from preview }
//! ```

use crate::inventory::ResourceDescriptor;
use crate::preview::{PendingChange, PreviewMap};
use handover_ledger::MigrationGroup;
use serde::Serialize;

/// How far a translated resource has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubStatus {
    NoState,
    NeedsUpdate,
    NeedsReplace,
    Migrated,
}

impl SubStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoState => "no-state",
            Self::NeedsUpdate => "needs-update",
            Self::NeedsReplace => "needs-replace",
            Self::Migrated => "migrated",
        }
    }

    /// Map the preview's pending change. Changes other than same, update and
    /// replace are reported as needing an update.
    pub fn from_pending(change: Option<&PendingChange>) -> Self {
        match change {
            None => Self::NoState,
            Some(PendingChange::Replace) => Self::NeedsReplace,
            Some(PendingChange::Update) => Self::NeedsUpdate,
            Some(PendingChange::Same) => Self::Migrated,
            Some(
                PendingChange::Create
                | PendingChange::Delete
                | PendingChange::Read
                | PendingChange::Other(_),
            ) => Self::NeedsUpdate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ResourceStatus {
    Skipped,
    NotTracked,
    #[serde(rename_all = "camelCase")]
    Translated {
        target_identifier: String,
        sub_status: SubStatus,
    },
}

impl ResourceStatus {
    /// Short label used in reports, e.g. `translated/migrated`.
    pub fn label(&self) -> String {
        match self {
            Self::Skipped => "skipped".to_string(),
            Self::NotTracked => "not-tracked".to_string(),
            Self::Translated { sub_status, .. } => format!("translated/{}", sub_status.as_str()),
        }
    }
}

/// Classify one address against the group's ledger entries and a preview.
pub fn classify(address: &str, group: &MigrationGroup, preview: &PreviewMap) -> ResourceStatus {
    let Some(entry) = group.find_entry(address) else {
        return ResourceStatus::NotTracked;
    };
    if !entry.is_active() {
        return ResourceStatus::Skipped;
    }
    let Some(identifier) = entry.identifier() else {
        return ResourceStatus::NotTracked;
    };
    ResourceStatus::Translated {
        target_identifier: identifier.to_string(),
        sub_status: SubStatus::from_pending(preview.get(identifier)),
    }
}

/// Per-status counts; a fold over a [`StatusReport`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub skipped: usize,
    pub not_tracked: usize,
    pub no_state: usize,
    pub needs_update: usize,
    pub needs_replace: usize,
    pub migrated: usize,
}

impl StatusCounts {
    fn record(mut self, status: &ResourceStatus) -> Self {
        match status {
            ResourceStatus::Skipped => self.skipped += 1,
            ResourceStatus::NotTracked => self.not_tracked += 1,
            ResourceStatus::Translated { sub_status, .. } => match sub_status {
                SubStatus::NoState => self.no_state += 1,
                SubStatus::NeedsUpdate => self.needs_update += 1,
                SubStatus::NeedsReplace => self.needs_replace += 1,
                SubStatus::Migrated => self.migrated += 1,
            },
        }
        self
    }

    pub fn total(&self) -> usize {
        self.skipped
            + self.not_tracked
            + self.no_state
            + self.needs_update
            + self.needs_replace
            + self.migrated
    }

    pub fn translated(&self) -> usize {
        self.no_state + self.needs_update + self.needs_replace + self.migrated
    }
}

/// Address → status for one inventory, in inventory order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub resources: Vec<(String, ResourceStatus)>,
}

impl StatusReport {
    pub fn status_of(&self, address: &str) -> Option<&ResourceStatus> {
        self.resources
            .iter()
            .find(|(a, _)| a == address)
            .map(|(_, status)| status)
    }

    pub fn counts(&self) -> StatusCounts {
        self.resources
            .iter()
            .fold(StatusCounts::default(), |acc, (_, status)| acc.record(status))
    }

    /// Fraction of non-skipped resources that are fully migrated. `1.0` when
    /// nothing is left to migrate.
    pub fn progress(&self) -> f64 {
        let counts = self.counts();
        let relevant = counts.total() - counts.skipped;
        if relevant == 0 {
            return 1.0;
        }
        counts.migrated as f64 / relevant as f64
    }

    /// Addresses with the given label, in inventory order.
    pub fn addresses_labelled(&self, label: &str) -> Vec<&str> {
        self.resources
            .iter()
            .filter(|(_, status)| status.label() == label)
            .map(|(address, _)| address.as_str())
            .collect()
    }
}

/// Classify every inventory address.
pub fn reconcile(
    inventory: &[ResourceDescriptor],
    group: &MigrationGroup,
    preview: &PreviewMap,
) -> StatusReport {
    let resources = inventory
        .iter()
        .map(|resource| {
            (
                resource.address.clone(),
                classify(&resource.address, group, preview),
            )
        })
        .collect();
    StatusReport { resources }
}

#[cfg(test)]
mod tests {
    use super::*;
    use handover_ledger::{Disposition, MappingEntry};
    use serde_json::Map;

    fn descriptor(address: &str) -> ResourceDescriptor {
        ResourceDescriptor {
            address: address.to_string(),
            kind: "aws_s3_bucket".to_string(),
            name: address.to_string(),
            index: None,
            provider_namespace: "aws".to_string(),
            is_managed: true,
            attributes: Map::new(),
        }
    }

    fn group(entries: Vec<MappingEntry>) -> MigrationGroup {
        MigrationGroup {
            name: "dev".to_string(),
            entries,
            ..MigrationGroup::default()
        }
    }

    #[test]
    fn skipped_tracked_and_untracked_resources() {
        let inventory = vec![descriptor("a"), descriptor("b"), descriptor("c")];
        let group = group(vec![
            MappingEntry::tracked("a", "urn1"),
            MappingEntry::excluded("b", Disposition::Skip),
        ]);
        let mut preview = PreviewMap::new();
        preview.insert("urn1", PendingChange::Same);

        let report = reconcile(&inventory, &group, &preview);
        assert_eq!(
            report.status_of("a"),
            Some(&ResourceStatus::Translated {
                target_identifier: "urn1".to_string(),
                sub_status: SubStatus::Migrated
            })
        );
        assert_eq!(report.status_of("b"), Some(&ResourceStatus::Skipped));
        assert_eq!(report.status_of("c"), Some(&ResourceStatus::NotTracked));
    }

    #[test]
    fn preview_classifications_map_to_sub_status() {
        let cases = [
            (None, SubStatus::NoState),
            (Some(PendingChange::Replace), SubStatus::NeedsReplace),
            (Some(PendingChange::Update), SubStatus::NeedsUpdate),
            (Some(PendingChange::Same), SubStatus::Migrated),
            (Some(PendingChange::Create), SubStatus::NeedsUpdate),
            (Some(PendingChange::Delete), SubStatus::NeedsUpdate),
            (Some(PendingChange::Other("refresh".to_string())), SubStatus::NeedsUpdate),
        ];
        for (change, expected) in cases {
            let mut preview = PreviewMap::new();
            if let Some(change) = change {
                preview.insert("urn1", change);
            }
            let status = classify("a", &group(vec![MappingEntry::tracked("a", "urn1")]), &preview);
            assert_eq!(
                status,
                ResourceStatus::Translated {
                    target_identifier: "urn1".to_string(),
                    sub_status: expected
                }
            );
        }
    }

    #[test]
    fn active_entry_without_identifier_is_not_tracked() {
        let entry = MappingEntry {
            source_address: Some("a".to_string()),
            ..MappingEntry::default()
        };
        assert_eq!(
            classify("a", &group(vec![entry]), &PreviewMap::new()),
            ResourceStatus::NotTracked
        );
    }

    #[test]
    fn ignore_dispositions_are_skipped_even_with_identifier() {
        let mut entry = MappingEntry::tracked("a", "urn1");
        entry.disposition = Disposition::IgnoreNeedsReplace;
        let mut preview = PreviewMap::new();
        preview.insert("urn1", PendingChange::Replace);
        assert_eq!(classify("a", &group(vec![entry]), &preview), ResourceStatus::Skipped);
    }

    #[test]
    fn counts_sum_to_inventory_size() {
        let inventory: Vec<ResourceDescriptor> =
            ["a", "b", "c", "d", "e"].iter().map(|a| descriptor(a)).collect();
        let group = group(vec![
            MappingEntry::tracked("a", "urn1"),
            MappingEntry::tracked("b", "urn2"),
            MappingEntry::excluded("c", Disposition::IgnoreNoState),
            MappingEntry::tracked("z", "urn9"),
        ]);
        let mut preview = PreviewMap::new();
        preview.insert("urn1", PendingChange::Same);
        preview.insert("urn2", PendingChange::Update);

        let report = reconcile(&inventory, &group, &preview);
        let counts = report.counts();
        assert_eq!(report.resources.len(), inventory.len());
        assert_eq!(counts.total(), inventory.len());
        assert_eq!(counts.migrated, 1);
        assert_eq!(counts.needs_update, 1);
        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.not_tracked, 2);
        assert_eq!(report.progress(), 0.25);
        assert_eq!(report.addresses_labelled("not-tracked"), vec!["d", "e"]);
    }

    #[test]
    fn empty_inventory_is_fully_migrated() {
        let report = reconcile(&[], &group(vec![]), &PreviewMap::new());
        assert_eq!(report.counts().total(), 0);
        assert_eq!(report.progress(), 1.0);
    }
}
