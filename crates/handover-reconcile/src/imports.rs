//! Import resolution: bind ledger entries that have no live target state to
//! candidate resources the target system discovered.

use crate::identity::{CandidateImportRecord, MatchContext, Suggestion, is_match, rank_suggestions};
use crate::inventory::ResourceDescriptor;
use handover_ledger::{LedgerError, MappingEntry, MigrationGroup, write_atomic};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

/// One binding from a source address to a discovered target resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportDirective {
    pub address: String,
    pub identifier: String,
    pub kind: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnresolvedEntry {
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub suggestions: Vec<Suggestion>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResolution {
    pub directives: Vec<ImportDirective>,
    pub unresolved: Vec<UnresolvedEntry>,
    pub unresolved_count: usize,
}

/// Entries that still need importing: unset disposition, an address, and no
/// confirmed live state for their identifier.
fn is_eligible(entry: &MappingEntry, live_identifiers: &BTreeSet<&str>) -> bool {
    entry.is_active()
        && entry.address().is_some()
        && entry
            .identifier()
            .is_none_or(|identifier| !live_identifiers.contains(identifier))
}

/// Resolve eligible entries of `group` against `candidates`.
///
/// The first unclaimed exact match in candidate order wins. A candidate and
/// an address each bind at most once. Every eligible entry whose address
/// ends up unbound is reported as unresolved.
pub fn resolve_imports(
    ctx: &MatchContext,
    group: &MigrationGroup,
    candidates: &[CandidateImportRecord],
    live_identifiers: &BTreeSet<&str>,
    inventory: &[ResourceDescriptor],
) -> ImportResolution {
    let eligible: Vec<(&str, &MappingEntry)> = group
        .entries
        .iter()
        .filter(|entry| is_eligible(entry, live_identifiers))
        .filter_map(|entry| entry.address().map(|address| (address, entry)))
        .collect();

    let mut resolution = ImportResolution::default();
    let mut claimed = vec![false; candidates.len()];
    let mut bound_addresses: BTreeSet<&str> = BTreeSet::new();

    for &(address, entry) in &eligible {
        let Some(identifier) = entry.identifier() else {
            continue;
        };
        if bound_addresses.contains(address) {
            continue;
        }
        let Some(idx) = (0..candidates.len())
            .find(|&idx| !claimed[idx] && is_match(ctx, entry, &candidates[idx]))
        else {
            continue;
        };

        claimed[idx] = true;
        bound_addresses.insert(address);
        let import_id = inventory
            .iter()
            .find(|resource| resource.address == address)
            .and_then(ResourceDescriptor::import_id)
            .map(str::to_string);
        resolution.directives.push(ImportDirective {
            address: address.to_string(),
            identifier: identifier.to_string(),
            kind: candidates[idx].kind.clone(),
            name: candidates[idx].name.clone(),
            import_id,
        });
    }

    for &(address, entry) in &eligible {
        if bound_addresses.contains(address) {
            continue;
        }
        resolution.unresolved.push(UnresolvedEntry {
            address: address.to_string(),
            identifier: entry.identifier().map(str::to_string),
            suggestions: rank_suggestions(ctx, entry, candidates),
        });
    }
    resolution.unresolved_count = resolution.unresolved.len();

    tracing::debug!(
        group = %group.name,
        directives = resolution.directives.len(),
        unresolved = resolution.unresolved_count,
        "resolved imports"
    );
    resolution
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct ImportFileResource<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ImportFile<'a> {
    resources: Vec<ImportFileResource<'a>>,
}

/// Render directives in the target system's bulk import-file format.
pub fn render_import_file(directives: &[ImportDirective]) -> Result<String, LedgerError> {
    let file = ImportFile {
        resources: directives
            .iter()
            .map(|directive| ImportFileResource {
                kind: &directive.kind,
                name: &directive.name,
                id: directive.import_id.as_deref(),
            })
            .collect(),
    };
    let mut text =
        serde_json::to_string_pretty(&file).map_err(|e| LedgerError::Serialize(e.to_string()))?;
    text.push('\n');
    Ok(text)
}

/// Atomically write the import file for `directives`.
pub fn write_import_file(directives: &[ImportDirective], path: &Path) -> Result<(), LedgerError> {
    let missing_ids = directives.iter().filter(|d| d.import_id.is_none()).count();
    if missing_ids > 0 {
        tracing::warn!(missing_ids, "some import directives have no source id");
    }
    write_atomic(path, &render_import_file(directives)?)?;
    tracing::info!(path = %path.display(), directives = directives.len(), "wrote import file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use handover_ledger::Disposition;
    use serde_json::{Map, json};

    const BUCKET: &str = "aws:s3/bucket:Bucket";

    fn ctx() -> MatchContext {
        MatchContext::new("shop", "dev")
    }

    fn urn(name: &str) -> String {
        format!("urn:pulumi:dev::shop::{BUCKET}::{name}")
    }

    fn candidate(name: &str) -> CandidateImportRecord {
        CandidateImportRecord {
            kind: BUCKET.to_string(),
            name: name.to_string(),
            target_identifier: None,
            inferred_address: None,
        }
    }

    fn bucket(address: &str, id: &str) -> ResourceDescriptor {
        let mut attributes = Map::new();
        attributes.insert("id".to_string(), json!(id));
        ResourceDescriptor {
            address: address.to_string(),
            kind: "aws_s3_bucket".to_string(),
            name: address.rsplit('.').next().unwrap_or(address).to_string(),
            index: None,
            provider_namespace: "aws".to_string(),
            is_managed: true,
            attributes,
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
    fn exact_candidate_produces_one_directive() {
        let group = group(vec![MappingEntry::tracked("aws_s3_bucket.logs", urn("logs"))]);
        let inventory = vec![bucket("aws_s3_bucket.logs", "shop-logs-bucket")];
        let resolution = resolve_imports(
            &ctx(),
            &group,
            &[candidate("logs")],
            &BTreeSet::new(),
            &inventory,
        );
        assert_eq!(resolution.unresolved_count, 0);
        assert_eq!(
            resolution.directives,
            vec![ImportDirective {
                address: "aws_s3_bucket.logs".to_string(),
                identifier: urn("logs"),
                kind: BUCKET.to_string(),
                name: "logs".to_string(),
                import_id: Some("shop-logs-bucket".to_string()),
            }]
        );
    }

    #[test]
    fn no_matching_candidates_leaves_every_eligible_entry_unresolved() {
        let group = group(vec![
            MappingEntry::tracked("aws_s3_bucket.logs", urn("logs")),
            MappingEntry {
                source_address: Some("aws_s3_bucket.assets".to_string()),
                ..MappingEntry::default()
            },
            MappingEntry::excluded("aws_s3_bucket.tmp", Disposition::Skip),
        ]);
        let resolution = resolve_imports(
            &ctx(),
            &group,
            &[candidate("log")],
            &BTreeSet::new(),
            &[],
        );
        assert!(resolution.directives.is_empty());
        assert_eq!(resolution.unresolved_count, 2);
        let logs = &resolution.unresolved[0];
        assert_eq!(logs.address, "aws_s3_bucket.logs");
        assert_eq!(logs.suggestions.len(), 1);
        assert_eq!(logs.suggestions[0].name, "log");
        assert!(resolution.unresolved[1].suggestions.is_empty());
    }

    #[test]
    fn entries_with_live_state_are_not_eligible() {
        let identifier = urn("logs");
        let group = group(vec![MappingEntry::tracked("aws_s3_bucket.logs", &identifier)]);
        let live = BTreeSet::from([identifier.as_str()]);
        let resolution = resolve_imports(&ctx(), &group, &[candidate("logs")], &live, &[]);
        assert_eq!(resolution, ImportResolution::default());
    }

    #[test]
    fn candidate_binds_at_most_once() {
        let group = group(vec![
            MappingEntry::tracked("aws_s3_bucket.logs", urn("logs")),
            MappingEntry::tracked("aws_s3_bucket.logs_copy", urn("logs")),
        ]);
        let resolution = resolve_imports(
            &ctx(),
            &group,
            &[candidate("logs")],
            &BTreeSet::new(),
            &[],
        );
        assert_eq!(resolution.directives.len(), 1);
        assert_eq!(resolution.directives[0].address, "aws_s3_bucket.logs");
        assert_eq!(resolution.unresolved_count, 1);
        assert_eq!(resolution.unresolved[0].address, "aws_s3_bucket.logs_copy");
    }

    #[test]
    fn address_binds_at_most_once() {
        let group = group(vec![
            MappingEntry::tracked("aws_s3_bucket.logs", urn("logs")),
            MappingEntry::tracked("aws_s3_bucket.logs", urn("logs2")),
        ]);
        let resolution = resolve_imports(
            &ctx(),
            &group,
            &[candidate("logs"), candidate("logs2")],
            &BTreeSet::new(),
            &[],
        );
        assert_eq!(resolution.directives.len(), 1);
        assert_eq!(resolution.unresolved_count, 0);
    }

    #[test]
    fn every_unmatched_row_of_an_address_is_unresolved() {
        let group = group(vec![
            MappingEntry::tracked("aws_s3_bucket.logs", urn("x")),
            MappingEntry::tracked("aws_s3_bucket.logs", urn("logs")),
        ]);
        let resolution = resolve_imports(&ctx(), &group, &[], &BTreeSet::new(), &[]);
        assert!(resolution.directives.is_empty());
        assert_eq!(resolution.unresolved_count, 2);
        assert_eq!(resolution.unresolved[0].identifier, Some(urn("x")));
        assert_eq!(resolution.unresolved[1].identifier, Some(urn("logs")));
    }

    #[test]
    fn later_row_can_bind_after_an_unmatched_one() {
        let group = group(vec![
            MappingEntry::tracked("aws_s3_bucket.logs", urn("x")),
            MappingEntry::tracked("aws_s3_bucket.logs", urn("logs")),
        ]);
        let resolution = resolve_imports(
            &ctx(),
            &group,
            &[candidate("logs")],
            &BTreeSet::new(),
            &[],
        );
        assert_eq!(resolution.directives.len(), 1);
        assert_eq!(resolution.directives[0].identifier, urn("logs"));
        assert_eq!(resolution.unresolved_count, 0);
    }

    #[test]
    fn import_file_uses_target_format() {
        let directives = vec![ImportDirective {
            address: "aws_s3_bucket.logs".to_string(),
            identifier: urn("logs"),
            kind: BUCKET.to_string(),
            name: "logs".to_string(),
            import_id: Some("shop-logs-bucket".to_string()),
        }];
        let text = render_import_file(&directives).expect("import file should render");
        let value: serde_json::Value = serde_json::from_str(&text).expect("valid json");
        assert_eq!(
            value,
            json!({"resources": [{"type": BUCKET, "name": "logs", "id": "shop-logs-bucket"}]})
        );
        assert!(text.ends_with('\n'));
    }
}
