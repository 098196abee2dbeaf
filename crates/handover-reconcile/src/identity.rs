//! Identity between ledger entries and target-system resources.
//!
//! Exact identity is decided by identifier equality, either with an
//! identifier the candidate carries or with the one the target system would
//! assign it. Partial identity is a name-similarity heuristic that only feeds
//! "did you mean" output.

use handover_ledger::{LedgerError, MappingEntry, MigrationLedger};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

const IDENTIFIER_PREFIX: &str = "urn:pulumi:";
const PARENT_TYPE_SEPARATOR: char = '$';

/// Minimum normalized similarity for two names to count as similar.
pub const PARTIAL_MATCH_THRESHOLD: f64 = 0.75;
/// Containment only counts when the shorter normalized name is this long.
pub const MIN_CONTAINED_NAME_LEN: usize = 3;
pub const SUGGESTION_LIMIT: usize = 3;

/// A resource the target system discovered but that is not yet bound to a
/// source address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateImportRecord {
    /// Target type token, e.g. `aws:s3/bucket:Bucket`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Logical name on the target side.
    pub name: String,
    #[serde(rename = "urn", default, skip_serializing_if = "Option::is_none")]
    pub target_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inferred_address: Option<String>,
}

/// Project and group an identifier is derived in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchContext {
    pub project: String,
    pub group: String,
}

impl MatchContext {
    pub fn new(project: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            group: group.into(),
        }
    }

    /// Context for `group`, with the project name the ledger records.
    pub fn for_ledger(ledger: &MigrationLedger, group: &str) -> Result<Self, LedgerError> {
        let project = ledger
            .projects
            .project_name()
            .ok_or(LedgerError::MissingProjectName)?;
        Ok(Self::new(project, group))
    }

    pub fn expected_identifier(&self, candidate: &CandidateImportRecord) -> String {
        derive_expected_identifier(&self.project, &self.group, &candidate.kind, &candidate.name)
    }
}

/// Identifier the target system assigns to a top-level resource.
pub fn derive_expected_identifier(project: &str, group: &str, kind: &str, name: &str) -> String {
    format!("{IDENTIFIER_PREFIX}{group}::{project}::{kind}::{name}")
}

/// Components of a target identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierParts {
    pub group: String,
    pub project: String,
    /// Full type path, including parent types.
    pub type_path: String,
    /// The resource's own type token.
    pub kind: String,
    pub name: String,
}

pub fn parse_identifier(identifier: &str) -> Option<IdentifierParts> {
    let rest = identifier.strip_prefix("urn:")?;
    let mut parts = rest.splitn(4, "::");
    let head = parts.next()?;
    let project = parts.next()?;
    let type_path = parts.next()?;
    let name = parts.next()?;
    let (_, group) = head.split_once(':')?;
    if group.is_empty() || project.is_empty() || type_path.is_empty() || name.is_empty() {
        return None;
    }
    let kind = type_path
        .rsplit(PARENT_TYPE_SEPARATOR)
        .next()
        .unwrap_or(type_path);
    Some(IdentifierParts {
        group: group.to_string(),
        project: project.to_string(),
        type_path: type_path.to_string(),
        kind: kind.to_string(),
        name: name.to_string(),
    })
}

/// Exact identity: explicit identifier equality, or derived identifier
/// equality. Entries without an identifier never match.
pub fn is_match(
    ctx: &MatchContext,
    entry: &MappingEntry,
    candidate: &CandidateImportRecord,
) -> bool {
    let Some(identifier) = entry.identifier() else {
        return false;
    };
    if candidate.target_identifier.as_deref() == Some(identifier) {
        return true;
    }
    ctx.expected_identifier(candidate) == identifier
}

/// Heuristic identity: same type token and similar logical names.
///
/// Advisory only. The entry's kind and name are read from its identifier, so
/// entries without one never partially match.
pub fn is_partial_match(entry: &MappingEntry, candidate: &CandidateImportRecord) -> bool {
    partial_score(entry, candidate).is_some()
}

fn partial_score(entry: &MappingEntry, candidate: &CandidateImportRecord) -> Option<f64> {
    let parts = entry.identifier().and_then(parse_identifier)?;
    if parts.kind != candidate.kind {
        return None;
    }
    names_similar(&parts.name, &candidate.name)
        .then(|| name_similarity(&parts.name, &candidate.name))
}

/// One ranked "did you mean" entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub identifier: String,
    pub kind: String,
    pub name: String,
    pub score: f64,
}

/// Partially matching candidates for `entry`, best first.
///
/// Exact matches are excluded; ties are broken by name so the order is
/// stable.
pub fn rank_suggestions(
    ctx: &MatchContext,
    entry: &MappingEntry,
    candidates: &[CandidateImportRecord],
) -> Vec<Suggestion> {
    let mut ranked: Vec<Suggestion> = candidates
        .iter()
        .filter(|candidate| !is_match(ctx, entry, candidate))
        .filter_map(|candidate| {
            partial_score(entry, candidate).map(|score| Suggestion {
                identifier: candidate
                    .target_identifier
                    .clone()
                    .unwrap_or_else(|| ctx.expected_identifier(candidate)),
                kind: candidate.kind.clone(),
                name: candidate.name.clone(),
                score,
            })
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    ranked.truncate(SUGGESTION_LIMIT);
    ranked
}

/// Source addresses from `pool` that look like renames of `address`: same
/// resource type, similar name.
pub fn similar_addresses<'a>(
    address: &str,
    pool: impl IntoIterator<Item = &'a str>,
) -> Vec<String> {
    let Some((kind, name)) = address_parts(address) else {
        return Vec::new();
    };
    let mut scored: Vec<(f64, &str)> = pool
        .into_iter()
        .filter(|other| *other != address)
        .filter_map(|other| {
            let (other_kind, other_name) = address_parts(other)?;
            (other_kind == kind && names_similar(&name, &other_name))
                .then(|| (name_similarity(&name, &other_name), other))
        })
        .collect();
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.1.cmp(b.1))
    });
    scored
        .into_iter()
        .take(SUGGESTION_LIMIT)
        .map(|(_, other)| other.to_string())
        .collect()
}

/// Split a hierarchical address into `(type, name)`, dropping module path
/// segments and the `data.` prefix. Bracketed instance keys stay attached to
/// the name.
pub fn address_parts(address: &str) -> Option<(String, String)> {
    let segments = split_address(address);
    let mut idx = 0;
    while idx + 1 < segments.len() && base_segment(&segments[idx]) == "module" {
        idx += 2;
    }
    if segments.get(idx).map(String::as_str) == Some("data") {
        idx += 1;
    }
    let kind = segments.get(idx)?;
    let name = segments[idx + 1..].join(".");
    if kind.is_empty() || name.is_empty() {
        return None;
    }
    Some((kind.clone(), name))
}

fn split_address(address: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_quotes = false;
    for ch in address.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '[' if !in_quotes => depth += 1,
            ']' if !in_quotes => depth = depth.saturating_sub(1),
            '.' if depth == 0 && !in_quotes => {
                segments.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    segments.push(current);
    segments
}

fn base_segment(segment: &str) -> &str {
    segment.split('[').next().unwrap_or(segment)
}

fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// `1 - distance / max_len` over normalized names, in `[0, 1]`.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_name(a);
    let b = normalize_name(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let max_len = a.len().max(b.len());
    1.0 - levenshtein(&a, &b) as f64 / max_len as f64
}

/// Similar when one normalized name contains the other, or when the
/// similarity reaches [`PARTIAL_MATCH_THRESHOLD`].
pub fn names_similar(a: &str, b: &str) -> bool {
    let na = normalize_name(a);
    let nb = normalize_name(b);
    if na.is_empty() || nb.is_empty() {
        return false;
    }
    let shorter = na.len().min(nb.len());
    if shorter >= MIN_CONTAINED_NAME_LEN && (na.contains(&nb) || nb.contains(&na)) {
        return true;
    }
    name_similarity(a, b) >= PARTIAL_MATCH_THRESHOLD
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUCKET: &str = "aws:s3/bucket:Bucket";

    fn candidate(kind: &str, name: &str) -> CandidateImportRecord {
        CandidateImportRecord {
            kind: kind.to_string(),
            name: name.to_string(),
            target_identifier: None,
            inferred_address: None,
        }
    }

    fn ctx() -> MatchContext {
        MatchContext::new("shop", "dev")
    }

    #[test]
    fn derivation_is_deterministic() {
        let first = derive_expected_identifier("shop", "dev", BUCKET, "logs");
        assert_eq!(first, "urn:pulumi:dev::shop::aws:s3/bucket:Bucket::logs");
        assert_eq!(first, derive_expected_identifier("shop", "dev", BUCKET, "logs"));
    }

    #[test]
    fn parse_identifier_handles_parent_types() {
        let parts = parse_identifier(
            "urn:pulumi:dev::shop::my:index:Component$aws:s3/bucket:Bucket::logs",
        )
        .expect("identifier should parse");
        assert_eq!(parts.group, "dev");
        assert_eq!(parts.project, "shop");
        assert_eq!(parts.kind, BUCKET);
        assert_eq!(parts.name, "logs");
        assert!(parse_identifier("urn:pulumi:dev::shop").is_none());
        assert!(parse_identifier("logs").is_none());
    }

    #[test]
    fn derived_identifier_matches_entry() {
        let entry = MappingEntry::tracked(
            "aws_s3_bucket.logs",
            "urn:pulumi:dev::shop::aws:s3/bucket:Bucket::logs",
        );
        assert!(is_match(&ctx(), &entry, &candidate(BUCKET, "logs")));
        assert!(!is_match(&ctx(), &entry, &candidate(BUCKET, "log")));
        assert!(!is_match(
            &MatchContext::new("shop", "prod"),
            &entry,
            &candidate(BUCKET, "logs")
        ));
    }

    #[test]
    fn explicit_identifier_matches_entry() {
        let entry = MappingEntry::tracked(
            "aws_s3_bucket.logs",
            "urn:pulumi:dev::shop::my:index:Component$aws:s3/bucket:Bucket::logs",
        );
        let mut record = candidate(BUCKET, "logs");
        assert!(!is_match(&ctx(), &entry, &record));
        record.target_identifier = entry.target_identifier.clone();
        assert!(is_match(&ctx(), &entry, &record));
    }

    #[test]
    fn entry_without_identifier_never_matches() {
        let entry = MappingEntry {
            source_address: Some("aws_s3_bucket.logs".to_string()),
            ..MappingEntry::default()
        };
        assert!(!is_match(&ctx(), &entry, &candidate(BUCKET, "logs")));
        assert!(!is_partial_match(&entry, &candidate(BUCKET, "logs")));
    }

    #[test]
    fn partial_match_requires_same_kind_and_similar_name() {
        let entry = MappingEntry::tracked(
            "aws_s3_bucket.logs",
            "urn:pulumi:dev::shop::aws:s3/bucket:Bucket::access_logs",
        );
        assert!(is_partial_match(&entry, &candidate(BUCKET, "access-logs-2")));
        assert!(is_partial_match(&entry, &candidate(BUCKET, "logs")));
        assert!(!is_partial_match(&entry, &candidate("aws:ec2/vpc:Vpc", "access_logs")));
        assert!(!is_partial_match(&entry, &candidate(BUCKET, "assets")));
    }

    #[test]
    fn similarity_metric_thresholds() {
        assert_eq!(name_similarity("Logs", "logs"), 1.0);
        assert!(names_similar("artifacts", "artefacts"));
        assert!(!names_similar("ab", "abc"));
        assert!(!names_similar("main", "edge"));
    }

    #[test]
    fn suggestions_rank_best_first_and_skip_exact() {
        let entry = MappingEntry::tracked(
            "aws_s3_bucket.logs",
            "urn:pulumi:dev::shop::aws:s3/bucket:Bucket::logs",
        );
        let candidates = vec![
            candidate(BUCKET, "logs"),
            candidate(BUCKET, "app-logs"),
            candidate(BUCKET, "logz"),
            candidate("aws:ec2/vpc:Vpc", "logs"),
        ];
        let ranked = rank_suggestions(&ctx(), &entry, &candidates);
        let names: Vec<&str> = ranked.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["logz", "app-logs"]);
        assert_eq!(
            ranked[0].identifier,
            "urn:pulumi:dev::shop::aws:s3/bucket:Bucket::logz"
        );
    }

    #[test]
    fn address_parts_strip_modules_and_data_prefix() {
        assert_eq!(
            address_parts("module.net.module.subnets[\"a.b\"].aws_subnet.private[0]"),
            Some(("aws_subnet".to_string(), "private[0]".to_string()))
        );
        assert_eq!(
            address_parts("data.aws_ami.ubuntu"),
            Some(("aws_ami".to_string(), "ubuntu".to_string()))
        );
        assert_eq!(address_parts("aws_vpc"), None);
    }

    #[test]
    fn similar_addresses_find_renames() {
        let pool = [
            "aws_s3_bucket.log",
            "aws_s3_bucket.assets",
            "aws_iam_role.logs",
            "module.old.aws_s3_bucket.logs",
        ];
        let found = similar_addresses("aws_s3_bucket.logs", pool);
        assert_eq!(
            found,
            vec![
                "module.old.aws_s3_bucket.logs".to_string(),
                "aws_s3_bucket.log".to_string()
            ]
        );
    }
}
