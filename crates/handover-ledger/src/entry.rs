//! Mapping entries: one address/identifier association inside a group.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::LedgerError;

/// Why an entry is excluded from active reconciliation.
///
/// `Unset` is the active state and is never written to disk; the other
/// variants serialize as their literal ledger tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Disposition {
    #[default]
    #[serde(skip)]
    Unset,
    Skip,
    IgnoreNoState,
    IgnoreNeedsUpdate,
    IgnoreNeedsReplace,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::Skip => "skip",
            Self::IgnoreNoState => "ignore-no-state",
            Self::IgnoreNeedsUpdate => "ignore-needs-update",
            Self::IgnoreNeedsReplace => "ignore-needs-replace",
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Disposition {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "skip" => Ok(Self::Skip),
            "ignore-no-state" => Ok(Self::IgnoreNoState),
            "ignore-needs-update" => Ok(Self::IgnoreNeedsUpdate),
            "ignore-needs-replace" => Ok(Self::IgnoreNeedsReplace),
            other => Err(LedgerError::validation(
                "disposition",
                format!(
                    "unknown disposition `{other}` (expected skip, ignore-no-state, ignore-needs-update or ignore-needs-replace)"
                ),
            )),
        }
    }
}

/// One ledger row. A value type: callers replace rows by index rather than
/// holding references into the group.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MappingEntry {
    #[serde(
        rename = "address",
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_address: Option<String>,

    #[serde(
        rename = "identifier",
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub target_identifier: Option<String>,

    #[serde(default, skip_serializing_if = "Disposition::is_unset")]
    pub disposition: Disposition,
}

impl MappingEntry {
    /// Active entry binding `address` to `identifier`.
    pub fn tracked(address: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            source_address: Some(address.into()),
            target_identifier: Some(identifier.into()),
            disposition: Disposition::Unset,
        }
    }

    /// Entry recording `address` with a non-active disposition and no identifier.
    pub fn excluded(address: impl Into<String>, disposition: Disposition) -> Self {
        Self {
            source_address: Some(address.into()),
            target_identifier: None,
            disposition,
        }
    }

    pub fn address(&self) -> Option<&str> {
        self.source_address.as_deref().filter(|a| !a.is_empty())
    }

    pub fn identifier(&self) -> Option<&str> {
        self.target_identifier.as_deref().filter(|i| !i.is_empty())
    }

    pub fn is_active(&self) -> bool {
        self.disposition.is_unset()
    }

    pub fn has_address(&self, address: &str) -> bool {
        self.address() == Some(address)
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|value| !value.is_empty()))
}

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^urn:[A-Za-z0-9_-]+:[^\s:]+::[^\s:]+::[^\s]+::[^\s]+$")
            .expect("identifier regex must compile")
    })
}

/// Reject identifiers that cannot be a target-system URN.
pub fn validate_identifier(identifier: &str) -> Result<(), LedgerError> {
    if identifier_re().is_match(identifier) {
        Ok(())
    } else {
        Err(LedgerError::validation(
            "identifier",
            format!(
                "`{identifier}` is not of the form urn:<ns>:<group>::<project>::<type>::<name>"
            ),
        ))
    }
}

/// Reject empty addresses or addresses containing whitespace.
pub fn validate_address(address: &str) -> Result<(), LedgerError> {
    if address.is_empty() {
        return Err(LedgerError::validation("address", "address must not be empty"));
    }
    if address.chars().any(char::is_whitespace) {
        return Err(LedgerError::validation(
            "address",
            format!("`{address}` must not contain whitespace"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_disposition_is_omitted_on_write() {
        let entry = MappingEntry::tracked(
            "aws_s3_bucket.logs",
            "urn:pulumi:dev::shop::aws:s3/bucket:Bucket::logs",
        );
        let json = serde_json::to_string(&entry).expect("entry should serialize");
        assert!(!json.contains("disposition"));
    }

    #[test]
    fn disposition_tokens_parse_from_ledger_json() {
        let entry: MappingEntry =
            serde_json::from_str(r#"{"address":"a.b","disposition":"ignore-needs-replace"}"#)
                .expect("entry should parse");
        assert_eq!(entry.disposition, Disposition::IgnoreNeedsReplace);
        assert_eq!(entry.identifier(), None);
    }

    #[test]
    fn literal_unset_token_is_rejected() {
        let result =
            serde_json::from_str::<MappingEntry>(r#"{"address":"a.b","disposition":"unset"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn empty_strings_load_as_absent() {
        let entry: MappingEntry = serde_json::from_str(r#"{"address":"","identifier":""}"#)
            .expect("entry should parse");
        assert_eq!(entry.source_address, None);
        assert_eq!(entry.target_identifier, None);
    }

    #[test]
    fn identifier_validation_requires_urn_shape() {
        assert!(validate_identifier("urn:pulumi:dev::shop::aws:s3/bucket:Bucket::logs").is_ok());
        assert!(validate_identifier("urn:pulumi:dev::shop::aws:s3/bucket:Bucket").is_err());
        assert!(validate_identifier("logs").is_err());
    }

    #[test]
    fn disposition_from_str_rejects_unset() {
        assert!("unset".parse::<Disposition>().is_err());
        assert_eq!("skip".parse::<Disposition>().ok(), Some(Disposition::Skip));
    }

    #[test]
    fn address_validation_rejects_whitespace() {
        assert!(validate_address("module.net.aws_vpc.main").is_ok());
        assert!(validate_address("").is_err());
        assert!(validate_address("aws_vpc. main").is_err());
    }
}
