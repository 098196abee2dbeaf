//! Integrity-guarded ledger mutation.
//!
//! A mutation is applied to a copy of the ledger and checked before and
//! after. A copy whose error count grows is discarded unless forced.

use crate::integrity::{CheckError, CheckFinding, CheckResult, check};
use crate::inventory::{InventoryError, InventoryReader};
use crate::type_mapping::TypeMappingError;
use handover_ledger::{LedgerError, MigrationLedger};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Error count did not grow; the mutation was applied.
    Applied,
    /// Error count grew, applied anyway.
    Forced,
    /// Error count grew; the ledger is unchanged.
    Rejected,
}

#[derive(Debug)]
pub struct CheckedMutation<T> {
    pub value: T,
    pub before: CheckResult,
    pub after: CheckResult,
    pub outcome: GuardOutcome,
}

impl<T> CheckedMutation<T> {
    pub fn persisted(&self) -> bool {
        self.outcome != GuardOutcome::Rejected
    }

    /// Signed change in error count.
    pub fn error_delta(&self) -> i64 {
        self.after.error_count() as i64 - self.before.error_count() as i64
    }

    /// Findings present after the mutation that were not present before.
    pub fn introduced_findings(&self) -> Vec<&CheckFinding> {
        self.after
            .errors
            .iter()
            .filter(|finding| !self.before.errors.contains(finding))
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Check(#[from] CheckError),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    TypeMapping(#[from] TypeMappingError),
}

/// Apply `mutate` to `ledger` under the before/after integrity policy.
///
/// `mutate` sees the ledger as it was checked, so reads it makes (entry
/// lookups, derivations) are consistent with the guard. On `Rejected`, or
/// when `mutate` fails, `ledger` is left exactly as it was.
pub fn apply_checked<T, E, F>(
    ledger: &mut MigrationLedger,
    base_dir: &Path,
    reader: &dyn InventoryReader,
    force: bool,
    mutate: F,
) -> Result<CheckedMutation<T>, GuardError>
where
    F: FnOnce(&mut MigrationLedger) -> Result<T, E>,
    GuardError: From<E>,
{
    let before = check(ledger, base_dir, reader)?;
    let mut candidate = ledger.clone();
    let value = mutate(&mut candidate).map_err(GuardError::from)?;
    let after = check(&candidate, base_dir, reader)?;

    let outcome = if after.error_count() <= before.error_count() {
        GuardOutcome::Applied
    } else if force {
        tracing::warn!(
            before = before.error_count(),
            after = after.error_count(),
            "forcing mutation that introduces integrity errors"
        );
        GuardOutcome::Forced
    } else {
        GuardOutcome::Rejected
    };

    if outcome != GuardOutcome::Rejected {
        *ledger = candidate;
    }
    Ok(CheckedMutation {
        value,
        before,
        after,
        outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::FindingCategory;
    use crate::inventory::{InventoryError, Snapshot};
    use handover_ledger::{MappingEntry, MigrationGroup};

    struct NoInventory;

    impl InventoryReader for NoInventory {
        fn read(&self, _location: &Path) -> Result<Option<Snapshot>, InventoryError> {
            Ok(None)
        }
    }

    const URN1: &str = "urn:pulumi:dev::shop::aws:s3/bucket:Bucket::a";
    const URN2: &str = "urn:pulumi:dev::shop::aws:s3/bucket:Bucket::b";

    fn ledger() -> MigrationLedger {
        let mut group = MigrationGroup::new("dev");
        group.entries = vec![
            MappingEntry::tracked("aws_s3_bucket.a", URN1),
            MappingEntry::tracked("aws_s3_bucket.b", URN2),
        ];
        MigrationLedger {
            groups: vec![group],
            ..MigrationLedger::default()
        }
    }

    fn associate_x(ledger: &mut MigrationLedger) -> Result<(), LedgerError> {
        ledger
            .group_mut("dev")?
            .upsert_entry("aws_s3_bucket.x", URN2)
            .map(|_| ())
    }

    #[test]
    fn duplicate_creating_mutation_is_rejected_without_force() {
        let mut ledger = ledger();
        let original = ledger.clone();
        let result = apply_checked(&mut ledger, Path::new("."), &NoInventory, false, associate_x)
            .expect("guard should run");
        assert_eq!(result.outcome, GuardOutcome::Rejected);
        assert!(!result.persisted());
        assert_eq!(result.error_delta(), 1);
        assert_eq!(ledger, original);
    }

    #[test]
    fn forced_mutation_is_applied_and_reports_introduced_errors() {
        let mut ledger = ledger();
        let result = apply_checked(&mut ledger, Path::new("."), &NoInventory, true, associate_x)
            .expect("guard should run");
        assert_eq!(result.outcome, GuardOutcome::Forced);
        assert_eq!(result.error_delta(), 1);
        let introduced = result.introduced_findings();
        assert_eq!(introduced.len(), 1);
        assert_eq!(introduced[0].category, FindingCategory::DuplicateIdentifier);
        assert!(
            ledger
                .group("dev")
                .expect("group")
                .find_entry("aws_s3_bucket.x")
                .is_some()
        );
    }

    #[test]
    fn clean_mutation_is_applied() {
        let mut ledger = ledger();
        let result = apply_checked(&mut ledger, Path::new("."), &NoInventory, false, |ledger| {
            Ok::<_, LedgerError>(ledger.group_mut("dev")?.remove_entries("aws_s3_bucket.b"))
        })
        .expect("guard should run");
        assert_eq!(result.outcome, GuardOutcome::Applied);
        assert_eq!(result.value, 1);
        assert_eq!(ledger.entry_count(), 1);
    }

    #[test]
    fn mutation_errors_propagate_and_leave_ledger_untouched() {
        let mut ledger = ledger();
        let original = ledger.clone();
        let err = apply_checked(&mut ledger, Path::new("."), &NoInventory, false, |ledger| {
            ledger.group_mut("prod").map(|_| ())
        })
        .expect_err("unknown group");
        assert!(matches!(err, GuardError::Ledger(LedgerError::GroupNotFound(_))));
        assert_eq!(ledger, original);
    }

    #[test]
    fn collaborator_errors_inside_the_mutation_propagate() {
        let mut ledger = ledger();
        let original = ledger.clone();
        let err = apply_checked(&mut ledger, Path::new("."), &NoInventory, true, |ledger| {
            ledger.group_mut("dev")?.remove_entries("aws_s3_bucket.a");
            Err::<(), _>(GuardError::TypeMapping(TypeMappingError::UnknownAddress {
                group: "dev".to_string(),
                address: "aws_s3_bucket.a".to_string(),
            }))
        })
        .expect_err("mutation failure must surface");
        assert!(matches!(err, GuardError::TypeMapping(_)));
        assert_eq!(ledger, original);
    }
}
