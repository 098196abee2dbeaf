use crate::cli::PreviewSourceArgs;
use handover_ledger::{MigrationGroup, MigrationLedger, MutationIntent, load, mutate_ledger};
use handover_reconcile::{
    CheckFinding, CheckResult, CheckedMutation, CommandInventory, CommandPreview, GuardError,
    GuardOutcome, InventoryError, InventoryReader, JsonFileInventory, JsonFilePreview,
    MatchContext, PreviewRunner, ResourceDescriptor, apply_checked, read_inventory,
};
use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};

/// Ledger location plus how to reach the live systems around it.
#[derive(Debug, Clone)]
pub struct LedgerContext {
    pub ledger_path: PathBuf,
    /// Relative paths inside the ledger resolve against this directory.
    pub base_dir: PathBuf,
    source_binary: Option<String>,
}

impl LedgerContext {
    pub fn new(ledger: &str, source_binary: Option<String>) -> Self {
        let ledger_path = PathBuf::from(ledger);
        let base_dir = ledger_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            ledger_path,
            base_dir,
            source_binary,
        }
    }

    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.base_dir.join(relative)
    }

    fn project_dir(&self, location: &str) -> PathBuf {
        if location.is_empty() {
            self.base_dir.clone()
        } else {
            self.resolve(location)
        }
    }

    /// Live inventory of one group; a group without a state location has none.
    pub fn group_inventory(
        &self,
        reader: &dyn InventoryReader,
        group: &MigrationGroup,
    ) -> Result<Vec<ResourceDescriptor>, InventoryError> {
        match group.state_location.as_deref() {
            Some(location) => read_inventory(reader, &self.resolve(location)),
            None => Ok(Vec::new()),
        }
    }

    pub fn inventory_reader(&self, ledger: &MigrationLedger) -> Box<dyn InventoryReader> {
        match &self.source_binary {
            Some(binary) => Box::new(
                CommandInventory::new(binary.as_str())
                    .with_working_dir(self.project_dir(&ledger.projects.source)),
            ),
            None => Box::new(JsonFileInventory),
        }
    }

    pub fn preview_runner(
        &self,
        ledger: &MigrationLedger,
        args: &PreviewSourceArgs,
    ) -> Box<dyn PreviewRunner> {
        match &args.target_binary {
            Some(binary) => {
                let program_dir = self.project_dir(&ledger.projects.target);
                let stub_path = program_dir.join(&args.stub);
                Box::new(CommandPreview::new(binary.as_str(), program_dir, stub_path))
            }
            None => Box::new(JsonFilePreview::new(
                args.preview.as_deref().map(PathBuf::from),
                args.candidates.as_deref().map(PathBuf::from),
            )),
        }
    }
}

pub fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("error: {message}");
    std::process::exit(1);
}

pub fn load_ledger_or_exit(ctx: &LedgerContext) -> MigrationLedger {
    load(&ctx.ledger_path).unwrap_or_else(|e| fail(format!("failed to load ledger: {e}")))
}

pub fn group_or_exit<'a>(ledger: &'a MigrationLedger, name: &str) -> &'a MigrationGroup {
    ledger.group(name).unwrap_or_else(|e| fail(e))
}

pub fn match_context_or_exit(ledger: &MigrationLedger, group: &str) -> MatchContext {
    MatchContext::for_ledger(ledger, group).unwrap_or_else(|e| fail(e))
}

pub fn digest_or_exit(ledger: &MigrationLedger) -> String {
    ledger
        .digest()
        .unwrap_or_else(|e| fail(format!("failed to digest ledger: {e}")))
}

pub fn group_inventory_or_exit(
    ctx: &LedgerContext,
    reader: &dyn InventoryReader,
    group: &MigrationGroup,
) -> Vec<ResourceDescriptor> {
    ctx.group_inventory(reader, group).unwrap_or_else(|e| {
        fail(format!(
            "group `{}`: failed to read live inventory: {e}",
            group.name
        ))
    })
}

pub fn print_json_or_exit(payload: &Value) {
    let rendered = serde_json::to_string_pretty(payload)
        .unwrap_or_else(|e| fail(format!("failed to render JSON payload: {e}")));
    println!("{rendered}");
}

/// Human-readable check report: findings grouped by category, one example
/// remediation per category.
pub fn render_check_report(ledger: &MigrationLedger, result: &CheckResult) -> String {
    let mut out = format!(
        "[check] {} (groups={}, entries={}, errors={})\n",
        if result.accepted() { "OK" } else { "FAIL" },
        ledger.groups.len(),
        ledger.entry_count(),
        result.error_count()
    );
    for (category, findings) in result.by_category() {
        out.push_str(&format!("  {category} ({})\n", findings.len()));
        for finding in &findings {
            out.push_str(&format!("    - {}: {}\n", finding.group, finding.message));
        }
        let example = findings
            .iter()
            .find_map(|finding| finding.suggestion.as_deref())
            .and_then(|suggestion| suggestion.lines().next())
            .unwrap_or(category.example_remediation());
        out.push_str(&format!("    fix, e.g.: {example}\n"));
    }
    out
}

pub fn findings_payload(findings: &[&CheckFinding]) -> Value {
    serde_json::to_value(findings).unwrap_or(Value::Null)
}

/// Load, mutate under the integrity guard, and persist unless rejected, all
/// while holding the ledger lock. Any lookups the mutation depends on belong
/// inside `mutate`.
pub fn run_guarded_mutation_or_exit<T, F>(
    ctx: &LedgerContext,
    intent: MutationIntent<'_>,
    force: bool,
    mutate: F,
) -> (CheckedMutation<T>, String)
where
    F: FnOnce(&mut MigrationLedger) -> Result<T, GuardError>,
{
    mutate_ledger(&ctx.ledger_path, &intent, |ledger| {
        let reader = ctx.inventory_reader(ledger);
        let checked = apply_checked(ledger, &ctx.base_dir, reader.as_ref(), force, mutate)?;
        let digest = ledger.digest()?;
        let persist = checked.persisted();
        Ok::<_, GuardError>(((checked, digest), persist))
    })
    .unwrap_or_else(|e| fail(e))
}

pub struct MutationSummary<'a> {
    pub action: &'static str,
    pub group: &'a str,
    pub address: &'a str,
    /// Extra `(key, value)` pairs for the report.
    pub details: Vec<(&'static str, String)>,
}

fn outcome_name(outcome: GuardOutcome) -> &'static str {
    match outcome {
        GuardOutcome::Applied => "applied",
        GuardOutcome::Forced => "forced",
        GuardOutcome::Rejected => "rejected",
    }
}

/// Print the outcome of a guarded mutation; exits 1 when it was rejected.
pub fn report_mutation<T>(
    ctx: &LedgerContext,
    summary: MutationSummary<'_>,
    checked: &CheckedMutation<T>,
    digest: &str,
    json_output: bool,
) {
    let introduced = checked.introduced_findings();
    let introduced_errors = checked.error_delta().max(0);

    if json_output {
        let mut details = Map::new();
        for (key, value) in &summary.details {
            details.insert((*key).to_string(), Value::String(value.clone()));
        }
        print_json_or_exit(&json!({
            "action": summary.action,
            "ledgerPath": ctx.ledger_path.display().to_string(),
            "group": summary.group,
            "address": summary.address,
            "details": details,
            "outcome": outcome_name(checked.outcome),
            "errorsBefore": checked.before.error_count(),
            "errorsAfter": checked.after.error_count(),
            "introducedErrors": introduced_errors,
            "introduced": findings_payload(&introduced),
            "ledgerDigest": digest,
        }));
        if !checked.persisted() {
            std::process::exit(1);
        }
        return;
    }

    if !checked.persisted() {
        eprintln!(
            "error: {} would introduce {introduced_errors} integrity error(s); rerun with --force to persist anyway",
            summary.action
        );
        for finding in &introduced {
            eprintln!("  - {} {}: {}", finding.category, finding.group, finding.message);
        }
        std::process::exit(1);
    }

    println!("handover {}", summary.action);
    println!("  Group: {}", summary.group);
    println!("  Address: {}", summary.address);
    for (key, value) in &summary.details {
        println!("  {key}: {value}");
    }
    println!(
        "  Integrity errors: {} -> {} ({})",
        checked.before.error_count(),
        checked.after.error_count(),
        outcome_name(checked.outcome)
    );
    if checked.outcome == GuardOutcome::Forced {
        println!("  Introduced errors: {introduced_errors}");
        for finding in &introduced {
            println!("    - {} {}: {}", finding.category, finding.group, finding.message);
        }
    }
    println!("  Ledger digest: {digest}");
    println!("  Path: {}", ctx.ledger_path.display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use handover_ledger::{MappingEntry, MigrationGroup};
    use handover_reconcile::{FindingCategory, check_unique_mappings};

    #[test]
    fn ledger_relative_paths_resolve_against_ledger_dir() {
        let ctx = LedgerContext::new("migration/handover.json", None);
        assert_eq!(ctx.base_dir, PathBuf::from("migration"));
        assert_eq!(
            ctx.resolve("dev.tfstate.json"),
            PathBuf::from("migration/dev.tfstate.json")
        );
        assert_eq!(
            LedgerContext::new("handover.json", None).base_dir,
            PathBuf::from(".")
        );
    }

    const URN_A: &str = "urn:pulumi:dev::shop::aws:s3/bucket:Bucket::a";

    #[test]
    fn check_report_groups_by_category() {
        let mut group = MigrationGroup::new("dev");
        group.entries = vec![
            MappingEntry::tracked("aws_s3_bucket.a", URN_A),
            MappingEntry::tracked("aws_s3_bucket.b", URN_A),
        ];
        let ledger = MigrationLedger {
            groups: vec![group],
            ..MigrationLedger::default()
        };
        let result = CheckResult {
            errors: check_unique_mappings(&ledger),
        };
        assert_eq!(result.categories(), vec![FindingCategory::DuplicateIdentifier]);

        insta::assert_snapshot!(render_check_report(&ledger, &result).trim_end(), @r"
        [check] FAIL (groups=1, entries=2, errors=1)
          duplicate-identifier (1)
            - dev: identifier `urn:pulumi:dev::shop::aws:s3/bucket:Bucket::a` is claimed by 2 addresses: aws_s3_bucket.a, aws_s3_bucket.b
            fix, e.g.: handover set-association --group dev --address aws_s3_bucket.b --identifier <identifier>
        ");
    }

    #[test]
    fn clean_check_report_is_one_line() {
        let ledger = MigrationLedger::default();
        insta::assert_snapshot!(
            render_check_report(&ledger, &CheckResult::default()).trim_end(),
            @"[check] OK (groups=0, entries=0, errors=0)"
        );
    }
}
