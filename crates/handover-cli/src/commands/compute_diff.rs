use crate::cli::PreviewSourceArgs;
use crate::support::{
    LedgerContext, digest_or_exit, fail, group_inventory_or_exit, group_or_exit,
    load_ledger_or_exit, print_json_or_exit,
};
use handover_ledger::MigrationGroup;
use handover_reconcile::{ResourceStatus, StatusReport, reconcile};
use serde_json::{Value, json};

const LABEL_ORDER: [&str; 6] = [
    "translated/migrated",
    "translated/needs-update",
    "translated/needs-replace",
    "translated/no-state",
    "skipped",
    "not-tracked",
];

fn status_payload(address: &str, status: &ResourceStatus) -> Value {
    let mut value = serde_json::to_value(status).unwrap_or_else(|_| json!({}));
    if let Some(object) = value.as_object_mut() {
        object.insert("address".to_string(), Value::String(address.to_string()));
        object.insert("label".to_string(), Value::String(status.label()));
    }
    value
}

fn print_group_report(group: &MigrationGroup, report: &StatusReport) {
    let counts = report.counts();
    println!(
        "  Group {}: {} resources, {} translated, progress {:.1}%",
        group.name,
        counts.total(),
        counts.translated(),
        report.progress() * 100.0
    );
    for label in LABEL_ORDER {
        let addresses = report.addresses_labelled(label);
        if addresses.is_empty() {
            continue;
        }
        println!("    {label} ({}): {}", addresses.len(), addresses.join(", "));
    }
}

pub fn run(
    ctx: &LedgerContext,
    group: Option<String>,
    preview: PreviewSourceArgs,
    json_output: bool,
) {
    let ledger = load_ledger_or_exit(ctx);
    let reader = ctx.inventory_reader(&ledger);
    let runner = ctx.preview_runner(&ledger, &preview);

    let groups: Vec<&MigrationGroup> = match &group {
        Some(name) => vec![group_or_exit(&ledger, name)],
        None => ledger.groups.iter().collect(),
    };

    let mut reports = Vec::with_capacity(groups.len());
    for group in groups {
        let inventory = group_inventory_or_exit(ctx, reader.as_ref(), group);
        let preview = runner.preview(&group.name, None).unwrap_or_else(|e| {
            fail(format!("group `{}`: preview failed: {e}", group.name))
        });
        reports.push((group, reconcile(&inventory, group, &preview)));
    }
    let digest = digest_or_exit(&ledger);

    if json_output {
        let groups: Vec<Value> = reports
            .iter()
            .map(|(group, report)| {
                json!({
                    "group": group.name,
                    "counts": report.counts(),
                    "progress": report.progress(),
                    "resources": report
                        .resources
                        .iter()
                        .map(|(address, status)| status_payload(address, status))
                        .collect::<Vec<_>>(),
                })
            })
            .collect();
        print_json_or_exit(&json!({
            "action": "compute-diff",
            "ledgerPath": ctx.ledger_path.display().to_string(),
            "groups": groups,
            "ledgerDigest": digest,
        }));
        return;
    }

    println!("handover compute-diff");
    for (group, report) in &reports {
        print_group_report(group, report);
    }
    println!("  Ledger digest: {digest}");
}
