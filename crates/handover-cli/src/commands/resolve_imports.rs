use crate::cli::PreviewSourceArgs;
use crate::support::{
    LedgerContext, digest_or_exit, fail, group_inventory_or_exit, group_or_exit,
    load_ledger_or_exit, match_context_or_exit, print_json_or_exit,
};
use handover_reconcile::{resolve_imports, write_import_file};
use serde_json::json;
use std::collections::BTreeSet;
use std::path::PathBuf;

pub fn run(
    ctx: &LedgerContext,
    group: String,
    preview: PreviewSourceArgs,
    out: Option<String>,
    json_output: bool,
) {
    let ledger = load_ledger_or_exit(ctx);
    let migration_group = group_or_exit(&ledger, &group);
    let match_ctx = match_context_or_exit(&ledger, &group);

    let reader = ctx.inventory_reader(&ledger);
    let inventory = group_inventory_or_exit(ctx, reader.as_ref(), migration_group);

    let runner = ctx.preview_runner(&ledger, &preview);
    let preview_map = runner
        .preview(&group, None)
        .unwrap_or_else(|e| fail(format!("group `{group}`: preview failed: {e}")));
    let candidates = runner
        .import_candidates(&group)
        .unwrap_or_else(|e| fail(format!("group `{group}`: import candidates unavailable: {e}")));
    let live: BTreeSet<&str> = preview_map.live_identifiers().collect();

    let resolution = resolve_imports(&match_ctx, migration_group, &candidates, &live, &inventory);

    let import_file = out.map(PathBuf::from);
    if let Some(path) = &import_file {
        write_import_file(&resolution.directives, path)
            .unwrap_or_else(|e| fail(format!("failed to write import file: {e}")));
    }
    let digest = digest_or_exit(&ledger);

    if json_output {
        print_json_or_exit(&json!({
            "action": "resolve-imports",
            "ledgerPath": ctx.ledger_path.display().to_string(),
            "group": group,
            "candidateCount": candidates.len(),
            "directives": resolution.directives,
            "unresolved": resolution.unresolved,
            "unresolvedCount": resolution.unresolved_count,
            "importFile": import_file.as_ref().map(|p| p.display().to_string()),
            "ledgerDigest": digest,
        }));
        return;
    }

    println!("handover resolve-imports");
    println!("  Group: {group}");
    println!("  Candidates: {}", candidates.len());
    println!("  Directives: {}", resolution.directives.len());
    for directive in &resolution.directives {
        println!(
            "    - {} -> {} (id: {})",
            directive.address,
            directive.identifier,
            directive.import_id.as_deref().unwrap_or("unknown")
        );
    }
    println!("  Unresolved: {}", resolution.unresolved_count);
    for entry in &resolution.unresolved {
        println!("    - {}", entry.address);
        for suggestion in &entry.suggestions {
            println!(
                "        did you mean {} ({:.2})",
                suggestion.identifier, suggestion.score
            );
        }
    }
    if let Some(path) = &import_file {
        println!("  Import file: {}", path.display());
    }
    println!("  Ledger digest: {digest}");
}
