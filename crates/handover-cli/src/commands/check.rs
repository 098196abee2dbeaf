use crate::support::{
    LedgerContext, digest_or_exit, fail, load_ledger_or_exit, print_json_or_exit,
    render_check_report,
};
use handover_reconcile::check;
use serde_json::json;

pub fn run(ctx: &LedgerContext, json_output: bool) {
    let ledger = load_ledger_or_exit(ctx);
    let reader = ctx.inventory_reader(&ledger);
    let result = check(&ledger, &ctx.base_dir, reader.as_ref()).unwrap_or_else(|e| fail(e));
    let digest = digest_or_exit(&ledger);

    if json_output {
        let categories: Vec<&str> = result.categories().iter().map(|c| c.as_str()).collect();
        print_json_or_exit(&json!({
            "action": "check",
            "ledgerPath": ctx.ledger_path.display().to_string(),
            "result": if result.accepted() { "accepted" } else { "rejected" },
            "errorCount": result.error_count(),
            "categories": categories,
            "errors": result.errors,
            "ledgerDigest": digest,
        }));
    } else {
        print!("{}", render_check_report(&ledger, &result));
        println!("  Ledger digest: {digest}");
    }

    if !result.accepted() {
        std::process::exit(1);
    }
}
