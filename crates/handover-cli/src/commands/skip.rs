use crate::support::{LedgerContext, MutationSummary, report_mutation, run_guarded_mutation_or_exit};
use handover_ledger::{Disposition, MutationIntent};

pub fn run(
    ctx: &LedgerContext,
    group: String,
    address: String,
    disposition: Disposition,
    force: bool,
    json_output: bool,
) {
    let intent = MutationIntent::new("skip", &group);
    let (checked, digest) = run_guarded_mutation_or_exit(ctx, intent, force, |ledger| {
        Ok(ledger.group_mut(&group)?.skip_entry(&address, disposition)?)
    });

    report_mutation(
        ctx,
        MutationSummary {
            action: "skip",
            group: &group,
            address: &address,
            details: vec![
                ("disposition", disposition.to_string()),
                ("entriesTouched", checked.value.to_string()),
            ],
        },
        &checked,
        &digest,
        json_output,
    );
}
