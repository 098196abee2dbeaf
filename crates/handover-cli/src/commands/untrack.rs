use crate::support::{LedgerContext, MutationSummary, report_mutation, run_guarded_mutation_or_exit};
use handover_ledger::{LedgerError, MutationIntent};

pub fn run(ctx: &LedgerContext, group: String, address: String, force: bool, json_output: bool) {
    let intent = MutationIntent::new("untrack", &group);
    let (checked, digest) = run_guarded_mutation_or_exit(ctx, intent, force, |ledger| {
        let removed = ledger.group_mut(&group)?.remove_entries(&address);
        if removed == 0 {
            return Err(LedgerError::EntryNotFound {
                group: group.clone(),
                address: address.clone(),
            }
            .into());
        }
        Ok(removed)
    });

    report_mutation(
        ctx,
        MutationSummary {
            action: "untrack",
            group: &group,
            address: &address,
            details: vec![("entriesRemoved", checked.value.to_string())],
        },
        &checked,
        &digest,
        json_output,
    );
}
