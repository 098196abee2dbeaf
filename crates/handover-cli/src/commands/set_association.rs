use crate::support::{
    LedgerContext, MutationSummary, fail, report_mutation, run_guarded_mutation_or_exit,
};
use handover_ledger::{MigrationLedger, MutationIntent, UpsertOutcome};
use handover_reconcile::{
    CachedTypeMapper, CatalogTypeMapper, GuardError, MatchContext, TypeMapper,
    derive_identifier_for_address,
};
use std::path::Path;

pub struct Args {
    pub group: String,
    pub address: String,
    /// `None` means derive it from the live resource.
    pub identifier: Option<String>,
    pub catalog: Option<String>,
    pub force: bool,
    pub json: bool,
}

enum IdentifierSource {
    Given(String),
    Derived(CachedTypeMapper<CatalogTypeMapper>),
}

pub fn run(ctx: &LedgerContext, args: Args) {
    let source = match &args.identifier {
        Some(identifier) => IdentifierSource::Given(identifier.clone()),
        None => IdentifierSource::Derived(load_catalog_or_exit(args.catalog.as_deref())),
    };

    let intent = MutationIntent::new("set-association", &args.group);
    let (checked, digest) = run_guarded_mutation_or_exit(ctx, intent, args.force, |ledger| {
        let identifier = match &source {
            IdentifierSource::Given(identifier) => identifier.clone(),
            IdentifierSource::Derived(mapper) => derive_for_address(ctx, ledger, mapper, &args)?,
        };
        let outcome = ledger
            .group_mut(&args.group)?
            .upsert_entry(&args.address, &identifier)?;
        Ok((identifier, outcome))
    });

    let (identifier, outcome) = &checked.value;
    let mut details = vec![("identifier", identifier.clone())];
    if matches!(source, IdentifierSource::Derived(_)) {
        details.push(("derived", "true".to_string()));
    }
    match outcome {
        UpsertOutcome::Appended { .. } => details.push(("entry", "appended".to_string())),
        UpsertOutcome::Updated { cleared_skip, .. } => {
            details.push(("entry", "updated".to_string()));
            if *cleared_skip {
                details.push(("clearedDisposition", "skip".to_string()));
            }
        }
    }

    report_mutation(
        ctx,
        MutationSummary {
            action: "set-association",
            group: &args.group,
            address: &args.address,
            details,
        },
        &checked,
        &digest,
        args.json,
    );
}

fn load_catalog_or_exit(catalog: Option<&str>) -> CachedTypeMapper<CatalogTypeMapper> {
    let catalog = catalog.unwrap_or_else(|| fail("--derive requires --catalog"));
    CachedTypeMapper::new(CatalogTypeMapper::load(Path::new(catalog)).unwrap_or_else(|e| fail(e)))
}

/// Runs against the locked ledger, so the project name and state location
/// are the ones the mutation is checked against.
fn derive_for_address(
    ctx: &LedgerContext,
    ledger: &MigrationLedger,
    mapper: &dyn TypeMapper,
    args: &Args,
) -> Result<String, GuardError> {
    let group = ledger.group(&args.group)?;
    let reader = ctx.inventory_reader(ledger);
    let inventory = ctx.group_inventory(reader.as_ref(), group)?;
    let match_ctx = MatchContext::for_ledger(ledger, &args.group)?;
    Ok(derive_identifier_for_address(
        mapper,
        &match_ctx,
        &inventory,
        &args.address,
    )?)
}
