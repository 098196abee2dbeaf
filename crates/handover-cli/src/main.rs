//! Handover CLI: the `handover` command.

mod cli;
mod commands;
mod support;

use clap::Parser;
use cli::{Cli, Commands};
use support::LedgerContext;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "HANDOVER_LOG";

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let ctx = LedgerContext::new(&cli.ledger, cli.source_binary);

    match cli.command {
        Commands::Check { json } => commands::check::run(&ctx, json),

        Commands::SetAssociation {
            group,
            address,
            identifier,
            derive: _,
            catalog,
            force,
            json,
        } => commands::set_association::run(
            &ctx,
            commands::set_association::Args {
                group,
                address,
                identifier,
                catalog,
                force,
                json,
            },
        ),

        Commands::Skip {
            group,
            address,
            disposition,
            force,
            json,
        } => commands::skip::run(&ctx, group, address, disposition.into(), force, json),

        Commands::Untrack {
            group,
            address,
            force,
            json,
        } => commands::untrack::run(&ctx, group, address, force, json),

        Commands::ComputeDiff {
            group,
            preview,
            json,
        } => commands::compute_diff::run(&ctx, group, preview, json),

        Commands::ResolveImports {
            group,
            preview,
            out,
            json,
        } => commands::resolve_imports::run(&ctx, group, preview, out, json),
    }
}
