use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use handover_ledger::Disposition;

#[derive(Parser)]
#[command(
    name = "handover",
    about = "Handover: track and reconcile an incremental infrastructure migration",
    version
)]
pub struct Cli {
    /// Path to the migration ledger
    #[arg(long, global = true, default_value = "handover.json")]
    pub ledger: String,

    /// Render live state with this source-system binary instead of reading
    /// state locations as pre-rendered JSON
    #[arg(long, global = true)]
    pub source_binary: Option<String>,

    /// Increase log verbosity (-v info, -vv debug); HANDOVER_LOG overrides
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the integrity checker over every group
    Check {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Bind a source address to a target identifier
    SetAssociation {
        /// Migration group name
        #[arg(long)]
        group: String,

        /// Source resource address
        #[arg(long)]
        address: String,

        /// Target identifier (URN)
        #[arg(long, required_unless_present = "derive")]
        identifier: Option<String>,

        /// Derive the identifier from the live resource and a type catalog
        #[arg(long, conflicts_with = "identifier", requires = "catalog")]
        derive: bool,

        /// TOML type catalog used with --derive
        #[arg(long)]
        catalog: Option<String>,

        /// Persist even if the change introduces integrity errors
        #[arg(long)]
        force: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Exclude a source address from reconciliation
    Skip {
        /// Migration group name
        #[arg(long)]
        group: String,

        /// Source resource address
        #[arg(long)]
        address: String,

        /// Disposition to record
        #[arg(long, value_enum, default_value = "skip")]
        disposition: DispositionArg,

        /// Persist even if the change introduces integrity errors
        #[arg(long)]
        force: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove every ledger entry for a source address
    Untrack {
        /// Migration group name
        #[arg(long)]
        group: String,

        /// Source resource address
        #[arg(long)]
        address: String,

        /// Persist even if the change introduces integrity errors
        #[arg(long)]
        force: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report per-resource migration status
    ComputeDiff {
        /// Limit to one migration group
        #[arg(long)]
        group: Option<String>,

        #[command(flatten)]
        preview: PreviewSourceArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Bind unresolved entries to resources the target system discovered
    ResolveImports {
        /// Migration group name
        #[arg(long)]
        group: String,

        #[command(flatten)]
        preview: PreviewSourceArgs,

        /// Write the resolved directives as a target import file
        #[arg(long)]
        out: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Where preview output and import candidates come from.
#[derive(clap::Args, Clone, Debug)]
pub struct PreviewSourceArgs {
    /// Saved preview JSON (`{"steps": [...]}`)
    #[arg(long, conflicts_with = "target_binary")]
    pub preview: Option<String>,

    /// Saved import stub JSON (`{"resources": [...]}`)
    #[arg(long, conflicts_with = "target_binary")]
    pub candidates: Option<String>,

    /// Run this target-system binary in the target program directory
    #[arg(long)]
    pub target_binary: Option<String>,

    /// Import stub path written by the target system
    #[arg(long, default_value = "import-stub.json")]
    pub stub: String,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum DispositionArg {
    #[value(name = "skip")]
    Skip,
    #[value(name = "ignore-no-state")]
    IgnoreNoState,
    #[value(name = "ignore-needs-update")]
    IgnoreNeedsUpdate,
    #[value(name = "ignore-needs-replace")]
    IgnoreNeedsReplace,
}

impl From<DispositionArg> for Disposition {
    fn from(arg: DispositionArg) -> Self {
        match arg {
            DispositionArg::Skip => Self::Skip,
            DispositionArg::IgnoreNoState => Self::IgnoreNoState,
            DispositionArg::IgnoreNeedsUpdate => Self::IgnoreNeedsUpdate,
            DispositionArg::IgnoreNeedsReplace => Self::IgnoreNeedsReplace,
        }
    }
}
