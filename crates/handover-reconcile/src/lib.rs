//! # handover-reconcile
//!
//! Reconciles a migration ledger against the live systems on both sides.
//!
//! This crate provides:
//! - source inventory flattening and the `InventoryReader` adapters
//! - target preview parsing and the `PreviewRunner` adapters
//! - the integrity checker and the integrity-guarded mutation policy
//! - per-resource migration status
//! - identity matching and import resolution
//! - source type → target type mapping
//!
//! It intentionally does not own persistence. Ledger load/save and locking
//! live in `handover-ledger`.
//!
//! ## Flow
//!
//! ```text
//! state file ──InventoryReader──▶ [ResourceDescriptor]
//!                                      │
//! MigrationLedger ──────────────────▶ check / reconcile / resolve_imports
//!                                      │
//! preview ─────PreviewRunner─────▶ PreviewMap, [CandidateImportRecord]
//! ```

pub mod identity;
pub mod imports;
pub mod integrity;
pub mod inventory;
pub mod mutation;
pub mod preview;
mod process;
pub mod status;
pub mod type_mapping;

pub use identity::{
    CandidateImportRecord, IdentifierParts, MatchContext, PARTIAL_MATCH_THRESHOLD, Suggestion,
    address_parts, derive_expected_identifier, is_match, is_partial_match, name_similarity,
    names_similar, parse_identifier, rank_suggestions, similar_addresses,
};
pub use imports::{
    ImportDirective, ImportResolution, UnresolvedEntry, render_import_file, resolve_imports,
    write_import_file,
};
pub use integrity::{
    CheckError, CheckFinding, CheckResult, FindingCategory, check, check_files,
    check_state_consistency, check_unique_mappings,
};
pub use inventory::{
    CommandInventory, InventoryError, InventoryReader, JsonFileInventory, ResourceDescriptor,
    Snapshot, list_managed_resources, read_inventory,
};
pub use mutation::{CheckedMutation, GuardError, GuardOutcome, apply_checked};
pub use preview::{
    CollaboratorError, CommandPreview, JsonFilePreview, PendingChange, PreviewMap, PreviewRunner,
    parse_candidates,
};
pub use process::ToolError;
pub use status::{ResourceStatus, StatusCounts, StatusReport, SubStatus, classify, reconcile};
pub use type_mapping::{
    CachedTypeMapper, CatalogTypeMapper, TypeMapper, TypeMappingError, derive_identifier,
    derive_identifier_for_address,
};
