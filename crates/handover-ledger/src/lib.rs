//! # handover-ledger
//!
//! Mapping store for an incremental infrastructure migration.
//!
//! This crate provides:
//! - `MappingEntry`, `MigrationGroup`, `MigrationLedger` (the persisted model)
//! - ledger document load/save with atomic replacement
//! - lock-scoped load → mutate → save helpers
//!
//! It intentionally does not read live inventories or run previews. Those
//! concerns live in `handover-reconcile`.
//!
//! ## Data model
//!
//! ```text
//! handover.json (on disk, one document)
//!     ↕  load / save
//! MigrationLedger
//!     └─ MigrationGroup (ordered)
//!           └─ MappingEntry (ordered, value type)
//! ```

pub mod atomic_store;
pub mod document;
pub mod entry;
pub mod error;
pub mod ledger;

pub use atomic_store::{
    LedgerMutationError, LockHolder, MutationIntent, ledger_lock_path, mutate_ledger,
};
pub use document::{load, read_ledger, render_ledger, save, write_atomic};
pub use entry::{Disposition, MappingEntry, validate_address, validate_identifier};
pub use error::LedgerError;
pub use ledger::{MigrationGroup, MigrationLedger, ProjectLocations, UpsertOutcome};
