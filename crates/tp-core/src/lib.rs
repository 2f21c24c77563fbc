//! Core domain logic for activity post ingestion.
//!
//! This crate contains the fundamental types and logic for:
//! - Track extraction: reducing TCX files to measurements
//! - Locale resolution: mapping UTC start times to entry keys
//! - Entries: front-matter fields and the extraction merge
//! - Reconciliation: matching entries against the ledger export

pub mod device;
pub mod entry;
pub mod ledger;
pub mod locale;
pub mod reconcile;
pub mod track;
mod types;

pub use device::{DeviceProfile, DeviceRegistry, parse_equipment};
pub use entry::{ENTRY_FILE_NAME, Entry, field};
pub use ledger::{Ledger, LedgerColumns, LedgerError, LedgerRow};
pub use locale::{ResolvedInstant, TimeError, TzfLookup, ZoneLookup, resolve};
pub use reconcile::{
    EntryWriter, Enrichment, EquipmentPolicy, MatchKind, ReconcileError, ReconcileReport,
    Reconciler,
};
pub use track::{Measurements, Position, TrackError};
pub use types::{EntryKey, FieldValue, Fields, KEY_FORMAT, ValidationError};
