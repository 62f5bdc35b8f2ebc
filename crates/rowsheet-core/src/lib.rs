//! Treat a spreadsheet sheet as a small table.
//!
//! Row 0 names the columns; every other row is addressed by a caller-chosen
//! stable id instead of its position. The binding from id to row is a piece
//! of developer metadata the document engine keeps attached to the row, so
//! deleting rows above never breaks it. All remote access goes through
//! [`rowsheet_gateway::DocumentGateway`].

pub mod codec;
pub mod keys;
pub mod orchestrator;
pub mod query;
pub mod reconcile;
pub mod tags;

/// Payload field that carries the stable id.
pub const ID_FIELD: &str = "id";

pub use codec::{decode, decode_row, encode, encode_report, Encoded, KeySet};
pub use keys::KeyRegistry;
pub use orchestrator::{parse_stable_id, parse_stable_id_str, record_stable_id, RowOrchestrator};
pub use query::QuerySpec;
pub use reconcile::{ReconcileReport, Reconciler, RepairOutcome, UntaggedRow};
pub use tags::{RowTag, RowTagIndex};

pub use rowsheet_common::{
    ErrorKind, FieldValue, Record, RowError, RowObject, Sheet, SheetId, StableId,
};
