//! Meta crate that re-exports the rowsheet layers. Depend on this crate for
//! the row API and opt into the HTTP server with the `server` feature; the
//! underlying crates stay reachable for deeper integration.

pub use rowsheet_common as common;
pub use rowsheet_core as rows;
pub use rowsheet_gateway as gateway;

#[cfg(feature = "server")]
pub use rowsheet_server as server;

pub use rowsheet_common::{
    A1Range, ErrorKind, FieldValue, Record, RemoteError, RowError, RowObject, RowSpan, Sheet,
    SheetId, StableId,
};
pub use rowsheet_core::{
    QuerySpec, ReconcileReport, Reconciler, RepairOutcome, RowOrchestrator, RowTag, RowTagIndex,
};
pub use rowsheet_gateway::{DocumentGateway, MemoryStore};

#[cfg(feature = "google")]
pub use rowsheet_gateway::GoogleSheets;
