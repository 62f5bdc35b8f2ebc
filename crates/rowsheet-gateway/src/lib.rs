//! The boundary between rowsheet and the document engine that stores the
//! spreadsheet.
//!
//! Everything that talks to the engine goes through [`DocumentGateway`]. Two
//! backends ship with the crate: [`MemoryStore`], an in-process engine with
//! the same row/metadata reference semantics (used by tests and local runs),
//! and [`GoogleSheets`] behind the `google` feature.

pub mod backends;
pub mod error;
pub mod traits;

#[cfg(feature = "google")]
pub use backends::GoogleSheets;
pub use backends::{MemoryStore, Operation};
pub use error::SnapshotError;
pub use traits::{
    AppendOutcome, DataFilter, DeveloperMetadata, DocumentGateway, Grid, GridRange,
    MetadataLookup, MutationReply, StructuralRequest, ValueRange, ID_METADATA_KEY,
};

// Re-export for convenience
pub use rowsheet_common::{RemoteError, RowSpan, Sheet, SheetId};
