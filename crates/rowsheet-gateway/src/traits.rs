use std::sync::Arc;

use rowsheet_common::{A1ParseError, A1Range, RemoteError, RowSpan, Sheet, SheetId};
use serde::{Deserialize, Serialize};

/// Metadata key under which row tags are stored.
pub const ID_METADATA_KEY: &str = "id";

/// Row-major cell text.
pub type Grid = Vec<Vec<String>>;

/// Cells read from one region, with the A1 text of that region.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValueRange {
    pub range: String,
    pub values: Grid,
}

/// A run of rows of one sheet; every column. `None` ends are open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridRange {
    pub sheet_id: SheetId,
    pub start_row: Option<u32>,
    pub end_row: Option<u32>,
}

impl GridRange {
    /// Every row of the sheet.
    pub fn sheet(sheet_id: SheetId) -> Self {
        Self {
            sheet_id,
            start_row: None,
            end_row: None,
        }
    }

    /// Row 0 only.
    pub fn header(sheet_id: SheetId) -> Self {
        Self::rows(sheet_id, 0, 1)
    }

    /// Every row below the header.
    pub fn data_rows(sheet_id: SheetId) -> Self {
        Self {
            sheet_id,
            start_row: Some(1),
            end_row: None,
        }
    }

    pub fn rows(sheet_id: SheetId, start: u32, end: u32) -> Self {
        Self {
            sheet_id,
            start_row: Some(start),
            end_row: Some(end),
        }
    }

    pub fn span(span: &RowSpan) -> Self {
        Self::rows(span.sheet_id, span.start, span.end)
    }
}

/// Selects developer metadata. Every populated criterion must match.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetadataLookup {
    pub metadata_id: Option<i64>,
    pub key: Option<String>,
    pub value: Option<String>,
    /// Only metadata anchored inside this sheet.
    pub sheet_id: Option<SheetId>,
}

impl MetadataLookup {
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn by_id(metadata_id: i64) -> Self {
        Self {
            metadata_id: Some(metadata_id),
            ..Self::default()
        }
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn in_sheet(mut self, sheet_id: SheetId) -> Self {
        self.sheet_id = Some(sheet_id);
        self
    }

    pub fn matches(&self, metadata: &DeveloperMetadata) -> bool {
        self.metadata_id.is_none_or(|id| id == metadata.metadata_id)
            && self.key.as_deref().is_none_or(|k| k == metadata.key)
            && self.value.as_deref().is_none_or(|v| v == metadata.value)
            && self.sheet_id.is_none_or(|s| s == metadata.location.sheet_id)
    }
}

/// What a filtered read selects: a run of rows, or the rows some metadata is anchored to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataFilter {
    Grid(GridRange),
    Metadata(MetadataLookup),
}

impl From<GridRange> for DataFilter {
    fn from(value: GridRange) -> Self {
        DataFilter::Grid(value)
    }
}

impl From<MetadataLookup> for DataFilter {
    fn from(value: MetadataLookup) -> Self {
        DataFilter::Metadata(value)
    }
}

/// A key/value record anchored to a row span. The engine moves the anchor
/// when rows above it are removed and drops the record when its rows are.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeveloperMetadata {
    pub metadata_id: i64,
    pub key: String,
    pub value: String,
    pub location: RowSpan,
}

/// Layout-changing requests sent in one batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StructuralRequest {
    CreateMetadata {
        key: String,
        value: String,
        location: RowSpan,
    },
    DeleteRows(RowSpan),
}

/// One reply per [`StructuralRequest`], in request order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MutationReply {
    CreatedMetadata(DeveloperMetadata),
    DeletedRows,
}

/// Where appended values landed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppendOutcome {
    pub updated_range: String,
}

impl AppendOutcome {
    /// Zero-based index of the first appended row.
    pub fn first_row(&self) -> Result<u32, A1ParseError> {
        A1Range::parse(&self.updated_range).map(|r| r.start_row)
    }
}

/// The document engine, seen as a handful of remote calls.
///
/// Each method is exactly one round trip and either fully happens or fails
/// with a [`RemoteError`]. Implementations must not cache document contents.
pub trait DocumentGateway: Send + Sync {
    /// Sheets of a document in tab order.
    fn sheets(&self, doc: &str) -> Result<Vec<Sheet>, RemoteError>;

    /// Cells of an A1 range. Trailing empty cells and rows are omitted.
    fn get_range(&self, doc: &str, range: &str) -> Result<ValueRange, RemoteError>;

    /// One value range per matched region, in filter order.
    fn get_by_filter(
        &self,
        doc: &str,
        filters: &[DataFilter],
    ) -> Result<Vec<ValueRange>, RemoteError>;

    /// Overwrite cells starting at the top-left of `range`, row-major.
    fn write_range(&self, doc: &str, range: &str, values: Grid) -> Result<(), RemoteError>;

    /// Write `values` after the last non-empty row of the table in `range`.
    fn append_rows(
        &self,
        doc: &str,
        range: &str,
        values: Grid,
    ) -> Result<AppendOutcome, RemoteError>;

    /// Apply structural requests atomically.
    fn batch_mutate(
        &self,
        doc: &str,
        requests: Vec<StructuralRequest>,
    ) -> Result<Vec<MutationReply>, RemoteError>;

    /// Metadata matching any of the lookups, ordered by anchor position.
    fn search_metadata(
        &self,
        doc: &str,
        lookups: &[MetadataLookup],
    ) -> Result<Vec<DeveloperMetadata>, RemoteError>;
}

macro_rules! forward_gateway {
    ($($ty:ty),*) => {$(
        impl<G: DocumentGateway + ?Sized> DocumentGateway for $ty {
            fn sheets(&self, doc: &str) -> Result<Vec<Sheet>, RemoteError> {
                (**self).sheets(doc)
            }
            fn get_range(&self, doc: &str, range: &str) -> Result<ValueRange, RemoteError> {
                (**self).get_range(doc, range)
            }
            fn get_by_filter(
                &self,
                doc: &str,
                filters: &[DataFilter],
            ) -> Result<Vec<ValueRange>, RemoteError> {
                (**self).get_by_filter(doc, filters)
            }
            fn write_range(&self, doc: &str, range: &str, values: Grid) -> Result<(), RemoteError> {
                (**self).write_range(doc, range, values)
            }
            fn append_rows(
                &self,
                doc: &str,
                range: &str,
                values: Grid,
            ) -> Result<AppendOutcome, RemoteError> {
                (**self).append_rows(doc, range, values)
            }
            fn batch_mutate(
                &self,
                doc: &str,
                requests: Vec<StructuralRequest>,
            ) -> Result<Vec<MutationReply>, RemoteError> {
                (**self).batch_mutate(doc, requests)
            }
            fn search_metadata(
                &self,
                doc: &str,
                lookups: &[MetadataLookup],
            ) -> Result<Vec<DeveloperMetadata>, RemoteError> {
                (**self).search_metadata(doc, lookups)
            }
        }
    )*};
}

forward_gateway!(&G, Box<G>, Arc<G>);
