//! Stable ids bound to rows through developer metadata.
//!
//! A row tag is a metadata record with key `id`, the decimal stable id as
//! its value, anchored to the row's span. The engine keeps the anchor on the
//! row when rows above it move, so the index never remembers a location past
//! the call that looked it up.

use rowsheet_common::{RowError, RowSpan, SheetId, StableId};
use rowsheet_gateway::{
    DeveloperMetadata, DocumentGateway, MetadataLookup, MutationReply, StructuralRequest,
    ID_METADATA_KEY,
};
use serde::Serialize;

/// A stable id and the span its tag currently anchors to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowTag {
    pub stable_id: StableId,
    pub metadata_id: i64,
    pub location: RowSpan,
}

impl RowTag {
    /// First physical row of the tagged span.
    pub fn row(&self) -> u32 {
        self.location.start
    }

    fn from_metadata(metadata: &DeveloperMetadata) -> Option<Self> {
        Some(Self {
            stable_id: metadata.value.trim().parse().ok()?,
            metadata_id: metadata.metadata_id,
            location: metadata.location,
        })
    }
}

/// Tag operations for one sheet of one document.
pub struct RowTagIndex<'a, G: ?Sized> {
    gateway: &'a G,
    doc: &'a str,
    sheet_id: SheetId,
}

impl<'a, G: DocumentGateway + ?Sized> RowTagIndex<'a, G> {
    pub fn new(gateway: &'a G, doc: &'a str, sheet_id: SheetId) -> Self {
        Self {
            gateway,
            doc,
            sheet_id,
        }
    }

    pub fn sheet_id(&self) -> SheetId {
        self.sheet_id
    }

    fn lookup(&self) -> MetadataLookup {
        MetadataLookup::key(ID_METADATA_KEY).in_sheet(self.sheet_id)
    }

    fn search(&self, lookup: MetadataLookup) -> Result<Vec<RowTag>, RowError> {
        let found = self
            .gateway
            .search_metadata(self.doc, &[lookup])
            .map_err(|e| RowError::remote_read(e).with_sheet(self.sheet_id))?;
        Ok(found
            .iter()
            .filter(|m| m.location.sheet_id == self.sheet_id)
            .filter_map(RowTag::from_metadata)
            .collect())
    }

    /// The tag for `stable_id`, if any. The topmost wins when several exist.
    pub fn find(&self, stable_id: StableId) -> Result<Option<RowTag>, RowError> {
        let mut tags = self.search(self.lookup().value(stable_id.to_string()))?;
        tags.retain(|t| t.stable_id == stable_id);
        if tags.len() > 1 {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                sheet_id = self.sheet_id,
                stable_id,
                count = tags.len(),
                "stable id is bound to several rows; using the topmost"
            );
        }
        Ok(tags.into_iter().min_by_key(|t| (t.location.start, t.metadata_id)))
    }

    /// Like [`RowTagIndex::find`], but a missing tag is `NotFound`.
    pub fn resolve(&self, stable_id: StableId) -> Result<RowTag, RowError> {
        self.find(stable_id)?.ok_or_else(|| {
            RowError::not_found(format!("no row tagged with id {stable_id}"))
                .with_sheet(self.sheet_id)
                .with_stable_id(stable_id)
        })
    }

    /// Tag the single row `row` with `stable_id`.
    pub fn create(&self, stable_id: StableId, row: u32) -> Result<RowTag, RowError> {
        let location = RowSpan::single(self.sheet_id, row);
        let replies = self
            .gateway
            .batch_mutate(
                self.doc,
                vec![StructuralRequest::CreateMetadata {
                    key: ID_METADATA_KEY.to_string(),
                    value: stable_id.to_string(),
                    location,
                }],
            )
            .map_err(|e| self.write_error(e, stable_id))?;
        let metadata_id = replies
            .into_iter()
            .find_map(|reply| match reply {
                MutationReply::CreatedMetadata(m) => Some(m.metadata_id),
                MutationReply::DeletedRows => None,
            })
            .unwrap_or_default();
        Ok(RowTag {
            stable_id,
            metadata_id,
            location,
        })
    }

    /// Delete the row `stable_id` is bound to; its tag goes with it.
    pub fn delete(&self, stable_id: StableId) -> Result<RowTag, RowError> {
        let tag = self.resolve(stable_id)?;
        self.delete_spans(&[tag.location])
            .map_err(|e| e.with_stable_id(stable_id))?;
        Ok(tag)
    }

    /// Delete several spans in one call, bottom-up so no deletion shifts another.
    pub fn delete_spans(&self, spans: &[RowSpan]) -> Result<(), RowError> {
        if spans.is_empty() {
            return Ok(());
        }
        let mut spans = spans.to_vec();
        spans.sort_by(|a, b| b.start.cmp(&a.start));
        let requests = spans.into_iter().map(StructuralRequest::DeleteRows).collect();
        self.gateway
            .batch_mutate(self.doc, requests)
            .map_err(|e| RowError::remote_write(e).with_sheet(self.sheet_id))?;
        Ok(())
    }

    /// Every tag of the sheet, top to bottom. Tags whose value is not a
    /// decimal id are skipped.
    pub fn list(&self) -> Result<Vec<RowTag>, RowError> {
        let mut tags = self.search(self.lookup())?;
        tags.sort_by_key(|t| (t.location.start, t.metadata_id));
        Ok(tags)
    }

    fn write_error(&self, err: rowsheet_common::RemoteError, stable_id: StableId) -> RowError {
        RowError::remote_write(err)
            .with_sheet(self.sheet_id)
            .with_stable_id(stable_id)
    }
}
