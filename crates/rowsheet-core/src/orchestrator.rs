use once_cell::sync::OnceCell;
use rowsheet_common::{
    A1Range, FieldValue, Record, RemoteError, RowError, RowObject, Sheet, SheetId, StableId,
};
use rowsheet_gateway::{DocumentGateway, Grid, GridRange, ValueRange};

use crate::ID_FIELD;
use crate::codec::{self, KeySet};
use crate::keys::KeyRegistry;
use crate::query::QuerySpec;
use crate::tags::{RowTag, RowTagIndex};

/// CRUD over the rows of one document.
///
/// One orchestrator serves one request: it memoizes header rows and the
/// sheet list for its own lifetime only. Every operation is a short sequence
/// of independent gateway calls; nothing is rolled back when a later call of
/// the sequence fails.
pub struct RowOrchestrator<G> {
    gateway: G,
    doc: String,
    keys: KeyRegistry,
    sheets: OnceCell<Vec<Sheet>>,
}

impl<G: DocumentGateway> RowOrchestrator<G> {
    pub fn new(gateway: G, doc: impl Into<String>) -> Self {
        Self {
            gateway,
            doc: doc.into(),
            keys: KeyRegistry::new(),
            sheets: OnceCell::new(),
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn doc(&self) -> &str {
        &self.doc
    }

    pub fn tags(&self, sheet_id: SheetId) -> RowTagIndex<'_, G> {
        RowTagIndex::new(&self.gateway, &self.doc, sheet_id)
    }

    /// Sheets of the document in tab order.
    pub fn sheets(&self) -> Result<Vec<Sheet>, RowError> {
        self.sheet_list().map(<[Sheet]>::to_vec)
    }

    fn sheet_list(&self) -> Result<&[Sheet], RowError> {
        self.sheets
            .get_or_try_init(|| self.gateway.sheets(&self.doc).map_err(RowError::remote_read))
            .map(Vec::as_slice)
    }

    /// Title of `sheet_id`, needed to address A1 ranges.
    pub fn sheet_title(&self, sheet_id: SheetId) -> Result<String, RowError> {
        self.sheet_list()?
            .iter()
            .find(|s| s.sheet_id == sheet_id)
            .map(|s| s.title.clone())
            .ok_or_else(|| {
                RowError::not_found(format!("no sheet with id {sheet_id}")).with_sheet(sheet_id)
            })
    }

    /// The sheet's header row. An unknown sheet is `NotFound`.
    pub fn keys(&self, sheet_id: SheetId) -> Result<KeySet, RowError> {
        self.sheet_title(sheet_id)?;
        self.keys.get_keys(&self.gateway, &self.doc, sheet_id)
    }

    /// The row bound to `stable_id`, decoded.
    pub fn get_item(&self, sheet_id: SheetId, stable_id: StableId) -> Result<RowObject, RowError> {
        let tag = self.tags(sheet_id).resolve(stable_id)?;
        let keys = self.keys(sheet_id)?;
        let row = self.read_tagged_row(&tag)?;
        Ok(codec::decode_row(&keys, &row))
    }

    /// Every data row of the sheet (header excluded), decoded, top to bottom.
    pub fn list_items(&self, sheet_id: SheetId) -> Result<Vec<RowObject>, RowError> {
        let keys = self.keys(sheet_id)?;
        let ranges = self
            .gateway
            .get_by_filter(&self.doc, &[GridRange::data_rows(sheet_id).into()])
            .map_err(|e| RowError::remote_read(e).with_sheet(sheet_id))?;
        let rows: Grid = ranges.into_iter().flat_map(|r| r.values).collect();
        Ok(codec::decode(&keys, &rows))
    }

    /// Data rows matching `query`.
    pub fn search_items(
        &self,
        sheet_id: SheetId,
        query: &QuerySpec,
    ) -> Result<Vec<RowObject>, RowError> {
        Ok(query.filter(self.list_items(sheet_id)?))
    }

    /// Write `record` over the row bound to its `id`, creating the row first
    /// when no tag exists.
    ///
    /// Creating is three calls: append a placeholder row, tag it, write the
    /// values. A failure after the append leaves an untagged row, a failure
    /// after tagging leaves a row holding only the placeholder; both are
    /// left for [`crate::Reconciler`].
    pub fn create_or_update(
        &self,
        sheet_id: SheetId,
        record: &Record,
    ) -> Result<RowTag, RowError> {
        let stable_id = record_stable_id(record)?;
        let tags = self.tags(sheet_id);
        if let Some(tag) = tags.find(stable_id)? {
            self.write_item(&tag, record)?;
            return Ok(tag);
        }

        let title = self.sheet_title(sheet_id)?;
        let keys = self.keys(sheet_id)?;
        if keys.is_empty() {
            return Err(RowError::invalid("sheet has no header row")
                .with_sheet(sheet_id)
                .with_stable_id(stable_id));
        }
        let outcome = self
            .gateway
            .append_rows(
                &self.doc,
                &A1Range::sheet(title).to_string(),
                vec![codec::placeholder_row(&keys, stable_id)],
            )
            .map_err(|e| write_error(e, sheet_id, stable_id))?;
        let row = outcome.first_row().map_err(|e| {
            RowError::remote_write(RemoteError::transport(format!(
                "unreadable append range {:?}: {e}",
                outcome.updated_range
            )))
            .with_sheet(sheet_id)
            .with_stable_id(stable_id)
        })?;

        let tag = tags.create(stable_id, row).inspect_err(|_err| {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                sheet_id,
                stable_id,
                row,
                error = %_err,
                "row appended but not tagged; left as an untagged row"
            );
        })?;
        self.write_item(&tag, record).inspect_err(|_err| {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                sheet_id,
                stable_id,
                row,
                error = %_err,
                "row tagged but values not written; left holding the placeholder"
            );
        })?;
        Ok(tag)
    }

    /// Overwrite the row bound to `stable_id`. The tag must exist, and an
    /// `id` field in the record, if any, must name the same row.
    pub fn update_item(
        &self,
        sheet_id: SheetId,
        stable_id: StableId,
        record: &Record,
    ) -> Result<RowTag, RowError> {
        if let Some(value) = record.get(ID_FIELD).filter(|v| !v.is_blank()) {
            let body_id = parse_stable_id(value)?;
            if body_id != stable_id {
                return Err(RowError::invalid(format!(
                    "body id {body_id} does not match path id {stable_id}"
                ))
                .with_sheet(sheet_id)
                .with_stable_id(stable_id));
            }
        }
        let tag = self.tags(sheet_id).resolve(stable_id)?;
        self.write_item(&tag, record)?;
        Ok(tag)
    }

    /// Delete the row bound to `stable_id`; rows below move up one.
    pub fn delete_item(&self, sheet_id: SheetId, stable_id: StableId) -> Result<RowTag, RowError> {
        self.tags(sheet_id).delete(stable_id)
    }

    /// Cells of an A1 range, bypassing keys and tags.
    pub fn read_raw(&self, range: &str) -> Result<ValueRange, RowError> {
        self.gateway
            .get_range(&self.doc, range)
            .map_err(RowError::remote_read)
    }

    /// Overwrite an A1 range, bypassing keys and tags.
    pub fn write_raw(&self, range: &str, values: Grid) -> Result<(), RowError> {
        self.gateway
            .write_range(&self.doc, range, values)
            .map_err(RowError::remote_write)
    }

    fn read_tagged_row(&self, tag: &RowTag) -> Result<Vec<String>, RowError> {
        let sheet_id = tag.location.sheet_id;
        let ranges = self
            .gateway
            .get_by_filter(&self.doc, &[GridRange::span(&tag.location).into()])
            .map_err(|e| {
                RowError::remote_read(e)
                    .with_sheet(sheet_id)
                    .with_stable_id(tag.stable_id)
            })?;
        Ok(ranges
            .into_iter()
            .flat_map(|r| r.values)
            .next()
            .unwrap_or_default())
    }

    fn write_item(&self, tag: &RowTag, record: &Record) -> Result<(), RowError> {
        let sheet_id = tag.location.sheet_id;
        let keys = self.keys(sheet_id)?;
        let title = self.sheet_title(sheet_id)?;
        let encoded = codec::encode_report(&keys, record);
        if !encoded.ignored.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                sheet_id,
                stable_id = tag.stable_id,
                ignored = ?encoded.ignored,
                "fields without a header column are not written"
            );
        }
        let range = A1Range::row(title, tag.row(), keys.len() as u32);
        self.gateway
            .write_range(&self.doc, &range.to_string(), vec![encoded.cells])
            .map_err(|e| write_error(e, sheet_id, tag.stable_id))
    }
}

fn write_error(err: RemoteError, sheet_id: SheetId, stable_id: StableId) -> RowError {
    RowError::remote_write(err)
        .with_sheet(sheet_id)
        .with_stable_id(stable_id)
}

/// The stable id carried by a record's `id` field.
pub fn record_stable_id(record: &Record) -> Result<StableId, RowError> {
    match record.get(ID_FIELD) {
        Some(value) if !value.is_blank() => parse_stable_id(value),
        _ => Err(RowError::missing_field(ID_FIELD)),
    }
}

/// A decimal string or an integral number; blank values are a missing field.
pub fn parse_stable_id(value: &FieldValue) -> Result<StableId, RowError> {
    match value {
        FieldValue::Null => Err(RowError::missing_field(ID_FIELD)),
        FieldValue::Text(s) if s.trim().is_empty() => Err(RowError::missing_field(ID_FIELD)),
        FieldValue::Text(s) => parse_stable_id_str(s),
        FieldValue::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => Ok(*n as StableId),
        other => Err(RowError::invalid(format!("id {other} is not an integer"))),
    }
}

/// Parse a path or body id such as `"42"`.
pub fn parse_stable_id_str(text: &str) -> Result<StableId, RowError> {
    text.trim()
        .parse()
        .map_err(|_| RowError::invalid(format!("id {text:?} is not an integer")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowsheet_common::ErrorKind;

    #[test]
    fn ids_parse_from_text_and_integral_numbers() {
        assert_eq!(parse_stable_id(&FieldValue::from("42")).unwrap(), 42);
        assert_eq!(parse_stable_id(&FieldValue::from(" -3 ")).unwrap(), -3);
        assert_eq!(parse_stable_id(&FieldValue::Number(7.0)).unwrap(), 7);
    }

    #[test]
    fn blank_ids_are_missing_and_junk_is_invalid() {
        assert_eq!(
            parse_stable_id(&FieldValue::Null).unwrap_err(),
            ErrorKind::MissingField
        );
        assert_eq!(parse_stable_id(&FieldValue::from("")).unwrap_err(), ErrorKind::MissingField);
        assert_eq!(
            parse_stable_id(&FieldValue::from("x1")).unwrap_err(),
            ErrorKind::InvalidRequest
        );
        assert_eq!(
            parse_stable_id(&FieldValue::Number(1.5)).unwrap_err(),
            ErrorKind::InvalidRequest
        );
        assert_eq!(
            parse_stable_id(&FieldValue::Bool(true)).unwrap_err(),
            ErrorKind::InvalidRequest
        );
        assert_eq!(
            record_stable_id(&Record::new().with("name", "a")).unwrap_err(),
            ErrorKind::MissingField
        );
    }
}
