use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use rowsheet_common::{A1Range, RemoteError, RowSpan, Sheet, SheetId};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::SnapshotError;
use crate::traits::{
    AppendOutcome, DataFilter, DeveloperMetadata, DocumentGateway, Grid, GridRange,
    MetadataLookup, MutationReply, StructuralRequest, ValueRange,
};

const SNAPSHOT_VERSION: u32 = 1;

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
struct Snapshot {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    documents: BTreeMap<String, MemoryDocument>,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    documents: &'a BTreeMap<String, MemoryDocument>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
struct MemoryDocument {
    #[serde(default)]
    sheets: Vec<MemorySheet>,
    #[serde(default)]
    metadata: Vec<DeveloperMetadata>,
    #[serde(default)]
    next_metadata_id: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct MemorySheet {
    #[serde(flatten)]
    props: Sheet,
    #[serde(default)]
    rows: Grid,
}

/// Gateway calls, as recorded by [`MemoryStore::calls`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Sheets,
    GetRange,
    GetByFilter,
    WriteRange,
    AppendRows,
    BatchMutate,
    SearchMetadata,
}

impl Operation {
    /// Whether the call can change the document.
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Operation::WriteRange | Operation::AppendRows | Operation::BatchMutate
        )
    }
}

/// In-process document engine.
///
/// Reproduces the reference semantics rowsheet relies on: metadata anchored
/// to rows follows them when rows above are deleted and disappears with them,
/// appends land below the last non-empty row, and reads omit trailing empty
/// cells. All documents sit behind one lock, so every call is atomic.
pub struct MemoryStore {
    documents: RwLock<BTreeMap<String, MemoryDocument>>,
    snapshot_path: Option<PathBuf>,
    calls: Mutex<Vec<Operation>>,
    failures: Mutex<Vec<(Operation, RemoteError)>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(BTreeMap::new()),
            snapshot_path: None,
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
        }
    }

    /// Load `path` if it exists and rewrite it after every gateway mutation.
    ///
    /// The seeding helpers below touch memory only; their changes reach the
    /// file with the next mutation or an explicit [`MemoryStore::save_to_path`].
    pub fn with_snapshot(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let path = path.as_ref().to_path_buf();
        let mut store = if path.exists() {
            Self::open_path(&path)?
        } else {
            Self::new()
        };
        store.snapshot_path = Some(path);
        Ok(store)
    }

    pub fn open_path(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let snapshot: Snapshot = serde_json::from_reader(BufReader::new(file))?;
        Self::from_snapshot(snapshot)
    }

    pub fn from_json_str(json: &str) -> Result<Self, SnapshotError> {
        Self::from_snapshot(serde_json::from_str(json)?)
    }

    fn from_snapshot(snapshot: Snapshot) -> Result<Self, SnapshotError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::Version(snapshot.version));
        }
        let store = Self::new();
        *store.documents.write() = snapshot.documents;
        Ok(store)
    }

    pub fn to_json_string(&self) -> Result<String, SnapshotError> {
        let docs = self.documents.read();
        let snapshot = SnapshotRef {
            version: SNAPSHOT_VERSION,
            documents: &docs,
        };
        Ok(serde_json::to_string_pretty(&snapshot)?)
    }

    /// Write the snapshot to `path`, replacing it atomically.
    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let docs = self.documents.read();
        write_snapshot(path.as_ref(), &docs)
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    // Backend-specific helpers (not part of DocumentGateway)

    /// Create an empty document; no-op when it already exists.
    pub fn create_document(&self, doc: &str) {
        self.documents.write().entry(doc.to_string()).or_default();
    }

    /// Append a sheet with the next free id (the first sheet gets id 0).
    pub fn add_sheet(&self, doc: &str, title: &str) -> Sheet {
        let mut docs = self.documents.write();
        let document = docs.entry(doc.to_string()).or_default();
        let sheet_id = document
            .sheets
            .iter()
            .map(|s| s.props.sheet_id + 1)
            .max()
            .unwrap_or(0);
        Self::push_sheet(document, title, sheet_id)
    }

    /// Append a sheet with an explicit id.
    pub fn add_sheet_with_id(&self, doc: &str, title: &str, sheet_id: SheetId) -> Sheet {
        let mut docs = self.documents.write();
        let document = docs.entry(doc.to_string()).or_default();
        Self::push_sheet(document, title, sheet_id)
    }

    fn push_sheet(document: &mut MemoryDocument, title: &str, sheet_id: SheetId) -> Sheet {
        let props = Sheet::new(title, document.sheets.len() as i64, sheet_id);
        document.sheets.push(MemorySheet {
            props: props.clone(),
            rows: Vec::new(),
        });
        props
    }

    /// Replace every row of a sheet.
    pub fn set_rows<R, C>(&self, doc: &str, sheet_id: SheetId, rows: R) -> Result<(), RemoteError>
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let mut docs = self.documents.write();
        let sheet = docs
            .get_mut(doc)
            .ok_or_else(|| missing_document(doc))?
            .sheet_by_id_mut(sheet_id)?;
        sheet.rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(Into::into).collect())
            .collect();
        Ok(())
    }

    /// Raw rows of a sheet, untrimmed.
    pub fn rows(&self, doc: &str, sheet_id: SheetId) -> Result<Grid, RemoteError> {
        let docs = self.documents.read();
        let document = docs.get(doc).ok_or_else(|| missing_document(doc))?;
        Ok(document.sheet_by_id(sheet_id)?.rows.clone())
    }

    /// Every metadata record of a document, in creation order.
    pub fn metadata(&self, doc: &str) -> Result<Vec<DeveloperMetadata>, RemoteError> {
        let docs = self.documents.read();
        let document = docs.get(doc).ok_or_else(|| missing_document(doc))?;
        Ok(document.metadata.clone())
    }

    /// Calls made so far, in order.
    pub fn calls(&self) -> Vec<Operation> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Make the next call of `operation` fail with `error` without touching the document.
    pub fn fail_next(&self, operation: Operation, error: RemoteError) {
        self.failures.lock().push((operation, error));
    }

    fn enter(&self, operation: Operation) -> Result<(), RemoteError> {
        self.calls.lock().push(operation);
        let mut failures = self.failures.lock();
        if let Some(pos) = failures.iter().position(|(op, _)| *op == operation) {
            let (_, err) = failures.remove(pos);
            return Err(err);
        }
        Ok(())
    }

    /// Called with the write lock held, so snapshots land in commit order.
    fn persist(&self, documents: &BTreeMap<String, MemoryDocument>) -> Result<(), RemoteError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        write_snapshot(path, documents).map_err(|err| {
            #[cfg(feature = "tracing")]
            tracing::warn!(path = %path.display(), error = %err, "snapshot write failed");
            RemoteError::from(err)
        })
    }

    fn read<T>(
        &self,
        doc: &str,
        f: impl FnOnce(&MemoryDocument) -> Result<T, RemoteError>,
    ) -> Result<T, RemoteError> {
        let docs = self.documents.read();
        let document = docs.get(doc).ok_or_else(|| missing_document(doc))?;
        f(document)
    }

    /// Run `f` against a copy of the document and commit only on success.
    fn mutate<T>(
        &self,
        doc: &str,
        f: impl FnOnce(&mut MemoryDocument) -> Result<T, RemoteError>,
    ) -> Result<T, RemoteError> {
        let mut docs = self.documents.write();
        let document = docs.get_mut(doc).ok_or_else(|| missing_document(doc))?;
        let mut draft = document.clone();
        let out = f(&mut draft)?;
        *document = draft;
        self.persist(&docs)?;
        Ok(out)
    }
}

/// Serialize into a temporary file beside `path`, then rename it over `path`.
fn write_snapshot(
    path: &Path,
    documents: &BTreeMap<String, MemoryDocument>,
) -> Result<(), SnapshotError> {
    let io_err = |source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    let mut writer = BufWriter::new(tmp.as_file());
    serde_json::to_writer_pretty(
        &mut writer,
        &SnapshotRef {
            version: SNAPSHOT_VERSION,
            documents,
        },
    )?;
    writer.flush().map_err(io_err)?;
    drop(writer);
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

fn missing_document(doc: &str) -> RemoteError {
    RemoteError::not_found(format!("Requested entity was not found: {doc}"))
}

fn unparsable(range: &str) -> RemoteError {
    RemoteError::bad_request(format!("Unable to parse range: {range}"))
}

fn no_grid(sheet_id: SheetId) -> RemoteError {
    RemoteError::bad_request(format!("No grid with id: {sheet_id}"))
}

fn row_is_blank(row: &[String]) -> bool {
    row.iter().all(String::is_empty)
}

/// Drop trailing empty cells of each row, then trailing empty rows.
fn trim_grid(mut grid: Grid) -> Grid {
    for row in &mut grid {
        while row.last().is_some_and(String::is_empty) {
            row.pop();
        }
    }
    while grid.last().is_some_and(Vec::is_empty) {
        grid.pop();
    }
    grid
}

/// Where a metadata anchor ends up once `removed` rows are gone, if anywhere.
fn shift_after_delete(span: RowSpan, removed: RowSpan) -> Option<RowSpan> {
    if span.sheet_id != removed.sheet_id || span.end <= removed.start {
        return Some(span);
    }
    if span.start >= removed.end {
        return Some(RowSpan {
            start: span.start - removed.len(),
            end: span.end - removed.len(),
            ..span
        });
    }
    let overlap = span.end.min(removed.end) - span.start.max(removed.start);
    let kept = span.len() - overlap;
    if kept == 0 {
        return None;
    }
    let start = span.start.min(removed.start);
    Some(RowSpan {
        start,
        end: start + kept,
        ..span
    })
}

impl MemoryDocument {
    fn sheet_by_id(&self, sheet_id: SheetId) -> Result<&MemorySheet, RemoteError> {
        self.sheets
            .iter()
            .find(|s| s.props.sheet_id == sheet_id)
            .ok_or_else(|| no_grid(sheet_id))
    }

    fn sheet_by_id_mut(&mut self, sheet_id: SheetId) -> Result<&mut MemorySheet, RemoteError> {
        self.sheets
            .iter_mut()
            .find(|s| s.props.sheet_id == sheet_id)
            .ok_or_else(|| no_grid(sheet_id))
    }

    /// The sheet an A1 range addresses; the first sheet when it names none.
    fn sheet_index_for(&self, range: &A1Range, raw: &str) -> Result<usize, RemoteError> {
        match range.sheet_name() {
            Some(title) => self.sheets.iter().position(|s| s.props.title == title),
            None if self.sheets.is_empty() => None,
            None => Some(0),
        }
        .ok_or_else(|| unparsable(raw))
    }

    fn matching_metadata(&self, lookup: &MetadataLookup) -> Vec<DeveloperMetadata> {
        let mut found: Vec<_> = self
            .metadata
            .iter()
            .filter(|m| lookup.matches(m))
            .cloned()
            .collect();
        found.sort_by_key(|m| (m.location.sheet_id, m.location.start, m.metadata_id));
        found
    }

    fn read_rows(&self, grid: &GridRange) -> Result<ValueRange, RemoteError> {
        let sheet = self.sheet_by_id(grid.sheet_id)?;
        let start = grid.start_row.unwrap_or(0);
        let end = grid.end_row.unwrap_or(sheet.rows.len() as u32).max(start);
        let values = sheet
            .rows
            .iter()
            .skip(start as usize)
            .take((end - start) as usize)
            .cloned()
            .collect();
        let range = A1Range {
            sheet: Some(sheet.props.title.clone()),
            start_row: start,
            end_row: grid.end_row.map(|e| e.max(start + 1)),
            start_col: 0,
            end_col: None,
        };
        Ok(ValueRange {
            range: range.to_string(),
            values: trim_grid(values),
        })
    }
}

impl MemorySheet {
    fn set_cell(&mut self, row: usize, col: usize, value: String) {
        if self.rows.len() <= row {
            self.rows.resize_with(row + 1, Vec::new);
        }
        let cells = &mut self.rows[row];
        if cells.len() <= col {
            cells.resize(col + 1, String::new());
        }
        cells[col] = value;
    }

    fn write_block(&mut self, top: u32, left: u32, values: Grid) {
        for (i, row) in values.into_iter().enumerate() {
            for (j, cell) in row.into_iter().enumerate() {
                self.set_cell(top as usize + i, left as usize + j, cell);
            }
        }
    }
}

impl DocumentGateway for MemoryStore {
    fn sheets(&self, doc: &str) -> Result<Vec<Sheet>, RemoteError> {
        self.enter(Operation::Sheets)?;
        self.read(doc, |d| Ok(d.sheets.iter().map(|s| s.props.clone()).collect()))
    }

    fn get_range(&self, doc: &str, range: &str) -> Result<ValueRange, RemoteError> {
        self.enter(Operation::GetRange)?;
        let parsed = A1Range::parse(range).map_err(|_| unparsable(range))?;
        self.read(doc, |d| {
            let sheet = &d.sheets[d.sheet_index_for(&parsed, range)?];
            let stored = sheet.rows.len() as u32;
            let end_row = parsed.end_row.map_or(stored, |end| end.min(stored));
            let values = (parsed.start_row..end_row.max(parsed.start_row))
                .filter_map(|r| sheet.rows.get(r as usize))
                .map(|row| {
                    let end_col = parsed.end_col.unwrap_or(row.len() as u32) as usize;
                    row.iter()
                        .take(end_col)
                        .skip(parsed.start_col as usize)
                        .cloned()
                        .collect()
                })
                .collect();
            let resolved = A1Range {
                sheet: Some(sheet.props.title.clone()),
                ..parsed.clone()
            };
            Ok(ValueRange {
                range: resolved.to_string(),
                values: trim_grid(values),
            })
        })
    }

    fn get_by_filter(
        &self,
        doc: &str,
        filters: &[DataFilter],
    ) -> Result<Vec<ValueRange>, RemoteError> {
        self.enter(Operation::GetByFilter)?;
        self.read(doc, |d| {
            let mut out = Vec::new();
            for filter in filters {
                match filter {
                    DataFilter::Grid(grid) => out.push(d.read_rows(grid)?),
                    DataFilter::Metadata(lookup) => {
                        for m in d.matching_metadata(lookup) {
                            out.push(d.read_rows(&GridRange::span(&m.location))?);
                        }
                    }
                }
            }
            Ok(out)
        })
    }

    fn write_range(&self, doc: &str, range: &str, values: Grid) -> Result<(), RemoteError> {
        self.enter(Operation::WriteRange)?;
        let parsed = A1Range::parse(range).map_err(|_| unparsable(range))?;
        let height = values.len() as u32;
        let width = values.iter().map(Vec::len).max().unwrap_or(0) as u32;
        if parsed
            .end_row
            .is_some_and(|end| parsed.start_row + height > end)
            || parsed
                .end_col
                .is_some_and(|end| parsed.start_col + width > end)
        {
            return Err(RemoteError::bad_request(format!(
                "Requested writing within range [{range}], but tried writing {height}x{width} cells"
            )));
        }
        self.mutate(doc, |d| {
            let index = d.sheet_index_for(&parsed, range)?;
            d.sheets[index].write_block(parsed.start_row, parsed.start_col, values);
            Ok(())
        })
    }

    fn append_rows(
        &self,
        doc: &str,
        range: &str,
        values: Grid,
    ) -> Result<AppendOutcome, RemoteError> {
        self.enter(Operation::AppendRows)?;
        let parsed = A1Range::parse(range).map_err(|_| unparsable(range))?;
        self.mutate(doc, |d| {
            let index = d.sheet_index_for(&parsed, range)?;
            let sheet = &mut d.sheets[index];
            let top = sheet
                .rows
                .iter()
                .rposition(|row| !row_is_blank(row))
                .map(|last| last as u32 + 1)
                .unwrap_or(0)
                .max(parsed.start_row);
            let height = values.len().max(1) as u32;
            let width = values.iter().map(Vec::len).max().unwrap_or(0).max(1) as u32;
            let updated = A1Range {
                sheet: Some(sheet.props.title.clone()),
                start_row: top,
                end_row: Some(top + height),
                start_col: parsed.start_col,
                end_col: Some(parsed.start_col + width),
            };
            sheet.write_block(top, parsed.start_col, values);
            Ok(AppendOutcome {
                updated_range: updated.to_string(),
            })
        })
    }

    fn batch_mutate(
        &self,
        doc: &str,
        requests: Vec<StructuralRequest>,
    ) -> Result<Vec<MutationReply>, RemoteError> {
        self.enter(Operation::BatchMutate)?;
        self.mutate(doc, |d| {
            let mut replies = Vec::with_capacity(requests.len());
            for request in requests {
                match request {
                    StructuralRequest::CreateMetadata {
                        key,
                        value,
                        location,
                    } => {
                        d.sheet_by_id(location.sheet_id)?;
                        if location.is_empty() {
                            return Err(RemoteError::bad_request(
                                "Invalid developer metadata location: empty span",
                            ));
                        }
                        d.next_metadata_id += 1;
                        let metadata = DeveloperMetadata {
                            metadata_id: d.next_metadata_id,
                            key,
                            value,
                            location,
                        };
                        d.metadata.push(metadata.clone());
                        replies.push(MutationReply::CreatedMetadata(metadata));
                    }
                    StructuralRequest::DeleteRows(span) => {
                        let sheet = d.sheet_by_id_mut(span.sheet_id)?;
                        let len = sheet.rows.len();
                        let start = (span.start as usize).min(len);
                        let end = (span.end as usize).min(len);
                        sheet.rows.drain(start..end);
                        d.metadata = std::mem::take(&mut d.metadata)
                            .into_iter()
                            .filter_map(|mut m| {
                                m.location = shift_after_delete(m.location, span)?;
                                Some(m)
                            })
                            .collect();
                        replies.push(MutationReply::DeletedRows);
                    }
                }
            }
            Ok(replies)
        })
    }

    fn search_metadata(
        &self,
        doc: &str,
        lookups: &[MetadataLookup],
    ) -> Result<Vec<DeveloperMetadata>, RemoteError> {
        self.enter(Operation::SearchMetadata)?;
        self.read(doc, |d| {
            let mut out: Vec<DeveloperMetadata> = Vec::new();
            for lookup in lookups {
                for m in d.matching_metadata(lookup) {
                    if !out.iter().any(|seen| seen.metadata_id == m.metadata_id) {
                        out.push(m);
                    }
                }
            }
            out.sort_by_key(|m| (m.location.sheet_id, m.location.start, m.metadata_id));
            Ok(out)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start: u32, end: u32) -> RowSpan {
        RowSpan {
            sheet_id: 0,
            start,
            end,
        }
    }

    #[test]
    fn anchors_above_the_deleted_rows_stay_put() {
        assert_eq!(shift_after_delete(span(1, 2), span(3, 4)), Some(span(1, 2)));
    }

    #[test]
    fn anchors_below_the_deleted_rows_move_up() {
        assert_eq!(shift_after_delete(span(5, 6), span(2, 4)), Some(span(3, 4)));
    }

    #[test]
    fn anchors_inside_the_deleted_rows_vanish() {
        assert_eq!(shift_after_delete(span(2, 3), span(2, 3)), None);
        assert_eq!(shift_after_delete(span(3, 4), span(1, 6)), None);
    }

    #[test]
    fn straddling_anchors_shrink() {
        assert_eq!(shift_after_delete(span(2, 6), span(4, 8)), Some(span(2, 4)));
        assert_eq!(shift_after_delete(span(2, 6), span(0, 3)), Some(span(0, 3)));
    }

    #[test]
    fn other_sheets_are_untouched() {
        let other = RowSpan {
            sheet_id: 9,
            start: 5,
            end: 6,
        };
        assert_eq!(shift_after_delete(other, span(0, 10)), Some(other));
    }

    #[test]
    fn trim_drops_trailing_blanks_only() {
        let grid = vec![
            vec!["a".to_string(), String::new()],
            vec![String::new(), "b".to_string()],
            vec![String::new()],
        ];
        assert_eq!(
            trim_grid(grid),
            vec![vec!["a".to_string()], vec![String::new(), "b".to_string()]]
        );
    }
}
