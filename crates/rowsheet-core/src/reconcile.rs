//! Detection and repair of the orphan state a failed create leaves behind.

use std::collections::BTreeMap;

use rowsheet_common::{RowError, RowSpan, SheetId, StableId};
use rowsheet_gateway::{DocumentGateway, GridRange};
use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::codec::{self, KeySet};
use crate::keys::KeyRegistry;
use crate::tags::{RowTag, RowTagIndex};

/// A non-empty data row no tag covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UntaggedRow {
    pub row: u32,
    /// Parsed from the row's id column, when it holds an integer.
    pub stable_id: Option<StableId>,
}

/// What [`Reconciler::scan`] found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub sheet_id: SheetId,
    pub untagged_rows: Vec<UntaggedRow>,
    pub unwritten_tags: Vec<RowTag>,
    pub duplicate_ids: Vec<StableId>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.untagged_rows.is_empty()
            && self.unwritten_tags.is_empty()
            && self.duplicate_ids.is_empty()
    }
}

/// What [`Reconciler::repair`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairOutcome {
    /// Tags created for untagged rows.
    pub adopted: Vec<RowTag>,
    /// Duplicate rows deleted, as they were located before deletion.
    pub removed: Vec<RowTag>,
    /// The scan the repair acted on.
    pub report: ReconcileReport,
}

impl RepairOutcome {
    pub fn is_noop(&self) -> bool {
        self.adopted.is_empty() && self.removed.is_empty()
    }
}

/// Scans one sheet for orphan rows, orphan tags and duplicate bindings.
pub struct Reconciler<'a, G: ?Sized> {
    gateway: &'a G,
    doc: &'a str,
    keys: KeyRegistry,
}

impl<'a, G: DocumentGateway + ?Sized> Reconciler<'a, G> {
    pub fn new(gateway: &'a G, doc: &'a str) -> Self {
        Self {
            gateway,
            doc,
            keys: KeyRegistry::new(),
        }
    }

    pub fn scan(&self, sheet_id: SheetId) -> Result<ReconcileReport, RowError> {
        let sheets = self.gateway.sheets(self.doc).map_err(RowError::remote_read)?;
        if !sheets.iter().any(|s| s.sheet_id == sheet_id) {
            return Err(
                RowError::not_found(format!("no sheet with id {sheet_id}")).with_sheet(sheet_id)
            );
        }
        let keys = self.keys.get_keys(self.gateway, self.doc, sheet_id)?;
        let rows = self
            .gateway
            .get_by_filter(self.doc, &[GridRange::sheet(sheet_id).into()])
            .map_err(|e| RowError::remote_read(e).with_sheet(sheet_id))?
            .into_iter()
            .flat_map(|r| r.values)
            .collect::<Vec<_>>();
        let tags = RowTagIndex::new(self.gateway, self.doc, sheet_id).list()?;
        Ok(build_report(sheet_id, &keys, &rows, &tags))
    }

    /// Adopt untagged rows, then delete all but the topmost row of every
    /// duplicated id. Unwritten tags are kept: retrying the create fills them.
    pub fn repair(&self, sheet_id: SheetId) -> Result<RepairOutcome, RowError> {
        let report = self.scan(sheet_id)?;
        let index = RowTagIndex::new(self.gateway, self.doc, sheet_id);
        let mut tags = index.list()?;

        let mut adopted = Vec::new();
        for orphan in &report.untagged_rows {
            let Some(stable_id) = orphan.stable_id else {
                continue;
            };
            if tags.iter().any(|t| t.stable_id == stable_id) {
                continue;
            }
            let tag = index.create(stable_id, orphan.row)?;
            #[cfg(feature = "tracing")]
            tracing::info!(sheet_id, stable_id, row = orphan.row, "adopted untagged row");
            tags.push(tag);
            adopted.push(tag);
        }

        let mut removed = Vec::new();
        for stable_id in &report.duplicate_ids {
            let mut bound: Vec<RowTag> = tags
                .iter()
                .filter(|t| t.stable_id == *stable_id)
                .copied()
                .collect();
            bound.sort_by_key(|t| (t.location.start, t.metadata_id));
            let keep = bound[0].location;
            removed.extend(bound.into_iter().skip(1).filter(|t| t.location != keep));
        }
        removed.sort_by_key(|t| std::cmp::Reverse(t.location.start));
        removed.dedup_by_key(|t| t.location);
        let spans: Vec<RowSpan> = removed.iter().map(|t| t.location).collect();
        index.delete_spans(&spans)?;
        #[cfg(feature = "tracing")]
        if !removed.is_empty() {
            tracing::info!(sheet_id, count = removed.len(), "deleted duplicate rows");
        }
        removed.reverse();

        Ok(RepairOutcome {
            adopted,
            removed,
            report,
        })
    }
}

fn build_report(
    sheet_id: SheetId,
    keys: &KeySet,
    rows: &[Vec<String>],
    tags: &[RowTag],
) -> ReconcileReport {
    let id_col = codec::id_column(keys);
    let covered: FxHashSet<u32> = tags
        .iter()
        .flat_map(|t| t.location.start..t.location.end)
        .collect();

    let untagged_rows = rows
        .iter()
        .enumerate()
        .skip(1)
        .map(|(i, row)| (i as u32, row))
        .filter(|(i, row)| !covered.contains(i) && row.iter().any(|c| !c.is_empty()))
        .map(|(row, cells)| UntaggedRow {
            row,
            stable_id: cells.get(id_col).and_then(|c| c.trim().parse().ok()),
        })
        .collect();

    let unwritten_tags = tags
        .iter()
        .filter(|t| {
            let cells = rows.get(t.row() as usize).map(Vec::as_slice).unwrap_or(&[]);
            let placeholder = codec::placeholder_row(keys, t.stable_id);
            cells
                .iter()
                .enumerate()
                .all(|(i, c)| c.is_empty() || placeholder.get(i) == Some(c))
        })
        .copied()
        .collect();

    let mut counts: BTreeMap<StableId, usize> = BTreeMap::new();
    for tag in tags {
        *counts.entry(tag.stable_id).or_default() += 1;
    }
    let duplicate_ids = counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(id, _)| id)
        .collect();

    ReconcileReport {
        sheet_id,
        untagged_rows,
        unwritten_tags,
        duplicate_ids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    fn tag(stable_id: StableId, row: u32) -> RowTag {
        RowTag {
            stable_id,
            metadata_id: row as i64,
            location: RowSpan::single(0, row),
        }
    }

    #[test]
    fn report_classifies_orphans() {
        let keys: KeySet = vec!["name".into(), "id".into()];
        let rows = strings(&[
            &["name", "id"],
            &["a", "1"],
            &["", "2"],
            &["c", "x"],
            &[],
            &["d", "4"],
        ]);
        let tags = [tag(1, 1), tag(2, 2), tag(4, 5), tag(4, 4)];
        let report = build_report(0, &keys, &rows, &tags);
        assert_eq!(
            report.untagged_rows,
            vec![UntaggedRow {
                row: 3,
                stable_id: None
            }]
        );
        let unwritten: Vec<_> = report.unwritten_tags.iter().map(|t| t.row()).collect();
        assert_eq!(unwritten, vec![2, 4]);
        assert_eq!(report.duplicate_ids, vec![4]);
        assert!(!report.is_clean());
    }
}
