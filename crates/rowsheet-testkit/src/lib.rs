//! Seeded in-memory documents shared by the rowsheet test suites.

use rowsheet_gateway::{
    DocumentGateway, MemoryStore, RowSpan, SheetId, StructuralRequest, ID_METADATA_KEY,
};

/// Document id used by every fixture.
pub const DOC: &str = "doc-1";

/// Build an in-memory document sheet by sheet.
#[derive(Default)]
pub struct DocumentBuilder {
    sheets: Vec<(String, Vec<Vec<String>>)>,
    tags: Vec<(usize, i64, u32)>,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sheet; its id is its position (0, 1, ...).
    pub fn sheet(mut self, title: &str, rows: &[&[&str]]) -> Self {
        let rows = rows
            .iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect();
        self.sheets.push((title.to_string(), rows));
        self
    }

    /// Tag `row` of the most recently added sheet with `stable_id`.
    pub fn tag(mut self, stable_id: i64, row: u32) -> Self {
        let sheet = self.sheets.len().saturating_sub(1);
        self.tags.push((sheet, stable_id, row));
        self
    }

    pub fn build(self) -> MemoryStore {
        self.build_into(MemoryStore::new())
    }

    fn build_into(self, store: MemoryStore) -> MemoryStore {
        store.create_document(DOC);
        for (index, (title, rows)) in self.sheets.into_iter().enumerate() {
            store.add_sheet_with_id(DOC, &title, index as SheetId);
            store
                .set_rows(DOC, index as SheetId, rows)
                .expect("fixture sheet exists");
        }
        if !self.tags.is_empty() {
            let requests = self
                .tags
                .into_iter()
                .map(|(sheet, id, row)| StructuralRequest::CreateMetadata {
                    key: ID_METADATA_KEY.to_string(),
                    value: id.to_string(),
                    location: RowSpan::single(sheet as SheetId, row),
                })
                .collect();
            store
                .batch_mutate(DOC, requests)
                .expect("fixture tags are valid");
            store.clear_calls();
        }
        store
    }
}

/// An empty sheet with an `id, name, qty` header.
pub fn empty_inventory() -> MemoryStore {
    DocumentBuilder::new()
        .sheet("Inventory", &[&["id", "name", "qty"]])
        .build()
}

/// Three tagged rows (ids 1, 2, 3) under an `id, name, qty` header, plus an
/// empty `Archive` sheet with the same header.
pub fn inventory() -> MemoryStore {
    DocumentBuilder::new()
        .sheet(
            "Inventory",
            &[
                &["id", "name", "qty"],
                &["1", "apple", "3"],
                &["2", "pear", "0"],
                &["3", "plum"],
            ],
        )
        .tag(1, 1)
        .tag(2, 2)
        .tag(3, 3)
        .sheet("Archive", &[&["id", "name", "qty"]])
        .build()
}
