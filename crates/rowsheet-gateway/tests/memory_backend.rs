use rowsheet_gateway::{
    DataFilter, DocumentGateway, GridRange, MemoryStore, MetadataLookup, MutationReply, Operation,
    RemoteError, RowSpan, StructuralRequest, ID_METADATA_KEY,
};

const DOC: &str = "doc";

fn seeded() -> MemoryStore {
    let store = MemoryStore::new();
    store.add_sheet(DOC, "Sheet1");
    store
        .set_rows(
            DOC,
            0,
            vec![
                vec!["id", "name", "qty"],
                vec!["1", "apple", "3"],
                vec!["2", "pear", ""],
                vec!["3", "plum", "9"],
            ],
        )
        .unwrap();
    store
}

fn tag(store: &MemoryStore, id: &str, row: u32) -> i64 {
    let replies = store
        .batch_mutate(
            DOC,
            vec![StructuralRequest::CreateMetadata {
                key: ID_METADATA_KEY.into(),
                value: id.into(),
                location: RowSpan::single(0, row),
            }],
        )
        .unwrap();
    match &replies[0] {
        MutationReply::CreatedMetadata(m) => m.metadata_id,
        other => panic!("unexpected reply {other:?}"),
    }
}

#[test]
fn sheets_are_listed_in_tab_order() {
    let store = seeded();
    store.add_sheet(DOC, "Archive");
    let sheets = store.sheets(DOC).unwrap();
    let titles: Vec<_> = sheets.iter().map(|s| (s.title.as_str(), s.index, s.sheet_id)).collect();
    assert_eq!(titles, vec![("Sheet1", 0, 0), ("Archive", 1, 1)]);
}

#[test]
fn unknown_document_and_sheet_statuses() {
    let store = seeded();
    assert_eq!(store.sheets("nope").unwrap_err().status, Some(404));
    let err = store
        .get_by_filter(DOC, &[GridRange::sheet(42).into()])
        .unwrap_err();
    assert_eq!(err.status, Some(400));
    let err = store.get_range(DOC, "Missing!A1").unwrap_err();
    assert_eq!(err.status, Some(400));
}

#[test]
fn reads_trim_trailing_blanks() {
    let store = seeded();
    let header = store
        .get_by_filter(DOC, &[GridRange::header(0).into()])
        .unwrap();
    assert_eq!(header[0].values, vec![vec!["id", "name", "qty"]]);

    let row = store.get_range(DOC, "Sheet1!A3:C3").unwrap();
    assert_eq!(row.range, "Sheet1!A3:C3");
    assert_eq!(row.values, vec![vec!["2", "pear"]]);

    let data = store
        .get_by_filter(DOC, &[GridRange::data_rows(0).into()])
        .unwrap();
    assert_eq!(data[0].values.len(), 3);
}

#[test]
fn open_ended_reads_stop_at_stored_rows() {
    let store = seeded();
    let read = store.get_range(DOC, "Sheet1!A1:B1000000000").unwrap();
    assert_eq!(read.values.len(), 4);
    assert_eq!(read.values[3], vec!["3", "plum"]);
}

#[test]
fn append_lands_after_last_non_empty_row() {
    let store = seeded();
    store
        .write_range(DOC, "Sheet1!A6", vec![vec![String::new()]])
        .unwrap();
    let outcome = store
        .append_rows(DOC, "Sheet1!A:A", vec![vec!["4".into()]])
        .unwrap();
    assert_eq!(outcome.updated_range, "Sheet1!A5");
    assert_eq!(outcome.first_row().unwrap(), 4);
    assert_eq!(store.rows(DOC, 0).unwrap()[4], vec!["4"]);
}

#[test]
fn write_range_rejects_overflowing_values() {
    let store = seeded();
    let err = store
        .write_range(DOC, "Sheet1!A2:B2", vec![vec!["a".into(), "b".into(), "c".into()]])
        .unwrap_err();
    assert_eq!(err.status, Some(400));
    assert_eq!(store.rows(DOC, 0).unwrap()[1], vec!["1", "apple", "3"]);
}

#[test]
fn metadata_follows_rows_and_dies_with_them() {
    let store = seeded();
    tag(&store, "1", 1);
    tag(&store, "2", 2);
    let plum = tag(&store, "3", 3);

    store
        .batch_mutate(DOC, vec![StructuralRequest::DeleteRows(RowSpan::single(0, 1))])
        .unwrap();

    let remaining = store.metadata(DOC).unwrap();
    let values: Vec<_> = remaining.iter().map(|m| m.value.as_str()).collect();
    assert_eq!(values, vec!["2", "3"]);

    let found = store
        .search_metadata(DOC, &[MetadataLookup::key(ID_METADATA_KEY).value("3").in_sheet(0)])
        .unwrap();
    assert_eq!(found[0].metadata_id, plum);
    assert_eq!(found[0].location, RowSpan::single(0, 2));

    let rows = store
        .get_by_filter(DOC, &[DataFilter::from(MetadataLookup::by_id(plum))])
        .unwrap();
    assert_eq!(rows[0].values, vec![vec!["3", "plum", "9"]]);
}

#[test]
fn batch_mutate_is_all_or_nothing() {
    let store = seeded();
    let err = store
        .batch_mutate(
            DOC,
            vec![
                StructuralRequest::CreateMetadata {
                    key: ID_METADATA_KEY.into(),
                    value: "1".into(),
                    location: RowSpan::single(0, 1),
                },
                StructuralRequest::DeleteRows(RowSpan::single(99, 0)),
            ],
        )
        .unwrap_err();
    assert_eq!(err.status, Some(400));
    assert!(store.metadata(DOC).unwrap().is_empty());
}

#[test]
fn injected_failures_fire_once_and_are_logged() {
    let store = seeded();
    store.fail_next(Operation::AppendRows, RemoteError::new(503, "backend unavailable"));
    let err = store
        .append_rows(DOC, "Sheet1!A:A", vec![vec!["9".into()]])
        .unwrap_err();
    assert_eq!(err.message, "backend unavailable");
    assert_eq!(store.rows(DOC, 0).unwrap().len(), 4);

    store
        .append_rows(DOC, "Sheet1!A:A", vec![vec!["9".into()]])
        .unwrap();
    assert_eq!(store.calls(), vec![Operation::AppendRows, Operation::AppendRows]);
    assert!(store.calls().iter().all(|op| op.is_write()));
}

#[test]
fn snapshot_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    {
        let store = MemoryStore::with_snapshot(&path).unwrap();
        store.add_sheet(DOC, "Sheet1");
        store.set_rows(DOC, 0, vec![vec!["id", "name"]]).unwrap();
        store
            .append_rows(DOC, "Sheet1!A:A", vec![vec!["7".into()]])
            .unwrap();
        tag(&store, "7", 1);
    }
    let reopened = MemoryStore::with_snapshot(&path).unwrap();
    assert_eq!(reopened.rows(DOC, 0).unwrap(), vec![vec!["id", "name"], vec!["7"]]);
    assert_eq!(reopened.metadata(DOC).unwrap()[0].location, RowSpan::single(0, 1));
}

#[test]
fn snapshot_rejects_unknown_versions() {
    let err = MemoryStore::from_json_str(r#"{"version": 99, "documents": {}}"#)
        .err()
        .unwrap();
    assert!(err.to_string().contains("99"));
}

#[test]
fn concurrent_writers_leave_a_complete_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    let store = MemoryStore::with_snapshot(&path).unwrap();
    store.add_sheet(DOC, "Sheet1");
    store.set_rows(DOC, 0, vec![vec!["id", "n"]]).unwrap();

    for round in 0..5 {
        std::thread::scope(|scope| {
            for writer in 0..8u32 {
                let store = &store;
                scope.spawn(move || {
                    let row = writer + 2;
                    for i in 0..40 {
                        // Values grow and shrink so stale tails would show up as bad JSON.
                        let padding = "x".repeat(((i * 7 + writer as usize) % 13) * 5);
                        store
                            .write_range(
                                DOC,
                                &format!("Sheet1!A{row}:B{row}"),
                                vec![vec![format!("{round}-{writer}"), format!("{i}{padding}")]],
                            )
                            .unwrap();
                    }
                });
            }
        });

        let reopened = MemoryStore::open_path(&path).unwrap();
        assert_eq!(reopened.rows(DOC, 0).unwrap(), store.rows(DOC, 0).unwrap());
    }
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}
