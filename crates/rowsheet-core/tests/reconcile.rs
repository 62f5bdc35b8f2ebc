use rowsheet_common::{ErrorKind, Record};
use rowsheet_core::{Reconciler, RowOrchestrator, UntaggedRow};
use rowsheet_gateway::{MemoryStore, Operation, RemoteError};
use rowsheet_testkit::{empty_inventory, inventory, DocumentBuilder, DOC};

#[test]
fn clean_sheet_reports_nothing() {
    let store = inventory();
    let report = Reconciler::new(&store, DOC).scan(0).unwrap();
    assert!(report.is_clean(), "{report:?}");
}

#[test]
fn orphan_row_from_failed_tagging_is_adopted() {
    let store = empty_inventory();
    store.fail_next(Operation::BatchMutate, RemoteError::new(500, "boom"));
    RowOrchestrator::new(&store, DOC)
        .create_or_update(0, &Record::new().with("id", "8").with("name", "lime"))
        .unwrap_err();

    let reconciler = Reconciler::new(&store, DOC);
    let report = reconciler.scan(0).unwrap();
    assert_eq!(
        report.untagged_rows,
        vec![UntaggedRow {
            row: 1,
            stable_id: Some(8)
        }]
    );

    let outcome = reconciler.repair(0).unwrap();
    assert_eq!(outcome.adopted.len(), 1);
    assert_eq!(outcome.adopted[0].stable_id, 8);

    // The adopted row now behaves like any created row.
    let rows = RowOrchestrator::new(&store, DOC);
    rows.create_or_update(0, &Record::new().with("id", "8").with("name", "lime"))
        .unwrap();
    assert_eq!(rows.get_item(0, 8).unwrap()["name"], "lime");
    assert_eq!(store.rows(DOC, 0).unwrap().len(), 2);
}

#[test]
fn orphan_without_an_id_column_is_attributed_by_column_a() {
    let store = DocumentBuilder::new()
        .sheet("Notes", &[&["title", "body"]])
        .build();
    store.fail_next(Operation::BatchMutate, RemoteError::new(500, "boom"));
    RowOrchestrator::new(&store, DOC)
        .create_or_update(0, &Record::new().with("id", "12").with("title", "hello"))
        .unwrap_err();

    let reconciler = Reconciler::new(&store, DOC);
    let report = reconciler.scan(0).unwrap();
    assert_eq!(
        report.untagged_rows,
        vec![UntaggedRow {
            row: 1,
            stable_id: Some(12)
        }]
    );
    let outcome = reconciler.repair(0).unwrap();
    assert_eq!(outcome.adopted.len(), 1);
    assert_eq!(outcome.adopted[0].stable_id, 12);
    assert_eq!(outcome.adopted[0].row(), 1);
}

#[test]
fn unknown_sheet_is_not_found() {
    let store = inventory();
    let err = Reconciler::new(&store, DOC).scan(42).unwrap_err();
    assert_eq!(err, ErrorKind::NotFound);
}

#[test]
fn placeholder_rows_are_reported_but_kept() {
    let store = empty_inventory();
    store.fail_next(Operation::WriteRange, RemoteError::new(500, "boom"));
    RowOrchestrator::new(&store, DOC)
        .create_or_update(0, &Record::new().with("id", "3"))
        .unwrap_err();

    let reconciler = Reconciler::new(&store, DOC);
    let outcome = reconciler.repair(0).unwrap();
    assert_eq!(outcome.report.unwritten_tags.len(), 1);
    assert!(outcome.is_noop());
    assert_eq!(store.metadata(DOC).unwrap().len(), 1);
}

#[test]
fn duplicate_bindings_keep_the_topmost_row() {
    let store: MemoryStore = DocumentBuilder::new()
        .sheet(
            "Inventory",
            &[
                &["id", "name"],
                &["5", "first"],
                &["6", "other"],
                &["5", "second"],
                &["5", "third"],
            ],
        )
        .tag(5, 1)
        .tag(6, 2)
        .tag(5, 3)
        .tag(5, 4)
        .build();

    let reconciler = Reconciler::new(&store, DOC);
    let outcome = reconciler.repair(0).unwrap();
    assert_eq!(outcome.report.duplicate_ids, vec![5]);
    let removed: Vec<_> = outcome.removed.iter().map(|t| t.row()).collect();
    assert_eq!(removed, vec![3, 4]);

    let rows = store.rows(DOC, 0).unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[1], vec!["5", "first"]);
    assert_eq!(rows[2], vec!["6", "other"]);
    assert_eq!(
        RowOrchestrator::new(&store, DOC).get_item(0, 6).unwrap()["name"],
        "other"
    );
}

#[test]
fn second_repair_is_a_no_op() {
    let store: MemoryStore = DocumentBuilder::new()
        .sheet(
            "Inventory",
            &[&["id", "name"], &["5", "a"], &["7", "orphan"], &["5", "b"]],
        )
        .tag(5, 1)
        .tag(5, 3)
        .build();

    let reconciler = Reconciler::new(&store, DOC);
    let first = reconciler.repair(0).unwrap();
    assert_eq!(first.adopted.len(), 1);
    assert_eq!(first.removed.len(), 1);

    store.clear_calls();
    let second = reconciler.repair(0).unwrap();
    assert!(second.is_noop());
    assert!(second.report.is_clean(), "{:?}", second.report);
    assert!(store.calls().iter().all(|op| !op.is_write()));
}
