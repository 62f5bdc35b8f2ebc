//! Positional cells <-> named fields.
//!
//! A sheet's header row is its [`KeySet`]; position `i` in the key set is
//! column `i` on both the read and the write path. Decoding pads short rows
//! with empty strings, encoding writes exactly one cell per key.

use rowsheet_common::{Record, RowObject};

/// Ordered column names taken from row 0 of a sheet.
pub type KeySet = Vec<String>;

/// Output of [`encode_report`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Encoded {
    /// One cell per key, in key order.
    pub cells: Vec<String>,
    /// Payload fields with no matching key, which are not written anywhere.
    pub ignored: Vec<String>,
}

/// Decode one raw row. Missing trailing cells decode to `""`.
pub fn decode_row(keys: &[String], raw: &[String]) -> RowObject {
    keys.iter()
        .enumerate()
        .map(|(i, key)| (key.clone(), raw.get(i).cloned().unwrap_or_default()))
        .collect()
}

/// Decode every row of a 2-D cell block.
pub fn decode(keys: &[String], raw: &[Vec<String>]) -> Vec<RowObject> {
    raw.iter().map(|row| decode_row(keys, row)).collect()
}

/// Encode a record into cells aligned with `keys`.
///
/// Absent, null and empty fields become empty cells; fields not in `keys`
/// are dropped silently.
pub fn encode(keys: &[String], record: &Record) -> Vec<String> {
    encode_report(keys, record).cells
}

/// [`encode`], also reporting which fields were dropped.
pub fn encode_report(keys: &[String], record: &Record) -> Encoded {
    let cells = keys
        .iter()
        .map(|key| record.get(key).map(|v| v.to_cell()).unwrap_or_default())
        .collect();
    let ignored = record
        .names()
        .filter(|name| !keys.iter().any(|k| k == name))
        .map(str::to_string)
        .collect();
    Encoded { cells, ignored }
}

/// Index of the column that holds the stable id: `id` if present, else column A.
pub fn id_column(keys: &[String]) -> usize {
    keys.iter().position(|k| k == crate::ID_FIELD).unwrap_or(0)
}

/// The one-row block appended by create: the id in its column, nothing else.
pub fn placeholder_row(keys: &[String], id: i64) -> Vec<String> {
    let col = id_column(keys);
    let mut row = vec![String::new(); col + 1];
    row[col] = id.to_string();
    row
}
