#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Engine-assigned sheet identifier. Immutable once the sheet exists.
pub type SheetId = i64;

/// Caller-assigned identifier of a logical row.
pub type StableId = i64;

/// A named tab within a document.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sheet {
    pub title: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub index: i64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub sheet_id: SheetId,
}

impl Sheet {
    pub fn new(title: impl Into<String>, index: i64, sheet_id: SheetId) -> Self {
        Self {
            title: title.into(),
            index,
            sheet_id,
        }
    }
}
