//! Row spans and A1 range notation.
//!
//! All indices here are **zero-based** and spans are **end-exclusive**, the
//! same convention the document engine uses for dimension ranges. A1 text
//! is one-based and end-inclusive; the conversion happens only in
//! [`A1Range::parse`] and its `Display` impl.

use std::error::Error;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::sheet::SheetId;

/// Largest column reachable with three A1 letters (`ZZZ`).
const COL_LIMIT: u32 = 18_278;
/// Row count used when rendering an open-ended row range.
const ROW_LIMIT: u32 = 10_000_000;

/// A contiguous run of rows within one sheet.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowSpan {
    pub sheet_id: SheetId,
    pub start: u32,
    pub end: u32,
}

impl RowSpan {
    pub fn new(sheet_id: SheetId, start: u32, end: u32) -> Result<Self, A1ParseError> {
        if start >= end {
            return Err(A1ParseError::RangeOrder);
        }
        Ok(Self {
            sheet_id,
            start,
            end,
        })
    }

    /// The span `[row, row + 1)`.
    pub fn single(sheet_id: SheetId, row: u32) -> Self {
        Self {
            sheet_id,
            start: row,
            end: row + 1,
        }
    }

    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, row: u32) -> bool {
        row >= self.start && row < self.end
    }
}

impl fmt::Display for RowSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sheet {} rows [{}, {})", self.sheet_id, self.start, self.end)
    }
}

/// Errors raised while parsing A1 text.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum A1ParseError {
    Empty,
    /// A quoted sheet name was never closed, or was followed by something other than `!`.
    BadSheetName(String),
    /// The cell part is not of the form `A1`, `A`, `1` or a `:` pair of those.
    BadReference(String),
    /// Start lies below/right of the end.
    RangeOrder,
}

impl fmt::Display for A1ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            A1ParseError::Empty => write!(f, "empty range"),
            A1ParseError::BadSheetName(s) => write!(f, "malformed sheet name in `{s}`"),
            A1ParseError::BadReference(s) => write!(f, "malformed cell reference `{s}`"),
            A1ParseError::RangeOrder => {
                write!(f, "range must be ordered so the start is above/left of the end")
            }
        }
    }
}

impl Error for A1ParseError {}

/// A parsed A1 range. `None` ends are open (to the last row/column).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct A1Range {
    pub sheet: Option<String>,
    pub start_row: u32,
    pub end_row: Option<u32>,
    pub start_col: u32,
    pub end_col: Option<u32>,
}

impl A1Range {
    /// Every cell of a sheet.
    pub fn sheet(title: impl Into<String>) -> Self {
        Self {
            sheet: Some(title.into()),
            start_row: 0,
            end_row: None,
            start_col: 0,
            end_col: None,
        }
    }

    /// One row, columns `A` through the `width`-th column.
    pub fn row(title: impl Into<String>, row: u32, width: u32) -> Self {
        Self {
            sheet: Some(title.into()),
            start_row: row,
            end_row: Some(row + 1),
            start_col: 0,
            end_col: Some(width.max(1)),
        }
    }

    pub fn sheet_name(&self) -> Option<&str> {
        self.sheet.as_deref()
    }

    pub fn parse(input: &str) -> Result<Self, A1ParseError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(A1ParseError::Empty);
        }
        let (sheet, cells) = split_sheet(input)?;
        match (sheet, cells) {
            (Some(sheet), None) => Ok(Self::sheet(sheet)),
            (Some(sheet), Some(cells)) => {
                let mut range = parse_cells(cells)?;
                range.sheet = Some(sheet);
                Ok(range)
            }
            // A bare word that is not a reference names a sheet.
            (None, Some(cells)) => match parse_cells(cells) {
                Ok(range) => Ok(range),
                Err(A1ParseError::RangeOrder) => Err(A1ParseError::RangeOrder),
                Err(_) => Ok(Self::sheet(cells)),
            },
            (None, None) => Err(A1ParseError::Empty),
        }
    }

    fn is_single_cell(&self) -> bool {
        self.end_row == Some(self.start_row + 1) && self.end_col == Some(self.start_col + 1)
    }
}

impl fmt::Display for A1Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full_rows = self.start_row == 0 && self.end_row.is_none();
        let full_cols = self.start_col == 0 && self.end_col.is_none();

        if let Some(sheet) = &self.sheet {
            f.write_str(&quote_sheet_title(sheet))?;
            if full_rows && full_cols {
                return Ok(());
            }
            f.write_str("!")?;
        }

        if full_cols {
            let end = self.end_row.unwrap_or(ROW_LIMIT);
            return write!(f, "{}:{}", self.start_row + 1, end);
        }
        if full_rows {
            let end = self.end_col.unwrap_or(COL_LIMIT);
            return write!(
                f,
                "{}:{}",
                col_to_letters(self.start_col),
                col_to_letters(end - 1)
            );
        }

        write!(f, "{}{}", col_to_letters(self.start_col), self.start_row + 1)?;
        if self.is_single_cell() {
            return Ok(());
        }
        let end_col = self.end_col.map(|c| col_to_letters(c - 1)).unwrap_or_default();
        let end_row = self.end_row.map(|r| r.to_string()).unwrap_or_default();
        if end_col.is_empty() && end_row.is_empty() {
            return Ok(());
        }
        write!(f, ":{end_col}{end_row}")
    }
}

/// Zero-based column index to letters (`0 -> A`, `26 -> AA`).
pub fn col_to_letters(col: u32) -> String {
    let mut n = col + 1;
    let mut out = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        out.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Letters to zero-based column index. Case-insensitive; at most three letters.
pub fn letters_to_col(letters: &str) -> Option<u32> {
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    let mut n: u32 = 0;
    for b in letters.bytes() {
        if !b.is_ascii_alphabetic() {
            return None;
        }
        n = n * 26 + u32::from(b.to_ascii_uppercase() - b'A' + 1);
    }
    Some(n - 1)
}

/// Quote a sheet title for use in A1 text when it is not a plain identifier.
pub fn quote_sheet_title(title: &str) -> String {
    let plain = title
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && title.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && parse_cells(title).is_err();
    if plain {
        title.to_string()
    } else {
        format!("'{}'", title.replace('\'', "''"))
    }
}

fn split_sheet(input: &str) -> Result<(Option<String>, Option<&str>), A1ParseError> {
    if let Some(rest) = input.strip_prefix('\'') {
        let mut name = String::new();
        let mut chars = rest.char_indices().peekable();
        while let Some((idx, c)) = chars.next() {
            if c != '\'' {
                name.push(c);
                continue;
            }
            if matches!(chars.peek(), Some((_, '\''))) {
                chars.next();
                name.push('\'');
                continue;
            }
            let after = &rest[idx + 1..];
            return if after.is_empty() {
                Ok((Some(name), None))
            } else if let Some(cells) = after.strip_prefix('!') {
                Ok((Some(name), Some(cells)))
            } else {
                Err(A1ParseError::BadSheetName(input.to_string()))
            };
        }
        return Err(A1ParseError::BadSheetName(input.to_string()));
    }

    match input.rfind('!') {
        Some(pos) => Ok((Some(input[..pos].to_string()), Some(&input[pos + 1..]))),
        None => Ok((None, Some(input))),
    }
}

/// `(col, row)` of one side of a reference, either part optional.
fn parse_ref(part: &str) -> Option<(Option<u32>, Option<u32>)> {
    let split = part
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(part.len());
    let (letters, digits) = part.split_at(split);
    if letters.is_empty() && digits.is_empty() {
        return None;
    }
    let col = if letters.is_empty() {
        None
    } else {
        Some(letters_to_col(letters)?)
    };
    let row = if digits.is_empty() {
        None
    } else {
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let n: u32 = digits.parse().ok()?;
        if n == 0 {
            return None;
        }
        Some(n - 1)
    };
    Some((col, row))
}

fn parse_cells(cells: &str) -> Result<A1Range, A1ParseError> {
    let bad = || A1ParseError::BadReference(cells.to_string());
    let (first, second) = match cells.split_once(':') {
        Some((a, b)) => (a, Some(b)),
        None => (cells, None),
    };
    let (c0, r0) = parse_ref(first).ok_or_else(bad)?;
    let (c1, r1) = match second {
        Some(second) => parse_ref(second).ok_or_else(bad)?,
        None => (c0, r0),
    };
    // `A` or `1` alone is not a range.
    if second.is_none() && (c0.is_none() || r0.is_none()) {
        return Err(bad());
    }

    let range = A1Range {
        sheet: None,
        start_row: r0.unwrap_or(0),
        end_row: r1.map(|r| r + 1),
        start_col: c0.unwrap_or(0),
        end_col: c1.map(|c| c + 1),
    };
    if range.end_row.is_some_and(|end| end <= range.start_row)
        || range.end_col.is_some_and(|end| end <= range.start_col)
    {
        return Err(A1ParseError::RangeOrder);
    }
    Ok(range)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letters_roundtrip() {
        assert_eq!(col_to_letters(0), "A");
        assert_eq!(col_to_letters(25), "Z");
        assert_eq!(col_to_letters(26), "AA");
        assert_eq!(col_to_letters(701), "ZZ");
        assert_eq!(col_to_letters(702), "AAA");
        for col in [0, 1, 25, 26, 27, 51, 52, 701, 702, 16_383] {
            assert_eq!(letters_to_col(&col_to_letters(col)), Some(col));
        }
        assert_eq!(letters_to_col("abcd"), None);
        assert_eq!(letters_to_col(""), None);
    }

    #[test]
    fn parse_qualified_ranges() {
        let r = A1Range::parse("Sheet1!A2:C5").unwrap();
        assert_eq!(r.sheet_name(), Some("Sheet1"));
        assert_eq!((r.start_row, r.end_row), (1, Some(5)));
        assert_eq!((r.start_col, r.end_col), (0, Some(3)));

        let r = A1Range::parse("'My Data'!B:B").unwrap();
        assert_eq!(r.sheet_name(), Some("My Data"));
        assert_eq!((r.start_row, r.end_row), (0, None));
        assert_eq!((r.start_col, r.end_col), (1, Some(2)));

        let r = A1Range::parse("'it''s'!3:4").unwrap();
        assert_eq!(r.sheet_name(), Some("it's"));
        assert_eq!((r.start_row, r.end_row), (2, Some(4)));
        assert_eq!((r.start_col, r.end_col), (0, None));
    }

    #[test]
    fn bare_words_name_sheets() {
        let r = A1Range::parse("Inventory").unwrap();
        assert_eq!(r, A1Range::sheet("Inventory"));
        let r = A1Range::parse("B7").unwrap();
        assert_eq!(r.sheet, None);
        assert_eq!((r.start_row, r.start_col), (6, 1));
    }

    #[test]
    fn rejects_malformed() {
        assert_eq!(A1Range::parse(""), Err(A1ParseError::Empty));
        assert!(matches!(
            A1Range::parse("'open!A1"),
            Err(A1ParseError::BadSheetName(_))
        ));
        assert!(matches!(
            A1Range::parse("Sheet1!A0"),
            Err(A1ParseError::BadReference(_))
        ));
        assert_eq!(A1Range::parse("Sheet1!C3:A1"), Err(A1ParseError::RangeOrder));
    }

    #[test]
    fn display_renders_canonical_forms() {
        assert_eq!(A1Range::row("Sheet1", 4, 3).to_string(), "Sheet1!A5:C5");
        assert_eq!(A1Range::row("Sheet1", 0, 1).to_string(), "Sheet1!A1");
        assert_eq!(A1Range::sheet("My Data").to_string(), "'My Data'");
        assert_eq!(A1Range::sheet("Sheet1").to_string(), "Sheet1");
        assert_eq!(A1Range::parse("S!2:9").unwrap().to_string(), "S!2:9");
        assert_eq!(A1Range::parse("S!B3:D").unwrap().to_string(), "S!B3:D");
        // `A1` looks like a reference, so the title must be quoted.
        assert_eq!(quote_sheet_title("A1"), "'A1'");
        assert_eq!(quote_sheet_title("Sheet1"), "Sheet1");
    }

    #[test]
    fn row_span_bounds() {
        let span = RowSpan::single(3, 4);
        assert_eq!(span.len(), 1);
        assert!(span.contains(4));
        assert!(!span.contains(5));
        assert_eq!(RowSpan::new(3, 5, 5), Err(A1ParseError::RangeOrder));
    }
}
