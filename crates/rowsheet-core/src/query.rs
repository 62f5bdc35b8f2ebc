use std::collections::{BTreeMap, BTreeSet};

use rowsheet_common::RowObject;

/// Column name to accepted values.
///
/// A row matches when, for every column in the query, its value is one of
/// that column's accepted values. Alternatives within a column are OR-ed,
/// columns are AND-ed. The empty query matches every row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuerySpec {
    columns: BTreeMap<String, BTreeSet<String>>,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from query-string pairs. Each value is split on `,`; repeated
    /// parameters for one column add to its alternatives.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut spec = Self::new();
        for (column, value) in pairs {
            spec.accept(column, value.as_ref().split(','));
        }
        spec
    }

    /// Add accepted values for `column`.
    pub fn accept<S: Into<String>>(
        &mut self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = S>,
    ) {
        self.columns
            .entry(column.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// A column the row does not have never matches.
    pub fn matches(&self, row: &RowObject) -> bool {
        self.columns.iter().all(|(column, accepted)| {
            row.get(column)
                .is_some_and(|value| accepted.contains(value))
        })
    }

    pub fn filter(&self, rows: Vec<RowObject>) -> Vec<RowObject> {
        rows.into_iter().filter(|row| self.matches(row)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> RowObject {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn and_across_columns_or_within() {
        let spec = QuerySpec::from_pairs([("a", "1,2"), ("b", "x")]);
        assert!(spec.matches(&row(&[("a", "1"), ("b", "x")])));
        assert!(spec.matches(&row(&[("a", "2"), ("b", "x")])));
        assert!(!spec.matches(&row(&[("a", "3"), ("b", "x")])));
        assert!(!spec.matches(&row(&[("a", "1"), ("b", "y")])));
    }

    #[test]
    fn repeated_parameters_union() {
        let spec = QuerySpec::from_pairs([("a", "1"), ("a", "2")]);
        assert!(spec.matches(&row(&[("a", "2")])));
        assert_eq!(spec.columns().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn unknown_column_never_matches() {
        let spec = QuerySpec::from_pairs([("missing", "")]);
        assert!(!spec.matches(&row(&[("a", "")])));
    }

    #[test]
    fn empty_alternative_matches_empty_cell() {
        let spec = QuerySpec::from_pairs([("note", "")]);
        assert!(spec.matches(&row(&[("note", "")])));
        assert!(!spec.matches(&row(&[("note", "x")])));
    }

    #[test]
    fn empty_spec_matches_everything() {
        let spec = QuerySpec::new();
        assert!(spec.is_empty());
        assert_eq!(spec.filter(vec![row(&[]), row(&[("a", "1")])]).len(), 2);
    }
}
