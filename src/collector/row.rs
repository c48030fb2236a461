//! Result rows as returned by a [`Session`](crate::collector::Session).
//!
//! Cells are kept in the driver's textual rendering so the same decoding rules
//! apply to every backend. `NULL` is `None`.

use crate::collector::CollectorError;

/// One result row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<Option<String>>,
}

impl Row {
    pub fn new(cells: Vec<Option<String>>) -> Self {
        Self { cells }
    }

    /// Build a row with no `NULL` cells.
    pub fn from_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(values.into_iter().map(|v| Some(v.into())).collect())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Fail unless the row has exactly `expected` columns.
    pub fn expect_columns(&self, expected: usize) -> Result<(), CollectorError> {
        if self.cells.len() != expected {
            return Err(CollectorError::decode(
                self.cells.len(),
                format!("expected {} columns, got {}", expected, self.cells.len()),
            ));
        }
        Ok(())
    }

    /// Text value of a column. `NULL` decodes as the empty string.
    pub fn text(&self, column: usize) -> Result<&str, CollectorError> {
        match self.cells.get(column) {
            Some(cell) => Ok(cell.as_deref().unwrap_or("")),
            None => Err(CollectorError::decode(column, "column out of range")),
        }
    }

    /// Numeric value of a column. `NULL` and non-numeric text are errors.
    pub fn number(&self, column: usize) -> Result<f64, CollectorError> {
        let cell = self
            .cells
            .get(column)
            .ok_or_else(|| CollectorError::decode(column, "column out of range"))?;
        let raw = cell
            .as_deref()
            .ok_or_else(|| CollectorError::decode(column, "unexpected NULL"))?;

        raw.trim()
            .parse::<f64>()
            .map_err(|_| CollectorError::decode(column, format!("not a number: '{}'", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_accepts_oracle_renderings() {
        let row = Row::from_values([".5", "-3", "1E+10", " 42 "]);
        assert_eq!(row.number(0).unwrap(), 0.5);
        assert_eq!(row.number(1).unwrap(), -3.0);
        assert_eq!(row.number(2).unwrap(), 1e10);
        assert_eq!(row.number(3).unwrap(), 42.0);
    }

    #[test]
    fn test_number_rejects_null_and_text() {
        let row = Row::new(vec![None, Some("abc".to_string())]);
        assert!(matches!(row.number(0), Err(CollectorError::Decode { column: 0, .. })));
        assert!(row.number(1).unwrap_err().to_string().contains("not a number"));
        assert!(row.number(2).unwrap_err().to_string().contains("out of range"));
    }

    #[test]
    fn test_text_null_is_empty() {
        let row = Row::new(vec![None, Some("USERS".to_string())]);
        assert_eq!(row.text(0).unwrap(), "");
        assert_eq!(row.text(1).unwrap(), "USERS");
    }

    #[test]
    fn test_expect_columns() {
        let row = Row::from_values(["a", "1"]);
        assert!(row.expect_columns(2).is_ok());
        assert!(row.expect_columns(3).is_err());
    }
}
