use std::sync::Arc;

use serde::Serialize;

use super::result_set::ResultSet;
use crate::driver::DriverCursor;
use crate::types::CellType;

/// Status reported when the driver has no native status message.
pub const STATUS_OK: &str = "OK";

/// Name and logical type of a result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMeta {
    pub name: String,
    pub cell_type: CellType,
}

/// Normalized outcome of one statement: status, column metadata and rows.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    status: String,
    columns: Vec<ColumnMeta>,
    rows: ResultSet,
}

impl QueryResult {
    /// Convert a driver cursor.
    ///
    /// With `fetch` every row and the column metadata are materialized;
    /// without it only the status is kept and the row set is empty.
    #[must_use]
    pub fn from_cursor(cursor: DriverCursor, fetch: bool) -> Self {
        let status = status_of(&cursor);
        if !fetch {
            return Self {
                status,
                columns: Vec::new(),
                rows: ResultSet::default(),
            };
        }

        let columns: Vec<ColumnMeta> = cursor
            .columns
            .iter()
            .enumerate()
            .map(|(idx, col)| ColumnMeta {
                name: col.name.clone(),
                cell_type: col
                    .cell_type
                    .or_else(|| infer_cell_type(&cursor.rows, idx))
                    .unwrap_or(CellType::Unknown),
            })
            .collect();

        let mut rows = ResultSet::with_capacity(cursor.rows.len());
        rows.set_column_names(Arc::new(
            columns.iter().map(|col| col.name.clone()).collect(),
        ));
        for row in cursor.rows {
            rows.add_row_values(row);
        }

        Self {
            status,
            columns,
            rows,
        }
    }

    #[must_use]
    pub fn status(&self) -> &str {
        &self.status
    }

    #[must_use]
    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &ResultSet {
        &self.rows
    }

    /// Split into the `(status, rows)` pair hosts usually want.
    #[must_use]
    pub fn into_parts(self) -> (String, ResultSet) {
        (self.status, self.rows)
    }
}

/// The cursor's native status, or [`STATUS_OK`] when the driver has none.
#[must_use]
pub fn status_of(cursor: &DriverCursor) -> String {
    cursor
        .status_message
        .clone()
        .unwrap_or_else(|| STATUS_OK.to_string())
}

// first non-null value decides
fn infer_cell_type(rows: &[Vec<crate::types::RowValues>], idx: usize) -> Option<CellType> {
    rows.iter()
        .filter_map(|row| row.get(idx))
        .find_map(CellType::of)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::ColumnInfo;
    use crate::types::RowValues;

    fn cursor() -> DriverCursor {
        DriverCursor {
            columns: vec![
                ColumnInfo::new("id", Some(CellType::Integer)),
                ColumnInfo::new("note", None),
                ColumnInfo::new("empty", None),
            ],
            rows: vec![
                vec![RowValues::Int(1), RowValues::Null, RowValues::Null],
                vec![RowValues::Int(2), RowValues::Text("x".into()), RowValues::Null],
            ],
            status_message: None,
        }
    }

    #[test]
    fn fetch_materializes_rows_and_types() {
        let result = QueryResult::from_cursor(cursor(), true);
        assert_eq!(result.status(), STATUS_OK);
        let types: Vec<CellType> = result.columns().iter().map(|c| c.cell_type).collect();
        assert_eq!(types, vec![CellType::Integer, CellType::Text, CellType::Unknown]);
        assert_eq!(result.rows().len(), 2);
        assert_eq!(
            result.rows().results[1].get("note"),
            Some(&RowValues::Text("x".into()))
        );
    }

    #[test]
    fn without_fetch_only_status_survives() {
        let mut cursor = cursor();
        cursor.status_message = Some("INSERT 2".into());
        let result = QueryResult::from_cursor(cursor, false);
        assert_eq!(result.status(), "INSERT 2");
        assert!(result.columns().is_empty());
        assert!(result.rows().is_empty());
    }

    #[test]
    fn row_count_is_the_fetched_row_count() {
        let (_, rows) = QueryResult::from_cursor(cursor(), true).into_parts();
        assert_eq!(rows.rows_affected, 2);
        let (_, rows) = QueryResult::from_cursor(cursor(), false).into_parts();
        assert_eq!(rows.rows_affected, 0);
    }
}
