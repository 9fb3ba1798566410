//! Tabular projection of typed rows

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A row type that can be projected into a [`Table`]
pub trait TableRow {
    /// Column names, in output order
    fn columns() -> &'static [&'static str];
    /// Cell values aligned with [`TableRow::columns`]
    fn cells(&self) -> Vec<Value>;
}

/// Column-named tabular value
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Project typed rows; an empty input still carries the column set
    pub fn from_rows<R: TableRow>(rows: &[R]) -> Self {
        Self {
            columns: R::columns().iter().map(|c| c.to_string()).collect(),
            rows: rows.iter().map(TableRow::cells).collect(),
        }
    }

    /// Build from `{column: value}` records.
    ///
    /// Columns are the union of keys in first-seen order; missing cells are null.
    pub fn from_records(records: &[Map<String, Value>]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in records {
            for key in record.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| record.get(c).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    /// Back to `{column: value}` records
    pub fn records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }

    pub fn push_row(&mut self, row: Vec<Value>) {
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All cells of one column
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().filter_map(|r| r.get(idx)).collect())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Shape in which a read operation returns its result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputForm {
    /// Flat list of typed rows
    #[default]
    Rows,
    /// Tabular value
    Table,
}

/// Result of a read in the caller's chosen [`OutputForm`]
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutput<R> {
    Rows(Vec<R>),
    Table(Table),
}

impl<R: TableRow> ReadOutput<R> {
    pub fn project(rows: Vec<R>, form: OutputForm) -> Self {
        match form {
            OutputForm::Rows => ReadOutput::Rows(rows),
            OutputForm::Table => ReadOutput::Table(Table::from_rows(&rows)),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ReadOutput::Rows(rows) => rows.len(),
            ReadOutput::Table(table) => table.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_table(self) -> Table {
        match self {
            ReadOutput::Rows(rows) => Table::from_rows(&rows),
            ReadOutput::Table(table) => table,
        }
    }

    /// Rows, if this output was produced in [`OutputForm::Rows`]
    pub fn into_rows(self) -> Option<Vec<R>> {
        match self {
            ReadOutput::Rows(rows) => Some(rows),
            ReadOutput::Table(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Pair(i64, &'static str);

    impl TableRow for Pair {
        fn columns() -> &'static [&'static str] {
            &["n", "s"]
        }

        fn cells(&self) -> Vec<Value> {
            vec![json!(self.0), json!(self.1)]
        }
    }

    #[test]
    fn test_from_rows() {
        let table = Table::from_rows(&[Pair(1, "a"), Pair(2, "b")]);
        assert_eq!(table.columns, vec!["n", "s"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.column("s").unwrap(), vec![&json!("a"), &json!("b")]);
    }

    #[test]
    fn test_empty_rows_keep_columns() {
        let table = Table::from_rows::<Pair>(&[]);
        assert!(table.is_empty());
        assert_eq!(table.columns.len(), 2);
    }

    #[test]
    fn test_from_records_union_of_keys() {
        let a = json!({"x": 1}).as_object().cloned().unwrap();
        let b = json!({"x": 2, "y": "z"}).as_object().cloned().unwrap();
        let table = Table::from_records(&[a, b]);
        assert_eq!(table.columns, vec!["x", "y"]);
        assert_eq!(table.rows[0], vec![json!(1), Value::Null]);

        let records = table.records();
        assert_eq!(records[1].get("y"), Some(&json!("z")));
    }

    #[test]
    fn test_from_records_keeps_key_order() {
        let record: Map<String, Value> = serde_json::from_str(r#"{"Zone": "N", "Angle": 12.5}"#).unwrap();
        let table = Table::from_records(&[record]);
        assert_eq!(table.columns, vec!["Zone", "Angle"]);
        assert_eq!(table.rows[0], vec![json!("N"), json!(12.5)]);
    }

    #[test]
    fn test_read_output_projection() {
        let out = ReadOutput::project(vec![Pair(1, "a")], OutputForm::Table);
        assert!(matches!(out, ReadOutput::Table(_)));
        assert_eq!(out.len(), 1);

        let out = ReadOutput::project(vec![Pair(1, "a")], OutputForm::Rows);
        assert_eq!(out.into_rows().map(|r| r.len()), Some(1));
    }
}
