//! Output formatting for opcmap (table, json, csv)

use clap::ValueEnum;
use colored::Colorize;
use opcmap_client::Table as DataTable;
use serde::Serialize;
use serde_json::Value;
use tabled::builder::Builder;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Table => "table",
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
        }
    }

    /// Parse a format name from the config file
    pub fn from_name(name: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(name, true).ok()
    }
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self { format, quiet }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            eprintln!("{}", msg);
        }
    }

    /// Print a warning message
    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    /// Print an error message
    pub fn error(&self, msg: &str) {
        eprintln!("{}", msg.red());
    }

    /// Print typed rows in the configured format
    pub fn print<T: Tabled + Serialize>(&self, data: &[T]) {
        match self.format {
            OutputFormat::Table => {
                if data.is_empty() {
                    self.info("No data");
                } else {
                    println!("{}", Table::new(data));
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(data).unwrap_or_else(|_| "[]".to_string())
                );
            }
            OutputFormat::Csv => {
                let records: Vec<Value> = data
                    .iter()
                    .filter_map(|d| serde_json::to_value(d).ok())
                    .collect();
                print!("{}", records_to_csv(&records));
            }
        }
    }

    /// Print a column/row table in the configured format
    pub fn print_table(&self, table: &DataTable) {
        match self.format {
            OutputFormat::Table => {
                if table.is_empty() {
                    self.info("No data");
                } else {
                    println!("{}", render_table(table));
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&table.records())
                        .unwrap_or_else(|_| "[]".to_string())
                );
            }
            OutputFormat::Csv => print!("{}", table_to_csv(table)),
        }
    }

    /// Print an arbitrary JSON document
    pub fn print_value(&self, value: &Value) {
        match (self.format, value) {
            (OutputFormat::Json, _) => println!(
                "{}",
                serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
            ),
            (_, Value::Array(items)) if items.iter().all(Value::is_object) => {
                let records: Vec<_> = items.iter().filter_map(Value::as_object).cloned().collect();
                self.print_table(&DataTable::from_records(&records));
            }
            (_, Value::Array(items)) => {
                for item in items {
                    println!("{}", format_cell(item));
                }
            }
            (_, other) => println!("{}", format_cell(other)),
        }
    }

    /// Print key-value pairs
    pub fn print_kv(&self, pairs: &[(String, String)]) {
        match self.format {
            OutputFormat::Table => {
                for (key, value) in pairs {
                    println!("{}: {}", key.bold(), value);
                }
            }
            OutputFormat::Json => {
                let map: serde_json::Map<String, Value> = pairs
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&map).unwrap_or_else(|_| "{}".to_string())
                );
            }
            OutputFormat::Csv => {
                let keys: Vec<String> = pairs.iter().map(|(k, _)| escape_csv(k)).collect();
                println!("{}", keys.join(","));
                let values: Vec<String> = pairs.iter().map(|(_, v)| escape_csv(v)).collect();
                println!("{}", values.join(","));
            }
        }
    }
}

/// ASCII rendering of a column/row table
pub fn render_table(table: &DataTable) -> String {
    let mut builder = Builder::default();
    builder.push_record(table.columns.iter().cloned());
    for row in &table.rows {
        builder.push_record(row.iter().map(format_cell));
    }
    builder.build().to_string()
}

/// CSV text of a column/row table, header first
pub fn table_to_csv(table: &DataTable) -> String {
    let mut out = String::new();
    let header: Vec<String> = table.columns.iter().map(|c| escape_csv(c)).collect();
    out.push_str(&header.join(","));
    out.push('\n');
    for row in &table.rows {
        let cells: Vec<String> = row.iter().map(|v| escape_csv(&csv_cell(v))).collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}

fn records_to_csv(records: &[Value]) -> String {
    let maps: Vec<_> = records.iter().filter_map(Value::as_object).cloned().collect();
    if maps.is_empty() {
        return String::new();
    }
    table_to_csv(&DataTable::from_records(&maps))
}

/// Format a JSON value for display
pub fn format_cell(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(format_cell).collect();
            items.join(", ")
        }
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

fn csv_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Escape a value for CSV output
fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Object type display for the object-types command
#[derive(Debug, Tabled, Serialize)]
pub struct ObjectTypeRow {
    #[tabled(rename = "Id")]
    pub id: String,
    #[tabled(rename = "BrowseName")]
    pub browse_name: String,
    #[tabled(rename = "Name")]
    pub name: String,
}
