//! ODBC driver backend
//!
//! One process-wide ODBC environment; connections borrow it for `'static`.

use std::sync::OnceLock;

use odbc_api::buffers::{AnySlice, BufferDesc, ColumnarAnyBuffer, Indicator};
use odbc_api::parameter::VarWCharBox;
use odbc_api::{
    Connection, ConnectionOptions, Cursor, CursorImpl, DataType, Environment, ResultSetMetadata,
    StatementImpl,
};
use opcmap_core::Table;
use serde_json::Value;
use tracing::debug;

use super::{DriverConnection, DriverEnvironment, SqlParam};
use crate::error::{DbErrorKind, DriverError};

/// Rows fetched per round trip, at most
const BATCH_SIZE: usize = 1000;
/// Bytes of fetch buffer per result set, across all columns
const BUFFER_BYTES: usize = 32 * 1024 * 1024;
/// UTF-16 units reserved for a numeric or temporal cell
const SHORT_TEXT_LEN: usize = 64;
/// UTF-16 units reserved for any other cell; longer values fail the fetch
const MAX_TEXT_LEN: usize = 1024 * 1024;

static ENVIRONMENT: OnceLock<Environment> = OnceLock::new();

fn environment() -> Result<&'static Environment, DriverError> {
    if let Some(env) = ENVIRONMENT.get() {
        return Ok(env);
    }
    let env = Environment::new().map_err(map_odbc_error)?;
    Ok(ENVIRONMENT.get_or_init(|| env))
}

/// The host ODBC driver manager
#[derive(Debug, Default, Clone, Copy)]
pub struct OdbcEnvironment;

impl DriverEnvironment for OdbcEnvironment {
    fn drivers(&self) -> Result<Vec<String>, DriverError> {
        let drivers = environment()?.drivers().map_err(map_odbc_error)?;
        Ok(drivers.into_iter().map(|d| d.description).collect())
    }

    fn connect(&self, connection_string: &str) -> Result<Box<dyn DriverConnection>, DriverError> {
        let conn = environment()?
            .connect_with_connection_string(connection_string, ConnectionOptions::default())
            .map_err(map_odbc_error)?;
        conn.set_autocommit(false).map_err(map_odbc_error)?;
        Ok(Box::new(OdbcConnection { conn: Some(conn) }))
    }
}

/// A live ODBC connection
pub struct OdbcConnection {
    conn: Option<Connection<'static>>,
}

impl OdbcConnection {
    fn live(&self) -> Result<&Connection<'static>, DriverError> {
        self.conn
            .as_ref()
            .ok_or_else(|| DriverError::from_sqlstate("08003", "Connection is closed"))
    }
}

impl DriverConnection for OdbcConnection {
    fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<Vec<Table>, DriverError> {
        let conn = self.live()?;
        let params: Vec<VarWCharBox> = params
            .iter()
            .map(|p| match p.as_text() {
                Some(text) => wide_param(text),
                None => VarWCharBox::null(),
            })
            .collect();

        let mut next = conn
            .execute(sql, params.as_slice(), None)
            .map_err(map_odbc_error)?;

        let mut sets = Vec::new();
        while let Some(cursor) = next {
            let (table, cursor) = read_result_set(cursor)?;
            debug!(rows = table.len(), "Fetched result set");
            sets.push(table);
            next = cursor.more_results().map_err(map_odbc_error)?;
        }
        Ok(sets)
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.live()?.commit().map_err(map_odbc_error)
    }

    fn close(&mut self) -> Result<(), DriverError> {
        // Dropping the handle disconnects
        self.conn.take();
        Ok(())
    }
}

type OdbcCursor<'c> = CursorImpl<StatementImpl<'c>>;

fn read_result_set(mut cursor: OdbcCursor<'_>) -> Result<(Table, OdbcCursor<'_>), DriverError> {
    let columns: Vec<String> = cursor
        .column_names()
        .map_err(map_odbc_error)?
        .collect::<Result<_, _>>()
        .map_err(map_odbc_error)?;

    let mut kinds = Vec::with_capacity(columns.len());
    for index in 1..=columns.len() {
        let index = u16::try_from(index)
            .map_err(|_| DriverError::new(DbErrorKind::NotSupported, "Too many columns"))?;
        kinds.push(cursor.col_data_type(index).map_err(map_odbc_error)?);
    }

    let capacities: Vec<usize> = kinds.iter().map(cell_capacity).collect();
    let descs = capacities
        .iter()
        .map(|&max_str_len| BufferDesc::WText { max_str_len });
    let buffer = ColumnarAnyBuffer::try_from_descs(batch_rows(&capacities), descs)
        .map_err(map_odbc_error)?;
    let mut block = cursor.bind_buffer(buffer).map_err(map_odbc_error)?;

    let mut table = Table::new(columns);
    while let Some(batch) = block
        .fetch_with_truncation_check(true)
        .map_err(|e| fetch_error(e, &table.columns))?
    {
        for row in 0..batch.num_rows() {
            let mut cells = Vec::with_capacity(kinds.len());
            for (col, kind) in kinds.iter().enumerate() {
                let text = match batch.column(col) {
                    AnySlice::WText(view) => view
                        .get(row)
                        .map(|units| decode_wide(&table.columns[col], units))
                        .transpose()?,
                    _ => None,
                };
                cells.push(cell_value(kind, text.as_deref()));
            }
            table.push_row(cells);
        }
    }

    let (cursor, _buffer) = block.unbind().map_err(map_odbc_error)?;
    Ok((table, cursor))
}

/// UTF-16 units reserved for one cell of `kind`
fn cell_capacity(kind: &DataType) -> usize {
    match kind {
        DataType::Bit
        | DataType::TinyInt
        | DataType::SmallInt
        | DataType::Integer
        | DataType::BigInt
        | DataType::Real
        | DataType::Double
        | DataType::Float { .. }
        | DataType::Decimal { .. }
        | DataType::Numeric { .. }
        | DataType::Date
        | DataType::Time { .. }
        | DataType::Timestamp { .. } => SHORT_TEXT_LEN,
        _ => MAX_TEXT_LEN,
    }
}

/// Rows per fetch so the buffer stays within `BUFFER_BYTES`
fn batch_rows(capacities: &[usize]) -> usize {
    // One terminator unit per cell plus its length indicator
    let row_bytes: usize = capacities
        .iter()
        .map(|units| (units + 1) * 2 + std::mem::size_of::<isize>())
        .sum();
    (BUFFER_BYTES / row_bytes.max(1)).clamp(1, BATCH_SIZE)
}

fn wide_param(text: &str) -> VarWCharBox {
    let units: Vec<u16> = text.encode_utf16().collect();
    let indicator = Indicator::Length(units.len() * 2);
    VarWCharBox::from_buffer(units.into_boxed_slice(), indicator)
}

fn decode_wide(column: &str, units: &[u16]) -> Result<String, DriverError> {
    String::from_utf16(units).map_err(|_| {
        DriverError::new(
            DbErrorKind::Data,
            format!("Column '{}' holds invalid UTF-16 text", column),
        )
    })
}

/// A truncated cell names its column instead of returning a clipped value
fn fetch_error(err: odbc_api::Error, columns: &[String]) -> DriverError {
    match err {
        odbc_api::Error::TooLargeValueForBuffer { buffer_index, .. } => {
            let column = columns.get(buffer_index).map(String::as_str).unwrap_or("?");
            DriverError::from_sqlstate(
                "22001",
                format!(
                    "Value in column '{}' exceeds {} characters",
                    column, MAX_TEXT_LEN
                ),
            )
        }
        other => map_odbc_error(other),
    }
}

/// Typed JSON value for a text cell, by column type
fn cell_value(kind: &DataType, text: Option<&str>) -> Value {
    let Some(text) = text else {
        return Value::Null;
    };
    match kind {
        DataType::TinyInt | DataType::SmallInt | DataType::Integer | DataType::BigInt => text
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::from(text)),
        DataType::Real
        | DataType::Double
        | DataType::Float { .. }
        | DataType::Decimal { .. }
        | DataType::Numeric { .. } => text
            .trim()
            .parse::<f64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::from(text)),
        DataType::Bit => match text {
            "1" => Value::Bool(true),
            "0" => Value::Bool(false),
            other => Value::from(other),
        },
        _ => Value::from(text),
    }
}

fn map_odbc_error(err: odbc_api::Error) -> DriverError {
    match &err {
        odbc_api::Error::Diagnostics { record, .. } => {
            DriverError::from_sqlstate(record.state.as_str(), err.to_string())
        }
        _ => DriverError::new(DbErrorKind::Generic, err.to_string()),
    }
}
