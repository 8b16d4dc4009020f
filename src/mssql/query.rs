use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures_util::TryStreamExt;
use tiberius::numeric::Numeric;
use tiberius::{ColumnData, ColumnType, FromSql, Query, QueryItem, QueryStream, Row};

use crate::driver::{ColumnInfo, DriverCursor, DriverError};
use crate::types::{CellType, RowValues};

impl From<tiberius::error::Error> for DriverError {
    fn from(err: tiberius::error::Error) -> Self {
        use tiberius::error::Error;
        // server-side and transport failures are database errors; the rest
        // are client-side surprises
        if matches!(
            err,
            Error::Server(_) | Error::Io { .. } | Error::Tls(_) | Error::Routing { .. }
        ) {
            DriverError::Database(err.to_string())
        } else {
            DriverError::Other(Box::new(err))
        }
    }
}

/// Drain a query stream into a cursor.
///
/// Only the first result set is kept; later ones are read and discarded so
/// the connection is left clean for the next statement.
///
/// # Errors
/// Returns `DriverError` if reading the stream or converting a value fails.
pub async fn collect_cursor(mut stream: QueryStream<'_>) -> Result<DriverCursor, DriverError> {
    let mut cursor = DriverCursor::default();
    let mut first_result = None;

    while let Some(item) = stream.try_next().await? {
        match item {
            QueryItem::Metadata(meta) => {
                if first_result.is_none() {
                    first_result = Some(meta.result_index());
                    cursor.columns = meta
                        .columns()
                        .iter()
                        .map(|col| ColumnInfo::new(col.name(), cell_type_for(col.column_type())))
                        .collect();
                }
            }
            QueryItem::Row(row) => {
                if first_result == Some(row.result_index()) {
                    cursor.rows.push(row_values(row)?);
                }
            }
        }
    }

    Ok(cursor)
}

fn row_values(row: Row) -> Result<Vec<RowValues>, DriverError> {
    row.into_iter().map(cell_value).collect()
}

fn cell_type_for(column_type: ColumnType) -> Option<CellType> {
    match column_type {
        ColumnType::Bit | ColumnType::Bitn => Some(CellType::Boolean),
        ColumnType::Int1
        | ColumnType::Int2
        | ColumnType::Int4
        | ColumnType::Int8
        | ColumnType::Intn => Some(CellType::Integer),
        ColumnType::Float4
        | ColumnType::Float8
        | ColumnType::Floatn
        | ColumnType::Money
        | ColumnType::Money4
        | ColumnType::Decimaln
        | ColumnType::Numericn => Some(CellType::Float),
        ColumnType::Datetime
        | ColumnType::Datetime4
        | ColumnType::Datetimen
        | ColumnType::Datetime2
        | ColumnType::Daten
        | ColumnType::DatetimeOffsetn => Some(CellType::Timestamp),
        ColumnType::BigVarChar
        | ColumnType::BigChar
        | ColumnType::NVarchar
        | ColumnType::NChar
        | ColumnType::Text
        | ColumnType::NText
        | ColumnType::Xml
        | ColumnType::Guid
        | ColumnType::Timen => Some(CellType::Text),
        ColumnType::BigVarBin | ColumnType::BigBinary | ColumnType::Image => {
            Some(CellType::Binary)
        }
        _ => None,
    }
}

/// Convert one tiberius cell. SQL NULL of any type becomes `RowValues::Null`.
fn cell_value(data: ColumnData<'static>) -> Result<RowValues, DriverError> {
    let value = match data {
        ColumnData::U8(v) => v.map(|v| RowValues::Int(i64::from(v))),
        ColumnData::I16(v) => v.map(|v| RowValues::Int(i64::from(v))),
        ColumnData::I32(v) => v.map(|v| RowValues::Int(i64::from(v))),
        ColumnData::I64(v) => v.map(RowValues::Int),
        ColumnData::F32(v) => v.map(|v| RowValues::Float(f64::from(v))),
        ColumnData::F64(v) => v.map(RowValues::Float),
        ColumnData::Bit(v) => v.map(RowValues::Bool),
        ColumnData::String(v) => v.map(|s| RowValues::Text(s.into_owned())),
        ColumnData::Guid(v) => v.map(|g| RowValues::Text(g.to_string())),
        ColumnData::Binary(v) => v.map(|b| RowValues::Blob(b.into_owned())),
        ColumnData::Numeric(v) => v.map(|n| RowValues::Float(numeric_to_f64(n))),
        ColumnData::Xml(v) => v.map(|x| RowValues::Text(x.into_owned().into_string())),
        ref data @ (ColumnData::DateTime(_)
        | ColumnData::SmallDateTime(_)
        | ColumnData::DateTime2(_)) => NaiveDateTime::from_sql(data)?.map(RowValues::Timestamp),
        ref data @ ColumnData::Date(_) => NaiveDate::from_sql(data)?
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(RowValues::Timestamp),
        ref data @ ColumnData::Time(_) => {
            NaiveTime::from_sql(data)?.map(|t| RowValues::Text(t.to_string()))
        }
        ref data @ ColumnData::DateTimeOffset(_) => {
            DateTime::<Utc>::from_sql(data)?.map(|dt| RowValues::Timestamp(dt.naive_utc()))
        }
        #[allow(unreachable_patterns)]
        other => {
            return Err(DriverError::other(format!(
                "unsupported SQL Server value: {other:?}"
            )));
        }
    };
    Ok(value.unwrap_or(RowValues::Null))
}

fn numeric_to_f64(n: Numeric) -> f64 {
    // precision loss is accepted; callers wanting exact decimals cast in SQL
    #[allow(clippy::cast_precision_loss)]
    let value = n.value() as f64;
    value / 10f64.powi(i32::from(n.scale()))
}

/// Bind parameters directly to the query for SQL Server.
/// Returns a query builder with parameters already bound; an empty slice binds
/// nothing and is valid.
pub fn bind_query_params<'a>(query: &'a str, params: &[RowValues]) -> Query<'a> {
    let mut query_builder = Query::new(query);

    for param in params {
        match param {
            RowValues::Int(i) => query_builder.bind(*i),
            RowValues::Float(f) => query_builder.bind(*f),
            RowValues::Text(s) => query_builder.bind(s.clone()),
            RowValues::Bool(b) => query_builder.bind(*b),
            RowValues::Timestamp(dt) => {
                query_builder.bind(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
            }
            RowValues::Null => query_builder.bind(Option::<String>::None),
            RowValues::JSON(jsval) => query_builder.bind(jsval.to_string()),
            RowValues::Blob(bytes) => query_builder.bind(bytes.clone()),
        }
    }

    query_builder
}
