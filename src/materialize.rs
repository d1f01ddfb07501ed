//! Result materialization.
//!
//! Flattens an arbitrary result into column descriptors and string-valued
//! rows. Every cell is scanned into a [`CellValue`] and rendered through its
//! `Display` impl, so all types go through one stringification path.

use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

use crate::error::{PgReadError, PgReadResult};

/// Name and driver-reported type of one projected column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// One result row: column name to rendered value, in projection order.
///
/// Keyed by name, so a projection must not repeat a column name.
pub type Row = IndexMap<String, String>;

/// Fully materialized result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Row>,
}

/// Generic holder a single cell is scanned into.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Real(f32),
    Double(f64),
    /// Exact decimal text at the value's display scale, or `NaN` / `Infinity`.
    Numeric(String),
    /// Amount in cents.
    Money(i64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    TimeTz(NaiveTime, FixedOffset),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Interval {
        months: i32,
        days: i32,
        microseconds: i64,
    },
    Inet {
        addr: IpAddr,
        prefix: u8,
        cidr: bool,
    },
    MacAddr([u8; 6]),
    Json(serde_json::Value),
    Array(Vec<CellValue>),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => write!(f, "NULL"),
            CellValue::Bool(v) => write!(f, "{}", v),
            CellValue::Int(v) => write!(f, "{}", v),
            CellValue::Real(v) if v.is_infinite() => write_infinity(f, v.is_sign_negative()),
            CellValue::Real(v) => write!(f, "{}", v),
            CellValue::Double(v) if v.is_infinite() => write_infinity(f, v.is_sign_negative()),
            CellValue::Double(v) => write!(f, "{}", v),
            CellValue::Numeric(v) => f.write_str(v),
            CellValue::Money(cents) => write_money(f, *cents),
            CellValue::Text(v) => f.write_str(v),
            CellValue::Bytes(bytes) => {
                f.write_str("\\x")?;
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
            CellValue::Uuid(v) => write!(f, "{}", v),
            CellValue::Date(v) => write!(f, "{}", v),
            CellValue::Time(v) => write!(f, "{}", v),
            CellValue::TimeTz(time, offset) => {
                write!(f, "{}", time)?;
                write_utc_offset(f, offset.local_minus_utc())
            }
            CellValue::Timestamp(v) => write!(f, "{}", v),
            CellValue::TimestampTz(v) => write!(f, "{}", v),
            CellValue::Interval {
                months,
                days,
                microseconds,
            } => write_interval(f, *months, *days, *microseconds),
            CellValue::Inet { addr, prefix, cidr } => {
                let host_bits = if addr.is_ipv4() { 32 } else { 128 };
                if !cidr && *prefix == host_bits {
                    write!(f, "{}", addr)
                } else {
                    write!(f, "{}/{}", addr, prefix)
                }
            }
            CellValue::MacAddr(octets) => {
                for (i, b) in octets.iter().enumerate() {
                    if i > 0 {
                        f.write_str(":")?;
                    }
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
            CellValue::Json(v) => write!(f, "{}", v),
            CellValue::Array(items) => {
                f.write_str("{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("}")
            }
        }
    }
}

fn write_infinity(f: &mut fmt::Formatter<'_>, negative: bool) -> fmt::Result {
    f.write_str(if negative { "-Infinity" } else { "Infinity" })
}

/// `$1,234.56`
fn write_money(f: &mut fmt::Formatter<'_>, cents: i64) -> fmt::Result {
    let abs = cents.unsigned_abs();
    let units = (abs / 100).to_string();
    let mut grouped = String::with_capacity(units.len() + units.len() / 3);
    for (i, c) in units.chars().enumerate() {
        if i > 0 && (units.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if cents < 0 { "-" } else { "" };
    write!(f, "{}${}.{:02}", sign, grouped, abs % 100)
}

/// `+02`, `-03:30`, `+05:45:10`
fn write_utc_offset(f: &mut fmt::Formatter<'_>, seconds: i32) -> fmt::Result {
    let sign = if seconds < 0 { '-' } else { '+' };
    let abs = seconds.unsigned_abs();
    write!(f, "{}{:02}", sign, abs / 3600)?;
    let (minutes, secs) = (abs % 3600 / 60, abs % 60);
    if minutes != 0 || secs != 0 {
        write!(f, ":{:02}", minutes)?;
    }
    if secs != 0 {
        write!(f, ":{:02}", secs)?;
    }
    Ok(())
}

/// Interval in the server's default output style: `1 year 2 mons -3 days +04:05:06.5`.
fn write_interval(f: &mut fmt::Formatter<'_>, months: i32, days: i32, microseconds: i64) -> fmt::Result {
    let mut parts = Vec::new();
    let mut after_negative = false;
    for (value, unit) in [(months / 12, "year"), (months % 12, "mon"), (days, "day")] {
        if value == 0 {
            continue;
        }
        let plus = if after_negative && value > 0 { "+" } else { "" };
        let plural = if value != 1 { "s" } else { "" };
        parts.push(format!("{}{} {}{}", plus, value, unit, plural));
        after_negative = value < 0;
    }

    if microseconds != 0 || parts.is_empty() {
        let sign = if microseconds < 0 {
            "-"
        } else if after_negative {
            "+"
        } else {
            ""
        };
        let abs = microseconds.unsigned_abs();
        let mut time = format!(
            "{}{:02}:{:02}:{:02}",
            sign,
            abs / 3_600_000_000,
            abs / 60_000_000 % 60,
            abs / 1_000_000 % 60
        );
        let fraction = abs % 1_000_000;
        if fraction != 0 {
            let digits = format!("{:06}", fraction);
            time.push('.');
            time.push_str(digits.trim_end_matches('0'));
        }
        parts.push(time);
    }
    f.write_str(&parts.join(" "))
}

/// Capability interface over an executed statement.
///
/// Column metadata is available before the first `advance`, so zero-row
/// results still describe their shape.
#[async_trait]
pub trait ResultCursor: Send {
    /// Column names in projection order.
    fn column_names(&self) -> Vec<String>;

    /// Driver type names, positionally paired with [`column_names`](Self::column_names).
    fn column_type_names(&self) -> Vec<String>;

    /// Move to the next row. Returns `false` once the result is exhausted.
    async fn advance(&mut self) -> PgReadResult<bool>;

    /// Scan every value of the current row.
    fn scan(&self) -> PgReadResult<Vec<CellValue>>;
}

/// Describe the cursor's columns.
pub fn describe_columns<C: ResultCursor + ?Sized>(cursor: &C) -> Vec<ColumnDescriptor> {
    cursor
        .column_names()
        .into_iter()
        .zip(cursor.column_type_names())
        .map(|(name, type_name)| ColumnDescriptor { name, type_name })
        .collect()
}

/// Drain `cursor` into a [`ResultSet`].
///
/// The first scan failure aborts the walk; rows read before it are dropped.
pub async fn materialize<C: ResultCursor + ?Sized>(cursor: &mut C) -> PgReadResult<ResultSet> {
    let columns = describe_columns(cursor);
    let mut names = HashSet::with_capacity(columns.len());
    if let Some(duplicate) = columns.iter().find(|col| !names.insert(col.name.as_str())) {
        return Err(PgReadError::scan(
            &duplicate.name,
            "column name appears more than once in the projection; alias one of them",
        ));
    }
    let mut rows = Vec::new();

    while cursor.advance().await? {
        let values = cursor.scan()?;
        if values.len() != columns.len() {
            return Err(PgReadError::scan(
                "*",
                format!("expected {} values, got {}", columns.len(), values.len()),
            ));
        }
        let row: Row = columns
            .iter()
            .zip(values)
            .map(|(col, value)| (col.name.clone(), value.to_string()))
            .collect();
        rows.push(row);
    }

    tracing::debug!("Materialized {} row(s) x {} column(s)", rows.len(), columns.len());
    Ok(ResultSet { columns, rows })
}
