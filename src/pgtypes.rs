//! PostgreSQL wire conversions.
//!
//! Result values decode into [`CellValue`] by column type: through the driver's
//! decoder where it has one, by hand for `numeric` and the network types.
//! Types whose binary form is plain text are read as strings. Any other type is
//! rejected so raw wire bytes never reach a row.
//!
//! Positional arguments arrive as strings and are converted to the type the
//! server inferred for their placeholder with [`ArgValue::parse`].

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::error::BoxDynError;
use sqlx::postgres::types::{Oid, PgInterval, PgMoney, PgTimeTz};
use sqlx::postgres::{PgArguments, PgTypeInfo, PgTypeKind, PgValueFormat, PgValueRef};
use sqlx::query::Query;
use sqlx::{Decode, Postgres, Type, TypeInfo, ValueRef};

use crate::materialize::CellValue;

/// Types whose binary representation is their UTF-8 text.
const TEXT_TYPES: &[&str] = &["TEXT", "VARCHAR", "CHAR", "NAME", "UNKNOWN", "xml", "citext"];

// numeric sign word
const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

// inet address family byte
const PGSQL_AF_INET: u8 = 2;
const PGSQL_AF_INET6: u8 = 3;

impl Type<Postgres> for CellValue {
    fn type_info() -> PgTypeInfo {
        <&str as Type<Postgres>>::type_info()
    }

    // Unsupported types are reported by `decode`, with the type name.
    fn compatible(_ty: &PgTypeInfo) -> bool {
        true
    }
}

impl<'r> Decode<'r, Postgres> for CellValue {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        if value.is_null() {
            return Ok(CellValue::Null);
        }

        let type_info = value.type_info().into_owned();
        if let PgTypeKind::Array(_) = type_info.kind() {
            return Ok(CellValue::Array(<Vec<CellValue> as Decode<Postgres>>::decode(value)?));
        }

        let cell = match type_info.name() {
            "BOOL" => CellValue::Bool(read(value)?),
            "INT2" => CellValue::Int(read::<i16>(value)?.into()),
            "INT4" => CellValue::Int(read::<i32>(value)?.into()),
            "INT8" => CellValue::Int(read(value)?),
            "OID" => CellValue::Int(read::<Oid>(value)?.0.into()),
            "FLOAT4" => CellValue::Real(read(value)?),
            "FLOAT8" => CellValue::Double(read(value)?),
            "NUMERIC" => CellValue::Numeric(match value.format() {
                PgValueFormat::Binary => numeric_text(value.as_bytes()?)?,
                PgValueFormat::Text => value.as_str()?.to_string(),
            }),
            "MONEY" => CellValue::Money(read::<PgMoney>(value)?.0),
            "\"CHAR\"" => CellValue::Text(char::from(read::<i8>(value)? as u8).to_string()),
            "BYTEA" => CellValue::Bytes(read(value)?),
            "UUID" => CellValue::Uuid(read(value)?),
            "DATE" => CellValue::Date(read::<NaiveDate>(value)?),
            "TIME" => CellValue::Time(read::<NaiveTime>(value)?),
            "TIMETZ" => {
                let v = read::<PgTimeTz<NaiveTime, FixedOffset>>(value)?;
                CellValue::TimeTz(v.time, v.offset)
            }
            "TIMESTAMP" => CellValue::Timestamp(read::<NaiveDateTime>(value)?),
            "TIMESTAMPTZ" => CellValue::TimestampTz(read::<DateTime<Utc>>(value)?),
            "INTERVAL" => {
                let v = read::<PgInterval>(value)?;
                CellValue::Interval {
                    months: v.months,
                    days: v.days,
                    microseconds: v.microseconds,
                }
            }
            "JSON" | "JSONB" => CellValue::Json(read(value)?),
            "INET" | "CIDR" => inet(binary(&value)?)?,
            "MACADDR" => CellValue::MacAddr(<[u8; 6]>::try_from(binary(&value)?)?),
            name if TEXT_TYPES.contains(&name) => CellValue::Text(read(value)?),
            name => match type_info.kind() {
                PgTypeKind::Enum(_) => CellValue::Text(read(value)?),
                _ => return Err(format!("unsupported type {}; cast the column to text", name).into()),
            },
        };
        Ok(cell)
    }
}

fn read<'r, T: Decode<'r, Postgres>>(value: PgValueRef<'r>) -> Result<T, BoxDynError> {
    T::decode(value)
}

fn binary<'r>(value: &PgValueRef<'r>) -> Result<&'r [u8], BoxDynError> {
    match value.format() {
        PgValueFormat::Binary => value.as_bytes(),
        PgValueFormat::Text => Err("expected a binary value".into()),
    }
}

/// Render a binary `numeric` exactly, at its display scale.
///
/// Layout: digit count, weight, sign and display scale as 16-bit words, then
/// base-10000 digits, most significant first.
pub fn numeric_text(bytes: &[u8]) -> Result<String, BoxDynError> {
    if bytes.len() < 8 {
        return Err("numeric value shorter than its header".into());
    }
    let word = |i: usize| u16::from_be_bytes([bytes[i], bytes[i + 1]]);
    let ndigits = word(0) as usize;
    let weight = word(2) as i16 as i32;
    let sign = word(4);
    let dscale = word(6) as usize;

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        NUMERIC_POS | NUMERIC_NEG => {}
        other => return Err(format!("invalid numeric sign 0x{:04x}", other).into()),
    }

    let body = &bytes[8..];
    if body.len() != ndigits * 2 {
        return Err(format!("numeric value has {} bytes for {} digits", body.len(), ndigits).into());
    }
    let digits: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    let digit = |i: i32| {
        usize::try_from(i)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut text = String::new();
    if sign == NUMERIC_NEG {
        text.push('-');
    }
    if weight < 0 {
        text.push('0');
    } else {
        text.push_str(&digit(0).to_string());
        for i in 1..=weight {
            text.push_str(&format!("{:04}", digit(i)));
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut i = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit(i)));
            i += 1;
        }
        fraction.truncate(dscale);
        text.push('.');
        text.push_str(&fraction);
    }
    Ok(text)
}

/// Decode a binary `inet` / `cidr`: family, prefix bits, cidr flag, address length, address.
pub fn inet(bytes: &[u8]) -> Result<CellValue, BoxDynError> {
    let [family, prefix, cidr, len, address @ ..] = bytes else {
        return Err("inet value shorter than its header".into());
    };
    if address.len() != usize::from(*len) {
        return Err(format!("inet address has {} bytes, header says {}", address.len(), len).into());
    }
    let addr = match *family {
        PGSQL_AF_INET => IpAddr::V4(Ipv4Addr::from(<[u8; 4]>::try_from(address)?)),
        PGSQL_AF_INET6 => IpAddr::V6(Ipv6Addr::from(<[u8; 16]>::try_from(address)?)),
        other => return Err(format!("unknown inet address family {}", other).into()),
    };
    Ok(CellValue::Inet {
        addr,
        prefix: *prefix,
        cidr: *cidr != 0,
    })
}

/// A positional argument converted to its parameter's type.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue<'a> {
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Oid(u32),
    Float4(f32),
    Float8(f64),
    Numeric(Decimal),
    Uuid(uuid::Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Json(serde_json::Value),
    Bytes(Vec<u8>),
    Text(&'a str),
}

impl<'a> ArgValue<'a> {
    /// Convert `arg` for a parameter of type `type_name`.
    ///
    /// `is_enum` marks user-defined enum types, which accept their label as text.
    pub fn parse(arg: &'a str, type_name: &str, is_enum: bool) -> Result<Self, String> {
        let value = match type_name {
            "BOOL" => ArgValue::Bool(parse_bool(arg)?),
            "INT2" => ArgValue::Int2(parse(arg, type_name)?),
            "INT4" => ArgValue::Int4(parse(arg, type_name)?),
            "INT8" => ArgValue::Int8(parse(arg, type_name)?),
            "OID" => ArgValue::Oid(parse(arg, type_name)?),
            "FLOAT4" => ArgValue::Float4(parse(arg, type_name)?),
            "FLOAT8" => ArgValue::Float8(parse(arg, type_name)?),
            "NUMERIC" => ArgValue::Numeric(parse(arg, type_name)?),
            "UUID" => ArgValue::Uuid(parse(arg, type_name)?),
            "DATE" => ArgValue::Date(parse(arg, type_name)?),
            "TIME" => ArgValue::Time(parse(arg, type_name)?),
            "TIMESTAMP" => ArgValue::Timestamp(parse_timestamp(arg)?),
            "TIMESTAMPTZ" => ArgValue::TimestampTz(parse_timestamptz(arg)?),
            "JSON" | "JSONB" => {
                ArgValue::Json(serde_json::from_str(arg).map_err(|e| invalid(arg, type_name, e))?)
            }
            "BYTEA" => ArgValue::Bytes(parse_bytea(arg)?),
            name if TEXT_TYPES.contains(&name) || is_enum => ArgValue::Text(arg),
            name => {
                return Err(format!(
                    "unsupported parameter type {}; pass it through text, e.g. $1::text::{}",
                    name,
                    name.to_lowercase()
                ))
            }
        };
        Ok(value)
    }

    /// Bind the converted value as the next parameter of `query`.
    pub fn bind<'q>(self, query: Query<'q, Postgres, PgArguments>) -> Query<'q, Postgres, PgArguments>
    where
        'a: 'q,
    {
        match self {
            ArgValue::Bool(v) => query.bind(v),
            ArgValue::Int2(v) => query.bind(v),
            ArgValue::Int4(v) => query.bind(v),
            ArgValue::Int8(v) => query.bind(v),
            ArgValue::Oid(v) => query.bind(Oid(v)),
            ArgValue::Float4(v) => query.bind(v),
            ArgValue::Float8(v) => query.bind(v),
            ArgValue::Numeric(v) => query.bind(v),
            ArgValue::Uuid(v) => query.bind(v),
            ArgValue::Date(v) => query.bind(v),
            ArgValue::Time(v) => query.bind(v),
            ArgValue::Timestamp(v) => query.bind(v),
            ArgValue::TimestampTz(v) => query.bind(v),
            ArgValue::Json(v) => query.bind(v),
            ArgValue::Bytes(v) => query.bind(v),
            ArgValue::Text(v) => query.bind(v),
        }
    }
}

fn invalid(arg: &str, type_name: &str, err: impl std::fmt::Display) -> String {
    format!("'{}' is not a valid {}: {}", arg, type_name, err)
}

fn parse<T>(arg: &str, type_name: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    arg.trim().parse().map_err(|e| invalid(arg, type_name, e))
}

fn parse_bool(arg: &str) -> Result<bool, String> {
    match arg.trim().to_ascii_lowercase().as_str() {
        "t" | "true" | "y" | "yes" | "on" | "1" => Ok(true),
        "f" | "false" | "n" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(arg, "BOOL", "expected true or false")),
    }
}

/// `\x` hex form, or the raw bytes of the string.
fn parse_bytea(arg: &str) -> Result<Vec<u8>, String> {
    let Some(hex) = arg.strip_prefix("\\x") else {
        return Ok(arg.as_bytes().to_vec());
    };
    if hex.len() % 2 != 0 {
        return Err(invalid(arg, "BYTEA", "odd number of hex digits"));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            hex.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| invalid(arg, "BYTEA", "invalid hex digit"))
        })
        .collect()
}

fn parse_timestamp(arg: &str) -> Result<NaiveDateTime, String> {
    let arg = arg.trim();
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(arg, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(arg, "%Y-%m-%d")
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        })
        .ok_or_else(|| invalid(arg, "TIMESTAMP", "expected YYYY-MM-DD[ HH:MM:SS[.ffffff]]"))
}

/// Timestamps without an offset are taken as UTC.
fn parse_timestamptz(arg: &str) -> Result<DateTime<Utc>, String> {
    let arg = arg.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(arg) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(arg, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Ok(ts.with_timezone(&Utc));
    }
    parse_timestamp(arg)
        .map(|naive| naive.and_utc())
        .map_err(|_| invalid(arg, "TIMESTAMPTZ", "expected an ISO 8601 timestamp"))
}
