use std::fmt::{Display, Formatter};

use base64::Engine;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, SecondsFormat};
use rust_decimal::Decimal;
use uuid::Uuid;

/// A fully parsed value from the EDM primitive domain.
///
/// Durations are kept as a signed count of seconds so that arithmetic on
///  them is plain floating point.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PrimitiveValue {
    Null,
    Boolean(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Single(f32),
    Double(f64),
    Decimal(Decimal),
    String(String),
    Date(NaiveDate),
    TimeOfDay(NaiveTime),
    DateTimeOffset(DateTime<FixedOffset>),
    Duration(f64),
    Guid(Uuid),
    Binary(Vec<u8>),
    Enum { type_name: String, member: String },
}

/// The type tag of a [PrimitiveValue], named the way EDM names it.
#[derive(strum_macros::Display, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueKind {
    #[strum(serialize = "null")]
    Null,
    #[strum(serialize = "Edm.Boolean")]
    Boolean,
    #[strum(serialize = "Edm.Int16")]
    Int16,
    #[strum(serialize = "Edm.Int32")]
    Int32,
    #[strum(serialize = "Edm.Int64")]
    Int64,
    #[strum(serialize = "Edm.Single")]
    Single,
    #[strum(serialize = "Edm.Double")]
    Double,
    #[strum(serialize = "Edm.Decimal")]
    Decimal,
    #[strum(serialize = "Edm.String")]
    String,
    #[strum(serialize = "Edm.Date")]
    Date,
    #[strum(serialize = "Edm.TimeOfDay")]
    TimeOfDay,
    #[strum(serialize = "Edm.DateTimeOffset")]
    DateTimeOffset,
    #[strum(serialize = "Edm.Duration")]
    Duration,
    #[strum(serialize = "Edm.Guid")]
    Guid,
    #[strum(serialize = "Edm.Binary")]
    Binary,
    #[strum(serialize = "Edm.Enum")]
    Enum,
}

impl PrimitiveValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Boolean(_) => ValueKind::Boolean,
            Self::Int16(_) => ValueKind::Int16,
            Self::Int32(_) => ValueKind::Int32,
            Self::Int64(_) => ValueKind::Int64,
            Self::Single(_) => ValueKind::Single,
            Self::Double(_) => ValueKind::Double,
            Self::Decimal(_) => ValueKind::Decimal,
            Self::String(_) => ValueKind::String,
            Self::Date(_) => ValueKind::Date,
            Self::TimeOfDay(_) => ValueKind::TimeOfDay,
            Self::DateTimeOffset(_) => ValueKind::DateTimeOffset,
            Self::Duration(_) => ValueKind::Duration,
            Self::Guid(_) => ValueKind::Guid,
            Self::Binary(_) => ValueKind::Binary,
            Self::Enum { .. } => ValueKind::Enum,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Any of the integer types widened to 64 bits.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int16(n) => Some(i64::from(*n)),
            Self::Int32(n) => Some(i64::from(*n)),
            Self::Int64(n) => Some(*n),
            _ => None,
        }
    }

    /// Any numeric value converted to a double. Decimals may lose precision.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int16(n) => Some(f64::from(*n)),
            Self::Int32(n) => Some(f64::from(*n)),
            Self::Int64(n) => Some(*n as f64),
            Self::Single(n) => Some(f64::from(*n)),
            Self::Double(n) => Some(*n),
            Self::Decimal(d) => rust_decimal::prelude::ToPrimitive::to_f64(d),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Int16(n) => Some(Decimal::from(*n)),
            Self::Int32(n) => Some(Decimal::from(*n)),
            Self::Int64(n) => Some(Decimal::from(*n)),
            Self::Decimal(d) => Some(*d),
            _ => None,
        }
    }
}

// These From implementations keep test fixtures and record builders short
impl From<bool> for PrimitiveValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}
impl From<i32> for PrimitiveValue {
    fn from(n: i32) -> Self {
        Self::Int32(n)
    }
}
impl From<i64> for PrimitiveValue {
    fn from(n: i64) -> Self {
        Self::Int64(n)
    }
}
impl From<f64> for PrimitiveValue {
    fn from(n: f64) -> Self {
        Self::Double(n)
    }
}
impl From<Decimal> for PrimitiveValue {
    fn from(d: Decimal) -> Self {
        Self::Decimal(d)
    }
}
impl From<&str> for PrimitiveValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}
impl From<String> for PrimitiveValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}
impl From<NaiveDate> for PrimitiveValue {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}
impl From<NaiveTime> for PrimitiveValue {
    fn from(t: NaiveTime) -> Self {
        Self::TimeOfDay(t)
    }
}
impl From<DateTime<FixedOffset>> for PrimitiveValue {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        Self::DateTimeOffset(dt)
    }
}
impl From<Uuid> for PrimitiveValue {
    fn from(g: Uuid) -> Self {
        Self::Guid(g)
    }
}
impl<T: Into<PrimitiveValue>> From<Option<T>> for PrimitiveValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Writes a double so that the lexer reads it back as a double: a bare
///  integer rendering gets a trailing `.0`.
fn write_double(f: &mut Formatter<'_>, v: f64) -> std::fmt::Result {
    if v.is_nan() {
        write!(f, "NaN")
    } else if v.is_infinite() {
        write!(f, "{}", if v > 0.0 { "INF" } else { "-INF" })
    } else {
        let s = v.to_string();
        if s.contains(['.', 'e', 'E']) {
            write!(f, "{s}")
        } else {
            write!(f, "{s}.0")
        }
    }
}

/// Canonical OData literal syntax. Every category the lexer produces
///  re-lexes to an equal value.
impl Display for PrimitiveValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Int16(n) => write!(f, "{n}"),
            Self::Int32(n) => write!(f, "{n}"),
            Self::Int64(n) => write!(f, "{n}"),
            Self::Single(n) => write_double(f, f64::from(*n)),
            Self::Double(n) => write_double(f, *n),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::TimeOfDay(t) => write!(f, "{t}"),
            Self::DateTimeOffset(dt) => {
                write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Self::Duration(secs) => {
                let sign = if *secs < 0.0 { "-" } else { "" };
                write!(f, "duration'{sign}PT{}S'", secs.abs())
            }
            Self::Guid(g) => write!(f, "{}", g.hyphenated()),
            Self::Binary(bytes) => write!(
                f,
                "binary'{}'",
                base64::engine::general_purpose::URL_SAFE.encode(bytes)
            ),
            Self::Enum { type_name, member } => {
                write!(f, "{type_name}'{}'", member.replace('\'', "''"))
            }
        }
    }
}
