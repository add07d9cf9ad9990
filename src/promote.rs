//! Operand promotion for arithmetic and comparison. One table decides what an
//!  operator does with a pair of operand kinds, so the rules can be read in
//!  one place.

use crate::ast::BinaryOp;
use crate::value::PrimitiveValue;

/// What an operand is, as far as promotion cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Integer,
    Decimal,
    Float,
    Date,
    DateTimeOffset,
    Duration,
}

impl Class {
    pub fn of(value: &PrimitiveValue) -> Option<Self> {
        Some(match value {
            PrimitiveValue::Int16(_) | PrimitiveValue::Int32(_) | PrimitiveValue::Int64(_) => {
                Self::Integer
            }
            PrimitiveValue::Decimal(_) => Self::Decimal,
            PrimitiveValue::Single(_) | PrimitiveValue::Double(_) => Self::Float,
            PrimitiveValue::Date(_) => Self::Date,
            PrimitiveValue::DateTimeOffset(_) => Self::DateTimeOffset,
            PrimitiveValue::Duration(_) => Self::Duration,
            _ => return None,
        })
    }

    #[inline]
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Decimal | Self::Float)
    }
}

/// How to carry out an operation once both sides are classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Checked 64 bit arithmetic, narrowed back to the widest operand type
    Integer,
    Decimal,
    Float,
    /// Date plus or minus a duration
    ShiftDate,
    /// DateTimeOffset plus or minus a duration
    ShiftInstant,
    /// Duration plus or minus a duration
    Durations,
    /// Duration times or divided by a number. The number may be on either
    ///  side of `mul`.
    ScaleDuration,
    /// Date minus date, in whole days
    DateDifference,
    /// DateTimeOffset minus DateTimeOffset
    InstantDifference,
}

const ALL: &[BinaryOp] = &[
    BinaryOp::Add,
    BinaryOp::Sub,
    BinaryOp::Mul,
    BinaryOp::Div,
    BinaryOp::DivBy,
    BinaryOp::Mod,
];
const ADDITIVE: &[BinaryOp] = &[BinaryOp::Add, BinaryOp::Sub];
const SCALING: &[BinaryOp] = &[BinaryOp::Mul, BinaryOp::Div, BinaryOp::DivBy];
const SUB: &[BinaryOp] = &[BinaryOp::Sub];
const MUL: &[BinaryOp] = &[BinaryOp::Mul];

type Row = (Class, &'static [BinaryOp], Class, Rule);

#[rustfmt::skip]
static ARITHMETIC: &[Row] = &[
    // Numbers: any float makes the operation float, otherwise any decimal
    //  makes it decimal
    (Class::Integer,        ALL,      Class::Integer,        Rule::Integer),
    (Class::Integer,        ALL,      Class::Decimal,        Rule::Decimal),
    (Class::Decimal,        ALL,      Class::Integer,        Rule::Decimal),
    (Class::Decimal,        ALL,      Class::Decimal,        Rule::Decimal),
    (Class::Integer,        ALL,      Class::Float,          Rule::Float),
    (Class::Decimal,        ALL,      Class::Float,          Rule::Float),
    (Class::Float,          ALL,      Class::Integer,        Rule::Float),
    (Class::Float,          ALL,      Class::Decimal,        Rule::Float),
    (Class::Float,          ALL,      Class::Float,          Rule::Float),
    // Temporal
    (Class::Date,           ADDITIVE, Class::Duration,       Rule::ShiftDate),
    (Class::DateTimeOffset, ADDITIVE, Class::Duration,       Rule::ShiftInstant),
    (Class::Duration,       ADDITIVE, Class::Duration,       Rule::Durations),
    (Class::Duration,       SCALING,  Class::Integer,        Rule::ScaleDuration),
    (Class::Duration,       SCALING,  Class::Decimal,        Rule::ScaleDuration),
    (Class::Duration,       SCALING,  Class::Float,          Rule::ScaleDuration),
    (Class::Integer,        MUL,      Class::Duration,       Rule::ScaleDuration),
    (Class::Decimal,        MUL,      Class::Duration,       Rule::ScaleDuration),
    (Class::Float,          MUL,      Class::Duration,       Rule::ScaleDuration),
    (Class::Date,           SUB,      Class::Date,           Rule::DateDifference),
    (Class::DateTimeOffset, SUB,      Class::DateTimeOffset, Rule::InstantDifference),
];

/// Looks up the rule for `left op right`. None means the combination is a
///  type mismatch.
pub fn arithmetic(left: Class, op: BinaryOp, right: Class) -> Option<Rule> {
    ARITHMETIC
        .iter()
        .find(|(l, ops, r, _)| *l == left && *r == right && ops.contains(&op))
        .map(|(_, _, _, rule)| *rule)
}

/// The class both sides of a numeric comparison are converted to.
pub fn comparison(left: Class, right: Class) -> Option<Class> {
    use Class::*;
    match (left, right) {
        (Integer, Integer) => Some(Integer),
        (Float, _) | (_, Float) if left.is_numeric() && right.is_numeric() => Some(Float),
        (Decimal, Integer | Decimal) | (Integer, Decimal) => Some(Decimal),
        _ => None,
    }
}

/// Integer width rank of a value, used to narrow integer results back to the
///  widest operand type.
pub fn integer_width(value: &PrimitiveValue) -> u8 {
    match value {
        PrimitiveValue::Int16(_) => 16,
        PrimitiveValue::Int32(_) => 32,
        _ => 64,
    }
}

/// Packs an integer result into the narrowest of Int16, Int32 and Int64 that
///  is at least [width] and holds [n].
pub fn narrow(n: i64, width: u8) -> PrimitiveValue {
    if width <= 16
        && let Ok(n) = i16::try_from(n)
    {
        PrimitiveValue::Int16(n)
    } else if width <= 32
        && let Ok(n) = i32::try_from(n)
    {
        PrimitiveValue::Int32(n)
    } else {
        PrimitiveValue::Int64(n)
    }
}
