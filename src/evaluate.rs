use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeDelta, Timelike, Utc};
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::ast::{
    BinaryOp, Call, ComputeItem, Lambda, Node, OrderItem, Property, PropertyKind, Quantifier,
    SortDirection, UnaryOp,
};
use crate::functions::Function;
use crate::promote::{self, Class, Rule};
use crate::value::{PrimitiveValue, ValueKind};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("type mismatch: {operator} cannot be applied to {}", kinds(.operands))]
    TypeMismatch {
        operator: String,
        operands: Vec<ValueKind>,
    },
    #[error("division by zero")]
    DivisionByZero,
    #[error("arithmetic overflow in {operator}")]
    Overflow { operator: String },
    #[error("property '{name}' not found")]
    PropertyNotFound { name: String },
    #[error("lambda variable '{name}' is not bound")]
    UnboundVariable { name: String },
    #[error("computed property '{name}' is not defined")]
    UnknownComputedProperty { name: String },
    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
    #[error("{feature} cannot be evaluated in memory")]
    NotImplemented { feature: String },
}

fn kinds(operands: &[ValueKind]) -> String {
    operands
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn mismatch(operator: impl ToString, operands: &[&PrimitiveValue]) -> Error {
    Error::TypeMismatch {
        operator: operator.to_string(),
        operands: operands.iter().map(|v| v.kind()).collect(),
    }
}

/// The record an expression is evaluated against.
pub trait RecordContext {
    fn property(&self, name: &str) -> Option<PrimitiveValue>;

    /// Related records reachable through a navigation property. None when
    ///  the record has no such navigation, which lambdas treat as empty.
    fn navigate(&self, name: &str) -> Option<Vec<&dyn RecordContext>> {
        _ = name;
        None
    }
}

/// Any property getter closure is a record without navigations
impl<F> RecordContext for F
where
    F: Fn(&str) -> Option<PrimitiveValue>,
{
    fn property(&self, name: &str) -> Option<PrimitiveValue> {
        self(name)
    }
}

/// A ready-made in-memory record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entity {
    properties: BTreeMap<String, PrimitiveValue>,
    navigations: BTreeMap<String, Vec<Entity>>,
}

impl Entity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<PrimitiveValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn with_navigation(mut self, name: impl Into<String>, related: Vec<Entity>) -> Self {
        self.navigations.insert(name.into(), related);
        self
    }
}

impl RecordContext for Entity {
    fn property(&self, name: &str) -> Option<PrimitiveValue> {
        self.properties.get(name).cloned()
    }

    fn navigate(&self, name: &str) -> Option<Vec<&dyn RecordContext>> {
        self.navigations
            .get(name)
            .map(|related| related.iter().map(|e| e as &dyn RecordContext).collect())
    }
}

/// Lambda variable bindings, innermost first. The bottom frame is the root
///  record and binds no variable.
struct Scope<'s> {
    record: &'s dyn RecordContext,
    variable: Option<&'s str>,
    parent: Option<&'s Scope<'s>>,
}

impl<'s> Scope<'s> {
    fn root(&self) -> &'s dyn RecordContext {
        match self.parent {
            Some(parent) => parent.root(),
            None => self.record,
        }
    }

    fn lookup(&self, variable: &str) -> Option<&'s dyn RecordContext> {
        if self.variable == Some(variable) {
            Some(self.record)
        } else {
            self.parent.and_then(|p| p.lookup(variable))
        }
    }
}

/// Interprets an AST against a [RecordContext] with SQL-style three valued
///  logic.
#[derive(Debug, Clone, Default)]
pub struct Evaluator<'c> {
    computed: &'c [ComputeItem],
    /// `matchesPattern` regexes by pattern text
    patterns: RefCell<HashMap<String, Regex>>,
}

impl Node {
    pub fn evaluate(&self, record: &dyn RecordContext) -> Result<PrimitiveValue, Error> {
        Evaluator::default().evaluate(self, record)
    }
}

impl<'c> Evaluator<'c> {
    /// An evaluator that resolves computed properties against [computed].
    pub fn with_computed(computed: &'c [ComputeItem]) -> Self {
        Self {
            computed,
            patterns: RefCell::default(),
        }
    }

    pub fn evaluate(&self, node: &Node, record: &dyn RecordContext) -> Result<PrimitiveValue, Error> {
        let scope = Scope {
            record,
            variable: None,
            parent: None,
        };
        self.eval(node, &scope)
    }

    /// Whether [record] passes a `$filter`. Null counts as not passing.
    pub fn matches(&self, node: &Node, record: &dyn RecordContext) -> Result<bool, Error> {
        match self.evaluate(node, record)? {
            PrimitiveValue::Boolean(b) => Ok(b),
            PrimitiveValue::Null => Ok(false),
            other => Err(mismatch("$filter", &[&other])),
        }
    }

    /// Orders two records by `$orderby` items. Nulls sort first.
    pub fn compare(
        &self,
        items: &[OrderItem],
        a: &dyn RecordContext,
        b: &dyn RecordContext,
    ) -> Result<Ordering, Error> {
        for item in items {
            let va = self.evaluate(&item.expression, a)?;
            let vb = self.evaluate(&item.expression, b)?;
            let ord = match (&va, &vb) {
                (PrimitiveValue::Null, PrimitiveValue::Null) => Ordering::Equal,
                (PrimitiveValue::Null, _) => Ordering::Less,
                (_, PrimitiveValue::Null) => Ordering::Greater,
                _ => order(BinaryOp::Lt, &va, &vb)?.unwrap_or(Ordering::Equal),
            };
            let ord = match item.direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return Ok(ord);
            }
        }
        Ok(Ordering::Equal)
    }

    fn eval(&self, node: &Node, scope: &Scope<'_>) -> Result<PrimitiveValue, Error> {
        match node {
            Node::Literal(value) => Ok(value.clone()),
            Node::Property(property) => self.property(property, scope),
            Node::UnaryOperator(UnaryOp::Not, child) => match self.eval(child, scope)? {
                PrimitiveValue::Boolean(b) => Ok(PrimitiveValue::Boolean(!b)),
                PrimitiveValue::Null => Ok(PrimitiveValue::Null),
                other => Err(mismatch(UnaryOp::Not, &[&other])),
            },
            Node::UnaryOperator(UnaryOp::Negate, child) => negate(self.eval(child, scope)?),
            Node::BinaryOperator(l, op, r) => self.binary(l, *op, r, scope),
            Node::FunctionCall(call) => self.call(call, scope),
            Node::Lambda(lambda) => self.lambda(lambda, scope),
            Node::List(_) => Err(Error::NotImplemented {
                feature: "a list outside of `in`".into(),
            }),
        }
    }

    fn property(&self, property: &Property, scope: &Scope<'_>) -> Result<PrimitiveValue, Error> {
        let not_found = || Error::PropertyNotFound {
            name: property.name.clone(),
        };
        match &property.kind {
            PropertyKind::Declared => scope.root().property(&property.name).ok_or_else(not_found),
            PropertyKind::LambdaVariable(variable) => scope
                .lookup(variable)
                .ok_or_else(|| Error::UnboundVariable {
                    name: variable.clone(),
                })?
                .property(&property.name)
                .ok_or_else(not_found),
            PropertyKind::Computed => {
                let item = self
                    .computed
                    .iter()
                    .find(|c| c.alias == property.name)
                    .ok_or_else(|| Error::UnknownComputedProperty {
                        name: property.name.clone(),
                    })?;
                // Computed properties are defined over the root record
                let root = Scope {
                    record: scope.root(),
                    variable: None,
                    parent: None,
                };
                self.eval(&item.expression, &root)
            }
            PropertyKind::Navigation => Err(Error::NotImplemented {
                feature: format!("navigation property '{}' as a value", property.name),
            }),
        }
    }

    fn binary(
        &self,
        l: &Node,
        op: BinaryOp,
        r: &Node,
        scope: &Scope<'_>,
    ) -> Result<PrimitiveValue, Error> {
        use PrimitiveValue::{Boolean, Null};

        match op {
            BinaryOp::And => {
                let lv = logical(op, self.eval(l, scope)?)?;
                if lv == Some(false) {
                    return Ok(Boolean(false));
                }
                let rv = logical(op, self.eval(r, scope)?)?;
                Ok(match (lv, rv) {
                    (_, Some(false)) => Boolean(false),
                    (Some(true), Some(true)) => Boolean(true),
                    _ => Null,
                })
            }
            BinaryOp::Or => {
                let lv = logical(op, self.eval(l, scope)?)?;
                if lv == Some(true) {
                    return Ok(Boolean(true));
                }
                let rv = logical(op, self.eval(r, scope)?)?;
                Ok(match (lv, rv) {
                    (_, Some(true)) => Boolean(true),
                    (Some(false), Some(false)) => Boolean(false),
                    _ => Null,
                })
            }
            // `x eq null` tests nullity instead of propagating it
            BinaryOp::Eq | BinaryOp::Ne if l.is_null_literal() || r.is_null_literal() => {
                let other = if l.is_null_literal() { r } else { l };
                let is_null = self.eval(other, scope)?.is_null();
                Ok(Boolean(is_null == (op == BinaryOp::Eq)))
            }
            BinaryOp::Eq | BinaryOp::Ne => {
                let lv = self.eval(l, scope)?;
                let rv = self.eval(r, scope)?;
                if lv.is_null() || rv.is_null() {
                    return Ok(Null);
                }
                let equal = equals(op, &lv, &rv)?;
                Ok(Boolean(equal == (op == BinaryOp::Eq)))
            }
            BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Lt | BinaryOp::Le => {
                let lv = self.eval(l, scope)?;
                let rv = self.eval(r, scope)?;
                if lv.is_null() || rv.is_null() {
                    return Ok(Null);
                }
                // NaN is unordered, so every ordering comparison is false
                let Some(ord) = order(op, &lv, &rv)? else {
                    return Ok(Boolean(false));
                };
                Ok(Boolean(match op {
                    BinaryOp::Gt => ord == Ordering::Greater,
                    BinaryOp::Ge => ord != Ordering::Less,
                    BinaryOp::Lt => ord == Ordering::Less,
                    _ => ord != Ordering::Greater,
                }))
            }
            BinaryOp::In => {
                let Node::List(items) = r else {
                    return Err(Error::NotImplemented {
                        feature: "`in` without a list".into(),
                    });
                };
                // A miss is unknown when either side of some comparison is null
                let lv = self.eval(l, scope)?;
                let mut saw_null = false;
                for item in items {
                    let iv = self.eval(item, scope)?;
                    if lv.is_null() || iv.is_null() {
                        saw_null = true;
                    } else if equals(BinaryOp::Eq, &lv, &iv)? {
                        return Ok(Boolean(true));
                    }
                }
                Ok(if saw_null { Null } else { Boolean(false) })
            }
            BinaryOp::Add
            | BinaryOp::Sub
            | BinaryOp::Mul
            | BinaryOp::Div
            | BinaryOp::DivBy
            | BinaryOp::Mod => {
                let lv = self.eval(l, scope)?;
                let rv = self.eval(r, scope)?;
                arithmetic(op, &lv, &rv)
            }
        }
    }

    fn lambda(&self, lambda: &Lambda, scope: &Scope<'_>) -> Result<PrimitiveValue, Error> {
        let source = match &lambda.navigation.kind {
            PropertyKind::Navigation => scope.root(),
            PropertyKind::LambdaVariable(variable) => {
                scope.lookup(variable).ok_or_else(|| Error::UnboundVariable {
                    name: variable.clone(),
                })?
            }
            _ => {
                return Err(Error::NotImplemented {
                    feature: format!("lambda over '{}'", lambda.navigation.name),
                });
            }
        };
        let related = source.navigate(&lambda.navigation.name).unwrap_or_default();
        tracing::trace!(
            navigation = %lambda.navigation,
            quantifier = %lambda.quantifier,
            related = related.len(),
            "evaluating lambda"
        );

        let Some(predicate) = &lambda.predicate else {
            return Ok(PrimitiveValue::Boolean(!related.is_empty()));
        };

        let mut saw_null = false;
        for item in related {
            let inner = Scope {
                record: item,
                variable: Some(lambda.variable.as_str()),
                parent: Some(scope),
            };
            match (lambda.quantifier, self.eval(predicate, &inner)?) {
                (Quantifier::Any, PrimitiveValue::Boolean(true)) => {
                    return Ok(PrimitiveValue::Boolean(true));
                }
                (Quantifier::All, PrimitiveValue::Boolean(false)) => {
                    return Ok(PrimitiveValue::Boolean(false));
                }
                (_, PrimitiveValue::Boolean(_)) => {}
                (_, PrimitiveValue::Null) => saw_null = true,
                (q, other) => return Err(mismatch(q, &[&other])),
            }
        }

        Ok(if saw_null {
            PrimitiveValue::Null
        } else {
            PrimitiveValue::Boolean(lambda.quantifier == Quantifier::All)
        })
    }

    fn call(&self, call: &Call, scope: &Scope<'_>) -> Result<PrimitiveValue, Error> {
        use PrimitiveValue as V;

        let args = call
            .args()
            .iter()
            .map(|arg| self.eval(arg, scope))
            .collect::<Result<Vec<_>, _>>()?;

        // Every function propagates null
        if args.iter().any(PrimitiveValue::is_null) {
            return Ok(V::Null);
        }

        let function = call.function();
        let type_error = || mismatch(function, &args.iter().collect::<Vec<_>>());

        match (function, &args[..]) {
            (Function::Contains, [V::String(s), V::String(t)]) => Ok(V::Boolean(s.contains(t.as_str()))),
            (Function::StartsWith, [V::String(s), V::String(t)]) => {
                Ok(V::Boolean(s.starts_with(t.as_str())))
            }
            (Function::EndsWith, [V::String(s), V::String(t)]) => {
                Ok(V::Boolean(s.ends_with(t.as_str())))
            }
            (Function::IndexOf, [V::String(s), V::String(t)]) => {
                let index = match s.find(t.as_str()) {
                    Some(byte) => s[..byte].chars().count() as i64,
                    None => -1,
                };
                Ok(promote::narrow(index, 32))
            }
            (Function::Length, [V::String(s)]) => Ok(promote::narrow(s.chars().count() as i64, 32)),
            (Function::Substring, [V::String(s), start, rest @ ..]) => {
                let start = start.as_i64().ok_or_else(type_error)?.max(0) as usize;
                let chars = s.chars().skip(start);
                let out: String = match rest {
                    [] => chars.collect(),
                    [len] => {
                        let len = len.as_i64().ok_or_else(type_error)?.max(0) as usize;
                        chars.take(len).collect()
                    }
                    _ => return Err(type_error()),
                };
                Ok(V::String(out))
            }
            (Function::ToLower, [V::String(s)]) => Ok(V::String(s.to_lowercase())),
            (Function::ToUpper, [V::String(s)]) => Ok(V::String(s.to_uppercase())),
            (Function::Trim, [V::String(s)]) => Ok(V::String(s.trim().to_string())),
            (Function::Concat, [V::String(a), V::String(b)]) => Ok(V::String(format!("{a}{b}"))),
            (Function::MatchesPattern, [V::String(s), V::String(pattern)]) => {
                Ok(V::Boolean(self.pattern(pattern)?.is_match(s)))
            }

            (Function::Year, [V::Date(d)]) => Ok(V::Int32(d.year())),
            (Function::Year, [V::DateTimeOffset(dt)]) => Ok(V::Int32(dt.year())),
            (Function::Month, [V::Date(d)]) => Ok(V::Int32(d.month() as i32)),
            (Function::Month, [V::DateTimeOffset(dt)]) => Ok(V::Int32(dt.month() as i32)),
            (Function::Day, [V::Date(d)]) => Ok(V::Int32(d.day() as i32)),
            (Function::Day, [V::DateTimeOffset(dt)]) => Ok(V::Int32(dt.day() as i32)),
            (Function::Hour, [V::TimeOfDay(t)]) => Ok(V::Int32(t.hour() as i32)),
            (Function::Hour, [V::DateTimeOffset(dt)]) => Ok(V::Int32(dt.hour() as i32)),
            (Function::Minute, [V::TimeOfDay(t)]) => Ok(V::Int32(t.minute() as i32)),
            (Function::Minute, [V::DateTimeOffset(dt)]) => Ok(V::Int32(dt.minute() as i32)),
            (Function::Second, [V::TimeOfDay(t)]) => Ok(V::Int32(t.second() as i32)),
            (Function::Second, [V::DateTimeOffset(dt)]) => Ok(V::Int32(dt.second() as i32)),
            (Function::FractionalSeconds, [V::TimeOfDay(t)]) => Ok(fraction(t.nanosecond())),
            (Function::FractionalSeconds, [V::DateTimeOffset(dt)]) => Ok(fraction(dt.nanosecond())),
            (Function::Date, [V::DateTimeOffset(dt)]) => Ok(V::Date(dt.date_naive())),
            (Function::Time, [V::DateTimeOffset(dt)]) => Ok(V::TimeOfDay(dt.time())),
            (Function::TotalOffsetMinutes, [V::DateTimeOffset(dt)]) => {
                Ok(V::Int32(dt.offset().local_minus_utc() / 60))
            }
            (Function::TotalSeconds, [V::Duration(secs)]) => Ok(V::Double(*secs)),
            (Function::Now, []) => Ok(V::DateTimeOffset(Utc::now().fixed_offset())),
            (Function::MaxDateTime, []) => max_date_time()
                .map(V::DateTimeOffset)
                .ok_or_else(|| Error::Overflow {
                    operator: function.to_string(),
                }),
            (Function::MinDateTime, []) => min_date_time()
                .map(V::DateTimeOffset)
                .ok_or_else(|| Error::Overflow {
                    operator: function.to_string(),
                }),

            (Function::Round | Function::Floor | Function::Ceiling, [n]) => round(function, n),

            _ => Err(type_error()),
        }
    }
}

impl Evaluator<'_> {
    fn pattern(&self, pattern: &str) -> Result<Regex, Error> {
        if let Some(re) = self.patterns.borrow().get(pattern) {
            return Ok(re.clone());
        }
        let re = Regex::new(pattern).map_err(|e| Error::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
        self.patterns
            .borrow_mut()
            .insert(pattern.to_string(), re.clone());
        Ok(re)
    }

    /// How many distinct `matchesPattern` patterns have been compiled.
    pub fn compiled_patterns(&self) -> usize {
        self.patterns.borrow().len()
    }
}

/// The latest instant OData can represent, `9999-12-31T23:59:59.999999999Z`
pub fn max_date_time() -> Option<DateTime<FixedOffset>> {
    NaiveDate::from_ymd_opt(9999, 12, 31)?
        .and_hms_nano_opt(23, 59, 59, 999_999_999)
        .map(|dt| dt.and_utc().fixed_offset())
}

/// The earliest instant OData can represent, `0001-01-01T00:00:00Z`
pub fn min_date_time() -> Option<DateTime<FixedOffset>> {
    NaiveDate::from_ymd_opt(1, 1, 1)?
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().fixed_offset())
}

fn fraction(nanos: u32) -> PrimitiveValue {
    PrimitiveValue::Double(f64::from(nanos) / 1e9)
}

fn round(function: Function, n: &PrimitiveValue) -> Result<PrimitiveValue, Error> {
    use PrimitiveValue as V;
    Ok(match (function, n) {
        (_, V::Int16(_) | V::Int32(_) | V::Int64(_)) => n.clone(),
        (Function::Round, V::Double(f)) => V::Double(f.round()),
        (Function::Floor, V::Double(f)) => V::Double(f.floor()),
        (Function::Ceiling, V::Double(f)) => V::Double(f.ceil()),
        (Function::Round, V::Single(f)) => V::Single(f.round()),
        (Function::Floor, V::Single(f)) => V::Single(f.floor()),
        (Function::Ceiling, V::Single(f)) => V::Single(f.ceil()),
        (Function::Round, V::Decimal(d)) => {
            V::Decimal(d.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        }
        (Function::Floor, V::Decimal(d)) => V::Decimal(d.floor()),
        (Function::Ceiling, V::Decimal(d)) => V::Decimal(d.ceil()),
        _ => return Err(mismatch(function, &[n])),
    })
}

fn logical(op: BinaryOp, value: PrimitiveValue) -> Result<Option<bool>, Error> {
    match value {
        PrimitiveValue::Boolean(b) => Ok(Some(b)),
        PrimitiveValue::Null => Ok(None),
        other => Err(mismatch(op, &[&other])),
    }
}

fn negate(value: PrimitiveValue) -> Result<PrimitiveValue, Error> {
    use PrimitiveValue as V;
    let overflow = || Error::Overflow {
        operator: UnaryOp::Negate.to_string(),
    };
    Ok(match value {
        V::Null => V::Null,
        V::Int16(n) => V::Int16(n.checked_neg().ok_or_else(overflow)?),
        V::Int32(n) => V::Int32(n.checked_neg().ok_or_else(overflow)?),
        V::Int64(n) => V::Int64(n.checked_neg().ok_or_else(overflow)?),
        V::Single(n) => V::Single(-n),
        V::Double(n) => V::Double(-n),
        V::Decimal(d) => V::Decimal(-d),
        V::Duration(secs) => V::Duration(-secs),
        other => return Err(mismatch(UnaryOp::Negate, &[&other])),
    })
}

/// eq and ne on two non-null values
fn equals(op: BinaryOp, l: &PrimitiveValue, r: &PrimitiveValue) -> Result<bool, Error> {
    use PrimitiveValue as V;
    match (l, r) {
        (V::Binary(a), V::Binary(b)) => Ok(a == b),
        (
            V::Enum {
                type_name: lt,
                member: lm,
            },
            V::Enum {
                type_name: rt,
                member: rm,
            },
        ) => Ok(lt == rt && lm == rm),
        (V::Enum { member, .. }, V::String(s)) | (V::String(s), V::Enum { member, .. }) => {
            Ok(member == s)
        }
        _ => Ok(order(op, l, r)? == Some(Ordering::Equal)),
    }
}

/// Orders two non-null values. None when they are unordered (NaN).
fn order(
    op: BinaryOp,
    l: &PrimitiveValue,
    r: &PrimitiveValue,
) -> Result<Option<Ordering>, Error> {
    use PrimitiveValue as V;

    if let (Some(lc), Some(rc)) = (Class::of(l), Class::of(r))
        && let Some(class) = promote::comparison(lc, rc)
    {
        let ord = match class {
            Class::Integer => match (l.as_i64(), r.as_i64()) {
                (Some(a), Some(b)) => Some(a.cmp(&b)),
                _ => None,
            },
            Class::Decimal => match (l.as_decimal(), r.as_decimal()) {
                (Some(a), Some(b)) => Some(a.cmp(&b)),
                _ => None,
            },
            _ => match (l.as_f64(), r.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        };
        return Ok(ord);
    }

    match (l, r) {
        (V::String(a), V::String(b)) => Ok(Some(a.cmp(b))),
        (V::Boolean(a), V::Boolean(b)) => Ok(Some(a.cmp(b))),
        (V::Date(a), V::Date(b)) => Ok(Some(a.cmp(b))),
        (V::TimeOfDay(a), V::TimeOfDay(b)) => Ok(Some(a.cmp(b))),
        (V::DateTimeOffset(a), V::DateTimeOffset(b)) => Ok(Some(a.cmp(b))),
        (V::Duration(a), V::Duration(b)) => Ok(a.partial_cmp(b)),
        (V::Guid(a), V::Guid(b)) => Ok(Some(a.cmp(b))),
        _ => Err(mismatch(op, &[l, r])),
    }
}

/// Signed seconds as a chrono delta, at microsecond precision
fn delta(secs: f64) -> Option<TimeDelta> {
    let micros = (secs * 1_000_000.0).round();
    if !micros.is_finite() || micros.abs() >= i64::MAX as f64 {
        return None;
    }
    Some(TimeDelta::microseconds(micros as i64))
}

fn seconds(delta: TimeDelta) -> f64 {
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1_000.0,
    }
}

pub(crate) fn arithmetic(
    op: BinaryOp,
    l: &PrimitiveValue,
    r: &PrimitiveValue,
) -> Result<PrimitiveValue, Error> {
    use PrimitiveValue as V;

    if l.is_null() || r.is_null() {
        return Ok(V::Null);
    }
    let (Some(lc), Some(rc)) = (Class::of(l), Class::of(r)) else {
        return Err(mismatch(op, &[l, r]));
    };
    let rule = promote::arithmetic(lc, op, rc).ok_or_else(|| mismatch(op, &[l, r]))?;
    let overflow = || Error::Overflow {
        operator: op.to_string(),
    };

    match (rule, l, r) {
        (Rule::Integer, _, _) => integer(op, l, r),
        (Rule::Decimal, _, _) => {
            let (Some(a), Some(b)) = (l.as_decimal(), r.as_decimal()) else {
                return Err(mismatch(op, &[l, r]));
            };
            let n = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                BinaryOp::Mul => a.checked_mul(b),
                BinaryOp::Div | BinaryOp::DivBy | BinaryOp::Mod if b.is_zero() => {
                    return Err(Error::DivisionByZero);
                }
                BinaryOp::Div | BinaryOp::DivBy => a.checked_div(b),
                _ => a.checked_rem(b),
            };
            n.map(V::Decimal).ok_or_else(overflow)
        }
        (Rule::Float, _, _) => {
            let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
                return Err(mismatch(op, &[l, r]));
            };
            // IEEE rules: dividing by zero gives INF or NaN
            Ok(V::Double(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div | BinaryOp::DivBy => a / b,
                _ => a % b,
            }))
        }
        (Rule::ShiftDate, V::Date(d), V::Duration(secs)) => {
            let step = delta(*secs).ok_or_else(overflow)?;
            let start = d.and_hms_opt(0, 0, 0).ok_or_else(overflow)?;
            let shifted = if op == BinaryOp::Add {
                start.checked_add_signed(step)
            } else {
                start.checked_sub_signed(step)
            };
            shifted.map(|dt| V::Date(dt.date())).ok_or_else(overflow)
        }
        (Rule::ShiftInstant, V::DateTimeOffset(dt), V::Duration(secs)) => {
            let step = delta(*secs).ok_or_else(overflow)?;
            let shifted = if op == BinaryOp::Add {
                dt.checked_add_signed(step)
            } else {
                dt.checked_sub_signed(step)
            };
            shifted.map(V::DateTimeOffset).ok_or_else(overflow)
        }
        (Rule::Durations, V::Duration(a), V::Duration(b)) => Ok(V::Duration(match op {
            BinaryOp::Add => a + b,
            _ => a - b,
        })),
        (Rule::ScaleDuration, _, _) => {
            let (secs, factor) = match (l, r) {
                (V::Duration(secs), n) | (n, V::Duration(secs)) => (*secs, n.as_f64()),
                _ => return Err(mismatch(op, &[l, r])),
            };
            let Some(factor) = factor else {
                return Err(mismatch(op, &[l, r]));
            };
            match op {
                BinaryOp::Mul => Ok(V::Duration(secs * factor)),
                _ if factor == 0.0 => Err(Error::DivisionByZero),
                _ => Ok(V::Duration(secs / factor)),
            }
        }
        (Rule::DateDifference, V::Date(a), V::Date(b)) => {
            Ok(V::Duration(a.signed_duration_since(*b).num_days() as f64 * 86_400.0))
        }
        (Rule::InstantDifference, V::DateTimeOffset(a), V::DateTimeOffset(b)) => {
            Ok(V::Duration(seconds(a.signed_duration_since(*b))))
        }
        _ => Err(mismatch(op, &[l, r])),
    }
}

/// Integer arithmetic in 64 bits. Results narrow back to the wider operand
///  type when they fit, and inexact division promotes to a double.
fn integer(op: BinaryOp, l: &PrimitiveValue, r: &PrimitiveValue) -> Result<PrimitiveValue, Error> {
    let (Some(a), Some(b)) = (l.as_i64(), r.as_i64()) else {
        return Err(mismatch(op, &[l, r]));
    };
    let width = promote::integer_width(l).max(promote::integer_width(r));
    let overflow = || Error::Overflow {
        operator: op.to_string(),
    };

    let n = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div | BinaryOp::DivBy | BinaryOp::Mod if b == 0 => {
            return Err(Error::DivisionByZero);
        }
        BinaryOp::Div | BinaryOp::DivBy => match a.checked_rem(b) {
            Some(0) => a.checked_div(b),
            Some(_) => return Ok(PrimitiveValue::Double(a as f64 / b as f64)),
            None => None,
        },
        _ => a.checked_rem(b),
    };
    n.map(|n| promote::narrow(n, width)).ok_or_else(overflow)
}

/// Whether [record] matches a `$search` tree. A term matches when any of
///  [properties] holds a string containing it, ignoring case.
pub fn matches_search(
    node: &Node,
    record: &dyn RecordContext,
    properties: &[&str],
) -> Result<bool, Error> {
    match node {
        Node::Literal(PrimitiveValue::String(term)) => {
            let term = term.to_lowercase();
            Ok(properties.iter().any(|name| {
                matches!(record.property(name), Some(PrimitiveValue::String(s)) if s.to_lowercase().contains(&term))
            }))
        }
        Node::BinaryOperator(l, BinaryOp::And, r) => {
            Ok(matches_search(l, record, properties)? && matches_search(r, record, properties)?)
        }
        Node::BinaryOperator(l, BinaryOp::Or, r) => {
            Ok(matches_search(l, record, properties)? || matches_search(r, record, properties)?)
        }
        Node::UnaryOperator(UnaryOp::Not, child) => Ok(!matches_search(child, record, properties)?),
        _ => Err(Error::NotImplemented {
            feature: format!("search term {node}"),
        }),
    }
}
