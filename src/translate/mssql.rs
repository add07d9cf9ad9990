//! Important implementation note!
//! MS SQL has booleans (the result of `x = y`) but they're not values so you can't
//!  return them or even use them in most expressions. They're basically only
//!  valid as part of a boolean operation (AND/OR/NOT) or as a WHERE clause.
//!
//! The core handles this through [SqlDialect::boolean_values]: predicates used
//!  as values are forced to `CASE WHEN p THEN 1 WHEN NOT p THEN 0 END` while
//!  values used as predicates are forced to conditionals using `value = 1`.

use super::{CompileContext, Dialect, Error, SqlDialect};
use crate::{
    ast::{BinaryOp, Call, Node},
    functions::Function as F,
};

pub struct SqlServer;

impl SqlDialect for SqlServer {
    fn dialect(&self) -> Dialect {
        Dialect::SqlServer
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    fn translate_fn_call(&self, cx: &mut CompileContext<'_>, call: &Call) -> Result<(), Error> {
        translate_fn_call(cx, call)
    }

    fn translate_binary_op(
        &self,
        cx: &mut CompileContext<'_>,
        l: &Node,
        op: BinaryOp,
        r: &Node,
    ) -> Result<(), Error> {
        translate_binary_op(cx, l, op, r)
    }

    fn boolean_values(&self) -> bool {
        false
    }

    fn like_escape(&self) -> &'static str {
        " ESCAPE '\\'"
    }

    // `[` opens a character class in T-SQL patterns
    fn escape_like(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            if matches!(c, '\\' | '%' | '_' | '[') {
                out.push('\\');
            }
            out.push(c);
        }
        out
    }
}

pub fn translate_binary_op(
    cx: &mut CompileContext<'_>,
    l: &Node,
    op: BinaryOp,
    r: &Node,
) -> Result<(), Error> {
    match op {
        BinaryOp::Div => {
            cx.push_sql("( ");
            cx.cast(l, "BIGINT")?;
            cx.push_sql(" / ");
            cx.cast(r, "BIGINT")?;
            cx.push_sql(" )");
            Ok(())
        }
        BinaryOp::DivBy => {
            cx.push_sql("( ");
            cx.cast(l, "FLOAT")?;
            cx.push_sql(" / ");
            cx.compile_value(r)?;
            cx.push_sql(" )");
            Ok(())
        }
        // T-SQL % rejects float operands
        BinaryOp::Mod => Err(cx.not_implemented("mod")),
        _ => super::translate_binary_op(cx, l, op, r),
    }
}

/// `DATEPART( unit, x )`
fn date_part(cx: &mut CompileContext<'_>, unit: &str, node: &Node) -> Result<(), Error> {
    cx.push_sql("DATEPART( ");
    cx.push_sql(unit);
    cx.push_sql(", ");
    cx.compile_value(node)?;
    cx.push_sql(" )");
    Ok(())
}

pub fn translate_fn_call(cx: &mut CompileContext<'_>, call: &Call) -> Result<(), Error> {
    let args = call.args();
    match call.function() {
        F::Length => cx.function("LEN", args),
        // indexof(s, t) => ( CHARINDEX( t, s ) - 1 )
        F::IndexOf => {
            cx.push_sql("( CHARINDEX( ");
            cx.compile_value(call.arg(1))?;
            cx.push_sql(", ");
            cx.compile_value(call.arg(0))?;
            cx.push_sql(" ) - 1 )");
            Ok(())
        }
        // SUBSTRING always wants a length
        F::Substring if call.optional_arg(2).is_none() => {
            cx.push_sql("SUBSTRING( ");
            cx.compile_value(call.arg(0))?;
            cx.push_sql(", ( ");
            cx.compile_value(call.arg(1))?;
            cx.push_sql(" + 1 ), LEN( ");
            cx.compile_value(call.arg(0))?;
            cx.push_sql(" ) )");
            Ok(())
        }
        // trim(x) => LTRIM( RTRIM( x ) )
        F::Trim => {
            cx.push_sql("LTRIM( ");
            cx.function("RTRIM", args)?;
            cx.push_sql(" )");
            Ok(())
        }
        // round(x) => ROUND( x, 0 )
        F::Round => {
            cx.push_sql("ROUND( ");
            cx.compile_value(call.arg(0))?;
            cx.push_sql(", 0 )");
            Ok(())
        }
        F::Year => date_part(cx, "YEAR", call.arg(0)),
        F::Month => date_part(cx, "MONTH", call.arg(0)),
        F::Day => date_part(cx, "DAY", call.arg(0)),
        F::Hour => date_part(cx, "HOUR", call.arg(0)),
        F::Minute => date_part(cx, "MINUTE", call.arg(0)),
        F::Second => date_part(cx, "SECOND", call.arg(0)),
        F::Now => {
            cx.push_sql("SYSDATETIMEOFFSET()");
            Ok(())
        }
        // No regular expressions in T-SQL
        F::MatchesPattern => Err(cx.not_implemented("matchesPattern")),
        _ => super::translate_fn_call(cx, call),
    }
}
