use super::{CompileContext, Dialect, Error, SqlDialect};
use crate::{
    ast::{BinaryOp, Call, Node},
    functions::Function as F,
};

pub struct Postgres;

impl SqlDialect for Postgres {
    fn dialect(&self) -> Dialect {
        Dialect::PostgreSql
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
}

/// `NAME( CAST( l AS NUMERIC ), CAST( r AS NUMERIC ) )`
fn numeric_call(cx: &mut CompileContext<'_>, name: &str, l: &Node, r: &Node) -> Result<(), Error> {
    cx.push_sql(name);
    cx.push_sql("( ");
    cx.cast(l, "NUMERIC")?;
    cx.push_sql(", ");
    cx.cast(r, "NUMERIC")?;
    cx.push_sql(" )");
    Ok(())
}

pub fn translate_binary_op(
    cx: &mut CompileContext<'_>,
    l: &Node,
    op: BinaryOp,
    r: &Node,
) -> Result<(), Error> {
    match op {
        BinaryOp::Div => numeric_call(cx, "DIV", l, r),
        BinaryOp::Mod => numeric_call(cx, "MOD", l, r),
        // Integer / integer truncates in Postgres
        BinaryOp::DivBy => {
            cx.push_sql("( ");
            cx.cast(l, "DOUBLE PRECISION")?;
            cx.push_sql(" / ");
            cx.compile_value(r)?;
            cx.push_sql(" )");
            Ok(())
        }
        _ => super::translate_binary_op(cx, l, op, r),
    }
}

/// `DATE_PART( 'unit', x )`
fn date_part(cx: &mut CompileContext<'_>, unit: &str, node: &Node) -> Result<(), Error> {
    cx.push_sql("DATE_PART( '");
    cx.push_sql(unit);
    cx.push_sql("', ");
    cx.compile_value(node)?;
    cx.push_sql(" )");
    Ok(())
}

pub fn translate_fn_call(cx: &mut CompileContext<'_>, call: &Call) -> Result<(), Error> {
    match call.function() {
        // indexof(s, t) => ( STRPOS( s, t ) - 1 )
        F::IndexOf => {
            cx.push_sql("( ");
            cx.function("STRPOS", call.args())?;
            cx.push_sql(" - 1 )");
            Ok(())
        }
        F::MatchesPattern => cx.infix(call.arg(0), "~", call.arg(1)),
        F::Year => date_part(cx, "YEAR", call.arg(0)),
        F::Month => date_part(cx, "MONTH", call.arg(0)),
        F::Day => date_part(cx, "DAY", call.arg(0)),
        F::Hour => date_part(cx, "HOUR", call.arg(0)),
        F::Minute => date_part(cx, "MINUTE", call.arg(0)),
        // The SECOND part carries the fraction
        F::Second => {
            cx.push_sql("FLOOR( ");
            date_part(cx, "SECOND", call.arg(0))?;
            cx.push_sql(" )");
            Ok(())
        }
        F::FractionalSeconds => {
            cx.push_sql("( ");
            date_part(cx, "SECOND", call.arg(0))?;
            cx.push_sql(" - FLOOR( ");
            date_part(cx, "SECOND", call.arg(0))?;
            cx.push_sql(" ) )");
            Ok(())
        }
        F::Now => {
            cx.push_sql("NOW()");
            Ok(())
        }
        _ => super::translate_fn_call(cx, call),
    }
}
