use super::{CompileContext, Dialect, Error, SqlDialect, concat_operands};
use crate::{
    ast::{BinaryOp, Call, Lambda, Node},
    functions::Function as F,
};

pub struct Sqlite;

impl SqlDialect for Sqlite {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
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

    // SQLite has no quantified comparisons
    fn translate_lambda(&self, cx: &mut CompileContext<'_>, lambda: &Lambda) -> Result<(), Error> {
        Err(cx.not_implemented(format!("{} lambda", lambda.quantifier)))
    }

    fn like_escape(&self) -> &'static str {
        " ESCAPE '\\'"
    }
}

/// `( CAST( l AS ty ) op CAST( r AS ty ) )`
fn cast_both(
    cx: &mut CompileContext<'_>,
    l: &Node,
    op: &str,
    r: &Node,
    ty: &str,
) -> Result<(), Error> {
    cx.push_sql("( ");
    cx.cast(l, ty)?;
    cx.push_sql(" ");
    cx.push_sql(op);
    cx.push_sql(" ");
    cx.cast(r, ty)?;
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
        BinaryOp::Div => cast_both(cx, l, "/", r, "INTEGER"),
        BinaryOp::Mod => cast_both(cx, l, "%", r, "INTEGER"),
        BinaryOp::DivBy => {
            cx.push_sql("( ");
            cx.cast(l, "REAL")?;
            cx.push_sql(" / ");
            cx.compile_value(r)?;
            cx.push_sql(" )");
            Ok(())
        }
        _ => super::translate_binary_op(cx, l, op, r),
    }
}

/// `CAST( STRFTIME( 'format', x ) AS NUMERIC )`
fn strftime(cx: &mut CompileContext<'_>, format: &str, node: &Node) -> Result<(), Error> {
    cx.push_sql("CAST( STRFTIME( '");
    cx.push_sql(format);
    cx.push_sql("', ");
    cx.compile_value(node)?;
    cx.push_sql(" ) AS NUMERIC )");
    Ok(())
}

pub fn translate_fn_call(cx: &mut CompileContext<'_>, call: &Call) -> Result<(), Error> {
    let args = call.args();
    match call.function() {
        F::IndexOf => {
            cx.push_sql("( ");
            cx.function("INSTR", args)?;
            cx.push_sql(" - 1 )");
            Ok(())
        }
        F::Substring => super::substring(cx, "SUBSTR", call),
        // No CONCAT before 3.44, so chain with ||
        F::Concat => {
            cx.push_sql("( ");
            cx.separated(&concat_operands(call), " || ")?;
            cx.push_sql(" )");
            Ok(())
        }
        F::MatchesPattern => cx.infix(call.arg(0), "REGEXP", call.arg(1)),
        F::Year => strftime(cx, "%Y", call.arg(0)),
        F::Month => strftime(cx, "%m", call.arg(0)),
        F::Day => strftime(cx, "%d", call.arg(0)),
        F::Hour => strftime(cx, "%H", call.arg(0)),
        F::Minute => strftime(cx, "%M", call.arg(0)),
        F::Second => strftime(cx, "%S", call.arg(0)),
        F::Date => cx.function("DATE", args),
        F::Time => cx.function("TIME", args),
        F::Now => {
            cx.push_sql("DATETIME( 'now' )");
            Ok(())
        }
        _ => super::translate_fn_call(cx, call),
    }
}
