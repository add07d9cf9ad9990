use super::{CompileContext, Dialect, Error, SqlDialect};
use crate::{
    ast::{BinaryOp, Call, Node},
    functions::Function as F,
};

pub struct MySql;

impl SqlDialect for MySql {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
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

pub fn translate_binary_op(
    cx: &mut CompileContext<'_>,
    l: &Node,
    op: BinaryOp,
    r: &Node,
) -> Result<(), Error> {
    match op {
        // DIV truncates, / always gives a decimal
        BinaryOp::Div => cx.infix(l, "DIV", r),
        BinaryOp::Mod => cx.infix(l, "MOD", r),
        _ => super::translate_binary_op(cx, l, op, r),
    }
}

pub fn translate_fn_call(cx: &mut CompileContext<'_>, call: &Call) -> Result<(), Error> {
    let args = call.args();
    match call.function() {
        // length(x) => CHAR_LENGTH( x ), LENGTH counts bytes
        F::Length => cx.function("CHAR_LENGTH", args),
        // indexof(s, t) => ( INSTR( s, t ) - 1 )
        F::IndexOf => {
            cx.push_sql("( ");
            cx.function("INSTR", args)?;
            cx.push_sql(" - 1 )");
            Ok(())
        }
        F::MatchesPattern => cx.infix(call.arg(0), "REGEXP", call.arg(1)),
        F::Year => cx.function("YEAR", args),
        F::Month => cx.function("MONTH", args),
        F::Day => cx.function("DAY", args),
        F::Hour => cx.function("HOUR", args),
        F::Minute => cx.function("MINUTE", args),
        F::Second => cx.function("SECOND", args),
        // fractionalseconds(x) => ( MICROSECOND( x ) / 1000000 )
        F::FractionalSeconds => {
            cx.push_sql("( ");
            cx.function("MICROSECOND", args)?;
            cx.push_sql(" / 1000000 )");
            Ok(())
        }
        F::Date => cx.function("DATE", args),
        F::Time => cx.function("TIME", args),
        F::Now => {
            cx.push_sql("NOW()");
            Ok(())
        }
        _ => super::translate_fn_call(cx, call),
    }
}
