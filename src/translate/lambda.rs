//! Rewrites `nav/any(v: p)` and `nav/all(v: p)` into correlated subqueries
//!  driven by the navigation's referential constraints:
//!
//! ```text
//! ( source.local = ANY ( SELECT t1.referenced FROM target AS t1 WHERE p ) )
//! ```
//!
//! One such comparison is written per constraint and they are joined with
//!  OR. The predicate compiles with `v` bound to the aliased target, so names
//!  of enclosing scopes keep pointing outside the subquery even when a
//!  navigation leads back to its own table.

use super::{CompileContext, Error};
use crate::ast::{Lambda, Quantifier};
use crate::catalog;

pub fn expand(cx: &mut CompileContext<'_>, lambda: &Lambda) -> Result<(), Error> {
    let navigation = &lambda.navigation;
    let (source, source_qualifier) = cx.resolve_scope(navigation.kind.variable())?;
    let descriptor = source.resolve(&navigation.name)?;
    let Some(target) = descriptor.navigation_target else {
        return Err(catalog::Error::NotANavigation {
            name: navigation.name.clone(),
        }
        .into());
    };
    let constraints = descriptor.referential_constraints;
    if constraints.is_empty() {
        return Err(Error::MissingConstraints {
            name: navigation.name.clone(),
        });
    }
    let alias = cx.next_alias();
    tracing::debug!(
        navigation = %navigation,
        quantifier = %lambda.quantifier,
        constraints = constraints.len(),
        alias = %alias,
        "expanding lambda"
    );

    let comparison = match lambda.quantifier {
        Quantifier::Any => " = ANY ( SELECT ",
        Quantifier::All => " = ALL ( SELECT ",
    };

    if constraints.len() > 1 {
        cx.push_sql("( ");
    }
    for (i, constraint) in constraints.iter().enumerate() {
        if i > 0 {
            cx.push_sql(" OR ");
        }
        let local = source.resolve(&constraint.property)?;
        let referenced = target.resolve(&constraint.referenced_property)?;

        cx.push_sql("( ");
        cx.push_column(&source_qualifier, local.column);
        cx.push_sql(comparison);
        cx.push_column(&alias, referenced.column);
        cx.push_sql(" FROM ");
        cx.push_identifier(target.entity_set());
        cx.push_sql(" AS ");
        cx.push_identifier(&alias);
        if let Some(predicate) = &lambda.predicate {
            cx.push_sql(" WHERE ");
            let mut scoped = cx.enter_scope(target, &lambda.variable);
            scoped.compile_predicate(predicate)?;
        }
        cx.push_sql(" ) )");
    }
    if constraints.len() > 1 {
        cx.push_sql(" )");
    }
    Ok(())
}
