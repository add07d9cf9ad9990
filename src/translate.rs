use std::ops::{Deref, DerefMut};

use crate::ast::{
    BinaryOp, Call, ComputeItem, Lambda, Node, OrderItem, Property, PropertyKind, SortDirection,
    UnaryOp,
};
use crate::catalog::{self, DescriptorKind, PropertyDescriptor, TypeCatalog};
use crate::config::{CompileConfig, Placeholder};
use crate::functions::Function;
use crate::value::{PrimitiveValue, ValueKind};

pub mod lambda;
pub mod mssql;
pub mod mysql;
pub mod postgres;
pub mod sqlite;

#[derive(
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
)]
pub enum Dialect {
    #[strum(to_string = "mysql")]
    MySql,
    #[strum(to_string = "postgresql", serialize = "postgres")]
    PostgreSql,
    #[strum(to_string = "sqlite")]
    Sqlite,
    #[strum(to_string = "mssql", serialize = "sqlserver")]
    SqlServer,
}

impl Dialect {
    pub fn adapter(self) -> &'static dyn SqlDialect {
        match self {
            Self::MySql => &mysql::MySql,
            Self::PostgreSql => &postgres::Postgres,
            Self::Sqlite => &sqlite::Sqlite,
            Self::SqlServer => &mssql::SqlServer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("{feature} is not implemented for {dialect}")]
    NotImplemented { dialect: Dialect, feature: String },
    #[error("{function} can only be used as a predicate or compared to true or false")]
    UnsupportedPredicatePosition { function: Function },
    #[error(transparent)]
    Catalog(#[from] catalog::Error),
    #[error("navigation property '{name}' has no referential constraints")]
    MissingConstraints { name: String },
    #[error("computed property '{name}' is not defined")]
    UnknownComputedProperty { name: String },
    #[error("lambda variable '{name}' is not bound")]
    UnboundVariable { name: String },
}

/// Compiled SQL text and its parameters, one per placeholder in order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub parameters: Vec<PrimitiveValue>,
}

impl std::fmt::Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.sql)
    }
}

/// This trait lets each database control the parts of compilation that
///  differ between them. Every method has a default producing ANSI-flavored
///  SQL. An adapter overrides what differs and hands everything else back to
///  the defaults:
///
/// ```rust
/// # use odata_expr::{ast::Call, functions::Function, translate::{self, CompileContext, Dialect, Error, SqlDialect}};
/// struct Upper;
///
/// impl SqlDialect for Upper {
///     fn dialect(&self) -> Dialect {
///         Dialect::PostgreSql
///     }
///
///     fn translate_fn_call(&self, cx: &mut CompileContext<'_>, call: &Call) -> Result<(), Error> {
///         match call.function() {
///             // Handle the functions which differ here
///             Function::ToUpper => cx.function("UCASE", call.args()),
///             // and delegate the rest
///             _ => translate::translate_fn_call(cx, call),
///         }
///     }
/// }
/// ```
pub trait SqlDialect: Sync {
    fn dialect(&self) -> Dialect;

    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Called for every function call in value position, and for
    ///  `matchesPattern` in predicate position.
    fn translate_fn_call(&self, cx: &mut CompileContext<'_>, call: &Call) -> Result<(), Error> {
        translate_fn_call(cx, call)
    }

    /// Called for comparisons and arithmetic. `and`, `or`, `in` and null
    ///  tests are handled by the core.
    fn translate_binary_op(
        &self,
        cx: &mut CompileContext<'_>,
        l: &Node,
        op: BinaryOp,
        r: &Node,
    ) -> Result<(), Error> {
        translate_binary_op(cx, l, op, r)
    }

    fn translate_lambda(&self, cx: &mut CompileContext<'_>, lambda: &Lambda) -> Result<(), Error> {
        lambda::expand(cx, lambda)
    }

    /// Whether boolean expressions are values. When they are not, boolean
    ///  values in predicate position are compared to 1 and predicates in
    ///  value position become `CASE WHEN p THEN 1 WHEN NOT p THEN 0 END`.
    fn boolean_values(&self) -> bool {
        true
    }

    /// Appended after every LIKE pattern
    fn like_escape(&self) -> &'static str {
        ""
    }

    /// Escapes LIKE metacharacters with a backslash
    fn escape_like(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            if matches!(c, '\\' | '%' | '_') {
                out.push('\\');
            }
            out.push(c);
        }
        out
    }
}

struct Frame<'a> {
    catalog: &'a dyn TypeCatalog,
    variable: Option<String>,
    /// What columns are qualified with: the table name for the root, the
    ///  subquery alias otherwise
    qualifier: String,
}

/// State for one compilation: the statement buffer, the parameters in
///  placeholder order and the stack of lambda scopes. The bottom scope is
///  the entity set being queried.
pub struct CompileContext<'a> {
    sql: String,
    parameters: Vec<PrimitiveValue>,
    adapter: &'a dyn SqlDialect,
    placeholder: Placeholder,
    scopes: Vec<Frame<'a>>,
    computed: &'a [ComputeItem],
}

/// Pops the scope it was created for when dropped, on every exit path.
pub struct ScopeGuard<'g, 'a> {
    cx: &'g mut CompileContext<'a>,
}

impl<'a> Deref for ScopeGuard<'_, 'a> {
    type Target = CompileContext<'a>;

    fn deref(&self) -> &Self::Target {
        self.cx
    }
}

impl DerefMut for ScopeGuard<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.cx
    }
}

impl Drop for ScopeGuard<'_, '_> {
    fn drop(&mut self) {
        self.cx.scopes.pop();
    }
}

impl<'a> CompileContext<'a> {
    pub fn new(dialect: Dialect, catalog: &'a dyn TypeCatalog, config: &CompileConfig) -> Self {
        Self::with_adapter(dialect.adapter(), catalog, config)
    }

    /// A context for a custom [SqlDialect] implementation.
    pub fn with_adapter(
        adapter: &'a dyn SqlDialect,
        catalog: &'a dyn TypeCatalog,
        config: &CompileConfig,
    ) -> Self {
        Self {
            sql: String::new(),
            parameters: Vec::new(),
            adapter,
            placeholder: config.placeholder,
            scopes: vec![Frame {
                catalog,
                variable: None,
                qualifier: catalog.entity_set().to_string(),
            }],
            computed: &[],
        }
    }

    /// `$compute` definitions that computed properties inline.
    pub fn with_computed(mut self, computed: &'a [ComputeItem]) -> Self {
        self.computed = computed;
        self
    }

    #[inline]
    pub fn dialect(&self) -> Dialect {
        self.adapter.dialect()
    }

    #[inline]
    pub fn adapter(&self) -> &'a dyn SqlDialect {
        self.adapter
    }

    pub fn push_sql(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    /// Binds [value] and writes its placeholder.
    pub fn push_param(&mut self, value: PrimitiveValue) {
        self.parameters.push(value);
        let placeholder = self.placeholder.render(self.parameters.len());
        self.sql.push_str(&placeholder);
    }

    pub fn push_identifier(&mut self, name: &str) {
        let quoted = self.adapter.quote_identifier(name);
        self.sql.push_str(&quoted);
    }

    /// Writes `table.column`, both quoted.
    pub fn push_column(&mut self, table: &str, column: &str) {
        self.push_identifier(table);
        self.push_sql(".");
        self.push_identifier(column);
    }

    pub fn not_implemented(&self, feature: impl Into<String>) -> Error {
        Error::NotImplemented {
            dialect: self.dialect(),
            feature: feature.into(),
        }
    }

    /// Makes [variable] resolve to [catalog] until the guard is dropped.
    ///  Its columns are qualified with [CompileContext::next_alias] as it was
    ///  before the call.
    pub fn enter_scope<'g>(
        &'g mut self,
        catalog: &'a dyn TypeCatalog,
        variable: &str,
    ) -> ScopeGuard<'g, 'a> {
        let qualifier = self.next_alias();
        self.scopes.push(Frame {
            catalog,
            variable: Some(variable.to_string()),
            qualifier,
        });
        ScopeGuard { cx: self }
    }

    /// The table alias the next [CompileContext::enter_scope] binds: `t1`
    ///  directly under the root, `t2` one level deeper and so on.
    pub fn next_alias(&self) -> String {
        format!("t{}", self.scopes.len())
    }

    /// The queried entity set
    pub fn root(&self) -> &'a dyn TypeCatalog {
        self.scopes[0].catalog
    }

    /// The catalog a lambda variable is bound to
    pub fn scope(&self, variable: &str) -> Result<&'a dyn TypeCatalog, Error> {
        self.resolve_scope(Some(variable)).map(|(catalog, _)| catalog)
    }

    /// The catalog and column qualifier for [variable], or for the root when
    ///  there is none.
    pub fn resolve_scope(
        &self,
        variable: Option<&str>,
    ) -> Result<(&'a dyn TypeCatalog, String), Error> {
        let frame = match variable {
            None => &self.scopes[0],
            Some(variable) => self
                .scopes
                .iter()
                .rev()
                .find(|frame| frame.variable.as_deref() == Some(variable))
                .ok_or_else(|| Error::UnboundVariable {
                    name: variable.to_string(),
                })?,
        };
        Ok((frame.catalog, frame.qualifier.clone()))
    }

    /// The SQL written so far, leaving the buffer empty. Parameters keep
    ///  accumulating, so several clauses can share one parameter list.
    pub fn take_sql(&mut self) -> String {
        std::mem::take(&mut self.sql)
    }

    pub fn into_parameters(self) -> Vec<PrimitiveValue> {
        self.parameters
    }

    pub fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            parameters: self.parameters,
        }
    }

    /// Writes `NAME( a, b )`.
    pub fn function(&mut self, name: &str, args: &[Node]) -> Result<(), Error> {
        self.push_sql(name);
        self.push_sql("(");
        for (i, arg) in args.iter().enumerate() {
            self.push_sql(if i == 0 { " " } else { ", " });
            self.compile_value(arg)?;
        }
        self.push_sql(if args.is_empty() { ")" } else { " )" });
        Ok(())
    }

    /// Writes `( l op r )` with both sides as values.
    pub fn infix(&mut self, l: &Node, op: &str, r: &Node) -> Result<(), Error> {
        self.push_sql("( ");
        self.compile_value(l)?;
        self.push_sql(" ");
        self.push_sql(op);
        self.push_sql(" ");
        self.compile_value(r)?;
        self.push_sql(" )");
        Ok(())
    }

    /// Writes [nodes] as values with [separator] between them.
    pub fn separated(&mut self, nodes: &[&Node], separator: &str) -> Result<(), Error> {
        for (i, node) in nodes.iter().enumerate() {
            if i > 0 {
                self.push_sql(separator);
            }
            self.compile_value(node)?;
        }
        Ok(())
    }

    /// Writes `EXTRACT( unit FROM x )`.
    pub fn extract(&mut self, unit: &str, node: &Node) -> Result<(), Error> {
        self.push_sql("EXTRACT( ");
        self.push_sql(unit);
        self.push_sql(" FROM ");
        self.compile_value(node)?;
        self.push_sql(" )");
        Ok(())
    }

    /// Writes `CAST( x AS ty )`.
    pub fn cast(&mut self, node: &Node, ty: &str) -> Result<(), Error> {
        self.push_sql("CAST( ");
        self.compile_value(node)?;
        self.push_sql(" AS ");
        self.push_sql(ty);
        self.push_sql(" )");
        Ok(())
    }

    fn descriptor(
        &self,
        property: &Property,
    ) -> Result<(String, PropertyDescriptor<'a>), Error> {
        let (catalog, qualifier) = self.resolve_scope(property.kind.variable())?;
        Ok((qualifier, catalog.resolve(&property.name)?))
    }

    /// Duration literals and properties declared as Duration, directly or
    ///  through a computed alias or a negation.
    fn is_duration(&self, node: &Node) -> bool {
        match node {
            Node::Literal(value) => matches!(value, PrimitiveValue::Duration(_)),
            Node::UnaryOperator(UnaryOp::Negate, child) => self.is_duration(child),
            Node::Property(property) if property.kind == PropertyKind::Computed => self
                .computed
                .iter()
                .find(|c| c.alias == property.name)
                .is_some_and(|c| self.is_duration(&c.expression)),
            Node::Property(property) => self
                .descriptor(property)
                .is_ok_and(|(_, d)| d.primitive_type == Some(ValueKind::Duration)),
            _ => false,
        }
    }

    fn property(&mut self, property: &Property) -> Result<(), Error> {
        if property.kind == PropertyKind::Computed {
            let computed = self.computed;
            let item = computed
                .iter()
                .find(|c| c.alias == property.name)
                .ok_or_else(|| Error::UnknownComputedProperty {
                    name: property.name.clone(),
                })?;
            return self.compile_value(&item.expression);
        }

        let (qualifier, descriptor) = self.descriptor(property)?;
        if descriptor.kind == DescriptorKind::Navigation {
            return Err(catalog::Error::NotAPrimitive {
                name: property.name.clone(),
            }
            .into());
        }
        self.push_column(&qualifier, descriptor.column);
        Ok(())
    }

    /// Compiles a node whose result is tested for truth.
    pub fn compile_predicate(&mut self, node: &Node) -> Result<(), Error> {
        tracing::trace!(node = %node, "compiling predicate");
        let adapter = self.adapter;
        match node {
            Node::BinaryOperator(l, op @ (BinaryOp::And | BinaryOp::Or), r) => {
                self.push_sql("( ");
                self.compile_predicate(l)?;
                self.push_sql(if *op == BinaryOp::And { " AND " } else { " OR " });
                self.compile_predicate(r)?;
                self.push_sql(" )");
                Ok(())
            }
            Node::UnaryOperator(UnaryOp::Not, child) => {
                self.push_sql("( NOT ");
                self.compile_predicate(child)?;
                self.push_sql(" )");
                Ok(())
            }
            Node::BinaryOperator(l, op @ (BinaryOp::Eq | BinaryOp::Ne), r)
                if l.is_null_literal() || r.is_null_literal() =>
            {
                let other = if l.is_null_literal() { r } else { l };
                self.push_sql("( ");
                if other.is_null_literal() {
                    self.push_sql("NULL");
                } else {
                    self.compile_value(other)?;
                }
                self.push_sql(if *op == BinaryOp::Eq {
                    " IS NULL )"
                } else {
                    " IS NOT NULL )"
                });
                Ok(())
            }
            Node::BinaryOperator(l, op @ (BinaryOp::Eq | BinaryOp::Ne), r) => {
                match string_predicate_test(l, r) {
                    Some((call, expected)) => self.like(call, (*op == BinaryOp::Eq) != expected),
                    None => adapter.translate_binary_op(self, l, *op, r),
                }
            }
            Node::BinaryOperator(l, BinaryOp::In, r) => self.in_list(l, r),
            Node::BinaryOperator(l, op, r) if op.is_comparison() => {
                adapter.translate_binary_op(self, l, *op, r)
            }
            Node::FunctionCall(call) if call.function().is_string_predicate() => {
                self.like(call, false)
            }
            Node::FunctionCall(call) if call.function() == Function::MatchesPattern => {
                adapter.translate_fn_call(self, call)
            }
            Node::Lambda(lambda) => adapter.translate_lambda(self, lambda),
            _ if adapter.boolean_values() => self.compile_value(node),
            _ => {
                self.push_sql("( ");
                self.compile_value(node)?;
                self.push_sql(" = 1 )");
                Ok(())
            }
        }
    }

    /// Compiles a node whose result is used as a value.
    pub fn compile_value(&mut self, node: &Node) -> Result<(), Error> {
        let adapter = self.adapter;
        match node {
            Node::Literal(PrimitiveValue::Null) => {
                self.push_sql("NULL");
                Ok(())
            }
            Node::Literal(value) => {
                self.push_param(value.clone());
                Ok(())
            }
            Node::Property(property) => self.property(property),
            Node::UnaryOperator(UnaryOp::Negate, child) => {
                self.push_sql("( - ");
                self.compile_value(child)?;
                self.push_sql(" )");
                Ok(())
            }
            Node::BinaryOperator(l, op, r) if op.is_arithmetic() => {
                if self.is_duration(l) || self.is_duration(r) {
                    return Err(self.not_implemented("duration arithmetic"));
                }
                adapter.translate_binary_op(self, l, *op, r)
            }
            Node::FunctionCall(call) if call.function().is_string_predicate() => {
                Err(Error::UnsupportedPredicatePosition {
                    function: call.function(),
                })
            }
            Node::List(_) => Err(self.not_implemented("a list outside of `in`")),
            Node::FunctionCall(call) if call.function() != Function::MatchesPattern => {
                adapter.translate_fn_call(self, call)
            }
            // Everything left is a predicate
            _ if adapter.boolean_values() => self.compile_predicate(node),
            // Spelled out twice so that unknown stays NULL
            _ => {
                self.push_sql("CASE WHEN ");
                self.compile_predicate(node)?;
                self.push_sql(" THEN 1 WHEN NOT ");
                self.compile_predicate(node)?;
                self.push_sql(" THEN 0 END");
                Ok(())
            }
        }
    }

    fn in_list(&mut self, l: &Node, r: &Node) -> Result<(), Error> {
        let Node::List(items) = r else {
            return Err(self.not_implemented("`in` without a list"));
        };
        if items.is_empty() {
            self.push_sql("( 1 = 0 )");
            return Ok(());
        }
        self.push_sql("( ");
        self.compile_value(l)?;
        self.push_sql(" IN ( ");
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push_sql(", ");
            }
            self.compile_value(item)?;
        }
        self.push_sql(" ) )");
        Ok(())
    }

    /// contains, startswith and endswith as `LIKE`. The search text must be
    ///  a literal so its metacharacters can be escaped.
    fn like(&mut self, call: &Call, negated: bool) -> Result<(), Error> {
        let Node::Literal(PrimitiveValue::String(text)) = call.arg(1) else {
            return Err(self.not_implemented(format!(
                "{} with a non-literal search string",
                call.function()
            )));
        };
        let escaped = self.adapter.escape_like(text);
        let pattern = match call.function() {
            Function::StartsWith => format!("{escaped}%"),
            Function::EndsWith => format!("%{escaped}"),
            _ => format!("%{escaped}%"),
        };
        self.push_sql("( ");
        self.compile_value(call.arg(0))?;
        self.push_sql(if negated { " NOT LIKE " } else { " LIKE " });
        self.push_param(PrimitiveValue::String(pattern));
        self.push_sql(self.adapter.like_escape());
        self.push_sql(" )");
        Ok(())
    }

    /// A `$search` tree over [columns] of the root entity set.
    pub fn compile_search(
        &mut self,
        node: &Node,
        columns: &[PropertyDescriptor<'_>],
    ) -> Result<(), Error> {
        match node {
            Node::Literal(PrimitiveValue::String(term)) => {
                let table = self.root().entity_set();
                let pattern = format!("%{}%", self.adapter.escape_like(term));
                self.push_sql("( ");
                for (i, column) in columns.iter().enumerate() {
                    if i > 0 {
                        self.push_sql(" OR ");
                    }
                    self.push_column(table, column.column);
                    self.push_sql(" LIKE ");
                    self.push_param(PrimitiveValue::String(pattern.clone()));
                    self.push_sql(self.adapter.like_escape());
                }
                self.push_sql(" )");
                Ok(())
            }
            Node::BinaryOperator(l, op @ (BinaryOp::And | BinaryOp::Or), r) => {
                self.push_sql("( ");
                self.compile_search(l, columns)?;
                self.push_sql(if *op == BinaryOp::And { " AND " } else { " OR " });
                self.compile_search(r, columns)?;
                self.push_sql(" )");
                Ok(())
            }
            Node::UnaryOperator(UnaryOp::Not, child) => {
                self.push_sql("( NOT ");
                self.compile_search(child, columns)?;
                self.push_sql(" )");
                Ok(())
            }
            _ => Err(self.not_implemented(format!("search term {node}"))),
        }
    }

    /// `expr AS alias, ...`
    pub fn compile_select(&mut self, items: &[ComputeItem]) -> Result<(), Error> {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push_sql(", ");
            }
            self.compile_value(&item.expression)?;
            self.push_sql(" AS ");
            self.push_identifier(&item.alias);
        }
        Ok(())
    }

    /// `expr ASC, ...`
    pub fn compile_order_by(&mut self, items: &[OrderItem]) -> Result<(), Error> {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push_sql(", ");
            }
            self.compile_value(&item.expression)?;
            self.push_sql(match item.direction {
                SortDirection::Ascending => " ASC",
                SortDirection::Descending => " DESC",
            });
        }
        Ok(())
    }
}

/// The operands of a concat chain, nested calls flattened
pub fn concat_operands(call: &Call) -> Vec<&Node> {
    call.args().iter().flat_map(Node::concat_operands).collect()
}

/// `contains(..) eq true` and the like, either way around
fn string_predicate_test<'n>(l: &'n Node, r: &'n Node) -> Option<(&'n Call, bool)> {
    match (l.as_string_predicate(), r.as_bool_literal()) {
        (Some(call), Some(b)) => Some((call, b)),
        _ => match (r.as_string_predicate(), l.as_bool_literal()) {
            (Some(call), Some(b)) => Some((call, b)),
            _ => None,
        },
    }
}

/// The symbol the default binary operator rendering uses
pub fn operator_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::And => "AND",
        BinaryOp::Or => "OR",
        BinaryOp::Eq => "=",
        BinaryOp::Ne => "<>",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::In => "IN",
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div | BinaryOp::DivBy => "/",
        BinaryOp::Mod => "%",
    }
}

/// Default rendering for comparisons and arithmetic: `( l op r )`.
pub fn translate_binary_op(
    cx: &mut CompileContext<'_>,
    l: &Node,
    op: BinaryOp,
    r: &Node,
) -> Result<(), Error> {
    cx.infix(l, operator_symbol(op), r)
}

/// Default function rendering. Dialects override the functions they spell
///  differently; anything without a portable spelling is NotImplemented.
pub fn translate_fn_call(cx: &mut CompileContext<'_>, call: &Call) -> Result<(), Error> {
    let args = call.args();

    match call.function() {
        Function::Contains | Function::StartsWith | Function::EndsWith => {
            Err(Error::UnsupportedPredicatePosition {
                function: call.function(),
            })
        }
        // indexof(s, t) => ( POSITION( t IN s ) - 1 )
        Function::IndexOf => {
            cx.push_sql("( POSITION( ");
            cx.compile_value(call.arg(1))?;
            cx.push_sql(" IN ");
            cx.compile_value(call.arg(0))?;
            cx.push_sql(" ) - 1 )");
            Ok(())
        }
        Function::Length => cx.function("LENGTH", args),
        // substring(s, i[, n]) => SUBSTRING( s, ( i + 1 )[, n] )
        Function::Substring => substring(cx, "SUBSTRING", call),
        Function::ToLower => cx.function("LOWER", args),
        Function::ToUpper => cx.function("UPPER", args),
        Function::Trim => cx.function("TRIM", args),
        // Nested concat calls collapse into one CONCAT
        Function::Concat => {
            cx.push_sql("CONCAT( ");
            cx.separated(&concat_operands(call), ", ")?;
            cx.push_sql(" )");
            Ok(())
        }
        Function::Year => cx.extract("YEAR", call.arg(0)),
        Function::Month => cx.extract("MONTH", call.arg(0)),
        Function::Day => cx.extract("DAY", call.arg(0)),
        Function::Hour => cx.extract("HOUR", call.arg(0)),
        Function::Minute => cx.extract("MINUTE", call.arg(0)),
        Function::Second => cx.extract("SECOND", call.arg(0)),
        Function::Date => cx.cast(call.arg(0), "DATE"),
        Function::Time => cx.cast(call.arg(0), "TIME"),
        Function::Now => {
            cx.push_sql("CURRENT_TIMESTAMP");
            Ok(())
        }
        Function::MaxDateTime | Function::MinDateTime => {
            let value = if call.function() == Function::MaxDateTime {
                crate::evaluate::max_date_time()
            } else {
                crate::evaluate::min_date_time()
            };
            let value = value.ok_or_else(|| cx.not_implemented(call.function().to_string()))?;
            cx.push_param(PrimitiveValue::DateTimeOffset(value));
            Ok(())
        }
        Function::Round => cx.function("ROUND", args),
        Function::Floor => cx.function("FLOOR", args),
        Function::Ceiling => cx.function("CEILING", args),
        Function::MatchesPattern
        | Function::FractionalSeconds
        | Function::TotalOffsetMinutes
        | Function::TotalSeconds => Err(cx.not_implemented(call.function().to_string())),
    }
}

/// `NAME( s, ( start + 1 )[, length] )`: OData counts from zero, SQL from one
pub fn substring(cx: &mut CompileContext<'_>, name: &str, call: &Call) -> Result<(), Error> {
    cx.push_sql(name);
    cx.push_sql("( ");
    cx.compile_value(call.arg(0))?;
    cx.push_sql(", ( ");
    cx.compile_value(call.arg(1))?;
    cx.push_sql(" + 1 )");
    if let Some(length) = call.optional_arg(2) {
        cx.push_sql(", ");
        cx.compile_value(length)?;
    }
    cx.push_sql(" )");
    Ok(())
}

/// Compiles a `$filter` tree against [catalog].
pub fn compile_filter(
    node: &Node,
    dialect: Dialect,
    catalog: &dyn TypeCatalog,
    config: &CompileConfig,
) -> Result<Statement, Error> {
    let mut cx = CompileContext::new(dialect, catalog, config);
    cx.compile_predicate(node)?;
    let statement = cx.finish();
    tracing::debug!(
        %dialect,
        parameters = statement.parameters.len(),
        sql = %statement.sql,
        "compiled filter"
    );
    Ok(statement)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::catalog::{EntityTypeDef, PropertyDef};
    use crate::parser::parse_filter;
    use crate::value::ValueKind;

    fn catalog() -> EntityTypeDef {
        let airports = Arc::new(
            EntityTypeDef::new("airports")
                .property(PropertyDef::declared("code", ValueKind::String))
                .property(PropertyDef::declared("name", ValueKind::String)),
        );
        EntityTypeDef::new("flights")
            .property(PropertyDef::declared("origin", ValueKind::String))
            .property(PropertyDef::declared("price", ValueKind::Double))
            .property(PropertyDef::declared("active", ValueKind::Boolean))
            .property(PropertyDef::declared("seats", ValueKind::Int32).column("seat_count"))
            .property(PropertyDef::declared("departs", ValueKind::DateTimeOffset))
            .property(PropertyDef::declared("delay", ValueKind::Duration))
            .property(PropertyDef::navigation("airports", airports).constraint("origin", "code"))
    }

    fn compile(input: &str, dialect: Dialect) -> Result<Statement, Error> {
        let node = parse_filter(input).expect("a valid parse");
        compile_filter(&node, dialect, &catalog(), &CompileConfig::default())
    }

    #[test]
    fn literals_become_parameters() {
        let statement = compile("origin eq 'lax' and price gt 1.5", Dialect::PostgreSql)
            .expect("compiles");
        assert_eq!(
            statement.sql,
            r#"( ( "flights"."origin" = ? ) AND ( "flights"."price" > ? ) )"#
        );
        assert_eq!(
            statement.parameters,
            vec![PrimitiveValue::from("lax"), PrimitiveValue::Double(1.5)]
        );
    }

    #[test]
    fn columns_follow_the_catalog() {
        let statement = compile("seats ne 4", Dialect::MySql).expect("compiles");
        assert_eq!(statement.sql, "( `flights`.`seat_count` <> ? )");
    }

    #[test]
    fn duration_columns_are_not_arithmetic() {
        use strum::IntoEnumIterator;
        for dialect in Dialect::iter() {
            for input in [
                "departs add delay gt now()",
                "departs sub (-delay) lt now()",
                "delay mul 2 gt duration'PT1H'",
            ] {
                assert!(
                    matches!(compile(input, dialect), Err(Error::NotImplemented { .. })),
                    "{dialect}: {input}"
                );
            }
        }
        // Comparing a duration column is fine
        let statement = compile("delay gt duration'PT1H'", Dialect::PostgreSql).expect("compiles");
        assert_eq!(statement.sql, r#"( "flights"."delay" > ? )"#);
        assert_eq!(statement.parameters, vec![PrimitiveValue::Duration(3_600.0)]);
        assert!(compile("seats add 1 gt 2", Dialect::PostgreSql).is_ok());
    }

    #[test]
    fn null_tests() {
        let statement = compile("origin eq null or null ne price", Dialect::Sqlite)
            .expect("compiles");
        assert_eq!(
            statement.sql,
            r#"( ( "flights"."origin" IS NULL ) OR ( "flights"."price" IS NOT NULL ) )"#
        );
        assert!(statement.parameters.is_empty());
    }

    #[test]
    fn in_and_not() {
        let statement = compile("not (origin in ('a', 'b'))", Dialect::PostgreSql)
            .expect("compiles");
        assert_eq!(statement.sql, r#"( NOT ( "flights"."origin" IN ( ?, ? ) ) )"#);
        assert_eq!(statement.parameters.len(), 2);
    }

    #[test]
    fn string_predicates() {
        let statement = compile("contains(origin, '5%_')", Dialect::PostgreSql).expect("compiles");
        assert_eq!(statement.sql, r#"( "flights"."origin" LIKE ? )"#);
        assert_eq!(statement.parameters, vec![PrimitiveValue::from(r"%5\%\_%")]);

        let statement =
            compile("startswith(origin, 'L') eq false", Dialect::Sqlite).expect("compiles");
        assert_eq!(statement.sql, r#"( "flights"."origin" NOT LIKE ? ESCAPE '\' )"#);
        assert_eq!(statement.parameters, vec![PrimitiveValue::from("L%")]);

        assert_eq!(
            compile("length(endswith(origin, 'x')) eq 1", Dialect::MySql),
            Err(Error::UnsupportedPredicatePosition {
                function: Function::EndsWith
            })
        );
    }

    #[test]
    fn negation_and_arithmetic() {
        let statement = compile("-price add 2 lt 0", Dialect::MySql).expect("compiles");
        assert_eq!(statement.sql, "( ( ( - `flights`.`price` ) + ? ) < ? )");
    }

    #[test]
    fn unknown_property() {
        assert!(matches!(
            compile("colour eq 'red'", Dialect::MySql),
            Err(Error::Catalog(catalog::Error::PropertyNotFound { .. }))
        ));
    }

    #[test]
    fn placeholder_styles() {
        let node = parse_filter("origin eq 'a' or origin eq 'b'").expect("a valid parse");
        let numbered = CompileConfig {
            placeholder: Placeholder::Numbered,
        };
        let statement =
            compile_filter(&node, Dialect::PostgreSql, &catalog(), &numbered).expect("compiles");
        assert_eq!(
            statement.sql,
            r#"( ( "flights"."origin" = $1 ) OR ( "flights"."origin" = $2 ) )"#
        );
        let named = CompileConfig {
            placeholder: Placeholder::Named,
        };
        let statement =
            compile_filter(&node, Dialect::SqlServer, &catalog(), &named).expect("compiles");
        assert_eq!(
            statement.sql,
            "( ( [flights].[origin] = @p1 ) OR ( [flights].[origin] = @p2 ) )"
        );
    }

    #[test]
    fn boolean_columns_on_sql_server() {
        let statement = compile("active and not active", Dialect::SqlServer).expect("compiles");
        assert_eq!(
            statement.sql,
            "( ( [flights].[active] = 1 ) AND ( NOT ( [flights].[active] = 1 ) ) )"
        );
        let statement = compile("active", Dialect::PostgreSql).expect("compiles");
        assert_eq!(statement.sql, r#""flights"."active""#);
    }

    #[test]
    fn scope_guard_pops() {
        let catalog = catalog();
        let airports = catalog
            .resolve("airports")
            .ok()
            .and_then(|d| d.navigation_target)
            .expect("navigation target");
        let mut cx = CompileContext::new(Dialect::MySql, &catalog, &CompileConfig::default());
        {
            let guard = cx.enter_scope(airports, "a");
            assert_eq!(guard.scope("a").map(|c| c.entity_set()), Ok("airports"));
        }
        assert_eq!(
            cx.scope("a").map(|c| c.entity_set()),
            Err(Error::UnboundVariable { name: "a".into() })
        );
    }

    #[test]
    fn dialect_names() {
        assert_eq!(Dialect::PostgreSql.to_string(), "postgresql");
        assert_eq!("postgres".parse::<Dialect>(), Ok(Dialect::PostgreSql));
        assert_eq!("mssql".parse::<Dialect>(), Ok(Dialect::SqlServer));
    }
}
