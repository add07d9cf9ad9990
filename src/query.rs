//! The four expression-valued system query options taken together.
//!  `$compute` is parsed first so its aliases are visible to `$filter` and
//!  `$orderby`, then the options run against one of two back ends: SQL text
//!  with bound parameters, or the in-memory [Evaluator].

use std::{cmp::Ordering, fmt::Display, str::FromStr};

use crate::{
    ast::{ComputeItem, Node, OrderItem},
    catalog::{self, TypeCatalog},
    config::{CompileConfig, Config},
    error::Result,
    evaluate::{self, Evaluator, RecordContext},
    parser,
    translate::{CompileContext, Dialect},
    value::PrimitiveValue,
};

/// Where a query gets executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Sql(Dialect),
}

impl Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => f.write_str("memory"),
            Self::Sql(dialect) => dialect.fmt(f),
        }
    }
}

impl FromStr for Backend {
    type Err = strum::ParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Self::Memory),
            _ => Dialect::from_str(s).map(Self::Sql),
        }
    }
}

/// Raw option text as it arrives on the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub filter: Option<String>,
    pub search: Option<String>,
    pub compute: Option<String>,
    pub orderby: Option<String>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn compute(mut self, compute: impl Into<String>) -> Self {
        self.compute = Some(compute.into());
        self
    }

    pub fn orderby(mut self, orderby: impl Into<String>) -> Self {
        self.orderby = Some(orderby.into());
        self
    }

    pub fn parse(&self, config: &Config) -> Result<ParsedQuery> {
        let mut parser_config = config.parser.clone();
        let compute = match &self.compute {
            Some(text) => parser::parse_compute_with(text, &parser_config)?,
            None => Vec::new(),
        };
        parser_config
            .computed
            .extend(compute.iter().map(|item| item.alias.clone()));

        let filter = self
            .filter
            .as_deref()
            .map(|text| parser::parse_filter_with(text, &parser_config))
            .transpose()?;
        let search = self.search.as_deref().map(parser::parse_search).transpose()?;
        let orderby = match &self.orderby {
            Some(text) => parser::parse_orderby_with(text, &parser_config)?,
            None => Vec::new(),
        };
        Ok(ParsedQuery {
            filter,
            search,
            compute,
            orderby,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedQuery {
    pub filter: Option<Node>,
    pub search: Option<Node>,
    pub compute: Vec<ComputeItem>,
    pub orderby: Vec<OrderItem>,
}

/// Clause bodies without their keywords, so callers can splice them into
///  their own statements. [parameters] runs select, where, order by.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlQuery {
    pub select: Option<String>,
    pub where_clause: Option<String>,
    pub order_by: Option<String>,
    pub parameters: Vec<PrimitiveValue>,
}

impl ParsedQuery {
    pub fn to_sql(
        &self,
        dialect: Dialect,
        catalog: &dyn TypeCatalog,
        config: &CompileConfig,
    ) -> Result<SqlQuery> {
        let expressions = self
            .compute
            .iter()
            .map(|c| &c.expression)
            .chain(&self.filter)
            .chain(self.orderby.iter().map(|o| &o.expression));
        for expression in expressions {
            catalog::validate_filter(expression, catalog)?;
        }
        let searchable = match &self.search {
            Some(_) => catalog::search_properties(catalog, None)?,
            None => Vec::new(),
        };

        let mut cx = CompileContext::new(dialect, catalog, config).with_computed(&self.compute);

        let select = if self.compute.is_empty() {
            None
        } else {
            cx.compile_select(&self.compute)?;
            Some(cx.take_sql())
        };

        let where_clause = match (&self.filter, &self.search) {
            (None, None) => None,
            (Some(filter), None) => {
                cx.compile_predicate(filter)?;
                Some(cx.take_sql())
            }
            (None, Some(search)) => {
                cx.compile_search(search, &searchable)?;
                Some(cx.take_sql())
            }
            (Some(filter), Some(search)) => {
                cx.push_sql("( ");
                cx.compile_predicate(filter)?;
                cx.push_sql(" AND ");
                cx.compile_search(search, &searchable)?;
                cx.push_sql(" )");
                Some(cx.take_sql())
            }
        };

        let order_by = if self.orderby.is_empty() {
            None
        } else {
            cx.compile_order_by(&self.orderby)?;
            Some(cx.take_sql())
        };

        let parameters = cx.into_parameters();
        tracing::debug!(
            %dialect,
            parameters = parameters.len(),
            "compiled query options"
        );
        Ok(SqlQuery {
            select,
            where_clause,
            order_by,
            parameters,
        })
    }

    /// Runs `$filter`, `$search` over [searchable] and `$orderby` against
    ///  [records], keeping those that pass in sorted order.
    pub fn apply<'r, R: RecordContext>(
        &self,
        records: &'r [R],
        searchable: &[&str],
    ) -> Result<Vec<&'r R>> {
        let evaluator = Evaluator::with_computed(&self.compute);
        let mut kept = Vec::new();
        for record in records {
            if let Some(filter) = &self.filter
                && !evaluator.matches(filter, record)?
            {
                continue;
            }
            if let Some(search) = &self.search
                && !evaluate::matches_search(search, record, searchable)?
            {
                continue;
            }
            kept.push(record);
        }

        if !self.orderby.is_empty() {
            let mut failure = None;
            kept.sort_by(|a, b| {
                match evaluator.compare(&self.orderby, *a, *b) {
                    Ok(ord) => ord,
                    Err(e) => {
                        failure.get_or_insert(e);
                        Ordering::Equal
                    }
                }
            });
            if let Some(e) = failure {
                return Err(e.into());
            }
        }
        tracing::debug!(total = records.len(), kept = kept.len(), "applied query options");
        Ok(kept)
    }

    /// The `$compute` values for one record, in declaration order.
    pub fn computed_values(&self, record: &dyn RecordContext) -> Result<Vec<(String, PrimitiveValue)>> {
        let evaluator = Evaluator::with_computed(&self.compute);
        self.compute
            .iter()
            .map(|item| {
                let value = evaluator.evaluate(&item.expression, record)?;
                Ok((item.alias.clone(), value))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EntityTypeDef, PropertyDef};
    use crate::config::Placeholder;
    use crate::evaluate::Entity;
    use crate::value::ValueKind;

    fn catalog() -> EntityTypeDef {
        EntityTypeDef::new("flights")
            .property(PropertyDef::declared("origin", ValueKind::String).searchable())
            .property(PropertyDef::declared("price", ValueKind::Double))
            .property(PropertyDef::declared("secret", ValueKind::String).not_filterable())
    }

    fn flights() -> Vec<Entity> {
        vec![
            Entity::new().with("origin", "LAX").with("price", 80.0),
            Entity::new().with("origin", "JFK").with("price", 120.0),
            Entity::new().with("origin", "LAX").with("price", 300.0),
            Entity::new().with("origin", "SFO").with("price", PrimitiveValue::Null),
        ]
    }

    fn options() -> QueryOptions {
        QueryOptions::new()
            .compute("price mul 2 as doubled")
            .filter("doubled gt 100 and origin eq 'LAX'")
            .search("lax")
            .orderby("doubled desc,origin")
    }

    #[test]
    fn computed_aliases_reach_filter_and_orderby() {
        let parsed = options().parse(&Config::default()).expect("parses");
        assert_eq!(parsed.compute.len(), 1);
        assert_eq!(
            parsed.filter.map(|f| f.to_string()),
            Some("((doubled gt 100) and (origin eq 'LAX'))".to_string())
        );
        assert_eq!(parsed.orderby.len(), 2);
    }

    #[test]
    fn sql_clauses_share_parameters() {
        let parsed = options().parse(&Config::default()).expect("parses");
        let config = CompileConfig {
            placeholder: Placeholder::Numbered,
        };
        let query = parsed
            .to_sql(Dialect::PostgreSql, &catalog(), &config)
            .expect("compiles");
        assert_eq!(
            query.select.as_deref(),
            Some(r#"( "flights"."price" * $1 ) AS "doubled""#)
        );
        assert_eq!(
            query.where_clause.as_deref(),
            Some(concat!(
                r#"( ( ( ( "flights"."price" * $2 ) > $3 ) AND ( "flights"."origin" = $4 ) ) "#,
                r#"AND ( "flights"."origin" LIKE $5 ) )"#
            ))
        );
        assert_eq!(
            query.order_by.as_deref(),
            Some(r#"( "flights"."price" * $6 ) DESC, "flights"."origin" ASC"#)
        );
        assert_eq!(
            query.parameters,
            vec![
                PrimitiveValue::Int32(2),
                PrimitiveValue::Int32(2),
                PrimitiveValue::Int32(100),
                PrimitiveValue::from("LAX"),
                PrimitiveValue::from("%lax%"),
                PrimitiveValue::Int32(2),
            ]
        );
    }

    #[test]
    fn empty_options_compile_to_nothing() {
        let parsed = QueryOptions::new().parse(&Config::default()).expect("parses");
        let query = parsed
            .to_sql(Dialect::MySql, &catalog(), &CompileConfig::default())
            .expect("compiles");
        assert_eq!(query, SqlQuery::default());
    }

    #[test]
    fn validation_runs_before_compiling() {
        let parsed = QueryOptions::new()
            .filter("secret eq 'x'")
            .parse(&Config::default())
            .expect("parses");
        let err = parsed
            .to_sql(Dialect::Sqlite, &catalog(), &CompileConfig::default())
            .expect_err("not filterable");
        assert!(err.is_bad_request());
        assert!(matches!(
            err,
            crate::Error::Catalog(catalog::Error::PropertyNotFilterable { .. })
        ));
    }

    #[test]
    fn compute_and_orderby_are_validated() {
        let compile = |options: QueryOptions| {
            options
                .parse(&Config::default())
                .expect("parses")
                .to_sql(Dialect::MySql, &catalog(), &CompileConfig::default())
        };
        assert!(matches!(
            compile(QueryOptions::new().orderby("secret desc")),
            Err(crate::Error::Catalog(catalog::Error::PropertyNotFilterable { .. }))
        ));
        assert!(matches!(
            compile(QueryOptions::new().compute("altitude add 1 as higher")),
            Err(crate::Error::Catalog(catalog::Error::PropertyNotFound { .. }))
        ));
        assert!(matches!(
            compile(QueryOptions::new().orderby("price, length(secret)")),
            Err(crate::Error::Catalog(catalog::Error::PropertyNotFilterable { .. }))
        ));
        assert!(compile(QueryOptions::new().orderby("price desc")).is_ok());
    }

    #[test]
    fn parse_errors_carry_positions() {
        let err = QueryOptions::new()
            .filter("price gt")
            .parse(&Config::default())
            .expect_err("incomplete");
        assert_eq!(err.position(), Some(8));
    }

    #[test]
    fn in_memory() {
        let records = flights();
        let parsed = options().parse(&Config::default()).expect("parses");
        let kept = parsed.apply(&records, &["origin"]).expect("evaluates");
        let prices: Vec<_> = kept.iter().map(|r| r.property("price")).collect();
        assert_eq!(
            prices,
            vec![
                Some(PrimitiveValue::Double(300.0)),
                Some(PrimitiveValue::Double(80.0))
            ]
        );

        let values = parsed.computed_values(kept[0]).expect("evaluates");
        assert_eq!(
            values,
            vec![("doubled".to_string(), PrimitiveValue::Double(600.0))]
        );
    }

    #[test]
    fn nulls_sort_first() {
        let records = flights();
        let parsed = QueryOptions::new()
            .orderby("price")
            .parse(&Config::default())
            .expect("parses");
        let kept = parsed.apply(&records, &[]).expect("evaluates");
        assert_eq!(kept[0].property("origin"), Some(PrimitiveValue::from("SFO")));
        assert_eq!(kept[3].property("price"), Some(PrimitiveValue::Double(300.0)));
    }

    #[test]
    fn backend_names() {
        assert_eq!("memory".parse::<Backend>(), Ok(Backend::Memory));
        assert_eq!(
            "postgres".parse::<Backend>(),
            Ok(Backend::Sql(Dialect::PostgreSql))
        );
        assert_eq!(Backend::Sql(Dialect::SqlServer).to_string(), "mssql");
        assert!("oracle".parse::<Backend>().is_err());
    }
}
