use std::sync::Arc;

use strum::IntoEnumIterator;

use crate::{
    Backend, Config, Dialect, QueryOptions,
    catalog::{EntityTypeDef, PropertyDef},
    config::{CompileConfig, Placeholder},
    evaluate::{Entity, Evaluator, RecordContext},
    parser::{self, parse_filter},
    translate::{self, Statement, compile_filter},
    value::{PrimitiveValue, ValueKind},
};

fn catalog() -> EntityTypeDef {
    let airports = Arc::new(
        EntityTypeDef::new("airports")
            .property(PropertyDef::declared("code", ValueKind::String))
            .property(PropertyDef::declared("city", ValueKind::String)),
    );
    EntityTypeDef::new("flights")
        .property(PropertyDef::declared("id", ValueKind::Int32))
        .property(PropertyDef::declared("origin", ValueKind::String).searchable())
        .property(PropertyDef::declared("destination", ValueKind::String))
        .property(PropertyDef::declared("title", ValueKind::String).searchable())
        .property(PropertyDef::declared("price", ValueKind::Double))
        .property(PropertyDef::declared("departs", ValueKind::DateTimeOffset))
        .property(
            PropertyDef::navigation("origin_airport", airports.clone()).constraint("origin", "code"),
        )
        .property(
            PropertyDef::navigation("airports", airports)
                .constraint("origin", "code")
                .constraint("destination", "code"),
        )
}

fn compile(input: &str, dialect: Dialect) -> Result<Statement, translate::Error> {
    let node = parse_filter(input).expect("a valid parse");
    compile_filter(&node, dialect, &catalog(), &CompileConfig::default())
}

fn sql(input: &str, dialect: Dialect) -> String {
    compile(input, dialect).expect("compiles").sql
}

#[test]
fn same_parameters_on_every_dialect() {
    for dialect in Dialect::iter() {
        let statement = compile("origin eq 'lax'", dialect).expect("compiles");
        assert_eq!(statement.parameters, vec![PrimitiveValue::from("lax")]);
        assert_eq!(statement.sql.matches('?').count(), 1);
    }
    assert_eq!(sql("origin eq 'lax'", Dialect::MySql), "( `flights`.`origin` = ? )");
    assert_eq!(
        sql("origin eq 'lax'", Dialect::PostgreSql),
        r#"( "flights"."origin" = ? )"#
    );
    assert_eq!(sql("origin eq 'lax'", Dialect::Sqlite), r#"( "flights"."origin" = ? )"#);
    assert_eq!(
        sql("origin eq 'lax'", Dialect::SqlServer),
        "( [flights].[origin] = ? )"
    );
}

#[test]
fn lambda_structure() {
    let one = sql("origin_airport/any(a:a/city eq 'Boston')", Dialect::PostgreSql);
    assert_eq!(one.matches("= ANY").count(), 1);
    assert!(!one.contains(" OR "));

    let two = sql("airports/any(a:a/city eq 'Boston')", Dialect::MySql);
    assert_eq!(two.matches("= ANY").count(), 2);
    assert_eq!(two.matches(" OR ").count(), 1);
    assert_eq!(
        two,
        concat!(
            "( ( `flights`.`origin` = ANY ( SELECT `t1`.`code` FROM `airports` AS `t1` ",
            "WHERE ( `t1`.`city` = ? ) ) ) OR ",
            "( `flights`.`destination` = ANY ( SELECT `t1`.`code` FROM `airports` AS `t1` ",
            "WHERE ( `t1`.`city` = ? ) ) ) )"
        )
    );

    let all = sql("origin_airport/all(a:a/city ne 'x')", Dialect::SqlServer);
    assert!(all.contains("= ALL ( SELECT [t1].[code] FROM [airports] AS [t1]"));
}

/// The same catalog for people and their friends, so every column name
///  exists both inside and outside the subquery.
fn people() -> EntityTypeDef {
    let person = || {
        EntityTypeDef::new("people")
            .property(PropertyDef::declared("id", ValueKind::Int32))
            .property(PropertyDef::declared("name", ValueKind::String))
            .property(PropertyDef::declared("friend_of", ValueKind::Int32))
    };
    let friends = |target: EntityTypeDef| {
        PropertyDef::navigation("friends", Arc::new(target)).constraint("id", "friend_of")
    };
    person().property(friends(person().property(friends(person()))))
}

fn people_sql(input: &str, dialect: Dialect) -> String {
    let node = parse_filter(input).expect("a valid parse");
    compile_filter(&node, dialect, &people(), &CompileConfig::default())
        .expect("compiles")
        .sql
}

#[test]
fn lambda_columns_stay_in_their_scope() {
    let root = "friends/any(f:f/name eq name)";
    assert_eq!(
        people_sql(root, Dialect::MySql),
        concat!(
            "( `people`.`id` = ANY ( SELECT `t1`.`friend_of` FROM `people` AS `t1` ",
            "WHERE ( `t1`.`name` = `people`.`name` ) ) )"
        )
    );
    assert_eq!(
        people_sql(root, Dialect::PostgreSql),
        concat!(
            r#"( "people"."id" = ANY ( SELECT "t1"."friend_of" FROM "people" AS "t1" "#,
            r#"WHERE ( "t1"."name" = "people"."name" ) ) )"#
        )
    );
    assert_eq!(
        people_sql(root, Dialect::SqlServer),
        concat!(
            "( [people].[id] = ANY ( SELECT [t1].[friend_of] FROM [people] AS [t1] ",
            "WHERE ( [t1].[name] = [people].[name] ) ) )"
        )
    );
}

#[test]
fn nested_lambdas_reach_outer_variables() {
    let outer = "friends/any(f:f/friends/any(g:g/name eq f/name and g/id ne id))";
    let expected = [
        (
            Dialect::MySql,
            concat!(
                "( `people`.`id` = ANY ( SELECT `t1`.`friend_of` FROM `people` AS `t1` ",
                "WHERE ( `t1`.`id` = ANY ( SELECT `t2`.`friend_of` FROM `people` AS `t2` ",
                "WHERE ( ( `t2`.`name` = `t1`.`name` ) AND ( `t2`.`id` <> `people`.`id` ) ) ) ) ) )"
            ),
        ),
        (
            Dialect::PostgreSql,
            concat!(
                r#"( "people"."id" = ANY ( SELECT "t1"."friend_of" FROM "people" AS "t1" "#,
                r#"WHERE ( "t1"."id" = ANY ( SELECT "t2"."friend_of" FROM "people" AS "t2" "#,
                r#"WHERE ( ( "t2"."name" = "t1"."name" ) AND ( "t2"."id" <> "people"."id" ) ) ) ) ) )"#
            ),
        ),
        (
            Dialect::SqlServer,
            concat!(
                "( [people].[id] = ANY ( SELECT [t1].[friend_of] FROM [people] AS [t1] ",
                "WHERE ( [t1].[id] = ANY ( SELECT [t2].[friend_of] FROM [people] AS [t2] ",
                "WHERE ( ( [t2].[name] = [t1].[name] ) AND ( [t2].[id] <> [people].[id] ) ) ) ) ) )"
            ),
        ),
    ];
    for (dialect, sql) in expected {
        assert_eq!(people_sql(outer, dialect), sql, "{dialect}");
    }
}

#[test]
fn one_placeholder_per_parameter() {
    let input = "origin eq 'a' and (price gt 3 or title in ('x', 'y'))";
    let node = parse_filter(input).expect("a valid parse");
    for (placeholder, last) in [
        (Placeholder::Question, "?"),
        (Placeholder::Numbered, "$4"),
        (Placeholder::Named, "@p4"),
    ] {
        let config = CompileConfig { placeholder };
        let statement =
            compile_filter(&node, Dialect::SqlServer, &catalog(), &config).expect("compiles");
        assert_eq!(statement.parameters.len(), 4);
        assert!(statement.sql.contains(last), "{}", statement.sql);
    }

    let config = CompileConfig {
        placeholder: Placeholder::Named,
    };
    let statement = compile_filter(&node, Dialect::SqlServer, &catalog(), &config).expect("compiles");
    assert_eq!(
        statement.sql,
        concat!(
            "( ( [flights].[origin] = @p1 ) AND ( ( [flights].[price] > @p2 ) OR ",
            "( [flights].[title] IN ( @p3, @p4 ) ) ) )"
        )
    );
    assert_eq!(statement.to_string(), statement.sql);
}

#[test]
fn truth_tables() {
    use PrimitiveValue::{Boolean, Null};
    let record = |_: &str| -> Option<PrimitiveValue> { None };
    let values = [("true", Boolean(true)), ("false", Boolean(false)), ("null", Null)];
    let and = [
        [Boolean(true), Boolean(false), Null],
        [Boolean(false), Boolean(false), Boolean(false)],
        [Null, Boolean(false), Null],
    ];
    let or = [
        [Boolean(true), Boolean(true), Boolean(true)],
        [Boolean(true), Boolean(false), Null],
        [Boolean(true), Null, Null],
    ];
    for (i, (l, _)) in values.iter().enumerate() {
        for (j, (r, _)) in values.iter().enumerate() {
            let node = parse_filter(&format!("{l} and {r}")).expect("a valid parse");
            assert_eq!(node.evaluate(&record), Ok(and[i][j].clone()), "{l} and {r}");
            let node = parse_filter(&format!("{l} or {r}")).expect("a valid parse");
            assert_eq!(node.evaluate(&record), Ok(or[i][j].clone()), "{l} or {r}");
        }
    }
    for (text, value) in &values {
        let expected = match value {
            Boolean(b) => Boolean(!b),
            _ => Null,
        };
        let node = parse_filter(&format!("not {text}")).expect("a valid parse");
        assert_eq!(node.evaluate(&record), Ok(expected));
    }
}

#[test]
fn arithmetic_promotion() {
    let record = |_: &str| -> Option<PrimitiveValue> { None };
    let eval = |input: &str| parse_filter(input).expect("a valid parse").evaluate(&record);
    assert_eq!(eval("1 add 2"), Ok(PrimitiveValue::Int32(3)));
    assert_eq!(eval("1 add 2.1"), Ok(PrimitiveValue::Double(3.1)));
    assert_eq!(eval("4 div 0"), Err(crate::evaluate::Error::DivisionByZero));
    assert_eq!(eval("4.1 div 0"), Ok(PrimitiveValue::Double(f64::INFINITY)));
}

#[test]
fn syntax_errors() {
    assert!(matches!(
        parse_filter("concat(title,'abc',4.0)"),
        Err(parser::Error::WrongArgumentCount { got: 3, .. })
    ));
    assert!(matches!(
        parse_filter("(id lt 4 and (id ge 7 or id gt 3)"),
        Err(parser::Error::UnbalancedParentheses { .. })
    ));
    let err: crate::Error = parse_filter("(id lt 4 a").expect_err("stray token").into();
    assert!(err.is_bad_request());
    assert_eq!(err.position(), Some(9));
    assert_eq!(parse_filter("   "), Err(parser::Error::NoExpression));
}

#[test]
fn not_implemented_is_raised_per_dialect() {
    let not_implemented = |input: &str, dialect: Dialect| {
        matches!(
            compile(input, dialect),
            Err(translate::Error::NotImplemented { dialect: d, .. }) if d == dialect
        )
    };
    assert!(not_implemented("id mod 2 eq 0", Dialect::SqlServer));
    assert!(!not_implemented("id mod 2 eq 0", Dialect::MySql));
    assert!(not_implemented("matchesPattern(title, '^A')", Dialect::SqlServer));
    assert!(not_implemented("origin_airport/any(a:a/city eq 'x')", Dialect::Sqlite));
    assert!(not_implemented("fractionalseconds(departs) gt 0", Dialect::Sqlite));
    for dialect in Dialect::iter() {
        assert!(not_implemented("departs add duration'P1D' gt now()", dialect));
        assert!(not_implemented("contains(title, origin)", dialect));
    }
}

#[test]
fn string_predicates_only_as_predicates() {
    assert!(matches!(
        compile("contains(title, 'x') add 1 eq 2", Dialect::PostgreSql),
        Err(translate::Error::UnsupportedPredicatePosition { .. })
    ));
    assert_eq!(
        sql("startswith(title, '50%') eq false", Dialect::PostgreSql),
        r#"( "flights"."title" NOT LIKE ? )"#
    );
    let statement = compile("startswith(title, '50%') eq false", Dialect::PostgreSql)
        .expect("compiles");
    assert_eq!(statement.parameters, vec![PrimitiveValue::from(r"50\%%")]);
}

#[test]
fn backends_agree() {
    let records = vec![
        Entity::new()
            .with("id", 1)
            .with("origin", "BOS")
            .with("title", "Morning shuttle")
            .with("price", 99.0),
        Entity::new()
            .with("id", 2)
            .with("origin", "LAX")
            .with("title", "Red eye")
            .with("price", 250.0),
        Entity::new()
            .with("id", 3)
            .with("origin", "BOS")
            .with("title", "Evening shuttle")
            .with("price", 120.0),
    ];
    // `in` with a null item is unknown on a miss, so `not` keeps it out
    let unknown = parse_filter("not (id in (1, null))").expect("a valid parse");
    let kept: Vec<_> = records
        .iter()
        .filter(|r| Evaluator::default().matches(&unknown, *r) == Ok(true))
        .collect();
    assert!(kept.is_empty());
    for dialect in [Dialect::MySql, Dialect::PostgreSql, Dialect::Sqlite] {
        let statement = compile("not (id in (1, null))", dialect).expect("compiles");
        assert!(statement.sql.contains(" IN ( ?, ? )"), "{}", statement.sql);
        assert_eq!(statement.parameters[1], PrimitiveValue::Null);
    }

    let options = QueryOptions::new()
        .filter("origin eq 'BOS' and price lt 200")
        .search("shuttle")
        .orderby("price desc");
    let parsed = options.parse(&Config::default()).expect("parses");

    for backend in ["memory", "sqlite"] {
        match backend.parse::<Backend>().expect("a backend") {
            Backend::Memory => {
                let kept = parsed
                    .apply(&records, &["origin", "title"])
                    .expect("evaluates");
                let ids: Vec<_> = kept.iter().map(|r| r.property("id")).collect();
                assert_eq!(
                    ids,
                    vec![Some(PrimitiveValue::Int32(3)), Some(PrimitiveValue::Int32(1))]
                );
            }
            Backend::Sql(dialect) => {
                let query = parsed
                    .to_sql(dialect, &catalog(), &CompileConfig::default())
                    .expect("compiles");
                assert_eq!(
                    query.where_clause.as_deref(),
                    Some(concat!(
                        r#"( ( ( "flights"."origin" = ? ) AND ( "flights"."price" < ? ) ) AND "#,
                        r#"( "flights"."origin" LIKE ? ESCAPE '\' OR "flights"."title" LIKE ? ESCAPE '\' ) )"#
                    ))
                );
                assert_eq!(query.order_by.as_deref(), Some(r#""flights"."price" DESC"#));
                assert_eq!(query.parameters.len(), 4);
            }
        }
    }
}

#[test]
fn lambdas_in_memory() {
    let airport = |code: &str, city: &str| Entity::new().with("code", code).with("city", city);
    let flight = Entity::new()
        .with("origin", "BOS")
        .with_navigation("airports", vec![airport("BOS", "Boston"), airport("SFO", "San Francisco")]);
    let evaluator = Evaluator::default();
    let matches = |input: &str| {
        let node = parse_filter(input).expect("a valid parse");
        evaluator.matches(&node, &flight).expect("evaluates")
    };
    assert!(matches("airports/any(a:a/city eq 'Boston')"));
    assert!(!matches("airports/all(a:a/city eq 'Boston')"));
    assert!(matches("airports/any(a:a/code eq origin)"));
    assert!(matches("airports/any()"));
}
