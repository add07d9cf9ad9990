use crate::{
    Dialect,
    catalog::{EntityTypeDef, PropertyDef},
    config::CompileConfig,
    evaluate::Entity,
    parser::{parse_filter, parse_search},
    translate::compile_filter,
    value::{PrimitiveValue, ValueKind},
};
use strum::IntoEnumIterator;

fn record() -> Entity {
    Entity::new()
        .with("id", 7)
        .with("name", "John")
        .with("price", 12.5)
        .with("active", true)
        .with("missing", PrimitiveValue::Null)
        .with_navigation(
            "items",
            vec![Entity::new().with("qty", 2), Entity::new().with("qty", 0)],
        )
}

fn catalog() -> EntityTypeDef {
    let items = std::sync::Arc::new(
        EntityTypeDef::new("items")
            .property(PropertyDef::declared("order_id", ValueKind::Int32))
            .property(PropertyDef::declared("qty", ValueKind::Int32)),
    );
    EntityTypeDef::new("orders")
        .property(PropertyDef::declared("id", ValueKind::Int32))
        .property(PropertyDef::declared("name", ValueKind::String))
        .property(PropertyDef::declared("price", ValueKind::Double))
        .property(PropertyDef::declared("active", ValueKind::Boolean))
        .property(PropertyDef::declared("missing", ValueKind::String))
        .property(PropertyDef::navigation("items", items).constraint("id", "order_id"))
}

/// Pushes [expr] through every stage. Errors are fine; panics and trees
///  whose canonical text parses differently are not.
pub fn translate_expr(expr: &str) {
    let _ = parse_search(expr);
    let Ok(parsed) = parse_filter(expr) else {
        return;
    };

    let canonical = parsed.to_string();
    // NaN literals never compare equal to themselves
    if !canonical.contains("NaN") {
        assert_eq!(parse_filter(&canonical).as_ref(), Ok(&parsed), "{canonical}");
    }

    // Evaluate, ignore errors
    let _ = parsed.evaluate(&record());

    let catalog = catalog();
    for dialect in Dialect::iter() {
        if let Ok(statement) = compile_filter(&parsed, dialect, &catalog, &CompileConfig::default()) {
            assert_eq!(
                statement.sql.matches('?').count(),
                statement.parameters.len(),
                "{statement}"
            );
        }
    }
}
