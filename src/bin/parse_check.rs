//! Reads `$filter` expressions from stdin, one per line, and prints the
//!  parsed tree followed by the SQL each dialect produces. Every property
//!  the expression reads is treated as a string column of table `t`.

use odata_expr::{
    Dialect,
    ast::Node,
    catalog::{EntityTypeDef, PropertyDef},
    config::CompileConfig,
    parser::parse_filter,
    translate::compile_filter,
    value::ValueKind,
};
use strum::IntoEnumIterator;
use tracing_subscriber::EnvFilter;

fn catalog_for(node: &Node) -> EntityTypeDef {
    node.root_properties()
        .into_iter()
        .fold(EntityTypeDef::new("t"), |catalog, name| {
            catalog.property(PropertyDef::declared(name, ValueKind::String))
        })
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    println!("sizeof(Node) = {}", std::mem::size_of::<Node>());

    let config = CompileConfig::default();
    for line in std::io::stdin().lines() {
        let line = line.expect("a line");
        let now = std::time::Instant::now();
        let res = parse_filter(&line);
        print!("[in {}μs] ", now.elapsed().as_micros());
        let tree = match res {
            Err(e) => {
                println!("Error parsing input: {e}");
                continue;
            }
            Ok(tree) => tree,
        };
        println!("{tree}");

        let catalog = catalog_for(&tree);
        for dialect in Dialect::iter() {
            match compile_filter(&tree, dialect, &catalog, &config) {
                Ok(statement) => println!("  {dialect}: {statement} {:?}", statement.parameters),
                Err(e) => println!("  {dialect}: {e}"),
            }
        }
    }
}
