//! Parsing, evaluation and SQL compilation of the OData `$filter`,
//!  `$search`, `$compute` and `$orderby` expression languages.
//!
//! ```
//! use odata_expr::{Config, Dialect, QueryOptions};
//! use odata_expr::catalog::{EntityTypeDef, PropertyDef};
//! use odata_expr::value::ValueKind;
//!
//! let catalog = EntityTypeDef::new("people")
//!     .property(PropertyDef::declared("name", ValueKind::String));
//! let query = QueryOptions::new()
//!     .filter("startswith(name, 'A')")
//!     .parse(&Config::default())?
//!     .to_sql(Dialect::PostgreSql, &catalog, &Default::default())?;
//! assert_eq!(query.where_clause.as_deref(), Some(r#"( "people"."name" LIKE ? )"#));
//! # Ok::<(), odata_expr::Error>(())
//! ```

pub mod ast;
pub mod catalog;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod functions;
#[doc(hidden)]
pub mod fuzz_helper;
pub mod lex;
pub mod parser;
pub mod promote;
pub mod query;
pub mod translate;
pub mod value;

#[cfg(test)]
mod tests;

pub use config::Config;
pub use error::{Error, Result};
pub use query::{Backend, ParsedQuery, QueryOptions, SqlQuery};
pub use translate::{Dialect, Statement};
