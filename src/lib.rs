//! # pgread — read-only PostgreSQL data sources
//!
//! Run an arbitrary query or enumerate catalog objects, and get back flat,
//! ordered, string-valued output plus a deterministic identifier.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use pgread::prelude::*;
//!
//! let client = Client::new(ClientConfig::load(None)?);
//!
//! // Free-form query
//! let out = QueryDataSource::new("app", "SELECT 1 as a, '2' as b;").read(&client).await?;
//! // out.columns => [{a, INT4}, {b, TEXT}], out.rows => [{a: "1", b: "2"}]
//!
//! // Table enumeration
//! let tables = TablesDataSource {
//!     database: "app".into(),
//!     like_any_patterns: vec!["user%".into()],
//!     ..Default::default()
//! };
//! println!("{}", tables.sql());
//! let out = tables.read(&client).await?;
//! ```
//!
//! ## Filters
//!
//! | Input                   | SQL                                    |
//! |-------------------------|----------------------------------------|
//! | `schemas`               | `schema = ANY (array[...])`            |
//! | `table_types`           | `table_type = ANY (array[...])`        |
//! | `like_any_patterns`     | `name LIKE ANY (array[...])`           |
//! | `like_all_patterns`     | `name LIKE ALL (array[...])`           |
//! | `not_like_all_patterns` | `name NOT LIKE ALL (array[...])`       |
//! | `regex_pattern`         | `name ~ '...'`                         |
//!
//! ## Arguments and values
//!
//! Query arguments are strings converted to the type the server infers for
//! each placeholder (`$1 + 1` binds an integer). Every result value is
//! rendered through [`CellValue`](materialize::CellValue); NULL renders as `NULL`.

pub mod composer;
pub mod config;
pub mod datasource;
pub mod engine;
pub mod error;
pub mod filter;
pub mod materialize;
pub mod pgtypes;

pub mod prelude {
    pub use crate::composer::{CatalogFilter, CatalogRelation, SelectBuilder, SEQUENCES, TABLES};
    pub use crate::config::ClientConfig;
    pub use crate::datasource::{
        DataSource, QueryDataSource, QueryOutput, SequenceEntry, SequencesDataSource, SequencesOutput,
        TableEntry, TablesDataSource, TablesOutput,
    };
    pub use crate::engine::Client;
    pub use crate::error::*;
    pub use crate::filter::{Filter, JoinState, PatternFilters};
    pub use crate::materialize::{CellValue, ColumnDescriptor, ResultCursor, ResultSet, Row};
}

/// Connect with the given configuration.
///
/// Pools are created lazily, so this never touches the network.
///
/// # Example
///
/// ```
/// let client = pgread::connect(pgread::config::ClientConfig::default());
/// assert_eq!(client.config().port, 5432);
/// ```
pub fn connect(config: config::ClientConfig) -> engine::Client {
    engine::Client::new(config)
}
