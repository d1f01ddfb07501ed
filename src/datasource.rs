//! Read-only data sources.
//!
//! Each data source pairs its inputs with a deterministic identifier and a
//! `read` that produces the full output or fails without producing any.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::composer::{CatalogFilter, CatalogRelation, SEQUENCES, TABLES};
use crate::engine::Client;
use crate::error::{PgReadError, PgReadResult};
use crate::filter::{pattern_array, ArrayKeyword, PatternFilters};
use crate::materialize::{ColumnDescriptor, ResultSet, Row};

/// Separator between identifier segments.
///
/// Segments are not escaped, so distinct inputs whose concatenations coincide
/// share an identifier.
pub const ID_SEPARATOR: &str = "_";

/// A read-only entity fetched into the caller's attribute graph.
#[async_trait]
pub trait DataSource: Send + Sync {
    type Output: Serialize + Send;

    /// Identifier derived from the defining inputs only.
    fn id(&self) -> String;

    /// Fetch the output.
    async fn read(&self, client: &Client) -> PgReadResult<Self::Output>;

    /// Read and merge the output into `attributes`.
    ///
    /// `attributes` is only touched once the whole output has been produced.
    async fn read_into(&self, client: &Client, attributes: &mut Map<String, Value>) -> PgReadResult<()> {
        let output = self.read(client).await?;
        match serde_json::to_value(&output)? {
            Value::Object(fields) => attributes.extend(fields),
            other => {
                attributes.insert("output".to_string(), other);
            }
        }
        Ok(())
    }
}

/// Run an arbitrary statement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDataSource {
    pub database: String,
    pub query: String,
    /// Values for `$1`, `$2`, ... bound as text.
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryOutput {
    pub id: String,
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Row>,
}

impl QueryDataSource {
    pub fn new(database: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            query: query.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(value.into());
        self
    }
}

#[async_trait]
impl DataSource for QueryDataSource {
    type Output = QueryOutput;

    fn id(&self) -> String {
        [self.database.as_str(), self.query.as_str()].join(ID_SEPARATOR)
    }

    async fn read(&self, client: &Client) -> PgReadResult<QueryOutput> {
        let ResultSet { columns, rows } = client.fetch(&self.database, &self.query, &self.args).await?;
        Ok(QueryOutput {
            id: self.id(),
            columns,
            rows,
        })
    }
}

/// Enumerate tables from `information_schema.tables`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TablesDataSource {
    pub database: String,
    pub schemas: Vec<String>,
    /// e.g. `BASE TABLE`, `VIEW`, `FOREIGN`
    pub table_types: Vec<String>,
    pub like_any_patterns: Vec<String>,
    pub like_all_patterns: Vec<String>,
    pub not_like_all_patterns: Vec<String>,
    pub regex_pattern: Option<String>,
    pub include_system_schemas: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableEntry {
    pub schema_name: String,
    pub table_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TablesOutput {
    pub id: String,
    pub tables: Vec<TableEntry>,
}

impl TablesDataSource {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Default::default()
        }
    }

    fn patterns(&self) -> PatternFilters {
        PatternFilters {
            like_any: self.like_any_patterns.clone(),
            like_all: self.like_all_patterns.clone(),
            not_like_all: self.not_like_all_patterns.clone(),
            regex: self.regex_pattern.clone(),
        }
    }

    /// The composed enumeration statement.
    pub fn sql(&self) -> String {
        TABLES.compose(&CatalogFilter {
            schemas: self.schemas.clone(),
            types: self.table_types.clone(),
            patterns: self.patterns(),
            include_system_schemas: self.include_system_schemas,
        })
    }
}

#[async_trait]
impl DataSource for TablesDataSource {
    type Output = TablesOutput;

    fn id(&self) -> String {
        let mut parts = vec![
            self.database.clone(),
            pattern_array(&self.schemas, ArrayKeyword::Any),
            pattern_array(&self.table_types, ArrayKeyword::Any),
        ];
        parts.extend(self.patterns().id_parts());
        if self.include_system_schemas {
            parts.push("system".to_string());
        }
        parts.join(ID_SEPARATOR)
    }

    async fn read(&self, client: &Client) -> PgReadResult<TablesOutput> {
        let result = client.fetch(&self.database, &self.sql(), &[]).await?;
        let tables = result
            .rows
            .iter()
            .map(|row| {
                Ok(TableEntry {
                    schema_name: column(row, &TABLES, TABLES.schema_column)?,
                    table_name: column(row, &TABLES, TABLES.name_column)?,
                })
            })
            .collect::<PgReadResult<Vec<_>>>()?;
        Ok(TablesOutput { id: self.id(), tables })
    }
}

/// Enumerate sequences from `information_schema.sequences`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencesDataSource {
    pub database: String,
    pub schemas: Vec<String>,
    pub like_any_patterns: Vec<String>,
    pub like_all_patterns: Vec<String>,
    pub not_like_all_patterns: Vec<String>,
    pub regex_pattern: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequenceEntry {
    pub schema_name: String,
    pub sequence_name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequencesOutput {
    pub id: String,
    pub sequences: Vec<SequenceEntry>,
}

impl SequencesDataSource {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Default::default()
        }
    }

    fn patterns(&self) -> PatternFilters {
        PatternFilters {
            like_any: self.like_any_patterns.clone(),
            like_all: self.like_all_patterns.clone(),
            not_like_all: self.not_like_all_patterns.clone(),
            regex: self.regex_pattern.clone(),
        }
    }

    pub fn sql(&self) -> String {
        SEQUENCES.compose(&CatalogFilter {
            schemas: self.schemas.clone(),
            patterns: self.patterns(),
            ..Default::default()
        })
    }
}

#[async_trait]
impl DataSource for SequencesDataSource {
    type Output = SequencesOutput;

    fn id(&self) -> String {
        let mut parts = vec![
            self.database.clone(),
            pattern_array(&self.schemas, ArrayKeyword::Any),
        ];
        parts.extend(self.patterns().id_parts());
        parts.join(ID_SEPARATOR)
    }

    async fn read(&self, client: &Client) -> PgReadResult<SequencesOutput> {
        let result = client.fetch(&self.database, &self.sql(), &[]).await?;
        let sequences = result
            .rows
            .iter()
            .map(|row| {
                Ok(SequenceEntry {
                    schema_name: column(row, &SEQUENCES, SEQUENCES.schema_column)?,
                    sequence_name: column(row, &SEQUENCES, SEQUENCES.name_column)?,
                    data_type: column(row, &SEQUENCES, "data_type")?,
                })
            })
            .collect::<PgReadResult<Vec<_>>>()?;
        Ok(SequencesOutput {
            id: self.id(),
            sequences,
        })
    }
}

fn column(row: &Row, relation: &CatalogRelation, name: &str) -> PgReadResult<String> {
    row.get(name)
        .cloned()
        .ok_or_else(|| PgReadError::MissingColumn(format!("{}.{}", relation.view, name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_query_id() {
        let source = QueryDataSource::new("app", "SELECT 1 as a, '2' as b;");
        assert_eq!(source.id(), "app_SELECT 1 as a, '2' as b;");
    }

    #[test]
    fn test_query_id_changes_with_each_defining_input() {
        let base = QueryDataSource::new("app", "SELECT 1");
        assert_eq!(base.id(), base.clone().id());
        assert_ne!(base.id(), QueryDataSource::new("other", "SELECT 1").id());
        assert_ne!(base.id(), QueryDataSource::new("app", "SELECT 2").id());
    }

    #[test]
    fn test_tables_id() {
        let source = TablesDataSource {
            database: "app".into(),
            schemas: strings(&["s1", "s2"]),
            like_all_patterns: strings(&["%a%"]),
            regex_pattern: Some("^t".into()),
            ..Default::default()
        };
        assert_eq!(
            source.id(),
            "app_ANY (array['s1','s2'])_ANY (array[])_ANY (array[])_ALL (array['%a%'])_ALL (array[])_^t"
        );
    }

    #[test]
    fn test_tables_id_changes_with_each_defining_input() {
        let base = TablesDataSource::new("app");
        let variants = [
            TablesDataSource { database: "other".into(), ..base.clone() },
            TablesDataSource { schemas: strings(&["s"]), ..base.clone() },
            TablesDataSource { table_types: strings(&["VIEW"]), ..base.clone() },
            TablesDataSource { like_any_patterns: strings(&["a%"]), ..base.clone() },
            TablesDataSource { like_all_patterns: strings(&["a%"]), ..base.clone() },
            TablesDataSource { not_like_all_patterns: strings(&["a%"]), ..base.clone() },
            TablesDataSource { regex_pattern: Some("a".into()), ..base.clone() },
            TablesDataSource { include_system_schemas: true, ..base.clone() },
        ];
        for variant in &variants {
            assert_ne!(base.id(), variant.id(), "{variant:?}");
        }
        assert_eq!(base.id(), TablesDataSource::new("app").id());
    }

    #[test]
    fn test_tables_sql_applies_types() {
        let source = TablesDataSource {
            database: "app".into(),
            table_types: strings(&["BASE TABLE"]),
            ..Default::default()
        };
        assert_eq!(
            source.sql(),
            "SELECT table_schema, table_name FROM information_schema.tables \
             WHERE table_schema NOT IN ('pg_catalog', 'information_schema') \
             AND table_type = ANY (array['BASE TABLE']) \
             ORDER BY table_schema, table_name"
        );
    }

    #[test]
    fn test_sequences_id_and_sql() {
        let source = SequencesDataSource {
            database: "app".into(),
            not_like_all_patterns: strings(&["%tmp%"]),
            ..Default::default()
        };
        assert_eq!(
            source.id(),
            "app_ANY (array[])_ANY (array[])_ALL (array[])_ALL (array['%tmp%'])_"
        );
        assert!(source.sql().contains("AND sequence_name NOT LIKE ALL (array['%tmp%'])"));
    }

    #[test]
    fn test_inputs_deserialize_from_attributes() {
        let source: TablesDataSource = serde_json::from_value(serde_json::json!({
            "database": "app",
            "schemas": ["public"],
            "regex_pattern": "^user"
        }))
        .unwrap();
        assert_eq!(source.schemas, strings(&["public"]));
        assert_eq!(source.regex_pattern.as_deref(), Some("^user"));
        assert!(source.like_any_patterns.is_empty());

        let query: QueryDataSource = serde_json::from_value(serde_json::json!({
            "database": "app",
            "query": "SELECT $1::int"
        }))
        .unwrap();
        assert!(query.args.is_empty());
    }

    #[test]
    fn test_missing_catalog_column() {
        let row = Row::new();
        let err = column(&row, &TABLES, "table_name").unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing column 'information_schema.tables.table_name' in query output"
        );
    }

    #[test]
    fn test_output_serializes_column_type_field() {
        let output = QueryOutput {
            id: "app_SELECT 1 as a".into(),
            columns: vec![ColumnDescriptor::new("a", "INT4")],
            rows: vec![[("a".to_string(), "1".to_string())].into_iter().collect()],
        };
        assert_eq!(
            serde_json::to_value(&output).unwrap(),
            serde_json::json!({
                "id": "app_SELECT 1 as a",
                "columns": [{"name": "a", "type": "INT4"}],
                "rows": [{"a": "1"}]
            })
        );
    }
}
