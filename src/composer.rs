//! SQL composition for catalog enumeration.
//!
//! Builds a `SELECT` against a catalog view, threads optional filters through
//! a [`JoinState`], and always finishes with an `ORDER BY` on the relation's
//! natural key so repeated reads iterate in the same order.

use crate::filter::{quote_literal, Filter, JoinState, PatternFilters};

/// Schemas hidden from enumeration unless explicitly requested.
pub const SYSTEM_SCHEMAS: [&str; 2] = ["pg_catalog", "information_schema"];

/// Incremental `SELECT ... [WHERE ...] ORDER BY ...` builder.
#[derive(Debug, Clone)]
pub struct SelectBuilder {
    sql: String,
    join: JoinState,
}

impl SelectBuilder {
    /// Start from a base statement with no `WHERE` clause.
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            sql: base.into(),
            join: JoinState::new(),
        }
    }

    /// Start from a base statement that already has a `WHERE` clause.
    pub fn filtered(base: impl Into<String>) -> Self {
        Self {
            sql: base.into(),
            join: JoinState::after_where(),
        }
    }

    /// Append an unconditional fragment.
    pub fn clause(mut self, fragment: &str) -> Self {
        self.join.push(&mut self.sql, fragment);
        self
    }

    /// Append `filter` against `column` if it is non-empty.
    pub fn filter(mut self, column: &str, filter: &Filter) -> Self {
        filter.apply(&mut self.sql, &mut self.join, column);
        self
    }

    /// Append every non-empty pattern filter against `column`.
    pub fn patterns(mut self, column: &str, patterns: &PatternFilters) -> Self {
        patterns.apply(&mut self.sql, &mut self.join, column);
        self
    }

    pub fn join_state(&self) -> JoinState {
        self.join
    }

    /// Statement text so far.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Finish with `ORDER BY` on `columns`.
    pub fn order_by(self, columns: &[&str]) -> String {
        let mut sql = self.sql;
        if !columns.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&columns.join(", "));
        }
        sql
    }
}

/// A catalog view that can be enumerated by schema and name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogRelation {
    pub view: &'static str,
    pub schema_column: &'static str,
    pub name_column: &'static str,
    /// Column matched by the type filter, if the view has one.
    pub type_column: Option<&'static str>,
    /// Additional projected columns after schema and name.
    pub extra_columns: &'static [&'static str],
}

/// `information_schema.tables`
pub const TABLES: CatalogRelation = CatalogRelation {
    view: "information_schema.tables",
    schema_column: "table_schema",
    name_column: "table_name",
    type_column: Some("table_type"),
    extra_columns: &[],
};

/// `information_schema.sequences`
pub const SEQUENCES: CatalogRelation = CatalogRelation {
    view: "information_schema.sequences",
    schema_column: "sequence_schema",
    name_column: "sequence_name",
    type_column: None,
    extra_columns: &["data_type"],
};

/// Filter inputs for a catalog enumeration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogFilter {
    pub schemas: Vec<String>,
    pub types: Vec<String>,
    pub patterns: PatternFilters,
    pub include_system_schemas: bool,
}

impl CatalogRelation {
    /// `SELECT <schema>, <name>[, extra...] FROM <view>`
    pub fn base_query(&self) -> String {
        let mut columns = vec![self.schema_column, self.name_column];
        columns.extend_from_slice(self.extra_columns);
        format!("SELECT {} FROM {}", columns.join(", "), self.view)
    }

    /// Fragment hiding [`SYSTEM_SCHEMAS`].
    pub fn system_schema_exclusion(&self) -> String {
        let quoted: Vec<String> = SYSTEM_SCHEMAS.iter().map(|s| quote_literal(s)).collect();
        format!("{} NOT IN ({})", self.schema_column, quoted.join(", "))
    }

    /// Compose the full enumeration statement.
    ///
    /// Order of fragments: system-schema exclusion, schemas, types, then the
    /// name patterns. The type filter is ignored for views without a type column.
    pub fn compose(&self, filter: &CatalogFilter) -> String {
        let mut builder = SelectBuilder::new(self.base_query());
        if !filter.include_system_schemas {
            builder = builder.clause(&self.system_schema_exclusion());
        }
        builder = builder.filter(self.schema_column, &Filter::EqualsAny(filter.schemas.clone()));
        if let Some(type_column) = self.type_column {
            builder = builder.filter(type_column, &Filter::EqualsAny(filter.types.clone()));
        }
        builder
            .patterns(self.name_column, &filter.patterns)
            .order_by(&[self.schema_column, self.name_column])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn count(haystack: &str, needle: &str) -> usize {
        haystack.matches(needle).count()
    }

    #[test]
    fn test_tables_without_filters() {
        let sql = TABLES.compose(&CatalogFilter::default());
        assert_eq!(
            sql,
            "SELECT table_schema, table_name FROM information_schema.tables \
             WHERE table_schema NOT IN ('pg_catalog', 'information_schema') \
             ORDER BY table_schema, table_name"
        );
    }

    #[test]
    fn test_tables_with_every_filter() {
        let filter = CatalogFilter {
            schemas: strings(&["test_schema1", "test_schema2"]),
            types: strings(&["BASE TABLE"]),
            patterns: PatternFilters {
                like_any: strings(&["test%"]),
                like_all: strings(&["%table%"]),
                not_like_all: strings(&["%tmp"]),
                regex: Some("^test_table[0-9]$".into()),
            },
            include_system_schemas: false,
        };
        assert_eq!(
            TABLES.compose(&filter),
            "SELECT table_schema, table_name FROM information_schema.tables \
             WHERE table_schema NOT IN ('pg_catalog', 'information_schema') \
             AND table_schema = ANY (array['test_schema1','test_schema2']) \
             AND table_type = ANY (array['BASE TABLE']) \
             AND table_name LIKE ANY (array['test%']) \
             AND table_name LIKE ALL (array['%table%']) \
             AND table_name NOT LIKE ALL (array['%tmp']) \
             AND table_name ~ '^test_table[0-9]$' \
             ORDER BY table_schema, table_name"
        );
    }

    #[test]
    fn test_include_system_schemas_drops_exclusion() {
        let filter = CatalogFilter {
            include_system_schemas: true,
            ..Default::default()
        };
        assert_eq!(
            TABLES.compose(&filter),
            "SELECT table_schema, table_name FROM information_schema.tables ORDER BY table_schema, table_name"
        );

        let filter = CatalogFilter {
            include_system_schemas: true,
            schemas: strings(&["pg_catalog"]),
            ..Default::default()
        };
        assert_eq!(
            TABLES.compose(&filter),
            "SELECT table_schema, table_name FROM information_schema.tables \
             WHERE table_schema = ANY (array['pg_catalog']) \
             ORDER BY table_schema, table_name"
        );
    }

    #[test]
    fn test_sequences_ignore_types() {
        let filter = CatalogFilter {
            types: strings(&["VIEW"]),
            patterns: PatternFilters {
                like_any: strings(&["%_seq"]),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(
            SEQUENCES.compose(&filter),
            "SELECT sequence_schema, sequence_name, data_type FROM information_schema.sequences \
             WHERE sequence_schema NOT IN ('pg_catalog', 'information_schema') \
             AND sequence_name LIKE ANY (array['%_seq']) \
             ORDER BY sequence_schema, sequence_name"
        );
    }

    /// Every subset of the five filter kinds, in forward and reverse order,
    /// yields one WHERE iff something was emitted and joins the rest with AND.
    #[test]
    fn test_where_appears_once_for_any_filter_subset() {
        let all = [
            Filter::EqualsAny(strings(&["a"])),
            Filter::LikeAny(strings(&["b%"])),
            Filter::LikeAll(strings(&["%c"])),
            Filter::NotLikeAll(strings(&["d%"])),
            Filter::Regex("^e".into()),
        ];

        for mask in 0u32..(1 << all.len()) {
            let present: Vec<&Filter> = all
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, f)| f)
                .collect();

            for reversed in [false, true] {
                let mut ordered = present.clone();
                if reversed {
                    ordered.reverse();
                }

                let mut builder = SelectBuilder::new("SELECT x FROM t");
                for (i, filter) in all.iter().enumerate() {
                    // absent filters are applied as empty ones and must be no-ops
                    if mask & (1 << i) == 0 {
                        let empty = match filter {
                            Filter::EqualsAny(_) => Filter::EqualsAny(vec![]),
                            Filter::LikeAny(_) => Filter::LikeAny(vec![]),
                            Filter::LikeAll(_) => Filter::LikeAll(vec![]),
                            Filter::NotLikeAll(_) => Filter::NotLikeAll(vec![]),
                            Filter::Regex(_) => Filter::Regex(String::new()),
                        };
                        builder = builder.filter("name", &empty);
                    }
                }
                assert!(!builder.join_state().has_clause());

                for filter in &ordered {
                    builder = builder.filter("name", filter);
                }
                let sql = builder.order_by(&["x"]);

                let expected_where = usize::from(!ordered.is_empty());
                assert_eq!(count(&sql, "WHERE"), expected_where, "mask {mask:#07b}: {sql}");
                assert_eq!(
                    count(&sql, " AND "),
                    ordered.len().saturating_sub(1),
                    "mask {mask:#07b}: {sql}"
                );
                if let Some(first) = ordered.first() {
                    let expected = format!("WHERE {}", first.fragment("name").unwrap());
                    assert!(sql.contains(&expected), "mask {mask:#07b}: {sql}");
                }
                assert!(sql.ends_with(" ORDER BY x"));
            }
        }
    }

    #[test]
    fn test_filtered_base_continues_with_and() {
        let sql = SelectBuilder::filtered("SELECT n FROM t WHERE ok")
            .filter("n", &Filter::LikeAny(strings(&["a%"])))
            .order_by(&["n"]);
        assert_eq!(sql, "SELECT n FROM t WHERE ok AND n LIKE ANY (array['a%']) ORDER BY n");
    }
}
