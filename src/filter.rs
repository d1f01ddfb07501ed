//! Pattern filters and join-state bookkeeping.
//!
//! A filter renders to a single boolean fragment against one column. Fragments
//! are appended to a statement through [`JoinState`], which decides whether the
//! fragment opens the `WHERE` clause or continues it with the conjunction.

use std::fmt;

/// Keyword continuing an open `WHERE` clause.
const CONJUNCTION: &str = "AND";

/// Tracks whether a statement already has a boolean clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JoinState {
    has_clause: bool,
}

impl JoinState {
    /// State for a statement without a `WHERE` clause.
    pub fn new() -> Self {
        Self { has_clause: false }
    }

    /// State for a base statement that already ends inside a `WHERE` clause.
    pub fn after_where() -> Self {
        Self { has_clause: true }
    }

    pub fn has_clause(&self) -> bool {
        self.has_clause
    }

    /// Keyword that must precede the next fragment.
    pub fn keyword(&self) -> &'static str {
        if self.has_clause { CONJUNCTION } else { "WHERE" }
    }

    /// Append `fragment` to `sql` and mark the clause as open.
    pub fn push(&mut self, sql: &mut String, fragment: &str) {
        sql.push(' ');
        sql.push_str(self.keyword());
        sql.push(' ');
        sql.push_str(fragment);
        self.has_clause = true;
    }
}

/// Array quantifier for pattern lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayKeyword {
    Any,
    All,
}

impl fmt::Display for ArrayKeyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayKeyword::Any => write!(f, "ANY"),
            ArrayKeyword::All => write!(f, "ALL"),
        }
    }
}

/// Quote a value as a SQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Render `values` as `ANY (array['a','b'])` / `ALL (array[...])`.
///
/// An empty list renders as `ANY (array[])`; callers skip empty lists before
/// building SQL, but resource identifiers include them.
pub fn pattern_array(values: &[String], keyword: ArrayKeyword) -> String {
    let quoted: Vec<String> = values.iter().map(|v| quote_literal(v)).collect();
    format!("{} (array[{}])", keyword, quoted.join(","))
}

/// One optional filter against a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// `column = ANY (array[...])`
    EqualsAny(Vec<String>),
    /// `column LIKE ANY (array[...])`
    LikeAny(Vec<String>),
    /// `column LIKE ALL (array[...])`
    LikeAll(Vec<String>),
    /// `column NOT LIKE ALL (array[...])`
    NotLikeAll(Vec<String>),
    /// `column ~ 'pattern'`
    Regex(String),
}

impl Filter {
    /// Whether this filter contributes nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            Filter::EqualsAny(v) | Filter::LikeAny(v) | Filter::LikeAll(v) | Filter::NotLikeAll(v) => {
                v.is_empty()
            }
            Filter::Regex(p) => p.is_empty(),
        }
    }

    /// Render the fragment for `column`, or `None` when the filter is empty.
    pub fn fragment(&self, column: &str) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let fragment = match self {
            Filter::EqualsAny(values) => {
                format!("{} = {}", column, pattern_array(values, ArrayKeyword::Any))
            }
            Filter::LikeAny(patterns) => {
                format!("{} LIKE {}", column, pattern_array(patterns, ArrayKeyword::Any))
            }
            Filter::LikeAll(patterns) => {
                format!("{} LIKE {}", column, pattern_array(patterns, ArrayKeyword::All))
            }
            Filter::NotLikeAll(patterns) => {
                format!("{} NOT LIKE {}", column, pattern_array(patterns, ArrayKeyword::All))
            }
            Filter::Regex(pattern) => format!("{} ~ {}", column, quote_literal(pattern)),
        };
        Some(fragment)
    }

    /// Append this filter to `sql`. Empty filters leave both `sql` and `state` untouched.
    pub fn apply(&self, sql: &mut String, state: &mut JoinState, column: &str) {
        if let Some(fragment) = self.fragment(column) {
            state.push(sql, &fragment);
        }
    }
}

/// The pattern-matching filters that target an object's name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternFilters {
    pub like_any: Vec<String>,
    pub like_all: Vec<String>,
    pub not_like_all: Vec<String>,
    pub regex: Option<String>,
}

impl PatternFilters {
    /// The filters in application order.
    pub fn filters(&self) -> Vec<Filter> {
        vec![
            Filter::LikeAny(self.like_any.clone()),
            Filter::LikeAll(self.like_all.clone()),
            Filter::NotLikeAll(self.not_like_all.clone()),
            Filter::Regex(self.regex.clone().unwrap_or_default()),
        ]
    }

    /// Append every non-empty pattern filter against `column`.
    pub fn apply(&self, sql: &mut String, state: &mut JoinState, column: &str) {
        for filter in self.filters() {
            filter.apply(sql, state, column);
        }
    }

    /// Identifier segments, in fixed order.
    pub fn id_parts(&self) -> Vec<String> {
        vec![
            pattern_array(&self.like_any, ArrayKeyword::Any),
            pattern_array(&self.like_all, ArrayKeyword::All),
            pattern_array(&self.not_like_all, ArrayKeyword::All),
            self.regex.clone().unwrap_or_default(),
        ]
    }
}
