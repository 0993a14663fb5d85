//! What a rewrite did: scoped tables, added predicates, unscoped constructs.

use serde::Serialize;

/// A recognised shape that holds no table the rewriter can scope.
///
/// The surrounding statement is still rewritten; only this branch is left
/// as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnsupportedConstruct {
    /// `(VALUES ...)` used as a derived table.
    ValuesDerivedTable { alias: Option<String> },
    /// Table factor other than a table, subquery or nested join.
    TableFactor { sql: String },
    /// Query body other than SELECT, set operation, VALUES or nested query.
    QueryBody { sql: String },
}

impl std::fmt::Display for UnsupportedConstruct {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnsupportedConstruct::ValuesDerivedTable { alias: Some(alias) } => {
                write!(f, "VALUES derived table {alias} is not tenant-scoped")
            }
            UnsupportedConstruct::ValuesDerivedTable { alias: None } => {
                write!(f, "VALUES derived table is not tenant-scoped")
            }
            UnsupportedConstruct::TableFactor { sql } => {
                write!(f, "table factor {sql} is not tenant-scoped")
            }
            UnsupportedConstruct::QueryBody { sql } => {
                write!(f, "query body {sql} is not tenant-scoped")
            }
        }
    }
}

/// Outcome of rewriting one statement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RewriteReport {
    /// Tables that received a predicate or a tenant column, in visit order.
    pub tables_scoped: Vec<String>,
    /// Tables skipped because the policy exempts them.
    pub tables_exempt: Vec<String>,
    /// Printed predicates that were added.
    pub predicates_added: Vec<String>,
    /// Constructs left unscoped.
    pub warnings: Vec<UnsupportedConstruct>,
}

impl RewriteReport {
    /// Whether the statement was changed at all.
    pub fn is_modified(&self) -> bool {
        !self.tables_scoped.is_empty()
    }

    pub(crate) fn merge(&mut self, other: RewriteReport) {
        self.tables_scoped.extend(other.tables_scoped);
        self.tables_exempt.extend(other.tables_exempt);
        self.predicates_added.extend(other.predicates_added);
        self.warnings.extend(other.warnings);
    }
}
