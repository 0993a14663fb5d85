//! SQL parsing and statement classification.

use cori_core::SqlDialect;
use sqlparser::ast::Statement;
use sqlparser::dialect::{
    AnsiDialect, Dialect, GenericDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect,
    SQLiteDialect,
};
use sqlparser::parser::Parser;

use crate::error::ScopeError;

/// Parses SQL in one configured dialect and classifies the statements.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlAnalyzer {
    dialect: SqlDialect,
}

impl SqlAnalyzer {
    /// Create an analyzer for the PostgreSQL dialect.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dialect(dialect: SqlDialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Parse a SQL string into statements.
    pub fn parse(&self, sql: &str) -> Result<Vec<Statement>, ScopeError> {
        Parser::parse_sql(self.sqlparser_dialect().as_ref(), sql)
            .map_err(|e| ScopeError::ParseError(e.to_string()))
    }

    fn sqlparser_dialect(&self) -> Box<dyn Dialect> {
        match self.dialect {
            SqlDialect::Postgres => Box::new(PostgreSqlDialect {}),
            SqlDialect::Mysql => Box::new(MySqlDialect {}),
            SqlDialect::Sqlite => Box::new(SQLiteDialect {}),
            SqlDialect::Mssql => Box::new(MsSqlDialect {}),
            SqlDialect::Ansi => Box::new(AnsiDialect {}),
            SqlDialect::Generic => Box::new(GenericDialect {}),
        }
    }

    /// Check if a statement is a DDL statement.
    pub fn is_ddl(&self, stmt: &Statement) -> bool {
        self.get_operation(stmt) == SqlOperation::Ddl
    }

    /// Get the type of SQL operation.
    pub fn get_operation(&self, stmt: &Statement) -> SqlOperation {
        match stmt {
            Statement::Query(_) => SqlOperation::Select,
            Statement::Insert(_) => SqlOperation::Insert,
            Statement::Update { .. } => SqlOperation::Update,
            Statement::Delete(_) => SqlOperation::Delete,
            // EXPLAIN ANALYZE runs what it wraps
            Statement::Explain { statement, .. } => self.get_operation(statement),
            Statement::CreateTable { .. }
            | Statement::AlterTable { .. }
            | Statement::Drop { .. }
            | Statement::Truncate { .. }
            | Statement::CreateIndex { .. }
            | Statement::CreateView { .. }
            | Statement::CreateSchema { .. }
            | Statement::CreateDatabase { .. } => SqlOperation::Ddl,
            _ => SqlOperation::Other,
        }
    }
}

/// Types of SQL operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlOperation {
    Select,
    Insert,
    Update,
    Delete,
    Ddl,
    Other,
}
