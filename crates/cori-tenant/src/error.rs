//! Error types for the tenant-scoping crate.

use thiserror::Error;

/// Errors that can occur while scoping SQL to a tenant.
#[derive(Debug, Error)]
pub enum ScopeError {
    /// SQL parsing failed.
    #[error("failed to parse SQL: {0}")]
    ParseError(String),

    /// The statement cannot be safely scoped; it must not be executed.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// DDL statement is not allowed.
    #[error("DDL statement not allowed: {statement}")]
    DdlNotAllowed { statement: String },

    /// Tenant value does not match the configured tenant id type.
    #[error("invalid tenant value {value:?}: expected {expected}")]
    InvalidTenantValue { value: String, expected: String },
}

/// Statement shapes that cannot be scoped without caller guidance.
///
/// The rewrite is aborted and the caller's statement is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// UPDATE touching more than one table (joined target or FROM list).
    #[error(
        "failed to process multiple-table update of {target}, please exclude the statement"
    )]
    MultiTableUpdate { target: String },

    /// DELETE touching more than one table (multiple targets, joins or USING).
    #[error(
        "failed to process multiple-table delete of {target}, please exclude the statement"
    )]
    MultiTableDelete { target: String },

    /// INSERT carrying neither literal rows nor an embedded SELECT.
    #[error("cannot scope INSERT into {table}: statement has neither a row list nor a SELECT")]
    InsertWithoutSource { table: String },

    /// INSERT relying on the implicit column list.
    #[error("cannot scope INSERT into {table}: an explicit column list is required")]
    InsertWithoutColumnList { table: String },

    /// Write target that is not a plain table (table function, derived table).
    #[error("cannot scope {statement} target {target}: not a plain table")]
    UnsupportedTarget {
        statement: &'static str,
        target: String,
    },
}
