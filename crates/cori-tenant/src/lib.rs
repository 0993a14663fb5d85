//! # cori-tenant
//!
//! Tenant scoping for SQL statements.
//!
//! This crate provides functionality to:
//! - Parse SQL in a configured dialect using `sqlparser`
//! - Decide, per table, whether it is tenant-governed ([`TenantPolicy`])
//! - Rewrite the parsed statement so every governed table is filtered by,
//!   or written with, the tenant discriminator ([`StatementRewriter`])
//!
//! ## How It Works
//!
//! **Before:**
//! ```sql
//! SELECT * FROM orders o JOIN customers c ON c.id = o.customer_id
//! WHERE o.status = 'pending' OR o.status = 'held'
//! ```
//!
//! **After:**
//! ```sql
//! SELECT * FROM orders o JOIN customers c ON c.tenant_id = 42 AND c.id = o.customer_id
//! WHERE o.tenant_id = 42 AND (o.status = 'pending' OR o.status = 'held')
//! ```
//!
//! ## Supported Operations
//!
//! | Operation | Behavior |
//! |-----------|----------|
//! | `SELECT`  | Add `<alias>.tenant_column = ?` to WHERE |
//! | `JOIN`    | Add `<alias>.tenant_column = ?` to the join's ON |
//! | `INSERT`  | Add the tenant column and value to every row or to the SELECT |
//! | `UPDATE`  | Add `<table>.tenant_column = ?` to WHERE (single table only) |
//! | `DELETE`  | Add `<table>.tenant_column = ?` to WHERE (single table only) |
//!
//! Global tables and system catalogs are never scoped. When the FROM table
//! of a SELECT is one of them, the whole SELECT is left as written.

pub mod error;
pub mod injector;
pub mod parser;
pub mod policy;
pub mod predicate;
pub mod report;
pub mod rewriter;

pub use error::{ConfigurationError, ScopeError};
pub use injector::{InjectionExplanation, InjectionResult, TenantInjector};
pub use parser::{SqlAnalyzer, SqlOperation};
pub use policy::{ConfigTenantPolicy, TenantPolicy, TenantValue};
pub use report::{RewriteReport, UnsupportedConstruct};
pub use rewriter::{StatementRewriter, rewrite};
