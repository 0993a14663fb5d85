//! Tenant scoping of SQL text.

use cori_core::TenancyConfig;
use serde::Serialize;

use crate::error::ScopeError;
use crate::parser::SqlAnalyzer;
use crate::policy::{ConfigTenantPolicy, TenantValue};
use crate::report::RewriteReport;
use crate::rewriter::StatementRewriter;

/// Scopes SQL text to a tenant according to a tenancy configuration.
#[derive(Debug, Clone)]
pub struct TenantInjector {
    analyzer: SqlAnalyzer,
    config: TenancyConfig,
}

impl TenantInjector {
    /// Create an injector parsing in the configuration's dialect.
    pub fn new(config: TenancyConfig) -> Self {
        Self {
            analyzer: SqlAnalyzer::with_dialect(config.dialect),
            config,
        }
    }

    pub fn config(&self) -> &TenancyConfig {
        &self.config
    }

    /// Inject tenant predicates into every statement of `sql`.
    ///
    /// Returns the rewritten SQL with statements joined by `; `. The whole
    /// batch is rejected if any statement is DDL or cannot be scoped.
    pub fn inject(&self, sql: &str, tenant: &TenantValue) -> Result<InjectionResult, ScopeError> {
        let statements = self.analyzer.parse(sql)?;

        if statements.is_empty() {
            return Ok(InjectionResult {
                original_sql: sql.to_string(),
                rewritten_sql: sql.to_string(),
                tables_scoped: vec![],
                tables_exempt: vec![],
                predicates_added: vec![],
                warnings: vec![],
            });
        }

        if let Some(ddl) = statements.iter().find(|stmt| self.analyzer.is_ddl(stmt)) {
            return Err(ScopeError::DdlNotAllowed {
                statement: ddl.to_string(),
            });
        }

        let policy = ConfigTenantPolicy::new(self.config.clone(), tenant)?;
        let rewriter = StatementRewriter::new(policy);

        let mut report = RewriteReport::default();
        let mut rewritten = Vec::with_capacity(statements.len());
        for mut statement in statements {
            let operation = self.analyzer.get_operation(&statement);
            report.merge(rewriter.rewrite(&mut statement)?);
            tracing::debug!(?operation, "Scoped statement");
            rewritten.push(statement.to_string());
        }

        Ok(InjectionResult {
            original_sql: sql.to_string(),
            rewritten_sql: rewritten.join("; "),
            tables_scoped: report.tables_scoped,
            tables_exempt: report.tables_exempt,
            predicates_added: report.predicates_added,
            warnings: report.warnings.iter().map(ToString::to_string).collect(),
        })
    }

    /// Explain what predicates would be injected, along with the tenant used.
    pub fn explain(
        &self,
        sql: &str,
        tenant: &TenantValue,
    ) -> Result<InjectionExplanation, ScopeError> {
        let result = self.inject(sql, tenant)?;

        Ok(InjectionExplanation {
            original_sql: result.original_sql,
            rewritten_sql: result.rewritten_sql,
            tables_scoped: result.tables_scoped,
            tables_exempt: result.tables_exempt,
            predicates_added: result.predicates_added,
            warnings: result.warnings,
            tenant: tenant.to_string(),
            tenant_column: self.config.tenant_column.clone(),
        })
    }
}

/// Result of tenant injection.
#[derive(Debug, Clone, Serialize)]
pub struct InjectionResult {
    /// The original SQL statement.
    pub original_sql: String,
    /// The rewritten SQL with tenant predicates.
    pub rewritten_sql: String,
    /// Tables that were scoped with tenant predicates.
    pub tables_scoped: Vec<String>,
    /// Tables skipped as global or system catalogs.
    pub tables_exempt: Vec<String>,
    /// The predicates that were added.
    pub predicates_added: Vec<String>,
    /// Constructs left unscoped.
    pub warnings: Vec<String>,
}

/// Explanation of tenant injection (for `cori-tenant explain`).
#[derive(Debug, Clone, Serialize)]
pub struct InjectionExplanation {
    pub original_sql: String,
    pub rewritten_sql: String,
    pub tables_scoped: Vec<String>,
    pub tables_exempt: Vec<String>,
    pub predicates_added: Vec<String>,
    pub warnings: Vec<String>,
    /// The tenant value or placeholder used.
    pub tenant: String,
    pub tenant_column: String,
}
