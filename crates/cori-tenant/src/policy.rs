//! Tenant policies: which tables are scoped, by which column, to which value.

use std::sync::Arc;

use cori_core::{TenancyConfig, TenantIdType};
use sqlparser::ast::{Expr, Value};
use uuid::Uuid;

use crate::error::ScopeError;

/// Strategy consulted by the rewriter for every table reference.
///
/// Implementations must be pure: the rewriter may call them any number of
/// times per statement, from several threads at once.
pub trait TenantPolicy: Send + Sync {
    /// Whether `table_name` is excluded from tenant scoping.
    ///
    /// `table_name` is the dotted name as written in the statement, without
    /// quotes (e.g. `orders` or `public.orders`).
    fn is_exempt(&self, table_name: &str) -> bool;

    /// Name of the tenant discriminator column.
    fn tenant_id_column(&self) -> &str;

    /// Value compared against or inserted into the tenant column.
    fn tenant_id_value(&self) -> Expr;
}

impl<P: TenantPolicy + ?Sized> TenantPolicy for &P {
    fn is_exempt(&self, table_name: &str) -> bool {
        (**self).is_exempt(table_name)
    }

    fn tenant_id_column(&self) -> &str {
        (**self).tenant_id_column()
    }

    fn tenant_id_value(&self) -> Expr {
        (**self).tenant_id_value()
    }
}

impl<P: TenantPolicy + ?Sized> TenantPolicy for Arc<P> {
    fn is_exempt(&self, table_name: &str) -> bool {
        (**self).is_exempt(table_name)
    }

    fn tenant_id_column(&self) -> &str {
        (**self).tenant_id_column()
    }

    fn tenant_id_value(&self) -> Expr {
        (**self).tenant_id_value()
    }
}

/// The tenant a statement is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantValue {
    /// Tenant identifier bound now, rendered according to the configured type.
    Literal(String),
    /// Parameter placeholder (`$1`, `?`, `:tenant`) bound later by the executor.
    Placeholder(String),
}

impl TenantValue {
    /// Build the SQL expression for this value.
    pub fn to_expr(&self, id_type: TenantIdType) -> Result<Expr, ScopeError> {
        let value = match self {
            TenantValue::Placeholder(placeholder) => Value::Placeholder(placeholder.clone()),
            TenantValue::Literal(raw) => match id_type {
                TenantIdType::Integer => {
                    let id: i64 = raw.trim().parse().map_err(|_| invalid(raw, id_type))?;
                    Value::Number(id.to_string(), false)
                }
                TenantIdType::Uuid => {
                    let id = Uuid::parse_str(raw.trim()).map_err(|_| invalid(raw, id_type))?;
                    Value::SingleQuotedString(id.hyphenated().to_string())
                }
                TenantIdType::String => Value::SingleQuotedString(raw.clone()),
            },
        };
        Ok(Expr::Value(value.into()))
    }
}

impl std::fmt::Display for TenantValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TenantValue::Literal(value) => write!(f, "{value}"),
            TenantValue::Placeholder(placeholder) => write!(f, "{placeholder}"),
        }
    }
}

fn invalid(raw: &str, id_type: TenantIdType) -> ScopeError {
    ScopeError::InvalidTenantValue {
        value: raw.to_string(),
        expected: id_type.to_string(),
    }
}

/// Policy backed by a [`TenancyConfig`] and one tenant value.
///
/// The value expression is built and validated once, at construction.
#[derive(Debug, Clone)]
pub struct ConfigTenantPolicy {
    config: TenancyConfig,
    value: Expr,
}

impl ConfigTenantPolicy {
    pub fn new(config: TenancyConfig, tenant: &TenantValue) -> Result<Self, ScopeError> {
        let value = tenant.to_expr(config.tenant_id.id_type)?;
        Ok(Self { config, value })
    }

    pub fn config(&self) -> &TenancyConfig {
        &self.config
    }
}

impl TenantPolicy for ConfigTenantPolicy {
    fn is_exempt(&self, table_name: &str) -> bool {
        self.config.is_global_table(table_name) || self.config.is_system_catalog_table(table_name)
    }

    fn tenant_id_column(&self) -> &str {
        &self.config.tenant_column
    }

    fn tenant_id_value(&self) -> Expr {
        self.value.clone()
    }
}
