//! Tenancy configuration for multi-tenant databases.
//!
//! This module defines how multi-tenancy is structured in the database:
//! the tenant discriminator column, how tenant identifiers are typed,
//! and which tables are global (shared by every tenant).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::{ConfigError, SqlDialect};

/// Configuration for tenant isolation.
///
/// This defines the database-level structure of multi-tenancy. The tenant
/// identifier itself is per request and is not part of the configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenancyConfig {
    /// Tenant identifier configuration.
    #[serde(default)]
    pub tenant_id: TenantIdConfig,

    /// Column holding the tenant discriminator in every tenant-governed table.
    #[serde(default = "default_tenant_column", alias = "default_column")]
    pub tenant_column: String,

    /// Per-table configuration.
    #[serde(default)]
    pub tables: HashMap<String, TableTenancyConfig>,

    /// Tables that are global (no tenant scoping applied).
    #[serde(default)]
    pub global_tables: Vec<String>,

    /// Never scope `pg_catalog`, `information_schema` and `pg_*` tables.
    #[serde(default = "default_true")]
    pub exempt_system_catalogs: bool,

    /// Dialect statements are parsed and printed with.
    #[serde(default)]
    pub dialect: SqlDialect,
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            tenant_id: TenantIdConfig::default(),
            tenant_column: default_tenant_column(),
            tables: HashMap::new(),
            global_tables: Vec::new(),
            exempt_system_catalogs: true,
            dialect: SqlDialect::default(),
        }
    }
}

/// Tenant identifier type configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantIdConfig {
    /// Type of tenant identifier (uuid, integer, string).
    #[serde(default, rename = "type")]
    pub id_type: TenantIdType,

    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
}

/// How literal tenant identifiers are validated and rendered into SQL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantIdType {
    #[default]
    Uuid,
    Integer,
    String,
}

impl std::fmt::Display for TenantIdType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TenantIdType::Uuid => write!(f, "uuid"),
            TenantIdType::Integer => write!(f, "integer"),
            TenantIdType::String => write!(f, "string"),
        }
    }
}

/// Per-table tenancy configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableTenancyConfig {
    /// Whether this is a global table (no tenant scoping).
    #[serde(default)]
    pub global: bool,

    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
}

impl TenancyConfig {
    /// Load tenancy configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Load tenancy configuration from a file path relative to a base directory.
    ///
    /// If the tenancy_file path is absolute, it is used directly.
    /// Otherwise, it is resolved relative to the base_dir.
    pub fn load_from_path(
        tenancy_file: impl AsRef<Path>,
        base_dir: impl AsRef<Path>,
    ) -> Result<Self, ConfigError> {
        let tenancy_file = tenancy_file.as_ref();
        let tenancy_path = if tenancy_file.is_absolute() {
            tenancy_file.to_path_buf()
        } else {
            base_dir.as_ref().join(tenancy_file)
        };

        if tenancy_path.exists() {
            Self::from_file(&tenancy_path)
        } else {
            Err(ConfigError::Config(format!(
                "Tenancy file not found: {}",
                tenancy_path.display()
            )))
        }
    }

    /// Parse tenancy configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values that would produce broken SQL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let column = self.tenant_column.trim();
        if column.is_empty() {
            return Err(ConfigError::Config(
                "tenant_column must not be empty".to_string(),
            ));
        }
        if column.contains(|c: char| c.is_whitespace() || c == '.') {
            return Err(ConfigError::Config(format!(
                "tenant_column must be a single unqualified column name, got {column:?}"
            )));
        }
        if let Some(table) = self.global_tables.iter().find(|t| t.trim().is_empty()) {
            return Err(ConfigError::Config(format!(
                "global_tables contains an empty table name: {table:?}"
            )));
        }
        Ok(())
    }

    /// Check if a table is global (no tenant scoping).
    ///
    /// `table_name` may be schema-qualified; both the full name and the
    /// unqualified name are matched, ignoring ASCII case.
    pub fn is_global_table(&self, table_name: &str) -> bool {
        let unqualified = table_name.rsplit('.').next().unwrap_or(table_name);
        let matches = |candidate: &str| {
            candidate.eq_ignore_ascii_case(table_name) || candidate.eq_ignore_ascii_case(unqualified)
        };

        // Check global list
        if self.global_tables.iter().any(|t| matches(t)) {
            return true;
        }

        // Check per-table configuration
        self.tables
            .iter()
            .any(|(name, table_config)| table_config.global && matches(name))
    }

    /// Check if a table belongs to the database's system catalogs.
    pub fn is_system_catalog_table(&self, table_name: &str) -> bool {
        if !self.exempt_system_catalogs {
            return false;
        }

        let table_lower = table_name.to_ascii_lowercase();

        // Explicit catalog schema prefix
        if table_lower.starts_with("pg_catalog.") || table_lower.starts_with("information_schema.")
        {
            return true;
        }

        // Only unqualified pg_* names resolve to the catalog through the search path
        !table_lower.contains('.') && table_lower.starts_with("pg_")
    }

    /// Names of all tables exempt from tenant scoping by configuration.
    pub fn exempt_table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.global_tables.iter().map(String::as_str).collect();
        names.extend(
            self.tables
                .iter()
                .filter(|(_, table_config)| table_config.global)
                .map(|(name, _)| name.as_str()),
        );
        names.sort_unstable();
        names.dedup();
        names
    }
}

// Default value functions
fn default_tenant_column() -> String {
    "tenant_id".to_string()
}

fn default_true() -> bool {
    true
}
