//! Configuration types for Cori tenant scoping.
//!
//! Configuration is loaded from a YAML file (conventionally `tenancy.yaml`)
//! describing which column carries the tenant discriminator, which tables
//! are shared across tenants, and which SQL dialect statements are written in.

pub mod tenancy;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use tenancy::{TableTenancyConfig, TenancyConfig, TenantIdConfig, TenantIdType};

/// SQL dialect used to parse and print statements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    #[default]
    Postgres,
    Mysql,
    Sqlite,
    Mssql,
    Ansi,
    Generic,
}

impl SqlDialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlDialect::Postgres => "postgres",
            SqlDialect::Mysql => "mysql",
            SqlDialect::Sqlite => "sqlite",
            SqlDialect::Mssql => "mssql",
            SqlDialect::Ansi => "ansi",
            SqlDialect::Generic => "generic",
        }
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SqlDialect {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(SqlDialect::Postgres),
            "mysql" => Ok(SqlDialect::Mysql),
            "sqlite" => Ok(SqlDialect::Sqlite),
            "mssql" => Ok(SqlDialect::Mssql),
            "ansi" => Ok(SqlDialect::Ansi),
            "generic" => Ok(SqlDialect::Generic),
            other => Err(ConfigError::Config(format!("unknown SQL dialect: {other}"))),
        }
    }
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}
