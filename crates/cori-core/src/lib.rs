//! Core types shared by the Cori tenant-scoping crates.

// Configuration types shared across all Cori crates
pub mod config;

// Re-export commonly used config types for convenience
pub use config::{
    ConfigError, SqlDialect, TableTenancyConfig, TenancyConfig, TenantIdConfig, TenantIdType,
};
