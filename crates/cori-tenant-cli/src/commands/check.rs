//! `cori-tenant check` command implementation.
//!
//! Loads a tenancy configuration and reports inconsistencies that would make
//! scoping behave differently from what the file suggests.

use anyhow::{Context, Result};
use std::path::Path;

use cori_core::TenancyConfig;

/// Severity level for check results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARN"),
        }
    }
}

/// A single check finding.
#[derive(Debug, Clone)]
pub struct CheckFinding {
    pub severity: Severity,
    pub message: String,
    /// Location within the file (e.g. `tables.customers.global`).
    pub location: Option<String>,
}

impl CheckFinding {
    fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            location: None,
        }
    }

    fn info(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            message: message.into(),
            location: None,
        }
    }

    fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Results from running all checks.
#[derive(Debug, Default)]
pub struct CheckResults {
    pub findings: Vec<CheckFinding>,
}

impl CheckResults {
    fn add(&mut self, finding: CheckFinding) {
        self.findings.push(finding);
    }

    pub fn warning_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Warning)
            .count()
    }

    pub fn print_summary(&self) {
        let mut findings: Vec<_> = self.findings.iter().collect();
        findings.sort_by(|a, b| b.severity.cmp(&a.severity));

        for finding in findings {
            match &finding.location {
                Some(location) => {
                    println!("  [{}] {} ({location})", finding.severity, finding.message)
                }
                None => println!("  [{}] {}", finding.severity, finding.message),
            }
        }

        println!();
        if self.warning_count() == 0 {
            println!("✅ All checks passed!");
        } else {
            println!("⚠️  {} warning(s)", self.warning_count());
        }
    }
}

/// Run consistency checks over a loaded configuration.
pub fn check_config(config: &TenancyConfig) -> CheckResults {
    let mut results = CheckResults::default();

    results.add(CheckFinding::info(format!(
        "Tenant column `{}` ({} ids), dialect {}",
        config.tenant_column, config.tenant_id.id_type, config.dialect
    )));

    let exempt = config.exempt_table_names();
    if exempt.is_empty() {
        results.add(CheckFinding::info("No global tables: every table is tenant-scoped"));
    } else {
        results.add(CheckFinding::info(format!(
            "Global tables: {}",
            exempt.join(", ")
        )));
    }

    let mut tables: Vec<_> = config.tables.iter().collect();
    tables.sort_by(|a, b| a.0.cmp(b.0));
    for (name, table) in tables {
        let listed = config
            .global_tables
            .iter()
            .any(|global| global.eq_ignore_ascii_case(name));
        if listed && !table.global {
            results.add(
                CheckFinding::warning(format!(
                    "`{name}` is marked global: false but listed in global_tables, so it is not tenant-scoped"
                ))
                .with_location(format!("tables.{name}.global")),
            );
        } else if listed {
            results.add(
                CheckFinding::warning(format!("`{name}` is declared global twice"))
                    .with_location(format!("tables.{name}.global")),
            );
        }
    }

    if !config.exempt_system_catalogs {
        results.add(
            CheckFinding::warning(
                "System catalogs will be tenant-scoped; catalog queries will likely fail",
            )
            .with_location("exempt_system_catalogs"),
        );
    }

    results
}

pub fn run_check(path: &Path) -> Result<()> {
    println!("🔍 Checking tenancy configuration {}...", path.display());
    println!();

    let config = TenancyConfig::from_file(path)
        .with_context(|| format!("Failed to load tenancy configuration from {}", path.display()))?;

    check_config(&config).print_summary();
    Ok(())
}
