//! `cori-tenant rewrite` and `cori-tenant explain` command implementations.

use anyhow::{Context, Result};
use clap::Args;
use std::fs;
use std::io::Read;
use std::path::PathBuf;

use cori_core::{SqlDialect, TenancyConfig};
use cori_tenant::{InjectionExplanation, TenantInjector, TenantValue};

/// Inputs shared by `rewrite` and `explain`.
#[derive(Args, Debug)]
pub struct SqlArgs {
    /// Path to tenancy.yaml
    #[arg(short, long, default_value = "tenancy.yaml")]
    pub config: PathBuf,

    /// Tenant identifier, validated against the configured tenant id type
    #[arg(
        short,
        long,
        conflicts_with = "placeholder",
        required_unless_present = "placeholder"
    )]
    pub tenant: Option<String>,

    /// Bind parameter to use instead of a literal tenant id (e.g. `$1`, `?`)
    #[arg(long)]
    pub placeholder: Option<String>,

    /// SQL dialect, overriding the one in the configuration
    #[arg(long)]
    pub dialect: Option<SqlDialect>,

    /// Read SQL from a file instead of the command line
    #[arg(short, long, conflicts_with = "sql")]
    pub file: Option<PathBuf>,

    /// SQL to scope; read from stdin when neither SQL nor --file is given
    pub sql: Option<String>,
}

impl SqlArgs {
    fn tenant_value(&self) -> Result<TenantValue> {
        match (&self.tenant, &self.placeholder) {
            (_, Some(placeholder)) => Ok(TenantValue::Placeholder(placeholder.clone())),
            (Some(tenant), None) => Ok(TenantValue::Literal(tenant.clone())),
            (None, None) => anyhow::bail!("either --tenant or --placeholder is required"),
        }
    }

    fn injector(&self) -> Result<TenantInjector> {
        let mut config = TenancyConfig::from_file(&self.config).with_context(|| {
            format!(
                "Failed to load tenancy configuration from {}",
                self.config.display()
            )
        })?;
        if let Some(dialect) = self.dialect {
            config.dialect = dialect;
        }
        tracing::debug!(
            tenant_column = %config.tenant_column,
            dialect = %config.dialect,
            "Loaded tenancy configuration"
        );
        Ok(TenantInjector::new(config))
    }

    fn read_sql(&self) -> Result<String> {
        if let Some(sql) = &self.sql {
            return Ok(sql.clone());
        }
        if let Some(path) = &self.file {
            return fs::read_to_string(path)
                .with_context(|| format!("Failed to read SQL from {}", path.display()));
        }
        let mut sql = String::new();
        std::io::stdin()
            .read_to_string(&mut sql)
            .context("Failed to read SQL from stdin")?;
        Ok(sql)
    }
}

pub fn run_rewrite(args: &SqlArgs) -> Result<()> {
    let injector = args.injector()?;
    let sql = args.read_sql()?;
    let result = injector
        .inject(sql.trim(), &args.tenant_value()?)
        .context("Failed to scope SQL")?;

    for warning in &result.warnings {
        tracing::warn!("{warning}");
    }
    println!("{}", result.rewritten_sql);
    Ok(())
}

pub fn run_explain(args: &SqlArgs, json: bool) -> Result<()> {
    let injector = args.injector()?;
    let sql = args.read_sql()?;
    let explanation = injector
        .explain(sql.trim(), &args.tenant_value()?)
        .context("Failed to scope SQL")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&explanation)?);
    } else {
        print!("{}", render_explanation(&explanation));
    }
    Ok(())
}

/// Human-readable explanation.
fn render_explanation(explanation: &InjectionExplanation) -> String {
    let mut out = format!(
        "Tenant:    {}\nColumn:    {}\n\nOriginal:  {}\nRewritten: {}\n",
        explanation.tenant,
        explanation.tenant_column,
        explanation.original_sql,
        explanation.rewritten_sql
    );

    let sections = [
        ("Tables scoped", &explanation.tables_scoped),
        ("Tables exempt", &explanation.tables_exempt),
        ("Predicates added", &explanation.predicates_added),
        ("Warnings", &explanation.warnings),
    ];
    for (title, items) in sections {
        if items.is_empty() {
            continue;
        }
        out.push_str(&format!("\n{title} ({}):\n", items.len()));
        for item in items {
            out.push_str(&format!("  - {item}\n"));
        }
    }
    out
}
