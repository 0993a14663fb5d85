use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::rewrite::SqlArgs;

#[derive(Parser, Debug)]
#[command(
    name = "cori-tenant",
    version,
    about = "Scope SQL statements to a single tenant"
)]
struct Cli {
    /// Log rewrite decisions (exempt tables, injected predicates) to stderr
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the tenant-scoped SQL.
    Rewrite {
        #[command(flatten)]
        args: SqlArgs,
    },

    /// Show which tables were scoped and which predicates were added.
    Explain {
        #[command(flatten)]
        args: SqlArgs,

        /// Print the explanation as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Validate a tenancy configuration file.
    Check {
        /// Path to tenancy.yaml
        #[arg(short, long, default_value = "tenancy.yaml")]
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.cmd {
        Command::Rewrite { args } => commands::rewrite::run_rewrite(&args)?,
        Command::Explain { args, json } => commands::rewrite::run_explain(&args, json)?,
        Command::Check { config } => commands::check::run_check(&config)?,
    }

    Ok(())
}
