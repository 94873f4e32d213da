//! Safekeep CLI - backup and restore orchestration
//!
//! `serve` runs the HTTP API together with the retention loop; the other
//! subcommands run one operation against the same database and data
//! directory and exit.

mod commands;

use clap::{Parser, Subcommand};
use commands::{BackupCommand, ConfigCommand, RestoreCommand, ServeCommand, SweepCommand};
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "SAFEKEEP_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "SAFEKEEP_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server and the retention sweeper
    Serve(ServeCommand),
    /// Create, list, verify and delete backups
    Backup(BackupCommand),
    /// Restore from a backup and inspect restores
    Restore(RestoreCommand),
    /// Manage backup configs (retention policies)
    Config(ConfigCommand),
    /// Run one retention pass and exit
    Sweep(SweepCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG, when set, takes full control of filtering
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .expect("Invalid RUST_LOG environment variable")
    } else {
        tracing_subscriber::EnvFilter::new(format!(
            "safekeep={level},\
             safekeep_cli={level},\
             safekeep_backup={level},\
             safekeep_config={level},\
             safekeep_core={level},\
             safekeep_database={level},\
             safekeep_entities={level},\
             safekeep_migrations={level},\
             sqlx=warn,\
             sea_orm=warn,\
             sea_orm_migration=warn,\
             h2=warn,\
             tower=warn,\
             tower_http=warn,\
             hyper=warn",
            level = cli.log_level
        ))
    };

    let fmt_layer = match cli.log_format.as_str() {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set global default subscriber");

    match cli.command {
        Commands::Serve(cmd) => cmd.execute(),
        Commands::Backup(cmd) => cmd.execute(),
        Commands::Restore(cmd) => cmd.execute(),
        Commands::Config(cmd) => cmd.execute(),
        Commands::Sweep(cmd) => cmd.execute(),
    }
}
