use chrono::Utc;
use clap::{Args, Subcommand};
use colored::Colorize;
use safekeep_backup::RestoreOptions;
use tracing::info;

use super::context::{AppContext, ConnectionArgs};
use super::output;

#[derive(Args)]
pub struct RestoreCommand {
    #[command(subcommand)]
    command: RestoreCommands,
}

#[derive(Subcommand)]
enum RestoreCommands {
    /// Restore from a completed backup and wait for it to finish
    Run(RunRestoreArgs),
    /// List restores, newest first
    List(ListRestoresArgs),
    /// Ask a running restore to stop at its next step
    Cancel(CancelRestoreArgs),
}

#[derive(Args)]
struct RunRestoreArgs {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// ID of the backup to restore from
    backup_id: i32,

    /// Name of the restore (default: restore-<timestamp>)
    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    description: Option<String>,

    /// Do not replay the database dump
    #[arg(long)]
    skip_database: bool,

    /// Do not copy uploads and assets back
    #[arg(long)]
    skip_files: bool,

    /// Do not apply the settings snapshot
    #[arg(long)]
    skip_settings: bool,

    /// Do not take a safety backup before restoring
    #[arg(long)]
    no_safety_backup: bool,
}

impl RunRestoreArgs {
    fn options(&self) -> RestoreOptions {
        let name = self
            .name
            .clone()
            .unwrap_or_else(|| format!("restore-{}", Utc::now().format("%Y%m%dT%H%M%S")));
        let mut options = RestoreOptions::new(self.backup_id, name);
        options.description = self.description.clone();
        options.restore_database = !self.skip_database;
        options.restore_files = !self.skip_files;
        options.restore_settings = !self.skip_settings;
        options.create_backup_before_restore = !self.no_safety_backup;
        options
    }
}

#[derive(Args)]
struct ListRestoresArgs {
    #[command(flatten)]
    connection: ConnectionArgs,
}

#[derive(Args)]
struct CancelRestoreArgs {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Restore ID
    id: i32,
}

impl RestoreCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        match self.command {
            RestoreCommands::Run(args) => rt.block_on(Self::execute_run(args)),
            RestoreCommands::List(args) => rt.block_on(Self::execute_list(args)),
            RestoreCommands::Cancel(args) => rt.block_on(Self::execute_cancel(args)),
        }
    }

    async fn execute_run(args: RunRestoreArgs) -> anyhow::Result<()> {
        let ctx = AppContext::build(args.connection.server_config()).await?;
        let options = args.options();
        info!(backup_id = options.backup_id, name = %options.name, "Restoring from CLI");

        println!();
        println!("{}", "   Restore Backup".bright_white().bold());
        println!(
            "   {}",
            "The live database and files will be overwritten.".bright_yellow()
        );
        println!();

        let id = ctx.restores.restore_from_backup(options).await?;
        let restore = ctx.restores.get_restore(id).await?;
        println!("{}", "Restore completed".bright_green().bold());
        output::print_restore(&restore);
        Ok(())
    }

    async fn execute_list(args: ListRestoresArgs) -> anyhow::Result<()> {
        let ctx = AppContext::build(args.connection.server_config()).await?;
        let restores = ctx.restores.list_restores().await?;

        println!();
        if restores.is_empty() {
            println!("{}", "No restores found.".bright_yellow());
            println!();
            return Ok(());
        }
        for restore in &restores {
            output::print_restore(restore);
        }
        println!(
            "{} {}",
            "Total restores:".bright_white().bold(),
            restores.len().to_string().bright_cyan()
        );
        println!();
        Ok(())
    }

    async fn execute_cancel(args: CancelRestoreArgs) -> anyhow::Result<()> {
        let ctx = AppContext::build(args.connection.server_config()).await?;
        let restore = ctx.restores.cancel_restore(args.id).await?;
        println!(
            "{} restore #{}; it stops after its current step",
            "Cancelled".bright_yellow(),
            restore.id
        );
        Ok(())
    }
}
