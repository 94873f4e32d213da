use clap::{Args, Subcommand};
use colored::Colorize;
use safekeep_backup::CreateBackupConfig;

use super::context::{AppContext, BackupKind, ConnectionArgs};
use super::output;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// List backup configs
    List(ListConfigsArgs),
    /// Create a backup config
    Create(CreateConfigArgs),
    /// Deactivate a backup config; its backups are kept
    Delete(ConfigIdArgs),
}

#[derive(Args)]
struct ListConfigsArgs {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Include deactivated configs
    #[arg(long)]
    all: bool,
}

#[derive(Args)]
struct CreateConfigArgs {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[arg(long)]
    name: String,

    #[arg(long)]
    description: Option<String>,

    #[arg(long = "type", value_enum, default_value = "full")]
    backup_type: BackupKind,

    /// Cron expression, e.g. "0 2 * * *"
    #[arg(long)]
    schedule: Option<String>,

    /// Mark the schedule as enabled
    #[arg(long)]
    enable_schedule: bool,

    /// Backups younger than this many days are never swept
    #[arg(long, default_value_t = 30)]
    retention_days: i32,

    /// Number of expired backups kept anyway, newest first
    #[arg(long, default_value_t = 10)]
    max_backups: i32,
}

impl CreateConfigArgs {
    fn request(&self) -> CreateBackupConfig {
        CreateBackupConfig {
            name: self.name.clone(),
            description: self.description.clone(),
            backup_type: self.backup_type.into(),
            storage_location: None,
            schedule: self.schedule.clone(),
            is_schedule_enabled: self.enable_schedule,
            retention_days: self.retention_days,
            max_backups: self.max_backups,
        }
    }
}

#[derive(Args)]
struct ConfigIdArgs {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Config ID
    id: i32,
}

impl ConfigCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        match self.command {
            ConfigCommands::List(args) => rt.block_on(Self::execute_list(args)),
            ConfigCommands::Create(args) => rt.block_on(Self::execute_create(args)),
            ConfigCommands::Delete(args) => rt.block_on(Self::execute_delete(args)),
        }
    }

    async fn execute_list(args: ListConfigsArgs) -> anyhow::Result<()> {
        let ctx = AppContext::build(args.connection.server_config()).await?;
        let configs = ctx.configs.list(args.all).await?;

        println!();
        if configs.is_empty() {
            println!("{}", "No backup configs found.".bright_yellow());
            println!();
            return Ok(());
        }
        for config in &configs {
            output::print_config(config);
        }
        Ok(())
    }

    async fn execute_create(args: CreateConfigArgs) -> anyhow::Result<()> {
        let ctx = AppContext::build(args.connection.server_config()).await?;
        let config = ctx.configs.create(args.request()).await?;
        println!("{}", "Backup config created".bright_green().bold());
        output::print_config(&config);
        Ok(())
    }

    async fn execute_delete(args: ConfigIdArgs) -> anyhow::Result<()> {
        let ctx = AppContext::build(args.connection.server_config()).await?;
        let config = ctx.configs.deactivate(args.id).await?;
        println!("{} backup config #{} ({})", "Deactivated".bright_yellow(), config.id, config.name);
        Ok(())
    }
}
