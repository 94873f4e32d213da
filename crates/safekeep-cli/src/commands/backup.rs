use clap::{Args, Subcommand};
use colored::Colorize;
use safekeep_backup::CreateBackupOptions;
use tracing::info;

use super::context::{AppContext, BackupKind, ConnectionArgs};
use super::output;

#[derive(Args)]
pub struct BackupCommand {
    #[command(subcommand)]
    command: BackupCommands,
}

#[derive(Subcommand)]
enum BackupCommands {
    /// Create a backup and wait for it to finish
    Create(CreateBackupArgs),
    /// List backups, newest first
    List(ListBackupsArgs),
    /// Delete a backup, its archive and its logs
    Delete(BackupIdArgs),
    /// Recompute the archive checksum and compare it with the recorded one
    Verify(BackupIdArgs),
}

#[derive(Args)]
struct CreateBackupArgs {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Backup name; the timestamp is appended automatically
    #[arg(long)]
    name: String,

    #[arg(long)]
    description: Option<String>,

    /// What to capture
    #[arg(long = "type", value_enum, default_value = "full")]
    backup_type: BackupKind,

    /// Leave the uploads directory out
    #[arg(long)]
    skip_uploads: bool,

    /// Leave the static assets directory out
    #[arg(long)]
    skip_assets: bool,

    /// Leave the settings snapshot out
    #[arg(long)]
    skip_settings: bool,

    /// Store entries without compression
    #[arg(long)]
    no_compression: bool,

    /// Deflate level, 0 (store) to 9
    #[arg(long, default_value_t = 6)]
    compression_level: u8,

    /// Attach the backup to a config so its retention policy applies
    #[arg(long)]
    config_id: Option<i32>,
}

impl CreateBackupArgs {
    fn options(&self) -> CreateBackupOptions {
        let mut options = CreateBackupOptions::new(self.name.clone(), self.backup_type.into());
        options.description = self.description.clone();
        options.include_uploads = !self.skip_uploads;
        options.include_assets = !self.skip_assets;
        options.include_settings = !self.skip_settings;
        options.compression_enabled = !self.no_compression;
        options.compression_level = self.compression_level;
        options.config_id = self.config_id;
        options
    }
}

#[derive(Args)]
struct ListBackupsArgs {
    #[command(flatten)]
    connection: ConnectionArgs,
}

#[derive(Args)]
struct BackupIdArgs {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Backup ID
    id: i32,
}

impl BackupCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        match self.command {
            BackupCommands::Create(args) => rt.block_on(Self::execute_create(args)),
            BackupCommands::List(args) => rt.block_on(Self::execute_list(args)),
            BackupCommands::Delete(args) => rt.block_on(Self::execute_delete(args)),
            BackupCommands::Verify(args) => rt.block_on(Self::execute_verify(args)),
        }
    }

    async fn execute_create(args: CreateBackupArgs) -> anyhow::Result<()> {
        let ctx = AppContext::build(args.connection.server_config()).await?;
        let options = args.options();
        info!(name = %options.name, "Creating backup from CLI");

        println!("{}", "Creating backup...".bright_white());
        let id = ctx.backups.create_backup(options).await?;
        let backup = ctx.backups.get_backup(id).await?;

        println!();
        println!("{}", "Backup completed".bright_green().bold());
        output::print_backup(&backup);
        Ok(())
    }

    async fn execute_list(args: ListBackupsArgs) -> anyhow::Result<()> {
        let ctx = AppContext::build(args.connection.server_config()).await?;
        let backups = ctx.backups.list_backups().await?;

        println!();
        if backups.is_empty() {
            println!("{}", "No backups found.".bright_yellow());
            println!();
            return Ok(());
        }
        for backup in &backups {
            output::print_backup(backup);
        }
        println!(
            "{} {}",
            "Total backups:".bright_white().bold(),
            backups.len().to_string().bright_cyan()
        );
        println!();
        Ok(())
    }

    async fn execute_delete(args: BackupIdArgs) -> anyhow::Result<()> {
        let ctx = AppContext::build(args.connection.server_config()).await?;
        ctx.backups.delete_backup(args.id).await?;
        println!("{} backup #{}", "Deleted".bright_green(), args.id);
        Ok(())
    }

    async fn execute_verify(args: BackupIdArgs) -> anyhow::Result<()> {
        let ctx = AppContext::build(args.connection.server_config()).await?;
        if ctx.backups.validate_integrity(args.id).await? {
            println!("{} backup #{} matches its checksum", "OK".bright_green().bold(), args.id);
            Ok(())
        } else {
            println!(
                "{} backup #{} does not match its recorded checksum",
                "CORRUPT".bright_red().bold(),
                args.id
            );
            Err(anyhow::anyhow!("Backup {} failed the integrity check", args.id))
        }
    }
}
