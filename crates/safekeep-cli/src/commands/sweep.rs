use chrono::Utc;
use clap::Args;
use safekeep_backup::RetentionSweeper;
use std::time::Duration;

use super::context::{AppContext, ConnectionArgs};
use super::output;

#[derive(Args)]
pub struct SweepCommand {
    #[command(flatten)]
    connection: ConnectionArgs,
}

impl SweepCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(async move {
            let ctx = AppContext::build(self.connection.server_config()).await?;
            let sweeper = RetentionSweeper::new(
                ctx.db.clone(),
                ctx.backups.clone(),
                Duration::from_secs(ctx.config.retention_interval_secs),
            );

            let report = sweeper.sweep_once(Utc::now()).await?;
            output::print_sweep_report(&report);
            if report.failures.is_empty() {
                Ok(())
            } else {
                Err(anyhow::anyhow!(
                    "{} backup(s) could not be swept",
                    report.failures.len()
                ))
            }
        })
    }
}
