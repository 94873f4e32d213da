use chrono::{Duration, Utc};
use safekeep_core::DBDateTime;
use safekeep_entities::types::OperationStatus;
use safekeep_entities::{backup_configs, backups};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backup::BackupOrchestrator;
use super::BackupError;

/// Outcome of one retention pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub configs_checked: usize,
    pub backups_deleted: Vec<i32>,
    pub failures: Vec<String>,
}

/// Deletes completed backups that fall outside their config's retention
/// policy.
pub struct RetentionSweeper {
    db: Arc<DatabaseConnection>,
    backups: Arc<BackupOrchestrator>,
    interval: std::time::Duration,
}

impl RetentionSweeper {
    pub fn new(
        db: Arc<DatabaseConnection>,
        backups: Arc<BackupOrchestrator>,
        interval: std::time::Duration,
    ) -> Self {
        Self {
            db,
            backups,
            interval,
        }
    }

    /// One pass over every active config. Failures are collected per config
    /// and per backup; one bad config never stops the others.
    pub async fn sweep_once(&self, now: DBDateTime) -> Result<SweepReport, BackupError> {
        let configs = backup_configs::Entity::find()
            .filter(backup_configs::Column::IsActive.eq(true))
            .order_by_asc(backup_configs::Column::Id)
            .all(self.db.as_ref())
            .await?;

        let mut report = SweepReport::default();
        for config in configs {
            report.configs_checked += 1;
            match self.sweep_config(&config, now, &mut report).await {
                Ok(()) => {}
                Err(e) => {
                    error!(config_id = config.id, "Retention sweep failed for config: {}", e);
                    report
                        .failures
                        .push(format!("config {}: {}", config.id, e));
                }
            }
        }

        if !report.backups_deleted.is_empty() || !report.failures.is_empty() {
            info!(
                configs = report.configs_checked,
                deleted = report.backups_deleted.len(),
                failures = report.failures.len(),
                "Retention sweep finished"
            );
        }
        Ok(report)
    }

    /// Of the completed backups older than the retention window, the newest
    /// `max_backups` are kept and the rest deleted.
    async fn sweep_config(
        &self,
        config: &backup_configs::Model,
        now: DBDateTime,
        report: &mut SweepReport,
    ) -> Result<(), BackupError> {
        let cutoff = now - Duration::days(i64::from(config.retention_days.max(0)));
        let expired = backups::Entity::find()
            .filter(backups::Column::ConfigId.eq(config.id))
            .filter(backups::Column::Status.eq(OperationStatus::Completed))
            .filter(backups::Column::CreatedAt.lt(cutoff))
            .order_by_desc(backups::Column::CreatedAt)
            .order_by_desc(backups::Column::Id)
            .all(self.db.as_ref())
            .await?;

        let keep = usize::try_from(config.max_backups.max(0)).unwrap_or(0);
        debug!(
            config_id = config.id,
            expired = expired.len(),
            keep,
            "Evaluating retention"
        );

        for backup in expired.into_iter().skip(keep) {
            match self.backups.delete_backup(backup.id).await {
                Ok(()) => {
                    info!(config_id = config.id, backup_id = backup.id, "Deleted expired backup");
                    report.backups_deleted.push(backup.id);
                }
                Err(e) => {
                    warn!(
                        config_id = config.id,
                        backup_id = backup.id,
                        "Failed to delete expired backup: {}", e
                    );
                    report
                        .failures
                        .push(format!("backup {}: {}", backup.id, e));
                }
            }
        }
        Ok(())
    }

    /// Sweep every `interval` until `cancellation_token` fires.
    pub async fn run(&self, cancellation_token: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting retention sweeper"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    info!("Retention sweeper received cancellation signal, shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once(Utc::now()).await {
                        error!("Retention sweep failed: {}", e);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::backup::CreateBackupOptions;
    use crate::testing::Harness;
    use safekeep_entities::types::BackupType;
    use sea_orm::{ActiveModelTrait, Set};

    async fn backup_aged(h: &Harness, config_id: i32, age_days: i64) -> i32 {
        let mut options = CreateBackupOptions::new("policy", BackupType::DatabaseOnly);
        options.config_id = Some(config_id);
        let id = h.backups.create_backup(options).await.unwrap();
        backups::ActiveModel {
            id: Set(id),
            created_at: Set(Utc::now() - Duration::days(age_days)),
            ..Default::default()
        }
        .update(h.db.as_ref())
        .await
        .unwrap();
        id
    }

    fn sweeper(h: &Harness) -> RetentionSweeper {
        RetentionSweeper::new(
            h.db.clone(),
            h.backups.clone(),
            std::time::Duration::from_secs(3600),
        )
    }

    #[tokio::test]
    async fn test_keeps_recent_and_newest_expired() {
        let h = Harness::new().await;
        let config_id = h.create_config("weekly", 7, 1).await;

        let fresh = backup_aged(&h, config_id, 1).await;
        let newest_expired = backup_aged(&h, config_id, 10).await;
        let older = backup_aged(&h, config_id, 20).await;
        let oldest = backup_aged(&h, config_id, 30).await;

        let report = sweeper(&h).sweep_once(Utc::now()).await.unwrap();

        assert_eq!(report.configs_checked, 1);
        assert_eq!(report.backups_deleted, vec![older, oldest]);
        assert!(report.failures.is_empty());
        assert!(h.backups.get_backup(fresh).await.is_ok());
        assert!(h.backups.get_backup(newest_expired).await.is_ok());
        assert!(h.backups.get_backup(older).await.is_err());
    }

    #[tokio::test]
    async fn test_ignores_inactive_configs_and_unlinked_backups() {
        let h = Harness::new().await;
        let inactive = h.create_config("paused", 1, 0).await;
        h.configs.deactivate(inactive).await.unwrap();
        let kept = backup_aged(&h, inactive, 30).await;

        let manual = h
            .backups
            .create_backup(CreateBackupOptions::new("manual", BackupType::DatabaseOnly))
            .await
            .unwrap();

        let report = sweeper(&h).sweep_once(Utc::now()).await.unwrap();
        assert_eq!(report.configs_checked, 0);
        assert!(report.backups_deleted.is_empty());
        assert!(h.backups.get_backup(kept).await.is_ok());
        assert!(h.backups.get_backup(manual).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_delete_does_not_stop_other_configs() {
        let h = Harness::new().await;
        let busy_config = h.create_config("busy", 1, 0).await;
        let other_config = h.create_config("other", 1, 0).await;
        let busy = backup_aged(&h, busy_config, 5).await;
        let other = backup_aged(&h, other_config, 5).await;

        let _reader = h
            .leases
            .try_acquire(crate::services::LeaseKey::BackupRead(busy))
            .unwrap();
        let report = sweeper(&h).sweep_once(Utc::now()).await.unwrap();

        assert_eq!(report.configs_checked, 2);
        assert_eq!(report.backups_deleted, vec![other]);
        assert_eq!(report.failures.len(), 1);
        assert!(h.backups.get_backup(busy).await.is_ok());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancellation() {
        let h = Harness::new().await;
        let sweeper = sweeper(&h);
        let token = CancellationToken::new();
        token.cancel();

        tokio::time::timeout(std::time::Duration::from_secs(5), sweeper.run(token))
            .await
            .unwrap();
    }
}
