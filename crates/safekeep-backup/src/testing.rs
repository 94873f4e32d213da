//! Fakes and fixtures shared by the orchestrator tests.

use async_trait::async_trait;
use chrono::Utc;
use safekeep_config::ServerConfig;
use safekeep_database::test_utils::TestDatabase;
use safekeep_entities::backups;
use safekeep_entities::types::{BackupType, OperationStatus, TriggerSource};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use crate::services::{
    BackupConfigService, BackupOrchestrator, CreateBackupConfig, DatabaseDumper,
    DatabaseStatistics, DumpError, LeaseKey, OperationLeases, RestoreOrchestrator, RestoreStats,
};

pub const FAKE_TABLE_COUNT: i32 = 4;
pub const FAKE_RESTORE_STATS: RestoreStats = RestoreStats {
    tables_restored: 3,
    records_restored: 42,
};

/// Lets a test pause [`FakeDumper::dump`] or [`FakeDumper::restore`]
/// mid-flight.
#[derive(Clone, Default)]
pub struct RestoreGate {
    entered: Arc<Notify>,
    released: Arc<Notify>,
}

impl RestoreGate {
    pub async fn wait_until_entered(&self) {
        self.entered.notified().await
    }

    pub fn release(&self) {
        self.released.notify_one()
    }
}

/// Stands in for pg_dump/psql: writes a small SQL file and counts calls.
pub struct FakeDumper {
    output_dir: PathBuf,
    fail_dump: AtomicBool,
    fail_restore: AtomicBool,
    dump_calls: AtomicUsize,
    restore_calls: AtomicUsize,
    gate: Mutex<Option<RestoreGate>>,
    dump_gate: Mutex<Option<RestoreGate>>,
}

impl FakeDumper {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            fail_dump: AtomicBool::new(false),
            fail_restore: AtomicBool::new(false),
            dump_calls: AtomicUsize::new(0),
            restore_calls: AtomicUsize::new(0),
            gate: Mutex::new(None),
            dump_gate: Mutex::new(None),
        }
    }

    pub fn fail_dump(&self, fail: bool) {
        self.fail_dump.store(fail, Ordering::SeqCst);
    }

    pub fn fail_restore(&self, fail: bool) {
        self.fail_restore.store(fail, Ordering::SeqCst);
    }

    pub fn dump_calls(&self) -> usize {
        self.dump_calls.load(Ordering::SeqCst)
    }

    pub fn restore_calls(&self) -> usize {
        self.restore_calls.load(Ordering::SeqCst)
    }

    /// Make the next restores block until the returned gate is released.
    pub fn hold_restore(&self) -> RestoreGate {
        let gate = RestoreGate::default();
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Make the next dumps block until the returned gate is released.
    pub fn hold_dump(&self) -> RestoreGate {
        let gate = RestoreGate::default();
        *self.dump_gate.lock().unwrap() = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl DatabaseDumper for FakeDumper {
    async fn dump(&self) -> Result<PathBuf, DumpError> {
        let call = self.dump_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.dump_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.released.notified().await;
        }
        if self.fail_dump.load(Ordering::SeqCst) {
            return Err(DumpError::DumpFailed {
                tool: "pg_dump".into(),
                exit_code: Some(1),
                stderr: "could not connect to server: connection refused".into(),
            });
        }
        fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(format!("database-test-{}.sql", call));
        fs::write(&path, b"CREATE TABLE widgets (id int);\nCOPY 2\n")?;
        Ok(path)
    }

    async fn restore(&self, sql_file: &Path) -> Result<RestoreStats, DumpError> {
        self.restore_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.released.notified().await;
        }
        if self.fail_restore.load(Ordering::SeqCst) {
            return Err(DumpError::RestoreFailed {
                tool: "psql".into(),
                exit_code: Some(3),
                stderr: "ERROR: relation \"widgets\" already exists".into(),
            });
        }
        assert!(sql_file.is_file(), "restore called with missing file");
        Ok(FAKE_RESTORE_STATS)
    }

    async fn statistics(&self) -> Result<DatabaseStatistics, DumpError> {
        Ok(DatabaseStatistics {
            table_count: FAKE_TABLE_COUNT,
            record_count: 17,
        })
    }
}

/// A migrated database, a data directory and wired orchestrators.
pub struct Harness {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<ServerConfig>,
    pub dumper: Arc<FakeDumper>,
    pub leases: OperationLeases,
    pub backups: Arc<BackupOrchestrator>,
    pub restores: Arc<RestoreOrchestrator>,
    pub configs: BackupConfigService,
    _test_db: TestDatabase,
}

impl Harness {
    pub async fn new() -> Self {
        let test_db = TestDatabase::new().await.unwrap();
        let config = ServerConfig::new(None, test_db.path().join("data"));
        config.ensure_directories().unwrap();
        let config = Arc::new(config);

        let dumper = Arc::new(FakeDumper::new(config.backups_dir.clone()));
        let leases = OperationLeases::new();
        let db = test_db.db.clone();
        let backups = Arc::new(BackupOrchestrator::new(
            db.clone(),
            config.clone(),
            dumper.clone(),
            leases.clone(),
        ));
        let restores = Arc::new(RestoreOrchestrator::new(
            db.clone(),
            config.clone(),
            dumper.clone(),
            backups.clone(),
        ));

        Self {
            configs: BackupConfigService::new(db.clone()),
            db,
            config,
            dumper,
            leases,
            backups,
            restores,
            _test_db: test_db,
        }
    }

    pub fn write_upload(&self, relative: &str, contents: &[u8]) {
        write_file(&self.config.uploads_dir.join(relative), contents);
    }

    pub fn write_asset(&self, relative: &str, contents: &[u8]) {
        write_file(&self.config.assets_dir.join(relative), contents);
    }

    pub fn sql_files_left(&self) -> usize {
        self.count_in_backups_dir("sql")
    }

    pub fn zip_files_left(&self) -> usize {
        self.count_in_backups_dir("zip")
    }

    fn count_in_backups_dir(&self, extension: &str) -> usize {
        fs::read_dir(&self.config.backups_dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|ext| ext == extension))
            .count()
    }

    pub async fn create_config(&self, name: &str, retention_days: i32, max_backups: i32) -> i32 {
        self.configs
            .create(CreateBackupConfig {
                name: name.to_string(),
                description: None,
                backup_type: BackupType::Full,
                storage_location: None,
                schedule: None,
                is_schedule_enabled: false,
                retention_days,
                max_backups,
            })
            .await
            .unwrap()
            .id
    }

    /// Poll until the backup is terminal and its pipeline has let go.
    pub async fn wait_for_backup(&self, id: i32) -> backups::Model {
        for _ in 0..500 {
            let backup = self.backups.get_backup(id).await.unwrap();
            if backup.status.is_terminal() && !self.leases.is_held(LeaseKey::Backup(id)) {
                return backup;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("backup {} did not finish", id);
    }

    /// Poll until the restore is terminal and its pipeline has let go.
    pub async fn wait_for_restore(&self, id: i32) -> safekeep_entities::restores::Model {
        for _ in 0..500 {
            let restore = self.restores.get_restore(id).await.unwrap();
            if restore.status.is_terminal() && !self.leases.is_held(LeaseKey::Restore(id)) {
                return restore;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("restore {} did not finish", id);
    }
}

/// A bare `in_progress` backup row, as left behind mid-run.
pub async fn insert_backup_row(db: &DatabaseConnection) -> i32 {
    let now = Utc::now();
    backups::ActiveModel {
        name: Set(format!("running-{}", now.timestamp_micros())),
        backup_type: Set(BackupType::Full),
        status: Set(OperationStatus::InProgress),
        started_at: Set(now),
        triggered_by: Set(TriggerSource::Manual),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .unwrap()
    .id
}

fn write_file(path: &Path, contents: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}
