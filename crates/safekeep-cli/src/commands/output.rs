use colored::{ColoredString, Colorize};
use safekeep_backup::SweepReport;
use safekeep_core::DBDateTime;
use safekeep_entities::types::OperationStatus;
use safekeep_entities::{backup_configs, backups, restores};

pub fn status(status: &OperationStatus) -> ColoredString {
    match status {
        OperationStatus::Completed => status.as_str().bright_green(),
        OperationStatus::Failed => status.as_str().bright_red(),
        OperationStatus::Cancelled => status.as_str().bright_yellow(),
        OperationStatus::InProgress | OperationStatus::Pending => status.as_str().bright_cyan(),
    }
}

pub fn size(bytes: Option<i64>) -> String {
    match bytes {
        Some(bytes) => format!("{:.2} MB", bytes as f64 / 1024.0 / 1024.0),
        None => "-".to_string(),
    }
}

fn timestamp(at: &DBDateTime) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn print_backup(backup: &backups::Model) {
    println!(
        "  {} {} {}",
        format!("#{}", backup.id).bright_white().bold(),
        backup.name.bright_cyan(),
        status(&backup.status)
    );
    println!("  {} {}", "Type:".bright_white(), backup.backup_type.as_str());
    println!("  {} {}", "Started:".bright_white(), timestamp(&backup.started_at));
    println!("  {} {}", "Size:".bright_white(), size(backup.file_size));
    if let Some(path) = &backup.file_path {
        println!("  {} {}", "Archive:".bright_white(), path.bright_green());
    }
    if let Some(sha256) = &backup.checksum_sha256 {
        println!("  {} {}", "SHA-256:".bright_white(), sha256);
    }
    if let Some(error) = &backup.error_message {
        println!("  {} {}", "Error:".bright_white(), error.bright_red());
    }
    println!();
}

pub fn print_restore(restore: &restores::Model) {
    println!(
        "  {} {} {}",
        format!("#{}", restore.id).bright_white().bold(),
        restore.name.bright_cyan(),
        status(&restore.status)
    );
    let source = restore
        .backup_id
        .map(|id| format!("backup #{}", id))
        .unwrap_or_else(|| "deleted backup".to_string());
    println!("  {} {}", "Source:".bright_white(), source);
    println!(
        "  {} {}/{} {}",
        "Progress:".bright_white(),
        restore.completed_steps,
        restore.total_steps,
        restore.current_step.as_deref().unwrap_or("")
    );
    if let Some(id) = restore.pre_restore_backup_id {
        println!("  {} backup #{}", "Safety backup:".bright_white(), id);
    }
    if let (Some(tables), Some(records)) = (restore.tables_restored, restore.records_restored) {
        println!(
            "  {} {} tables, {} records",
            "Database:".bright_white(),
            tables,
            records
        );
    }
    if let Some(files) = restore.files_restored {
        println!("  {} {}", "Files:".bright_white(), files);
    }
    if let Some(error) = &restore.error_message {
        println!("  {} {}", "Error:".bright_white(), error.bright_red());
    }
    println!();
}

pub fn print_config(config: &backup_configs::Model) {
    let active = if config.is_active {
        "active".bright_green()
    } else {
        "inactive".bright_yellow()
    };
    println!(
        "  {} {} {}",
        format!("#{}", config.id).bright_white().bold(),
        config.name.bright_cyan(),
        active
    );
    println!("  {} {}", "Type:".bright_white(), config.backup_type.as_str());
    println!(
        "  {} keep {} days, at least {} backups",
        "Retention:".bright_white(),
        config.retention_days,
        config.max_backups
    );
    if let Some(schedule) = &config.schedule {
        let state = if config.is_schedule_enabled { "enabled" } else { "disabled" };
        println!("  {} {} ({})", "Schedule:".bright_white(), schedule, state);
    }
    println!();
}

pub fn print_sweep_report(report: &SweepReport) {
    println!(
        "{} {} config(s) checked, {} backup(s) deleted",
        "Retention sweep:".bright_white().bold(),
        report.configs_checked.to_string().bright_cyan(),
        report.backups_deleted.len().to_string().bright_cyan()
    );
    for id in &report.backups_deleted {
        println!("  {} backup #{}", "deleted".bright_green(), id);
    }
    for failure in &report.failures {
        println!("  {} {}", "failed".bright_red(), failure);
    }
}
