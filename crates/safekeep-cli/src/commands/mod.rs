pub mod backup;
pub mod config;
pub mod context;
mod output;
pub mod restore;
pub mod serve;
pub mod sweep;

pub use backup::BackupCommand;
pub use config::ConfigCommand;
pub use restore::RestoreCommand;
pub use serve::ServeCommand;
pub use sweep::SweepCommand;
