mod service;

pub use service::{
    resolve_database_url, ConfigError, ServerConfig, ASSETS_DIR_NAME, BACKUPS_DIR_NAME,
    DATABASE_URL_ENV, DATA_DIR_ENV, FALLBACK_DATABASE_URL_ENV, TEMP_DIR_NAME, UPLOADS_DIR_NAME,
};
