pub mod cli;
pub mod config;
pub mod entity;
pub mod errors;
pub mod logger;
pub mod models;
pub mod params;
pub mod query;
pub mod session;
pub mod store;
pub mod telemetry;

pub use config::SessionConfig;
pub use entity::Entity;
pub use errors::SessionError;
pub use params::{DbQueryParams, QueryOperator};
pub use query::Filter;
pub use session::Session;
pub use store::{DocumentStore, MemoryStore, MongoStore};

/// Initializes logging for an embedding application from the effective configuration.
///
/// A `log_config` YAML file wins, then `log4rs.yaml` in the working directory;
/// otherwise rolling files go to `log_dir` when set, and to stderr when not.
///
/// # Errors
/// Returns an error if the logger cannot be configured.
pub fn init(cfg: &SessionConfig) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = &cfg.log_config {
        return logger::init_path(path);
    }
    if std::path::Path::new(logger::DEFAULT_CONFIG_FILE).exists() {
        return logger::init();
    }
    match &cfg.log_dir {
        Some(dir) => logger::configure_logging(Some(dir), cfg.log_level.as_deref(), cfg.log_retention),
        None => logger::init_console(cfg.log_level.as_deref()),
    }
}
