use log::LevelFilter;
use log4rs::Handle;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};

/// Log target for write operations (add, save, delete, drop, index creation).
pub const AUDIT_TARGET: &str = "mongosession::audit";
/// Log target for per-operation timing lines.
pub const METRICS_TARGET: &str = "mongosession::metrics";

const ENCODER_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
const ROLL_SIZE_BYTES: u64 = 10 * 1024 * 1024;

static HANDLE: OnceCell<Handle> = OnceCell::new();

type LogResult = Result<(), Box<dyn std::error::Error>>;

/// Default YAML config looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "log4rs.yaml";

/// Initializes the logging system from `log4rs.yaml` in the working directory.
/// Prefer `configure_logging` for programmatic control.
///
/// # Errors
/// Returns an error if the file cannot be read or a logger is already installed.
pub fn init() -> LogResult {
    init_path(Path::new(DEFAULT_CONFIG_FILE))
}

/// Initializes the logging system from a specific YAML config file.
///
/// # Errors
/// Returns an error if the file cannot be read or a logger is already installed.
pub fn init_path(path: &Path) -> LogResult {
    log4rs::init_file(path, log4rs::config::Deserializers::default())?;
    Ok(())
}

/// Console-only logging at `level`; used by the CLI when no log directory is configured.
///
/// # Errors
/// Returns an error if the config cannot be built.
pub fn init_console(level: Option<&str>) -> LogResult {
    let lvl = parse_level(level);
    let stderr = ConsoleAppender::builder()
        .target(log4rs::append::console::Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("[{l}] {t} - {m}{n}")))
        .build();
    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(lvl))?;
    apply(config)
}

/// Configure rolling file logging for the process. Replaces an earlier config if one is active.
/// - dir: base directory for `app.log`, `audit.log`, `metrics.log`; if None, current directory.
/// - level: error|warn|info|debug|trace
/// - retention: number of rolled files to keep (default 7)
///
/// # Errors
/// Returns an error if the directory or an appender cannot be created.
pub fn configure_logging(dir: Option<&Path>, level: Option<&str>, retention: Option<u32>) -> LogResult {
    let base = match dir {
        Some(d) => PathBuf::from(d),
        None => std::env::current_dir()?,
    };
    std::fs::create_dir_all(&base)?;
    let keep = retention.unwrap_or(7);
    let lvl = parse_level(level);

    let config = Config::builder()
        .appender(Appender::builder().build("app", Box::new(rolling(&base, "app", keep)?)))
        .appender(Appender::builder().build("audit", Box::new(rolling(&base, "audit", keep)?)))
        .appender(Appender::builder().build("metrics", Box::new(rolling(&base, "metrics", keep)?)))
        .logger(Logger::builder().appender("audit").additive(false).build(AUDIT_TARGET, lvl))
        .logger(Logger::builder().appender("metrics").additive(false).build(METRICS_TARGET, lvl))
        .build(Root::builder().appender("app").build(lvl))?;
    apply(config)
}

fn rolling(base: &Path, stem: &str, keep: u32) -> Result<RollingFileAppender, Box<dyn std::error::Error>> {
    let pattern = format!("{}", base.join(format!("{stem}.{{}}.log")).display());
    let roller = FixedWindowRoller::builder().build(&pattern, keep)?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE_BYTES)), Box::new(roller));
    let appender = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(ENCODER_PATTERN)))
        .build(base.join(format!("{stem}.log")), Box::new(policy))?;
    Ok(appender)
}

// First call installs the logger; later calls swap its config.
fn apply(config: Config) -> LogResult {
    if let Some(handle) = HANDLE.get() {
        handle.set_config(config);
        return Ok(());
    }
    let handle = log4rs::init_config(config)?;
    let _ = HANDLE.set(handle);
    Ok(())
}

#[must_use]
pub fn parse_level(level: Option<&str>) -> LevelFilter {
    match level.unwrap_or("info").to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}
