//! log4rs setup: an `app.log` rolling file plus an optional `query.log` for the
//! `odmlite::query` target.

use log::LevelFilter;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};

use crate::config::OdmConfig;
use crate::devlog::QUERY_TARGET;
use crate::errors::DbError;

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
const ROLL_SIZE: u64 = 10 * 1024 * 1024;
const RETENTION: u32 = 7;

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

fn rolling(base: &Path, stem: &str) -> Result<RollingFileAppender, DbError> {
    let roller = FixedWindowRoller::builder()
        .build(&format!("{}", base.join(format!("{stem}.{{}}.log")).display()), RETENTION)
        .map_err(|e| DbError::Config(e.to_string()))?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE)), Box::new(roller));
    RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(base.join(format!("{stem}.log")), Box::new(policy))
        .map_err(|e| DbError::Config(e.to_string()))
}

/// Builds the log4rs configuration without installing it.
///
/// # Errors
/// Returns `DbError::Config` if the directory or appenders cannot be created.
pub fn build_config(dir: Option<&Path>, level: Option<&str>, query_log: bool) -> Result<Config, DbError> {
    let base = dir
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    std::fs::create_dir_all(&base)?;
    let lvl = parse_level(level);
    let mut builder = Config::builder().appender(Appender::builder().build("app", Box::new(rolling(&base, "app")?)));
    if query_log {
        builder = builder
            .appender(Appender::builder().build("query", Box::new(rolling(&base, "query")?)))
            .logger(Logger::builder().appender("query").additive(false).build(QUERY_TARGET, LevelFilter::Debug));
    } else {
        builder = builder.logger(Logger::builder().additive(false).build(QUERY_TARGET, LevelFilter::Off));
    }
    builder.build(Root::builder().appender("app").build(lvl)).map_err(|e| DbError::Config(e.to_string()))
}

/// Installs the global logger. A second call in the same process is an error from log4rs.
///
/// # Errors
/// Returns `DbError::Config` if the config cannot be built or a logger is already set.
pub fn configure_logging(dir: Option<&Path>, level: Option<&str>, query_log: bool) -> Result<(), DbError> {
    let config = build_config(dir, level, query_log)?;
    log4rs::init_config(config).map_err(|e| DbError::Config(e.to_string()))?;
    log::info!("logging initialised at {}", parse_level(level));
    Ok(())
}

/// Logging from an [`OdmConfig`]; the query log is enabled when `ODMLITE_QUERY_LOG` is truthy.
///
/// # Errors
/// See [`configure_logging`].
pub fn configure_from(cfg: &OdmConfig) -> Result<(), DbError> {
    let query_log = std::env::var("ODMLITE_QUERY_LOG")
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);
    configure_logging(cfg.log_dir.as_deref(), cfg.log_level.as_deref(), query_log)
}
