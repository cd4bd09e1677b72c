//! Runtime configuration.
//!
//! Precedence: environment (`ODMLITE_*`) > TOML file > defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::DbError;

pub const ENV_CONFIG: &str = "ODMLITE_CONFIG";
pub const ENV_MAX_LIMIT: &str = "ODMLITE_MAX_LIMIT";
pub const ENV_LOG_LEVEL: &str = "ODMLITE_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "ODMLITE_LOG_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OdmConfig {
    /// Upper bound applied to every `limit`.
    pub max_limit: usize,
    /// Sort keys beyond this count are ignored.
    pub max_sort_fields: usize,
    /// Longer operand lists for `$in`/`$nin`/`$all` are rejected.
    pub max_in_set: usize,
    pub max_path_depth: usize,
    pub log_level: Option<String>,
    pub log_dir: Option<PathBuf>,
}

impl Default for OdmConfig {
    fn default() -> Self {
        Self {
            max_limit: 10_000,
            max_sort_fields: 8,
            max_in_set: 1000,
            max_path_depth: 32,
            log_level: None,
            log_dir: None,
        }
    }
}

impl OdmConfig {
    /// # Errors
    /// Returns `DbError::Config` if the TOML is malformed or a limit is zero.
    pub fn from_toml_str(s: &str) -> Result<Self, DbError> {
        let cfg: Self = toml::from_str(s)?;
        cfg.check()?;
        Ok(cfg)
    }

    /// Loads `path` (or `$ODMLITE_CONFIG`, or `./odmlite.toml` when present), then applies env overrides.
    ///
    /// # Errors
    /// Returns an error if an explicitly named file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, DbError> {
        let explicit = path.map(Path::to_path_buf).or_else(|| std::env::var(ENV_CONFIG).ok().map(PathBuf::from));
        let mut cfg = match explicit {
            Some(p) => Self::from_toml_str(&std::fs::read_to_string(&p)?)?,
            None => {
                let local = PathBuf::from("odmlite.toml");
                if local.exists() {
                    Self::from_toml_str(&std::fs::read_to_string(&local)?)?
                } else {
                    Self::default()
                }
            }
        };
        cfg.apply_env(|k| std::env::var(k).ok())?;
        Ok(cfg)
    }

    /// Applies overrides from a variable lookup (normally `std::env::var`).
    ///
    /// # Errors
    /// Returns `DbError::Config` when a numeric override does not parse.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), DbError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_MAX_LIMIT) {
            self.max_limit =
                v.parse().map_err(|_| DbError::Config(format!("{ENV_MAX_LIMIT}: not a number: {v}")))?;
        }
        if let Some(v) = lookup(ENV_LOG_LEVEL) {
            self.log_level = Some(v);
        }
        if let Some(v) = lookup(ENV_LOG_DIR) {
            self.log_dir = Some(PathBuf::from(v));
        }
        self.check()
    }

    fn check(&self) -> Result<(), DbError> {
        if self.max_limit == 0 || self.max_sort_fields == 0 || self.max_path_depth == 0 {
            return Err(DbError::Config("limits must be positive".into()));
        }
        Ok(())
    }
}
