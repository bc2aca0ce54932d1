// Configuration loading and parsing (draft.toml).

use chrono::Duration;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// draft.toml structs
// ---------------------------------------------------------------------------

/// Wrapper for the top-level tables in draft.toml.
#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    draft: DraftConfig,
    #[serde(default)]
    scheduler: SchedulerConfig,
    #[serde(default)]
    database: DatabaseConfig,
    #[serde(default)]
    data: DataConfig,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub draft: DraftConfig,
    pub scheduler: SchedulerConfig,
    pub database: DatabaseConfig,
    pub data: DataConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DraftConfig {
    /// Number of snake rounds; also the roster size each captain fills.
    pub num_rounds: usize,
    /// How long each team has to pick before the auto-pick fires.
    pub pick_time_limit_secs: u64,
    /// Ascending percentile cutoffs, one per round. A captain whose pool
    /// percentile falls in bucket k forfeits round k+1.
    pub skip_percentile_buckets: Vec<f64>,
    /// Local-hour window in which expired timers are deferred instead of
    /// auto-picking. `None` disables deferral.
    #[serde(default)]
    pub quiet_hours: Option<QuietHours>,
}

impl DraftConfig {
    pub fn pick_time_limit(&self) -> Duration {
        Duration::seconds(self.pick_time_limit_secs as i64)
    }
}

impl Default for DraftConfig {
    fn default() -> Self {
        DraftConfig {
            num_rounds: 5,
            pick_time_limit_secs: 7200,
            skip_percentile_buckets: vec![0.2, 0.4, 0.6, 0.8, 1.0],
            quiet_hours: None,
        }
    }
}

/// Hours are in UTC, half-open `[start_hour, end_hour)`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct QuietHours {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl QuietHours {
    pub fn contains(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            (self.start_hour..self.end_hour).contains(&hour)
        } else {
            // Window wraps midnight.
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Delivery attempts per fired timer before giving up.
    pub max_attempts: u32,
    /// Backoff after the first failed attempt; grows linearly per attempt.
    pub min_backoff_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            max_attempts: 5,
            min_backoff_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: "draft-engine.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    pub roster: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            roster: "data/roster.csv".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/draft.toml` relative to the
/// given `base_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy
/// defaults. Prefer `load_config()` which handles default initialization.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join("draft.toml");
    let text = read_file(&path)?;
    let file: ConfigFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;

    let config = Config {
        draft: file.draft,
        scheduler: file.scheduler,
        database: file.database,
        data: file.data,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure `config/draft.toml` exists by copying it from `defaults/` when
/// missing. Returns the list of files that were copied.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();
    let source = defaults_dir.join("draft.toml");
    let target = config_dir.join("draft.toml");

    if source.is_file() && !target.exists() {
        std::fs::copy(&source, &target).map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to copy {}: {e}", source.display()),
        })?;
        copied.push(target);
    }

    Ok(copied)
}

/// Convenience wrapper: loads config relative to the current working
/// directory, copying defaults first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let draft = &config.draft;

    if draft.num_rounds == 0 {
        return Err(ConfigError::ValidationError {
            field: "draft.num_rounds".into(),
            message: "must be greater than 0".into(),
        });
    }

    if draft.pick_time_limit_secs == 0 {
        return Err(ConfigError::ValidationError {
            field: "draft.pick_time_limit_secs".into(),
            message: "must be greater than 0".into(),
        });
    }

    let buckets = &draft.skip_percentile_buckets;
    if buckets.len() != draft.num_rounds {
        return Err(ConfigError::ValidationError {
            field: "draft.skip_percentile_buckets".into(),
            message: format!(
                "must have one bucket per round ({} rounds, got {} buckets)",
                draft.num_rounds,
                buckets.len()
            ),
        });
    }
    for pair in buckets.windows(2) {
        if pair[0] >= pair[1] {
            return Err(ConfigError::ValidationError {
                field: "draft.skip_percentile_buckets".into(),
                message: format!("must be strictly increasing, got {pair:?}"),
            });
        }
    }
    if let Some(first) = buckets.first() {
        if *first <= 0.0 {
            return Err(ConfigError::ValidationError {
                field: "draft.skip_percentile_buckets".into(),
                message: format!("buckets must be positive, got {first}"),
            });
        }
    }
    if let Some(last) = buckets.last() {
        if (*last - 1.0).abs() > f64::EPSILON {
            return Err(ConfigError::ValidationError {
                field: "draft.skip_percentile_buckets".into(),
                message: format!("last bucket must be 1.0 so every captain is covered, got {last}"),
            });
        }
    }

    if let Some(quiet) = &draft.quiet_hours {
        for (name, hour) in [
            ("draft.quiet_hours.start_hour", quiet.start_hour),
            ("draft.quiet_hours.end_hour", quiet.end_hour),
        ] {
            if hour > 23 {
                return Err(ConfigError::ValidationError {
                    field: name.into(),
                    message: format!("must be an hour 0-23, got {hour}"),
                });
            }
        }
    }

    if config.scheduler.max_attempts == 0 {
        return Err(ConfigError::ValidationError {
            field: "scheduler.max_attempts".into(),
            message: "must be greater than 0".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
