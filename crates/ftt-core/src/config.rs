// Configuration loading and parsing (config/league.toml).

use chrono::FixedOffset;
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
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub league: LeagueRules,
    pub draft: DraftRules,
    pub trades: TradeRules,
    pub scheduler: SchedulerConfig,
    pub db_path: String,
}

// ---------------------------------------------------------------------------
// league.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire league.toml file.
#[derive(Debug, Clone, Deserialize)]
struct LeagueFile {
    league: LeagueRules,
    #[serde(default)]
    draft: DraftRules,
    #[serde(default)]
    trades: TradeRules,
    #[serde(default)]
    scheduler: SchedulerConfig,
    #[serde(default)]
    database: DatabaseSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DatabaseSection {
    path: Option<String>,
}

/// Roster and salary bounds every team must satisfy after a trade.
#[derive(Debug, Clone, Deserialize)]
pub struct LeagueRules {
    pub name: String,
    pub salary_cap: f64,
    pub max_players: u32,
    pub min_players: u32,
    /// Offset of the league's clock, e.g. `"-05:00"`. Active hours are
    /// interpreted as wall-clock hours at this offset.
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,
}

impl LeagueRules {
    /// Parse `utc_offset` into a chrono offset.
    pub fn timezone(&self) -> Result<FixedOffset, ConfigError> {
        parse_utc_offset(&self.utc_offset).ok_or_else(|| ConfigError::ValidationError {
            field: "league.utc_offset".into(),
            message: format!("expected `+HH:MM` or `-HH:MM`, got `{}`", self.utc_offset),
        })
    }
}

fn default_utc_offset() -> String {
    "+00:00".into()
}

/// Contract handed to a drafted player.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ContractTerms {
    pub duration: u32,
    pub salary: f64,
    #[serde(default)]
    pub team_option: bool,
}

/// One row of the league-draft salary scale. Rounds past the last entry use
/// the last entry.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ScaleEntry {
    pub round: u32,
    #[serde(flatten)]
    pub terms: ContractTerms,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DraftRules {
    /// How many teams past the one on the clock get an "up soon" notice.
    pub upcoming_notice_count: u32,
    pub rookie_contract: ContractTerms,
    pub league_scale: Vec<ScaleEntry>,
}

impl Default for DraftRules {
    fn default() -> Self {
        let two = |salary| ContractTerms { duration: 2, salary, team_option: false };
        let option = |salary| ContractTerms { duration: 1, salary, team_option: true };
        let scale = [
            (1, two(25.0)),
            (2, two(20.0)),
            (3, two(15.0)),
            (4, two(12.0)),
            (5, two(8.5)),
            (6, option(8.5)),
            (7, option(7.5)),
            (8, option(5.0)),
            (9, option(5.0)),
            (10, option(5.0)),
            (11, two(3.5)),
            (12, two(3.5)),
            (13, two(3.5)),
            (14, two(2.0)),
        ];
        DraftRules {
            upcoming_notice_count: 5,
            rookie_contract: two(2.0),
            league_scale: scale
                .into_iter()
                .map(|(round, terms)| ScaleEntry { round, terms })
                .collect(),
        }
    }
}

impl DraftRules {
    /// Contract terms for a position in the given round.
    pub fn contract_for(&self, round: u32, is_league_draft: bool) -> ContractTerms {
        if !is_league_draft {
            return self.rookie_contract;
        }
        self.league_scale
            .iter()
            .filter(|e| e.round <= round)
            .max_by_key(|e| e.round)
            .or_else(|| self.league_scale.first())
            .map(|e| e.terms)
            .unwrap_or(self.rookie_contract)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradeRules {
    /// Transfer assets as soon as a trade is approved.
    pub execute_on_approval: bool,
}

impl Default for TradeRules {
    fn default() -> Self {
        TradeRules { execute_on_approval: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub idle_interval_secs: u64,
    pub error_backoff_secs: u64,
    pub min_delay_secs: u64,
    pub dispatch_interval_secs: u64,
    pub dispatch_batch: u32,
    /// Delivery attempts before a notification is left as a dead letter.
    pub dispatch_max_attempts: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            idle_interval_secs: 3600,
            error_backoff_secs: 60,
            min_delay_secs: 1,
            dispatch_interval_secs: 5,
            dispatch_batch: 50,
            dispatch_max_attempts: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/league.toml` relative to
/// `base_dir`. Does not copy defaults; see [`load_config`].
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let league_path = base_dir.join("config").join("league.toml");
    let text = read_file(&league_path)?;
    let config = parse_config(&text).map_err(|e| match e {
        ParseFailure::Toml(source) => ConfigError::ParseError {
            path: league_path.clone(),
            source,
        },
        ParseFailure::Invalid(err) => err,
    })?;
    Ok(config)
}

enum ParseFailure {
    Toml(toml::de::Error),
    Invalid(ConfigError),
}

fn parse_config(text: &str) -> Result<Config, ParseFailure> {
    let file: LeagueFile = toml::from_str(text).map_err(ParseFailure::Toml)?;
    let db_path = file.database.path.unwrap_or_else(default_db_path);

    let config = Config {
        league: file.league,
        draft: file.draft,
        trades: file.trades,
        scheduler: file.scheduler,
        db_path,
    };
    validate(&config).map_err(ParseFailure::Invalid)?;
    Ok(config)
}

/// Parse a config document held in memory. Used by tests and embedders that
/// keep configuration elsewhere.
pub fn config_from_str(text: &str) -> Result<Config, ConfigError> {
    parse_config(text).map_err(|e| match e {
        ParseFailure::Toml(source) => ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            source,
        },
        ParseFailure::Invalid(err) => err,
    })
}

/// Ensure `config/` holds every file from `defaults/`, copying the missing
/// ones. Returns the files that were copied.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    let mut copied = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        let target = config_dir.join(file_name);
        if target.exists() {
            continue;
        }
        std::fs::copy(&path, &target).map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to copy {} to {}: {e}", path.display(), target.display()),
        })?;
        copied.push(target);
    }

    Ok(copied)
}

/// Loads config relative to the current working directory, seeding
/// `config/` from `defaults/` first.
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

fn default_db_path() -> String {
    directories::ProjectDirs::from("", "", "ftt")
        .map(|dirs| dirs.data_dir().join("league.db").to_string_lossy().into_owned())
        .unwrap_or_else(|| "league.db".into())
}

/// Parse `+HH:MM` / `-HH:MM` (or `Z`) into a fixed offset.
pub fn parse_utc_offset(s: &str) -> Option<FixedOffset> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };
    let (h, m) = rest.split_once(':')?;
    let hours: i32 = h.parse().ok()?;
    let minutes: i32 = m.parse().ok()?;
    if !(0..=23).contains(&hours) || !(0..=59).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let league = &config.league;

    if league.salary_cap <= 0.0 {
        return Err(ConfigError::ValidationError {
            field: "league.salary_cap".into(),
            message: format!("must be > 0, got {}", league.salary_cap),
        });
    }

    if league.max_players == 0 {
        return Err(ConfigError::ValidationError {
            field: "league.max_players".into(),
            message: "must be greater than 0".into(),
        });
    }

    if league.min_players > league.max_players {
        return Err(ConfigError::ValidationError {
            field: "league.min_players".into(),
            message: format!(
                "must be <= max_players ({}), got {}",
                league.max_players, league.min_players
            ),
        });
    }

    league.timezone()?;

    let rookie = &config.draft.rookie_contract;
    if rookie.duration == 0 {
        return Err(ConfigError::ValidationError {
            field: "draft.rookie_contract.duration".into(),
            message: "must be greater than 0".into(),
        });
    }

    for entry in &config.draft.league_scale {
        if entry.round == 0 || entry.terms.duration == 0 {
            return Err(ConfigError::ValidationError {
                field: "draft.league_scale".into(),
                message: format!("round and duration must be > 0 (round {})", entry.round),
            });
        }
    }

    let sched = &config.scheduler;
    let sched_fields: &[(&str, u64)] = &[
        ("scheduler.idle_interval_secs", sched.idle_interval_secs),
        ("scheduler.error_backoff_secs", sched.error_backoff_secs),
        ("scheduler.min_delay_secs", sched.min_delay_secs),
        ("scheduler.dispatch_interval_secs", sched.dispatch_interval_secs),
        ("scheduler.dispatch_batch", u64::from(sched.dispatch_batch)),
        ("scheduler.dispatch_max_attempts", u64::from(sched.dispatch_max_attempts)),
    ];
    for (name, val) in sched_fields {
        if *val == 0 {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must be > 0".into(),
            });
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
