// Configuration loading and parsing (league.toml, draft.toml, credentials.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::draft::autopick::AutoPickStrategy;
use crate::draft::order::{BaseOrder, DraftMethod, TeamRef};
use crate::draft::pick::TeamId;
use crate::protocol::DraftKey;

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
    pub league: LeagueConfig,
    pub draft: DraftConfig,
    pub reconcile: ReconcileConfig,
    pub auto_pick: AutoPickConfig,
    pub server: ServerConfig,
    pub credentials: CredentialsConfig,
    pub db_path: String,
    pub data_paths: DataPaths,
}

impl Config {
    pub fn draft_key(&self) -> DraftKey {
        DraftKey {
            league_id: self.league.id,
            race_id: self.league.race_id,
        }
    }
}

// ---------------------------------------------------------------------------
// league.toml structs
// ---------------------------------------------------------------------------

/// Wrapper for the top-level `[league]` table in league.toml.
#[derive(Debug, Clone, Deserialize)]
struct LeagueFile {
    league: LeagueConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeagueConfig {
    pub id: i64,
    pub name: String,
    pub race_id: i64,
    pub draftable_slots_per_team: u32,
    /// The observing user's team. Without it the board is watch-only.
    #[serde(default)]
    pub my_team_id: Option<TeamId>,
    /// Team roster in league order. Only the local server reads it; a remote
    /// server owns its own roster.
    #[serde(default)]
    pub teams: Vec<TeamEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamEntry {
    pub id: TeamId,
    pub name: String,
}

impl LeagueConfig {
    pub fn team_refs(&self) -> Vec<TeamRef> {
        self.teams
            .iter()
            .map(|t| TeamRef {
                team_id: t.id,
                team_name: t.name.clone(),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// draft.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire draft.toml file.
#[derive(Debug, Clone, Deserialize)]
struct DraftFile {
    draft: DraftConfig,
    reconcile: ReconcileConfig,
    auto_pick: AutoPickConfig,
    server: ServerConfig,
    database: DatabaseSection,
    data_paths: DataPaths,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DraftConfig {
    pub method: DraftMethod,
    /// Base order for snake drafts.
    pub snake_base: BaseOrder,
    pub turn_seconds: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileConfig {
    pub poll_interval_secs: u64,
    pub tick_interval_ms: u64,
    pub fetch_timeout_secs: u64,
    pub offline_after_failures: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AutoPickConfig {
    pub enabled: bool,
    pub strategy: AutoPickStrategy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    Http,
    Local,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub mode: ServerMode,
    #[serde(default)]
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataPaths {
    /// Driver seed CSV for the local server.
    pub drivers: String,
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    pub api_token: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/league.toml`,
/// `config/draft.toml`, and (optionally) `config/credentials.toml`,
/// all relative to the given `base_dir`.
///
/// This does not auto-copy defaults. Prefer `load_config()`.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- league.toml (required) ---
    let league_path = config_dir.join("league.toml");
    let league_file: LeagueFile = parse_file(&league_path)?;

    // --- draft.toml (required) ---
    let draft_path = config_dir.join("draft.toml");
    let draft_file: DraftFile = parse_file(&draft_path)?;

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        parse_file(&credentials_path)?
    } else {
        CredentialsConfig::default()
    };

    let config = Config {
        league: league_file.league,
        draft: draft_file.draft,
        reconcile: draft_file.reconcile,
        auto_pick: draft_file.auto_pick,
        server: draft_file.server,
        credentials,
        db_path: draft_file.database.path,
        data_paths: draft_file.data_paths,
    };

    validate(&config)?;

    Ok(config)
}

/// Populate `config/` from `defaults/`, never overwriting an existing file.
/// Returns the files written, in name order. `.example` templates stay behind.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    match (defaults_dir.is_dir(), config_dir.is_dir()) {
        (true, _) => {}
        (false, true) => return Ok(Vec::new()),
        (false, false) => {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "{} has neither defaults/ nor config/; start paddock from the \
                     project root",
                    base_dir.display()
                ),
            });
        }
    }

    std::fs::create_dir_all(&config_dir)
        .map_err(copy_error(format!("creating {}", config_dir.display())))?;

    let mut seeds: Vec<PathBuf> = std::fs::read_dir(&defaults_dir)
        .map_err(copy_error(format!("listing {}", defaults_dir.display())))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_seed_file(path))
        .collect();
    seeds.sort();

    let mut written = Vec::new();
    for seed in seeds {
        let Some(name) = seed.file_name() else {
            continue;
        };
        let target = config_dir.join(name);
        if copy_if_missing(&seed, &target)? {
            info!("Created {} from defaults", target.display());
            written.push(target);
        }
    }
    Ok(written)
}

fn is_seed_file(path: &Path) -> bool {
    path.is_file() && path.extension().is_none_or(|ext| ext != "example")
}

/// Create `target` with the contents of `source` unless it already exists.
fn copy_if_missing(source: &Path, target: &Path) -> Result<bool, ConfigError> {
    let mut dest = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)
    {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(copy_error(format!("creating {}", target.display()))(e)),
    };
    let mut src = std::fs::File::open(source)
        .map_err(copy_error(format!("opening {}", source.display())))?;
    std::io::copy(&mut src, &mut dest)
        .map_err(copy_error(format!("writing {}", target.display())))?;
    Ok(true)
}

fn copy_error(action: String) -> impl FnOnce(std::io::Error) -> ConfigError {
    move |e| ConfigError::DefaultsCopyError {
        message: format!("{action}: {e}"),
    }
}

/// Directory config is loaded from: the working directory when it holds
/// `config/` or `defaults/`, otherwise the per-user config directory.
pub fn resolve_base_dir() -> Result<PathBuf, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    if cwd.join("config").exists() || cwd.join("defaults").exists() {
        return Ok(cwd);
    }
    match directories::ProjectDirs::from("", "", "paddock") {
        Some(dirs) if dirs.config_dir().join("config").exists() => {
            Ok(dirs.config_dir().to_path_buf())
        }
        _ => Ok(cwd),
    }
}

/// Convenience wrapper: resolves the base directory, copies defaults, loads.
pub fn load_config() -> Result<Config, ConfigError> {
    let base = resolve_base_dir()?;
    ensure_config_files(&base)?;
    load_config_from(&base)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn parse_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = read_file(path)?;
    toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let league = &config.league;
    if league.draftable_slots_per_team == 0 {
        return Err(invalid("league.draftable_slots_per_team", "must be at least 1"));
    }

    let mut seen = std::collections::HashSet::new();
    for team in &league.teams {
        if !seen.insert(team.id) {
            return Err(invalid(
                "league.teams",
                format!("team id {} appears more than once", team.id),
            ));
        }
    }
    if let Some(me) = league.my_team_id {
        if !league.teams.is_empty() && !seen.contains(&me) {
            return Err(invalid(
                "league.my_team_id",
                format!("team {me} is not listed in league.teams"),
            ));
        }
    }

    if config.draft.turn_seconds == 0 {
        return Err(invalid("draft.turn_seconds", "must be greater than 0"));
    }

    let r = &config.reconcile;
    let interval_fields: &[(&str, u64)] = &[
        ("reconcile.poll_interval_secs", r.poll_interval_secs),
        ("reconcile.tick_interval_ms", r.tick_interval_ms),
        ("reconcile.fetch_timeout_secs", r.fetch_timeout_secs),
    ];
    for (name, val) in interval_fields {
        if *val == 0 {
            return Err(invalid(name, "must be > 0"));
        }
    }
    if r.offline_after_failures == 0 {
        return Err(invalid("reconcile.offline_after_failures", "must be at least 1"));
    }

    match config.server.mode {
        ServerMode::Http => {
            let url = config.server.base_url.trim();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(invalid(
                    "server.base_url",
                    format!("must be an http(s) URL in http mode, got {url:?}"),
                ));
            }
        }
        ServerMode::Local => {
            if league.teams.len() < 2 {
                return Err(invalid(
                    "league.teams",
                    format!("local mode needs at least 2 teams, got {}", league.teams.len()),
                ));
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
