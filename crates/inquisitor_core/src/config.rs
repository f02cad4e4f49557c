//! Core configuration loading.
//!
//! # Responsibility
//! - Parse the `key = value` config file format.
//! - Validate paths once at startup so storage faults fail before any cycle.
//! - Expose subfeed definitions as listing filters.
//!
//! # Invariants
//! - Configuration is an explicit value passed to constructors; nothing here
//!   is process-global.
//! - Lines without `=` continue the previous key's value.

use crate::logging::level_for_verbosity;
use crate::repo::item_repo::ActiveItemQuery;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::{Path, PathBuf};

/// Environment variable naming the config file.
pub const CONFIG_ENVVAR: &str = "INQUISITOR_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "/etc/inquisitor.conf";

const KEY_DATA_PATH: &str = "DataPath";
const DEFAULT_DATA_PATH: &str = "/var/inquisitor/data/";
const KEY_LOG_FILE: &str = "LogFile";
const KEY_VERBOSE: &str = "Verbose";
const KEY_SUBFEEDS: &str = "Subfeeds";

static SUBFEED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^:]+):(.*)$").expect("valid subfeed regex"));

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, error: io::Error },
    InvalidLine { line: usize },
    InvalidValue { key: &'static str, value: String },
    NonAbsolutePath { key: &'static str, path: String },
    MissingDirectory { key: &'static str, path: PathBuf },
    InvalidSubfeed(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, error } => write!(
                f,
                "cannot read config file `{}` (try setting {CONFIG_ENVVAR}): {error}",
                path.display()
            ),
            Self::InvalidLine { line } => write!(f, "invalid config format on line {line}"),
            Self::InvalidValue { key, value } => write!(f, "invalid {key} value `{value}`"),
            Self::NonAbsolutePath { key, path } => {
                write!(f, "{key} must be an absolute path, got `{path}`")
            }
            Self::MissingDirectory { key, path } => {
                write!(f, "{key} directory `{}` does not exist", path.display())
            }
            Self::InvalidSubfeed(value) => write!(f, "invalid subfeed definition: `{value}`"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Resolved core configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Root directory holding one sub-directory per cell.
    pub data_path: PathBuf,
    /// Rotated log file; stderr when unset.
    pub log_file: Option<PathBuf>,
    pub verbose: bool,
    /// Named listing filters, each a list of cells.
    pub subfeeds: BTreeMap<String, Vec<String>>,
}

impl CoreConfig {
    /// Loads the file named by `INQUISITOR_CONFIG`, or the default path.
    pub fn from_env() -> ConfigResult<Self> {
        let path = std::env::var_os(CONFIG_ENVVAR)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load(path)
    }

    /// Reads, parses and validates one config file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        let config = Self::from_pairs(&parse_config_str(&text)?)?;
        config.validate_paths()?;
        Ok(config)
    }

    /// Builds a config from parsed pairs without touching the file system.
    pub fn from_pairs(pairs: &BTreeMap<String, String>) -> ConfigResult<Self> {
        let data_path = non_empty(pairs, KEY_DATA_PATH).unwrap_or(DEFAULT_DATA_PATH);
        let data_path = absolute_path(KEY_DATA_PATH, data_path)?;

        let log_file = match non_empty(pairs, KEY_LOG_FILE) {
            Some(value) => Some(absolute_path(KEY_LOG_FILE, value)?),
            None => None,
        };

        let verbose = match non_empty(pairs, KEY_VERBOSE).unwrap_or("false") {
            "true" => true,
            "false" => false,
            other => {
                return Err(ConfigError::InvalidValue {
                    key: KEY_VERBOSE,
                    value: other.to_string(),
                })
            }
        };

        let subfeeds = match non_empty(pairs, KEY_SUBFEEDS) {
            Some(value) => parse_subfeeds(value)?,
            None => BTreeMap::new(),
        };

        Ok(Self {
            data_path,
            log_file,
            verbose,
            subfeeds,
        })
    }

    /// Checks that the data directory exists.
    pub fn validate_paths(&self) -> ConfigResult<()> {
        if !self.data_path.is_dir() {
            return Err(ConfigError::MissingDirectory {
                key: KEY_DATA_PATH,
                path: self.data_path.clone(),
            });
        }
        Ok(())
    }

    pub fn log_level(&self) -> &'static str {
        level_for_verbosity(self.verbose)
    }

    /// Listing filter for a named subfeed.
    pub fn subfeed_query(&self, name: &str) -> Option<ActiveItemQuery> {
        self.subfeeds
            .get(name)
            .map(|sources| ActiveItemQuery::for_sources(sources.iter().cloned()))
    }
}

/// Parses `key = value` lines into pairs.
///
/// Blank lines and `#` comments are skipped. A line without `=` is appended
/// to the previous value on a new line.
pub fn parse_config_str(text: &str) -> ConfigResult<BTreeMap<String, String>> {
    let mut pairs: BTreeMap<String, String> = BTreeMap::new();
    let mut current_key: Option<String> = None;

    for (index, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim().to_string();
            pairs.insert(key.clone(), value.trim().to_string());
            current_key = Some(key);
            continue;
        }

        match current_key.as_ref().and_then(|key| pairs.get_mut(key)) {
            Some(value) => {
                value.push('\n');
                value.push_str(trimmed);
            }
            None => return Err(ConfigError::InvalidLine { line: index + 1 }),
        }
    }

    Ok(pairs)
}

/// Parses `name: source1 source2` lines.
pub fn parse_subfeeds(value: &str) -> ConfigResult<BTreeMap<String, Vec<String>>> {
    let mut subfeeds = BTreeMap::new();
    for definition in value.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let captures = SUBFEED_RE
            .captures(definition)
            .ok_or_else(|| ConfigError::InvalidSubfeed(definition.to_string()))?;
        let name = captures[1].trim();
        if name.is_empty() {
            return Err(ConfigError::InvalidSubfeed(definition.to_string()));
        }
        let sources = captures[2]
            .split_whitespace()
            .map(str::to_string)
            .collect::<Vec<_>>();
        subfeeds.insert(name.to_string(), sources);
    }
    Ok(subfeeds)
}

fn non_empty<'a>(pairs: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    pairs
        .get(key)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}

fn absolute_path(key: &'static str, value: &str) -> ConfigResult<PathBuf> {
    let path = PathBuf::from(value);
    if !path.is_absolute() {
        return Err(ConfigError::NonAbsolutePath {
            key,
            path: value.to_string(),
        });
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::{parse_config_str, parse_subfeeds, ConfigError, CoreConfig};
    use std::collections::BTreeMap;

    fn pairs(text: &str) -> BTreeMap<String, String> {
        parse_config_str(text).expect("config should parse")
    }

    #[test]
    fn parses_pairs_comments_and_continuations() {
        let parsed = pairs(
            "# comment\n\nDataPath = /srv/data\nSubfeeds = news: hn lobsters\n    fun: xkcd\n",
        );
        assert_eq!(parsed["DataPath"], "/srv/data");
        assert_eq!(parsed["Subfeeds"], "news: hn lobsters\nfun: xkcd");
    }

    #[test]
    fn continuation_without_key_is_rejected_with_line_number() {
        let err = parse_config_str("\n# header\norphan line\n").expect_err("must fail");
        assert!(matches!(err, ConfigError::InvalidLine { line: 3 }));
    }

    #[test]
    fn defaults_apply_when_keys_are_missing() {
        let config = CoreConfig::from_pairs(&BTreeMap::new()).expect("defaults are valid");
        assert_eq!(config.data_path.to_str(), Some("/var/inquisitor/data/"));
        assert!(config.log_file.is_none());
        assert!(!config.verbose);
        assert_eq!(config.log_level(), "info");
        assert!(config.subfeeds.is_empty());
    }

    #[test]
    fn rejects_relative_paths_and_bad_verbosity() {
        let err = CoreConfig::from_pairs(&pairs("DataPath = data/")).expect_err("relative");
        assert!(matches!(err, ConfigError::NonAbsolutePath { .. }));

        let err = CoreConfig::from_pairs(&pairs("Verbose = yes")).expect_err("bad bool");
        assert!(err.to_string().contains("Verbose"));
    }

    #[test]
    fn subfeeds_become_listing_filters() {
        let config =
            CoreConfig::from_pairs(&pairs("Verbose = true\nSubfeeds = news: hn lobsters"))
                .expect("config should build");
        assert_eq!(config.log_level(), "debug");
        let query = config.subfeed_query("news").expect("subfeed exists");
        assert!(query.includes_source("hn"));
        assert!(!query.includes_source("xkcd"));
        assert!(config.subfeed_query("missing").is_none());
    }

    #[test]
    fn malformed_subfeed_is_rejected() {
        let err = parse_subfeeds("no separator here").expect_err("must fail");
        assert!(matches!(err, ConfigError::InvalidSubfeed(_)));
    }

    #[test]
    fn load_validates_data_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config_path = dir.path().join("inquisitor.conf");
        let data_path = dir.path().join("data");

        std::fs::write(
            &config_path,
            format!("DataPath = {}\n", data_path.display()),
        )
        .expect("write config");
        let err = CoreConfig::load(&config_path).expect_err("missing data dir");
        assert!(matches!(err, ConfigError::MissingDirectory { .. }));

        std::fs::create_dir(&data_path).expect("create data dir");
        let config = CoreConfig::load(&config_path).expect("config should load");
        assert_eq!(config.data_path, data_path);
    }
}
