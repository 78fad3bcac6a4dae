//! Configuration types.
//!
//! Two layers:
//! - [`Settings`]: runtime options resolved once at startup from CLI flags,
//!   environment variables and defaults (see `cli.rs`).
//! - The query file: a YAML list of query definitions. Each entry is
//!   validated on its own so one broken query does not take the others down.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use secrecy::SecretString;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::pipeline::extract::FieldPath;
use crate::pipeline::report::OutputFormat;

/// Filter applied when a query does not set `regex_filter`: a question mark
/// followed by whitespace or the end of the text.
pub const DEFAULT_REGEX_FILTER: &str = r"\?(\s+|$)";

/// Slack Web API base URL.
pub const DEFAULT_API_BASE: &str = "https://slack.com/api";

// ── Runtime settings ────────────────────────────────────────────────

/// Runtime settings for one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    /// User OAuth token with the `search:read` scope.
    pub token: SecretString,
    /// Path to the YAML query file.
    pub query_file: PathBuf,
    /// Dump raw search matches instead of evaluating them.
    pub dump_responses: bool,
    /// How the overview is rendered.
    pub format: OutputFormat,
    /// Timeout for every search request.
    pub request_timeout: Duration,
    /// Maximum number of queries searched at the same time.
    pub concurrency: usize,
    /// Maximum number of result pages fetched per query.
    pub max_pages: u32,
    /// Base URL of the search API.
    pub api_base: String,
}

// ── Query definitions ───────────────────────────────────────────────

/// One query entry as written in the query file.
///
/// Key names follow the established file format (`enable`, `field`,
/// `query`); the longer names are accepted as aliases.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryDefinition {
    pub name: String,
    #[serde(alias = "enabled", default = "default_enable")]
    pub enable: bool,
    pub channels: Vec<String>,
    pub days_back: i64,
    pub done_marker: String,
    #[serde(alias = "field_path")]
    pub field: String,
    #[serde(default)]
    pub ignore_users: Vec<String>,
    #[serde(alias = "query_term")]
    pub query: String,
    #[serde(default)]
    pub regex_substring: Option<String>,
    #[serde(default)]
    pub regex_filter: Option<String>,
}

fn default_enable() -> bool {
    true
}

/// A validated query.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    pub name: String,
    pub enabled: bool,
    /// Channels to search, in declared order, never empty.
    pub channels: Vec<String>,
    pub days_back: u32,
    /// Token marking a message as resolved.
    pub done_marker: String,
    pub field_path: FieldPath,
    /// Authors (user names or user ids) whose messages are dropped, in
    /// declared order.
    pub ignore_users: Vec<String>,
    pub query_term: String,
    pub regex_substring: Option<Regex>,
    pub regex_filter: Regex,
}

impl QueryDefinition {
    /// Validate the entry into a [`QuerySpec`].
    pub fn validate(self) -> Result<QuerySpec, ConfigError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "name".into(),
                hint: "Every query needs a non-empty name.".into(),
            });
        }
        let invalid = |reason: String| ConfigError::InvalidQuery {
            name: name.clone(),
            reason,
        };

        let channels = trimmed_unique(&self.channels);
        if channels.is_empty() {
            return Err(invalid("channels must list at least one channel".into()));
        }

        let days_back = u32::try_from(self.days_back)
            .ok()
            .filter(|d| *d > 0)
            .ok_or_else(|| {
                invalid(format!(
                    "days_back must be a positive integer, got {}",
                    self.days_back
                ))
            })?;

        let done_marker = self.done_marker.trim().to_string();
        if done_marker.is_empty() {
            return Err(invalid("done_marker must not be empty".into()));
        }

        let field_path = FieldPath::parse(&self.field)
            .map_err(|e| invalid(format!("invalid field path '{}': {e}", self.field)))?;

        let regex_substring = match self.regex_substring.as_deref() {
            Some(pattern) if !pattern.is_empty() => Some(
                Regex::new(pattern).map_err(|e| invalid(format!("invalid regex_substring: {e}")))?,
            ),
            _ => None,
        };

        let filter_pattern = self
            .regex_filter
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_REGEX_FILTER);
        let regex_filter = Regex::new(filter_pattern)
            .map_err(|e| invalid(format!("invalid regex_filter: {e}")))?;

        let ignore_users = trimmed_unique(&self.ignore_users);

        Ok(QuerySpec {
            name,
            enabled: self.enable,
            channels,
            days_back,
            done_marker,
            field_path,
            ignore_users,
            query_term: self.query.trim().to_string(),
            regex_substring,
            regex_filter,
        })
    }
}

/// Trim every entry and drop blanks and repeats, keeping first occurrences
/// in order.
fn trimmed_unique(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values.iter().map(|v| v.trim()) {
        if !value.is_empty() && !out.iter().any(|v| v == value) {
            out.push(value.to_string());
        }
    }
    out
}

// ── Query file ──────────────────────────────────────────────────────

/// One entry of the query file after validation.
///
/// A broken entry keeps its place so the overview can report it inline.
#[derive(Debug)]
pub struct LoadedQuery {
    pub name: String,
    pub spec: Result<QuerySpec, ConfigError>,
}

/// Read and validate the query file.
pub fn load_queries(path: &Path) -> Result<Vec<LoadedQuery>, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    debug!(path = %path.display(), "Loaded query file");
    parse_queries(&content)
}

/// Parse a query file.
///
/// Fails as a whole only when the document is not a non-empty YAML list.
/// Disabled entries that fail validation are dropped silently since they
/// would never run.
pub fn parse_queries(content: &str) -> Result<Vec<LoadedQuery>, ConfigError> {
    let document: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    let entries = match document {
        serde_yaml::Value::Sequence(entries) if !entries.is_empty() => entries,
        serde_yaml::Value::Sequence(_) | serde_yaml::Value::Null => {
            return Err(ConfigError::ParseError(
                "query file does not define any queries".into(),
            ));
        }
        _ => {
            return Err(ConfigError::ParseError(
                "query file must be a list of queries".into(),
            ));
        }
    };

    let mut loaded = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let name = entry
            .get("name")
            .and_then(serde_yaml::Value::as_str)
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from)
            .unwrap_or_else(|| format!("query #{}", index + 1));
        let declared_disabled = ["enable", "enabled"]
            .iter()
            .find_map(|key| entry.get(*key).and_then(serde_yaml::Value::as_bool))
            == Some(false);

        let definition = match serde_yaml::from_value::<QueryDefinition>(entry) {
            Ok(definition) => definition,
            Err(e) if declared_disabled => {
                debug!(query = %name, error = %e, "Ignoring invalid disabled query");
                continue;
            }
            Err(e) => {
                warn!(query = %name, error = %e, "Invalid query definition");
                loaded.push(LoadedQuery {
                    spec: Err(ConfigError::InvalidQuery {
                        name: name.clone(),
                        reason: e.to_string(),
                    }),
                    name,
                });
                continue;
            }
        };

        let enabled = definition.enable;
        match definition.validate() {
            Err(e) if !enabled => {
                debug!(query = %name, error = %e, "Ignoring invalid disabled query");
            }
            spec => {
                if let Err(ref e) = spec {
                    warn!(query = %name, error = %e, "Invalid query definition");
                }
                loaded.push(LoadedQuery { name, spec });
            }
        }
    }

    Ok(loaded)
}
