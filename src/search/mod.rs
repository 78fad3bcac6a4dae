//! Message search against the chat platform.
//!
//! The pipeline only sees the [`SearchClient`] trait; [`SlackSearchClient`]
//! is the HTTP implementation.

pub mod slack;

pub use slack::SlackSearchClient;

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use regex::Regex;

use crate::config::QuerySpec;
use crate::error::SearchError;
use crate::pipeline::types::Message;

/// Slack user and enterprise user ids (`U024BE7LH`, `W0123ABCD`).
static USER_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[UW][A-Z0-9]{6,}$").unwrap());

/// What to search for: a term scoped to channels and a time window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub term: String,
    pub channels: Vec<String>,
    /// Only messages posted after this day.
    pub after: NaiveDate,
    /// Messages carrying this reaction are left out server-side.
    pub exclude_marker: Option<String>,
    /// Messages from these users are left out server-side, in declared order.
    pub exclude_users: Vec<String>,
}

impl SearchQuery {
    /// Build the search for a query spec, counting the lookback from `today`.
    pub fn for_spec(spec: &QuerySpec, today: NaiveDate) -> Self {
        let after = today
            .checked_sub_days(Days::new(u64::from(spec.days_back)))
            .unwrap_or(NaiveDate::MIN);
        Self {
            term: spec.query_term.clone(),
            channels: spec.channels.clone(),
            after,
            exclude_marker: Some(spec.done_marker.clone()),
            exclude_users: spec.ignore_users.clone(),
        }
    }

    /// Render the platform search syntax, e.g.
    /// `? in:#help after:2024-01-01 -has::white_check_mark: -from:bot`.
    pub fn to_query_string(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if !self.term.is_empty() {
            parts.push(self.term.clone());
        }
        parts.extend(self.channels.iter().map(|c| format!("in:{c}")));
        parts.push(format!("after:{}", self.after.format("%Y-%m-%d")));
        if let Some(marker) = &self.exclude_marker {
            parts.push(format!("-has:{marker}"));
        }
        parts.extend(self.exclude_users.iter().map(|u| exclude_author(u)));
        parts.join(" ")
    }
}

/// User ids are matched by mention syntax, names as written.
fn exclude_author(user: &str) -> String {
    if USER_ID.is_match(user) {
        format!("-from:<@{user}>")
    } else {
        format!("-from:{user}")
    }
}

/// A message search backend. Pure I/O; no filtering happens here.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Backend name for logging (e.g. "slack").
    fn name(&self) -> &str;

    /// Run the search and return every match across all result pages, in
    /// the order the service ranks them.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<Message>, SearchError>;
}
