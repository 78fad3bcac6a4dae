//! Shared types for the query pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Message ─────────────────────────────────────────────────────────

/// A raw search match, exactly as the search service returned it.
///
/// The shape is owned by the service and varies between plain messages,
/// bot posts and attachment-bearing messages, so it stays an opaque JSON
/// tree. Rules read from it through [`crate::pipeline::extract`]; the
/// accessors below cover the fields the report always shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(Value);

impl Message {
    pub fn new(raw: Value) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> &Value {
        &self.0
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Display name of the author, falling back to the user id.
    pub fn author(&self) -> Option<&str> {
        self.str_field("username")
            .filter(|s| !s.is_empty())
            .or_else(|| self.str_field("user"))
    }

    /// Every identity the author is known by (user name and user id).
    pub fn author_identities(&self) -> impl Iterator<Item = &str> {
        ["username", "user"]
            .into_iter()
            .filter_map(|key| self.str_field(key))
            .filter(|s| !s.is_empty())
    }

    pub fn channel_name(&self) -> Option<&str> {
        self.0
            .get("channel")
            .and_then(|c| c.get("name"))
            .and_then(Value::as_str)
    }

    pub fn permalink(&self) -> Option<&str> {
        self.str_field("permalink")
    }

    /// When the message was posted, from its `ts` ("seconds.micros").
    pub fn posted_at(&self) -> Option<DateTime<Utc>> {
        let ts = self.str_field("ts")?;
        let secs = ts.split('.').next()?.parse::<i64>().ok()?;
        DateTime::from_timestamp(secs, 0)
    }

    /// Stable identity used to de-duplicate matches within one query.
    pub fn identity(&self) -> Option<String> {
        let channel_id = self
            .0
            .get("channel")
            .and_then(|c| c.get("id"))
            .and_then(Value::as_str);
        match (channel_id, self.str_field("ts")) {
            (Some(channel), Some(ts)) => Some(format!("{channel}:{ts}")),
            _ => self.permalink().map(String::from),
        }
    }
}

// ── Evaluated result ────────────────────────────────────────────────

/// A message that survived every rule of a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatedResult {
    /// Name of the query that produced this result.
    pub query_name: String,
    /// Author shown in the report.
    pub author: String,
    /// Text after substring extraction.
    pub display_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_at: Option<DateTime<Utc>>,
}

// ── Query outcome ───────────────────────────────────────────────────

/// How a single query ended. Both variants are reported; a failed query
/// never hides the others.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryOutcome {
    /// The query ran. An empty list means "checked, clean".
    Reported { results: Vec<EvaluatedResult> },
    /// The query could not run (bad config, transport, rate limit).
    Failed { reason: String },
}

impl QueryOutcome {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Reported { .. } => "reported",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn results(&self) -> &[EvaluatedResult] {
        match self {
            Self::Reported { results } => results,
            Self::Failed { .. } => &[],
        }
    }
}

/// One query's block in the overview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySection {
    pub name: String,
    #[serde(flatten)]
    pub outcome: QueryOutcome,
}

/// Everything one run produced, in the configuration's declared order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Overview {
    pub sections: Vec<QuerySection>,
}

impl Overview {
    pub fn total_results(&self) -> usize {
        self.sections.iter().map(|s| s.outcome.results().len()).sum()
    }

    pub fn failed_queries(&self) -> usize {
        self.sections
            .iter()
            .filter(|s| matches!(s.outcome, QueryOutcome::Failed { .. }))
            .count()
    }
}

// ── Query stage ─────────────────────────────────────────────────────

/// Where a query is in its single pass through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStage {
    Idle,
    Fetching,
    Extracting,
    Filtering,
    Reporting,
}

impl QueryStage {
    /// Check if this stage may be followed by `target`.
    ///
    /// Any active stage can drop straight to `Reporting` when the query
    /// fails or the search comes back empty.
    pub fn can_transition_to(&self, target: QueryStage) -> bool {
        use QueryStage::*;

        matches!(
            (self, target),
            (Idle, Fetching)
                | (Fetching, Extracting)
                | (Extracting, Filtering)
                | (Fetching | Extracting | Filtering, Reporting)
                | (Reporting, Idle)
        )
    }
}

impl fmt::Display for QueryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Extracting => "extracting",
            Self::Filtering => "filtering",
            Self::Reporting => "reporting",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Message {
        Message::new(json!({
            "user": "U024BE7LH",
            "username": "alice",
            "text": "anyone seen this?",
            "ts": "1700000000.000100",
            "channel": { "id": "C123", "name": "help" },
            "permalink": "https://acme.slack.com/archives/C123/p1700000000000100"
        }))
    }

    #[test]
    fn accessors_read_common_fields() {
        let msg = sample();
        assert_eq!(msg.author(), Some("alice"));
        assert_eq!(msg.channel_name(), Some("help"));
        assert_eq!(
            msg.posted_at().map(|d| d.format("%Y-%m-%d").to_string()),
            Some("2023-11-14".to_string())
        );
        assert_eq!(msg.identity().as_deref(), Some("C123:1700000000.000100"));
    }

    #[test]
    fn author_falls_back_to_user_id() {
        let msg = Message::new(json!({ "user": "U1", "username": "" }));
        assert_eq!(msg.author(), Some("U1"));
        assert_eq!(msg.author_identities().collect::<Vec<_>>(), vec!["U1"]);
    }

    #[test]
    fn author_identities_include_name_and_id() {
        let msg = sample();
        let ids: Vec<&str> = msg.author_identities().collect();
        assert_eq!(ids, vec!["alice", "U024BE7LH"]);
    }

    #[test]
    fn identity_falls_back_to_permalink() {
        let msg = Message::new(json!({ "permalink": "https://x/p1" }));
        assert_eq!(msg.identity().as_deref(), Some("https://x/p1"));
        assert_eq!(Message::new(json!({})).identity(), None);
    }

    #[test]
    fn message_serializes_verbatim() {
        let raw = json!({ "text": "hi", "attachments": [{ "fallback": "x" }] });
        let msg = Message::new(raw.clone());
        assert_eq!(serde_json::to_value(&msg).unwrap(), raw);
    }

    #[test]
    fn outcome_serialization_is_tagged() {
        let section = QuerySection {
            name: "questions".into(),
            outcome: QueryOutcome::Failed {
                reason: "rate limited".into(),
            },
        };
        let json = serde_json::to_value(&section).unwrap();
        assert_eq!(json["name"], "questions");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "rate limited");
    }

    #[test]
    fn stage_transitions() {
        use QueryStage::*;
        assert!(Idle.can_transition_to(Fetching));
        assert!(Fetching.can_transition_to(Extracting));
        assert!(Extracting.can_transition_to(Filtering));
        assert!(Filtering.can_transition_to(Reporting));
        assert!(Fetching.can_transition_to(Reporting));
        assert!(Reporting.can_transition_to(Idle));
        assert!(!Idle.can_transition_to(Filtering));
        assert!(!Reporting.can_transition_to(Fetching));
    }

    #[test]
    fn overview_counts() {
        let result = EvaluatedResult {
            query_name: "q".into(),
            author: "a".into(),
            display_text: "t?".into(),
            channel: None,
            permalink: None,
            posted_at: None,
        };
        let overview = Overview {
            sections: vec![
                QuerySection {
                    name: "q".into(),
                    outcome: QueryOutcome::Reported {
                        results: vec![result.clone(), result],
                    },
                },
                QuerySection {
                    name: "broken".into(),
                    outcome: QueryOutcome::Failed {
                        reason: "x".into(),
                    },
                },
            ],
        };
        assert_eq!(overview.total_results(), 2);
        assert_eq!(overview.failed_queries(), 1);
    }
}
