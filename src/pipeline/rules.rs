//! Rule evaluation for a single message against a single query.
//!
//! Runs in two stages, short-circuiting on the first exclusion:
//!
//! Extraction:
//! 1. author is ignored → drop
//! 2. field path yields nothing → drop
//!
//! Filtering:
//! 3. text contains the done marker → drop (resolved)
//! 4. substring regex reduces the text to its first capture group
//!    (no match leaves the text as-is, never drops)
//! 5. filter regex does not match the reduced text → drop
//!
//! Everything here is pure: same message and spec, same answer.

use regex::Regex;
use tracing::trace;

use crate::config::QuerySpec;
use crate::pipeline::extract::extract;
use crate::pipeline::types::{EvaluatedResult, Message};

/// Why a message was left out of the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Posted by a user on the query's ignore list.
    IgnoredAuthor { author: String },
    /// The field path does not resolve to text on this message.
    MissingField,
    /// The text carries the done marker.
    Resolved,
    /// The filter regex does not match.
    FilterMismatch,
}

impl DropReason {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::IgnoredAuthor { .. } => "ignored_author",
            Self::MissingField => "missing_field",
            Self::Resolved => "resolved",
            Self::FilterMismatch => "filter_mismatch",
        }
    }
}

/// A message that passed extraction, with the text its query addresses.
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub message: &'a Message,
    pub author: String,
    pub text: String,
}

/// Extraction stage: author exclusion and field lookup.
pub fn extract_candidate<'a>(
    message: &'a Message,
    spec: &QuerySpec,
) -> Result<Candidate<'a>, DropReason> {
    if let Some(ignored) = message
        .author_identities()
        .find(|id| spec.ignore_users.iter().any(|u| u == id))
    {
        return Err(DropReason::IgnoredAuthor {
            author: ignored.to_string(),
        });
    }

    let text = extract(message, &spec.field_path).ok_or(DropReason::MissingField)?;

    Ok(Candidate {
        message,
        author: message.author().unwrap_or("unknown").to_string(),
        text,
    })
}

/// Filtering stage: done marker, substring reduction and the filter regex.
pub fn filter_candidate(
    candidate: Candidate<'_>,
    spec: &QuerySpec,
) -> Result<EvaluatedResult, DropReason> {
    if candidate.text.contains(&spec.done_marker) {
        return Err(DropReason::Resolved);
    }

    let display_text = reduce_text(&candidate.text, spec.regex_substring.as_ref());

    if !spec.regex_filter.is_match(&display_text) {
        return Err(DropReason::FilterMismatch);
    }

    let message = candidate.message;
    Ok(EvaluatedResult {
        query_name: spec.name.clone(),
        author: candidate.author,
        display_text,
        channel: message.channel_name().map(String::from),
        permalink: message.permalink().map(String::from),
        posted_at: message.posted_at(),
    })
}

/// Run both stages, keeping the reason a message was dropped.
pub fn assess(message: &Message, spec: &QuerySpec) -> Result<EvaluatedResult, DropReason> {
    let candidate = extract_candidate(message, spec)?;
    filter_candidate(candidate, spec)
}

/// Decide whether a message is reported for a query.
pub fn evaluate(message: &Message, spec: &QuerySpec) -> Option<EvaluatedResult> {
    match assess(message, spec) {
        Ok(result) => Some(result),
        Err(reason) => {
            trace!(query = %spec.name, reason = reason.label(), "Message dropped");
            None
        }
    }
}

/// Reduce `text` to the first capture group of `pattern`.
///
/// Falls back to the whole match when the pattern has no group or the group
/// did not participate, and to the unchanged text when nothing matches.
pub fn reduce_text(text: &str, pattern: Option<&Regex>) -> String {
    let Some(captures) = pattern.and_then(|re| re.captures(text)) else {
        return text.to_string();
    };
    captures
        .get(1)
        .or_else(|| captures.get(0))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| text.to_string())
}
