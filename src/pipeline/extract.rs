//! Field extraction from raw search matches.
//!
//! Messages come back from the search service as loosely shaped JSON: plain
//! text messages, bot posts with attachments, thread broadcasts. A query
//! addresses the field it cares about with a JSONPath expression:
//!
//! - `$.text`
//! - `$.attachments[0].fallback`
//! - `$.attachments[*].fallback` or `$..fallback`
//! - `$['channel']["name"]`
//!
//! The first node the expression selects is the field. Resolution never
//! fails: no match or a non-text leaf yields `None` so heterogeneous
//! messages can flow through the same query.

use std::fmt;

use serde_json::Value;
use serde_json_path::JsonPath;

use crate::pipeline::types::Message;

/// Reasons a path expression is rejected at load time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldPathError {
    #[error("path expression is empty")]
    Empty,

    #[error("{0}")]
    Syntax(String),
}

/// A parsed field path expression.
#[derive(Debug, Clone)]
pub struct FieldPath {
    expr: String,
    path: JsonPath,
}

impl FieldPath {
    /// Parse a path expression.
    ///
    /// The leading `$` is optional, so `text` and `$.text` are the same path.
    pub fn parse(expr: &str) -> Result<Self, FieldPathError> {
        let trimmed = expr.trim();
        if trimmed.is_empty() {
            return Err(FieldPathError::Empty);
        }

        let query = if trimmed.starts_with('$') {
            trimmed.to_string()
        } else if trimmed.starts_with('[') {
            format!("${trimmed}")
        } else {
            format!("$.{trimmed}")
        };
        let path = JsonPath::parse(&query).map_err(|e| FieldPathError::Syntax(e.to_string()))?;

        Ok(Self {
            expr: trimmed.to_string(),
            path,
        })
    }

    /// First node the path selects in `root`.
    pub fn resolve<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.path.query(root).into_iter().next()
    }

    /// Resolve the path and render the leaf as text.
    ///
    /// Strings are returned as-is, numbers and booleans in their JSON form.
    /// Null, objects and arrays are not text and yield `None`.
    pub fn extract_text(&self, root: &Value) -> Option<String> {
        match self.resolve(root)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }
}

impl PartialEq for FieldPath {
    fn eq(&self, other: &Self) -> bool {
        self.expr == other.expr
    }
}

impl Eq for FieldPath {}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

/// Extract the text a query cares about from a message.
pub fn extract(message: &Message, path: &FieldPath) -> Option<String> {
    path.extract_text(message.raw())
}
