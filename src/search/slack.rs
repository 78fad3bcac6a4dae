//! Slack search over the `search.messages` Web API.
//!
//! Requires a user token with the `search:read` scope; bot tokens cannot
//! call the search API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::SearchError;
use crate::pipeline::types::Message;
use crate::search::{SearchClient, SearchQuery};

/// Matches requested per page (the API maximum).
const PAGE_SIZE: &str = "100";

/// Slack search client.
pub struct SlackSearchClient {
    token: SecretString,
    api_base: String,
    max_pages: u32,
    client: reqwest::Client,
}

impl SlackSearchClient {
    pub fn new(
        token: SecretString,
        api_base: impl Into<String>,
        request_timeout: Duration,
        max_pages: u32,
    ) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("ketchup/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SearchError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            token,
            api_base: api_base.into(),
            max_pages: max_pages.max(1),
            client,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, SearchError> {
        Self::new(
            settings.token.clone(),
            settings.api_base.clone(),
            settings.request_timeout,
            settings.max_pages,
        )
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/{method}", self.api_base.trim_end_matches('/'))
    }

    /// Fetch one page of matches.
    async fn fetch_page(&self, query: &str, page: u32) -> Result<SearchMessages, SearchError> {
        let page_param = page.to_string();
        let resp = self
            .client
            .get(self.api_url("search.messages"))
            .bearer_auth(self.token.expose_secret())
            .query(&[
                ("query", query),
                ("count", PAGE_SIZE),
                ("page", page_param.as_str()),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(SearchError::RateLimited { retry_after });
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SearchError::AuthFailed {
                reason: format!("search.messages returned {status}"),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SearchError::InvalidResponse(format!(
                "search.messages returned {status}: {body}"
            )));
        }

        let body: SearchResponse = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                transport_error(e)
            } else {
                SearchError::InvalidResponse(format!("undecodable body: {e}"))
            }
        })?;

        if !body.ok {
            let code = body.error.as_deref().unwrap_or("unknown_error");
            return Err(classify_api_error(code));
        }

        body.messages
            .ok_or_else(|| SearchError::InvalidResponse("response has no messages".into()))
    }
}

#[async_trait]
impl SearchClient for SlackSearchClient {
    fn name(&self) -> &str {
        "slack"
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<Message>, SearchError> {
        let query_string = query.to_query_string();
        debug!(query = %query_string, "Searching Slack");

        let mut messages = Vec::new();
        let mut page = 1;
        loop {
            let results = self.fetch_page(&query_string, page).await?;
            let pages = results.paging.map(|p| p.pages).unwrap_or(1);
            debug!(
                page,
                pages,
                matches = results.matches.len(),
                "Fetched search page"
            );
            messages.extend(results.matches);

            if page >= pages {
                break;
            }
            if page >= self.max_pages {
                warn!(
                    query = %query_string,
                    pages,
                    max_pages = self.max_pages,
                    "Search has more pages than allowed, truncating"
                );
                break;
            }
            page += 1;
        }

        Ok(messages)
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SearchResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    messages: Option<SearchMessages>,
}

#[derive(Debug, Deserialize)]
struct SearchMessages {
    #[serde(default)]
    matches: Vec<Message>,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct Paging {
    #[serde(default)]
    pages: u32,
}

// ── Helpers ─────────────────────────────────────────────────────────

fn transport_error(e: reqwest::Error) -> SearchError {
    if e.is_timeout() {
        SearchError::Transport(format!("request timed out: {e}"))
    } else {
        SearchError::Transport(e.to_string())
    }
}

/// Map a Web API `error` code onto the error taxonomy.
fn classify_api_error(code: &str) -> SearchError {
    match code {
        "invalid_auth" | "not_authed" | "account_inactive" | "token_revoked"
        | "token_expired" | "missing_scope" | "not_allowed_token_type" => {
            SearchError::AuthFailed {
                reason: code.to_string(),
            }
        }
        "ratelimited" | "rate_limited" => SearchError::RateLimited { retry_after: None },
        other => SearchError::InvalidResponse(format!("search.messages failed: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(api_base: &str) -> SlackSearchClient {
        SlackSearchClient::new(
            SecretString::from("xoxp-test"),
            api_base,
            Duration::from_secs(5),
            10,
        )
        .unwrap()
    }

    #[test]
    fn slack_client_name() {
        assert_eq!(client("https://slack.com/api").name(), "slack");
    }

    #[test]
    fn slack_api_url() {
        assert_eq!(
            client("https://slack.com/api").api_url("search.messages"),
            "https://slack.com/api/search.messages"
        );
        assert_eq!(
            client("http://127.0.0.1:9999/api/").api_url("search.messages"),
            "http://127.0.0.1:9999/api/search.messages"
        );
    }

    #[test]
    fn max_pages_is_at_least_one() {
        let c = SlackSearchClient::new(
            SecretString::from("t"),
            "https://slack.com/api",
            Duration::from_secs(1),
            0,
        )
        .unwrap();
        assert_eq!(c.max_pages, 1);
    }

    #[test]
    fn classify_auth_errors() {
        for code in ["invalid_auth", "not_authed", "token_revoked", "missing_scope"] {
            assert!(
                matches!(classify_api_error(code), SearchError::AuthFailed { .. }),
                "{code}"
            );
        }
    }

    #[test]
    fn classify_rate_limit_and_other_errors() {
        assert!(matches!(
            classify_api_error("ratelimited"),
            SearchError::RateLimited { retry_after: None }
        ));
        assert!(matches!(
            classify_api_error("channel_not_found"),
            SearchError::InvalidResponse(_)
        ));
    }

    #[test]
    fn decodes_search_response() {
        let body = serde_json::json!({
            "ok": true,
            "query": "? in:#help",
            "messages": {
                "total": 1,
                "matches": [{ "username": "alice", "text": "help?" }],
                "paging": { "count": 100, "total": 1, "page": 1, "pages": 1 }
            }
        });
        let resp: SearchResponse = serde_json::from_value(body).unwrap();
        let messages = resp.messages.unwrap();
        assert_eq!(messages.matches.len(), 1);
        assert_eq!(messages.matches[0].author(), Some("alice"));
        assert_eq!(messages.paging.unwrap().pages, 1);
    }

    #[tokio::test]
    async fn unreachable_service_is_transport_error() {
        // Port 9 (discard) is closed on any sane test host.
        let c = client("http://127.0.0.1:9/api");
        let query = SearchQuery {
            term: "?".into(),
            channels: vec!["#help".into()],
            after: chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            exclude_marker: None,
            exclude_users: vec![],
        };
        let err = c.search(&query).await.unwrap_err();
        assert!(matches!(err, SearchError::Transport(_)), "{err}");
    }
}
