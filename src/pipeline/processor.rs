//! Query runner: drives every configured query through the pipeline.
//!
//! Per query: search → extraction → filtering → section in the overview.
//!
//! Queries are independent. They run through a bounded, order-preserving
//! stream so the overview always follows the declared order no matter which
//! search finishes first. A failing query becomes a failed section; only an
//! authentication failure stops the run.

use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, trace, warn};

use crate::config::{LoadedQuery, QuerySpec};
use crate::error::{Error, SearchError};
use crate::pipeline::rules::{extract_candidate, filter_candidate};
use crate::pipeline::types::{EvaluatedResult, Overview, QueryOutcome, QuerySection, QueryStage};
use crate::search::{SearchClient, SearchQuery};

/// Default number of queries searched at the same time.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Runs queries against a search client.
pub struct QueryRunner {
    client: Arc<dyn SearchClient>,
    concurrency: usize,
    today: NaiveDate,
}

impl QueryRunner {
    pub fn new(client: Arc<dyn SearchClient>) -> Self {
        Self {
            client,
            concurrency: DEFAULT_CONCURRENCY,
            today: Utc::now().date_naive(),
        }
    }

    /// Limit how many searches are in flight. `1` runs queries one by one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Day the lookback window is counted from (defaults to today, UTC).
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Run every enabled query and collect the overview.
    ///
    /// Returns `Err` only for authentication failures, which would fail every
    /// other query the same way.
    pub async fn run(&self, queries: &[LoadedQuery]) -> Result<Overview, Error> {
        let active: Vec<&LoadedQuery> = queries.iter().filter(|q| is_active(q)).collect();
        info!(
            queries = active.len(),
            skipped = queries.len() - active.len(),
            backend = self.client.name(),
            "Running queries"
        );

        let mut sections = stream::iter(active.into_iter().map(|q| self.section_for(q)))
            .buffered(self.concurrency);

        let mut overview = Overview::default();
        while let Some(section) = sections.next().await {
            overview.sections.push(section?);
        }

        info!(
            results = overview.total_results(),
            failed = overview.failed_queries(),
            "Run complete"
        );
        Ok(overview)
    }

    async fn section_for(&self, query: &LoadedQuery) -> Result<QuerySection, Error> {
        let outcome = match &query.spec {
            Err(e) => QueryOutcome::Failed {
                reason: e.to_string(),
            },
            Ok(spec) => match self.run_query(spec).await {
                Ok(results) => QueryOutcome::Reported { results },
                Err(e) if e.is_fatal() => {
                    error!(query = %query.name, error = %e, "Search rejected credentials");
                    return Err(e.into());
                }
                Err(e) => {
                    warn!(query = %query.name, error = %e, "Query failed");
                    QueryOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            },
        };

        debug!(query = %query.name, outcome = outcome.label(), "Query finished");
        Ok(QuerySection {
            name: query.name.clone(),
            outcome,
        })
    }

    /// Run one query: search, de-duplicate, extract, filter.
    ///
    /// The two rule stages are the halves of [`crate::pipeline::rules::evaluate`],
    /// run separately so each stage boundary is logged.
    pub async fn run_query(&self, spec: &QuerySpec) -> Result<Vec<EvaluatedResult>, SearchError> {
        let mut stage = StageTracker::new(&spec.name);

        stage.advance(QueryStage::Fetching);
        let search = SearchQuery::for_spec(spec, self.today);
        let messages = match self.client.search(&search).await {
            Ok(messages) => messages,
            Err(e) => {
                stage.finish();
                return Err(e);
            }
        };
        let fetched = messages.len();

        stage.advance(QueryStage::Extracting);
        let mut seen = HashSet::new();
        let candidates: Vec<_> = messages
            .iter()
            .filter(|m| m.identity().is_none_or(|id| seen.insert(id)))
            .filter_map(|m| match extract_candidate(m, spec) {
                Ok(candidate) => Some(candidate),
                Err(reason) => {
                    trace!(query = %spec.name, reason = reason.label(), "Message dropped");
                    None
                }
            })
            .collect();

        stage.advance(QueryStage::Filtering);
        let results: Vec<EvaluatedResult> = candidates
            .into_iter()
            .filter_map(|candidate| match filter_candidate(candidate, spec) {
                Ok(result) => Some(result),
                Err(reason) => {
                    trace!(query = %spec.name, reason = reason.label(), "Message dropped");
                    None
                }
            })
            .collect();

        info!(
            query = %spec.name,
            fetched,
            reported = results.len(),
            "Query evaluated"
        );
        stage.finish();
        Ok(results)
    }

    /// Write every raw match of every enabled query to `out`, one JSON
    /// document per line, without evaluating any rule.
    ///
    /// Used to work out field paths against real messages. Returns the
    /// number of messages written.
    pub async fn dump<W: Write>(&self, queries: &[LoadedQuery], out: &mut W) -> Result<usize, Error> {
        let mut written = 0;
        for query in queries.iter().filter(|q| is_active(q)) {
            let spec = match &query.spec {
                Ok(spec) => spec,
                Err(e) => {
                    warn!(query = %query.name, error = %e, "Skipping invalid query");
                    continue;
                }
            };

            let search = SearchQuery::for_spec(spec, self.today);
            let messages = match self.client.search(&search).await {
                Ok(messages) => messages,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!(query = %query.name, error = %e, "Query failed");
                    continue;
                }
            };

            for message in &messages {
                writeln!(out, "{}", serde_json::to_string(message.raw())?)?;
            }
            written += messages.len();
        }
        out.flush()?;
        Ok(written)
    }
}

/// Disabled queries are skipped entirely; broken ones still get a section.
fn is_active(query: &LoadedQuery) -> bool {
    match &query.spec {
        Ok(spec) if !spec.enabled => {
            debug!(query = %query.name, "Skipping disabled query");
            false
        }
        _ => true,
    }
}

/// Walks one query through its [`QueryStage`]s.
struct StageTracker<'a> {
    query: &'a str,
    stage: QueryStage,
}

impl<'a> StageTracker<'a> {
    fn new(query: &'a str) -> Self {
        Self {
            query,
            stage: QueryStage::Idle,
        }
    }

    fn advance(&mut self, next: QueryStage) {
        debug_assert!(
            self.stage.can_transition_to(next),
            "invalid stage transition {} -> {next}",
            self.stage
        );
        trace!(query = self.query, from = %self.stage, to = %next, "Query stage");
        self.stage = next;
    }

    /// Report and go back to idle, from wherever the query stopped.
    fn finish(&mut self) {
        self.advance(QueryStage::Reporting);
        self.advance(QueryStage::Idle);
    }
}
