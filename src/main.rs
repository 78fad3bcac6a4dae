use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

use ketchup::cli::Cli;
use ketchup::config::load_queries;
use ketchup::pipeline::processor::QueryRunner;
use ketchup::pipeline::report::render;
use ketchup::search::{SearchClient, SlackSearchClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout only carries the overview.
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let settings = cli.settings();
    debug!(
        query_file = %settings.query_file.display(),
        format = ?settings.format,
        concurrency = settings.concurrency,
        max_pages = settings.max_pages,
        "Settings resolved"
    );

    let queries = load_queries(&settings.query_file)
        .with_context(|| format!("loading {}", settings.query_file.display()))?;
    info!(count = queries.len(), "Queries loaded");

    let client: Arc<dyn SearchClient> = Arc::new(SlackSearchClient::from_settings(&settings)?);
    let runner = QueryRunner::new(client).with_concurrency(settings.concurrency);

    let mut stdout = std::io::stdout().lock();
    if settings.dump_responses {
        let written = runner.dump(&queries, &mut stdout).await?;
        info!(messages = written, "Dumped raw search matches");
        return Ok(());
    }

    let overview = runner.run(&queries).await?;
    stdout.write_all(render(&overview, settings.format)?.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
