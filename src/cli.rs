//! Command-line options.
//!
//! Every option can also come from a `KETCHUP_*` environment variable; an
//! explicit flag wins over the environment, which wins over the default.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use clap::builder::BoolishValueParser;
use secrecy::SecretString;

use crate::config::{DEFAULT_API_BASE, Settings};
use crate::pipeline::report::OutputFormat;

#[derive(Parser)]
#[command(name = "ketchup")]
#[command(about = "A CLI to keep track of unanswered Slack questions")]
#[command(version)]
pub struct Cli {
    /// The Slack token to authenticate. Requires scope search:read.
    #[arg(long, env = "KETCHUP_TOKEN", hide_env_values = true)]
    pub token: String,

    /// The YAML file containing the queries to execute.
    #[arg(long, env = "KETCHUP_QUERY_FILE")]
    pub config: PathBuf,

    /// Dump the raw Slack messages instead of the overview. Useful to debug
    /// field paths.
    #[arg(
        long,
        alias = "dump_responses",
        env = "KETCHUP_DUMP_RESPONSES",
        value_parser = BoolishValueParser::new()
    )]
    pub dump_responses: bool,

    /// Output format of the overview.
    #[arg(long, value_enum, env = "KETCHUP_FORMAT", default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Timeout in seconds for each search request.
    #[arg(
        long,
        env = "KETCHUP_TIMEOUT_SECS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout_secs: u64,

    /// Number of queries searched at the same time.
    #[arg(
        long,
        env = "KETCHUP_CONCURRENCY",
        default_value_t = 4,
        value_parser = clap::value_parser!(u16).range(1..=64)
    )]
    pub concurrency: u16,

    /// Maximum number of result pages fetched per query.
    #[arg(
        long,
        env = "KETCHUP_MAX_PAGES",
        default_value_t = 10,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub max_pages: u32,

    /// Base URL of the Slack Web API.
    #[arg(long, env = "KETCHUP_API_BASE", default_value = DEFAULT_API_BASE, hide = true)]
    pub api_base: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Resolve the parsed options into runtime settings.
    pub fn settings(&self) -> Settings {
        Settings {
            token: SecretString::from(self.token.clone()),
            query_file: self.config.clone(),
            dump_responses: self.dump_responses,
            format: self.format,
            request_timeout: Duration::from_secs(self.timeout_secs),
            concurrency: usize::from(self.concurrency),
            max_pages: self.max_pages,
            api_base: self.api_base.clone(),
        }
    }
}
