//! Overview rendering.
//!
//! Queries appear in the order they are declared in the query file, each
//! with its results in search order. A query with nothing to report is still
//! listed, so "checked, clean" reads differently from "never ran".

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::pipeline::types::{EvaluatedResult, Overview, QueryOutcome, QuerySection};

const TABLE_TITLE: &str = "Slack questions to catch up with.";
const NO_RESULTS: &str = "(no results)";

static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").unwrap());

/// How the overview is written to stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// One header per query, one `author: text` line per result.
    #[default]
    Text,
    /// ASCII table with date, channel, user, message and query columns.
    Table,
    /// The overview as JSON.
    Json,
}

/// Render the overview in the requested format.
pub fn render(overview: &Overview, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(render_text(overview)),
        OutputFormat::Table => Ok(render_table(overview)),
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(overview)?;
            json.push('\n');
            Ok(json)
        }
    }
}

/// Collapse runs of blank lines into a single line break.
pub fn collapse_blank_lines(text: &str) -> String {
    BLANK_LINES.replace_all(text, "\n").into_owned()
}

/// Permalinks are printed on their own line, below the message.
fn link_line(permalink: &str) -> String {
    format!("<{permalink}>")
}

fn message_cell(result: &EvaluatedResult) -> String {
    let text = collapse_blank_lines(&result.display_text);
    match &result.permalink {
        Some(link) => format!("{text}\n{}", link_line(link)),
        None => text,
    }
}

fn failure_line(reason: &str) -> String {
    format!("(failed: {reason})")
}

// ── Text ────────────────────────────────────────────────────────────

pub fn render_text(overview: &Overview) -> String {
    let mut out = String::new();
    for (i, section) in overview.sections.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format!("== {} ==\n", section.name));
        match &section.outcome {
            QueryOutcome::Reported { results } if results.is_empty() => {
                out.push_str(NO_RESULTS);
                out.push('\n');
            }
            QueryOutcome::Reported { results } => {
                for result in results {
                    let text = collapse_blank_lines(&result.display_text);
                    // Continuation lines are indented under the author.
                    let text = text.replace('\n', "\n  ");
                    out.push_str(&format!("{}: {}\n", result.author, text));
                    if let Some(link) = &result.permalink {
                        out.push_str(&format!("  {}\n", link_line(link)));
                    }
                }
            }
            QueryOutcome::Failed { reason } => {
                out.push_str(&failure_line(reason));
                out.push('\n');
            }
        }
    }
    out
}

// ── Table ───────────────────────────────────────────────────────────

const HEADERS: [&str; 5] = ["Date", "Channel", "User", "Message", "Query"];

/// Leading columns whose repeated values are blanked on consecutive rows.
const DEDUP_COLUMNS: usize = 3;

pub fn render_table(overview: &Overview) -> String {
    let mut rows: Vec<[String; 5]> = Vec::new();
    for section in &overview.sections {
        rows.extend(section_rows(section));
    }

    let mut widths: [usize; 5] = HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            let cell_width = cell.lines().map(|l| l.chars().count()).max().unwrap_or(0);
            *width = (*width).max(cell_width);
        }
    }

    let separator = {
        let mut line = String::from("+");
        for width in widths {
            line.push_str(&"-".repeat(width + 2));
            line.push('+');
        }
        line
    };

    let mut out = String::new();
    out.push_str(TABLE_TITLE);
    out.push('\n');
    out.push_str(&separator);
    out.push('\n');
    push_row(&mut out, &HEADERS.map(String::from), &widths);
    out.push_str(&separator);
    out.push('\n');
    for row in &rows {
        push_row(&mut out, row, &widths);
        out.push_str(&separator);
        out.push('\n');
    }
    out
}

fn section_rows(section: &QuerySection) -> Vec<[String; 5]> {
    let name = section.name.clone();
    let mut rows: Vec<[String; 5]> = match &section.outcome {
        QueryOutcome::Reported { results } if results.is_empty() => {
            vec![[
                String::new(),
                String::new(),
                String::new(),
                NO_RESULTS.to_string(),
                name,
            ]]
        }
        QueryOutcome::Reported { results } => results
            .iter()
            .map(|r| {
                [
                    r.posted_at
                        .map(|d| d.format("%Y-%m-%d").to_string())
                        .unwrap_or_default(),
                    r.channel.clone().unwrap_or_default(),
                    r.author.clone(),
                    message_cell(r),
                    name.clone(),
                ]
            })
            .collect(),
        QueryOutcome::Failed { reason } => vec![[
            String::new(),
            String::new(),
            String::new(),
            failure_line(reason),
            name,
        ]],
    };
    blank_leading_repeats(&mut rows, DEDUP_COLUMNS);
    rows
}

/// Blank a cell when it repeats the cell above it and every cell to its
/// left was blanked too, so a date/channel/user run reads as one block.
fn blank_leading_repeats(rows: &mut [[String; 5]], depth: usize) {
    let mut previous: Option<[String; 5]> = None;
    for row in rows.iter_mut() {
        let original = row.clone();
        if let Some(prev) = &previous {
            for col in 0..depth {
                if row[col] != prev[col] || row[col].is_empty() {
                    break;
                }
                row[col].clear();
            }
        }
        previous = Some(original);
    }
}

fn push_row(out: &mut String, cells: &[String; 5], widths: &[usize; 5]) {
    let lines: Vec<Vec<&str>> = cells
        .iter()
        .map(|c| {
            let lines: Vec<&str> = c.lines().collect();
            if lines.is_empty() { vec![""] } else { lines }
        })
        .collect();
    let height = lines.iter().map(Vec::len).max().unwrap_or(1);

    for line_no in 0..height {
        out.push('|');
        for (cell_lines, width) in lines.iter().zip(widths.iter()) {
            let text = cell_lines.get(line_no).copied().unwrap_or("");
            let pad = width - text.chars().count();
            out.push(' ');
            out.push_str(text);
            out.push_str(&" ".repeat(pad + 1));
            out.push('|');
        }
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn result(query: &str, author: &str, text: &str) -> EvaluatedResult {
        EvaluatedResult {
            query_name: query.into(),
            author: author.into(),
            display_text: text.into(),
            channel: Some("help".into()),
            permalink: None,
            posted_at: Some(Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()),
        }
    }

    fn overview() -> Overview {
        Overview {
            sections: vec![
                QuerySection {
                    name: "Questions".into(),
                    outcome: QueryOutcome::Reported {
                        results: vec![
                            result("Questions", "alice", "is this a question?"),
                            result("Questions", "bob", "first line?\n\n\nsecond line"),
                        ],
                    },
                },
                QuerySection {
                    name: "Pull requests".into(),
                    outcome: QueryOutcome::Reported { results: vec![] },
                },
                QuerySection {
                    name: "Broken".into(),
                    outcome: QueryOutcome::Failed {
                        reason: "rate limited".into(),
                    },
                },
            ],
        }
    }

    #[test]
    fn text_lists_queries_in_declared_order() {
        let text = render(&overview(), OutputFormat::Text).unwrap();
        let q = text.find("== Questions ==").unwrap();
        let p = text.find("== Pull requests ==").unwrap();
        let b = text.find("== Broken ==").unwrap();
        assert!(q < p && p < b);
    }

    #[test]
    fn text_renders_results_and_empty_marker() {
        let text = render_text(&overview());
        assert_eq!(
            text,
            "== Questions ==\n\
             alice: is this a question?\n\
             bob: first line?\n  second line\n\
             \n\
             == Pull requests ==\n\
             (no results)\n\
             \n\
             == Broken ==\n\
             (failed: rate limited)\n"
        );
    }

    #[test]
    fn empty_overview_renders_nothing() {
        assert_eq!(render_text(&Overview::default()), "");
    }

    #[test]
    fn collapse_blank_lines_matches_whitespace_only_lines() {
        assert_eq!(collapse_blank_lines("a\n \t\n\nb"), "a\nb");
        assert_eq!(collapse_blank_lines("a\nb"), "a\nb");
    }

    #[test]
    fn table_has_header_and_all_queries() {
        let table = render_table(&overview());
        assert!(table.starts_with(TABLE_TITLE));
        assert!(table.contains("| Date"));
        assert!(table.contains("is this a question?"));
        assert!(table.contains("(no results)"));
        assert!(table.contains("(failed: rate limited)"));
        assert!(table.contains("Pull requests"));
    }

    #[test]
    fn table_lines_have_equal_width() {
        let table = render_table(&overview());
        let widths: Vec<usize> = table
            .lines()
            .skip(1)
            .map(|l| l.chars().count())
            .collect();
        assert!(widths.windows(2).all(|w| w[0] == w[1]), "{table}");
    }

    #[test]
    fn table_blanks_repeated_date_and_channel() {
        let mut rows = vec![
            [
                "2024-03-01".to_string(),
                "help".into(),
                "alice".into(),
                "a?".into(),
                "Q".into(),
            ],
            [
                "2024-03-01".to_string(),
                "help".into(),
                "bob".into(),
                "b?".into(),
                "Q".into(),
            ],
            [
                "2024-03-02".to_string(),
                "help".into(),
                "bob".into(),
                "c?".into(),
                "Q".into(),
            ],
        ];
        blank_leading_repeats(&mut rows, 3);
        assert_eq!(rows[1][0], "");
        assert_eq!(rows[1][1], "");
        assert_eq!(rows[1][2], "bob");
        // New date starts a new block even though channel and user repeat.
        assert_eq!(rows[2][0], "2024-03-02");
        assert_eq!(rows[2][1], "help");
        assert_eq!(rows[2][2], "bob");
    }

    #[test]
    fn permalink_follows_message_in_text_and_table() {
        let mut linked = result("Questions", "alice", "where are the docs?\n\nanyone?");
        linked.permalink = Some("https://acme.slack.com/archives/C1/p1709285400000100".into());
        let overview = Overview {
            sections: vec![QuerySection {
                name: "Questions".into(),
                outcome: QueryOutcome::Reported {
                    results: vec![linked],
                },
            }],
        };

        assert_eq!(
            render_text(&overview),
            "== Questions ==\n\
             alice: where are the docs?\n  anyone?\n\
             \x20 <https://acme.slack.com/archives/C1/p1709285400000100>\n"
        );

        let table = render_table(&overview);
        let message_line = table.lines().position(|l| l.contains("where are the docs?")).unwrap();
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[message_line + 1].contains("anyone?"), "{table}");
        assert!(
            lines[message_line + 2]
                .contains("<https://acme.slack.com/archives/C1/p1709285400000100>"),
            "{table}"
        );
    }

    #[test]
    fn json_round_trips_overview() {
        let json = render(&overview(), OutputFormat::Json).unwrap();
        let parsed: Overview = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, overview());
    }
}
