use std::collections::HashSet;

use tabled::settings::Style;
use tabled::{Table, Tabled};

use citetrack_types::{DomainUrls, EvaluationRecord, MatchEntry};

pub const RANK_NA_TEXT: &str = "rank n/a";
pub const OTHER_URLS_LIMIT: usize = 3;
const EMPTY_CELL: &str = "-";

#[derive(Tabled)]
struct ConsoleRow {
    #[tabled(rename = "Prompt")]
    prompt: String,
    #[tabled(rename = "Target Found")]
    target: String,
    #[tabled(rename = "Rank")]
    rank: String,
}

/// Compact markdown table: one row per prompt with the first tracked domain
/// cited and its first rank.
pub fn format_console_table(record: &EvaluationRecord) -> String {
    let rows: Vec<ConsoleRow> = record
        .results
        .iter()
        .map(|r| {
            let (target, rank) = match r.matches.first() {
                Some(m) => (
                    format!("✅ {}", m.domain),
                    m.ranks.first().map(|n| n.to_string()).unwrap_or_else(|| EMPTY_CELL.to_string()),
                ),
                None => ("❌".to_string(), EMPTY_CELL.to_string()),
            };
            ConsoleRow {
                prompt: escape_pipe(&r.prompt),
                target,
                rank,
            }
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::markdown());
    table.to_string()
}

/// Full markdown section for the run log: tracked domains, match status and
/// up to three other URLs the model cited.
pub fn format_provider_table(record: &EvaluationRecord) -> String {
    let mut lines = vec![
        provider_heading(record),
        "| Prompt | Target Domain | Status | Other cited URLs |".to_string(),
        "| --- | --- | --- | --- |".to_string(),
    ];
    for r in &record.results {
        let tracked: HashSet<&str> = r.matches.iter().map(|m| m.domain.as_str()).collect();
        let other = other_cited_urls(&r.domain_urls, &tracked, OTHER_URLS_LIMIT);
        let other_cell = if other.is_empty() { EMPTY_CELL.to_string() } else { other.join("<br>") };

        let (domain_cell, status) = if r.matches.is_empty() {
            (String::new(), "no target domains cited".to_string())
        } else {
            let links: Vec<String> = r
                .matches
                .iter()
                .filter(|m| !m.domain.is_empty())
                .map(|m| format!("[{0}](https://{0})", m.domain))
                .collect();
            let status: Vec<String> = r.matches.iter().map(describe_match).collect();
            (links.join("<br>"), status.join("; "))
        };
        lines.push(format!(
            "| {} | {} | {} | {} |",
            escape_pipe(&r.prompt),
            domain_cell,
            escape_pipe(&status),
            other_cell
        ));
    }
    lines.join("\n")
}

/// Bullet-list summary, one line per prompt.
pub fn format_provider_block(record: &EvaluationRecord) -> String {
    let mut lines = vec![provider_heading(record)];
    for r in &record.results {
        if r.matches.is_empty() {
            lines.push(format!("- prompt: {} -> no target domains cited", r.prompt));
            continue;
        }
        let parts: Vec<String> = r
            .matches
            .iter()
            .map(|m| format!("{} ({})", m.domain, rank_text(m)))
            .collect();
        lines.push(format!("- prompt: {} -> cited: {}", r.prompt, parts.join(", ")));
    }
    lines.join("\n")
}

/// `domain (ranks [..]); <url detail>`.
pub fn describe_match(entry: &MatchEntry) -> String {
    let head = format!("{} ({})", entry.domain, rank_text(entry));
    let detail = if !entry.matched_urls.is_empty() {
        format!("cited URL(s): {}", entry.matched_urls.join(", "))
    } else if !entry.cited_urls.is_empty() {
        format!("cited URL(s): {}", entry.cited_urls.join(", "))
    } else if !entry.target_urls.is_empty() {
        "exact URL not found".to_string()
    } else {
        "no URL targets".to_string()
    };
    format!("{head}; {detail}")
}

/// URLs cited under domains outside `tracked`, first-seen order, at most `limit`.
pub fn other_cited_urls(domain_urls: &DomainUrls, tracked: &HashSet<&str>, limit: usize) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for (domain, list) in domain_urls {
        if tracked.contains(domain.as_str()) {
            continue;
        }
        for url in list {
            if urls.len() >= limit {
                return urls;
            }
            if !urls.contains(url) {
                urls.push(url.clone());
            }
        }
    }
    urls
}

pub fn escape_pipe(text: &str) -> String {
    text.replace('|', "\\|")
}

fn provider_heading(record: &EvaluationRecord) -> String {
    format!("### Provider: {} | Model: {}", record.provider, record.model)
}

fn rank_text(entry: &MatchEntry) -> String {
    if entry.ranks.is_empty() {
        RANK_NA_TEXT.to_string()
    } else {
        format!("ranks {:?}", entry.ranks)
    }
}
