use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde_json::Value;

use crate::target::TargetSpec;

/// One prompt per line. Blank lines and `#` comments are skipped.
pub fn parse_prompts(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// A JSON array of domain or URL strings.
///
/// Non-string entries and strings without a host are skipped; anything other
/// than an array is an error.
pub fn parse_targets(content: &str) -> Result<Vec<TargetSpec>> {
    let value: Value = serde_json::from_str(content).context("Invalid JSON in targets file")?;
    let items = value
        .as_array()
        .ok_or_else(|| anyhow!("targets file must contain a JSON array of domain or URL strings"))?;
    Ok(items
        .iter()
        .filter_map(Value::as_str)
        .filter_map(TargetSpec::parse)
        .collect())
}

pub async fn load_prompts(path: &Path) -> Result<Vec<String>> {
    let content = read_to_string(path).await?;
    Ok(parse_prompts(&content))
}

pub async fn load_targets(path: &Path) -> Result<Vec<TargetSpec>> {
    let content = read_to_string(path).await?;
    parse_targets(&content).with_context(|| format!("Failed to load targets from {:?}", path))
}

async fn read_to_string(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))
}
