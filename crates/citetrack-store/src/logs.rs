use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::debug;

use citetrack_types::EvaluationRecord;

pub const MASTER_LOG: &str = "master_log.jsonl";
pub const MAIN_LOG: &str = "main_log.md";
pub const LAST_SUMMARY: &str = "last_summary.md";
const MAIN_LOG_HEADER: &str = "# Citation runs\n\n";

static UNSAFE_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_.-]+").unwrap());

/// Model slug made safe for a file name: each run of other characters becomes `-`.
pub fn safe_model(model: &str) -> String {
    UNSAFE_CHARS.replace_all(model, "-").into_owned()
}

/// Per-run files under a logs directory.
#[derive(Debug, Clone)]
pub struct RunLog {
    dir: PathBuf,
}

impl RunLog {
    /// Create the directory if needed.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create logs dir {:?}", dir))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, record: &EvaluationRecord) -> PathBuf {
        self.dir.join(format!(
            "run_{}_{}_{}.json",
            record.timestamp,
            record.provider,
            safe_model(&record.model)
        ))
    }

    /// Pretty JSON per record plus one line in the master log.
    pub fn write_record(&self, record: &EvaluationRecord) -> Result<PathBuf> {
        let path = self.record_path(record);
        let pretty = serde_json::to_string_pretty(record)?;
        fs::write(&path, pretty).with_context(|| format!("Failed to write {:?}", path))?;

        let line = serde_json::to_string(record)?;
        let master = self.dir.join(MASTER_LOG);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&master)
            .with_context(|| format!("Failed to open {:?}", master))?;
        writeln!(file, "{line}")?;

        debug!(path = %path.display(), "wrote run record");
        Ok(path)
    }

    /// Append a `## {timestamp}` section with the provider blocks.
    pub fn append_main_log(&self, timestamp: &str, blocks: &[String]) -> Result<()> {
        let path = self.dir.join(MAIN_LOG);
        let fresh = !path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {:?}", path))?;
        if fresh {
            file.write_all(MAIN_LOG_HEADER.as_bytes())?;
        }
        write!(file, "{}\n\n", section(timestamp, blocks))?;
        Ok(())
    }

    /// Replace the last-run summary.
    pub fn write_summary(&self, timestamp: &str, blocks: &[String]) -> Result<PathBuf> {
        let path = self.dir.join(LAST_SUMMARY);
        let body = format!("{}\n", section(timestamp, blocks));
        fs::write(&path, body).with_context(|| format!("Failed to write {:?}", path))?;
        Ok(path)
    }
}

// `## {timestamp}` followed by the blocks, one per line.
fn section(timestamp: &str, blocks: &[String]) -> String {
    std::iter::once(format!("## {timestamp}"))
        .chain(blocks.iter().cloned())
        .collect::<Vec<_>>()
        .join("\n")
}
