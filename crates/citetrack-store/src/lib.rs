use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use citetrack_types::EvaluationRecord;

pub mod logs;

pub use logs::{safe_model, RunLog};

const RATE_WEIGHT: f64 = 0.5;
const RANK_WEIGHT: f64 = 0.3;
const RANK1_WEIGHT: f64 = 0.2;

#[derive(Debug)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

/// Aggregates for one prompt across every stored run. Rates are percentages.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptStats {
    pub prompt: String,
    pub total_runs: u64,
    pub cited_runs: u64,
    pub citation_rate: f64,
    pub avg_rank: Option<f64>,
    pub rank1_rate: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelStats {
    pub model: String,
    pub runs: u64,
    pub cited: u64,
    pub citation_rate: f64,
    pub avg_rank: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub total_prompts: u64,
    pub total_runs: u64,
    pub avg_citation_rate: f64,
    pub top_model: Option<String>,
    pub top_model_rate: Option<f64>,
}

impl Store {
    /// Open a new store at the given path (e.g., "citations.db")
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )
        .with_context(|| format!("Failed to open store {:?}", path.as_ref()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("store connection poisoned"))
    }

    /// Initialize the SQLite schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS prompts (
                id INTEGER PRIMARY KEY,
                text TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        // One row per (model, prompt) pair of a run; re-imports are ignored.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY,
                prompt_id INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                provider TEXT NOT NULL,
                model TEXT NOT NULL,
                cited BOOLEAN NOT NULL,
                rank INTEGER,
                cited_urls TEXT NOT NULL,
                json_valid BOOLEAN NOT NULL,
                raw TEXT NOT NULL,
                parsed TEXT NOT NULL,
                UNIQUE(prompt_id, timestamp, provider, model),
                FOREIGN KEY(prompt_id) REFERENCES prompts(id)
            )",
            [],
        )?;

        Ok(())
    }

    /// Store every result of every record. Returns the number of new rows.
    pub fn save_records(&self, records: &[EvaluationRecord]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        let mut inserted = 0;

        for record in records {
            for result in &record.results {
                tx.execute(
                    "INSERT OR IGNORE INTO prompts (text, created_at) VALUES (?1, ?2)",
                    params![result.prompt, now],
                )?;
                let prompt_id: i64 = tx.query_row(
                    "SELECT id FROM prompts WHERE text = ?1",
                    params![result.prompt],
                    |row| row.get(0),
                )?;

                let cited_urls: Vec<&str> = result
                    .matches
                    .iter()
                    .flat_map(|m| m.cited_urls.iter().map(String::as_str))
                    .collect();

                inserted += tx.execute(
                    "INSERT OR IGNORE INTO runs
                        (prompt_id, timestamp, provider, model, cited, rank, cited_urls, json_valid, raw, parsed)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        prompt_id,
                        record.timestamp,
                        record.provider,
                        record.model,
                        result.is_cited(),
                        result.first_rank().map(|r| r as i64),
                        serde_json::to_string(&cited_urls)?,
                        result.json_valid,
                        result.raw,
                        serde_json::to_string(&result.parsed)?,
                    ],
                )?;
            }
        }

        tx.commit()?;
        debug!(inserted, "saved records");
        Ok(inserted)
    }

    /// Import every `run_*.json` file in `dir`. Unreadable files are skipped.
    pub fn import_logs<P: AsRef<Path>>(&self, dir: P) -> Result<usize> {
        let dir = dir.as_ref();
        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read logs dir {:?}", dir))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("run_") && n.ends_with(".json"))
            })
            .collect();
        paths.sort();

        let mut records = Vec::with_capacity(paths.len());
        for path in &paths {
            let parsed = std::fs::read_to_string(path)
                .map_err(anyhow::Error::from)
                .and_then(|s| serde_json::from_str::<EvaluationRecord>(&s).map_err(anyhow::Error::from));
            match parsed {
                Ok(record) => records.push(record),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping run log"),
            }
        }

        let inserted = self.save_records(&records)?;
        info!(files = records.len(), rows = inserted, "imported run logs");
        Ok(inserted)
    }

    /// Per-prompt aggregates, best composite score first.
    pub fn prompt_stats(&self) -> Result<Vec<PromptStats>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT p.text,
                    COUNT(r.id),
                    SUM(CASE WHEN r.cited THEN 1 ELSE 0 END),
                    AVG(r.rank),
                    SUM(CASE WHEN r.rank = 1 THEN 1 ELSE 0 END)
             FROM prompts p
             JOIN runs r ON r.prompt_id = p.id
             GROUP BY p.id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<f64>>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut stats = Vec::new();
        for row in rows {
            let (prompt, total, cited, avg_rank, rank1) = row?;
            let rate = fraction(cited, total);
            let rank1_rate = fraction(rank1, total);
            let rank_term = avg_rank.map(|a| 1.0 / (a + 1.0)).unwrap_or(0.0);
            stats.push(PromptStats {
                prompt,
                total_runs: total as u64,
                cited_runs: cited as u64,
                citation_rate: rate * 100.0,
                avg_rank,
                rank1_rate: rank1_rate * 100.0,
                score: RATE_WEIGHT * rate + RANK_WEIGHT * rank_term + RANK1_WEIGHT * rank1_rate,
            });
        }
        stats.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.prompt.cmp(&b.prompt)));
        Ok(stats)
    }

    /// Per-model aggregates, highest citation rate first.
    pub fn model_stats(&self) -> Result<Vec<ModelStats>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT model,
                    COUNT(id),
                    SUM(CASE WHEN cited THEN 1 ELSE 0 END),
                    AVG(rank)
             FROM runs
             GROUP BY model",
        )?;
        let rows = stmt.query_map([], |row| {
            let runs: i64 = row.get(1)?;
            let cited: i64 = row.get(2)?;
            Ok(ModelStats {
                model: row.get(0)?,
                runs: runs as u64,
                cited: cited as u64,
                citation_rate: fraction(cited, runs) * 100.0,
                avg_rank: row.get(3)?,
            })
        })?;

        let mut stats = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        stats.sort_by(|a, b| {
            b.citation_rate
                .total_cmp(&a.citation_rate)
                .then_with(|| a.model.cmp(&b.model))
        });
        Ok(stats)
    }

    pub fn summary(&self) -> Result<Summary> {
        let (total_prompts, total_runs, cited) = {
            let conn = self.conn()?;
            conn.query_row(
                "SELECT (SELECT COUNT(*) FROM prompts),
                        COUNT(id),
                        COALESCE(SUM(CASE WHEN cited THEN 1 ELSE 0 END), 0)
                 FROM runs",
                [],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?)),
            )?
        };
        let top = self.model_stats()?.into_iter().next();

        Ok(Summary {
            total_prompts: total_prompts as u64,
            total_runs: total_runs as u64,
            avg_citation_rate: fraction(cited, total_runs) * 100.0,
            top_model_rate: top.as_ref().map(|m| m.citation_rate),
            top_model: top.map(|m| m.model),
        })
    }
}

fn fraction(part: i64, total: i64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}
