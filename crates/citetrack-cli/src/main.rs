use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use citetrack_core::runner::run_timestamp;
use citetrack_core::store::{RunLog, Store};
use citetrack_core::{
	format_console_table, format_provider_table, load_prompts, load_targets, EvaluationRecord, Evaluator,
	TrackerConfig,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "citetrack", about = "Check whether search-enabled models cite your domains")]
struct Cli {
	#[command(subcommand)]
	command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
	/// Ask every model every prompt and report tracked citations
	Run(RunArgs),
	/// Load run_*.json files from a logs directory into the store
	Import {
		logs_dir: PathBuf,
		#[command(flatten)]
		db: DbArgs,
	},
	/// Overall totals and per-model rates
	Stats(DbArgs),
	/// Prompts ranked by composite citation score
	Prompts {
		#[arg(long, default_value_t = 20)]
		limit: usize,
		#[command(flatten)]
		db: DbArgs,
	},
	/// Per-model citation rates
	Models(DbArgs),
}

#[derive(Debug, Clone, Args)]
struct DbArgs {
	/// SQLite statistics database
	#[arg(long, env = "CITETRACK_DB", default_value = "citations.db")]
	db: PathBuf,
}

#[derive(Debug, Clone, Parser)]
struct RunArgs {
	/// One prompt per line
	#[arg(long, env = "PROMPTS_PATH", default_value = "config/prompts.txt")]
	prompts: PathBuf,

	/// JSON array of domains or URLs to track
	#[arg(long, env = "TARGETS_PATH", default_value = "config/targets.json")]
	targets: PathBuf,

	/// YAML tracker config; defaults apply when absent
	#[arg(long)]
	config: Option<PathBuf>,

	/// Comma separated model slugs or labels to run (default: every configured model)
	#[arg(long, env = "MODEL_SLUGS", value_delimiter = ',')]
	models: Vec<String>,

	#[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true, default_value = "")]
	api_key: String,

	/// Pairs in flight, overrides the config value
	#[arg(long)]
	concurrency: Option<usize>,

	#[arg(long, default_value = "logs")]
	logs_dir: PathBuf,

	/// Also save results into this SQLite store
	#[arg(long)]
	db: Option<PathBuf>,

	/// Output JSON records to a file
	#[arg(long)]
	json_out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
	dotenvy::dotenv().ok();
	tracing_subscriber::registry()
		.with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,citetrack_core=debug".into()))
		.with(tracing_subscriber::fmt::layer())
		.init();

	let cli = Cli::parse();
	match cli.command {
		Commands::Run(args) => run(args).await?,
		Commands::Import { logs_dir, db } => {
			let store = Store::open(&db.db)?;
			let rows = store.import_logs(&logs_dir)?;
			println!("Imported {rows} rows from {}", logs_dir.display());
		}
		Commands::Stats(db) => print_summary(&Store::open(&db.db)?)?,
		Commands::Prompts { limit, db } => print_prompts(&Store::open(&db.db)?, limit)?,
		Commands::Models(db) => print_models(&Store::open(&db.db)?)?,
	}
	Ok(())
}

async fn run(args: RunArgs) -> Result<()> {
	let mut config = TrackerConfig::load(args.config.as_deref()).await?;
	if let Some(n) = args.concurrency {
		config.concurrency = n;
	}
	let models = config.resolve_models(&args.models)?;
	let prompts = load_prompts(&args.prompts).await?;
	let targets = load_targets(&args.targets).await?;

	let evaluator = Evaluator::from_config(&config, models)?;
	let timestamp = run_timestamp();
	let records = evaluator
		.evaluate_specs(&prompts, &targets, &args.api_key, Some(timestamp.clone()))
		.await?;

	for record in &records {
		println!("\n{} ({})", record.model, record.provider);
		println!("{}", format_console_table(record));
	}

	let log = RunLog::open(&args.logs_dir)?;
	for record in &records {
		log.write_record(record)?;
	}
	let blocks = log_blocks(&records);
	log.append_main_log(&timestamp, &blocks)?;
	let summary = log.write_summary(&timestamp, &blocks)?;
	info!(summary = %summary.display(), "run logs written");

	if let Some(path) = args.db {
		let rows = Store::open(&path)?.save_records(&records)?;
		info!(rows, db = %path.display(), "saved to store");
	}

	if let Some(path) = args.json_out {
		let json = serde_json::to_string_pretty(&records)?;
		tokio::fs::write(&path, json)
			.await
			.with_context(|| format!("Failed to write {:?}", path))?;
	}

	Ok(())
}

/// Markdown sections for `main_log.md` and `last_summary.md`, one table per model.
fn log_blocks(records: &[EvaluationRecord]) -> Vec<String> {
	records.iter().map(format_provider_table).collect()
}

fn print_summary(store: &Store) -> Result<()> {
	let summary = store.summary()?;
	println!("Prompts tracked:       {}", summary.total_prompts);
	println!("Runs recorded:         {}", summary.total_runs);
	println!("Average citation rate: {:.1}%", summary.avg_citation_rate);
	if let (Some(model), Some(rate)) = (&summary.top_model, summary.top_model_rate) {
		println!("Top model:             {model} ({rate:.1}%)");
	}
	println!();
	print_models(store)
}

fn print_prompts(store: &Store, limit: usize) -> Result<()> {
	println!("{:>6}  {:>5}  {:>7}  {:>8}  {:>6}  Prompt", "Score", "Runs", "Rate", "AvgRank", "Rank1");
	for p in store.prompt_stats()?.into_iter().take(limit) {
		println!(
			"{:>6.3}  {:>5}  {:>6.1}%  {:>8}  {:>5.1}%  {}",
			p.score,
			p.total_runs,
			p.citation_rate,
			rank_cell(p.avg_rank),
			p.rank1_rate,
			p.prompt
		);
	}
	Ok(())
}

fn print_models(store: &Store) -> Result<()> {
	println!("{:>5}  {:>5}  {:>7}  {:>8}  Model", "Runs", "Cited", "Rate", "AvgRank");
	for m in store.model_stats()? {
		println!(
			"{:>5}  {:>5}  {:>6.1}%  {:>8}  {}",
			m.runs,
			m.cited,
			m.citation_rate,
			rank_cell(m.avg_rank),
			m.model
		);
	}
	Ok(())
}

fn rank_cell(rank: Option<f64>) -> String {
	rank.map(|r| format!("{r:.2}")).unwrap_or_else(|| "-".to_string())
}
