use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tabled::Tabled;

/// Canonical domain to the de-duplicated URLs cited for it, in first-seen order.
pub type DomainUrls = IndexMap<String, Vec<String>>;

/// A cited domain and its 1-based position in the model's `results` array.
///
/// Serialized as a `[domain, rank]` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRank(pub String, pub usize);

impl DomainRank {
	pub fn new(domain: impl Into<String>, rank: usize) -> Self {
		Self(domain.into(), rank)
	}

	pub fn domain(&self) -> &str {
		&self.0
	}

	pub fn rank(&self) -> usize {
		self.1
	}
}

/// Reconciliation of one tracked domain that the model cited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchEntry {
	pub domain: String,
	#[serde(default)]
	pub ranks: Vec<usize>,
	/// Path-specific targets tracked under this domain.
	#[serde(default)]
	pub target_urls: Vec<String>,
	/// Cited URLs equal (ignoring scheme) to a target URL, or every cited URL
	/// when the domain is tracked without paths.
	#[serde(default)]
	pub matched_urls: Vec<String>,
	/// Every URL under this domain the model's comments surfaced.
	#[serde(default)]
	pub cited_urls: Vec<String>,
}

impl MatchEntry {
	pub fn new(domain: impl Into<String>) -> Self {
		Self { domain: domain.into(), ..Self::default() }
	}

	pub fn best_rank(&self) -> Option<usize> {
		self.ranks.iter().copied().min()
	}
}

/// Outcome of one (model, prompt) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
	pub prompt: String,
	#[serde(default)]
	pub raw: String,
	#[serde(default)]
	pub parsed: Map<String, Value>,
	/// `true` when the raw text parsed as JSON as-is, `false` when it was
	/// recovered from surrounding prose or could not be parsed at all.
	#[serde(default)]
	pub json_valid: bool,
	#[serde(default)]
	pub domains: Vec<String>,
	#[serde(default)]
	pub domain_ranks: Vec<DomainRank>,
	#[serde(default)]
	pub matches: Vec<MatchEntry>,
	#[serde(default)]
	pub domain_urls: DomainUrls,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub error: Option<String>,
}

impl EvaluationResult {
	/// Result for a pair whose provider call never produced usable output.
	pub fn degraded(prompt: impl Into<String>, raw: impl Into<String>, error: Option<String>) -> Self {
		Self {
			prompt: prompt.into(),
			raw: raw.into(),
			parsed: Map::new(),
			json_valid: false,
			domains: Vec::new(),
			domain_ranks: Vec::new(),
			matches: Vec::new(),
			domain_urls: DomainUrls::new(),
			error,
		}
	}

	pub fn is_cited(&self) -> bool {
		!self.matches.is_empty()
	}

	/// First rank of the first matched domain, the figure the stats store keeps.
	pub fn first_rank(&self) -> Option<usize> {
		self.matches.first().and_then(|m| m.ranks.first().copied())
	}
}

/// All prompt results for one model in one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRecord {
	pub timestamp: String,
	pub provider: String,
	/// Display label of the model, not necessarily the provider slug.
	pub model: String,
	#[serde(default)]
	pub results: Vec<EvaluationResult>,
}

#[derive(Debug, Clone, Tabled)]
struct SummaryRow {
	prompt: String,
	cited: String,
	rank: String,
	domains: String,
	json: String,
}

impl EvaluationRecord {
	pub fn cited_count(&self) -> usize {
		self.results.iter().filter(|r| r.is_cited()).count()
	}

	pub fn citation_rate(&self) -> f64 {
		if self.results.is_empty() {
			0.0
		} else {
			self.cited_count() as f64 / self.results.len() as f64
		}
	}

	pub fn summary_table(&self) -> String {
		use tabled::Table;
		let rows: Vec<SummaryRow> = self.results.iter().map(|r| {
			let cited = if r.is_cited() { "✓" } else { " " };
			let rank = r.first_rank().map(|n| n.to_string()).unwrap_or_else(|| "-".to_string());
			let domains = r.matches.iter().map(|m| m.domain.as_str()).collect::<Vec<_>>().join(", ");
			let json = if r.json_valid {
				"direct"
			} else if r.parsed.is_empty() {
				"none"
			} else {
				"recovered"
			};

			SummaryRow {
				prompt: truncate(r.prompt.clone(), 64),
				cited: cited.to_string(),
				rank,
				domains: truncate(domains, 48),
				json: json.to_string(),
			}
		}).collect();

		let table = Table::new(rows);
		let table_str = table.to_string();

		let summary_text = format!(
			"Provider: {}  Model: {}  Prompts: {}  Cited: {}  Citation rate: {:.1}%",
			self.provider,
			self.model,
			self.results.len(),
			self.cited_count(),
			self.citation_rate() * 100.0
		);

		format!("{}\n\n{}\n", table_str, summary_text)
	}
}

fn truncate(s: String, max_len: usize) -> String {
	if s.chars().count() <= max_len {
		return s;
	}
	let mut truncated = s.chars().take(max_len.saturating_sub(1)).collect::<String>();
	truncated.push('…');
	truncated
}
