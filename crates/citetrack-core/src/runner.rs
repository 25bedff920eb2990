use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use citetrack_types::{EvaluationRecord, EvaluationResult};

use crate::config::{ModelConfig, TrackerConfig};
use crate::error::{EvalError, Result};
use crate::extract::{collect_domain_urls, collect_domains};
use crate::matcher::match_index;
use crate::provider::{ChatProvider, OpenRouterClient};
use crate::retry::{perform_request, RetryPolicy};
use crate::target::{resolve_targets, TargetIndex, TargetSpec};

pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

pub fn run_timestamp() -> String {
	Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

pub struct EvaluatorBuilder {
	provider: Option<Arc<dyn ChatProvider>>,
	models: Vec<ModelConfig>,
	retry: RetryPolicy,
	concurrency: usize,
}

impl EvaluatorBuilder {
	pub fn new() -> Self {
		Self {
			provider: None,
			models: Vec::new(),
			retry: RetryPolicy::default(),
			concurrency: 4,
		}
	}

	pub fn provider(mut self, provider: Arc<dyn ChatProvider>) -> Self {
		self.provider = Some(provider);
		self
	}

	pub fn models<I>(mut self, models: I) -> Self
	where
		I: IntoIterator<Item = ModelConfig>,
	{
		self.models = models.into_iter().collect();
		self
	}

	pub fn add_model(mut self, model: ModelConfig) -> Self {
		self.models.push(model);
		self
	}

	pub fn retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;
		self
	}

	/// Maximum (model, prompt) pairs in flight. 1 runs them strictly in order.
	pub fn concurrency(mut self, n: usize) -> Self {
		self.concurrency = n.max(1);
		self
	}

	pub fn build(self) -> Result<Evaluator> {
		Ok(Evaluator {
			provider: self.provider.ok_or_else(|| EvalError::Config("provider must be set".into()))?,
			models: self.models,
			retry: self.retry,
			concurrency: self.concurrency,
		})
	}
}

impl Default for EvaluatorBuilder {
	fn default() -> Self {
		Self::new()
	}
}

pub struct Evaluator {
	provider: Arc<dyn ChatProvider>,
	models: Vec<ModelConfig>,
	retry: RetryPolicy,
	concurrency: usize,
}

impl Evaluator {
	pub fn builder() -> EvaluatorBuilder {
		EvaluatorBuilder::new()
	}

	/// OpenRouter-backed evaluator using `models`, with timeout, retry and
	/// concurrency taken from `config`.
	pub fn from_config(config: &TrackerConfig, models: Vec<ModelConfig>) -> Result<Self> {
		let client = OpenRouterClient::with_endpoint(config.endpoint.clone(), config.timeout())
			.map_err(|e| EvalError::Config(e.to_string()))?;
		Self::builder()
			.provider(Arc::new(client))
			.models(models)
			.retry(config.retry_policy())
			.concurrency(config.concurrency)
			.build()
	}

	pub fn models(&self) -> &[ModelConfig] {
		&self.models
	}

	/// Evaluate every prompt against every model; raw targets without a host
	/// are dropped.
	pub async fn evaluate<P, T>(
		&self,
		prompts: &[P],
		targets: &[T],
		api_key: &str,
		timestamp: Option<String>,
	) -> Result<Vec<EvaluationRecord>>
	where
		P: AsRef<str> + Sync,
		T: AsRef<str>,
	{
		let specs = resolve_targets(targets);
		self.evaluate_specs(prompts, &specs, api_key, timestamp).await
	}

	/// One record per model, in model order, each holding one result per
	/// prompt in prompt order regardless of completion order.
	pub async fn evaluate_specs<P>(
		&self,
		prompts: &[P],
		targets: &[TargetSpec],
		api_key: &str,
		timestamp: Option<String>,
	) -> Result<Vec<EvaluationRecord>>
	where
		P: AsRef<str> + Sync,
	{
		if prompts.is_empty() {
			return Err(EvalError::NoPrompts);
		}
		if api_key.trim().is_empty() {
			return Err(EvalError::MissingApiKey);
		}
		if self.models.is_empty() {
			return Err(EvalError::NoModels);
		}

		let timestamp = timestamp.unwrap_or_else(run_timestamp);
		let index = TargetIndex::build(targets);
		info!(
			%timestamp,
			models = self.models.len(),
			prompts = prompts.len(),
			targets = targets.len(),
			concurrency = self.concurrency,
			"starting evaluation run"
		);

		let mut slots: Vec<Vec<Option<EvaluationResult>>> = vec![vec![None; prompts.len()]; self.models.len()];

		let pairs = self.models.iter().enumerate().flat_map(|(m, model)| {
			prompts.iter().enumerate().map(move |(p, prompt)| (m, p, model, prompt.as_ref()))
		});
		let index = &index;
		let mut completed = stream::iter(pairs)
			.map(|(m, p, model, prompt)| async move {
				(m, p, self.evaluate_pair(model, prompt, api_key, index).await)
			})
			.buffer_unordered(self.concurrency);

		while let Some((m, p, result)) = completed.next().await {
			slots[m][p] = Some(result);
		}
		drop(completed);

		let records: Vec<EvaluationRecord> = self
			.models
			.iter()
			.zip(slots)
			.map(|(model, results)| EvaluationRecord {
				timestamp: timestamp.clone(),
				provider: model.provider.clone(),
				model: model.label().to_string(),
				results: results.into_iter().flatten().collect(),
			})
			.collect();

		let cited: usize = records.iter().map(|r| r.cited_count()).sum();
		info!(%timestamp, cited, total = self.models.len() * prompts.len(), "evaluation run finished");
		Ok(records)
	}

	async fn evaluate_pair(
		&self,
		model: &ModelConfig,
		prompt: &str,
		api_key: &str,
		index: &TargetIndex<'_>,
	) -> EvaluationResult {
		let reply = perform_request(self.provider.as_ref(), api_key, model, prompt, self.retry).await;
		if let Some(err) = &reply.error {
			warn!(model = %model.model, prompt, error = %err, "no usable answer, recording empty result");
			return EvaluationResult::degraded(prompt, reply.raw, reply.error);
		}

		let domain_ranks = collect_domains(&reply.parsed);
		let domain_urls = collect_domain_urls(&reply.parsed);
		let matches = match_index(&domain_ranks, index, &domain_urls);

		EvaluationResult {
			prompt: prompt.to_string(),
			raw: reply.raw,
			parsed: reply.parsed,
			json_valid: reply.json_valid,
			domains: domain_ranks.iter().map(|dr| dr.domain().to_string()).collect(),
			domain_ranks,
			matches,
			domain_urls,
			error: None,
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::Duration;

	use super::*;
	use crate::error::ProviderError;
	use crate::provider::provider_fn;

	fn answer(domain: &str, comment: &str) -> String {
		serde_json::json!({
			"query": "q",
			"results": [
				{"agency": "Other", "domain": "other.org", "comment": ""},
				{"agency": "Tracked", "domain": domain, "comment": comment}
			]
		})
		.to_string()
	}

	fn fixed(text: String) -> Arc<dyn ChatProvider> {
		provider_fn(move |_, _, _| {
			let text = text.clone();
			async move { Ok(text) }
		})
	}

	fn evaluator(provider: Arc<dyn ChatProvider>, models: &[&str], concurrency: usize) -> Evaluator {
		Evaluator::builder()
			.provider(provider)
			.models(models.iter().map(|m| ModelConfig::new(*m)))
			.retry(RetryPolicy::immediate(2))
			.concurrency(concurrency)
			.build()
			.unwrap()
	}

	#[tokio::test]
	async fn empty_prompts_is_config_error() {
		let eval = evaluator(fixed(answer("acme.com", "")), &["m"], 1);
		let err = eval.evaluate::<String, &str>(&[], &["acme.com"], "key", None).await.unwrap_err();
		assert!(matches!(err, EvalError::NoPrompts));
	}

	#[tokio::test]
	async fn blank_key_and_no_models_are_config_errors() {
		let eval = evaluator(fixed(answer("acme.com", "")), &["m"], 1);
		let err = eval.evaluate(&["q1"], &["acme.com"], "  ", None).await.unwrap_err();
		assert!(matches!(err, EvalError::MissingApiKey));

		let eval = evaluator(fixed(answer("acme.com", "")), &[], 1);
		let err = eval.evaluate(&["q1"], &["acme.com"], "key", None).await.unwrap_err();
		assert!(matches!(err, EvalError::NoModels));
	}

	#[test]
	fn builder_requires_provider() {
		assert!(matches!(Evaluator::builder().build(), Err(EvalError::Config(_))));
	}

	#[tokio::test]
	async fn single_prompt_single_model_finds_match() {
		let eval = evaluator(fixed(answer("www.acme.com", "https://acme.com/pricing")), &["perplexity/sonar:online"], 1);
		let records = eval
			.evaluate(&["q1"], &["acme.com/pricing", "not a url ::"], "key", Some("20240101T000000Z".into()))
			.await
			.unwrap();

		assert_eq!(records.len(), 1);
		let record = &records[0];
		assert_eq!(record.timestamp, "20240101T000000Z");
		assert_eq!(record.provider, "openrouter");
		assert_eq!(record.model, "perplexity/sonar:online");
		assert_eq!(record.results.len(), 1);

		let result = &record.results[0];
		assert_eq!(result.prompt, "q1");
		assert!(result.json_valid);
		assert_eq!(result.domains, vec!["other.org", "acme.com"]);
		assert_eq!(result.matches.len(), 1);
		assert_eq!(result.matches[0].ranks, vec![2]);
		assert_eq!(result.matches[0].matched_urls, vec!["https://acme.com/pricing"]);
	}

	#[tokio::test]
	async fn output_order_matches_input_order_under_concurrency() {
		// Later prompts finish first.
		let provider = provider_fn(|_, model, prompt| {
			let delay = 40u64.saturating_sub(prompt.len() as u64 * 5);
			let text = answer(&format!("{}.com", prompt.len()), &model.model);
			async move {
				tokio::time::sleep(Duration::from_millis(delay)).await;
				Ok(text)
			}
		});
		let prompts: Vec<String> = (1..=5).map(|n| "p".repeat(n)).collect();
		let eval = evaluator(provider, &["m1", "m2", "m3"], 8);
		let records = eval.evaluate(&prompts, &["3.com"], "key", None).await.unwrap();

		assert_eq!(records.len(), 3);
		let ts = &records[0].timestamp;
		for (record, label) in records.iter().zip(["m1", "m2", "m3"]) {
			assert_eq!(&record.timestamp, ts);
			assert_eq!(record.model, label);
			let got: Vec<&str> = record.results.iter().map(|r| r.prompt.as_str()).collect();
			assert_eq!(got, prompts.iter().map(String::as_str).collect::<Vec<_>>());
			assert_eq!(record.cited_count(), 1);
			assert!(record.results[2].is_cited());
		}
	}

	#[tokio::test]
	async fn failing_pair_degrades_without_aborting_others() {
		let calls = Arc::new(AtomicUsize::new(0));
		let counter = calls.clone();
		let provider = provider_fn(move |_, model, _| {
			counter.fetch_add(1, Ordering::SeqCst);
			let out = if model.model == "broken" {
				Err(ProviderError::Http { status: 503, body: "unavailable".into() })
			} else {
				Ok(answer("acme.com", ""))
			};
			async move { out }
		});
		let eval = evaluator(provider, &["broken", "ok"], 2);
		let records = eval.evaluate(&["q1", "q2"], &["acme.com"], "key", None).await.unwrap();

		// Two attempts for each broken pair, one for each healthy pair.
		assert_eq!(calls.load(Ordering::SeqCst), 6);
		assert_eq!(records[0].cited_count(), 0);
		assert_eq!(records[0].results[0].raw, "unavailable");
		assert!(records[0].results[0].error.is_some());
		assert!(records[0].results[0].parsed.is_empty());
		assert_eq!(records[1].cited_count(), 2);
	}

	#[tokio::test]
	async fn malformed_output_is_kept_for_diagnosis() {
		let eval = evaluator(fixed("I could not find anything.".into()), &["m"], 1);
		let records = eval.evaluate(&["q1"], &["acme.com"], "key", None).await.unwrap();
		let result = &records[0].results[0];
		assert_eq!(result.raw, "I could not find anything.");
		assert!(!result.json_valid);
		assert!(result.matches.is_empty());
		assert!(result.error.is_none());
	}

	#[tokio::test]
	async fn label_is_used_for_record_model() {
		let eval = Evaluator::builder()
			.provider(fixed(answer("acme.com", "")))
			.add_model(ModelConfig::new("perplexity/sonar:online").with_label("sonar"))
			.build()
			.unwrap();
		let records = eval.evaluate(&["q"], &["acme.com"], "key", None).await.unwrap();
		assert_eq!(records[0].model, "sonar");
		assert_eq!(records[0].timestamp.len(), "20240101T000000Z".len());
	}
}
