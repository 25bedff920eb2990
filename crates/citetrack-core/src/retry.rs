use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::ModelConfig;
use crate::parser::extract_json;
use crate::provider::ChatProvider;

pub const MAX_ATTEMPTS: usize = 2;
pub const RETRY_DELAY: Duration = Duration::from_secs(8);

/// Fixed-count, fixed-delay retry. No backoff, no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	pub max_attempts: usize,
	pub delay: Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self { max_attempts: MAX_ATTEMPTS, delay: RETRY_DELAY }
	}
}

impl RetryPolicy {
	pub fn immediate(max_attempts: usize) -> Self {
		Self { max_attempts, delay: Duration::ZERO }
	}
}

/// What one (model, prompt) pair got back from the provider.
#[derive(Debug, Clone)]
pub struct ProviderReply {
	/// Assistant text, or the last error body/message when every attempt failed.
	pub raw: String,
	pub parsed: Map<String, Value>,
	pub json_valid: bool,
	pub attempts: usize,
	pub error: Option<String>,
}

/// Call the provider until it yields a non-empty JSON object or attempts run out.
///
/// Provider errors are retried after `policy.delay`; output that parses to
/// nothing is returned as-is without a retry. Never fails: the caller gets an
/// empty `parsed` object instead.
pub async fn perform_request(
	provider: &dyn ChatProvider,
	api_key: &str,
	model: &ModelConfig,
	prompt: &str,
	policy: RetryPolicy,
) -> ProviderReply {
	let max_attempts = policy.max_attempts.max(1);
	let mut last_raw = String::new();
	let mut last_error = None;
	let mut attempts = 0;

	while attempts < max_attempts {
		attempts += 1;
		match provider.complete(api_key, model, prompt).await {
			Ok(raw) => {
				let outcome = extract_json(&raw);
				if outcome.has_content() {
					let (parsed, json_valid) = outcome.into_parts();
					return ProviderReply { raw, parsed, json_valid, attempts, error: None };
				}
				debug!(model = %model.model, "model output held no JSON object");
				last_raw = raw;
				last_error = None;
				break;
			}
			Err(err) => {
				last_raw = err.raw_text();
				last_error = Some(err.to_string());
				if attempts < max_attempts {
					warn!(
						model = %model.model,
						attempt = attempts,
						rate_limited = err.is_rate_limited(),
						error = %err,
						"provider call failed, retrying in {:?}",
						policy.delay
					);
					tokio::time::sleep(policy.delay).await;
				} else {
					warn!(model = %model.model, attempts, error = %err, "provider call failed, giving up");
				}
			}
		}
	}

	ProviderReply {
		raw: last_raw,
		parsed: Map::new(),
		json_valid: false,
		attempts,
		error: last_error,
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Arc;

	use super::*;
	use crate::error::ProviderError;
	use crate::provider::provider_fn;

	const ANSWER: &str = r#"{"query":"q","results":[{"agency":"Acme","domain":"acme.com","comment":""}]}"#;

	fn flaky(failures: usize, err: fn() -> ProviderError) -> (Arc<dyn ChatProvider>, Arc<AtomicUsize>) {
		let calls = Arc::new(AtomicUsize::new(0));
		let counter = calls.clone();
		let provider = provider_fn(move |_, _, _| {
			let n = counter.fetch_add(1, Ordering::SeqCst);
			let out = if n < failures { Err(err()) } else { Ok(ANSWER.to_string()) };
			async move { out }
		});
		(provider, calls)
	}

	fn rate_limited() -> ProviderError {
		ProviderError::Http { status: 429, body: "rate limited".into() }
	}

	#[tokio::test]
	async fn success_on_first_attempt() {
		let (provider, calls) = flaky(0, rate_limited);
		let reply = perform_request(provider.as_ref(), "k", &ModelConfig::new("m"), "q", RetryPolicy::immediate(2)).await;
		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert!(reply.json_valid);
		assert_eq!(reply.raw, ANSWER);
		assert!(reply.error.is_none());
	}

	#[tokio::test]
	async fn rate_limit_then_success_matches_immediate_success() {
		let (direct, _) = flaky(0, rate_limited);
		let (retried, calls) = flaky(1, rate_limited);
		let model = ModelConfig::new("m");

		let a = perform_request(direct.as_ref(), "k", &model, "q", RetryPolicy::immediate(2)).await;
		let b = perform_request(retried.as_ref(), "k", &model, "q", RetryPolicy::immediate(2)).await;

		assert_eq!(calls.load(Ordering::SeqCst), 2);
		assert_eq!(b.attempts, 2);
		assert_eq!(a.raw, b.raw);
		assert_eq!(a.parsed, b.parsed);
		assert_eq!(a.json_valid, b.json_valid);
	}

	#[tokio::test]
	async fn network_errors_are_retried_once() {
		let (provider, calls) = flaky(5, || ProviderError::Network("connection reset".into()));
		let reply = perform_request(provider.as_ref(), "k", &ModelConfig::new("m"), "q", RetryPolicy::immediate(2)).await;
		assert_eq!(calls.load(Ordering::SeqCst), 2);
		assert!(reply.parsed.is_empty());
		assert!(!reply.json_valid);
		assert_eq!(reply.raw, "Network error: connection reset");
		assert!(reply.error.is_some());
	}

	#[tokio::test]
	async fn exhausted_http_error_keeps_body_as_raw() {
		let (provider, calls) = flaky(5, || ProviderError::Http { status: 500, body: "upstream down".into() });
		let reply = perform_request(provider.as_ref(), "k", &ModelConfig::new("m"), "q", RetryPolicy::immediate(2)).await;
		assert_eq!(calls.load(Ordering::SeqCst), 2);
		assert_eq!(reply.raw, "upstream down");
		assert!(reply.error.unwrap().contains("500"));
	}

	#[tokio::test]
	async fn unparseable_output_is_not_retried() {
		let calls = Arc::new(AtomicUsize::new(0));
		let counter = calls.clone();
		let provider = provider_fn(move |_, _, _| {
			counter.fetch_add(1, Ordering::SeqCst);
			async { Ok("Sorry, I can't help with that.".to_string()) }
		});
		let reply = perform_request(provider.as_ref(), "k", &ModelConfig::new("m"), "q", RetryPolicy::immediate(2)).await;
		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert_eq!(reply.raw, "Sorry, I can't help with that.");
		assert!(reply.parsed.is_empty());
		assert!(!reply.json_valid);
		assert!(reply.error.is_none());
	}

	#[tokio::test]
	async fn recovered_json_is_success_but_not_valid() {
		let provider = provider_fn(|_, _, _| async { Ok(format!("Sure!\n```json\n{ANSWER}\n```")) });
		let reply = perform_request(provider.as_ref(), "k", &ModelConfig::new("m"), "q", RetryPolicy::default()).await;
		assert_eq!(reply.attempts, 1);
		assert!(!reply.json_valid);
		assert_eq!(reply.parsed["query"], "q");
	}
}
