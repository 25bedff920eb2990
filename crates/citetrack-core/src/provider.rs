use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ModelConfig;
use crate::error::ProviderError;

pub const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(45);
pub const TEMPERATURE: f64 = 0.1;

pub const SYSTEM_MESSAGE: &str = concat!(
	"You are doing an evaluation. For the given query, list relevant agencies with domain citations. ",
	"Citations MUST be domain names only (example.com). Do not invent domains. ",
	"If you are unsure about a domain, return \"unknown\" for that domain. ",
	"You MUST output valid JSON only, following this schema: \n\n",
	"{\n",
	"\"query\": \"...\",\n",
	"\"results\": [\n",
	"{\n",
	"\"agency\": \"\",\n",
	"\"domain\": \"\",\n",
	"\"comment\": \"\"\n",
	"}\n",
	"]\n",
	"}\n\n",
	"Do NOT include any conversational text, explanation, or commentary outside JSON.",
);

/// A chat-completion backend. Returns the assistant message verbatim.
#[async_trait]
pub trait ChatProvider: Send + Sync {
	async fn complete(&self, api_key: &str, model: &ModelConfig, prompt: &str) -> Result<String, ProviderError>;
}

/// Wrap an async closure as a `ChatProvider`.
pub fn provider_fn<F, Fut>(f: F) -> Arc<dyn ChatProvider>
where
	F: Send + Sync + 'static + Fn(&str, &ModelConfig, &str) -> Fut,
	Fut: Future<Output = Result<String, ProviderError>> + Send + 'static,
{
	struct ClosureProvider<F> {
		f: F,
	}

	#[async_trait]
	impl<F, Fut> ChatProvider for ClosureProvider<F>
	where
		F: Send + Sync + 'static + Fn(&str, &ModelConfig, &str) -> Fut,
		Fut: Future<Output = Result<String, ProviderError>> + Send + 'static,
	{
		async fn complete(&self, api_key: &str, model: &ModelConfig, prompt: &str) -> Result<String, ProviderError> {
			(self.f)(api_key, model, prompt).await
		}
	}

	Arc::new(ClosureProvider { f })
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage<'a> {
	pub role: &'static str,
	pub content: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
	pub model: &'a str,
	pub messages: Vec<ChatMessage<'a>>,
	pub temperature: f64,
}

impl<'a> ChatRequest<'a> {
	pub fn new(model: &'a str, prompt: &'a str) -> Self {
		Self {
			model,
			messages: vec![
				ChatMessage { role: "system", content: SYSTEM_MESSAGE },
				ChatMessage { role: "user", content: prompt },
			],
			temperature: TEMPERATURE,
		}
	}
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatResponse {
	#[serde(default)]
	choices: Vec<Choice>,
}

#[derive(Debug, Default, Deserialize)]
struct Choice {
	#[serde(default)]
	message: Option<ResponseMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseMessage {
	#[serde(default)]
	content: Option<String>,
}

impl ChatResponse {
	/// First choice's message content, empty when absent.
	pub fn content(self) -> String {
		self.choices
			.into_iter()
			.next()
			.and_then(|c| c.message)
			.and_then(|m| m.content)
			.unwrap_or_default()
	}
}

/// OpenAI-compatible chat-completions client, OpenRouter by default.
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
	http: reqwest::Client,
	endpoint: String,
}

impl OpenRouterClient {
	pub fn new() -> Result<Self, ProviderError> {
		Self::with_endpoint(OPENROUTER_API_URL, DEFAULT_TIMEOUT)
	}

	pub fn with_endpoint(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
		let http = reqwest::Client::builder().timeout(timeout).build()?;
		Ok(Self::with_client(http, endpoint))
	}

	pub fn with_client(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
		Self { http, endpoint: endpoint.into() }
	}

	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}
}

#[async_trait]
impl ChatProvider for OpenRouterClient {
	async fn complete(&self, api_key: &str, model: &ModelConfig, prompt: &str) -> Result<String, ProviderError> {
		debug!(model = %model.model, endpoint = %self.endpoint, "chat completion request");

		let resp = self
			.http
			.post(&self.endpoint)
			.bearer_auth(api_key)
			.json(&ChatRequest::new(&model.model, prompt))
			.send()
			.await?;

		let status = resp.status();
		if !status.is_success() {
			let body = resp.text().await.unwrap_or_default();
			return Err(ProviderError::Http { status: status.as_u16(), body });
		}

		let body: ChatResponse = resp.json().await?;
		Ok(body.content())
	}
}
