use thiserror::Error;

/// Failure of a single provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
	#[error("HTTP error (status {status}): {body}")]
	Http { status: u16, body: String },

	#[error("Network error: {0}")]
	Network(String),

	#[error("Invalid provider response: {0}")]
	Decode(String),
}

impl ProviderError {
	pub fn status(&self) -> Option<u16> {
		match self {
			ProviderError::Http { status, .. } => Some(*status),
			_ => None,
		}
	}

	pub fn is_rate_limited(&self) -> bool {
		self.status() == Some(429)
	}

	/// Text kept as the pair's raw output once retries are exhausted: the
	/// response body for HTTP errors, the message otherwise.
	pub fn raw_text(&self) -> String {
		match self {
			ProviderError::Http { body, .. } => body.clone(),
			other => other.to_string(),
		}
	}
}

impl From<reqwest::Error> for ProviderError {
	fn from(err: reqwest::Error) -> Self {
		if err.is_decode() {
			ProviderError::Decode(err.to_string())
		} else {
			ProviderError::Network(err.to_string())
		}
	}
}

/// Setup problems that reject a whole evaluation run.
#[derive(Debug, Error)]
pub enum EvalError {
	#[error("an API key is required to call the provider")]
	MissingApiKey,

	#[error("at least one prompt is required to evaluate models")]
	NoPrompts,

	#[error("no models to run; configure at least one model")]
	NoModels,

	#[error("configuration error: {0}")]
	Config(String),
}

pub type Result<T, E = EvalError> = std::result::Result<T, E>;
