//! citetrack-core: check whether search-enabled models cite your web properties.
//! Normalize targets, ask each model every prompt, recover its JSON answer and
//! match the cited domains and URLs against what you track.
//! See `examples/offline.rs` for a quickstart.

pub mod config;
pub mod datasource;
pub mod error;
pub mod extract;
pub mod matcher;
pub mod normalize;
pub mod parser;
pub mod provider;
pub mod report;
pub mod retry;
pub mod runner;
pub mod target;
pub mod testing;

#[cfg(feature = "persistence")]
pub use citetrack_store as store;

pub use citetrack_types::{DomainRank, DomainUrls, EvaluationRecord, EvaluationResult, MatchEntry};
pub use config::{ModelConfig, TrackerConfig};
pub use datasource::{load_prompts, load_targets};
pub use error::{EvalError, ProviderError};
pub use extract::{collect_domain_urls, collect_domains};
pub use matcher::match_targets;
pub use normalize::{domain_from_url, normalize_domain, normalize_url, strip_scheme};
pub use parser::{extract_json, ParseOutcome};
pub use provider::{provider_fn, ChatProvider, OpenRouterClient};
pub use report::{format_console_table, format_provider_block, format_provider_table};
pub use retry::{perform_request, ProviderReply, RetryPolicy};
pub use runner::{Evaluator, EvaluatorBuilder};
pub use target::{resolve_targets, TargetIndex, TargetSpec};
