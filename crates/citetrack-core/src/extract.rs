use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use citetrack_types::{DomainRank, DomainUrls};

use crate::normalize::{normalize_domain, normalize_url};

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://[^\s)\]]+").unwrap());

/// `(domain, rank)` for every result item carrying a domain.
///
/// Rank is the 1-based position in `results`, so skipped items still use up a
/// rank. Duplicates are kept.
pub fn collect_domains(parsed: &Map<String, Value>) -> Vec<DomainRank> {
	result_items(parsed)
		.filter_map(|(rank, item)| {
			let domain = normalize_domain(&text_of(item.get("domain")?));
			(!domain.is_empty()).then(|| DomainRank::new(domain, rank))
		})
		.collect()
}

/// URLs found in each item's `comment`, bucketed by the item's domain.
pub fn collect_domain_urls(parsed: &Map<String, Value>) -> DomainUrls {
	let mut domain_urls = DomainUrls::new();
	for (_, item) in result_items(parsed) {
		let domain = normalize_domain(&item.get("domain").map(text_of).unwrap_or_default());
		if domain.is_empty() {
			continue;
		}
		let urls = extract_urls(&item.get("comment").map(text_of).unwrap_or_default());
		if urls.is_empty() {
			continue;
		}
		let bucket = domain_urls.entry(domain).or_default();
		for url in urls {
			if !bucket.contains(&url) {
				bucket.push(url);
			}
		}
	}
	domain_urls
}

/// Normalized, de-duplicated URLs in `text`, in order of appearance.
pub fn extract_urls(text: &str) -> Vec<String> {
	let mut urls: Vec<String> = Vec::new();
	for m in URL_PATTERN.find_iter(text) {
		let normalized = normalize_url(m.as_str());
		if !normalized.is_empty() && !urls.contains(&normalized) {
			urls.push(normalized);
		}
	}
	urls
}

// Object items of `results` with their 1-based position. Non-objects are
// dropped but still occupy a position.
fn result_items(parsed: &Map<String, Value>) -> impl Iterator<Item = (usize, &Map<String, Value>)> {
	parsed
		.get("results")
		.and_then(Value::as_array)
		.into_iter()
		.flatten()
		.enumerate()
		.filter_map(|(idx, item)| item.as_object().map(|obj| (idx + 1, obj)))
}

fn text_of(v: &Value) -> String {
	match v {
		Value::String(s) => s.clone(),
		Value::Null => String::new(),
		other => other.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn obj(v: Value) -> Map<String, Value> {
		v.as_object().cloned().unwrap()
	}

	#[test]
	fn ranks_follow_position_and_keep_duplicates() {
		let parsed = obj(json!({"results": [{"domain": "A.com"}, {"domain": "b.com"}, {"domain": "a.com"}]}));
		assert_eq!(
			collect_domains(&parsed),
			vec![DomainRank::new("a.com", 1), DomainRank::new("b.com", 2), DomainRank::new("a.com", 3)]
		);
	}

	#[test]
	fn items_without_domain_are_skipped_but_ranked() {
		let parsed = obj(json!({"results": [
			{"agency": "No domain"},
			"not an object",
			{"domain": ""},
			{"domain": "https://www.Acme.com/"}
		]}));
		assert_eq!(collect_domains(&parsed), vec![DomainRank::new("acme.com", 4)]);
	}

	#[test]
	fn missing_or_malformed_results() {
		assert!(collect_domains(&Map::new()).is_empty());
		assert!(collect_domains(&obj(json!({"results": "acme.com"}))).is_empty());
		assert!(collect_domain_urls(&obj(json!({"results": {"domain": "acme.com"}}))).is_empty());
	}

	#[test]
	fn urls_are_bucketed_and_deduplicated() {
		let parsed = obj(json!({"results": [
			{"domain": "acme.com", "comment": "See https://acme.com/pricing and (https://www.acme.com/pricing/)."},
			{"domain": "other.org", "comment": "no links"},
			{"domain": "ACME.com", "comment": "Also [https://acme.com/blog] http://acme.com/pricing"}
		]}));
		let urls = collect_domain_urls(&parsed);
		assert_eq!(urls.len(), 1);
		assert_eq!(
			urls["acme.com"],
			vec![
				"https://acme.com/pricing".to_string(),
				"https://acme.com/blog".to_string(),
				"http://acme.com/pricing".to_string(),
			]
		);
	}

	#[test]
	fn bucket_order_is_first_seen() {
		let parsed = obj(json!({"results": [
			{"domain": "zeta.io", "comment": "https://zeta.io/a"},
			{"domain": "alpha.io", "comment": "https://alpha.io/b"}
		]}));
		let urls = collect_domain_urls(&parsed);
		let keys: Vec<&String> = urls.keys().collect();
		assert_eq!(keys, vec!["zeta.io", "alpha.io"]);
	}

	#[test]
	fn extract_urls_stops_at_brackets_and_whitespace() {
		assert_eq!(
			extract_urls("links: https://a.com/x) http://b.com/y]z https://a.com/x"),
			vec!["https://a.com/x".to_string(), "http://b.com/y".to_string()]
		);
		assert!(extract_urls("").is_empty());
	}
}
