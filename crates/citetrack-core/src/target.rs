use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::normalize::{domain_from_url, normalize_url, strip_scheme};

/// One tracked web property: a bare domain or a URL with a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
	/// The string exactly as the caller supplied it.
	pub original: String,
	pub domain: String,
	/// Canonical URL, empty for domain-only targets.
	pub url: String,
	pub has_path: bool,
}

impl TargetSpec {
	/// Returns `None` when `raw` has no discoverable host.
	pub fn parse(raw: &str) -> Option<Self> {
		let domain = domain_from_url(raw);
		if domain.is_empty() {
			return None;
		}
		let normalized = normalize_url(raw);
		let has_path = !normalized.is_empty() && strip_scheme(&normalized) != domain;
		Some(Self {
			original: raw.to_string(),
			domain,
			url: if has_path { normalized } else { String::new() },
			has_path,
		})
	}
}

/// Parse every raw target, dropping the ones without a host.
pub fn resolve_targets<I, S>(raw: I) -> Vec<TargetSpec>
where
	I: IntoIterator<Item = S>,
	S: AsRef<str>,
{
	raw.into_iter()
		.filter_map(|s| TargetSpec::parse(s.as_ref()))
		.collect()
}

/// Target specs grouped by canonical domain, input order kept per bucket.
#[derive(Debug, Default)]
pub struct TargetIndex<'a> {
	buckets: IndexMap<&'a str, Vec<&'a TargetSpec>>,
}

impl<'a> TargetIndex<'a> {
	pub fn build(specs: &'a [TargetSpec]) -> Self {
		let mut buckets: IndexMap<&'a str, Vec<&'a TargetSpec>> = IndexMap::new();
		for spec in specs {
			buckets.entry(spec.domain.as_str()).or_default().push(spec);
		}
		Self { buckets }
	}

	pub fn contains(&self, domain: &str) -> bool {
		self.buckets.contains_key(domain)
	}

	pub fn get(&self, domain: &str) -> &[&'a TargetSpec] {
		self.buckets.get(domain).map(Vec::as_slice).unwrap_or(&[])
	}

	pub fn domains(&self) -> impl Iterator<Item = &'a str> + '_ {
		self.buckets.keys().copied()
	}

	pub fn len(&self) -> usize {
		self.buckets.len()
	}

	pub fn is_empty(&self) -> bool {
		self.buckets.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn host_less_targets_are_rejected() {
		for raw in ["", "   ", "not a url ::"] {
			assert!(TargetSpec::parse(raw).is_none(), "{raw:?}");
		}
	}

	#[test]
	fn path_target_keeps_url() {
		let spec = TargetSpec::parse("example.com/docs").unwrap();
		assert_eq!(spec.domain, "example.com");
		assert!(spec.has_path);
		assert!(spec.url.ends_with("/docs"));
		assert_eq!(spec.original, "example.com/docs");
	}

	#[test]
	fn bare_domain_has_no_url() {
		for raw in ["acme.com", "https://www.Acme.com/", "http://acme.com"] {
			let spec = TargetSpec::parse(raw).unwrap();
			assert_eq!(spec.domain, "acme.com");
			assert!(!spec.has_path, "{raw}");
			assert!(spec.url.is_empty());
		}
	}

	#[test]
	fn query_counts_as_path() {
		let spec = TargetSpec::parse("acme.com?ref=x").unwrap();
		assert!(spec.has_path);
		assert_eq!(spec.url, "https://acme.com?ref=x");
	}

	#[test]
	fn index_groups_by_domain_in_order() {
		let specs = resolve_targets(["acme.com/pricing", "other.org", "", "www.acme.com/blog"]);
		assert_eq!(specs.len(), 3);

		let index = TargetIndex::build(&specs);
		assert_eq!(index.len(), 2);
		assert_eq!(index.domains().collect::<Vec<_>>(), vec!["acme.com", "other.org"]);

		let acme: Vec<&str> = index.get("acme.com").iter().map(|s| s.url.as_str()).collect();
		assert_eq!(acme, vec!["https://acme.com/pricing", "https://acme.com/blog"]);
		assert!(index.get("missing.com").is_empty());
		assert!(!index.contains("missing.com"));
	}
}
