use std::collections::HashSet;

use indexmap::IndexMap;

use citetrack_types::{DomainRank, DomainUrls, MatchEntry};

use crate::normalize::strip_scheme;
use crate::target::{TargetIndex, TargetSpec};

/// Reconcile cited domains and URLs against the tracked targets.
pub fn match_targets(domain_ranks: &[DomainRank], targets: &[TargetSpec], domain_urls: &DomainUrls) -> Vec<MatchEntry> {
	let index = TargetIndex::build(targets);
	match_index(domain_ranks, &index, domain_urls)
}

/// Same as [`match_targets`] against an index built once per run.
///
/// One entry per tracked domain, in the order domains were first cited.
pub fn match_index(domain_ranks: &[DomainRank], index: &TargetIndex<'_>, domain_urls: &DomainUrls) -> Vec<MatchEntry> {
	// Ranks first.
	let mut entries: IndexMap<&str, MatchEntry> = IndexMap::new();
	for dr in domain_ranks {
		if !index.contains(dr.domain()) {
			continue;
		}
		entries
			.entry(dr.domain())
			.or_insert_with(|| MatchEntry::new(dr.domain()))
			.ranks
			.push(dr.rank());
	}

	// Then URLs.
	entries
		.into_values()
		.map(|mut entry| {
			let target_urls = path_targets(index.get(&entry.domain));
			let cited_urls = domain_urls.get(&entry.domain).cloned().unwrap_or_default();
			entry.matched_urls = if target_urls.is_empty() {
				cited_urls.clone()
			} else {
				let wanted: HashSet<&str> = target_urls.iter().map(|u| strip_scheme(u)).collect();
				cited_urls
					.iter()
					.filter(|u| wanted.contains(strip_scheme(u)))
					.cloned()
					.collect()
			};
			entry.target_urls = target_urls;
			entry.cited_urls = cited_urls;
			entry
		})
		.collect()
}

fn path_targets(specs: &[&TargetSpec]) -> Vec<String> {
	let mut urls: Vec<String> = Vec::new();
	for spec in specs {
		if spec.has_path && !spec.url.is_empty() && !urls.contains(&spec.url) {
			urls.push(spec.url.clone());
		}
	}
	urls
}
