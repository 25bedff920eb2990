//! Canonical forms for domains and URLs.
//!
//! Every comparison downstream is plain string equality on these forms, so
//! scheme, case, `www.` and trailing-slash drift must all be resolved here.

use url::{Host, Url};

/// Lowercase, drop a leading `http://`/`https://` and `www.`, drop trailing `/`.
/// Internationalized hosts come out in punycode, the form `url::Url` yields.
///
/// Blank input yields an empty string.
pub fn normalize_domain(raw: &str) -> String {
	let cleaned = raw.trim().to_lowercase();
	let cleaned = strip_scheme(&cleaned);
	let cleaned = cleaned.strip_prefix("www.").unwrap_or(cleaned);
	ascii_host(cleaned.trim_end_matches('/'))
}

/// Rebuild `raw` as `scheme://domain[:port][path][?query][#fragment]`.
///
/// Scheme-less input is read as `https://`. Returns an empty string when no
/// host can be found.
pub fn normalize_url(raw: &str) -> String {
	let Some(parsed) = parse_lenient(raw) else {
		return String::new();
	};
	let Some(authority) = authority(&parsed) else {
		return String::new();
	};

	let domain = normalize_domain(&authority);
	if domain.is_empty() {
		return String::new();
	}

	let mut normalized = format!("{}://{}", parsed.scheme(), domain);
	normalized.push_str(parsed.path().trim_end_matches('/'));
	if let Some(query) = parsed.query().filter(|q| !q.is_empty()) {
		normalized.push('?');
		normalized.push_str(query);
	}
	if let Some(fragment) = parsed.fragment().filter(|f| !f.is_empty()) {
		normalized.push('#');
		normalized.push_str(fragment);
	}
	normalized
}

/// Canonical domain (host plus explicit port) of a URL or bare domain.
pub fn domain_from_url(raw: &str) -> String {
	parse_lenient(raw)
		.as_ref()
		.and_then(authority)
		.map(|a| normalize_domain(&a))
		.unwrap_or_default()
}

/// Remove a leading `http://` or `https://`, nothing else.
pub fn strip_scheme(url: &str) -> &str {
	url.strip_prefix("https://")
		.or_else(|| url.strip_prefix("http://"))
		.unwrap_or(url)
}

// Non-ASCII host labels go through IDNA; a port or path suffix is kept as is.
fn ascii_host(domain: &str) -> String {
	if domain.is_ascii() {
		return domain.to_string();
	}
	let end = domain.find(|c| c == ':' || c == '/').unwrap_or(domain.len());
	let (host, rest) = domain.split_at(end);
	match Host::parse(host) {
		Ok(Host::Domain(ascii)) => format!("{ascii}{rest}"),
		_ => domain.to_string(),
	}
}

fn parse_lenient(raw: &str) -> Option<Url> {
	let cleaned = raw.trim();
	if cleaned.is_empty() {
		return None;
	}
	if has_scheme(cleaned) {
		Url::parse(cleaned).ok()
	} else {
		Url::parse(&format!("https://{cleaned}")).ok()
	}
}

fn has_scheme(s: &str) -> bool {
	match s.find("://") {
		Some(idx) if idx > 0 => s[..idx]
			.chars()
			.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')),
		_ => false,
	}
}

fn authority(url: &Url) -> Option<String> {
	let host = url.host_str().filter(|h| !h.is_empty())?;
	Some(match url.port() {
		Some(port) => format!("{host}:{port}"),
		None => host.to_string(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn domain_is_case_insensitive_and_idempotent() {
		let once = normalize_domain("WWW.Example.com/");
		assert_eq!(once, "example.com");
		assert_eq!(normalize_domain("example.com"), once);
		assert_eq!(normalize_domain(&once), once);
	}

	#[test]
	fn domain_strips_scheme_and_blank_is_empty() {
		assert_eq!(normalize_domain("https://www.acme.com"), "acme.com");
		assert_eq!(normalize_domain("http://acme.com//"), "acme.com");
		assert_eq!(normalize_domain("   "), "");
		assert_eq!(normalize_domain(""), "");
	}

	#[test]
	fn url_defaults_scheme_and_drops_root_path() {
		assert_eq!(normalize_url("acme.com"), "https://acme.com");
		assert_eq!(normalize_url("https://www.Acme.com/"), "https://acme.com");
		assert_eq!(normalize_url("http://acme.com/Docs/"), "http://acme.com/Docs");
		assert_eq!(
			normalize_url("acme.com/pricing?plan=pro#faq"),
			"https://acme.com/pricing?plan=pro#faq"
		);
	}

	#[test]
	fn url_keeps_explicit_port() {
		assert_eq!(normalize_url("http://localhost:8080/x"), "http://localhost:8080/x");
		assert_eq!(domain_from_url("localhost:8080/x"), "localhost:8080");
	}

	#[test]
	fn url_without_host_is_empty() {
		assert_eq!(normalize_url(""), "");
		assert_eq!(normalize_url("   "), "");
		assert_eq!(normalize_url("not a url ::"), "");
		assert_eq!(normalize_url("https://"), "");
	}

	#[test]
	fn url_with_only_www_host_is_empty() {
		assert_eq!(normalize_url("https://www./x"), "");
		assert_eq!(normalize_url("www./x"), "");
		assert_eq!(domain_from_url("https://www./x"), "");
	}

	#[test]
	fn idn_domain_matches_url_host() {
		assert_eq!(normalize_domain("MÜNCHEN.de"), "xn--mnchen-3ya.de");
		assert_eq!(normalize_domain("https://www.münchen.de/"), "xn--mnchen-3ya.de");
		assert_eq!(normalize_domain("münchen.de:8080"), "xn--mnchen-3ya.de:8080");
		assert_eq!(domain_from_url("münchen.de/karte"), normalize_domain("münchen.de"));
		assert_eq!(normalize_url("https://münchen.de/karte"), "https://xn--mnchen-3ya.de/karte");
		assert_eq!(normalize_domain("xn--mnchen-3ya.de"), "xn--mnchen-3ya.de");
	}

	#[test]
	fn url_normalization_is_idempotent() {
		for raw in [
			"acme.com",
			"HTTPS://WWW.ACME.COM/a/b/",
			"http://acme.com/path?q=1#top",
			"acme.com/a%20b",
			"https://sub.acme.co.uk/x/?",
		] {
			let once = normalize_url(raw);
			assert!(!once.is_empty(), "{raw}");
			assert_eq!(normalize_url(&once), once, "{raw}");
		}
	}

	#[test]
	fn domain_from_url_extracts_host() {
		assert_eq!(domain_from_url("https://www.acme.com/pricing"), "acme.com");
		assert_eq!(domain_from_url("Acme.com/docs"), "acme.com");
		assert_eq!(domain_from_url("not a url ::"), "");
	}

	#[test]
	fn strip_scheme_only_touches_http_prefixes() {
		assert_eq!(strip_scheme("https://acme.com/x"), "acme.com/x");
		assert_eq!(strip_scheme("http://acme.com"), "acme.com");
		assert_eq!(strip_scheme("ftp://acme.com"), "ftp://acme.com");
	}
}
