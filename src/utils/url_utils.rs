//! URL manipulation utilities.
//!
//! This module provides functions for working with URLs in the context of
//! capturing a site and replaying it from local artifacts.

use anyhow::{Context, Result};
use url::Url;

/// Normalize a URL into the canonical form used as the crawl-queue key.
///
/// Two URLs that normalize identically are the same page for dedup
/// purposes:
/// - fragments are dropped
/// - query pairs are sorted (order-insensitive equality)
/// - default ports (80/443) are removed
/// - host comparison is case-insensitive
/// - a trailing slash on a non-root path is stripped
pub fn normalize_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url).with_context(|| format!("Invalid URL: {url}"))?;

    let scheme = parsed.scheme();
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("URL has no host: {url}"))?
        .to_lowercase();

    let port = match parsed.port() {
        Some(80) if scheme == "http" => None,
        Some(443) if scheme == "https" => None,
        other => other,
    };

    let path = parsed.path().trim_end_matches('/');
    let path = if path.is_empty() { "/" } else { path };

    let mut normalized = match port {
        Some(p) => format!("{scheme}://{host}:{p}{path}"),
        None => format!("{scheme}://{host}{path}"),
    };

    if parsed.query().is_some() {
        let mut pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        pairs.sort();
        if !pairs.is_empty() {
            let query: Vec<String> = pairs
                .iter()
                .map(|(k, v)| {
                    if v.is_empty() {
                        urlencoding::encode(k).into_owned()
                    } else {
                        format!("{}={}", urlencoding::encode(k), urlencoding::encode(v))
                    }
                })
                .collect();
            normalized.push('?');
            normalized.push_str(&query.join("&"));
        }
    }

    Ok(normalized)
}

/// Resolve a potentially relative URL against a base URL
///
/// This function ensures proper percent-encoding of query parameters,
/// fixing issues with URLs from HTML that have unencoded special characters
/// (e.g., font-service URLs with `:`, `,`, `@`, `;` in query strings).
pub fn resolve_url(base_url: &str, url: &str) -> Result<String> {
    let base = Url::parse(base_url).context("Invalid base URL")?;
    let mut resolved = base.join(url).context("Failed to resolve URL")?;

    // Re-encode query string to fix unencoded special characters from HTML.
    // Some servers strictly require proper percent-encoding.
    if resolved.query().is_some() {
        let query_pairs: Vec<(String, String)> = resolved
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        resolved.query_pairs_mut().clear();
        for (key, value) in query_pairs {
            resolved.query_pairs_mut().append_pair(&key, &value);
        }
    }

    Ok(resolved.to_string())
}

/// Check if a URL is a capturable http(s) URL
#[must_use]
pub fn is_valid_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }

    // Skip data URLs, javascript URLs, and other non-http schemes
    if url.starts_with("data:") || url.starts_with("javascript:") || url.starts_with("mailto:") {
        return false;
    }

    match Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// Check whether two URLs share an origin (scheme + host + effective port)
#[must_use]
pub fn same_origin(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(a), Ok(b)) => {
            a.scheme() == b.scheme()
                && a.host_str().map(str::to_lowercase) == b.host_str().map(str::to_lowercase)
                && a.port_or_known_default() == b.port_or_known_default()
        }
        _ => false,
    }
}

/// Convert a URL glob into an anchored regex.
///
/// `**` matches any sequence including `/`, `*` matches within one path
/// segment, `?` matches a single character. All other characters are
/// escaped literally.
pub fn glob_to_regex(pattern: &str) -> Result<regex::Regex> {
    let mut out = String::with_capacity(pattern.len() * 2);
    out.push('^');

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    out.push_str(".*");
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push('.'),
            _ => out.push_str(&regex::escape(&c.to_string())),
        }
    }

    out.push('$');
    regex::Regex::new(&out).with_context(|| format!("Invalid URL glob '{pattern}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_fragment_and_default_port() {
        let a = normalize_url("https://Example.com:443/path/#section").unwrap();
        assert_eq!(a, "https://example.com/path");
    }

    #[test]
    fn normalize_sorts_query_pairs() {
        let a = normalize_url("https://example.com/p?b=2&a=1").unwrap();
        let b = normalize_url("https://example.com/p?a=1&b=2").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn normalize_keeps_non_default_port() {
        let a = normalize_url("http://example.com:8080/x").unwrap();
        assert_eq!(a, "http://example.com:8080/x");
    }

    #[test]
    fn glob_double_star_crosses_segments() {
        let re = glob_to_regex("https://api.example.com/**").unwrap();
        assert!(re.is_match("https://api.example.com/v1/users/42"));
        assert!(!re.is_match("https://other.example.com/v1"));
    }

    #[test]
    fn glob_single_star_stays_in_segment() {
        let re = glob_to_regex("https://x.test/api/*/users").unwrap();
        assert!(re.is_match("https://x.test/api/v1/users"));
        assert!(!re.is_match("https://x.test/api/v1/v2/users"));
    }

    #[test]
    fn relative_url_resolution() {
        let result = resolve_url("https://example.com/path/page.html", "../styles/main.css").unwrap();
        assert_eq!(result, "https://example.com/styles/main.css");
    }
}
