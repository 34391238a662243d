//! Tokenizers for responsive-image URL syntaxes.
//!
//! `srcset` attributes and CSS `image-set()` notations both carry multiple
//! candidate URLs with density/width descriptors. The browser requests
//! only the candidate it picked for the current viewport; the rest must be
//! harvested from the raw syntax so an offline replica works at every
//! density.

use once_cell::sync::Lazy;
use regex::Regex;

static IMAGE_SET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:-webkit-)?image-set\s*\(").expect("image-set regex")
});
static CSS_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"url\(\s*(?:"([^"]*)"|'([^']*)'|([^)'"\s]+))\s*\)"#).expect("css url regex")
});
static QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^(?:"([^"]*)"|'([^']*)')"#).expect("quoted regex"));

/// Tokenize a `srcset` attribute value into its candidate URLs.
///
/// Candidates are comma-separated; each is a URL optionally followed by a
/// width (`640w`) or density (`2x`) descriptor, which is dropped. `data:`
/// URLs are always excluded.
#[must_use]
pub fn parse_srcset(value: &str) -> Vec<String> {
    value
        .split(',')
        .filter_map(|candidate| {
            let candidate = candidate.trim();
            if candidate.is_empty() {
                return None;
            }
            let url = candidate
                .split_whitespace()
                .next()
                .unwrap_or(candidate);
            if url.is_empty() || url.starts_with("data:") {
                None
            } else {
                Some(url.to_string())
            }
        })
        .collect()
}

/// Extract every URL inside `image-set(...)` / `-webkit-image-set(...)`
/// occurrences in a CSS text.
///
/// Terms may be `url("...")`, `url('...')`, bare `url(...)`, or a plain
/// quoted string; descriptors after the URL are ignored and `data:` URLs
/// excluded.
#[must_use]
pub fn parse_image_set_urls(css: &str) -> Vec<String> {
    let mut urls = Vec::new();

    for m in IMAGE_SET.find_iter(css) {
        let Some(body) = balanced_paren_body(&css[m.end() - 1..]) else {
            continue;
        };
        for term in split_top_level_commas(body) {
            let term = term.trim();
            if term.is_empty() {
                continue;
            }
            let url = if let Some(caps) = CSS_URL.captures(term) {
                caps.get(1)
                    .or_else(|| caps.get(2))
                    .or_else(|| caps.get(3))
                    .map(|m| m.as_str().to_string())
            } else {
                QUOTED
                    .captures(term)
                    .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
                    .map(|m| m.as_str().to_string())
            };

            if let Some(url) = url
                && !url.is_empty()
                && !url.starts_with("data:")
            {
                urls.push(url);
            }
        }
    }

    urls
}

/// Extract all plain `url(...)` references from a CSS text.
///
/// Used to harvest fonts and background images referenced by captured
/// stylesheets. `data:` URLs are excluded.
#[must_use]
pub fn parse_css_urls(css: &str) -> Vec<String> {
    CSS_URL
        .captures_iter(css)
        .filter_map(|caps| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().to_string())
        })
        .filter(|url| !url.is_empty() && !url.starts_with("data:"))
        .collect()
}

/// The content between the opening paren at `input[0]` and its balanced
/// closing paren
fn balanced_paren_body(input: &str) -> Option<&str> {
    debug_assert!(input.starts_with('('));
    let mut depth = 0usize;
    for (i, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&input[1..i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on commas that are not nested inside parentheses
fn split_top_level_commas(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn srcset_drops_descriptors() {
        let urls = parse_srcset("/img/a-320.png 320w, /img/a-640.png 640w, /img/a.png 2x");
        assert_eq!(urls, vec!["/img/a-320.png", "/img/a-640.png", "/img/a.png"]);
    }

    #[test]
    fn srcset_handles_bare_url() {
        assert_eq!(parse_srcset("/img/only.png"), vec!["/img/only.png"]);
    }

    #[test]
    fn srcset_excludes_data_urls() {
        let urls = parse_srcset("data:image/png;base64,AAAA 1x, /img/real.png 2x");
        assert_eq!(urls, vec!["/img/real.png"]);
    }

    #[test]
    fn srcset_tolerates_messy_whitespace() {
        let urls = parse_srcset("  /a.png   1x ,\n\t/b.png 2x , ");
        assert_eq!(urls, vec!["/a.png", "/b.png"]);
    }

    #[test]
    fn image_set_quoted_and_bare_forms() {
        let css = r#"
            .hero { background-image: image-set(url("/img/hero.png") 1x, url('/img/hero@2x.png') 2x); }
            .logo { background-image: -webkit-image-set(url(/img/logo.png) 1x, "/img/logo@2x.png" 2x); }
        "#;
        let urls = parse_image_set_urls(css);
        assert_eq!(
            urls,
            vec![
                "/img/hero.png",
                "/img/hero@2x.png",
                "/img/logo.png",
                "/img/logo@2x.png"
            ]
        );
    }

    #[test]
    fn image_set_excludes_data_urls() {
        let css = r#"a { background: image-set(url("data:image/png;base64,xx") 1x, url("/b.png") 2x); }"#;
        assert_eq!(parse_image_set_urls(css), vec!["/b.png"]);
    }

    #[test]
    fn css_urls_all_three_quote_forms() {
        let css = r#"@font-face { src: url("/f/a.woff2"), url('/f/b.woff'), url(/f/c.ttf); }"#;
        assert_eq!(parse_css_urls(css), vec!["/f/a.woff2", "/f/b.woff", "/f/c.ttf"]);
    }

    #[test]
    fn unbalanced_image_set_is_ignored() {
        assert!(parse_image_set_urls("x { b: image-set(url(\"/a.png\" }").is_empty());
    }
}
