//! Source-map discovery for JS and CSS bundles.
//!
//! Discovery order, first hit wins:
//! 1. `SourceMap` / `X-SourceMap` response headers
//! 2. trailing `//# sourceMappingURL=` comment in JS (last occurrence)
//! 3. trailing `/*# sourceMappingURL= */` comment in CSS
//! 4. probing `<bundle-url>.map`
//!
//! `data:` URIs with base64 JSON payloads are decoded inline instead of
//! fetched.

use base64::Engine as _;
use once_cell::sync::Lazy;
use regex::Regex;

use super::types::MapLocation;
use crate::error::SourceMapError;
use crate::utils::resolve_url;

static JS_MAP_COMMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^//[#@]\s*sourceMappingURL=(\S+)\s*$").expect("js map comment regex")
});
static CSS_MAP_COMMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/\*#\s*sourceMappingURL=(\S+?)\s*\*/").expect("css map comment regex")
});

/// A discovered map: either a URL to fetch or inline JSON already decoded
#[derive(Debug, Clone)]
pub enum Discovered {
    Remote { url: String, location: MapLocation },
    Inline { json: String },
}

/// Check `SourceMap` / `X-SourceMap` headers, resolving relative values
/// against the bundle URL
pub fn from_headers(headers: &reqwest::header::HeaderMap, bundle_url: &str) -> Option<Discovered> {
    for name in ["sourcemap", "x-sourcemap"] {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            let url = resolve_url(bundle_url, value).ok()?;
            return Some(Discovered::Remote {
                url: url.clone(),
                location: MapLocation::Header { url },
            });
        }
    }
    None
}

/// Find a `sourceMappingURL` comment in bundle content.
///
/// For JS the last occurrence wins: bundlers append their comment after
/// any that survived concatenation.
pub fn from_content(content: &str, bundle_url: &str, is_css: bool) -> Option<Discovered> {
    let raw = if is_css {
        CSS_MAP_COMMENT
            .captures_iter(content)
            .last()
            .map(|c| c[1].to_string())?
    } else {
        JS_MAP_COMMENT
            .captures_iter(content)
            .last()
            .map(|c| c[1].to_string())?
    };

    if raw.starts_with("data:") {
        return decode_data_uri(&raw).ok().map(|json| Discovered::Inline { json });
    }

    let url = resolve_url(bundle_url, &raw).ok()?;
    let location = if is_css {
        MapLocation::CssComment { url: url.clone() }
    } else {
        MapLocation::JsComment { url: url.clone() }
    };
    Some(Discovered::Remote { url, location })
}

/// The `.map` probe URL for a bundle
#[must_use]
pub fn probe_url(bundle_url: &str) -> String {
    // Keep the query string out of the probe path
    match bundle_url.split_once('?') {
        Some((path, _)) => format!("{path}.map"),
        None => format!("{bundle_url}.map"),
    }
}

/// Decode an inline `data:` source-map URI.
///
/// Accepts `data:application/json;base64,<payload>` and the charset
/// variants bundlers emit.
pub fn decode_data_uri(uri: &str) -> Result<String, SourceMapError> {
    let payload = uri
        .split_once(',')
        .map(|(_, p)| p)
        .ok_or(SourceMapError::InvalidDataUri)?;

    if uri.contains(";base64") {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|_| SourceMapError::InvalidDataUri)?;
        String::from_utf8(bytes).map_err(|_| SourceMapError::InvalidDataUri)
    } else {
        urlencoding::decode(payload)
            .map(|s| s.into_owned())
            .map_err(|_| SourceMapError::InvalidDataUri)
    }
}

/// Gate on the content type of a fetched map response.
///
/// JSON, octet-stream, plain text, or a missing header are all accepted;
/// `text/html` means the server served its SPA fallback page instead of a
/// map and the response must be rejected.
pub fn acceptable_map_content_type(content_type: Option<&str>) -> Result<(), SourceMapError> {
    match content_type {
        None => Ok(()),
        Some(ct) => {
            let ct_lower = ct.to_ascii_lowercase();
            if ct_lower.contains("text/html") {
                return Err(SourceMapError::HtmlFallback {
                    content_type: ct.to_string(),
                });
            }
            if ct_lower.contains("json")
                || ct_lower.contains("octet-stream")
                || ct_lower.contains("text/plain")
            {
                Ok(())
            } else {
                Err(SourceMapError::HtmlFallback {
                    content_type: ct.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_js_comment_wins() {
        let js = "//# sourceMappingURL=old.js.map\nvar x=1;\n//# sourceMappingURL=app.js.map\n";
        let Some(Discovered::Remote { url, .. }) =
            from_content(js, "https://x.test/static/app.js", false)
        else {
            panic!("expected remote discovery");
        };
        assert_eq!(url, "https://x.test/static/app.js.map");
    }

    #[test]
    fn css_comment_is_detected() {
        let css = "body{color:red}\n/*# sourceMappingURL=styles.css.map */\n";
        let Some(Discovered::Remote { url, location }) =
            from_content(css, "https://x.test/a/styles.css", true)
        else {
            panic!("expected remote discovery");
        };
        assert_eq!(url, "https://x.test/a/styles.css.map");
        assert!(matches!(location, MapLocation::CssComment { .. }));
    }

    #[test]
    fn data_uri_is_decoded_inline() {
        let json = r#"{"version":3,"sources":[],"mappings":""}"#;
        let encoded = base64::engine::general_purpose::STANDARD.encode(json);
        let js = format!("//# sourceMappingURL=data:application/json;base64,{encoded}\n");
        let Some(Discovered::Inline { json: decoded }) =
            from_content(&js, "https://x.test/app.js", false)
        else {
            panic!("expected inline discovery");
        };
        assert_eq!(decoded, json);
    }

    #[test]
    fn probe_url_strips_query() {
        assert_eq!(
            probe_url("https://x.test/app.js?v=123"),
            "https://x.test/app.js.map"
        );
    }

    #[test]
    fn html_content_type_is_rejected() {
        assert!(acceptable_map_content_type(Some("text/html; charset=utf-8")).is_err());
        assert!(acceptable_map_content_type(Some("application/json")).is_ok());
        assert!(acceptable_map_content_type(Some("application/octet-stream")).is_ok());
        assert!(acceptable_map_content_type(None).is_ok());
    }
}
