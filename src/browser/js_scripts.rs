//! JavaScript evaluation scripts
//!
//! This module contains the JavaScript code evaluated in captured pages:
//! link harvesting, bundle discovery, and incremental scrolling.

/// Collect all same-document anchor targets as absolute URLs.
///
/// Filtering to the capture origin happens on the Rust side; the script
/// only resolves and dedups.
pub const LINKS_SCRIPT: &str = r#"
    (() => {
        const seen = new Set();
        document.querySelectorAll('a[href]').forEach(a => {
            try {
                const resolved = new URL(a.getAttribute('href'), document.baseURI).href;
                if (resolved.startsWith('http')) {
                    seen.add(resolved);
                }
            } catch (_) {
                // unresolvable href, skip
            }
        });
        return Array.from(seen);
    })()
"#;

/// Collect JS and CSS bundle URLs referenced by the document
pub const BUNDLE_URLS_SCRIPT: &str = r#"
    (() => {
        const urls = new Set();
        document.querySelectorAll('script[src]').forEach(s => {
            if (s.src) urls.add(s.src);
        });
        document.querySelectorAll('link[rel="stylesheet"][href]').forEach(l => {
            if (l.href) urls.add(l.href);
        });
        document.querySelectorAll('link[rel="modulepreload"][href]').forEach(l => {
            if (l.href) urls.add(l.href);
        });
        return Array.from(urls);
    })()
"#;

/// Scroll down by a fixed pixel step and report the document height.
///
/// `{STEP}` is substituted before evaluation. The caller stops scrolling
/// when the height stops growing.
pub const SCROLL_STEP_SCRIPT: &str = r#"
    (() => {
        window.scrollBy(0, {STEP});
        return document.documentElement.scrollHeight;
    })()
"#;

/// Jump back to the top after auto-scroll so captures see the initial view
pub const SCROLL_TOP_SCRIPT: &str = "window.scrollTo(0, 0); true";

/// Page title, empty string when absent
pub const TITLE_SCRIPT: &str = "document.title || ''";

/// `srcset`-carrying attributes harvested for responsive asset capture
pub const SRCSET_SCRIPT: &str = r#"
    (() => {
        const values = [];
        document.querySelectorAll('img[srcset], source[srcset]').forEach(el => {
            values.push(el.getAttribute('srcset'));
        });
        document.querySelectorAll('source[src], video[src], audio[src]').forEach(el => {
            values.push(el.getAttribute('src'));
        });
        return values.filter(v => v);
    })()
"#;
