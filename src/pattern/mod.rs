//! URL-pattern extraction: concrete paths to `:param`-style patterns.
//!
//! Captured API traffic arrives as concrete URLs (`/api/users/42`). To
//! replay it against other identifiers, each path is generalized into a
//! pattern (`/api/users/:userId`) by classifying every segment as static
//! or dynamic. Classification is deterministic: the same path always
//! yields the same pattern.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Result of pattern extraction for one path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternInfo {
    /// Path with dynamic segments replaced by `:name` placeholders
    pub pattern: String,
    /// Parameter names in path order
    pub path_params: Vec<String>,
    /// Specificity score; higher sorts earlier in the matcher
    pub priority: i32,
}

static UUID_V4: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$")
        .expect("uuid regex")
});
static PURE_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("digits regex"));
static HEX_24: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[0-9a-f]{24}$").expect("hex24 regex"));
static SHORT_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[a-z0-9]{6,12}$").expect("token regex"));
static BASE64ISH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{20,}$").expect("base64 regex"));
static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date regex"));
static EPOCH_TIMESTAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{10,13}$").expect("timestamp regex"));

/// Resource nouns in (singular, plural) form.
///
/// A segment matching either form is always static, and a dynamic segment
/// following one is named `<singular>Id`. Kept small and common; unknown
/// nouns degrade to positional `paramN` names, never to wrong matches.
const RESOURCE_NOUNS: &[(&str, &str)] = &[
    ("user", "users"),
    ("post", "posts"),
    ("comment", "comments"),
    ("article", "articles"),
    ("item", "items"),
    ("order", "orders"),
    ("product", "products"),
    ("widget", "widgets"),
    ("account", "accounts"),
    ("customer", "customers"),
    ("project", "projects"),
    ("task", "tasks"),
    ("event", "events"),
    ("session", "sessions"),
    ("message", "messages"),
    ("file", "files"),
    ("image", "images"),
    ("document", "documents"),
    ("group", "groups"),
    ("team", "teams"),
    ("organization", "organizations"),
    ("org", "orgs"),
    ("category", "categories"),
    ("tag", "tags"),
    ("invoice", "invoices"),
    ("payment", "payments"),
    ("subscription", "subscriptions"),
    ("notification", "notifications"),
    ("report", "reports"),
    ("job", "jobs"),
    ("ticket", "tickets"),
    ("channel", "channels"),
    ("thread", "threads"),
    ("repo", "repos"),
    ("repository", "repositories"),
];

/// Look up the canonical singular for a segment that is a known noun
fn noun_singular(segment: &str) -> Option<&'static str> {
    let lower = segment.to_ascii_lowercase();
    RESOURCE_NOUNS
        .iter()
        .find(|(s, p)| *s == lower || *p == lower)
        .map(|(s, _)| *s)
}

/// Heuristic classification of one path segment.
///
/// Known resource nouns are always static, even when they would match a
/// dynamic rule (`widgets` is seven alphanumerics but names a collection,
/// not an id). For the rest, the first matching rule wins.
fn is_dynamic(segment: &str) -> bool {
    if noun_singular(segment).is_some() {
        return false;
    }
    UUID_V4.is_match(segment)
        || PURE_DIGITS.is_match(segment)
        || HEX_24.is_match(segment)
        || SHORT_TOKEN.is_match(segment)
        || BASE64ISH.is_match(segment)
        || ISO_DATE.is_match(segment)
        || EPOCH_TIMESTAMP.is_match(segment)
}

/// Pick a parameter name for a dynamic segment.
///
/// Preference order: the preceding segment's noun (`users/42` becomes
/// `:userId`), the segment's own noun form, then positional `paramN`.
fn param_name(segment: &str, previous: Option<&str>, positional_index: &mut usize) -> String {
    if let Some(prev) = previous
        && let Some(singular) = noun_singular(prev)
    {
        return format!("{singular}Id");
    }
    if let Some(singular) = noun_singular(segment) {
        return format!("{singular}Id");
    }
    let name = format!("param{positional_index}");
    *positional_index += 1;
    name
}

/// Extract a parameterized pattern from an absolute path.
///
/// The query string and fragment are ignored; only path segments take part
/// in classification.
#[must_use]
pub fn extract_pattern(path: &str) -> PatternInfo {
    let path_only = path
        .split('?')
        .next()
        .and_then(|p| p.split('#').next())
        .unwrap_or(path);

    let segments: Vec<&str> = path_only.split('/').filter(|s| !s.is_empty()).collect();

    let mut pattern = String::new();
    let mut path_params = Vec::new();
    let mut static_count = 0i32;
    let mut dynamic_count = 0i32;
    let mut positional_index = 0usize;

    for (i, segment) in segments.iter().enumerate() {
        pattern.push('/');
        if is_dynamic(segment) {
            let previous = if i > 0 { Some(segments[i - 1]) } else { None };
            let name = param_name(segment, previous, &mut positional_index);
            pattern.push(':');
            pattern.push_str(&name);
            path_params.push(name);
            dynamic_count += 1;
        } else {
            pattern.push_str(segment);
            static_count += 1;
        }
    }

    if pattern.is_empty() {
        pattern.push('/');
    }

    let segment_count = segments.len() as i32;
    let param_count = path_params.len() as i32;
    let priority = 10 * segment_count + 5 * static_count + dynamic_count - 2 * param_count;

    PatternInfo {
        pattern,
        path_params,
        priority,
    }
}

/// Recompute the specificity score of an existing pattern.
///
/// Persisted fixtures carry only the pattern string; the score is a pure
/// function of it, so it is derived rather than stored.
#[must_use]
pub fn pattern_priority(pattern: &str) -> i32 {
    let segments: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let dynamic = segments.iter().filter(|s| s.starts_with(':')).count() as i32;
    let total = segments.len() as i32;
    let static_count = total - dynamic;
    10 * total + 5 * static_count + dynamic - 2 * dynamic
}

/// Compile a `:param` pattern into an anchored regex.
///
/// All regex metacharacters in the pattern are escaped first; then each
/// escaped `:name` placeholder becomes a single-segment capture group.
pub fn pattern_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    static PARAM_PLACEHOLDER: Lazy<Regex> =
        Lazy::new(|| Regex::new(r":([A-Za-z0-9_]+)").expect("placeholder regex"));

    let escaped = regex::escape(pattern);
    let with_groups = PARAM_PLACEHOLDER.replace_all(&escaped, "([^/]+)");
    Regex::new(&format!("^{with_groups}$"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_and_digits_become_noun_params() {
        let info =
            extract_pattern("/api/users/4f8e2a3b-1c5d-4e6f-8a9b-0c1d2e3f4a5b/posts/42");
        assert_eq!(info.pattern, "/api/users/:userId/posts/:postId");
        assert_eq!(info.path_params, vec!["userId", "postId"]);
    }

    #[test]
    fn short_token_is_dynamic_but_nouns_stay_static() {
        let info = extract_pattern("/api/widgets/abcdef");
        assert_eq!(info.pattern, "/api/widgets/:widgetId");
        assert_eq!(info.path_params, vec!["widgetId"]);
    }

    #[test]
    fn deeper_pattern_outranks_its_prefix() {
        let deep = extract_pattern("/api/users/123/posts/456");
        let shallow = extract_pattern("/api/users/123");
        assert!(deep.priority > shallow.priority);
    }

    #[test]
    fn pattern_is_deterministic() {
        let a = extract_pattern("/api/orders/2024-06-01/items/999");
        let b = extract_pattern("/api/orders/2024-06-01/items/999");
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_context_yields_positional_names() {
        let info = extract_pattern("/x/1a2b3c4d5e6f/y/77");
        assert_eq!(info.pattern, "/x/:param0/y/:param1");
    }

    #[test]
    fn mongo_oid_and_base64ish_are_dynamic() {
        let info = extract_pattern("/api/files/507f1f77bcf86cd799439011");
        assert_eq!(info.pattern, "/api/files/:fileId");

        let info = extract_pattern("/api/sessions/AbCdEfGhIjKlMnOpQrStUv-_123");
        assert_eq!(info.pattern, "/api/sessions/:sessionId");
    }

    #[test]
    fn root_path_maps_to_slash() {
        let info = extract_pattern("/");
        assert_eq!(info.pattern, "/");
        assert!(info.path_params.is_empty());
    }

    #[test]
    fn query_string_is_ignored() {
        let a = extract_pattern("/api/users/42?page=2");
        let b = extract_pattern("/api/users/42");
        assert_eq!(a, b);
    }

    #[test]
    fn stored_pattern_priority_matches_extraction() {
        let info = extract_pattern("/api/users/123/posts/456");
        assert_eq!(pattern_priority(&info.pattern), info.priority);
    }

    #[test]
    fn pattern_regex_round_trip() {
        let info = extract_pattern("/api/users/42/posts/2024-01-01");
        let re = pattern_to_regex(&info.pattern).unwrap();
        let caps = re.captures("/api/users/7/posts/xyz").unwrap();
        assert_eq!(&caps[1], "7");
        assert_eq!(&caps[2], "xyz");
        assert!(!re.is_match("/api/users/7"));
    }
}
