//! Source reconstruction from validated maps.
//!
//! Every `(sources[i], sourcesContent[i])` pair becomes an
//! `ExtractedSource` after path normalization, unless a filter rejects it
//! or its content slot is null.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use super::types::{ExtractStats, ExtractedSource, SourceMap};

static WEBPACK_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^webpack://[^/]*/").expect("webpack prefix regex"));

/// Filters applied to candidate source paths
#[derive(Debug, Clone, Default)]
pub struct SourceFilters {
    pub include_node_modules: bool,
    /// Packages treated as first-party even under `node_modules/`
    pub internal_packages: HashSet<String>,
    pub exclude_patterns: Vec<Regex>,
}

impl SourceFilters {
    fn rejects(&self, path: &str) -> bool {
        if !self.include_node_modules
            && let Some(rest) = path_after_node_modules(path)
            && !self.is_internal(rest)
        {
            return true;
        }
        self.exclude_patterns.iter().any(|re| re.is_match(path))
    }

    fn is_internal(&self, after_node_modules: &str) -> bool {
        // Scoped packages occupy two segments (@scope/name)
        let mut segments = after_node_modules.split('/');
        let first = segments.next().unwrap_or_default();
        let package = if first.starts_with('@') {
            match segments.next() {
                Some(second) => format!("{first}/{second}"),
                None => first.to_string(),
            }
        } else {
            first.to_string()
        };
        self.internal_packages.contains(&package)
    }
}

fn path_after_node_modules(path: &str) -> Option<&str> {
    path.find("node_modules/")
        .map(|i| &path[i + "node_modules/".len()..])
}

/// Normalize one source path from a map.
///
/// Steps, in order: strip `webpack://<namespace>/`, drop the NUL
/// virtual-module marker, prepend `sourceRoot` for relative paths, remove
/// a leading `./`, then resolve `..` segments without ever escaping the
/// root. Returns `None` for paths that normalize to nothing.
#[must_use]
pub fn normalize_source_path(raw: &str, source_root: Option<&str>) -> Option<String> {
    let mut path = WEBPACK_PREFIX.replace(raw, "").into_owned();

    let had_virtual_marker = path.starts_with('\0');
    if had_virtual_marker {
        path = path.trim_start_matches('\0').to_string();
    }

    let is_absolute_url = path.contains("://");
    if !is_absolute_url && !path.starts_with('/') {
        if let Some(root) = source_root {
            let root = root.trim_end_matches('/');
            if !root.is_empty() {
                path = format!("{root}/{path}");
            }
        }
    }

    // URLs keep only their path component
    if let Some(idx) = path.find("://") {
        path = match path[idx + 3..].find('/') {
            Some(slash) => path[idx + 3 + slash..].to_string(),
            None => String::new(),
        };
    }

    let path = path.trim_start_matches('/');
    let path = path.strip_prefix("./").unwrap_or(path);

    let mut resolved: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                // Bounded: popping past the root is ignored, not escaped
                resolved.pop();
            }
            other => resolved.push(other),
        }
    }

    if resolved.is_empty() {
        return None;
    }

    Some(resolved.join("/"))
}

/// Extract all reconstructable sources from a validated map
#[must_use]
pub fn extract_sources(map: &SourceMap, filters: &SourceFilters) -> (Vec<ExtractedSource>, ExtractStats) {
    let mut out = Vec::new();
    let mut stats = ExtractStats::default();

    let empty: Vec<Option<String>> = Vec::new();
    let contents = map.sources_content.as_ref().unwrap_or(&empty);

    for (i, source) in map.sources.iter().enumerate() {
        let Some(Some(content)) = contents.get(i) else {
            stats.null_content_count += 1;
            continue;
        };

        if source.is_empty() {
            stats.skipped_count += 1;
            continue;
        }

        // Virtual modules (NUL-marked) carry synthesized content, not
        // project sources
        if source.starts_with('\0') {
            stats.skipped_count += 1;
            continue;
        }

        let Some(path) = normalize_source_path(source, map.source_root.as_deref()) else {
            stats.skipped_count += 1;
            continue;
        };

        if filters.rejects(&path) {
            stats.skipped_count += 1;
            continue;
        }

        stats.extracted_count += 1;
        out.push(ExtractedSource {
            path,
            content: content.clone(),
            original_path: source.clone(),
        });
    }

    (out, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_with(sources: &[&str], contents: &[Option<&str>], root: Option<&str>) -> SourceMap {
        SourceMap {
            sources: sources.iter().map(|s| s.to_string()).collect(),
            sources_content: Some(
                contents
                    .iter()
                    .map(|c| c.map(str::to_string))
                    .collect(),
            ),
            mappings: "AAAA".to_string(),
            source_root: root.map(str::to_string),
            ..SourceMap::default()
        }
    }

    #[test]
    fn webpack_prefix_is_stripped() {
        assert_eq!(
            normalize_source_path("webpack://my-app/./src/index.ts", None).unwrap(),
            "src/index.ts"
        );
    }

    #[test]
    fn source_root_is_prepended_for_relative_paths() {
        assert_eq!(
            normalize_source_path("components/App.tsx", Some("src/")).unwrap(),
            "src/components/App.tsx"
        );
        // Absolute paths ignore sourceRoot
        assert_eq!(
            normalize_source_path("/lib/util.js", Some("src/")).unwrap(),
            "lib/util.js"
        );
    }

    #[test]
    fn dotdot_cannot_escape_the_root() {
        assert_eq!(
            normalize_source_path("../../../../etc/passwd", None).unwrap(),
            "etc/passwd"
        );
        assert_eq!(
            normalize_source_path("a/../../b/c.js", None).unwrap(),
            "b/c.js"
        );
    }

    #[test]
    fn null_content_is_counted_not_extracted() {
        let map = map_with(
            &["a.js", "b.js"],
            &[Some("let a;"), None],
            None,
        );
        let (sources, stats) = extract_sources(&map, &SourceFilters::default());
        assert_eq!(sources.len(), 1);
        assert_eq!(stats.extracted_count, 1);
        assert_eq!(stats.null_content_count, 1);
        assert_eq!(stats.skipped_count, 0);
    }

    #[test]
    fn node_modules_skipped_unless_internal() {
        let map = map_with(
            &[
                "webpack://app/node_modules/lodash/index.js",
                "webpack://app/node_modules/@acme/ui/button.tsx",
                "webpack://app/src/main.ts",
            ],
            &[Some("l"), Some("b"), Some("m")],
            None,
        );

        let mut filters = SourceFilters::default();
        let (sources, stats) = extract_sources(&map, &filters);
        assert_eq!(sources.len(), 1);
        assert_eq!(stats.skipped_count, 2);

        filters.internal_packages.insert("@acme/ui".to_string());
        let (sources, _) = extract_sources(&map, &filters);
        assert_eq!(sources.len(), 2);
    }

    #[test]
    fn exclude_patterns_reject_paths() {
        let map = map_with(&["src/a.test.ts", "src/a.ts"], &[Some("t"), Some("a")], None);
        let filters = SourceFilters {
            exclude_patterns: vec![Regex::new(r"\.test\.").unwrap()],
            ..SourceFilters::default()
        };
        let (sources, stats) = extract_sources(&map, &filters);
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].path, "src/a.ts");
        assert_eq!(stats.skipped_count, 1);
    }

    #[test]
    fn original_path_is_preserved() {
        let map = map_with(&["webpack://app/src/x.ts"], &[Some("x")], None);
        let (sources, _) = extract_sources(&map, &SourceFilters::default());
        assert_eq!(sources[0].path, "src/x.ts");
        assert_eq!(sources[0].original_path, "webpack://app/src/x.ts");
    }
}
