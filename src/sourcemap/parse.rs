//! Source-map parsing and ECMA-426 validation.
//!
//! Either the map validates with zero errors, or it is rejected; the only
//! soft finding is a `sourcesContent` length mismatch, which downgrades to
//! a warning because real-world bundlers truncate that array.

use serde_json::Value;

use super::types::{SourceMap, ValidationWarning};
use super::vlq::validate_mappings;
use crate::error::{SourceMapError, ValidationCode};

/// Parse JSON text and validate it as a revision-3 source map.
///
/// Index maps (`sections`) are flattened: every embedded map is validated
/// with the same rules and its sources are concatenated in section order.
/// The `mappings` field is decoded in full so malformed VLQ or
/// out-of-bounds indexes reject the map instead of surfacing later.
pub fn parse_source_map(
    text: &str,
) -> Result<(SourceMap, Vec<ValidationWarning>), SourceMapError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| SourceMapError::InvalidJson(e.to_string()))?;
    let mut warnings = Vec::new();
    let map = validate_map_object(&value, &mut warnings)?;
    Ok((map, warnings))
}

fn validate_map_object(
    value: &Value,
    warnings: &mut Vec<ValidationWarning>,
) -> Result<SourceMap, SourceMapError> {
    let obj = value
        .as_object()
        .ok_or_else(|| SourceMapError::InvalidJson("top level is not an object".to_string()))?;

    match obj.get("version").and_then(Value::as_u64) {
        Some(3) => {}
        _ => return Err(SourceMapError::Validation(ValidationCode::UnsupportedVersion)),
    }

    if let Some(sections) = obj.get("sections") {
        return validate_index_map(sections, warnings);
    }

    let sources = match obj.get("sources") {
        None => return Err(SourceMapError::Validation(ValidationCode::MissingSources)),
        Some(Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => out.push(s.clone()),
                    // Some emitters write null slots; treat them as empty
                    // paths so index alignment with sourcesContent holds.
                    Value::Null => out.push(String::new()),
                    _ => return Err(SourceMapError::Validation(ValidationCode::InvalidSources)),
                }
            }
            out
        }
        Some(_) => return Err(SourceMapError::Validation(ValidationCode::InvalidSources)),
    };

    let mappings = match obj.get("mappings") {
        None => return Err(SourceMapError::Validation(ValidationCode::MissingMappings)),
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(SourceMapError::Validation(ValidationCode::InvalidMappings)),
    };

    let source_root = match obj.get("sourceRoot") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return Err(SourceMapError::Validation(ValidationCode::InvalidSourceRoot)),
    };

    let names = match obj.get("names") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => out.push(s.clone()),
                    _ => return Err(SourceMapError::Validation(ValidationCode::InvalidNames)),
                }
            }
            out
        }
        Some(_) => return Err(SourceMapError::Validation(ValidationCode::InvalidNames)),
    };

    let file = match obj.get("file") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return Err(SourceMapError::Validation(ValidationCode::InvalidFile)),
    };

    let sources_content = match obj.get("sourcesContent") {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => out.push(Some(s.clone())),
                    Value::Null => out.push(None),
                    _ => {
                        return Err(SourceMapError::Validation(
                            ValidationCode::InvalidSourcesContent,
                        ));
                    }
                }
            }
            if out.len() != sources.len() {
                warnings.push(ValidationWarning {
                    code: ValidationCode::SourcesContentLengthMismatch,
                    message: format!(
                        "sourcesContent has {} entries for {} sources",
                        out.len(),
                        sources.len()
                    ),
                });
            }
            Some(out)
        }
        Some(_) => {
            return Err(SourceMapError::Validation(
                ValidationCode::InvalidSourcesContent,
            ));
        }
    };

    let ignore_list = match obj.get("ignoreList").or_else(|| obj.get("x_google_ignoreList")) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item.as_u64() {
                    Some(i) if (i as usize) < sources.len() => out.push(i as usize),
                    _ => {
                        return Err(SourceMapError::Validation(ValidationCode::InvalidIgnoreList));
                    }
                }
            }
            out
        }
        Some(_) => return Err(SourceMapError::Validation(ValidationCode::InvalidIgnoreList)),
    };

    validate_mappings(&mappings, sources.len(), names.len())?;

    Ok(SourceMap {
        sources,
        sources_content,
        mappings,
        source_root,
        names,
        file,
        ignore_list,
    })
}

/// Validate an index map and flatten its sections into one logical map
fn validate_index_map(
    sections: &Value,
    warnings: &mut Vec<ValidationWarning>,
) -> Result<SourceMap, SourceMapError> {
    let sections = sections
        .as_array()
        .ok_or(SourceMapError::Validation(ValidationCode::InvalidIndexMap))?;

    let mut flattened = SourceMap::default();

    for section in sections {
        let obj = section
            .as_object()
            .ok_or(SourceMapError::Validation(ValidationCode::InvalidIndexMap))?;

        let offset = obj
            .get("offset")
            .and_then(Value::as_object)
            .ok_or(SourceMapError::Validation(ValidationCode::InvalidIndexMap))?;
        if offset.get("line").and_then(Value::as_u64).is_none()
            || offset.get("column").and_then(Value::as_u64).is_none()
        {
            return Err(SourceMapError::Validation(ValidationCode::InvalidIndexMap));
        }

        let embedded = obj
            .get("map")
            .ok_or(SourceMapError::Validation(ValidationCode::InvalidIndexMap))?;
        let child = validate_map_object(embedded, warnings)?;

        let offset_len = flattened.sources.len();
        flattened.sources.extend(child.sources);
        match (&mut flattened.sources_content, child.sources_content) {
            (Some(acc), Some(content)) => acc.extend(content),
            (Some(acc), None) => {
                acc.resize(flattened.sources.len(), None);
            }
            (None, Some(content)) => {
                let mut acc = vec![None; offset_len];
                acc.extend(content);
                flattened.sources_content = Some(acc);
            }
            (None, None) => {}
        }
    }

    Ok(flattened)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_valid_map_parses() {
        let (map, warnings) = parse_source_map(
            r#"{"version":3,"sources":["src/a.ts"],"sourcesContent":["let a=1;"],"mappings":"AAAA"}"#,
        )
        .unwrap();
        assert_eq!(map.sources, vec!["src/a.ts"]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn wrong_version_is_rejected() {
        let err = parse_source_map(r#"{"version":2,"sources":[],"mappings":""}"#).unwrap_err();
        assert!(matches!(
            err,
            SourceMapError::Validation(ValidationCode::UnsupportedVersion)
        ));
    }

    #[test]
    fn missing_sources_is_rejected() {
        let err = parse_source_map(r#"{"version":3,"mappings":""}"#).unwrap_err();
        assert!(matches!(
            err,
            SourceMapError::Validation(ValidationCode::MissingSources)
        ));
    }

    #[test]
    fn non_string_mappings_is_rejected() {
        let err =
            parse_source_map(r#"{"version":3,"sources":[],"mappings":42}"#).unwrap_err();
        assert!(matches!(
            err,
            SourceMapError::Validation(ValidationCode::InvalidMappings)
        ));
    }

    #[test]
    fn sources_content_length_mismatch_is_a_warning() {
        let (map, warnings) = parse_source_map(
            r#"{"version":3,"sources":["a.js","b.js"],"sourcesContent":["x"],"mappings":""}"#,
        )
        .unwrap();
        assert_eq!(map.sources.len(), 2);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, ValidationCode::SourcesContentLengthMismatch);
    }

    #[test]
    fn index_map_sections_are_flattened() {
        let (map, _) = parse_source_map(
            r#"{"version":3,"sections":[
                {"offset":{"line":0,"column":0},
                 "map":{"version":3,"sources":["a.js"],"sourcesContent":["A"],"mappings":"AAAA"}},
                {"offset":{"line":10,"column":0},
                 "map":{"version":3,"sources":["b.js"],"sourcesContent":["B"],"mappings":"AAAA"}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(map.sources, vec!["a.js", "b.js"]);
        assert_eq!(
            map.sources_content,
            Some(vec![Some("A".to_string()), Some("B".to_string())])
        );
    }

    #[test]
    fn malformed_section_offset_is_rejected() {
        let err = parse_source_map(
            r#"{"version":3,"sections":[{"offset":{"line":0},"map":{"version":3,"sources":[],"mappings":""}}]}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SourceMapError::Validation(ValidationCode::InvalidIndexMap)
        ));
    }

    #[test]
    fn garbage_mappings_reject_the_map() {
        let err = parse_source_map(
            r#"{"version":3,"sources":["a.js"],"mappings":"AAAA;!!"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SourceMapError::MalformedVlq { .. }));
    }

    #[test]
    fn mappings_pointing_past_sources_reject_the_map() {
        let err = parse_source_map(r#"{"version":3,"sources":[],"mappings":"AAAA"}"#)
            .unwrap_err();
        assert!(matches!(err, SourceMapError::SourceIndexOutOfBounds { .. }));
    }

    #[test]
    fn invalid_json_is_a_decode_error() {
        let err = parse_source_map("{not json").unwrap_err();
        assert!(matches!(err, SourceMapError::InvalidJson(_)));
    }
}
