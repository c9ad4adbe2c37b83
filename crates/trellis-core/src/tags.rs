//! Reference tag codec
//!
//! The wire form is `@<Type>/<path>[#<element>][:<line>][{<json-body>}]`.
//! This module is the only place that touches the grammar; everything else
//! operates on parsed [`Reference`] values. Round-trip fidelity
//! (`parse_tag(format_tag(r)) == r`) is the contract the drift detector and
//! all external consumers rely on.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Parsed form of a reference tag.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Reference {
    /// Identifier starting with an uppercase letter, e.g. `Fn`, `Component`.
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Interior of the JSON object body, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// A reference plus where the tag was *found* (not what it points to).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedReference {
    #[serde(flatten)]
    pub reference: Reference,
    /// File the tag was read from.
    pub file: String,
    /// 1-based line in that file.
    pub index_line: u32,
    /// The raw tag text as it appeared.
    pub original_tag: String,
}

static TYPE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z][A-Za-z0-9_]*$").unwrap());

/// Matches only well-formed tags; used by [`extract_tags`].
static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"@[A-Z][A-Za-z0-9_]*/[^\s#:{}]+(?:#[^\s:{}]+)?(?::[0-9]+)?(?:\{[^{}]*\})?")
        .unwrap()
});

/// Loose candidate matcher; anything it finds that the strict grammar does
/// not accept is reported as a skipped-tag warning.
static CANDIDATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@[A-Za-z][A-Za-z0-9_]*/[^\s]+").unwrap());

/// Parse a single tag. Fails with `InvalidFormat` when the string does not
/// match the grammar and `InvalidLine` when the line group is non-numeric or
/// zero. A malformed metadata body degrades to key=value parsing with a
/// warning logged.
pub fn parse_tag(input: &str) -> Result<Reference> {
    let (reference, warning) = parse_tag_inner(input)?;
    if let Some(warning) = warning {
        tracing::warn!(tag = input, "{warning}");
    }
    Ok(reference)
}

/// Non-throwing parse.
pub fn is_valid(input: &str) -> bool {
    parse_tag_inner(input).is_ok()
}

/// Format a reference back to its wire form. Requires `kind` and `path`;
/// optional sections are omitted when absent.
pub fn format_tag(reference: &Reference) -> Result<String> {
    if !TYPE_RE.is_match(&reference.kind) || reference.path.is_empty() {
        return Err(Error::InvalidFormat(format!(
            "reference requires a valid type and a path, got type={:?} path={:?}",
            reference.kind, reference.path
        )));
    }

    let mut out = format!("@{}/{}", reference.kind, reference.path);
    if let Some(element) = &reference.element {
        out.push('#');
        out.push_str(element);
    }
    if let Some(line) = reference.line {
        out.push(':');
        out.push_str(&line.to_string());
    }
    if let Some(metadata) = &reference.metadata {
        let body = serde_json::to_string(&Value::Object(metadata.clone()))
            .unwrap_or_else(|_| degraded_metadata_body(metadata));
        out.push_str(&body);
    }
    Ok(out)
}

/// Key=value rendering used when a metadata map cannot serialize as JSON.
/// Mirrors the parser's fallback so the two stay symmetric.
fn degraded_metadata_body(metadata: &Map<String, Value>) -> String {
    let pairs: Vec<String> = metadata
        .iter()
        .map(|(k, v)| match v {
            Value::String(s) => format!("{k}={s}"),
            other => format!("{k}={other}"),
        })
        .collect();
    format!("{{{}}}", pairs.join(","))
}

pub(crate) fn parse_tag_inner(input: &str) -> Result<(Reference, Option<String>)> {
    let s = input.trim();
    let rest = s
        .strip_prefix('@')
        .ok_or_else(|| Error::InvalidFormat(s.to_string()))?;

    let (kind, rest) = rest
        .split_once('/')
        .ok_or_else(|| Error::InvalidFormat(s.to_string()))?;
    if !TYPE_RE.is_match(kind) {
        return Err(Error::InvalidFormat(s.to_string()));
    }

    // Metadata body, when present, is the interior of a trailing {...}.
    let (head, body) = match rest.find('{') {
        Some(open) => {
            let (head, tail) = rest.split_at(open);
            let body = tail
                .strip_prefix('{')
                .and_then(|t| t.strip_suffix('}'))
                .ok_or_else(|| Error::InvalidFormat(s.to_string()))?;
            (head, Some(body))
        }
        None => (rest, None),
    };

    // The path excludes `#` and `:`, so the first of either starts the next
    // group.
    let (path, element, line_text) = match head.split_once('#') {
        Some((path, elem)) => match elem.split_once(':') {
            Some((elem, line)) => (path, Some(elem), Some(line)),
            None => (path, Some(elem), None),
        },
        None => match head.split_once(':') {
            Some((path, line)) => (path, None, Some(line)),
            None => (head, None, None),
        },
    };

    if path.is_empty() || path.contains(['{', '}', ':']) {
        return Err(Error::InvalidFormat(s.to_string()));
    }
    if let Some(elem) = element {
        if elem.is_empty() {
            return Err(Error::InvalidFormat(s.to_string()));
        }
    }

    let line = match line_text {
        Some(text) => {
            let value: u32 = text
                .parse()
                .map_err(|_| Error::InvalidLine(text.to_string()))?;
            if value == 0 {
                return Err(Error::InvalidLine(text.to_string()));
            }
            Some(value)
        }
        None => None,
    };

    let (metadata, warning) = match body {
        Some(body) => {
            let (map, warning) = parse_metadata(body);
            (Some(map), warning)
        }
        None => (None, None),
    };

    Ok((
        Reference {
            kind: kind.to_string(),
            path: path.to_string(),
            element: element.map(str::to_owned),
            line,
            metadata,
        },
        warning,
    ))
}

/// Parse a metadata body as JSON with braces restored; on failure fall back
/// to `,`-separated `key=value` pairs with scalar coercion.
fn parse_metadata(body: &str) -> (Map<String, Value>, Option<String>) {
    let wrapped = format!("{{{body}}}");
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&wrapped) {
        return (map, None);
    }

    let mut map = Map::new();
    for pair in body.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        if let Some((key, value)) = pair.split_once('=') {
            let key = key.trim().trim_matches('"').trim_matches('\'');
            if !key.is_empty() {
                map.insert(key.to_string(), coerce_scalar(value.trim()));
            }
        }
    }
    let warning = format!("malformed metadata body {{{body}}}; used key=value fallback");
    (map, Some(warning))
}

fn coerce_scalar(raw: &str) -> Value {
    let stripped = raw
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .or_else(|| raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')));
    if let Some(text) = stripped {
        return Value::String(text.to_string());
    }
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Ok(f) = raw.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(raw.to_string())
}

/// A tag found in free text, with the exact substring it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedTag {
    pub reference: Reference,
    pub text: String,
}

/// Run the grammar globally over a text blob. Well-formed tags are parsed;
/// near-tags that fail the grammar are skipped and reported as warnings.
pub fn extract_tags(blob: &str) -> (Vec<Reference>, Vec<String>) {
    let (tags, warnings) = extract_tags_detailed(blob);
    (tags.into_iter().map(|t| t.reference).collect(), warnings)
}

/// [`extract_tags`], keeping the matched substring of each tag.
pub fn extract_tags_detailed(blob: &str) -> (Vec<ExtractedTag>, Vec<String>) {
    let mut tags = Vec::new();
    let mut warnings = Vec::new();

    for m in TAG_RE.find_iter(blob) {
        match parse_tag_inner(m.as_str()) {
            Ok((reference, warning)) => {
                tags.push(ExtractedTag {
                    reference,
                    text: m.as_str().to_string(),
                });
                if let Some(warning) = warning {
                    warnings.push(format!("{}: {warning}", m.as_str()));
                }
            }
            Err(err) => warnings.push(format!("skipped tag {:?}: {err}", m.as_str())),
        }
    }

    // Surface candidates the strict grammar rejected entirely.
    for m in CANDIDATE_RE.find_iter(blob) {
        let covered = TAG_RE.find_iter(m.as_str()).next().is_some();
        if !covered {
            warnings.push(format!("skipped invalid tag candidate {:?}", m.as_str()));
        }
    }

    (tags, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_tag() {
        let r = parse_tag("@Fn/analyzer/analyzer-service#analyze:96").unwrap();
        assert_eq!(r.kind, "Fn");
        assert_eq!(r.path, "analyzer/analyzer-service");
        assert_eq!(r.element.as_deref(), Some("analyze"));
        assert_eq!(r.line, Some(96));
        assert!(r.metadata.is_none());
    }

    #[test]
    fn rejects_lowercase_type() {
        assert!(matches!(
            parse_tag("@fn/path"),
            Err(Error::InvalidFormat(_))
        ));
    }

    #[test]
    fn rejects_non_numeric_line() {
        assert!(matches!(
            parse_tag("@Fn/path#elem:abc"),
            Err(Error::InvalidLine(_))
        ));
        assert!(matches!(parse_tag("@Fn/path:0"), Err(Error::InvalidLine(_))));
    }

    #[test]
    fn metadata_json_body() {
        let r = parse_tag(r#"@Doc/guide{"version": 2, "draft": true}"#).unwrap();
        let meta = r.metadata.unwrap();
        assert_eq!(meta["version"], Value::from(2));
        assert_eq!(meta["draft"], Value::Bool(true));
    }

    #[test]
    fn metadata_key_value_fallback_coerces() {
        let (r, warning) = parse_tag_inner("@Doc/guide{version=2,draft=true,name='x'}").unwrap();
        assert!(warning.is_some());
        let meta = r.metadata.unwrap();
        assert_eq!(meta["version"], Value::from(2));
        assert_eq!(meta["draft"], Value::Bool(true));
        assert_eq!(meta["name"], Value::from("x"));
    }

    #[test]
    fn is_valid_does_not_throw() {
        assert!(is_valid("@Fn/a#b:3"));
        assert!(!is_valid("not a tag"));
        assert!(!is_valid("@Fn/a:bad"));
    }

    #[test]
    fn extract_skips_invalid_candidates() {
        let blob = "see @Fn/svc#run:12 and @bad/lower plus @Ty/mod.ts";
        let (refs, warnings) = extract_tags(blob);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].element.as_deref(), Some("run"));
        assert_eq!(refs[1].kind, "Ty");
        assert!(warnings.iter().any(|w| w.contains("@bad/lower")));
    }

    #[test]
    fn extract_stops_before_trailing_punctuation() {
        let (refs, _) = extract_tags("fix @Fn/a/b.ts#handle:10.");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].line, Some(10));
    }

    #[test]
    fn round_trips_scenario_tag() {
        let text = "@Fn/analyzer/analyzer-service#analyze:96";
        let r = parse_tag(text).unwrap();
        assert_eq!(format_tag(&r).unwrap(), text);
    }

    #[test]
    fn round_trips_object_metadata() {
        let mut metadata = Map::new();
        metadata.insert("status".to_string(), Value::from("active"));
        metadata.insert("weight".to_string(), Value::from(3));
        let reference = Reference {
            kind: "Component".to_string(),
            path: "ui/button".to_string(),
            element: Some("Button".to_string()),
            line: Some(14),
            metadata: Some(metadata),
        };
        let wire = format_tag(&reference).unwrap();
        assert_eq!(parse_tag(&wire).unwrap(), reference);
    }

    #[test]
    fn format_requires_type_and_path() {
        let bare = Reference {
            kind: "lower".to_string(),
            path: "p".to_string(),
            ..Default::default()
        };
        assert!(format_tag(&bare).is_err());
        let empty_path = Reference {
            kind: "Fn".to_string(),
            path: String::new(),
            ..Default::default()
        };
        assert!(format_tag(&empty_path).is_err());
    }

    #[test]
    fn format_omits_absent_sections() {
        let reference = Reference {
            kind: "File".to_string(),
            path: "src/app.ts".to_string(),
            ..Default::default()
        };
        assert_eq!(format_tag(&reference).unwrap(), "@File/src/app.ts");
    }
}
