//! Resolution of a `Reply Required` section into file requests.
//!
//! Stages run in order and the first one that produces a result wins:
//!
//! 1. `json`: structured array/object recovered from the text.
//! 2. `prose_list`: a numbered or bulleted list of sentences. Produces an
//!    explicit empty result so narration is never mistaken for paths.
//! 3. `key_pairs`: regex extraction of `"path"` / `"type"` pairs from JSON
//!    that failed to parse.
//! 4. `lines`: one quoted or bare path per line.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::core::json_scan::recover_json;
use crate::core::types::{FileRequest, RequestKind};

/// One step of the recovery chain.
pub struct Stage {
    pub name: &'static str,
    pub applies: fn(&str) -> bool,
    pub extract: fn(&str) -> Option<Vec<FileRequest>>,
}

pub const STAGES: &[Stage] = &[
    Stage {
        name: "json",
        applies: has_json_structure,
        extract: extract_json,
    },
    Stage {
        name: "prose_list",
        applies: looks_like_list,
        extract: extract_prose_list,
    },
    Stage {
        name: "key_pairs",
        applies: has_path_key,
        extract: extract_key_pairs,
    },
    Stage {
        name: "lines",
        applies: has_content,
        extract: extract_lines,
    },
];

static LIST_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\d+[.)]|[-*•])\s+").expect("list item regex should be valid")
});
static PATH_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:path|filePath)"\s*:\s*"([^"]+)""#).expect("path key regex should be valid")
});
static TYPE_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""type"\s*:\s*"([^"]+)""#).expect("type key regex should be valid")
});
static QUOTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""([^"]+)"|'([^']+)'|`([^`]+)`"#).expect("quoted regex should be valid")
});
static BARE_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_\-/.]+$").expect("bare path regex should be valid")
});

/// Run the stage chain. Never fails; the worst case is an empty list.
pub fn resolve(text: &str) -> Vec<FileRequest> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    for stage in STAGES {
        if !(stage.applies)(text) {
            continue;
        }
        if let Some(found) = (stage.extract)(text) {
            tracing::debug!(
                stage = stage.name,
                count = found.len(),
                "resolved reply-required section"
            );
            return found;
        }
    }
    Vec::new()
}

/// Convert one JSON item (object with `path`/`filePath`, or bare string).
pub fn request_from_value(item: &Value) -> Option<FileRequest> {
    match item {
        Value::String(path) => non_empty(path).map(FileRequest::file),
        Value::Object(map) => {
            let path = map
                .get("path")
                .or_else(|| map.get("filePath"))
                .and_then(Value::as_str)
                .and_then(non_empty)?;
            let kind = map
                .get("type")
                .and_then(Value::as_str)
                .and_then(RequestKind::from_wire)
                .unwrap_or(RequestKind::FileContent);
            Some(FileRequest {
                kind,
                path: path.to_string(),
            })
        }
        _ => None,
    }
}

/// Collect requests from a parsed JSON value (array of items or single object).
pub fn requests_from_value(value: &Value) -> Vec<FileRequest> {
    match value {
        Value::Array(items) => items.iter().filter_map(request_from_value).collect(),
        other => request_from_value(other).into_iter().collect(),
    }
}

fn non_empty(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn has_json_structure(text: &str) -> bool {
    text.contains('[') || text.contains('{')
}

/// JSON that names no paths is not a result, so later stages still run.
fn extract_json(text: &str) -> Option<Vec<FileRequest>> {
    let found = requests_from_value(&recover_json(text)?);
    (!found.is_empty()).then_some(found)
}

fn looks_like_list(text: &str) -> bool {
    !has_json_structure(text) && text.lines().any(|line| LIST_ITEM_RE.is_match(line))
}

/// Lists whose items read as sentences are narration, not paths.
fn extract_prose_list(text: &str) -> Option<Vec<FileRequest>> {
    let is_prose = text
        .lines()
        .filter(|line| LIST_ITEM_RE.is_match(line))
        .map(|line| LIST_ITEM_RE.replace(line, "").trim().to_string())
        .any(|body| body.contains(char::is_whitespace));
    is_prose.then(Vec::new)
}

fn has_path_key(text: &str) -> bool {
    text.contains("\"path\"") || text.contains("\"filePath\"")
}

/// Pair the n-th path with the n-th type, defaulting to file content.
fn extract_key_pairs(text: &str) -> Option<Vec<FileRequest>> {
    let kinds: Vec<Option<RequestKind>> = TYPE_KEY_RE
        .captures_iter(text)
        .map(|caps| RequestKind::from_wire(&caps[1]))
        .collect();
    let found: Vec<FileRequest> = PATH_KEY_RE
        .captures_iter(text)
        .enumerate()
        .map(|(idx, caps)| FileRequest {
            kind: kinds
                .get(idx)
                .copied()
                .flatten()
                .unwrap_or(RequestKind::FileContent),
            path: caps[1].trim().to_string(),
        })
        .collect();
    (!found.is_empty()).then_some(found)
}

fn has_content(text: &str) -> bool {
    !text.trim().is_empty()
}

fn extract_lines(text: &str) -> Option<Vec<FileRequest>> {
    let found: Vec<FileRequest> = text.lines().filter_map(path_from_line).collect();
    (!found.is_empty()).then_some(found)
}

fn path_from_line(line: &str) -> Option<FileRequest> {
    let stripped = LIST_ITEM_RE.replace(line, "");
    let trimmed = stripped.trim().trim_end_matches(',').trim();
    if trimmed.is_empty()
        || trimmed.starts_with('{')
        || trimmed.chars().all(|c| "[]{},;:".contains(c))
    {
        return None;
    }
    if ["\"type\"", "\"path\"", "FILE_CONTENT", "DIRECTORY_LISTING"]
        .iter()
        .any(|key| trimmed.contains(key))
    {
        return None;
    }
    if let Some(caps) = QUOTED_RE.captures(trimmed) {
        let quoted = caps
            .iter()
            .skip(1)
            .flatten()
            .next()
            .map_or("", |m| m.as_str());
        return non_empty(quoted).map(FileRequest::file);
    }
    BARE_PATH_RE
        .is_match(trimmed)
        .then(|| FileRequest::file(trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(requests: &[FileRequest]) -> Vec<&str> {
        requests.iter().map(|r| r.path.as_str()).collect()
    }

    #[test]
    fn json_stage_reads_typed_objects_and_strings() {
        let text = r#"[{"type":"DIRECTORY_LISTING","path":"src"}, "main.go", {"filePath":"x/y.go"}]"#;
        let found = extract_json(text).expect("json");
        assert_eq!(
            found,
            vec![
                FileRequest::listing("src"),
                FileRequest::file("main.go"),
                FileRequest::file("x/y.go"),
            ]
        );
    }

    #[test]
    fn json_stage_tolerates_prose_and_fences() {
        let text = "I need these:\n```json\n[\u{201C}a.go\u{201D}]\n```\nthanks";
        assert_eq!(paths(&resolve(text)), vec!["a.go"]);
    }

    #[test]
    fn prose_list_yields_no_requests() {
        let text = "1. Look at the handler first\n2. Then check the proto";
        assert!(looks_like_list(text));
        assert_eq!(extract_prose_list(text), Some(Vec::new()));
        assert!(resolve(text).is_empty());
    }

    #[test]
    fn bulleted_paths_fall_through_to_lines() {
        let text = "- src/a.go\n- src/b.go";
        assert_eq!(extract_prose_list(text), None);
        assert_eq!(paths(&resolve(text)), vec!["src/a.go", "src/b.go"]);
    }

    #[test]
    fn key_pairs_recover_broken_json() {
        let text = r#"[{"type": "FILE_CONTENT", "path": "a.go"}, {"type": "DIRECTORY_LISTING", "path": "pkg"},"#;
        assert!(extract_json(text).is_none());
        assert_eq!(
            resolve(text),
            vec![FileRequest::file("a.go"), FileRequest::listing("pkg")]
        );
    }

    #[test]
    fn line_fallback_accepts_quoted_and_bare_paths() {
        let text = "\"server/main.go\"\nproto/service.proto\nplease and thanks\n,";
        assert_eq!(
            paths(&resolve(text)),
            vec!["server/main.go", "proto/service.proto"]
        );
    }

    #[test]
    fn json_without_paths_falls_through_to_lines() {
        let text = "{\"files\": [\"a.go\"]}\nsrc/b.go";
        assert_eq!(extract_json(text), None);
        assert_eq!(paths(&resolve(text)), vec!["src/b.go"]);
    }

    #[test]
    fn apostrophe_inside_double_quotes_is_kept() {
        let text = "\"it's.go\"\n'single.go'";
        assert_eq!(paths(&resolve(text)), vec!["it's.go", "single.go"]);
    }

    #[test]
    fn empty_section_resolves_to_nothing() {
        assert!(resolve("  \n ").is_empty());
    }
}
