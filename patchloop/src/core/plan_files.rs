//! File references mentioned inside a plan section.
//!
//! Used only when a turn carries a plan but no explicit file requests.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::FileRequest;

/// Extensions accepted for bare `dir/file.ext` references.
pub const SOURCE_EXTENSIONS: &[&str] = &[
    "go", "ts", "js", "tpl", "yaml", "yml", "proto", "py", "java", "cpp", "h", "c", "json",
    "xml", "html", "css", "rs", "toml", "md",
];

static REVIEW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)REVIEW_FILE_CONTENT[:\s]+[`"']([^`"']+)[`"']"#)
        .expect("review directive regex should be valid")
});
static REQUEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)REQUEST_FILE_CONTENT.*?["']filePath["']\s*:\s*["']([^"']+)["']"#)
        .expect("request directive regex should be valid")
});
static BACKTICK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"`([^`\s]+\.[A-Za-z0-9]+)`").expect("backtick regex should be valid")
});
static BARE_RE: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        r"\b([\w\-]+/[\w\-/.]*\.(?:{}))\b",
        SOURCE_EXTENSIONS.join("|")
    );
    Regex::new(&pattern).expect("bare reference regex should be valid")
});

/// Collect file references from `plan`, in pattern order, deduplicated.
pub fn files_from_plan(plan: &str) -> Vec<FileRequest> {
    let mut found: Vec<String> = Vec::new();
    let mut push = |path: &str| {
        let path = path.trim();
        if !path.is_empty() && !found.iter().any(|seen| seen == path) {
            found.push(path.to_string());
        }
    };

    for caps in REVIEW_RE.captures_iter(plan) {
        push(&caps[1]);
    }
    for caps in REQUEST_RE.captures_iter(plan) {
        push(&caps[1]);
    }
    for caps in BACKTICK_RE.captures_iter(plan) {
        let token = &caps[1];
        if token.contains('/') || has_source_extension(token) {
            push(token);
        }
    }
    for caps in BARE_RE.captures_iter(plan) {
        push(&caps[1]);
    }

    found.into_iter().map(FileRequest::file).collect()
}

fn has_source_extension(token: &str) -> bool {
    token
        .rsplit_once('.')
        .is_some_and(|(_, ext)| SOURCE_EXTENSIONS.contains(&ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(plan: &str) -> Vec<String> {
        files_from_plan(plan).into_iter().map(|r| r.path).collect()
    }

    #[test]
    fn review_directive_is_extracted() {
        assert_eq!(
            paths("1. REVIEW_FILE_CONTENT: \"server/handler.go\" for the bug"),
            vec!["server/handler.go"]
        );
    }

    #[test]
    fn request_directive_with_embedded_field() {
        let plan = r#"REQUEST_FILE_CONTENT {"filePath": "proto/api.proto"}"#;
        assert_eq!(paths(plan), vec!["proto/api.proto"]);
    }

    #[test]
    fn backticks_and_bare_references_are_deduplicated() {
        let plan = "Edit `pkg/client.go`, then pkg/client.go again, then `config.yaml` and web/app.ts.";
        assert_eq!(
            paths(plan),
            vec!["pkg/client.go", "config.yaml", "web/app.ts"]
        );
    }

    #[test]
    fn unknown_extensions_and_prose_are_skipped() {
        assert!(paths("Think about `v1.2` and docs/notes.xyz carefully").is_empty());
    }
}
