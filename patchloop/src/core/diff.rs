//! Unified diffs of applied changes.

use similar::TextDiff;

/// Render a unified diff between two versions of `path`.
///
/// Returns an empty string when the contents are identical.
pub fn unified_diff(path: &str, old: &str, new: &str) -> String {
    if old == new {
        return String::new();
    }
    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{path}"), &format!("b/{path}"))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::patch_apply::{PatchOptions, apply};

    fn round_trip(old: &str, new: &str) {
        let diff = unified_diff("f.txt", old, new);
        let result = apply(
            &diff,
            |path: &str| (path == "f.txt").then(|| old.to_string()),
            PatchOptions {
                strict_context: true,
            },
        )
        .unwrap_or_else(|err| panic!("apply failed: {err}\n{diff}"));
        assert_eq!(result.get("f.txt"), Some(new), "diff was:\n{diff}");
    }

    #[test]
    fn identical_contents_have_no_diff() {
        assert_eq!(unified_diff("a", "x\n", "x\n"), "");
    }

    #[test]
    fn diff_has_prefixed_headers() {
        let diff = unified_diff("src/lib.rs", "a\n", "b\n");
        assert!(diff.starts_with("--- a/src/lib.rs\n+++ b/src/lib.rs\n"));
    }

    #[test]
    fn applying_a_generated_diff_reproduces_the_target() {
        let old = (1..=30).map(|n| format!("line {n}\n")).collect::<String>();
        let new = old
            .replace("line 3\n", "line three\n")
            .replace("line 15\n", "")
            .replace("line 28\n", "line 28\ninserted\n");
        round_trip(&old, &new);
    }

    #[test]
    fn trailing_newline_changes_survive_the_round_trip() {
        round_trip("a\nb", "a\nb\n");
        round_trip("a\nb\n", "a\nc");
        round_trip("a\n", "a\nb\nc");
    }

    #[test]
    fn emptying_and_filling_a_file() {
        round_trip("a\nb\n", "");
        round_trip("", "fresh\n");
    }
}
