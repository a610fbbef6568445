//! Ranking of existing paths against a path that was not found.

use similar::TextDiff;

/// Maximum number of suggestions attached to a not-found placeholder.
pub const MAX_SUGGESTIONS: usize = 5;

/// Minimum character-level similarity of file names for a fuzzy match.
const MIN_NAME_RATIO: f32 = 0.6;

fn split_name(path: &str) -> (&str, &str, &str) {
    let (dir, name) = path.rsplit_once('/').unwrap_or(("", path));
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, ext),
        _ => (name, ""),
    };
    (dir, stem, ext)
}

/// Score `candidate` as a replacement for `target`. `0` means unrelated.
///
/// A name signal (same file name, stem containment or a close spelling) is
/// required; extension and directory overlap only add weight on top of it.
pub fn score(target: &str, candidate: &str) -> u32 {
    let (target_dir, target_stem, target_ext) = split_name(target);
    let (candidate_dir, candidate_stem, candidate_ext) = split_name(candidate);
    let target_name = target.rsplit('/').next().unwrap_or(target);
    let candidate_name = candidate.rsplit('/').next().unwrap_or(candidate);

    let ratio = TextDiff::from_chars(
        target_name.to_lowercase().as_str(),
        candidate_name.to_lowercase().as_str(),
    )
    .ratio();
    let same_name = target_name == candidate_name;
    let contains_stem = !target_stem.is_empty() && candidate_stem.contains(target_stem);
    if !same_name && !contains_stem && ratio < MIN_NAME_RATIO {
        return 0;
    }

    let mut total = 0u32;
    if same_name {
        total += 100;
    }
    if !target_ext.is_empty() && target_ext == candidate_ext {
        total += 50;
    }
    if contains_stem {
        total += 30;
    }
    let shared_dirs = target_dir
        .split('/')
        .zip(candidate_dir.split('/'))
        .filter(|(a, b)| !a.is_empty() && a == b)
        .count();
    total += 10 * shared_dirs as u32;
    total += (ratio * 20.0).round() as u32;
    total
}

/// Best-scoring candidates, highest first, ties broken by path.
pub fn rank<'a, I>(target: &str, candidates: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut scored: Vec<(u32, &str)> = candidates
        .into_iter()
        .map(|candidate| (score(target, candidate), candidate))
        .filter(|(score, _)| *score > 0)
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    scored
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, path)| path.to_string())
        .collect()
}
