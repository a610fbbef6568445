//! File access for a repair session.
//!
//! The [`FileStore`] trait decouples the session loop from the filesystem.
//! [`DirFileStore`] serves a working directory and refuses paths that leave
//! it; tests use the in-memory store from `test_support`.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, instrument};
use walkdir::{DirEntry, WalkDir};

use crate::core::similarity::rank;

/// Directory names never listed or searched.
pub const SKIPPED_DIRS: &[&str] = &["node_modules", "vendor", "target"];

/// Depth bound for the similar-file search.
const SUGGESTION_DEPTH: usize = 5;

/// Abstraction over the tree a session reads and patches.
///
/// Paths are `/`-separated and relative to the store root.
pub trait FileStore {
    /// `Ok(None)` when the file does not exist.
    fn read(&self, path: &str) -> Result<Option<String>>;

    fn write(&self, path: &str, content: &str) -> Result<()>;

    /// Entries below `path` up to `depth` levels, directories suffixed with
    /// `/`. `Ok(None)` when the directory does not exist.
    fn list(&self, path: &str, depth: usize) -> Result<Option<Vec<String>>>;

    /// Existing paths that plausibly match a missing `path`.
    fn suggest_similar(&self, _path: &str) -> Vec<String> {
        Vec::new()
    }
}

impl<T: FileStore + ?Sized> FileStore for &T {
    fn read(&self, path: &str) -> Result<Option<String>> {
        (**self).read(path)
    }

    fn write(&self, path: &str, content: &str) -> Result<()> {
        (**self).write(path, content)
    }

    fn list(&self, path: &str, depth: usize) -> Result<Option<Vec<String>>> {
        (**self).list(path, depth)
    }

    fn suggest_similar(&self, path: &str) -> Vec<String> {
        (**self).suggest_similar(path)
    }
}

/// A working directory on disk.
#[derive(Debug, Clone)]
pub struct DirFileStore {
    root: PathBuf,
    max_file_bytes: u64,
}

impl DirFileStore {
    pub fn new(root: impl Into<PathBuf>, max_file_bytes: u64) -> Self {
        Self {
            root: root.into(),
            max_file_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join `rel` onto the root, rejecting absolute paths and `..`.
    fn resolve(&self, rel: &str) -> Result<PathBuf> {
        let rel = rel.trim();
        let rel = rel.strip_prefix("./").unwrap_or(rel);
        let mut out = self.root.clone();
        for component in Path::new(rel).components() {
            match component {
                Component::Normal(part) => out.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    bail!("path {rel:?} escapes the working directory");
                }
            }
        }
        Ok(out)
    }

    fn relative(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }
}

fn is_skipped(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    if name.starts_with('.') {
        return true;
    }
    entry.file_type().is_dir() && SKIPPED_DIRS.iter().any(|skip| *skip == name)
}

impl FileStore for DirFileStore {
    #[instrument(skip_all, fields(path = %path))]
    fn read(&self, path: &str) -> Result<Option<String>> {
        let full = self.resolve(path)?;
        if !full.is_file() {
            debug!("file not found");
            return Ok(None);
        }
        let size = fs::metadata(&full)
            .with_context(|| format!("stat {}", full.display()))?
            .len();
        if size > self.max_file_bytes {
            bail!(
                "{path} is {size} bytes, over the {} byte limit",
                self.max_file_bytes
            );
        }
        let content =
            fs::read_to_string(&full).with_context(|| format!("read {}", full.display()))?;
        Ok(Some(content))
    }

    #[instrument(skip_all, fields(path = %path, bytes = content.len()))]
    fn write(&self, path: &str, content: &str) -> Result<()> {
        let full = self.resolve(path)?;
        if full == self.root {
            bail!("cannot write to the working directory itself");
        }
        let parent = full
            .parent()
            .with_context(|| format!("path missing parent {}", full.display()))?;
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
        let file_name = full
            .file_name()
            .with_context(|| format!("path missing file name {}", full.display()))?;
        let tmp_path = parent.join(format!(".{}.patchloop.tmp", file_name.to_string_lossy()));
        fs::write(&tmp_path, content)
            .with_context(|| format!("write temp file {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &full).with_context(|| format!("replace {}", full.display()))?;
        debug!("file written");
        Ok(())
    }

    #[instrument(skip_all, fields(path = %path, depth))]
    fn list(&self, path: &str, depth: usize) -> Result<Option<Vec<String>>> {
        let full = self.resolve(path)?;
        if !full.is_dir() {
            return Ok(None);
        }
        let mut entries = Vec::new();
        let walker = WalkDir::new(&full)
            .min_depth(1)
            .max_depth(depth.max(1))
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_skipped(entry));
        for entry in walker {
            let entry = entry.with_context(|| format!("walk {}", full.display()))?;
            let Some(rel) = self.relative(entry.path()) else {
                continue;
            };
            if entry.file_type().is_dir() {
                entries.push(format!("{rel}/"));
            } else {
                entries.push(rel);
            }
        }
        Ok(Some(entries))
    }

    fn suggest_similar(&self, path: &str) -> Vec<String> {
        let candidates: Vec<String> = WalkDir::new(&self.root)
            .max_depth(SUGGESTION_DEPTH)
            .into_iter()
            .filter_entry(|entry| !is_skipped(entry))
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| self.relative(entry.path()))
            .collect();
        rank(path, candidates.iter().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, DirFileStore) {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = DirFileStore::new(temp.path(), 1024);
        (temp, store)
    }

    #[test]
    fn read_missing_is_none() {
        let (_temp, store) = store();
        assert_eq!(store.read("nope.go").expect("read"), None);
    }

    #[test]
    fn write_creates_parents_and_reads_back() {
        let (_temp, store) = store();
        store.write("pkg/a/b.go", "package a\n").expect("write");
        assert_eq!(
            store.read("./pkg/a/b.go").expect("read").as_deref(),
            Some("package a\n")
        );
    }

    #[test]
    fn escaping_paths_are_rejected() {
        let (_temp, store) = store();
        assert!(store.read("../etc/passwd").is_err());
        assert!(store.write("/tmp/x", "x").is_err());
    }

    #[test]
    fn oversized_files_are_refused() {
        let (temp, store) = store();
        fs::write(temp.path().join("big.txt"), "x".repeat(2048)).expect("seed");
        let err = store.read("big.txt").expect_err("limit");
        assert!(err.to_string().contains("byte limit"));
    }

    #[test]
    fn listing_skips_hidden_and_vendored_dirs() {
        let (temp, store) = store();
        for path in ["src/main.go", "src/util/str.go", ".git/HEAD", "vendor/x.go"] {
            let full = temp.path().join(path);
            fs::create_dir_all(full.parent().expect("parent")).expect("mkdir");
            fs::write(full, "x").expect("seed");
        }
        let root = store.list("", 2).expect("list").expect("dir");
        assert_eq!(root, vec!["src/", "src/main.go", "src/util/"]);
        let src = store.list("src", 1).expect("list").expect("dir");
        assert_eq!(src, vec!["src/main.go", "src/util/"]);
        assert_eq!(store.list("missing", 2).expect("list"), None);
    }

    #[test]
    fn suggestions_find_moved_files() {
        let (temp, store) = store();
        let full = temp.path().join("internal/server/handler.go");
        fs::create_dir_all(full.parent().expect("parent")).expect("mkdir");
        fs::write(full, "x").expect("seed");
        assert_eq!(
            store.suggest_similar("server/handler.go"),
            vec!["internal/server/handler.go"]
        );
    }
}
