//! Batch manifest parsing and validation.
//!
//! A manifest is a TOML file listing repair tasks. Relative paths are resolved
//! against the manifest's directory.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

/// Config file looked up in a task's working directory.
const DEFAULT_CONFIG_NAME: &str = "patchloop.toml";

/// A parsed manifest.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    #[serde(default)]
    pub defaults: TaskDefaults,
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
}

/// Settings applied to every task unless the task overrides them.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct TaskDefaults {
    /// Session config file. Falls back to `<workdir>/patchloop.toml`.
    pub config: Option<PathBuf>,
    pub max_turns: Option<u32>,
}

/// One repair task: a working directory and the prompt to start from.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TaskSpec {
    /// Unique identifier (slug format: `[a-z0-9_-]+`).
    pub id: String,
    pub workdir: PathBuf,
    /// File holding the initial prompt.
    pub prompt: PathBuf,
    pub config: Option<PathBuf>,
    pub max_turns: Option<u32>,
}

impl TaskSpec {
    pub fn config_path(&self, defaults: &TaskDefaults) -> PathBuf {
        self.config
            .clone()
            .or_else(|| defaults.config.clone())
            .unwrap_or_else(|| self.workdir.join(DEFAULT_CONFIG_NAME))
    }

    pub fn max_turns(&self, defaults: &TaskDefaults) -> Option<u32> {
        self.max_turns.or(defaults.max_turns)
    }
}

impl Manifest {
    /// Load, resolve relative paths and validate a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read manifest {}", path.display()))?;
        let mut manifest: Manifest = toml::from_str(&contents)
            .with_context(|| format!("parse manifest {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        manifest.resolve_paths(base);
        manifest
            .validate()
            .with_context(|| format!("validate manifest {}", path.display()))?;
        Ok(manifest)
    }

    #[cfg(test)]
    pub fn parse_str(contents: &str, base: &Path) -> Result<Self> {
        let mut manifest: Manifest = toml::from_str(contents).context("parse manifest")?;
        manifest.resolve_paths(base);
        manifest.validate()?;
        Ok(manifest)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        if let Some(config) = self.defaults.config.as_mut() {
            resolve(config);
        }
        for task in &mut self.tasks {
            resolve(&mut task.workdir);
            resolve(&mut task.prompt);
            if let Some(config) = task.config.as_mut() {
                resolve(config);
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.tasks.is_empty() {
            bail!("tasks must be a non-empty array");
        }
        if self.defaults.max_turns == Some(0) {
            bail!("defaults.max_turns must be > 0");
        }
        let mut ids = BTreeSet::new();
        let mut workdirs: Vec<(&str, PathBuf)> = Vec::with_capacity(self.tasks.len());
        for (index, task) in self.tasks.iter().enumerate() {
            validate_task_id(&task.id).with_context(|| format!("tasks[{index}] invalid"))?;
            if task.max_turns == Some(0) {
                bail!("tasks[{index}].max_turns must be > 0");
            }
            if !ids.insert(task.id.as_str()) {
                bail!("duplicate task id {}", task.id);
            }
            // Concurrent sessions must never patch the same tree.
            let workdir = normalize(&task.workdir);
            if let Some((other, _)) = workdirs
                .iter()
                .find(|(_, seen)| seen.starts_with(&workdir) || workdir.starts_with(seen))
            {
                bail!(
                    "task {} working directory {} overlaps task {other}",
                    task.id,
                    task.workdir.display()
                );
            }
            workdirs.push((task.id.as_str(), workdir));
        }
        Ok(())
    }
}

fn normalize(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.components().collect())
}

fn validate_task_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        bail!("id must be non-empty");
    }
    if !id
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_')
    {
        bail!("id must use [a-z0-9_-] only");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_resolves_relative_paths() {
        let input = r#"
[defaults]
max_turns = 8

[[tasks]]
id = "fix-handler"
workdir = "repos/handler"
prompt = "prompts/handler.md"

[[tasks]]
id = "fix-router"
workdir = "/abs/router"
prompt = "prompts/router.md"
max_turns = 3
config = "router.toml"
"#;
        let manifest = Manifest::parse_str(input, Path::new("/base")).expect("manifest");
        let handler = &manifest.tasks[0];
        assert_eq!(handler.workdir, PathBuf::from("/base/repos/handler"));
        assert_eq!(handler.max_turns(&manifest.defaults), Some(8));
        assert_eq!(
            handler.config_path(&manifest.defaults),
            PathBuf::from("/base/repos/handler/patchloop.toml")
        );
        let router = &manifest.tasks[1];
        assert_eq!(router.workdir, PathBuf::from("/abs/router"));
        assert_eq!(router.max_turns(&manifest.defaults), Some(3));
        assert_eq!(
            router.config_path(&manifest.defaults),
            PathBuf::from("/base/router.toml")
        );
    }

    #[test]
    fn rejects_shared_workdir() {
        let input = r#"
[[tasks]]
id = "a"
workdir = "repo"
prompt = "a.md"

[[tasks]]
id = "b"
workdir = "./repo"
prompt = "b.md"
"#;
        let err = Manifest::parse_str(input, Path::new("/base")).expect_err("shared workdir");
        assert!(err.to_string().contains("overlaps task a"));
    }

    #[test]
    fn rejects_nested_workdirs() {
        let input = r#"
[[tasks]]
id = "outer"
workdir = "repos"
prompt = "a.md"

[[tasks]]
id = "inner"
workdir = "repos/a"
prompt = "b.md"
"#;
        let err = Manifest::parse_str(input, Path::new("/base")).expect_err("nested workdir");
        assert!(err.to_string().contains("overlaps task outer"));

        let siblings = r#"
[[tasks]]
id = "a"
workdir = "repos/a"
prompt = "a.md"

[[tasks]]
id = "ab"
workdir = "repos/ab"
prompt = "b.md"
"#;
        assert!(Manifest::parse_str(siblings, Path::new("/base")).is_ok());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let input = r#"
[[tasks]]
id = "a"
workdir = "one"
prompt = "a.md"

[[tasks]]
id = "a"
workdir = "two"
prompt = "a.md"
"#;
        let err = Manifest::parse_str(input, Path::new("/base")).expect_err("duplicate");
        assert!(err.to_string().contains("duplicate task id"));
    }

    #[test]
    fn rejects_empty_manifest_and_bad_ids() {
        assert!(Manifest::parse_str("", Path::new("/base")).is_err());
        let input = r#"
[[tasks]]
id = "Bad Id"
workdir = "one"
prompt = "a.md"
"#;
        assert!(Manifest::parse_str(input, Path::new("/base")).is_err());
    }
}
