//! CLI tests for the `patchloop` binary.
//!
//! Spawns the binary and checks output and exit codes.

use std::fs;
use std::process::Command;

use patchloop::exit_codes;

fn patchloop() -> Command {
    Command::new(env!("CARGO_BIN_EXE_patchloop"))
}

#[test]
fn parse_prints_structured_turn() {
    let temp = tempfile::tempdir().expect("tempdir");
    let response = temp.path().join("response.txt");
    fs::write(
        &response,
        "%_Plan_%\nlook\n%_Reply Required_%\n[\"src/a.go\", \"src/a.go\"]\n",
    )
    .expect("seed");

    let output = patchloop()
        .arg("parse")
        .arg(&response)
        .output()
        .expect("patchloop parse");
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(value["plan"], "look");
    assert_eq!(value["required_files"].as_array().map(Vec::len), Some(1));
    assert_eq!(value["required_files"][0]["type"], "FILE_CONTENT");
}

#[test]
fn apply_is_a_dry_run_without_write() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("f.txt"), "old\nkeep\n").expect("seed");
    let patch = temp.path().join("fix.patch");
    fs::write(&patch, "--- a/f.txt\n+++ b/f.txt\n@@ -1,2 +1,2 @@\n-old\n+new\n keep\n")
        .expect("seed");

    let output = patchloop()
        .args(["apply", "--workdir"])
        .arg(temp.path())
        .arg("--patch")
        .arg(&patch)
        .output()
        .expect("patchloop apply");
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "--- f.txt\nnew\nkeep\n"
    );
    assert_eq!(
        fs::read_to_string(temp.path().join("f.txt")).expect("read"),
        "old\nkeep\n"
    );

    let status = patchloop()
        .args(["apply", "--write", "--workdir"])
        .arg(temp.path())
        .arg("--patch")
        .arg(&patch)
        .status()
        .expect("patchloop apply --write");
    assert_eq!(status.code(), Some(exit_codes::OK));
    assert_eq!(
        fs::read_to_string(temp.path().join("f.txt")).expect("read"),
        "new\nkeep\n"
    );
}

#[test]
fn strict_apply_fails_on_mismatch() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("f.txt"), "other\n").expect("seed");
    let patch = temp.path().join("fix.patch");
    fs::write(&patch, "--- a/f.txt\n+++ b/f.txt\n@@ -1 +1 @@\n-old\n+new\n").expect("seed");

    let output = patchloop()
        .args(["apply", "--strict", "--workdir"])
        .arg(temp.path())
        .arg("--patch")
        .arg(&patch)
        .output()
        .expect("patchloop apply --strict");
    assert_eq!(output.status.code(), Some(exit_codes::ERROR));
    assert!(String::from_utf8_lossy(&output.stderr).contains("REMOVAL_MISMATCH"));
}

#[test]
fn init_config_refuses_to_overwrite() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("patchloop.toml");
    let status = patchloop()
        .arg("init-config")
        .arg(&path)
        .status()
        .expect("init-config");
    assert_eq!(status.code(), Some(exit_codes::OK));
    assert!(fs::read_to_string(&path).expect("read").contains("max_turns = 15"));

    let status = patchloop()
        .arg("init-config")
        .arg(&path)
        .status()
        .expect("init-config again");
    assert_eq!(status.code(), Some(exit_codes::ERROR));
}

#[cfg(unix)]
mod run {
    use super::*;

    fn write_generator_config(dir: &std::path::Path, script: &str) -> std::path::PathBuf {
        let script_path = dir.join("generator.sh");
        fs::write(&script_path, script).expect("script");
        let config = dir.join("patchloop.toml");
        fs::write(
            &config,
            format!(
                "max_turns = 3\n[generator]\ncommand = [\"sh\", \"{}\"]\ntimeout_secs = 30\n",
                script_path.display()
            ),
        )
        .expect("config");
        config
    }

    #[test]
    fn run_completes_with_command_generator() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workdir = temp.path().join("work");
        fs::create_dir_all(&workdir).expect("workdir");
        let config = write_generator_config(temp.path(), "cat >/dev/null\necho '%%_Fin_%%'\n");
        let prompt = temp.path().join("prompt.md");
        fs::write(&prompt, "fix it").expect("prompt");

        let output = patchloop()
            .args(["run", "--workdir"])
            .arg(&workdir)
            .arg("--prompt")
            .arg(&prompt)
            .arg("--config")
            .arg(&config)
            .output()
            .expect("patchloop run");
        assert_eq!(output.status.code(), Some(exit_codes::OK));
        let summary: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
        assert_eq!(summary["reason"], "completed");
        assert_eq!(summary["turns"], 1);
    }

    #[test]
    fn run_reports_no_actionable_content() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = write_generator_config(temp.path(), "cat >/dev/null\necho 'no idea'\n");
        let prompt = temp.path().join("prompt.md");
        fs::write(&prompt, "fix it").expect("prompt");

        let status = patchloop()
            .args(["run", "--workdir"])
            .arg(temp.path())
            .arg("--prompt")
            .arg(&prompt)
            .arg("--config")
            .arg(&config)
            .status()
            .expect("patchloop run");
        assert_eq!(status.code(), Some(exit_codes::NO_ACTIONABLE_CONTENT));
    }

    #[test]
    fn run_fails_when_generator_fails() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = write_generator_config(temp.path(), "cat >/dev/null\nexit 7\n");
        let prompt = temp.path().join("prompt.md");
        fs::write(&prompt, "fix it").expect("prompt");

        let status = patchloop()
            .args(["run", "--workdir"])
            .arg(temp.path())
            .arg("--prompt")
            .arg(&prompt)
            .arg("--config")
            .arg(&config)
            .status()
            .expect("patchloop run");
        assert_eq!(status.code(), Some(exit_codes::ERROR));
    }
}
