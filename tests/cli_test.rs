//! End-to-end tests for the `hgrc-settings` binary.
//!
//! Every command runs with `HGRCPATH` pointing at a temporary file so the
//! machine's own system and user configuration never leak in.

use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const HGRC: &str = include_str!("../hgrc");

fn setup(content: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hgrc");
    fs::write(&path, content).unwrap();
    (dir, path)
}

fn hgrc_cmd(dir: &Path, config: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("hgrc-settings");
    cmd.current_dir(dir).env("HGRCPATH", config).env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_show_single_value() {
    let (dir, config) = setup(HGRC);
    hgrc_cmd(dir.path(), &config)
        .args(["show", "ui.username"])
        .assert()
        .success()
        .stdout("Your Name <you@example.com>\n");
}

#[test]
fn test_show_missing_value_exits_nonzero() {
    let (dir, config) = setup(HGRC);
    hgrc_cmd(dir.path(), &config)
        .args(["show", "ui.nosuchkey"])
        .assert()
        .code(1)
        .stdout("");
}

#[test]
fn test_show_section_and_debug_sources() {
    let (dir, config) = setup(HGRC);
    hgrc_cmd(dir.path(), &config)
        .args(["show", "extensions"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("extensions.color=\nextensions.pager=\n"));

    hgrc_cmd(dir.path(), &config)
        .args(["show", "--debug", "ui.verbose"])
        .assert()
        .success()
        .stdout(predicate::str::ends_with("hgrc:5: True\n"));
}

#[test]
fn test_config_override_wins() {
    let (dir, config) = setup(HGRC);
    hgrc_cmd(dir.path(), &config)
        .args(["--config", "ui.verbose=False", "show", "--debug", "ui.verbose"])
        .assert()
        .success()
        .stdout("--config: False\n");
}

#[test]
fn test_validate_passes_and_fails() {
    let (dir, config) = setup(HGRC);
    hgrc_cmd(dir.path(), &config)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));

    let (bad_dir, bad) = setup("[diff]\ngit = maybe\n[extensions]\nnosuchext =\n");
    hgrc_cmd(bad_dir.path(), &bad)
        .arg("validate")
        .assert()
        .failure()
        .stdout(predicate::str::contains("diff.git is not a boolean ('maybe')"))
        .stdout(predicate::str::contains("nosuchext"));
}

#[test]
fn test_set_and_unset_with_explicit_file() {
    let (dir, config) = setup(HGRC);
    let target = dir.path().join("personal.rc");
    fs::write(&target, "# personal overrides\n[ui]\nverbose = False\n").unwrap();

    hgrc_cmd(dir.path(), &config)
        .args(["set", "ui.username", "Jane Doe <jane@example.com>", "--file"])
        .arg(&target)
        .assert()
        .success();
    assert_eq!(
        fs::read_to_string(&target).unwrap(),
        "# personal overrides\n[ui]\nverbose = False\nusername = Jane Doe <jane@example.com>\n"
    );

    hgrc_cmd(dir.path(), &config)
        .args(["unset", "ui.verbose", "--file"])
        .arg(&target)
        .assert()
        .success();
    assert_eq!(
        fs::read_to_string(&target).unwrap(),
        "# personal overrides\n[ui]\nusername = Jane Doe <jane@example.com>\n"
    );
}

#[test]
fn test_merge_tool_lookup() {
    let (dir, config) = setup("[merge-patterns]\n**.png = internal:other\n** = internal:merge\n");
    hgrc_cmd(dir.path(), &config)
        .args(["merge-tool", "assets/logo.png"])
        .assert()
        .success()
        .stdout("internal:other\n");

    hgrc_cmd(dir.path(), &config)
        .args(["merge-tool", "src/main.rs"])
        .assert()
        .success()
        .stdout("internal:merge\n");

    let (empty_dir, empty) = setup("[ui]\n");
    hgrc_cmd(empty_dir.path(), &empty)
        .args(["merge-tool", "src/main.rs"])
        .assert()
        .code(1);
}

#[test]
fn test_export_json_and_paths() {
    let (dir, config) = setup(HGRC);
    let output = dir.path().join("settings.json");
    hgrc_cmd(dir.path(), &config)
        .arg("export")
        .arg(&output)
        .assert()
        .success();
    let exported: serde_json::Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(exported["pager"]["pager"], "less -FRX");

    hgrc_cmd(dir.path(), &config)
        .arg("paths")
        .assert()
        .success()
        .stdout(predicate::str::contains(config.to_string_lossy().to_string()));
}

#[test]
fn test_malformed_config_option_is_rejected() {
    let (dir, config) = setup(HGRC);
    hgrc_cmd(dir.path(), &config)
        .args(["--config", "verbose", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("malformed --config option"));
}

#[test]
fn test_init_with_explicit_file() {
    let (dir, config) = setup("");
    let target = dir.path().join("new.rc");

    hgrc_cmd(dir.path(), &config)
        .args(["init", "--username", "Jane Doe <jane@example.com>", "--file"])
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote default settings"));
    let written = fs::read_to_string(&target).unwrap();
    assert!(written.contains("username = Jane Doe <jane@example.com>\n"));
    assert!(written.contains("[merge-patterns]\n"));

    hgrc_cmd(dir.path(), &config)
        .args(["init", "--file"])
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
    assert_eq!(fs::read_to_string(&target).unwrap(), written);
}

#[test]
fn test_import_into_explicit_file() {
    let (dir, config) = setup(HGRC);
    let input = dir.path().join("settings.json");
    fs::write(&input, r#"{"ui": {"verbose": false}, "pager": {"pager": "more"}}"#).unwrap();
    let target = dir.path().join("personal.rc");
    fs::write(&target, "# mine\n[ui]\nverbose = True\n").unwrap();

    hgrc_cmd(dir.path(), &config)
        .arg("import")
        .arg(&input)
        .arg("--file")
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 2 settings"));
    assert_eq!(
        fs::read_to_string(&target).unwrap(),
        "# mine\n[ui]\nverbose = False\n\n[pager]\npager = more\n"
    );

    let bad = dir.path().join("bad.json");
    fs::write(&bad, r#"{"ui": {"a=b": "c"}}"#).unwrap();
    hgrc_cmd(dir.path(), &config)
        .arg("import")
        .arg(&bad)
        .arg("--file")
        .arg(&target)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid key 'a=b'"));
    assert_eq!(
        fs::read_to_string(&target).unwrap(),
        "# mine\n[ui]\nverbose = False\n\n[pager]\npager = more\n"
    );
}

#[test]
fn test_set_refuses_bad_names() {
    let (dir, config) = setup(HGRC);
    hgrc_cmd(dir.path(), &config)
        .args(["set", "ui.#comment", "x", "--file"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid key '#comment'"));
    assert_eq!(fs::read_to_string(&config).unwrap(), HGRC);
}

#[test]
fn test_summary_lists_layers_and_settings() {
    let (dir, config) = setup(HGRC);
    hgrc_cmd(dir.path(), &config)
        .arg("summary")
        .assert()
        .success()
        .stdout(predicate::str::contains("Mercurial Settings Summary"))
        .stdout(predicate::str::contains(config.to_string_lossy().to_string()))
        .stdout(predicate::str::contains("Your Name <you@example.com>"))
        .stdout(predicate::str::contains("rebase ("))
        .stdout(predicate::str::contains("Pager: less -FRX"))
        .stdout(predicate::str::contains("bitbucket.org: 1 pin(s) (sha256)"));
}

#[test]
fn test_local_writes_repository_hgrc() {
    let (dir, config) = setup(HGRC);
    fs::create_dir_all(dir.path().join(".hg")).unwrap();

    hgrc_cmd(dir.path(), &config)
        .args(["set", "ui.username", "Repo <repo@example.com>", "--local"])
        .assert()
        .success();
    assert_eq!(
        fs::read_to_string(dir.path().join(".hg").join("hgrc")).unwrap(),
        "[ui]\nusername = Repo <repo@example.com>\n"
    );

    hgrc_cmd(dir.path(), &config)
        .args(["show", "--debug", "ui.username"])
        .assert()
        .success()
        .stdout(predicate::str::ends_with("hgrc:2: Repo <repo@example.com>\n"));

    let (outside, outside_config) = setup(HGRC);
    hgrc_cmd(outside.path(), &outside_config)
        .args(["set", "ui.username", "x", "--local"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no Mercurial repository"));
}
