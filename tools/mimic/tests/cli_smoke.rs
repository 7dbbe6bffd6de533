use assert_cmd::cargo::cargo_bin_cmd;

const KEY: &str = "5f1c0a6b8e2d4c3a9b7f6e5d4c3b2a19f8e7d6c5b4a3928170f6e5d4c3b2a190";

fn fixture(path: &str) -> String {
    format!("{}/tests/fixtures/{path}", env!("CARGO_MANIFEST_DIR"))
}

fn seeded_root() -> tempfile::TempDir {
    let temp = tempfile::tempdir().expect("tempdir");
    let vault = temp.path().join("recordings");
    std::fs::create_dir_all(&vault).expect("vault");
    std::fs::write(vault.join(format!("{KEY}.json")), br#"{"temp":21}"#).expect("seed");
    std::fs::write(vault.join("notes.txt"), "ignored").expect("seed");
    temp
}

#[test]
fn help_lists_subcommands() {
    let mut cmd = cargo_bin_cmd!("mimic");
    cmd.arg("--help");
    let out = cmd.assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).expect("utf8");

    for command in ["list", "show", "clear", "functions"] {
        assert!(stdout.contains(command), "{command} missing from help");
    }
    assert!(stdout.contains("--vault"));
}

#[test]
fn list_and_show_read_the_configured_vault() {
    let root = seeded_root();

    let mut cmd = cargo_bin_cmd!("mimic");
    cmd.arg("--config")
        .arg(fixture("configs/basic.toml"))
        .arg("--root")
        .arg(root.path())
        .arg("list");
    let out = cmd.assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).expect("utf8");
    assert!(stdout.starts_with(KEY));
    assert!(stdout.contains("1 recording(s)"));
    assert!(!stdout.contains("notes"));

    let mut cmd = cargo_bin_cmd!("mimic");
    cmd.arg("--config")
        .arg(fixture("configs/basic.toml"))
        .arg("--root")
        .arg(root.path())
        .arg("show")
        .arg(KEY);
    let out = cmd.assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).expect("utf8");
    assert!(stdout.contains("\"temp\": 21"));
}

#[test]
fn clear_deletes_the_vault_directory() {
    let root = seeded_root();
    let mut cmd = cargo_bin_cmd!("mimic");
    cmd.arg("--root")
        .arg(root.path())
        .arg("--vault")
        .arg("recordings")
        .arg("clear");
    let out = cmd.assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).expect("utf8");
    assert!(stdout.starts_with("removed 1 recording(s)"), "{stdout}");
    assert!(!root.path().join("recordings").exists());
}

#[test]
fn functions_prints_configured_paths() {
    let mut cmd = cargo_bin_cmd!("mimic");
    cmd.arg("--config")
        .arg(fixture("configs/basic.toml"))
        .arg("functions");
    let out = cmd.assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).expect("utf8");
    assert!(stdout.contains("weather::client:fetch_forecast"));
    assert!(stdout.contains("models::inference:Model.predict"));
}

#[test]
fn invalid_configs_exit_nonzero() {
    for config in [
        "configs/missing.toml",
        "configs/bad-function.toml",
        "configs/unknown-section.toml",
    ] {
        let mut cmd = cargo_bin_cmd!("mimic");
        cmd.arg("--config").arg(fixture(config)).arg("functions");
        cmd.assert().failure();
    }
}

#[test]
fn show_of_unknown_fingerprint_fails() {
    let root = seeded_root();
    let mut cmd = cargo_bin_cmd!("mimic");
    cmd.arg("--root")
        .arg(root.path())
        .arg("show")
        .arg("a".repeat(64));
    let out = cmd.assert().failure();
    let stderr = String::from_utf8(out.get_output().stderr.clone()).expect("utf8");
    assert!(stderr.contains("recording not found"));
}
