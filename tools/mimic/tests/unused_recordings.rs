use mimic::config::{load_config, CliOverrides};
use mimic::runtime::{FileSystem, ProductionFileSystem};
use mimic::{FunctionIdentity, MimicError};
use std::path::PathBuf;
use std::sync::Arc;

fn double(args: &mut (i32,)) -> i32 {
    args.0 * 2
}

#[test]
fn configured_run_reports_cleans_and_fails_on_stale_recordings() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config_path = temp.path().join("mimic.toml");
    std::fs::write(
        &config_path,
        r#"
[vault]
path = "vault"

[record]
enabled = true
env_var = ""

[unused]
report_path = "target/unused.json"
clean = true
fail = true

[logging]
path = "target/mimic.jsonl"
"#,
    )
    .expect("write config");

    let overrides = CliOverrides {
        config_path: Some(config_path),
        ..CliOverrides::default()
    };
    let resolved =
        load_config(&overrides, temp.path(), &ProductionFileSystem).expect("load config");
    let mimic = resolved.build_mimic(Arc::new(ProductionFileSystem));
    let wrapped = mimic
        .intercept(FunctionIdentity::free("math", "double"), double)
        .expect("intercept");
    for n in 1..=3 {
        wrapped.call::<_, i32>(&mut (n,)).expect("record");
    }

    // A later run only touches one recording.
    mimic.reset_usage();
    mimic.set_recording(false);
    assert_eq!(wrapped.call::<_, i32>(&mut (3,)).expect("replay"), 6);
    assert_eq!(mimic.unused_recordings().expect("unused").len(), 2);

    let err = mimic
        .finish_run(&resolved.unused_policy(), &ProductionFileSystem)
        .expect_err("stale recordings fail the run");
    match err {
        MimicError::UnusedRecordings { count, vault } => {
            assert_eq!(count, 2);
            assert_eq!(vault, temp.path().join("vault"));
        }
        other => panic!("unexpected error: {other}"),
    }

    let report = ProductionFileSystem
        .read_to_string(&temp.path().join("target/unused.json"))
        .expect("report");
    let parsed: serde_json::Value = serde_json::from_str(&report).expect("json");
    assert_eq!(parsed["unused"].as_array().map(Vec::len), Some(2));
    assert_eq!(mimic.store().enumerate().expect("enumerate").len(), 1);

    let log = std::fs::read_to_string(temp.path().join("target/mimic.jsonl")).expect("log");
    assert!(log.contains("\"event_type\":\"record\""));
    assert!(log.contains("\"event_type\":\"replay\""));
    assert!(log.contains("\"event_type\":\"unused_cleaned\""));
}

#[test]
fn replayed_recordings_leave_the_unused_set() {
    let temp = tempfile::tempdir().expect("tempdir");
    let vault = PathBuf::from(temp.path()).join("vault");
    let overrides = CliOverrides {
        vault: Some(vault),
        ..CliOverrides::default()
    };
    let resolved = load_config(&overrides, temp.path(), &ProductionFileSystem).expect("load");
    let mimic = resolved.build_mimic(Arc::new(ProductionFileSystem));
    mimic.set_recording(true);
    let wrapped = mimic
        .intercept(FunctionIdentity::free("math", "double"), double)
        .expect("intercept");
    wrapped.call::<_, i32>(&mut (10,)).expect("record");

    mimic.reset_usage();
    assert_eq!(mimic.unused_recordings().expect("unused").len(), 1);
    wrapped.call::<_, i32>(&mut (10,)).expect("replay");
    assert!(mimic.unused_recordings().expect("unused").is_empty());
    assert_eq!(mimic.clear_unused_recordings().expect("clean"), 0);
}
