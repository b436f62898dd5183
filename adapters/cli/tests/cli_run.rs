use std::{path::PathBuf, process::Command};

fn bundled(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../configs")
        .join(name)
}

fn spheroid(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_spheroid"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to launch the spheroid binary")
}

#[test]
fn json_mode_streams_one_report_per_interval() {
    let config = bundled("oxygen.toml");
    let output = spheroid(&[
        "--config",
        config.to_str().expect("utf-8 path"),
        "--ticks",
        "75",
        "--json",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout).expect("utf-8 stdout");
    let ticks: Vec<u64> = stdout
        .lines()
        .map(|line| {
            let report: serde_json::Value = serde_json::from_str(line).expect("json line");
            report["tick"].as_u64().expect("numeric tick")
        })
        .collect();
    assert_eq!(ticks, vec![25, 50, 75]);
}

#[test]
fn seed_flag_overrides_the_run_file() {
    let config = bundled("stemness.toml");
    let path = config.to_str().expect("utf-8 path");
    let run = |seed: &str| {
        let output = spheroid(&["--config", path, "--ticks", "200", "--json", "--seed", seed]);
        assert!(output.status.success());
        output.stdout
    };

    assert_eq!(run("5"), run("5"));
    assert_ne!(run("5"), run("6"));
}

#[test]
fn missing_run_file_is_reported() {
    let output = spheroid(&["--config", "does/not/exist.toml"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to read run file"));
}
