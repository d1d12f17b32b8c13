// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command-line tests running the built `costplane` binary.

use std::path::Path;
use std::process::{Command, Output};

const BIN: &str = env!("CARGO_BIN_EXE_costplane");

fn run(config: &Path, plugin_dir: &Path, args: &[&str]) -> Output {
    Command::new(BIN)
        .arg("--config")
        .arg(config)
        .arg("--plugin-dir")
        .arg(plugin_dir)
        .args(args)
        .env_remove("RUST_LOG")
        .env("COSTPLANE_LOG", "off")
        .output()
        .unwrap()
}

fn install_manifest(plugin_dir: &Path, name: &str, providers: &str) {
    let dir = plugin_dir.join(name).join("1.0.0");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("plugin.toml"),
        format!(
            "[plugin]\nname = \"{name}\"\nversion = \"1.0.0\"\nexecutable = \"bin/{name}\"\nproviders = {providers}\npriority = 10\n"
        ),
    )
    .unwrap();
}

#[test]
fn validate_passes_with_matching_plugins() {
    let tmp = tempfile::tempdir().unwrap();
    let plugins = tmp.path().join("plugins");
    install_manifest(&plugins, "kubecost", "[\"kubernetes\"]");
    let config = tmp.path().join("costplane.toml");
    std::fs::write(
        &config,
        "[[routing.plugins]]\nname = \"kubecost\"\npatterns = [{ type = \"glob\", pattern = \"aws:eks*\" }]\n",
    )
    .unwrap();

    let out = run(&config, &plugins, &["validate"]);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(out.status.success(), "{stdout}");
    assert!(stdout.contains("plugins (1):"));
    assert!(stdout.contains("aws:eks*"));
}

#[test]
fn validate_fails_on_unknown_plugin() {
    let tmp = tempfile::tempdir().unwrap();
    let plugins = tmp.path().join("plugins");
    install_manifest(&plugins, "aws-public", "[\"aws\"]");
    let config = tmp.path().join("costplane.toml");
    std::fs::write(&config, "[[routing.plugins]]\nname = \"aws-publik\"\n").unwrap();

    let out = run(&config, &plugins, &["validate", "--json"]);
    assert_eq!(out.status.code(), Some(1));
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["ok"], false);
}

#[test]
fn invalid_config_exits_before_running() {
    let tmp = tempfile::tempdir().unwrap();
    let config = tmp.path().join("costplane.toml");
    std::fs::write(&config, "[engine]\nmax_workerz = 4\n").unwrap();

    let out = run(&config, tmp.path(), &["validate"]);
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn estimate_without_plugins_reports_no_candidate() {
    let tmp = tempfile::tempdir().unwrap();
    let config = tmp.path().join("costplane.toml");
    std::fs::write(&config, "").unwrap();

    let out = run(&config, &tmp.path().join("none"), &["estimate", "aws:ec2/instance:Instance"]);
    assert!(out.status.success());
    let line: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(line["outcome"], "no_candidate");
    assert_eq!(line["resource_type"], "aws:ec2/instance:Instance");
}
