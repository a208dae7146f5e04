//! Runs the built `extdev` binary.

use std::net::TcpListener;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn extdev(cwd: &Path, args: &[&str]) -> Output {
	Command::new(env!("CARGO_BIN_EXE_extdev"))
		.current_dir(cwd)
		.env_remove("RUST_LOG")
		.args(args)
		.output()
		.expect("failed to execute extdev")
}

fn stderr(output: &Output) -> String {
	String::from_utf8_lossy(&output.stderr).to_string()
}

/// A port nothing listens on.
fn closed_port() -> u16 {
	let listener = TcpListener::bind("127.0.0.1:0").unwrap();
	let port = listener.local_addr().unwrap().port();
	drop(listener);
	port
}

#[test]
fn help_lists_every_command() {
	let dir = TempDir::new().unwrap();
	let output = extdev(dir.path(), &["--help"]);
	assert!(output.status.success());

	let stdout = String::from_utf8_lossy(&output.stdout);
	for command in ["inspect", "logs", "dev", "identity"] {
		assert!(stdout.contains(command), "help is missing {command}: {stdout}");
	}
}

#[test]
fn unknown_flag_is_a_usage_error() {
	let dir = TempDir::new().unwrap();
	let output = extdev(dir.path(), &["inspect", "--frobnicate"]);
	assert_eq!(output.status.code(), Some(2));
}

#[test]
fn malformed_config_fails_with_its_path() {
	let dir = TempDir::new().unwrap();
	std::fs::write(dir.path().join("extdev.json"), "{ not json").unwrap();

	let output = extdev(dir.path(), &["inspect", "https://example.com", "--port", "1"]);
	assert_eq!(output.status.code(), Some(1));
	let stderr = stderr(&output);
	assert!(stderr.contains("invalid config"), "{stderr}");
	assert!(stderr.contains("extdev.json"), "{stderr}");
}

#[test]
fn inspect_without_url_explains_what_is_missing() {
	let dir = TempDir::new().unwrap();
	let output = extdev(dir.path(), &["inspect", "--port", "1"]);
	assert_eq!(output.status.code(), Some(1));
	assert!(stderr(&output).contains("no URL given"));
}

#[test]
fn unavailable_port_names_port_and_attempts() {
	let dir = TempDir::new().unwrap();
	std::fs::write(dir.path().join("extdev.json"), r#"{"probe": {"attempts": 2, "intervalMs": 10}}"#).unwrap();
	let port = closed_port();

	let output = extdev(dir.path(), &["inspect", "https://example.com", "--port", &port.to_string()]);
	assert_eq!(output.status.code(), Some(1));
	let stderr = stderr(&output);
	assert!(
		stderr.contains(&format!("debugging not available on port {port} after 2 attempts")),
		"{stderr}"
	);
}

#[test]
fn dev_requires_a_manifest() {
	let dir = TempDir::new().unwrap();
	std::fs::create_dir(dir.path().join("dist")).unwrap();

	let output = extdev(dir.path(), &["dev", "--extension", "dist", "--port", "1"]);
	assert_eq!(output.status.code(), Some(1));
	let stderr = stderr(&output);
	assert!(stderr.contains("invalid manifest"), "{stderr}");
}
