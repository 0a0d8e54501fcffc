//! CLI commands that work without the network.

use crate::integration::support::*;
use archlink::cli::{Cli, RunContext};
use archlink::config::ArchlinkConfig;
use archlink::error::ArchlinkError;
use clap::Parser;
use tempfile::TempDir;

fn run(args: &[&str]) -> Result<String, ArchlinkError> {
    let cli = Cli::try_parse_from(args).unwrap();
    let context = RunContext::with_config(ArchlinkConfig::default(), None).unwrap();
    context.execute(&cli.command)
}

#[test]
fn test_index_writes_augmented_page() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("thread.html");
    let output = dir.path().join("out.html");
    std::fs::write(&input, FOURCHAN_PAGE).unwrap();

    let message = run(&[
        "archlink",
        "index",
        input.to_str().unwrap(),
        "--url",
        FOURCHAN_URL,
        "--output",
        output.to_str().unwrap(),
    ])
    .unwrap();
    assert!(message.contains("1 backlinks rendered"));

    let html = std::fs::read_to_string(&output).unwrap();
    assert!(html.contains("archlink-backlinks"));
    assert!(html.contains(r#"data-post-id="101""#));
}

#[test]
fn test_index_text_table_lists_every_quoted_post() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("thread.html");
    std::fs::write(&input, FOURCHAN_PAGE).unwrap();

    let out = run(&["archlink", "index", input.to_str().unwrap(), "--url", FOURCHAN_URL]).unwrap();
    assert!(out.contains("3 posts"));
    assert!(out.contains(">>101"));
    assert!(out.contains(">>102"));
}

#[test]
fn test_index_missing_file_is_io_error() {
    let err = run(&["archlink", "index", "/nonexistent/page.html", "--url", FOURCHAN_URL]).unwrap_err();
    assert!(matches!(err, ArchlinkError::IoError(_)));
}

#[test]
fn test_config_show_round_trips_as_toml() {
    let out = run(&["archlink", "config", "show"]).unwrap();
    let parsed: ArchlinkConfig = toml::from_str(&out).unwrap();
    assert_eq!(parsed, ArchlinkConfig::default());
}

#[test]
fn test_resolve_unknown_host_is_generic() {
    let out = run(&["archlink", "resolve", "example.com", "--format", "json"]).unwrap();
    let value: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(value["schema"], "generic");
}
