//! Configuration loading and CLI overrides

use clap::Parser;
use postsift_cli::{Cli, LogFormat, PostsiftConfig};
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

fn yaml_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_missing_file_uses_defaults() {
    let config = PostsiftConfig::from_file("/nonexistent/postsift.yaml").unwrap();

    assert_eq!(config, PostsiftConfig::default());
    assert_eq!(config.classifier.program, "fasttext");
    assert_eq!(config.report.target_label, "__label__programming");
    assert_eq!(config.report.threshold, 0.5);
    assert_eq!(config.dataset.data_dir, PathBuf::from("data"));
    assert_eq!(config.dataset.feed_name, "githubrepos");
    assert_eq!(config.reconnect.max_attempts, 5);
}

#[test]
fn test_partial_yaml_keeps_other_defaults() {
    let file = yaml_file(
        r#"
classifier:
  args: ["predict-prob", "models/posts.bin", "-", "1"]
report:
  threshold: 0.8
filter:
  skip_replies: true
reconnect:
  initial_delay_ms: 1000
dataset:
  test_split: 0.1
"#,
    );

    let config = PostsiftConfig::from_file(file.path()).unwrap();

    assert_eq!(config.classifier.program, "fasttext");
    assert_eq!(config.classifier.args[1], "models/posts.bin");
    assert_eq!(config.report.threshold, 0.8);
    assert_eq!(config.report.target_label, "__label__programming");
    assert!(config.filter.skip_replies);
    assert_eq!(config.filter.exclude_substrings, vec!["github.com"]);
    assert_eq!(config.reconnect.initial_delay_ms, 1000);
    assert_eq!(config.reconnect.max_attempts, 5);
    assert_eq!(config.dataset.test_split, 0.1);
    assert!(config.validate().is_ok());
}

#[test]
fn test_invalid_yaml_is_an_error() {
    let file = yaml_file("report: 42");
    assert!(PostsiftConfig::from_file(file.path()).is_err());
}

#[test]
fn test_watch_overrides() {
    let file = yaml_file("report:\n  threshold: 0.8\n");
    let path = file.path().to_str().unwrap().to_string();
    let cli = Cli::try_parse_from([
        "postsift",
        "--config",
        &path,
        "watch",
        "--model",
        "custom.bin",
        "--threshold",
        "0.7",
        "--label",
        "__label__rust",
    ])
    .unwrap();

    let config = PostsiftConfig::load(&cli.config, &cli).unwrap();

    assert_eq!(
        config.classifier.args,
        vec!["predict-prob", "custom.bin", "-", "1"]
    );
    assert_eq!(config.report.threshold, 0.7);
    assert_eq!(config.report.target_label, "__label__rust");
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from([
        "postsift",
        "prepare",
        "--test-split",
        "0.25",
        "--data-dir",
        "/tmp/postsift-data",
        "--log-format",
        "json",
        "--verbose",
    ])
    .unwrap();

    assert!(cli.verbose);
    assert_eq!(cli.log_format, LogFormat::Json);

    let mut config = PostsiftConfig::default();
    config.apply_overrides(&cli);
    assert_eq!(config.dataset.test_split, 0.25);
    assert_eq!(config.dataset.data_dir, PathBuf::from("/tmp/postsift-data"));
}

#[test]
fn test_train_epoch_override() {
    let yaml = yaml_file("train:\n  args: [\"-epoch\", \"50\", \"-lr\", \"0.8\"]\n");
    let cli = Cli::try_parse_from(["postsift", "train", "--epoch", "5"]).unwrap();

    let mut config = PostsiftConfig::from_file(yaml.path()).unwrap();
    config.apply_overrides(&cli);
    assert_eq!(config.train.program, "fasttext");
    assert_eq!(config.train.args, vec!["-epoch", "5", "-lr", "0.8"]);
}

#[test]
fn test_out_of_range_values_are_rejected() {
    let cli = Cli::try_parse_from(["postsift", "watch", "--threshold", "1.5"]).unwrap();
    let mut config = PostsiftConfig::default();
    config.apply_overrides(&cli);
    assert!(config.validate().is_err());

    let cli = Cli::try_parse_from(["postsift", "prepare", "--test-split", "1.0"]).unwrap();
    let mut config = PostsiftConfig::default();
    config.apply_overrides(&cli);
    assert!(config.validate().is_err());
}

#[test]
fn test_example_config_matches_defaults() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../postsift.example.yaml");
    let config = PostsiftConfig::from_file(path).unwrap();
    assert_eq!(config, PostsiftConfig::default());
}
