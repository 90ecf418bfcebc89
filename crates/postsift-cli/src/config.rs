//! postsift configuration

use crate::cli::{Cli, Commands};
use crate::train::TrainCommand;
use postsift_classifiers::ClassifierCommand;
use postsift_core::{Error, Result};
use postsift_stream::{BackoffConfig, FilterConfig, RelayCommand, ReportConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration, loaded from YAML with CLI overrides on top
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostsiftConfig {
    /// Classifier subprocess command line
    #[serde(default)]
    pub classifier: ClassifierCommand,

    /// Relay command bridging the Jetstream websocket to stdout
    #[serde(default)]
    pub relay: RelayCommand,

    /// Event acceptance filter
    #[serde(default)]
    pub filter: FilterConfig,

    /// Which predictions are reported
    #[serde(default)]
    pub report: ReportConfig,

    /// Reconnect policy for the live firehose
    #[serde(default)]
    pub reconnect: BackoffConfig,

    /// Dataset collection and preparation
    #[serde(default)]
    pub dataset: DatasetConfig,

    /// fastText training hyperparameters
    #[serde(default)]
    pub train: TrainCommand,
}

impl PostsiftConfig {
    /// Load configuration from file and CLI overrides
    pub fn load(config_path: &str, cli: &Cli) -> anyhow::Result<Self> {
        let mut config = Self::from_file(config_path)?;
        config.apply_overrides(cli);
        config.validate()?;
        Ok(config)
    }

    /// Read `path` if it exists, defaults otherwise
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(data_dir) = &cli.data_dir {
            self.dataset.data_dir = data_dir.clone();
        }

        match &cli.command {
            Commands::Watch {
                model,
                threshold,
                label,
                ..
            } => {
                if let Some(model) = model {
                    self.classifier = ClassifierCommand::fasttext(model);
                }
                if let Some(threshold) = threshold {
                    self.report.threshold = *threshold;
                }
                if let Some(label) = label {
                    self.report.target_label = label.clone();
                }
            }
            Commands::Collect { feed, .. } => {
                if let Some(feed) = feed {
                    self.dataset.feed_name = feed.clone();
                }
            }
            Commands::Prepare { test_split } => {
                if let Some(split) = test_split {
                    self.dataset.test_split = *split;
                }
            }
            Commands::Train { epoch } => {
                if let Some(epoch) = epoch {
                    self.train.set_arg("-epoch", epoch.to_string());
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.report.threshold) {
            return Err(Error::config(format!(
                "threshold must be within [0, 1], got {}",
                self.report.threshold
            )));
        }
        if !(0.0..1.0).contains(&self.dataset.test_split) {
            return Err(Error::config(format!(
                "test_split must be within [0, 1), got {}",
                self.dataset.test_split
            )));
        }
        if self.classifier.program.is_empty() {
            return Err(Error::config("classifier program is empty"));
        }
        if self.train.program.is_empty() {
            return Err(Error::config("train program is empty"));
        }
        if self.reconnect.multiplier < 1.0 {
            return Err(Error::config("reconnect multiplier must be at least 1"));
        }
        Ok(())
    }
}

/// Dataset collection and preparation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Directory for train.json and the fastText files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Base URL of the feed download service
    #[serde(default = "default_feed_url")]
    pub feed_url: String,

    /// Feed whose posts make up the positive class
    #[serde(default = "default_feed_name")]
    pub feed_name: String,

    /// Fraction of samples held out for testing
    #[serde(default = "default_test_split")]
    pub test_split: f64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            feed_url: default_feed_url(),
            feed_name: default_feed_name(),
            test_split: default_test_split(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_feed_url() -> String {
    "https://progfeeds.mariozechner.at".to_string()
}

fn default_feed_name() -> String {
    "githubrepos".to_string()
}

fn default_test_split() -> f64 {
    0.2
}
