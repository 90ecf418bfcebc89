use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "postsift")]
#[command(
    author,
    version,
    about = "Classify the Bluesky firehose with a fastText model and build its training data"
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = "postsift.yaml", env = "POSTSIFT_CONFIG")]
    pub config: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Serve Prometheus metrics on this address
    #[arg(long, global = true, env = "POSTSIFT_METRICS_ADDR")]
    pub metrics_addr: Option<SocketAddr>,

    /// Directory holding train.json, train.txt, test.txt and the model
    #[arg(long, global = true, env = "POSTSIFT_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Classify live posts and print confident matches as JSON lines
    Watch {
        /// fastText model file
        #[arg(short, long, env = "POSTSIFT_MODEL")]
        model: Option<PathBuf>,

        /// Report only predictions above this confidence
        #[arg(short, long)]
        threshold: Option<f32>,

        /// Label that qualifies a post for reporting
        #[arg(short, long)]
        label: Option<String>,

        /// Replay a recorded Jetstream capture instead of the live relay
        #[arg(long)]
        replay: Option<PathBuf>,
    },

    /// Build train.json from the positive feed and an equal number of firehose posts
    Collect {
        /// Rebuild even if train.json already exists
        #[arg(short, long)]
        force: bool,

        /// Positive feed name
        #[arg(long)]
        feed: Option<String>,

        /// Collect firehose posts from a recorded capture
        #[arg(long)]
        replay: Option<PathBuf>,
    },

    /// Split train.json into fastText train.txt and test.txt
    Prepare {
        /// Fraction of samples held out for testing
        #[arg(long)]
        test_split: Option<f64>,
    },

    /// Train a fastText model on train.txt and report its test accuracy
    Train {
        /// Training epochs
        #[arg(long)]
        epoch: Option<u32>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}
