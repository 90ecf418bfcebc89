//! postsift command line
//!
//! Wires the stream pipeline to a fastText subprocess for live watching and
//! hosts the dataset tooling used to train the model.

pub mod cli;
pub mod config;
pub mod dataset;
pub mod feed;
pub mod train;

pub use cli::{Cli, Commands, LogFormat};
pub use config::{DatasetConfig, PostsiftConfig};
pub use train::TrainCommand;
