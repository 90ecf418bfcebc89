//! Configuration for the classifier subprocess

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Command line used to start an interactive classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierCommand {
    /// Executable to spawn
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments; the process must read requests from stdin
    #[serde(default = "default_args")]
    pub args: Vec<String>,
}

impl ClassifierCommand {
    /// Create a command for an arbitrary program
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `fasttext predict-prob <model> - 1`, scoring the top label per line
    pub fn fasttext(model: impl AsRef<Path>) -> Self {
        Self {
            program: default_program(),
            args: vec![
                "predict-prob".to_string(),
                model.as_ref().display().to_string(),
                "-".to_string(),
                "1".to_string(),
            ],
        }
    }

    /// Printable form for logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for ClassifierCommand {
    fn default() -> Self {
        Self::fasttext(default_model())
    }
}

fn default_program() -> String {
    "fasttext".to_string()
}

fn default_model() -> &'static str {
    "data/model.bin"
}

fn default_args() -> Vec<String> {
    ClassifierCommand::fasttext(default_model()).args
}
