//! fastText model training and evaluation
//!
//! Runs `fasttext supervised` on `train.txt`, scores the model with
//! `fasttext test`, and writes every misclassified test line to `errors.txt`
//! using the top prediction from `fasttext predict-prob`.

use crate::dataset::DatasetFiles;
use postsift_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// fastText executable and training hyperparameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainCommand {
    /// Executable providing the `supervised`, `test` and `predict-prob` subcommands
    #[serde(default = "default_program")]
    pub program: String,

    /// Extra arguments to `supervised`
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Labels per line requested when looking for misclassifications
    #[serde(default = "default_top_k")]
    pub top_k: u32,
}

impl Default for TrainCommand {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            top_k: default_top_k(),
        }
    }
}

fn default_program() -> String {
    "fasttext".to_string()
}

fn default_args() -> Vec<String> {
    [
        "-dim", "100", "-epoch", "50", "-lr", "0.8", "-wordNgrams", "2", "-minn", "3", "-maxn",
        "6", "-ws", "10",
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect()
}

fn default_top_k() -> u32 {
    2
}

impl TrainCommand {
    /// Replace the value following `flag`, appending the pair if absent
    pub fn set_arg(&mut self, flag: &str, value: impl Into<String>) {
        let value = value.into();
        match self.args.iter().position(|arg| arg == flag) {
            Some(i) if i + 1 < self.args.len() => self.args[i + 1] = value,
            Some(_) => self.args.push(value),
            None => {
                self.args.push(flag.to_string());
                self.args.push(value);
            }
        }
    }

    pub fn supervised_args(&self, files: &DatasetFiles) -> Vec<String> {
        let mut args = vec![
            "supervised".to_string(),
            "-input".to_string(),
            files.train_txt().display().to_string(),
            "-output".to_string(),
            files.model_prefix().display().to_string(),
        ];
        args.extend(self.args.iter().cloned());
        args
    }

    pub fn test_args(&self, files: &DatasetFiles) -> Vec<String> {
        vec![
            "test".to_string(),
            files.model_bin().display().to_string(),
            files.test_txt().display().to_string(),
        ]
    }

    pub fn predict_args(&self, files: &DatasetFiles) -> Vec<String> {
        vec![
            "predict-prob".to_string(),
            files.model_bin().display().to_string(),
            files.test_txt().display().to_string(),
            self.top_k.to_string(),
        ]
    }
}

/// A test line whose top prediction differs from its label
#[derive(Debug, Clone, PartialEq)]
pub struct Misclassification {
    pub actual: String,
    pub predicted: String,
    pub confidence: String,
    pub text: String,
}

impl fmt::Display for Misclassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Actual: {}", self.actual)?;
        writeln!(f, "Predicted: {} (conf: {})", self.predicted, self.confidence)?;
        writeln!(f, "Text: {}", self.text)?;
        writeln!(f, "---")
    }
}

/// Outcome of a training run
#[derive(Debug, Clone)]
pub struct TrainSummary {
    /// Raw `fasttext test` output (N, precision and recall at 1)
    pub evaluation: String,
    pub test_lines: usize,
    pub misclassified: usize,
}

/// Pair test lines with prediction lines and keep the disagreements
///
/// Test lines are `<label> <text>`; prediction lines start with
/// `<label> <confidence>`. Blank test lines are skipped, and lines without a
/// matching prediction are ignored.
pub fn find_misclassifications(test: &str, predictions: &str) -> Vec<Misclassification> {
    let predictions: Vec<&str> = predictions.lines().collect();

    test.lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .filter_map(|(i, line)| {
            let prediction = predictions.get(i).filter(|p| !p.trim().is_empty())?;
            let (actual, text) = line.split_once(' ').unwrap_or((line, ""));
            let mut tokens = prediction.split_whitespace();
            let predicted = tokens.next()?;
            if predicted == actual {
                return None;
            }
            Some(Misclassification {
                actual: actual.to_string(),
                predicted: predicted.to_string(),
                confidence: tokens.next().unwrap_or_default().to_string(),
                text: text.to_string(),
            })
        })
        .collect()
}

/// Run a tool to completion and return its stdout
pub async fn run_tool(program: &str, args: &[String]) -> Result<String> {
    debug!(program, args = %args.join(" "), "Running");
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::subprocess_exit(format!(
            "{} {} failed ({}): {}",
            program,
            args.first().map(String::as_str).unwrap_or_default(),
            output.status,
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Train, evaluate, and write `errors.txt`
pub async fn train(command: &TrainCommand, files: &DatasetFiles) -> Result<TrainSummary> {
    if !files.train_txt().exists() {
        return Err(Error::config(format!(
            "{} not found, run `postsift prepare` first",
            files.train_txt().display()
        )));
    }

    info!(input = %files.train_txt().display(), "Training model");
    run_tool(&command.program, &command.supervised_args(files)).await?;
    info!(model = %files.model_bin().display(), "Model trained");

    let evaluation = run_tool(&command.program, &command.test_args(files)).await?;
    info!("Test results:\n{}", evaluation.trim_end());

    let predictions = run_tool(&command.program, &command.predict_args(files)).await?;
    let test = std::fs::read_to_string(files.test_txt())?;
    let errors = find_misclassifications(&test, &predictions);

    let report: Vec<String> = errors.iter().map(ToString::to_string).collect();
    std::fs::write(files.errors_txt(), report.join("\n"))?;
    info!(
        misclassified = errors.len(),
        path = %files.errors_txt().display(),
        "Wrote misclassifications"
    );

    Ok(TrainSummary {
        evaluation,
        test_lines: test.lines().filter(|l| !l.trim().is_empty()).count(),
        misclassified: errors.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST: &str = "\
__label__programming new borrow checker release
__label__other lunch was great

__label__programming tokio select explained
";

    const PREDICTIONS: &str = "\
__label__programming 0.97 __label__other 0.03
__label__programming 0.61 __label__other 0.39
__label__other 0.55 __label__programming 0.45
";

    #[test]
    fn test_find_misclassifications() {
        let errors = find_misclassifications(TEST, PREDICTIONS);

        assert_eq!(
            errors,
            vec![
                Misclassification {
                    actual: "__label__other".to_string(),
                    predicted: "__label__programming".to_string(),
                    confidence: "0.61".to_string(),
                    text: "lunch was great".to_string(),
                },
                Misclassification {
                    actual: "__label__programming".to_string(),
                    predicted: "__label__other".to_string(),
                    confidence: "0.55".to_string(),
                    text: "tokio select explained".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_missing_predictions_are_ignored() {
        let errors = find_misclassifications(TEST, "__label__programming 0.9\n");
        assert!(errors.is_empty());
    }

    #[test]
    fn test_misclassification_report_format() {
        let error = Misclassification {
            actual: "__label__other".to_string(),
            predicted: "__label__programming".to_string(),
            confidence: "0.61".to_string(),
            text: "lunch".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Actual: __label__other\nPredicted: __label__programming (conf: 0.61)\nText: lunch\n---\n"
        );
    }

    #[test]
    fn test_command_lines() {
        let files = DatasetFiles::new("data");
        let command = TrainCommand::default();

        let supervised = command.supervised_args(&files);
        assert_eq!(
            &supervised[..5],
            ["supervised", "-input", "data/train.txt", "-output", "data/model"]
        );
        assert!(supervised.ends_with(&["-ws".to_string(), "10".to_string()]));
        assert_eq!(
            command.test_args(&files),
            vec!["test", "data/model.bin", "data/test.txt"]
        );
        assert_eq!(
            command.predict_args(&files),
            vec!["predict-prob", "data/model.bin", "data/test.txt", "2"]
        );
    }

    #[test]
    fn test_set_arg() {
        let mut command = TrainCommand::default();
        command.set_arg("-epoch", "5");
        command.set_arg("-loss", "hs");

        let epoch = command.args.iter().position(|a| a == "-epoch").unwrap();
        assert_eq!(command.args[epoch + 1], "5");
        assert_eq!(command.args.iter().filter(|a| *a == "-epoch").count(), 1);
        assert!(command.args.ends_with(&["-loss".to_string(), "hs".to_string()]));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_tool_reports_failure() {
        let ok = run_tool("sh", &["-c".to_string(), "echo N 10".to_string()])
            .await
            .unwrap();
        assert_eq!(ok, "N 10\n");

        let err = run_tool("sh", &["-c".to_string(), "echo boom >&2; exit 2".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(&err, Error::SubprocessExit(msg) if msg.contains("boom")));
    }
}
