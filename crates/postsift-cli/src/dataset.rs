//! Training data files
//!
//! `train.json` holds the labeled samples as collected. `prepare` turns it
//! into fastText's supervised format, one `__label__<label> <text>` line per
//! sample, split into `train.txt` and `test.txt`.

use postsift_core::{normalize, Event, Result, Sample};
use rand::seq::SliceRandom;
use rand::Rng;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Label of posts taken from the curated feed
pub const POSITIVE_LABEL: &str = "programming";

/// Label of posts sampled from the firehose
pub const NEGATIVE_LABEL: &str = "other";

const LABEL_PREFIX: &str = "__label__";

/// Locations of the dataset files inside a data directory
#[derive(Debug, Clone)]
pub struct DatasetFiles {
    dir: PathBuf,
}

impl DatasetFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn train_json(&self) -> PathBuf {
        self.dir.join("train.json")
    }

    pub fn train_txt(&self) -> PathBuf {
        self.dir.join("train.txt")
    }

    pub fn test_txt(&self) -> PathBuf {
        self.dir.join("test.txt")
    }

    /// Output prefix handed to `fasttext supervised`
    pub fn model_prefix(&self) -> PathBuf {
        self.dir.join("model")
    }

    pub fn model_bin(&self) -> PathBuf {
        self.dir.join("model.bin")
    }

    pub fn errors_txt(&self) -> PathBuf {
        self.dir.join("errors.txt")
    }

    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }
}

/// Train/test partition of a sample set
#[derive(Debug, Clone, Default)]
pub struct Split {
    pub train: Vec<Sample>,
    pub test: Vec<Sample>,
}

/// Line counts written by [`prepare`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareSummary {
    pub train: usize,
    pub test: usize,
}

/// Label positives, append the collected negatives, and shuffle
pub fn build_training_set<R: Rng + ?Sized>(
    positives: Vec<Event>,
    negatives: Vec<Sample>,
    rng: &mut R,
) -> Vec<Sample> {
    let mut samples: Vec<Sample> = positives
        .into_iter()
        .map(|post| Sample::new(post, POSITIVE_LABEL))
        .chain(negatives)
        .collect();
    samples.shuffle(rng);
    samples
}

/// Shuffle and hold out `floor(len * test_split)` samples for testing
pub fn split<R: Rng + ?Sized>(mut samples: Vec<Sample>, test_split: f64, rng: &mut R) -> Split {
    samples.shuffle(rng);
    let test_size = ((samples.len() as f64) * test_split).floor() as usize;
    let train = samples.split_off(test_size.min(samples.len()));
    Split {
        train,
        test: samples,
    }
}

/// fastText label token for a dataset label
///
/// Leading underscores are dropped so `__programming` and `programming`
/// both become `__label__programming`.
pub fn fasttext_label(label: &str) -> String {
    if label.starts_with(LABEL_PREFIX) {
        return label.to_string();
    }
    format!("{}{}", LABEL_PREFIX, label.trim_start_matches('_'))
}

/// One fastText training line, or `None` if nothing is left of the text
pub fn fasttext_line(sample: &Sample) -> Option<String> {
    let text = normalize(&sample.post.text);
    if text.is_empty() {
        return None;
    }
    Some(format!("{} {}", fasttext_label(&sample.label), text))
}

pub fn write_samples(path: &Path, samples: &[Sample]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, samples)?;
    writer.flush()?;
    Ok(())
}

pub fn read_samples(path: &Path) -> Result<Vec<Sample>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Write samples in fastText format, returning the number of lines written
pub fn write_fasttext(path: &Path, samples: &[Sample]) -> Result<usize> {
    let mut writer = BufWriter::new(File::create(path)?);
    let mut written = 0;
    for line in samples.iter().filter_map(fasttext_line) {
        writeln!(writer, "{}", line)?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

/// Read `train.json` and write the `train.txt`/`test.txt` split
pub fn prepare<R: Rng + ?Sized>(
    files: &DatasetFiles,
    test_split: f64,
    rng: &mut R,
) -> Result<PrepareSummary> {
    let samples = read_samples(&files.train_json())?;
    info!(samples = samples.len(), "Loaded training samples");

    let split = split(samples, test_split, rng);
    let summary = PrepareSummary {
        train: write_fasttext(&files.train_txt(), &split.train)?,
        test: write_fasttext(&files.test_txt(), &split.test)?,
    };

    info!(
        train = summary.train,
        test = summary.test,
        dir = %files.dir().display(),
        "Wrote fastText files"
    );
    Ok(summary)
}
