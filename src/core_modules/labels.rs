// Ordered emotion label list, loaded once from a newline-delimited file.
//
// Line order is the model's output order: line N names class N. The count is
// checked against the model's class count at load time so an index can never
// fall off the end at runtime.

use crate::error::{PipelineError, Result};
use std::io::BufRead;
use std::path::Path;
use tracing::{error, info};

/// Number of classes the bundled emotion model produces: seven emotions plus neutral.
pub const EMOTION_CLASS_COUNT: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    /// Builds a label set from already-split lines, validating the class count.
    pub fn new(labels: Vec<String>, expected_count: usize) -> Result<Self> {
        if labels.len() != expected_count {
            return Err(PipelineError::ResourceLoad(format!(
                "label list has {} entries, model produces {expected_count} classes",
                labels.len()
            )));
        }
        if let Some(position) = labels.iter().position(|label| label.is_empty()) {
            return Err(PipelineError::ResourceLoad(format!(
                "label {position} is empty"
            )));
        }
        Ok(Self { labels })
    }

    /// Reads one label per line. Surrounding whitespace is trimmed and blank
    /// trailing lines are ignored.
    pub fn from_reader<R: BufRead>(reader: R, expected_count: usize) -> Result<Self> {
        let mut labels = Vec::with_capacity(expected_count);
        for line in reader.lines() {
            labels.push(line?.trim().to_string());
        }
        while labels.last().is_some_and(|label| label.is_empty()) {
            labels.pop();
        }
        Self::new(labels, expected_count)
    }

    /// Loads the label file from disk.
    pub fn load<P: AsRef<Path>>(path: P, expected_count: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            error!("Failed to open label file {:?}: {}", path, e);
            PipelineError::ResourceLoad(format!("label file {path:?}: {e}"))
        })?;
        let labels = Self::from_reader(std::io::BufReader::new(file), expected_count)?;
        info!("Loaded {} emotion labels from {:?}", labels.len(), path);
        Ok(labels)
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}
