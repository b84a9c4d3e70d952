// Emotion classification for a single cropped face.
//
// The model itself is an external black box behind `EmotionModel`. This module
// pairs it with its label list and owns the per-face steps around it: resize,
// luma-normalize, score, softmax, arg-max, label lookup.

use crate::core_modules::labels::LabelSet;
use crate::core_modules::preprocess::{argmax, softmax, to_model_input};
use crate::error::{EngineError, PipelineError, Result};
use image::RgbaImage;
use std::sync::Arc;

/// The external emotion model: a fixed-size single-channel buffer in, one raw
/// score per class out.
pub trait EmotionModel: Send + Sync {
    /// Number of scores `scores` returns.
    fn class_count(&self) -> usize;

    fn scores(&self, input: &[f32]) -> std::result::Result<Vec<f32>, EngineError>;
}

/// The winning class for one face.
#[derive(Debug, Clone, PartialEq)]
pub struct Emotion {
    pub label: String,
    /// Softmax probability of the winning class.
    pub confidence: f32,
}

/// A loaded model and its label list, validated against each other.
pub struct EmotionClassifier {
    model: Arc<dyn EmotionModel>,
    labels: LabelSet,
    input_width: u32,
    input_height: u32,
}

impl EmotionClassifier {
    pub fn new(
        model: Arc<dyn EmotionModel>,
        labels: LabelSet,
        input_width: u32,
        input_height: u32,
    ) -> Result<Self> {
        if labels.len() != model.class_count() {
            return Err(PipelineError::ResourceLoad(format!(
                "model produces {} classes but {} labels were loaded",
                model.class_count(),
                labels.len()
            )));
        }
        Ok(Self {
            model,
            labels,
            input_width,
            input_height,
        })
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Runs the full per-face path and returns the most likely emotion.
    pub fn classify(&self, face: &RgbaImage) -> Result<Emotion> {
        let input = to_model_input(face, self.input_width, self.input_height);
        let scores = self.model.scores(&input)?;
        if scores.len() != self.labels.len() {
            return Err(PipelineError::Engine(format!(
                "model returned {} scores, expected {}",
                scores.len(),
                self.labels.len()
            )));
        }

        let probabilities = softmax(&scores);
        let (index, confidence) = argmax(&probabilities)
            .ok_or_else(|| PipelineError::Engine("model returned no scores".to_string()))?;
        let label = self
            .labels
            .get(index)
            .ok_or_else(|| PipelineError::Engine(format!("no label for class {index}")))?;

        Ok(Emotion {
            label: label.to_string(),
            confidence,
        })
    }
}
