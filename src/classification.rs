// THEORY:
// The `ClassificationCoordinator` is the second single-flight gate in the
// pipeline. Each detection cycle hands it a batch of face crops; while an
// earlier batch is still being classified, new batches are dropped. Labels
// therefore lag detection by a cycle or more, which is accepted: boxes follow
// faces at camera rate, and emotions change far more slowly.
//
// Key architectural principles:
// 1.  **Mutual Exclusion Only**: Unlike detection there is no dedicated worker.
//     Each admitted batch runs on the blocking pool, and the `SingleFlight` flag
//     keeps two batches from overlapping.
// 2.  **Independent Entries**: Every face in a batch is classified on its own
//     blocking task and the results are joined. A face that fails loses only its
//     own label; the run fails only when no face could be classified.
// 3.  **Wholesale Replacement**: A finished run publishes one complete label map.
//     The display swaps it in; labels of faces missing from the batch are not
//     carried over.

use crate::core_modules::classifier::EmotionClassifier;
use crate::core_modules::frame::FaceKey;
use crate::core_modules::model_slot::ModelSlot;
use crate::core_modules::single_flight::{SingleFlight, SubmitOutcome};
use crate::error::PipelineError;
use futures::future::join_all;
use image::RgbaImage;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Face crops to classify, keyed by tracking identity.
pub type FaceBatch = HashMap<FaceKey, RgbaImage>;

/// Emotion label per tracking identity.
pub type LabelMap = HashMap<FaceKey, String>;

#[derive(Debug, Clone)]
pub enum ClassificationEvent {
    Labels(LabelMap),
    Failed(PipelineError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassificationStats {
    pub runs: u64,
    pub dropped: u64,
    pub failed: u64,
    /// Faces left unlabelled by an otherwise successful run.
    pub faces_failed: u64,
}

#[derive(Debug, Default)]
struct StatCounters {
    runs: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
    faces_failed: AtomicU64,
}

pub struct ClassificationCoordinator {
    classifier: Arc<ModelSlot<EmotionClassifier>>,
    flight: Arc<SingleFlight>,
    events: mpsc::UnboundedSender<ClassificationEvent>,
    stats: Arc<StatCounters>,
    runtime: Handle,
}

impl ClassificationCoordinator {
    /// Creates a coordinator and the receiving end of its event channel. Runs
    /// are spawned on `runtime`, so `submit` works from any thread.
    pub fn new(
        classifier: Arc<ModelSlot<EmotionClassifier>>,
        runtime: Handle,
    ) -> (Self, mpsc::UnboundedReceiver<ClassificationEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let coordinator = Self {
            classifier,
            flight: Arc::new(SingleFlight::new()),
            events,
            stats: Arc::new(StatCounters::default()),
            runtime,
        };
        (coordinator, receiver)
    }

    /// Offers a batch of faces for classification. Never blocks.
    pub fn submit(&self, faces: FaceBatch) -> SubmitOutcome {
        if faces.is_empty() {
            return SubmitOutcome::Ignored;
        }
        let classifier = match self.classifier.get() {
            Ok(classifier) => classifier,
            Err(err) => {
                warn!("Rejecting face batch: {}", err);
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                let _ = self.events.send(ClassificationEvent::Failed(err));
                return SubmitOutcome::Rejected;
            }
        };

        if !self.flight.try_begin() {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            debug!("Classification in flight, dropping {} faces", faces.len());
            return SubmitOutcome::Dropped;
        }

        let flight = self.flight.clone();
        let events = self.events.clone();
        let stats = self.stats.clone();
        self.runtime.spawn(async move {
            let face_count = faces.len();
            let (labels, mut failures) = classify_all(classifier, faces).await;

            if labels.is_empty() && !failures.is_empty() {
                let (_, err) = failures.swap_remove(0);
                warn!("Emotion classification failed for all {} faces: {}", face_count, err);
                stats.failed.fetch_add(1, Ordering::Relaxed);
                let _ = events.send(ClassificationEvent::Failed(err));
            } else {
                for (key, err) in &failures {
                    warn!("No emotion for face {:?}: {}", key, err);
                }
                debug!("Classified {} of {} faces", labels.len(), face_count);
                stats.runs.fetch_add(1, Ordering::Relaxed);
                stats
                    .faces_failed
                    .fetch_add(failures.len() as u64, Ordering::Relaxed);
                let _ = events.send(ClassificationEvent::Labels(labels));
            }
            flight.finish();
        });

        SubmitOutcome::Dispatched
    }

    pub fn is_processing(&self) -> bool {
        self.flight.is_busy()
    }

    pub fn stats(&self) -> ClassificationStats {
        ClassificationStats {
            runs: self.stats.runs.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            faces_failed: self.stats.faces_failed.load(Ordering::Relaxed),
        }
    }
}

/// Classifies every face on its own blocking task. Returns the labels that were
/// produced and the faces that failed, each with its cause.
async fn classify_all(
    classifier: Arc<EmotionClassifier>,
    faces: FaceBatch,
) -> (LabelMap, Vec<(FaceKey, PipelineError)>) {
    let (keys, jobs): (Vec<_>, Vec<_>) = faces
        .into_iter()
        .map(|(key, face)| {
            let classifier = classifier.clone();
            (key, tokio::task::spawn_blocking(move || classifier.classify(&face)))
        })
        .unzip();

    let mut labels = LabelMap::new();
    let mut failures = Vec::new();
    for (key, joined) in keys.into_iter().zip(join_all(jobs).await) {
        let result = joined
            .map_err(|join_error| {
                PipelineError::Engine(format!("classification task aborted: {join_error}"))
            })
            .and_then(|classified| classified);
        match result {
            Ok(emotion) => {
                labels.insert(key, emotion.label);
            }
            Err(err) => failures.push((key, err)),
        }
    }
    (labels, failures)
}
