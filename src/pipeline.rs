// THEORY:
// The `pipeline` module is the top-level API of the overlay engine. It wires
// the two coordinators to the display state and routes each detection cycle:
// rectangles go straight to the display, crops go on to classification.
//
// Key architectural principles:
// 1.  **UI-Context Ownership**: `OverlayPipeline` is owned by whatever context
//     renders the overlay, which need not be inside the Tokio runtime. Coordinator
//     work is spawned on the runtime handle given at construction and reports
//     over channels; `pump` or `next_update`, called on the UI context, is the
//     only place display state is ever written.
// 2.  **Explicit Engines**: The detector and classifier live in `ModelSlot`s that
//     the application fills once at start-up. The pipeline works with the slots
//     it was given and never builds an engine itself.
// 3.  **Failure Is Silent On Screen**: A dropped frame, a failed detection or a
//     failed classification leaves the overlay as it was. Failures are logged
//     and counted, never shown.

use crate::classification::{ClassificationCoordinator, ClassificationEvent, FaceBatch};
use crate::core_modules::classifier::{EmotionClassifier, EmotionModel};
use crate::core_modules::frame::{Frame, OverlaySize};
use crate::core_modules::labels::{EMOTION_CLASS_COUNT, LabelSet};
use crate::core_modules::model_slot::ModelSlot;
use crate::core_modules::single_flight::SubmitOutcome;
use crate::detection::{DetectionCoordinator, DetectionEvent, FaceDetectionEngine};
use crate::display::DisplayState;
use crate::error::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{info, warn};

// Re-export key data structures for the public API.
pub use crate::classification::{ClassificationStats, LabelMap};
pub use crate::core_modules::frame::{FaceBounds, LensFacing, PixelFormat, Rotation};
pub use crate::detection::{DetectionBatch, DetectionStats, DetectorState};
pub use crate::display::OverlayItem;

const CLASSIFIER_INPUT_SIZE: u32 = 48;
const DEFAULT_FRAME_POOL_SIZE: usize = 2;

/// Configuration for the OverlayPipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Width of the single-channel image the emotion model expects.
    pub classifier_input_width: u32,
    /// Height of the single-channel image the emotion model expects.
    pub classifier_input_height: u32,
    /// Number of classes the model produces; the label file must match it.
    pub expected_class_count: usize,
    /// How many frame copies the detection coordinator keeps for reuse.
    pub frame_pool_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            classifier_input_width: CLASSIFIER_INPUT_SIZE,
            classifier_input_height: CLASSIFIER_INPUT_SIZE,
            expected_class_count: EMOTION_CLASS_COUNT,
            frame_pool_size: DEFAULT_FRAME_POOL_SIZE,
        }
    }
}

/// The shared engine slots, filled once by the application.
#[derive(Clone)]
pub struct EngineSlots {
    pub detector: Arc<ModelSlot<dyn FaceDetectionEngine>>,
    pub classifier: Arc<ModelSlot<EmotionClassifier>>,
}

impl EngineSlots {
    pub fn new() -> Self {
        Self {
            detector: Arc::new(ModelSlot::new("face detector")),
            classifier: Arc::new(ModelSlot::new("emotion classifier")),
        }
    }

    /// Installs the face detector. Fails if one is already installed.
    pub fn install_detector(&self, detector: Arc<dyn FaceDetectionEngine>) -> Result<()> {
        self.detector.init(detector)?;
        info!("Face detector installed");
        Ok(())
    }

    /// Pairs the model with its labels and installs the result.
    pub fn install_classifier(
        &self,
        config: &PipelineConfig,
        model: Arc<dyn EmotionModel>,
        labels: LabelSet,
    ) -> Result<()> {
        let classifier = EmotionClassifier::new(
            model,
            labels,
            config.classifier_input_width,
            config.classifier_input_height,
        )?;
        self.classifier.init(Arc::new(classifier))?;
        info!("Emotion classifier installed");
        Ok(())
    }

    /// Loads the label file and installs the classifier.
    pub fn load_classifier<P: AsRef<Path>>(
        &self,
        config: &PipelineConfig,
        model: Arc<dyn EmotionModel>,
        labels_path: P,
    ) -> Result<()> {
        let labels = LabelSet::load(labels_path, config.expected_class_count)?;
        self.install_classifier(config, model, labels)
    }
}

impl Default for EngineSlots {
    fn default() -> Self {
        Self::new()
    }
}

/// The main, top-level struct for the overlay engine.
pub struct OverlayPipeline {
    config: PipelineConfig,
    detection: DetectionCoordinator,
    detection_events: mpsc::UnboundedReceiver<DetectionEvent>,
    classification: ClassificationCoordinator,
    classification_events: mpsc::UnboundedReceiver<ClassificationEvent>,
    display: DisplayState,
    failures: u64,
}

impl OverlayPipeline {
    /// Builds the pipeline. Detection and classification work runs on `runtime`.
    pub fn new(config: PipelineConfig, engines: &EngineSlots, runtime: Handle) -> Self {
        let (detection, detection_events) = DetectionCoordinator::new(
            engines.detector.clone(),
            config.frame_pool_size,
            runtime.clone(),
        );
        let (classification, classification_events) =
            ClassificationCoordinator::new(engines.classifier.clone(), runtime);
        Self {
            config,
            detection,
            detection_events,
            classification,
            classification_events,
            display: DisplayState::new(),
            failures: 0,
        }
    }

    /// Attaches (or resizes) the drawing surface.
    pub fn attach_surface(&self, overlay: OverlaySize) {
        self.detection.attach_surface(overlay);
    }

    pub fn detach_surface(&self) {
        self.detection.detach_surface();
    }

    /// Offers a camera frame. Returns immediately whether or not it was taken.
    pub fn submit_frame(&self, frame: &Frame<'_>) -> SubmitOutcome {
        self.detection.submit(frame)
    }

    /// Applies every update that has already arrived, without waiting.
    /// Returns how many were applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.detection_events.try_recv() {
            self.apply_detection_event(event);
            applied += 1;
        }
        while let Ok(event) = self.classification_events.try_recv() {
            self.apply_classification_event(event);
            applied += 1;
        }
        applied
    }

    /// Waits for the next update from either coordinator and applies it.
    pub async fn next_update(&mut self) {
        tokio::select! {
            Some(event) = self.detection_events.recv() => {
                self.apply_detection_event(event);
            }
            Some(event) = self.classification_events.recv() => {
                self.apply_classification_event(event);
            }
            else => {}
        }
    }

    fn apply_detection_event(&mut self, event: DetectionEvent) {
        match event {
            DetectionEvent::Faces(batch) => {
                self.display.replace_faces(batch.bounds);
                let faces: FaceBatch = batch
                    .crops
                    .into_iter()
                    .map(|crop| (crop.tracking_id, crop.image))
                    .collect();
                self.classification.submit(faces);
            }
            DetectionEvent::RotationChanged(geometry) => {
                self.display.apply_rotation(geometry);
            }
            DetectionEvent::Failed(err) => {
                warn!("Detection cycle failed: {}", err);
                self.failures += 1;
            }
        }
    }

    fn apply_classification_event(&mut self, event: ClassificationEvent) {
        match event {
            ClassificationEvent::Labels(labels) => self.display.replace_labels(labels),
            ClassificationEvent::Failed(err) => {
                warn!("Classification run failed: {}", err);
                self.failures += 1;
            }
        }
    }

    pub fn display(&self) -> &DisplayState {
        &self.display
    }

    pub fn render_items(&self) -> Vec<OverlayItem<'_>> {
        self.display.render_items()
    }

    pub fn detector_state(&self) -> DetectorState {
        self.detection.state()
    }

    pub fn is_classifying(&self) -> bool {
        self.classification.is_processing()
    }

    pub fn detection_stats(&self) -> DetectionStats {
        self.detection.stats()
    }

    pub fn classification_stats(&self) -> ClassificationStats {
        self.classification.stats()
    }

    /// Failure events applied so far, from both coordinators.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::frame::{RawFaceRegion, RegionRect};
    use crate::error::{EngineError, PipelineError};
    use image::RgbaImage;
    use std::time::Duration;

    struct OneFace;

    impl FaceDetectionEngine for OneFace {
        fn detect(
            &self,
            _image: &RgbaImage,
            _rotation: Rotation,
        ) -> std::result::Result<Vec<RawFaceRegion>, EngineError> {
            Ok(vec![RawFaceRegion::new(RegionRect::new(10, 10, 110, 110), Some(42))])
        }
    }

    struct AlwaysSurprised;

    impl EmotionModel for AlwaysSurprised {
        fn class_count(&self) -> usize {
            EMOTION_CLASS_COUNT
        }

        fn scores(&self, _input: &[f32]) -> std::result::Result<Vec<f32>, EngineError> {
            Ok(vec![0.0, 0.0, 0.0, 0.0, 0.0, 9.0, 0.0, 0.0])
        }
    }

    const LABELS: &str = "Angry\nDisgust\nFear\nHappy\nSad\nSurprise\nContempt\nNeutral\n";

    fn engines() -> EngineSlots {
        let engines = EngineSlots::new();
        engines.install_detector(Arc::new(OneFace)).unwrap();
        let labels = LabelSet::from_reader(LABELS.as_bytes(), EMOTION_CLASS_COUNT).unwrap();
        engines
            .install_classifier(&PipelineConfig::default(), Arc::new(AlwaysSurprised), labels)
            .unwrap();
        engines
    }

    #[tokio::test]
    async fn frame_flows_through_to_labelled_overlay() {
        let mut pipeline =
            OverlayPipeline::new(PipelineConfig::default(), &engines(), Handle::current());
        pipeline.attach_surface(OverlaySize::new(480, 640));

        let data = vec![90u8; 480 * 640 * 4];
        let frame = Frame::new(&data, PixelFormat::Rgba8, 480, 640, Rotation::Deg0, LensFacing::Back);
        assert_eq!(pipeline.submit_frame(&frame), SubmitOutcome::Dispatched);

        // Faces, rotation, then labels.
        for _ in 0..3 {
            pipeline.next_update().await;
        }

        let items = pipeline.render_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].tracking_id, Some(42));
        assert_eq!(items[0].label, Some("Surprise"));
        let (center_x, center_y) = items[0].label_anchor;
        assert!((center_x - 580.0).abs() < 2.0);
        assert!((center_y - 60.0).abs() < 2.0);
        assert_eq!(pipeline.display().text_rotation(), 90.0);
        assert_eq!(pipeline.classification_stats().runs, 1);
    }

    #[tokio::test]
    async fn missing_surface_is_counted_but_leaves_display_alone() {
        let mut pipeline =
            OverlayPipeline::new(PipelineConfig::default(), &engines(), Handle::current());
        let data = vec![0u8; 4 * 4 * 4];
        let frame = Frame::new(&data, PixelFormat::Rgba8, 4, 4, Rotation::Deg0, LensFacing::Front);

        assert_eq!(pipeline.submit_frame(&frame), SubmitOutcome::Rejected);
        assert_eq!(pipeline.pump(), 1);
        assert_eq!(pipeline.failures(), 1);
        assert!(pipeline.render_items().is_empty());
    }

    #[test]
    fn pump_works_from_a_thread_outside_the_runtime() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut pipeline =
            OverlayPipeline::new(PipelineConfig::default(), &engines(), runtime.handle().clone());

        let ui_thread = std::thread::spawn(move || {
            pipeline.attach_surface(OverlaySize::new(480, 640));
            let data = vec![90u8; 480 * 640 * 4];
            let frame =
                Frame::new(&data, PixelFormat::Rgba8, 480, 640, Rotation::Deg0, LensFacing::Back);
            assert_eq!(pipeline.submit_frame(&frame), SubmitOutcome::Dispatched);

            for _ in 0..500 {
                pipeline.pump();
                let labelled = pipeline
                    .render_items()
                    .first()
                    .is_some_and(|item| item.label == Some("Surprise"));
                if labelled {
                    return true;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            false
        });

        assert!(ui_thread.join().unwrap());
    }

    #[test]
    fn engines_install_only_once() {
        let engines = engines();
        assert_eq!(
            engines.install_detector(Arc::new(OneFace)).unwrap_err(),
            PipelineError::AlreadyInitialized("face detector")
        );
    }

    #[test]
    fn classifier_rejects_mismatched_label_file() {
        let engines = EngineSlots::new();
        let config = PipelineConfig {
            expected_class_count: 3,
            ..PipelineConfig::default()
        };
        let labels = LabelSet::from_reader("Happy\nSad\nNeutral\n".as_bytes(), 3).unwrap();
        let result = engines.install_classifier(&config, Arc::new(AlwaysSurprised), labels);
        assert!(matches!(result, Err(PipelineError::ResourceLoad(_))));
        assert!(!engines.classifier.is_initialized());
    }
}
