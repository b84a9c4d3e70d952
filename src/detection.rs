// THEORY:
// The `DetectionCoordinator` owns the concurrency contract around the external
// face-detection engine. Frames arrive from the capture thread at camera rate;
// detection is far slower. Rather than queue, the coordinator admits one frame
// at a time and drops the rest, so what reaches the screen is never more than
// one detection behind the camera.
//
// Key architectural principles:
// 1.  **Dedicated Worker**: Detection runs on a single worker task spawned, on the
//     runtime handed to `new`, when a surface is attached. Without a surface there is nowhere to draw and no
//     overlay size to scale to, so `submit` rejects with a configuration error.
// 2.  **Copy On Admit**: A `Frame` only borrows the capture buffer. Admitted
//     frames are copied into a recycled buffer from a small pool; dropped frames
//     cost nothing.
// 3.  **One Snapshot Per Cycle**: Display rectangles and face crops are both built
//     from the same detector result and the same rotated bitmap, and travel
//     together in one `DetectionBatch`.
// 4.  **Channel Completion**: Results, failures and rotation changes are events
//     on a channel. The UI context drains it; nothing here touches display state.

use crate::core_modules::frame::{
    FaceBounds, FaceCrop, Frame, FrameGeometry, LensFacing, OverlaySize, PixelFormat,
    RawFaceRegion, Rotation,
};
use crate::core_modules::frame_adapter::frame_adapter;
use crate::core_modules::geometry::{compute_crop_rect, compute_display_rect};
use crate::core_modules::model_slot::ModelSlot;
use crate::core_modules::single_flight::{SingleFlight, SubmitOutcome};
use crate::error::{EngineError, PipelineError, Result};
use image::RgbaImage;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// The external face detector. Called from a blocking worker thread.
pub trait FaceDetectionEngine: Send + Sync {
    fn detect(
        &self,
        image: &RgbaImage,
        rotation: Rotation,
    ) -> std::result::Result<Vec<RawFaceRegion>, EngineError>;
}

/// Coordinator state as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    Idle,
    Detecting,
}

/// Everything one successful detection cycle produced.
#[derive(Debug, Clone)]
pub struct DetectionBatch {
    pub frame_id: u64,
    pub geometry: FrameGeometry,
    pub bounds: Vec<FaceBounds>,
    pub crops: Vec<FaceCrop>,
}

#[derive(Debug, Clone)]
pub enum DetectionEvent {
    Faces(DetectionBatch),
    /// Emitted once each time the frame rotation or lens differs from the last
    /// detected frame.
    RotationChanged(FrameGeometry),
    Failed(PipelineError),
}

/// Counters describing what the coordinator has done with submitted frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionStats {
    pub dispatched: u64,
    pub dropped: u64,
    pub rejected: u64,
    pub failed: u64,
    pub faces_skipped: u64,
}

#[derive(Debug, Default)]
struct StatCounters {
    dispatched: AtomicU64,
    dropped: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
    faces_skipped: AtomicU64,
}

impl StatCounters {
    fn snapshot(&self) -> DetectionStats {
        DetectionStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            faces_skipped: self.faces_skipped.load(Ordering::Relaxed),
        }
    }
}

/// Recycles frame copies so steady-state capture does not allocate.
pub struct FramePool {
    buffers: Mutex<VecDeque<Vec<u8>>>,
    capacity: usize,
}

impl FramePool {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Copies `data` into a pooled buffer, or a fresh one if the pool is empty.
    pub fn acquire(&self, data: &[u8]) -> Vec<u8> {
        let mut buffer = self.lock().pop_front().unwrap_or_default();
        buffer.clear();
        buffer.extend_from_slice(data);
        buffer
    }

    /// Returns a buffer for reuse. Extra buffers beyond capacity are freed.
    pub fn release(&self, buffer: Vec<u8>) {
        let mut pool = self.lock();
        if pool.len() < self.capacity {
            pool.push_back(buffer);
        }
    }

    pub fn available(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Vec<u8>>> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A frame whose pixels have been copied out of the capture buffer.
struct OwnedFrame {
    data: Vec<u8>,
    format: PixelFormat,
    geometry: FrameGeometry,
}

impl OwnedFrame {
    fn as_frame(&self) -> Frame<'_> {
        Frame::new(
            &self.data,
            self.format,
            self.geometry.width,
            self.geometry.height,
            self.geometry.rotation,
            self.geometry.lens,
        )
    }
}

struct FrameTask {
    frame_id: u64,
    frame: OwnedFrame,
    overlay: OverlaySize,
    engine: Arc<dyn FaceDetectionEngine>,
}

/// The attached surface: its size and the channel into the worker task.
struct SurfaceWorker {
    overlay: OverlaySize,
    tasks: mpsc::UnboundedSender<FrameTask>,
}

pub struct DetectionCoordinator {
    engine: Arc<ModelSlot<dyn FaceDetectionEngine>>,
    flight: Arc<SingleFlight>,
    surface: Mutex<Option<SurfaceWorker>>,
    events: mpsc::UnboundedSender<DetectionEvent>,
    pool: Arc<FramePool>,
    frame_counter: AtomicU64,
    stats: Arc<StatCounters>,
    runtime: Handle,
}

impl DetectionCoordinator {
    /// Creates a coordinator and the receiving end of its event channel. The
    /// worker is spawned on `runtime`, so the coordinator itself can be driven
    /// from any thread.
    pub fn new(
        engine: Arc<ModelSlot<dyn FaceDetectionEngine>>,
        frame_pool_size: usize,
        runtime: Handle,
    ) -> (Self, mpsc::UnboundedReceiver<DetectionEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let coordinator = Self {
            engine,
            flight: Arc::new(SingleFlight::new()),
            surface: Mutex::new(None),
            events,
            pool: Arc::new(FramePool::new(frame_pool_size)),
            frame_counter: AtomicU64::new(0),
            stats: Arc::new(StatCounters::default()),
            runtime,
        };
        (coordinator, receiver)
    }

    /// Attaches the drawing surface and starts the detection worker.
    ///
    /// Attaching again only updates the overlay size; the running worker is kept.
    pub fn attach_surface(&self, overlay: OverlaySize) {
        let mut surface = self.lock_surface();
        if let Some(existing) = surface.as_mut() {
            if !existing.tasks.is_closed() {
                existing.overlay = overlay;
                return;
            }
        }

        let (tasks, receiver) = mpsc::unbounded_channel();
        self.runtime.spawn(run_worker(
            receiver,
            self.flight.clone(),
            self.events.clone(),
            self.pool.clone(),
            self.stats.clone(),
        ));
        info!(
            "Detection worker started for {}x{} overlay",
            overlay.width, overlay.height
        );
        *surface = Some(SurfaceWorker { overlay, tasks });
    }

    /// Detaches the surface. A detection already in flight still completes.
    pub fn detach_surface(&self) {
        if self.lock_surface().take().is_some() {
            info!("Detection worker detached");
        }
    }

    /// Offers a frame for detection. Never blocks.
    pub fn submit(&self, frame: &Frame<'_>) -> SubmitOutcome {
        let surface = self.lock_surface();
        let Some(worker) = surface.as_ref() else {
            return self.reject(PipelineError::Configuration(
                "no surface attached; detection worker is not running".to_string(),
            ));
        };
        let engine = match self.engine.get() {
            Ok(engine) => engine,
            Err(err) => return self.reject(err),
        };

        if !self.flight.try_begin() {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            debug!("Detection in flight, dropping frame");
            return SubmitOutcome::Dropped;
        }

        let frame_id = self.frame_counter.fetch_add(1, Ordering::Relaxed);
        let task = FrameTask {
            frame_id,
            frame: OwnedFrame {
                data: self.pool.acquire(frame.data),
                format: frame.format,
                geometry: frame.geometry(),
            },
            overlay: worker.overlay,
            engine,
        };

        if let Err(mpsc::error::SendError(task)) = worker.tasks.send(task) {
            self.pool.release(task.frame.data);
            self.flight.finish();
            return self.reject(PipelineError::Configuration(
                "detection worker has stopped".to_string(),
            ));
        }

        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
        SubmitOutcome::Dispatched
    }

    pub fn state(&self) -> DetectorState {
        if self.flight.is_busy() {
            DetectorState::Detecting
        } else {
            DetectorState::Idle
        }
    }

    pub fn stats(&self) -> DetectionStats {
        self.stats.snapshot()
    }

    pub fn frame_pool(&self) -> &FramePool {
        &self.pool
    }

    fn reject(&self, err: PipelineError) -> SubmitOutcome {
        warn!("Rejecting frame: {}", err);
        self.stats.rejected.fetch_add(1, Ordering::Relaxed);
        let _ = self.events.send(DetectionEvent::Failed(err));
        SubmitOutcome::Rejected
    }

    fn lock_surface(&self) -> MutexGuard<'_, Option<SurfaceWorker>> {
        self.surface.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The dedicated detection worker: one frame at a time, in arrival order.
async fn run_worker(
    mut tasks: mpsc::UnboundedReceiver<FrameTask>,
    flight: Arc<SingleFlight>,
    events: mpsc::UnboundedSender<DetectionEvent>,
    pool: Arc<FramePool>,
    stats: Arc<StatCounters>,
) {
    let mut last_orientation: Option<(Rotation, LensFacing)> = None;

    while let Some(task) = tasks.recv().await {
        let FrameTask {
            frame_id,
            frame,
            overlay,
            engine,
        } = task;
        let geometry = frame.geometry;

        // --- 1. Decode, rotate and detect off the async threads ---
        let detected = tokio::task::spawn_blocking(move || {
            let result = frame_adapter::decode_and_rotate(&frame.as_frame()).and_then(|rotated| {
                let regions = engine.detect(&rotated, geometry.rotation)?;
                Ok((rotated, regions))
            });
            (frame.data, result)
        })
        .await;

        // --- 2. Back to idle before any post-processing ---
        flight.finish();

        let result = match detected {
            Ok((buffer, result)) => {
                pool.release(buffer);
                result
            }
            Err(join_error) => Err(PipelineError::Engine(format!(
                "detection task aborted: {join_error}"
            ))),
        };

        match result {
            Ok((rotated, regions)) => {
                // --- 3. Geometry and crops from the same snapshot ---
                let batch = build_batch(frame_id, geometry, overlay, &rotated, &regions, &stats);
                debug!(
                    "Frame {} produced {} faces",
                    frame_id,
                    batch.bounds.len()
                );
                let _ = events.send(DetectionEvent::Faces(batch));

                let orientation = (geometry.rotation, geometry.lens);
                if last_orientation != Some(orientation) {
                    last_orientation = Some(orientation);
                    info!(
                        "Frame orientation is now {}° ({:?} lens)",
                        geometry.rotation.degrees(),
                        geometry.lens
                    );
                    let _ = events.send(DetectionEvent::RotationChanged(geometry));
                }
            }
            Err(PipelineError::Decode(message)) => {
                warn!("Dropping undecodable frame {}: {}", frame_id, message);
                stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                warn!("Face detection failed for frame {}: {}", frame_id, err);
                stats.failed.fetch_add(1, Ordering::Relaxed);
                let _ = events.send(DetectionEvent::Failed(err));
            }
        }
    }

    debug!("Detection worker stopped");
}

/// Maps every detected region to a display rectangle and a face crop. Faces
/// whose crop cannot be taken are skipped entirely so the two lists stay paired.
fn build_batch(
    frame_id: u64,
    geometry: FrameGeometry,
    overlay: OverlaySize,
    rotated: &RgbaImage,
    regions: &[RawFaceRegion],
    stats: &StatCounters,
) -> DetectionBatch {
    let mut bounds = Vec::with_capacity(regions.len());
    let mut crops = Vec::with_capacity(regions.len());

    for region in regions {
        match crop_face(region, &geometry, rotated) {
            Ok(image) => {
                bounds.push(compute_display_rect(
                    &region.bounds,
                    region.tracking_id,
                    &geometry,
                    overlay,
                ));
                crops.push(FaceCrop {
                    tracking_id: region.tracking_id,
                    image,
                });
            }
            Err(err) => {
                warn!("Skipping face {:?}: {}", region.tracking_id, err);
                stats.faces_skipped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    DetectionBatch {
        frame_id,
        geometry,
        bounds,
        crops,
    }
}

fn crop_face(
    region: &RawFaceRegion,
    geometry: &FrameGeometry,
    rotated: &RgbaImage,
) -> Result<RgbaImage> {
    let rect = compute_crop_rect(&region.bounds, geometry)?;
    frame_adapter::crop(rotated, &rect)
}
