// THEORY:
// This file is the main entry point for the `emotion_overlay` library crate.
// It defines the public API handed to the application that owns the camera
// and the drawing surface.
//
// The primary export is `OverlayPipeline` with its `PipelineConfig` and
// `EngineSlots`: frames go in, and `render_items` comes out as square face
// outlines with emotion labels. The coordinators, geometry and pre-processing
// live in their own modules and can be used on their own, but most callers
// never need to.

pub mod classification;
pub mod core_modules;
pub mod detection;
pub mod display;
pub mod error;
pub mod pipeline;

pub use error::{EngineError, PipelineError, Result};
pub use pipeline::{EngineSlots, OverlayPipeline, PipelineConfig};
