// THEORY:
// The `frame` module holds the data model shared by every layer of the overlay
// pipeline. These are "dumb" data containers: they describe a camera capture, a
// detector's raw output, and the display-ready results of one detection cycle.
// None of them know how to transform themselves; that is the job of `geometry`
// and `frame_adapter`.
//
// Key architectural principles:
// 1.  **Borrowed Frames**: A `Frame` borrows the capture buffer for the duration
//     of one call. Anything that needs the pixels later must copy them.
// 2.  **Closed Orientation Set**: Rotation is an enum of the four right angles, so
//     an arbitrary angle can never reach the geometry code.
// 3.  **Optional Identity**: A tracking id exists only when the detector supports
//     cross-frame tracking. `None` means "untracked this frame".

use image::RgbaImage;

/// Opaque detector-assigned identifier, stable across frames for the same face.
pub type TrackingId = i32;

/// Key used to pair rectangles, crops and labels within a cycle.
pub type FaceKey = Option<TrackingId>;

/// Sensor rotation reported with each capture, clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Maps a raw angle in degrees to a `Rotation`. Only exact right angles are accepted.
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees % 360 {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// True for 90 and 270, where width and height trade places.
    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

/// Which way the capturing lens faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LensFacing {
    Front,
    Back,
}

/// Layout of the raw capture buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 4 bytes per pixel, row-major.
    Rgba8,
    /// 3 bytes per pixel, row-major.
    Rgb8,
    /// Android camera default: full-res Y plane followed by interleaved V/U at half resolution.
    Nv21,
    /// A compressed still (JPEG, PNG, ...) recognised from its header.
    Encoded,
}

/// One camera capture. Width and height are in sensor orientation, before rotation.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub data: &'a [u8],
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,
    pub lens: LensFacing,
}

impl<'a> Frame<'a> {
    pub fn new(
        data: &'a [u8],
        format: PixelFormat,
        width: u32,
        height: u32,
        rotation: Rotation,
        lens: LensFacing,
    ) -> Self {
        Self {
            data,
            format,
            width,
            height,
            rotation,
            lens,
        }
    }

    /// The metadata half of the frame, detached from the pixel buffer.
    pub fn geometry(&self) -> FrameGeometry {
        FrameGeometry {
            width: self.width,
            height: self.height,
            rotation: self.rotation,
            lens: self.lens,
        }
    }
}

/// Everything the geometry transform needs to know about a frame, without the pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,
    pub lens: LensFacing,
}

/// Integer rectangle in detector space, with exclusive right/bottom edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl RegionRect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Horizontal extent. Widened so no pair of `i32` edges can overflow.
    pub fn width(&self) -> i64 {
        self.right as i64 - self.left as i64
    }

    pub fn height(&self) -> i64 {
        self.bottom as i64 - self.top as i64
    }
}

/// A face as reported by the detection engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFaceRegion {
    pub bounds: RegionRect,
    pub tracking_id: Option<TrackingId>,
}

impl RawFaceRegion {
    pub fn new(bounds: RegionRect, tracking_id: Option<TrackingId>) -> Self {
        Self {
            bounds,
            tracking_id,
        }
    }
}

/// Floating-point rectangle in overlay coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RectF {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl RectF {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }
}

/// Display-ready face rectangle for one detection cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBounds {
    pub tracking_id: FaceKey,
    pub rect: RectF,
}

/// Face pixels cut from the rotated frame, owned until the classifier consumes them.
#[derive(Debug, Clone)]
pub struct FaceCrop {
    pub tracking_id: FaceKey,
    pub image: RgbaImage,
}

/// Size of the drawing surface the overlay renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlaySize {
    pub width: u32,
    pub height: u32,
}

impl OverlaySize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}
