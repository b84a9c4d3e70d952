// THEORY:
// The `geometry` module is the mathematical heart of the overlay. It maps a
// detector's raw face rectangle into two other coordinate spaces:
//
//   sensor buffer  ──crop rect──▶  rotated frame  (where face pixels are cut)
//   sensor buffer  ──display rect──▶  overlay surface  (where boxes are drawn)
//
// Key architectural principles:
// 1.  **Pure Functions**: Nothing here holds state or performs I/O. Every function
//     takes the frame metadata explicitly and returns a fresh value, which makes
//     the transform trivially testable and safe to call from any thread.
// 2.  **Fixed Step Order**: The display transform is mirror → scale → quarter-turn
//     → square. Mirroring is defined in frame pixels, the quarter-turn in overlay
//     pixels, and the square reshape is cosmetic, so the order cannot change.
// 3.  **Skip, Don't Crash**: A crop that cannot fit inside the rotated frame is an
//     `InvalidRegion` error. The coordinator skips that one face; the rest of the
//     batch proceeds.

use crate::core_modules::frame::{
    FaceBounds, FaceKey, FrameGeometry, LensFacing, OverlaySize, RectF, RegionRect, Rotation,
};
use crate::error::{PipelineError, Result};

/// Pixel rectangle inside the rotated frame, ready for `frame_adapter::crop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Width and height of the frame once its rotation has been applied.
pub fn rotated_frame_size(width: u32, height: u32, rotation: Rotation) -> (u32, u32) {
    if rotation.swaps_axes() {
        (height, width)
    } else {
        (width, height)
    }
}

/// Computes the rectangle to cut from the rotated frame for one face.
///
/// The face keeps its detected size; only its position moves so that it lies
/// inside the rotated bitmap. A face larger than the frame is trimmed to what
/// remains, and a face that ends up with no area is rejected.
pub fn compute_crop_rect(region: &RegionRect, frame: &FrameGeometry) -> Result<CropRect> {
    let (rotated_width, rotated_height) =
        rotated_frame_size(frame.width, frame.height, frame.rotation);
    let rotated_width = rotated_width as i64;
    let rotated_height = rotated_height as i64;

    let mut width = region.width();
    let mut height = region.height();
    let mut left = region.left as i64;
    let mut top = region.top as i64;

    if left + width > rotated_width {
        left = rotated_width - width;
    }
    if top + height > rotated_height {
        top = rotated_height - height;
    }
    left = left.max(0);
    top = top.max(0);

    width = width.min(rotated_width - left);
    height = height.min(rotated_height - top);

    if width <= 0 || height <= 0 {
        return Err(PipelineError::InvalidRegion(format!(
            "face {}x{} at ({}, {}) has no area inside {}x{} frame",
            region.width(),
            region.height(),
            region.left,
            region.top,
            rotated_width,
            rotated_height
        )));
    }

    Ok(CropRect {
        x: left as u32,
        y: top as u32,
        width: width as u32,
        height: height as u32,
    })
}

/// Maps a raw face rectangle into a square marker in overlay space.
pub fn compute_display_rect(
    region: &RegionRect,
    tracking_id: FaceKey,
    frame: &FrameGeometry,
    overlay: OverlaySize,
) -> FaceBounds {
    // --- 1. Rotated frame and overlay sizes ---
    let (rotated_width, rotated_height) =
        rotated_frame_size(frame.width, frame.height, frame.rotation);
    let (overlay_width, overlay_height) =
        rotated_frame_size(overlay.width, overlay.height, frame.rotation);
    let rotated_width = rotated_width as f32;
    let rotated_height = rotated_height as f32;
    let overlay_width = overlay_width as f32;
    let overlay_height = overlay_height as f32;

    // --- 2. Scale factors ---
    let scale_x = overlay_width / rotated_width;
    let scale_y = overlay_height / rotated_height;

    let mut rect = RectF::new(
        region.left as f32,
        region.top as f32,
        region.right as f32,
        region.bottom as f32,
    );

    // --- 3 & 4. Mirroring, in frame pixels ---
    match (frame.lens, frame.rotation) {
        (LensFacing::Front, Rotation::Deg0 | Rotation::Deg270) => {
            rect = mirror_horizontal(rect, rotated_width);
        }
        (LensFacing::Front, Rotation::Deg90 | Rotation::Deg180) => {
            rect = mirror_vertical(rect, rotated_height);
        }
        (LensFacing::Back, Rotation::Deg180 | Rotation::Deg270) => {
            rect = mirror_vertical(mirror_horizontal(rect, rotated_width), rotated_height);
        }
        (LensFacing::Back, Rotation::Deg0 | Rotation::Deg90) => {}
    }

    // --- 5. Scale into overlay pixels ---
    rect = RectF::new(
        rect.left * scale_x,
        rect.top * scale_y,
        rect.right * scale_x,
        rect.bottom * scale_y,
    );

    // --- 6. Axis correction for landscape sensor orientations ---
    if matches!(frame.rotation, Rotation::Deg0 | Rotation::Deg180) {
        rect = rotate_quarter_turn(rect, overlay_height);
    }

    // --- 7. Square marker ---
    FaceBounds {
        tracking_id,
        rect: reshape_to_square(rect),
    }
}

/// Negates X and shifts back by `width`, keeping left < right.
fn mirror_horizontal(rect: RectF, width: f32) -> RectF {
    RectF::new(width - rect.right, rect.top, width - rect.left, rect.bottom)
}

/// Negates Y and shifts back by `height`, keeping top < bottom.
fn mirror_vertical(rect: RectF, height: f32) -> RectF {
    RectF::new(rect.left, height - rect.bottom, rect.right, height - rect.top)
}

/// Rotates the rectangle 90° about the origin, `(x, y) -> (-y, x)`, then shifts
/// right by `translate_x`.
///
/// The x range `[left, right]` becomes the new y range, and the y range
/// `[top, bottom]` becomes `[-bottom, -top]` on the x axis, so the old bottom
/// edge is the new left edge.
fn rotate_quarter_turn(rect: RectF, translate_x: f32) -> RectF {
    RectF::new(
        translate_x - rect.bottom,
        rect.left,
        translate_x - rect.top,
        rect.right,
    )
}

/// Replaces a rectangle by the square with the same centre and edge `(w + h) / 2`.
pub fn reshape_to_square(rect: RectF) -> RectF {
    let (center_x, center_y) = rect.center();
    let half_edge = (rect.width() + rect.height()) / 4.0;
    RectF::new(
        center_x - half_edge,
        center_y - half_edge,
        center_x + half_edge,
        center_y + half_edge,
    )
}

/// Angle, in degrees, at which label text is drawn so it reads upright.
pub fn calculate_text_rotation(rotation: Rotation, is_front_facing: bool) -> f32 {
    if is_front_facing {
        match rotation {
            Rotation::Deg0 => 270.0,
            Rotation::Deg90 => 0.0,
            Rotation::Deg180 => 90.0,
            Rotation::Deg270 => 180.0,
        }
    } else {
        match rotation {
            Rotation::Deg0 => 90.0,
            Rotation::Deg90 => 0.0,
            Rotation::Deg180 => 270.0,
            Rotation::Deg270 => 180.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_ROTATIONS: [Rotation; 4] = [
        Rotation::Deg0,
        Rotation::Deg90,
        Rotation::Deg180,
        Rotation::Deg270,
    ];

    fn frame(rotation: Rotation, lens: LensFacing) -> FrameGeometry {
        FrameGeometry {
            width: 480,
            height: 640,
            rotation,
            lens,
        }
    }

    fn assert_close(actual: f32, expected: f32, tolerance: f32) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn display_rect_is_square_for_every_orientation() {
        let region = RegionRect::new(30, 50, 150, 210);
        let overlay = OverlaySize::new(1080, 1920);
        for rotation in ALL_ROTATIONS {
            for lens in [LensFacing::Front, LensFacing::Back] {
                let bounds = compute_display_rect(&region, Some(7), &frame(rotation, lens), overlay);
                assert!(
                    (bounds.rect.width() - bounds.rect.height()).abs() < 1e-3,
                    "{rotation:?}/{lens:?} produced {:?}",
                    bounds.rect
                );
                assert_eq!(bounds.tracking_id, Some(7));
            }
        }
    }

    #[test]
    fn quarter_turns_swap_frame_dimensions() {
        assert_eq!(rotated_frame_size(480, 640, Rotation::Deg0), (480, 640));
        assert_eq!(rotated_frame_size(480, 640, Rotation::Deg90), (640, 480));
        assert_eq!(rotated_frame_size(480, 640, Rotation::Deg180), (480, 640));
        assert_eq!(rotated_frame_size(480, 640, Rotation::Deg270), (640, 480));
    }

    #[test]
    fn square_reshape_is_idempotent() {
        let once = reshape_to_square(RectF::new(12.5, 40.0, 112.5, 220.0));
        let twice = reshape_to_square(once);
        assert_close(twice.left, once.left, 1e-4);
        assert_close(twice.top, once.top, 1e-4);
        assert_close(twice.right, once.right, 1e-4);
        assert_close(twice.bottom, once.bottom, 1e-4);
    }

    #[test]
    fn square_reshape_keeps_center_and_averages_edges() {
        let square = reshape_to_square(RectF::new(0.0, 0.0, 100.0, 50.0));
        assert_eq!(square.center(), (50.0, 25.0));
        assert_close(square.width(), 75.0, 1e-4);
        assert_close(square.height(), 75.0, 1e-4);
    }

    #[test]
    fn back_camera_upright_scenario_lands_on_hand_computed_center() {
        // Rotation 0, back lens: no mirror, unit scale, quarter turn shifted by 640.
        let region = RegionRect::new(10, 10, 110, 110);
        let bounds = compute_display_rect(
            &region,
            None,
            &frame(Rotation::Deg0, LensFacing::Back),
            OverlaySize::new(480, 640),
        );
        let (center_x, center_y) = bounds.rect.center();
        assert_close(center_x, 580.0, 2.0);
        assert_close(center_y, 60.0, 2.0);
        assert_close(bounds.rect.width(), 100.0, 1e-3);
    }

    #[test]
    fn front_camera_upright_mirrors_before_turning() {
        // Mirror x in a 480 wide frame: [370, 470]; quarter turn: x [530, 630], y [370, 470].
        let region = RegionRect::new(10, 10, 110, 110);
        let bounds = compute_display_rect(
            &region,
            None,
            &frame(Rotation::Deg0, LensFacing::Front),
            OverlaySize::new(480, 640),
        );
        let (center_x, center_y) = bounds.rect.center();
        assert_close(center_x, 580.0, 1e-3);
        assert_close(center_y, 420.0, 1e-3);
    }

    #[test]
    fn back_camera_portrait_passes_through_unchanged() {
        let region = RegionRect::new(10, 20, 110, 120);
        let bounds = compute_display_rect(
            &region,
            Some(1),
            &frame(Rotation::Deg90, LensFacing::Back),
            OverlaySize::new(480, 640),
        );
        assert_eq!(bounds.rect, RectF::new(10.0, 20.0, 110.0, 120.0));
    }

    #[test]
    fn back_camera_inverted_portrait_mirrors_both_axes() {
        // Rotated frame is 640x480; overlay swaps to 640x480 as well, so scale is 1.
        let region = RegionRect::new(10, 20, 110, 120);
        let bounds = compute_display_rect(
            &region,
            None,
            &frame(Rotation::Deg270, LensFacing::Back),
            OverlaySize::new(480, 640),
        );
        assert_eq!(bounds.rect, RectF::new(530.0, 360.0, 630.0, 460.0));
    }

    #[test]
    fn scaling_follows_overlay_to_frame_ratio() {
        let region = RegionRect::new(0, 0, 100, 100);
        let bounds = compute_display_rect(
            &region,
            None,
            &frame(Rotation::Deg90, LensFacing::Back),
            OverlaySize::new(960, 1280),
        );
        assert_eq!(bounds.rect, RectF::new(0.0, 0.0, 200.0, 200.0));
    }

    #[test]
    fn crop_rect_never_leaves_the_rotated_frame() {
        let regions = [
            RegionRect::new(-40, -40, 60, 60),
            RegionRect::new(400, 600, 520, 720),
            RegionRect::new(0, 0, 900, 900),
            RegionRect::new(600, 10, 700, 110),
            RegionRect::new(100, 100, 200, 200),
        ];
        for rotation in ALL_ROTATIONS {
            let geometry = frame(rotation, LensFacing::Back);
            let (rotated_width, rotated_height) =
                rotated_frame_size(geometry.width, geometry.height, rotation);
            for region in &regions {
                let crop = compute_crop_rect(region, &geometry).expect("region has area");
                assert!(crop.x + crop.width <= rotated_width, "{region:?} -> {crop:?}");
                assert!(crop.y + crop.height <= rotated_height, "{region:?} -> {crop:?}");
            }
        }
    }

    #[test]
    fn crop_rect_slides_overhanging_face_back_inside() {
        let crop = compute_crop_rect(
            &RegionRect::new(420, 600, 520, 700),
            &frame(Rotation::Deg0, LensFacing::Front),
        )
        .unwrap();
        assert_eq!(
            crop,
            CropRect {
                x: 380,
                y: 540,
                width: 100,
                height: 100
            }
        );
    }

    #[test]
    fn crop_rect_uses_rotated_dimensions() {
        // 640 wide once rotated, so x = 520 fits without sliding.
        let crop = compute_crop_rect(
            &RegionRect::new(520, 0, 620, 100),
            &frame(Rotation::Deg90, LensFacing::Back),
        )
        .unwrap();
        assert_eq!(crop.x, 520);
    }

    #[test]
    fn empty_region_is_rejected() {
        let result = compute_crop_rect(
            &RegionRect::new(50, 50, 50, 120),
            &frame(Rotation::Deg0, LensFacing::Back),
        );
        assert!(matches!(result, Err(PipelineError::InvalidRegion(_))));
    }

    #[test]
    fn extreme_detector_edges_do_not_overflow() {
        let geometry = frame(Rotation::Deg0, LensFacing::Back);
        let crop = compute_crop_rect(&RegionRect::new(i32::MIN, 0, i32::MAX, 10), &geometry)
            .expect("trimmed to the frame");
        assert_eq!(
            crop,
            CropRect {
                x: 0,
                y: 0,
                width: 480,
                height: 10
            }
        );

        let inverted = compute_crop_rect(&RegionRect::new(i32::MAX, 0, i32::MIN, 10), &geometry);
        assert!(matches!(inverted, Err(PipelineError::InvalidRegion(_))));
    }

    #[test]
    fn front_camera_portrait_mirrors_vertically() {
        // Rotated 640x480, unit scale, y mirrored in 480: [20, 120] -> [360, 460].
        let bounds = compute_display_rect(
            &RegionRect::new(10, 20, 110, 120),
            None,
            &frame(Rotation::Deg90, LensFacing::Front),
            OverlaySize::new(480, 640),
        );
        assert_eq!(bounds.rect, RectF::new(10.0, 360.0, 110.0, 460.0));
    }

    #[test]
    fn front_camera_upside_down_mirrors_vertically_then_turns() {
        // y mirrored in 640: [520, 620]; quarter turn by 640: x [20, 120], y [10, 110].
        let bounds = compute_display_rect(
            &RegionRect::new(10, 20, 110, 120),
            None,
            &frame(Rotation::Deg180, LensFacing::Front),
            OverlaySize::new(480, 640),
        );
        assert_eq!(bounds.rect, RectF::new(20.0, 10.0, 120.0, 110.0));
    }

    #[test]
    fn front_camera_inverted_portrait_mirrors_horizontally() {
        // Rotated 640x480, x mirrored in 640: [10, 110] -> [530, 630], no turn.
        let bounds = compute_display_rect(
            &RegionRect::new(10, 20, 110, 120),
            None,
            &frame(Rotation::Deg270, LensFacing::Front),
            OverlaySize::new(480, 640),
        );
        assert_eq!(bounds.rect, RectF::new(530.0, 20.0, 630.0, 120.0));
    }

    #[test]
    fn back_camera_upside_down_mirrors_both_axes_then_turns() {
        // x mirrored in 480: [370, 470]; y mirrored in 640: [520, 620];
        // quarter turn by 640: x [20, 120], y [370, 470].
        let bounds = compute_display_rect(
            &RegionRect::new(10, 20, 110, 120),
            None,
            &frame(Rotation::Deg180, LensFacing::Back),
            OverlaySize::new(480, 640),
        );
        assert_eq!(bounds.rect, RectF::new(20.0, 370.0, 120.0, 470.0));
    }

    #[test]
    fn text_rotation_differs_per_lens() {
        assert_eq!(calculate_text_rotation(Rotation::Deg0, true), 270.0);
        assert_eq!(calculate_text_rotation(Rotation::Deg0, false), 90.0);
        assert_eq!(calculate_text_rotation(Rotation::Deg90, true), 0.0);
        assert_eq!(calculate_text_rotation(Rotation::Deg270, false), 180.0);
    }
}
