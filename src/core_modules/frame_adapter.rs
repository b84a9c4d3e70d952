// THEORY:
// The `FrameAdapter` is the bridge between the camera's raw buffer and the
// image-space the rest of the pipeline reasons about. The geometry transform
// assumes a "rotated frame": the capture as a viewer would see it right side up.
// This module is what actually produces that bitmap, and it is the only place
// that knows how to cut pixels out of it.
//
// Key architectural principles:
// 1.  **One Canonical Layout**: Whatever the capture format (RGBA, RGB, NV21 or a
//     compressed still), the output is always an `RgbaImage`. Downstream code
//     never branches on pixel format.
// 2.  **Rotation Matches Geometry**: Rotation is clockwise by the frame's angle,
//     about the image centre, so a 90° or 270° turn swaps width and height
//     exactly as `geometry::rotated_frame_size` predicts.
// 3.  **Defensive Crop**: `crop` re-checks bounds even though `geometry` already
//     clamped the rectangle. A failure here costs one face, never the batch.
// 4.  **Stateless Utility**: No memory between frames.

use crate::core_modules::frame::{Frame, PixelFormat, Rotation};
use crate::core_modules::geometry::CropRect;
use crate::error::{PipelineError, Result};
use image::{DynamicImage, RgbImage, RgbaImage, imageops};

pub mod frame_adapter {
    use super::*;

    /// Decodes the capture buffer and turns it upright.
    pub fn decode_and_rotate(frame: &Frame<'_>) -> Result<RgbaImage> {
        let decoded = decode(frame)?;
        Ok(rotate(&decoded, frame.rotation))
    }

    /// Converts the raw buffer into RGBA without changing orientation.
    pub fn decode(frame: &Frame<'_>) -> Result<RgbaImage> {
        let pixel_count = frame.width as usize * frame.height as usize;
        if pixel_count == 0 && frame.format != PixelFormat::Encoded {
            return Err(PipelineError::Decode(format!(
                "frame has no pixels ({}x{})",
                frame.width, frame.height
            )));
        }

        match frame.format {
            PixelFormat::Rgba8 => {
                let expected = pixel_count * 4;
                require_length(frame.data, expected, "RGBA")?;
                RgbaImage::from_raw(frame.width, frame.height, frame.data[..expected].to_vec())
                    .ok_or_else(|| PipelineError::Decode("RGBA buffer rejected".to_string()))
            }
            PixelFormat::Rgb8 => {
                let expected = pixel_count * 3;
                require_length(frame.data, expected, "RGB")?;
                let rgb =
                    RgbImage::from_raw(frame.width, frame.height, frame.data[..expected].to_vec())
                        .ok_or_else(|| PipelineError::Decode("RGB buffer rejected".to_string()))?;
                Ok(DynamicImage::ImageRgb8(rgb).to_rgba8())
            }
            PixelFormat::Nv21 => {
                let chroma_rows = frame.height.div_ceil(2) as usize;
                let chroma_row_bytes = frame.width.div_ceil(2) as usize * 2;
                let expected = pixel_count + chroma_rows * chroma_row_bytes;
                require_length(frame.data, expected, "NV21")?;
                let rgb = RgbImage::from_raw(
                    frame.width,
                    frame.height,
                    nv21_to_rgb(frame.data, frame.width, frame.height),
                )
                .ok_or_else(|| PipelineError::Decode("NV21 conversion rejected".to_string()))?;
                Ok(DynamicImage::ImageRgb8(rgb).to_rgba8())
            }
            PixelFormat::Encoded => {
                let decoded = image::load_from_memory(frame.data)?.to_rgba8();
                if decoded.dimensions() != (frame.width, frame.height) {
                    return Err(PipelineError::Decode(format!(
                        "encoded image is {}x{}, frame declares {}x{}",
                        decoded.width(),
                        decoded.height(),
                        frame.width,
                        frame.height
                    )));
                }
                Ok(decoded)
            }
        }
    }

    /// Rotates clockwise by a right angle.
    pub fn rotate(image: &RgbaImage, rotation: Rotation) -> RgbaImage {
        match rotation {
            Rotation::Deg0 => image.clone(),
            Rotation::Deg90 => imageops::rotate90(image),
            Rotation::Deg180 => imageops::rotate180(image),
            Rotation::Deg270 => imageops::rotate270(image),
        }
    }

    /// Copies the pixels under `rect` out of the rotated frame.
    pub fn crop(image: &RgbaImage, rect: &CropRect) -> Result<RgbaImage> {
        let fits_horizontally = rect.x as u64 + rect.width as u64 <= image.width() as u64;
        let fits_vertically = rect.y as u64 + rect.height as u64 <= image.height() as u64;
        if rect.width == 0 || rect.height == 0 || !fits_horizontally || !fits_vertically {
            return Err(PipelineError::InvalidRegion(format!(
                "crop {}x{} at ({}, {}) exceeds {}x{} image",
                rect.width,
                rect.height,
                rect.x,
                rect.y,
                image.width(),
                image.height()
            )));
        }
        Ok(imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image())
    }

    fn require_length(data: &[u8], expected: usize, format: &str) -> Result<()> {
        if data.len() < expected {
            return Err(PipelineError::Decode(format!(
                "{format} buffer holds {} bytes, expected {expected}",
                data.len()
            )));
        }
        Ok(())
    }

    /// NV21 (Y plane + interleaved V/U at half resolution) to packed RGB.
    /// The caller guarantees the buffer covers both planes.
    fn nv21_to_rgb(yuv: &[u8], width: u32, height: u32) -> Vec<u8> {
        let width = width as usize;
        let height = height as usize;
        let frame_size = width * height;
        let chroma_row_bytes = width.div_ceil(2) * 2;
        let mut rgb = vec![0u8; frame_size * 3];

        for y in 0..height {
            for x in 0..width {
                let y_index = y * width + x;
                let uv_index = frame_size + (y / 2) * chroma_row_bytes + (x & !1);

                let luma = yuv[y_index] as f32;
                let v = yuv[uv_index] as f32 - 128.0;
                let u = yuv[uv_index + 1] as f32 - 128.0;

                let out = y_index * 3;
                rgb[out] = (luma + 1.370705 * v).clamp(0.0, 255.0) as u8;
                rgb[out + 1] = (luma - 0.337633 * u - 0.698001 * v).clamp(0.0, 255.0) as u8;
                rgb[out + 2] = (luma + 1.732446 * u).clamp(0.0, 255.0) as u8;
            }
        }
        rgb
    }
}
