// Example runner: maps face regions from a still image onto an overlay the size
// of the upright frame, draws the square outlines and saves the result.
//
// Usage: emotion_overlay <image> <rotation> <front|back> <left,top,right,bottom>... <output.png>

use anyhow::{Context, bail};
use emotion_overlay::core_modules::frame::{
    Frame, LensFacing, OverlaySize, PixelFormat, RectF, RegionRect, Rotation,
};
use emotion_overlay::core_modules::frame_adapter::frame_adapter;
use emotion_overlay::core_modules::geometry::{
    calculate_text_rotation, compute_crop_rect, compute_display_rect,
};
use image::{Rgba, RgbaImage};
use std::env;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const OUTLINE: Rgba<u8> = Rgba([0, 255, 0, 255]);
const OUTLINE_THICKNESS: i64 = 3;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // --- 1. Argument Parsing ---
    let args: Vec<String> = env::args().collect();
    if args.len() < 6 {
        println!(
            "Usage: emotion_overlay <image> <rotation> <front|back> <left,top,right,bottom>... <output.png>"
        );
        return Ok(());
    }
    let input_path = &args[1];
    let rotation = parse_rotation(&args[2])?;
    let lens = parse_lens(&args[3])?;
    let regions = args[4..args.len() - 1]
        .iter()
        .map(|arg| parse_region(arg))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let output_path = &args[args.len() - 1];

    // --- 2. Frame Decoding ---
    let bytes = std::fs::read(input_path).with_context(|| format!("reading {input_path}"))?;
    let (width, height) = image::image_dimensions(input_path)?;
    let frame = Frame::new(&bytes, PixelFormat::Encoded, width, height, rotation, lens);
    let mut canvas = frame_adapter::decode_and_rotate(&frame)?;
    let geometry = frame.geometry();
    let overlay = OverlaySize::new(canvas.width(), canvas.height());
    info!(
        "Decoded {}x{} frame, upright canvas is {}x{}",
        width, height, overlay.width, overlay.height
    );

    // --- 3. Geometry & Drawing ---
    for (index, region) in regions.iter().enumerate() {
        match compute_crop_rect(region, &geometry) {
            Ok(crop) => info!(
                "Face {}: crop {}x{} at ({}, {})",
                index, crop.width, crop.height, crop.x, crop.y
            ),
            Err(err) => {
                warn!("Face {} skipped: {}", index, err);
                continue;
            }
        }
        let bounds = compute_display_rect(region, Some(index as i32), &geometry, overlay);
        let (center_x, center_y) = bounds.rect.center();
        info!(
            "Face {}: outline {:?}, label at ({:.1}, {:.1})",
            index, bounds.rect, center_x, center_y
        );
        draw_outline(&mut canvas, &bounds.rect);
    }
    info!(
        "Label text angle: {}°",
        calculate_text_rotation(rotation, lens == LensFacing::Front)
    );

    // --- 4. Output ---
    canvas
        .save(output_path)
        .with_context(|| format!("writing {output_path}"))?;
    info!("Overlay written to {}", output_path);
    Ok(())
}

fn parse_rotation(arg: &str) -> anyhow::Result<Rotation> {
    let degrees: u32 = arg.parse().with_context(|| format!("rotation '{arg}'"))?;
    match Rotation::from_degrees(degrees) {
        Some(rotation) => Ok(rotation),
        None => bail!("rotation must be 0, 90, 180 or 270, got {degrees}"),
    }
}

fn parse_lens(arg: &str) -> anyhow::Result<LensFacing> {
    match arg {
        "front" => Ok(LensFacing::Front),
        "back" => Ok(LensFacing::Back),
        other => bail!("lens must be 'front' or 'back', got '{other}'"),
    }
}

fn parse_region(arg: &str) -> anyhow::Result<RegionRect> {
    let values = arg
        .split(',')
        .map(|part| part.trim().parse::<i32>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("region '{arg}'"))?;
    match values.as_slice() {
        [left, top, right, bottom] => Ok(RegionRect::new(*left, *top, *right, *bottom)),
        _ => bail!("region '{arg}' needs four comma-separated values"),
    }
}

fn draw_outline(canvas: &mut RgbaImage, rect: &RectF) {
    let (width, height) = (canvas.width() as i64, canvas.height() as i64);
    let left = rect.left.round() as i64;
    let top = rect.top.round() as i64;
    let right = rect.right.round() as i64;
    let bottom = rect.bottom.round() as i64;

    for y in top..=bottom {
        for x in left..=right {
            let on_edge = x - left < OUTLINE_THICKNESS
                || right - x < OUTLINE_THICKNESS
                || y - top < OUTLINE_THICKNESS
                || bottom - y < OUTLINE_THICKNESS;
            if on_edge && (0..width).contains(&x) && (0..height).contains(&y) {
                canvas.put_pixel(x as u32, y as u32, OUTLINE);
            }
        }
    }
}
