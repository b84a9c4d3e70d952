// THEORY:
// The `preprocess` module owns the numeric contract between a cropped face and
// the emotion model. The model was trained on 48x48 single-channel images with
// intensities in [0, 1], so every crop, whatever its size, is squeezed into that
// exact layout. The luma weights and the divide-by-255 are part of the contract
// and must not drift.
//
// It also holds the two post-processing steps applied to raw model scores:
// softmax (shifted by the maximum so large scores cannot overflow) and a
// deterministic arg-max.

use image::{RgbaImage, imageops};

pub type Luma = f32;
pub type Probability = f32;

const RED_WEIGHT: f32 = 0.2989;
const GREEN_WEIGHT: f32 = 0.5870;
const BLUE_WEIGHT: f32 = 0.1140;

/// Intensity of one RGB pixel, in 0..=255.
pub fn luma(red: u8, green: u8, blue: u8) -> Luma {
    RED_WEIGHT * red as f32 + GREEN_WEIGHT * green as f32 + BLUE_WEIGHT * blue as f32
}

/// Intensity of one RGB pixel scaled to [0, 1].
///
/// Luma is quantized to an 8-bit gray level before scaling, as a grayscale
/// bitmap would store it, so white maps to exactly 1.0.
pub fn normalized_luma(red: u8, green: u8, blue: u8) -> Luma {
    luma(red, green, blue).round().clamp(0.0, 255.0) / 255.0
}

/// Resizes a face to the model's input size and flattens it row-major into
/// normalized luma values. Alpha is ignored.
pub fn to_model_input(face: &RgbaImage, width: u32, height: u32) -> Vec<f32> {
    let resized = if face.dimensions() == (width, height) {
        face.clone()
    } else {
        imageops::resize(face, width, height, imageops::FilterType::Triangle)
    };

    resized
        .pixels()
        .map(|pixel| normalized_luma(pixel[0], pixel[1], pixel[2]))
        .collect()
}

/// Turns raw class scores into a probability distribution.
pub fn softmax(scores: &[f32]) -> Vec<Probability> {
    if scores.is_empty() {
        return Vec::new();
    }
    let max_score = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exponentials: Vec<f32> = scores.iter().map(|&s| (s - max_score).exp()).collect();
    let total: f32 = exponentials.iter().sum();
    exponentials.into_iter().map(|e| e / total).collect()
}

/// Index and value of the largest entry. The first index wins exact ties.
pub fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &value) in values.iter().enumerate() {
        match best {
            Some((_, best_value)) if value <= best_value => {}
            _ => best = Some((index, value)),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn reference_colors_map_to_expected_luma() {
        assert!((luma(255, 0, 0) - 76.2195).abs() < 1e-3);
        assert!((normalized_luma(255, 0, 0) - 0.2988).abs() < 1e-3);
        assert_eq!(normalized_luma(255, 255, 255), 1.0);
        assert_eq!(normalized_luma(0, 0, 0), 0.0);
    }

    #[test]
    fn model_input_is_row_major_and_fixed_size() {
        let mut face = RgbaImage::from_pixel(48, 48, Rgba([0, 0, 0, 255]));
        face.put_pixel(1, 0, Rgba([255, 255, 255, 255]));
        let input = to_model_input(&face, 48, 48);
        assert_eq!(input.len(), 48 * 48);
        assert_eq!(input[1], 1.0);
        assert_eq!(input[48], 0.0);
    }

    #[test]
    fn model_input_resizes_any_crop() {
        let face = RgbaImage::from_pixel(131, 97, Rgba([255, 255, 255, 255]));
        let input = to_model_input(&face, 48, 48);
        assert_eq!(input.len(), 48 * 48);
        assert!(input.iter().all(|&v| (v - 1.0).abs() < 1e-2));
    }

    #[test]
    fn softmax_sums_to_one() {
        let inputs: [[f32; 8]; 3] = [
            [0.1, -2.0, 3.5, 0.0, 1.0, -0.5, 2.2, 0.3],
            [0.0; 8],
            [800.0, 799.0, -800.0, 0.0, 1.0, 2.0, 3.0, 4.0],
        ];
        for scores in inputs {
            let probabilities = softmax(&scores);
            let total: f32 = probabilities.iter().sum();
            assert!((total - 1.0).abs() < 1e-5, "{scores:?} summed to {total}");
            assert!(probabilities.iter().all(|p| p.is_finite()));
        }
    }

    #[test]
    fn softmax_preserves_ordering() {
        let probabilities = softmax(&[1.0, 3.0, 2.0]);
        assert!(probabilities[1] > probabilities[2]);
        assert!(probabilities[2] > probabilities[0]);
    }

    #[test]
    fn argmax_prefers_first_on_ties() {
        assert_eq!(argmax(&[0.1, 0.4, 0.4, 0.1]), Some((1, 0.4)));
        assert_eq!(argmax(&[0.125; 8]).map(|(i, _)| i), Some(0));
        assert_eq!(argmax(&[]), None);
    }
}
