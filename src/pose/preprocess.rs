use image::{imageops, RgbImage};
use ndarray::Array4;

/// MoveNet用の入力サイズ
pub const MOVENET_INPUT_SIZE: u32 = 192;

/// RGB フレームを MoveNet用の入力テンソルに変換
///
/// - 192x192 にリサイズ
/// - [1, 192, 192, 3] の f32 テンソルに変換 (0.0-255.0)
pub fn preprocess_for_movenet(frame: &RgbImage) -> Array4<f32> {
    let resized = imageops::resize(
        frame,
        MOVENET_INPUT_SIZE,
        MOVENET_INPUT_SIZE,
        imageops::FilterType::Triangle,
    );

    let size = MOVENET_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, size, size, 3));

    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, y as usize, x as usize, c]] = pixel[c] as f32;
        }
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_shape_and_range() {
        let frame = RgbImage::from_pixel(64, 48, image::Rgb([255, 128, 0]));
        let tensor = preprocess_for_movenet(&frame);
        assert_eq!(tensor.shape(), &[1, 192, 192, 3]);
        assert!((tensor[[0, 10, 10, 0]] - 255.0).abs() < 1.0);
        assert!(tensor[[0, 10, 10, 2]].abs() < 1.0);
    }
}
