//! Image decoding and tensor preparation for the supported backbones.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use ndarray::Array4;

use super::ModelKind;

pub const INPUT_SIZE: u32 = 224;
const RESNET_RESIZE: u32 = 256;
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

pub fn decode(bytes: &[u8]) -> Result<DynamicImage, image::ImageError> {
    image::load_from_memory(bytes)
}

/// Convert an image into an NCHW `[1, 3, 224, 224]` tensor laid out for `kind`.
pub fn to_tensor(image: &DynamicImage, kind: ModelKind) -> Array4<f32> {
    let size = INPUT_SIZE as usize;
    let mut array = Array4::<f32>::zeros((1, 3, size, size));

    match kind {
        ModelKind::MobileNetV2 => {
            // Plain resize, pixels scaled to [-1, 1]
            let resized = image.resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);
            let rgb = resized.to_rgb8();
            for (x, y, pixel) in rgb.enumerate_pixels() {
                for c in 0..3 {
                    array[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 127.5 - 1.0;
                }
            }
        }
        ModelKind::ResNet50 => {
            let cropped = resize_and_center_crop(image, RESNET_RESIZE, INPUT_SIZE);
            let rgb = cropped.to_rgb8();
            for (x, y, pixel) in rgb.enumerate_pixels() {
                for c in 0..3 {
                    let v = pixel[c] as f32 / 255.0;
                    array[[0, c, y as usize, x as usize]] = (v - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
                }
            }
        }
    }

    array
}

/// Same region as resizing the shortest edge to `resize` and center cropping
/// `crop`, but crops in source pixels first so thin images never blow up into
/// a huge intermediate buffer.
fn resize_and_center_crop(image: &DynamicImage, resize: u32, crop: u32) -> DynamicImage {
    let (w, h) = image.dimensions();
    let short = w.min(h).max(1);
    let side = ((short as f32) * crop as f32 / resize as f32).round() as u32;
    let side = side.clamp(1, short);

    let start_x = w.saturating_sub(side) / 2;
    let start_y = h.saturating_sub(side) / 2;
    image
        .crop_imm(start_x, start_y, side, side)
        .resize_exact(crop, crop, FilterType::Triangle)
}

/// Scale to unit L2 norm; near-zero vectors are returned unchanged.
pub fn l2_normalize(mut vec: Vec<f32>) -> Vec<f32> {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-12 {
        for v in &mut vec {
            *v /= norm;
        }
    }
    vec
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;

    fn solid_png(w: u32, h: u32, color: [u8; 3]) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(w, h, Rgb(color));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode(b"definitely not an image").is_err());
        assert!(decode(&solid_png(4, 4, [0, 0, 0])).is_ok());
    }

    #[test]
    fn test_mobilenet_range() {
        let img = decode(&solid_png(40, 30, [255, 0, 0])).unwrap();
        let tensor = to_tensor(&img, ModelKind::MobileNetV2);
        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
        assert!((tensor[[0, 0, 10, 10]] - 1.0).abs() < 1e-2);
        assert!((tensor[[0, 1, 10, 10]] + 1.0).abs() < 1e-2);
    }

    #[test]
    fn test_resnet_crop_and_normalization() {
        let img = decode(&solid_png(600, 300, [255, 255, 255])).unwrap();
        let tensor = to_tensor(&img, ModelKind::ResNet50);
        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
        let expected = (1.0 - IMAGENET_MEAN[2]) / IMAGENET_STD[2];
        assert!((tensor[[0, 2, 223, 223]] - expected).abs() < 1e-2);
    }

    #[test]
    fn test_thin_image_crops_before_resizing() {
        let img = decode(&solid_png(1, 4000, [0, 0, 255])).unwrap();
        let cropped = resize_and_center_crop(&img, RESNET_RESIZE, INPUT_SIZE);
        assert_eq!(cropped.dimensions(), (INPUT_SIZE, INPUT_SIZE));

        for kind in [ModelKind::ResNet50, ModelKind::MobileNetV2] {
            let tensor = to_tensor(&img, kind);
            assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
            assert!(tensor.iter().all(|v| v.is_finite()));
        }
        let tensor = to_tensor(&img, ModelKind::ResNet50);
        let expected_blue = (1.0 - IMAGENET_MEAN[2]) / IMAGENET_STD[2];
        assert!((tensor[[0, 2, 112, 112]] - expected_blue).abs() < 1e-2);
    }

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(vec![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);
        assert_eq!(l2_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }
}
