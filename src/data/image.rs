// ============================================================
// Layer 4 — Image Decoder
// ============================================================
// Converts encoded image bytes into backbone-ready tensors.
//
//   decode bytes (image crate, JPEG/PNG)
//       │
//       ├── whole image → resize to size x size → global tensor
//       │                 (box rescaled into resized coordinates)
//       │
//       └── crop to box → resize to size x size → local tensor
//
// Tensors are planar RGB, normalised per channel with the
// ImageNet statistics the backbone was pretrained on.
//
// Reference: image crate documentation (imageops::resize)

use image::{imageops::FilterType, DynamicImage, GenericImageView};

use crate::domain::annotation::BoundingBox;
use crate::domain::error::CaptionResult;
use crate::domain::features::{ImageTensor, IMG_CHANNELS};

const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Debug, Clone, Copy)]
pub struct ImageDecoder {
    size: usize,
}

impl ImageDecoder {
    pub fn new(size: usize) -> Self {
        Self { size }
    }

    pub fn load(&self, bytes: &[u8]) -> CaptionResult<DynamicImage> {
        Ok(image::load_from_memory(bytes)?)
    }

    /// The whole image resized, plus `bbox` mapped into the resized frame.
    pub fn global(&self, img: &DynamicImage, bbox: &BoundingBox) -> (ImageTensor, BoundingBox) {
        let (w, h) = img.dimensions();
        let sx = self.size as f32 / w as f32;
        let sy = self.size as f32 / h as f32;
        (self.to_tensor(img), bbox.scaled(sx, sy))
    }

    /// The region under `bbox` resized to the full tensor size.
    /// `bbox` must already be clamped to the image.
    pub fn crop(&self, img: &DynamicImage, bbox: &BoundingBox) -> ImageTensor {
        let (w, h) = img.dimensions();
        let x = (bbox.x0.floor() as u32).min(w.saturating_sub(1));
        let y = (bbox.y0.floor() as u32).min(h.saturating_sub(1));
        let cw = ((bbox.x1.ceil() as u32).min(w).saturating_sub(x)).max(1);
        let ch = ((bbox.y1.ceil() as u32).min(h).saturating_sub(y)).max(1);
        self.to_tensor(&img.crop_imm(x, y, cw, ch))
    }

    fn to_tensor(&self, img: &DynamicImage) -> ImageTensor {
        let side = self.size as u32;
        let rgb = img.resize_exact(side, side, FilterType::Triangle).to_rgb8();
        let plane = self.size * self.size;
        let mut pixels = vec![0.0f32; IMG_CHANNELS * plane];
        for (i, px) in rgb.pixels().enumerate() {
            for c in 0..IMG_CHANNELS {
                pixels[c * plane + i] = (px[c] as f32 / 255.0 - MEAN[c]) / STD[c];
            }
        }
        ImageTensor {
            size: self.size,
            pixels,
        }
    }
}

/// Encode an RGB image as PNG bytes.
#[cfg(test)]
pub fn encode_png(img: &image::RgbImage) -> Vec<u8> {
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .expect("in-memory PNG encoding");
    out.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// Left half black, right half white.
    fn split_image(w: u32, h: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(w, h, |x, _| {
            if x < w / 2 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        encode_png(&img)
    }

    #[test]
    fn test_global_tensor_has_fixed_shape_and_rescaled_box() {
        let dec = ImageDecoder::new(16);
        let img = dec.load(&split_image(64, 32)).unwrap();
        let (t, b) = dec.global(&img, &BoundingBox::new(16.0, 48.0, 8.0, 24.0));
        assert_eq!(t.shape(), [3, 16, 16]);
        assert_eq!(b, BoundingBox::new(4.0, 12.0, 4.0, 12.0));
    }

    #[test]
    fn test_crop_only_sees_the_box() {
        let dec = ImageDecoder::new(8);
        let img = dec.load(&split_image(40, 20)).unwrap();
        // Box entirely inside the white half.
        let t = dec.crop(&img, &BoundingBox::new(25.0, 35.0, 2.0, 18.0));
        let white = (1.0 - MEAN[0]) / STD[0];
        assert!(t.pixels[..64].iter().all(|v| (v - white).abs() < 1e-4));
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        let dec = ImageDecoder::new(8);
        assert!(dec.load(b"not an image").is_err());
    }
}
