//! Image decoding and CLIP input preparation.
//!
//! Catalog and upload images arrive as raw bytes in arbitrary formats and
//! sizes. Decoding normalizes them to 3-channel RGB and caps the longer
//! edge at [`MAX_DECODE_EDGE`] pixels; large sources cost memory and
//! compute without improving embedding quality at the model's input
//! resolution. [`clip_pixel_values`] then produces the NCHW tensor the
//! vision tower expects.

use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};

/// Longer-edge cap applied at decode time.
pub const MAX_DECODE_EDGE: u32 = 1024;

/// CLIP ViT-B/32 input resolution.
pub const CLIP_INPUT_SIZE: u32 = 224;

/// Per-channel normalization constants from the CLIP preprocessing pipeline.
pub const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
pub const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// Decode raw image bytes into RGB8, downscaling oversized sources.
///
/// Aspect ratio is preserved; Lanczos3 keeps the downscale artifact-free.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, image::ImageError> {
    let decoded = image::load_from_memory(bytes)?;

    let (w, h) = (decoded.width(), decoded.height());
    let image = if w.max(h) > MAX_DECODE_EDGE {
        decoded.resize(MAX_DECODE_EDGE, MAX_DECODE_EDGE, FilterType::Lanczos3)
    } else {
        decoded
    };

    Ok(image.to_rgb8())
}

/// Prepare a CLIP input tensor from an RGB image.
///
/// Shorter-edge resize to 224 (CatmullRom, matching the reference bicubic),
/// center crop to 224x224, scale to [0,1], normalize per channel, and lay
/// out as NCHW: `[1, 3, 224, 224]` flattened row-major.
pub fn clip_pixel_values(image: &RgbImage) -> Vec<f32> {
    let (w, h) = (image.width(), image.height());

    // Resize so the shorter edge lands exactly on the input size.
    let (new_w, new_h) = if w <= h {
        let scaled_h = ((h as f64) * (CLIP_INPUT_SIZE as f64) / (w as f64)).round() as u32;
        (CLIP_INPUT_SIZE, scaled_h.max(CLIP_INPUT_SIZE))
    } else {
        let scaled_w = ((w as f64) * (CLIP_INPUT_SIZE as f64) / (h as f64)).round() as u32;
        (scaled_w.max(CLIP_INPUT_SIZE), CLIP_INPUT_SIZE)
    };

    let resized = DynamicImage::ImageRgb8(image.clone())
        .resize_exact(new_w, new_h, FilterType::CatmullRom)
        .to_rgb8();

    let left = (new_w - CLIP_INPUT_SIZE) / 2;
    let top = (new_h - CLIP_INPUT_SIZE) / 2;
    let cropped =
        image::imageops::crop_imm(&resized, left, top, CLIP_INPUT_SIZE, CLIP_INPUT_SIZE)
            .to_image();

    let size = CLIP_INPUT_SIZE as usize;
    let mut tensor = vec![0.0f32; 3 * size * size];
    for (y, row) in cropped.rows().enumerate() {
        for (x, pixel) in row.enumerate() {
            for channel in 0..3 {
                let value = pixel.0[channel] as f32 / 255.0;
                tensor[channel * size * size + y * size + x] =
                    (value - CLIP_MEAN[channel]) / CLIP_STD[channel];
            }
        }
    }

    tensor
}
