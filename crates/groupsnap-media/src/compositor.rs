//! Template-driven collage compositing.
//!
//! Sources are paired with frames by position: the Nth source fills the Nth
//! frame. Each source is decoded, scaled to its frame with nearest-neighbour
//! sampling and copied onto the canvas without blending, so later frames
//! occlude earlier ones where they overlap. A source that fails to decode
//! leaves its frame blank; the other frames are still drawn.

use std::io::Cursor;

use groupsnap_shared::template::Template;
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, DynamicImage, RgbaImage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("Template {template} expects {expected} photos, got {actual}")]
    CountMismatch {
        template: String,
        expected: u32,
        actual: usize,
    },

    #[error("Image encoding error: {0}")]
    Encode(#[from] image::ImageError),
}

/// Render `sources` (encoded PNG/JPEG bytes) onto a transparent canvas of
/// the template's size.
pub fn compose<S: AsRef<[u8]>>(template: &Template, sources: &[S]) -> Result<RgbaImage, ComposeError> {
    if sources.len() != template.photo_count as usize {
        return Err(ComposeError::CountMismatch {
            template: template.id.clone(),
            expected: template.photo_count,
            actual: sources.len(),
        });
    }

    let mut canvas = RgbaImage::new(template.width, template.height);

    for (index, (frame, source)) in template.frames.iter().zip(sources).enumerate() {
        let decoded = match image::load_from_memory(source.as_ref()) {
            Ok(img) => img.to_rgba8(),
            Err(e) => {
                tracing::warn!(template = %template.id, frame = index, "Skipping undecodable photo: {}", e);
                continue;
            }
        };

        let width = if frame.width == 0 { decoded.width() } else { frame.width };
        let height = if frame.height == 0 { decoded.height() } else { frame.height };
        let placed = resize_nearest(&decoded, width, height);

        imageops::replace(&mut canvas, &placed, i64::from(frame.x), i64::from(frame.y));
    }

    Ok(canvas)
}

/// Scale with nearest-neighbour sampling: destination (x, y) takes source
/// pixel (x * srcW / dstW, y * srcH / dstH).
pub fn resize_nearest(src: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let (src_w, src_h) = src.dimensions();
    if src_w == 0 || src_h == 0 || width == 0 || height == 0 {
        return RgbaImage::new(width, height);
    }
    if (src_w, src_h) == (width, height) {
        return src.clone();
    }

    RgbaImage::from_fn(width, height, |x, y| {
        let sx = (u64::from(x) * u64::from(src_w) / u64::from(width)) as u32;
        let sy = (u64::from(y) * u64::from(src_h) / u64::from(height)) as u32;
        *src.get_pixel(sx, sy)
    })
}

/// Flatten to RGB and encode as JPEG.
pub fn encode_jpeg(image: &RgbaImage, quality: u8) -> Result<Vec<u8>, ComposeError> {
    let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    let mut out = Cursor::new(Vec::new());
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    encoder.encode_image(&rgb)?;
    Ok(out.into_inner())
}
