//! Image normalisation before generation.
//!
//! Every source image is decoded, turned upright according to its EXIF
//! orientation, flattened onto white when it carries alpha, converted to
//! 8-bit RGB and re-encoded as PNG. Scans straight off a phone often carry
//! rotation only in metadata, which the re-encode would otherwise drop.

use std::io::Cursor;

use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader, Rgb, RgbImage};

use crate::error::PipelineError;

pub const NORMALIZED_MIME_TYPE: &str = "image/png";

/// Decode `bytes`, apply EXIF orientation, drop transparency and return
/// PNG-encoded RGB8.
pub fn normalize(bytes: &[u8]) -> Result<Vec<u8>, PipelineError> {
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_decoder()?;
    // Unreadable metadata is not worth failing the photo over.
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let decoded = upright(DynamicImage::from_decoder(decoder)?, orientation);
    let rgb = to_rgb(decoded);

    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(rgb).write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

fn upright(mut image: DynamicImage, orientation: Orientation) -> DynamicImage {
    if orientation != Orientation::NoTransforms {
        tracing::debug!(?orientation, "Applying EXIF orientation");
        image.apply_orientation(orientation);
    }
    image
}

fn to_rgb(image: DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba = image.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        rgb.put_pixel(x, y, Rgb([over_white(r, a), over_white(g, a), over_white(b, a)]));
    }
    rgb
}

/// Composite one channel with coverage `alpha` over a white background.
fn over_white(channel: u8, alpha: u8) -> u8 {
    let c = u32::from(channel);
    let a = u32::from(alpha);
    ((c * a + 255 * (255 - a) + 127) / 255) as u8
}
