use anyhow::Result;
use image::{imageops::FilterType, DynamicImage};

use crate::markup::{NetConfig, ObjectMarkup};

/// External augmentation collaborator.
///
/// The input pair is already rescaled to network dimensions; implementations
/// must return markup of the unchanged schema.
pub trait Augmenter {
    fn augment(
        &self,
        image: DynamicImage,
        markup: Vec<ObjectMarkup>,
        config: &dyn NetConfig,
    ) -> Result<(DynamicImage, Vec<ObjectMarkup>)>;
}

/// Fit image dimensions to the network constraints.
///
/// The result satisfies `W % m == 0`, `H % m == 0`, `W, H >= m` and, as long
/// as `max_side` is itself a multiple of `m` (the model contract),
/// `max(W, H) <= max_side`. Aspect ratio is preserved as closely as the
/// quantization allows.
pub fn rescale_dimensions(width: u32, height: u32, side_multiple: u32, max_side: u32) -> (u32, u32) {
    let quantize =
        |side: f64| ((side / side_multiple as f64).round().max(1.0) as u32) * side_multiple;

    if width.max(height) > max_side {
        // The longer side gets the cap, the shorter side follows proportionally
        let downscale = max_side as f64 / width.max(height) as f64;
        if width > height {
            (max_side, quantize(height as f64 * downscale))
        } else {
            (quantize(width as f64 * downscale), max_side)
        }
    } else {
        (quantize(width as f64), quantize(height as f64))
    }
}

/// Rescale an image and its markup to the dimensions the network accepts.
///
/// `max_side` overrides the configured cap when given. Markup coordinates
/// are scaled by independent per-axis ratios; an empty collection passes
/// through unchanged.
pub fn rescale_image_and_markup(
    image: &DynamicImage,
    markup: &[ObjectMarkup],
    config: &dyn NetConfig,
    max_side: Option<u32>,
) -> (DynamicImage, Vec<ObjectMarkup>) {
    let (width, height) = (image.width(), image.height());
    let max_side = max_side.unwrap_or_else(|| config.max_side());
    let (new_width, new_height) =
        rescale_dimensions(width, height, config.side_multiple(), max_side);

    let resized = image.resize_exact(new_width, new_height, FilterType::CatmullRom);
    if markup.is_empty() {
        return (resized, Vec::new());
    }

    let x_scale = new_width as f64 / width as f64;
    let y_scale = new_height as f64 / height as f64;
    let rescaled = markup
        .iter()
        .map(|m| {
            let bbox = m
                .bbox()
                .iter()
                .enumerate()
                .map(|(i, &v)| if i % 2 == 0 { v * x_scale } else { v * y_scale })
                .collect();
            m.with_bbox(bbox)
        })
        .collect();
    (resized, rescaled)
}
