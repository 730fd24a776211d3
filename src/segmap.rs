use anyhow::{ensure, Context, Result};
use image::{DynamicImage, GrayImage, Luma};
use imageproc::drawing::{draw_line_segment_mut, draw_polygon_mut};
use imageproc::point::Point;

use crate::geometry::proper_round;
use crate::markup::{NetConfig, ObjectMarkup};
use crate::rescale::{rescale_image_and_markup, Augmenter};

/// Fill value marking objects when a map is built for visualization.
const DRAWING_FILL: u8 = 255;

/// Rasterize markup into a single-channel segmentation map.
///
/// The map has dimensions `(width / scale, height / scale)`; both dimensions
/// must be divisible by `scale` exactly. Background is 0. Each object is
/// filled with 255 in drawing mode, otherwise with `class_id + 1` for
/// classified markup (class ids are 0-based) or 1 for plain markup.
///
/// Objects are drawn in input order and later objects overwrite overlapping
/// pixels of earlier ones; input order is the only priority.
pub fn build_segmentation_map(
    width: u32,
    height: u32,
    markup: &[ObjectMarkup],
    scale: u32,
    for_drawing: bool,
) -> Result<GrayImage> {
    ensure!(
        scale > 0 && width % scale == 0 && height % scale == 0,
        "image dimensions {}x{} are not divisible by scale {}",
        width,
        height,
        scale
    );

    let mut seg_map = GrayImage::new(width / scale, height / scale);
    for object_markup in markup {
        let fill = if for_drawing {
            DRAWING_FILL
        } else {
            match object_markup.object_type() {
                Some(class_id) => {
                    // Fill value is class_id + 1, which must fit in a u8
                    ensure!(
                        class_id < 255,
                        "no more than 255 classes are supported, got class id {}",
                        class_id
                    );
                    (class_id + 1) as u8
                }
                None => 1,
            }
        };

        let scaled: Vec<f64> = object_markup
            .bbox()
            .iter()
            .map(|&v| v / scale as f64)
            .collect();
        let points = polygon_points(&proper_round(&scaled));
        // Tiny objects can collapse to a single pixel or a line under heavy
        // downscaling; they are still drawn, not rejected
        match points[..] {
            [] => continue,
            [point] => {
                if point.x >= 0
                    && point.y >= 0
                    && (point.x as u32) < seg_map.width()
                    && (point.y as u32) < seg_map.height()
                {
                    seg_map.put_pixel(point.x as u32, point.y as u32, Luma([fill]));
                }
            }
            [start, end] => draw_line_segment_mut(
                &mut seg_map,
                (start.x as f32, start.y as f32),
                (end.x as f32, end.y as f32),
                Luma([fill]),
            ),
            _ => draw_polygon_mut(&mut seg_map, &points, Luma([fill])),
        }
    }
    Ok(seg_map)
}

/// Prepare one training sample: rescale the image and markup to network
/// dimensions, optionally augment, and build the target segmentation map.
///
/// The augmenter runs on an already rescaled pair; its output is rescaled
/// again before the map is built, so augmentations that change dimensions
/// stay within the network constraints.
pub fn prepare_image_and_target(
    image: &DynamicImage,
    markup: &[ObjectMarkup],
    config: &dyn NetConfig,
    augmenter: Option<&dyn Augmenter>,
) -> Result<(DynamicImage, Vec<ObjectMarkup>, GrayImage)> {
    let (image, markup) = match augmenter {
        Some(augmenter) => {
            let (rescaled, rescaled_markup) = rescale_image_and_markup(image, markup, config, None);
            augmenter
                .augment(rescaled, rescaled_markup, config)
                .context("augmentation failed")?
        }
        None => (image.clone(), markup.to_vec()),
    };

    let (rescaled_image, rescaled_markup) = rescale_image_and_markup(&image, &markup, config, None);
    let seg_map = build_segmentation_map(
        rescaled_image.width(),
        rescaled_image.height(),
        &rescaled_markup,
        config.scale(),
        false,
    )?;
    Ok((rescaled_image, rescaled_markup, seg_map))
}

/// Integer polygon coordinates as drawable points: consecutive duplicates
/// collapsed and a closing point equal to the first removed.
pub(crate) fn polygon_points(coords: &[i32]) -> Vec<Point<i32>> {
    let mut points: Vec<Point<i32>> = coords
        .chunks_exact(2)
        .map(|c| Point::new(c[0], c[1]))
        .collect();
    points.dedup();
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::StaticNetConfig;

    fn quad(x1: f64, y1: f64, x2: f64, y2: f64) -> Vec<f64> {
        vec![x1, y1, x2, y1, x2, y2, x1, y2]
    }

    #[test]
    fn test_build_map_classified_quad() {
        let markup = vec![ObjectMarkup::Classified(quad(10.0, 10.0, 50.0, 50.0), 2)];
        let seg_map = build_segmentation_map(200, 200, &markup, 4, false).unwrap();

        assert_eq!(seg_map.dimensions(), (50, 50));
        // 10/4 = 2.5 floors, 50/4 = 12.5 ceils
        assert_eq!(seg_map.get_pixel(2, 2)[0], 3);
        assert_eq!(seg_map.get_pixel(7, 7)[0], 3);
        assert_eq!(seg_map.get_pixel(13, 13)[0], 3);
        assert_eq!(seg_map.get_pixel(14, 14)[0], 0);
        assert_eq!(seg_map.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_build_map_plain_markup_fills_one() {
        let markup = vec![ObjectMarkup::Plain(quad(8.0, 8.0, 16.0, 16.0))];
        let seg_map = build_segmentation_map(40, 40, &markup, 4, false).unwrap();
        assert_eq!(seg_map.get_pixel(3, 3)[0], 1);
    }

    #[test]
    fn test_build_map_drawing_mode() {
        let markup = vec![ObjectMarkup::Classified(quad(8.0, 8.0, 16.0, 16.0), 2)];
        let seg_map = build_segmentation_map(40, 40, &markup, 4, true).unwrap();
        assert_eq!(seg_map.get_pixel(3, 3)[0], 255);
    }

    #[test]
    fn test_build_map_rejects_indivisible_dimensions() {
        let markup = vec![ObjectMarkup::Plain(quad(0.0, 0.0, 8.0, 8.0))];
        assert!(build_segmentation_map(201, 200, &markup, 4, false).is_err());
        assert!(build_segmentation_map(200, 201, &markup, 4, false).is_err());
    }

    #[test]
    fn test_build_map_rejects_class_id_overflow() {
        let markup = vec![ObjectMarkup::Classified(quad(0.0, 0.0, 8.0, 8.0), 255)];
        assert!(build_segmentation_map(40, 40, &markup, 4, false).is_err());
        // The guard must also fire for ids whose + 1 wraps around
        let markup = vec![ObjectMarkup::Classified(quad(0.0, 0.0, 8.0, 8.0), u32::MAX)];
        assert!(build_segmentation_map(40, 40, &markup, 4, false).is_err());
    }

    #[test]
    fn test_build_map_quad_collapsed_to_single_pixel() {
        // All vertices land on the same map pixel after downscaling
        let markup = vec![ObjectMarkup::Plain(vec![8.0; 8])];
        let seg_map = build_segmentation_map(40, 40, &markup, 4, false).unwrap();

        assert_eq!(seg_map.get_pixel(2, 2)[0], 1);
        assert_eq!(seg_map.pixels().filter(|p| p[0] > 0).count(), 1);
    }

    #[test]
    fn test_build_map_quad_collapsed_to_line() {
        // Zero-width quad becomes a vertical line on the map
        let markup = vec![ObjectMarkup::Classified(
            vec![8.0, 8.0, 8.0, 8.0, 8.0, 24.0, 8.0, 24.0],
            2,
        )];
        let seg_map = build_segmentation_map(40, 40, &markup, 4, false).unwrap();

        for y in 2..=6 {
            assert_eq!(seg_map.get_pixel(2, y)[0], 3);
        }
        assert_eq!(seg_map.get_pixel(3, 4)[0], 0);
    }

    #[test]
    fn test_build_map_later_objects_overwrite() {
        let markup = vec![
            ObjectMarkup::Classified(quad(0.0, 0.0, 20.0, 20.0), 1),
            ObjectMarkup::Classified(quad(8.0, 8.0, 28.0, 28.0), 4),
        ];
        let seg_map = build_segmentation_map(40, 40, &markup, 4, false).unwrap();

        // Overlap belongs to the object drawn last
        assert_eq!(seg_map.get_pixel(3, 3)[0], 5);
        assert_eq!(seg_map.get_pixel(1, 1)[0], 2);
    }

    #[test]
    fn test_build_map_empty_markup() {
        let seg_map = build_segmentation_map(40, 40, &[], 4, false).unwrap();
        assert!(seg_map.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn test_prepare_image_and_target() {
        let config = StaticNetConfig {
            scale: 2,
            side_multiple: 10,
            max_side: 1000,
            class_names: None,
        };
        let image = DynamicImage::new_rgb8(100, 60);
        let markup = vec![ObjectMarkup::Classified(quad(10.0, 10.0, 30.0, 30.0), 0)];

        let (rescaled_image, rescaled_markup, seg_map) =
            prepare_image_and_target(&image, &markup, &config, None).unwrap();
        assert_eq!((rescaled_image.width(), rescaled_image.height()), (100, 60));
        assert_eq!(rescaled_markup, markup);
        assert_eq!(seg_map.dimensions(), (50, 30));
        assert_eq!(seg_map.get_pixel(10, 10)[0], 1);
    }

    #[test]
    fn test_prepare_image_and_target_with_augmenter() {
        struct Identity;
        impl Augmenter for Identity {
            fn augment(
                &self,
                image: DynamicImage,
                markup: Vec<ObjectMarkup>,
                _config: &dyn NetConfig,
            ) -> Result<(DynamicImage, Vec<ObjectMarkup>)> {
                Ok((image, markup))
            }
        }

        let config = StaticNetConfig {
            scale: 2,
            side_multiple: 10,
            max_side: 1000,
            class_names: None,
        };
        let image = DynamicImage::new_rgb8(100, 60);
        let markup = vec![ObjectMarkup::Plain(quad(10.0, 10.0, 30.0, 30.0))];

        let (rescaled_image, rescaled_markup, seg_map) =
            prepare_image_and_target(&image, &markup, &config, Some(&Identity)).unwrap();
        assert_eq!((rescaled_image.width(), rescaled_image.height()), (100, 60));
        assert_eq!(rescaled_markup, markup);
        assert_eq!(seg_map.dimensions(), (50, 30));
    }

    #[test]
    fn test_polygon_points_drops_closing_duplicate() {
        let points = polygon_points(&[0, 0, 4, 0, 4, 4, 0, 4, 0, 0]);
        assert_eq!(points.len(), 4);
        let collapsed = polygon_points(&[1, 1, 1, 1, 1, 1]);
        assert_eq!(collapsed.len(), 1);
    }
}
