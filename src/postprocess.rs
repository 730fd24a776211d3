use anyhow::{ensure, Result};
use geo::{Area, LineString, Polygon};
use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::drawing::draw_polygon_mut;
use imageproc::geometry::min_area_rect;
use imageproc::point::Point;
use ndarray::{Array3, Axis};

use crate::markup::ObjectMarkup;
use crate::segmap::polygon_points;

/// Extract external contours of foreground regions and their minimum-area
/// oriented boxes.
///
/// Contour chains are compressed to their turning points. Regions with
/// enclosed area of at most `min_area` are dropped as noise. The returned
/// contours and boxes (4 corners, 8 flat coordinates) are index-aligned.
pub fn contours_and_boxes(
    seg_map: &GrayImage,
    min_area: f64,
) -> (Vec<Vec<Point<i32>>>, Vec<[f64; 8]>) {
    let mut contours = Vec::new();
    let mut boxes = Vec::new();

    for contour in find_contours::<i32>(seg_map) {
        if contour.border_type != BorderType::Outer || contour.parent.is_some() {
            continue;
        }
        let points = simplify_chain(&contour.points);
        if points.len() < 3 || contour_area(&points) <= min_area {
            continue;
        }

        let corners = min_area_rect(&points);
        let mut bbox = [0.0f64; 8];
        for (i, corner) in corners.iter().enumerate() {
            bbox[2 * i] = corner.x as f64;
            bbox[2 * i + 1] = corner.y as f64;
        }
        contours.push(points);
        boxes.push(bbox);
    }
    (contours, boxes)
}

/// Decode a segmentation map back into markup.
///
/// `scale` is the ratio of original image resolution to map resolution;
/// recovered boxes are scaled back up by it and rounded to nearest. Without
/// a class-logit map every box becomes plain markup. With one (shape
/// `(h, w, classes)`, aligned with the map), the class of each region is the
/// argmax of the mean per-class probability over the region's filled
/// interior, a majority vote rather than a single sample point.
pub fn postprocess(
    seg_map: &GrayImage,
    class_logits: Option<&Array3<f32>>,
    scale: u32,
    min_area_threshold: f64,
) -> Result<Vec<ObjectMarkup>> {
    let (contours, boxes) = contours_and_boxes(seg_map, min_area_threshold);
    let boxes: Vec<Vec<f64>> = boxes
        .iter()
        .map(|bbox| bbox.iter().map(|&v| (v * scale as f64).round()).collect())
        .collect();

    let Some(logits) = class_logits else {
        return Ok(boxes.into_iter().map(ObjectMarkup::Plain).collect());
    };

    let (height, width) = (seg_map.height(), seg_map.width());
    let (logits_h, logits_w, _) = logits.dim();
    ensure!(
        logits_h == height as usize && logits_w == width as usize,
        "class-logit map {}x{} does not match segmentation map {}x{}",
        logits_w,
        logits_h,
        width,
        height
    );

    let probs = softmax_channels(logits);
    let markup = contours
        .iter()
        .zip(boxes)
        .map(|(contour, bbox)| {
            let mask = contour_mask(width, height, contour);
            ObjectMarkup::Classified(bbox, vote_class(&probs, &mask))
        })
        .collect();
    Ok(markup)
}

/// Numerically stable per-pixel softmax over the channel axis.
///
/// The per-pixel maximum is subtracted before exponentiating, which guards
/// against overflow and makes the result invariant to adding a constant to
/// all scores at a pixel.
pub fn softmax_channels(logits: &Array3<f32>) -> Array3<f32> {
    let mut probs = logits.clone();
    for mut lane in probs.lanes_mut(Axis(2)) {
        let max = lane.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
        lane.mapv_inplace(|v| (v - max).exp());
        let sum = lane.sum();
        lane.mapv_inplace(|v| v / sum);
    }
    probs
}

/// Enclosed area of a pixel contour (shoelace over pixel centers).
fn contour_area(points: &[Point<i32>]) -> f64 {
    let ring: Vec<(f64, f64)> = points.iter().map(|p| (p.x as f64, p.y as f64)).collect();
    Polygon::new(LineString::from(ring), vec![]).unsigned_area()
}

/// Compress an 8-connected boundary chain to its turning points.
fn simplify_chain(points: &[Point<i32>]) -> Vec<Point<i32>> {
    if points.len() <= 2 {
        return points.to_vec();
    }

    let n = points.len();
    let mut simplified = Vec::with_capacity(n);
    for i in 0..n {
        let prev = points[(i + n - 1) % n];
        let curr = points[i];
        let next = points[(i + 1) % n];

        let dir_prev = ((curr.x - prev.x).signum(), (curr.y - prev.y).signum());
        let dir_next = ((next.x - curr.x).signum(), (next.y - curr.y).signum());
        if dir_prev != dir_next {
            simplified.push(curr);
        }
    }

    if simplified.len() < 3 {
        points.to_vec()
    } else {
        simplified
    }
}

/// Boolean mask of a contour's filled interior.
fn contour_mask(width: u32, height: u32, contour: &[Point<i32>]) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    let coords: Vec<i32> = contour.iter().flat_map(|p| [p.x, p.y]).collect();
    let points = polygon_points(&coords);
    if !points.is_empty() {
        draw_polygon_mut(&mut mask, &points, Luma([1]));
    }
    mask
}

/// Majority vote: class with the highest mean probability over the mask.
fn vote_class(probs: &Array3<f32>, mask: &GrayImage) -> u32 {
    let classes = probs.dim().2;
    let mut sums = vec![0.0f64; classes];
    for (x, y, pixel) in mask.enumerate_pixels() {
        if pixel[0] == 0 {
            continue;
        }
        for (class_id, sum) in sums.iter_mut().enumerate() {
            *sum += probs[(y as usize, x as usize, class_id)] as f64;
        }
    }

    sums.iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(class_id, _)| class_id as u32)
        .unwrap_or(0)
}
