use geo::{ConvexHull, LineString, MultiPoint, Polygon, Validation};

/// Repair a degenerate or self-intersecting quadrilateral.
///
/// A valid simple quadrilateral is returned unchanged. Anything else is
/// replaced by the first four exterior vertices of the convex hull of the
/// input points.
pub fn fix_quadrangle(quad: [(f64, f64); 4]) -> [(f64, f64); 4] {
    let poly = Polygon::new(LineString::from(quad.to_vec()), vec![]);
    if poly.is_valid() {
        return quad;
    }

    tracing::info!("invalid quadrilateral, replacing with convex hull");
    let points: Vec<geo::Point<f64>> = quad.iter().map(|&(x, y)| geo::Point::new(x, y)).collect();
    let hull = MultiPoint::from(points).convex_hull();
    let hull_coords: Vec<(f64, f64)> = hull.exterior().coords().map(|c| (c.x, c.y)).collect();

    let mut fixed = [(0.0, 0.0); 4];
    for (i, corner) in fixed.iter_mut().enumerate() {
        *corner = hull_coords[i.min(hull_coords.len() - 1)];
    }
    fixed
}

/// Round sub-pixel markup vertices to integers without losing object area.
///
/// For a quadrilateral (8 flat coordinates) each axis is handled
/// independently: a coordinate with at least two of the other three strictly
/// greater sits on the low side of the object, so rounding it up would clip
/// true extent - it rounds down. Otherwise it rounds up. The
/// 1-greater/1-less/1-equal split also rounds up; that bias is kept as-is
/// for output compatibility.
///
/// General polygons (any other length, e.g. contours from a segmentation
/// map) just round to nearest.
pub fn proper_round(bbox: &[f64]) -> Vec<i32> {
    if bbox.len() != 8 {
        return bbox.iter().map(|&v| v.round() as i32).collect();
    }

    let xs: Vec<f64> = bbox.iter().step_by(2).copied().collect();
    let ys: Vec<f64> = bbox.iter().skip(1).step_by(2).copied().collect();

    let round_axis = |values: &[f64]| -> Vec<i32> {
        values
            .iter()
            .map(|&v| {
                let n_greater = values.iter().filter(|&&other| other > v).count();
                if n_greater > 1 {
                    v.floor() as i32
                } else {
                    v.ceil() as i32
                }
            })
            .collect()
    };

    let xs = round_axis(&xs);
    let ys = round_axis(&ys);
    xs.iter().zip(&ys).flat_map(|(&x, &y)| [x, y]).collect()
}

/// Lengths of the sides of a polygon given by its vertices.
pub fn polygon_side_lengths(poly: &[(f64, f64)]) -> Vec<f64> {
    (0..poly.len())
        .map(|i| {
            let (x1, y1) = poly[i];
            let (x2, y2) = poly[(i + 1) % poly.len()];
            (x2 - x1).hypot(y2 - y1)
        })
        .collect()
}

/// True if all sides of the quadrilateral are equal within a relative
/// tolerance.
pub fn is_quad_square(quad: &[(f64, f64)], threshold: f64) -> bool {
    let lengths = polygon_side_lengths(quad);
    let max = lengths.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min = lengths.iter().cloned().fold(f64::INFINITY, f64::min);
    (max - min) / max < threshold
}
