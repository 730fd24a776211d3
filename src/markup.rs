use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

/// Extensions probed when looking up the image a markup record belongs to.
const IMAGE_EXTENSIONS: [&str; 5] = ["png", "tiff", "tif", "bmp", "jpg"];

/// An oriented polygon marking one object in an image.
///
/// Coordinates are stored flat as `[x1, y1, x2, y2, ...]`; quadrilaterals
/// have 8 values, polygons recovered from contours may have more. A
/// classified object additionally carries a 0-based class id.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectMarkup {
    Plain(Vec<f64>),
    Classified(Vec<f64>, u32),
}

impl ObjectMarkup {
    /// Flat coordinate sequence of the polygon.
    pub fn bbox(&self) -> &[f64] {
        match self {
            ObjectMarkup::Plain(bbox) => bbox,
            ObjectMarkup::Classified(bbox, _) => bbox,
        }
    }

    /// Class id, if this object is classified.
    pub fn object_type(&self) -> Option<u32> {
        match self {
            ObjectMarkup::Plain(_) => None,
            ObjectMarkup::Classified(_, class_id) => Some(*class_id),
        }
    }

    /// Copy-with-replacement: a new markup of the same variant with the
    /// coordinates replaced and the class id preserved.
    pub fn with_bbox(&self, bbox: Vec<f64>) -> Self {
        match self {
            ObjectMarkup::Plain(_) => ObjectMarkup::Plain(bbox),
            ObjectMarkup::Classified(_, class_id) => ObjectMarkup::Classified(bbox, *class_id),
        }
    }
}

/// Contract of the network configuration this core prepares data for.
pub trait NetConfig {
    /// Ratio of input resolution to segmentation-map resolution.
    fn scale(&self) -> u32;
    /// Required divisor of valid image dimensions.
    fn side_multiple(&self) -> u32;
    /// Size cap for the longer image side.
    fn max_side(&self) -> u32;
    /// Whether the network predicts per-object classes.
    fn classification_supported(&self) -> bool;
    /// Human-readable name of a class id.
    fn class_name(&self, class_id: u32) -> String;
}

/// A [`NetConfig`] with fixed values, for tools and tests that are not
/// backed by a real network configuration.
#[derive(Debug, Clone)]
pub struct StaticNetConfig {
    pub scale: u32,
    pub side_multiple: u32,
    pub max_side: u32,
    pub class_names: Option<Vec<String>>,
}

impl NetConfig for StaticNetConfig {
    fn scale(&self) -> u32 {
        self.scale
    }

    fn side_multiple(&self) -> u32 {
        self.side_multiple
    }

    fn max_side(&self) -> u32 {
        self.max_side
    }

    fn classification_supported(&self) -> bool {
        self.class_names.is_some()
    }

    fn class_name(&self, class_id: u32) -> String {
        self.class_names
            .as_ref()
            .and_then(|names| names.get(class_id as usize).cloned())
            .unwrap_or_else(|| format!("class_{class_id}"))
    }
}

/// How object types are reported by [`extract_bboxes_and_object_types`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectTypesFormat {
    Id,
    Name,
}

/// Object types extracted from a markup collection.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectTypes {
    Ids(Vec<u32>),
    Names(Vec<String>),
}

/// Split markup into its polygons and object types.
///
/// Returns `None` for the types when the network does not support
/// classification. Fails if a plain markup object is encountered while
/// classification is supported.
pub fn extract_bboxes_and_object_types(
    markup: &[ObjectMarkup],
    config: &dyn NetConfig,
    format: ObjectTypesFormat,
) -> Result<(Vec<Vec<f64>>, Option<ObjectTypes>)> {
    let bboxes = markup.iter().map(|m| m.bbox().to_vec()).collect();
    if !config.classification_supported() {
        return Ok((bboxes, None));
    }

    let mut class_ids = Vec::with_capacity(markup.len());
    for m in markup {
        match m.object_type() {
            Some(class_id) => class_ids.push(class_id),
            None => bail!("markup object has no class id but classification is supported"),
        }
    }

    let object_types = match format {
        ObjectTypesFormat::Id => ObjectTypes::Ids(class_ids),
        ObjectTypesFormat::Name => {
            ObjectTypes::Names(class_ids.iter().map(|&id| config.class_name(id)).collect())
        }
    };
    Ok((bboxes, Some(object_types)))
}

/// Find the image file a markup record with the given stem belongs to.
///
/// Fails for that single record when no candidate exists; the caller decides
/// whether to skip it or abort.
pub fn find_corresponding_image(images_dir: &Path, stem: &str) -> Result<PathBuf> {
    for ext in IMAGE_EXTENSIONS {
        let candidate = images_dir.join(format!("{stem}.{ext}"));
        if candidate.exists() {
            return Ok(candidate);
        }
    }
    bail!(
        "image corresponding to {:?} not found in {:?}",
        stem,
        images_dir
    );
}
