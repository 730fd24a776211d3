use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::markup::ObjectMarkup;

#[derive(Parser, Debug)]
#[command(name = "segmap")]
#[command(
    version,
    about = "Build per-pixel segmentation maps from oriented markup and decode maps back into boxes"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rescale an image with its markup and rasterize the segmentation map
    Build {
        /// Input image path
        image: PathBuf,

        /// Markup JSON path: a list of {"bbox": [x1, y1, ...], "object_type": id?}
        markup: PathBuf,

        /// Output map path [default: <image>_segmap.png]
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Ratio of image resolution to map resolution
        #[arg(long, default_value = "4")]
        scale: u32,

        /// Required divisor of the rescaled image sides
        #[arg(long, default_value = "32")]
        side_multiple: u32,

        /// Cap for the longer rescaled image side
        #[arg(long, default_value = "1024")]
        max_side: u32,

        /// Fill objects with 255 for visualization instead of class values
        #[arg(long)]
        drawing: bool,
    },

    /// Decode a segmentation map back into oriented boxes (JSON on stdout)
    Decode {
        /// Segmentation map path (single-channel image)
        map: PathBuf,

        /// Ratio of original image resolution to map resolution
        #[arg(long, default_value = "4")]
        scale: u32,

        /// Regions with enclosed area up to this many pixels are noise
        #[arg(long, default_value = "5")]
        min_area: f64,
    },
}

/// JSON form of one markup object.
#[derive(Debug, Serialize, Deserialize)]
pub struct MarkupRecord {
    pub bbox: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<u32>,
}

impl From<MarkupRecord> for ObjectMarkup {
    fn from(record: MarkupRecord) -> Self {
        match record.object_type {
            Some(class_id) => ObjectMarkup::Classified(record.bbox, class_id),
            None => ObjectMarkup::Plain(record.bbox),
        }
    }
}

impl From<&ObjectMarkup> for MarkupRecord {
    fn from(markup: &ObjectMarkup) -> Self {
        MarkupRecord {
            bbox: markup.bbox().to_vec(),
            object_type: markup.object_type(),
        }
    }
}

pub fn default_map_path(image: &Path) -> PathBuf {
    let stem = image.file_stem().unwrap_or_default().to_string_lossy();
    let parent = image.parent().unwrap_or(Path::new("."));
    parent.join(format!("{}_segmap.png", stem))
}
