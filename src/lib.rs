pub mod cli;
pub mod geometry;
pub mod markup;
pub mod postprocess;
pub mod rescale;
pub mod segmap;

pub use cli::Cli;
pub use geometry::{fix_quadrangle, proper_round};
pub use markup::{NetConfig, ObjectMarkup};
pub use postprocess::{contours_and_boxes, postprocess, softmax_channels};
pub use rescale::{rescale_dimensions, rescale_image_and_markup, Augmenter};
pub use segmap::{build_segmentation_map, prepare_image_and_target};
