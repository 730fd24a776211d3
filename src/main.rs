use std::fs;

use anyhow::{Context, Result};
use clap::Parser;
use image::ImageReader;

use segmap::cli::{default_map_path, Command, MarkupRecord};
use segmap::markup::StaticNetConfig;
use segmap::{build_segmentation_map, postprocess, rescale_image_and_markup, Cli, ObjectMarkup};

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Build {
            image,
            markup,
            output,
            scale,
            side_multiple,
            max_side,
            drawing,
        } => {
            let img = ImageReader::open(&image)
                .with_context(|| format!("Failed to open input file: {:?}", image))?
                .decode()
                .with_context(|| format!("Failed to decode image: {:?}", image))?;

            let records: Vec<MarkupRecord> = serde_json::from_str(
                &fs::read_to_string(&markup)
                    .with_context(|| format!("Failed to read markup: {:?}", markup))?,
            )
            .with_context(|| format!("Failed to parse markup: {:?}", markup))?;
            let markup: Vec<ObjectMarkup> = records.into_iter().map(Into::into).collect();

            let config = StaticNetConfig {
                scale,
                side_multiple,
                max_side,
                class_names: None,
            };
            let (rescaled, rescaled_markup) =
                rescale_image_and_markup(&img, &markup, &config, None);
            let seg_map = build_segmentation_map(
                rescaled.width(),
                rescaled.height(),
                &rescaled_markup,
                scale,
                drawing,
            )?;

            let output = output.unwrap_or_else(|| default_map_path(&image));
            seg_map
                .save(&output)
                .with_context(|| format!("Failed to save output: {:?}", output))?;
            eprintln!(
                "Built {}x{} map from {} objects: {:?}",
                seg_map.width(),
                seg_map.height(),
                rescaled_markup.len(),
                output
            );
        }

        Command::Decode {
            map,
            scale,
            min_area,
        } => {
            let seg_map = ImageReader::open(&map)
                .with_context(|| format!("Failed to open map file: {:?}", map))?
                .decode()
                .with_context(|| format!("Failed to decode map: {:?}", map))?
                .into_luma8();

            let markup = postprocess(&seg_map, None, scale, min_area)?;
            let records: Vec<MarkupRecord> = markup.iter().map(Into::into).collect();
            println!("{}", serde_json::to_string_pretty(&records)?);
            eprintln!("Decoded {} objects from {:?}", records.len(), map);
        }
    }

    Ok(())
}
