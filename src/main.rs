use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rootcause::prelude::*;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use mtlbake::export::pass::ExportPass;
use mtlbake::export::{ExportOptions, OutputFormat};
use mtlbake::host::bitmap::FsBitmaps;
use mtlbake::host::{RecordingInstaller, SceneDump};
use mtlbake::material::classify::MaterialClassifier;

/// Bake host material dumps into glTF PBR materials
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable verbose output (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export every material of a scene dump to a .gltf or .glb file
    Export {
        /// JSON scene dump
        dump: PathBuf,

        /// Output file. The extension selects .gltf or .glb.
        #[clap(short, long, default_value = "materials.glb")]
        output: PathBuf,

        /// Only export factors, no texture maps
        #[clap(long)]
        no_textures: bool,

        /// Keep occlusion in its own texture
        #[clap(long)]
        no_merge_occlusion: bool,

        /// Don't emit KHR_texture_transform
        #[clap(long)]
        no_texture_transform: bool,

        /// JPEG quality. Below 100 every image is re-encoded.
        #[clap(short, long, default_value_t = 100)]
        quality: u8,

        /// Reuse base color + alpha merges for opaque uses of the same base
        /// color file
        #[clap(long)]
        fold_paired_images: bool,

        /// Folder for external images, relative to the output file
        #[clap(long, default_value = "")]
        texture_folder: PathBuf,
    },
    /// List the materials of a scene dump that can't be exported
    Check {
        /// JSON scene dump
        dump: PathBuf,
    },
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity >= 2)
        .init();
}

fn main() -> Result<(), Report> {
    let args = Args::parse();
    setup_logging(args.verbose);

    match args.command {
        Command::Export {
            dump,
            output,
            no_textures,
            no_merge_occlusion,
            no_texture_transform,
            quality,
            fold_paired_images,
            texture_folder,
        } => {
            let scene = SceneDump::load(&dump).context("Failed to load scene dump")?;
            let output_dir = output
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."));

            let options = ExportOptions::builder()
                .output_format(OutputFormat::for_path(&output))
                .export_textures(!no_textures)
                .merge_occlusion(!no_merge_occlusion)
                .texture_transform(!no_texture_transform)
                .quality(quality)
                .fold_paired_images(fold_paired_images)
                .texture_folder(texture_folder)
                .output_dir(output_dir)
                .build();

            let bitmaps = FsBitmaps;
            let mut installer = RecordingInstaller::default();
            let mut pass = ExportPass::new(&options, &bitmaps, &mut installer);

            let bar = ProgressBar::new(100);
            bar.set_style(
                ProgressStyle::with_template("{bar:40} {pos}% {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            let cancel = AtomicBool::new(false);
            pass.export_materials(&scene.materials, &cancel, |fraction| {
                bar.set_position((fraction * 100.0).round() as u64);
            })
            .context("Failed to export materials")?;
            bar.finish_and_clear();

            let document = pass.finish().context("Failed to finish export")?;
            for skipped in &document.report.skipped {
                println!("skipped {} ({}): {}", skipped.name, skipped.id, skipped.reason);
            }
            println!(
                "{} materials, {} textures, {} images",
                document.root.materials.len(),
                document.root.textures.len(),
                document.root.images.len()
            );
            document
                .write(&output)
                .context("Failed to write glTF document")?;
            println!("Wrote {}", output.display());
        }
        Command::Check { dump } => {
            let scene = SceneDump::load(&dump).context("Failed to load scene dump")?;
            let classifier = MaterialClassifier::new();
            let mut unsupported = 0;
            for material in &scene.materials {
                if let Some(culprit) = classifier.is_supported(material) {
                    unsupported += 1;
                    println!(
                        "{}: unsupported material {} ({} {})",
                        material.name,
                        culprit.name,
                        culprit.class_name,
                        culprit
                            .class_id
                            .map(|id| id.to_string())
                            .unwrap_or_default()
                    );
                }
            }
            println!("{unsupported} of {} materials unsupported", scene.materials.len());
        }
    }

    Ok(())
}
