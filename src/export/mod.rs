//! Export pipeline: texture emission, dedup and glTF document assembly.

use std::path::PathBuf;

use bon::Builder;
use rootcause::Report;
use thiserror::Error;

use crate::host::AttributeInstaller;
use crate::host::bitmap::BitmapProvider;

pub mod accumulator;
pub mod diagnostics;
pub mod gltf_export;
pub mod packer;
pub mod pass;
pub mod registry;
#[cfg(test)]
pub(crate) mod testing;
pub mod texture;
pub mod uv;

use accumulator::OutputAccumulator;
use diagnostics::Diagnostics;
use pass::ExportReport;
use registry::{RegistryContext, TextureRegistry};
use texture::{ChannelLayout, TextureBinding, TextureReference};
use uv::UvTransformResolver;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(String),
    #[error("texture error: {0}")]
    Texture(String),
    #[error("failed to serialize glTF document: {0}")]
    Serialize(String),
    #[error("export cancelled")]
    Cancelled,
    #[error("material {id} could not be classified: {reason}")]
    Classify { id: String, reason: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON document with external image files.
    Gltf,
    /// Binary container with embedded images.
    #[default]
    Glb,
}

impl OutputFormat {
    /// Pick the format from an output file extension, defaulting to GLB.
    pub fn for_path(path: &std::path::Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("gltf") => Self::Gltf,
            _ => Self::Glb,
        }
    }
}

#[derive(Debug, Clone, Builder)]
pub struct ExportOptions {
    #[builder(default)]
    pub output_format: OutputFormat,
    /// Export texture maps at all. When off, materials only carry factors.
    #[builder(default = true)]
    pub export_textures: bool,
    /// Pack occlusion into the R channel of the metallic-roughness texture.
    #[builder(default = true)]
    pub merge_occlusion: bool,
    /// Emit `KHR_texture_transform` for non-identity UV transforms.
    #[builder(default = true)]
    pub texture_transform: bool,
    /// JPEG quality, and whether files may be copied verbatim (100 only).
    #[builder(default = 100)]
    pub quality: u8,
    /// Let an opaque base color texture reuse the image of an earlier
    /// base color + alpha merge of the same source path.
    #[builder(default = false)]
    pub fold_paired_images: bool,
    /// Write external image files for `.gltf` output.
    #[builder(default = true)]
    pub write_textures: bool,
    /// Folder, relative to `output_dir`, that external images go into.
    #[builder(default, into)]
    pub texture_folder: PathBuf,
    #[builder(default = PathBuf::from("."), into)]
    pub output_dir: PathBuf,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ExportOptions {
    pub fn embeds_images(&self) -> bool {
        self.output_format == OutputFormat::Glb
    }
}

/// Everything a material derivation needs from the pass that runs it.
pub struct ExportContext<'a> {
    pub options: &'a ExportOptions,
    pub bitmaps: &'a dyn BitmapProvider,
    pub installer: &'a mut dyn AttributeInstaller,
    pub registry: &'a mut TextureRegistry,
    pub resolver: &'a mut UvTransformResolver,
    pub doc: &'a mut OutputAccumulator,
    pub diag: &'a mut Diagnostics,
    /// Materials left out of the document, at any nesting depth.
    pub report: &'a mut ExportReport,
}

impl ExportContext<'_> {
    /// Put `tex` in the document, or return the binding of an identical
    /// earlier request.
    pub fn export_texture(
        &mut self,
        tex: &TextureReference,
        layout: ChannelLayout,
    ) -> Result<Option<TextureBinding>, Report<ExportError>> {
        self.registry.register(
            tex,
            layout,
            RegistryContext {
                options: self.options,
                bitmaps: self.bitmaps,
                resolver: &mut *self.resolver,
                doc: &mut *self.doc,
                diag: &mut *self.diag,
            },
        )
    }
}
