//! Shared fixtures for the export tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::RgbaImage;
use rootcause::Report;

use super::accumulator::OutputAccumulator;
use super::diagnostics::Diagnostics;
use super::pass::ExportReport;
use super::registry::TextureRegistry;
use super::texture::{ImageFormat, TextureError};
use super::uv::UvTransformResolver;
use super::{ExportContext, ExportOptions};
use crate::host::RecordingInstaller;
use crate::host::bitmap::BitmapProvider;

/// In-memory bitmaps keyed by path. Writes are recorded, never performed.
#[derive(Default)]
pub(crate) struct MemoryBitmaps {
    images: HashMap<PathBuf, RgbaImage>,
    loads: RefCell<usize>,
    saved: RefCell<Vec<(PathBuf, RgbaImage)>>,
    encoded: RefCell<Vec<RgbaImage>>,
}

impl MemoryBitmaps {
    pub fn with(mut self, path: &str, image: RgbaImage) -> Self {
        self.images.insert(PathBuf::from(path), image);
        self
    }

    pub fn load_count(&self) -> usize {
        *self.loads.borrow()
    }

    pub fn saved(&self) -> Vec<PathBuf> {
        self.saved.borrow().iter().map(|(p, _)| p.clone()).collect()
    }

    /// Every image that was encoded for embedding, in order.
    pub fn encoded(&self) -> Vec<RgbaImage> {
        self.encoded.borrow().clone()
    }
}

impl BitmapProvider for MemoryBitmaps {
    fn load(&self, path: &Path) -> Result<RgbaImage, Report<TextureError>> {
        *self.loads.borrow_mut() += 1;
        self.images.get(path).cloned().ok_or_else(|| {
            Report::new(TextureError::Load {
                path: path.display().to_string(),
                reason: "not found".to_string(),
            })
        })
    }

    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, Report<TextureError>> {
        let image = self.load(path)?;
        self.encode(&image, ImageFormat::Png, 100)
    }

    fn exists(&self, path: &Path) -> bool {
        self.images.contains_key(path)
    }

    fn encode(
        &self,
        image: &RgbaImage,
        format: ImageFormat,
        quality: u8,
    ) -> Result<Vec<u8>, Report<TextureError>> {
        self.encoded.borrow_mut().push(image.clone());
        crate::host::bitmap::encode_image(image, format, quality)
    }

    fn save(
        &self,
        image: &RgbaImage,
        path: &Path,
        _format: ImageFormat,
        _quality: u8,
    ) -> Result<(), Report<TextureError>> {
        self.saved.borrow_mut().push((path.to_path_buf(), image.clone()));
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<(), Report<TextureError>> {
        let image = self.load(from)?;
        self.saved.borrow_mut().push((to.to_path_buf(), image));
        Ok(())
    }
}

/// Owned state behind an [`ExportContext`].
pub(crate) struct ContextFixture {
    pub options: ExportOptions,
    pub bitmaps: MemoryBitmaps,
    pub installer: RecordingInstaller,
    pub registry: TextureRegistry,
    pub resolver: UvTransformResolver,
    pub doc: OutputAccumulator,
    pub diag: Diagnostics,
    pub report: ExportReport,
}

impl ContextFixture {
    pub fn new(options: ExportOptions, bitmaps: MemoryBitmaps) -> Self {
        Self {
            resolver: UvTransformResolver::new(options.texture_transform),
            options,
            bitmaps,
            installer: RecordingInstaller::default(),
            registry: TextureRegistry::new(),
            doc: OutputAccumulator::new(),
            diag: Diagnostics::new(),
            report: ExportReport::default(),
        }
    }

    pub fn ctx(&mut self) -> ExportContext<'_> {
        ExportContext {
            options: &self.options,
            bitmaps: &self.bitmaps,
            installer: &mut self.installer,
            registry: &mut self.registry,
            resolver: &mut self.resolver,
            doc: &mut self.doc,
            diag: &mut self.diag,
            report: &mut self.report,
        }
    }
}
