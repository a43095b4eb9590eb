//! One export run over a list of host materials.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use gltf_json as json;
use itertools::Itertools;
use rootcause::Report;
use tracing::{info, warn};

use super::accumulator::OutputAccumulator;
use super::diagnostics::{Diagnostic, Diagnostics};
use super::gltf_export;
use super::registry::TextureRegistry;
use super::uv::UvTransformResolver;
use super::{ExportContext, ExportError, ExportOptions, OutputFormat};
use crate::host::bitmap::BitmapProvider;
use crate::host::{AttributeInstaller, ClassId, HostMaterial};
use crate::material::classify::{ClassifyError, ExportOutcome, MaterialClassifier, MaterialExporter};
use crate::material::{MaterialRecord, MultiMaterialRecord};

/// A material that was not exported, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedMaterial {
    pub id: String,
    pub name: String,
    pub reason: ClassifyError,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportReport {
    pub skipped: Vec<SkippedMaterial>,
}

impl ExportReport {
    /// Record `material` as skipped. A material shared by several
    /// containers is listed once.
    pub fn skip(&mut self, material: &HostMaterial, reason: ClassifyError) {
        if self.skipped.iter().any(|s| s.id == material.id) {
            return;
        }
        self.skipped.push(SkippedMaterial {
            id: material.id.clone(),
            name: material.name.clone(),
            reason,
        });
    }
}

/// State of one export run. Every dedup cache lives here and dies with the
/// pass.
pub struct ExportPass<'a> {
    options: &'a ExportOptions,
    bitmaps: &'a dyn BitmapProvider,
    installer: &'a mut dyn AttributeInstaller,
    classifier: MaterialClassifier,
    registry: TextureRegistry,
    resolver: UvTransformResolver,
    doc: OutputAccumulator,
    diag: Diagnostics,
    report: ExportReport,
}

impl<'a> ExportPass<'a> {
    pub fn new(
        options: &'a ExportOptions,
        bitmaps: &'a dyn BitmapProvider,
        installer: &'a mut dyn AttributeInstaller,
    ) -> Self {
        Self {
            options,
            bitmaps,
            installer,
            classifier: MaterialClassifier::new(),
            registry: TextureRegistry::new(),
            resolver: UvTransformResolver::new(options.texture_transform),
            doc: OutputAccumulator::new(),
            diag: Diagnostics::new(),
            report: ExportReport::default(),
        }
    }

    /// Route materials of `class_id` to `exporter` instead of the built-in
    /// derivations.
    pub fn register_exporter(&mut self, class_id: ClassId, exporter: Box<dyn MaterialExporter>) {
        self.classifier.register(class_id, exporter);
    }

    pub fn classifier(&self) -> &MaterialClassifier {
        &self.classifier
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diag
    }

    pub fn report(&self) -> &ExportReport {
        &self.report
    }

    /// Export one material. Materials already exported in this pass are
    /// not exported again.
    pub fn export_material(&mut self, material: &HostMaterial) -> Result<ExportOutcome, Report<ExportError>> {
        let mut ctx = ExportContext {
            options: self.options,
            bitmaps: self.bitmaps,
            installer: &mut *self.installer,
            registry: &mut self.registry,
            resolver: &mut self.resolver,
            doc: &mut self.doc,
            diag: &mut self.diag,
            report: &mut self.report,
        };
        self.classifier.export(material, &mut ctx)
    }

    /// Export `materials` in order. `cancel` is checked before every
    /// material; `progress` receives the completed fraction after each one.
    pub fn export_materials(
        &mut self,
        materials: &[HostMaterial],
        cancel: &AtomicBool,
        mut progress: impl FnMut(f32),
    ) -> Result<(), Report<ExportError>> {
        info!(rank = 0, count = materials.len(), "exporting materials");
        for (i, material) in materials.iter().enumerate() {
            if cancel.load(Ordering::Relaxed) {
                warn!(rank = 0, "export cancelled");
                return Err(Report::new(ExportError::Cancelled));
            }
            self.export_material(material)?;
            progress((i + 1) as f32 / materials.len() as f32);
        }
        Ok(())
    }

    /// Close the pass and hand over the finished document.
    pub fn finish(self) -> Result<ExportedDocument, Report<ExportError>> {
        if !self.report.skipped.is_empty() {
            warn!(
                rank = 0,
                skipped = %self.report.skipped.iter().map(|s| &s.name).join(", "),
                "some materials were not exported"
            );
        }
        info!(
            rank = 0,
            materials = self.doc.records().len(),
            textures = self.doc.root().textures.len(),
            images = self.doc.root().images.len(),
            "export finished"
        );

        let output = self.doc.finish()?;
        Ok(ExportedDocument {
            format: self.options.output_format,
            root: output.root,
            bin: output.bin,
            records: output.records,
            multi_materials: output.multi,
            diagnostics: self.diag.into_entries(),
            report: self.report,
        })
    }
}

/// The result of a finished pass.
#[derive(Debug)]
pub struct ExportedDocument {
    pub format: OutputFormat,
    pub root: json::Root,
    /// Embedded image data; empty for `.gltf` output.
    pub bin: Vec<u8>,
    pub records: Vec<MaterialRecord>,
    pub multi_materials: Vec<MultiMaterialRecord>,
    pub diagnostics: Vec<Diagnostic>,
    pub report: ExportReport,
}

impl ExportedDocument {
    /// Write the document to `path` in its output format. External images
    /// have already been written during the pass.
    pub fn write(self, path: &Path) -> Result<(), Report<ExportError>> {
        let file = File::create(path).map_err(|e| Report::new(ExportError::Io(e.to_string())))?;
        let mut writer = BufWriter::new(file);
        match self.format {
            OutputFormat::Glb => gltf_export::write_glb(&self.root, self.bin, &mut writer),
            OutputFormat::Gltf => gltf_export::write_gltf(&self.root, &mut writer),
        }
    }
}
