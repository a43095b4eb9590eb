//! Material kind dispatch and container traversal.

use std::collections::HashMap;

use rootcause::Report;
use thiserror::Error;

use super::kind::{self, MaterialKind};
use super::{MaterialRecord, MultiMaterialRecord, derive};
use crate::export::{ExportContext, ExportError};
use crate::host::{ClassId, HostMaterial};

/// Deepest container nesting the classifier follows.
pub const MAX_DEPTH: usize = 16;

/// Why a material was not exported.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassifyError {
    #[error("unsupported material type: {class_name} {class_id}")]
    Unsupported { class_name: String, class_id: String },
    #[error("material nesting deeper than {MAX_DEPTH} levels")]
    DepthExceeded,
    #[error("shell material has no baked material")]
    MissingBakedMaterial,
    #[error("DirectX shader has no render material")]
    MissingRenderMaterial,
    #[error("custom exporter produced no material")]
    CustomExporterFailed,
}

/// Exporter for a plugin material class, consulted before the built-in leaf
/// kinds.
pub trait MaterialExporter {
    /// `None` reports that the exporter could not handle this material.
    fn export_material(
        &self,
        material: &HostMaterial,
        ctx: &mut ExportContext<'_>,
    ) -> Result<Option<MaterialRecord>, Report<ExportError>>;
}

/// Result of exporting one host material.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutcome {
    /// Appended at this material index.
    Material(usize),
    /// Appended as a multi-material group.
    Multi,
    /// Exported earlier in the pass.
    AlreadyExported,
    Skipped(ClassifyError),
}

#[derive(Default)]
pub struct MaterialClassifier {
    custom: HashMap<ClassId, Box<dyn MaterialExporter>>,
}

impl MaterialClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, class_id: ClassId, exporter: Box<dyn MaterialExporter>) {
        self.custom.insert(class_id, exporter);
    }

    fn custom_exporter(&self, material: &HostMaterial) -> Option<&dyn MaterialExporter> {
        material
            .class_id
            .and_then(|id| self.custom.get(&id))
            .map(|e| e.as_ref())
    }

    /// First matching kind: containers, then custom exporters, then the
    /// built-in leaf kinds.
    pub fn classify(&self, material: &HostMaterial) -> Option<MaterialKind> {
        kind::container_kind(material)
            .or_else(|| self.custom_exporter(material).map(|_| MaterialKind::Custom))
            .or_else(|| kind::leaf_kind(material))
    }

    /// The first material under `material` that can't be exported, or `None`
    /// when everything is supported.
    ///
    /// Shells are checked through their baked material and DirectX shaders
    /// through their render material. Past [`MAX_DEPTH`] the node at which
    /// the guard tripped is returned.
    pub fn is_supported<'m>(&self, material: &'m HostMaterial) -> Option<&'m HostMaterial> {
        self.find_unsupported(material, 0)
    }

    fn find_unsupported<'m>(&self, material: &'m HostMaterial, depth: usize) -> Option<&'m HostMaterial> {
        if depth > MAX_DEPTH {
            return Some(material);
        }
        match self.classify(material) {
            Some(MaterialKind::Shell) => match material.baked_material() {
                Some(baked) => self.find_unsupported(baked, depth + 1),
                None => Some(material),
            },
            Some(MaterialKind::DirectXShader) => match material.render_material.as_deref() {
                Some(render) => self.find_unsupported(render, depth + 1),
                None => Some(material),
            },
            Some(kind) if kind.is_container() => material
                .sub_materials
                .iter()
                .flatten()
                .find_map(|sub| self.find_unsupported(sub, depth + 1)),
            Some(_) => None,
            None => Some(material),
        }
    }

    /// Export `material` and, for containers, the sub-materials it
    /// references. Every material id is exported at most once per pass.
    pub fn export(
        &self,
        material: &HostMaterial,
        ctx: &mut ExportContext<'_>,
    ) -> Result<ExportOutcome, Report<ExportError>> {
        if ctx.doc.is_exported(&material.id) {
            return Ok(ExportOutcome::AlreadyExported);
        }
        ctx.diag.message(1, format!("Export material: {}", material.name));
        self.export_top_level(material, &material.id, ctx, 0)
    }

    /// Unwrap shells and DirectX shaders down to what they render, which may
    /// itself be a container.
    fn export_top_level(
        &self,
        material: &HostMaterial,
        export_id: &str,
        ctx: &mut ExportContext<'_>,
        depth: usize,
    ) -> Result<ExportOutcome, Report<ExportError>> {
        if depth > MAX_DEPTH {
            return Ok(self.skip(material, ClassifyError::DepthExceeded, ctx));
        }
        match self.classify(material) {
            Some(MaterialKind::Shell) => match material.baked_material() {
                // the baked result is what renders outside the host
                Some(baked) => self.export_top_level(baked, &baked.id, ctx, depth + 1),
                None => Ok(self.skip(material, ClassifyError::MissingBakedMaterial, ctx)),
            },
            Some(MaterialKind::DirectXShader) => match material.render_material.as_deref() {
                Some(render) => self.export_top_level(render, export_id, ctx, depth + 1),
                None => Ok(self.skip(material, ClassifyError::MissingRenderMaterial, ctx)),
            },
            Some(kind) if kind.is_container() => {
                if ctx.doc.is_exported(export_id) {
                    return Ok(ExportOutcome::AlreadyExported);
                }
                self.export_container(material, export_id, ctx)
            }
            _ => self.export_leaf(material, export_id, ctx, depth.min(1) as u32),
        }
    }

    fn export_container(
        &self,
        material: &HostMaterial,
        export_id: &str,
        ctx: &mut ExportContext<'_>,
    ) -> Result<ExportOutcome, Report<ExportError>> {
        let mut materials = Vec::with_capacity(material.sub_materials.len());
        for slot in &material.sub_materials {
            let Some(sub) = slot else {
                materials.push(None);
                continue;
            };
            materials.push(self.export_slot(sub, ctx)?);
        }

        ctx.doc.push_multi_material(MultiMaterialRecord {
            id: export_id.to_string(),
            name: material.name.clone(),
            materials,
            indices: Vec::new(),
        });
        Ok(ExportOutcome::Multi)
    }

    /// Export one container slot, returning the id the slot refers to.
    fn export_slot(
        &self,
        sub: &HostMaterial,
        ctx: &mut ExportContext<'_>,
    ) -> Result<Option<String>, Report<ExportError>> {
        let mut node = sub;
        let mut export_id = sub.id.as_str();
        for depth in 1.. {
            if depth > MAX_DEPTH {
                self.skip(node, ClassifyError::DepthExceeded, ctx);
                return Ok(None);
            }
            node = match self.classify(node) {
                Some(MaterialKind::Multi) => {
                    ctx.diag.error(
                        2,
                        format!(
                            "Multi/sub-object material {} inside another container is not supported",
                            node.name
                        ),
                    );
                    return Ok(None);
                }
                // layered and double-sided materials collapse to their base
                // layer / front face
                Some(MaterialKind::CoronaLayered | MaterialKind::DoubleSided) => match node.sub_material(0) {
                    Some(first) => {
                        export_id = first.id.as_str();
                        first
                    }
                    None => return Ok(None),
                },
                Some(MaterialKind::Shell) => match node.baked_material() {
                    Some(baked) => {
                        export_id = baked.id.as_str();
                        baked
                    }
                    None => {
                        self.skip(node, ClassifyError::MissingBakedMaterial, ctx);
                        return Ok(None);
                    }
                },
                // keeps the wrapper's id
                Some(MaterialKind::DirectXShader) => match node.render_material.as_deref() {
                    Some(render) => render,
                    None => {
                        self.skip(node, ClassifyError::MissingRenderMaterial, ctx);
                        return Ok(None);
                    }
                },
                _ => break,
            };
        }

        Ok(match self.export_leaf(node, export_id, ctx, 2)? {
            ExportOutcome::Material(_) | ExportOutcome::AlreadyExported => Some(export_id.to_string()),
            ExportOutcome::Multi | ExportOutcome::Skipped(_) => None,
        })
    }

    fn export_leaf(
        &self,
        material: &HostMaterial,
        export_id: &str,
        ctx: &mut ExportContext<'_>,
        rank: u32,
    ) -> Result<ExportOutcome, Report<ExportError>> {
        if ctx.doc.is_exported(export_id) {
            ctx.diag.verbose(rank + 1, format!("{} already exported", material.name));
            return Ok(ExportOutcome::AlreadyExported);
        }

        let record = match self.classify(material) {
            Some(MaterialKind::Custom) => {
                let Some(exporter) = self.custom_exporter(material) else {
                    return Ok(self.skip(material, unsupported(material), ctx));
                };
                match exporter.export_material(material, ctx)? {
                    Some(record) => record,
                    None => {
                        ctx.diag.warning(
                            rank + 1,
                            format!(
                                "Custom material exporter failed to export {} ({})",
                                material.name, material.class_name
                            ),
                        );
                        return Ok(self.skip(material, ClassifyError::CustomExporterFailed, ctx));
                    }
                }
            }
            Some(kind) if !kind.is_container() => derive::derive(kind, material, ctx)?,
            _ => return Ok(self.skip(material, unsupported(material), ctx)),
        };

        let record = MaterialRecord {
            id: export_id.to_string(),
            ..record
        };
        ctx.diag
            .verbose(rank + 1, format!("{} material: {}", record.kind, record.name));
        let index = ctx.doc.push_material(record)?;
        Ok(ExportOutcome::Material(index))
    }

    fn skip(&self, material: &HostMaterial, reason: ClassifyError, ctx: &mut ExportContext<'_>) -> ExportOutcome {
        ctx.diag
            .warning(2, format!("Material {} is not exported: {reason}", material.name));
        ctx.report.skip(material, reason.clone());
        ExportOutcome::Skipped(reason)
    }
}

fn unsupported(material: &HostMaterial) -> ClassifyError {
    ClassifyError::Unsupported {
        class_name: material.class_name.clone(),
        class_id: material
            .class_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportOptions;
    use crate::export::testing::{ContextFixture, MemoryBitmaps};
    use crate::host::{PropertyBag, PropertyValue};

    fn leaf(id: &str, class_name: &str) -> HostMaterial {
        HostMaterial {
            id: id.to_string(),
            name: id.to_uppercase(),
            class_name: class_name.to_string(),
            ..Default::default()
        }
    }

    fn container(id: &str, class_name: &str, subs: Vec<Option<HostMaterial>>) -> HostMaterial {
        HostMaterial {
            sub_materials: subs,
            ..leaf(id, class_name)
        }
    }

    fn fixture() -> ContextFixture {
        ContextFixture::new(ExportOptions::default(), MemoryBitmaps::default())
    }

    #[test]
    fn finds_unsupported_leaf_three_levels_down() {
        let deep = container(
            "outer",
            "Multimaterial",
            vec![
                Some(leaf("ok", "Standardmaterial")),
                Some(container(
                    "mid",
                    "Doublesided",
                    vec![Some(container(
                        "inner",
                        "Multimaterial",
                        vec![None, Some(leaf("vray", "VRayMtl"))],
                    ))],
                )),
            ],
        );
        let classifier = MaterialClassifier::new();
        let found = classifier.is_supported(&deep).unwrap();
        assert_eq!(found.id, "vray");

        let fine = container("outer", "Multimaterial", vec![Some(leaf("ok", "Standardmaterial")), None]);
        assert!(classifier.is_supported(&fine).is_none());
    }

    #[test]
    fn depth_guard_reports_the_tripping_node() {
        let mut node = leaf("bottom", "Standardmaterial");
        for i in 0..=MAX_DEPTH {
            node = container(&format!("level{i}"), "Multimaterial", vec![Some(node)]);
        }
        let found = MaterialClassifier::new().is_supported(&node).unwrap();
        assert_eq!(found.id, "bottom");

        node = container("top", "Multimaterial", vec![Some(node)]);
        let found = MaterialClassifier::new().is_supported(&node).unwrap();
        assert_eq!(found.id, "level0");
    }

    #[test]
    fn directx_shader_exports_render_material_under_wrapper_id() {
        let mut fx = fixture();
        let wrapper = HostMaterial {
            render_material: Some(Box::new(leaf("render", "Standardmaterial"))),
            ..leaf("dx", "DirectX Shader")
        };
        let outcome = MaterialClassifier::new().export(&wrapper, &mut fx.ctx()).unwrap();
        assert_eq!(outcome, ExportOutcome::Material(0));
        assert_eq!(fx.doc.records()[0].id, "dx");
        assert_eq!(fx.doc.records()[0].kind, MaterialKind::Standard);
    }

    #[test]
    fn multi_material_shares_sub_materials() {
        let mut fx = fixture();
        let shared = leaf("a", "Standardmaterial");
        let multi = container(
            "multi",
            "Multimaterial",
            vec![
                Some(shared.clone()),
                None,
                Some(container("layered", "CoronaLayeredMtl", vec![Some(leaf("base", "CoronaMtl"))])),
                Some(shared),
                Some(container("nested", "Multimaterial", vec![Some(leaf("x", "Standardmaterial"))])),
            ],
        );
        let classifier = MaterialClassifier::new();
        assert_eq!(classifier.export(&multi, &mut fx.ctx()).unwrap(), ExportOutcome::Multi);

        let group = &fx.doc.multi_materials()[0];
        assert_eq!(
            group.materials,
            vec![Some("a".to_string()), None, Some("base".to_string()), Some("a".to_string()), None]
        );
        assert_eq!(group.indices, vec![Some(0), None, Some(1), Some(0), None]);
        assert_eq!(fx.doc.records().len(), 2);
        assert!(fx.diag.has_errors());

        assert_eq!(
            classifier.export(&multi, &mut fx.ctx()).unwrap(),
            ExportOutcome::AlreadyExported
        );
    }

    #[test]
    fn unsupported_leaf_is_skipped() {
        let mut fx = fixture();
        let outcome = MaterialClassifier::new()
            .export(&leaf("v", "VRayMtl"), &mut fx.ctx())
            .unwrap();
        assert!(matches!(outcome, ExportOutcome::Skipped(ClassifyError::Unsupported { .. })));
        assert!(fx.doc.records().is_empty());
        assert_eq!(fx.report.skipped.len(), 1);
    }

    #[test]
    fn unsupported_slots_are_reported() {
        let mut fx = fixture();
        let vray = leaf("vray", "VRayMtl");
        let multi = container(
            "multi",
            "Multimaterial",
            vec![Some(leaf("a", "Standardmaterial")), Some(vray.clone()), Some(vray)],
        );
        assert_eq!(
            MaterialClassifier::new().export(&multi, &mut fx.ctx()).unwrap(),
            ExportOutcome::Multi
        );

        assert_eq!(fx.doc.multi_materials()[0].materials, vec![Some("a".to_string()), None, None]);
        let skipped: Vec<_> = fx.report.skipped.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(skipped, vec!["vray"]);
        assert!(matches!(fx.report.skipped[0].reason, ClassifyError::Unsupported { .. }));
    }

    #[test]
    fn shell_baking_to_a_multi_material_exports_the_group() {
        let mut fx = fixture();
        let baked = container(
            "baked",
            "Multimaterial",
            vec![Some(leaf("a", "Standardmaterial")), Some(leaf("b", "Standardmaterial"))],
        );
        let shell = HostMaterial {
            baked_material_id: Some("baked".to_string()),
            ..container("shell", "Shell Material", vec![Some(leaf("orig", "Standardmaterial")), Some(baked)])
        };
        let classifier = MaterialClassifier::new();
        assert!(classifier.is_supported(&shell).is_none());

        let outcome = classifier.export(&shell, &mut fx.ctx()).unwrap();
        assert_eq!(outcome, ExportOutcome::Multi);
        let group = &fx.doc.multi_materials()[0];
        assert_eq!(group.id, "baked");
        assert_eq!(group.indices, vec![Some(0), Some(1)]);
        assert!(fx.report.skipped.is_empty());
    }

    #[test]
    fn directx_shader_over_a_multi_material_keeps_the_wrapper_id() {
        let mut fx = fixture();
        let wrapper = HostMaterial {
            render_material: Some(Box::new(container(
                "render",
                "Multimaterial",
                vec![Some(leaf("a", "Standardmaterial"))],
            ))),
            ..leaf("dx", "DirectX Shader")
        };
        let classifier = MaterialClassifier::new();
        assert_eq!(classifier.export(&wrapper, &mut fx.ctx()).unwrap(), ExportOutcome::Multi);
        assert_eq!(fx.doc.multi_materials()[0].id, "dx");
        assert_eq!(fx.doc.records()[0].id, "a");

        assert_eq!(
            classifier.export(&wrapper, &mut fx.ctx()).unwrap(),
            ExportOutcome::AlreadyExported
        );
    }

    struct Toon;

    impl MaterialExporter for Toon {
        fn export_material(
            &self,
            material: &HostMaterial,
            _ctx: &mut ExportContext<'_>,
        ) -> Result<Option<MaterialRecord>, Report<ExportError>> {
            let mut record = MaterialRecord::new(&material.id, &material.name, MaterialKind::Custom);
            record.base_color = material.properties.get_point3("ink", [0.0; 3]);
            Ok(Some(record))
        }
    }

    #[test]
    fn custom_exporters_take_precedence_over_leaf_kinds() {
        let mut fx = fixture();
        let mut classifier = MaterialClassifier::new();
        // shares the standard material's class id
        classifier.register(kind::STANDARD_CLASS_ID, Box::new(Toon));

        let material = HostMaterial {
            class_id: Some(kind::STANDARD_CLASS_ID),
            properties: PropertyBag::new().with("ink", PropertyValue::Point3([0.1, 0.1, 0.1])),
            ..leaf("toon", "Standardmaterial")
        };
        classifier.export(&material, &mut fx.ctx()).unwrap();
        assert_eq!(fx.doc.records()[0].kind, MaterialKind::Custom);
        assert_eq!(fx.doc.records()[0].base_color, [0.1, 0.1, 0.1]);
    }
}
