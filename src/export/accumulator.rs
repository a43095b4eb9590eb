//! Append-only output lists of one export pass.

use std::collections::HashMap;

use gltf_json as json;
use json::validation::Checked::Valid;
use json::validation::USize64;
use rootcause::Report;

use super::ExportError;
use super::gltf_export;
use super::texture::{ImageFormat, SamplingMode, TextureReference, wrapping_mode};
use crate::host::Tiling;
use crate::material::{MaterialRecord, MultiMaterialRecord};

type SamplerKey = (SamplingMode, Tiling, Tiling);

/// Owns the glTF root and the embedded binary chunk while a pass runs.
///
/// Every index handed out is the length of its list at append time; nothing
/// is removed or reordered afterwards.
#[derive(Debug, Default)]
pub struct OutputAccumulator {
    root: json::Root,
    bin: Vec<u8>,
    records: Vec<MaterialRecord>,
    material_indices: HashMap<String, usize>,
    multi: Vec<MultiMaterialRecord>,
    samplers: HashMap<SamplerKey, json::Index<json::texture::Sampler>>,
}

impl OutputAccumulator {
    pub fn new() -> Self {
        let mut root = json::Root::default();
        root.asset.generator = Some(format!("mtlbake {}", env!("CARGO_PKG_VERSION")));
        Self {
            root,
            ..Default::default()
        }
    }

    pub fn root(&self) -> &json::Root {
        &self.root
    }

    pub fn records(&self) -> &[MaterialRecord] {
        &self.records
    }

    pub fn multi_materials(&self) -> &[MultiMaterialRecord] {
        &self.multi
    }

    pub fn material_index(&self, id: &str) -> Option<usize> {
        self.material_indices.get(id).copied()
    }

    pub fn contains_material(&self, id: &str) -> bool {
        self.material_indices.contains_key(id)
    }

    /// Whether `id` was appended as a material or a multi-material group.
    pub fn is_exported(&self, id: &str) -> bool {
        self.contains_material(id) || self.multi.iter().any(|m| m.id == id)
    }

    /// Append a material. Its index is the number of materials before it.
    pub fn push_material(&mut self, record: MaterialRecord) -> Result<usize, Report<ExportError>> {
        let material = gltf_export::material_to_json(&record)?;
        for extension in gltf_export::material_extensions(&record) {
            self.use_extension(extension, false);
        }
        let index = self.root.push(material).value();
        self.material_indices.insert(record.id.clone(), index);
        self.records.push(record);
        Ok(index)
    }

    pub fn push_multi_material(&mut self, mut record: MultiMaterialRecord) {
        record.indices = record
            .materials
            .iter()
            .map(|id| id.as_deref().and_then(|id| self.material_index(id)))
            .collect();
        self.multi.push(record);
    }

    /// Structural sampler dedup.
    pub fn sampler(&mut self, tex: &TextureReference) -> json::Index<json::texture::Sampler> {
        let key = (tex.sampling, tex.wrap_u, tex.wrap_v);
        if let Some(index) = self.samplers.get(&key) {
            return *index;
        }

        let (mag, min) = tex.sampling.filters();
        let index = self.root.push(json::texture::Sampler {
            mag_filter: Some(Valid(mag)),
            min_filter: Some(Valid(min)),
            wrap_s: Valid(wrapping_mode(tex.wrap_u)),
            wrap_t: Valid(wrapping_mode(tex.wrap_v)),
            name: None,
            extensions: Default::default(),
            extras: Default::default(),
        });
        self.samplers.insert(key, index);
        index
    }

    /// Append image bytes to the binary chunk and reference them from a new
    /// image.
    pub fn push_embedded_image(
        &mut self,
        name: &str,
        bytes: &[u8],
        format: ImageFormat,
    ) -> json::Index<json::Image> {
        let byte_offset = self.bin.len();
        self.bin.extend_from_slice(bytes);
        pad_to_4(&mut self.bin);

        let view = self.root.push(json::buffer::View {
            buffer: json::Index::new(0),
            byte_length: USize64::from(bytes.len()),
            byte_offset: Some(USize64::from(byte_offset)),
            byte_stride: None,
            target: None,
            name: None,
            extensions: Default::default(),
            extras: Default::default(),
        });

        self.root.push(json::Image {
            buffer_view: Some(view),
            mime_type: Some(json::image::MimeType(format.mime_type().to_string())),
            uri: None,
            name: Some(name.to_string()),
            extensions: Default::default(),
            extras: Default::default(),
        })
    }

    pub fn push_external_image(&mut self, name: &str, uri: String) -> json::Index<json::Image> {
        self.root.push(json::Image {
            buffer_view: None,
            mime_type: None,
            uri: Some(uri),
            name: Some(name.to_string()),
            extensions: Default::default(),
            extras: Default::default(),
        })
    }

    pub fn push_texture(
        &mut self,
        name: &str,
        image: json::Index<json::Image>,
        sampler: json::Index<json::texture::Sampler>,
    ) -> json::Index<json::Texture> {
        self.root.push(json::Texture {
            source: image,
            sampler: Some(sampler),
            name: Some(name.to_string()),
            extensions: Default::default(),
            extras: Default::default(),
        })
    }

    /// Register an extension in `extensionsUsed`, and in
    /// `extensionsRequired` when `required`, once.
    pub fn use_extension(&mut self, name: &str, required: bool) {
        if !self.root.extensions_used.iter().any(|e| e == name) {
            self.root.extensions_used.push(name.to_string());
        }
        if required && !self.root.extensions_required.iter().any(|e| e == name) {
            self.root.extensions_required.push(name.to_string());
        }
    }

    /// Close the binary buffer and attach the multi-material table.
    pub fn finish(mut self) -> Result<FinishedOutput, Report<ExportError>> {
        pad_to_4(&mut self.bin);

        if !self.bin.is_empty() {
            let buffer = self.root.push(json::Buffer {
                byte_length: USize64::from(self.bin.len()),
                uri: None,
                name: None,
                extensions: Default::default(),
                extras: Default::default(),
            });
            for bv in self.root.buffer_views.iter_mut() {
                bv.buffer = buffer;
            }
        }

        if !self.multi.is_empty() {
            let extras = RootExtras {
                multi_materials: &self.multi,
            };
            let raw = serde_json::value::to_raw_value(&extras)
                .map_err(|e| Report::new(ExportError::Serialize(e.to_string())))?;
            self.root.extras = Some(raw);
        }

        Ok(FinishedOutput {
            root: self.root,
            bin: self.bin,
            records: self.records,
            multi: self.multi,
        })
    }
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct RootExtras<'a> {
    multi_materials: &'a [MultiMaterialRecord],
}

#[derive(Debug)]
pub struct FinishedOutput {
    pub root: json::Root,
    pub bin: Vec<u8>,
    pub records: Vec<MaterialRecord>,
    pub multi: Vec<MultiMaterialRecord>,
}

fn pad_to_4(data: &mut Vec<u8>) {
    while data.len() % 4 != 0 {
        data.push(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Texmap;
    use crate::material::MaterialKind;

    #[test]
    fn embedded_images_are_padded() {
        let mut acc = OutputAccumulator::new();
        let a = acc.push_embedded_image("a.png", &[1, 2, 3], ImageFormat::Png);
        let b = acc.push_embedded_image("b.png", &[4, 5, 6, 7, 8], ImageFormat::Png);
        assert_eq!(a.value(), 0);
        assert_eq!(b.value(), 1);
        assert_eq!(acc.root().buffer_views[1].byte_offset, Some(USize64(4)));

        let out = acc.finish().unwrap();
        assert_eq!(out.bin.len(), 12);
        assert_eq!(out.root.buffers.len(), 1);
    }

    #[test]
    fn samplers_are_shared_structurally() {
        let mut acc = OutputAccumulator::new();
        let a = TextureReference::from_texmap(&Texmap::bitmap("a.png")).unwrap();
        let b = TextureReference::from_texmap(&Texmap::bitmap("b.jpg")).unwrap();
        let mut clamped = Texmap::bitmap("c.png");
        clamped.tiling_u = Tiling::Clamp;
        let c = TextureReference::from_texmap(&clamped).unwrap();

        assert_eq!(acc.sampler(&a), acc.sampler(&b));
        assert_ne!(acc.sampler(&a), acc.sampler(&c));
        assert_eq!(acc.root().samplers.len(), 2);
    }

    #[test]
    fn multi_materials_reference_exported_indices() {
        let mut acc = OutputAccumulator::new();
        acc.push_material(MaterialRecord::new("a", "A", MaterialKind::Standard))
            .unwrap();
        acc.push_material(MaterialRecord::new("b", "B", MaterialKind::Physical))
            .unwrap();
        acc.push_multi_material(MultiMaterialRecord {
            id: "m".to_string(),
            name: "Multi".to_string(),
            materials: vec![Some("b".to_string()), None, Some("a".to_string())],
            indices: Vec::new(),
        });
        assert_eq!(acc.multi_materials()[0].indices, vec![Some(1), None, Some(0)]);

        let out = acc.finish().unwrap();
        let extras = out.root.extras.unwrap();
        assert!(extras.get().contains("multiMaterials"));
    }

    #[test]
    fn extensions_are_registered_once() {
        let mut acc = OutputAccumulator::new();
        acc.use_extension("KHR_texture_transform", true);
        acc.use_extension("KHR_texture_transform", true);
        acc.use_extension("KHR_materials_unlit", false);
        assert_eq!(acc.root().extensions_used.len(), 2);
        assert_eq!(acc.root().extensions_required, vec!["KHR_texture_transform".to_string()]);
    }
}
