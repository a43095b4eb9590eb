//! Conversion of material records to glTF JSON, and document writing.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::Write;

use gltf_json as json;
use json::validation::Checked::Valid;
use rootcause::Report;
use serde::Serialize;

use super::ExportError;
use super::texture::{TextureBinding, TransformBlock};
use super::uv::KHR_TEXTURE_TRANSFORM;
use crate::material::{MaterialKind, MaterialRecord, TransparencyMode};

pub const KHR_MATERIALS_UNLIT: &str = "KHR_materials_unlit";
pub const KHR_MATERIALS_CLEARCOAT: &str = "KHR_materials_clearcoat";

fn serialize_error(e: serde_json::Error) -> Report<ExportError> {
    Report::new(ExportError::Serialize(e.to_string()))
}

/// Material extensions a record needs, for `extensionsUsed`.
pub fn material_extensions(record: &MaterialRecord) -> Vec<&'static str> {
    let mut used = Vec::new();
    if record.unlit {
        used.push(KHR_MATERIALS_UNLIT);
    }
    if record.clearcoat.is_some() {
        used.push(KHR_MATERIALS_CLEARCOAT);
    }
    used
}

/// Exporter-specific material data carried in `extras`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MaterialExtras<'a> {
    id: &'a str,
    kind: MaterialKind,
    link_emissive_with_diffuse: bool,
    use_emissive_as_illumination: bool,
    disable_lighting: bool,
    backface_culling: bool,
    separate_culling_pass: bool,
    max_simultaneous_lights: u32,
    direct_intensity: f32,
    emissive_intensity: f32,
    environment_intensity: f32,
    specular_intensity: f32,
    #[serde(skip_serializing_if = "no_metadata")]
    metadata: &'a BTreeMap<String, serde_json::Value>,
}

fn no_metadata(metadata: &&BTreeMap<String, serde_json::Value>) -> bool {
    metadata.is_empty()
}

/// Texture reference inside an extension object, where `gltf-json` has no
/// typed representation.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtensionTextureInfo {
    index: usize,
    tex_coord: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    scale: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    extensions: Option<BTreeMap<&'static str, json::extensions::texture::TextureTransform>>,
}

impl ExtensionTextureInfo {
    fn new(binding: &TextureBinding) -> Self {
        Self {
            index: binding.texture.value(),
            tex_coord: binding.tex_coord,
            scale: binding.scale,
            extensions: binding
                .transform
                .map(|t| BTreeMap::from([(KHR_TEXTURE_TRANSFORM, t.to_json())])),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClearcoatExtension {
    clearcoat_factor: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    clearcoat_texture: Option<ExtensionTextureInfo>,
    clearcoat_roughness_factor: f32,
    /// Roughness sits in the G channel of the same texture.
    #[serde(skip_serializing_if = "Option::is_none")]
    clearcoat_roughness_texture: Option<ExtensionTextureInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    clearcoat_normal_texture: Option<ExtensionTextureInfo>,
}

fn texture_info(binding: &TextureBinding) -> json::texture::Info {
    json::texture::Info {
        index: binding.texture,
        tex_coord: binding.tex_coord,
        extensions: binding.transform.map(|t| json::extensions::texture::Info {
            texture_transform: Some(t.to_json()),
            ..Default::default()
        }),
        extras: Default::default(),
    }
}

/// `KHR_texture_transform` for texture infos without a typed extension
/// field.
fn transform_others(
    transform: Option<TransformBlock>,
) -> Result<serde_json::Map<String, serde_json::Value>, Report<ExportError>> {
    let mut others = serde_json::Map::new();
    if let Some(t) = transform {
        others.insert(
            KHR_TEXTURE_TRANSFORM.to_string(),
            serde_json::to_value(t.to_json()).map_err(serialize_error)?,
        );
    }
    Ok(others)
}

fn clamp_unit(v: f32) -> f32 {
    v.clamp(0.0, 1.0)
}

/// Build the glTF material for `record`.
pub fn material_to_json(record: &MaterialRecord) -> Result<json::Material, Report<ExportError>> {
    let [r, g, b] = record.base_color.map(clamp_unit);
    let pbr = json::material::PbrMetallicRoughness {
        base_color_factor: json::material::PbrBaseColorFactor([r, g, b, clamp_unit(record.alpha)]),
        base_color_texture: record.base_color_texture.as_ref().map(texture_info),
        metallic_factor: json::material::StrengthFactor(clamp_unit(record.metallic)),
        roughness_factor: json::material::StrengthFactor(clamp_unit(record.roughness)),
        metallic_roughness_texture: record.metallic_roughness_texture.as_ref().map(texture_info),
        extensions: Default::default(),
        extras: Default::default(),
    };

    let normal_texture = match &record.normal_texture {
        Some(binding) => Some(json::material::NormalTexture {
            index: binding.texture,
            scale: binding.scale.unwrap_or(1.0),
            tex_coord: binding.tex_coord,
            extensions: binding
                .transform
                .map(|t| {
                    Ok::<_, Report<ExportError>>(json::extensions::material::NormalTexture {
                        others: transform_others(Some(t))?,
                    })
                })
                .transpose()?,
            extras: Default::default(),
        }),
        None => None,
    };

    let occlusion_texture = match &record.occlusion_texture {
        Some(binding) => Some(json::material::OcclusionTexture {
            index: binding.texture,
            strength: json::material::StrengthFactor(1.0),
            tex_coord: binding.tex_coord,
            extensions: binding
                .transform
                .map(|t| {
                    Ok::<_, Report<ExportError>>(json::extensions::material::OcclusionTexture {
                        others: transform_others(Some(t))?,
                    })
                })
                .transpose()?,
            extras: Default::default(),
        }),
        None => None,
    };

    let (alpha_mode, alpha_cutoff) = match record.transparency_mode {
        TransparencyMode::Opaque => (json::material::AlphaMode::Opaque, None),
        TransparencyMode::AlphaTest => (
            json::material::AlphaMode::Mask,
            record.alpha_cutoff.map(json::material::AlphaCutoff),
        ),
        TransparencyMode::AlphaBlend => (json::material::AlphaMode::Blend, None),
    };

    let mut others = serde_json::Map::new();
    if record.unlit {
        others.insert(
            KHR_MATERIALS_UNLIT.to_string(),
            serde_json::Value::Object(Default::default()),
        );
    }
    if let Some(coat) = &record.clearcoat {
        let info = coat.texture.as_ref().map(ExtensionTextureInfo::new);
        let extension = ClearcoatExtension {
            clearcoat_factor: coat.intensity,
            clearcoat_roughness_factor: coat.roughness,
            clearcoat_roughness_texture: coat.texture.as_ref().map(ExtensionTextureInfo::new),
            clearcoat_texture: info,
            clearcoat_normal_texture: coat.normal_texture.as_ref().map(ExtensionTextureInfo::new),
        };
        others.insert(
            KHR_MATERIALS_CLEARCOAT.to_string(),
            serde_json::to_value(extension).map_err(serialize_error)?,
        );
    }
    let extensions = (!others.is_empty()).then(|| json::extensions::material::Material {
        others,
        ..Default::default()
    });

    let extras = MaterialExtras {
        id: &record.id,
        kind: record.kind,
        link_emissive_with_diffuse: record.link_emissive_with_diffuse,
        use_emissive_as_illumination: record.use_emissive_as_illumination,
        disable_lighting: record.disable_lighting,
        backface_culling: record.overrides.backface_culling,
        separate_culling_pass: record.overrides.separate_culling_pass,
        max_simultaneous_lights: record.overrides.max_simultaneous_lights,
        direct_intensity: record.overrides.direct_intensity,
        emissive_intensity: record.overrides.emissive_intensity,
        environment_intensity: record.overrides.environment_intensity,
        specular_intensity: record.overrides.specular_intensity,
        metadata: &record.metadata,
    };

    Ok(json::Material {
        name: Some(record.name.clone()),
        alpha_cutoff,
        alpha_mode: Valid(alpha_mode),
        double_sided: record.double_sided,
        pbr_metallic_roughness: pbr,
        normal_texture,
        occlusion_texture,
        emissive_texture: record.emissive_texture.as_ref().map(texture_info),
        emissive_factor: json::material::EmissiveFactor(record.emissive.map(clamp_unit)),
        extensions,
        extras: Some(serde_json::value::to_raw_value(&extras).map_err(serialize_error)?),
    })
}

/// Write `root` as a binary glTF container with `bin` as its buffer.
pub fn write_glb(root: &json::Root, bin: Vec<u8>, writer: &mut impl Write) -> Result<(), Report<ExportError>> {
    let json_string = json::serialize::to_string(root).map_err(serialize_error)?;

    let glb = gltf::binary::Glb {
        header: gltf::binary::Header {
            magic: *b"glTF",
            version: 2,
            length: 0, // to_writer computes this
        },
        json: Cow::Owned(json_string.into_bytes()),
        bin: if bin.is_empty() { None } else { Some(Cow::Owned(bin)) },
    };

    glb.to_writer(writer)
        .map_err(|e| Report::new(ExportError::Io(e.to_string())))?;

    Ok(())
}

/// Write `root` as pretty-printed glTF JSON.
pub fn write_gltf(root: &json::Root, writer: &mut impl Write) -> Result<(), Report<ExportError>> {
    json::serialize::to_writer_pretty(&mut *writer, root).map_err(serialize_error)?;
    writer
        .write_all(b"\n")
        .map_err(|e| Report::new(ExportError::Io(e.to_string())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::ClearCoat;

    fn binding(index: u32, transform: Option<TransformBlock>) -> TextureBinding {
        TextureBinding {
            texture: json::Index::new(index),
            tex_coord: 0,
            transform,
            scale: None,
        }
    }

    fn to_value(material: &json::Material) -> serde_json::Value {
        serde_json::to_value(material).unwrap()
    }

    #[test]
    fn factors_and_alpha_mode() {
        let mut record = MaterialRecord::new("m1", "Red", MaterialKind::Standard);
        record.base_color = [0.8, 0.2, 0.2];
        record.alpha = 0.7;
        record.transparency_mode = TransparencyMode::AlphaBlend;
        record.double_sided = true;

        let material = material_to_json(&record).unwrap();
        assert_eq!(material.pbr_metallic_roughness.base_color_factor.0, [0.8, 0.2, 0.2, 0.7]);
        assert_eq!(material.alpha_mode, Valid(json::material::AlphaMode::Blend));
        assert!(material.double_sided);
        assert!(material.extensions.is_none());

        let extras = material.extras.unwrap();
        let extras: serde_json::Value = serde_json::from_str(extras.get()).unwrap();
        assert_eq!(extras["id"], "m1");
        assert_eq!(extras["kind"], "standard");
        assert_eq!(extras["maxSimultaneousLights"], 4);
    }

    #[test]
    fn alpha_test_writes_cutoff() {
        let mut record = MaterialRecord::new("m", "Leaves", MaterialKind::Physical);
        record.transparency_mode = TransparencyMode::AlphaTest;
        record.alpha_cutoff = Some(0.5);
        let material = material_to_json(&record).unwrap();
        assert_eq!(material.alpha_mode, Valid(json::material::AlphaMode::Mask));
        assert_eq!(material.alpha_cutoff.map(|c| c.0), Some(0.5));
    }

    #[test]
    fn texture_transform_on_every_slot() {
        let transform = TransformBlock {
            offset: [0.5, 0.0],
            rotation: 0.0,
            scale: [2.0, 2.0],
            tex_coord: 0,
        };
        let mut record = MaterialRecord::new("m", "Tiles", MaterialKind::Physical);
        record.base_color_texture = Some(binding(0, Some(transform)));
        record.normal_texture = Some(binding(1, Some(transform)));
        record.occlusion_texture = Some(binding(2, None));

        let value = to_value(&material_to_json(&record).unwrap());
        assert_eq!(
            value["pbrMetallicRoughness"]["baseColorTexture"]["extensions"]["KHR_texture_transform"]["offset"],
            serde_json::json!([0.5, 0.0])
        );
        assert_eq!(
            value["normalTexture"]["extensions"]["KHR_texture_transform"]["scale"],
            serde_json::json!([2.0, 2.0])
        );
        assert!(value["occlusionTexture"].get("extensions").is_none());
    }

    #[test]
    fn unlit_and_clearcoat_extensions() {
        let mut record = MaterialRecord::new("m", "Paint", MaterialKind::StandardSurface);
        record.unlit = true;
        record.clearcoat = Some(ClearCoat {
            intensity: 1.0,
            roughness: 1.0,
            texture: Some(binding(3, None)),
            normal_texture: None,
        });

        let value = to_value(&material_to_json(&record).unwrap());
        assert!(value["extensions"][KHR_MATERIALS_UNLIT].is_object());
        let coat = &value["extensions"][KHR_MATERIALS_CLEARCOAT];
        assert_eq!(coat["clearcoatTexture"]["index"], 3);
        assert_eq!(coat["clearcoatRoughnessTexture"]["index"], 3);
        assert!(coat.get("clearcoatNormalTexture").is_none());
        assert_eq!(
            material_extensions(&record),
            vec![KHR_MATERIALS_UNLIT, KHR_MATERIALS_CLEARCOAT]
        );
    }

    #[test]
    fn glb_has_header_and_chunks() {
        let root = json::Root::default();
        let mut out = Vec::new();
        write_glb(&root, vec![1, 2, 3, 4], &mut out).unwrap();
        assert_eq!(&out[0..4], b"glTF");
        let parsed = gltf::binary::Glb::from_slice(&out).unwrap();
        assert_eq!(parsed.bin.as_deref(), Some(&[1u8, 2, 3, 4][..]));
    }
}
