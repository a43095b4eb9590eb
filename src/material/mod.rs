//! Canonical material records and the pipeline that produces them from host
//! materials.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::export::texture::TextureBinding;
use crate::recognized::Recognized;

pub mod attributes;
pub mod classify;
pub mod derive;
pub mod kind;

pub use attributes::AttributeOverrides;
pub use kind::MaterialKind;

/// glTF alpha handling policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransparencyMode {
    #[default]
    Opaque,
    AlphaTest,
    AlphaBlend,
}

impl TransparencyMode {
    /// Decode the integer stored in a host attribute container.
    pub fn from_raw(raw: i64) -> Recognized<Self> {
        match raw {
            0 => Recognized::Known(Self::Opaque),
            1 => Recognized::Known(Self::AlphaTest),
            2 => Recognized::Known(Self::AlphaBlend),
            other => Recognized::Unknown(other),
        }
    }
}

impl std::fmt::Display for TransparencyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Opaque => "OPAQUE",
            Self::AlphaTest => "ALPHATEST",
            Self::AlphaBlend => "ALPHABLEND",
        })
    }
}

/// `KHR_materials_clearcoat` parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ClearCoat {
    pub intensity: f32,
    pub roughness: f32,
    /// Packed coat texture: intensity in R, roughness in G.
    pub texture: Option<TextureBinding>,
    pub normal_texture: Option<TextureBinding>,
}

/// One exported material in the canonical metallic-roughness model.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialRecord {
    pub id: String,
    pub name: String,
    pub kind: MaterialKind,
    pub base_color: [f32; 3],
    pub alpha: f32,
    pub metallic: f32,
    pub roughness: f32,
    pub emissive: [f32; 3],
    pub transparency_mode: TransparencyMode,
    pub alpha_cutoff: Option<f32>,
    pub unlit: bool,
    pub double_sided: bool,
    pub base_color_texture: Option<TextureBinding>,
    pub metallic_roughness_texture: Option<TextureBinding>,
    pub occlusion_texture: Option<TextureBinding>,
    pub normal_texture: Option<TextureBinding>,
    pub emissive_texture: Option<TextureBinding>,
    pub clearcoat: Option<ClearCoat>,
    pub link_emissive_with_diffuse: bool,
    pub use_emissive_as_illumination: bool,
    pub disable_lighting: bool,
    pub overrides: AttributeOverrides,
    /// Attribute properties that aren't exporter overrides.
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl MaterialRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: MaterialKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            base_color: [1.0, 1.0, 1.0],
            alpha: 1.0,
            metallic: 0.0,
            roughness: 1.0,
            emissive: [0.0, 0.0, 0.0],
            transparency_mode: TransparencyMode::Opaque,
            alpha_cutoff: None,
            unlit: false,
            double_sided: false,
            base_color_texture: None,
            metallic_roughness_texture: None,
            occlusion_texture: None,
            normal_texture: None,
            emissive_texture: None,
            clearcoat: None,
            link_emissive_with_diffuse: false,
            use_emissive_as_illumination: false,
            disable_lighting: false,
            overrides: AttributeOverrides::default(),
            metadata: BTreeMap::new(),
        }
    }

    /// Number of texture slots (clearcoat included) holding a binding.
    pub fn texture_count(&self) -> usize {
        let coat = self
            .clearcoat
            .as_ref()
            .map(|c| c.texture.is_some() as usize + c.normal_texture.is_some() as usize)
            .unwrap_or(0);
        [
            &self.base_color_texture,
            &self.metallic_roughness_texture,
            &self.occlusion_texture,
            &self.normal_texture,
            &self.emissive_texture,
        ]
        .iter()
        .filter(|t| t.is_some())
        .count()
            + coat
    }
}

/// A container material: an ordered list of sub-material ids.
///
/// `indices` is back-patched from the exported material list once the
/// referenced sub-materials have been appended; an empty host slot, or a
/// sub-material that failed to export, stays `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiMaterialRecord {
    pub id: String,
    pub name: String,
    pub materials: Vec<Option<String>>,
    pub indices: Vec<Option<usize>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transparency_mode_from_raw() {
        assert_eq!(TransparencyMode::from_raw(1), Recognized::Known(TransparencyMode::AlphaTest));
        assert_eq!(TransparencyMode::from_raw(7), Recognized::Unknown(7));
        assert_eq!(TransparencyMode::AlphaBlend.to_string(), "ALPHABLEND");
    }
}
