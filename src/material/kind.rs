//! Host material kinds and the predicates that recognize them.

use serde::Serialize;

use crate::host::{AttributeTemplate, ClassId, HostMaterial};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MaterialKind {
    Shell,
    DirectXShader,
    Multi,
    DoubleSided,
    CoronaLayered,
    /// Exported by a registered [`MaterialExporter`](super::classify::MaterialExporter).
    Custom,
    Standard,
    Physical,
    PbrMetalRough,
    PbrSpecGloss,
    StandardSurface,
    CoronaPhysical,
    CoronaLegacy,
    CoronaLight,
    Gltf,
}

impl MaterialKind {
    /// Kinds that wrap or group other materials instead of shading.
    pub fn is_container(self) -> bool {
        matches!(
            self,
            Self::Shell | Self::DirectXShader | Self::Multi | Self::DoubleSided | Self::CoronaLayered
        )
    }

    /// Attribute template installed on materials of this kind that carry no
    /// attribute container.
    pub fn attribute_template(self) -> Option<AttributeTemplate> {
        match self {
            Self::Standard => Some(AttributeTemplate::Standard),
            Self::Physical => Some(AttributeTemplate::Physical),
            Self::StandardSurface => Some(AttributeTemplate::StandardSurface),
            _ => None,
        }
    }
}

impl std::fmt::Display for MaterialKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Shell => "Shell",
            Self::DirectXShader => "DirectX Shader",
            Self::Multi => "Multi/Sub-Object",
            Self::DoubleSided => "Double Sided",
            Self::CoronaLayered => "Corona Layered",
            Self::Custom => "Custom",
            Self::Standard => "Standard",
            Self::Physical => "Physical",
            Self::PbrMetalRough => "PBR Metal/Rough",
            Self::PbrSpecGloss => "PBR Spec/Gloss",
            Self::StandardSurface => "Standard Surface",
            Self::CoronaPhysical => "Corona Physical",
            Self::CoronaLegacy => "Corona Legacy",
            Self::CoronaLight => "Corona Light",
            Self::Gltf => "glTF",
        };
        f.write_str(name)
    }
}

pub const STANDARD_CLASS_ID: ClassId = ClassId(0x2, 0);
pub const MULTI_CLASS_ID: ClassId = ClassId(0x200, 0);
pub const DOUBLE_SIDED_CLASS_ID: ClassId = ClassId(0x210, 0);
pub const SHELL_CLASS_ID: ClassId = ClassId(0x255, 0);
pub const PHYSICAL_CLASS_ID: ClassId = ClassId(0x3d6b_1cec, 0xdead_c001);
pub const PBR_METAL_ROUGH_CLASS_ID: ClassId = ClassId(0xd00f_1e00, 0xbe77_e500);
pub const PBR_SPEC_GLOSS_CLASS_ID: ClassId = ClassId(0xd00f_1e00, 0x01db_ad33);

/// Recognizes one material kind.
///
/// A material whose dump carries a class id is matched on it when the kind
/// has a known id; otherwise the class name is compared case-insensitively,
/// ignoring spaces, underscores and slashes.
#[derive(Debug, Clone, Copy)]
pub struct KindMatcher {
    pub kind: MaterialKind,
    pub class_id: Option<ClassId>,
    pub class_names: &'static [&'static str],
}

impl KindMatcher {
    pub fn matches(&self, material: &HostMaterial) -> bool {
        if let (Some(actual), Some(expected)) = (material.class_id, self.class_id) {
            return actual == expected;
        }
        let name = normalize_class_name(&material.class_name);
        !name.is_empty() && self.class_names.iter().any(|n| normalize_class_name(n) == name)
    }
}

fn normalize_class_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, ' ' | '_' | '/' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Wrapper and container kinds, checked before anything else.
pub const CONTAINER_KINDS: &[KindMatcher] = &[
    KindMatcher {
        kind: MaterialKind::Shell,
        class_id: Some(SHELL_CLASS_ID),
        class_names: &["Shell Material", "Shell"],
    },
    KindMatcher {
        kind: MaterialKind::DirectXShader,
        class_id: None,
        class_names: &["DirectX Shader", "DxMaterial"],
    },
    KindMatcher {
        kind: MaterialKind::Multi,
        class_id: Some(MULTI_CLASS_ID),
        class_names: &["Multimaterial", "Multi/Sub-Object"],
    },
    KindMatcher {
        kind: MaterialKind::DoubleSided,
        class_id: Some(DOUBLE_SIDED_CLASS_ID),
        class_names: &["Doublesided", "Double Sided"],
    },
    KindMatcher {
        kind: MaterialKind::CoronaLayered,
        class_id: None,
        class_names: &["CoronaLayeredMtl", "Corona Layered Mtl"],
    },
];

/// Shading kinds, in dispatch order.
pub const LEAF_KINDS: &[KindMatcher] = &[
    KindMatcher {
        kind: MaterialKind::Standard,
        class_id: Some(STANDARD_CLASS_ID),
        class_names: &["Standard", "Standardmaterial"],
    },
    KindMatcher {
        kind: MaterialKind::Physical,
        class_id: Some(PHYSICAL_CLASS_ID),
        class_names: &["Physical Material", "PhysicalMaterial"],
    },
    KindMatcher {
        kind: MaterialKind::PbrMetalRough,
        class_id: Some(PBR_METAL_ROUGH_CLASS_ID),
        class_names: &["PBRMetalRough", "PBR Material (Metal/Rough)"],
    },
    KindMatcher {
        kind: MaterialKind::PbrSpecGloss,
        class_id: Some(PBR_SPEC_GLOSS_CLASS_ID),
        class_names: &["PBRSpecGloss", "PBR Material (Spec/Gloss)"],
    },
    KindMatcher {
        kind: MaterialKind::StandardSurface,
        class_id: None,
        class_names: &["ai_standard_surface", "Standard Surface"],
    },
    KindMatcher {
        kind: MaterialKind::CoronaPhysical,
        class_id: None,
        class_names: &["CoronaPhysicalMtl", "Corona Physical Mtl"],
    },
    KindMatcher {
        kind: MaterialKind::CoronaLegacy,
        class_id: None,
        class_names: &["CoronaMtl", "CoronaLegacyMtl"],
    },
    KindMatcher {
        kind: MaterialKind::CoronaLight,
        class_id: None,
        class_names: &["CoronaLightMtl", "Corona Light Mtl"],
    },
    KindMatcher {
        kind: MaterialKind::Gltf,
        class_id: None,
        class_names: &["glTFMaterial", "glTF Material"],
    },
];

pub fn container_kind(material: &HostMaterial) -> Option<MaterialKind> {
    CONTAINER_KINDS.iter().find(|m| m.matches(material)).map(|m| m.kind)
}

pub fn leaf_kind(material: &HostMaterial) -> Option<MaterialKind> {
    LEAF_KINDS.iter().find(|m| m.matches(material)).map(|m| m.kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material(class_name: &str, class_id: Option<ClassId>) -> HostMaterial {
        HostMaterial {
            class_name: class_name.to_string(),
            class_id,
            ..Default::default()
        }
    }

    #[test]
    fn class_id_takes_precedence_over_name() {
        let m = material("Standardmaterial", Some(PHYSICAL_CLASS_ID));
        assert_eq!(leaf_kind(&m), Some(MaterialKind::Physical));
    }

    #[test]
    fn names_match_case_insensitively() {
        assert_eq!(leaf_kind(&material("AI_Standard_Surface", None)), Some(MaterialKind::StandardSurface));
        assert_eq!(container_kind(&material("multi/sub-object", None)), Some(MaterialKind::Multi));
        assert_eq!(leaf_kind(&material("VRayMtl", None)), None);
        assert_eq!(leaf_kind(&material("", None)), None);
    }

    #[test]
    fn name_only_kinds_still_match_when_an_id_is_present() {
        let m = material("CoronaLightMtl", Some(ClassId(0x1234, 0x5678)));
        assert_eq!(leaf_kind(&m), Some(MaterialKind::CoronaLight));
    }
}
