//! Host-side material model.
//!
//! The content-creation tool is an external collaborator: this module only
//! describes what the exporter reads from it. A [`HostMaterial`] is an owned
//! snapshot of one host material (type identity, property bag, texmap slots
//! and sub-materials), usually deserialized from a [`SceneDump`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ErrorKind, IResult, failure_from_kind};
use crate::export::texture::SamplingMode;

pub mod bitmap;

/// Two-part host class identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassId(pub u32, pub u32);

impl std::fmt::Display for ClassId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:X}:{:X}", self.0, self.1)
    }
}

/// A single typed value in a host property bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Point3([f32; 3]),
    Point4([f32; 4]),
    String(String),
}

/// Named host properties with default-on-missing accessors.
///
/// None of the typed getters fail: a missing property, or one of an
/// incompatible type, yields the supplied default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyBag(pub BTreeMap<String, PropertyValue>);

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: PropertyValue) -> Self {
        self.0.insert(name.to_string(), value);
        self
    }

    pub fn query(&self, name: &str) -> Option<&PropertyValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.0.iter()
    }

    pub fn get_bool(&self, name: &str, default: bool) -> bool {
        match self.query(name) {
            Some(PropertyValue::Bool(b)) => *b,
            Some(PropertyValue::Int(i)) => *i != 0,
            _ => default,
        }
    }

    pub fn get_int(&self, name: &str, default: i64) -> i64 {
        match self.query(name) {
            Some(PropertyValue::Int(i)) => *i,
            Some(PropertyValue::Bool(b)) => *b as i64,
            Some(PropertyValue::Float(f)) => *f as i64,
            _ => default,
        }
    }

    pub fn get_float(&self, name: &str, default: f32) -> f32 {
        match self.query(name) {
            Some(PropertyValue::Float(f)) => *f as f32,
            Some(PropertyValue::Int(i)) => *i as f32,
            _ => default,
        }
    }

    /// Point4 values are truncated to their first three components and a
    /// scalar is splatted.
    pub fn get_point3(&self, name: &str, default: [f32; 3]) -> [f32; 3] {
        match self.query(name) {
            Some(PropertyValue::Point3(p)) => *p,
            Some(PropertyValue::Point4(p)) => [p[0], p[1], p[2]],
            Some(PropertyValue::Float(f)) => [*f as f32; 3],
            _ => default,
        }
    }

    pub fn get_point4(&self, name: &str, default: [f32; 4]) -> [f32; 4] {
        match self.query(name) {
            Some(PropertyValue::Point4(p)) => *p,
            Some(PropertyValue::Point3(p)) => [p[0], p[1], p[2], 1.0],
            _ => default,
        }
    }

    pub fn get_string(&self, name: &str) -> Option<&str> {
        match self.query(name) {
            Some(PropertyValue::String(s)) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Tiling {
    #[default]
    Wrap,
    Mirror,
    Clamp,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Filtering {
    #[default]
    Pyramidal,
    SummedArea,
    Nearest,
}

/// Where a bitmap texmap takes its alpha from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AlphaSource {
    #[default]
    ImageAlpha,
    RgbIntensity,
    Opaque,
}

/// Texmap classes the exporter understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TexmapClass<'a> {
    Bitmap,
    NormalBump,
    Other(&'a str),
}

/// A texture map bound to a material slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Texmap {
    /// Host class name, e.g. `Bitmaptexture` or `Normal Bump`.
    pub class_name: String,
    pub path: Option<PathBuf>,
    /// 1-based mapping channel.
    pub map_channel: u32,
    pub u_offset: f32,
    pub v_offset: f32,
    pub u_tiling: f32,
    pub v_tiling: f32,
    /// Rotation around W, in radians.
    pub w_angle: f32,
    pub tiling_u: Tiling,
    pub tiling_v: Tiling,
    pub filtering: Filtering,
    /// Explicit sampling mode; derived from `filtering` when absent.
    pub sampling: Option<SamplingMode>,
    pub alpha_source: AlphaSource,
    /// Independent multiply color applied on top of the bitmap.
    pub tint: Option<[f32; 3]>,
    /// Bump / normal strength.
    pub amount: f32,
    /// Wrapped normal map for `Normal Bump` texmaps.
    pub normal: Option<Box<Texmap>>,
}

impl Default for Texmap {
    fn default() -> Self {
        Self {
            class_name: "Bitmaptexture".to_string(),
            path: None,
            map_channel: 1,
            u_offset: 0.0,
            v_offset: 0.0,
            u_tiling: 1.0,
            v_tiling: 1.0,
            w_angle: 0.0,
            tiling_u: Tiling::Wrap,
            tiling_v: Tiling::Wrap,
            filtering: Filtering::Pyramidal,
            sampling: None,
            alpha_source: AlphaSource::ImageAlpha,
            tint: None,
            amount: 1.0,
            normal: None,
        }
    }
}

impl Texmap {
    pub fn bitmap(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn class(&self) -> TexmapClass<'_> {
        let normalized = self.class_name.to_ascii_lowercase().replace([' ', '_'], "");
        match normalized.as_str() {
            "bitmaptexture" | "bitmap" => TexmapClass::Bitmap,
            "normalbump" | "gnormal" => TexmapClass::NormalBump,
            _ => TexmapClass::Other(&self.class_name),
        }
    }

    /// Content identity of the bitmap behind this texmap.
    pub fn source_path(&self) -> Option<&Path> {
        match self.class() {
            TexmapClass::NormalBump => self.normal.as_deref().and_then(|n| n.source_path()),
            _ => self.path.as_deref(),
        }
    }

    /// 0-based texture coordinate set.
    pub fn coord_index(&self) -> u32 {
        self.map_channel.saturating_sub(1)
    }
}

/// An owned snapshot of one host material.
///
/// Containers (multi/sub-object, double-sided, shell, layered) carry their
/// children in `sub_materials`; empty host slots are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HostMaterial {
    pub id: String,
    pub name: String,
    pub class_id: Option<ClassId>,
    pub class_name: String,
    pub properties: PropertyBag,
    /// The exporter's attribute container, if the material carries one.
    pub attributes: Option<PropertyBag>,
    pub texmaps: BTreeMap<String, Texmap>,
    pub sub_materials: Vec<Option<HostMaterial>>,
    /// Shell materials: id of the sub-material holding the baked result.
    pub baked_material_id: Option<String>,
    /// DirectX shader materials: the material used for offline rendering.
    pub render_material: Option<Box<HostMaterial>>,
}

impl HostMaterial {
    /// Look up a texmap slot.
    ///
    /// Slot names changed between host releases (`base_color_map` became
    /// `Base Color Map`), so lowercase and title-cased variants are tried
    /// after the exact name.
    pub fn texmap(&self, slot: &str) -> Option<&Texmap> {
        if let Some(t) = self.texmaps.get(slot) {
            return Some(t);
        }
        if let Some(t) = self.texmaps.get(&slot.to_lowercase()) {
            return Some(t);
        }
        let title = slot
            .split('_')
            .filter(|s| !s.is_empty())
            .map(|s| {
                let mut chars = s.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        self.texmaps.get(&title)
    }

    pub fn sub_material(&self, index: usize) -> Option<&HostMaterial> {
        self.sub_materials.get(index).and_then(|m| m.as_ref())
    }

    pub fn baked_material(&self) -> Option<&HostMaterial> {
        let id = self.baked_material_id.as_deref()?;
        self.sub_materials.iter().flatten().find(|m| m.id == id)
    }
}

/// A JSON dump of the materials referenced by a host scene, in traversal
/// order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneDump {
    pub materials: Vec<HostMaterial>,
}

impl SceneDump {
    pub fn from_json(json: &str) -> IResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> IResult<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    /// Find a material by id anywhere in the dump, including inside containers.
    pub fn material(&self, id: &str) -> IResult<&HostMaterial> {
        fn find<'a>(m: &'a HostMaterial, id: &str) -> Option<&'a HostMaterial> {
            if m.id == id {
                return Some(m);
            }
            m.sub_materials
                .iter()
                .flatten()
                .chain(m.render_material.as_deref())
                .find_map(|sub| find(sub, id))
        }

        self.materials
            .iter()
            .find_map(|m| find(m, id))
            .ok_or_else(|| failure_from_kind(ErrorKind::MissingMaterial { id: id.to_string() }))
    }
}

/// Default attribute template installed on materials that carry none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeTemplate {
    Standard,
    Physical,
    StandardSurface,
}

/// Side channel to the host for attaching default exporter attributes.
///
/// Calls are fire-and-forget: the exporter never waits on or retries them,
/// and derivation results don't depend on them.
pub trait AttributeInstaller {
    fn install_default_attributes(&mut self, material_id: &str, template: AttributeTemplate);
}

/// Installer that drops every request.
#[derive(Debug, Default)]
pub struct NoopInstaller;

impl AttributeInstaller for NoopInstaller {
    fn install_default_attributes(&mut self, _material_id: &str, _template: AttributeTemplate) {}
}

/// Installer that logs and keeps every request, for hosts that apply them
/// after the export.
#[derive(Debug, Default)]
pub struct RecordingInstaller {
    pub requests: Vec<(String, AttributeTemplate)>,
}

impl AttributeInstaller for RecordingInstaller {
    fn install_default_attributes(&mut self, material_id: &str, template: AttributeTemplate) {
        info!(rank = 2, %material_id, ?template, "requesting default attribute template");
        self.requests.push((material_id.to_string(), template));
    }
}
