//! Exporter attribute overrides stored on host materials.

use std::collections::BTreeMap;

use crate::export::diagnostics::Diagnostics;
use crate::host::{AttributeInstaller, AttributeTemplate, HostMaterial, PropertyBag, PropertyValue};
use crate::material::TransparencyMode;

pub const UNLIT: &str = "unlit";
pub const BACKFACE_CULLING: &str = "backfaceCulling";
pub const SEPARATE_CULLING_PASS: &str = "separateCullingPass";
pub const TRANSPARENCY_MODE: &str = "transparencyMode";
pub const MAX_SIMULTANEOUS_LIGHTS: &str = "maxSimultaneousLights";
pub const USE_FACTORS: &str = "useFactors";
pub const DIRECT_INTENSITY: &str = "directIntensity";
pub const EMISSIVE_INTENSITY: &str = "emissiveIntensity";
pub const ENVIRONMENT_INTENSITY: &str = "environmentIntensity";
pub const SPECULAR_INTENSITY: &str = "specularIntensity";

const OVERRIDE_NAMES: &[&str] = &[
    UNLIT,
    BACKFACE_CULLING,
    SEPARATE_CULLING_PASS,
    TRANSPARENCY_MODE,
    MAX_SIMULTANEOUS_LIGHTS,
    USE_FACTORS,
    DIRECT_INTENSITY,
    EMISSIVE_INTENSITY,
    ENVIRONMENT_INTENSITY,
    SPECULAR_INTENSITY,
];

const DEFAULT_MAX_SIMULTANEOUS_LIGHTS: i64 = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeOverrides {
    /// Whether the material carried an attribute container at all.
    pub present: bool,
    pub unlit: bool,
    pub backface_culling: bool,
    pub separate_culling_pass: bool,
    pub transparency_mode: Option<TransparencyMode>,
    pub max_simultaneous_lights: u32,
    /// Keep authored metallic/roughness factors even when a packed texture
    /// is bound.
    pub use_factors: bool,
    pub direct_intensity: f32,
    pub emissive_intensity: f32,
    pub environment_intensity: f32,
    pub specular_intensity: f32,
}

impl Default for AttributeOverrides {
    fn default() -> Self {
        Self {
            present: false,
            unlit: false,
            backface_culling: true,
            separate_culling_pass: false,
            transparency_mode: None,
            max_simultaneous_lights: DEFAULT_MAX_SIMULTANEOUS_LIGHTS as u32,
            use_factors: false,
            direct_intensity: 1.0,
            emissive_intensity: 1.0,
            environment_intensity: 1.0,
            specular_intensity: 1.0,
        }
    }
}

impl AttributeOverrides {
    /// Read overrides from an attribute container.
    pub fn from_bag(bag: &PropertyBag, diag: &mut Diagnostics) -> Self {
        let defaults = Self::default();

        let transparency_mode = bag.query(TRANSPARENCY_MODE).map(|_| {
            let raw = bag.get_int(TRANSPARENCY_MODE, 0);
            TransparencyMode::from_raw(raw).unwrap_or_else(|raw| {
                diag.warning(
                    3,
                    format!("Unknown transparency mode {raw}, exporting as {}", TransparencyMode::AlphaBlend),
                );
                TransparencyMode::AlphaBlend
            })
        });

        // the host UI slider can store values outside its displayed range
        let max_lights = bag
            .get_int(MAX_SIMULTANEOUS_LIGHTS, DEFAULT_MAX_SIMULTANEOUS_LIGHTS)
            .clamp(1, 100);

        Self {
            present: true,
            unlit: bag.get_bool(UNLIT, defaults.unlit),
            backface_culling: bag.get_bool(BACKFACE_CULLING, defaults.backface_culling),
            separate_culling_pass: bag.get_bool(SEPARATE_CULLING_PASS, defaults.separate_culling_pass),
            transparency_mode,
            max_simultaneous_lights: max_lights as u32,
            use_factors: bag.get_bool(USE_FACTORS, defaults.use_factors),
            direct_intensity: bag.get_float(DIRECT_INTENSITY, defaults.direct_intensity),
            emissive_intensity: bag.get_float(EMISSIVE_INTENSITY, defaults.emissive_intensity),
            environment_intensity: bag.get_float(ENVIRONMENT_INTENSITY, defaults.environment_intensity),
            specular_intensity: bag.get_float(SPECULAR_INTENSITY, defaults.specular_intensity),
        }
    }

    /// `true` when the transparency override says the material is opaque. The
    /// host transparency and opacity maps are then ignored.
    pub fn forces_opaque(&self) -> bool {
        self.transparency_mode == Some(TransparencyMode::Opaque)
    }
}

/// Resolve the overrides of `material`.
///
/// A material without an attribute container gets the defaults, and
/// `installer` is asked to attach the template for its kind so the next
/// export finds one.
pub fn resolve(
    material: &HostMaterial,
    template: Option<AttributeTemplate>,
    installer: &mut dyn AttributeInstaller,
    diag: &mut Diagnostics,
) -> AttributeOverrides {
    match &material.attributes {
        Some(bag) => AttributeOverrides::from_bag(bag, diag),
        None => {
            diag.verbose(2, format!("{} has no exporter attributes", material.name));
            if let Some(template) = template {
                installer.install_default_attributes(&material.id, template);
            }
            AttributeOverrides::default()
        }
    }
}

/// Attribute properties that aren't overrides, exported as free-form
/// metadata.
pub fn metadata(material: &HostMaterial) -> BTreeMap<String, serde_json::Value> {
    let Some(bag) = &material.attributes else {
        return BTreeMap::new();
    };
    bag.iter()
        .filter(|(name, _)| !OVERRIDE_NAMES.contains(&name.as_str()))
        .map(|(name, value)| (name.clone(), property_to_json(value)))
        .collect()
}

fn property_to_json(value: &PropertyValue) -> serde_json::Value {
    use serde_json::Value;
    match value {
        PropertyValue::Bool(b) => Value::Bool(*b),
        PropertyValue::Int(i) => Value::from(*i),
        PropertyValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        PropertyValue::Point3(p) => Value::from(p.to_vec()),
        PropertyValue::Point4(p) => Value::from(p.to_vec()),
        PropertyValue::String(s) => Value::String(s.clone()),
    }
}
