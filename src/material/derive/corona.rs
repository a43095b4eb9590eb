//! Corona renderer materials.

use rootcause::Report;

use super::{ClearCoatInputs, Derivation, scale};
use crate::export::{ExportContext, ExportError};
use crate::host::HostMaterial;
use crate::material::{MaterialKind, MaterialRecord};

/// `roughnessMode` value for glossiness-based roughness.
const ROUGHNESS_MODE_GLOSSINESS: i64 = 1;

pub fn derive_physical(
    material: &HostMaterial,
    ctx: &mut ExportContext<'_>,
) -> Result<MaterialRecord, Report<ExportError>> {
    let mut d = Derivation::begin(material, MaterialKind::CoronaPhysical, ctx);
    let props = d.props();

    d.record.base_color = scale(
        props.get_point3("baseColor", [0.5, 0.5, 0.5]),
        props.get_float("baseLevel", 1.0),
    );
    d.set_alpha(props.get_point3("opacityColor", [1.0; 3])[0] * props.get_float("opacityLevel", 1.0));

    let glossiness = props.get_int("roughnessMode", 0) == ROUGHNESS_MODE_GLOSSINESS;
    let invert = |v: f32| if glossiness { 1.0 - v } else { v };
    d.record.roughness = invert(props.get_float("baseRoughness", 0.0));
    d.record.metallic = if props.get_int("metalnessMode", 0) != 0 { 1.0 } else { 0.0 };
    if !d.record.unlit {
        d.record.emissive = scale(
            props.get_point3("selfIllumColor", [1.0; 3]),
            props.get_float("selfIllumLevel", 0.0),
        );
    }

    d.clearcoat(
        ctx,
        ClearCoatInputs {
            weight: props.get_float("clearcoatAmount", 0.0),
            roughness: invert(props.get_float("clearcoatRoughness", 0.0)),
            intensity_map: d.texmap("clearcoatAmountTexmap"),
            roughness_map: d.texmap("clearcoatRoughnessTexmap"),
            normal_map: d.texmap("clearcoatBumpTexmap"),
            invert_roughness: glossiness,
        },
    )?;

    d.base_color(ctx, d.texmap("baseTexmap"), d.texmap("opacityTexmap"))?;
    d.metallic_roughness(
        ctx,
        d.texmap("metalnessTexmap"),
        d.texmap("baseRoughnessTexmap"),
        None,
        glossiness,
    )?;
    d.normal(ctx, d.texmap("baseBumpTexmap"), props.get_float("baseBumpMapAmount", 1.0))?;
    d.emissive(ctx, d.texmap("selfIllumTexmap"))?;

    Ok(d.finish(ctx))
}

pub fn derive_legacy(
    material: &HostMaterial,
    ctx: &mut ExportContext<'_>,
) -> Result<MaterialRecord, Report<ExportError>> {
    let mut d = Derivation::begin(material, MaterialKind::CoronaLegacy, ctx);
    let props = d.props();

    d.record.base_color = scale(
        props.get_point3("colorDiffuse", [0.5, 0.5, 0.5]),
        props.get_float("levelDiffuse", 1.0),
    );
    d.set_alpha(props.get_float("levelOpacity", 1.0));
    d.record.metallic = 0.0;
    d.record.roughness = 1.0 - props.get_float("reflectGlossiness", 1.0).clamp(0.0, 1.0);
    if !d.record.unlit {
        d.record.emissive = scale(
            props.get_point3("colorSelfIllum", [1.0; 3]),
            props.get_float("levelSelfIllum", 0.0),
        );
    }

    d.base_color(ctx, d.texmap("texmapDiffuse"), d.texmap("texmapOpacity"))?;
    d.metallic_roughness(ctx, None, d.texmap("texmapReflectGlossiness"), None, true)?;
    d.normal(ctx, d.texmap("texmapBump"), props.get_float("mapamountBump", 1.0))?;
    d.emissive(ctx, d.texmap("texmapSelfIllum"))?;

    Ok(d.finish(ctx))
}

/// Light materials only emit: the emitted color becomes an unlit base color.
pub fn derive_light(material: &HostMaterial, ctx: &mut ExportContext<'_>) -> Result<MaterialRecord, Report<ExportError>> {
    let mut d = Derivation::begin(material, MaterialKind::CoronaLight, ctx);
    let props = d.props();

    let color = scale(
        props.get_point3("color", [1.0; 3]),
        props.get_float("intensity", 1.0),
    );
    d.record.base_color = color.map(|c| c.clamp(0.0, 1.0));
    d.record.unlit = true;

    d.base_color(ctx, d.texmap("texmap"), d.texmap("opacityTexmap"))?;

    Ok(d.finish(ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportOptions;
    use crate::export::diagnostics::Severity;
    use crate::export::testing::{ContextFixture, MemoryBitmaps};
    use crate::host::{PropertyBag, PropertyValue};

    fn fixture() -> ContextFixture {
        ContextFixture::new(ExportOptions::default(), MemoryBitmaps::default())
    }

    #[test]
    fn glossiness_mode_inverts() {
        let mut fx = fixture();
        let material = HostMaterial {
            class_name: "CoronaPhysicalMtl".to_string(),
            properties: PropertyBag::new()
                .with("roughnessMode", PropertyValue::Int(1))
                .with("baseRoughness", PropertyValue::Float(0.75))
                .with("metalnessMode", PropertyValue::Int(1))
                .with("clearcoatAmount", PropertyValue::Float(0.5))
                .with("clearcoatRoughness", PropertyValue::Float(1.0)),
            ..Default::default()
        };
        let record = derive_physical(&material, &mut fx.ctx()).unwrap();
        assert_eq!(record.roughness, 0.25);
        assert_eq!(record.metallic, 1.0);
        let coat = record.clearcoat.unwrap();
        assert_eq!(coat.intensity, 0.5);
        assert_eq!(coat.roughness, 0.0);
    }

    #[test]
    fn legacy_reflection_glossiness() {
        let mut fx = fixture();
        let material = HostMaterial {
            class_name: "CoronaMtl".to_string(),
            properties: PropertyBag::new()
                .with("colorDiffuse", PropertyValue::Point3([1.0, 0.5, 0.0]))
                .with("levelDiffuse", PropertyValue::Float(0.5))
                .with("reflectGlossiness", PropertyValue::Float(0.75)),
            ..Default::default()
        };
        let record = derive_legacy(&material, &mut fx.ctx()).unwrap();
        assert_eq!(record.base_color, [0.5, 0.25, 0.0]);
        assert_eq!(record.roughness, 0.25);
        assert_eq!(record.emissive, [0.0; 3]);
    }

    #[test]
    fn legacy_self_illumination() {
        let mut fx = ContextFixture::new(
            ExportOptions::default(),
            MemoryBitmaps::default().with("glow.png", image::RgbaImage::new(2, 2)),
        );
        let mut material = HostMaterial {
            class_name: "CoronaMtl".to_string(),
            properties: PropertyBag::new()
                .with("colorSelfIllum", PropertyValue::Point3([1.0, 0.5, 0.0]))
                .with("levelSelfIllum", PropertyValue::Float(0.5)),
            ..Default::default()
        };
        material
            .texmaps
            .insert("texmapSelfIllum".to_string(), crate::host::Texmap::bitmap("glow.png"));

        let record = derive_legacy(&material, &mut fx.ctx()).unwrap();
        assert_eq!(record.emissive, [0.5, 0.25, 0.0]);
        assert!(record.emissive_texture.is_some());
    }

    #[test]
    fn light_is_unlit_emission() {
        let mut fx = fixture();
        let material = HostMaterial {
            class_name: "CoronaLightMtl".to_string(),
            properties: PropertyBag::new()
                .with("color", PropertyValue::Point3([1.0, 0.5, 0.25]))
                .with("intensity", PropertyValue::Float(2.0)),
            ..Default::default()
        };
        let record = derive_light(&material, &mut fx.ctx()).unwrap();
        assert!(record.unlit);
        assert!(record.disable_lighting);
        assert_eq!(record.base_color, [1.0, 1.0, 0.5]);
        assert_eq!(record.emissive, record.base_color);
        assert_eq!(fx.diag.count(Severity::Warning), 0);
    }
}
