//! PBR metal/rough, PBR spec/gloss and glTF materials.

use rootcause::Report;

use super::Derivation;
use crate::export::{ExportContext, ExportError};
use crate::host::HostMaterial;
use crate::material::{MaterialKind, MaterialRecord, TransparencyMode};
use crate::recognized::Recognized;

/// Reflectance of dielectrics at normal incidence.
const DIELECTRIC_SPECULAR: f32 = 0.04;

pub fn derive_metal_rough(
    material: &HostMaterial,
    ctx: &mut ExportContext<'_>,
) -> Result<MaterialRecord, Report<ExportError>> {
    let mut d = Derivation::begin(material, MaterialKind::PbrMetalRough, ctx);
    let props = d.props();

    let base = props.get_point4("base_color", [0.5, 0.5, 0.5, 1.0]);
    d.record.base_color = [base[0], base[1], base[2]];
    d.set_alpha(base[3]);

    let use_glossiness = props.get_bool("useGlossiness", false);
    d.record.metallic = props.get_float("metalness", 0.0);
    let roughness = props.get_float("roughness", 0.5);
    d.record.roughness = if use_glossiness { 1.0 - roughness } else { roughness };
    if !d.record.unlit {
        d.record.emissive = props.get_point3("emit_color", [0.0; 3]);
    }

    d.base_color(ctx, d.texmap("base_color_map"), d.texmap("opacity_map"))?;
    d.metallic_roughness(
        ctx,
        d.texmap("metalness_map"),
        d.texmap("roughness_map"),
        d.texmap("ao_map"),
        use_glossiness,
    )?;
    d.normal(ctx, d.texmap("norm_map"), props.get_float("bump_map_amt", 1.0))?;
    d.emissive(ctx, d.texmap("emit_map"))?;

    Ok(d.finish(ctx))
}

fn perceived_brightness(c: [f32; 3]) -> f32 {
    (0.299 * c[0] * c[0] + 0.587 * c[1] * c[1] + 0.114 * c[2] * c[2]).sqrt()
}

/// Metallic value that reproduces `specular` over `diffuse`.
fn solve_metallic(diffuse: f32, specular: f32, one_minus_specular_strength: f32) -> f32 {
    if specular < DIELECTRIC_SPECULAR {
        return 0.0;
    }
    let a = DIELECTRIC_SPECULAR;
    let b = diffuse * one_minus_specular_strength / (1.0 - DIELECTRIC_SPECULAR) + specular
        - 2.0 * DIELECTRIC_SPECULAR;
    let c = DIELECTRIC_SPECULAR - specular;
    let discriminant = (b * b - 4.0 * a * c).max(0.0);
    ((-b + discriminant.sqrt()) / (2.0 * a)).clamp(0.0, 1.0)
}

/// Convert a specular-glossiness diffuse/specular pair to a base color and
/// metallic factor.
pub fn specular_to_metallic(diffuse: [f32; 3], specular: [f32; 3]) -> ([f32; 3], f32) {
    let one_minus = 1.0 - specular.iter().copied().fold(0.0, f32::max);
    let metallic = solve_metallic(perceived_brightness(diffuse), perceived_brightness(specular), one_minus);

    let mut base = [0.0; 3];
    for i in 0..3 {
        let from_diffuse =
            diffuse[i] * one_minus / (1.0 - DIELECTRIC_SPECULAR) / (1.0 - metallic).max(f32::EPSILON);
        let from_specular =
            (specular[i] - DIELECTRIC_SPECULAR * (1.0 - metallic)) / metallic.max(f32::EPSILON);
        let t = metallic * metallic;
        base[i] = (from_diffuse + (from_specular - from_diffuse) * t).clamp(0.0, 1.0);
    }
    (base, metallic)
}

pub fn derive_spec_gloss(
    material: &HostMaterial,
    ctx: &mut ExportContext<'_>,
) -> Result<MaterialRecord, Report<ExportError>> {
    let mut d = Derivation::begin(material, MaterialKind::PbrSpecGloss, ctx);
    let props = d.props();

    let diffuse = props.get_point4("base_color", [0.5, 0.5, 0.5, 1.0]);
    let specular = props.get_point3("Specular", [DIELECTRIC_SPECULAR; 3]);
    let (base, metallic) = specular_to_metallic([diffuse[0], diffuse[1], diffuse[2]], specular);
    d.record.base_color = base;
    d.record.metallic = metallic;
    d.record.roughness = 1.0 - props.get_float("glossiness", 0.5).clamp(0.0, 1.0);
    d.set_alpha(diffuse[3]);
    if !d.record.unlit {
        d.record.emissive = props.get_point3("emit_color", [0.0; 3]);
    }

    if d.texmap("specular_map").is_some() && ctx.options.export_textures {
        ctx.diag.warning(
            2,
            format!(
                "Specular map of {} can't be converted to metallic, the scalar specular is used instead",
                material.name
            ),
        );
    }

    d.base_color(ctx, d.texmap("base_color_map"), d.texmap("opacity_map"))?;
    d.metallic_roughness(ctx, None, d.texmap("glossiness_map"), d.texmap("ao_map"), true)?;
    d.normal(ctx, d.texmap("norm_map"), props.get_float("bump_map_amt", 1.0))?;
    d.emissive(ctx, d.texmap("emit_map"))?;

    Ok(d.finish(ctx))
}

/// glTF alpha modes as stored by the host material.
fn gltf_alpha_mode(raw: i64) -> Recognized<TransparencyMode> {
    match raw {
        1 => Recognized::Known(TransparencyMode::Opaque),
        2 => Recognized::Known(TransparencyMode::AlphaTest),
        3 => Recognized::Known(TransparencyMode::AlphaBlend),
        other => Recognized::Unknown(other),
    }
}

/// glTF materials map onto the output model directly.
pub fn derive_gltf(material: &HostMaterial, ctx: &mut ExportContext<'_>) -> Result<MaterialRecord, Report<ExportError>> {
    let mut d = Derivation::begin(material, MaterialKind::Gltf, ctx);
    let props = d.props();

    let base = props.get_point4("baseColor", [1.0, 1.0, 1.0, 1.0]);
    d.record.base_color = [base[0], base[1], base[2]];
    d.set_alpha(base[3]);
    d.record.metallic = props.get_float("metalness", 1.0);
    d.record.roughness = props.get_float("roughness", 1.0);
    d.record.emissive = props.get_point3("emissionColor", [0.0; 3]);
    if props.get_bool("doubleSided", false) {
        d.record.double_sided = true;
    }
    if props.get_bool("unlit", false) {
        d.record.unlit = true;
    }

    let mode = gltf_alpha_mode(props.get_int("alphaMode", 1)).unwrap_or_else(|raw| {
        ctx.diag.warning(
            2,
            format!("Unknown glTF alpha mode {raw} on {}, exporting as blend", material.name),
        );
        TransparencyMode::AlphaBlend
    });
    let cutoff = props.query("alphaCutoff").map(|_| props.get_float("alphaCutoff", 0.5));
    d.set_transparency_mode(mode, cutoff);

    d.base_color(ctx, d.texmap("baseColorMap"), d.texmap("alphaMap"))?;
    d.metallic_roughness(
        ctx,
        d.texmap("metalnessMap"),
        d.texmap("roughnessMap"),
        d.texmap("occlusionMap"),
        false,
    )?;
    d.normal(ctx, d.texmap("normalMap"), props.get_float("normalScale", 1.0))?;
    d.emissive(ctx, d.texmap("emissionMap"))?;

    Ok(d.finish(ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportOptions;
    use crate::export::testing::{ContextFixture, MemoryBitmaps};
    use crate::host::{PropertyBag, PropertyValue};

    fn fixture() -> ContextFixture {
        ContextFixture::new(ExportOptions::default(), MemoryBitmaps::default())
    }

    #[test]
    fn dielectric_specular_is_not_metallic() {
        let (base, metallic) = specular_to_metallic([0.6, 0.3, 0.1], [0.04, 0.04, 0.04]);
        assert!(metallic < 1e-3);
        // diffuse scaled by the energy left after specular
        assert!((base[0] - 0.6).abs() < 1e-3);
    }

    #[test]
    fn bright_specular_with_black_diffuse_is_metal() {
        let (base, metallic) = specular_to_metallic([0.0, 0.0, 0.0], [0.9, 0.8, 0.6]);
        assert!(metallic > 0.95);
        assert!((base[0] - 0.9).abs() < 0.05);
    }

    #[test]
    fn glossiness_flag_inverts_roughness() {
        let mut fx = fixture();
        let material = HostMaterial {
            class_name: "PBRMetalRough".to_string(),
            properties: PropertyBag::new()
                .with("useGlossiness", PropertyValue::Bool(true))
                .with("roughness", PropertyValue::Float(0.75)),
            ..Default::default()
        };
        let record = derive_metal_rough(&material, &mut fx.ctx()).unwrap();
        assert_eq!(record.roughness, 0.25);
    }

    #[test]
    fn gltf_alpha_mode_is_taken_verbatim() {
        let mut fx = fixture();
        let material = HostMaterial {
            class_name: "glTFMaterial".to_string(),
            properties: PropertyBag::new()
                .with("baseColor", PropertyValue::Point4([1.0, 1.0, 1.0, 0.5]))
                .with("alphaMode", PropertyValue::Int(2))
                .with("alphaCutoff", PropertyValue::Float(0.3)),
            ..Default::default()
        };
        let record = derive_gltf(&material, &mut fx.ctx()).unwrap();
        assert_eq!(record.alpha, 0.5);
        assert_eq!(record.transparency_mode, TransparencyMode::AlphaTest);
        assert_eq!(record.alpha_cutoff, Some(0.3));
    }

    #[test]
    fn gltf_opaque_stays_opaque_with_partial_alpha() {
        let mut fx = fixture();
        let material = HostMaterial {
            class_name: "glTFMaterial".to_string(),
            properties: PropertyBag::new().with("baseColor", PropertyValue::Point4([1.0, 1.0, 1.0, 0.5])),
            ..Default::default()
        };
        let record = derive_gltf(&material, &mut fx.ctx()).unwrap();
        assert_eq!(record.transparency_mode, TransparencyMode::Opaque);
        assert_eq!(record.alpha_cutoff, None);
    }
}
