//! Legacy standard material.

use rootcause::Report;

use super::Derivation;
use crate::export::{ExportContext, ExportError};
use crate::host::HostMaterial;
use crate::material::{MaterialKind, MaterialRecord};

const DEFAULT_DIFFUSE: [f32; 3] = [0.5, 0.5, 0.5];
const DEFAULT_GLOSSINESS: f32 = 0.1;

pub fn derive(material: &HostMaterial, ctx: &mut ExportContext<'_>) -> Result<MaterialRecord, Report<ExportError>> {
    let mut d = Derivation::begin(material, MaterialKind::Standard, ctx);
    let props = d.props();

    // the host stores transparency, not opacity
    d.set_alpha(1.0 - props.get_float("transparency", 0.0));
    d.record.base_color = props.get_point3("diffuse", DEFAULT_DIFFUSE);
    d.record.metallic = 0.0;
    d.record.roughness = 1.0 - props.get_float("glossiness", DEFAULT_GLOSSINESS).clamp(0.0, 1.0);
    if props.get_bool("twoSided", false) {
        d.record.double_sided = true;
    }
    d.set_self_illumination(
        props.get_bool("selfIllumColorOn", false),
        props.get_point3("selfIllumColor", [0.0; 3]),
        props.get_float("selfIllum", 0.0),
    );

    d.base_color(ctx, d.texmap("diffuse"), d.texmap("opacity"))?;
    d.metallic_roughness(ctx, None, d.texmap("glossiness"), None, true)?;
    let bump = d.texmap("bump");
    d.normal(ctx, bump, bump.map(|t| t.amount).unwrap_or(1.0))?;
    d.emissive(ctx, d.texmap("selfIllumination"))?;

    Ok(d.finish(ctx))
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};

    use super::*;
    use crate::export::ExportOptions;
    use crate::export::testing::{ContextFixture, MemoryBitmaps};
    use crate::host::{AttributeTemplate, PropertyBag, PropertyValue, Texmap};
    use crate::material::TransparencyMode;
    use crate::material::attributes::TRANSPARENCY_MODE;

    fn standard(transparency: f32, attributes: Option<PropertyBag>) -> HostMaterial {
        HostMaterial {
            id: "std-1".to_string(),
            name: "Red".to_string(),
            class_name: "Standardmaterial".to_string(),
            properties: PropertyBag::new()
                .with("diffuse", PropertyValue::Point3([0.8, 0.2, 0.2]))
                .with("transparency", PropertyValue::Float(transparency as f64)),
            attributes,
            ..Default::default()
        }
    }

    fn with_opacity_map(mut material: HostMaterial) -> HostMaterial {
        material
            .texmaps
            .insert("opacity".to_string(), Texmap::bitmap("mask.png"));
        material
    }

    fn mode(raw: i64) -> Option<PropertyBag> {
        Some(PropertyBag::new().with(TRANSPARENCY_MODE, PropertyValue::Int(raw)))
    }

    fn fixture() -> ContextFixture {
        ContextFixture::new(
            ExportOptions::default(),
            MemoryBitmaps::default().with("mask.png", RgbaImage::from_pixel(2, 2, Rgba([128, 128, 128, 255]))),
        )
    }

    #[test]
    fn plain_transparent_standard_material() {
        let mut fx = fixture();
        let record = derive(&standard(0.3, None), &mut fx.ctx()).unwrap();

        assert!((record.alpha - 0.7).abs() < 1e-6);
        assert_eq!(record.transparency_mode, TransparencyMode::AlphaBlend);
        assert_eq!(record.base_color, [0.8, 0.2, 0.2]);
        assert_eq!(record.texture_count(), 0);
        assert!(fx.doc.root().textures.is_empty());
        assert_eq!(
            fx.installer.requests,
            vec![("std-1".to_string(), AttributeTemplate::Standard)]
        );
    }

    #[test]
    fn no_override_reads_transparency() {
        let mut fx = fixture();
        let record = derive(&with_opacity_map(standard(0.25, None)), &mut fx.ctx()).unwrap();
        assert_eq!(record.alpha, 0.75);
        assert!(record.base_color_texture.is_some());
        assert_eq!(record.transparency_mode, TransparencyMode::AlphaBlend);
    }

    #[test]
    fn opaque_override_ignores_transparency_and_opacity_map() {
        let mut fx = fixture();
        let record = derive(&with_opacity_map(standard(0.25, mode(0))), &mut fx.ctx()).unwrap();
        assert_eq!(record.alpha, 1.0);
        assert!(record.base_color_texture.is_none());
        assert_eq!(record.transparency_mode, TransparencyMode::Opaque);
        assert!(fx.bitmaps.encoded().is_empty());
    }

    #[test]
    fn blend_override_reads_transparency_and_opacity_map() {
        let mut fx = fixture();
        let record = derive(&with_opacity_map(standard(0.25, mode(2))), &mut fx.ctx()).unwrap();
        assert_eq!(record.alpha, 0.75);
        assert!(record.base_color_texture.is_some());
        assert_eq!(record.transparency_mode, TransparencyMode::AlphaBlend);
        // alpha merged with the flat diffuse color
        assert_eq!(fx.bitmaps.encoded()[0].get_pixel(0, 0), &Rgba([204, 51, 51, 128]));
    }

    #[test]
    fn glossiness_becomes_roughness() {
        let mut fx = fixture();
        let mut material = standard(0.0, None);
        material.properties = material.properties.with("glossiness", PropertyValue::Float(0.25));
        let record = derive(&material, &mut fx.ctx()).unwrap();
        assert_eq!(record.roughness, 0.75);
        assert_eq!(record.transparency_mode, TransparencyMode::Opaque);
    }
}
