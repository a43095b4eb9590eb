//! Arnold standard surface.

use rootcause::Report;

use super::{ClearCoatInputs, Derivation, scale};
use crate::export::{ExportContext, ExportError};
use crate::host::HostMaterial;
use crate::material::{MaterialKind, MaterialRecord};

pub fn derive(material: &HostMaterial, ctx: &mut ExportContext<'_>) -> Result<MaterialRecord, Report<ExportError>> {
    let mut d = Derivation::begin(material, MaterialKind::StandardSurface, ctx);
    let props = d.props();

    // opacity is a color; its red channel is the alpha
    d.set_alpha(props.get_point3("opacity", [1.0, 1.0, 1.0])[0]);
    d.record.base_color = scale(
        props.get_point3("base_color", [0.8, 0.8, 0.8]),
        props.get_float("base", 1.0),
    );
    d.record.metallic = props.get_float("metalness", 0.0);
    d.record.roughness = props.get_float("specular_roughness", 0.2);

    let emission = props.get_float("emission", 0.0);
    if emission > 0.0 && !d.record.unlit {
        d.record.emissive = scale(props.get_point3("emission_color", [1.0, 1.0, 1.0]), emission);
    }

    d.clearcoat(
        ctx,
        ClearCoatInputs {
            weight: props.get_float("coat", 0.0),
            roughness: props.get_float("coat_roughness", 0.1),
            intensity_map: d.texmap("coat"),
            roughness_map: d.texmap("coat_roughness"),
            normal_map: d.texmap("coat_normal"),
            invert_roughness: false,
        },
    )?;

    d.base_color(ctx, d.texmap("base_color"), d.texmap("opacity"))?;
    d.metallic_roughness(ctx, d.texmap("metalness"), d.texmap("specular_roughness"), None, false)?;
    d.normal(ctx, d.texmap("normal"), 1.0)?;
    d.emissive(ctx, d.texmap("emission"))?;

    Ok(d.finish(ctx))
}
