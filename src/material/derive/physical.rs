//! Physical material.

use rootcause::Report;

use super::{ClearCoatInputs, Derivation, scale};
use crate::export::{ExportContext, ExportError};
use crate::host::HostMaterial;
use crate::material::{MaterialKind, MaterialRecord};

pub fn derive(material: &HostMaterial, ctx: &mut ExportContext<'_>) -> Result<MaterialRecord, Report<ExportError>> {
    let mut d = Derivation::begin(material, MaterialKind::Physical, ctx);
    let props = d.props();

    d.set_alpha(1.0 - props.get_float("transparency", 0.0));
    d.record.base_color = scale(
        props.get_point3("base_color", [0.5, 0.5, 0.5]),
        props.get_float("base_weight", 1.0),
    );

    let invert_roughness = props.get_bool("roughness_inv", false);
    if !d.record.unlit {
        d.record.metallic = props.get_float("metalness", 0.0);
        let roughness = props.get_float("roughness", 0.0);
        d.record.roughness = if invert_roughness { 1.0 - roughness } else { roughness };

        let emission = props.get_float("emission", 0.0);
        d.set_self_illumination(
            props.get_bool("selfIllumColorOn", true),
            scale(props.get_point3("emit_color", [1.0, 1.0, 1.0]), emission),
            emission,
        );
    }

    d.base_color(ctx, d.texmap("base_color_map"), d.texmap("transparency_map"))?;
    d.metallic_roughness(
        ctx,
        d.texmap("metalness_map"),
        d.texmap("roughness_map"),
        // diffuse roughness slot carries ambient occlusion
        d.texmap("diff_rough_map"),
        invert_roughness,
    )?;
    d.normal(ctx, d.texmap("bump_map"), props.get_float("bump_map_amt", 1.0))?;
    d.emissive(ctx, d.texmap("emit_color_map"))?;

    let coat_roughness_inv = props.get_bool("coat_roughness_inv", false);
    let coat_roughness = props.get_float("coat_roughness", 0.0);
    d.clearcoat(
        ctx,
        ClearCoatInputs {
            weight: props.get_float("coating", 0.0),
            roughness: if coat_roughness_inv { 1.0 - coat_roughness } else { coat_roughness },
            intensity_map: d.texmap("coat_map"),
            roughness_map: d.texmap("coat_rough_map"),
            normal_map: d.texmap("coat_bump_map"),
            invert_roughness: coat_roughness_inv,
        },
    )?;

    Ok(d.finish(ctx))
}
