//! Mapping of host shading parameters onto the canonical metallic-roughness
//! [`MaterialRecord`], one module per material family.

use rootcause::Report;

use crate::export::packer::{self, OrmInputs};
use crate::export::texture::ChannelLayout;
use crate::export::{ExportContext, ExportError};
use crate::host::{HostMaterial, Texmap};
use crate::material::attributes::{self, AttributeOverrides};
use crate::material::{ClearCoat, MaterialKind, MaterialRecord, TransparencyMode};

pub mod corona;
pub mod pbr;
pub mod physical;
pub mod standard;
pub mod standard_surface;

/// Host self-illumination colors are scaled by 1/π.
pub const SELF_ILLUM_SCALE: f32 = std::f32::consts::FRAC_1_PI;
/// Roughness written for unlit materials.
pub const UNLIT_ROUGHNESS: f32 = 0.9;
/// glTF default cutoff, written explicitly for alpha-tested materials.
pub const ALPHA_CUTOFF: f32 = 0.5;

/// Derive the record of a leaf material of `kind`.
pub fn derive(
    kind: MaterialKind,
    material: &HostMaterial,
    ctx: &mut ExportContext<'_>,
) -> Result<MaterialRecord, Report<ExportError>> {
    match kind {
        MaterialKind::Standard => standard::derive(material, ctx),
        MaterialKind::Physical => physical::derive(material, ctx),
        MaterialKind::PbrMetalRough => pbr::derive_metal_rough(material, ctx),
        MaterialKind::PbrSpecGloss => pbr::derive_spec_gloss(material, ctx),
        MaterialKind::Gltf => pbr::derive_gltf(material, ctx),
        MaterialKind::StandardSurface => standard_surface::derive(material, ctx),
        MaterialKind::CoronaPhysical => corona::derive_physical(material, ctx),
        MaterialKind::CoronaLegacy => corona::derive_legacy(material, ctx),
        MaterialKind::CoronaLight => corona::derive_light(material, ctx),
        MaterialKind::Shell
        | MaterialKind::DirectXShader
        | MaterialKind::Multi
        | MaterialKind::DoubleSided
        | MaterialKind::CoronaLayered
        | MaterialKind::Custom => Err(Report::new(ExportError::Classify {
            id: material.id.clone(),
            reason: format!("{kind} materials have no channel derivation"),
        })),
    }
}

pub(crate) fn scale(color: [f32; 3], factor: f32) -> [f32; 3] {
    color.map(|c| c * factor)
}

/// Clearcoat parameters read from a host material.
#[derive(Debug, Clone, Copy)]
pub struct ClearCoatInputs<'a> {
    pub weight: f32,
    /// Final roughness, already inverted when `invert_roughness` is set.
    pub roughness: f32,
    pub intensity_map: Option<&'a Texmap>,
    pub roughness_map: Option<&'a Texmap>,
    pub normal_map: Option<&'a Texmap>,
    pub invert_roughness: bool,
}

/// A material record under construction.
///
/// The per-kind modules fill in factors and request textures; [`finish`]
/// then applies the rules every kind shares.
///
/// [`finish`]: Derivation::finish
pub struct Derivation<'m> {
    pub material: &'m HostMaterial,
    pub record: MaterialRecord,
    pub overrides: AttributeOverrides,
    multiply_color: Option<[f32; 3]>,
    base_has_alpha: bool,
    /// The host authored the transparency mode itself.
    authored_transparency: bool,
}

impl<'m> Derivation<'m> {
    pub fn begin(material: &'m HostMaterial, kind: MaterialKind, ctx: &mut ExportContext<'_>) -> Self {
        ctx.diag.verbose(2, format!("Derive {kind} material {}", material.name));
        let overrides = attributes::resolve(material, kind.attribute_template(), ctx.installer, ctx.diag);

        let mut record = MaterialRecord::new(&material.id, &material.name, kind);
        record.unlit = overrides.unlit;
        record.double_sided = !overrides.backface_culling;
        record.metadata = attributes::metadata(material);
        if let Some(mode) = overrides.transparency_mode {
            record.transparency_mode = mode;
        }

        Self {
            material,
            record,
            overrides,
            multiply_color: None,
            base_has_alpha: false,
            authored_transparency: false,
        }
    }

    pub fn props(&self) -> &'m crate::host::PropertyBag {
        &self.material.properties
    }

    pub fn texmap(&self, slot: &str) -> Option<&'m Texmap> {
        self.material.texmap(slot)
    }

    /// Host transparency and opacity maps are ignored when the transparency
    /// override forces the material opaque.
    pub fn reads_opacity(&self) -> bool {
        !self.overrides.forces_opaque()
    }

    pub fn set_alpha(&mut self, alpha: f32) {
        if self.reads_opacity() {
            self.record.alpha = alpha.clamp(0.0, 1.0);
        }
    }

    /// Use a transparency mode authored on the host material instead of
    /// inferring one. The attribute override still wins.
    pub fn set_transparency_mode(&mut self, mode: TransparencyMode, cutoff: Option<f32>) {
        if self.overrides.transparency_mode.is_some() {
            return;
        }
        self.record.transparency_mode = mode;
        self.record.alpha_cutoff = cutoff;
        self.authored_transparency = true;
    }

    /// Host self-illumination: either an explicit color, or a fraction of the
    /// diffuse color.
    pub fn set_self_illumination(&mut self, uses_color: bool, color: [f32; 3], amount: f32) {
        if self.record.unlit {
            return;
        }
        self.record.emissive = if uses_color {
            scale(color, SELF_ILLUM_SCALE)
        } else {
            scale(self.record.base_color, amount)
        };
        if self.record.emissive.iter().any(|c| *c != 0.0) {
            self.record.link_emissive_with_diffuse = !uses_color;
            self.record.use_emissive_as_illumination = uses_color;
        }
    }

    fn exports_textures(&self, ctx: &ExportContext<'_>) -> bool {
        ctx.options.export_textures
    }

    /// Lit-only channels are skipped for unlit materials.
    fn exports_shading(&self, ctx: &ExportContext<'_>) -> bool {
        self.exports_textures(ctx) && !self.record.unlit
    }

    /// Base color texture, with `alpha` merged into it when opacity is read.
    pub fn base_color(
        &mut self,
        ctx: &mut ExportContext<'_>,
        color: Option<&Texmap>,
        alpha: Option<&Texmap>,
    ) -> Result<(), Report<ExportError>> {
        if !self.exports_textures(ctx) {
            return Ok(());
        }
        let alpha = alpha.filter(|_| self.reads_opacity());
        let out = packer::pack_base_color_alpha(ctx, color, alpha, self.record.base_color)?;
        self.record.base_color_texture = out.texture;
        self.multiply_color = out.multiply_color;
        self.base_has_alpha = out.has_alpha;
        Ok(())
    }

    pub fn metallic_roughness(
        &mut self,
        ctx: &mut ExportContext<'_>,
        metallic: Option<&Texmap>,
        roughness: Option<&Texmap>,
        occlusion: Option<&Texmap>,
        invert_roughness: bool,
    ) -> Result<(), Report<ExportError>> {
        if !self.exports_shading(ctx) {
            return Ok(());
        }
        let out = packer::pack_orm(
            ctx,
            &OrmInputs {
                metallic,
                roughness,
                occlusion,
                metallic_factor: self.record.metallic,
                roughness_factor: self.record.roughness,
                invert_roughness,
                use_factors: self.overrides.use_factors,
            },
        )?;
        self.record.metallic_roughness_texture = out.metallic_roughness;
        self.record.occlusion_texture = out.occlusion;
        self.record.metallic = out.metallic_factor;
        self.record.roughness = out.roughness_factor;
        Ok(())
    }

    pub fn normal(
        &mut self,
        ctx: &mut ExportContext<'_>,
        texmap: Option<&Texmap>,
        level: f32,
    ) -> Result<(), Report<ExportError>> {
        if !self.exports_shading(ctx) {
            return Ok(());
        }
        self.record.normal_texture = packer::export_texmap(ctx, texmap, ChannelLayout::Normal, Some(level))?;
        Ok(())
    }

    pub fn emissive(&mut self, ctx: &mut ExportContext<'_>, texmap: Option<&Texmap>) -> Result<(), Report<ExportError>> {
        if !self.exports_shading(ctx) {
            return Ok(());
        }
        self.record.emissive_texture = packer::export_texmap(ctx, texmap, ChannelLayout::Color, None)?;
        Ok(())
    }

    /// `KHR_materials_clearcoat`, enabled when the coat weight is positive.
    pub fn clearcoat(
        &mut self,
        ctx: &mut ExportContext<'_>,
        inputs: ClearCoatInputs<'_>,
    ) -> Result<(), Report<ExportError>> {
        if inputs.weight <= 0.0 || self.record.unlit {
            return Ok(());
        }

        let mut coat = ClearCoat {
            intensity: inputs.weight.min(1.0),
            roughness: inputs.roughness.clamp(0.0, 1.0),
            texture: None,
            normal_texture: None,
        };
        if self.exports_textures(ctx) {
            coat.texture = packer::pack_clearcoat(
                ctx,
                inputs.intensity_map,
                inputs.roughness_map,
                coat.intensity,
                coat.roughness,
                inputs.invert_roughness,
            )?;
            if coat.texture.is_some() {
                coat.intensity = 1.0;
                coat.roughness = 1.0;
            }
            coat.normal_texture = packer::export_texmap(ctx, inputs.normal_map, ChannelLayout::Normal, None)?;
        }
        self.record.clearcoat = Some(coat);
        Ok(())
    }

    /// Apply the shared rules and hand back the record.
    pub fn finish(mut self, ctx: &mut ExportContext<'_>) -> MaterialRecord {
        let record = &mut self.record;

        if record.base_color_texture.is_some() {
            record.base_color = self.multiply_color.unwrap_or([1.0, 1.0, 1.0]);
        }

        if record.emissive_texture.is_some() {
            record.emissive = [1.0, 1.0, 1.0];
        }

        if self.overrides.transparency_mode.is_none()
            && !self.authored_transparency
            && (record.alpha != 1.0 || self.base_has_alpha)
        {
            record.transparency_mode = TransparencyMode::AlphaBlend;
        }

        if record.unlit {
            if record.emissive.iter().any(|c| *c != 0.0) || record.emissive_texture.is_some() {
                ctx.diag.warning(
                    2,
                    format!(
                        "Material {} is unlit. Emission is discarded and replaced by the base color.",
                        record.name
                    ),
                );
            }
            record.metallic = 0.0;
            record.roughness = UNLIT_ROUGHNESS;
            record.metallic_roughness_texture = None;
            record.occlusion_texture = None;
            record.emissive = record.base_color;
            record.emissive_texture = record.base_color_texture.clone();
            record.disable_lighting = true;
            record.link_emissive_with_diffuse = false;
            record.use_emissive_as_illumination = false;
        }

        if record.transparency_mode == TransparencyMode::AlphaTest {
            record.alpha_cutoff = Some(record.alpha_cutoff.unwrap_or(ALPHA_CUTOFF));
        } else {
            record.alpha_cutoff = None;
        }

        record.overrides = self.overrides;
        self.record
    }
}
