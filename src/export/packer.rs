//! Channel packing: occlusion / roughness / metallic, base color / alpha and
//! clearcoat intensity / roughness.

use image::{Rgba, RgbaImage};
use rootcause::Report;

use super::texture::{
    ChannelLayout, TextureBinding, TextureReference, UvTransform, file_stem, normalize_path,
};
use super::{ExportContext, ExportError};
use crate::host::{AlphaSource, Texmap, TexmapClass};

/// Export the bitmap behind a single texmap slot.
///
/// `level` is the normal map strength; other slots pass `None`.
pub fn export_texmap(
    ctx: &mut ExportContext<'_>,
    texmap: Option<&Texmap>,
    layout: ChannelLayout,
    level: Option<f32>,
) -> Result<Option<TextureBinding>, Report<ExportError>> {
    let Some(texmap) = texmap else {
        return Ok(None);
    };
    let Some(mut tex) = reference(ctx, texmap) else {
        return Ok(None);
    };
    if let Some(level) = level {
        tex.level = level;
    }
    ctx.export_texture(&tex, layout)
}

/// Texture reference for `texmap`, warning about texmaps that can't be
/// exported.
fn reference(ctx: &mut ExportContext<'_>, texmap: &Texmap) -> Option<TextureReference> {
    if let TexmapClass::Other(class) = texmap.class() {
        ctx.diag
            .warning(3, format!("Texture type is not supported: {class}. Use a Bitmap instead."));
        return None;
    }
    let tex = TextureReference::from_texmap(texmap);
    if tex.is_none() {
        ctx.diag.warning(3, "Texture path is missing.");
    }
    tex
}

/// Load the bitmap behind `texmap`. Anything that can't be loaded is
/// reported and treated as absent.
fn load_pixels(ctx: &mut ExportContext<'_>, texmap: &Texmap, channel: &str) -> Option<RgbaImage> {
    let tex = reference(ctx, texmap)?;
    let path = tex.source.path()?;
    match ctx.bitmaps.load(path) {
        Ok(pixels) => Some(pixels),
        Err(e) => {
            ctx.diag.warning(
                3,
                format!("{channel} map could not be loaded, using its factor instead: {e}"),
            );
            None
        }
    }
}

/// Smallest size shared by all `images`. Mismatched sizes are reported as
/// an error but don't stop the merge.
fn common_size(ctx: &mut ExportContext<'_>, name: &str, images: &[Option<&RgbaImage>]) -> Option<(u32, u32)> {
    let sizes: Vec<(u32, u32)> = images.iter().flatten().map(|i| i.dimensions()).collect();
    let first = *sizes.first()?;
    let width = sizes.iter().map(|s| s.0).min().unwrap_or(first.0);
    let height = sizes.iter().map(|s| s.1).min().unwrap_or(first.1);
    if sizes.iter().any(|s| *s != first) {
        ctx.diag.error(
            2,
            format!(
                "Maps merged into {name} have different sizes ({}), merging at {width}x{height}",
                sizes
                    .iter()
                    .map(|(w, h)| format!("{w}x{h}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        );
    }
    Some((width, height))
}

fn unit_to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn source_key(texmap: Option<&Texmap>) -> Option<String> {
    texmap.and_then(|t| t.source_path()).map(normalize_path)
}

fn same_source(a: &Texmap, b: &Texmap) -> bool {
    match (a.source_path(), b.source_path()) {
        (Some(a), Some(b)) => normalize_path(a) == normalize_path(b),
        _ => false,
    }
}

/// Name part for one packed channel: the stem of the map that was loaded
/// for it, or the byte value its factor fills the channel with.
fn channel_part(texmap: Option<&Texmap>, loaded: bool, factor: f32, inverted: bool) -> String {
    match texmap.and_then(|t| t.source_path()).filter(|_| loaded) {
        Some(path) if inverted => format!("{}-inv", file_stem(path)),
        Some(path) => file_stem(path),
        None => format!("{:03}", unit_to_byte(factor)),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OrmInputs<'a> {
    pub metallic: Option<&'a Texmap>,
    pub roughness: Option<&'a Texmap>,
    pub occlusion: Option<&'a Texmap>,
    pub metallic_factor: f32,
    /// Final roughness, already inverted when `invert_roughness` is set.
    pub roughness_factor: f32,
    /// The roughness map stores glossiness.
    pub invert_roughness: bool,
    /// Keep the factors as authored when a packed texture is bound.
    pub use_factors: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrmOutput {
    pub metallic_roughness: Option<TextureBinding>,
    pub occlusion: Option<TextureBinding>,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    /// The metallic and roughness maps were one file, exported as is.
    pub already_merged: bool,
}

/// Merge metallic, roughness and (optionally) occlusion into one
/// glTF metallic-roughness texture: occlusion in R, roughness in G and
/// metallic in B.
pub fn pack_orm(
    ctx: &mut ExportContext<'_>,
    inputs: &OrmInputs<'_>,
) -> Result<OrmOutput, Report<ExportError>> {
    let mut out = OrmOutput {
        metallic_roughness: None,
        occlusion: None,
        metallic_factor: inputs.metallic_factor,
        roughness_factor: inputs.roughness_factor,
        already_merged: false,
    };
    let merge_occlusion = ctx.options.merge_occlusion;

    match (inputs.metallic, inputs.roughness) {
        (Some(metallic), Some(roughness)) if same_source(metallic, roughness) => {
            ctx.diag.verbose(2, "Metallic and roughness are already merged");
            let merged = export_texmap(ctx, Some(metallic), ChannelLayout::Packed, None)?;
            if let (Some(occlusion), Some(_)) = (inputs.occlusion, &merged) {
                if merge_occlusion && same_source(metallic, occlusion) {
                    ctx.diag.verbose(2, "Occlusion is already merged as well");
                    if let Some(reference) = TextureReference::from_texmap(metallic) {
                        out.occlusion = occlusion_from_merged(ctx, &reference, occlusion, &merged)?;
                    }
                }
            }
            out.already_merged = merged.is_some();
            out.metallic_roughness = merged;
        }
        (None, None) => {}
        _ => {
            ctx.diag
                .verbose(2, "Merge metallic and roughness (and occlusion if enabled)");
            let occlusion = inputs.occlusion.filter(|_| merge_occlusion);
            if let Some(merged) = synthesize_orm(ctx, inputs, occlusion)? {
                let binding = ctx.export_texture(&merged, ChannelLayout::Packed)?;
                if let (Some(occlusion), Some(_)) = (occlusion, &binding) {
                    out.occlusion = occlusion_from_merged(ctx, &merged, occlusion, &binding)?;
                }
                out.metallic_roughness = binding;
            }
        }
    }

    if let Some(occlusion) = inputs.occlusion {
        if out.occlusion.is_none() {
            ctx.diag.verbose(2, "Export occlusion texture on its own");
            out.occlusion = export_texmap(ctx, Some(occlusion), ChannelLayout::Single, None)?;
        }
    }

    if out.metallic_roughness.is_some() && !inputs.use_factors {
        // a channel nothing contributes to must read as exactly zero, even if
        // lossy compression left noise in it
        let merged = out.already_merged;
        let has = |map: Option<&Texmap>, factor: f32| merged || map.is_some() || factor != 0.0;
        out.metallic_factor = if has(inputs.metallic, inputs.metallic_factor) { 1.0 } else { 0.0 };
        out.roughness_factor = if has(inputs.roughness, inputs.roughness_factor) { 1.0 } else { 0.0 };
    }

    Ok(out)
}

/// Occlusion sampled from the merged texture. An occlusion map on another
/// coordinate set, or with another UV transform, gets its own binding to
/// the same pixels.
fn occlusion_from_merged(
    ctx: &mut ExportContext<'_>,
    merged: &TextureReference,
    occlusion: &Texmap,
    binding: &Option<TextureBinding>,
) -> Result<Option<TextureBinding>, Report<ExportError>> {
    let transform = UvTransform::from_texmap(occlusion);
    if occlusion.coord_index() == merged.coord_index && transform == merged.transform {
        return Ok(binding.clone());
    }
    let mut tex = merged.clone();
    tex.coord_index = occlusion.coord_index();
    tex.transform = transform;
    ctx.export_texture(&tex, ChannelLayout::Packed)
}

fn synthesize_orm(
    ctx: &mut ExportContext<'_>,
    inputs: &OrmInputs<'_>,
    occlusion: Option<&Texmap>,
) -> Result<Option<TextureReference>, Report<ExportError>> {
    let metallic = inputs.metallic.and_then(|t| load_pixels(ctx, t, "Metallic"));
    let roughness = inputs.roughness.and_then(|t| load_pixels(ctx, t, "Roughness"));
    let ao = occlusion.and_then(|t| load_pixels(ctx, t, "Occlusion"));

    let name = [
        occlusion.map(|o| channel_part(Some(o), ao.is_some(), 1.0, false)),
        Some(channel_part(
            inputs.roughness,
            roughness.is_some(),
            inputs.roughness_factor,
            inputs.invert_roughness,
        )),
        Some(channel_part(inputs.metallic, metallic.is_some(), inputs.metallic_factor, false)),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join("_");

    let Some((width, height)) = common_size(ctx, &name, &[metallic.as_ref(), roughness.as_ref(), ao.as_ref()])
    else {
        // nothing loaded: the factors carry the channels
        return Ok(None);
    };

    let roughness_default = unit_to_byte(inputs.roughness_factor);
    let metallic_default = unit_to_byte(inputs.metallic_factor);
    let pixels = RgbaImage::from_fn(width, height, |x, y| {
        let r = ao.as_ref().map(|i| i.get_pixel(x, y)[0]).unwrap_or(255);
        let g = roughness
            .as_ref()
            .map(|i| {
                let v = i.get_pixel(x, y)[0];
                if inputs.invert_roughness { 255 - v } else { v }
            })
            .unwrap_or(roughness_default);
        let b = metallic
            .as_ref()
            .map(|i| i.get_pixel(x, y)[0])
            .unwrap_or(metallic_default);
        Rgba([r, g, b, 255])
    });

    // every input that shaped the pixels is part of the identity
    let key = format!(
        "orm|{}|{}|{}|{}|{}",
        ao.as_ref()
            .and(source_key(occlusion))
            .unwrap_or_else(|| "1".to_string()),
        roughness
            .as_ref()
            .and(source_key(inputs.roughness))
            .unwrap_or_else(|| format!("{roughness_default}")),
        metallic
            .as_ref()
            .and(source_key(inputs.metallic))
            .unwrap_or_else(|| format!("{metallic_default}")),
        inputs.invert_roughness,
        width * 65536 + height,
    );

    let template = inputs.metallic.or(inputs.roughness);
    Ok(Some(TextureReference::synthesized(
        name,
        key,
        pixels,
        template,
    )))
}

#[derive(Debug, Clone, PartialEq)]
pub struct BaseColorOutput {
    pub texture: Option<TextureBinding>,
    /// Multiply color carried by the color texmap, to be used as the base
    /// color factor.
    pub multiply_color: Option<[f32; 3]>,
    pub has_alpha: bool,
}

/// Base color texture with the alpha map folded into its alpha channel.
///
/// A color map without a separate alpha map is exported as is. Otherwise an
/// RGBA bitmap is synthesized: RGB from the color map (or `base_color` when
/// there is none), alpha from the alpha map.
pub fn pack_base_color_alpha(
    ctx: &mut ExportContext<'_>,
    color: Option<&Texmap>,
    alpha: Option<&Texmap>,
    base_color: [f32; 3],
) -> Result<BaseColorOutput, Report<ExportError>> {
    let multiply_color = color.and_then(|c| c.tint);
    let mut out = BaseColorOutput {
        texture: None,
        multiply_color,
        has_alpha: false,
    };

    let alpha_pixels = alpha.and_then(|a| load_pixels(ctx, a, "Opacity"));
    let (Some(alpha), Some(alpha_pixels)) = (alpha, alpha_pixels) else {
        let Some(color) = color else {
            return Ok(out);
        };
        let Some(mut tex) = reference(ctx, color) else {
            return Ok(out);
        };
        tex.base_color_path = Some(tex.source.identity());
        out.has_alpha = tex.has_alpha;
        out.texture = ctx.export_texture(&tex, ChannelLayout::Color)?;
        if out.texture.is_none() {
            out.has_alpha = false;
        }
        return Ok(out);
    };

    let color_pixels = color.and_then(|c| load_pixels(ctx, c, "Base color"));
    let color_part = match color.and_then(|c| c.source_path()) {
        Some(path) if color_pixels.is_some() => file_stem(path),
        _ => base_color
            .iter()
            .map(|c| format!("{:02x}", unit_to_byte(*c)))
            .collect(),
    };
    let alpha_part = alpha.source_path().map(file_stem).unwrap_or_default();
    let name = format!("{color_part}_{alpha_part}");

    let Some((width, height)) = common_size(ctx, &name, &[color_pixels.as_ref(), Some(&alpha_pixels)])
    else {
        return Ok(out);
    };

    // alpha maps authored with an alpha channel use it; everything else is
    // read as intensity from red
    let use_alpha_channel = alpha.alpha_source == AlphaSource::ImageAlpha
        && alpha_pixels.pixels().any(|p| p[3] != 255);
    let rgb_default = base_color.map(unit_to_byte);
    let pixels = RgbaImage::from_fn(width, height, |x, y| {
        let [r, g, b] = match &color_pixels {
            Some(c) => {
                let p = c.get_pixel(x, y);
                [p[0], p[1], p[2]]
            }
            None => rgb_default,
        };
        let p = alpha_pixels.get_pixel(x, y);
        let a = if use_alpha_channel { p[3] } else { p[0] };
        Rgba([r, g, b, a])
    });

    let color_key = color_pixels
        .as_ref()
        .and(source_key(color))
        .unwrap_or_else(|| color_part.clone());
    let alpha_key = source_key(Some(alpha)).unwrap_or_default();
    let key = format!("basecolor|{color_key}|{alpha_key}|{use_alpha_channel}");

    let mut tex = TextureReference::synthesized(name, key, pixels, color.or(Some(alpha)));
    tex.has_alpha = true;
    tex.base_color_path = color_pixels.as_ref().and(source_key(color));
    tex.alpha_path = Some(alpha_key);

    out.texture = ctx.export_texture(&tex, ChannelLayout::Color)?;
    out.has_alpha = out.texture.is_some();
    if color_pixels.is_none() {
        // the base color is baked into the pixels
        out.multiply_color = None;
    }
    Ok(out)
}

/// Clearcoat intensity (R) and roughness (G) packed into one texture.
///
/// Returns `None` when neither map is bound or loadable; the caller then
/// uses the scalar parameters.
pub fn pack_clearcoat(
    ctx: &mut ExportContext<'_>,
    intensity: Option<&Texmap>,
    roughness: Option<&Texmap>,
    intensity_factor: f32,
    roughness_factor: f32,
    invert_roughness: bool,
) -> Result<Option<TextureBinding>, Report<ExportError>> {
    if let (Some(i), Some(r)) = (intensity, roughness) {
        if same_source(i, r) && !invert_roughness {
            return export_texmap(ctx, Some(i), ChannelLayout::Packed, None);
        }
    }

    let intensity_pixels = intensity.and_then(|t| load_pixels(ctx, t, "Clearcoat intensity"));
    let roughness_pixels = roughness.and_then(|t| load_pixels(ctx, t, "Clearcoat roughness"));

    let name = format!(
        "{}_{}_clearcoat",
        channel_part(intensity, intensity_pixels.is_some(), intensity_factor, false),
        channel_part(roughness, roughness_pixels.is_some(), roughness_factor, invert_roughness)
    );
    let Some((width, height)) = common_size(ctx, &name, &[intensity_pixels.as_ref(), roughness_pixels.as_ref()])
    else {
        return Ok(None);
    };

    let intensity_default = unit_to_byte(intensity_factor);
    let roughness_default = unit_to_byte(roughness_factor);
    let pixels = RgbaImage::from_fn(width, height, |x, y| {
        let r = intensity_pixels
            .as_ref()
            .map(|i| i.get_pixel(x, y)[0])
            .unwrap_or(intensity_default);
        let g = roughness_pixels
            .as_ref()
            .map(|i| {
                let v = i.get_pixel(x, y)[0];
                if invert_roughness { 255 - v } else { v }
            })
            .unwrap_or(roughness_default);
        Rgba([r, g, 0, 255])
    });

    let key = format!(
        "clearcoat|{}|{}|{invert_roughness}",
        intensity_pixels
            .as_ref()
            .and(source_key(intensity))
            .unwrap_or_else(|| intensity_default.to_string()),
        roughness_pixels
            .as_ref()
            .and(source_key(roughness))
            .unwrap_or_else(|| roughness_default.to_string()),
    );
    let tex = TextureReference::synthesized(name, key, pixels, intensity.or(roughness));
    ctx.export_texture(&tex, ChannelLayout::Packed)
}
