//! Texture, image and sampler dedup.

use std::collections::HashMap;
use std::path::Path;

use gltf_json as json;
use rootcause::Report;

use super::accumulator::OutputAccumulator;
use super::diagnostics::Diagnostics;
use super::texture::{ChannelLayout, ImageFormat, TextureBinding, TextureReference, TextureSource};
use super::uv::{KHR_TEXTURE_TRANSFORM, TransformKey, UvTransformResolver};
use super::{ExportError, ExportOptions};
use crate::host::bitmap::BitmapProvider;

/// Identity of a texture request. Two requests with equal keys always get
/// the same binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RequestKey {
    source: String,
    layout: ChannelLayout,
    transform: Option<TransformKey>,
    coord_index: u32,
}

/// What [`TextureRegistry::register`] writes into.
pub struct RegistryContext<'a> {
    pub options: &'a ExportOptions,
    pub bitmaps: &'a dyn BitmapProvider,
    pub resolver: &'a mut UvTransformResolver,
    pub doc: &'a mut OutputAccumulator,
    pub diag: &'a mut Diagnostics,
}

#[derive(Debug, Default)]
pub struct TextureRegistry {
    requests: HashMap<RequestKey, Option<TextureBinding>>,
    /// Image index by emitted name, with the source identity it was
    /// written for.
    images: HashMap<String, (String, json::Index<json::Image>)>,
    /// Base color path to the image name of its base color + alpha merge.
    paired_images: HashMap<String, String>,
    /// Texture index by (image, sampler, transform).
    textures: HashMap<(usize, usize, Option<TransformKey>), json::Index<json::Texture>>,
}

impl TextureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct requests seen so far.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Resolve `tex` to a texture binding, emitting its sampler, image and
    /// texture on first use.
    ///
    /// Unsupported formats and unreadable sources produce a warning and
    /// `Ok(None)`; failing to write or encode an image is fatal.
    pub fn register(
        &mut self,
        tex: &TextureReference,
        layout: ChannelLayout,
        ctx: RegistryContext<'_>,
    ) -> Result<Option<TextureBinding>, Report<ExportError>> {
        let key = RequestKey {
            source: tex.source.identity(),
            layout,
            transform: ctx.resolver.key(tex),
            coord_index: tex.coord_index,
        };
        let binding = match self.requests.get(&key) {
            Some(binding) => {
                ctx.diag
                    .verbose(3, format!("Texture {} already exported", tex.name));
                binding.clone()
            }
            None => {
                let binding = self.emit(tex, key.transform, ctx)?;
                self.requests.insert(key, binding.clone());
                binding
            }
        };

        // the strength belongs to the material slot, not to the texture
        Ok(binding.map(|b| TextureBinding {
            scale: (tex.level != 1.0).then_some(tex.level),
            ..b
        }))
    }

    fn emit(
        &mut self,
        tex: &TextureReference,
        transform_key: Option<TransformKey>,
        ctx: RegistryContext<'_>,
    ) -> Result<Option<TextureBinding>, Report<ExportError>> {
        let RegistryContext {
            options,
            bitmaps,
            resolver,
            doc,
            diag,
        } = ctx;

        let Some(format) = tex.output_format() else {
            diag.warning(
                3,
                format!(
                    "Format of texture {} is not supported. Consider using a standard image format like jpg or png.",
                    tex.name
                ),
            );
            return Ok(None);
        };

        diag.message(2, format!("Export texture named: {}", tex.name));
        let sampler = doc.sampler(tex);

        let identity = tex.source.identity();
        let mut image_name = tex.output_name(format);
        let mut folded = false;
        if options.fold_paired_images && tex.alpha_path.is_none() {
            if let Some(paired) = tex.base_color_path.as_ref().and_then(|p| self.paired_images.get(p)) {
                image_name = paired.clone();
                folded = true;
            }
        }

        // a name taken by other pixels gets a numbered variant
        let base_name = image_name.clone();
        let mut existing = None;
        for n in 2.. {
            match self.images.get(&image_name) {
                Some((owner, image)) if folded || *owner == identity => {
                    existing = Some(*image);
                    break;
                }
                Some(_) => image_name = numbered_name(&base_name, n),
                None => break,
            }
        }

        let image = match existing {
            Some(image) => image,
            None => {
                let Some(image) = write_image(tex, &image_name, format, options, bitmaps, doc, diag)?
                else {
                    return Ok(None);
                };
                self.images.insert(image_name.clone(), (identity, image));
                image
            }
        };

        if options.fold_paired_images && tex.alpha_path.is_some() {
            if let Some(base_path) = &tex.base_color_path {
                self.paired_images.insert(base_path.clone(), image_name.clone());
            }
        }

        let texture = *self
            .textures
            .entry((image.value(), sampler.value(), transform_key))
            .or_insert_with(|| doc.push_texture(&image_name, image, sampler));

        let transform = resolver.resolve(tex);
        if transform.is_some() {
            doc.use_extension(KHR_TEXTURE_TRANSFORM, true);
        }

        Ok(Some(TextureBinding {
            texture,
            tex_coord: tex.coord_index,
            transform,
            scale: (tex.level != 1.0).then_some(tex.level),
        }))
    }
}

/// Embed or write out the image behind `tex`. `None` when its source can't
/// be read.
fn write_image(
    tex: &TextureReference,
    name: &str,
    format: ImageFormat,
    options: &ExportOptions,
    bitmaps: &dyn BitmapProvider,
    doc: &mut OutputAccumulator,
    diag: &mut Diagnostics,
) -> Result<Option<json::Index<json::Image>>, Report<ExportError>> {
    let texture_error = |e: Report<super::texture::TextureError>| Report::new(ExportError::Texture(e.to_string()));

    // Files already in the output format are passed through untouched
    // unless a lower quality was requested.
    let verbatim = match &tex.source {
        TextureSource::File(path) => options.quality >= 100 && source_matches(path, format),
        TextureSource::Synthesized { .. } => false,
    };

    if options.embeds_images() {
        let bytes = match &tex.source {
            TextureSource::File(path) if verbatim => match bitmaps.read_bytes(path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    diag.warning(3, format!("Texture {} could not be read: {e}", tex.name));
                    return Ok(None);
                }
            },
            TextureSource::File(path) => match bitmaps.load(path) {
                Ok(pixels) => bitmaps
                    .encode(&pixels, format, options.quality)
                    .map_err(texture_error)?,
                Err(e) => {
                    diag.warning(3, format!("Texture {} could not be read: {e}", tex.name));
                    return Ok(None);
                }
            },
            TextureSource::Synthesized { pixels, .. } => bitmaps
                .encode(pixels, format, options.quality)
                .map_err(texture_error)?,
        };
        return Ok(Some(doc.push_embedded_image(name, &bytes, format)));
    }

    let uri = if options.texture_folder.as_os_str().is_empty() {
        name.to_string()
    } else {
        let folder = options.texture_folder.to_string_lossy().replace('\\', "/");
        format!("{}/{name}", folder.trim_end_matches('/'))
    };

    if options.write_textures {
        let dir = options.output_dir.join(&options.texture_folder);
        std::fs::create_dir_all(&dir).map_err(|e| Report::new(ExportError::Io(e.to_string())))?;
        let dest = dir.join(name);
        diag.message(3, format!("Write image '{name}' to '{}'", dest.display()));

        match &tex.source {
            TextureSource::File(path) if verbatim => {
                if !bitmaps.exists(path) {
                    diag.warning(3, format!("Texture {} not found", path.display()));
                    return Ok(None);
                }
                bitmaps.copy(path, &dest).map_err(texture_error)?;
            }
            TextureSource::File(path) => match bitmaps.load(path) {
                Ok(pixels) => bitmaps
                    .save(&pixels, &dest, format, options.quality)
                    .map_err(texture_error)?,
                Err(e) => {
                    diag.warning(3, format!("Texture {} could not be read: {e}", tex.name));
                    return Ok(None);
                }
            },
            TextureSource::Synthesized { pixels, .. } => bitmaps
                .save(pixels, &dest, format, options.quality)
                .map_err(texture_error)?,
        }
    }

    Ok(Some(doc.push_external_image(name, uri)))
}

/// `name` with `_n` inserted before its extension.
fn numbered_name(name: &str, n: u32) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}_{n}.{ext}"),
        None => format!("{name}_{n}"),
    }
}

fn source_matches(path: &Path, format: ImageFormat) -> bool {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match (ext.as_deref(), format) {
        (Some("png"), ImageFormat::Png) => true,
        (Some("jpg" | "jpeg"), ImageFormat::Jpeg) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use image::RgbaImage;

    use super::*;
    use crate::export::OutputFormat;
    use crate::export::diagnostics::Severity;
    use crate::export::testing::{ContextFixture, MemoryBitmaps};
    use crate::host::Texmap;

    fn fixture(options: ExportOptions) -> ContextFixture {
        ContextFixture::new(
            options,
            MemoryBitmaps::default()
                .with("wood.png", RgbaImage::new(2, 2))
                .with("wood_alpha.png", RgbaImage::new(2, 2)),
        )
    }

    fn wood(u_offset: f32) -> TextureReference {
        let mut texmap = Texmap::bitmap("wood.png");
        texmap.u_offset = u_offset;
        TextureReference::from_texmap(&texmap).unwrap()
    }

    fn register(fx: &mut ContextFixture, tex: &TextureReference) -> Option<TextureBinding> {
        fx.ctx().export_texture(tex, ChannelLayout::Color).unwrap()
    }

    #[test]
    fn identical_requests_are_idempotent() {
        let mut fx = fixture(ExportOptions::default());
        let a = register(&mut fx, &wood(0.0)).unwrap();
        let b = register(&mut fx, &wood(0.0)).unwrap();

        assert_eq!(a, b);
        assert_eq!(fx.doc.root().textures.len(), 1);
        assert_eq!(fx.doc.root().images.len(), 1);
        assert_eq!(fx.doc.root().samplers.len(), 1);
        assert_eq!(fx.bitmaps.load_count(), 1);
    }

    #[test]
    fn transforms_split_textures_but_share_the_image() {
        let mut fx = fixture(ExportOptions::default());
        let plain = register(&mut fx, &wood(0.0)).unwrap();
        let shifted = register(&mut fx, &wood(0.5)).unwrap();

        assert_ne!(plain.texture, shifted.texture);
        assert!(plain.transform.is_none());
        assert_eq!(shifted.transform.map(|t| t.offset), Some([0.5, 0.0]));
        assert_eq!(fx.doc.root().textures.len(), 2);
        assert_eq!(fx.doc.root().images.len(), 1);
        assert_eq!(
            fx.doc.root().extensions_required,
            vec![KHR_TEXTURE_TRANSFORM.to_string()]
        );
    }

    #[test]
    fn layout_is_part_of_the_request_identity() {
        let mut fx = fixture(ExportOptions::default());
        fx.ctx().export_texture(&wood(0.0), ChannelLayout::Color).unwrap();
        fx.ctx().export_texture(&wood(0.0), ChannelLayout::Packed).unwrap();
        assert_eq!(fx.registry.len(), 2);
        // same image, sampler and transform: one texture entry
        assert_eq!(fx.doc.root().textures.len(), 1);
    }

    #[test]
    fn strength_follows_each_request() {
        let mut fx = fixture(ExportOptions::default());
        let mut weak = wood(0.0);
        weak.level = 0.3;
        let mut strong = wood(0.0);
        strong.level = 2.0;

        let weak = register(&mut fx, &weak).unwrap();
        let strong = register(&mut fx, &strong).unwrap();
        let plain = register(&mut fx, &wood(0.0)).unwrap();

        assert_eq!(weak.scale, Some(0.3));
        assert_eq!(strong.scale, Some(2.0));
        assert_eq!(plain.scale, None);
        assert_eq!(weak.texture, strong.texture);
        assert_eq!(fx.doc.root().textures.len(), 1);
    }

    #[test]
    fn same_named_files_get_their_own_images() {
        let mut fx = ContextFixture::new(
            ExportOptions::default(),
            MemoryBitmaps::default()
                .with("oak/wood.png", RgbaImage::new(2, 2))
                .with("pine/wood.png", RgbaImage::new(4, 4)),
        );
        let oak = TextureReference::from_texmap(&Texmap::bitmap("oak/wood.png")).unwrap();
        let pine = TextureReference::from_texmap(&Texmap::bitmap("pine/wood.png")).unwrap();

        let oak = register(&mut fx, &oak).unwrap();
        let pine = register(&mut fx, &pine).unwrap();

        assert_ne!(oak.texture, pine.texture);
        let names: Vec<_> = fx.doc.root().images.iter().map(|i| i.name.clone()).collect();
        assert_eq!(
            names,
            vec![Some("wood.png".to_string()), Some("wood_2.png".to_string())]
        );
    }

    #[test]
    fn unsupported_format_is_skipped_with_a_warning() {
        let mut fx = fixture(ExportOptions::default());
        let tex = TextureReference::from_texmap(&Texmap::bitmap("sky.exr")).unwrap();
        assert!(register(&mut fx, &tex).is_none());
        assert!(register(&mut fx, &tex).is_none());
        assert!(fx.doc.root().images.is_empty());
        assert_eq!(fx.diag.count(Severity::Warning), 1);
    }

    #[test]
    fn missing_source_yields_no_texture() {
        let mut fx = fixture(ExportOptions::default());
        let tex = TextureReference::from_texmap(&Texmap::bitmap("missing.png")).unwrap();
        assert!(register(&mut fx, &tex).is_none());
        assert!(fx.doc.root().textures.is_empty());
    }

    #[test]
    fn external_images_use_the_texture_folder() {
        let options = ExportOptions::builder()
            .output_format(OutputFormat::Gltf)
            .texture_folder("textures")
            .output_dir(std::env::temp_dir().join("mtlbake-registry-test"))
            .build();
        let mut fx = fixture(options);
        register(&mut fx, &wood(0.0)).unwrap();

        let image = &fx.doc.root().images[0];
        assert_eq!(image.uri.as_deref(), Some("textures/wood.png"));
        assert_eq!(fx.bitmaps.saved().len(), 1);
    }

    #[test]
    fn paired_images_fold_when_enabled() {
        let options = ExportOptions::builder().fold_paired_images(true).build();
        let mut fx = fixture(options);

        let mut merged = TextureReference::synthesized(
            "wood_wood_alpha".to_string(),
            "wood.png|wood_alpha.png".to_string(),
            RgbaImage::new(2, 2),
            None,
        );
        merged.base_color_path = Some("wood.png".to_string());
        merged.alpha_path = Some("wood_alpha.png".to_string());
        register(&mut fx, &merged).unwrap();

        let mut opaque = wood(0.0);
        opaque.base_color_path = Some("wood.png".to_string());
        register(&mut fx, &opaque).unwrap();

        assert_eq!(fx.doc.root().images.len(), 1);
    }

    #[test]
    fn paired_images_stay_apart_by_default() {
        let mut fx = fixture(ExportOptions::default());
        let mut merged = TextureReference::synthesized(
            "wood_wood_alpha".to_string(),
            "wood.png|wood_alpha.png".to_string(),
            RgbaImage::new(2, 2),
            None,
        );
        merged.base_color_path = Some("wood.png".to_string());
        merged.alpha_path = Some("wood_alpha.png".to_string());
        register(&mut fx, &merged).unwrap();

        let mut opaque = wood(0.0);
        opaque.base_color_path = Some("wood.png".to_string());
        register(&mut fx, &opaque).unwrap();

        assert_eq!(fx.doc.root().images.len(), 2);
    }
}
