//! Texture references and image format handling for glTF export.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use gltf_json as json;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::host::{AlphaSource, Filtering, Texmap, TexmapClass, Tiling};

#[derive(Debug, Error)]
pub enum TextureError {
    #[error("failed to load bitmap {path}: {reason}")]
    Load { path: String, reason: String },
    #[error("failed to parse DDS: {0}")]
    DdsParse(String),
    #[error("failed to decode DDS image: {0}")]
    DdsDecode(String),
    #[error("failed to encode {format}: {reason}")]
    Encode { format: ImageFormat, reason: String },
    #[error("failed to write {path}: {reason}")]
    Write { path: String, reason: String },
}

/// Image formats glTF accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    /// Output format for a source file extension, or `None` if the exporter
    /// can't convert it. Formats carrying alpha go to PNG.
    pub fn for_source_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "png" | "tga" | "tif" | "tiff" | "gif" | "dds" => Some(Self::Png),
            "jpg" | "jpeg" | "bmp" => Some(Self::Jpeg),
            _ => None,
        }
    }

    pub fn for_source(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::for_source_extension)
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Source formats whose pixels may carry an alpha channel.
fn format_supports_alpha(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| {
            matches!(
                e.to_ascii_lowercase().as_str(),
                "png" | "tga" | "tif" | "tiff" | "dds" | "gif"
            )
        })
}

/// Texture sampling modes, named `<MAG>_<MIN>[_MIP<MIPMAP>]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SamplingMode {
    NearestNearestMipLinear,
    LinearLinearMipNearest,
    LinearLinearMipLinear,
    NearestNearestMipNearest,
    NearestLinearMipNearest,
    NearestLinearMipLinear,
    NearestLinear,
    NearestNearest,
    LinearNearestMipNearest,
    LinearNearestMipLinear,
    LinearLinear,
    LinearNearest,
}

impl SamplingMode {
    pub fn from_filtering(filtering: Filtering) -> Self {
        match filtering {
            Filtering::Pyramidal | Filtering::SummedArea => Self::LinearLinearMipLinear,
            Filtering::Nearest => Self::NearestNearest,
        }
    }

    pub fn filters(self) -> (json::texture::MagFilter, json::texture::MinFilter) {
        use json::texture::MagFilter as Mag;
        use json::texture::MinFilter as Min;
        match self {
            Self::NearestNearestMipLinear => (Mag::Nearest, Min::NearestMipmapLinear),
            Self::LinearLinearMipNearest => (Mag::Linear, Min::LinearMipmapNearest),
            Self::LinearLinearMipLinear => (Mag::Linear, Min::LinearMipmapLinear),
            Self::NearestNearestMipNearest => (Mag::Nearest, Min::NearestMipmapNearest),
            Self::NearestLinearMipNearest => (Mag::Nearest, Min::LinearMipmapNearest),
            Self::NearestLinearMipLinear => (Mag::Nearest, Min::LinearMipmapLinear),
            Self::NearestLinear => (Mag::Nearest, Min::Linear),
            Self::NearestNearest => (Mag::Nearest, Min::Nearest),
            Self::LinearNearestMipNearest => (Mag::Linear, Min::NearestMipmapNearest),
            Self::LinearNearestMipLinear => (Mag::Linear, Min::NearestMipmapLinear),
            Self::LinearLinear => (Mag::Linear, Min::Linear),
            Self::LinearNearest => (Mag::Linear, Min::Nearest),
        }
    }
}

pub fn wrapping_mode(tiling: Tiling) -> json::texture::WrappingMode {
    match tiling {
        Tiling::Wrap => json::texture::WrappingMode::Repeat,
        Tiling::Mirror => json::texture::WrappingMode::MirroredRepeat,
        Tiling::Clamp => json::texture::WrappingMode::ClampToEdge,
    }
}

/// Offset / rotation / scale applied to a texture's coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvTransform {
    pub offset: [f32; 2],
    /// Counter-clockwise rotation in radians, glTF convention.
    pub rotation: f32,
    pub scale: [f32; 2],
}

impl Default for UvTransform {
    fn default() -> Self {
        Self {
            offset: [0.0, 0.0],
            rotation: 0.0,
            scale: [1.0, 1.0],
        }
    }
}

impl UvTransform {
    /// Identity transforms are never attached to a binding. A V scale of -1
    /// only flips between host and glTF conventions and also counts.
    pub fn is_identity(&self) -> bool {
        self.offset == [0.0, 0.0]
            && self.scale[0] == 1.0
            && self.scale[1].abs() == 1.0
            && self.rotation.abs() == 0.0
    }

    pub fn from_texmap(texmap: &Texmap) -> Self {
        Self {
            offset: [texmap.u_offset, texmap.v_offset],
            // host angles are clockwise
            rotation: -texmap.w_angle,
            scale: [texmap.u_tiling, texmap.v_tiling],
        }
    }
}

/// What a texture request is going to be used for. The same source bitmap
/// requested with a different layout is a different texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelLayout {
    /// RGB(A) color.
    Color,
    /// Occlusion / roughness / metallic packed in R / G / B.
    Packed,
    /// Data read from a single channel (occlusion, clearcoat).
    Single,
    /// Tangent-space normal map.
    Normal,
}

/// Where a texture's pixels come from.
#[derive(Debug, Clone)]
pub enum TextureSource {
    File(PathBuf),
    /// Pixels produced by the exporter. `key` is the content identity: every
    /// input that influenced the pixels is part of it.
    Synthesized { key: String, pixels: Arc<RgbaImage> },
}

impl TextureSource {
    pub fn identity(&self) -> String {
        match self {
            Self::File(path) => normalize_path(path),
            Self::Synthesized { key, .. } => key.clone(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Synthesized { .. } => None,
        }
    }
}

/// Case-insensitive, separator-agnostic path key.
pub fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/").to_lowercase()
}

/// A request to put a texture in the output document.
#[derive(Debug, Clone)]
pub struct TextureReference {
    /// Emitted name, before the extension is normalized to the output format.
    pub name: String,
    pub source: TextureSource,
    pub transform: UvTransform,
    pub coord_index: u32,
    pub sampling: SamplingMode,
    pub wrap_u: Tiling,
    pub wrap_v: Tiling,
    pub has_alpha: bool,
    /// Normal map strength.
    pub level: f32,
    /// Set on base color textures so that opaque and alpha-merged variants of
    /// one logical texture can share an image.
    pub base_color_path: Option<String>,
    pub alpha_path: Option<String>,
}

impl TextureReference {
    /// Reference to the bitmap behind `texmap`, or `None` if it has no file.
    pub fn from_texmap(texmap: &Texmap) -> Option<Self> {
        let texmap = match texmap.class() {
            TexmapClass::NormalBump => texmap.normal.as_deref()?,
            _ => texmap,
        };
        let path = texmap.path.clone()?;
        let name = file_name(&path);
        Some(Self {
            name,
            has_alpha: texmap.alpha_source == AlphaSource::ImageAlpha && format_supports_alpha(&path),
            source: TextureSource::File(path),
            transform: UvTransform::from_texmap(texmap),
            coord_index: texmap.coord_index(),
            sampling: texmap
                .sampling
                .unwrap_or_else(|| SamplingMode::from_filtering(texmap.filtering)),
            wrap_u: texmap.tiling_u,
            wrap_v: texmap.tiling_v,
            level: 1.0,
            base_color_path: None,
            alpha_path: None,
        })
    }

    /// Reference to exporter-produced pixels, taking its sampling and UV
    /// parameters from `template`.
    pub fn synthesized(name: String, key: String, pixels: RgbaImage, template: Option<&Texmap>) -> Self {
        let template = template.cloned().unwrap_or_default();
        Self {
            name,
            source: TextureSource::Synthesized {
                key,
                pixels: Arc::new(pixels),
            },
            transform: UvTransform::from_texmap(&template),
            coord_index: template.coord_index(),
            sampling: template
                .sampling
                .unwrap_or_else(|| SamplingMode::from_filtering(template.filtering)),
            wrap_u: template.tiling_u,
            wrap_v: template.tiling_v,
            has_alpha: false,
            level: 1.0,
            base_color_path: None,
            alpha_path: None,
        }
    }

    /// Output format, decided by the source file extension. Synthesized
    /// pixels are written as PNG.
    pub fn output_format(&self) -> Option<ImageFormat> {
        match &self.source {
            TextureSource::File(path) => ImageFormat::for_source(path),
            TextureSource::Synthesized { .. } => Some(ImageFormat::Png),
        }
    }

    /// The name with its extension replaced by the output format's.
    /// Synthesized names carry no extension and are kept whole.
    pub fn output_name(&self, format: ImageFormat) -> String {
        let stem = match &self.source {
            TextureSource::File(_) => Path::new(&self.name)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.name.clone()),
            TextureSource::Synthesized { .. } => self.name.clone(),
        };
        format!("{}.{}", sanitize_name(&stem), format.extension())
    }
}

/// File name component of a path, accepting both separators.
pub fn file_name(path: &Path) -> String {
    let lossy = path.to_string_lossy();
    lossy
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(&lossy)
        .to_string()
}

/// File stem component of a path, accepting both separators.
pub fn file_stem(path: &Path) -> String {
    let name = file_name(path);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name,
    }
}

/// Transliterate to ASCII and replace characters that are unsafe in URIs.
pub fn sanitize_name(name: &str) -> String {
    unidecode::unidecode(name)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// A texture placed in the output document, as seen from a material slot.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureBinding {
    pub texture: json::Index<json::Texture>,
    pub tex_coord: u32,
    pub transform: Option<TransformBlock>,
    /// Normal map strength; `None` means the glTF default.
    pub scale: Option<f32>,
}

/// A resolved `KHR_texture_transform` block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformBlock {
    pub offset: [f32; 2],
    pub rotation: f32,
    pub scale: [f32; 2],
    pub tex_coord: u32,
}

impl TransformBlock {
    pub fn to_json(&self) -> json::extensions::texture::TextureTransform {
        json::extensions::texture::TextureTransform {
            offset: json::extensions::texture::TextureTransformOffset(self.offset),
            rotation: json::extensions::texture::TextureTransformRotation(self.rotation),
            scale: json::extensions::texture::TextureTransformScale(self.scale),
            tex_coord: Some(self.tex_coord),
            extras: Default::default(),
        }
    }
}
