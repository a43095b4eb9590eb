//! `KHR_texture_transform` resolution.

use std::collections::HashMap;

use tracing::warn;

use super::texture::{TextureReference, TransformBlock, UvTransform};

pub const KHR_TEXTURE_TRANSFORM: &str = "KHR_texture_transform";

/// Rounded transform tuple, used as part of texture dedup keys.
///
/// Values are kept to 1e-4 so float noise from the host UI doesn't split
/// otherwise identical textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransformKey {
    offset: [i32; 2],
    rotation: i32,
    scale: [i32; 2],
    tex_coord: u32,
}

fn round(v: f32) -> i32 {
    (v * 10_000.0).round() as i32
}

impl TransformKey {
    pub fn new(transform: &UvTransform, tex_coord: u32) -> Self {
        Self {
            offset: [round(transform.offset[0]), round(transform.offset[1])],
            rotation: round(transform.rotation),
            scale: [round(transform.scale[0]), round(transform.scale[1])],
            tex_coord,
        }
    }
}

/// Computes and dedups the transform blocks attached to texture bindings.
#[derive(Debug)]
pub struct UvTransformResolver {
    enabled: bool,
    blocks: HashMap<TransformKey, TransformBlock>,
    warned_disabled: bool,
}

impl UvTransformResolver {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            blocks: HashMap::new(),
            warned_disabled: false,
        }
    }

    /// Dedup key for `tex`'s transform, or `None` for the identity.
    pub fn key(&self, tex: &TextureReference) -> Option<TransformKey> {
        if !self.enabled || tex.transform.is_identity() {
            return None;
        }
        Some(TransformKey::new(&tex.transform, tex.coord_index))
    }

    /// The transform block to attach to `tex`'s binding.
    ///
    /// Identity transforms yield `None`. With the extension disabled every
    /// non-identity transform is dropped, with a warning on the first one.
    pub fn resolve(&mut self, tex: &TextureReference) -> Option<TransformBlock> {
        if tex.transform.is_identity() {
            return None;
        }
        if !self.enabled {
            if !self.warned_disabled {
                warn!(
                    rank = 3,
                    texture = %tex.name,
                    "{KHR_TEXTURE_TRANSFORM} is not enabled, textures using UV transforms may look incorrect"
                );
                self.warned_disabled = true;
            }
            return None;
        }

        let key = TransformKey::new(&tex.transform, tex.coord_index);
        let block = *self.blocks.entry(key).or_insert_with(|| TransformBlock {
            offset: tex.transform.offset,
            rotation: tex.transform.rotation,
            scale: tex.transform.scale,
            tex_coord: tex.coord_index,
        });
        Some(block)
    }

    /// Whether any binding in this pass carries a transform.
    pub fn used(&self) -> bool {
        !self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Texmap;

    fn tex(offset: [f32; 2]) -> TextureReference {
        let mut texmap = Texmap::bitmap("wood.png");
        texmap.u_offset = offset[0];
        texmap.v_offset = offset[1];
        TextureReference::from_texmap(&texmap).unwrap()
    }

    #[test]
    fn identity_is_never_attached() {
        let mut resolver = UvTransformResolver::new(true);
        assert_eq!(resolver.resolve(&tex([0.0, 0.0])), None);
        assert_eq!(resolver.key(&tex([0.0, 0.0])), None);
        assert!(!resolver.used());
    }

    #[test]
    fn near_equal_transforms_share_a_block() {
        let mut resolver = UvTransformResolver::new(true);
        let a = resolver.resolve(&tex([0.25, 0.0])).unwrap();
        let b = resolver.resolve(&tex([0.250_000_1, 0.0])).unwrap();
        assert_eq!(a, b);
        assert_eq!(resolver.key(&tex([0.25, 0.0])), resolver.key(&tex([0.250_000_1, 0.0])));
        assert_ne!(resolver.key(&tex([0.25, 0.0])), resolver.key(&tex([0.5, 0.0])));
        assert!(resolver.used());
    }

    #[test]
    fn disabled_extension_drops_transforms() {
        let mut resolver = UvTransformResolver::new(false);
        assert_eq!(resolver.resolve(&tex([0.25, 0.0])), None);
        assert_eq!(resolver.key(&tex([0.25, 0.0])), None);
    }
}
