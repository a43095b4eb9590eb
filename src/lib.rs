/// Error definitions
pub mod error;
/// Texture, image and material emission for the glTF output document.
pub mod export;
/// The host-side material model (property bags, texmaps, collaborators).
pub mod host;
/// Material classification and per-kind channel derivation.
pub mod material;
/// Generic wrapper for values that may or may not match a known variant.
pub mod recognized;
