/// Colour (ARGB) applied to shapes whose descriptor carries no material.
pub const DEFAULT_SHAPE_ARGB: [u8; 4] = [255, 200, 200, 200];

/// Default perceptual roughness for descriptor materials.
pub const DEFAULT_ROUGHNESS: f32 = 0.5;

/// Default reflectance for descriptor materials.
pub const DEFAULT_REFLECTANCE: f32 = 0.5;

/// Pixels per metre when sizing image nodes from their pixel dimensions.
pub const IMAGE_PIXELS_PER_METRE: f32 = 1000.0;

/// Face mesh tint used until a face texture has been loaded.
pub const FACE_PLACEHOLDER_ARGB: [u8; 4] = [128, 255, 255, 255];
