use std::path::PathBuf;

use bevy::prelude::*;
use constants::capture::{SCREENSHOT_FILE_STEM, SCREENSHOT_JPEG_QUALITY, SCREENSHOT_SUBDIR};
use serde::Deserialize;

/// Runtime configuration of the AR scene core.
///
/// Built once by the host (optionally from JSON) and handed to
/// [`crate::ArScenePlugin`]. The `init` command later flips the three
/// listener/renderer flags on the live resource.
#[derive(Resource, Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ArSceneConfig {
    /// Session tracks faces instead of planes and runs the face pass.
    pub augmented_faces: bool,
    /// Dumps decoded descriptors and routing decisions at debug level.
    pub debug: bool,
    pub enable_tap_recognizer: bool,
    pub enable_update_listener: bool,
    pub plane_renderer_visible: bool,
    pub screenshot: ScreenshotConfig,
}

impl Default for ArSceneConfig {
    fn default() -> Self {
        Self {
            augmented_faces: false,
            debug: false,
            enable_tap_recognizer: false,
            enable_update_listener: false,
            plane_renderer_visible: true,
            screenshot: ScreenshotConfig::default(),
        }
    }
}

impl ArSceneConfig {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScreenshotConfig {
    pub directory: PathBuf,
    pub file_stem: String,
    pub jpeg_quality: u8,
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(SCREENSHOT_SUBDIR),
            file_stem: SCREENSHOT_FILE_STEM.to_string(),
            jpeg_quality: SCREENSHOT_JPEG_QUALITY,
        }
    }
}

impl ScreenshotConfig {
    pub fn output_path(&self) -> PathBuf {
        self.directory.join(format!("{}.jpg", self.file_stem))
    }
}
