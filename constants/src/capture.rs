/// Directory (relative to the media root) screenshots are written to.
pub const SCREENSHOT_SUBDIR: &str = "DCIM";

/// File stem of the screenshot written by `takeScreenshot`.
pub const SCREENSHOT_FILE_STEM: &str = "rawScreenshot";

/// JPEG quality used when encoding screenshots (0-100).
pub const SCREENSHOT_JPEG_QUALITY: u8 = 100;

/// Thread name of the per-request pixel readback worker.
pub const CAPTURE_WORKER_NAME: &str = "pixel-copier";
