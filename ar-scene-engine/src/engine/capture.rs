/// Off-thread screenshot capture
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bevy::prelude::*;
use constants::capture::CAPTURE_WORKER_NAME;
use image::ColorType;
use image::codecs::jpeg::JpegEncoder;

use super::lifecycle::{SessionLifecycle, respond_capture, respond_unit};
use crate::config::{ArSceneConfig, ScreenshotConfig};
use crate::error::{CaptureError, SceneError};
use crate::rpc::channel::{RequestId, RpcInterface};
use crate::rpc::commands::{ArCommand, ArCommandEvent};

/// One frame read back from the rendered view, RGBA8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Pixel readback of the current view.
pub trait FrameCapture: Send + Sync + 'static {
    fn capture(&self) -> Result<CapturedFrame, CaptureError>;
}

/// Worker pool of in-flight screenshots.
#[derive(Resource)]
pub struct ScreenCapture {
    source: Arc<dyn FrameCapture>,
    workers: Vec<(RequestId, JoinHandle<Result<PathBuf, CaptureError>>)>,
}

impl ScreenCapture {
    pub fn new(source: impl FrameCapture) -> Self {
        Self {
            source: Arc::new(source),
            workers: Vec::new(),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.workers.len()
    }

    /// Start a worker reading back one frame and writing it as JPEG.
    pub fn start(&mut self, id: RequestId, settings: ScreenshotConfig) -> Result<(), CaptureError> {
        let source = self.source.clone();
        let handle = thread::Builder::new()
            .name(CAPTURE_WORKER_NAME.to_string())
            .spawn(move || write_screenshot(source.as_ref(), &settings))?;
        self.workers.push((id, handle));
        Ok(())
    }

    /// Collect workers that have finished.
    pub fn take_finished(&mut self) -> Vec<(RequestId, Result<PathBuf, CaptureError>)> {
        let (finished, running): (Vec<_>, Vec<_>) = self
            .workers
            .drain(..)
            .partition(|(_, handle)| handle.is_finished());
        self.workers = running;
        finished.into_iter().map(join_worker).collect()
    }

    /// Block until every worker has finished.
    pub fn wait_for_workers(&mut self) -> Vec<(RequestId, Result<PathBuf, CaptureError>)> {
        self.workers.drain(..).map(join_worker).collect()
    }
}

fn join_worker(
    (id, handle): (RequestId, JoinHandle<Result<PathBuf, CaptureError>>),
) -> (RequestId, Result<PathBuf, CaptureError>) {
    let result = handle
        .join()
        .unwrap_or(Err(CaptureError::WorkerPanicked));
    (id, result)
}

fn write_screenshot(
    source: &dyn FrameCapture,
    settings: &ScreenshotConfig,
) -> Result<PathBuf, CaptureError> {
    let frame = source.capture()?;
    let expected = frame.width as usize * frame.height as usize * 4;
    if frame.width == 0 || frame.height == 0 || frame.rgba.len() != expected {
        return Err(CaptureError::FrameSize {
            width: frame.width,
            height: frame.height,
        });
    }

    // JPEG has no alpha channel.
    let rgb: Vec<u8> = frame
        .rgba
        .chunks_exact(4)
        .flat_map(|pixel| [pixel[0], pixel[1], pixel[2]])
        .collect();

    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, settings.jpeg_quality).encode(
        &rgb,
        frame.width,
        frame.height,
        ColorType::Rgb8,
    )?;

    fs::create_dir_all(&settings.directory)?;
    let path = settings.output_path();
    fs::write(&path, encoded)?;
    Ok(path)
}

/// Handle `takeScreenshot`. The view only has frames while the session runs.
pub fn apply_capture_commands(
    mut events: EventReader<ArCommandEvent>,
    mut capture: ResMut<ScreenCapture>,
    lifecycle: Res<SessionLifecycle>,
    config: Res<ArSceneConfig>,
    mut rpc: ResMut<RpcInterface>,
) {
    for event in events.read() {
        if let ArCommand::TakeScreenshot = event.command {
            if !lifecycle.is_running() {
                respond_unit(&mut rpc, &event.id, Err(SceneError::TrackingUnavailable));
                continue;
            }
            if let Err(error) = capture.start(event.id.clone(), config.screenshot.clone()) {
                error!("Could not start capture worker: {}", error);
                respond_capture(&mut rpc, &event.id, Err(error));
            }
        }
    }
}

/// Answer screenshot requests whose worker has finished.
pub fn collect_captures(mut capture: ResMut<ScreenCapture>, mut rpc: ResMut<RpcInterface>) {
    for (id, result) in capture.take_finished() {
        match &result {
            Ok(path) => info!("Screenshot written to {}", path.display()),
            Err(error) => warn!("Screenshot failed: {}", error),
        }
        respond_capture(&mut rpc, &id, result);
    }
}
