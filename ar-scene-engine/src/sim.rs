//! Simulated tracking backend and frame source.
//!
//! Stands in for the device AR subsystem in the headless binary and in
//! tests. The world is shared through [`SimHandle`], so a host can script
//! camera state, planes, faces and hit results while the engine runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bevy::prelude::*;

use crate::engine::capture::{CapturedFrame, FrameCapture};
use crate::engine::descriptor::Pose;
use crate::engine::session::{
    AnchorId, AnchorPose, ArFrame, FaceId, FaceSnapshot, HitResult, PlaneSnapshot, TrackingSession,
    TrackingState,
};
use crate::error::{AnchorCreationError, CaptureError, SessionFatal};

struct SimWorld {
    running: bool,
    resume_calls: usize,
    fail_next_resume: Option<SessionFatal>,
    camera_state: TrackingState,
    updated_planes: Vec<PlaneSnapshot>,
    faces: Vec<FaceSnapshot>,
    anchors: HashMap<AnchorId, AnchorPose>,
    released: Vec<AnchorId>,
    next_anchor: u64,
    anchor_failure: Option<AnchorCreationError>,
    hits: Vec<HitResult>,
}

impl Default for SimWorld {
    fn default() -> Self {
        Self {
            running: false,
            resume_calls: 0,
            fail_next_resume: None,
            camera_state: TrackingState::Tracking,
            updated_planes: Vec::new(),
            faces: Vec::new(),
            anchors: HashMap::new(),
            released: Vec::new(),
            next_anchor: 1,
            anchor_failure: None,
            hits: Vec::new(),
        }
    }
}

/// Scripting handle onto a [`SimulatedSession`].
#[derive(Clone, Default)]
pub struct SimHandle(Arc<Mutex<SimWorld>>);

impl SimHandle {
    fn world(&self) -> MutexGuard<'_, SimWorld> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.world().running
    }

    pub fn resume_calls(&self) -> usize {
        self.world().resume_calls
    }

    /// The next `resume` fails with `fatal`.
    pub fn fail_next_resume(&self, fatal: SessionFatal) {
        self.world().fail_next_resume = Some(fatal);
    }

    pub fn set_camera_state(&self, state: TrackingState) {
        self.world().camera_state = state;
    }

    /// Report `plane` as updated on the next frame.
    pub fn push_plane_update(&self, plane: PlaneSnapshot) {
        self.world().updated_planes.push(plane);
    }

    /// Insert or replace a face.
    pub fn upsert_face(&self, face: FaceSnapshot) {
        let mut world = self.world();
        match world.faces.iter_mut().find(|known| known.id == face.id) {
            Some(known) => *known = face,
            None => world.faces.push(face),
        }
    }

    pub fn set_face_state(&self, face: FaceId, state: TrackingState) {
        if let Some(known) = self.world().faces.iter_mut().find(|known| known.id == face) {
            known.tracking_state = state;
        }
    }

    /// Forget a face entirely, as if the session dropped it.
    pub fn remove_face(&self, face: FaceId) {
        self.world().faces.retain(|known| known.id != face);
    }

    /// Make anchor creation fail until cleared with `None`.
    pub fn set_anchor_failure(&self, failure: Option<AnchorCreationError>) {
        self.world().anchor_failure = failure;
    }

    pub fn set_anchor_state(&self, anchor: AnchorId, state: TrackingState) {
        if let Some(pose) = self.world().anchors.get_mut(&anchor) {
            pose.tracking_state = state;
        }
    }

    pub fn move_anchor(&self, anchor: AnchorId, pose: Pose) {
        if let Some(known) = self.world().anchors.get_mut(&anchor) {
            known.pose = pose;
        }
    }

    pub fn live_anchors(&self) -> Vec<AnchorId> {
        self.world().anchors.keys().copied().collect()
    }

    pub fn released_anchors(&self) -> Vec<AnchorId> {
        self.world().released.clone()
    }

    /// Results returned by every following hit test.
    pub fn set_hit_results(&self, hits: Vec<HitResult>) {
        self.world().hits = hits;
    }
}

/// [`TrackingSession`] backed by a scripted world.
#[derive(Clone, Default)]
pub struct SimulatedSession {
    world: SimHandle,
}

impl SimulatedSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> SimHandle {
        self.world.clone()
    }
}

impl TrackingSession for SimulatedSession {
    fn resume(&mut self) -> Result<(), SessionFatal> {
        let mut world = self.world.world();
        world.resume_calls += 1;
        if let Some(fatal) = world.fail_next_resume.take() {
            return Err(fatal);
        }
        world.running = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.world.world().running = false;
    }

    fn update(&mut self) -> Option<ArFrame> {
        let mut world = self.world.world();
        if !world.running {
            return None;
        }
        Some(ArFrame {
            camera_tracking_state: world.camera_state,
            updated_planes: std::mem::take(&mut world.updated_planes),
            faces: world.faces.clone(),
        })
    }

    fn create_anchor(&mut self, pose: Pose) -> Result<AnchorId, AnchorCreationError> {
        let mut world = self.world.world();
        if !world.running {
            return Err(AnchorCreationError::SessionNotRunning);
        }
        if let Some(failure) = world.anchor_failure.clone() {
            return Err(failure);
        }
        if world.camera_state != TrackingState::Tracking {
            return Err(AnchorCreationError::NotTracking);
        }
        if !pose.translation.is_finite() || !pose.rotation.is_normalized() {
            return Err(AnchorCreationError::InvalidPose);
        }

        let anchor = AnchorId(world.next_anchor);
        world.next_anchor += 1;
        world.anchors.insert(
            anchor,
            AnchorPose {
                tracking_state: TrackingState::Tracking,
                pose,
            },
        );
        Ok(anchor)
    }

    fn release_anchor(&mut self, anchor: AnchorId) {
        let mut world = self.world.world();
        if world.anchors.remove(&anchor).is_some() {
            world.released.push(anchor);
        }
    }

    fn anchor_pose(&self, anchor: AnchorId) -> Option<AnchorPose> {
        self.world.world().anchors.get(&anchor).copied()
    }

    fn hit_test(&self, _screen_position: Vec2) -> Vec<HitResult> {
        self.world.world().hits.clone()
    }
}

/// Frame source returning a single solid colour.
#[derive(Debug, Clone, Copy)]
pub struct SolidColorCapture {
    width: u32,
    height: u32,
    rgba: [u8; 4],
}

impl SolidColorCapture {
    pub fn new(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self {
            width,
            height,
            rgba,
        }
    }
}

impl FrameCapture for SolidColorCapture {
    fn capture(&self) -> Result<CapturedFrame, CaptureError> {
        if self.width == 0 || self.height == 0 {
            return Err(CaptureError::Readback("view has no pixels".to_string()));
        }
        let pixels = self.width as usize * self.height as usize;
        Ok(CapturedFrame {
            width: self.width,
            height: self.height,
            rgba: self.rgba.repeat(pixels),
        })
    }
}
