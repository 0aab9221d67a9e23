//! Boundary to the AR tracking subsystem.
//!
//! Pose estimation, plane/face detection and camera session management live
//! outside this crate. The core only sees them through [`TrackingSession`],
//! sampled once per frame into [`CurrentFrame`].

use bevy::prelude::*;
use serde::Serialize;

use super::descriptor::Pose;
use crate::error::{AnchorCreationError, SessionFatal};

/// Tracking state of the camera or of a single trackable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackingState {
    Tracking,
    Paused,
    Stopped,
}

impl TrackingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tracking => "TRACKING",
            Self::Paused => "PAUSED",
            Self::Stopped => "STOPPED",
        }
    }
}

/// Plane orientation; the ordinal is what the remote layer receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneType {
    HorizontalUpwardFacing,
    HorizontalDownwardFacing,
    Vertical,
}

impl PlaneType {
    pub fn ordinal(&self) -> u8 {
        match self {
            Self::HorizontalUpwardFacing => 0,
            Self::HorizontalDownwardFacing => 1,
            Self::Vertical => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaneSnapshot {
    pub plane_type: PlaneType,
    pub tracking_state: TrackingState,
    pub center_pose: Pose,
    pub extent_x: f32,
    pub extent_z: f32,
}

/// Opaque identity of a tracked face, stable for the face's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FaceId(pub u64);

/// Face geometry in face-local space.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FaceMesh {
    pub vertices: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FaceSnapshot {
    pub id: FaceId,
    pub tracking_state: TrackingState,
    pub center_pose: Pose,
    pub mesh: Option<FaceMesh>,
}

/// Handle to an anchor owned by the tracking subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnchorId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorPose {
    pub tracking_state: TrackingState,
    pub pose: Pose,
}

/// What a screen-space hit test intersected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HitTrackable {
    Plane { pose_in_polygon: bool },
    Point,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitResult {
    pub distance: f32,
    pub pose: Pose,
    pub trackable: HitTrackable,
}

impl HitResult {
    pub fn is_plane_hit(&self) -> bool {
        matches!(
            self.trackable,
            HitTrackable::Plane {
                pose_in_polygon: true
            }
        )
    }
}

/// One sampled tracking frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ArFrame {
    pub camera_tracking_state: TrackingState,
    /// Planes whose state changed during this frame.
    pub updated_planes: Vec<PlaneSnapshot>,
    /// Every face the session currently knows about.
    pub faces: Vec<FaceSnapshot>,
}

/// The AR tracking subsystem as seen by the core.
pub trait TrackingSession: Send + Sync + 'static {
    /// Create or revalidate the camera session.
    fn resume(&mut self) -> Result<(), SessionFatal>;

    /// Stop the camera session; returns once tracking has halted.
    fn pause(&mut self);

    /// Advance to the latest frame, if the session produced one.
    fn update(&mut self) -> Option<ArFrame>;

    fn create_anchor(&mut self, pose: Pose) -> Result<AnchorId, AnchorCreationError>;

    fn release_anchor(&mut self, anchor: AnchorId);

    fn anchor_pose(&self, anchor: AnchorId) -> Option<AnchorPose>;

    /// Ray cast from a screen position against tracked geometry.
    fn hit_test(&self, screen_position: Vec2) -> Vec<HitResult>;
}

/// The live tracking session.
#[derive(Resource)]
pub struct ArSession(pub Box<dyn TrackingSession>);

impl ArSession {
    pub fn new(session: impl TrackingSession) -> Self {
        Self(Box::new(session))
    }
}

/// Frame sampled at the start of this update, `None` while not running.
#[derive(Resource, Default)]
pub struct CurrentFrame(pub Option<ArFrame>);

impl CurrentFrame {
    pub fn camera_tracking_state(&self) -> Option<TrackingState> {
        self.0.as_ref().map(|frame| frame.camera_tracking_state)
    }

    pub fn is_tracking(&self) -> bool {
        self.camera_tracking_state() == Some(TrackingState::Tracking)
    }
}

/// Sample the session once per frame while it is running.
pub fn acquire_frame(mut session: ResMut<ArSession>, mut frame: ResMut<CurrentFrame>) {
    frame.0 = session.0.update();
}

/// Run condition: the camera is fully tracking this frame.
pub fn camera_is_tracking(frame: Res<CurrentFrame>) -> bool {
    frame.is_tracking()
}
