//! Error taxonomy for scene commands, tracking and capture.
//!
//! Every failure that reaches the remote layer is a [`SceneError`], which
//! converts into a JSON-RPC error object carrying an application code and a
//! `kind` tag the remote side can branch on.

use constants::rpc_codes;
use thiserror::Error;

use crate::rpc::channel::RpcError;

/// Renderable or material construction failed for one node.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NodeBuildError {
    #[error("texture could not be decoded: {0}")]
    Texture(String),
    #[error("invalid geometry: {0}")]
    Geometry(String),
    #[error("model source unavailable: {0}")]
    ModelSource(String),
    #[error("renderable builder failed: {0}")]
    Builder(String),
}

/// The tracking subsystem could not produce a pose-valid anchor.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnchorCreationError {
    #[error("camera is not tracking")]
    NotTracking,
    #[error("tracking session is not running")]
    SessionNotRunning,
    #[error("anchor pose is not valid")]
    InvalidPose,
    #[error("anchor rejected by tracking subsystem: {0}")]
    Rejected(String),
}

/// Unrecoverable failure of the current AR session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionFatal {
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),
    #[error("AR services installation was declined")]
    InstallDeclined,
    #[error("AR is not supported on this device: {0}")]
    Unsupported(String),
}

/// Screenshot readback or encoding failed.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("pixel readback failed: {0}")]
    Readback(String),
    #[error("frame buffer size does not match {width}x{height}")]
    FrameSize { width: u32, height: u32 },
    #[error("encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("writing screenshot failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("capture worker terminated unexpectedly")]
    WorkerPanicked,
}

/// Umbrella error reported back over the command channel.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error(transparent)]
    NodeBuild(#[from] NodeBuildError),
    #[error(transparent)]
    AnchorCreation(#[from] AnchorCreationError),
    #[error("node '{0}' not found")]
    NodeNotFound(String),
    #[error("node name '{0}' is already in use")]
    DuplicateName(String),
    #[error("tracking is not available")]
    TrackingUnavailable,
    #[error(transparent)]
    SessionFatal(#[from] SessionFatal),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("invalid node descriptor: {0}")]
    InvalidDescriptor(String),
}

impl SceneError {
    /// Application error code sent in the JSON-RPC error object.
    pub fn code(&self) -> i32 {
        match self {
            Self::NodeBuild(_) => rpc_codes::NODE_BUILD_ERROR,
            Self::AnchorCreation(_) => rpc_codes::ANCHOR_CREATION_ERROR,
            Self::NodeNotFound(_) => rpc_codes::NODE_NOT_FOUND,
            Self::DuplicateName(_) => rpc_codes::DUPLICATE_NAME,
            Self::TrackingUnavailable => rpc_codes::TRACKING_UNAVAILABLE,
            Self::SessionFatal(_) => rpc_codes::SESSION_FATAL,
            Self::Capture(_) => rpc_codes::CAPTURE_ERROR,
            Self::InvalidDescriptor(_) => rpc_codes::INVALID_DESCRIPTOR,
        }
    }

    /// Stable tag identifying the error class on the remote side.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NodeBuild(_) => "NodeBuildError",
            Self::AnchorCreation(_) => "AnchorCreationError",
            Self::NodeNotFound(_) => "NodeNotFound",
            Self::DuplicateName(_) => "DuplicateName",
            Self::TrackingUnavailable => "TrackingUnavailable",
            Self::SessionFatal(_) => "SessionFatal",
            Self::Capture(_) => "CaptureError",
            Self::InvalidDescriptor(_) => "InvalidDescriptor",
        }
    }
}

impl From<SceneError> for RpcError {
    fn from(error: SceneError) -> Self {
        RpcError {
            code: error.code(),
            message: error.to_string(),
            data: Some(serde_json::json!({ "kind": error.kind() })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_errors_map_to_tagged_rpc_errors() {
        let rpc: RpcError = SceneError::NodeNotFound("lamp".into()).into();
        assert_eq!(rpc.code, rpc_codes::NODE_NOT_FOUND);
        assert_eq!(rpc.message, "node 'lamp' not found");
        assert_eq!(rpc.data, Some(serde_json::json!({ "kind": "NodeNotFound" })));

        let rpc: RpcError = SceneError::from(NodeBuildError::Geometry("radius".into())).into();
        assert_eq!(rpc.code, rpc_codes::NODE_BUILD_ERROR);
        assert_eq!(rpc.message, "invalid geometry: radius");
    }
}
