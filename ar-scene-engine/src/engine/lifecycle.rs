use bevy::prelude::*;

use super::capture::ScreenCapture;
use super::node::ArNode;
use super::node_factory::NodeBuilds;
use super::scene_graph::ArScene;
use super::session::{ArSession, CurrentFrame, TrackingState};
use crate::config::ArSceneConfig;
use crate::error::{SceneError, SessionFatal};
use crate::rpc::channel::{RequestId, RpcError, RpcInterface};
use crate::rpc::commands::{ArCommand, ArCommandEvent, InitParams};
use crate::tools::gestures::GestureController;

/// Where the AR session is in its pause/resume cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Uninitialized,
    Running,
    Paused,
    /// A fatal error ended the session; it is not retried.
    Failed,
    Disposed,
}

#[derive(Resource, Default)]
pub struct SessionLifecycle {
    phase: SessionPhase,
    fatal: Option<SessionFatal>,
}

impl SessionLifecycle {
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == SessionPhase::Running
    }

    /// Revalidate the session and re-enable the per-frame loop.
    pub fn resume(&mut self, session: &mut ArSession) -> Result<(), SessionFatal> {
        match self.phase {
            SessionPhase::Running => return Ok(()),
            SessionPhase::Failed => {
                if let Some(fatal) = &self.fatal {
                    return Err(fatal.clone());
                }
            }
            _ => {}
        }

        match session.0.resume() {
            Ok(()) => {
                self.phase = SessionPhase::Running;
                self.fatal = None;
                info!("AR session resumed");
                Ok(())
            }
            Err(fatal) => {
                error!("AR session failed to resume: {}", fatal);
                self.phase = SessionPhase::Failed;
                self.fatal = Some(fatal.clone());
                Err(fatal)
            }
        }
    }

    /// Stop the per-frame loop and the camera session before returning.
    pub fn pause(&mut self, session: &mut ArSession) {
        if self.phase == SessionPhase::Running {
            session.0.pause();
            self.phase = SessionPhase::Paused;
            info!("AR session paused");
        }
    }

    fn dispose(&mut self, session: &mut ArSession) {
        self.pause(session);
        self.phase = SessionPhase::Disposed;
    }

    /// Camera state as reported to the remote layer.
    pub fn reported_tracking_state(&self, frame: &CurrentFrame) -> TrackingState {
        match self.phase {
            SessionPhase::Running => frame
                .camera_tracking_state()
                .unwrap_or(TrackingState::Paused),
            SessionPhase::Paused => TrackingState::Paused,
            _ => TrackingState::Stopped,
        }
    }
}

/// Run condition: the per-frame loop is enabled.
pub fn session_running(lifecycle: Res<SessionLifecycle>) -> bool {
    lifecycle.is_running()
}

/// Raised when the session hits an unrecoverable error.
#[derive(Event, Debug, Clone)]
pub struct SessionFailed(pub SessionFatal);

/// Handle session-level commands: init, pause/resume, dispose, tracking
/// state and the plane renderer toggle.
pub fn apply_session_commands(
    mut events: EventReader<ArCommandEvent>,
    mut lifecycle: ResMut<SessionLifecycle>,
    mut session: ResMut<ArSession>,
    mut config: ResMut<ArSceneConfig>,
    mut frame: ResMut<CurrentFrame>,
    mut rpc: ResMut<RpcInterface>,
    mut failures: EventWriter<SessionFailed>,
    mut scene: ResMut<ArScene>,
    mut builds: ResMut<NodeBuilds>,
    mut capture: ResMut<ScreenCapture>,
    mut gestures: ResMut<GestureController>,
    nodes: Query<(Entity, Option<&ChildOf>), With<ArNode>>,
    mut commands: Commands,
) {
    for event in events.read() {
        match &event.command {
            ArCommand::Init(params) => {
                apply_init(&mut config, params);
                rpc.respond(&event.id, Ok(serde_json::Value::Null));
            }
            ArCommand::Resume => {
                let result = lifecycle.resume(&mut session);
                if let Err(fatal) = &result {
                    failures.write(SessionFailed(fatal.clone()));
                }
                respond_unit(&mut rpc, &event.id, result.map_err(SceneError::from));
            }
            ArCommand::Pause => {
                lifecycle.pause(&mut session);
                frame.0 = None;
                rpc.respond(&event.id, Ok(serde_json::Value::Null));
            }
            ArCommand::Dispose => {
                info!("Disposing AR scene");
                lifecycle.dispose(&mut session);
                frame.0 = None;

                // Pending screenshots keep the frame source alive until they finish.
                for (id, result) in capture.wait_for_workers() {
                    respond_capture(&mut rpc, &id, result);
                }

                for (id, name) in builds.cancel_all() {
                    respond_unit(&mut rpc, &id, Err(SceneError::NodeNotFound(name)));
                }
                for (entity, parent) in &nodes {
                    let has_managed_parent =
                        parent.is_some_and(|parent| nodes.contains(parent.parent()));
                    if !has_managed_parent {
                        commands.entity(entity).despawn();
                    }
                }
                scene.clear();
                gestures.reset();
                rpc.respond(&event.id, Ok(serde_json::Value::Null));
            }
            ArCommand::GetTrackingState => {
                let state = lifecycle.reported_tracking_state(&frame);
                rpc.send_notification(
                    "getTrackingState",
                    serde_json::json!({ "state": state.as_str() }),
                );
                rpc.respond(&event.id, Ok(serde_json::json!({ "state": state.as_str() })));
            }
            ArCommand::TogglePlaneRenderer => {
                config.plane_renderer_visible = !config.plane_renderer_visible;
                debug!("Plane renderer visible: {}", config.plane_renderer_visible);
                rpc.respond(
                    &event.id,
                    Ok(serde_json::json!({ "visible": config.plane_renderer_visible })),
                );
            }
            _ => {}
        }
    }
}

fn apply_init(config: &mut ArSceneConfig, params: &InitParams) {
    if let Some(enabled) = params.enable_tap_recognizer {
        config.enable_tap_recognizer = enabled;
    }
    if !config.enable_tap_recognizer {
        warn!("Tap recognizer disabled; node gestures will not be routed");
    }
    if let Some(enabled) = params.enable_update_listener {
        config.enable_update_listener = enabled;
    }
    if let Some(visible) = params.enable_plane_renderer {
        config.plane_renderer_visible = visible;
    }
}

pub(crate) fn respond_unit(
    rpc: &mut RpcInterface,
    id: &RequestId,
    result: Result<(), SceneError>,
) {
    rpc.respond(
        id,
        result
            .map(|()| serde_json::Value::Null)
            .map_err(RpcError::from),
    );
}

pub(crate) fn respond_capture(
    rpc: &mut RpcInterface,
    id: &RequestId,
    result: Result<std::path::PathBuf, crate::error::CaptureError>,
) {
    rpc.respond(
        id,
        result
            .map(|path| serde_json::json!({ "path": path.to_string_lossy() }))
            .map_err(|e| RpcError::from(SceneError::from(e))),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedSession;

    #[test]
    fn fatal_resume_is_not_retried() {
        let sim = SimulatedSession::new();
        sim.handle().fail_next_resume(SessionFatal::InstallDeclined);
        let mut session = ArSession::new(sim.clone());
        let mut lifecycle = SessionLifecycle::default();

        assert_eq!(
            lifecycle.resume(&mut session),
            Err(SessionFatal::InstallDeclined)
        );
        assert_eq!(lifecycle.phase(), SessionPhase::Failed);

        // The simulated session would succeed now, but the failure sticks.
        assert_eq!(
            lifecycle.resume(&mut session),
            Err(SessionFatal::InstallDeclined)
        );
        assert_eq!(sim.handle().resume_calls(), 1);
    }

    #[test]
    fn pause_only_applies_to_a_running_session() {
        let sim = SimulatedSession::new();
        let mut session = ArSession::new(sim.clone());
        let mut lifecycle = SessionLifecycle::default();

        lifecycle.pause(&mut session);
        assert_eq!(lifecycle.phase(), SessionPhase::Uninitialized);

        lifecycle.resume(&mut session).unwrap();
        lifecycle.pause(&mut session);
        assert_eq!(lifecycle.phase(), SessionPhase::Paused);
        assert!(!sim.handle().is_running());
        assert_eq!(
            lifecycle.reported_tracking_state(&CurrentFrame::default()),
            TrackingState::Paused
        );
    }
}
