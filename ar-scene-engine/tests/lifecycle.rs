mod common;

use ar_scene_engine::config::ArSceneConfig;
use ar_scene_engine::engine::descriptor::Pose;
use ar_scene_engine::engine::lifecycle::{SessionFailed, SessionLifecycle, SessionPhase};
use ar_scene_engine::engine::node::ArNode;
use ar_scene_engine::engine::reconcile::PlaneVisualization;
use ar_scene_engine::engine::scene_graph::ArScene;
use ar_scene_engine::engine::session::{PlaneSnapshot, PlaneType, TrackingState};
use ar_scene_engine::error::SessionFatal;
use bevy::prelude::*;
use common::{Harness, default_config, error_code, sphere};
use constants::rpc_codes;
use serde_json::{Value, json};

fn phase(harness: &Harness) -> SessionPhase {
    harness.app.world().resource::<SessionLifecycle>().phase()
}

#[test]
fn tracking_state_follows_the_session_cycle() {
    let mut harness = Harness::new();

    let before = harness.call("getTrackingState", Value::Null);
    assert_eq!(before["result"]["state"], "STOPPED");

    harness.resume();
    assert_eq!(phase(&harness), SessionPhase::Running);
    let running = harness.call("getTrackingState", Value::Null);
    assert_eq!(running["result"]["state"], "TRACKING");

    harness.sim.set_camera_state(TrackingState::Paused);
    harness.update();
    let lost = harness.call("getTrackingState", Value::Null);
    assert_eq!(lost["result"]["state"], "PAUSED");

    harness.call("pause", Value::Null);
    assert_eq!(phase(&harness), SessionPhase::Paused);
    assert!(!harness.sim.is_running());

    let notified: Vec<_> = harness
        .notifications("getTrackingState")
        .into_iter()
        .map(|params| params["state"].clone())
        .collect();
    assert_eq!(notified, vec![json!("STOPPED"), json!("TRACKING"), json!("PAUSED")]);
}

#[test]
fn fatal_resume_fails_once_and_sticks() {
    let mut harness = Harness::new();
    harness
        .sim
        .fail_next_resume(SessionFatal::Unsupported("no depth camera".into()));

    let failed = harness.call("resume", Value::Null);
    assert_eq!(error_code(&failed), Some(rpc_codes::SESSION_FATAL as i64));
    assert_eq!(failed["error"]["data"]["kind"], "SessionFatal");
    assert_eq!(phase(&harness), SessionPhase::Failed);
    let events = harness.app.world().resource::<Events<SessionFailed>>();
    assert!(!events.is_empty());

    let again = harness.call("resume", Value::Null);
    assert_eq!(error_code(&again), Some(rpc_codes::SESSION_FATAL as i64));
    assert_eq!(harness.sim.resume_calls(), 1);
}

#[test]
fn paused_sessions_stop_the_frame_loop() {
    let mut harness = Harness::new();
    harness.resume();
    harness.call("pause", Value::Null);

    harness.sim.push_plane_update(PlaneSnapshot {
        plane_type: PlaneType::Vertical,
        tracking_state: TrackingState::Tracking,
        center_pose: Pose::IDENTITY,
        extent_x: 1.0,
        extent_z: 1.0,
    });
    harness.update();
    assert!(harness.notifications("onPlaneDetected").is_empty());

    let anchored = harness.call("addArCoreNodeWithAnchor", sphere("late"));
    assert_eq!(error_code(&anchored), Some(rpc_codes::ANCHOR_CREATION_ERROR as i64));

    harness.resume();
    harness.update();
    assert_eq!(harness.notifications("onPlaneDetected").len(), 1);
}

#[test]
fn dispose_tears_the_scene_down() {
    let mut harness = Harness::new();
    harness.resume();
    harness.call("addArCoreNode", json!({ "name": "chair", "isTransformable": true }));
    harness.call("addArCoreNodeWithAnchor", sphere("poster"));
    harness.call(
        "addArCoreNode",
        json!({ "name": "table", "children": [sphere("cup")] }),
    );
    assert_eq!(harness.sim.live_anchors().len(), 2);

    let disposed = harness.call("dispose", Value::Null);
    assert!(disposed["error"].is_null());
    harness.update();

    assert_eq!(phase(&harness), SessionPhase::Disposed);
    assert!(harness.app.world().resource::<ArScene>().is_empty());
    assert!(harness.sim.live_anchors().is_empty());
    assert!(!harness.sim.is_running());
    let mut nodes = harness.app.world_mut().query::<&ArNode>();
    assert_eq!(nodes.iter(harness.app.world()).count(), 0);
}

#[test]
fn plane_renderer_toggles_visualizations() {
    let mut harness = Harness::new();
    let plane = harness
        .app
        .world_mut()
        .spawn((PlaneVisualization, Visibility::Inherited))
        .id();

    let hidden = harness.call("togglePlaneRenderer", Value::Null);
    assert_eq!(hidden["result"]["visible"], false);
    harness.update();
    assert_eq!(*harness.get::<Visibility>(plane).unwrap(), Visibility::Hidden);

    let shown = harness.call("togglePlaneRenderer", Value::Null);
    assert_eq!(shown["result"]["visible"], true);
    harness.update();
    assert_eq!(*harness.get::<Visibility>(plane).unwrap(), Visibility::Inherited);
}

#[test]
fn init_flags_update_the_live_configuration() {
    let mut harness = Harness::with_config(ArSceneConfig::default());
    let response = harness.call(
        "init",
        json!({ "enableTapRecognizer": true, "enableUpdateListener": true, "enablePlaneRenderer": false }),
    );
    assert!(response["error"].is_null());

    let config = harness.app.world().resource::<ArSceneConfig>();
    assert!(config.enable_tap_recognizer);
    assert!(config.enable_update_listener);
    assert!(!config.plane_renderer_visible);

    // Omitted flags keep their current values.
    harness.call("init", Value::Null);
    assert!(harness.app.world().resource::<ArSceneConfig>().enable_tap_recognizer);
}

#[test]
fn screenshots_are_written_and_reported() {
    let directory = std::env::temp_dir().join(format!("ar-screenshot-{}", std::process::id()));
    let mut config = default_config();
    config.screenshot.directory = directory.clone();
    let mut harness = Harness::with_config(config);

    let early = harness.call("takeScreenshot", Value::Null);
    assert_eq!(error_code(&early), Some(rpc_codes::TRACKING_UNAVAILABLE as i64));

    harness.resume();
    let response = harness.call("takeScreenshot", Value::Null);
    assert!(response["error"].is_null(), "{response}");
    let path = response["result"]["path"].as_str().unwrap();
    assert_eq!(std::path::Path::new(path), directory.join("rawScreenshot.jpg"));
    let written = image::open(path).unwrap();
    assert_eq!((written.width(), written.height()), (4, 4));

    let _ = std::fs::remove_dir_all(directory);
}

#[test]
fn dispose_behind_an_add_still_clears_the_new_node() {
    let mut harness = Harness::new();
    harness.resume();

    let added = harness.send("addArCoreNode", sphere("lamp"));
    let disposed = harness.send("dispose", Value::Null);
    let disposed = harness.wait_for(disposed);
    assert!(disposed["error"].is_null(), "{disposed}");

    // The add settled first: either attached and torn down, or cancelled.
    let added = harness.wait_for(added);
    assert!(
        added["error"].is_null()
            || error_code(&added) == Some(rpc_codes::NODE_NOT_FOUND as i64),
        "{added}"
    );

    for _ in 0..5 {
        harness.update();
    }
    assert!(harness.entity("lamp").is_none());
    assert!(harness.app.world().resource::<ArScene>().is_empty());
    let mut nodes = harness.app.world_mut().query::<&ArNode>();
    assert_eq!(nodes.iter(harness.app.world()).count(), 0);
}

#[test]
fn pause_behind_an_anchored_add_waits_its_turn() {
    let mut harness = Harness::new();
    harness.resume();

    let added = harness.send("addArCoreNodeWithAnchor", sphere("poster"));
    let paused = harness.send("pause", Value::Null);
    harness.update();

    // Only the add ran this update.
    assert!(harness.response(paused).is_none());
    assert_eq!(phase(&harness), SessionPhase::Running);

    let paused = harness.wait_for(paused);
    assert!(paused["error"].is_null());
    assert_eq!(phase(&harness), SessionPhase::Paused);
    let added = harness.wait_for(added);
    assert!(added["error"].is_null(), "{added}");
    assert_eq!(harness.sim.live_anchors().len(), 1);
}
