mod common;

use std::io::Cursor;

use ar_scene_engine::config::ArSceneConfig;
use ar_scene_engine::engine::anchors::AnchorRoot;
use ar_scene_engine::engine::descriptor::Pose;
use ar_scene_engine::engine::node::{ArNode, NodeKind};
use ar_scene_engine::engine::reconcile::FaceBindingEvent;
use ar_scene_engine::engine::scene_graph::ArScene;
use ar_scene_engine::engine::session::{
    FaceId, FaceMesh, FaceSnapshot, PlaneSnapshot, PlaneType, TrackingState,
};
use bevy::prelude::*;
use common::{Harness, default_config, error_code, sphere};
use constants::rpc_codes;
use serde_json::json;

/// Every face binding event seen so far.
#[derive(Resource, Default)]
struct RecordedBindings(Vec<FaceBindingEvent>);

fn record_bindings(
    mut events: EventReader<FaceBindingEvent>,
    mut recorded: ResMut<RecordedBindings>,
) {
    recorded.0.extend(events.read().copied());
}

fn face_harness() -> Harness {
    let mut harness = Harness::with_config(ArSceneConfig {
        augmented_faces: true,
        ..default_config()
    });
    harness
        .app
        .init_resource::<RecordedBindings>()
        .add_systems(Last, record_bindings);
    harness.resume();
    harness
}

fn triangle() -> FaceMesh {
    FaceMesh {
        vertices: vec![[0.0, 0.0, 0.0], [0.1, 0.0, 0.0], [0.0, 0.1, 0.0]],
        uvs: vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]],
        indices: vec![0, 1, 2],
    }
}

fn face(id: u64, state: TrackingState) -> FaceSnapshot {
    FaceSnapshot {
        id: FaceId(id),
        tracking_state: state,
        center_pose: Pose::new(Vec3::new(id as f32, 0.0, -0.5), Quat::IDENTITY),
        mesh: Some(triangle()),
    }
}

fn plane(plane_type: PlaneType, state: TrackingState) -> PlaneSnapshot {
    PlaneSnapshot {
        plane_type,
        tracking_state: state,
        center_pose: Pose::new(Vec3::new(0.0, -1.0, -2.0), Quat::IDENTITY),
        extent_x: 1.5,
        extent_z: 0.75,
    }
}

fn recorded(harness: &Harness) -> Vec<FaceBindingEvent> {
    harness.app.world().resource::<RecordedBindings>().0.clone()
}

fn png_bytes() -> Vec<u8> {
    let mut bytes = Vec::new();
    image::RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 0, 255]))
        .write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
        .unwrap();
    bytes
}

#[test]
fn tracking_planes_are_reported_once_per_update() {
    let mut harness = Harness::new();
    harness.resume();

    harness
        .sim
        .push_plane_update(plane(PlaneType::Vertical, TrackingState::Tracking));
    harness
        .sim
        .push_plane_update(plane(PlaneType::HorizontalUpwardFacing, TrackingState::Paused));
    harness.update();
    harness.update();

    let detected = harness.notifications("onPlaneDetected");
    assert_eq!(detected.len(), 1);
    assert_eq!(detected[0]["type"], 2);
    assert_eq!(detected[0]["extentX"], 1.5);
    assert_eq!(detected[0]["extentZ"], 0.75);
    assert_eq!(
        detected[0]["centerPose"]["translation"],
        json!([0.0, -1.0, -2.0])
    );
}

#[test]
fn frames_without_camera_tracking_are_skipped_not_queued() {
    let mut harness = Harness::new();
    harness.resume();
    harness.sim.set_camera_state(TrackingState::Paused);
    harness
        .sim
        .push_plane_update(plane(PlaneType::HorizontalUpwardFacing, TrackingState::Tracking));
    harness.update();

    harness.sim.set_camera_state(TrackingState::Tracking);
    harness.update();
    harness.update();
    assert!(harness.notifications("onPlaneDetected").is_empty());
}

#[test]
fn plane_events_follow_the_update_listener_flag() {
    let mut harness = Harness::new();
    harness.resume();
    let response = harness.call("init", json!({ "enableUpdateListener": false }));
    assert!(response["error"].is_null());

    harness
        .sim
        .push_plane_update(plane(PlaneType::Vertical, TrackingState::Tracking));
    harness.update();
    assert!(harness.notifications("onPlaneDetected").is_empty());
}

#[test]
fn face_bindings_follow_the_tracked_face_set() {
    let mut harness = face_harness();

    harness.sim.upsert_face(face(1, TrackingState::Tracking));
    harness.sim.upsert_face(face(2, TrackingState::Tracking));
    harness.update();
    harness.update();

    let scene = harness.app.world().resource::<ArScene>();
    assert_eq!(scene.face_count(), 2);
    let first = scene.face_binding(FaceId(1)).unwrap();
    let second = scene.face_binding(FaceId(2)).unwrap();
    let attached = recorded(&harness)
        .iter()
        .filter(|event| matches!(event, FaceBindingEvent::Attached { .. }))
        .count();
    assert_eq!(attached, 2);

    // Face nodes are managed but not addressable by name.
    assert_eq!(
        harness.get::<ArNode>(first).unwrap().kind,
        NodeKind::Face(FaceId(1))
    );
    assert!(harness.entity("face_1").is_none());

    harness.sim.set_face_state(FaceId(1), TrackingState::Stopped);
    harness.update();
    harness.update();

    let scene = harness.app.world().resource::<ArScene>();
    assert_eq!(scene.face_count(), 1);
    assert_eq!(scene.face_binding(FaceId(2)), Some(second));
    let detached: Vec<_> = recorded(&harness)
        .into_iter()
        .filter(|event| matches!(event, FaceBindingEvent::Detached { .. }))
        .collect();
    assert_eq!(
        detached,
        vec![FaceBindingEvent::Detached {
            face: FaceId(1),
            entity: first
        }]
    );
    assert!(harness.app.world().get_entity(first).is_err());
}

#[test]
fn unchanged_frames_cause_no_binding_churn() {
    let mut harness = face_harness();
    harness.sim.upsert_face(face(7, TrackingState::Tracking));
    harness.update();
    let bound = harness
        .app
        .world()
        .resource::<ArScene>()
        .face_binding(FaceId(7));

    for _ in 0..5 {
        harness.update();
    }

    assert_eq!(recorded(&harness).len(), 1);
    assert_eq!(
        harness
            .app
            .world()
            .resource::<ArScene>()
            .face_binding(FaceId(7)),
        bound
    );
}

#[test]
fn bound_faces_follow_their_pose_and_survive_paused_tracking() {
    let mut harness = face_harness();
    harness.sim.upsert_face(face(3, TrackingState::Tracking));
    harness.update();
    let entity = harness
        .app
        .world()
        .resource::<ArScene>()
        .face_binding(FaceId(3))
        .unwrap();

    let mut moved = face(3, TrackingState::Tracking);
    moved.center_pose.translation = Vec3::new(0.0, 0.2, -0.4);
    harness.sim.upsert_face(moved.clone());
    harness.update();
    assert_eq!(
        harness.get::<Transform>(entity).unwrap().translation,
        Vec3::new(0.0, 0.2, -0.4)
    );

    // Paused faces stay bound but keep their last pose.
    moved.tracking_state = TrackingState::Paused;
    moved.center_pose.translation = Vec3::new(1.0, 1.0, 1.0);
    harness.sim.upsert_face(moved);
    harness.update();
    assert_eq!(
        harness
            .app
            .world()
            .resource::<ArScene>()
            .face_binding(FaceId(3)),
        Some(entity)
    );
    assert_eq!(
        harness.get::<Transform>(entity).unwrap().translation,
        Vec3::new(0.0, 0.2, -0.4)
    );
}

#[test]
fn faces_with_broken_meshes_are_skipped() {
    let mut harness = face_harness();
    let mut broken = face(4, TrackingState::Tracking);
    broken.mesh = Some(FaceMesh {
        indices: vec![0, 1, 9],
        ..triangle()
    });
    harness.sim.upsert_face(broken);
    harness.sim.upsert_face(face(5, TrackingState::Tracking));
    harness.update();

    let scene = harness.app.world().resource::<ArScene>();
    assert_eq!(scene.face_count(), 1);
    assert!(scene.face_binding(FaceId(5)).is_some());
}

#[test]
fn removed_faces_are_detached() {
    let mut harness = face_harness();
    harness.sim.upsert_face(face(8, TrackingState::Tracking));
    harness.update();
    harness.sim.remove_face(FaceId(8));
    harness.update();

    assert_eq!(harness.app.world().resource::<ArScene>().face_count(), 0);
    assert_eq!(recorded(&harness).len(), 2);
}

#[test]
fn face_textures_are_validated() {
    let mut harness = face_harness();

    let loaded = harness.call("loadMesh", json!({ "textureBytes": png_bytes() }));
    assert!(loaded["error"].is_null(), "{loaded}");

    let rejected = harness.call("loadMesh", json!({ "textureBytes": [1, 2, 3] }));
    assert_eq!(error_code(&rejected), Some(rpc_codes::NODE_BUILD_ERROR as i64));
}

#[test]
fn lost_anchors_hide_their_subtree() {
    let mut harness = Harness::new();
    harness.resume();
    harness.call("addArCoreNodeWithAnchor", sphere("poster"));
    let anchor_entity = harness.entity("poster_anchor").unwrap();
    let anchor = harness.get::<AnchorRoot>(anchor_entity).unwrap().anchor;

    harness.sim.move_anchor(
        anchor,
        Pose::new(Vec3::new(0.0, 0.5, -1.0), Quat::IDENTITY),
    );
    harness.update();
    assert_eq!(
        harness.get::<Transform>(anchor_entity).unwrap().translation,
        Vec3::new(0.0, 0.5, -1.0)
    );

    harness.sim.set_anchor_state(anchor, TrackingState::Paused);
    harness.update();
    assert_eq!(
        *harness.get::<Visibility>(anchor_entity).unwrap(),
        Visibility::Hidden
    );

    harness.sim.set_anchor_state(anchor, TrackingState::Tracking);
    harness.update();
    assert_eq!(
        *harness.get::<Visibility>(anchor_entity).unwrap(),
        Visibility::Inherited
    );
}
