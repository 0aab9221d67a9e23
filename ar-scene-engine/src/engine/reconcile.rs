//! Per-frame reconciliation against tracked entities.
//!
//! Runs in the `Reconcile` set only while the session is running and the
//! camera is tracking; otherwise the frame is skipped, not queued.
//!
//! - **Planes**: notify-only. Every plane updated this frame that is tracking
//!   is reported as `onPlaneDetected`.
//! - **Faces**: set reconciliation. After each pass the face bindings equal
//!   the faces the session reports as not stopped. Bindings are created and
//!   erased only here; an unchanged frame produces no churn.

use std::collections::HashMap;

use bevy::asset::RenderAssetUsages;
use bevy::prelude::*;
use bevy::render::mesh::{Indices, PrimitiveTopology};
use constants::naming::FACE_NODE_PREFIX;
use constants::render_settings::FACE_PLACEHOLDER_ARGB;

use super::lifecycle::respond_unit;
use super::node::{ArNode, NodeKind};
use super::renderable::{NodeAssets, argb_color, decode_texture};
use super::scene_graph::ArScene;
use super::session::{CurrentFrame, FaceId, FaceMesh, TrackingState};
use crate::config::ArSceneConfig;
use crate::error::{NodeBuildError, SceneError};
use crate::rpc::channel::RpcInterface;
use crate::rpc::commands::{ArCommand, ArCommandEvent};

/// Emitted when a face binding is created or erased.
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceBindingEvent {
    Attached { face: FaceId, entity: Entity },
    Detached { face: FaceId, entity: Entity },
}

/// Shared material of every face node.
#[derive(Resource, Default)]
pub struct FaceResources {
    material: Option<Handle<StandardMaterial>>,
}

impl FaceResources {
    fn material(&mut self, assets: &mut NodeAssets) -> Handle<StandardMaterial> {
        self.material
            .get_or_insert_with(|| {
                assets.materials.add(StandardMaterial {
                    base_color: argb_color(FACE_PLACEHOLDER_ARGB),
                    alpha_mode: AlphaMode::Blend,
                    unlit: true,
                    ..default()
                })
            })
            .clone()
    }

    /// Swap in a new face texture; bound faces pick it up in place.
    fn load_texture(&mut self, bytes: &[u8], assets: &mut NodeAssets) -> Result<(), NodeBuildError> {
        let texture = decode_texture(bytes)?;
        let handle = self.material(assets);
        let texture = assets.images.add(texture);
        if let Some(material) = assets.materials.get_mut(&handle) {
            material.base_color = Color::WHITE;
            material.base_color_texture = Some(texture);
        }
        Ok(())
    }
}

/// Marker on the host's plane visualization entities.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct PlaneVisualization;

/// Handle `loadMesh`.
pub fn apply_face_commands(
    mut events: EventReader<ArCommandEvent>,
    mut faces: ResMut<FaceResources>,
    mut assets: NodeAssets,
    mut rpc: ResMut<RpcInterface>,
) {
    for event in events.read() {
        if let ArCommand::LoadMesh { texture_bytes } = &event.command {
            let result = faces
                .load_texture(texture_bytes, &mut assets)
                .map_err(SceneError::from);
            if let Err(error) = &result {
                warn!("Face texture rejected: {}", error);
            }
            respond_unit(&mut rpc, &event.id, result);
        }
    }
}

/// Report planes that changed this frame and are tracking.
pub fn reconcile_planes(
    frame: Res<CurrentFrame>,
    config: Res<ArSceneConfig>,
    mut rpc: ResMut<RpcInterface>,
) {
    if !config.enable_update_listener {
        return;
    }
    let Some(frame) = &frame.0 else {
        return;
    };

    for plane in frame
        .updated_planes
        .iter()
        .filter(|plane| plane.tracking_state == TrackingState::Tracking)
    {
        rpc.send_notification(
            "onPlaneDetected",
            serde_json::json!({
                "type": plane.plane_type.ordinal(),
                "centerPose": plane.center_pose.to_json(),
                "extentX": plane.extent_x,
                "extentZ": plane.extent_z,
            }),
        );
    }
}

/// Make the face bindings equal the set of faces that are not stopped.
pub fn reconcile_faces(
    frame: Res<CurrentFrame>,
    config: Res<ArSceneConfig>,
    mut scene: ResMut<ArScene>,
    mut face_resources: ResMut<FaceResources>,
    mut assets: NodeAssets,
    mut transforms: Query<&mut Transform>,
    mut binding_events: EventWriter<FaceBindingEvent>,
    mut commands: Commands,
) {
    if !config.augmented_faces {
        return;
    }
    let Some(frame) = &frame.0 else {
        return;
    };

    let live: HashMap<FaceId, _> = frame
        .faces
        .iter()
        .filter(|face| face.tracking_state != TrackingState::Stopped)
        .map(|face| (face.id, face))
        .collect();

    let stale: Vec<FaceId> = scene
        .bound_faces()
        .filter(|(face, _)| !live.contains_key(face))
        .map(|(face, _)| face)
        .collect();
    for face in stale {
        if let Some(entity) = scene.unbind_face(face) {
            commands.entity(entity).despawn();
            binding_events.write(FaceBindingEvent::Detached { face, entity });
            debug!("Face {:?} stopped tracking, node detached", face);
        }
    }

    for face in &frame.faces {
        if face.tracking_state == TrackingState::Stopped {
            continue;
        }

        if let Some(entity) = scene.face_binding(face.id) {
            if face.tracking_state == TrackingState::Tracking {
                if let Ok(mut transform) = transforms.get_mut(entity) {
                    transform.set_if_neq(face.center_pose.to_transform());
                }
            }
            continue;
        }

        // A bad mesh only skips this face; it is retried next frame.
        let mesh = match face.mesh.as_ref().map(face_mesh).transpose() {
            Ok(mesh) => mesh,
            Err(error) => {
                warn!("Skipping face {:?}: {}", face.id, error);
                continue;
            }
        };

        let material = face_resources.material(&mut assets);
        let mut node = commands.spawn((
            Name::new(format!("{FACE_NODE_PREFIX}{}", face.id.0)),
            ArNode::new(
                format!("{FACE_NODE_PREFIX}{}", face.id.0),
                NodeKind::Face(face.id),
            ),
            face.center_pose.to_transform(),
            Visibility::default(),
        ));
        if let Some(mesh) = mesh {
            node.insert((Mesh3d(assets.meshes.add(mesh)), MeshMaterial3d(material)));
        }
        let entity = node.id();
        scene.bind_face(face.id, entity);
        binding_events.write(FaceBindingEvent::Attached {
            face: face.id,
            entity,
        });
        debug!("Face {:?} bound to {:?}", face.id, entity);
    }
}

fn face_mesh(source: &FaceMesh) -> Result<Mesh, NodeBuildError> {
    let vertex_count = source.vertices.len();
    if vertex_count == 0 || source.indices.len() % 3 != 0 {
        return Err(NodeBuildError::Geometry(format!(
            "face mesh with {} vertices and {} indices",
            vertex_count,
            source.indices.len()
        )));
    }
    if source
        .indices
        .iter()
        .any(|&index| index as usize >= vertex_count)
    {
        return Err(NodeBuildError::Geometry(
            "face mesh index out of range".to_string(),
        ));
    }
    if !source.uvs.is_empty() && source.uvs.len() != vertex_count {
        return Err(NodeBuildError::Geometry(format!(
            "face mesh has {} uvs for {} vertices",
            source.uvs.len(),
            vertex_count
        )));
    }

    let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
        .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, source.vertices.clone())
        .with_inserted_indices(Indices::U32(source.indices.clone()));
    if !source.uvs.is_empty() {
        mesh.insert_attribute(Mesh::ATTRIBUTE_UV_0, source.uvs.clone());
    }
    Ok(mesh)
}

/// Apply the plane renderer flag to every plane visualization.
pub fn sync_plane_visualization(
    config: Res<ArSceneConfig>,
    mut planes: Query<&mut Visibility, With<PlaneVisualization>>,
) {
    let target = if config.plane_renderer_visible {
        Visibility::Inherited
    } else {
        Visibility::Hidden
    };
    for mut visibility in &mut planes {
        visibility.set_if_neq(target);
    }
}
