//! Scene graph manager: the name index and the node commands.
//!
//! The hierarchy lives in Bevy (`ChildOf`/`Children`); [`ArScene`] only maps
//! unique names to entities. Node commands are interpreted here, in the
//! `Commands` set of the update chain, so they never interleave with the
//! reconciliation pass or gesture routing.
//!
//! ## Anchor Safety
//!
//! A transformable node is never attached directly at the scene root. Either
//! the request carries an anchor (`addArCoreNodeWithAnchor`), or an anchor is
//! synthesized at the node's own pose when its build completes. If that
//! fails the node is attached directly as a degraded path, flagged with
//! [`super::node::UnanchoredTransformable`] and with rotation locked.
//!
//! ## Removal
//!
//! Removal is idempotent. An anchor-rooted node takes its anchor wrapper
//! (and so the anchor itself) with it; a node still building has its
//! reservation dropped and its result discarded when the build lands.
//! The removed subtree leaves the name index immediately, before the
//! despawn is applied.

use std::collections::HashMap;

use bevy::prelude::*;
use constants::naming::anchor_name;

use super::descriptor::NodeDescriptor;
use super::lifecycle::{SessionLifecycle, respond_unit};
use super::node::ArNode;
use super::node_factory::{NodeBuilds, Placement, start_node_build};
use super::renderable::{NodeAssets, RenderableFactory, apply_material_spec};
use super::session::{ArSession, CurrentFrame, FaceId};
use super::spin::Spin;
use crate::config::ArSceneConfig;
use crate::error::{AnchorCreationError, SceneError};
use crate::rpc::channel::RpcInterface;
use crate::rpc::commands::{ArCommand, ArCommandEvent};
use crate::tools::gestures::TransformableNode;

/// Name index of live nodes plus the face bindings.
#[derive(Resource, Default)]
pub struct ArScene {
    nodes: HashMap<String, Entity>,
    faces: HashMap<FaceId, Entity>,
}

impl ArScene {
    pub fn get(&self, name: &str) -> Option<Entity> {
        self.nodes.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn register(&mut self, name: String, entity: Entity) {
        if let Some(previous) = self.nodes.insert(name.clone(), entity) {
            if previous != entity {
                warn!("Name '{}' re-registered over {:?}", name, previous);
            }
        }
    }

    /// Drop `name` only if it still points at `entity`.
    pub(crate) fn forget(&mut self, name: &str, entity: Entity) -> bool {
        if self.nodes.get(name) == Some(&entity) {
            self.nodes.remove(name);
            true
        } else {
            false
        }
    }

    pub fn face_binding(&self, face: FaceId) -> Option<Entity> {
        self.faces.get(&face).copied()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn bound_faces(&self) -> impl Iterator<Item = (FaceId, Entity)> + '_ {
        self.faces.iter().map(|(face, entity)| (*face, *entity))
    }

    pub(crate) fn bind_face(&mut self, face: FaceId, entity: Entity) {
        self.faces.insert(face, entity);
    }

    pub(crate) fn unbind_face(&mut self, face: FaceId) -> Option<Entity> {
        self.faces.remove(&face)
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.faces.clear();
    }
}

/// Keep the index in step with despawns, whatever despawned the node.
pub fn forget_removed_node(
    trigger: Trigger<OnRemove, ArNode>,
    nodes: Query<&ArNode>,
    mut scene: ResMut<ArScene>,
) {
    let entity = trigger.target();
    if let Ok(node) = nodes.get(entity) {
        if node.is_indexed() && scene.forget(&node.name, entity) {
            debug!("Node '{}' left the scene", node.name);
        }
    }
}

/// Interpret node commands: add, remove, rotation, materials, gestures.
pub fn apply_node_commands(
    mut events: EventReader<ArCommandEvent>,
    mut scene: ResMut<ArScene>,
    mut builds: ResMut<NodeBuilds>,
    factory: Res<RenderableFactory>,
    lifecycle: Res<SessionLifecycle>,
    mut session: ResMut<ArSession>,
    frame: Res<CurrentFrame>,
    config: Res<ArSceneConfig>,
    nodes: Query<(&ArNode, Option<&ChildOf>)>,
    children: Query<&Children>,
    mut transformables: Query<&mut TransformableNode>,
    material_handles: Query<&MeshMaterial3d<StandardMaterial>>,
    mut assets: NodeAssets,
    mut rpc: ResMut<RpcInterface>,
    mut commands: Commands,
) {
    for event in events.read() {
        match &event.command {
            ArCommand::AddNode(descriptor) => {
                log_descriptor(&config, "addArCoreNode", descriptor);
                if let Err(error) = check_names_free(&scene, &builds, descriptor) {
                    respond_unit(&mut rpc, &event.id, Err(error));
                    continue;
                }
                start_node_build(
                    &mut commands,
                    &mut builds,
                    &factory,
                    descriptor.clone(),
                    Placement::Root {
                        parent_name: descriptor.parent_node_name.clone(),
                    },
                    event.id.clone(),
                );
            }
            ArCommand::AddNodeWithAnchor(descriptor) => {
                log_descriptor(&config, "addArCoreNodeWithAnchor", descriptor);
                let anchor = check_names_free(&scene, &builds, descriptor).and_then(|()| {
                    if !lifecycle.is_running() {
                        return Err(AnchorCreationError::SessionNotRunning.into());
                    }
                    if !frame.is_tracking() {
                        return Err(AnchorCreationError::NotTracking.into());
                    }
                    Ok(session.0.create_anchor(descriptor.pose())?)
                });
                match anchor {
                    Ok(anchor) => start_node_build(
                        &mut commands,
                        &mut builds,
                        &factory,
                        descriptor.clone(),
                        Placement::Anchored {
                            anchor,
                            pose: descriptor.pose(),
                        },
                        event.id.clone(),
                    ),
                    Err(error) => {
                        warn!("Cannot anchor '{}': {}", descriptor.name, error);
                        respond_unit(&mut rpc, &event.id, Err(error));
                    }
                }
            }
            ArCommand::RemoveNode { node_name } => {
                remove_node(
                    node_name,
                    &mut scene,
                    &mut builds,
                    &nodes,
                    &children,
                    &mut commands,
                );
                respond_unit(&mut rpc, &event.id, Ok(()));
            }
            ArCommand::RotationChanged {
                name,
                degrees_per_second,
            } => {
                let result = lookup(&scene, name).map(|entity| {
                    commands.entity(entity).try_insert(Spin {
                        degrees_per_second: *degrees_per_second,
                    });
                });
                respond_unit(&mut rpc, &event.id, result);
            }
            ArCommand::UpdateMaterials { name, materials } => {
                let result = lookup(&scene, name).and_then(|entity| {
                    let spec = materials.first().ok_or_else(|| {
                        SceneError::InvalidDescriptor("no material given".to_string())
                    })?;
                    let handle = material_handles.get(entity).map_err(|_| {
                        SceneError::InvalidDescriptor(format!("node '{name}' has no material"))
                    })?;

                    // Copy, never mutate: the material may be shared.
                    let mut material = assets
                        .materials
                        .get(&handle.0)
                        .cloned()
                        .unwrap_or_default();
                    let texture = apply_material_spec(&mut material, spec)?;
                    let copy = assets.add_material(material, texture);
                    commands.entity(entity).try_insert(MeshMaterial3d(copy));
                    Ok(())
                });
                respond_unit(&mut rpc, &event.id, result);
            }
            ArCommand::UpdateGestures {
                name,
                enable_pan_gestures,
                enable_rotation_gestures,
            } => {
                let result = lookup(&scene, name).and_then(|entity| {
                    let not_transformable = || {
                        SceneError::InvalidDescriptor(format!("node '{name}' is not transformable"))
                    };
                    let accepts = nodes
                        .get(entity)
                        .is_ok_and(|(node, _)| node.kind.accepts_gestures());
                    if !accepts {
                        return Err(not_transformable());
                    }
                    let mut transformable =
                        transformables.get_mut(entity).map_err(|_| not_transformable())?;
                    if let Some(enabled) = enable_pan_gestures {
                        transformable.set_pan_enabled(*enabled);
                    }
                    if let Some(enabled) = enable_rotation_gestures {
                        transformable.set_rotation_enabled(*enabled);
                    }
                    debug!(
                        "Gestures on '{}': pan {}, rotation {}",
                        name,
                        transformable.pan_enabled(),
                        transformable.rotation_enabled()
                    );
                    Ok(())
                });
                respond_unit(&mut rpc, &event.id, result);
            }
            _ => {}
        }
    }
}

fn lookup(scene: &ArScene, name: &str) -> Result<Entity, SceneError> {
    scene
        .get(name)
        .ok_or_else(|| SceneError::NodeNotFound(name.to_string()))
}

fn check_names_free(
    scene: &ArScene,
    builds: &NodeBuilds,
    descriptor: &NodeDescriptor,
) -> Result<(), SceneError> {
    let taken = |name: &str| scene.contains(name) || builds.is_pending(name);
    if taken(&descriptor.name) {
        return Err(SceneError::DuplicateName(descriptor.name.clone()));
    }
    let anchor = anchor_name(&descriptor.name);
    if taken(&anchor) {
        return Err(SceneError::DuplicateName(anchor));
    }
    Ok(())
}

fn log_descriptor(config: &ArSceneConfig, method: &str, descriptor: &NodeDescriptor) {
    if config.debug {
        debug!("{}: {:?}", method, descriptor);
    }
}

/// Despawn a node (through its anchor wrapper if it has one) or cancel its
/// build. Unknown names are ignored.
fn remove_node(
    name: &str,
    scene: &mut ArScene,
    builds: &mut NodeBuilds,
    nodes: &Query<(&ArNode, Option<&ChildOf>)>,
    children: &Query<&Children>,
    commands: &mut Commands,
) {
    if builds.cancel(name) {
        debug!("Cancelled pending build of '{}'", name);
    }

    let Some(entity) = scene.get(name) else {
        return;
    };
    let Ok((node, parent)) = nodes.get(entity) else {
        scene.forget(name, entity);
        return;
    };

    let parent = parent.and_then(|parent| {
        let parent = parent.parent();
        nodes.get(parent).ok().map(|(parent_node, _)| (parent, parent_node))
    });
    let target = node.detach_target(entity, parent);

    // Unindex the whole subtree now: later commands of this update must not
    // reach entities the despawn below removes.
    scene.forget(name, entity);
    if let Some((parent_entity, parent_node)) = parent {
        if parent_entity == target {
            scene.forget(&parent_node.name, parent_entity);
        }
    }
    for descendant in children.iter_descendants(target) {
        if let Ok((node, _)) = nodes.get(descendant) {
            if node.is_indexed() {
                scene.forget(&node.name, descendant);
            }
        }
    }

    info!("Removing node '{}'", name);
    commands.entity(target).despawn();
}
