//! Asynchronous node construction.
//!
//! A node request becomes a [`PendingBuild`] job entity whose renderable is
//! built on the async compute pool. [`finish_node_builds`] polls the jobs from
//! inside the update chain, so every attach happens on the mutation path.
//!
//! ## Build Flow
//!
//! ```text
//! addArCoreNode / addArCoreNodeWithAnchor
//!   └─> start_node_build()            reserve name, open a batch
//!       └─> PendingBuild (task)       RenderableBuilder::build off-thread
//!           └─> finish_node_builds()
//!               ├─ name no longer reserved  -> discard, release anchor
//!               ├─ build failed             -> release anchor, report
//!               └─ built                    -> resolve parent, spawn node,
//!                                              queue children under it
//! ```
//!
//! One request answers once: when its root node fails, or when the root and
//! every descendant have settled. Child failures are listed in the success
//! payload under `failedChildren`; they never detach earlier siblings.

use std::collections::HashMap;

use bevy::prelude::*;
use bevy::tasks::{AsyncComputeTaskPool, Task, block_on, futures_lite::future};
use constants::naming::anchor_name;

use super::anchors::spawn_anchor_root;
use super::descriptor::{NodeDescriptor, NodeKindTag, Pose};
use super::node::{ArNode, NodeKind, UnanchoredTransformable};
use super::renderable::{NodeAssets, Renderable, RenderableFactory};
use super::scene_graph::ArScene;
use super::session::{AnchorId, ArSession, CurrentFrame};
use super::spin::Spin;
use crate::config::ArSceneConfig;
use crate::error::{AnchorCreationError, NodeBuildError, SceneError};
use crate::rpc::channel::{RequestId, RpcError, RpcInterface};
use crate::tools::gestures::TransformableNode;

/// Where a built node goes.
#[derive(Debug, Clone, PartialEq)]
pub enum Placement {
    /// Top-level request; the parent is looked up by name once built.
    Root { parent_name: Option<String> },
    /// Root of an anchor created when the request arrived.
    Anchored { anchor: AnchorId, pose: Pose },
    /// Child of a node built earlier in the same request.
    Child { parent: Entity },
}

impl Placement {
    fn anchor(&self) -> Option<AnchorId> {
        match self {
            Self::Anchored { anchor, .. } => Some(*anchor),
            _ => None,
        }
    }
}

/// Job entity holding one in-flight renderable build.
#[derive(Component)]
pub struct PendingBuild {
    task: Task<Result<Renderable, NodeBuildError>>,
    descriptor: NodeDescriptor,
    placement: Placement,
    batch: u64,
    is_batch_root: bool,
}

/// Outstanding work of one add request.
struct BuildBatch {
    id: RequestId,
    root: String,
    outstanding: usize,
    anchored: bool,
    degraded: bool,
    failed_children: Vec<serde_json::Value>,
}

enum BuildOutcome {
    Attached { anchored: bool, degraded: bool },
    Failed(SceneError),
    Discarded,
}

/// Names reserved by in-flight builds and the requests waiting on them.
#[derive(Resource, Default)]
pub struct NodeBuilds {
    pending: HashMap<String, Entity>,
    batches: HashMap<u64, BuildBatch>,
    next_batch: u64,
}

impl NodeBuilds {
    pub fn is_pending(&self, name: &str) -> bool {
        self.pending.contains_key(name)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drop the reservation; the build result is discarded when it lands.
    pub fn cancel(&mut self, name: &str) -> bool {
        self.pending.remove(name).is_some()
    }

    /// Cancel everything, returning the requests that will never complete.
    pub fn cancel_all(&mut self) -> Vec<(RequestId, String)> {
        self.pending.clear();
        self.batches
            .drain()
            .map(|(_, batch)| (batch.id, batch.root))
            .collect()
    }

    fn take_reservation(&mut self, name: &str, job: Entity) -> bool {
        if self.pending.get(name) == Some(&job) {
            self.pending.remove(name);
            true
        } else {
            false
        }
    }

    fn settle(
        &mut self,
        batch_id: u64,
        is_batch_root: bool,
        name: &str,
        outcome: BuildOutcome,
        rpc: &mut RpcInterface,
    ) {
        let Some(batch) = self.batches.get_mut(&batch_id) else {
            return;
        };
        batch.outstanding = batch.outstanding.saturating_sub(1);

        let root_error = match outcome {
            BuildOutcome::Attached { anchored, degraded } => {
                if is_batch_root {
                    batch.anchored = anchored;
                    batch.degraded = degraded;
                }
                None
            }
            BuildOutcome::Failed(error) if is_batch_root => Some(error),
            BuildOutcome::Failed(error) => {
                warn!("Child node '{}' failed: {}", name, error);
                batch.failed_children.push(serde_json::json!({
                    "name": name,
                    "code": error.code(),
                    "message": error.to_string(),
                }));
                None
            }
            BuildOutcome::Discarded if is_batch_root => {
                Some(SceneError::NodeNotFound(name.to_string()))
            }
            BuildOutcome::Discarded => None,
        };

        if let Some(error) = root_error {
            if let Some(batch) = self.batches.remove(&batch_id) {
                rpc.respond(&batch.id, Err(RpcError::from(error)));
            }
            return;
        }

        if batch.outstanding == 0 {
            if let Some(batch) = self.batches.remove(&batch_id) {
                rpc.respond(
                    &batch.id,
                    Ok(serde_json::json!({
                        "name": batch.root,
                        "anchored": batch.anchored,
                        "degraded": batch.degraded,
                        "failedChildren": batch.failed_children,
                    })),
                );
            }
        }
    }
}

/// Reserve the request's root name and start building it.
pub fn start_node_build(
    commands: &mut Commands,
    builds: &mut NodeBuilds,
    factory: &RenderableFactory,
    descriptor: NodeDescriptor,
    placement: Placement,
    reply: RequestId,
) {
    let batch = builds.next_batch;
    builds.next_batch += 1;
    builds.batches.insert(
        batch,
        BuildBatch {
            id: reply,
            root: descriptor.name.clone(),
            outstanding: 0,
            anchored: false,
            degraded: false,
            failed_children: Vec::new(),
        },
    );
    queue_build(commands, builds, factory, descriptor, placement, batch, true);
}

fn queue_build(
    commands: &mut Commands,
    builds: &mut NodeBuilds,
    factory: &RenderableFactory,
    descriptor: NodeDescriptor,
    placement: Placement,
    batch: u64,
    is_batch_root: bool,
) {
    let builder = factory.0.clone();
    let mut build_input = descriptor.clone();
    build_input.children.clear();
    let task = AsyncComputeTaskPool::get().spawn(async move { builder.build(&build_input) });

    let name = descriptor.name.clone();
    let job = commands
        .spawn(PendingBuild {
            task,
            descriptor,
            placement,
            batch,
            is_batch_root,
        })
        .id();
    builds.pending.insert(name, job);
    if let Some(batch) = builds.batches.get_mut(&batch) {
        batch.outstanding += 1;
    }
}

/// Resolved attachment point of a finished build.
enum Attachment {
    Root,
    Under(Entity),
    Anchor { anchor: AnchorId, pose: Pose },
    /// Transformable root without an anchor.
    Degraded,
}

/// Poll finished builds and attach their nodes.
pub fn finish_node_builds(
    mut commands: Commands,
    mut jobs: Query<(Entity, &mut PendingBuild)>,
    mut builds: ResMut<NodeBuilds>,
    mut scene: ResMut<ArScene>,
    factory: Res<RenderableFactory>,
    mut session: ResMut<ArSession>,
    frame: Res<CurrentFrame>,
    live_nodes: Query<(), With<ArNode>>,
    mut assets: NodeAssets,
    config: Res<ArSceneConfig>,
    mut rpc: ResMut<RpcInterface>,
) {
    for (job_entity, mut job) in &mut jobs {
        let Some(result) = block_on(future::poll_once(&mut job.task)) else {
            continue;
        };
        commands.entity(job_entity).despawn();

        let descriptor = &job.descriptor;
        let name = descriptor.name.clone();

        if !builds.take_reservation(&name, job_entity) {
            debug!("Discarding build of removed node '{}'", name);
            release_anchor(&mut session, &job.placement);
            builds.settle(
                job.batch,
                job.is_batch_root,
                &name,
                BuildOutcome::Discarded,
                &mut rpc,
            );
            continue;
        }

        let built = result
            .and_then(|renderable| assets.instantiate(renderable))
            .map_err(SceneError::from);
        let handles = match built {
            Ok(handles) => handles,
            Err(error) => {
                error!("Failed to build node '{}': {}", name, error);
                release_anchor(&mut session, &job.placement);
                builds.settle(
                    job.batch,
                    job.is_batch_root,
                    &name,
                    BuildOutcome::Failed(error),
                    &mut rpc,
                );
                continue;
            }
        };

        let attachment = match resolve_attachment(
            descriptor,
            &job.placement,
            &scene,
            &live_nodes,
            &mut session,
            &frame,
        ) {
            Ok(Some(attachment)) => attachment,
            Ok(None) => {
                debug!("Parent of '{}' is gone, discarding", name);
                builds.settle(
                    job.batch,
                    job.is_batch_root,
                    &name,
                    BuildOutcome::Discarded,
                    &mut rpc,
                );
                continue;
            }
            Err(error) => {
                release_anchor(&mut session, &job.placement);
                builds.settle(
                    job.batch,
                    job.is_batch_root,
                    &name,
                    BuildOutcome::Failed(error),
                    &mut rpc,
                );
                continue;
            }
        };

        let degraded = matches!(attachment, Attachment::Degraded);
        let (parent, transform, anchored) = match attachment {
            Attachment::Root | Attachment::Degraded => (None, descriptor.local_transform(), false),
            Attachment::Under(parent) => (Some(parent), descriptor.local_transform(), false),
            Attachment::Anchor { anchor, pose } => {
                let root = spawn_anchor_root(&mut commands, &name, anchor, pose);
                scene.register(anchor_name(&name), root);
                (Some(root), descriptor.anchored_transform(), true)
            }
        };

        let kind = if descriptor.is_transformable {
            NodeKind::Transformable
        } else {
            NodeKind::Plain
        };
        let mut node = commands.spawn((
            Name::new(name.clone()),
            ArNode::new(name.clone(), kind),
            transform,
            Visibility::default(),
        ));
        handles.insert_into(&mut node);
        if let Some(parent) = parent {
            node.insert(ChildOf(parent));
        }
        if descriptor.kind == NodeKindTag::Rotating {
            node.insert(Spin {
                degrees_per_second: descriptor.degrees_per_second.unwrap_or(0.0),
            });
        }
        if kind.accepts_gestures() {
            let transformable = TransformableNode::new(
                descriptor.enable_pan_gestures,
                descriptor.enable_rotation_gestures,
            );
            if degraded {
                node.insert((transformable.with_rotation_locked(), UnanchoredTransformable));
            } else {
                node.insert(transformable);
            }
        }
        let entity = node.id();
        scene.register(name.clone(), entity);
        if config.debug {
            debug!("Attached '{}' as {:?} (anchored: {})", name, entity, anchored);
        }

        for child in &descriptor.children {
            let mut child = child.clone();
            child.parent_node_name = Some(name.clone());
            if scene.contains(&child.name) || builds.is_pending(&child.name) {
                let error = SceneError::DuplicateName(child.name.clone());
                builds.settle_child_refusal(job.batch, &child.name, error, &mut rpc);
                continue;
            }
            queue_build(
                &mut commands,
                &mut builds,
                &factory,
                child,
                Placement::Child { parent: entity },
                job.batch,
                false,
            );
        }

        builds.settle(
            job.batch,
            job.is_batch_root,
            &name,
            BuildOutcome::Attached { anchored, degraded },
            &mut rpc,
        );
    }
}

impl NodeBuilds {
    /// Record a child that was refused before its build started.
    fn settle_child_refusal(
        &mut self,
        batch_id: u64,
        name: &str,
        error: SceneError,
        rpc: &mut RpcInterface,
    ) {
        // Count it as outstanding so settling keeps the totals balanced.
        if let Some(batch) = self.batches.get_mut(&batch_id) {
            batch.outstanding += 1;
        }
        self.settle(batch_id, false, name, BuildOutcome::Failed(error), rpc);
    }
}

fn resolve_attachment(
    descriptor: &NodeDescriptor,
    placement: &Placement,
    scene: &ArScene,
    live_nodes: &Query<(), With<ArNode>>,
    session: &mut ArSession,
    frame: &CurrentFrame,
) -> Result<Option<Attachment>, SceneError> {
    match placement {
        Placement::Child { parent } => {
            Ok(live_nodes.contains(*parent).then_some(Attachment::Under(*parent)))
        }
        Placement::Anchored { anchor, pose } => {
            if scene.contains(&anchor_name(&descriptor.name)) {
                return Err(SceneError::DuplicateName(anchor_name(&descriptor.name)));
            }
            Ok(Some(Attachment::Anchor {
                anchor: *anchor,
                pose: *pose,
            }))
        }
        Placement::Root { parent_name } => {
            if let Some(parent) = parent_name.as_deref().and_then(|parent| scene.get(parent)) {
                return Ok(Some(Attachment::Under(parent)));
            }
            if let Some(missing) = parent_name {
                warn!(
                    "Parent '{}' of '{}' not found, attaching at scene root",
                    missing, descriptor.name
                );
            }
            if !descriptor.is_transformable {
                return Ok(Some(Attachment::Root));
            }
            if scene.contains(&anchor_name(&descriptor.name)) {
                return Err(SceneError::DuplicateName(anchor_name(&descriptor.name)));
            }
            Ok(Some(synthesize_anchor(descriptor, session, frame)))
        }
    }
}

/// Transformable roots always get an anchor; failing that they attach
/// directly, flagged and with rotation locked.
fn synthesize_anchor(
    descriptor: &NodeDescriptor,
    session: &mut ArSession,
    frame: &CurrentFrame,
) -> Attachment {
    let pose = descriptor.pose();
    let created = if frame.is_tracking() {
        session.0.create_anchor(pose)
    } else {
        Err(AnchorCreationError::NotTracking)
    };

    match created {
        Ok(anchor) => Attachment::Anchor { anchor, pose },
        Err(error) => {
            error!(
                "Anchor synthesis for '{}' failed ({}); attaching without anchor, rotation locked",
                descriptor.name, error
            );
            Attachment::Degraded
        }
    }
}

fn release_anchor(session: &mut ArSession, placement: &Placement) {
    if let Some(anchor) = placement.anchor() {
        session.0.release_anchor(anchor);
    }
}
