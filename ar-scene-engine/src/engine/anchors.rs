//! Binding between world-locked anchors and the node subtrees rooted on them.
//!
//! The tracking subsystem owns the anchor itself. This module owns the root
//! entity named `<node>_anchor`, keeps its transform on the anchor's pose,
//! and releases the anchor when that root is despawned, whichever path
//! despawned it (remove command, parent removal, dispose).

use bevy::prelude::*;
use constants::naming::anchor_name;

use super::descriptor::Pose;
use super::node::{ArNode, NodeKind};
use super::session::{AnchorId, ArSession, TrackingState};

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorRoot {
    pub anchor: AnchorId,
}

/// Spawn the root entity for `anchor`, named after the node it will carry.
pub fn spawn_anchor_root(
    commands: &mut Commands,
    node_name: &str,
    anchor: AnchorId,
    pose: Pose,
) -> Entity {
    let name = anchor_name(node_name);
    commands
        .spawn((
            Name::new(name.clone()),
            ArNode::new(name, NodeKind::AnchorRoot),
            AnchorRoot { anchor },
            pose.to_transform(),
            Visibility::default(),
        ))
        .id()
}

/// Release the anchor once its root leaves the world.
pub fn release_anchor_on_remove(
    trigger: Trigger<OnRemove, AnchorRoot>,
    roots: Query<&AnchorRoot>,
    mut session: ResMut<ArSession>,
) {
    if let Ok(root) = roots.get(trigger.target()) {
        debug!("Releasing anchor {:?}", root.anchor);
        session.0.release_anchor(root.anchor);
    }
}

/// Follow anchor poses; an anchor that lost tracking hides its subtree.
pub fn sync_anchor_poses(
    session: Res<ArSession>,
    mut roots: Query<(&AnchorRoot, &mut Transform, &mut Visibility)>,
) {
    for (root, mut transform, mut visibility) in &mut roots {
        let Some(anchor) = session.0.anchor_pose(root.anchor) else {
            visibility.set_if_neq(Visibility::Hidden);
            continue;
        };

        if anchor.tracking_state == TrackingState::Tracking {
            let target = anchor.pose.to_transform().with_scale(transform.scale);
            transform.set_if_neq(target);
            visibility.set_if_neq(Visibility::Inherited);
        } else {
            visibility.set_if_neq(Visibility::Hidden);
        }
    }
}
