use bevy::prelude::*;

use super::state::*;
use crate::config::ArSceneConfig;
use crate::engine::node::ArNode;
use crate::engine::session::{ArSession, CurrentFrame};
use crate::rpc::channel::RpcInterface;

/// A tap reported by the host: screen position plus whatever entity the
/// engine's picking hit, if any.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct TouchInput {
    pub screen_position: Vec2,
    pub hit: Option<Entity>,
}

impl TouchInput {
    pub fn on_entity(screen_position: Vec2, hit: Entity) -> Self {
        Self {
            screen_position,
            hit: Some(hit),
        }
    }

    pub fn on_empty_space(screen_position: Vec2) -> Self {
        Self {
            screen_position,
            hit: None,
        }
    }
}

/// Route each tap through one ordered decision: transformable node, other
/// node, then empty space.
pub fn route_touches(
    mut touches: EventReader<TouchInput>,
    config: Res<ArSceneConfig>,
    mut controller: ResMut<GestureController>,
    hierarchy: Query<(Option<&ArNode>, Option<&ChildOf>)>,
    session: Res<ArSession>,
    frame: Res<CurrentFrame>,
    mut rpc: ResMut<RpcInterface>,
    mut commands: Commands,
) {
    if !config.enable_tap_recognizer {
        touches.clear();
        return;
    }

    for touch in touches.read() {
        let hit_node = touch.hit.and_then(|hit| owning_node(hit, &hierarchy));

        match hit_node {
            Some((entity, node)) if node.is_transformable() => {
                // Consumed here; never reported as a generic tap.
                if let Some(previous) = controller.select(entity) {
                    if let Ok(mut previous) = commands.get_entity(previous) {
                        previous.remove::<Selected>();
                    }
                }
                commands.entity(entity).insert(Selected);
                debug!("Selected transformable node '{}'", node.name);
            }
            Some((_, node)) => {
                rpc.send_notification("onNodeTap", serde_json::json!({ "name": node.name }));
            }
            None => report_plane_hits(touch.screen_position, &session, &frame, &mut rpc),
        }
    }
}

/// Nearest managed node at or above `entity`.
fn owning_node<'a>(
    mut entity: Entity,
    hierarchy: &'a Query<(Option<&ArNode>, Option<&ChildOf>)>,
) -> Option<(Entity, &'a ArNode)> {
    loop {
        let (node, parent) = hierarchy.get(entity).ok()?;
        if let Some(node) = node {
            return Some((entity, node));
        }
        entity = parent?.parent();
    }
}

fn report_plane_hits(
    screen_position: Vec2,
    session: &ArSession,
    frame: &CurrentFrame,
    rpc: &mut RpcInterface,
) {
    if !frame.is_tracking() {
        debug!("Ignoring tap while the camera is not tracking");
        return;
    }

    let hits: Vec<serde_json::Value> = session
        .0
        .hit_test(screen_position)
        .into_iter()
        .filter(|hit| hit.is_plane_hit())
        .map(|hit| {
            serde_json::json!({
                "distance": hit.distance,
                "translation": hit.pose.translation.to_array(),
                "rotation": hit.pose.rotation.to_array(),
            })
        })
        .collect();

    if !hits.is_empty() {
        rpc.send_notification("onPlaneTap", serde_json::Value::Array(hits));
    }
}

/// Clear selection when a selected or transforming node is removed.
pub fn forget_removed_node(
    trigger: Trigger<OnRemove, TransformableNode>,
    mut controller: ResMut<GestureController>,
) {
    if controller.forget(trigger.target()) {
        debug!("Selected node removed, gesture controller back to idle");
    }
}
