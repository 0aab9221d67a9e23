use bevy::prelude::*;

use super::state::*;
use crate::engine::node::{ArNode, PoseSource};
use crate::rpc::channel::RpcInterface;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManipulationPhase {
    Started,
    Moved,
    Ended,
}

/// Incremental change carried by one manipulation step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ManipulationGesture {
    /// Translation delta in the node's parent space.
    Pan(Vec3),
    /// Rotation delta applied before the current rotation.
    Rotate(Quat),
    /// Uniform scale factor.
    Scale(f32),
}

/// A drag/twist/pinch on a node, as recognised by the host.
#[derive(Event, Debug, Clone, Copy, PartialEq)]
pub struct ManipulationInput {
    pub node: Entity,
    pub phase: ManipulationPhase,
    pub gesture: ManipulationGesture,
}

fn controller_allows(controllers: ControllerSet, gesture: &ManipulationGesture) -> bool {
    match gesture {
        ManipulationGesture::Pan(_) => controllers.translation,
        ManipulationGesture::Rotate(_) => controllers.rotation,
        ManipulationGesture::Scale(_) => controllers.scale,
    }
}

/// Drive the selected node through Transforming and report the final pose.
pub fn apply_manipulations(
    mut inputs: EventReader<ManipulationInput>,
    mut controller: ResMut<GestureController>,
    mut nodes: Query<(&ArNode, &TransformableNode, &mut Transform)>,
    mut rpc: ResMut<RpcInterface>,
) {
    for input in inputs.read() {
        let Ok((node, transformable, mut transform)) = nodes.get_mut(input.node) else {
            continue;
        };
        // Tracked poses are overwritten every frame; only local ones can move.
        let allowed = node.kind.pose_source() == PoseSource::Local
            && controller_allows(transformable.controllers(), &input.gesture);

        match input.phase {
            ManipulationPhase::Started => {
                if allowed && controller.begin_transform(input.node) {
                    debug!("Transforming '{}'", node.name);
                }
            }
            ManipulationPhase::Moved => {
                if !allowed || controller.state() != GestureState::Transforming(input.node) {
                    continue;
                }
                match input.gesture {
                    ManipulationGesture::Pan(delta) => transform.translation += delta,
                    ManipulationGesture::Rotate(delta) => {
                        transform.rotation = (delta * transform.rotation).normalize();
                    }
                    ManipulationGesture::Scale(factor) => transform.scale *= factor,
                }
            }
            ManipulationPhase::Ended => {
                if controller.end_transform(input.node) {
                    rpc.send_notification(
                        "onNodeTransformed",
                        serde_json::json!({
                            "nodeName": node.name,
                            "position": transform.translation.to_array(),
                            "rotation": transform.rotation.to_array(),
                        }),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::node::NodeKind;

    fn setup() -> (App, Entity) {
        let mut app = App::new();
        app.init_resource::<GestureController>()
            .init_resource::<RpcInterface>()
            .add_event::<ManipulationInput>()
            .add_systems(Update, apply_manipulations);
        let node = app
            .world_mut()
            .spawn((
                ArNode::new("chair", NodeKind::Transformable),
                TransformableNode::new(true, false),
                Transform::default(),
            ))
            .id();
        (app, node)
    }

    fn send(app: &mut App, node: Entity, phase: ManipulationPhase, gesture: ManipulationGesture) {
        app.world_mut().send_event(ManipulationInput {
            node,
            phase,
            gesture,
        });
        app.update();
    }

    #[test]
    fn pan_moves_the_selected_node_and_reports_on_end() {
        let (mut app, node) = setup();
        app.world_mut()
            .resource_mut::<GestureController>()
            .select(node);

        let pan = ManipulationGesture::Pan(Vec3::new(0.5, 0.0, 0.0));
        send(&mut app, node, ManipulationPhase::Started, pan);
        assert_eq!(
            app.world().resource::<GestureController>().state(),
            GestureState::Transforming(node)
        );
        send(&mut app, node, ManipulationPhase::Moved, pan);
        send(&mut app, node, ManipulationPhase::Ended, pan);

        assert_eq!(
            app.world().resource::<GestureController>().state(),
            GestureState::Selected(node)
        );
        assert_eq!(
            app.world().get::<Transform>(node).unwrap().translation,
            Vec3::new(0.5, 0.0, 0.0)
        );
        let notifications = app.world().resource::<RpcInterface>().pending_notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].method, "onNodeTransformed");
        assert_eq!(notifications[0].params["nodeName"], "chair");
    }

    #[test]
    fn disabled_controllers_and_unselected_nodes_are_ignored() {
        let (mut app, node) = setup();
        let rotate = ManipulationGesture::Rotate(Quat::from_rotation_y(1.0));

        // Not selected yet.
        send(&mut app, node, ManipulationPhase::Started, ManipulationGesture::Pan(Vec3::X));
        assert_eq!(
            app.world().resource::<GestureController>().state(),
            GestureState::Idle
        );

        // Rotation controller is off on this node; scale is off everywhere.
        app.world_mut()
            .resource_mut::<GestureController>()
            .select(node);
        send(&mut app, node, ManipulationPhase::Started, rotate);
        send(&mut app, node, ManipulationPhase::Started, ManipulationGesture::Scale(2.0));
        assert_eq!(
            app.world().resource::<GestureController>().state(),
            GestureState::Selected(node)
        );
        assert_eq!(
            *app.world().get::<Transform>(node).unwrap(),
            Transform::default()
        );
        assert!(app
            .world()
            .resource::<RpcInterface>()
            .pending_notifications()
            .is_empty());
    }
}
