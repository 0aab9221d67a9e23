use bevy::prelude::*;
use constants::gestures::SCALE_GESTURES_ENABLED;

/// Selection state of the gesture controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GestureState {
    #[default]
    Idle,
    Selected(Entity),
    Transforming(Entity),
}

impl GestureState {
    pub fn target(&self) -> Option<Entity> {
        match *self {
            Self::Idle => None,
            Self::Selected(entity) | Self::Transforming(entity) => Some(entity),
        }
    }
}

/// Owns the single selection across all transformable nodes.
#[derive(Resource, Debug, Default)]
pub struct GestureController {
    state: GestureState,
}

impl GestureController {
    pub fn state(&self) -> GestureState {
        self.state
    }

    /// Select `node`, returning the node that lost its selection, if any.
    pub fn select(&mut self, node: Entity) -> Option<Entity> {
        let previous = self.state.target().filter(|previous| *previous != node);
        self.state = GestureState::Selected(node);
        previous
    }

    /// A manipulation started. Only the selected node can be transformed.
    pub fn begin_transform(&mut self, node: Entity) -> bool {
        match self.state {
            GestureState::Selected(selected) | GestureState::Transforming(selected)
                if selected == node =>
            {
                self.state = GestureState::Transforming(node);
                true
            }
            _ => false,
        }
    }

    /// A manipulation finished; returns true if `node` was being transformed.
    pub fn end_transform(&mut self, node: Entity) -> bool {
        if self.state == GestureState::Transforming(node) {
            self.state = GestureState::Selected(node);
            true
        } else {
            false
        }
    }

    /// Drop any state referring to a node that left the scene.
    pub fn forget(&mut self, node: Entity) -> bool {
        if self.state.target() == Some(node) {
            self.state = GestureState::Idle;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.state = GestureState::Idle;
    }
}

/// Which manipulation controllers are live on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSet {
    pub translation: bool,
    pub rotation: bool,
    pub scale: bool,
}

/// A node enrolled in the gesture controller.
#[derive(Component, Debug, Clone, PartialEq, Eq)]
pub struct TransformableNode {
    pan_enabled: bool,
    rotation_enabled: bool,
    /// Rotation stays off regardless of flags, for unanchored roots.
    rotation_locked: bool,
    controllers: ControllerSet,
}

impl TransformableNode {
    pub fn new(pan_enabled: bool, rotation_enabled: bool) -> Self {
        let mut node = Self {
            pan_enabled,
            rotation_enabled,
            rotation_locked: false,
            controllers: ControllerSet {
                translation: false,
                rotation: false,
                scale: false,
            },
        };
        node.reconfigure();
        node
    }

    pub fn with_rotation_locked(mut self) -> Self {
        self.rotation_locked = true;
        self.reconfigure();
        self
    }

    pub fn pan_enabled(&self) -> bool {
        self.pan_enabled
    }

    pub fn rotation_enabled(&self) -> bool {
        self.rotation_enabled
    }

    pub fn controllers(&self) -> ControllerSet {
        self.controllers
    }

    pub fn set_pan_enabled(&mut self, enabled: bool) {
        self.pan_enabled = enabled;
        self.reconfigure();
    }

    pub fn set_rotation_enabled(&mut self, enabled: bool) {
        self.rotation_enabled = enabled;
        self.reconfigure();
    }

    fn reconfigure(&mut self) {
        self.controllers = ControllerSet {
            translation: self.pan_enabled,
            rotation: self.rotation_enabled && !self.rotation_locked,
            scale: SCALE_GESTURES_ENABLED,
        };
    }
}

/// Marker on the node currently selected by the gesture controller.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Selected;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selecting_a_new_node_deselects_the_previous_one() {
        let mut world = World::new();
        let a = world.spawn_empty().id();
        let b = world.spawn_empty().id();
        let mut controller = GestureController::default();

        assert_eq!(controller.select(a), None);
        assert_eq!(controller.select(a), None);
        assert_eq!(controller.select(b), Some(a));
        assert_eq!(controller.state(), GestureState::Selected(b));
    }

    #[test]
    fn only_the_selected_node_can_transform() {
        let mut world = World::new();
        let a = world.spawn_empty().id();
        let b = world.spawn_empty().id();
        let mut controller = GestureController::default();

        assert!(!controller.begin_transform(a));
        controller.select(a);
        assert!(!controller.begin_transform(b));
        assert!(controller.begin_transform(a));
        assert_eq!(controller.state(), GestureState::Transforming(a));
        assert!(!controller.end_transform(b));
        assert!(controller.end_transform(a));
        assert_eq!(controller.state(), GestureState::Selected(a));
    }

    #[test]
    fn forgetting_the_target_returns_to_idle() {
        let mut world = World::new();
        let a = world.spawn_empty().id();
        let b = world.spawn_empty().id();
        let mut controller = GestureController::default();

        controller.select(a);
        controller.begin_transform(a);
        assert!(!controller.forget(b));
        assert!(controller.forget(a));
        assert_eq!(controller.state(), GestureState::Idle);
    }

    #[test]
    fn flags_reconfigure_controllers_immediately() {
        let mut node = TransformableNode::new(true, true);
        assert_eq!(
            node.controllers(),
            ControllerSet {
                translation: true,
                rotation: true,
                scale: false
            }
        );

        node.set_pan_enabled(false);
        assert!(!node.controllers().translation);

        let locked = TransformableNode::new(true, true).with_rotation_locked();
        assert!(locked.rotation_enabled());
        assert!(!locked.controllers().rotation);
    }
}
