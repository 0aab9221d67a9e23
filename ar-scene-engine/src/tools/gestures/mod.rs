//! Gesture controller for transformable nodes.
//!
//! Collapses every touch path into one ordered state machine owned by the
//! [`state::GestureController`] resource. At most one transformable node is
//! selected at any instant.
//!
//! ## States
//!
//! ```text
//!            tap transformable            manipulation Started
//!   Idle ─────────────────────> Selected(n) ─────────────────> Transforming(n)
//!    ^                          │  ^   ^                           │
//!    │     node removed         │  │   └───── Ended (report) ──────┘
//!    └──────────────────────────┘  └── tap other transformable: Selected(m)
//! ```
//!
//! ## Touch Routing
//!
//! Each [`selection::TouchInput`] is routed exactly once:
//! 1. Hit a transformable node: select it, consume the tap
//! 2. Hit any other managed node: notify `onNodeTap{name}`
//! 3. Hit nothing: plane hit test, notify `onPlaneTap` with every hit that
//!    lies inside a plane polygon (only while the camera is tracking)
//!
//! Taps are dropped entirely while the tap recognizer is disabled.
//!
//! ## Manipulation
//!
//! [`manipulation::ManipulationInput`] drives `Selected -> Transforming ->
//! Selected`. Pan and rotate are gated per node by the live controller set on
//! [`state::TransformableNode`]; scale is disabled for every node. When a
//! manipulation ends the node's local position and rotation are reported as
//! `onNodeTransformed{nodeName, position, rotation}`.

use bevy::prelude::*;

use crate::ArSceneSet;

/// Selection state machine, per-node controller configuration, markers.
pub mod state;

/// Tap routing and selection cleanup on node removal.
pub mod selection;

/// Pan/rotate application and transform reporting.
pub mod manipulation;

pub use manipulation::{ManipulationGesture, ManipulationInput, ManipulationPhase};
pub use selection::TouchInput;
pub use state::{GestureController, GestureState, Selected, TransformableNode};

pub struct GesturesPlugin;

impl Plugin for GesturesPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<GestureController>()
            .add_event::<TouchInput>()
            .add_event::<ManipulationInput>()
            .add_observer(selection::forget_removed_node)
            .add_systems(
                Update,
                (selection::route_touches, manipulation::apply_manipulations)
                    .chain()
                    .in_set(ArSceneSet::Interaction),
            );
    }
}
