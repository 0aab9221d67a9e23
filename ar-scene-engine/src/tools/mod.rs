//! User interaction tools layered on the managed scene.

/// Selection and manipulation of transformable nodes.
///
/// Routes taps, drives the single-selection state machine and reports node
/// transforms to the remote layer.
pub mod gestures;
