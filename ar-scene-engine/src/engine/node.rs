//! Managed node variants and what each one can do.
//!
//! Capabilities are resolved on [`NodeKind`]; the state behind them lives in
//! components on the node's entity:
//!
//! | Variant         | Attach                        | Detach                      | Gestures                      | Pose                          |
//! |-----------------|-------------------------------|-----------------------------|-------------------------------|-------------------------------|
//! | `Plain`         | under a parent or the root    | own subtree                 | no                            | local `Transform`             |
//! | `Transformable` | under its `<name>_anchor`     | through the anchor wrapper  | `TransformableNode` flags     | local `Transform`             |
//! | `AnchorRoot`    | at the root                   | own subtree, anchor released | no                            | followed from the anchor      |
//! | `Face(id)`      | at the root, unindexed        | when the face stops tracking| no                            | followed from the face        |

use bevy::prelude::*;

use super::session::FaceId;

/// Variant of a managed node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Plain,
    /// Enrolled in the gesture controller.
    Transformable,
    /// World-locked root created for an anchor.
    AnchorRoot,
    /// Generated visual bound to a tracked face.
    Face(FaceId),
}

/// Where a node's pose is driven from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseSource {
    /// The node's own `Transform`, set by commands and gestures.
    Local,
    /// Copied from the session's anchor every frame.
    Anchor,
    /// Copied from the tracked face every frame.
    Face(FaceId),
}

impl NodeKind {
    pub fn accepts_gestures(self) -> bool {
        self == Self::Transformable
    }

    /// Face nodes belong to the reconciliation pass and are not addressable by name.
    pub fn is_indexed(self) -> bool {
        !matches!(self, Self::Face(_))
    }

    pub fn pose_source(self) -> PoseSource {
        match self {
            Self::Plain | Self::Transformable => PoseSource::Local,
            Self::AnchorRoot => PoseSource::Anchor,
            Self::Face(face) => PoseSource::Face(face),
        }
    }
}

/// A node the scene manager owns. The hierarchy itself is Bevy's.
#[derive(Component, Debug, Clone, PartialEq, Eq)]
pub struct ArNode {
    pub name: String,
    pub kind: NodeKind,
}

impl ArNode {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn is_transformable(&self) -> bool {
        self.kind.accepts_gestures()
    }

    pub fn is_anchor_root(&self) -> bool {
        self.kind == NodeKind::AnchorRoot
    }

    pub fn is_indexed(&self) -> bool {
        self.kind.is_indexed()
    }

    /// Entity to despawn when this node is removed: an anchor-rooted node
    /// takes its anchor wrapper with it.
    pub fn detach_target(&self, entity: Entity, parent: Option<(Entity, &ArNode)>) -> Entity {
        match (self.kind, parent) {
            (NodeKind::AnchorRoot, _) => entity,
            (_, Some((parent_entity, parent_node))) if parent_node.is_anchor_root() => {
                parent_entity
            }
            _ => entity,
        }
    }
}

/// Transformable node attached without an anchor because anchor creation
/// failed. Rotation gestures stay disabled on it.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct UnanchoredTransformable;
