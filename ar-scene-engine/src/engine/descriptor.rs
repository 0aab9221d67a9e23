//! Decoded node requests as they arrive from the remote layer.

use bevy::prelude::*;
use constants::gestures::{DEFAULT_PAN_GESTURES, DEFAULT_ROTATION_GESTURES};
use serde::{Deserialize, Serialize};

/// A world pose: translation plus unit rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn to_transform(self) -> Transform {
        Transform::from_translation(self.translation).with_rotation(self.rotation)
    }

    /// Wire shape used by `centerPose` and hit results.
    pub fn to_json(self) -> serde_json::Value {
        serde_json::json!({
            "translation": self.translation.to_array(),
            "rotation": self.rotation.to_array(),
        })
    }
}

/// Kind tag of a requested node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NodeKindTag {
    #[default]
    #[serde(rename = "ArCoreNode")]
    Plain,
    #[serde(rename = "ArCoreRotatingNode")]
    Rotating,
    #[serde(rename = "ArCoreReferenceNode")]
    Reference,
}

/// Material overrides; `color` is ARGB.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialSpec {
    pub color: Option<[u8; 4]>,
    pub texture_bytes: Option<Vec<u8>>,
    pub metallic: Option<f32>,
    pub roughness: Option<f32>,
    pub reflectance: Option<f32>,
}

/// Primitive geometry tagged the way the remote layer names it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dartType")]
pub enum ShapeSpec {
    #[serde(rename = "ArCoreSphere")]
    Sphere {
        radius: f32,
        #[serde(default)]
        materials: Vec<MaterialSpec>,
    },
    #[serde(rename = "ArCoreCube")]
    Cube {
        size: [f32; 3],
        #[serde(default)]
        materials: Vec<MaterialSpec>,
    },
    #[serde(rename = "ArCoreCylinder")]
    Cylinder {
        radius: f32,
        height: f32,
        #[serde(default)]
        materials: Vec<MaterialSpec>,
    },
}

impl ShapeSpec {
    pub fn materials(&self) -> &[MaterialSpec] {
        match self {
            Self::Sphere { materials, .. }
            | Self::Cube { materials, .. }
            | Self::Cylinder { materials, .. } => materials,
        }
    }
}

/// Encoded image shown on a flat quad.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSpec {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// A requested node and, recursively, its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDescriptor {
    pub name: String,
    #[serde(default, rename = "dartType")]
    pub kind: NodeKindTag,
    #[serde(default)]
    pub shape: Option<ShapeSpec>,
    #[serde(default)]
    pub object_url: Option<String>,
    #[serde(default, rename = "object3DFileName")]
    pub object_3d_file_name: Option<String>,
    #[serde(default)]
    pub image: Option<ImageSpec>,
    #[serde(default)]
    pub position: Option<[f32; 3]>,
    #[serde(default)]
    pub rotation: Option<[f32; 4]>,
    #[serde(default)]
    pub scale: Option<[f32; 3]>,
    #[serde(default)]
    pub degrees_per_second: Option<f32>,
    #[serde(default)]
    pub is_transformable: bool,
    #[serde(default = "default_pan")]
    pub enable_pan_gestures: bool,
    #[serde(default = "default_rotation")]
    pub enable_rotation_gestures: bool,
    #[serde(default)]
    pub parent_node_name: Option<String>,
    #[serde(default)]
    pub children: Vec<NodeDescriptor>,
}

fn default_pan() -> bool {
    DEFAULT_PAN_GESTURES
}

fn default_rotation() -> bool {
    DEFAULT_ROTATION_GESTURES
}

impl NodeDescriptor {
    /// Minimal descriptor, mostly useful for hosts building commands in code.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKindTag::Plain,
            shape: None,
            object_url: None,
            object_3d_file_name: None,
            image: None,
            position: None,
            rotation: None,
            scale: None,
            degrees_per_second: None,
            is_transformable: false,
            enable_pan_gestures: DEFAULT_PAN_GESTURES,
            enable_rotation_gestures: DEFAULT_ROTATION_GESTURES,
            parent_node_name: None,
            children: Vec::new(),
        }
    }

    pub fn translation(&self) -> Vec3 {
        self.position.map(Vec3::from_array).unwrap_or(Vec3::ZERO)
    }

    pub fn orientation(&self) -> Quat {
        self.rotation
            .map(|r| Quat::from_array(r).normalize())
            .unwrap_or(Quat::IDENTITY)
    }

    pub fn scale_vec(&self) -> Vec3 {
        self.scale.map(Vec3::from_array).unwrap_or(Vec3::ONE)
    }

    pub fn pose(&self) -> Pose {
        Pose::new(self.translation(), self.orientation())
    }

    /// Local transform when attached to a regular parent or the scene root.
    pub fn local_transform(&self) -> Transform {
        self.pose().to_transform().with_scale(self.scale_vec())
    }

    /// Local transform under an anchor, which already carries the pose.
    pub fn anchored_transform(&self) -> Transform {
        Transform::from_scale(self.scale_vec())
    }

    /// Rejects descriptors that can never produce a valid node.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("node name must not be empty".to_string());
        }
        if let Some(rotation) = self.rotation {
            let q = Quat::from_array(rotation);
            if !q.is_finite() || q.length_squared() < f32::EPSILON {
                return Err(format!("node '{}' has a degenerate rotation", self.name));
            }
        }
        if let Some(position) = self.position {
            if !Vec3::from_array(position).is_finite() {
                return Err(format!("node '{}' has a non-finite position", self.name));
            }
        }
        if let Some(scale) = self.scale {
            if !Vec3::from_array(scale).is_finite() {
                return Err(format!("node '{}' has a non-finite scale", self.name));
            }
        }
        for child in &self.children {
            child.validate()?;
        }
        Ok(())
    }
}
