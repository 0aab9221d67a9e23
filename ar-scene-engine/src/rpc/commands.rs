use bevy::prelude::*;
use serde::Deserialize;
use serde_json::Value;

use super::channel::{RequestId, RpcError};
use crate::engine::descriptor::{MaterialSpec, NodeDescriptor};

/// Typed command decoded from one JSON-RPC request.
#[derive(Debug, Clone, PartialEq)]
pub enum ArCommand {
    Init(InitParams),
    AddNode(NodeDescriptor),
    AddNodeWithAnchor(NodeDescriptor),
    RemoveNode {
        node_name: String,
    },
    RotationChanged {
        name: String,
        degrees_per_second: f32,
    },
    UpdateMaterials {
        name: String,
        materials: Vec<MaterialSpec>,
    },
    UpdateGestures {
        name: String,
        enable_pan_gestures: Option<bool>,
        enable_rotation_gestures: Option<bool>,
    },
    TakeScreenshot,
    LoadMesh {
        texture_bytes: Vec<u8>,
    },
    Dispose,
    Resume,
    Pause,
    GetTrackingState,
    TogglePlaneRenderer,
}

/// A decoded command together with the request it answers.
#[derive(Event, Debug, Clone)]
pub struct ArCommandEvent {
    pub id: RequestId,
    pub command: ArCommand,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InitParams {
    pub enable_tap_recognizer: Option<bool>,
    pub enable_update_listener: Option<bool>,
    pub enable_plane_renderer: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoveParams {
    node_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RotationParams {
    name: String,
    degrees_per_second: f32,
}

#[derive(Deserialize)]
struct MaterialsParams {
    name: String,
    #[serde(default)]
    materials: Vec<MaterialSpec>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GestureParams {
    name: String,
    enable_pan_gestures: Option<bool>,
    enable_rotation_gestures: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MeshParams {
    texture_bytes: Vec<u8>,
}

impl ArCommand {
    /// Map a method name and its params onto a command.
    pub fn decode(method: &str, params: &Value) -> Result<Self, RpcError> {
        let command = match method {
            "init" => Self::Init(parse_params(params, "init")?),
            "addArCoreNode" => Self::AddNode(parse_descriptor(params)?),
            "addArCoreNodeWithAnchor" => Self::AddNodeWithAnchor(parse_descriptor(params)?),
            "removeARCoreNode" => {
                let parsed: RemoveParams = parse_params(params, "Expected 'nodeName' parameter")?;
                Self::RemoveNode {
                    node_name: parsed.node_name,
                }
            }
            "rotationChanged" => {
                let parsed: RotationParams =
                    parse_params(params, "Expected 'name' and 'degreesPerSecond' parameters")?;
                Self::RotationChanged {
                    name: parsed.name,
                    degrees_per_second: parsed.degrees_per_second,
                }
            }
            "updateMaterials" => {
                let parsed: MaterialsParams =
                    parse_params(params, "Expected 'name' and 'materials' parameters")?;
                Self::UpdateMaterials {
                    name: parsed.name,
                    materials: parsed.materials,
                }
            }
            "updateGestures" => {
                let parsed: GestureParams = parse_params(params, "Expected 'name' parameter")?;
                Self::UpdateGestures {
                    name: parsed.name,
                    enable_pan_gestures: parsed.enable_pan_gestures,
                    enable_rotation_gestures: parsed.enable_rotation_gestures,
                }
            }
            "takeScreenshot" => Self::TakeScreenshot,
            "loadMesh" => {
                let parsed: MeshParams = parse_params(params, "Expected 'textureBytes' parameter")?;
                Self::LoadMesh {
                    texture_bytes: parsed.texture_bytes,
                }
            }
            "dispose" => Self::Dispose,
            "resume" => Self::Resume,
            "pause" => Self::Pause,
            "getTrackingState" => Self::GetTrackingState,
            "togglePlaneRenderer" => Self::TogglePlaneRenderer,
            _ => return Err(RpcError::method_not_found(method)),
        };
        Ok(command)
    }

    /// Handled in the `Session` stage, ahead of every other command of the
    /// same update.
    pub fn is_session_command(&self) -> bool {
        matches!(
            self,
            Self::Init(_)
                | Self::Resume
                | Self::Pause
                | Self::Dispose
                | Self::GetTrackingState
                | Self::TogglePlaneRenderer
        )
    }

    /// Moves the session to another phase.
    pub fn changes_session_phase(&self) -> bool {
        matches!(self, Self::Resume | Self::Pause | Self::Dispose)
    }
}

fn parse_params<T: for<'de> Deserialize<'de>>(params: &Value, hint: &str) -> Result<T, RpcError> {
    // Parameterless calls may send null instead of an empty object.
    let params = if params.is_null() {
        Value::Object(Default::default())
    } else {
        params.clone()
    };
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(&format!("{hint}: {e}")))
}

/// Descriptors arrive either bare or wrapped as `{ "descriptor": {...} }`.
fn parse_descriptor(params: &Value) -> Result<NodeDescriptor, RpcError> {
    let raw = params.get("descriptor").unwrap_or(params);
    let descriptor: NodeDescriptor = parse_params(raw, "Invalid node descriptor")?;
    descriptor
        .validate()
        .map_err(|message| RpcError::invalid_params(&message))?;
    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use constants::rpc_codes;
    use serde_json::json;

    #[test]
    fn decodes_node_commands() {
        let command = ArCommand::decode(
            "addArCoreNodeWithAnchor",
            &json!({ "descriptor": { "name": "chair", "isTransformable": true } }),
        )
        .unwrap();
        match command {
            ArCommand::AddNodeWithAnchor(descriptor) => {
                assert_eq!(descriptor.name, "chair");
                assert!(descriptor.is_transformable);
            }
            other => panic!("unexpected command {other:?}"),
        }

        assert_eq!(
            ArCommand::decode("removeARCoreNode", &json!({ "nodeName": "chair" })).unwrap(),
            ArCommand::RemoveNode {
                node_name: "chair".into()
            }
        );
        assert_eq!(
            ArCommand::decode("rotationChanged", &json!({ "name": "earth", "degreesPerSecond": 30 }))
                .unwrap(),
            ArCommand::RotationChanged {
                name: "earth".into(),
                degrees_per_second: 30.0
            }
        );
    }

    #[test]
    fn parameterless_commands_accept_null_params() {
        assert_eq!(
            ArCommand::decode("init", &Value::Null).unwrap(),
            ArCommand::Init(InitParams::default())
        );
        assert_eq!(
            ArCommand::decode("togglePlaneRenderer", &Value::Null).unwrap(),
            ArCommand::TogglePlaneRenderer
        );
    }

    #[test]
    fn rejects_unknown_methods_and_bad_params() {
        let error = ArCommand::decode("spawnDragon", &json!({})).unwrap_err();
        assert_eq!(error.code, rpc_codes::METHOD_NOT_FOUND);

        let error = ArCommand::decode("rotationChanged", &json!({ "name": "earth" })).unwrap_err();
        assert_eq!(error.code, rpc_codes::INVALID_PARAMS);

        let error = ArCommand::decode("addArCoreNode", &json!({ "name": "" })).unwrap_err();
        assert_eq!(error.code, rpc_codes::INVALID_PARAMS);
    }

    #[test]
    fn only_phase_changes_are_session_barriers() {
        assert!(ArCommand::Dispose.changes_session_phase());
        assert!(ArCommand::Pause.changes_session_phase());
        assert!(!ArCommand::TogglePlaneRenderer.changes_session_phase());
        assert!(ArCommand::GetTrackingState.is_session_command());
        assert!(!ArCommand::TakeScreenshot.is_session_command());
        assert!(
            !ArCommand::RemoveNode {
                node_name: "chair".into()
            }
            .is_session_command()
        );
    }
}
