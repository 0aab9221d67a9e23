use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use bevy::prelude::*;
use constants::rpc_codes;
use serde::{Deserialize, Serialize};

use super::commands::{ArCommand, ArCommandEvent};
use crate::ArSceneSet;

/// Identifier of a request; `None` for notifications, which get no response.
pub type RequestId = Option<serde_json::Value>;

/// JSON-RPC 2.0 request structure.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    pub id: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub result: Option<serde_json::Value>,
    pub error: Option<RpcError>,
    pub id: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 notification structure for one-way communication.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcNotification {
    pub jsonrpc: String,
    pub method: String,
    pub params: serde_json::Value,
}

/// JSON-RPC 2.0 error object.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

/// Standard RPC error codes and constructors.
impl RpcError {
    pub fn invalid_request(message: &str) -> Self {
        Self {
            code: rpc_codes::INVALID_REQUEST,
            message: message.to_string(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: rpc_codes::METHOD_NOT_FOUND,
            message: "Method not found".to_string(),
            data: Some(serde_json::json!({ "method": method })),
        }
    }

    pub fn invalid_params(message: &str) -> Self {
        Self {
            code: rpc_codes::INVALID_PARAMS,
            message: message.to_string(),
            data: None,
        }
    }
}

/// Host-side handle to the command channel.
///
/// The host pushes raw JSON-RPC messages from any thread; the engine drains
/// them on the update thread. Serialized responses and notifications are
/// collected on the outbound queue for the host to forward.
#[derive(Clone, Default)]
pub struct RpcChannel {
    inbound: Arc<Mutex<Vec<String>>>,
    outbound: Arc<Mutex<Vec<String>>>,
}

impl RpcChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw JSON-RPC message for the next frame.
    pub fn submit(&self, message: impl Into<String>) {
        if let Ok(mut queue) = self.inbound.lock() {
            queue.push(message.into());
        }
    }

    /// Take every serialized message the engine has produced so far.
    pub fn drain_outbound(&self) -> Vec<String> {
        self.outbound
            .lock()
            .map(|mut queue| std::mem::take(&mut *queue))
            .unwrap_or_default()
    }

    fn take_inbound(&self) -> Vec<String> {
        self.inbound
            .lock()
            .map(|mut queue| std::mem::take(&mut *queue))
            .unwrap_or_default()
    }

    fn push_outbound(&self, message: String) {
        if let Ok(mut queue) = self.outbound.lock() {
            queue.push(message);
        }
    }
}

/// Resource managing bidirectional RPC communication with the remote layer.
/// Handles both request-response patterns and event notifications.
#[derive(Resource, Default)]
pub struct RpcInterface {
    outgoing_notifications: Vec<RpcNotification>,
    outgoing_responses: Vec<RpcResponse>,
}

impl RpcInterface {
    /// Send an event to the remote layer without expecting a response.
    pub fn send_notification(&mut self, method: &str, params: serde_json::Value) {
        self.outgoing_notifications.push(RpcNotification {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        });
    }

    /// Answer a request. Notifications (no id) are never answered.
    pub fn respond(&mut self, id: &RequestId, result: Result<serde_json::Value, RpcError>) {
        let Some(id) = id.clone() else {
            if let Err(error) = result {
                warn!("Dropping error for notification: {}", error.message);
            }
            return;
        };

        let response = match result {
            Ok(result_value) => RpcResponse {
                jsonrpc: "2.0".to_string(),
                result: Some(result_value),
                error: None,
                id: Some(id),
            },
            Err(error) => RpcResponse {
                jsonrpc: "2.0".to_string(),
                result: None,
                error: Some(error),
                id: Some(id),
            },
        };
        self.outgoing_responses.push(response);
    }

    pub fn pending_notifications(&self) -> &[RpcNotification] {
        &self.outgoing_notifications
    }
}

/// Plugin wiring the command channel into the update chain.
pub struct RpcPlugin {
    pub channel: RpcChannel,
}

impl Plugin for RpcPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<RpcInterface>()
            .insert_resource(MessageQueue(self.channel.clone()))
            .add_event::<IncomingRpcMessage>()
            .add_event::<ArCommandEvent>()
            .add_systems(
                Update,
                (process_incoming_messages, handle_rpc_messages)
                    .chain()
                    .in_set(ArSceneSet::Ingest),
            )
            .add_systems(Update, send_outgoing_messages.in_set(ArSceneSet::Flush));
    }
}

/// Resource wrapping the shared channel queues.
#[derive(Resource)]
struct MessageQueue(RpcChannel);

/// Event representing one raw message from the remote layer.
#[derive(Event)]
struct IncomingRpcMessage {
    content: String,
}

fn process_incoming_messages(
    message_queue: Res<MessageQueue>,
    mut message_events: EventWriter<IncomingRpcMessage>,
) {
    for message_str in message_queue.0.take_inbound() {
        message_events.write(IncomingRpcMessage {
            content: message_str,
        });
    }
}

/// Decode requests into typed commands for the scene systems.
///
/// Session commands run in an earlier stage than node commands. A phase
/// change that arrives behind node commands is held, with everything after
/// it, until the next update so commands take effect in arrival order.
fn handle_rpc_messages(
    mut events: EventReader<IncomingRpcMessage>,
    mut backlog: Local<VecDeque<String>>,
    mut rpc_interface: ResMut<RpcInterface>,
    mut commands: EventWriter<ArCommandEvent>,
) {
    backlog.extend(events.read().map(|event| event.content.clone()));

    let mut scene_commands_dispatched = false;
    while let Some(content) = backlog.pop_front() {
        let request = match serde_json::from_str::<RpcRequest>(&content) {
            Ok(request) => request,
            Err(parse_error) => {
                warn!("Discarding malformed RPC message: {}", parse_error);
                rpc_interface.respond(
                    &Some(serde_json::Value::Null),
                    Err(RpcError::invalid_request(&parse_error.to_string())),
                );
                continue;
            }
        };

        match ArCommand::decode(&request.method, &request.params) {
            Ok(command) => {
                if scene_commands_dispatched && command.changes_session_phase() {
                    debug!("Holding {} until the next update", request.method);
                    backlog.push_front(content);
                    break;
                }
                scene_commands_dispatched |= !command.is_session_command();
                debug!("Dispatching RPC method: {}", request.method);
                commands.write(ArCommandEvent {
                    id: request.id,
                    command,
                });
            }
            Err(error) => {
                warn!("Rejected RPC method {}: {}", request.method, error.message);
                rpc_interface.respond(&request.id, Err(error));
            }
        }
    }
}

/// Flush queued notifications and responses to the host.
fn send_outgoing_messages(
    mut rpc_interface: ResMut<RpcInterface>,
    message_queue: Res<MessageQueue>,
) {
    // Notifications first, responses second to maintain order.
    for notification in rpc_interface.outgoing_notifications.drain(..) {
        send_message(&message_queue.0, &notification);
    }

    for response in rpc_interface.outgoing_responses.drain(..) {
        send_message(&message_queue.0, &response);
    }
}

fn send_message<T: Serialize>(channel: &RpcChannel, message: &T) {
    match serde_json::to_string(message) {
        Ok(json) => channel.push_outbound(json),
        Err(e) => error!("Failed to serialize message: {}", e),
    }
}
