//! JSON-RPC 2.0 command channel between the remote UI layer and the scene.
//!
//! The host owns an [`channel::RpcChannel`] handle and pushes raw JSON-RPC
//! messages into it from whatever thread receives them. The engine drains the
//! queue at the start of every update, decodes each request into a typed
//! [`commands::ArCommand`] and hands it to the scene systems as an
//! [`commands::ArCommandEvent`]. Responses and event notifications are queued
//! on [`channel::RpcInterface`] and flushed back to the host at the end of the
//! same update.
//!
//! ## Message Flow
//!
//! ```text
//! Remote layer             RpcChannel              Update chain
//!      │                        │                        │
//!      ├─ Request (with ID) ───>│── Ingest ─────────────>│ ArCommandEvent
//!      │                        │                        ├─ Session / Commands
//!      │                        │                        ├─ Builds (async)
//!      │<── Response (with ID) ─│<───────────── Flush ───┤
//!      │<── Notification ───────│<───────────── Flush ───┤ onPlaneDetected, ...
//! ```
//!
//! Responses for asynchronous work (node builds, screenshots) are sent on the
//! update in which the work completes, not on the update the request arrived.
//!
//! ## Methods
//!
//! ### Session
//! - `init`: set tap recognizer, update listener and plane renderer flags
//! - `resume` / `pause` / `dispose`: host lifecycle barrier
//! - `getTrackingState`: reply and notify with `TRACKING`/`PAUSED`/`STOPPED`
//! - `togglePlaneRenderer`: flip plane visualization
//!
//! ### Nodes
//! - `addArCoreNode`, `addArCoreNodeWithAnchor`: build and attach a node tree
//! - `removeARCoreNode`: idempotent removal
//! - `rotationChanged`, `updateMaterials`, `updateGestures`: mutate a live node
//!
//! ### Capture and faces
//! - `takeScreenshot`: off-thread readback, replies with the written path
//! - `loadMesh`: texture shared by every face node
//!
//! ## Error Handling
//!
//! Protocol errors use the standard JSON-RPC codes (`-32600`..`-32603`).
//! Scene failures use application codes in the `-32000` range and carry a
//! `kind` tag in `data`; see [`crate::error::SceneError`].

/// Message queues, request/response types and the flush systems.
pub mod channel;

/// Method-name to typed-command decoding.
pub mod commands;
