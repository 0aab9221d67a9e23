//! Scene synchronisation core.
//!
//! Sits between the remote command channel, the external tracking subsystem
//! and the rendered Bevy world. Everything here runs inside the chained
//! [`crate::ArSceneSet`] sequence of the `Update` schedule, so commands,
//! build completions, gesture routing and reconciliation never interleave.
//!
//! ## Update Chain
//!
//! ```text
//! Ingest       rpc            decode JSON-RPC into ArCommandEvent
//! Session      lifecycle      init / resume / pause / dispose, sample frame
//! Commands     scene_graph    add / remove / rotation / materials / gestures
//!              reconcile      loadMesh
//!              capture        takeScreenshot (worker thread)
//! Builds       node_factory   attach finished renderables
//!              capture        answer finished screenshots
//! Interaction  gestures       taps and manipulations
//! Reconcile    anchors        follow anchor poses
//!              reconcile      planes, faces (camera tracking only)
//!              spin           rotating nodes
//! Flush        rpc            responses and notifications to the host
//! ```

/// Anchor roots: spawn, pose following, release on despawn.
pub mod anchors;

/// Screenshot workers and the frame capture boundary.
pub mod capture;

/// Node requests as decoded from the remote layer.
pub mod descriptor;

/// Session pause/resume/dispose and session-level commands.
pub mod lifecycle;

/// Managed node component and its kind.
pub mod node;

/// Async renderable builds and attachment.
pub mod node_factory;

/// Plane and face reconciliation, face resources.
pub mod reconcile;

/// Renderable builder boundary and the primitive builder.
pub mod renderable;

/// Name index and node command interpretation.
pub mod scene_graph;

/// Tracking subsystem boundary and per-frame sampling.
pub mod session;

pub mod spin;
