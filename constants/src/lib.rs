//! Shared constants for the AR scene engine.
//!
//! Kept dependency-free so hosts embedding the engine can reference the same
//! naming, policy and default values without pulling in the engine itself.

/// Scene node naming conventions.
pub mod naming;

/// Gesture controller policy switches.
pub mod gestures;

/// Screenshot capture defaults.
pub mod capture;

/// Default visual parameters for generated nodes.
pub mod render_settings;

/// JSON-RPC error codes shared with the remote layer.
pub mod rpc_codes;
