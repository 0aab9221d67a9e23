/// Standard JSON-RPC 2.0 error codes.
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;

/// Application error codes (JSON-RPC server error range).
pub const NODE_BUILD_ERROR: i32 = -32001;
pub const ANCHOR_CREATION_ERROR: i32 = -32002;
pub const NODE_NOT_FOUND: i32 = -32003;
pub const TRACKING_UNAVAILABLE: i32 = -32004;
pub const SESSION_FATAL: i32 = -32005;
pub const DUPLICATE_NAME: i32 = -32006;
pub const CAPTURE_ERROR: i32 = -32007;
pub const INVALID_DESCRIPTOR: i32 = -32008;
