/// Suffix appended to a node name to form the name of its anchor root.
pub const ANCHOR_SUFFIX: &str = "_anchor";

/// Name prefix for generated face visualisation nodes.
pub const FACE_NODE_PREFIX: &str = "face_";

/// Builds the conventional anchor root name for a node.
pub fn anchor_name(node_name: &str) -> String {
    format!("{node_name}{ANCHOR_SUFFIX}")
}
