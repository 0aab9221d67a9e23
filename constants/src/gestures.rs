/// Scale manipulation is disabled for every transformable node.
pub const SCALE_GESTURES_ENABLED: bool = false;

/// Pan gestures default when a descriptor omits `enablePanGestures`.
pub const DEFAULT_PAN_GESTURES: bool = true;

/// Rotation gestures default when a descriptor omits `enableRotationGestures`.
pub const DEFAULT_ROTATION_GESTURES: bool = true;
