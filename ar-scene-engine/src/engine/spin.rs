use bevy::prelude::*;

/// Continuous rotation about the node's local Y axis.
#[derive(Component, Debug, Clone, Copy, PartialEq, Default)]
pub struct Spin {
    pub degrees_per_second: f32,
}

pub fn spin_nodes(time: Res<Time>, mut spinning: Query<(&Spin, &mut Transform)>) {
    let dt = time.delta_secs();
    for (spin, mut transform) in &mut spinning {
        if spin.degrees_per_second == 0.0 {
            continue;
        }
        transform.rotate_local_y((spin.degrees_per_second * dt).to_radians());
    }
}
