//! Vector type alias for 3D positions and directions.

use nalgebra::Vector3;

/// 3D vector type for positions, velocities, and directions.
///
/// This is a simple alias for `nalgebra::Vector3<f32>`, used throughout
/// the simulation for world positions, field velocities and particle state.
pub type Vec3 = Vector3<f32>;

/// World up axis (+Y). Gravity acts along the negative of this vector.
#[inline]
#[must_use]
pub fn up() -> Vec3 {
    Vec3::y()
}

/// True when every component is finite.
#[inline]
pub(crate) fn is_finite(v: &Vec3) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}
