//! Deterministic noise for bounded field perturbation
//!
//! The vector field adds a small amount of noise to every cell on each
//! decay step. Drawing that noise from a shared RNG would make the result
//! depend on cell visiting order, so instead each cell hashes its own grid
//! coordinates, the tick counter and the field seed. The same seed always
//! reproduces the same field.

use crate::core_types::vec3::Vec3;

/// Seed values for deterministic noise generation
/// Using prime numbers for better distribution
const SEED_X: u32 = 1619;
const SEED_Y: u32 = 31337;
const SEED_Z: u32 = 6971;
const SEED_W: u32 = 1013;

/// Per-component seed offsets so x, y and z noise are decorrelated
const COMPONENT_OFFSETS: [u32; 3] = [0, 7919, 104729];

/// Maximum value for positive i32 as f64 for safe conversion
const MAX_I32_POSITIVE: f64 = 0x7fff_ffff as f64;

/// Integer hash of grid coordinates plus time, returning a value in [0, 1].
#[inline]
fn hash_4d(x: i32, y: i32, z: i32, w: i32, seed: u32) -> f32 {
    let mut n = (x.wrapping_mul(SEED_X as i32))
        .wrapping_add(y.wrapping_mul(SEED_Y as i32))
        .wrapping_add(z.wrapping_mul(SEED_Z as i32))
        .wrapping_add(w.wrapping_mul(SEED_W as i32))
        .wrapping_add(seed as i32);
    n = (n << 13) ^ n;
    n = n
        .wrapping_mul(n.wrapping_mul(n).wrapping_mul(15731).wrapping_add(789221))
        .wrapping_add(1376312589);
    (f64::from(n & 0x7fff_ffff) / MAX_I32_POSITIVE) as f32
}

/// Noise vector for one grid cell at one tick.
///
/// Each component lies in [-1, 1]. Scale by the desired amplitude.
#[must_use]
pub fn cell_noise(ix: usize, iy: usize, iz: usize, tick: u64, seed: u32) -> Vec3 {
    let (x, y, z, w) = (ix as i32, iy as i32, iz as i32, tick as i32);
    let component =
        |offset: u32| hash_4d(x, y, z, w, seed.wrapping_add(offset)).mul_add(2.0, -1.0);

    Vec3::new(
        component(COMPONENT_OFFSETS[0]),
        component(COMPONENT_OFFSETS[1]),
        component(COMPONENT_OFFSETS[2]),
    )
}
