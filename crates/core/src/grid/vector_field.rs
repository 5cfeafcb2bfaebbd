//! Uniform 3D airflow grid
//!
//! The world box `[bounds_min, bounds_max]` is divided into `nx × ny × nz`
//! cells. Each cell stores the committed velocity that [`VectorField::sample`]
//! reads, plus a write-buffer that wind sources accumulate into during a tick.
//!
//! # Tick
//!
//! ```text
//! inject:  pending += dir × speed × w + up × (T - T_ambient) × k_lift × w
//!          w = 1 - (d / r)²   for cell centres with d < r
//! step:    next = (velocity + pending + noise × amplitude) × decay
//!          |next| ≤ max_magnitude
//! ```
//!
//! Injection only adds into `pending`, so the result does not depend on
//! source order, and noise is hashed per cell (see
//! [`cell_noise`](crate::core_types::noise::cell_noise)) so the decay pass
//! does not depend on visiting order.

use crate::core_types::noise::cell_noise;
use crate::core_types::vec3::{is_finite, up, Vec3};
use crate::core_types::wind_source::WindSource;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for the vector field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    /// Grid dimensions (number of cells in each direction)
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,

    /// World-space box covered by the grid (m)
    pub bounds_min: Vec3,
    pub bounds_max: Vec3,

    /// Reference air temperature for thermal lift and buoyancy (°C)
    pub ambient_temperature: f32,

    /// Per-tick velocity retention, in `[0, 1]`
    pub decay_factor: f32,

    /// Peak per-component noise added each tick (m/s)
    pub noise_amplitude: f32,

    /// Hard cap on cell speed (m/s)
    pub max_magnitude: f32,

    /// Vertical velocity per degree of source temperature above ambient (m/s/°C)
    pub thermal_lift: f32,

    /// Seed for the per-cell noise hash
    pub noise_seed: u32,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            nx: 20,
            ny: 10,
            nz: 20,
            bounds_min: Vec3::new(-10.0, 0.0, -10.0),
            bounds_max: Vec3::new(10.0, 10.0, 10.0),
            ambient_temperature: 20.0,
            decay_factor: 0.98,
            noise_amplitude: 0.02,
            max_magnitude: 50.0,
            thermal_lift: 0.1,
            noise_seed: 0,
        }
    }
}

impl FieldConfig {
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a zero dimension, an empty or non-finite
    /// bounding box, or any coefficient outside its range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (axis, value) in [("x", self.nx), ("y", self.ny), ("z", self.nz)] {
            if value == 0 {
                return Err(ConfigError::InvalidDimension { axis, value });
            }
        }
        if self
            .nx
            .checked_mul(self.ny)
            .and_then(|n| n.checked_mul(self.nz))
            .is_none()
        {
            return Err(ConfigError::InvalidParameter {
                name: "nx*ny*nz",
                reason: format!("cell count {}x{}x{} overflows", self.nx, self.ny, self.nz),
            });
        }

        for (i, axis) in ["x", "y", "z"].into_iter().enumerate() {
            let (min, max) = (self.bounds_min[i], self.bounds_max[i]);
            if !(min.is_finite() && max.is_finite() && max > min) {
                return Err(ConfigError::InvalidBounds { axis, min, max });
            }
        }

        if !(0.0..=1.0).contains(&self.decay_factor) {
            return Err(ConfigError::parameter(
                "decay_factor",
                "must be within [0, 1]",
                self.decay_factor,
            ));
        }
        if !(self.noise_amplitude.is_finite() && self.noise_amplitude >= 0.0) {
            return Err(ConfigError::parameter(
                "noise_amplitude",
                "must be finite and non-negative",
                self.noise_amplitude,
            ));
        }
        if !(self.max_magnitude.is_finite() && self.max_magnitude > 0.0) {
            return Err(ConfigError::parameter(
                "max_magnitude",
                "must be finite and positive",
                self.max_magnitude,
            ));
        }
        if !self.thermal_lift.is_finite() {
            return Err(ConfigError::parameter("thermal_lift", "must be finite", self.thermal_lift));
        }
        if !self.ambient_temperature.is_finite() {
            return Err(ConfigError::parameter(
                "ambient_temperature",
                "must be finite",
                self.ambient_temperature,
            ));
        }
        Ok(())
    }
}

/// One grid cell
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    /// Velocity visible to [`VectorField::sample`]
    pub velocity: Vec3,
    /// Injections accumulated since the last [`VectorField::step`]
    pub pending: Vec3,
}

/// Uniform grid of airflow velocities
#[derive(Debug, Clone)]
pub struct VectorField {
    /// Stored as flattened 3D array: index = iz * (ny * nx) + iy * nx + ix
    cells: Vec<GridCell>,
    cell_size: Vec3,
    tick: u64,
    config: FieldConfig,
}

/// Floor of a fractional cell coordinate, clamped into `[0, dim - 1]` (NaN maps to 0)
#[inline]
fn clamp_axis(coordinate: f32, dim: usize) -> usize {
    if coordinate > 0.0 {
        (coordinate.floor() as usize).min(dim - 1)
    } else {
        0
    }
}

impl VectorField {
    /// Create a zeroed field
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails [`FieldConfig::validate`].
    pub fn new(config: FieldConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let total_cells = config.nx * config.ny * config.nz;
        let extent = config.bounds_max - config.bounds_min;
        let cell_size = Vec3::new(
            extent.x / config.nx as f32,
            extent.y / config.ny as f32,
            extent.z / config.nz as f32,
        );

        debug!(
            "Vector field {}x{}x{} ({} cells), cell size {:?}",
            config.nx, config.ny, config.nz, total_cells, cell_size
        );

        Ok(VectorField {
            cells: vec![GridCell::default(); total_cells],
            cell_size,
            tick: 0,
            config,
        })
    }

    #[inline]
    fn index(&self, ix: usize, iy: usize, iz: usize) -> usize {
        iz * (self.config.ny * self.config.nx) + iy * self.config.nx + ix
    }

    pub fn config(&self) -> &FieldConfig {
        &self.config
    }

    /// Grid dimensions `(nx, ny, nz)`
    pub fn dims(&self) -> (usize, usize, usize) {
        (self.config.nx, self.config.ny, self.config.nz)
    }

    /// World-space `(min, max)` corners
    pub fn bounds(&self) -> (Vec3, Vec3) {
        (self.config.bounds_min, self.config.bounds_max)
    }

    /// Per-axis cell extent (m)
    pub fn cell_size(&self) -> Vec3 {
        self.cell_size
    }

    /// Number of completed [`step`](Self::step) calls
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    /// Cell containing `pos`; positions outside the box map to the nearest edge cell
    pub fn grid_index(&self, pos: Vec3) -> (usize, usize, usize) {
        let local = pos - self.config.bounds_min;
        (
            clamp_axis(local.x / self.cell_size.x, self.config.nx),
            clamp_axis(local.y / self.cell_size.y, self.config.ny),
            clamp_axis(local.z / self.cell_size.z, self.config.nz),
        )
    }

    /// World position of a cell centre
    pub fn cell_center(&self, ix: usize, iy: usize, iz: usize) -> Vec3 {
        self.config.bounds_min
            + Vec3::new(
                (ix as f32 + 0.5) * self.cell_size.x,
                (iy as f32 + 0.5) * self.cell_size.y,
                (iz as f32 + 0.5) * self.cell_size.z,
            )
    }

    /// Committed velocity of the cell containing `pos`
    pub fn sample(&self, pos: Vec3) -> Vec3 {
        let (ix, iy, iz) = self.grid_index(pos);
        self.cells[self.index(ix, iy, iz)].velocity
    }

    /// Committed velocity of a cell, `None` when out of range
    pub fn velocity_at_grid(&self, ix: usize, iy: usize, iz: usize) -> Option<Vec3> {
        if ix < self.config.nx && iy < self.config.ny && iz < self.config.nz {
            Some(self.cells[self.index(ix, iy, iz)].velocity)
        } else {
            None
        }
    }

    /// Largest committed cell speed
    pub fn max_speed(&self) -> f32 {
        self.cells
            .iter()
            .map(|cell| cell.velocity.norm())
            .fold(0.0, f32::max)
    }

    /// Accumulate a source's momentum and thermal lift into the write-buffer
    ///
    /// Only the cells in the index range covering the source sphere are visited.
    pub fn inject(&mut self, source: &WindSource) {
        let center = source.position();
        let radius = source.radius();
        let reach = Vec3::repeat(radius);
        let (x0, y0, z0) = self.grid_index(center - reach);
        let (x1, y1, z1) = self.grid_index(center + reach);

        let push = source.velocity();
        let lift = up()
            * ((source.temperature() - self.config.ambient_temperature) * self.config.thermal_lift);
        let radius_sq = radius * radius;

        for iz in z0..=z1 {
            for iy in y0..=y1 {
                for ix in x0..=x1 {
                    let distance_sq = (self.cell_center(ix, iy, iz) - center).norm_squared();
                    if distance_sq >= radius_sq {
                        continue;
                    }
                    let influence = 1.0 - distance_sq / radius_sq;
                    let idx = self.index(ix, iy, iz);
                    self.cells[idx].pending += (push + lift) * influence;
                }
            }
        }
    }

    /// Commit the write-buffer, add noise, decay and clamp every cell
    pub fn step(&mut self) {
        let (nx, ny) = (self.config.nx, self.config.ny);
        let amplitude = self.config.noise_amplitude;
        let decay = self.config.decay_factor;
        let max_magnitude = self.config.max_magnitude;
        let seed = self.config.noise_seed;
        let tick = self.tick;

        for (idx, cell) in self.cells.iter_mut().enumerate() {
            let mut next = cell.velocity + cell.pending;
            if amplitude > 0.0 {
                let (ix, iy, iz) = (idx % nx, (idx / nx) % ny, idx / (nx * ny));
                next += cell_noise(ix, iy, iz, tick, seed) * amplitude;
            }
            next *= decay;

            let magnitude = next.norm();
            if magnitude > max_magnitude {
                next *= max_magnitude / magnitude;
            }
            if !is_finite(&next) {
                next = Vec3::zeros();
            }

            cell.velocity = next;
            cell.pending = Vec3::zeros();
        }

        self.tick += 1;
    }

    /// Zero every cell, including pending injections
    pub fn clear(&mut self) {
        self.cells.fill(GridCell::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// 21³ cells of 1 m with centres on integer coordinates
    fn integer_grid() -> FieldConfig {
        FieldConfig {
            nx: 21,
            ny: 21,
            nz: 21,
            bounds_min: Vec3::repeat(-10.5),
            bounds_max: Vec3::repeat(10.5),
            decay_factor: 1.0,
            noise_amplitude: 0.0,
            ..FieldConfig::default()
        }
    }

    fn source(position: Vec3, radius: f32, speed: f32, direction: Vec3, temperature: f32) -> WindSource {
        WindSource::new(position, radius, speed, direction, temperature).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let zero_dim = FieldConfig {
            ny: 0,
            ..FieldConfig::default()
        };
        assert!(matches!(
            VectorField::new(zero_dim),
            Err(ConfigError::InvalidDimension { axis: "y", value: 0 })
        ));

        let inverted = FieldConfig {
            bounds_min: Vec3::new(0.0, 5.0, 0.0),
            bounds_max: Vec3::new(1.0, 1.0, 1.0),
            ..FieldConfig::default()
        };
        assert!(matches!(
            VectorField::new(inverted),
            Err(ConfigError::InvalidBounds { axis: "y", .. })
        ));

        let huge = FieldConfig {
            nx: 1 << 22,
            ny: 1 << 22,
            nz: 1 << 22,
            ..FieldConfig::default()
        };
        assert!(matches!(
            VectorField::new(huge),
            Err(ConfigError::InvalidParameter { name: "nx*ny*nz", .. })
        ));

        let bad_decay = FieldConfig {
            decay_factor: 1.2,
            ..FieldConfig::default()
        };
        assert!(VectorField::new(bad_decay).is_err());
    }

    #[test]
    fn test_grid_index_clamps() {
        let field = VectorField::new(integer_grid()).unwrap();
        assert_eq!(field.grid_index(Vec3::zeros()), (10, 10, 10));
        assert_eq!(field.grid_index(Vec3::repeat(-100.0)), (0, 0, 0));
        assert_eq!(field.grid_index(Vec3::repeat(100.0)), (20, 20, 20));
        assert_eq!(field.grid_index(Vec3::new(f32::NAN, 0.0, 0.0)), (0, 10, 10));
        assert_relative_eq!(field.cell_center(10, 10, 10), Vec3::zeros(), epsilon = 1e-6);
    }

    #[test]
    fn test_injection_visible_after_step() {
        let mut field = VectorField::new(integer_grid()).unwrap();
        let s = source(Vec3::zeros(), 3.0, 10.0, Vec3::x(), 20.0);

        field.inject(&s);
        assert_eq!(field.sample(Vec3::new(1.0, 0.0, 0.0)), Vec3::zeros());

        field.step();
        let v = field.sample(Vec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(v.x, 10.0 * (1.0 - 1.0 / 9.0), epsilon = 1e-5);
        assert_relative_eq!(v.y, 0.0, epsilon = 1e-6);

        // Outside the radius nothing changes
        assert_eq!(field.sample(Vec3::new(10.0, 0.0, 0.0)), Vec3::zeros());
    }

    #[test]
    fn test_thermal_lift_scales_with_influence() {
        let mut field = VectorField::new(integer_grid()).unwrap();
        // 30 °C above ambient, pointing sideways so lift is the only y term
        let s = source(Vec3::zeros(), 2.0, 0.0, Vec3::z(), 50.0);

        field.inject(&s);
        field.step();

        let centre = field.sample(Vec3::zeros());
        assert_relative_eq!(centre.y, 30.0 * 0.1, epsilon = 1e-5);
        let offset = field.sample(Vec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(offset.y, 30.0 * 0.1 * 0.75, epsilon = 1e-5);
    }

    #[test]
    fn test_injection_order_independent() {
        let a = source(Vec3::new(2.0, 1.0, 0.0), 3.0, 10.0, -Vec3::x(), 25.0);
        let b = source(Vec3::new(-2.0, 1.0, 0.0), 2.0, 5.0, Vec3::x(), 15.0);

        let mut forward = VectorField::new(FieldConfig::default()).unwrap();
        forward.inject(&a);
        forward.inject(&b);
        forward.step();

        let mut backward = VectorField::new(FieldConfig::default()).unwrap();
        backward.inject(&b);
        backward.inject(&a);
        backward.step();

        assert_eq!(forward.cells(), backward.cells());
    }

    #[test]
    fn test_decay_without_sources() {
        let mut field = VectorField::new(FieldConfig {
            decay_factor: 0.5,
            ..integer_grid()
        })
        .unwrap();
        field.inject(&source(Vec3::zeros(), 1.5, 8.0, Vec3::x(), 20.0));
        field.step();
        let first = field.sample(Vec3::zeros()).x;
        assert_relative_eq!(first, 4.0, epsilon = 1e-5);

        field.step();
        assert_relative_eq!(field.sample(Vec3::zeros()).x, 2.0, epsilon = 1e-5);
    }

    #[test]
    fn test_magnitude_clamped() {
        let mut field = VectorField::new(FieldConfig {
            max_magnitude: 5.0,
            noise_amplitude: 0.5,
            ..integer_grid()
        })
        .unwrap();
        let s = source(Vec3::zeros(), 4.0, 40.0, Vec3::new(1.0, 1.0, 0.0), 200.0);

        for _ in 0..10 {
            field.inject(&s);
            field.step();
            assert!(field.max_speed() <= 5.0 + 1e-4);
        }
        assert!(field.max_speed() > 4.9);
    }

    #[test]
    fn test_noise_is_seeded() {
        let noisy = FieldConfig {
            noise_amplitude: 0.1,
            noise_seed: 7,
            ..FieldConfig::default()
        };
        let mut a = VectorField::new(noisy.clone()).unwrap();
        let mut b = VectorField::new(noisy.clone()).unwrap();
        let mut c = VectorField::new(FieldConfig {
            noise_seed: 8,
            ..noisy
        })
        .unwrap();

        for _ in 0..3 {
            a.step();
            b.step();
            c.step();
        }
        assert_eq!(a.cells(), b.cells());
        assert_ne!(a.cells(), c.cells());
        assert!(a.max_speed() <= 0.1 * 3.0_f32.sqrt() * 3.0);
    }

    #[test]
    fn test_clear() {
        let mut field = VectorField::new(integer_grid()).unwrap();
        field.inject(&source(Vec3::zeros(), 3.0, 10.0, Vec3::x(), 20.0));
        field.step();
        assert!(field.max_speed() > 0.0);

        field.clear();
        assert_eq!(field.max_speed(), 0.0);
        assert_eq!(field.velocity_at_grid(0, 0, 0), Some(Vec3::zeros()));
        assert_eq!(field.velocity_at_grid(21, 0, 0), None);
    }
}
