//! Advected point-mass particles
//!
//! Implements the per-particle force model used by the particle system.
//!
//! # Physics Models
//!
//! 1. **Field advection** - the local vector field velocity is blended
//!    additively into the particle velocity (never overwritten)
//! 2. **Gravity** - constant downward acceleration `g`
//! 3. **Buoyancy** - particles warmer than ambient air rise
//! 4. **Drag** - quadratic air resistance opposing motion
//! 5. **Turbulence** - bounded random jitter scaled by the particle's own
//!    turbulence value
//!
//! Integration is semi-implicit Euler: velocity first, then position with
//! the updated velocity.

use crate::core_types::vec3::{is_finite, up, Vec3};
use crate::physics::ParticleConfig;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Point-mass particle advected by the vector field
///
/// # Invariants
///
/// - `mass > 0`
/// - `turbulence` stays in `[0, 1]`
/// - while `alive`, `elapsed < lifespan`; once dead a particle is never revived
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub(crate) position: Vec3,
    pub(crate) velocity: Vec3,
    pub(crate) mass: f32,
    pub(crate) temperature: f32,
    pub(crate) turbulence: f32,
    pub(crate) elapsed: f32,
    pub(crate) lifespan: f32,
    pub(crate) alive: bool,
}

impl Particle {
    /// Create a new particle with zero elapsed time
    ///
    /// Mass is clamped to a small positive minimum and turbulence to `[0, 1]`.
    pub fn new(
        position: Vec3,
        velocity: Vec3,
        mass: f32,
        temperature: f32,
        turbulence: f32,
        lifespan: f32,
    ) -> Self {
        Particle {
            position,
            velocity,
            mass: mass.max(1e-6),
            temperature,
            turbulence: turbulence.clamp(0.0, 1.0),
            elapsed: 0.0,
            lifespan,
            alive: lifespan > 0.0,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Current temperature (°C)
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn turbulence(&self) -> f32 {
        self.turbulence
    }

    /// Seconds since spawn
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn lifespan(&self) -> f32 {
        self.lifespan
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Blend in the field sample, accumulate forces and integrate one step
    ///
    /// # Forces
    ///
    /// ```text
    /// F_g = -m × g × up
    /// F_b = (T - T_ambient) × k_b × up
    /// F_d = -v̂ × 0.5 × ρ × C_d × A × |v|²
    /// a_t = jitter ∈ [-1, 1]³ × turbulence × k_t
    /// ```
    ///
    /// Drag acceleration is capped at `max_drag_acceleration` and at `|v| / dt`
    /// so a single step can slow the particle to rest but never reverse it.
    pub(crate) fn integrate(
        &mut self,
        field_velocity: Vec3,
        ambient_temperature: f32,
        config: &ParticleConfig,
        dt: f32,
        rng: &mut impl Rng,
    ) {
        // 1. Additive field blend
        self.velocity += field_velocity * (config.field_strength * dt);

        // 2. Forces (as accelerations)
        let gravity = -up() * config.gravity;
        let buoyancy =
            up() * ((self.temperature - ambient_temperature) * config.buoyancy_factor / self.mass);
        let drag = self.drag_acceleration(config, dt);
        let turbulence = if self.turbulence > 0.0 {
            let jitter = Vec3::new(
                rng.random_range(-1.0_f32..=1.0),
                rng.random_range(-1.0_f32..=1.0),
                rng.random_range(-1.0_f32..=1.0),
            );
            jitter * (self.turbulence * config.turbulence_strength)
        } else {
            Vec3::zeros()
        };

        // 3. Semi-implicit Euler
        let acceleration = gravity + buoyancy + drag + turbulence;
        self.velocity += acceleration * dt;
        self.position += self.velocity * dt;
    }

    fn drag_acceleration(&self, config: &ParticleConfig, dt: f32) -> Vec3 {
        let speed = self.velocity.norm();
        if speed < 1e-6 {
            return Vec3::zeros();
        }

        let drag_force = 0.5
            * config.air_density
            * config.drag_coefficient
            * config.cross_section_area
            * speed
            * speed;
        let magnitude = (drag_force / self.mass)
            .min(config.max_drag_acceleration)
            .min(speed / dt);

        -self.velocity / speed * magnitude
    }

    /// Raise turbulence after an impact, bounded at 1.0
    pub(crate) fn agitate(&mut self, amount: f32) {
        self.turbulence = (self.turbulence + amount).min(1.0);
    }

    /// Advance age and apply the expiry rules
    pub(crate) fn age(&mut self, dt: f32, max_world_radius: f32) {
        self.elapsed += dt;
        if self.elapsed >= self.lifespan || self.position.norm() > max_world_radius {
            self.alive = false;
        }
    }

    /// Whether position and velocity are still finite numbers
    pub(crate) fn is_finite(&self) -> bool {
        is_finite(&self.position) && is_finite(&self.velocity)
    }

    pub(crate) fn kill(&mut self) {
        self.alive = false;
    }
}

/// Uniform random point inside a sphere of `radius` around `center`
pub(crate) fn jitter_in_sphere(center: Vec3, radius: f32, rng: &mut impl Rng) -> Vec3 {
    if radius <= 0.0 {
        return center;
    }
    // Rejection sampling: expected ~1.9 draws
    loop {
        let candidate = Vec3::new(
            rng.random_range(-1.0_f32..=1.0),
            rng.random_range(-1.0_f32..=1.0),
            rng.random_range(-1.0_f32..=1.0),
        );
        if candidate.norm_squared() <= 1.0 {
            return center + candidate * radius;
        }
    }
}

/// Generate `count` particles around `origin`
///
/// Each particle gets the configured default mass and lifespan, the given
/// initial velocity and temperature, and a turbulence value drawn from `rng`
/// in `[0, max_initial_turbulence]`.
pub(crate) fn spawn_particles(
    origin: Vec3,
    count: usize,
    velocity: Vec3,
    temperature: f32,
    jitter_radius: f32,
    config: &ParticleConfig,
    rng: &mut impl Rng,
) -> Vec<Particle> {
    (0..count)
        .map(|_| {
            let position = jitter_in_sphere(origin, jitter_radius, rng);
            let turbulence = rng.random::<f32>() * config.max_initial_turbulence;
            Particle::new(
                position,
                velocity,
                config.default_mass,
                temperature,
                turbulence,
                config.default_lifespan,
            )
        })
        .collect()
}
