//! Particle pool and per-tick particle physics
//!
//! Each tick, for every live particle:
//! 1. sample the vector field and blend it into the velocity
//! 2. accumulate gravity, buoyancy, drag and turbulence
//! 3. integrate (semi-implicit Euler)
//! 4. resolve collisions against every collidable batch
//! 5. confine to the world bounds
//! 6. age the particle and apply the expiry rules
//!
//! Dead particles are pruned at the end of the tick, so indices into
//! [`ParticleSystem::particles`] are not stable across ticks.

use crate::core_types::particle::{spawn_particles, Particle};
use crate::core_types::vec3::Vec3;
use crate::core_types::wind_source::WindSource;
use crate::error::ConfigError;
use crate::grid::VectorField;
use crate::physics::collision::{closest_point, facing, segment_intersection, Collidable};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Tuning for particle forces, collisions and lifetime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleConfig {
    /// Gravitational acceleration (m/s²), applied along -Y
    pub gravity: f32,

    /// Air density (kg/m³)
    pub air_density: f32,

    /// Drag coefficient (0.47 for a sphere)
    pub drag_coefficient: f32,

    /// Particle cross-section (m²)
    pub cross_section_area: f32,

    /// Collision radius (m)
    pub particle_radius: f32,

    /// Buoyant force per degree above ambient (N/°C)
    pub buoyancy_factor: f32,

    /// Peak turbulent acceleration at turbulence 1.0 (m/s²)
    pub turbulence_strength: f32,

    /// Field coupling rate (1/s). Each tick adds `sample × field_strength × dt`
    /// to the particle velocity.
    pub field_strength: f32,

    /// Fraction of speed kept after bouncing off a collidable
    pub restitution: f32,

    /// Extra clearance when pushing a particle out of a surface (m)
    pub collision_margin: f32,

    /// Turbulence added on every collision (result capped at 1.0)
    pub collision_turbulence_boost: f32,

    /// Per-axis damping when bouncing off the world bounds.
    /// Defaults: x 0.7, y (floor/ceiling) 0.5, z 0.7.
    pub boundary_bounce: Vec3,

    /// Particles farther than this from the origin are removed (m)
    pub max_world_radius: f32,

    /// Mass of newly spawned particles (kg)
    pub default_mass: f32,

    /// Lifespan of newly spawned particles (s)
    pub default_lifespan: f32,

    /// Upper bound of the random initial turbulence
    pub max_initial_turbulence: f32,

    /// Pool capacity; spawn requests beyond it are truncated
    pub max_particles: usize,

    /// Cap on drag deceleration to keep large steps stable (m/s²)
    pub max_drag_acceleration: f32,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            gravity: 9.81,
            air_density: 1.225,
            drag_coefficient: 0.47,
            cross_section_area: 0.0079, // π × 0.05²
            particle_radius: 0.05,
            buoyancy_factor: 0.05,
            turbulence_strength: 2.0,
            field_strength: 1.0,
            restitution: 0.7,
            collision_margin: 0.001,
            collision_turbulence_boost: 0.2,
            boundary_bounce: Vec3::new(0.7, 0.5, 0.7),
            max_world_radius: 100.0,
            default_mass: 1.0,
            default_lifespan: 5.0,
            max_initial_turbulence: 0.1,
            max_particles: 10_000,
            max_drag_acceleration: 50.0,
        }
    }
}

fn require(name: &'static str, ok: bool, constraint: &str, value: f32) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::parameter(name, constraint, value))
    }
}

impl ParticleConfig {
    /// Check every parameter against its physical range
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] for the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_negative = |v: f32| v.is_finite() && v >= 0.0;
        let positive = |v: f32| v.is_finite() && v > 0.0;

        require("gravity", non_negative(self.gravity), "must be non-negative", self.gravity)?;
        require("air_density", non_negative(self.air_density), "must be non-negative", self.air_density)?;
        require(
            "drag_coefficient",
            non_negative(self.drag_coefficient),
            "must be non-negative",
            self.drag_coefficient,
        )?;
        require(
            "cross_section_area",
            non_negative(self.cross_section_area),
            "must be non-negative",
            self.cross_section_area,
        )?;
        require("particle_radius", positive(self.particle_radius), "must be positive", self.particle_radius)?;
        require(
            "buoyancy_factor",
            self.buoyancy_factor.is_finite(),
            "must be finite",
            self.buoyancy_factor,
        )?;
        require(
            "turbulence_strength",
            non_negative(self.turbulence_strength),
            "must be non-negative",
            self.turbulence_strength,
        )?;
        require(
            "field_strength",
            non_negative(self.field_strength),
            "must be non-negative",
            self.field_strength,
        )?;
        require(
            "restitution",
            (0.0..=1.0).contains(&self.restitution),
            "must be within [0, 1]",
            self.restitution,
        )?;
        require(
            "collision_margin",
            non_negative(self.collision_margin),
            "must be non-negative",
            self.collision_margin,
        )?;
        require(
            "collision_turbulence_boost",
            non_negative(self.collision_turbulence_boost),
            "must be non-negative",
            self.collision_turbulence_boost,
        )?;
        for bounce in self.boundary_bounce.iter() {
            require(
                "boundary_bounce",
                (0.0..=1.0).contains(bounce),
                "each axis must be within [0, 1]",
                *bounce,
            )?;
        }
        require(
            "max_world_radius",
            positive(self.max_world_radius),
            "must be positive",
            self.max_world_radius,
        )?;
        require("default_mass", positive(self.default_mass), "must be positive", self.default_mass)?;
        require(
            "default_lifespan",
            positive(self.default_lifespan),
            "must be positive",
            self.default_lifespan,
        )?;
        require(
            "max_initial_turbulence",
            (0.0..=1.0).contains(&self.max_initial_turbulence),
            "must be within [0, 1]",
            self.max_initial_turbulence,
        )?;
        require(
            "max_drag_acceleration",
            positive(self.max_drag_acceleration),
            "must be positive",
            self.max_drag_acceleration,
        )?;
        Ok(())
    }
}

/// Per-tick counters returned by [`ParticleSystem::step`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepStats {
    /// Particles still alive after pruning
    pub alive: usize,
    /// Particles removed this tick by age or world radius (faults excluded)
    pub expired: usize,
    /// Collision responses applied this tick
    pub collisions: usize,
    /// Particles removed because their state became non-finite
    pub faults: usize,
}

/// Owns the pool of live particles
#[derive(Debug, Clone)]
pub struct ParticleSystem {
    particles: Vec<Particle>,
    config: ParticleConfig,
}

impl ParticleSystem {
    pub fn new(config: ParticleConfig) -> Self {
        ParticleSystem {
            particles: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &ParticleConfig {
        &self.config
    }

    /// Live particles, in no guaranteed order
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Remove every particle
    pub fn clear(&mut self) {
        self.particles.clear();
    }

    /// Room left before `max_particles`, truncating `requested` with a warning
    fn admit(&self, requested: usize) -> usize {
        let room = self.config.max_particles.saturating_sub(self.particles.len());
        if requested > room {
            warn!(
                "Particle pool full: spawning {} of {} requested (max {})",
                room, requested, self.config.max_particles
            );
        }
        requested.min(room)
    }

    /// Spawn `count` particles jittered uniformly within `jitter_radius` of `origin`
    ///
    /// Returns the number actually created, which may be lower than `count`
    /// when the pool is full.
    pub fn spawn(
        &mut self,
        origin: Vec3,
        count: usize,
        velocity_hint: Vec3,
        jitter_radius: f32,
        temperature: f32,
        rng: &mut impl Rng,
    ) -> usize {
        let count = self.admit(count);
        let spawned = spawn_particles(
            origin,
            count,
            velocity_hint,
            temperature,
            jitter_radius.max(0.0),
            &self.config,
            rng,
        );
        self.particles.extend(spawned);
        count
    }

    /// Spawn from a wind source: jittered within `radius × spread`, moving
    /// with the source velocity at the source temperature
    pub fn spawn_from_source(&mut self, source: &WindSource, count: usize, rng: &mut impl Rng) -> usize {
        self.spawn(
            source.position(),
            count,
            source.velocity(),
            source.radius() * source.spread(),
            source.temperature(),
            rng,
        )
    }

    /// Fill the box `[min, max]` uniformly with resting particles
    pub fn spawn_ambient(
        &mut self,
        count: usize,
        bounds: (Vec3, Vec3),
        temperature: f32,
        rng: &mut impl Rng,
    ) -> usize {
        let count = self.admit(count);
        let (min, max) = bounds;
        let center = (min + max) * 0.5;
        let half = (max - min) * 0.5;

        for _ in 0..count {
            let offset = Vec3::new(
                rng.random_range(-1.0_f32..=1.0) * half.x,
                rng.random_range(-1.0_f32..=1.0) * half.y,
                rng.random_range(-1.0_f32..=1.0) * half.z,
            );
            let turbulence = rng.random::<f32>() * self.config.max_initial_turbulence;
            self.particles.push(Particle::new(
                center + offset,
                Vec3::zeros(),
                self.config.default_mass,
                temperature,
                turbulence,
                self.config.default_lifespan,
            ));
        }
        count
    }

    /// Add one fully specified particle; returns false when the pool is full
    pub fn insert(&mut self, particle: Particle) -> bool {
        if self.admit(1) == 1 {
            self.particles.push(particle);
            true
        } else {
            false
        }
    }

    /// Advance every particle by `dt`, then prune the dead
    pub fn step(
        &mut self,
        dt: f32,
        field: &VectorField,
        collidables: &[Collidable<'_>],
        rng: &mut impl Rng,
    ) -> StepStats {
        let config = &self.config;
        let ambient = field.config().ambient_temperature;
        let bounds = field.bounds();
        let mut stats = StepStats::default();

        for particle in self.particles.iter_mut().filter(|p| p.alive) {
            let previous = particle.position;

            particle.integrate(field.sample(previous), ambient, config, dt, rng);

            for collidable in collidables {
                if resolve_collision(particle, previous, collidable, config) {
                    stats.collisions += 1;
                }
            }

            confine(particle, bounds, config.boundary_bounce);
            particle.age(dt, config.max_world_radius);

            if !particle.is_finite() {
                debug!("Removing particle with non-finite state at {:?}", previous);
                particle.kill();
                stats.faults += 1;
            }
        }

        let before = self.particles.len();
        self.particles.retain(|p| p.alive);
        stats.expired = before - self.particles.len() - stats.faults;
        stats.alive = self.particles.len();
        stats
    }
}

/// Bounce `particle` off `collidable` if it touches or crossed a surface this step
fn resolve_collision(
    particle: &mut Particle,
    previous: Vec3,
    collidable: &Collidable<'_>,
    config: &ParticleConfig,
) -> bool {
    if collidable.is_empty() {
        return false;
    }

    // A crossing means the particle passed through a surface within one step;
    // its normal already faces the side the particle came from.
    let contact = segment_intersection(previous, particle.position, collidable)
        .or_else(|| closest_point(particle.position, config.particle_radius, collidable));
    let Some(contact) = contact else {
        return false;
    };

    let normal = facing(contact.normal, contact.point, previous);
    let normal_speed = particle.velocity.dot(&normal);
    if normal_speed < 0.0 {
        let reflected = particle.velocity - normal * (2.0 * normal_speed);
        particle.velocity = reflected * config.restitution;
    }

    particle.position = contact.point + normal * (config.particle_radius + config.collision_margin);
    particle.agitate(config.collision_turbulence_boost);
    true
}

/// Clamp to the world box, reflecting and damping the outward velocity component
fn confine(particle: &mut Particle, bounds: (Vec3, Vec3), bounce: Vec3) {
    let (min, max) = bounds;
    for axis in 0..3 {
        if particle.position[axis] < min[axis] {
            particle.position[axis] = min[axis];
            if particle.velocity[axis] < 0.0 {
                particle.velocity[axis] = -particle.velocity[axis] * bounce[axis];
            }
        } else if particle.position[axis] > max[axis] {
            particle.position[axis] = max[axis];
            if particle.velocity[axis] > 0.0 {
                particle.velocity[axis] = -particle.velocity[axis] * bounce[axis];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::FieldConfig;
    use crate::physics::collision::Triangle;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn calm_field() -> VectorField {
        VectorField::new(FieldConfig {
            nx: 10,
            ny: 10,
            nz: 10,
            bounds_min: Vec3::new(-5.0, 0.0, -5.0),
            bounds_max: Vec3::new(5.0, 10.0, 5.0),
            noise_amplitude: 0.0,
            ..FieldConfig::default()
        })
        .unwrap()
    }

    fn weightless() -> ParticleConfig {
        ParticleConfig {
            gravity: 0.0,
            drag_coefficient: 0.0,
            turbulence_strength: 0.0,
            ..ParticleConfig::default()
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(ParticleConfig::default().validate().is_ok());

        let bad = ParticleConfig {
            restitution: 1.5,
            ..ParticleConfig::default()
        };
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::InvalidParameter { name: "restitution", .. })
        ));

        let bad = ParticleConfig {
            particle_radius: 0.0,
            ..ParticleConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_spawn_respects_capacity() {
        let mut system = ParticleSystem::new(ParticleConfig {
            max_particles: 25,
            ..ParticleConfig::default()
        });
        let mut rng = StdRng::seed_from_u64(0);

        assert_eq!(system.spawn(Vec3::zeros(), 20, Vec3::zeros(), 0.5, 20.0, &mut rng), 20);
        assert_eq!(system.spawn(Vec3::zeros(), 20, Vec3::zeros(), 0.5, 20.0, &mut rng), 5);
        assert_eq!(system.len(), 25);
    }

    #[test]
    fn test_spawn_from_source_uses_source_state() {
        let source = WindSource::new(Vec3::new(1.0, 2.0, 0.0), 2.0, 4.0, Vec3::x(), 35.0)
            .unwrap()
            .with_spread(0.25)
            .unwrap();
        let mut system = ParticleSystem::new(ParticleConfig::default());
        let mut rng = StdRng::seed_from_u64(0);

        system.spawn_from_source(&source, 30, &mut rng);
        for p in system.particles() {
            assert!((p.position() - source.position()).norm() <= 0.5 + 1e-6);
            assert_relative_eq!(p.velocity(), Vec3::new(4.0, 0.0, 0.0), epsilon = 1e-6);
            assert_eq!(p.temperature(), 35.0);
        }
    }

    #[test]
    fn test_spawn_ambient_inside_bounds() {
        let mut system = ParticleSystem::new(ParticleConfig::default());
        let mut rng = StdRng::seed_from_u64(5);
        let bounds = (Vec3::new(-1.0, 0.0, -1.0), Vec3::new(1.0, 2.0, 1.0));

        system.spawn_ambient(100, bounds, 20.0, &mut rng);
        assert_eq!(system.len(), 100);
        for p in system.particles() {
            for axis in 0..3 {
                assert!(p.position()[axis] >= bounds.0[axis] - 1e-6);
                assert!(p.position()[axis] <= bounds.1[axis] + 1e-6);
            }
        }
    }

    #[test]
    fn test_near_expiry_survives_small_tick() {
        let field = calm_field();
        let mut system = ParticleSystem::new(weightless());
        let mut rng = StdRng::seed_from_u64(0);

        let mut particle = Particle::new(Vec3::new(0.0, 5.0, 0.0), Vec3::zeros(), 1.0, 20.0, 0.0, 5.0);
        particle.elapsed = 5.0 - 0.01;
        system.insert(particle);

        let stats = system.step(0.005, &field, &[], &mut rng);
        assert_eq!(stats.alive, 1);
        assert!(system.particles()[0].elapsed() < system.particles()[0].lifespan());

        let stats = system.step(0.01, &field, &[], &mut rng);
        assert_eq!(stats.alive, 0);
        assert_eq!(stats.expired, 1);
    }

    #[test]
    fn test_leaving_world_radius_kills() {
        let field = VectorField::new(FieldConfig {
            bounds_min: Vec3::new(-500.0, -500.0, -500.0),
            bounds_max: Vec3::new(500.0, 500.0, 500.0),
            noise_amplitude: 0.0,
            ..FieldConfig::default()
        })
        .unwrap();
        let mut system = ParticleSystem::new(weightless());
        let mut rng = StdRng::seed_from_u64(0);
        system.insert(Particle::new(
            Vec3::new(99.9, 0.0, 0.0),
            Vec3::new(10.0, 0.0, 0.0),
            1.0,
            20.0,
            0.0,
            5.0,
        ));

        let stats = system.step(0.1, &field, &[], &mut rng);
        assert_eq!(stats.expired, 1);
        assert!(system.is_empty());
    }

    #[test]
    fn test_bounds_bounce_per_axis() {
        let field = calm_field();
        let mut system = ParticleSystem::new(weightless());
        let mut rng = StdRng::seed_from_u64(0);
        // Heading out through the floor (y = 0)
        system.insert(Particle::new(
            Vec3::new(0.0, 0.05, 0.0),
            Vec3::new(0.0, -2.0, 0.0),
            1.0,
            20.0,
            0.0,
            5.0,
        ));

        system.step(0.1, &field, &[], &mut rng);
        let p = &system.particles()[0];
        assert_relative_eq!(p.position().y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(p.velocity().y, 1.0, epsilon = 1e-5); // 2.0 × 0.5
    }

    #[test]
    fn test_collision_reflects_and_agitates() {
        let field = calm_field();
        let mut system = ParticleSystem::new(weightless());
        let mut rng = StdRng::seed_from_u64(0);
        let shelf: Vec<Triangle> = Triangle::quad(
            Vec3::new(-2.0, 3.0, -2.0),
            Vec3::new(-2.0, 3.0, 2.0),
            Vec3::new(2.0, 3.0, 2.0),
            Vec3::new(2.0, 3.0, -2.0),
        )
        .to_vec();
        let collidables = [Collidable::new(&shelf)];

        system.insert(Particle::new(
            Vec3::new(0.3, 3.2, 0.7),
            Vec3::new(0.0, -4.0, 0.0),
            1.0,
            20.0,
            0.0,
            5.0,
        ));

        // 3.2 → 2.8 crosses the shelf within one step
        let stats = system.step(0.1, &field, &collidables, &mut rng);
        assert_eq!(stats.collisions, 1);

        let p = &system.particles()[0];
        assert!(p.position().y > 3.0, "should stay above the shelf: {}", p.position().y);
        assert_relative_eq!(p.velocity().y, 4.0 * 0.7, epsilon = 1e-5);
        assert_relative_eq!(p.turbulence(), 0.2, epsilon = 1e-6);
    }

    #[test]
    fn test_empty_collidable_is_ignored() {
        let field = calm_field();
        let mut system = ParticleSystem::new(weightless());
        let mut rng = StdRng::seed_from_u64(0);
        system.insert(Particle::new(Vec3::new(0.0, 5.0, 0.0), Vec3::x(), 1.0, 20.0, 0.0, 5.0));

        let empty: Vec<Triangle> = Vec::new();
        let stats = system.step(0.1, &field, &[Collidable::new(&empty)], &mut rng);
        assert_eq!(stats.collisions, 0);
        assert_eq!(stats.alive, 1);
    }

    #[test]
    fn test_non_finite_particle_removed_alone() {
        let field = calm_field();
        let mut system = ParticleSystem::new(weightless());
        let mut rng = StdRng::seed_from_u64(0);
        system.insert(Particle::new(
            Vec3::new(0.0, 5.0, 0.0),
            Vec3::new(f32::NAN, 0.0, 0.0),
            1.0,
            20.0,
            0.0,
            5.0,
        ));
        system.insert(Particle::new(Vec3::new(1.0, 5.0, 0.0), Vec3::zeros(), 1.0, 20.0, 0.0, 5.0));

        let stats = system.step(0.1, &field, &[], &mut rng);
        assert_eq!(stats.faults, 1);
        assert_eq!(stats.expired, 0);
        assert_eq!(stats.alive, 1);
        assert_relative_eq!(system.particles()[0].position().x, 1.0, epsilon = 1e-6);
    }
}
