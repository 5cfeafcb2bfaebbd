//! Particle dynamics and collision response

pub mod collision;
pub mod particle_system;

pub use collision::{closest_point, segment_intersection, Collidable, Contact, Triangle};
pub use particle_system::{ParticleConfig, ParticleSystem, StepStats};
