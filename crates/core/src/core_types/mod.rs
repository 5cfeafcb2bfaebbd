//! Core types and utilities

pub mod noise;
pub mod particle;
pub mod vec3;
pub mod wind_source;

pub use particle::Particle;
pub use vec3::{up, Vec3};
pub use wind_source::{SourceId, WindSource};
