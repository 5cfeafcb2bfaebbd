//! Parameterized wind emitters
//!
//! A [`WindSource`] pushes directional momentum into nearby vector field
//! cells and, while the simulation is enabled, emits particles. Sources do
//! not hold a reference to the field: after changing a parameter the new
//! value takes effect the next time the field injects the source.

use crate::core_types::vec3::{is_finite, Vec3};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default spread factor (fraction of the radius used to jitter spawned particles)
pub const DEFAULT_SPREAD: f32 = 0.5;

/// Stable identifier for a source registered with a simulation.
///
/// Ids are handed out in increasing order and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(pub u32);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Directional wind emitter
///
/// # Invariants
///
/// - `direction` is always unit length
/// - `radius` is finite and positive
/// - `speed` and `spread` are finite and non-negative
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindSource {
    position: Vec3,
    radius: f32,
    speed: f32,
    direction: Vec3,
    temperature: f32,
    spread: f32,
}

fn normalized_direction(direction: Vec3) -> Result<Vec3, ConfigError> {
    let length = direction.norm();
    if !is_finite(&direction) || length <= f32::EPSILON {
        return Err(ConfigError::InvalidDirection {
            x: direction.x,
            y: direction.y,
            z: direction.z,
        });
    }
    Ok(direction / length)
}

fn validated_radius(radius: f32) -> Result<f32, ConfigError> {
    if radius.is_finite() && radius > 0.0 {
        Ok(radius)
    } else {
        Err(ConfigError::InvalidRadius(radius))
    }
}

fn validated_speed(speed: f32) -> Result<f32, ConfigError> {
    if speed.is_finite() && speed >= 0.0 {
        Ok(speed)
    } else {
        Err(ConfigError::InvalidSpeed(speed))
    }
}

impl WindSource {
    /// Create a new wind source
    ///
    /// `direction` does not need to be normalized; it is normalized here.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `radius <= 0`, `speed < 0`, any value is not
    /// finite, or `direction` has zero length.
    pub fn new(
        position: Vec3,
        radius: f32,
        speed: f32,
        direction: Vec3,
        temperature: f32,
    ) -> Result<Self, ConfigError> {
        if !is_finite(&position) {
            return Err(ConfigError::parameter(
                "position",
                "must be finite",
                position.norm(),
            ));
        }
        if !temperature.is_finite() {
            return Err(ConfigError::parameter(
                "temperature",
                "must be finite",
                temperature,
            ));
        }

        Ok(WindSource {
            position,
            radius: validated_radius(radius)?,
            speed: validated_speed(speed)?,
            direction: normalized_direction(direction)?,
            temperature,
            spread: DEFAULT_SPREAD,
        })
    }

    /// Replace the spread factor
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] for negative or non-finite spread.
    pub fn with_spread(mut self, spread: f32) -> Result<Self, ConfigError> {
        if !spread.is_finite() || spread < 0.0 {
            return Err(ConfigError::parameter(
                "spread",
                "must be finite and non-negative",
                spread,
            ));
        }
        self.spread = spread;
        Ok(self)
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Unit direction the source blows toward
    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn spread(&self) -> f32 {
        self.spread
    }

    /// Emitted wind velocity (direction × speed)
    pub fn velocity(&self) -> Vec3 {
        self.direction * self.speed
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSpeed`] for negative or non-finite speed.
    pub fn set_speed(&mut self, speed: f32) -> Result<(), ConfigError> {
        self.speed = validated_speed(speed)?;
        Ok(())
    }

    /// Set a new direction (normalized before storing)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidDirection`] for zero-length or non-finite input.
    pub fn set_direction(&mut self, direction: Vec3) -> Result<(), ConfigError> {
        self.direction = normalized_direction(direction)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRadius`] for non-positive or non-finite radius.
    pub fn set_radius(&mut self, radius: f32) -> Result<(), ConfigError> {
        self.radius = validated_radius(radius)?;
        Ok(())
    }

    pub fn set_temperature(&mut self, temperature: f32) {
        if temperature.is_finite() {
            self.temperature = temperature;
        }
    }

    pub fn set_position(&mut self, position: Vec3) {
        if is_finite(&position) {
            self.position = position;
        }
    }

    /// Whether `point` lies inside the influence sphere
    pub fn contains(&self, point: Vec3) -> bool {
        (point - self.position).norm_squared() < self.radius * self.radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn source() -> WindSource {
        WindSource::new(Vec3::zeros(), 3.0, 10.0, Vec3::new(2.0, 0.0, 0.0), 20.0).unwrap()
    }

    #[test]
    fn test_direction_is_normalized() {
        let s = WindSource::new(Vec3::zeros(), 1.0, 1.0, Vec3::new(3.0, 4.0, 0.0), 20.0).unwrap();
        assert_relative_eq!(s.direction().norm(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(s.direction().x, 0.6, epsilon = 1e-6);
        assert_relative_eq!(s.direction().y, 0.8, epsilon = 1e-6);
    }

    #[test]
    fn test_rejects_bad_radius() {
        for radius in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let result = WindSource::new(Vec3::zeros(), radius, 1.0, Vec3::x(), 20.0);
            assert!(matches!(result, Err(ConfigError::InvalidRadius(_))), "radius {radius}");
        }
    }

    #[test]
    fn test_rejects_bad_direction() {
        let zero = WindSource::new(Vec3::zeros(), 1.0, 1.0, Vec3::zeros(), 20.0);
        assert!(matches!(zero, Err(ConfigError::InvalidDirection { .. })));

        let nan = WindSource::new(Vec3::zeros(), 1.0, 1.0, Vec3::new(f32::NAN, 0.0, 0.0), 20.0);
        assert!(matches!(nan, Err(ConfigError::InvalidDirection { .. })));
    }

    #[test]
    fn test_rejects_negative_speed() {
        let result = WindSource::new(Vec3::zeros(), 1.0, -2.0, Vec3::x(), 20.0);
        assert!(matches!(result, Err(ConfigError::InvalidSpeed(_))));
    }

    #[test]
    fn test_setters_keep_invariants() {
        let mut s = source();

        s.set_speed(4.0).unwrap();
        assert_eq!(s.speed(), 4.0);
        assert!(s.set_speed(-1.0).is_err());
        assert_eq!(s.speed(), 4.0);

        s.set_direction(Vec3::new(0.0, 0.0, -5.0)).unwrap();
        assert_relative_eq!(s.direction().z, -1.0, epsilon = 1e-6);
        assert!(s.set_direction(Vec3::zeros()).is_err());
        assert_relative_eq!(s.direction().norm(), 1.0, epsilon = 1e-6);

        s.set_temperature(80.0);
        assert_eq!(s.temperature(), 80.0);
        s.set_temperature(f32::NAN);
        assert_eq!(s.temperature(), 80.0);
    }

    #[test]
    fn test_velocity_and_contains() {
        let s = source();
        assert_relative_eq!(s.velocity().x, 10.0, epsilon = 1e-6);
        assert!(s.contains(Vec3::new(2.9, 0.0, 0.0)));
        assert!(!s.contains(Vec3::new(3.0, 0.0, 0.0)));
    }

    #[test]
    fn test_spread_builder() {
        let s = source().with_spread(0.25).unwrap();
        assert_eq!(s.spread(), 0.25);
        assert!(source().with_spread(-0.1).is_err());
    }
}
