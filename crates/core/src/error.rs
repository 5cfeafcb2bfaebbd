//! Error types for the airflow core.
//!
//! Construction-time problems are reported as [`ConfigError`] and never enter a
//! running simulation. Everything that can go wrong inside a tick is soft
//! (clamped, ignored or logged) and has no error type at all.

use crate::core_types::wind_source::SourceId;
use thiserror::Error;

/// Invalid parameters detected while building a field, source or simulation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A grid dimension was zero
    #[error("Grid dimension along {axis} must be positive, got {value}")]
    InvalidDimension {
        /// Axis name (`"x"`, `"y"` or `"z"`)
        axis: &'static str,
        /// Offending cell count
        value: usize,
    },

    /// World bounds were non-finite or had `max <= min` on some axis
    #[error("World bounds are degenerate on the {axis} axis: min={min}, max={max}")]
    InvalidBounds {
        /// Axis name (`"x"`, `"y"` or `"z"`)
        axis: &'static str,
        /// Lower bound
        min: f32,
        /// Upper bound
        max: f32,
    },

    /// Source radius was zero, negative or not finite
    #[error("Wind source radius must be finite and positive, got {0}")]
    InvalidRadius(f32),

    /// Source speed was negative or not finite
    #[error("Wind source speed must be finite and non-negative, got {0}")]
    InvalidSpeed(f32),

    /// Direction vector could not be normalized
    #[error("Direction must be finite with non-zero length, got ({x}, {y}, {z})")]
    InvalidDirection {
        /// X component
        x: f32,
        /// Y component
        y: f32,
        /// Z component
        z: f32,
    },

    /// Any other out-of-range tuning parameter
    #[error("Parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name as it appears in the config struct
        name: &'static str,
        /// What constraint was violated
        reason: String,
    },
}

impl ConfigError {
    /// Shorthand for [`ConfigError::InvalidParameter`] with a formatted value.
    pub(crate) fn parameter(name: &'static str, constraint: &str, value: f32) -> Self {
        ConfigError::InvalidParameter {
            name,
            reason: format!("{constraint}, got {value}"),
        }
    }
}

/// Failures of [`SimulationRecorder`](crate::simulation::SimulationRecorder) export.
///
/// Neither variant affects the running simulation; recording can simply be
/// restarted.
#[derive(Error, Debug)]
pub enum ExportError {
    /// Fewer than two frames were captured
    #[error("Insufficient simulation data: got {frames} frames, need at least 2")]
    InsufficientData {
        /// Number of frames in the history
        frames: usize,
    },

    /// Serialization or the underlying writer failed
    #[error("Failed to write simulation history: {0}")]
    WriteFailure(#[from] std::io::Error),
}

impl From<serde_json::Error> for ExportError {
    fn from(err: serde_json::Error) -> Self {
        ExportError::WriteFailure(err.into())
    }
}

/// Errors returned by [`AirflowSimulation`](crate::simulation::AirflowSimulation) requests.
#[derive(Error, Debug)]
pub enum SimulationError {
    /// No source with this id is registered
    #[error("Unknown wind source {0}")]
    UnknownSource(SourceId),

    /// A parameter update was rejected
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A configuration file could not be read or parsed
    #[error("Failed to load configuration: {0}")]
    ConfigLoad(String),
}

/// Errors from offline history analysis.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// Fewer than two frames contained usable particle data
    #[error("Insufficient simulation data: {valid_frames} usable frames, need at least 2")]
    InsufficientData {
        /// Frames that had at least one valid particle
        valid_frames: usize,
    },
}
