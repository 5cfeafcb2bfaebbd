//! Airflow Simulation Core Library
//!
//! A grid-driven airflow simulation: wind sources push momentum and heat into
//! a uniform 3D vector field, particles are advected through that field under
//! gravity, buoyancy, drag and turbulence, and bounce off caller-supplied
//! triangle geometry. Snapshots can be recorded and exported as JSON for
//! offline analysis.
//!
//! ## Tick
//!
//! [`AirflowSimulation::step`] sequences one frame:
//! - wind source injection into the field write-buffer
//! - field commit, bounded noise and decay
//! - particle emission, integration and collision response
//! - throttled recorder capture
//!
//! Scene geometry is passed per tick as flattened [`Collidable`] triangle
//! batches in world space. Rendering, scene graphs and model import stay
//! with the host.
//!
//! ```no_run
//! use airflow_sim_core::{AirflowSimulation, SimulationConfig, Triangle, Collidable, Vec3, WindSource};
//!
//! let mut sim = AirflowSimulation::new(SimulationConfig::default())?;
//! sim.add_source(WindSource::new(Vec3::new(2.0, 1.0, 0.0), 3.0, 10.0, -Vec3::x(), 20.0)?);
//!
//! let floor = Triangle::quad(
//!     Vec3::new(-10.0, 0.0, -10.0),
//!     Vec3::new(-10.0, 0.0, 10.0),
//!     Vec3::new(10.0, 0.0, 10.0),
//!     Vec3::new(10.0, 0.0, -10.0),
//! );
//! sim.start_recording();
//! for _ in 0..120 {
//!     sim.step(1.0 / 60.0, &[Collidable::new(&floor)]);
//! }
//! let _json = sim.export_history()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Core types and utilities
pub mod core_types;
pub mod error;

// Airflow field, particle physics and the simulation context
pub mod grid;
pub mod physics;
pub mod simulation;

// Re-export core types
pub use core_types::{up, Particle, SourceId, Vec3, WindSource};
pub use error::{AnalysisError, ConfigError, ExportError, SimulationError};

pub use grid::{FieldConfig, GridCell, VectorField};
pub use physics::{
    closest_point, segment_intersection, Collidable, Contact, ParticleConfig, ParticleSystem,
    StepStats, Triangle,
};
pub use simulation::{
    analyze_history, AirflowSimulation, FlowSample, FlowSummary, Frame, History, RecorderConfig,
    RecorderState, SimulationConfig, SimulationRecorder, TickReport,
};
