//! Airflow simulation context
//!
//! [`AirflowSimulation`] owns every piece of state a run needs: the vector
//! field, the registered wind sources, the particle pool, the recorder and a
//! seeded RNG. Nothing is global, so several independent simulations can run
//! side by side.
//!
//! Each call to [`AirflowSimulation::step`] runs, in order:
//! 1. source injection into the field write-buffer (enabled only)
//! 2. field commit, noise and decay
//! 3. particle emission from every source (enabled only)
//! 4. particle step against the host's collidables
//! 5. recorder capture at the new simulation time

pub mod analysis;
pub mod recorder;

pub use analysis::{analyze_history, FlowSample, FlowSummary};
pub use recorder::{
    Frame, History, ParticleRecord, RecorderConfig, RecorderState, SimulationRecorder, SourceRecord,
    Vec3Record,
};

use crate::core_types::particle::Particle;
use crate::core_types::vec3::Vec3;
use crate::core_types::wind_source::{SourceId, WindSource};
use crate::error::{ConfigError, ExportError, SimulationError};
use crate::grid::{FieldConfig, VectorField};
use crate::physics::{Collidable, ParticleConfig, ParticleSystem, StepStats};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, trace, warn};

/// Full configuration of a simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub field: FieldConfig,
    pub particles: ParticleConfig,
    pub recorder: RecorderConfig,

    /// Seed for the particle RNG (spawn jitter and turbulence)
    pub seed: u64,

    /// Particles emitted per second by each source while enabled
    pub emission_rate: f32,

    /// Larger `dt` values are clamped to this (s)
    pub max_time_step: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            field: FieldConfig::default(),
            particles: ParticleConfig::default(),
            recorder: RecorderConfig::default(),
            seed: 42,
            emission_rate: 20.0,
            max_time_step: 0.1,
        }
    }
}

impl SimulationConfig {
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found in any section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.field.validate()?;
        self.particles.validate()?;
        self.recorder.validate()?;

        if !(self.emission_rate.is_finite() && self.emission_rate >= 0.0) {
            return Err(ConfigError::parameter(
                "emission_rate",
                "must be finite and non-negative",
                self.emission_rate,
            ));
        }
        if !(self.max_time_step.is_finite() && self.max_time_step > 0.0) {
            return Err(ConfigError::parameter(
                "max_time_step",
                "must be finite and positive",
                self.max_time_step,
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration; missing fields take defaults
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::ConfigLoad`] for malformed JSON and
    /// [`SimulationError::Config`] for out-of-range values.
    pub fn from_json_str(json: &str) -> Result<Self, SimulationError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| SimulationError::ConfigLoad(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::ConfigLoad`] if the file cannot be read, plus
    /// everything [`from_json_str`](Self::from_json_str) can return.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SimulationError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| SimulationError::ConfigLoad(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&contents)
    }
}

/// What happened during one [`AirflowSimulation::step`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickReport {
    /// Time step actually applied after clamping (0 when the tick was rejected)
    pub dt: f32,
    /// Simulation time after the tick
    pub time: f32,
    /// Particles emitted by sources this tick
    pub emitted: usize,
    pub particles: StepStats,
    /// Whether the recorder captured a frame
    pub recorded: bool,
}

#[derive(Debug, Clone)]
struct SourceSlot {
    source: WindSource,
    /// Fractional particles carried over between ticks
    emission_backlog: f32,
}

/// Owns and sequences a complete airflow simulation
#[derive(Debug, Clone)]
pub struct AirflowSimulation {
    config: SimulationConfig,
    field: VectorField,
    sources: BTreeMap<SourceId, SourceSlot>,
    next_source_id: u32,
    particles: ParticleSystem,
    recorder: SimulationRecorder,
    rng: StdRng,
    enabled: bool,
    time: f32,
    frame_number: u64,
}

impl AirflowSimulation {
    /// Build a simulation with an empty field and no sources
    ///
    /// The simulation starts enabled.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails validation.
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let field = VectorField::new(config.field.clone())?;
        let particles = ParticleSystem::new(config.particles.clone());
        let recorder = SimulationRecorder::new(config.recorder.clone());
        let rng = StdRng::seed_from_u64(config.seed);

        info!(
            "Airflow simulation created: seed {}, emission {}/s per source",
            config.seed, config.emission_rate
        );

        Ok(Self {
            config,
            field,
            sources: BTreeMap::new(),
            next_source_id: 0,
            particles,
            recorder,
            rng,
            enabled: true,
            time: 0.0,
            frame_number: 0,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Sources
    // ------------------------------------------------------------------

    /// Register a source; ids increase monotonically and are never reused
    pub fn add_source(&mut self, source: WindSource) -> SourceId {
        let id = SourceId(self.next_source_id);
        self.next_source_id += 1;
        info!(
            "Added wind source {} at {:?} (radius {}, speed {})",
            id,
            source.position(),
            source.radius(),
            source.speed()
        );
        self.sources.insert(
            id,
            SourceSlot {
                source,
                emission_backlog: 0.0,
            },
        );
        id
    }

    pub fn source(&self, id: SourceId) -> Option<&WindSource> {
        self.sources.get(&id).map(|slot| &slot.source)
    }

    /// Mutable access; the field sees changes on the next tick's injection
    pub fn source_mut(&mut self, id: SourceId) -> Option<&mut WindSource> {
        self.sources.get_mut(&id).map(|slot| &mut slot.source)
    }

    /// Apply a fallible parameter update to one source
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::UnknownSource`] for an unregistered id, or the
    /// update's own [`ConfigError`]. A rejected update leaves the source unchanged.
    pub fn update_source<F>(&mut self, id: SourceId, update: F) -> Result<(), SimulationError>
    where
        F: FnOnce(&mut WindSource) -> Result<(), ConfigError>,
    {
        let slot = self
            .sources
            .get_mut(&id)
            .ok_or(SimulationError::UnknownSource(id))?;

        let mut candidate = slot.source.clone();
        update(&mut candidate)?;
        slot.source = candidate;
        debug!("Updated wind source {}", id);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`SimulationError::UnknownSource`] for an unregistered id.
    pub fn remove_source(&mut self, id: SourceId) -> Result<WindSource, SimulationError> {
        let slot = self
            .sources
            .remove(&id)
            .ok_or(SimulationError::UnknownSource(id))?;
        info!("Removed wind source {}", id);
        Ok(slot.source)
    }

    /// Registered sources in id order
    pub fn sources(&self) -> impl Iterator<Item = (SourceId, &WindSource)> {
        self.sources.iter().map(|(id, slot)| (*id, &slot.source))
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    // ------------------------------------------------------------------
    // Control
    // ------------------------------------------------------------------

    /// Enable or disable source injection and emission
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            info!("Airflow {}", if enabled { "enabled" } else { "disabled" });
        }
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Emit `count` particles from one source immediately
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::UnknownSource`] for an unregistered id.
    pub fn spawn_from_source(&mut self, id: SourceId, count: usize) -> Result<usize, SimulationError> {
        let slot = self.sources.get(&id).ok_or(SimulationError::UnknownSource(id))?;
        Ok(self
            .particles
            .spawn_from_source(&slot.source, count, &mut self.rng))
    }

    /// Fill the world bounds with resting particles at ambient temperature
    pub fn spawn_ambient(&mut self, count: usize) -> usize {
        let bounds = self.field.bounds();
        let ambient = self.field.config().ambient_temperature;
        self.particles
            .spawn_ambient(count, bounds, ambient, &mut self.rng)
    }

    pub fn clear_particles(&mut self) {
        debug!("Clearing {} particles", self.particles.len());
        self.particles.clear();
    }

    /// Zero the field, drop all particles and rewind the clock
    ///
    /// Sources are kept. An active recording restarts from the new clock,
    /// discarding frames captured before the reset; an idle recorder keeps
    /// its history.
    pub fn reset(&mut self) {
        self.field.clear();
        self.particles.clear();
        for slot in self.sources.values_mut() {
            slot.emission_backlog = 0.0;
        }
        self.time = 0.0;
        self.frame_number = 0;
        if self.recorder.is_recording() {
            self.recorder.start_recording();
        }
        info!("Simulation reset");
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Advance the simulation by `dt` seconds
    ///
    /// Non-finite or non-positive `dt` is rejected with a warning and leaves
    /// all state untouched; `dt` above `max_time_step` is clamped.
    pub fn step(&mut self, dt: f32, collidables: &[Collidable<'_>]) -> TickReport {
        if !(dt.is_finite() && dt > 0.0) {
            warn!("Ignoring invalid time step {}", dt);
            return TickReport {
                time: self.time,
                ..TickReport::default()
            };
        }
        let dt = dt.min(self.config.max_time_step);

        if self.enabled {
            for slot in self.sources.values() {
                self.field.inject(&slot.source);
            }
        }
        self.field.step();

        let mut emitted = 0;
        if self.enabled && self.config.emission_rate > 0.0 {
            for slot in self.sources.values_mut() {
                slot.emission_backlog += self.config.emission_rate * dt;
                let count = slot.emission_backlog.floor();
                slot.emission_backlog -= count;
                emitted += self
                    .particles
                    .spawn_from_source(&slot.source, count as usize, &mut self.rng);
            }
        }

        let stats = self.particles.step(dt, &self.field, collidables, &mut self.rng);

        self.time += dt;
        self.frame_number += 1;

        let recorded = if self.recorder.is_recording() {
            let sources: Vec<&WindSource> = self.sources.values().map(|slot| &slot.source).collect();
            self.recorder
                .record_frame(self.particles.particles(), &sources, self.time)
        } else {
            false
        };

        trace!(
            "Tick {}: t={:.3}s, {} alive, {} emitted, {} expired, {} collisions",
            self.frame_number,
            self.time,
            stats.alive,
            emitted,
            stats.expired,
            stats.collisions
        );

        TickReport {
            dt,
            time: self.time,
            emitted,
            particles: stats,
            recorded,
        }
    }

    // ------------------------------------------------------------------
    // Host outputs
    // ------------------------------------------------------------------

    /// Live particles for rendering
    pub fn particles(&self) -> &[Particle] {
        self.particles.particles()
    }

    pub fn particle_system(&self) -> &ParticleSystem {
        &self.particles
    }

    /// Committed field velocity at `pos`
    pub fn sample_field(&self, pos: Vec3) -> Vec3 {
        self.field.sample(pos)
    }

    pub fn field(&self) -> &VectorField {
        &self.field
    }

    /// Simulation time (s)
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Completed ticks since creation or the last reset
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn recorder(&self) -> &SimulationRecorder {
        &self.recorder
    }

    pub fn recorder_mut(&mut self) -> &mut SimulationRecorder {
        &mut self.recorder
    }

    pub fn start_recording(&mut self) {
        self.recorder.start_recording();
    }

    pub fn stop_recording(&mut self) {
        self.recorder.stop_recording();
    }

    /// Serialize the recorded history to JSON
    ///
    /// # Errors
    ///
    /// See [`SimulationRecorder::export_history`].
    pub fn export_history(&self) -> Result<String, ExportError> {
        self.recorder.export_history()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn blower() -> WindSource {
        WindSource::new(Vec3::new(2.0, 1.0, 0.0), 3.0, 10.0, -Vec3::x(), 20.0).unwrap()
    }

    #[test]
    fn test_config_from_partial_json() {
        let config = SimulationConfig::from_json_str(
            r#"{ "seed": 7, "field": { "decay_factor": 0.9 }, "particles": { "gravity": 1.62 } }"#,
        )
        .unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.field.decay_factor, 0.9);
        assert_eq!(config.field.nx, FieldConfig::default().nx);
        assert_eq!(config.particles.gravity, 1.62);
        assert_eq!(config.emission_rate, 20.0);
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let result = SimulationConfig::from_json_str(r#"{ "max_time_step": 0.0 }"#);
        assert!(matches!(result, Err(SimulationError::Config(_))));

        let result = SimulationConfig::from_json_str("{ not json");
        assert!(matches!(result, Err(SimulationError::ConfigLoad(_))));

        let result = SimulationConfig::load("/nonexistent/airflow.json");
        assert!(matches!(result, Err(SimulationError::ConfigLoad(_))));
    }

    #[test]
    fn test_source_ids_never_reused() {
        let mut sim = AirflowSimulation::new(SimulationConfig::default()).unwrap();
        let a = sim.add_source(blower());
        let b = sim.add_source(blower());
        sim.remove_source(a).unwrap();
        let c = sim.add_source(blower());

        assert!(a < b && b < c);
        assert!(sim.source(a).is_none());
        assert!(matches!(sim.remove_source(a), Err(SimulationError::UnknownSource(id)) if id == a));
        assert_eq!(sim.source_count(), 2);
    }

    #[test]
    fn test_rejected_update_keeps_source() {
        let mut sim = AirflowSimulation::new(SimulationConfig::default()).unwrap();
        let id = sim.add_source(blower());

        sim.update_source(id, |s| s.set_speed(4.0)).unwrap();
        assert_eq!(sim.source(id).unwrap().speed(), 4.0);

        let result = sim.update_source(id, |s| {
            s.set_speed(8.0)?;
            s.set_radius(-1.0)
        });
        assert!(matches!(result, Err(SimulationError::Config(ConfigError::InvalidRadius(_)))));
        assert_eq!(sim.source(id).unwrap().speed(), 4.0);
    }

    #[test]
    fn test_invalid_dt_is_ignored() {
        let mut sim = AirflowSimulation::new(SimulationConfig::default()).unwrap();
        sim.add_source(blower());

        for dt in [0.0, -0.1, f32::NAN, f32::INFINITY] {
            let report = sim.step(dt, &[]);
            assert_eq!(report.dt, 0.0);
        }
        assert_eq!(sim.time(), 0.0);
        assert!(sim.particles().is_empty());
        assert_eq!(sim.field().tick(), 0);
    }

    #[test]
    fn test_dt_is_clamped() {
        let mut sim = AirflowSimulation::new(SimulationConfig::default()).unwrap();
        let report = sim.step(1.0, &[]);
        assert_relative_eq!(report.dt, 0.1);
        assert_relative_eq!(sim.time(), 0.1);
    }

    #[test]
    fn test_fractional_emission_accumulates() {
        let mut sim = AirflowSimulation::new(SimulationConfig {
            emission_rate: 5.0,
            ..SimulationConfig::default()
        })
        .unwrap();
        sim.add_source(blower());

        // 5/s × 0.05 s = 0.25 per tick → one particle every fourth tick
        let emitted: usize = (0..8).map(|_| sim.step(0.05, &[]).emitted).sum();
        assert_eq!(emitted, 2);
    }

    #[test]
    fn test_disabled_sources_do_nothing_but_field_decays() {
        let mut sim = AirflowSimulation::new(SimulationConfig::default()).unwrap();
        sim.add_source(blower());
        sim.step(0.05, &[]);
        let before = sim.field().max_speed();
        assert!(before > 0.0);

        sim.set_enabled(false);
        let count = sim.particles().len();
        let report = sim.step(0.05, &[]);
        assert_eq!(report.emitted, 0);
        assert!(sim.particles().len() <= count);
        assert!(sim.field().max_speed() < before);
    }

    #[test]
    fn test_spawn_requests() {
        let mut sim = AirflowSimulation::new(SimulationConfig::default()).unwrap();
        let id = sim.add_source(blower());

        assert_eq!(sim.spawn_from_source(id, 12).unwrap(), 12);
        assert_eq!(sim.spawn_ambient(30), 30);
        assert_eq!(sim.particles().len(), 42);
        assert!(sim.spawn_from_source(SourceId(99), 1).is_err());

        sim.clear_particles();
        assert!(sim.particles().is_empty());
    }

    #[test]
    fn test_reset_keeps_sources() {
        let mut sim = AirflowSimulation::new(SimulationConfig::default()).unwrap();
        sim.add_source(blower());
        for _ in 0..5 {
            sim.step(0.05, &[]);
        }
        sim.reset();
        assert_eq!(sim.time(), 0.0);
        assert_eq!(sim.field().max_speed(), 0.0);
        assert!(sim.particles().is_empty());
        assert_eq!(sim.source_count(), 1);
    }

    #[test]
    fn test_reset_while_recording_restarts_history() {
        let mut sim = AirflowSimulation::new(SimulationConfig::default()).unwrap();
        sim.add_source(blower());
        sim.start_recording();
        for _ in 0..120 {
            sim.step(1.0 / 60.0, &[]);
        }
        assert_eq!(sim.recorder().frame_count(), 120);

        sim.reset();
        assert!(sim.recorder().is_recording());
        assert_eq!(sim.recorder().frame_count(), 0);

        for _ in 0..60 {
            sim.step(1.0 / 60.0, &[]);
        }
        assert_eq!(sim.recorder().frame_count(), 60);
        assert!(sim.recorder().history().is_chronological());
    }

    #[test]
    fn test_reset_while_idle_keeps_history() {
        let mut sim = AirflowSimulation::new(SimulationConfig::default()).unwrap();
        sim.start_recording();
        for _ in 0..10 {
            sim.step(1.0 / 60.0, &[]);
        }
        sim.stop_recording();

        sim.reset();
        assert!(!sim.recorder().is_recording());
        assert_eq!(sim.recorder().frame_count(), 10);
    }
}
