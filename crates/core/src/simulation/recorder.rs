//! Throttled capture of particle and source state for offline analysis
//!
//! A recording is a [`History`]: an append-only list of [`Frame`]s in
//! simulation-time order. Frames closer together than
//! [`RecorderConfig::min_interval`] are skipped, and recording stops on its
//! own once `max_frames` is reached so memory stays bounded.
//!
//! The export format is a JSON array with one object per frame:
//!
//! ```text
//! [{ "timestamp": 0.016,
//!    "particles": [{ "position": {x,y,z}, "velocity": {x,y,z}, "temperature": 20.0 }],
//!    "sources":   [{ "position": {x,y,z}, "radius": 3.0, "speed": 10.0,
//!                    "direction": {x,y,z}, "temperature": 20.0 }] }]
//! ```

use crate::core_types::particle::Particle;
use crate::core_types::vec3::Vec3;
use crate::core_types::wind_source::WindSource;
use crate::error::{ConfigError, ExportError};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

/// Recorder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Minimum simulation time between captured frames (s)
    pub min_interval: f32,
    /// Stop recording after this many frames (`None` = unbounded)
    pub max_frames: Option<usize>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            min_interval: 0.016,
            max_frames: Some(36_000), // 10 minutes at 60 Hz
        }
    }
}

impl RecorderConfig {
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] for a negative interval or a
    /// zero frame cap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_interval.is_finite() && self.min_interval >= 0.0) {
            return Err(ConfigError::parameter(
                "min_interval",
                "must be finite and non-negative",
                self.min_interval,
            ));
        }
        if self.max_frames == Some(0) {
            return Err(ConfigError::InvalidParameter {
                name: "max_frames",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Plain `{x, y, z}` object used in the export format
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3Record {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl From<Vec3> for Vec3Record {
    fn from(v: Vec3) -> Self {
        Self {
            x: v.x,
            y: v.y,
            z: v.z,
        }
    }
}

impl From<Vec3Record> for Vec3 {
    fn from(r: Vec3Record) -> Self {
        Vec3::new(r.x, r.y, r.z)
    }
}

impl Vec3Record {
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleRecord {
    pub position: Vec3Record,
    pub velocity: Vec3Record,
    pub temperature: f32,
}

impl From<&Particle> for ParticleRecord {
    fn from(p: &Particle) -> Self {
        Self {
            position: p.position().into(),
            velocity: p.velocity().into(),
            temperature: p.temperature(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub position: Vec3Record,
    pub radius: f32,
    pub speed: f32,
    pub direction: Vec3Record,
    pub temperature: f32,
}

impl From<&WindSource> for SourceRecord {
    fn from(s: &WindSource) -> Self {
        Self {
            position: s.position().into(),
            radius: s.radius(),
            speed: s.speed(),
            direction: s.direction().into(),
            temperature: s.temperature(),
        }
    }
}

/// One captured instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Simulation time (s)
    pub timestamp: f32,
    pub particles: Vec<ParticleRecord>,
    pub sources: Vec<SourceRecord>,
}

/// Ordered list of frames, serialized as a bare JSON array
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    pub frames: Vec<Frame>,
}

impl History {
    /// Parse a previously exported history
    ///
    /// # Errors
    ///
    /// Returns the parser error for malformed JSON or a mismatched shape.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Whether timestamps never decrease
    pub fn is_chronological(&self) -> bool {
        self.frames
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecorderState {
    #[default]
    Idle,
    Recording,
}

/// Captures frames while recording and exports them on request
#[derive(Debug, Clone, Default)]
pub struct SimulationRecorder {
    config: RecorderConfig,
    state: RecorderState,
    history: History,
    last_timestamp: Option<f32>,
}

impl SimulationRecorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecorderState::Recording
    }

    /// Discard any previous history and begin capturing
    pub fn start_recording(&mut self) {
        self.history.frames.clear();
        self.last_timestamp = None;
        self.state = RecorderState::Recording;
        info!("Recording started");
    }

    /// Stop capturing; the history is kept for export
    pub fn stop_recording(&mut self) {
        if self.is_recording() {
            info!("Recording stopped with {} frames", self.history.len());
        }
        self.state = RecorderState::Idle;
    }

    /// Append a frame if recording and enough time has passed since the last one
    ///
    /// Returns whether a frame was captured.
    pub fn record_frame(&mut self, particles: &[Particle], sources: &[&WindSource], now: f32) -> bool {
        if !self.is_recording() {
            return false;
        }
        if let Some(last) = self.last_timestamp {
            if now - last < self.config.min_interval {
                return false;
            }
        }

        self.history.frames.push(Frame {
            timestamp: now,
            particles: particles.iter().map(ParticleRecord::from).collect(),
            sources: sources.iter().copied().map(SourceRecord::from).collect(),
        });
        self.last_timestamp = Some(now);

        if let Some(max) = self.config.max_frames {
            if self.history.len() >= max {
                warn!("Recording frame limit ({}) reached, stopping", max);
                self.state = RecorderState::Idle;
            }
        }
        true
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn frame_count(&self) -> usize {
        self.history.len()
    }

    fn exportable(&self) -> Result<&History, ExportError> {
        if self.history.len() < 2 {
            return Err(ExportError::InsufficientData {
                frames: self.history.len(),
            });
        }
        Ok(&self.history)
    }

    /// Serialize the history to a JSON string
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::InsufficientData`] with fewer than two frames.
    pub fn export_history(&self) -> Result<String, ExportError> {
        let history = self.exportable()?;
        Ok(serde_json::to_string(history)?)
    }

    /// Stream the history as JSON into `writer`
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::InsufficientData`] with fewer than two frames and
    /// [`ExportError::WriteFailure`] if writing fails.
    pub fn export_to_writer<W: Write>(&self, mut writer: W) -> Result<(), ExportError> {
        let history = self.exportable()?;
        serde_json::to_writer(&mut writer, history)?;
        writer.flush()?;
        Ok(())
    }

    /// Write the history to `path`, replacing any existing file
    ///
    /// # Errors
    ///
    /// Same as [`export_to_writer`](Self::export_to_writer), plus
    /// [`ExportError::WriteFailure`] if the file cannot be created.
    pub fn export_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ExportError> {
        self.exportable()?;
        let file = File::create(path.as_ref())?;
        self.export_to_writer(BufWriter::new(file))?;
        info!(
            "Exported {} frames to {}",
            self.history.len(),
            path.as_ref().display()
        );
        Ok(())
    }
}
