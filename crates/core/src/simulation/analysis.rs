//! Flow statistics over a recorded history
//!
//! Reduces each frame to the mean particle position and velocity, skipping
//! frames with no usable particles.

use crate::core_types::vec3::Vec3;
use crate::error::AnalysisError;
use crate::simulation::recorder::{Frame, History};
use serde::Serialize;
use tracing::debug;

/// Per-frame averages
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FlowSample {
    pub timestamp: f32,
    /// Particles with all-finite state that contributed to the means
    pub particle_count: usize,
    pub mean_position: Vec3,
    pub mean_velocity: Vec3,
}

impl FlowSample {
    /// Magnitude of the mean velocity
    pub fn speed(&self) -> f32 {
        self.mean_velocity.norm()
    }
}

/// Averages for every usable frame plus overall ranges
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowSummary {
    pub samples: Vec<FlowSample>,
    /// First and last sample timestamp
    pub time_range: (f32, f32),
    /// Smallest and largest component of any mean position
    pub position_range: (f32, f32),
    /// Smallest and largest component of any mean velocity
    pub velocity_range: (f32, f32),
}

fn component_range<'a>(vectors: impl Iterator<Item = &'a Vec3>) -> (f32, f32) {
    vectors
        .flat_map(|v| v.iter())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &c| {
            (lo.min(c), hi.max(c))
        })
}

fn summarize_frame(frame: &Frame) -> Option<FlowSample> {
    let mut count = 0_usize;
    let mut position_sum = Vec3::zeros();
    let mut velocity_sum = Vec3::zeros();

    for particle in frame
        .particles
        .iter()
        .filter(|p| p.position.is_finite() && p.velocity.is_finite() && p.temperature.is_finite())
    {
        position_sum += Vec3::from(particle.position);
        velocity_sum += Vec3::from(particle.velocity);
        count += 1;
    }

    if count == 0 {
        return None;
    }
    let n = count as f32;
    Some(FlowSample {
        timestamp: frame.timestamp,
        particle_count: count,
        mean_position: position_sum / n,
        mean_velocity: velocity_sum / n,
    })
}

/// Compute per-frame means and overall ranges
///
/// # Errors
///
/// Returns [`AnalysisError::InsufficientData`] unless at least two frames
/// contain a valid particle.
pub fn analyze_history(history: &History) -> Result<FlowSummary, AnalysisError> {
    let samples: Vec<FlowSample> = history
        .frames
        .iter()
        .enumerate()
        .filter_map(|(i, frame)| {
            let sample = summarize_frame(frame);
            if sample.is_none() {
                debug!("Frame {} has no valid particles, skipping", i);
            }
            sample
        })
        .collect();

    if samples.len() < 2 {
        return Err(AnalysisError::InsufficientData {
            valid_frames: samples.len(),
        });
    }

    let time_range = (samples[0].timestamp, samples[samples.len() - 1].timestamp);
    let position_range = component_range(samples.iter().map(|s| &s.mean_position));
    let velocity_range = component_range(samples.iter().map(|s| &s.mean_velocity));

    Ok(FlowSummary {
        samples,
        time_range,
        position_range,
        velocity_range,
    })
}
