//! Trace recording and replay.
//!
//! A trace is a JSONL file of timesteps
//! (`{"time": f, "vehicles": [{"id", "x", "y"}]}`). [`TraceSource`] replays
//! one as a [`MobilitySource`]; [`record`] captures any source into trace
//! steps, which is how fleet runs are turned into reusable fixtures and
//! placement inputs.

use roundlog_core::{MobilitySource, SourceError};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Failures reading or writing trace files.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("trace I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed trace line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("trace JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One vehicle's position at a timestep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceVehicle {
    pub id: String,
    pub x: f64,
    pub y: f64,
}

/// One timestep of a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub time: f64,
    pub vehicles: Vec<TraceVehicle>,
}

/// Replays a recorded trace as a mobility source.
#[derive(Debug)]
pub struct TraceSource {
    steps: Vec<TraceStep>,
    cursor: usize,
}

impl TraceSource {
    /// Builds a source from in-memory steps.
    pub fn from_steps(steps: Vec<TraceStep>) -> Self {
        Self { steps, cursor: 0 }
    }

    /// Loads a JSONL trace file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        let reader = BufReader::new(File::open(path)?);
        let mut steps = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let step = serde_json::from_str(&line)
                .map_err(|source| TraceError::Malformed { line: idx + 1, source })?;
            steps.push(step);
        }
        Ok(Self::from_steps(steps))
    }

    /// Every position in the trace, flattened — the placement input.
    pub fn positions(&self) -> Vec<(f64, f64)> {
        self.steps
            .iter()
            .flat_map(|s| s.vehicles.iter().map(|v| (v.x, v.y)))
            .collect()
    }

    /// Number of timesteps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl MobilitySource for TraceSource {
    fn has_pending(&self) -> bool {
        self.cursor < self.steps.len()
    }

    fn advance(&mut self) -> Result<(), SourceError> {
        if self.cursor >= self.steps.len() {
            return Err(SourceError::new("trace exhausted"));
        }
        self.cursor += 1;
        Ok(())
    }

    fn time(&self) -> f64 {
        self.steps[self.cursor - 1].time
    }

    fn active_vehicles(&self) -> Vec<String> {
        self.steps[self.cursor - 1]
            .vehicles
            .iter()
            .map(|v| v.id.clone())
            .collect()
    }

    fn position_of(&self, vehicle: &str) -> Result<(f64, f64), SourceError> {
        self.steps[self.cursor - 1]
            .vehicles
            .iter()
            .find(|v| v.id == vehicle)
            .map(|v| (v.x, v.y))
            .ok_or_else(|| SourceError::new(format!("vehicle {vehicle} not in timestep")))
    }
}

/// Drives any source to exhaustion, capturing each step.
pub fn record<S: MobilitySource>(source: &mut S) -> Result<Vec<TraceStep>, SourceError> {
    let mut steps = Vec::new();
    while source.has_pending() {
        source.advance()?;
        let mut vehicles = Vec::new();
        for id in source.active_vehicles() {
            let (x, y) = source.position_of(&id)?;
            vehicles.push(TraceVehicle { id, x, y });
        }
        steps.push(TraceStep { time: source.time(), vehicles });
    }
    Ok(steps)
}

/// Writes steps as a JSONL trace file.
pub fn write_trace_file(
    path: impl AsRef<Path>,
    steps: &[TraceStep],
) -> Result<(), TraceError> {
    let mut writer = BufWriter::new(File::create(path)?);
    for step in steps {
        serde_json::to_writer(&mut writer, step)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}
