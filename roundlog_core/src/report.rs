//! Tabular report emission.
//!
//! The CSV column names and order are the compatibility surface consumed by
//! downstream schedulers; they must not change. Two per-unit schemas exist:
//! the offline one (analyzer output, no distance columns) and the inline one
//! (Policy B, with sampled-distance columns). Both share the round-summary
//! schema. Headers are written eagerly so an empty run still produces valid
//! files, and floats are rounded to 3 decimals as the downstream tooling
//! expects.

use crate::error::RoundlogError;
use serde::Serialize;
use std::fs::File;
use std::path::Path;

/// Rounds to 3 decimal places for report output.
pub fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Per-unit row without distance columns (offline analyzer).
#[derive(Debug, Clone, Serialize)]
pub struct UnitRow {
    pub round: u64,
    pub t_start: f64,
    pub t_end: f64,
    pub rsu_id: String,
    pub unique_vehicles: u64,
    /// Empty when the stats log has no record for this round
    pub total_connected_time_s: Option<f64>,
    pub handover_in: u64,
    pub handover_out: u64,
}

const UNIT_HEADER: [&str; 8] = [
    "round",
    "t_start",
    "t_end",
    "rsu_id",
    "unique_vehicles",
    "total_connected_time_s",
    "handover_in",
    "handover_out",
];

/// Per-unit row with sampled-distance columns (inline policy).
#[derive(Debug, Clone, Serialize)]
pub struct InlineUnitRow {
    pub round: u64,
    pub t_start: f64,
    pub t_end: f64,
    pub rsu_id: String,
    pub unique_vehicles: u64,
    pub total_connected_time_s: f64,
    /// Empty when the unit saw no samples this round
    pub avg_dist: Option<f64>,
    pub min_dist: Option<f64>,
    pub max_dist: Option<f64>,
    pub handover_in: u64,
    pub handover_out: u64,
}

const INLINE_UNIT_HEADER: [&str; 11] = [
    "round",
    "t_start",
    "t_end",
    "rsu_id",
    "unique_vehicles",
    "total_connected_time_s",
    "avg_dist",
    "min_dist",
    "max_dist",
    "handover_in",
    "handover_out",
];

/// Round summary row, shared by both report variants.
#[derive(Debug, Clone, Serialize)]
pub struct RoundSummaryRow {
    pub round: u64,
    pub t_start: f64,
    pub t_end: f64,
    /// Scalar fields are empty when the stats log is missing the round
    pub vehicles_seen_count: Option<u64>,
    pub vehicles_connected_count: Option<u64>,
    pub uncovered_vehicle_time_s: Option<f64>,
}

const SUMMARY_HEADER: [&str; 6] = [
    "round",
    "t_start",
    "t_end",
    "vehicles_seen_count",
    "vehicles_connected_count",
    "uncovered_vehicle_time_s",
];

fn csv_writer(path: &Path, header: &[&str]) -> Result<csv::Writer<File>, RoundlogError> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    writer.write_record(header)?;
    writer.flush()?;
    Ok(writer)
}

/// Writer pair for the offline analyzer reports.
pub struct ReportWriter {
    units: csv::Writer<File>,
    summary: csv::Writer<File>,
}

impl ReportWriter {
    /// Creates both CSV files and writes their headers.
    pub fn create(
        unit_path: impl AsRef<Path>,
        summary_path: impl AsRef<Path>,
    ) -> Result<Self, RoundlogError> {
        Ok(Self {
            units: csv_writer(unit_path.as_ref(), &UNIT_HEADER)?,
            summary: csv_writer(summary_path.as_ref(), &SUMMARY_HEADER)?,
        })
    }

    pub fn write_unit(&mut self, row: &UnitRow) -> Result<(), RoundlogError> {
        self.units.serialize(row)?;
        Ok(())
    }

    pub fn write_summary(&mut self, row: &RoundSummaryRow) -> Result<(), RoundlogError> {
        self.summary.serialize(row)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), RoundlogError> {
        self.units.flush()?;
        self.summary.flush()?;
        Ok(())
    }
}

/// Writer pair for the inline (Policy B) reports.
pub struct InlineReportWriter {
    units: csv::Writer<File>,
    summary: csv::Writer<File>,
}

impl InlineReportWriter {
    /// Creates both CSV files and writes their headers.
    pub fn create(
        unit_path: impl AsRef<Path>,
        summary_path: impl AsRef<Path>,
    ) -> Result<Self, RoundlogError> {
        Ok(Self {
            units: csv_writer(unit_path.as_ref(), &INLINE_UNIT_HEADER)?,
            summary: csv_writer(summary_path.as_ref(), &SUMMARY_HEADER)?,
        })
    }

    pub fn write_unit(&mut self, row: &InlineUnitRow) -> Result<(), RoundlogError> {
        self.units.serialize(row)?;
        Ok(())
    }

    pub fn write_summary(&mut self, row: &RoundSummaryRow) -> Result<(), RoundlogError> {
        self.summary.serialize(row)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), RoundlogError> {
        self.units.flush()?;
        self.summary.flush()?;
        Ok(())
    }
}
