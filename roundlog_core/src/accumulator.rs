//! Streaming per-round accumulation state.
//!
//! The [`RoundAccumulator`] owns everything scoped to the currently open
//! round: per-vehicle per-unit connected seconds, the set of vehicles seen,
//! and the uncovered-time sum. It is reset by the pipeline immediately after
//! each flush.
//!
//! The [`InlineTracker`] carries the optional Policy-B state: per-unit
//! sampled-distance aggregates (round scoped) and per-sample handover
//! counters driven by a previous-assignment map that survives across rounds.

use crate::registry::Registry;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Round-scoped streaming state.
#[derive(Debug, Clone)]
pub struct RoundAccumulator {
    round: u64,
    vehicle_unit_time: BTreeMap<String, BTreeMap<String, f64>>,
    seen: BTreeSet<String>,
    uncovered_time_s: f64,
}

impl RoundAccumulator {
    /// Opens an accumulator for the given round index.
    pub fn new(round: u64) -> Self {
        Self {
            round,
            vehicle_unit_time: BTreeMap::new(),
            seen: BTreeSet::new(),
            uncovered_time_s: 0.0,
        }
    }

    /// The currently open round index.
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Folds one observation into the round.
    ///
    /// Marks the vehicle seen, selects the closest in-range unit, and adds
    /// `dt` either to the vehicle's time with that unit or to the uncovered
    /// sum. Returns the selection so the caller can feed the inline tracker
    /// without running the selector twice.
    pub fn observe<'r>(
        &mut self,
        registry: &'r Registry,
        vehicle: &str,
        x: f64,
        y: f64,
        dt: f64,
    ) -> Option<(&'r str, f64)> {
        if !self.seen.contains(vehicle) {
            self.seen.insert(vehicle.to_string());
        }

        let selected = registry.pick_closest(x, y);
        match selected {
            Some((unit, _)) => {
                let per_unit = self
                    .vehicle_unit_time
                    .entry(vehicle.to_string())
                    .or_default();
                *per_unit.entry(unit.to_string()).or_insert(0.0) += dt;
            }
            None => self.uncovered_time_s += dt,
        }
        selected
    }

    /// vehicle id -> (unit id -> accumulated seconds), ascending on both keys.
    pub fn vehicle_unit_time(&self) -> &BTreeMap<String, BTreeMap<String, f64>> {
        &self.vehicle_unit_time
    }

    /// Vehicles observed at least once this round.
    pub fn seen(&self) -> &BTreeSet<String> {
        &self.seen
    }

    /// Accumulated vehicle-time spent in range of no unit.
    pub fn uncovered_time_s(&self) -> f64 {
        self.uncovered_time_s
    }

    /// Clears all round-scoped state and reopens for `round`.
    pub fn reset_for(&mut self, round: u64) {
        self.round = round;
        self.vehicle_unit_time.clear();
        self.seen.clear();
        self.uncovered_time_s = 0.0;
    }
}

/// Per-unit sampled-distance aggregate for one round.
#[derive(Debug, Clone, Copy)]
struct DistanceAgg {
    sum: f64,
    count: u64,
    min: f64,
    max: f64,
}

impl DistanceAgg {
    fn new(d: f64) -> Self {
        Self { sum: d, count: 1, min: d, max: d }
    }

    fn push(&mut self, d: f64) {
        self.sum += d;
        self.count += 1;
        self.min = self.min.min(d);
        self.max = self.max.max(d);
    }
}

/// Per-unit inline statistics produced at a round flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct InlineUnitStats {
    /// Mean sampled distance, absent when the unit saw no samples
    pub avg_dist: Option<f64>,
    /// Minimum sampled distance
    pub min_dist: Option<f64>,
    /// Maximum sampled distance
    pub max_dist: Option<f64>,
    /// Per-sample handovers into this unit
    pub handover_in: u64,
    /// Per-sample handovers out of this unit
    pub handover_out: u64,
}

/// Policy-B live tracking: sampled distances and instantaneous handovers.
///
/// A handover is counted whenever a vehicle's immediately-previous non-none
/// selection differs from its current non-none selection — every switch
/// within the round, not just round-to-round switches of the final winner.
#[derive(Debug, Clone, Default)]
pub struct InlineTracker {
    /// vehicle -> last non-none selected unit; persists across rounds
    prev_assignment: BTreeMap<String, String>,
    distances: BTreeMap<String, DistanceAgg>,
    handover_in: BTreeMap<String, u64>,
    handover_out: BTreeMap<String, u64>,
}

impl InlineTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one sample's selection for a vehicle.
    pub fn observe(&mut self, vehicle: &str, selection: Option<(&str, f64)>) {
        match selection {
            Some((unit, d)) => {
                if let Some(prev) = self.prev_assignment.get(vehicle) {
                    if prev != unit {
                        *self.handover_out.entry(prev.clone()).or_insert(0) += 1;
                        *self.handover_in.entry(unit.to_string()).or_insert(0) += 1;
                    }
                }
                self.prev_assignment
                    .insert(vehicle.to_string(), unit.to_string());

                self.distances
                    .entry(unit.to_string())
                    .and_modify(|agg| agg.push(d))
                    .or_insert_with(|| DistanceAgg::new(d));
            }
            // An uncovered sample breaks the handover chain.
            None => {
                self.prev_assignment.remove(vehicle);
            }
        }
    }

    /// Closes the round: returns per-unit inline stats for every unit in
    /// the registry, resets the round-scoped aggregates, and drops
    /// previous-assignment entries for vehicles not seen this round so a
    /// vehicle that left the simulation cannot produce a stale handover.
    pub fn finish_round(
        &mut self,
        registry: &Registry,
        seen: &BTreeSet<String>,
    ) -> BTreeMap<String, InlineUnitStats> {
        let mut out = BTreeMap::new();
        for unit in registry.unit_ids() {
            let dist = self.distances.get(unit);
            out.insert(
                unit.to_string(),
                InlineUnitStats {
                    avg_dist: dist.map(|a| a.sum / a.count as f64),
                    min_dist: dist.map(|a| a.min),
                    max_dist: dist.map(|a| a.max),
                    handover_in: self.handover_in.get(unit).copied().unwrap_or(0),
                    handover_out: self.handover_out.get(unit).copied().unwrap_or(0),
                },
            );
        }

        self.distances.clear();
        self.handover_in.clear();
        self.handover_out.clear();
        self.prev_assignment.retain(|vehicle, _| seen.contains(vehicle));

        out
    }
}
