//! End-of-round finalization.
//!
//! Converts accumulator state into the one-unit-per-vehicle membership
//! partition and the round statistics record. A vehicle's assigned unit is
//! the one holding its maximum accumulated time; iteration runs over unit
//! ids in ascending order and only a strictly larger value replaces the
//! current winner, so exact ties go to the lowest unit id.

use crate::accumulator::RoundAccumulator;
use crate::logs::{MembershipRecord, StatsRecord};
use crate::registry::Registry;
use std::collections::BTreeMap;

/// Finalizes the open round into a membership record and a stats record.
///
/// Every registry unit appears in both records even when it attracted no
/// vehicles (empty list, 0.0 seconds), keeping the log schema independent
/// of traffic. Per-unit connected time counts only the winning slice: time
/// an assigned vehicle spent with runner-up units is excluded.
pub fn finalize_round(
    registry: &Registry,
    acc: &RoundAccumulator,
    round_length: f64,
) -> (MembershipRecord, StatsRecord) {
    let round = acc.round();
    let t_start = round as f64 * round_length;
    let t_end = (round + 1) as f64 * round_length;

    let mut rsus: BTreeMap<String, Vec<String>> = registry
        .unit_ids()
        .map(|id| (id.to_string(), Vec::new()))
        .collect();
    let mut unit_time: BTreeMap<String, f64> =
        registry.unit_ids().map(|id| (id.to_string(), 0.0)).collect();

    let mut connected = 0u64;
    for (vehicle, per_unit) in acc.vehicle_unit_time() {
        if let Some((winner, time)) = winning_unit(per_unit) {
            // Vehicles iterate in ascending id order, so each list stays sorted.
            rsus.entry(winner.to_string()).or_default().push(vehicle.clone());
            *unit_time.entry(winner.to_string()).or_insert(0.0) += time;
            connected += 1;
        }
    }

    let membership = MembershipRecord { round, t_start, t_end, rsus };
    let stats = StatsRecord {
        round,
        t_start,
        t_end,
        vehicles_seen_count: acc.seen().len() as u64,
        vehicles_connected_count: connected,
        uncovered_vehicle_time_s: acc.uncovered_time_s(),
        rsu_total_connected_time_s: unit_time,
    };
    (membership, stats)
}

/// Picks the unit with maximum accumulated time; first-seen wins on ties.
fn winning_unit(per_unit: &BTreeMap<String, f64>) -> Option<(&str, f64)> {
    let mut best: Option<(&str, f64)> = None;
    for (unit, &time) in per_unit {
        match best {
            Some((_, best_time)) if time <= best_time => {}
            _ => best = Some((unit.as_str(), time)),
        }
    }
    best
}
