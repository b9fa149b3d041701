//! Per-vehicle dataset bundle preparation.
//!
//! Downstream of the membership log: every vehicle that was ever assigned
//! gets a disjoint, fixed-size bundle of dataset indices (a seeded shuffle
//! of the index space, sliced in sorted-vehicle order), and each round's
//! membership is projected into per-unit index unions — both per-round and
//! cumulative across rounds.

use crate::error::RoundlogError;
use crate::logs::MembershipRecord;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// One round's per-unit dataset index unions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundIndicesRecord {
    /// Round index
    pub round: u64,

    /// unit id -> sorted dataset indices reachable through its vehicles
    pub rsus: BTreeMap<String, Vec<usize>>,
}

/// Sorted union of all vehicles that appear anywhere in the membership log.
pub fn collect_vehicles(records: &[MembershipRecord]) -> Vec<String> {
    let mut vehicles = BTreeSet::new();
    for record in records {
        for list in record.rsus.values() {
            for vehicle in list {
                vehicles.insert(vehicle.clone());
            }
        }
    }
    vehicles.into_iter().collect()
}

/// Splits `0..dataset_size` into disjoint bundles of `bundle_size` indices,
/// one per vehicle, via a seeded shuffle. Each index belongs to at most one
/// vehicle; fails when the dataset cannot cover every vehicle.
pub fn assign_disjoint_bundles(
    vehicles: &[String],
    dataset_size: usize,
    bundle_size: usize,
    seed: u64,
) -> Result<BTreeMap<String, Vec<usize>>, RoundlogError> {
    let needed = vehicles.len() * bundle_size;
    if needed > dataset_size {
        return Err(RoundlogError::BundleCapacity {
            needed,
            available: dataset_size,
        });
    }

    let mut indices: Vec<usize> = (0..dataset_size).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let mut bundles = BTreeMap::new();
    for (slot, vehicle) in vehicles.iter().enumerate() {
        let start = slot * bundle_size;
        bundles.insert(vehicle.clone(), indices[start..start + bundle_size].to_vec());
    }
    Ok(bundles)
}

/// Writes the vehicle -> bundle map as a single JSON file.
pub fn write_bundles_file(
    path: impl AsRef<Path>,
    bundles: &BTreeMap<String, Vec<usize>>,
) -> Result<(), RoundlogError> {
    let json = serde_json::to_string(bundles)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Projects each round's membership into per-unit index unions, writing the
/// per-round file and the cumulative file as JSONL.
pub fn write_round_indices(
    records: &[MembershipRecord],
    bundles: &BTreeMap<String, Vec<usize>>,
    per_round_path: impl AsRef<Path>,
    cumulative_path: impl AsRef<Path>,
) -> Result<(), RoundlogError> {
    let mut per_round_f = BufWriter::new(File::create(per_round_path)?);
    let mut cumulative_f = BufWriter::new(File::create(cumulative_path)?);

    let mut cumulative: BTreeMap<String, BTreeSet<usize>> = BTreeMap::new();
    for record in records {
        let mut round_out = BTreeMap::new();
        let mut cum_out = BTreeMap::new();

        for (unit, vehicles) in &record.rsus {
            let mut union: BTreeSet<usize> = BTreeSet::new();
            for vehicle in vehicles {
                if let Some(bundle) = bundles.get(vehicle) {
                    union.extend(bundle.iter().copied());
                }
            }

            let cum = cumulative.entry(unit.clone()).or_default();
            cum.extend(union.iter().copied());

            round_out.insert(unit.clone(), union.into_iter().collect::<Vec<_>>());
            cum_out.insert(unit.clone(), cum.iter().copied().collect::<Vec<_>>());
        }

        let per = RoundIndicesRecord { round: record.round, rsus: round_out };
        let cum = RoundIndicesRecord { round: record.round, rsus: cum_out };
        serde_json::to_writer(&mut per_round_f, &per)?;
        per_round_f.write_all(b"\n")?;
        serde_json::to_writer(&mut cumulative_f, &cum)?;
        cumulative_f.write_all(b"\n")?;
    }

    per_round_f.flush()?;
    cumulative_f.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(round: u64, u0: &[&str], u1: &[&str]) -> MembershipRecord {
        let mut rsus = BTreeMap::new();
        rsus.insert("u0".to_string(), u0.iter().map(|s| s.to_string()).collect());
        rsus.insert("u1".to_string(), u1.iter().map(|s| s.to_string()).collect());
        MembershipRecord {
            round,
            t_start: round as f64 * 10.0,
            t_end: (round + 1) as f64 * 10.0,
            rsus,
        }
    }

    fn vehicles(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_collect_vehicles_sorted_unique() {
        let records = vec![
            record(0, &["veh_b", "veh_a"], &[]),
            record(1, &["veh_a"], &["veh_c"]),
        ];
        assert_eq!(
            collect_vehicles(&records),
            vehicles(&["veh_a", "veh_b", "veh_c"])
        );
    }

    #[test]
    fn test_bundles_are_disjoint_and_sized() {
        let vehs = vehicles(&["veh_a", "veh_b", "veh_c"]);
        let bundles = assign_disjoint_bundles(&vehs, 100, 20, 42).unwrap();

        let mut all: BTreeSet<usize> = BTreeSet::new();
        for bundle in bundles.values() {
            assert_eq!(bundle.len(), 20);
            for &idx in bundle {
                assert!(idx < 100);
                assert!(all.insert(idx), "index {idx} assigned twice");
            }
        }
    }

    #[test]
    fn test_capacity_error() {
        let vehs = vehicles(&["veh_a", "veh_b"]);
        let err = assign_disjoint_bundles(&vehs, 30, 20, 42).unwrap_err();
        assert!(matches!(
            err,
            RoundlogError::BundleCapacity { needed: 40, available: 30 }
        ));
    }

    #[test]
    fn test_same_seed_same_bundles() {
        let vehs = vehicles(&["veh_a", "veh_b"]);
        let a = assign_disjoint_bundles(&vehs, 1000, 50, 7).unwrap();
        let b = assign_disjoint_bundles(&vehs, 1000, 50, 7).unwrap();
        assert_eq!(a, b);

        let c = assign_disjoint_bundles(&vehs, 1000, 50, 8).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_cumulative_unions_grow() {
        let records = vec![
            record(0, &["veh_a"], &[]),
            record(1, &["veh_b"], &[]),
            record(2, &[], &[]),
        ];
        let vehs = collect_vehicles(&records);
        let bundles = assign_disjoint_bundles(&vehs, 100, 10, 42).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let per_path = dir.path().join("per_round.jsonl");
        let cum_path = dir.path().join("cumulative.jsonl");
        write_round_indices(&records, &bundles, &per_path, &cum_path).unwrap();

        let read = |path: &Path| -> Vec<RoundIndicesRecord> {
            std::fs::read_to_string(path)
                .unwrap()
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect()
        };
        let per = read(&per_path);
        let cum = read(&cum_path);

        assert_eq!(per[1].rsus["u0"].len(), 10);
        assert_eq!(cum[1].rsus["u0"].len(), 20); // veh_a's and veh_b's bundles
        assert!(per[2].rsus["u0"].is_empty());
        assert_eq!(cum[2].rsus["u0"].len(), 20); // cumulative persists
    }
}
