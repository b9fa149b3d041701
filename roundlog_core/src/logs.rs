//! Append-only round logs.
//!
//! Two JSONL files, one record per line, strictly increasing round index:
//! the membership log (which vehicles ended the round assigned to which
//! unit) and the stats log (scalar and per-unit aggregates). Each flush
//! writes a complete record and syncs the buffer before returning, so a
//! sequential reader never observes a partial round.

use crate::error::RoundlogError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// One round's membership partition.
///
/// `rsus` maps every registry unit id to the sorted list of vehicles
/// assigned to it this round; a vehicle appears under at most one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipRecord {
    /// Round index
    pub round: u64,

    /// Window start, `round * round_length`
    pub t_start: f64,

    /// Window end (exclusive), `(round + 1) * round_length`
    pub t_end: f64,

    /// unit id -> sorted vehicle ids
    pub rsus: BTreeMap<String, Vec<String>>,
}

/// One round's aggregate statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsRecord {
    /// Round index
    pub round: u64,

    /// Window start
    pub t_start: f64,

    /// Window end (exclusive)
    pub t_end: f64,

    /// Distinct vehicles observed at least once this round
    pub vehicles_seen_count: u64,

    /// Distinct vehicles that ended the round assigned to a unit
    pub vehicles_connected_count: u64,

    /// Elapsed vehicle-time spent in range of no unit
    pub uncovered_vehicle_time_s: f64,

    /// Per unit, the connected time of the vehicles assigned to it
    /// (winning slice only)
    pub rsu_total_connected_time_s: BTreeMap<String, f64>,
}

/// Single-writer appender for the membership and stats logs.
///
/// Opened once for the duration of a run. Rejects out-of-order rounds so
/// the strictly-increasing index invariant holds even if the caller
/// misbehaves.
pub struct RoundLogWriter {
    membership: BufWriter<File>,
    stats: BufWriter<File>,
    last_round: Option<u64>,
}

impl RoundLogWriter {
    /// Creates (truncating) both log files.
    pub fn create(
        membership_path: impl AsRef<Path>,
        stats_path: impl AsRef<Path>,
    ) -> Result<Self, RoundlogError> {
        Ok(Self {
            membership: BufWriter::new(File::create(membership_path)?),
            stats: BufWriter::new(File::create(stats_path)?),
            last_round: None,
        })
    }

    /// Appends one round to both logs and flushes.
    ///
    /// Both records must carry the same round index, strictly above any
    /// previously written one.
    pub fn append(
        &mut self,
        membership: &MembershipRecord,
        stats: &StatsRecord,
    ) -> Result<(), RoundlogError> {
        debug_assert_eq!(membership.round, stats.round);
        if let Some(last) = self.last_round {
            if membership.round <= last {
                return Err(RoundlogError::NonMonotonicRound {
                    round: membership.round,
                    last,
                });
            }
        }

        serde_json::to_writer(&mut self.membership, membership)?;
        self.membership.write_all(b"\n")?;
        serde_json::to_writer(&mut self.stats, stats)?;
        self.stats.write_all(b"\n")?;

        // A reader following the files must only ever see whole records.
        self.membership.flush()?;
        self.stats.flush()?;

        self.last_round = Some(membership.round);
        Ok(())
    }

    /// Round index of the last appended record, if any.
    pub fn last_round(&self) -> Option<u64> {
        self.last_round
    }
}

fn read_jsonl<T: serde::de::DeserializeOwned>(
    path: impl AsRef<Path>,
) -> Result<Vec<T>, RoundlogError> {
    let reader = BufReader::new(File::open(path)?);
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        out.push(serde_json::from_str(&line)?);
    }
    Ok(out)
}

/// Reads the membership log in file order.
pub fn read_membership_log(
    path: impl AsRef<Path>,
) -> Result<Vec<MembershipRecord>, RoundlogError> {
    read_jsonl(path)
}

/// Reads the stats log in file order.
pub fn read_stats_log(path: impl AsRef<Path>) -> Result<Vec<StatsRecord>, RoundlogError> {
    read_jsonl(path)
}
