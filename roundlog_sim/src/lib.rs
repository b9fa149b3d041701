//! Deterministic mobility sources for roundlog.
//!
//! Two [`roundlog_core::MobilitySource`] implementations live here: a
//! seeded kinematic fleet simulator ([`FleetSim`]) and a JSONL trace
//! replayer ([`TraceSource`]), plus helpers to record any source into a
//! trace file. Everything is driven by explicit seeds so a run can be
//! reproduced bit for bit.

mod fleet;
mod trace;

pub use fleet::{FleetConfig, FleetSim};
pub use trace::{record, write_trace_file, TraceError, TraceSource, TraceStep, TraceVehicle};
