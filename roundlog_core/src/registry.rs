//! Coverage registry and proximity selection.
//!
//! The registry is the immutable set of coverage units (RSUs) loaded once at
//! startup: id, planar position, circular range. Selection is a pure function
//! of the registry and a vehicle position: the nearest in-range unit wins,
//! with exact distance ties resolved to the lexicographically smallest unit
//! id rather than file order.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A fixed coverage unit (RSU) with a circular range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageUnit {
    /// Position x in simulation coordinates (meters)
    pub x: f64,

    /// Position y in simulation coordinates (meters)
    pub y: f64,

    /// Range radius in meters, strictly positive
    pub radius: f64,
}

impl CoverageUnit {
    /// Euclidean distance from this unit to a point.
    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        (self.x - x).hypot(self.y - y)
    }
}

/// The validated, immutable set of coverage units.
///
/// Backed by a `BTreeMap` so every iteration over units runs in ascending id
/// order; the deterministic tie-breaks in selection and assignment depend on
/// this ordering.
#[derive(Debug, Clone)]
pub struct Registry {
    units: BTreeMap<String, CoverageUnit>,
}

impl Registry {
    /// Builds a registry from an already-validated unit map.
    ///
    /// Intended for tests and programmatic construction (e.g. placement
    /// output); file input goes through [`Registry::load`].
    pub fn from_units(units: BTreeMap<String, CoverageUnit>) -> Result<Self, ConfigError> {
        if units.is_empty() {
            return Err(ConfigError::Empty);
        }
        for (id, unit) in &units {
            if unit.radius <= 0.0 {
                return Err(ConfigError::NonPositiveRadius {
                    unit: id.clone(),
                    radius: unit.radius,
                });
            }
        }
        Ok(Self { units })
    }

    /// Loads and validates a registry from a JSON file.
    ///
    /// The file must be a non-empty object of
    /// `{unit_id: {"x": n, "y": n, "radius": n > 0}}`. Validation is field by
    /// field so the error names the offending unit and key.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, crate::error::RoundlogError> {
        let raw = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&raw)?;
        Ok(Self::from_value(&value)?)
    }

    /// Validates a parsed JSON value into a registry.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, ConfigError> {
        let map = value.as_object().ok_or(ConfigError::NotAnObject)?;
        if map.is_empty() {
            return Err(ConfigError::Empty);
        }

        let mut units = BTreeMap::new();
        for (id, entry) in map {
            let obj = entry.as_object().ok_or_else(|| ConfigError::UnitNotAnObject {
                unit: id.clone(),
            })?;

            let mut field = |name: &'static str| -> Result<f64, ConfigError> {
                let v = obj.get(name).ok_or_else(|| ConfigError::MissingField {
                    unit: id.clone(),
                    field: name,
                })?;
                v.as_f64().ok_or_else(|| ConfigError::NonNumericField {
                    unit: id.clone(),
                    field: name,
                })
            };

            let unit = CoverageUnit {
                x: field("x")?,
                y: field("y")?,
                radius: field("radius")?,
            };
            if unit.radius <= 0.0 {
                return Err(ConfigError::NonPositiveRadius {
                    unit: id.clone(),
                    radius: unit.radius,
                });
            }
            units.insert(id.clone(), unit);
        }

        Ok(Self { units })
    }

    /// Number of units in the registry.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// True when the registry holds no units. Construction rejects this, so
    /// a live registry always returns false.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Iterates units in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CoverageUnit)> {
        self.units.iter().map(|(id, u)| (id.as_str(), u))
    }

    /// Unit ids in ascending order.
    pub fn unit_ids(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(String::as_str)
    }

    /// Looks up a single unit.
    pub fn get(&self, id: &str) -> Option<&CoverageUnit> {
        self.units.get(id)
    }

    /// Selects the closest in-range unit for a vehicle position.
    ///
    /// Candidates are units whose distance to the point is within their
    /// radius; the minimum distance wins. Because iteration is ascending by
    /// id and only a strictly smaller distance replaces the current best,
    /// exact ties resolve to the lowest unit id.
    pub fn pick_closest(&self, x: f64, y: f64) -> Option<(&str, f64)> {
        let mut best: Option<(&str, f64)> = None;
        for (id, unit) in &self.units {
            let d = unit.distance_to(x, y);
            if d <= unit.radius {
                match best {
                    Some((_, best_d)) if d >= best_d => {}
                    _ => best = Some((id.as_str(), d)),
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::json;

    fn registry(v: serde_json::Value) -> Result<Registry, ConfigError> {
        Registry::from_value(&v)
    }

    #[test]
    fn test_load_valid_registry() {
        let r = registry(json!({
            "rsu_0": {"x": 0.0, "y": 0.0, "radius": 150.0},
            "rsu_1": {"x": 400.0, "y": 0.0, "radius": 100.0},
        }))
        .unwrap();
        assert_eq!(r.len(), 2);
        assert_relative_eq!(r.get("rsu_1").unwrap().x, 400.0);
    }

    #[test]
    fn test_rejects_non_object() {
        assert_eq!(registry(json!([1, 2])).unwrap_err(), ConfigError::NotAnObject);
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(registry(json!({})).unwrap_err(), ConfigError::Empty);
    }

    #[test]
    fn test_rejects_missing_field() {
        let err = registry(json!({"rsu_0": {"x": 1.0, "radius": 5.0}})).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingField { unit: "rsu_0".into(), field: "y" }
        );
    }

    #[test]
    fn test_rejects_non_numeric_field() {
        let err = registry(json!({"rsu_0": {"x": "a", "y": 0.0, "radius": 5.0}})).unwrap_err();
        assert_eq!(
            err,
            ConfigError::NonNumericField { unit: "rsu_0".into(), field: "x" }
        );
    }

    #[test]
    fn test_rejects_non_positive_radius() {
        let err = registry(json!({"rsu_0": {"x": 0.0, "y": 0.0, "radius": 0.0}})).unwrap_err();
        assert_eq!(
            err,
            ConfigError::NonPositiveRadius { unit: "rsu_0".into(), radius: 0.0 }
        );
    }

    #[test]
    fn test_pick_closest_in_range() {
        let r = registry(json!({
            "rsu_0": {"x": 0.0, "y": 0.0, "radius": 100.0},
            "rsu_1": {"x": 50.0, "y": 0.0, "radius": 100.0},
        }))
        .unwrap();

        let (id, d) = r.pick_closest(40.0, 0.0).unwrap();
        assert_eq!(id, "rsu_1");
        assert_relative_eq!(d, 10.0);
    }

    #[test]
    fn test_pick_closest_none_in_range() {
        let r = registry(json!({
            "rsu_0": {"x": 0.0, "y": 0.0, "radius": 10.0},
        }))
        .unwrap();
        assert!(r.pick_closest(100.0, 100.0).is_none());
    }

    #[test]
    fn test_pick_closest_respects_per_unit_radius() {
        // rsu_0 is nearer but the point falls outside its small radius.
        let r = registry(json!({
            "rsu_0": {"x": 0.0, "y": 0.0, "radius": 5.0},
            "rsu_1": {"x": 30.0, "y": 0.0, "radius": 100.0},
        }))
        .unwrap();
        let (id, _) = r.pick_closest(10.0, 0.0).unwrap();
        assert_eq!(id, "rsu_1");
    }

    #[test]
    fn test_exact_tie_goes_to_lowest_id() {
        // Point equidistant from both units; lowest id must win regardless
        // of insertion order.
        let r = registry(json!({
            "rsu_b": {"x": 20.0, "y": 0.0, "radius": 50.0},
            "rsu_a": {"x": -20.0, "y": 0.0, "radius": 50.0},
        }))
        .unwrap();
        let (id, d) = r.pick_closest(0.0, 0.0).unwrap();
        assert_eq!(id, "rsu_a");
        assert_relative_eq!(d, 20.0);
    }
}
