//! Tunable estimator coefficients and the name-based parameter and log registry.
//!
//! Flight controllers usually expose their tuning constants to a ground station through a table binding a
//! group and parameter name to a value. This module provides that table as plain data: each [ParamEntry]
//! pairs a name with a getter and a setter over [EstimatorParams], and each [LogVariable] pairs a name with
//! a read-only view of the estimator state. Nothing here knows about the transport or wire format used by
//! the tuning tool.
//!
//! Coefficients are not range checked. Setting an alpha outside `[0, 1]` or a negative deadband is accepted
//! and simply degrades the filter.
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::estimator::{AltitudeEstimator, EstimatorError};

/// Group name under which the estimator registers its parameters and log variables
pub const PARAM_GROUP: &str = "posEstAlt";

fn default_range_blend_alpha() -> f64 {
    0.90
}
fn default_baro_blend_alpha() -> f64 {
    0.997
}
fn default_velocity_prediction_factor() -> f64 {
    1.0
}
fn default_accel_deadband() -> f64 {
    0.04
}
fn default_velocity_decay_alpha() -> f64 {
    0.995
}

/// Tunable coefficients of the altitude estimator.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EstimatorParams {
    /// Weight of the previous estimate when blending with a fresh range reading
    #[serde(default = "default_range_blend_alpha")]
    pub range_blend_alpha: f64,
    /// Weight of the previous estimate when blending with the barometric altitude
    #[serde(default = "default_baro_blend_alpha")]
    pub baro_blend_alpha: f64,
    /// Gain on the integrated vertical velocity used as the motion prediction term
    #[serde(default = "default_velocity_prediction_factor")]
    pub velocity_prediction_factor: f64,
    /// Vertical acceleration deadband (g)
    #[serde(default = "default_accel_deadband")]
    pub accel_deadband: f64,
    /// Per-update decay applied to the integrated vertical velocity
    #[serde(default = "default_velocity_decay_alpha")]
    pub velocity_decay_alpha: f64,
}

impl Default for EstimatorParams {
    fn default() -> Self {
        EstimatorParams {
            range_blend_alpha: default_range_blend_alpha(),
            baro_blend_alpha: default_baro_blend_alpha(),
            velocity_prediction_factor: default_velocity_prediction_factor(),
            accel_deadband: default_accel_deadband(),
            velocity_decay_alpha: default_velocity_decay_alpha(),
        }
    }
}

impl fmt::Display for EstimatorParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in ParamRegistry::entries() {
            writeln!(f, "{}.{} = {}", PARAM_GROUP, entry.name, (entry.get)(self))?;
        }
        Ok(())
    }
}

/// A single named, read/write tuning parameter.
#[derive(Clone, Copy)]
pub struct ParamEntry {
    /// Parameter name within [PARAM_GROUP]
    pub name: &'static str,
    /// Short human-readable description
    pub description: &'static str,
    pub get: fn(&EstimatorParams) -> f64,
    pub set: fn(&mut EstimatorParams, f64),
}

impl fmt::Debug for ParamEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParamEntry")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

static PARAM_TABLE: [ParamEntry; 5] = [
    ParamEntry {
        name: "estAlphaAsl",
        description: "Barometric blending factor",
        get: |p| p.baro_blend_alpha,
        set: |p, v| p.baro_blend_alpha = v,
    },
    ParamEntry {
        name: "estAlphaZr",
        description: "Range sensor blending factor",
        get: |p| p.range_blend_alpha,
        set: |p, v| p.range_blend_alpha = v,
    },
    ParamEntry {
        name: "velFactor",
        description: "Velocity prediction gain",
        get: |p| p.velocity_prediction_factor,
        set: |p, v| p.velocity_prediction_factor = v,
    },
    ParamEntry {
        name: "velZAlpha",
        description: "Integrated velocity decay factor",
        get: |p| p.velocity_decay_alpha,
        set: |p, v| p.velocity_decay_alpha = v,
    },
    ParamEntry {
        name: "vAccDeadband",
        description: "Vertical acceleration deadband (g)",
        get: |p| p.accel_deadband,
        set: |p, v| p.accel_deadband = v,
    },
];

/// Name-based access to [EstimatorParams] for external tuning collaborators.
///
/// Names may be given bare (`velFactor`) or qualified with the group (`posEstAlt.velFactor`).
///
/// # Example
///
/// ```
/// use altfuse::params::{EstimatorParams, ParamRegistry};
///
/// let mut params = EstimatorParams::default();
/// ParamRegistry::set(&mut params, "posEstAlt.estAlphaZr", 0.8).unwrap();
/// assert_eq!(params.range_blend_alpha, 0.8);
/// assert_eq!(ParamRegistry::get(&params, "estAlphaZr"), Some(0.8));
/// ```
pub struct ParamRegistry;

impl ParamRegistry {
    /// All registered parameters in registration order
    pub fn entries() -> impl Iterator<Item = &'static ParamEntry> {
        PARAM_TABLE.iter()
    }

    pub fn names() -> Vec<&'static str> {
        PARAM_TABLE.iter().map(|e| e.name).collect()
    }

    /// Look up an entry by bare or group-qualified name
    pub fn find(name: &str) -> Option<&'static ParamEntry> {
        let bare = strip_group(name);
        PARAM_TABLE.iter().find(|e| e.name == bare)
    }

    pub fn get(params: &EstimatorParams, name: &str) -> Option<f64> {
        Self::find(name).map(|e| (e.get)(params))
    }

    pub fn set(params: &mut EstimatorParams, name: &str, value: f64) -> Result<(), EstimatorError> {
        let entry =
            Self::find(name).ok_or_else(|| EstimatorError::UnknownParameter(name.to_string()))?;
        (entry.set)(params, value);
        log::debug!("{}.{} set to {}", PARAM_GROUP, entry.name, value);
        Ok(())
    }

    /// Parse and apply an assignment of the form `NAME=VALUE`.
    pub fn apply_assignment(params: &mut EstimatorParams, assignment: &str) -> Result<(), EstimatorError> {
        let (name, value) = assignment
            .split_once('=')
            .ok_or_else(|| EstimatorError::InvalidAssignment(assignment.to_string()))?;
        let value: f64 = value
            .trim()
            .parse()
            .map_err(|_| EstimatorError::InvalidAssignment(assignment.to_string()))?;
        Self::set(params, name.trim(), value)
    }
}

fn strip_group(name: &str) -> &str {
    match name.split_once('.') {
        Some((group, bare)) if group == PARAM_GROUP => bare,
        _ => name,
    }
}

/// A named, read-only view of the estimator state for telemetry logging.
#[derive(Clone, Copy)]
pub struct LogVariable {
    pub name: &'static str,
    pub read: fn(&AltitudeEstimator) -> f64,
}

impl fmt::Debug for LogVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogVariable").field("name", &self.name).finish()
    }
}

/// Telemetry variables published by the estimator under [PARAM_GROUP]
pub static LOG_VARIABLES: [LogVariable; 3] = [
    LogVariable {
        name: "estimatedZ",
        read: |e| e.estimated_z(),
    },
    LogVariable {
        name: "estVZ",
        read: |e| e.estimated_vz(),
    },
    LogVariable {
        name: "velocityZ",
        read: |e| e.velocity_z(),
    },
];

/// Read every log variable into `(name, value)` pairs.
///
/// The values are read from a single borrow of the estimator, so callers sharing the estimator
/// across threads get a consistent snapshot as long as they hold their lock for the call.
pub fn log_snapshot(estimator: &AltitudeEstimator) -> Vec<(&'static str, f64)> {
    LOG_VARIABLES
        .iter()
        .map(|var| (var.name, (var.read)(estimator)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params() {
        let params = EstimatorParams::default();
        assert_eq!(params.range_blend_alpha, 0.90);
        assert_eq!(params.baro_blend_alpha, 0.997);
        assert_eq!(params.velocity_prediction_factor, 1.0);
        assert_eq!(params.accel_deadband, 0.04);
        assert_eq!(params.velocity_decay_alpha, 0.995);
    }
    #[test]
    fn test_registry_get_set_each_entry() {
        let mut params = EstimatorParams::default();
        for (i, name) in ParamRegistry::names().into_iter().enumerate() {
            let value = 0.1 * (i as f64 + 1.0);
            ParamRegistry::set(&mut params, name, value).expect("registered name");
            assert_eq!(ParamRegistry::get(&params, name), Some(value));
        }
        assert_eq!(params.baro_blend_alpha, 0.1);
        assert_eq!(params.range_blend_alpha, 0.2);
        assert_eq!(params.accel_deadband, 0.5);
    }
    #[test]
    fn test_registry_group_qualified_names() {
        let mut params = EstimatorParams::default();
        ParamRegistry::set(&mut params, "posEstAlt.velZAlpha", 0.9).unwrap();
        assert_eq!(params.velocity_decay_alpha, 0.9);
        assert_eq!(ParamRegistry::get(&params, "otherGroup.velZAlpha"), None);
    }
    #[test]
    fn test_registry_unknown_name() {
        let mut params = EstimatorParams::default();
        let err = ParamRegistry::set(&mut params, "notAParam", 1.0).unwrap_err();
        assert_eq!(err, EstimatorError::UnknownParameter("notAParam".to_string()));
        assert_eq!(params, EstimatorParams::default());
    }
    #[test]
    fn test_out_of_range_values_accepted() {
        let mut params = EstimatorParams::default();
        ParamRegistry::set(&mut params, "estAlphaZr", 1.5).unwrap();
        ParamRegistry::set(&mut params, "vAccDeadband", -0.2).unwrap();
        assert_eq!(params.range_blend_alpha, 1.5);
        assert_eq!(params.accel_deadband, -0.2);
    }
    #[test]
    fn test_apply_assignment() {
        let mut params = EstimatorParams::default();
        ParamRegistry::apply_assignment(&mut params, "velFactor = 0.5").unwrap();
        assert_eq!(params.velocity_prediction_factor, 0.5);
        assert!(ParamRegistry::apply_assignment(&mut params, "velFactor").is_err());
        assert!(ParamRegistry::apply_assignment(&mut params, "velFactor=abc").is_err());
    }
    #[test]
    fn test_display_lists_all_params() {
        let text = EstimatorParams::default().to_string();
        for name in ParamRegistry::names() {
            assert!(text.contains(&format!("posEstAlt.{name}")));
        }
    }
    #[test]
    fn test_log_snapshot_names() {
        let estimator = AltitudeEstimator::default();
        let snapshot = log_snapshot(&estimator);
        let names: Vec<_> = snapshot.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["estimatedZ", "estVZ", "velocityZ"]);
        assert!(snapshot.iter().all(|(_, v)| *v == 0.0));
    }
}
