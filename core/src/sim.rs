//! Synthetic flight path and closed-loop simulation utilities.
//!
//! This module provides:
//! - A deterministic trajectory generator ([TrajectorySimulator]) that flies a repeating 70 second pattern:
//!   climb, outward spiral, inward spiral, descent, and a rest on the ground. It also produces a matching
//!   range sensor reading that is always fresh.
//! - A closed-loop harness ([run_closed_loop]) that feeds the synthetic flight into an [AltitudeEstimator]
//!   together with a noisy synthetic barometer and the vertical acceleration implied by the trajectory.
//! - [SimulationResult] for storing the run, computing error statistics, and CSV import/export.
use log::{debug, info};
use nalgebra::Vector3;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::io;
use std::path::Path;

use crate::GRAVITY;
use crate::config::SimulationConfig;
use crate::estimator::{AltitudeEstimator, EstimatorError, RangeSample, Regime, SensorSample};
use crate::ticks::{DEFAULT_TICK_RATE_HZ, Tick};

/// Upper bound on the number of control ticks in one closed-loop run
pub const MAX_SIMULATION_STEPS: usize = 100_000_000;
/// Records reserved up front; longer runs grow the buffer as they go
const PREALLOCATED_RECORDS: usize = 1 << 16;

/// Length of one full flight pattern (s)
pub const CYCLE_TIME_S: f64 = 70.0;
/// Cruise altitude of the spiral legs (m)
pub const CRUISE_ALTITUDE_M: f64 = 1.6;
/// Climb and descent rate (m/s)
pub const CLIMB_RATE_MPS: f64 = 0.32;
/// Spiral radius growth rate (m/s)
pub const SPIRAL_RADIAL_RATE_MPS: f64 = 0.2;
/// Spiral angular rate (revolutions per second)
pub const SPIRAL_REV_PER_S: f64 = 0.25;

/// Position on the flight pattern at time `tau` into the cycle.
///
/// `tau` is expected in `[0, CYCLE_TIME_S)`; anything past the descent leg (including out-of-range values)
/// is treated as resting on the ground.
pub fn trajectory_position(tau: f64) -> Vector3<f64> {
    if (0.0..5.0).contains(&tau) {
        Vector3::new(0.0, 0.0, CLIMB_RATE_MPS * tau)
    } else if (5.0..30.0).contains(&tau) {
        let tt = tau - 5.0;
        let radius = SPIRAL_RADIAL_RATE_MPS * tt;
        let theta = SPIRAL_REV_PER_S * tt * 2.0 * PI;
        Vector3::new(radius * theta.cos(), radius * theta.sin(), CRUISE_ALTITUDE_M)
    } else if (30.0..55.0).contains(&tau) {
        let tt = tau - 30.0;
        let radius = 5.0 - SPIRAL_RADIAL_RATE_MPS * tt;
        let theta = 2.0 * PI - SPIRAL_REV_PER_S * tt * 2.0 * PI;
        Vector3::new(radius * theta.cos(), radius * theta.sin(), CRUISE_ALTITUDE_M)
    } else if (55.0..60.0).contains(&tau) {
        let tt = tau - 55.0;
        Vector3::new(0.0, 0.0, CRUISE_ALTITUDE_M - CLIMB_RATE_MPS * tt)
    } else {
        Vector3::zeros()
    }
}

/// One step of the synthetic flight
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimulatedSample {
    /// Unwrapped simulation time (s)
    pub time: f64,
    /// Position (m)
    pub position: Vector3<f64>,
    /// Finite-difference velocity (m/s)
    pub velocity: Vector3<f64>,
    /// Synthetic range reading, stamped with the current simulator tick
    pub range: RangeSample,
}

/// Deterministic generator for the repeating flight pattern.
///
/// Holds the accumulated simulation time and the previously reported position, so each instance is an
/// independent flight. Velocities are the finite difference of consecutive positions; the first step
/// differences against the origin.
#[derive(Clone, Debug)]
pub struct TrajectorySimulator {
    sim_time: f64,
    previous_position: Vector3<f64>,
    tick_rate_hz: u32,
}

impl Default for TrajectorySimulator {
    fn default() -> Self {
        TrajectorySimulator::new(DEFAULT_TICK_RATE_HZ)
    }
}

impl TrajectorySimulator {
    pub fn new(tick_rate_hz: u32) -> Self {
        TrajectorySimulator {
            sim_time: 0.0,
            previous_position: Vector3::zeros(),
            tick_rate_hz,
        }
    }

    /// Total simulated time (s), not wrapped
    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    /// Time into the current cycle (s)
    pub fn cycle_time(&self) -> f64 {
        self.sim_time.rem_euclid(CYCLE_TIME_S)
    }

    /// Scheduler tick corresponding to the current simulation time, wrapping like the platform counter
    pub fn current_tick(&self) -> Tick {
        (self.sim_time * self.tick_rate_hz as f64).round() as u64 as Tick
    }

    /// Advance the simulation by `dt` seconds.
    ///
    /// # Errors
    /// Returns [EstimatorError::InvalidTimeStep] without advancing if `dt` is not positive and finite.
    pub fn step(&mut self, dt: f64) -> Result<SimulatedSample, EstimatorError> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(EstimatorError::InvalidTimeStep(dt));
        }
        self.sim_time += dt;
        let position = trajectory_position(self.cycle_time());
        let velocity = (position - self.previous_position) / dt;
        self.previous_position = position;
        Ok(SimulatedSample {
            time: self.sim_time,
            position,
            velocity,
            range: RangeSample::new(position.z, self.current_tick()),
        })
    }
}

/// Single row of a closed-loop simulation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationRecord {
    pub time_s: f64,
    pub tick: Tick,
    pub true_x_m: f64,
    pub true_y_m: f64,
    pub true_z_m: f64,
    pub true_vz_mps: f64,
    /// Vertical acceleration fed to the estimator (g)
    pub accel_z_g: f64,
    pub baro_altitude_m: f64,
    pub range_distance_m: f64,
    pub range_tick: Tick,
    pub estimated_z_m: f64,
    pub estimated_vz_mps: f64,
    pub integrated_vz_mps: f64,
    pub regime: Regime,
    pub updated: bool,
}

impl SimulationRecord {
    pub fn altitude_error(&self) -> f64 {
        self.estimated_z_m - self.true_z_m
    }
}

/// Output of a closed-loop simulation run
#[derive(Clone, Debug, Default)]
pub struct SimulationResult {
    pub records: Vec<SimulationRecord>,
}

impl SimulationResult {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Root-mean-square altitude error over the run (m); zero for an empty run
    pub fn rms_altitude_error(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = self.records.iter().map(|r| r.altitude_error().powi(2)).sum();
        (sum_sq / self.records.len() as f64).sqrt()
    }

    /// Largest absolute altitude error over the run (m)
    pub fn max_altitude_error(&self) -> f64 {
        self.records
            .iter()
            .map(|r| r.altitude_error().abs())
            .fold(0.0, f64::max)
    }

    /// Number of ticks on which the estimate was held on a stale range sample
    pub fn held_count(&self) -> usize {
        self.records.iter().filter(|r| !r.updated).count()
    }

    /// Writes the run to a CSV file with one row per control tick.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for record in &self.records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Reads a run previously written with [SimulationResult::to_csv].
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let mut rdr = csv::Reader::from_path(path)?;
        let mut records = Vec::new();
        for result in rdr.deserialize() {
            let record: SimulationRecord = result?;
            records.push(record);
        }
        Ok(SimulationResult { records })
    }
}

/// Run the estimator against the synthetic flight pattern.
///
/// Each control tick the simulator is advanced, the vertical acceleration implied by the change in
/// true vertical velocity is integrated with [AltitudeEstimator::update_velocity], and then the synthetic
/// barometer (true altitude plus offset and Gaussian noise) and range reading are blended with
/// [AltitudeEstimator::update_position].
///
/// When `range_dropout_s` is set, the range sensor stops producing new samples at that time and the
/// estimator keeps receiving the last one, which goes stale. If the sensor drops out before its first
/// reading, the estimator only ever sees a stale sample and stays barometric.
///
/// # Errors
/// Returns [EstimatorError::InvalidTimeStep] for a non-positive `dt`, [EstimatorError::InvalidDuration] for a
/// negative or non-finite `duration_s` or one needing more than [MAX_SIMULATION_STEPS] ticks, and
/// [EstimatorError::InvalidNoise] for a negative or non-finite barometer noise level.
pub fn run_closed_loop(config: &SimulationConfig) -> Result<SimulationResult, EstimatorError> {
    let dt = config.dt;
    if !(dt.is_finite() && dt > 0.0) {
        return Err(EstimatorError::InvalidTimeStep(dt));
    }
    let duration = config.duration_s;
    if !(duration.is_finite() && duration >= 0.0) || duration / dt > MAX_SIMULATION_STEPS as f64 {
        return Err(EstimatorError::InvalidDuration(duration));
    }
    let noise = Normal::new(0.0, config.baro_noise_std_m)
        .map_err(|_| EstimatorError::InvalidNoise(config.baro_noise_std_m))?;
    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut simulator = TrajectorySimulator::new(config.estimator.tick_rate_hz);
    let mut estimator: AltitudeEstimator = config.estimator.build();
    let max_age = estimator.max_sample_age();
    let steps = config.steps();
    info!(
        "Running closed-loop simulation: {} steps at dt = {} s, seed {}",
        steps, dt, config.seed
    );

    let mut result = SimulationResult {
        records: Vec::with_capacity(steps.min(PREALLOCATED_RECORDS)),
    };
    let mut previous_vz = 0.0;
    let mut last_range: Option<RangeSample> = None;
    for _ in 0..steps {
        let truth = simulator.step(dt)?;
        let accel_z = (truth.velocity.z - previous_vz) / dt / GRAVITY;
        previous_vz = truth.velocity.z;

        let tick = simulator.current_tick();
        let range_alive = config.range_dropout_s.is_none_or(|t| truth.time < t);
        if range_alive {
            last_range = Some(truth.range);
        }
        // never reported: stamp the placeholder just past the freshness window
        let range = last_range
            .unwrap_or_else(|| RangeSample::new(0.0, tick.wrapping_sub(max_age.saturating_add(1))));
        let sample = SensorSample {
            baro_altitude: truth.position.z + config.baro_offset_m + noise.sample(&mut rng),
            range,
        };

        estimator.update_velocity(accel_z, dt)?;
        let estimate = estimator.update_position(&sample, dt, tick)?;

        result.records.push(SimulationRecord {
            time_s: truth.time,
            tick,
            true_x_m: truth.position.x,
            true_y_m: truth.position.y,
            true_z_m: truth.position.z,
            true_vz_mps: truth.velocity.z,
            accel_z_g: accel_z,
            baro_altitude_m: sample.baro_altitude,
            range_distance_m: sample.range.distance,
            range_tick: sample.range.tick,
            estimated_z_m: estimate.position_z,
            estimated_vz_mps: estimate.velocity_z,
            integrated_vz_mps: estimate.integrated_velocity_z,
            regime: estimate.regime,
            updated: estimate.updated,
        });
    }
    debug!(
        "Simulation finished: rms altitude error {:.4} m, {} held ticks",
        result.rms_altitude_error(),
        result.held_count()
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_trajectory_legs() {
        assert_eq!(trajectory_position(0.0), Vector3::zeros());
        assert_approx_eq!(trajectory_position(2.5).z, 0.8, 1e-12);
        // spiral start
        let p = trajectory_position(5.0);
        assert_approx_eq!(p.x, 0.0, 1e-12);
        assert_approx_eq!(p.z, 1.6, 1e-12);
        // after one full revolution (4 s) on the outward spiral, radius 0.8 on the +x axis
        let p = trajectory_position(9.0);
        assert_approx_eq!(p.x, 0.8, 1e-9);
        assert_approx_eq!(p.y, 0.0, 1e-9);
        // inward spiral starts at radius 5 on the +x axis
        let p = trajectory_position(30.0);
        assert_approx_eq!(p.x, 5.0, 1e-9);
        assert_approx_eq!(p.y, 0.0, 1e-9);
        assert_approx_eq!(trajectory_position(57.5).z, 0.8, 1e-12);
        assert_eq!(trajectory_position(60.0), Vector3::zeros());
        assert_eq!(trajectory_position(65.0), Vector3::zeros());
    }
    #[test]
    fn test_simulator_climb_velocity() {
        let mut sim = TrajectorySimulator::default();
        let first = sim.step(0.1).unwrap();
        assert_approx_eq!(first.position.z, 0.032, 1e-12);
        assert_approx_eq!(first.velocity.z, 0.32, 1e-9);
        let second = sim.step(0.1).unwrap();
        assert_approx_eq!(second.velocity.z, 0.32, 1e-9);
        assert_eq!(second.velocity.x, 0.0);
    }
    #[test]
    fn test_simulator_range_is_fresh() {
        let mut sim = TrajectorySimulator::new(1000);
        let sample = sim.step(0.25).unwrap();
        assert_eq!(sample.range.tick, 250);
        assert_eq!(sample.range.tick, sim.current_tick());
        assert_eq!(sample.range.distance, sample.position.z);
    }
    #[test]
    fn test_simulator_rejects_bad_dt() {
        let mut sim = TrajectorySimulator::default();
        assert!(sim.step(0.0).is_err());
        assert!(sim.step(-1.0).is_err());
        assert_eq!(sim.sim_time(), 0.0);
    }
    #[test]
    fn test_current_tick_wraps() {
        let mut sim = TrajectorySimulator::new(1000);
        // u32 ticks at 1 kHz wrap after roughly 49.7 days
        let wrap_s = (u32::MAX as f64 + 1.0) / 1000.0;
        sim.step(wrap_s + 1.0).unwrap();
        assert_eq!(sim.current_tick(), 1000);
    }
    #[test]
    fn test_closed_loop_engages_surface_following() {
        let config = SimulationConfig {
            duration_s: 10.0,
            ..SimulationConfig::default()
        };
        let result = run_closed_loop(&config).unwrap();
        assert_eq!(result.len(), 1000);
        assert!(result.records.iter().all(|r| r.regime == Regime::SurfaceFollowing));
        assert_eq!(result.held_count(), 0);
        assert!(result.rms_altitude_error() < 0.2);
    }
    #[test]
    fn test_closed_loop_range_dropout_holds() {
        let config = SimulationConfig {
            duration_s: 10.0,
            range_dropout_s: Some(8.0),
            ..SimulationConfig::default()
        };
        let result = run_closed_loop(&config).unwrap();
        assert!(result.held_count() > 0);
        let last = result.records.last().unwrap();
        assert!(!last.updated);
        assert_eq!(last.regime, Regime::SurfaceFollowing);
    }
    #[test]
    fn test_closed_loop_invalid_inputs() {
        let config = SimulationConfig {
            dt: 0.0,
            ..SimulationConfig::default()
        };
        assert!(matches!(run_closed_loop(&config), Err(EstimatorError::InvalidTimeStep(_))));
        let config = SimulationConfig {
            baro_noise_std_m: -1.0,
            ..SimulationConfig::default()
        };
        assert!(matches!(run_closed_loop(&config), Err(EstimatorError::InvalidNoise(_))));
    }
    #[test]
    fn test_closed_loop_rejects_unbounded_duration() {
        for duration_s in [f64::INFINITY, f64::NAN, -1.0, 1e300] {
            let config = SimulationConfig {
                duration_s,
                ..SimulationConfig::default()
            };
            assert!(
                matches!(run_closed_loop(&config), Err(EstimatorError::InvalidDuration(_))),
                "duration {duration_s}"
            );
        }
        let config = SimulationConfig {
            duration_s: 0.0,
            ..SimulationConfig::default()
        };
        assert!(run_closed_loop(&config).unwrap().is_empty());
    }
    #[test]
    fn test_closed_loop_dropout_before_first_reading_stays_barometric() {
        let config = SimulationConfig {
            duration_s: 1.0,
            baro_offset_m: 25.0,
            baro_noise_std_m: 0.0,
            range_dropout_s: Some(0.0),
            ..SimulationConfig::default()
        };
        let result = run_closed_loop(&config).unwrap();
        assert_eq!(result.len(), 100);
        assert!(result.records.iter().all(|r| r.regime == Regime::Barometric));
        assert!(result.records.iter().all(|r| r.updated));
        // the barometer offset is tracked instead of a made-up zero range
        let last = result.records.last().unwrap();
        assert!(last.estimated_z_m > 24.0);
    }
    #[test]
    fn test_simulation_result_csv() {
        let config = SimulationConfig {
            duration_s: 1.0,
            ..SimulationConfig::default()
        };
        let result = run_closed_loop(&config).unwrap();
        let temp_file = std::env::temp_dir().join(format!("altfuse_sim_{}.csv", std::process::id()));
        result.to_csv(&temp_file).expect("Failed to write CSV");
        let read = SimulationResult::from_csv(&temp_file).expect("Failed to read CSV");
        assert_eq!(read.len(), result.len());
        assert_eq!(read.records[0].regime, result.records[0].regime);
        assert_approx_eq!(read.records[10].estimated_z_m, result.records[10].estimated_z_m, 1e-9);
        let _ = std::fs::remove_file(&temp_file);
    }
    #[test]
    fn test_empty_result_statistics() {
        let result = SimulationResult::default();
        assert!(result.is_empty());
        assert_eq!(result.rms_altitude_error(), 0.0);
        assert_eq!(result.max_altitude_error(), 0.0);
    }
}
