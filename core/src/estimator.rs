//! Altitude-only complementary filter
//!
//! This module contains the vertical state estimator. It owns all of the filter memory (the altitude
//! estimate, the integrated vertical velocity, the previous altitude used for the finite-difference output
//! velocity, and the surface-following latch) so that several independent estimators can run side by side,
//! for example one fed by real sensors and one fed by the [crate::sim] trajectory.
//!
//! Two entry points are called once per control tick with the same `dt`:
//! - [AltitudeEstimator::update_velocity] integrates the world-frame vertical acceleration.
//! - [AltitudeEstimator::update_position] blends the freshest altitude measurement into the estimate.
//!
//! The order of the two calls is up to the caller. The estimator does no internal synchronization; a
//! caller sharing it with a tuning or telemetry thread must wrap it in a lock.
use log::{info, trace, warn};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display};

use crate::params::EstimatorParams;
use crate::ticks::{Tick, default_max_sample_age, is_fresh};
use crate::{GRAVITY, deadband};

/// Errors reported by the estimator
#[derive(Clone, Debug, PartialEq)]
pub enum EstimatorError {
    /// The time step was zero, negative, or not finite; the update was skipped
    InvalidTimeStep(f64),
    /// No tuning parameter is registered under this name
    UnknownParameter(String),
    /// A `NAME=VALUE` parameter assignment could not be parsed
    InvalidAssignment(String),
    /// The simulated sensor noise model could not be constructed
    InvalidNoise(f64),
    /// The simulation duration was negative, not finite, or too long to run
    InvalidDuration(f64),
}

impl Display for EstimatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstimatorError::InvalidTimeStep(dt) => {
                write!(f, "invalid time step {dt} s, dt must be positive and finite")
            }
            EstimatorError::UnknownParameter(name) => write!(f, "unknown parameter '{name}'"),
            EstimatorError::InvalidAssignment(text) => {
                write!(f, "invalid parameter assignment '{text}', expected NAME=VALUE")
            }
            EstimatorError::InvalidNoise(std) => {
                write!(f, "invalid noise standard deviation {std}")
            }
            EstimatorError::InvalidDuration(duration) => {
                write!(f, "invalid simulation duration {duration} s")
            }
        }
    }
}

impl std::error::Error for EstimatorError {}

/// Blending regime used for a position update
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    /// No fresh range sample has been seen yet; the barometer drives the estimate
    #[default]
    Barometric,
    /// The range sensor has been seen at least once and drives the estimate from then on
    SurfaceFollowing,
}

impl Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regime::Barometric => write!(f, "barometric"),
            Regime::SurfaceFollowing => write!(f, "surface_following"),
        }
    }
}

/// A single range sensor reading and the tick at which it was acquired
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RangeSample {
    /// Distance to the surface below (m)
    pub distance: f64,
    /// Tick at which the reading was acquired
    pub tick: Tick,
}

impl RangeSample {
    pub fn new(distance: f64, tick: Tick) -> Self {
        RangeSample { distance, tick }
    }
}

/// Per-tick sensor inputs for a position update
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SensorSample {
    /// Barometric altitude (m, any datum)
    pub baro_altitude: f64,
    /// Most recent range sensor reading
    pub range: RangeSample,
}

impl SensorSample {
    pub fn new(baro_altitude: f64, range_distance: f64, range_tick: Tick) -> Self {
        SensorSample {
            baro_altitude,
            range: RangeSample::new(range_distance, range_tick),
        }
    }
}

/// Output of a position update
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PositionEstimate {
    /// Filtered altitude (m)
    pub position_z: f64,
    /// Vertical velocity from the finite difference of the filtered altitude (m/s)
    pub velocity_z: f64,
    /// Acceleration-integrated vertical velocity, for diagnostics (m/s)
    pub integrated_velocity_z: f64,
    /// Regime the update was evaluated in
    pub regime: Regime,
    /// Whether the range sample was fresh on this tick
    pub sample_fresh: bool,
    /// `false` when the estimate was held because the latched range sensor was stale
    pub updated: bool,
}

/// Vertical state estimator.
///
/// Holds the complete filter state of one vehicle. See the [module documentation](self) for the call
/// pattern and the [crate documentation](crate) for the filter equations.
///
/// # Example
///
/// ```
/// use altfuse::{AltitudeEstimator, SensorSample};
///
/// let mut estimator = AltitudeEstimator::default();
/// let dt = 0.001;
/// estimator.update_velocity(0.0, dt).unwrap();
/// // No fresh range sample yet: the first barometric reading initializes the estimate
/// let sample = SensorSample::new(2.0, 0.0, 0);
/// let estimate = estimator.update_position(&sample, dt, 1000).unwrap();
/// assert_eq!(estimate.position_z, 2.0);
/// ```
#[derive(Clone)]
pub struct AltitudeEstimator {
    estimated_z: f64,
    velocity_z: f64,
    estimated_vz: f64,
    previous_estimated_z: f64,
    surface_following: bool,
    held_ticks: u32,
    max_sample_age: Tick,
    params: EstimatorParams,
}

impl Debug for AltitudeEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AltitudeEstimator")
            .field("estimated_z", &self.estimated_z)
            .field("velocity_z", &self.velocity_z)
            .field("estimated_vz", &self.estimated_vz)
            .field("surface_following", &self.surface_following)
            .field("held_ticks", &self.held_ticks)
            .finish()
    }
}

impl Default for AltitudeEstimator {
    fn default() -> Self {
        AltitudeEstimator::new(EstimatorParams::default())
    }
}

impl AltitudeEstimator {
    /// Create an estimator at rest with the given coefficients and the default maximum sample age.
    pub fn new(params: EstimatorParams) -> AltitudeEstimator {
        AltitudeEstimator {
            estimated_z: 0.0,
            velocity_z: 0.0,
            estimated_vz: 0.0,
            previous_estimated_z: 0.0,
            surface_following: false,
            held_ticks: 0,
            max_sample_age: default_max_sample_age(),
            params,
        }
    }

    /// Set the maximum range sample age (ticks) used by the freshness gate
    pub fn with_max_sample_age(mut self, max_sample_age: Tick) -> AltitudeEstimator {
        self.max_sample_age = max_sample_age;
        self
    }

    /// Return the estimator to its power-on state, keeping the tuned coefficients and sample age.
    ///
    /// This is the only way to clear the surface-following latch.
    pub fn reset(&mut self) {
        *self = AltitudeEstimator::new(self.params).with_max_sample_age(self.max_sample_age);
    }

    /// Filtered altitude (m)
    pub fn estimated_z(&self) -> f64 {
        self.estimated_z
    }
    /// Acceleration-integrated vertical velocity (m/s)
    pub fn velocity_z(&self) -> f64 {
        self.velocity_z
    }
    /// Last reported finite-difference vertical velocity (m/s)
    pub fn estimated_vz(&self) -> f64 {
        self.estimated_vz
    }
    /// Altitude from the previous position update, the base of the finite difference (m)
    pub fn previous_estimated_z(&self) -> f64 {
        self.previous_estimated_z
    }
    /// Whether a fresh range sample has ever been seen since power-on or [AltitudeEstimator::reset]
    pub fn surface_following_engaged(&self) -> bool {
        self.surface_following
    }
    /// Regime the next position update will use
    pub fn regime(&self) -> Regime {
        if self.surface_following {
            Regime::SurfaceFollowing
        } else {
            Regime::Barometric
        }
    }
    /// Number of consecutive position updates that held the estimate on a stale range sample
    pub fn held_ticks(&self) -> u32 {
        self.held_ticks
    }
    /// Maximum range sample age accepted as fresh (ticks)
    pub fn max_sample_age(&self) -> Tick {
        self.max_sample_age
    }
    /// Current tuning coefficients
    pub fn params(&self) -> &EstimatorParams {
        &self.params
    }
    /// Mutable access for tuning between updates
    pub fn params_mut(&mut self) -> &mut EstimatorParams {
        &mut self.params
    }

    fn check_dt(dt: f64) -> Result<(), EstimatorError> {
        if dt.is_finite() && dt > 0.0 {
            Ok(())
        } else {
            warn!("Rejected estimator update with dt = {dt}");
            Err(EstimatorError::InvalidTimeStep(dt))
        }
    }

    /// Integrate one tick of world-frame vertical acceleration into the vertical velocity.
    ///
    /// # Arguments
    /// * `accel_z` - Vertical acceleration in the world frame with gravity removed (g)
    /// * `dt` - Time since the previous update (s)
    ///
    /// # Errors
    /// Returns [EstimatorError::InvalidTimeStep] without touching the state if `dt` is not positive.
    pub fn update_velocity(&mut self, accel_z: f64, dt: f64) -> Result<(), EstimatorError> {
        Self::check_dt(dt)?;
        self.velocity_z += deadband(accel_z, self.params.accel_deadband) * dt * GRAVITY;
        self.velocity_z *= self.params.velocity_decay_alpha;
        Ok(())
    }

    /// Blend the latest measurements into the altitude estimate.
    ///
    /// # Arguments
    /// * `sample` - Barometric altitude and latest range reading
    /// * `dt` - Time since the previous update (s)
    /// * `current_tick` - Current scheduler tick, used to judge the age of the range reading
    ///
    /// # Returns
    /// The new altitude and the finite-difference vertical velocity. When surface following is engaged and
    /// the range reading is stale the altitude is held and [PositionEstimate::updated] is `false`.
    ///
    /// # Errors
    /// Returns [EstimatorError::InvalidTimeStep] without touching the state if `dt` is not positive.
    pub fn update_position(
        &mut self,
        sample: &SensorSample,
        dt: f64,
        current_tick: Tick,
    ) -> Result<PositionEstimate, EstimatorError> {
        Self::check_dt(dt)?;
        let fresh = is_fresh(sample.range.tick, current_tick, self.max_sample_age);
        if fresh && !self.surface_following {
            info!(
                "Surface following engaged at tick {current_tick} (range {:.3} m)",
                sample.range.distance
            );
            self.surface_following = true;
        }

        let prediction = self.params.velocity_prediction_factor * self.velocity_z * dt;
        let updated = if self.surface_following {
            if fresh {
                let alpha = self.params.range_blend_alpha;
                let filtered_z = alpha * self.estimated_z + (1.0 - alpha) * sample.range.distance;
                self.estimated_z = filtered_z + prediction;
                self.held_ticks = 0;
                true
            } else {
                self.held_ticks = self.held_ticks.saturating_add(1);
                trace!(
                    "Range sample stale at tick {current_tick} (sample tick {}), holding z = {:.3} for {} ticks",
                    sample.range.tick, self.estimated_z, self.held_ticks
                );
                false
            }
        } else {
            // An exact zero means nothing has been blended yet, start from the barometer directly
            let filtered_z = if self.estimated_z == 0.0 {
                sample.baro_altitude
            } else {
                let alpha = self.params.baro_blend_alpha;
                alpha * self.estimated_z + (1.0 - alpha) * sample.baro_altitude
            };
            self.estimated_z = filtered_z + prediction;
            true
        };

        self.estimated_vz = (self.estimated_z - self.previous_estimated_z) / dt;
        self.previous_estimated_z = self.estimated_z;

        Ok(PositionEstimate {
            position_z: self.estimated_z,
            velocity_z: self.estimated_vz,
            integrated_velocity_z: self.velocity_z,
            regime: self.regime(),
            sample_fresh: fresh,
            updated,
        })
    }
}
