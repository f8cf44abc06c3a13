//! Vertical state estimation for small multirotor flight controllers
//!
//! This crate provides the altitude-only position estimator of a small flight-control stack. It fuses an
//! intermittent short-range distance sensor (time-of-flight or similar "z-ranger"), a continuously available
//! barometric altitude, and integrated world-frame vertical acceleration into a smoothed estimate of altitude
//! and vertical velocity at the fixed rate of the control loop.
//!
//! The crate does not read sensors, drive motors, or talk to a ground station. Sensor acquisition is assumed
//! to have already happened: barometric altitude is provided in meters above some datum, the range reading in
//! meters with the tick at which it was acquired, and the vertical acceleration is already rotated into the
//! world frame and expressed in units of g with gravity removed.
//!
//! ## Crate overview
//!
//! - [estimator]: The complementary position filter and leaky velocity integrator ([AltitudeEstimator]).
//! - [ticks]: Platform tick arithmetic and the range sample freshness gate.
//! - [params]: Tunable coefficients and a name-based parameter/log registry for external tuning tools.
//! - [config]: Serializable configuration for the estimator and the closed-loop simulation (JSON/YAML/TOML).
//! - [sim]: A deterministic synthetic flight path and a closed-loop harness for ground-truth testing.
//!
//! ## Filter equations
//!
//! The vertical velocity $v$ is integrated from the deadbanded vertical acceleration $a$ (in g) and bled off
//! with a decay factor $\lambda$ so that accelerometer bias cannot accumulate without bound:
//!
//! $$
//! v(+) = \lambda \left( v(-) + D_\delta(a) \, g \, t \right)
//! $$
//!
//! where $D_\delta$ is the [deadband] function with threshold $\delta$ and $t$ is the time differential.
//!
//! The altitude $z$ is a predictor-corrector blend. Given a measurement $m$ (the range reading in
//! surface-following mode, the barometric altitude otherwise) and a blending factor $\alpha$ for the
//! active regime:
//!
//! $$
//! z(+) = \alpha z(-) + (1 - \alpha) m + k v t
//! $$
//!
//! where $k$ is the velocity prediction factor. The reported vertical velocity is the finite difference of
//! the filtered altitude rather than $v$:
//!
//! $$
//! \dot{z} = \frac{z(+) - z(-)}{t}
//! $$
//!
//! Surface-following mode is latched: once a fresh range sample has been observed the estimator never falls
//! back to the barometer. Ticks in which the latched range sample is stale leave the altitude unchanged and
//! are reported through [PositionEstimate::updated].
pub mod config;
pub mod estimator;
pub mod params;
pub mod sim;
pub mod ticks;

pub use estimator::{AltitudeEstimator, EstimatorError, PositionEstimate, RangeSample, Regime, SensorSample};
pub use params::EstimatorParams;

/// Standard gravity used to convert accelerations in g to m/s^2
pub const GRAVITY: f64 = 9.81;

/// Zero out small values and shrink larger ones toward zero by the threshold.
///
/// Values whose magnitude is at or below `threshold` map to zero. Anything outside the band is reduced in
/// magnitude by `threshold`, keeping its sign, so the output is continuous at the band edges.
///
/// # Arguments
/// * `value` - The input value
/// * `threshold` - Half-width of the dead zone around zero
///
/// # Example
///
/// ```
/// use altfuse::deadband;
/// assert_eq!(deadband(0.03, 0.04), 0.0);
/// assert!((deadband(-0.05, 0.04) + 0.01).abs() < 1e-12);
/// ```
pub fn deadband(value: f64, threshold: f64) -> f64 {
    if value.abs() <= threshold {
        0.0
    } else if value > 0.0 {
        value - threshold
    } else {
        value + threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_deadband_inside_band() {
        assert_eq!(deadband(0.0, 0.04), 0.0);
        assert_eq!(deadband(0.02, 0.04), 0.0);
        assert_eq!(deadband(-0.039, 0.04), 0.0);
    }
    #[test]
    fn test_deadband_boundary() {
        assert_eq!(deadband(0.04, 0.04), 0.0);
        assert_eq!(deadband(-0.04, 0.04), 0.0);
        assert_approx_eq!(deadband(0.05, 0.04), 0.01, 1e-12);
        assert_approx_eq!(deadband(-0.05, 0.04), -0.01, 1e-12);
    }
    #[test]
    // Output should be continuous across the band edge
    fn test_deadband_continuity() {
        let eps = 1e-9;
        assert!(deadband(0.04 + eps, 0.04).abs() < 1e-8);
        assert!(deadband(-0.04 - eps, 0.04).abs() < 1e-8);
    }
    #[test]
    fn test_deadband_zero_threshold_is_identity() {
        for value in [-3.0, -0.5, 0.0, 0.25, 9.81] {
            assert_eq!(deadband(value, 0.0), value);
        }
    }
}
