//! # Cubic Hermite interpolation
//!
//! [`Hermite3`] is the cubic polynomial matching position and velocity at
//! both ends of an [`Epoch`] interval. It is the interpolant used to
//! evaluate a trajectory between samples, and the yardstick the downsampler
//! uses to decide whether interior samples can be dropped without moving any
//! interpolated position by more than the configured tolerance.

use hifitime::Epoch;
use nalgebra::Vector3;

use crate::degrees_of_freedom::DegreesOfFreedom;

/// Cubic Hermite interpolant over `[t0, t1]`.
///
/// Uses the normalized Hermite basis on `s = (t - t0) / (t1 - t0)`:
///
/// ```text
/// p(s) = h00(s)·p0 + h10(s)·Δt·v0 + h01(s)·p1 + h11(s)·Δt·v1
/// ```
///
/// Evaluation outside `[t0, t1]` extrapolates the cubic; callers that need a
/// range check perform it themselves.
#[derive(Debug, Clone, Copy)]
pub struct Hermite3 {
    t0: Epoch,
    /// Interval length in seconds; nonzero by construction.
    dt: f64,
    p0: Vector3<f64>,
    p1: Vector3<f64>,
    v0: Vector3<f64>,
    v1: Vector3<f64>,
}

impl Hermite3 {
    /// Builds the interpolant from the two endpoint samples.
    ///
    /// # Panics
    ///
    /// Panics if `t0 == t1`.
    pub fn new(t0: Epoch, dof0: &DegreesOfFreedom, t1: Epoch, dof1: &DegreesOfFreedom) -> Self {
        let dt = (t1 - t0).to_seconds();
        assert!(dt != 0.0, "Hermite interpolation over an empty interval");
        Self {
            t0,
            dt,
            p0: dof0.position,
            p1: dof1.position,
            v0: dof0.velocity,
            v1: dof1.velocity,
        }
    }

    /// Interpolated position at `t`.
    pub fn evaluate_position(&self, t: Epoch) -> Vector3<f64> {
        let s = (t - self.t0).to_seconds() / self.dt;
        let s2 = s * s;
        let s3 = s2 * s;
        let h00 = 1.0 - 3.0 * s2 + 2.0 * s3;
        let h10 = s - 2.0 * s2 + s3;
        let h01 = 3.0 * s2 - 2.0 * s3;
        let h11 = s3 - s2;
        self.p0 * h00 + self.v0 * (h10 * self.dt) + self.p1 * h01 + self.v1 * (h11 * self.dt)
    }

    /// Interpolated velocity (time derivative of the position cubic) at `t`.
    pub fn evaluate_velocity(&self, t: Epoch) -> Vector3<f64> {
        let s = (t - self.t0).to_seconds() / self.dt;
        let s2 = s * s;
        let dh00 = -6.0 * s + 6.0 * s2;
        let dh10 = 1.0 - 4.0 * s + 3.0 * s2;
        let dh01 = 6.0 * s - 6.0 * s2;
        let dh11 = 3.0 * s2 - 2.0 * s;
        (self.p0 * dh00 + self.p1 * dh01) * (1.0 / self.dt) + self.v0 * dh10 + self.v1 * dh11
    }

    /// Interpolated degrees of freedom at `t`.
    pub fn evaluate(&self, t: Epoch) -> DegreesOfFreedom {
        DegreesOfFreedom::new(self.evaluate_position(t), self.evaluate_velocity(t))
    }
}
