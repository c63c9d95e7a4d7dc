//! # Closed-form torque-free rigid-body rotation
//!
//! [`EulerSolver`] evaluates the angular momentum of a torque-free rigid
//! body at arbitrary instants without stepwise integration. Construction
//! classifies the motion into one of three regimes from the rotational
//! kinetic energy `T` and the squared angular momentum norm `G²`:
//!
//! 1. `2TI₁ ≤ G² < 2TI₂` — libration about the axis of least inertia;
//! 2. `2TI₂ < G² ≤ 2TI₃` — libration about the axis of greatest inertia;
//! 3. `G² = 2TI₂` exactly — the separatrix, where the momentum approaches
//!    the intermediate axis asymptotically.
//!
//! The librating regimes evolve through Jacobi elliptic functions of a
//! linear argument; the separatrix degenerates into hyperbolic functions.
//! All derived constants are computed once at construction; evaluation is a
//! handful of special-function calls.
//!
//! Conventions
//! -----------------
//! * Principal moments of inertia are strictly increasing, `I₁ < I₂ < I₃`
//!   (kg·m²); anything else is a [`DegenerateBody`](ApsisError::DegenerateBody)
//!   failure.
//! * Angular momentum components are expressed in the principal-axes frame
//!   (kg·m²/s).

use hifitime::Epoch;
use nalgebra::Vector3;

use crate::apsis_errors::ApsisError;
use crate::elliptic::{elliptic_f, jacobi_sn_cn_dn};

/// Which closed form governs the motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formula {
    /// Libration about the first principal axis.
    I,
    /// Libration about the third principal axis.
    II,
    /// The separatrix `G² = 2TI₂`.
    III,
}

/// Closed-form solver for torque-free rotation of a triaxial rigid body.
///
/// All fields are derived constants frozen at construction; the solver is
/// immutable and evaluation does not accumulate error over time.
#[derive(Debug, Clone)]
pub struct EulerSolver {
    formula: Formula,
    initial_time: Epoch,
    /// Angular momentum norm `G`.
    g: f64,
    /// Complementary elliptic parameter of the librating regimes.
    mc: f64,
    /// Amplitude offset: `F(φ₀ | m)` in the librating regimes, the
    /// negated inverse hyperbolic tangent of `m₂/G` on the separatrix.
    nu: f64,
    /// Signed angular rate multiplying `(t - t₀)`.
    rate: f64,
    b13: f64,
    b21: f64,
    b31: f64,
    b23: f64,
    /// Sign of the component along the libration axis (regimes I and II).
    sigma: f64,
    /// Signs of the transverse components on the separatrix.
    sigma1: f64,
    sigma3: f64,
}

fn sign(x: f64) -> f64 {
    if x < 0.0 {
        -1.0
    } else {
        1.0
    }
}

impl EulerSolver {
    /// Builds the solver from the principal moments of inertia and the
    /// angular momentum at `initial_time`, both in the principal-axes
    /// frame.
    ///
    /// Fails with [`ApsisError::DegenerateBody`] unless `I₁ < I₂ < I₃`.
    pub fn new(
        moments_of_inertia: Vector3<f64>,
        initial_angular_momentum: Vector3<f64>,
        initial_time: Epoch,
    ) -> Result<Self, ApsisError> {
        let i1 = moments_of_inertia.x;
        let i2 = moments_of_inertia.y;
        let i3 = moments_of_inertia.z;
        if !(i1 < i2 && i2 < i3) {
            return Err(ApsisError::DegenerateBody { i1, i2, i3 });
        }

        let m = initial_angular_momentum;
        let g2 = m.norm_squared();
        let g = g2.sqrt();
        let two_t = m.x * m.x / i1 + m.y * m.y / i2 + m.z * m.z / i3;

        // Energy margins; Δ₁ ≥ 0 and Δ₃ ≤ 0 analytically, clamped against
        // rounding so the radicands below stay nonnegative.
        let delta_1 = (g2 - two_t * i1).max(0.0);
        let delta_2 = g2 - two_t * i2;
        let delta_3 = (g2 - two_t * i3).min(0.0);

        let b13 = (i1 * -delta_3 / (i3 - i1)).sqrt();
        let b21 = (i2 * delta_1 / (i2 - i1)).sqrt();
        let b31 = (i3 * delta_1 / (i3 - i1)).sqrt();
        let b23 = (i2 * -delta_3 / (i3 - i2)).sqrt();

        let mut solver = Self {
            formula: Formula::III,
            initial_time,
            g,
            mc: 0.0,
            nu: 0.0,
            rate: 0.0,
            b13,
            b21,
            b31,
            b23,
            sigma: 1.0,
            sigma1: 1.0,
            sigma3: 1.0,
        };

        if g2 == 0.0 {
            // A body at rest stays at rest; every constant above is zero.
            return Ok(solver);
        }

        if delta_2 < 0.0 {
            // Libration about axis 1 (includes pure rotation, Δ₁ = 0).
            solver.formula = Formula::I;
            solver.mc = (-delta_2 * (i3 - i1) / (-delta_3 * (i2 - i1))).min(1.0);
            solver.nu = if b21 > 0.0 && b31 > 0.0 {
                elliptic_f((m.y / b21).atan2(m.z / b31), solver.mc)
            } else {
                0.0
            };
            solver.sigma = sign(m.x);
            solver.rate = solver.sigma * (-delta_3 * (i2 - i1) / (i1 * i2 * i3)).sqrt();
        } else if delta_2 > 0.0 {
            // Libration about axis 3 (includes pure rotation, Δ₃ = 0).
            solver.formula = Formula::II;
            solver.mc = (delta_2 * (i3 - i1) / (delta_1 * (i3 - i2))).min(1.0);
            solver.nu = if b23 > 0.0 && b13 > 0.0 {
                elliptic_f((m.y / b23).atan2(m.x / b13), solver.mc)
            } else {
                0.0
            };
            solver.sigma = sign(m.z);
            solver.rate = solver.sigma * (delta_1 * (i3 - i2) / (i1 * i2 * i3)).sqrt();
        } else {
            // The separatrix: hyperbolic evolution toward axis 2.
            solver.formula = Formula::III;
            solver.nu = -(m.y / g).atanh();
            solver.sigma1 = sign(m.x);
            solver.sigma3 = sign(m.z);
            solver.rate =
                solver.sigma1 * solver.sigma3 * (delta_1 * -delta_3 / (i1 * i3)).sqrt() / g;
        }
        Ok(solver)
    }

    /// The regime selected at construction.
    pub fn formula(&self) -> Formula {
        self.formula
    }

    /// The angular momentum at `time`, in the principal-axes frame.
    pub fn angular_momentum_at(&self, time: Epoch) -> Vector3<f64> {
        let dt = (time - self.initial_time).to_seconds();
        match self.formula {
            Formula::I => {
                let u = self.rate * dt + self.nu;
                let (sn, cn, dn) = jacobi_sn_cn_dn(u, self.mc);
                Vector3::new(self.sigma * self.b13 * dn, self.b21 * sn, self.b31 * cn)
            }
            Formula::II => {
                let u = self.rate * dt + self.nu;
                let (sn, cn, dn) = jacobi_sn_cn_dn(u, self.mc);
                Vector3::new(self.b13 * cn, self.b23 * sn, self.sigma * self.b31 * dn)
            }
            Formula::III => {
                if self.g == 0.0 {
                    return Vector3::zeros();
                }
                let u = self.rate * dt - self.nu;
                let sech = 1.0 / u.cosh();
                Vector3::new(
                    self.sigma1 * self.b13 * sech,
                    self.g * u.tanh(),
                    self.sigma3 * self.b31 * sech,
                )
            }
        }
    }
}
