//! # Embedded adaptive Runge-Kutta integration
//!
//! A generic stepper for explicit first-order ODEs `y' = f(t, y)`,
//! parameterized by an embedded method descriptor (Butcher tableau). Each
//! step evaluates the stages, forms two candidate next states from the
//! higher- and lower-order weights, and asks a caller-supplied
//! tolerance-to-error-ratio callback whether the difference is acceptable.
//! Accepted states are handed to an append callback (typically a trajectory
//! store); rejected steps are retried with a smaller step and never
//! surfaced.
//!
//! Conventions
//! -----------------
//! We follow the standard tableau notation: `c` for the nodes, `a` for the
//! Runge-Kutta matrix, `b̂` for the higher-order weights and `b` for the
//! lower-order weights. For first-same-as-last (FSAL) methods the final
//! stage of an accepted step is the first stage of the next one, saving one
//! right-hand-side evaluation per step; the cached derivative is explicit
//! instance state, never updated on rejection.
//!
//! Step-size control
//! -----------------
//! With ratio `ρ` returned by the callback (`ρ ≥ 1` accepts):
//!
//! ```text
//! accepted:  h ← h · min(max_step_growth, safety · ρ^(1/(p+1)))
//! rejected:  h ← h · max(min_step_shrink, safety · ρ^(1/(p+1)))
//! ```
//!
//! where `p` is the lower order. A rejected step whose successor falls
//! below `minimum_step` fails with
//! [`NonConvergence`](ApsisError::NonConvergence); points already appended
//! stay committed. The last step of a solve is shrunk to land exactly on
//! the requested final time, and `solve` is an idempotent no-op once that
//! time is reached. Both integration directions are supported; the sign of
//! `first_step` selects the direction.
//!
//! Checkpointing
//! -----------------
//! Instances are `Clone` (given cloneable callbacks) and expose a
//! serde snapshot ([`InstanceSnapshot`]) carrying time, state, current step
//! and the FSAL cache; [`EmbeddedExplicitRungeKutta::resume_instance`]
//! rebuilds an instance from a snapshot and fresh callbacks, reproducing
//! the uninterrupted step sequence bit for bit.

use hifitime::{Duration, Epoch};
use serde::{Deserialize, Serialize};

use crate::apsis_errors::ApsisError;
use crate::fixed_arrays::{FixedStrictlyLowerTriangularMatrix, FixedVector};

pub mod methods;

/// Tolerance for validating that a coefficient table is self-consistent.
/// Published rational coefficients round to doubles within a few ulps.
const TABLEAU_TOLERANCE: f64 = 1.0e-12;

/// An embedded explicit Runge-Kutta method descriptor.
///
/// Immutable and stateless: one descriptor per method family, shared by all
/// instances. `S` is the stage count and `P = S(S-1)/2` the packed size of
/// the strictly lower triangular matrix.
#[derive(Debug, Clone)]
pub struct EmbeddedExplicitRungeKutta<const S: usize, const P: usize> {
    name: &'static str,
    higher_order: u32,
    lower_order: u32,
    first_same_as_last: bool,
    c: FixedVector<S>,
    a: FixedStrictlyLowerTriangularMatrix<S, P>,
    b_hat: FixedVector<S>,
    b: FixedVector<S>,
}

impl<const S: usize, const P: usize> EmbeddedExplicitRungeKutta<S, P> {
    /// Builds and validates a method descriptor.
    ///
    /// Fails with [`ApsisError::InvalidMethod`] when the table is
    /// malformed: first node nonzero, matrix row sums inconsistent with the
    /// nodes, weights not summing to one, or an FSAL flag contradicted by
    /// the last matrix row.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &'static str,
        higher_order: u32,
        lower_order: u32,
        first_same_as_last: bool,
        c: FixedVector<S>,
        a: FixedStrictlyLowerTriangularMatrix<S, P>,
        b_hat: FixedVector<S>,
        b: FixedVector<S>,
    ) -> Result<Self, ApsisError> {
        let fail = |reason: String| ApsisError::InvalidMethod {
            method: name,
            reason,
        };
        if lower_order >= higher_order {
            return Err(fail(format!(
                "lower order {lower_order} must be below higher order {higher_order}"
            )));
        }
        if c[0] != 0.0 {
            return Err(fail(format!("first node must be 0, got {}", c[0])));
        }
        for i in 1..S {
            let row_sum: f64 = a.row(i).iter().sum();
            if (row_sum - c[i]).abs() > TABLEAU_TOLERANCE {
                return Err(fail(format!(
                    "row {i} sums to {row_sum}, node is {}",
                    c[i]
                )));
            }
        }
        for (weights, which) in [(&b_hat, "higher"), (&b, "lower")] {
            let sum: f64 = weights.iter().sum();
            if (sum - 1.0).abs() > TABLEAU_TOLERANCE {
                return Err(fail(format!("{which}-order weights sum to {sum}")));
            }
        }
        if first_same_as_last {
            if c[S - 1] != 1.0 || b_hat[S - 1] != 0.0 {
                return Err(fail("FSAL method must have c[S-1] = 1, b̂[S-1] = 0".into()));
            }
            for (j, &a_last) in a.row(S - 1).iter().enumerate() {
                if (a_last - b_hat[j]).abs() > TABLEAU_TOLERANCE {
                    return Err(fail(format!(
                        "FSAL last row differs from b̂ at column {j}"
                    )));
                }
            }
        }
        Ok(Self {
            name,
            higher_order,
            lower_order,
            first_same_as_last,
            c,
            a,
            b_hat,
            b,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub const fn stages(&self) -> usize {
        S
    }

    pub fn higher_order(&self) -> u32 {
        self.higher_order
    }

    pub fn lower_order(&self) -> u32 {
        self.lower_order
    }

    pub fn first_same_as_last(&self) -> bool {
        self.first_same_as_last
    }

    /// Creates a fresh integration instance for `problem`.
    pub fn new_instance<const N: usize, F, A, R>(
        &self,
        problem: InitialValueProblem<N, F>,
        append_state: A,
        tolerance_to_error_ratio: R,
        parameters: AdaptiveStepParameters,
    ) -> Instance<'_, N, S, P, F, A, R>
    where
        F: FnMut(Epoch, &FixedVector<N>) -> FixedVector<N>,
        A: FnMut(Epoch, &FixedVector<N>),
        R: FnMut(&FixedVector<N>, &FixedVector<N>) -> f64,
    {
        Instance {
            method: self,
            right_hand_side: problem.right_hand_side,
            append_state,
            tolerance_to_error_ratio,
            parameters,
            time: problem.initial_time,
            state: problem.initial_state,
            step: parameters.first_step,
            first_use: true,
            fsal_derivative: FixedVector::zero(),
        }
    }

    /// Rebuilds an instance from a snapshot and fresh callbacks.
    ///
    /// Fails with [`ApsisError::InvalidParameters`] if the snapshot was
    /// taken with a different method or a different state dimension.
    pub fn resume_instance<const N: usize, F, A, R>(
        &self,
        snapshot: &InstanceSnapshot,
        right_hand_side: F,
        append_state: A,
        tolerance_to_error_ratio: R,
        parameters: AdaptiveStepParameters,
    ) -> Result<Instance<'_, N, S, P, F, A, R>, ApsisError>
    where
        F: FnMut(Epoch, &FixedVector<N>) -> FixedVector<N>,
        A: FnMut(Epoch, &FixedVector<N>),
        R: FnMut(&FixedVector<N>, &FixedVector<N>) -> f64,
    {
        if snapshot.method != self.name {
            return Err(ApsisError::InvalidParameters(format!(
                "snapshot was taken with method {}, not {}",
                snapshot.method, self.name
            )));
        }
        let state = FixedVector::from_slice(&snapshot.state).ok_or_else(|| {
            ApsisError::InvalidParameters(format!(
                "snapshot state has dimension {}, expected {N}",
                snapshot.state.len()
            ))
        })?;
        let fsal_derivative =
            FixedVector::from_slice(&snapshot.fsal_derivative).ok_or_else(|| {
                ApsisError::InvalidParameters(format!(
                    "snapshot FSAL cache has dimension {}, expected {N}",
                    snapshot.fsal_derivative.len()
                ))
            })?;
        Ok(Instance {
            method: self,
            right_hand_side,
            append_state,
            tolerance_to_error_ratio,
            parameters,
            time: snapshot.time,
            state,
            step: snapshot.step,
            first_use: snapshot.first_use,
            fsal_derivative,
        })
    }
}

/// The problem definition handed to [`EmbeddedExplicitRungeKutta::new_instance`].
#[derive(Debug, Clone)]
pub struct InitialValueProblem<const N: usize, F> {
    pub initial_time: Epoch,
    pub initial_state: FixedVector<N>,
    pub right_hand_side: F,
}

/// Adaptive step-size parameters, validated at construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveStepParameters {
    first_step: Duration,
    minimum_step: Duration,
    safety_factor: f64,
    max_step_growth: f64,
    min_step_shrink: f64,
}

impl AdaptiveStepParameters {
    /// Builds the parameter set.
    ///
    /// `first_step` sets the direction of integration and must be nonzero;
    /// `minimum_step` is a magnitude; `safety_factor ∈ (0, 1]`;
    /// `max_step_growth > 1`; `min_step_shrink ∈ (0, 1)`.
    pub fn new(
        first_step: Duration,
        minimum_step: Duration,
        safety_factor: f64,
        max_step_growth: f64,
        min_step_shrink: f64,
    ) -> Result<Self, ApsisError> {
        if first_step.to_seconds() == 0.0 {
            return Err(ApsisError::InvalidParameters(
                "first_step must be nonzero".into(),
            ));
        }
        if minimum_step.to_seconds() < 0.0 {
            return Err(ApsisError::InvalidParameters(
                "minimum_step is a magnitude and must be nonnegative".into(),
            ));
        }
        if !(safety_factor > 0.0 && safety_factor <= 1.0) {
            return Err(ApsisError::InvalidParameters(format!(
                "safety_factor must be in (0, 1], got {safety_factor}"
            )));
        }
        if !(max_step_growth > 1.0) {
            return Err(ApsisError::InvalidParameters(format!(
                "max_step_growth must exceed 1, got {max_step_growth}"
            )));
        }
        if !(min_step_shrink > 0.0 && min_step_shrink < 1.0) {
            return Err(ApsisError::InvalidParameters(format!(
                "min_step_shrink must be in (0, 1), got {min_step_shrink}"
            )));
        }
        Ok(Self {
            first_step,
            minimum_step,
            safety_factor,
            max_step_growth,
            min_step_shrink,
        })
    }

    pub fn first_step(&self) -> Duration {
        self.first_step
    }

    pub fn minimum_step(&self) -> Duration {
        self.minimum_step
    }
}

/// Serde message capturing the resumable state of an [`Instance`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    pub method: String,
    pub time: Epoch,
    pub state: Vec<f64>,
    pub step: Duration,
    pub first_use: bool,
    pub fsal_derivative: Vec<f64>,
}

/// Per-run mutable state of an integration.
///
/// `N` is the state dimension, `S`/`P` the method shape. The callbacks are
/// invoked synchronously: the right-hand side at every stage, the append
/// callback once per accepted step, the tolerance-to-error-ratio callback
/// once per attempted step.
#[derive(Clone)]
pub struct Instance<'m, const N: usize, const S: usize, const P: usize, F, A, R>
where
    F: FnMut(Epoch, &FixedVector<N>) -> FixedVector<N>,
    A: FnMut(Epoch, &FixedVector<N>),
    R: FnMut(&FixedVector<N>, &FixedVector<N>) -> f64,
{
    method: &'m EmbeddedExplicitRungeKutta<S, P>,
    right_hand_side: F,
    append_state: A,
    tolerance_to_error_ratio: R,
    parameters: AdaptiveStepParameters,
    time: Epoch,
    state: FixedVector<N>,
    /// The step to attempt next; carries the direction sign.
    step: Duration,
    first_use: bool,
    /// Last-stage derivative of the previous accepted step; meaningful only
    /// for FSAL methods once `first_use` is false.
    fsal_derivative: FixedVector<N>,
}

impl<const N: usize, const S: usize, const P: usize, F, A, R> Instance<'_, N, S, P, F, A, R>
where
    F: FnMut(Epoch, &FixedVector<N>) -> FixedVector<N>,
    A: FnMut(Epoch, &FixedVector<N>),
    R: FnMut(&FixedVector<N>, &FixedVector<N>) -> f64,
{
    pub fn time(&self) -> Epoch {
        self.time
    }

    pub fn state(&self) -> &FixedVector<N> {
        &self.state
    }

    pub fn method(&self) -> &EmbeddedExplicitRungeKutta<S, P> {
        self.method
    }

    /// Advances the integration until `t_final` is reached exactly.
    ///
    /// Returns immediately when the instance already sits at `t_final`.
    /// On [`ApsisError::NonConvergence`] the points accepted so far remain
    /// committed through the append callback.
    pub fn solve(&mut self, t_final: Epoch) -> Result<(), ApsisError> {
        let to_go = (t_final - self.time).to_seconds();
        if to_go == 0.0 {
            return Ok(());
        }
        let direction = to_go.signum();
        if self.step.to_seconds() * direction <= 0.0 {
            return Err(ApsisError::InvalidParameters(format!(
                "current step {} does not advance from {} toward {}",
                self.step, self.time, t_final
            )));
        }
        let exponent = 1.0 / (f64::from(self.method.lower_order) + 1.0);
        let minimum_step = self.parameters.minimum_step.to_seconds().abs();

        loop {
            let mut h = self.step.to_seconds();
            let remaining = (t_final - self.time).to_seconds();
            let at_end = remaining * direction <= h * direction;
            if at_end {
                h = remaining;
            }

            // Stage 0, reusing the FSAL derivative when available.
            let mut stages = [FixedVector::<N>::zero(); S];
            stages[0] = if self.method.first_same_as_last && !self.first_use {
                self.fsal_derivative
            } else {
                (self.right_hand_side)(self.time, &self.state)
            };
            for i in 1..S {
                let mut increment = FixedVector::<N>::zero();
                for (j, &a_ij) in self.method.a.row(i).iter().enumerate() {
                    increment += stages[j] * a_ij;
                }
                let t_i = self.time + Duration::from_seconds(h * self.method.c[i]);
                let y_i = self.state + increment * h;
                stages[i] = (self.right_hand_side)(t_i, &y_i);
            }

            let mut higher_increment = FixedVector::<N>::zero();
            let mut lower_increment = FixedVector::<N>::zero();
            for i in 0..S {
                higher_increment += stages[i] * self.method.b_hat[i];
                lower_increment += stages[i] * self.method.b[i];
            }
            let higher = self.state + higher_increment * h;
            let lower = self.state + lower_increment * h;
            let error_estimate = higher - lower;

            let ratio = (self.tolerance_to_error_ratio)(&error_estimate, &higher);
            if ratio >= 1.0 {
                self.time = if at_end {
                    t_final
                } else {
                    self.time + Duration::from_seconds(h)
                };
                self.state = higher;
                self.first_use = false;
                if self.method.first_same_as_last {
                    self.fsal_derivative = stages[S - 1];
                }
                (self.append_state)(self.time, &self.state);
                if at_end {
                    return Ok(());
                }
                let growth = self
                    .parameters
                    .max_step_growth
                    .min(self.parameters.safety_factor * ratio.powf(exponent));
                self.step = Duration::from_seconds(h * growth);
            } else {
                let shrink = self
                    .parameters
                    .min_step_shrink
                    .max(self.parameters.safety_factor * ratio.powf(exponent));
                let h_new = h * shrink;
                self.step = Duration::from_seconds(h_new);
                if h_new.abs() < minimum_step {
                    return Err(ApsisError::NonConvergence { time: self.time });
                }
            }
        }
    }

    /// Serializes the resumable state; see
    /// [`EmbeddedExplicitRungeKutta::resume_instance`].
    pub fn write_snapshot(&self) -> InstanceSnapshot {
        InstanceSnapshot {
            method: self.method.name.to_owned(),
            time: self.time,
            state: self.state.as_slice().to_vec(),
            step: self.step,
            first_use: self.first_use,
            fsal_derivative: self.fsal_derivative.as_slice().to_vec(),
        }
    }
}
