//! # Degrees of freedom
//!
//! Defines [`DegreesOfFreedom`], the atomic sample stored in a trajectory: a
//! position and a velocity expressed in a fixed reference frame. The type is
//! an immutable value; trajectory operations copy it freely.
//!
//! Units
//! -----------------
//! * Positions are in **metres**.
//! * Velocities are in **metres per second**.
//!
//! The reference frame itself is a caller concern: every sample of a given
//! trajectory is interpreted in the same frame, and frame transformations
//! happen outside this crate.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// A position in a fixed reference frame, in metres.
pub type Position = Vector3<f64>;

/// A velocity in a fixed reference frame, in metres per second.
pub type Velocity = Vector3<f64>;

/// A (position, velocity) pair in a fixed reference frame.
///
/// This is the value type keyed by [`hifitime::Epoch`] in trajectory
/// timelines, and the quantity interpolated by the cubic Hermite evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DegreesOfFreedom {
    pub position: Position,
    pub velocity: Velocity,
}

impl DegreesOfFreedom {
    pub fn new(position: Position, velocity: Velocity) -> Self {
        Self { position, velocity }
    }
}
