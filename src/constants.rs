//! # Constants for apsis
//!
//! This module centralizes the numeric constants shared across the crate:
//! angle conversions and time-unit factors used by the integrators, the
//! analytic rotation solver, and their tests.

/// 2π, useful for trigonometric conversions
pub const DPI: f64 = 2. * std::f64::consts::PI;

/// Number of seconds in a Julian day
pub const SECONDS_PER_DAY: f64 = 86_400.0;
