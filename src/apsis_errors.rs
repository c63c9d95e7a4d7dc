use hifitime::Epoch;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApsisError {
    #[error("Out-of-order append at {time}: the trajectory already extends to {latest}")]
    OutOfOrderAppend { time: Epoch, latest: Epoch },

    #[error("Cannot forget before {time}: a fork exists at {fork_time}")]
    ForkBeforeHorizon { time: Epoch, fork_time: Epoch },

    #[error("Evaluation at {time} is outside the stored horizon [{t_min}, {t_max}]")]
    OutOfRange {
        time: Epoch,
        t_min: Epoch,
        t_max: Epoch,
    },

    #[error("Step size fell below the minimum step at {time} without an accepted step")]
    NonConvergence { time: Epoch },

    #[error("Malformed coefficient table for method {method}: {reason}")]
    InvalidMethod {
        method: &'static str,
        reason: String,
    },

    #[error("Principal moments of inertia must satisfy I1 < I2 < I3, got ({i1}, {i2}, {i3})")]
    DegenerateBody { i1: f64, i2: f64, i3: f64 },

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}
