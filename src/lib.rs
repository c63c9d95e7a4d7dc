pub mod apsis_errors;
pub mod constants;
pub mod degrees_of_freedom;
pub mod elliptic;
pub mod euler_solver;
pub mod fixed_arrays;
pub mod hermite;
pub mod integrators;
pub mod trajectory;

pub use apsis_errors::ApsisError;
pub use degrees_of_freedom::DegreesOfFreedom;
pub use trajectory::{DownsamplingParameters, TrajectoryId, TrajectoryTree};
