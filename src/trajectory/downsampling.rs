//! Dense-sample bookkeeping for trajectory downsampling.
//!
//! Long integrations append far more samples than rendering or evaluation
//! ever needs. The downsampler keeps a bounded buffer of the most recent
//! ("dense") sample times; when the buffer fills, it fits one cubic Hermite
//! interpolant across the dense span and erases the interior samples if
//! none of them deviates from the fit by more than the configured distance
//! tolerance. Whether or not anything is erased, the buffer resets to the
//! surviving endpoint, so capacity is always recovered and appending makes
//! forward progress.

use std::collections::BTreeMap;

use hifitime::Epoch;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::apsis_errors::ApsisError;
use crate::degrees_of_freedom::DegreesOfFreedom;
use crate::hermite::Hermite3;

/// Validated downsampling configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DownsamplingParameters {
    max_dense_intervals: usize,
    tolerance: f64,
}

impl DownsamplingParameters {
    /// `max_dense_intervals` is the number of intervals accumulated before
    /// a compaction is attempted (at least 2); `tolerance` is the maximum
    /// position deviation, in metres, that an erased sample may incur.
    pub fn new(max_dense_intervals: usize, tolerance: f64) -> Result<Self, ApsisError> {
        if max_dense_intervals < 2 {
            return Err(ApsisError::InvalidParameters(format!(
                "max_dense_intervals must be at least 2, got {max_dense_intervals}"
            )));
        }
        if !(tolerance > 0.0) {
            return Err(ApsisError::InvalidParameters(format!(
                "tolerance must be positive, got {tolerance}"
            )));
        }
        Ok(Self {
            max_dense_intervals,
            tolerance,
        })
    }

    pub fn max_dense_intervals(&self) -> usize {
        self.max_dense_intervals
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }
}

/// The transient buffer of not-yet-committed sample times.
#[derive(Debug, Clone)]
pub(crate) struct Downsampling {
    parameters: DownsamplingParameters,
    dense: SmallVec<[Epoch; 16]>,
}

impl Downsampling {
    pub(crate) fn new(parameters: DownsamplingParameters) -> Self {
        Self {
            parameters,
            dense: SmallVec::new(),
        }
    }

    pub(crate) fn restore(parameters: DownsamplingParameters, dense: Vec<Epoch>) -> Self {
        Self {
            parameters,
            dense: SmallVec::from_vec(dense),
        }
    }

    pub(crate) fn parameters(&self) -> DownsamplingParameters {
        self.parameters
    }

    pub(crate) fn dense_times(&self) -> &[Epoch] {
        &self.dense
    }

    /// Records an appended sample time.
    pub(crate) fn append(&mut self, time: Epoch) {
        self.dense.push(time);
    }

    /// Whether the buffer has accumulated `max_dense_intervals` intervals.
    pub(crate) fn full(&self) -> bool {
        self.dense.len() > self.parameters.max_dense_intervals
    }

    /// Attempts to erase the interior of the dense span from `timeline`.
    ///
    /// The span endpoints are fitted with a cubic Hermite interpolant; if
    /// every interior dense sample lies within `tolerance` of the fit, the
    /// interior samples are erased. The buffer always resets to hold just
    /// the final endpoint. Returns the number of erased samples.
    pub(crate) fn compact(&mut self, timeline: &mut BTreeMap<Epoch, DegreesOfFreedom>) -> usize {
        let last = *self
            .dense
            .last()
            .expect("compaction requires a nonempty dense buffer");
        let mut erased = 0;
        if self.dense.len() > 2 {
            let first = self.dense[0];
            let first_dof = timeline[&first];
            let last_dof = timeline[&last];
            let fit = Hermite3::new(first, &first_dof, last, &last_dof);
            let interior = &self.dense[1..self.dense.len() - 1];
            let worst = interior
                .iter()
                .map(|&t| (fit.evaluate_position(t) - timeline[&t].position).norm())
                .fold(0.0f64, f64::max);
            if worst <= self.parameters.tolerance {
                for t in interior {
                    timeline.remove(t);
                    erased += 1;
                }
            }
        }
        self.dense.clear();
        self.dense.push(last);
        erased
    }

    /// Drops buffered references after `time`, mirroring
    /// `TrajectoryTree::forget_after`.
    pub(crate) fn forget_after(&mut self, time: Epoch) {
        self.dense.retain(|t| *t <= time);
    }

    /// Drops buffered references before `time`, mirroring
    /// `TrajectoryTree::forget_before`.
    pub(crate) fn forget_before(&mut self, time: Epoch) {
        self.dense.retain(|t| *t >= time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::TrajectoryTree;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn epoch(seconds: f64) -> Epoch {
        Epoch::from_tai_seconds(seconds)
    }

    fn linear_dof(t: f64) -> DegreesOfFreedom {
        DegreesOfFreedom::new(Vector3::new(t, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0))
    }

    fn circular_dof(t: f64) -> DegreesOfFreedom {
        DegreesOfFreedom::new(
            Vector3::new(t.cos(), t.sin(), 0.0),
            Vector3::new(-t.sin(), t.cos(), 0.0),
        )
    }

    #[test]
    fn test_parameters_are_validated() {
        assert!(DownsamplingParameters::new(1, 1.0).is_err());
        assert!(DownsamplingParameters::new(8, 0.0).is_err());
        assert!(DownsamplingParameters::new(8, -1.0).is_err());
        let p = DownsamplingParameters::new(8, 1.0e-3).unwrap();
        assert_eq!(p.max_dense_intervals(), 8);
    }

    #[test]
    fn test_linear_motion_is_compacted_to_endpoints() {
        let mut tree = TrajectoryTree::new();
        let root = tree.root();
        tree.set_downsampling(DownsamplingParameters::new(4, 1.0e-6).unwrap())
            .unwrap();

        // Straight-line motion is captured exactly by the Hermite fit, so
        // every compaction prunes the interior.
        for i in 0..=12 {
            let t = i as f64;
            tree.append(root, epoch(t), linear_dof(t)).unwrap();
        }
        assert!(tree.timeline_len(root) < 13);

        // Interpolation through the pruned span stays exact.
        for t in [0.5, 3.25, 7.75, 11.5] {
            let p = tree.evaluate_position(root, epoch(t)).unwrap();
            assert_relative_eq!(p.x, t, epsilon = 1e-9);
        }
        assert_eq!(tree.t_min(root), Some(epoch(0.0)));
        assert_eq!(tree.t_max(root), Some(epoch(12.0)));
    }

    #[test]
    fn test_tight_tolerance_keeps_all_points_but_recovers_capacity() {
        let mut tree = TrajectoryTree::new();
        let root = tree.root();
        tree.set_downsampling(DownsamplingParameters::new(4, 1.0e-12).unwrap())
            .unwrap();

        // Strongly curved motion with a coarse grid: no span fits within
        // the tolerance, so nothing is erased, yet the buffer keeps
        // resetting and appends continue to succeed.
        for i in 0..=20 {
            let t = i as f64 * 0.5;
            tree.append(root, epoch(t), circular_dof(t)).unwrap();
        }
        assert_eq!(tree.timeline_len(root), 21);
    }

    #[test]
    fn test_deviation_of_erased_samples_is_within_tolerance() {
        let tolerance = 1.0e-4;
        let mut tree = TrajectoryTree::new();
        let root = tree.root();
        tree.set_downsampling(DownsamplingParameters::new(8, tolerance).unwrap())
            .unwrap();

        let step = 0.01;
        let n = 400;
        for i in 0..=n {
            let t = i as f64 * step;
            tree.append(root, epoch(t), circular_dof(t)).unwrap();
        }
        assert!(tree.timeline_len(root) < n + 1, "nothing was downsampled");

        // Every original sample, erased or kept, is reproduced within the
        // tolerance by the surviving interpolation.
        for i in 0..=n {
            let t = i as f64 * step;
            let p = tree.evaluate_position(root, epoch(t)).unwrap();
            let expected = circular_dof(t).position;
            assert!(
                (p - expected).norm() <= tolerance,
                "sample at t = {t} deviates by {}",
                (p - expected).norm()
            );
        }
    }

    #[test]
    fn test_clear_downsampling_retains_everything_afterwards() {
        let mut tree = TrajectoryTree::new();
        let root = tree.root();
        tree.set_downsampling(DownsamplingParameters::new(2, 1.0).unwrap())
            .unwrap();
        for i in 0..=6 {
            let t = i as f64;
            tree.append(root, epoch(t), linear_dof(t)).unwrap();
        }
        let len_before = tree.timeline_len(root);
        assert!(len_before < 7);

        tree.clear_downsampling();
        assert!(tree.downsampling_parameters().is_none());
        for i in 7..=20 {
            let t = i as f64;
            tree.append(root, epoch(t), linear_dof(t)).unwrap();
        }
        assert_eq!(tree.timeline_len(root), len_before + 14);
    }

    #[test]
    fn test_set_downsampling_requires_fork_free_tree() {
        let mut tree = TrajectoryTree::new();
        let root = tree.root();
        tree.append(root, epoch(0.0), linear_dof(0.0)).unwrap();
        tree.new_fork_at_last(root);
        let err = tree
            .set_downsampling(DownsamplingParameters::new(4, 1.0).unwrap())
            .unwrap_err();
        assert!(matches!(err, ApsisError::InvalidParameters(_)));
    }

    #[test]
    fn test_set_downsampling_twice_is_rejected() {
        let mut tree = TrajectoryTree::new();
        tree.set_downsampling(DownsamplingParameters::new(4, 1.0).unwrap())
            .unwrap();
        assert!(tree
            .set_downsampling(DownsamplingParameters::new(4, 1.0).unwrap())
            .is_err());
    }

    #[test]
    fn test_forget_propagates_into_dense_buffer() {
        let mut tree = TrajectoryTree::new();
        let root = tree.root();
        tree.set_downsampling(DownsamplingParameters::new(8, 1.0e-6).unwrap())
            .unwrap();
        for i in 0..=5 {
            let t = i as f64;
            tree.append(root, epoch(t), linear_dof(t)).unwrap();
        }

        tree.forget_after(root, epoch(3.0));
        assert_eq!(tree.t_max(root), Some(epoch(3.0)));
        // Appending after the forget must not trip over stale buffered
        // references to the dropped samples.
        for i in 4..=20 {
            let t = i as f64;
            tree.append(root, epoch(t), linear_dof(t)).unwrap();
        }

        tree.forget_before(epoch(2.0)).unwrap();
        assert!(tree.t_min(root).unwrap() >= epoch(2.0));
        for i in 21..=30 {
            let t = i as f64;
            tree.append(root, epoch(t), linear_dof(t)).unwrap();
        }
        assert_eq!(tree.t_max(root), Some(epoch(30.0)));
    }
}
