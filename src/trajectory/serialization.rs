//! Snapshot messages for trajectory trees.
//!
//! A [`TreeSnapshot`] captures a whole tree — timelines, fork topology and
//! downsampling state — as plain serde data. Because external code holds
//! [`TrajectoryId`](super::TrajectoryId) handles that do not survive a
//! restore, the writer records the *tracked* node identities supplied by
//! the caller; the reader resolves them again, in the same order, so
//! external references can be re-established. Subtrees listed as
//! *excluded* are omitted from the snapshot wholesale; a tracked node
//! inside an excluded subtree resolves to `None`.

use hifitime::Epoch;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::apsis_errors::ApsisError;
use crate::degrees_of_freedom::DegreesOfFreedom;
use crate::trajectory::downsampling::{Downsampling, DownsamplingParameters};
use crate::trajectory::{Fork, Node, TrajectoryId, TrajectoryTree};

/// Serde message for a whole [`TrajectoryTree`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeSnapshot {
    tracked_count: usize,
    root: NodeSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NodeSnapshot {
    timeline: Vec<(Epoch, DegreesOfFreedom)>,
    /// Positions in the caller's tracked list designating this node.
    tracked: Vec<usize>,
    downsampling: Option<DownsamplingSnapshot>,
    children: Vec<ChildSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChildSnapshot {
    fork_time: Epoch,
    node: NodeSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DownsamplingSnapshot {
    parameters: DownsamplingParameters,
    dense: Vec<Epoch>,
}

impl TrajectoryTree {
    /// Serializes the tree.
    ///
    /// Subtrees rooted at the handles in `excluded` are omitted. Handles in
    /// `tracked` are recorded by index and resolved again by
    /// [`TrajectoryTree::read_snapshot`] in the same order.
    ///
    /// # Panics
    ///
    /// Panics if `excluded` contains the root.
    pub fn write_snapshot(
        &self,
        excluded: &[TrajectoryId],
        tracked: &[TrajectoryId],
    ) -> TreeSnapshot {
        assert!(
            !excluded.iter().any(|id| id.0 == self.root),
            "the root cannot be excluded from a snapshot"
        );
        TreeSnapshot {
            tracked_count: tracked.len(),
            root: self.write_node(self.root, excluded, tracked),
        }
    }

    fn write_node(
        &self,
        slot: usize,
        excluded: &[TrajectoryId],
        tracked: &[TrajectoryId],
    ) -> NodeSnapshot {
        let node = self.nodes[slot]
            .as_ref()
            .expect("snapshot slot must be occupied");
        let children = node
            .children
            .iter()
            .filter(|&&child| !excluded.iter().any(|id| id.0 == child))
            .map(|&child| {
                let fork_time = self.nodes[child]
                    .as_ref()
                    .expect("child slot must be occupied")
                    .parent
                    .expect("child must have a parent")
                    .time;
                ChildSnapshot {
                    fork_time,
                    node: self.write_node(child, excluded, tracked),
                }
            })
            .collect();
        NodeSnapshot {
            timeline: node.timeline.iter().map(|(t, dof)| (*t, *dof)).collect(),
            tracked: tracked.iter().positions(|id| id.0 == slot).collect(),
            downsampling: node.downsampling.as_ref().map(|downsampling| {
                DownsamplingSnapshot {
                    parameters: downsampling.parameters(),
                    dense: downsampling.dense_times().to_vec(),
                }
            }),
            children,
        }
    }

    /// Rebuilds a tree from a snapshot, resolving the tracked handles in
    /// the order they were supplied to [`TrajectoryTree::write_snapshot`].
    /// A tracked node that was excluded from the snapshot resolves to
    /// `None`.
    ///
    /// Fails with [`ApsisError::OutOfOrderAppend`] if a serialized timeline
    /// is not strictly increasing.
    pub fn read_snapshot(
        snapshot: &TreeSnapshot,
    ) -> Result<(TrajectoryTree, Vec<Option<TrajectoryId>>), ApsisError> {
        let mut tree = TrajectoryTree {
            nodes: Vec::new(),
            free_slots: Vec::new(),
            root: 0,
        };
        let mut tracked = vec![None; snapshot.tracked_count];
        let root = Self::read_node(&mut tree, &snapshot.root, None, &mut tracked)?;
        tree.root = root;
        Ok((tree, tracked))
    }

    fn read_node(
        tree: &mut TrajectoryTree,
        snapshot: &NodeSnapshot,
        parent: Option<Fork>,
        tracked: &mut [Option<TrajectoryId>],
    ) -> Result<usize, ApsisError> {
        for ((t0, _), (t1, _)) in snapshot.timeline.iter().tuple_windows() {
            if t1 <= t0 {
                return Err(ApsisError::OutOfOrderAppend {
                    time: *t1,
                    latest: *t0,
                });
            }
        }
        let slot = tree.nodes.len();
        tree.nodes.push(Some(Node {
            parent,
            children: Vec::new(),
            timeline: snapshot.timeline.iter().copied().collect(),
            downsampling: snapshot.downsampling.as_ref().map(|downsampling| {
                Downsampling::restore(downsampling.parameters, downsampling.dense.clone())
            }),
        }));
        for &index in &snapshot.tracked {
            if let Some(entry) = tracked.get_mut(index) {
                *entry = Some(TrajectoryId(slot));
            }
        }
        for child in &snapshot.children {
            let child_slot = Self::read_node(
                tree,
                &child.node,
                Some(Fork {
                    parent: slot,
                    time: child.fork_time,
                }),
                tracked,
            )?;
            tree.nodes[slot]
                .as_mut()
                .expect("freshly created slot must be occupied")
                .children
                .push(child_slot);
        }
        Ok(slot)
    }
}
