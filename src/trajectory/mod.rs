//! # Trajectories: forkable, downsampled timelines
//!
//! The central type is [`TrajectoryTree`], an arena-owned tree of trajectory
//! nodes addressed through copyable [`TrajectoryId`] handles. Each node owns
//! a [`BTreeMap`] timeline of [`DegreesOfFreedom`] samples covering the open
//! interval after its fork point; the *effective history* of a node is the
//! concatenation of its ancestors' timelines clipped at each fork point,
//! followed by its own — logical sharing through a chained walk, never a
//! physical copy. Destroying a node destroys its owned subtree and never
//! mutates ancestors.
//!
//! Modules
//! -----------------
//! * [`downsampling`] *(crate-private)* – the dense-sample buffer that
//!   bounds storage growth under a distance tolerance.
//! * [`serialization`] – snapshot messages preserving fork topology,
//!   tracked node identities, and downsampling state.
//!
//! Operations
//! -----------------
//! * [`TrajectoryTree::append`] – strictly time-ordered insertion, routed
//!   through the downsampling filter on a downsampling root.
//! * [`TrajectoryTree::new_fork_with_copy`] /
//!   [`TrajectoryTree::new_fork_without_copy`] /
//!   [`TrajectoryTree::new_fork_at_last`] – independent continuations
//!   sharing history up to the fork point.
//! * [`TrajectoryTree::attach_fork`] / [`TrajectoryTree::detach_fork`] –
//!   re-parenting between trees; a detached subtree materializes its fork
//!   sample so it is never empty.
//! * [`TrajectoryTree::forget_after`] / [`TrajectoryTree::forget_before`] –
//!   horizon trimming, the latter guarded by the descendant-fork invariant.
//! * [`TrajectoryTree::iter`] – lazy, restartable, double-ended walk of the
//!   effective history.
//! * [`TrajectoryTree::evaluate_position`] /
//!   [`TrajectoryTree::evaluate_velocity`] /
//!   [`TrajectoryTree::evaluate_degrees_of_freedom`] – cubic Hermite
//!   interpolation between bracketing samples, failing with
//!   [`OutOfRange`](ApsisError::OutOfRange) outside the stored horizon.
//!
//! Failure taxonomy: non-monotonic appends surface
//! [`OutOfOrderAppend`](ApsisError::OutOfOrderAppend), forgetting across a
//! descendant fork surfaces
//! [`ForkBeforeHorizon`](ApsisError::ForkBeforeHorizon). Structural
//! contract violations (forking at a time absent from the history,
//! detaching a root, using a stale handle) are panics, documented on each
//! operation.
//!
//! Concurrency: a tree is a single-threaded exclusive-ownership structure;
//! callers owning several trees may operate on them independently but must
//! serialize access to any one tree.

use std::collections::btree_map;
use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;

use hifitime::Epoch;

use crate::apsis_errors::ApsisError;
use crate::degrees_of_freedom::{DegreesOfFreedom, Position, Velocity};
use crate::hermite::Hermite3;

pub mod serialization;

pub(crate) mod downsampling;

pub use downsampling::DownsamplingParameters;

use downsampling::Downsampling;

/// Handle to a node of a [`TrajectoryTree`].
///
/// Handles are plain indices: they stay valid across appends and forks on
/// other branches, and are invalidated when the node they designate is
/// destroyed (`forget_after` of an ancestor, destruction of the tree, or
/// `detach_fork`, which re-homes the subtree into the returned tree).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrajectoryId(pub(crate) usize);

#[derive(Debug, Clone, Copy)]
pub(crate) struct Fork {
    pub(crate) parent: usize,
    pub(crate) time: Epoch,
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) parent: Option<Fork>,
    /// Owned children, ordered by fork time.
    pub(crate) children: Vec<usize>,
    pub(crate) timeline: BTreeMap<Epoch, DegreesOfFreedom>,
    /// Present only on the root of a fork-free tree.
    pub(crate) downsampling: Option<Downsampling>,
}

impl Node {
    fn fresh_root() -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            timeline: BTreeMap::new(),
            downsampling: None,
        }
    }
}

/// An exclusive-ownership tree of trajectory nodes.
#[derive(Debug, Clone)]
pub struct TrajectoryTree {
    pub(crate) nodes: Vec<Option<Node>>,
    pub(crate) free_slots: Vec<usize>,
    pub(crate) root: usize,
}

impl Default for TrajectoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl TrajectoryTree {
    /// A tree holding a single empty root.
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(Node::fresh_root())],
            free_slots: Vec::new(),
            root: 0,
        }
    }

    /// The root handle.
    pub fn root(&self) -> TrajectoryId {
        TrajectoryId(self.root)
    }

    pub(crate) fn node(&self, id: TrajectoryId) -> &Node {
        self.nodes[id.0]
            .as_ref()
            .expect("trajectory handle is stale")
    }

    pub(crate) fn node_mut(&mut self, id: TrajectoryId) -> &mut Node {
        self.nodes[id.0]
            .as_mut()
            .expect("trajectory handle is stale")
    }

    fn allocate(&mut self, node: Node) -> usize {
        match self.free_slots.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                slot
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    /// Whether `id` designates the root.
    pub fn is_root(&self, id: TrajectoryId) -> bool {
        self.node(id).parent.is_none()
    }

    /// The fork time of a non-root node.
    pub fn fork_time(&self, id: TrajectoryId) -> Option<Epoch> {
        self.node(id).parent.map(|fork| fork.time)
    }

    /// Number of samples owned by this node (excluding shared ancestors).
    pub fn timeline_len(&self, id: TrajectoryId) -> usize {
        self.node(id).timeline.len()
    }

    /// The ancestor chain from the root down to `id`, each entry carrying
    /// the fork time clipping that ancestor's visible timeline.
    fn chain(&self, id: TrajectoryId) -> Vec<(usize, Option<Epoch>)> {
        let mut reversed = Vec::new();
        let mut current = id.0;
        let mut clip: Option<Epoch> = None;
        loop {
            reversed.push((current, clip));
            match self.node(TrajectoryId(current)).parent {
                Some(fork) => {
                    clip = Some(fork.time);
                    current = fork.parent;
                }
                None => break,
            }
        }
        reversed.reverse();
        reversed
    }

    /// Latest time of the effective history, if any.
    pub fn t_max(&self, id: TrajectoryId) -> Option<Epoch> {
        let node = self.node(id);
        node.timeline
            .keys()
            .next_back()
            .copied()
            .or_else(|| node.parent.map(|fork| fork.time))
    }

    /// Earliest time of the effective history, if any.
    pub fn t_min(&self, id: TrajectoryId) -> Option<Epoch> {
        self.iter(id).next().map(|(t, _)| t)
    }

    /// Lazy, restartable, double-ended walk over the effective history.
    pub fn iter(&self, id: TrajectoryId) -> TrajectoryIterator<'_> {
        let segments = self
            .chain(id)
            .into_iter()
            .map(|(slot, clip)| {
                let upper = match clip {
                    Some(t) => Bound::Included(t),
                    None => Bound::Unbounded,
                };
                self.nodes[slot]
                    .as_ref()
                    .expect("trajectory handle is stale")
                    .timeline
                    .range((Bound::Unbounded, upper))
            })
            .collect();
        TrajectoryIterator { segments }
    }

    /// Appends a sample.
    ///
    /// `time` must exceed the latest time of the node's effective history;
    /// otherwise [`ApsisError::OutOfOrderAppend`] is returned and nothing is
    /// mutated. On a downsampling root, the sample is recorded in the dense
    /// buffer, and a full buffer triggers a compaction that may erase
    /// earlier interior samples from the timeline.
    pub fn append(
        &mut self,
        id: TrajectoryId,
        time: Epoch,
        degrees_of_freedom: DegreesOfFreedom,
    ) -> Result<(), ApsisError> {
        if let Some(latest) = self.t_max(id) {
            if time <= latest {
                return Err(ApsisError::OutOfOrderAppend { time, latest });
            }
        }
        let node = self.node_mut(id);
        node.timeline.insert(time, degrees_of_freedom);
        if let Some(downsampling) = node.downsampling.as_mut() {
            downsampling.append(time);
            if downsampling.full() {
                downsampling.compact(&mut node.timeline);
            }
        }
        Ok(())
    }

    fn assert_forkable(&self, id: TrajectoryId, time: Epoch) {
        assert!(
            self.node(TrajectoryId(self.root)).downsampling.is_none(),
            "cannot fork a downsampling trajectory"
        );
        if let Some(fork) = self.node(id).parent {
            assert!(
                time >= fork.time,
                "fork time must be at or after this node's own fork point"
            );
        }
        assert!(
            self.find_sample(id, time).is_some(),
            "fork time must be one of the trajectory's sample times"
        );
    }

    /// Inserts `child` among `parent`'s children, keeping them ordered by
    /// fork time (newest fork last among equals).
    fn insert_child(&mut self, parent: TrajectoryId, time: Epoch, child: usize) {
        let children = &self.node(parent).children;
        let position = children
            .iter()
            .position(|&sibling| {
                self.nodes[sibling]
                    .as_ref()
                    .expect("child slot must be occupied")
                    .parent
                    .expect("child must have a parent")
                    .time
                    > time
            })
            .unwrap_or(children.len());
        self.node_mut(parent).children.insert(position, child);
    }

    /// Creates a child forked at `time`, duplicating this node's own
    /// samples strictly after `time` into the child so that later edits to
    /// either branch are invisible to the other.
    ///
    /// # Panics
    ///
    /// Panics if `time` is not a sample of the effective history at or
    /// after this node's own fork point, or if the tree is downsampling.
    pub fn new_fork_with_copy(&mut self, id: TrajectoryId, time: Epoch) -> TrajectoryId {
        self.assert_forkable(id, time);
        let copied: BTreeMap<Epoch, DegreesOfFreedom> = self
            .node(id)
            .timeline
            .range((Bound::Excluded(time), Bound::Unbounded))
            .map(|(t, dof)| (*t, *dof))
            .collect();
        let child = self.allocate(Node {
            parent: Some(Fork {
                parent: id.0,
                time,
            }),
            children: Vec::new(),
            timeline: copied,
            downsampling: None,
        });
        self.insert_child(id, time, child);
        TrajectoryId(child)
    }

    /// Creates a child forked at `time` with an empty own timeline: the
    /// child shares history up to `time` and diverges afterwards.
    ///
    /// # Panics
    ///
    /// Same preconditions as [`Self::new_fork_with_copy`].
    pub fn new_fork_without_copy(&mut self, id: TrajectoryId, time: Epoch) -> TrajectoryId {
        self.assert_forkable(id, time);
        let child = self.allocate(Node {
            parent: Some(Fork {
                parent: id.0,
                time,
            }),
            children: Vec::new(),
            timeline: BTreeMap::new(),
            downsampling: None,
        });
        self.insert_child(id, time, child);
        TrajectoryId(child)
    }

    /// Forks at the latest time of the effective history.
    ///
    /// # Panics
    ///
    /// Panics if the effective history is empty.
    pub fn new_fork_at_last(&mut self, id: TrajectoryId) -> TrajectoryId {
        let last = self
            .t_max(id)
            .expect("cannot fork an empty trajectory at its last point");
        self.new_fork_without_copy(id, last)
    }

    /// Re-parents `subtree` as a child of `id` forked at `id`'s latest
    /// time, and returns the handle of the attached node. A sample of the
    /// incoming tree at exactly the attachment time is discarded as a
    /// duplicate.
    ///
    /// # Panics
    ///
    /// Panics if `subtree` is forked, empty, downsampling, or starts before
    /// `id`'s latest time, or if `id`'s history is empty.
    pub fn attach_fork(&mut self, id: TrajectoryId, subtree: TrajectoryTree) -> TrajectoryId {
        assert!(
            self.node(TrajectoryId(self.root)).downsampling.is_none(),
            "cannot fork a downsampling trajectory"
        );
        let attach_time = self
            .t_max(id)
            .expect("cannot attach to an empty trajectory");
        let root_id = subtree.root();
        let mut incoming = subtree;
        let mut node = incoming.nodes[root_id.0]
            .take()
            .expect("subtree root must be occupied");
        assert!(
            node.children.is_empty(),
            "the attached trajectory must be un-forked"
        );
        assert!(
            node.downsampling.is_none(),
            "the attached trajectory must not be downsampling"
        );
        let first = node
            .timeline
            .keys()
            .next()
            .copied()
            .expect("cannot attach an empty trajectory");
        assert!(
            first >= attach_time,
            "the attached trajectory must start at or after the attachment point"
        );
        node.timeline.remove(&attach_time);
        node.parent = Some(Fork {
            parent: id.0,
            time: attach_time,
        });
        let child = self.allocate(node);
        self.insert_child(id, attach_time, child);
        TrajectoryId(child)
    }

    /// Detaches `id` from its parent and returns it as an independent tree.
    /// The fork-point sample is materialized as the detached root's first
    /// own entry, so the result is self-contained and never empty.
    ///
    /// Handles into the detached subtree are invalidated; use the returned
    /// tree's [`TrajectoryTree::root`] and fresh forks instead.
    ///
    /// # Panics
    ///
    /// Panics if `id` designates the root.
    pub fn detach_fork(&mut self, id: TrajectoryId) -> TrajectoryTree {
        let fork = self
            .node(id)
            .parent
            .expect("cannot detach the root of a trajectory tree");
        let fork_dof = self
            .find_sample(id, fork.time)
            .expect("fork point sample must exist in the effective history");
        self.node_mut(TrajectoryId(fork.parent))
            .children
            .retain(|&child| child != id.0);

        // Move the subtree, preorder, into a fresh arena.
        let old_slots = self.collect_subtree(id.0);
        let mut remap = BTreeMap::new();
        for (new_slot, &old_slot) in old_slots.iter().enumerate() {
            remap.insert(old_slot, new_slot);
        }
        let mut nodes = Vec::with_capacity(old_slots.len());
        for &old_slot in &old_slots {
            let mut node = self.nodes[old_slot]
                .take()
                .expect("subtree slot must be occupied");
            self.free_slots.push(old_slot);
            if let Some(parent_fork) = node.parent.as_mut() {
                if let Some(&new_parent) = remap.get(&parent_fork.parent) {
                    parent_fork.parent = new_parent;
                }
            }
            for child in node.children.iter_mut() {
                *child = remap[&*child];
            }
            nodes.push(Some(node));
        }
        let mut detached = TrajectoryTree {
            nodes,
            free_slots: Vec::new(),
            root: 0,
        };
        let root = detached.nodes[0]
            .as_mut()
            .expect("detached root must be occupied");
        root.parent = None;
        root.timeline.insert(fork.time, fork_dof);
        detached
    }

    /// Slots of the subtree rooted at `slot`, in preorder.
    fn collect_subtree(&self, slot: usize) -> Vec<usize> {
        let mut slots = Vec::new();
        let mut stack = vec![slot];
        while let Some(current) = stack.pop() {
            slots.push(current);
            let node = self.nodes[current]
                .as_ref()
                .expect("subtree slot must be occupied");
            stack.extend(node.children.iter().rev().copied());
        }
        slots
    }

    fn destroy_subtree(&mut self, slot: usize) {
        for doomed in self.collect_subtree(slot) {
            self.nodes[doomed] = None;
            self.free_slots.push(doomed);
        }
    }

    /// Drops this node's samples strictly after `time` and destroys its
    /// children forked strictly after `time`, along with their subtrees.
    /// Branches forked at or before `time` are left untouched.
    ///
    /// # Panics
    ///
    /// Panics if `time` is before this node's own fork point.
    pub fn forget_after(&mut self, id: TrajectoryId, time: Epoch) {
        if let Some(fork) = self.node(id).parent {
            assert!(
                time >= fork.time,
                "cannot forget across this node's own fork point"
            );
        }
        let doomed: Vec<usize> = self
            .node(id)
            .children
            .iter()
            .copied()
            .filter(|&child| {
                self.nodes[child]
                    .as_ref()
                    .expect("child slot must be occupied")
                    .parent
                    .expect("child must have a parent")
                    .time
                    > time
            })
            .collect();
        for child in doomed {
            self.destroy_subtree(child);
        }
        let surviving: Vec<usize> = self
            .node(id)
            .children
            .iter()
            .copied()
            .filter(|&child| self.nodes[child].is_some())
            .collect();
        self.node_mut(id).children = surviving;

        let node = self.node_mut(id);
        let mut removed = node.timeline.split_off(&time);
        if let Some(kept) = removed.remove(&time) {
            node.timeline.insert(time, kept);
        }
        if let Some(downsampling) = node.downsampling.as_mut() {
            downsampling.forget_after(time);
        }
    }

    /// Drops the root's samples strictly before `time`.
    ///
    /// Fails with [`ApsisError::ForkBeforeHorizon`] — removing nothing — if
    /// any descendant is forked strictly before `time`.
    pub fn forget_before(&mut self, time: Epoch) -> Result<(), ApsisError> {
        for slot in self.occupied_slots() {
            if let Some(fork) = self.nodes[slot].as_ref().and_then(|node| node.parent) {
                if fork.time < time {
                    return Err(ApsisError::ForkBeforeHorizon {
                        time,
                        fork_time: fork.time,
                    });
                }
            }
        }
        let root = self.root;
        let node = self.node_mut(TrajectoryId(root));
        node.timeline = node.timeline.split_off(&time);
        if let Some(downsampling) = node.downsampling.as_mut() {
            downsampling.forget_before(time);
        }
        Ok(())
    }

    pub(crate) fn occupied_slots(&self) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|&slot| self.nodes[slot].is_some())
            .collect()
    }

    /// The exact sample at `time` in the effective history, if present.
    pub fn find_sample(&self, id: TrajectoryId, time: Epoch) -> Option<DegreesOfFreedom> {
        for (slot, clip) in self.chain(id) {
            if clip.is_some_and(|c| time > c) {
                continue;
            }
            if let Some(dof) = self.nodes[slot]
                .as_ref()
                .expect("trajectory handle is stale")
                .timeline
                .get(&time)
            {
                return Some(*dof);
            }
        }
        None
    }

    /// Greatest sample at or before `time` in the effective history.
    fn bracket_below(&self, id: TrajectoryId, time: Epoch) -> Option<(Epoch, DegreesOfFreedom)> {
        for (slot, clip) in self.chain(id).into_iter().rev() {
            let limit = match clip {
                Some(c) => c.min(time),
                None => time,
            };
            if let Some((t, dof)) = self.nodes[slot]
                .as_ref()
                .expect("trajectory handle is stale")
                .timeline
                .range((Bound::Unbounded, Bound::Included(limit)))
                .next_back()
            {
                return Some((*t, *dof));
            }
        }
        None
    }

    /// Least sample strictly after `time` in the effective history.
    fn bracket_above(&self, id: TrajectoryId, time: Epoch) -> Option<(Epoch, DegreesOfFreedom)> {
        for (slot, clip) in self.chain(id) {
            let upper = match clip {
                Some(c) if c <= time => continue,
                Some(c) => Bound::Included(c),
                None => Bound::Unbounded,
            };
            if let Some((t, dof)) = self.nodes[slot]
                .as_ref()
                .expect("trajectory handle is stale")
                .timeline
                .range((Bound::Excluded(time), upper))
                .next()
            {
                return Some((*t, *dof));
            }
        }
        None
    }

    /// Interpolated degrees of freedom at `time`.
    ///
    /// Exact at sample times; cubic Hermite between the bracketing samples
    /// elsewhere; [`ApsisError::OutOfRange`] outside `[t_min, t_max]` (an
    /// empty trajectory reports a horizon collapsed onto the query time).
    pub fn evaluate_degrees_of_freedom(
        &self,
        id: TrajectoryId,
        time: Epoch,
    ) -> Result<DegreesOfFreedom, ApsisError> {
        let (t_min, t_max) = match (self.t_min(id), self.t_max(id)) {
            (Some(t_min), Some(t_max)) => (t_min, t_max),
            _ => {
                return Err(ApsisError::OutOfRange {
                    time,
                    t_min: time,
                    t_max: time,
                })
            }
        };
        if time < t_min || time > t_max {
            return Err(ApsisError::OutOfRange { time, t_min, t_max });
        }
        if let Some(exact) = self.find_sample(id, time) {
            return Ok(exact);
        }
        let (t0, dof0) = self
            .bracket_below(id, time)
            .expect("a sample at or before an in-range time must exist");
        let (t1, dof1) = self
            .bracket_above(id, time)
            .expect("a sample after an in-range non-grid time must exist");
        Ok(Hermite3::new(t0, &dof0, t1, &dof1).evaluate(time))
    }

    /// Interpolated position at `time`; see
    /// [`Self::evaluate_degrees_of_freedom`].
    pub fn evaluate_position(&self, id: TrajectoryId, time: Epoch) -> Result<Position, ApsisError> {
        Ok(self.evaluate_degrees_of_freedom(id, time)?.position)
    }

    /// Interpolated velocity at `time`; see
    /// [`Self::evaluate_degrees_of_freedom`].
    pub fn evaluate_velocity(&self, id: TrajectoryId, time: Epoch) -> Result<Velocity, ApsisError> {
        Ok(self.evaluate_degrees_of_freedom(id, time)?.velocity)
    }

    /// Enables downsampling on a fork-free tree.
    ///
    /// Appends routed through the dense buffer may later erase interior
    /// samples, keeping every interpolated position within the configured
    /// tolerance of the erased ones. The latest existing sample, if any,
    /// seeds the buffer.
    pub fn set_downsampling(
        &mut self,
        parameters: DownsamplingParameters,
    ) -> Result<(), ApsisError> {
        let root = self.root;
        let node = self.node_mut(TrajectoryId(root));
        if !node.children.is_empty() {
            return Err(ApsisError::InvalidParameters(
                "downsampling requires a fork-free trajectory".into(),
            ));
        }
        if node.downsampling.is_some() {
            return Err(ApsisError::InvalidParameters(
                "the trajectory is already downsampling".into(),
            ));
        }
        let mut downsampling = Downsampling::new(parameters);
        if let Some((&last, _)) = node.timeline.last_key_value() {
            downsampling.append(last);
        }
        node.downsampling = Some(downsampling);
        Ok(())
    }

    /// Discards the downsampling state; subsequent appends are retained
    /// unconditionally.
    pub fn clear_downsampling(&mut self) {
        let root = self.root;
        self.node_mut(TrajectoryId(root)).downsampling = None;
    }

    /// The configured downsampling parameters, if enabled.
    pub fn downsampling_parameters(&self) -> Option<DownsamplingParameters> {
        self.node(TrajectoryId(self.root))
            .downsampling
            .as_ref()
            .map(|downsampling| downsampling.parameters())
    }
}

/// Double-ended lazy iterator over an effective history; see
/// [`TrajectoryTree::iter`].
pub struct TrajectoryIterator<'a> {
    segments: VecDeque<btree_map::Range<'a, Epoch, DegreesOfFreedom>>,
}

impl Iterator for TrajectoryIterator<'_> {
    type Item = (Epoch, DegreesOfFreedom);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let front = self.segments.front_mut()?;
            if let Some((t, dof)) = front.next() {
                return Some((*t, *dof));
            }
            self.segments.pop_front();
        }
    }
}

impl DoubleEndedIterator for TrajectoryIterator<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        loop {
            let back = self.segments.back_mut()?;
            if let Some((t, dof)) = back.next_back() {
                return Some((*t, *dof));
            }
            self.segments.pop_back();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use itertools::Itertools;
    use nalgebra::Vector3;

    fn epoch(seconds: f64) -> Epoch {
        Epoch::from_tai_seconds(seconds)
    }

    /// A recognizable sample: position encodes the tag, velocity is fixed.
    fn dof(tag: f64) -> DegreesOfFreedom {
        DegreesOfFreedom::new(Vector3::new(tag, 2.0 * tag, -tag), Vector3::new(1.0, 0.0, 0.0))
    }

    fn history(tree: &TrajectoryTree, id: TrajectoryId) -> Vec<(Epoch, DegreesOfFreedom)> {
        tree.iter(id).collect()
    }

    #[test]
    fn test_append_and_iterate() {
        let mut tree = TrajectoryTree::new();
        let root = tree.root();
        for i in 0..5 {
            tree.append(root, epoch(i as f64), dof(i as f64)).unwrap();
        }
        let all = history(&tree, root);
        assert_eq!(all.len(), 5);
        assert!(all.iter().tuple_windows().all(|(a, b)| a.0 < b.0));
        assert_eq!(all[3].1, dof(3.0));
        assert_eq!(tree.t_min(root), Some(epoch(0.0)));
        assert_eq!(tree.t_max(root), Some(epoch(4.0)));
    }

    #[test]
    fn test_out_of_order_append_leaves_timeline_unchanged() {
        let mut tree = TrajectoryTree::new();
        let root = tree.root();
        tree.append(root, epoch(10.0), dof(1.0)).unwrap();
        let before = history(&tree, root);

        let err = tree.append(root, epoch(10.0), dof(2.0)).unwrap_err();
        assert!(matches!(err, ApsisError::OutOfOrderAppend { .. }));
        let err = tree.append(root, epoch(3.0), dof(3.0)).unwrap_err();
        assert!(matches!(err, ApsisError::OutOfOrderAppend { .. }));

        assert_eq!(history(&tree, root), before);
    }

    #[test]
    fn test_fork_shares_history_up_to_fork_point() {
        let mut tree = TrajectoryTree::new();
        let root = tree.root();
        for i in 0..4 {
            tree.append(root, epoch(i as f64), dof(i as f64)).unwrap();
        }
        let child = tree.new_fork_without_copy(root, epoch(2.0));

        // Every prefix of the shared history is visible from the child.
        let child_history = history(&tree, child);
        let parent_prefix: Vec<_> = tree
            .iter(root)
            .take_while(|(t, _)| *t <= epoch(2.0))
            .collect();
        assert_eq!(child_history, parent_prefix);

        // Appends to the child are invisible to the parent and vice versa.
        tree.append(child, epoch(2.5), dof(25.0)).unwrap();
        tree.append(root, epoch(4.0), dof(4.0)).unwrap();
        assert!(history(&tree, root).iter().all(|(t, _)| *t != epoch(2.5)));
        assert!(history(&tree, child).iter().all(|(t, _)| *t != epoch(3.0)));
        assert_eq!(tree.t_max(child), Some(epoch(2.5)));
    }

    #[test]
    fn test_fork_with_copy_duplicates_later_points() {
        let mut tree = TrajectoryTree::new();
        let root = tree.root();
        for i in 0..4 {
            tree.append(root, epoch(i as f64), dof(i as f64)).unwrap();
        }
        let child = tree.new_fork_with_copy(root, epoch(1.0));

        // The child initially replicates the parent's full history.
        assert_eq!(history(&tree, child), history(&tree, root));

        // Rewriting the parent's tail does not affect the child's copy.
        tree.forget_after(root, epoch(1.0));
        tree.append(root, epoch(2.0), dof(-2.0)).unwrap();
        let child_at_2 = tree.find_sample(child, epoch(2.0)).unwrap();
        assert_eq!(child_at_2, dof(2.0));
        let parent_at_2 = tree.find_sample(root, epoch(2.0)).unwrap();
        assert_eq!(parent_at_2, dof(-2.0));
    }

    #[test]
    fn test_fork_at_last_continues_history() {
        let mut tree = TrajectoryTree::new();
        let root = tree.root();
        for i in 0..3 {
            tree.append(root, epoch(i as f64), dof(i as f64)).unwrap();
        }
        let child = tree.new_fork_at_last(root);
        assert_eq!(tree.fork_time(child), Some(epoch(2.0)));
        tree.append(child, epoch(3.0), dof(30.0)).unwrap();
        assert_eq!(history(&tree, child).len(), 4);
    }

    #[test]
    fn test_nested_forks_chain_correctly() {
        let mut tree = TrajectoryTree::new();
        let root = tree.root();
        for i in 0..3 {
            tree.append(root, epoch(i as f64), dof(i as f64)).unwrap();
        }
        let child = tree.new_fork_without_copy(root, epoch(1.0));
        tree.append(child, epoch(1.5), dof(15.0)).unwrap();
        tree.append(child, epoch(2.5), dof(25.0)).unwrap();
        let grandchild = tree.new_fork_without_copy(child, epoch(1.5));
        tree.append(grandchild, epoch(1.75), dof(175.0)).unwrap();

        let times: Vec<f64> = tree
            .iter(grandchild)
            .map(|(t, _)| (t - epoch(0.0)).to_seconds())
            .collect();
        assert_eq!(times, vec![0.0, 1.0, 1.5, 1.75]);
        // Bidirectional walk agrees with the forward one.
        let backward: Vec<_> = tree.iter(grandchild).rev().collect();
        let mut forward: Vec<_> = tree.iter(grandchild).collect();
        forward.reverse();
        assert_eq!(backward, forward);
    }

    #[test]
    #[should_panic(expected = "fork time must be one of the trajectory's sample times")]
    fn test_fork_at_missing_time_panics() {
        let mut tree = TrajectoryTree::new();
        let root = tree.root();
        tree.append(root, epoch(0.0), dof(0.0)).unwrap();
        tree.new_fork_without_copy(root, epoch(0.5));
    }

    #[test]
    fn test_detach_then_attach_is_identity_on_history() {
        let mut tree = TrajectoryTree::new();
        let root = tree.root();
        for i in 0..3 {
            tree.append(root, epoch(i as f64), dof(i as f64)).unwrap();
        }
        let child = tree.new_fork_at_last(root);
        tree.append(child, epoch(3.0), dof(3.0)).unwrap();
        tree.append(child, epoch(4.0), dof(4.0)).unwrap();
        let original = history(&tree, child);

        let detached = tree.detach_fork(child);
        // The detached root is self-contained: it owns the fork sample.
        assert_eq!(detached.timeline_len(detached.root()), 3);
        assert_eq!(
            history(&detached, detached.root()),
            original[2..].to_vec()
        );

        let reattached = tree.attach_fork(root, detached);
        assert_eq!(history(&tree, reattached), original);
        assert_eq!(tree.fork_time(reattached), Some(epoch(2.0)));
    }

    #[test]
    fn test_forget_after_then_reappend_restores_history() {
        let mut tree = TrajectoryTree::new();
        let root = tree.root();
        for i in 0..6 {
            tree.append(root, epoch(i as f64), dof(i as f64)).unwrap();
        }
        let original = history(&tree, root);

        tree.forget_after(root, epoch(2.0));
        assert_eq!(tree.t_max(root), Some(epoch(2.0)));
        for i in 3..6 {
            tree.append(root, epoch(i as f64), dof(i as f64)).unwrap();
        }
        assert_eq!(history(&tree, root), original);
    }

    #[test]
    fn test_forget_after_destroys_later_forks_only() {
        let mut tree = TrajectoryTree::new();
        let root = tree.root();
        for i in 0..5 {
            tree.append(root, epoch(i as f64), dof(i as f64)).unwrap();
        }
        let early = tree.new_fork_without_copy(root, epoch(1.0));
        tree.append(early, epoch(10.0), dof(10.0)).unwrap();
        let late = tree.new_fork_without_copy(root, epoch(3.0));
        tree.append(late, epoch(11.0), dof(11.0)).unwrap();

        tree.forget_after(root, epoch(2.0));

        // The early branch survives, its own data untouched.
        assert_eq!(tree.t_max(early), Some(epoch(10.0)));
        assert_eq!(tree.node(root).children.len(), 1);
    }

    #[test]
    fn test_forget_before_respects_fork_horizon() {
        let mut tree = TrajectoryTree::new();
        let root = tree.root();
        for i in 0..5 {
            tree.append(root, epoch(i as f64), dof(i as f64)).unwrap();
        }
        let child = tree.new_fork_without_copy(root, epoch(2.0));
        let before = history(&tree, root);

        let err = tree.forget_before(epoch(3.0)).unwrap_err();
        assert!(matches!(err, ApsisError::ForkBeforeHorizon { .. }));
        assert_eq!(history(&tree, root), before);

        tree.forget_before(epoch(2.0)).unwrap();
        assert_eq!(tree.t_min(root), Some(epoch(2.0)));
        // The child still sees the fork sample as its first point.
        assert_eq!(tree.t_min(child), Some(epoch(2.0)));
    }

    #[test]
    fn test_evaluate_interpolates_and_range_checks() {
        let mut tree = TrajectoryTree::new();
        let root = tree.root();
        // Uniform linear motion: x = t, v = 1.
        for i in 0..4 {
            let t = i as f64;
            tree.append(
                root,
                epoch(t),
                DegreesOfFreedom::new(Vector3::new(t, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0)),
            )
            .unwrap();
        }

        // Exact sample.
        let p = tree.evaluate_position(root, epoch(2.0)).unwrap();
        assert_relative_eq!(p.x, 2.0);
        // Interpolated between samples: linear motion is reproduced exactly
        // by the Hermite cubic.
        let p = tree.evaluate_position(root, epoch(1.25)).unwrap();
        assert_relative_eq!(p.x, 1.25, epsilon = 1e-12);
        let v = tree.evaluate_velocity(root, epoch(2.75)).unwrap();
        assert_relative_eq!(v.x, 1.0, epsilon = 1e-12);

        for t in [-0.5, 3.5] {
            let err = tree.evaluate_position(root, epoch(t)).unwrap_err();
            assert!(matches!(err, ApsisError::OutOfRange { .. }));
        }
    }

    #[test]
    fn test_evaluate_across_fork_boundary() {
        let mut tree = TrajectoryTree::new();
        let root = tree.root();
        for i in 0..3 {
            let t = i as f64;
            tree.append(
                root,
                epoch(t),
                DegreesOfFreedom::new(Vector3::new(t, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0)),
            )
            .unwrap();
        }
        let child = tree.new_fork_without_copy(root, epoch(2.0));
        tree.append(
            child,
            epoch(3.0),
            DegreesOfFreedom::new(Vector3::new(3.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0)),
        )
        .unwrap();

        // The bracketing pair straddles the fork point: lower sample owned
        // by the parent, upper by the child.
        let p = tree.evaluate_position(child, epoch(2.5)).unwrap();
        assert_relative_eq!(p.x, 2.5, epsilon = 1e-12);
    }

    #[test]
    fn test_iterators_remain_valid_across_appends_to_other_branches() {
        let mut tree = TrajectoryTree::new();
        let root = tree.root();
        for i in 0..3 {
            tree.append(root, epoch(i as f64), dof(i as f64)).unwrap();
        }
        let child_a = tree.new_fork_at_last(root);
        let child_b = tree.new_fork_at_last(root);
        tree.append(child_b, epoch(5.0), dof(5.0)).unwrap();

        // Reading child_a's history after mutating child_b.
        assert_eq!(history(&tree, child_a).len(), 3);
        assert_eq!(history(&tree, child_b).len(), 4);
    }
}
