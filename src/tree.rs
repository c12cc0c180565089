//! HTTP/2 priority tree and egress scheduler
//!
//! This module implements the stream dependency tree defined in RFC 7540
//! Section 5.3 together with the scheduling decision built on top of it:
//! which streams should write next, and in what proportion.
//!
//! The tree is mutated by the codec and transaction layer (add, remove,
//! reparent, weight update) and queried by the transport whenever the wire
//! becomes writable. Alongside the dependency tree proper, every node
//! maintains an egress projection: the ordered set of children whose subtree
//! has pending egress, plus their summed weight. Signals propagate along the
//! parent chain in O(depth), and [`PriorityTree::next_egress`] only ever
//! walks the parts of the tree that have data to send.
//!
//! Streams whose transaction has finished can be retained as virtual nodes
//! so that late PRIORITY references to them still resolve. Retention is
//! bounded both by a per-node lifetime (enforced through the injected
//! [`WheelTimer`]) and by a maximum count with least-recently-refreshed
//! eviction.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::node::{scaled_weight, Node};
use crate::timer::WheelTimer;
use crate::types::{Handle, PrioritySpec, StreamId};
use crate::{DEFAULT_NODE_LIFETIME, DEFAULT_PRIORITY_WEIGHT, ROOT_STREAM_ID};

/// Stream dependency tree and egress scheduler for one HTTP/2 connection
///
/// `T` is the caller's transaction handle; the tree stores it opaquely and
/// hands clones back from [`PriorityTree::next_egress`]. The tree is owned
/// by a single connection and is not synchronized; callers on other threads
/// must serialize access themselves.
pub struct PriorityTree<T> {
    /// Every node in the tree, keyed by stream id; id 0 is the root
    nodes: HashMap<StreamId, Node<T>>,
    /// Number of nodes with `enqueued == true`
    pending_egress_count: usize,
    /// Number of reclaimable virtual nodes (excludes permanent anchors)
    virtual_count: usize,
    /// Reclaimable virtual nodes, least recently refreshed first
    virtual_lru: VecDeque<StreamId>,
    /// Upper bound on `virtual_count`
    max_virtual_nodes: usize,
    /// Retention period for virtual nodes; zero disables retention
    node_lifetime: Duration,
    /// Wakeup scheduling seam; retention requires one
    timer: Option<Rc<dyn WheelTimer>>,
}

impl<T> PriorityTree<T> {
    /// Create a tree without a timer; removed transactions are spliced out
    /// immediately instead of being retained as virtual nodes
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a tree that retains virtual nodes, using `timer` for expiry
    pub fn with_timer(timer: Rc<dyn WheelTimer>) -> Self {
        Self::build(Some(timer))
    }

    fn build(timer: Option<Rc<dyn WheelTimer>>) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            ROOT_STREAM_ID,
            Node::new(ROOT_STREAM_ID, DEFAULT_PRIORITY_WEIGHT, None, false),
        );
        PriorityTree {
            nodes,
            pending_egress_count: 0,
            virtual_count: 0,
            virtual_lru: VecDeque::new(),
            max_virtual_nodes: usize::MAX,
            node_lifetime: DEFAULT_NODE_LIFETIME,
            timer,
        }
    }

    // ---- configuration ----

    /// Bound the number of reclaimable virtual nodes, evicting the least
    /// recently refreshed ones if the tree is already over the new limit
    pub fn set_max_virtual_nodes(&mut self, max: usize) {
        self.max_virtual_nodes = max;
        while self.virtual_count > max {
            let Some(&oldest) = self.virtual_lru.front() else {
                break;
            };
            self.splice_out(oldest);
        }
    }

    /// Set the retention period for virtual nodes; zero disables retention
    pub fn set_node_lifetime(&mut self, lifetime: Duration) {
        self.node_lifetime = lifetime;
        if !self.retention_enabled() {
            return;
        }
        // virtual nodes created while retention was off have no deadline yet
        let unstamped: Vec<StreamId> = self
            .virtual_lru
            .iter()
            .copied()
            .filter(|&id| self.node(id).expiry.is_none())
            .collect();
        for id in unstamped {
            self.stamp_expiry(id);
        }
    }

    // ---- observers ----

    /// True iff only the root exists
    pub fn empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Number of streams with pending egress
    pub fn num_pending_egress(&self) -> usize {
        self.pending_egress_count
    }

    /// Number of reclaimable virtual nodes
    pub fn num_virtual_nodes(&self) -> usize {
        self.virtual_count
    }

    /// Is `id` present in the tree (live or virtual)?
    pub fn contains(&self, id: StreamId) -> bool {
        id != ROOT_STREAM_ID && self.nodes.contains_key(&id)
    }

    // ---- mutators ----

    /// Insert a stream into the tree
    ///
    /// `txn` is the owning transaction; passing `None` creates a
    /// priority-only (virtual) node. If `id` already exists as a virtual
    /// node, the transaction is attached to it and `spec` is applied as a
    /// priority update. An unknown dependency is materialized as an implicit
    /// virtual parent with the default weight under the root.
    ///
    /// Permanent priority nodes (`txn == None`, `permanent == true`) never
    /// expire, are not counted against the virtual node limit, and survive
    /// [`PriorityTree::drop_priority_nodes`].
    pub fn add_transaction(
        &mut self,
        id: StreamId,
        spec: PrioritySpec,
        txn: Option<T>,
        permanent: bool,
    ) -> Result<Handle> {
        if id == ROOT_STREAM_ID {
            return Err(Error::ReservedStreamId);
        }
        if spec.stream_dependency == id {
            return Err(Error::SelfDependency(id));
        }
        debug_assert!(
            txn.is_none() || !permanent,
            "a live transaction cannot be a permanent priority node"
        );

        if self.nodes.contains_key(&id) {
            if self.node(id).txn.is_some() {
                return Err(Error::StreamExists(id));
            }
            if txn.is_some() {
                tracing::debug!(id, "promoting virtual node to live transaction");
                self.forget_virtual(id);
                let node = self.node_mut(id);
                node.txn = txn;
                node.permanent = false;
                node.expiry = None;
            }
            return self.update_priority(Handle(id), spec);
        }

        tracing::debug!(
            id,
            dep = spec.stream_dependency,
            exclusive = spec.exclusive,
            weight = spec.weight,
            virtual_node = txn.is_none(),
            "adding transaction"
        );

        let is_virtual = txn.is_none();
        let parent_id = self.resolve_dependency(spec.stream_dependency, None);
        if is_virtual && !permanent && !self.make_virtual_room(Some(parent_id)) {
            return Err(Error::VirtualNodesDisabled);
        }

        self.nodes.insert(id, Node::new(id, spec.weight, txn, permanent));
        if is_virtual && !permanent {
            self.register_virtual(id);
        }
        self.attach_to_parent(id, parent_id, spec.exclusive);
        Ok(Handle(id))
    }

    /// Remove a transaction from the tree
    ///
    /// Under retention (a timer is installed, the lifetime is non-zero and
    /// the virtual node limit is not yet reached) the node stays in place as
    /// a virtual node until its expiry. Otherwise it is spliced out: its
    /// children move up to its parent with their weights rescaled to
    /// preserve the aggregate share the node held among its siblings.
    pub fn remove_transaction(&mut self, handle: Handle) -> Result<()> {
        let id = handle.stream_id();
        if !self.contains(id) {
            return Err(Error::StreamNotFound(id));
        }
        self.clear_pending_egress(handle)?;

        let already_virtual = self.node(id).is_virtual();
        if !already_virtual
            && self.retention_enabled()
            && self.virtual_count < self.max_virtual_nodes
        {
            tracing::debug!(id, "retaining removed transaction as virtual node");
            self.node_mut(id).txn = None;
            self.register_virtual(id);
        } else {
            self.splice_out(id);
        }
        Ok(())
    }

    /// Change a stream's dependency, exclusivity and weight
    ///
    /// The four RFC 7540 Section 5.3.3 cases are handled: moving under a
    /// sibling or unrelated node, under an ancestor, under a descendant (the
    /// descendant is first lifted into this node's old slot, keeping its own
    /// weight), and the exclusive form of each. A weight-only update (same
    /// parent, non-exclusive) leaves the sibling order untouched. Updating a
    /// virtual node refreshes its expiry.
    ///
    /// The returned handle replaces the caller's stored one.
    pub fn update_priority(&mut self, handle: Handle, spec: PrioritySpec) -> Result<Handle> {
        let id = handle.stream_id();
        if !self.contains(id) {
            return Err(Error::StreamNotFound(id));
        }
        if spec.stream_dependency == id {
            return Err(Error::SelfDependency(id));
        }
        tracing::debug!(
            id,
            dep = spec.stream_dependency,
            exclusive = spec.exclusive,
            weight = spec.weight,
            "updating priority"
        );
        self.refresh_virtual(id);

        let parent_id = self
            .node(id)
            .parent
            .expect("non-root node must have a parent");

        if spec.stream_dependency == parent_id && !spec.exclusive {
            // weight-only update, sibling order is preserved
            let node = self.node_mut(id);
            let old = u64::from(node.weight);
            node.weight = spec.stored_weight();
            let new = u64::from(node.weight);
            let in_tree = node.in_egress_tree();
            let parent = self.node_mut(parent_id);
            parent.total_child_weight = parent.total_child_weight - old + new;
            if in_tree {
                parent.total_enqueued_weight = parent.total_enqueued_weight - old + new;
            }
            return Ok(handle);
        }

        let new_parent = self.resolve_dependency(spec.stream_dependency, Some(id));
        if self.is_descendant(new_parent, id) {
            // Reparenting under a descendant is a rotation, not a move: the
            // descendant is lifted into this node's old sibling slot first,
            // keeping the weight it already had. Resolving the dependency can
            // evict virtual ancestors, so re-read the parent link.
            let parent_id = self
                .node(id)
                .parent
                .expect("non-root node must have a parent");
            self.detach_from_parent(new_parent);
            self.attach_to_parent(new_parent, parent_id, false);
        }
        self.detach_from_parent(id);
        self.node_mut(id).weight = spec.stored_weight();
        self.attach_to_parent(id, new_parent, spec.exclusive);
        Ok(Handle(id))
    }

    /// Mark a stream as having pending egress data
    ///
    /// Idempotent. If the node was not yet part of the egress tree, its
    /// membership is announced up the parent chain, stopping at the first
    /// ancestor that was already in.
    pub fn signal_pending_egress(&mut self, handle: Handle) -> Result<()> {
        let id = handle.stream_id();
        if !self.contains(id) {
            return Err(Error::StreamNotFound(id));
        }
        let node = self.node_mut(id);
        debug_assert!(node.txn.is_some(), "virtual nodes cannot have egress");
        if node.txn.is_none() || node.enqueued {
            return Ok(());
        }
        let was_in_tree = node.in_egress_tree();
        node.enqueued = true;
        self.pending_egress_count += 1;
        if !was_in_tree {
            self.egress_attach_upward(id);
        }
        Ok(())
    }

    /// Mark a stream as having no pending egress data
    ///
    /// Idempotent. The node leaves the egress tree only when no descendant
    /// keeps it in.
    pub fn clear_pending_egress(&mut self, handle: Handle) -> Result<()> {
        let id = handle.stream_id();
        if !self.contains(id) {
            return Err(Error::StreamNotFound(id));
        }
        let node = self.node_mut(id);
        if !node.enqueued {
            return Ok(());
        }
        node.enqueued = false;
        self.pending_egress_count -= 1;
        if !self.node(id).in_egress_tree() {
            self.egress_detach_upward(id);
        }
        Ok(())
    }

    // ---- scheduler ----

    /// Streams that should transmit now, with their shares of the write
    /// budget
    ///
    /// The result is the topmost enqueued frontier: every enqueued stream
    /// reachable from the root along a path whose interior nodes are not
    /// themselves enqueued. Each share is the product of
    /// `weight / total enqueued weight` ratios along that path, so shares
    /// sum to 1 whenever anything is enqueued. The list is ordered by share,
    /// largest first; equal shares keep the order in which the streams
    /// entered the egress tree. Empty when nothing is enqueued.
    pub fn next_egress(&self) -> Vec<(T, f64)>
    where
        T: Clone,
    {
        let mut result = Vec::with_capacity(self.pending_egress_count);
        let mut pending = VecDeque::new();
        pending.push_back((ROOT_STREAM_ID, 1.0f64));
        while let Some((id, ratio)) = pending.pop_front() {
            let node = self.node(id);
            if node.total_enqueued_weight == 0 {
                continue;
            }
            let denominator = node.total_enqueued_weight as f64;
            for &child_id in &node.enqueued_children {
                let child = self.node(child_id);
                let share = ratio * f64::from(child.weight) / denominator;
                if child.enqueued {
                    if let Some(txn) = &child.txn {
                        result.push((txn.clone(), share));
                    }
                } else {
                    pending.push_back((child_id, share));
                }
            }
        }
        result.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        result
    }

    // ---- iterators ----

    /// Depth-first pre-order traversal
    ///
    /// The visitor receives each stream's id, its transaction (`None` for
    /// virtual nodes) and its weight relative to its siblings
    /// (`weight / parent total child weight`). The root itself is never
    /// visited. With `all == false` only enqueued streams are visited and
    /// only the egress tree is descended. Traversal stops after the visit
    /// during which `stop` first returns true.
    pub fn iterate<V, S>(&self, mut visit: V, mut stop: S, all: bool)
    where
        V: FnMut(StreamId, Option<&T>, f64),
        S: FnMut() -> bool,
    {
        self.visit_subtree(ROOT_STREAM_ID, all, &mut visit, &mut stop);
    }

    /// Level-order traversal with the same visitor contract as
    /// [`PriorityTree::iterate`]
    ///
    /// The stop predicate is evaluated between levels: a level is always
    /// visited in full.
    pub fn iterate_bfs<V, S>(&self, mut visit: V, mut stop: S, all: bool)
    where
        V: FnMut(StreamId, Option<&T>, f64),
        S: FnMut() -> bool,
    {
        let mut level = vec![ROOT_STREAM_ID];
        while !level.is_empty() {
            let mut next = Vec::new();
            for &id in &level {
                let node = self.node(id);
                let denominator = node.total_child_weight as f64;
                for &child_id in &node.children {
                    let child = self.node(child_id);
                    if !all && !child.in_egress_tree() {
                        continue;
                    }
                    if all || child.enqueued {
                        visit(
                            child.id,
                            child.txn.as_ref(),
                            f64::from(child.weight) / denominator,
                        );
                    }
                    next.push(child_id);
                }
            }
            if stop() {
                return;
            }
            level = next;
        }
    }

    fn visit_subtree<V, S>(&self, id: StreamId, all: bool, visit: &mut V, stop: &mut S) -> bool
    where
        V: FnMut(StreamId, Option<&T>, f64),
        S: FnMut() -> bool,
    {
        let node = self.node(id);
        let denominator = node.total_child_weight as f64;
        for &child_id in &node.children {
            let child = self.node(child_id);
            if !all && !child.in_egress_tree() {
                continue;
            }
            if all || child.enqueued {
                visit(
                    child.id,
                    child.txn.as_ref(),
                    f64::from(child.weight) / denominator,
                );
                if stop() {
                    return true;
                }
            }
            if self.visit_subtree(child_id, all, visit, stop) {
                return true;
            }
        }
        false
    }

    // ---- virtual node manager ----

    /// Reclaim every virtual node whose expiry has passed
    ///
    /// Called by the owner when a deadline requested through [`WheelTimer`]
    /// fires. Expiry is re-checked here, so late or spurious calls are
    /// harmless. No-op without a timer.
    pub fn expire_nodes(&mut self) {
        let Some(timer) = self.timer.clone() else {
            return;
        };
        let now = timer.now();
        while let Some(&oldest) = self.virtual_lru.front() {
            match self.node(oldest).expiry {
                Some(deadline) if deadline <= now => {
                    tracing::debug!(id = oldest, "virtual node expired");
                    self.splice_out(oldest);
                }
                _ => break,
            }
        }
        if let Some(&oldest) = self.virtual_lru.front() {
            if let Some(deadline) = self.node(oldest).expiry {
                timer.schedule(deadline);
            }
        }
    }

    /// Evict all reclaimable virtual nodes immediately
    ///
    /// Permanent priority anchors are kept.
    pub fn drop_priority_nodes(&mut self) {
        tracing::debug!(count = self.virtual_count, "dropping virtual nodes");
        while let Some(&oldest) = self.virtual_lru.front() {
            self.splice_out(oldest);
        }
    }

    fn retention_enabled(&self) -> bool {
        self.timer.is_some() && !self.node_lifetime.is_zero()
    }

    /// Enter a node into the reclaimable virtual bookkeeping
    fn register_virtual(&mut self, id: StreamId) {
        self.virtual_count += 1;
        self.virtual_lru.push_back(id);
        if self.retention_enabled() {
            self.stamp_expiry(id);
        }
    }

    /// Drop a node from the reclaimable virtual bookkeeping, if present
    fn forget_virtual(&mut self, id: StreamId) {
        let node = self.node(id);
        if !node.is_virtual() || node.permanent {
            return;
        }
        if let Some(pos) = self.virtual_lru.iter().position(|&v| v == id) {
            self.virtual_lru.remove(pos);
            self.virtual_count -= 1;
        }
    }

    /// Push a virtual node's expiry out by one lifetime and move it to the
    /// recently-refreshed end of the eviction order
    fn refresh_virtual(&mut self, id: StreamId) {
        let node = self.node(id);
        if !node.is_virtual() || node.permanent {
            return;
        }
        if let Some(pos) = self.virtual_lru.iter().position(|&v| v == id) {
            self.virtual_lru.remove(pos);
            self.virtual_lru.push_back(id);
        }
        if self.retention_enabled() {
            self.stamp_expiry(id);
        }
    }

    fn stamp_expiry(&mut self, id: StreamId) {
        let Some(timer) = self.timer.clone() else {
            return;
        };
        let deadline = timer.now() + self.node_lifetime;
        self.node_mut(id).expiry = Some(deadline);
        timer.schedule(deadline);
    }

    /// Make room for one more reclaimable virtual node, evicting the least
    /// recently refreshed ones. Returns false when no room can be made.
    fn make_virtual_room(&mut self, protected: Option<StreamId>) -> bool {
        while self.virtual_count >= self.max_virtual_nodes {
            let Some(&oldest) = self.virtual_lru.front() else {
                return false;
            };
            if Some(oldest) == protected {
                if self.virtual_lru.len() == 1 {
                    return false;
                }
                // the protected node was just touched; it belongs at the
                // recently-refreshed end anyway
                self.virtual_lru.rotate_left(1);
                continue;
            }
            tracing::debug!(id = oldest, "evicting virtual node");
            self.splice_out(oldest);
        }
        true
    }

    /// Resolve a dependency id to a parent node, creating an implicit
    /// virtual parent under the root when the id is unknown. Touching an
    /// existing virtual node refreshes its expiry.
    fn resolve_dependency(&mut self, dep: StreamId, protected: Option<StreamId>) -> StreamId {
        if dep == ROOT_STREAM_ID {
            return ROOT_STREAM_ID;
        }
        if self.nodes.contains_key(&dep) {
            self.refresh_virtual(dep);
            return dep;
        }
        if !self.make_virtual_room(protected) {
            tracing::debug!(dep, "virtual nodes disabled, attaching under root");
            return ROOT_STREAM_ID;
        }
        tracing::debug!(dep, "creating implicit virtual parent");
        self.nodes
            .insert(dep, Node::new(dep, DEFAULT_PRIORITY_WEIGHT, None, false));
        self.register_virtual(dep);
        self.attach_to_parent(dep, ROOT_STREAM_ID, false);
        dep
    }

    // ---- tree plumbing ----

    fn node(&self, id: StreamId) -> &Node<T> {
        self.nodes.get(&id).expect("dangling stream id in tree")
    }

    fn node_mut(&mut self, id: StreamId) -> &mut Node<T> {
        self.nodes.get_mut(&id).expect("dangling stream id in tree")
    }

    /// Is `id` strictly below `ancestor`?
    fn is_descendant(&self, mut id: StreamId, ancestor: StreamId) -> bool {
        while let Some(parent) = self.node(id).parent {
            if parent == ancestor {
                return true;
            }
            id = parent;
        }
        false
    }

    /// Unlink a node from its parent, maintaining both the child list and
    /// the egress projection
    fn detach_from_parent(&mut self, id: StreamId) {
        if self.node(id).in_egress_tree() {
            self.egress_detach_upward(id);
        }
        let node = self.node(id);
        let weight = u64::from(node.weight);
        let parent_id = node.parent.expect("cannot detach the root");
        let parent = self.node_mut(parent_id);
        parent.remove_child(id);
        parent.total_child_weight -= weight;
        self.node_mut(id).parent = None;
    }

    /// Link a detached node under `parent_id`
    ///
    /// Exclusive insertion makes the node the sole child: the parent's
    /// former children become children of the node, appended after its
    /// existing ones in their prior sibling order.
    fn attach_to_parent(&mut self, id: StreamId, parent_id: StreamId, exclusive: bool) {
        if exclusive {
            let displaced = std::mem::take(&mut self.node_mut(parent_id).children);
            self.attach_plain(id, parent_id);
            for child in displaced {
                self.move_child(child, parent_id, id);
            }
        } else {
            self.attach_plain(id, parent_id);
        }
    }

    fn attach_plain(&mut self, id: StreamId, parent_id: StreamId) {
        let node = self.node(id);
        let weight = u64::from(node.weight);
        let in_tree = node.in_egress_tree();
        let parent = self.node_mut(parent_id);
        parent.children.push(id);
        parent.total_child_weight += weight;
        self.node_mut(id).parent = Some(parent_id);
        if in_tree {
            self.egress_attach_upward(id);
        }
    }

    /// Move `id` from `from` (whose child list has already been drained) to
    /// the end of `to`'s children
    fn move_child(&mut self, id: StreamId, from: StreamId, to: StreamId) {
        let in_tree = self.node(id).in_egress_tree();
        if in_tree {
            self.egress_detach_upward(id);
        }
        let weight = u64::from(self.node(id).weight);
        self.node_mut(from).total_child_weight -= weight;
        let target = self.node_mut(to);
        target.children.push(id);
        target.total_child_weight += weight;
        self.node_mut(id).parent = Some(to);
        if in_tree {
            self.egress_attach_upward(id);
        }
    }

    /// Remove a node, reparenting its children to its parent with rescaled
    /// weights (appended in their existing order)
    fn splice_out(&mut self, id: StreamId) {
        let node = self.node(id);
        debug_assert!(!node.enqueued, "spliced node must not be enqueued");
        let parent_id = node.parent.expect("cannot splice out the root");
        let node_weight = u64::from(node.weight);
        let ratio = if node.total_child_weight == 0 {
            1.0
        } else {
            node_weight as f64 / node.total_child_weight as f64
        };
        tracing::debug!(id, "splicing node out of the tree");

        let children = std::mem::take(&mut self.node_mut(id).children);
        for &child_id in &children {
            let in_tree = self.node(child_id).in_egress_tree();
            if in_tree {
                self.egress_detach_upward(child_id);
            }
            let new_weight = scaled_weight(self.node(child_id).weight, ratio);
            self.node_mut(child_id).weight = new_weight;
            self.node_mut(child_id).parent = Some(parent_id);
            let parent = self.node_mut(parent_id);
            parent.children.push(child_id);
            parent.total_child_weight += u64::from(new_weight);
            if in_tree {
                self.egress_attach_upward(child_id);
            }
        }

        // moving the children out also cascaded this node's own egress
        // projection entry away
        debug_assert!(!self.node(id).in_egress_tree());
        let parent = self.node_mut(parent_id);
        parent.remove_child(id);
        parent.total_child_weight -= node_weight;
        self.forget_virtual(id);
        self.nodes.remove(&id);
    }

    // ---- egress projection ----

    /// `child_id` just entered the egress tree: record it in its parent's
    /// projection and announce newly entered ancestors up to the root
    fn egress_attach_upward(&mut self, mut child_id: StreamId) {
        loop {
            let Some(parent_id) = self.node(child_id).parent else {
                return;
            };
            let weight = u64::from(self.node(child_id).weight);
            let parent = self.node_mut(parent_id);
            let was_in_tree = parent.in_egress_tree();
            parent.enqueued_children.push(child_id);
            parent.total_enqueued_weight += weight;
            if was_in_tree {
                return;
            }
            child_id = parent_id;
        }
    }

    /// `child_id` just left the egress tree: drop it from its parent's
    /// projection, cascading for each ancestor that drops out with it
    fn egress_detach_upward(&mut self, mut child_id: StreamId) {
        loop {
            let Some(parent_id) = self.node(child_id).parent else {
                return;
            };
            let weight = u64::from(self.node(child_id).weight);
            let parent = self.node_mut(parent_id);
            parent.remove_enqueued_child(child_id);
            parent.total_enqueued_weight -= weight;
            if parent.in_egress_tree() {
                return;
            }
            child_id = parent_id;
        }
    }
}

impl<T> Default for PriorityTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for PriorityTree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityTree")
            .field("nodes", &self.nodes.len())
            .field("pending_egress", &self.pending_egress_count)
            .field("virtual_nodes", &self.virtual_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(dep: StreamId, exclusive: bool, weight: u8) -> PrioritySpec {
        PrioritySpec::new(dep, exclusive, weight)
    }

    #[test]
    fn test_new_tree_is_empty() {
        let tree: PriorityTree<u32> = PriorityTree::new();
        assert!(tree.empty());
        assert_eq!(tree.num_pending_egress(), 0);
        assert_eq!(tree.num_virtual_nodes(), 0);
        assert!(tree.next_egress().is_empty());
    }

    #[test]
    fn test_add_remove_round_trip() {
        let mut tree: PriorityTree<u32> = PriorityTree::new();
        let h = tree.add_transaction(1, spec(0, false, 15), Some(1), false).unwrap();
        assert!(!tree.empty());
        tree.remove_transaction(h).unwrap();
        assert!(tree.empty());
    }

    #[test]
    fn test_self_dependency_rejected() {
        let mut tree: PriorityTree<u32> = PriorityTree::new();
        let result = tree.add_transaction(5, spec(5, false, 15), Some(5), false);
        assert!(matches!(result, Err(Error::SelfDependency(5))));
    }

    #[test]
    fn test_duplicate_live_stream_rejected() {
        let mut tree: PriorityTree<u32> = PriorityTree::new();
        tree.add_transaction(1, spec(0, false, 15), Some(1), false).unwrap();
        let result = tree.add_transaction(1, spec(0, false, 15), Some(1), false);
        assert!(matches!(result, Err(Error::StreamExists(1))));
    }

    #[test]
    fn test_root_id_rejected() {
        let mut tree: PriorityTree<u32> = PriorityTree::new();
        let result = tree.add_transaction(0, spec(1, false, 15), Some(0), false);
        assert!(matches!(result, Err(Error::ReservedStreamId)));
    }

    #[test]
    fn test_signal_and_clear_are_idempotent() {
        let mut tree: PriorityTree<u32> = PriorityTree::new();
        let h = tree.add_transaction(1, spec(0, false, 15), Some(1), false).unwrap();

        tree.signal_pending_egress(h).unwrap();
        tree.signal_pending_egress(h).unwrap();
        assert_eq!(tree.num_pending_egress(), 1);

        tree.clear_pending_egress(h).unwrap();
        tree.clear_pending_egress(h).unwrap();
        assert_eq!(tree.num_pending_egress(), 0);
        assert!(tree.next_egress().is_empty());
    }

    #[test]
    fn test_weight_only_update_keeps_sibling_order() {
        let mut tree: PriorityTree<u32> = PriorityTree::new();
        let _h1 = tree.add_transaction(1, spec(0, false, 7), Some(1), false).unwrap();
        let h3 = tree.add_transaction(3, spec(0, false, 7), Some(3), false).unwrap();
        let _h5 = tree.add_transaction(5, spec(0, false, 7), Some(5), false).unwrap();

        tree.update_priority(h3, spec(0, false, 23)).unwrap();

        let mut order = Vec::new();
        tree.iterate(|id, _, _| order.push(id), || false, true);
        assert_eq!(order, vec![1, 3, 5]);
    }

    #[test]
    fn test_next_egress_shares_sum_to_one() {
        let mut tree: PriorityTree<u32> = PriorityTree::new();
        for (id, dep, weight) in [(1, 0, 15), (3, 1, 3), (5, 1, 3), (7, 1, 7), (9, 5, 7)] {
            let h = tree.add_transaction(id, spec(dep, false, weight), Some(id), false).unwrap();
            tree.signal_pending_egress(h).unwrap();
        }
        let sum: f64 = tree.next_egress().iter().map(|(_, share)| share).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_dependency_creates_virtual_parent() {
        let mut tree: PriorityTree<u32> = PriorityTree::new();
        tree.add_transaction(11, spec(75, false, 15), Some(11), false).unwrap();
        assert!(tree.contains(75));
        assert_eq!(tree.num_virtual_nodes(), 1);
    }
}
