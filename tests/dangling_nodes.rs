//! Virtual node retention tests
//!
//! These tests cover the lifecycle of nodes that outlive their transaction:
//! - retention on removal and reclaim after the configured lifetime
//! - expiry refresh when a virtual node's priority is touched
//! - the maximum virtual node count, at removal and at add time
//! - explicit drops, permanent anchors, and promotion back to a live stream
//!
//! Time is driven by a manually advanced timer, so every deadline is
//! deterministic.

use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use h2_priority::{Handle, ManualTimer, PrioritySpec, PriorityTree, StreamId, WheelTimer};

const LIFETIME: Duration = Duration::from_millis(30);

struct Fixture {
    timer: Rc<ManualTimer>,
    tree: PriorityTree<StreamId>,
    handles: HashMap<StreamId, Handle>,
}

impl Fixture {
    fn new() -> Self {
        let timer = Rc::new(ManualTimer::new());
        let mut tree = PriorityTree::with_timer(timer.clone());
        tree.set_node_lifetime(LIFETIME);
        Fixture {
            timer,
            tree,
            handles: HashMap::new(),
        }
    }

    /// Add a live transaction and mark it as having pending egress
    fn add(&mut self, id: StreamId, dep: StreamId, exclusive: bool, weight: u8) {
        let handle = self
            .tree
            .add_transaction(id, PrioritySpec::new(dep, exclusive, weight), Some(id), false)
            .unwrap();
        self.handles.insert(id, handle);
        self.tree.signal_pending_egress(handle).unwrap();
    }

    /// Add a priority-only placeholder (no transaction, no egress)
    fn add_priority_node(&mut self, id: StreamId, dep: StreamId, weight: u8) {
        let handle = self
            .tree
            .add_transaction(id, PrioritySpec::new(dep, false, weight), None, false)
            .unwrap();
        self.handles.insert(id, handle);
    }

    fn remove(&mut self, id: StreamId) {
        self.tree.remove_transaction(self.handles[&id]).unwrap();
    }

    fn update(&mut self, id: StreamId, dep: StreamId, exclusive: bool, weight: u8) {
        let handle = self
            .tree
            .update_priority(self.handles[&id], PrioritySpec::new(dep, exclusive, weight))
            .unwrap();
        self.handles.insert(id, handle);
    }

    fn dump(&self) -> Vec<(StreamId, u8)> {
        let mut nodes = Vec::new();
        self.tree.iterate(
            |id, _txn, ratio| nodes.push((id, (ratio * 100.0) as u8)),
            || false,
            true,
        );
        nodes
    }

    /// Advance the clock and run an expiry sweep
    fn expire_after(&mut self, ms: u64) {
        self.timer.advance(Duration::from_millis(ms));
        self.tree.expire_nodes();
    }
}

#[test]
fn test_removed_transaction_lingers() {
    let mut f = Fixture::new();
    f.add(1, 0, false, 15);

    f.remove(1);
    assert_eq!(f.dump(), vec![(1, 100)]);
    assert_eq!(f.tree.num_virtual_nodes(), 1);

    f.expire_after(45);
    assert_eq!(f.dump(), vec![]);
    assert!(f.tree.empty());
}

#[test]
fn test_virtual_chain_expires() {
    let mut f = Fixture::new();
    f.add_priority_node(1, 0, 15);
    f.add_priority_node(3, 1, 15);
    f.add_priority_node(5, 3, 15);

    assert_eq!(f.dump(), vec![(1, 100), (3, 100), (5, 100)]);

    // one sweep past the deadline reclaims the whole chain
    f.expire_after(45);
    assert_eq!(f.dump(), vec![]);
    assert!(f.tree.empty());
}

#[test]
fn test_drop_priority_nodes() {
    let mut f = Fixture::new();
    f.add_priority_node(1, 0, 15);
    f.add_priority_node(3, 0, 15);
    f.add_priority_node(5, 1, 15);

    assert_eq!(f.dump(), vec![(1, 50), (5, 100), (3, 50)]);

    f.tree.drop_priority_nodes();
    assert_eq!(f.dump(), vec![]);
    assert_eq!(f.tree.num_virtual_nodes(), 0);
}

#[test]
fn test_refresh_extends_lifetime() {
    let mut f = Fixture::new();
    f.add(1, 0, false, 15);
    f.add(3, 0, false, 15);

    // 1 is now virtual
    f.remove(1);
    assert_eq!(f.dump(), vec![(1, 50), (3, 50)]);

    // before 1 times out, change its priority; this refreshes the expiry
    f.timer.advance(Duration::from_millis(20));
    f.update(1, 0, false, 3);
    assert_eq!(f.dump(), vec![(1, 20), (3, 80)]);

    // past the original deadline, but not the refreshed one
    f.expire_after(25);
    assert_eq!(f.dump(), vec![(1, 20), (3, 80)]);

    f.expire_after(45);
    assert_eq!(f.dump(), vec![(3, 100)]);
}

#[test]
fn test_max_virtual_nodes_on_removal() {
    let mut f = Fixture::new();
    f.add(1, 0, false, 15);
    f.add(3, 1, false, 3);
    f.add(5, 1, false, 3);
    f.add(7, 1, false, 7);
    f.add(9, 5, false, 7);
    f.tree.set_max_virtual_nodes(3);

    // at the cap, later removals are spliced out instead of retained
    for id in [1, 3, 5, 7, 9] {
        f.remove(id);
    }

    assert_eq!(f.tree.num_virtual_nodes(), 3);
    assert_eq!(f.dump(), vec![(1, 100), (3, 50), (5, 50)]);

    f.expire_after(45);
    assert_eq!(f.dump(), vec![]);
    assert!(f.tree.empty());
}

#[test]
fn test_lru_eviction_at_add() {
    let mut f = Fixture::new();
    f.tree.set_max_virtual_nodes(2);

    // each unknown dependency materializes a virtual parent; the third one
    // evicts the least recently refreshed (99), whose child moves up
    f.add(1, 99, false, 15);
    f.add(3, 97, false, 15);
    f.add(5, 95, false, 15);

    assert_eq!(f.tree.num_virtual_nodes(), 2);
    assert!(!f.tree.contains(99));
    assert!(f.tree.contains(97));
    assert!(f.tree.contains(95));
    assert_eq!(
        f.dump(),
        vec![(97, 33), (3, 100), (1, 33), (95, 33), (5, 100)]
    );
}

#[test]
fn test_dependency_reference_refreshes_virtual_node() {
    let mut f = Fixture::new();
    f.add(1, 0, false, 15);
    f.remove(1);

    // naming the virtual node as a dependency pushes its deadline out
    f.timer.advance(Duration::from_millis(20));
    f.add(3, 1, false, 15);

    f.expire_after(25);
    assert!(f.tree.contains(1));

    f.expire_after(45);
    assert!(!f.tree.contains(1));
    assert_eq!(f.dump(), vec![(3, 100)]);
}

#[test]
fn test_permanent_nodes_survive() {
    let mut f = Fixture::new();
    f.tree
        .add_transaction(1, PrioritySpec::new(0, false, 15), None, true)
        .unwrap();

    assert_eq!(f.tree.num_virtual_nodes(), 0);

    f.expire_after(45);
    assert_eq!(f.dump(), vec![(1, 100)]);

    f.tree.drop_priority_nodes();
    assert_eq!(f.dump(), vec![(1, 100)]);
}

#[test]
fn test_promote_virtual_node() {
    let mut f = Fixture::new();
    f.add_priority_node(1, 0, 15);
    assert_eq!(f.tree.num_virtual_nodes(), 1);

    // attaching a transaction takes the node out of retention entirely
    let handle = f
        .tree
        .add_transaction(1, PrioritySpec::new(0, false, 7), Some(1), false)
        .unwrap();
    f.tree.signal_pending_egress(handle).unwrap();

    assert_eq!(f.tree.num_virtual_nodes(), 0);
    assert_eq!(f.tree.num_pending_egress(), 1);

    f.expire_after(45);
    assert_eq!(f.dump(), vec![(1, 100)]);
}

#[test]
fn test_expiry_deadlines_are_scheduled() {
    let mut f = Fixture::new();
    f.add(1, 0, false, 15);

    let before = f.timer.scheduled().len();
    f.remove(1);
    let scheduled = f.timer.scheduled();
    assert_eq!(scheduled.len(), before + 1);
    assert_eq!(*scheduled.last().unwrap(), f.timer.now() + LIFETIME);
}

#[test]
fn test_zero_lifetime_disables_retention() {
    let mut f = Fixture::new();
    f.tree.set_node_lifetime(Duration::ZERO);

    f.add(1, 0, false, 15);
    f.remove(1);

    assert!(f.tree.empty());
    assert_eq!(f.tree.num_virtual_nodes(), 0);
}
