//! HTTP/2 stream priority tree and egress scheduler
//!
//! This crate implements the stream dependency tree of RFC 7540 Section 5.3
//! and the scheduling decision built on it: at every egress opportunity,
//! which streams of a connection should send next and in what proportion.
//!
//! ## Features
//!
//! - **Dependency tree**: insertion, removal, reparenting (ordinary and
//!   exclusive), and weight updates with incremental re-normalization
//! - **Egress projection**: per-node bookkeeping of which subtrees have
//!   pending data, so signal propagation is O(depth) and scheduling never
//!   touches idle branches
//! - **Weighted scheduling**: [`PriorityTree::next_egress`] returns the
//!   topmost enqueued frontier with shares proportional to the RFC 7540
//!   weights along each path
//! - **Virtual nodes**: closed streams can be retained as placeholders so
//!   late PRIORITY references still resolve, bounded by a count limit and a
//!   timed expiry driven through the [`WheelTimer`] seam
//! - **Traversal**: depth-first and level-order iteration with an
//!   early-stop predicate, for diagnostics and ordered enumeration
//!
//! The tree is a pure in-memory structure: frame parsing, flow control and
//! the transport are external collaborators. It is owned by one connection
//! and runs on that connection's event loop; it performs no locking and no
//! blocking.
//!
//! # Examples
//!
//! ```
//! use h2_priority::{PrioritySpec, PriorityTree};
//!
//! let mut tree: PriorityTree<u32> = PriorityTree::new();
//!
//! // stream 1 depends on the root, stream 3 depends on stream 1
//! let h1 = tree.add_transaction(1, PrioritySpec::new(0, false, 15), Some(1), false)?;
//! let h3 = tree.add_transaction(3, PrioritySpec::new(1, false, 7), Some(3), false)?;
//!
//! tree.signal_pending_egress(h1)?;
//! tree.signal_pending_egress(h3)?;
//!
//! // stream 1 shadows its subtree: it alone is scheduled
//! let next = tree.next_egress();
//! assert_eq!(next, vec![(1, 1.0)]);
//!
//! tree.clear_pending_egress(h1)?;
//! assert_eq!(tree.next_egress(), vec![(3, 1.0)]);
//! # Ok::<(), h2_priority::Error>(())
//! ```

pub mod error;
pub(crate) mod node;
pub mod timer;
pub mod tree;
pub mod types;

pub use error::{Error, Result};
pub use timer::{ManualTimer, WheelTimer};
pub use tree::PriorityTree;
pub use types::{Handle, PrioritySpec, StreamId};

use std::time::Duration;

/// Stream ID 0 roots the dependency tree (RFC 7540 Section 5.3.1)
pub const ROOT_STREAM_ID: StreamId = 0;

/// Default priority weight in wire form; stored as 16 (RFC 7540 Section 5.3.5)
pub const DEFAULT_PRIORITY_WEIGHT: u8 = 15;

/// Largest stored weight (wire weight 255 plus one)
pub const MAX_STORED_WEIGHT: u16 = 256;

/// Default retention period for virtual nodes
pub const DEFAULT_NODE_LIFETIME: Duration = Duration::from_secs(30);
