//! Shared primitives for the Shelver tree host boundary.
//!
//! Everything the sequencing crates need to talk to a live document lives
//! here: opaque node handles, mutation records and the [`TreeHost`] trait a
//! concrete tree (browser bridge, in-memory double) implements.

mod selector;

use std::fmt;

use thiserror::Error;
use tokio::sync::mpsc;

pub use selector::{AttributeMatch, ElementLike, Selector, SelectorError};

/// Errors reported by a tree host.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The node is no longer part of the document.
    #[error("node {0} is detached from the document")]
    Detached(NodeId),

    /// The host cannot service requests at all (page gone, bridge closed).
    #[error("tree host unavailable: {0}")]
    Unavailable(String),
}

impl HostError {
    /// Whether the error makes every further host call pointless.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HostError::Unavailable(_))
    }
}

/// Opaque handle to a node owned by the host tree.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Registration handle returned by [`TreeHost::observe`].
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ObserverId(pub u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MutationKind {
    /// Children were inserted or removed.
    ChildList,

    /// An attribute (including `class`) changed.
    Attributes,

    /// Text content changed.
    CharacterData,
}

/// A single change observed under a watched subtree.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MutationRecord {
    pub target: NodeId,
    pub kind: MutationKind,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

impl MutationRecord {
    pub fn child_list(target: NodeId, added: Vec<NodeId>, removed: Vec<NodeId>) -> Self {
        Self {
            target,
            kind: MutationKind::ChildList,
            added,
            removed,
        }
    }

    pub fn attributes(target: NodeId) -> Self {
        Self {
            target,
            kind: MutationKind::Attributes,
            added: Vec::new(),
            removed: Vec::new(),
        }
    }

    pub fn character_data(target: NodeId) -> Self {
        Self {
            target,
            kind: MutationKind::CharacterData,
            added: Vec::new(),
            removed: Vec::new(),
        }
    }
}

/// Changes the host coalesced into one notification.
///
/// Hosts may fold any number of individual changes made within one
/// scheduling turn into a single batch; consumers must never assume one
/// batch per change.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MutationBatch {
    pub records: Vec<MutationRecord>,
}

impl MutationBatch {
    pub fn new(records: Vec<MutationRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Channel end a host pushes mutation batches into.
pub type BatchSender = mpsc::UnboundedSender<MutationBatch>;

/// Capability the core needs from a live document.
///
/// Implementations own the tree; the core only borrows node handles and
/// never creates or destroys nodes. Query results are snapshots: mutating
/// the tree afterwards must not change a vector already returned.
pub trait TreeHost: Send + Sync {
    /// Document root, the default scope for queries and watches.
    fn root(&self) -> NodeId;

    /// Descendants of `scope` matching `selector`, in document order.
    /// `scope` itself is never part of the result.
    fn query_selector_all(&self, scope: NodeId, selector: &Selector)
        -> Result<Vec<NodeId>, HostError>;

    /// First descendant of `scope` (or `scope` itself) whose `id` equals `id`.
    fn get_element_by_id(&self, scope: NodeId, id: &str) -> Result<Option<NodeId>, HostError>;

    /// Concatenated text of the node and its descendants, untrimmed.
    fn text_content(&self, node: NodeId) -> Result<String, HostError>;

    /// Whether the node is still reachable from the document root.
    fn is_attached(&self, node: NodeId) -> bool;

    /// Simulate a user activation (click) on the node.
    fn activate(&self, node: NodeId) -> Result<(), HostError>;

    /// Start delivering mutation batches for the subtree rooted at `root`.
    fn observe(&self, root: NodeId, sink: BatchSender) -> Result<ObserverId, HostError>;

    /// Stop delivering batches to `observer`. Unknown ids are ignored.
    fn disconnect(&self, observer: ObserverId);
}
