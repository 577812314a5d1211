//! In-memory tree host.
//!
//! [`MemoryTree`] implements [`TreeHost`] over a plain node arena. It is the
//! double the sequencing crates are tested against: activations can be
//! scripted with [`MemoryTree::on_activate`] to open and close overlays, and
//! [`MemoryTree::transaction`] coalesces several edits into one mutation
//! batch the way a browser does within a scheduling turn.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use shelver_core_types::{
    BatchSender, ElementLike, HostError, MutationBatch, MutationRecord, NodeId, ObserverId,
    Selector, TreeHost,
};
use tracing::{debug, trace};

/// Scripted host behaviour run after a node is activated.
pub type Reaction = Arc<dyn Fn(&Arc<MemoryTree>, NodeId) + Send + Sync>;

/// Declarative description of an element subtree to insert.
#[derive(Clone, Debug)]
pub struct ElementSpec {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: String,
    children: Vec<ElementSpec>,
}

impl ElementSpec {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attributes: BTreeMap::new(),
            text: String::new(),
            children: Vec::new(),
        }
    }

    pub fn id(self, id: impl Into<String>) -> Self {
        self.attr("id", id)
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        let class = class.into();
        self.attributes
            .entry("class".to_string())
            .and_modify(|existing| {
                existing.push(' ');
                existing.push_str(&class);
            })
            .or_insert(class);
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn child(mut self, child: ElementSpec) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = ElementSpec>) -> Self {
        self.children.extend(children);
        self
    }
}

struct NodeData {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl ElementLike for NodeData {
    fn tag_name(&self) -> &str {
        &self.tag
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

struct ObserverEntry {
    root: NodeId,
    sink: BatchSender,
}

struct TreeState {
    document: NodeId,
    nodes: HashMap<NodeId, NodeData>,
    next_node: u64,
    next_observer: u64,
    observers: HashMap<ObserverId, ObserverEntry>,
    reactions: HashMap<NodeId, Reaction>,
    activations: Vec<NodeId>,
    pending: Vec<MutationRecord>,
    transaction_depth: usize,
    available: bool,
}

impl TreeState {
    fn check_available(&self) -> Result<(), HostError> {
        if self.available {
            Ok(())
        } else {
            Err(HostError::Unavailable("memory tree marked unavailable".to_string()))
        }
    }

    fn node(&self, id: NodeId) -> Result<&NodeData, HostError> {
        self.nodes.get(&id).ok_or(HostError::Detached(id))
    }

    fn is_attached(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node_id) = current {
            if node_id == self.document {
                return true;
            }
            current = self.nodes.get(&node_id).and_then(|node| node.parent);
        }
        false
    }

    fn attached(&self, id: NodeId) -> Result<&NodeData, HostError> {
        let node = self.node(id)?;
        if self.is_attached(id) {
            Ok(node)
        } else {
            Err(HostError::Detached(id))
        }
    }

    fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(node_id) = current {
            if node_id == ancestor {
                return true;
            }
            current = self.nodes.get(&node_id).and_then(|node| node.parent);
        }
        false
    }

    fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = match self.nodes.get(&scope) {
            Some(node) => node.children.iter().rev().copied().collect(),
            None => return out,
        };
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(node) = self.nodes.get(&id) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    fn insert(&mut self, parent: Option<NodeId>, spec: ElementSpec) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        self.nodes.insert(
            id,
            NodeData {
                tag: spec.tag,
                attributes: spec.attributes,
                text: spec.text,
                parent,
                children: Vec::new(),
            },
        );
        for child in spec.children {
            let child_id = self.insert(Some(id), child);
            if let Some(node) = self.nodes.get_mut(&id) {
                node.children.push(child_id);
            }
        }
        id
    }

    fn record(&mut self, record: MutationRecord) {
        self.pending.push(record);
        if self.transaction_depth == 0 {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let records = std::mem::take(&mut self.pending);
        for (observer, entry) in &self.observers {
            let relevant: Vec<MutationRecord> = records
                .iter()
                .filter(|record| self.contains(entry.root, record.target))
                .cloned()
                .collect();
            if relevant.is_empty() {
                continue;
            }
            trace!(observer = %observer, records = relevant.len(), "delivering mutation batch");
            // A closed receiver means the watch side already let go.
            let _ = entry.sink.send(MutationBatch::new(relevant));
        }
    }
}

/// Arena-backed document implementing [`TreeHost`].
pub struct MemoryTree {
    me: Weak<MemoryTree>,
    state: Mutex<TreeState>,
}

impl MemoryTree {
    /// Create an empty document whose root is a `#document` node.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| {
            let mut state = TreeState {
                document: NodeId(0),
                nodes: HashMap::new(),
                next_node: 0,
                next_observer: 1,
                observers: HashMap::new(),
                reactions: HashMap::new(),
                activations: Vec::new(),
                pending: Vec::new(),
                transaction_depth: 0,
                available: true,
            };
            state.document = state.insert(None, ElementSpec::new("#document"));
            Self {
                me: me.clone(),
                state: Mutex::new(state),
            }
        })
    }

    pub fn document(&self) -> NodeId {
        self.state.lock().document
    }

    /// Insert `spec` (and its children) as the last child of `parent`.
    pub fn append(&self, parent: NodeId, spec: ElementSpec) -> Result<NodeId, HostError> {
        let mut state = self.state.lock();
        state.check_available()?;
        state.node(parent)?;
        let id = state.insert(Some(parent), spec);
        if let Some(node) = state.nodes.get_mut(&parent) {
            node.children.push(id);
        }
        state.record(MutationRecord::child_list(parent, vec![id], Vec::new()));
        Ok(id)
    }

    /// Detach `node` from its parent. The node stays readable but is no
    /// longer attached to the document.
    pub fn remove(&self, node: NodeId) -> Result<(), HostError> {
        let mut state = self.state.lock();
        state.check_available()?;
        let parent = state.node(node)?.parent.ok_or(HostError::Detached(node))?;
        if let Some(parent_node) = state.nodes.get_mut(&parent) {
            parent_node.children.retain(|child| *child != node);
        }
        if let Some(removed) = state.nodes.get_mut(&node) {
            removed.parent = None;
        }
        state.record(MutationRecord::child_list(parent, Vec::new(), vec![node]));
        Ok(())
    }

    pub fn set_text(&self, node: NodeId, text: impl Into<String>) -> Result<(), HostError> {
        let mut state = self.state.lock();
        state.check_available()?;
        state.node(node)?;
        if let Some(data) = state.nodes.get_mut(&node) {
            data.text = text.into();
        }
        state.record(MutationRecord::character_data(node));
        Ok(())
    }

    pub fn set_attribute(
        &self,
        node: NodeId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), HostError> {
        let mut state = self.state.lock();
        state.check_available()?;
        state.node(node)?;
        if let Some(data) = state.nodes.get_mut(&node) {
            data.attributes
                .insert(name.into().to_ascii_lowercase(), value.into());
        }
        state.record(MutationRecord::attributes(node));
        Ok(())
    }

    /// Run `edits` with batch delivery held back, then deliver everything
    /// recorded meanwhile as one batch per observer.
    pub fn transaction<R>(&self, edits: impl FnOnce(&MemoryTree) -> R) -> R {
        self.state.lock().transaction_depth += 1;
        let result = edits(self);
        let mut state = self.state.lock();
        state.transaction_depth -= 1;
        if state.transaction_depth == 0 {
            state.flush();
        }
        result
    }

    /// Script what the host does when `node` is activated.
    pub fn on_activate<F>(&self, node: NodeId, reaction: F)
    where
        F: Fn(&Arc<MemoryTree>, NodeId) + Send + Sync + 'static,
    {
        self.state.lock().reactions.insert(node, Arc::new(reaction));
    }

    /// Every successful activation so far, in order.
    pub fn activations(&self) -> Vec<NodeId> {
        self.state.lock().activations.clone()
    }

    pub fn activation_count(&self, node: NodeId) -> usize {
        self.state
            .lock()
            .activations
            .iter()
            .filter(|id| **id == node)
            .count()
    }

    /// Observers currently registered, i.e. live subscriptions.
    pub fn observer_count(&self) -> usize {
        self.state.lock().observers.len()
    }

    /// Simulate the host going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.state.lock().available = available;
    }
}

impl TreeHost for MemoryTree {
    fn root(&self) -> NodeId {
        self.document()
    }

    fn query_selector_all(
        &self,
        scope: NodeId,
        selector: &Selector,
    ) -> Result<Vec<NodeId>, HostError> {
        let state = self.state.lock();
        state.check_available()?;
        state.attached(scope)?;
        Ok(state
            .descendants(scope)
            .into_iter()
            .filter(|id| {
                state
                    .nodes
                    .get(id)
                    .map(|node| selector.matches(node))
                    .unwrap_or(false)
            })
            .collect())
    }

    fn get_element_by_id(&self, scope: NodeId, id: &str) -> Result<Option<NodeId>, HostError> {
        let state = self.state.lock();
        state.check_available()?;
        let scope_node = state.attached(scope)?;
        if scope_node.attribute("id") == Some(id) {
            return Ok(Some(scope));
        }
        Ok(state.descendants(scope).into_iter().find(|node_id| {
            state
                .nodes
                .get(node_id)
                .and_then(|node| node.attribute("id"))
                == Some(id)
        }))
    }

    fn text_content(&self, node: NodeId) -> Result<String, HostError> {
        let state = self.state.lock();
        state.check_available()?;
        let mut text = state.node(node)?.text.clone();
        for id in state.descendants(node) {
            if let Some(data) = state.nodes.get(&id) {
                text.push_str(&data.text);
            }
        }
        Ok(text)
    }

    fn is_attached(&self, node: NodeId) -> bool {
        self.state.lock().is_attached(node)
    }

    fn activate(&self, node: NodeId) -> Result<(), HostError> {
        let reaction = {
            let mut state = self.state.lock();
            state.check_available()?;
            state.attached(node)?;
            state.activations.push(node);
            state.reactions.get(&node).cloned()
        };
        debug!(node = %node, scripted = reaction.is_some(), "node activated");
        if let (Some(reaction), Some(me)) = (reaction, self.me.upgrade()) {
            reaction(&me, node);
        }
        Ok(())
    }

    fn observe(&self, root: NodeId, sink: BatchSender) -> Result<ObserverId, HostError> {
        let mut state = self.state.lock();
        state.check_available()?;
        state.node(root)?;
        let id = ObserverId(state.next_observer);
        state.next_observer += 1;
        state.observers.insert(id, ObserverEntry { root, sink });
        Ok(id)
    }

    fn disconnect(&self, observer: ObserverId) {
        self.state.lock().observers.remove(&observer);
    }
}
