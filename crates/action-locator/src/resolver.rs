//! Node resolution against a tree host

use crate::{
    errors::{absorb_detached, LocatorError},
    types::*,
};
use shelver_core_types::{HostError, NodeId, Selector, TreeHost};
use std::sync::Arc;
use tracing::{debug, trace};

/// Node locator trait
///
/// Lookups are synchronous and side-effect free. A root or candidate that
/// detaches while a lookup runs simply drops out of the result; only an
/// unavailable host is an error.
pub trait NodeLocator: Send + Sync {
    /// All nodes under `root` satisfying `predicate`, in document order
    fn find(&self, root: NodeId, predicate: &NodePredicate) -> Result<Vec<NodeId>, LocatorError>;

    /// Identity lookup under `root` (inclusive)
    fn find_by_id(&self, root: NodeId, id: &str) -> Result<Option<NodeId>, LocatorError>;

    /// Trimmed text content, `None` once the node has left the tree
    fn text(&self, node: NodeId) -> Result<Option<String>, LocatorError>;

    /// Whether the node is still attached to the document
    fn is_attached(&self, node: NodeId) -> bool;

    /// First match of `predicate`
    fn find_first(
        &self,
        root: NodeId,
        predicate: &NodePredicate,
    ) -> Result<Option<NodeId>, LocatorError> {
        Ok(self.find(root, predicate)?.into_iter().next())
    }

    /// Nodes matching `scope` whose trimmed text equals `text`
    fn find_by_text(
        &self,
        root: NodeId,
        scope: &Selector,
        text: &str,
    ) -> Result<Vec<NodeId>, LocatorError> {
        self.find(root, &NodePredicate::scoped_text(scope.clone(), text))
    }

    /// Resolve a single-node query
    fn resolve(&self, root: NodeId, query: &NodeQuery) -> Result<Option<NodeId>, LocatorError> {
        match query {
            NodeQuery::Id(id) => self.find_by_id(root, id),
            NodeQuery::Selector(selector) => {
                self.find_first(root, &NodePredicate::Structural(selector.clone()))
            }
        }
    }

    /// Every node `query` matches under `root`, in document order.
    ///
    /// Unlike [`resolve`](Self::resolve) this sees duplicates, e.g. a new
    /// dialog opened next to an old one carrying the same id.
    fn resolve_all(&self, root: NodeId, query: &NodeQuery) -> Result<Vec<NodeId>, LocatorError> {
        match query {
            NodeQuery::Id(id) => {
                let mut nodes = Vec::new();
                if self.find_by_id(root, id)? == Some(root) {
                    nodes.push(root);
                }
                nodes.extend(self.find(root, &NodePredicate::Structural(Selector::id(id.clone())))?);
                Ok(nodes)
            }
            NodeQuery::Selector(selector) => {
                self.find(root, &NodePredicate::Structural(selector.clone()))
            }
        }
    }
}

/// Default locator backed by a [`TreeHost`]
#[derive(Clone)]
pub struct DefaultNodeLocator {
    host: Arc<dyn TreeHost>,
}

impl DefaultNodeLocator {
    /// Create a locator over `host`
    pub fn new(host: Arc<dyn TreeHost>) -> Self {
        Self { host }
    }

    /// Get reference to the tree host
    pub fn host(&self) -> &Arc<dyn TreeHost> {
        &self.host
    }

    fn query(&self, root: NodeId, selector: &Selector) -> Result<Vec<NodeId>, LocatorError> {
        match self.host.query_selector_all(root, selector) {
            Ok(nodes) => Ok(nodes),
            Err(err) => {
                trace!(root = %root, selector = %selector, error = %err, "query absorbed");
                absorb_detached(err).map(|_| Vec::new())
            }
        }
    }
}

impl NodeLocator for DefaultNodeLocator {
    fn find(&self, root: NodeId, predicate: &NodePredicate) -> Result<Vec<NodeId>, LocatorError> {
        let found = match predicate {
            NodePredicate::Structural(selector) => self.query(root, selector)?,
            NodePredicate::Text { scope, text } => {
                // The candidate list is a snapshot; nodes that detach while we
                // read their text are skipped.
                let mut matched = Vec::new();
                for node in self.query(root, scope)? {
                    if self.text(node)?.as_deref() == Some(text.as_str()) {
                        matched.push(node);
                    }
                }
                matched
            }
        };
        debug!(
            root = %root,
            strategy = predicate.strategy().name(),
            predicate = %predicate,
            matches = found.len(),
            "locator lookup"
        );
        Ok(found)
    }

    fn find_by_id(&self, root: NodeId, id: &str) -> Result<Option<NodeId>, LocatorError> {
        match self.host.get_element_by_id(root, id) {
            Ok(found) => Ok(found),
            Err(err) => absorb_detached(err).map(|_| None),
        }
    }

    fn text(&self, node: NodeId) -> Result<Option<String>, LocatorError> {
        if !self.host.is_attached(node) {
            return Ok(None);
        }
        match self.host.text_content(node) {
            Ok(text) => Ok(Some(text.trim().to_string())),
            Err(HostError::Detached(_)) => Ok(None),
            Err(HostError::Unavailable(reason)) => Err(LocatorError::HostUnavailable(reason)),
        }
    }

    fn is_attached(&self, node: NodeId) -> bool {
        self.host.is_attached(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelver_tree_memory::{ElementSpec, MemoryTree};

    fn overlay(labels: &[&str]) -> ElementSpec {
        ElementSpec::new("div").id("gs_md_albl-d").children(
            labels
                .iter()
                .map(|label| {
                    ElementSpec::new("a")
                        .class("gs_cb_gen")
                        .class("gs_in_cb")
                        .class("gs_in_cbb")
                        .child(ElementSpec::new("span").text(format!("  {}\n", label)))
                })
                .chain(std::iter::once(
                    ElementSpec::new("button").id("gs_lbd_apl").text("Done"),
                )),
        )
    }

    fn setup(labels: &[&str]) -> (Arc<MemoryTree>, DefaultNodeLocator, NodeId) {
        let tree = MemoryTree::new();
        let node = tree.append(tree.document(), overlay(labels)).unwrap();
        let locator = DefaultNodeLocator::new(tree.clone());
        (tree, locator, node)
    }

    #[test]
    fn test_structural_lookup() {
        let (_tree, locator, overlay) = setup(&["X", "Y"]);
        let options = locator
            .find(overlay, &NodePredicate::selector("a.gs_in_cb").unwrap())
            .unwrap();
        assert_eq!(options.len(), 2);
    }

    #[test]
    fn test_text_lookup_trims_and_matches_exactly() {
        let (tree, locator, overlay) = setup(&["affective lit review", "affective"]);
        let scope = Selector::parse("a.gs_cb_gen").unwrap();

        let found = locator
            .find_by_text(overlay, &scope, "affective lit review")
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(
            tree.text_content(found[0]).unwrap().trim(),
            "affective lit review"
        );

        assert!(locator
            .find_by_text(overlay, &scope, "affective lit")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_empty_result_is_not_an_error() {
        let (tree, locator, _overlay) = setup(&[]);
        let found = locator
            .find(tree.document(), &NodePredicate::text("nothing here"))
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_resolve_queries() {
        let (tree, locator, overlay) = setup(&["X"]);
        let confirm = locator
            .resolve(overlay, &NodeQuery::id("gs_lbd_apl"))
            .unwrap()
            .unwrap();
        assert_eq!(locator.text(confirm).unwrap().as_deref(), Some("Done"));

        let container = locator
            .resolve(
                tree.document(),
                &NodeQuery::selector("div#gs_md_albl-d").unwrap(),
            )
            .unwrap();
        assert_eq!(container, Some(overlay));
    }

    #[test]
    fn test_resolve_all_sees_duplicate_ids() {
        let (tree, locator, first) = setup(&["X"]);
        let second = tree.append(tree.document(), overlay(&["Y"])).unwrap();
        let query = NodeQuery::id("gs_md_albl-d");

        assert_eq!(
            locator.resolve(tree.document(), &query).unwrap(),
            Some(first)
        );
        assert_eq!(
            locator.resolve_all(tree.document(), &query).unwrap(),
            vec![first, second]
        );
        assert_eq!(locator.resolve_all(first, &query).unwrap(), vec![first]);
    }

    #[test]
    fn test_detached_root_yields_nothing() {
        let (tree, locator, overlay) = setup(&["X"]);
        tree.remove(overlay).unwrap();

        assert!(locator
            .find(overlay, &NodePredicate::selector("a").unwrap())
            .unwrap()
            .is_empty());
        assert_eq!(locator.find_by_id(overlay, "gs_lbd_apl").unwrap(), None);
        assert_eq!(locator.text(overlay).unwrap(), None);
        assert!(!locator.is_attached(overlay));
    }

    #[test]
    fn test_unavailable_host_is_reported() {
        let (tree, locator, _overlay) = setup(&["X"]);
        tree.set_available(false);
        let err = locator
            .find(tree.document(), &NodePredicate::selector("a").unwrap())
            .unwrap_err();
        assert!(matches!(err, LocatorError::HostUnavailable(_)));
    }
}
