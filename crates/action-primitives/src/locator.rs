use action_locator::{LocatorError, NodeLocator, NodeQuery};
use shelver_core_types::NodeId;
use std::sync::Arc;

/// Check yielding the node `query` resolves to under `root`, once it exists
/// and is attached. With `exclude` set, that node never counts; the check
/// waits for another match instead.
pub fn element_present(
    locator: Arc<dyn NodeLocator>,
    root: NodeId,
    query: NodeQuery,
    exclude: Option<NodeId>,
) -> impl Fn() -> Result<Option<NodeId>, LocatorError> + Send + Sync + 'static {
    move || match exclude {
        None => Ok(locator
            .resolve(root, &query)?
            .filter(|node| locator.is_attached(*node))),
        Some(stale) => Ok(locator
            .resolve_all(root, &query)?
            .into_iter()
            .find(|node| *node != stale && locator.is_attached(*node))),
    }
}

/// Check yielding `()` once `query` no longer resolves to an attached node.
pub fn element_absent(
    locator: Arc<dyn NodeLocator>,
    root: NodeId,
    query: NodeQuery,
) -> impl Fn() -> Result<Option<()>, LocatorError> + Send + Sync + 'static {
    move || match locator.resolve(root, &query)? {
        Some(node) if locator.is_attached(node) => Ok(None),
        _ => Ok(Some(())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_locator::DefaultNodeLocator;
    use shelver_tree_memory::{ElementSpec, MemoryTree};

    #[test]
    fn test_presence_checks_track_the_tree() {
        let tree = MemoryTree::new();
        let locator: Arc<dyn NodeLocator> = Arc::new(DefaultNodeLocator::new(tree.clone()));
        let present = element_present(
            locator.clone(),
            tree.document(),
            NodeQuery::id("dialog"),
            None,
        );
        let absent = element_absent(locator, tree.document(), NodeQuery::id("dialog"));

        assert_eq!(present().unwrap(), None);
        assert_eq!(absent().unwrap(), Some(()));

        let dialog = tree
            .append(tree.document(), ElementSpec::new("div").id("dialog"))
            .unwrap();
        assert_eq!(present().unwrap(), Some(dialog));
        assert_eq!(absent().unwrap(), None);

        tree.remove(dialog).unwrap();
        assert_eq!(present().unwrap(), None);
        assert_eq!(absent().unwrap(), Some(()));
    }

    #[test]
    fn test_excluded_node_never_satisfies_presence() {
        let tree = MemoryTree::new();
        let locator: Arc<dyn NodeLocator> = Arc::new(DefaultNodeLocator::new(tree.clone()));
        let stale = tree
            .append(tree.document(), ElementSpec::new("div").id("dialog"))
            .unwrap();
        let fresh = element_present(
            locator,
            tree.document(),
            NodeQuery::id("dialog"),
            Some(stale),
        );

        assert_eq!(fresh().unwrap(), None);
        let replacement = tree
            .append(tree.document(), ElementSpec::new("div").id("dialog"))
            .unwrap();
        assert_eq!(fresh().unwrap(), Some(replacement));

        tree.remove(replacement).unwrap();
        assert_eq!(fresh().unwrap(), None);
    }
}
