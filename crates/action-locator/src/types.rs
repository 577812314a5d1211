//! Core data types for the locator

use serde::{Deserialize, Serialize};
use shelver_core_types::Selector;
use std::fmt;

use crate::errors::LocatorError;

/// Locator strategy enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocatorStrategy {
    /// Structural selector matching (tag/class/id/attribute)
    Structural,

    /// Exact trimmed text matching
    Text,
}

impl LocatorStrategy {
    /// Get strategy name as string
    pub fn name(&self) -> &'static str {
        match self {
            LocatorStrategy::Structural => "structural",
            LocatorStrategy::Text => "text",
        }
    }
}

/// Predicate a node must satisfy to be returned by a lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodePredicate {
    /// Match by selector
    Structural(Selector),

    /// Match nodes selected by `scope` whose trimmed text equals `text`
    Text { scope: Selector, text: String },
}

impl NodePredicate {
    /// Parse a structural predicate from selector text
    pub fn selector(selector: &str) -> Result<Self, LocatorError> {
        Ok(NodePredicate::Structural(Selector::parse(selector)?))
    }

    /// Exact-text predicate over every element
    pub fn text(text: impl Into<String>) -> Self {
        NodePredicate::Text {
            scope: Selector::universal(),
            text: text.into(),
        }
    }

    /// Exact-text predicate restricted to nodes matching `scope`
    pub fn scoped_text(scope: Selector, text: impl Into<String>) -> Self {
        NodePredicate::Text {
            scope,
            text: text.into(),
        }
    }

    pub fn strategy(&self) -> LocatorStrategy {
        match self {
            NodePredicate::Structural(_) => LocatorStrategy::Structural,
            NodePredicate::Text { .. } => LocatorStrategy::Text,
        }
    }
}

impl fmt::Display for NodePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodePredicate::Structural(selector) => write!(f, "{}", selector),
            NodePredicate::Text { scope, text } => write!(f, "{} with text {:?}", scope, text),
        }
    }
}

/// Query resolving to at most one node
///
/// Configured as `{ id = "gs_lbd_apl" }` or `{ selector = "div.gs_md_wn" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeQuery {
    /// Identity lookup (`getElementById`)
    Id(String),

    /// First node matching the selector in document order
    Selector(Selector),
}

impl NodeQuery {
    pub fn id(id: impl Into<String>) -> Self {
        NodeQuery::Id(id.into())
    }

    pub fn selector(selector: &str) -> Result<Self, LocatorError> {
        Ok(NodeQuery::Selector(Selector::parse(selector)?))
    }
}

impl fmt::Display for NodeQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeQuery::Id(id) => write!(f, "#{}", id),
            NodeQuery::Selector(selector) => write!(f, "{}", selector),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicate_strategy() {
        assert_eq!(
            NodePredicate::selector("a.gs_in_cb").unwrap().strategy(),
            LocatorStrategy::Structural
        );
        assert_eq!(NodePredicate::text("X").strategy(), LocatorStrategy::Text);
        assert_eq!(LocatorStrategy::Text.name(), "text");
    }

    #[test]
    fn test_invalid_selector_is_rejected() {
        assert!(matches!(
            NodePredicate::selector("div > a"),
            Err(LocatorError::InvalidSelector(_))
        ));
        assert!(NodeQuery::selector("").is_err());
    }

    #[test]
    fn test_node_query_from_json() {
        let by_id: NodeQuery = serde_json::from_str(r#"{"id":"gs_lbd_apl"}"#).unwrap();
        assert_eq!(by_id, NodeQuery::id("gs_lbd_apl"));

        let by_selector: NodeQuery =
            serde_json::from_str(r#"{"selector":"div#gs_md_albl-d"}"#).unwrap();
        assert_eq!(by_selector.to_string(), "div#gs_md_albl-d");

        assert!(serde_json::from_str::<NodeQuery>(r#"{"selector":"a b"}"#).is_err());
    }
}
