//! Action primitives implementation
//!
//! Four primitives the sequencer composes:
//! 1. activate - simulate a user trigger on a node
//! 2. wait_for_element - mutation-driven wait until a query resolves
//! 3. wait_for_absence - mutation-driven wait until a query stops resolving
//! 4. pause - cancellable settle delay

use action_locator::{DefaultNodeLocator, NodeLocator, NodeQuery};
use async_trait::async_trait;
use shelver_core_types::{NodeId, TreeHost};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::{
    errors::ActionError,
    locator::{element_absent, element_present},
    types::{ExecCtx, Waited},
    waiting,
};

/// Action primitives trait
#[async_trait]
pub trait ActionPrimitives: Send + Sync {
    /// Locator bound to the same host
    fn locator(&self) -> Arc<dyn NodeLocator>;

    /// Document root of the host
    fn document(&self) -> NodeId;

    /// Activate a node
    fn activate(&self, ctx: &ExecCtx, node: NodeId) -> Result<(), ActionError>;

    /// Wait until `query` resolves to an attached node under `root`
    async fn wait_for_element(
        &self,
        ctx: &ExecCtx,
        root: NodeId,
        query: &NodeQuery,
        timeout: Duration,
    ) -> Result<Waited<NodeId>, ActionError>;

    /// Wait until `query` resolves to an attached node under `root` other
    /// than `stale`
    async fn wait_for_replacement(
        &self,
        ctx: &ExecCtx,
        root: NodeId,
        query: &NodeQuery,
        stale: NodeId,
        timeout: Duration,
    ) -> Result<Waited<NodeId>, ActionError>;

    /// Wait until `query` no longer resolves under `root`
    async fn wait_for_absence(
        &self,
        ctx: &ExecCtx,
        root: NodeId,
        query: &NodeQuery,
        timeout: Duration,
    ) -> Result<Waited<()>, ActionError>;

    /// Sleep unless cancelled
    async fn pause(&self, ctx: &ExecCtx, delay: Duration) -> Result<(), ActionError>;
}

/// Default implementation of action primitives
pub struct DefaultActionPrimitives {
    /// Tree host receiving activations and watches
    host: Arc<dyn TreeHost>,

    /// Locator used by readiness checks
    locator: Arc<DefaultNodeLocator>,
}

impl DefaultActionPrimitives {
    /// Create a new primitives implementation
    pub fn new(host: Arc<dyn TreeHost>) -> Self {
        let locator = Arc::new(DefaultNodeLocator::new(host.clone()));
        Self { host, locator }
    }

    /// Get reference to the tree host
    pub fn host(&self) -> &Arc<dyn TreeHost> {
        &self.host
    }
}

#[async_trait]
impl ActionPrimitives for DefaultActionPrimitives {
    fn locator(&self) -> Arc<dyn NodeLocator> {
        self.locator.clone()
    }

    fn document(&self) -> NodeId {
        self.host.root()
    }

    fn activate(&self, ctx: &ExecCtx, node: NodeId) -> Result<(), ActionError> {
        if ctx.is_cancelled() {
            return Err(ActionError::Interrupted("Context cancelled".to_string()));
        }
        if !self.host.is_attached(node) {
            return Err(ActionError::Detached(node));
        }

        self.host.activate(node)?;

        info!(action_id = %ctx.action_id, node = %node, "Activated node");
        Ok(())
    }

    async fn wait_for_element(
        &self,
        ctx: &ExecCtx,
        root: NodeId,
        query: &NodeQuery,
        timeout: Duration,
    ) -> Result<Waited<NodeId>, ActionError> {
        debug!(action_id = %ctx.action_id, query = %query, "Waiting for element");
        let check = element_present(self.locator(), root, query.clone(), None);
        waiting::wait_for(self.host.clone(), root, check, timeout, ctx).await
    }

    async fn wait_for_replacement(
        &self,
        ctx: &ExecCtx,
        root: NodeId,
        query: &NodeQuery,
        stale: NodeId,
        timeout: Duration,
    ) -> Result<Waited<NodeId>, ActionError> {
        debug!(
            action_id = %ctx.action_id,
            query = %query,
            stale = %stale,
            "Waiting for replacement element"
        );
        let check = element_present(self.locator(), root, query.clone(), Some(stale));
        waiting::wait_for(self.host.clone(), root, check, timeout, ctx).await
    }

    async fn wait_for_absence(
        &self,
        ctx: &ExecCtx,
        root: NodeId,
        query: &NodeQuery,
        timeout: Duration,
    ) -> Result<Waited<()>, ActionError> {
        debug!(action_id = %ctx.action_id, query = %query, "Waiting for element to leave");
        let check = element_absent(self.locator(), root, query.clone());
        waiting::wait_for(self.host.clone(), root, check, timeout, ctx).await
    }

    async fn pause(&self, ctx: &ExecCtx, delay: Duration) -> Result<(), ActionError> {
        waiting::pause(delay, ctx).await
    }
}
