//! # Control-plane API exposed to the host.
//!
//! [`CloudApi`] is what host code reaches through the
//! [`AgentContext`](crate::AgentContext): readiness reporting and stop
//! requests for the current session. [`CloudHandle`] implements it on top of
//! the [`SessionManager`].
//!
//! ## Example
//! ```rust,no_run
//! use fleetlink::{AgentContext, RuntimeError};
//!
//! async fn lobby_full(ctx: &AgentContext) -> Result<(), RuntimeError> {
//!     let api = ctx.api()?;
//!     api.disable_auto_ready();
//!     api.mark_not_ready().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::core::SessionManager;
use crate::error::SessionError;

/// Status calls available to the host once the agent is loaded.
#[async_trait]
pub trait CloudApi: Send + Sync + 'static {
    /// Stops the agent from reporting readiness on its own when the host is enabled.
    fn disable_auto_ready(&self);

    /// Reports that the server accepts players.
    async fn mark_ready(&self) -> Result<(), SessionError>;

    /// Reports that the server does not accept players.
    async fn mark_not_ready(&self) -> Result<(), SessionError>;

    /// Asks the controller to stop this server.
    async fn request_stop(&self) -> Result<(), SessionError>;
}

/// [`CloudApi`] backed by the agent's session.
pub struct CloudHandle {
    session: Arc<SessionManager>,
    auto_ready: AtomicBool,
    ready: AtomicBool,
}

impl CloudHandle {
    pub fn new(session: Arc<SessionManager>, auto_ready: bool) -> Self {
        Self {
            session,
            auto_ready: AtomicBool::new(auto_ready),
            ready: AtomicBool::new(false),
        }
    }

    pub fn is_auto_ready(&self) -> bool {
        self.auto_ready.load(Ordering::SeqCst)
    }

    /// Last readiness successfully reported to the controller.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Reports that the host finished starting.
    pub async fn mark_running(&self) -> Result<(), SessionError> {
        let (id, client) = self.session.client().await?;
        client.set_running(&id).await?;
        Ok(())
    }

    async fn set_ready(&self, ready: bool) -> Result<(), SessionError> {
        let (id, client) = self.session.client().await?;
        client.set_ready(&id, ready).await?;
        self.ready.store(ready, Ordering::SeqCst);
        tracing::debug!(session = %id, ready, "readiness reported");
        Ok(())
    }
}

#[async_trait]
impl CloudApi for CloudHandle {
    fn disable_auto_ready(&self) {
        self.auto_ready.store(false, Ordering::SeqCst);
    }

    async fn mark_ready(&self) -> Result<(), SessionError> {
        self.set_ready(true).await
    }

    async fn mark_not_ready(&self) -> Result<(), SessionError> {
        self.set_ready(false).await
    }

    async fn request_stop(&self) -> Result<(), SessionError> {
        let (id, client) = self.session.client().await?;
        client.request_stop(&id).await?;
        Ok(())
    }
}
