//! Session-end notification as a transport capability with two
//! implementations, chosen by availability rather than by call site: a
//! detached delivery that survives the caller going away, and a plain
//! awaited request as fallback.

use std::sync::Arc;

use async_trait::async_trait;
use shared::domain::SessionId;
use tracing::warn;

use crate::gateway::{ApiGateway, GatewayError};

#[async_trait]
pub trait SessionEndTransport: Send + Sync {
    async fn notify_session_end(&self, session_id: &SessionId) -> Result<(), GatewayError>;
}

/// Hands the end notification to the ambient runtime and returns
/// immediately, so delivery is not tied to the caller's lifetime.
pub struct DetachedEndTransport {
    gateway: Arc<ApiGateway>,
}

impl DetachedEndTransport {
    pub fn new(gateway: Arc<ApiGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl SessionEndTransport for DetachedEndTransport {
    async fn notify_session_end(&self, session_id: &SessionId) -> Result<(), GatewayError> {
        let gateway = Arc::clone(&self.gateway);
        let session_id = session_id.clone();
        tokio::spawn(async move {
            if let Err(err) = gateway.end_session(&session_id).await {
                warn!(session_id = %session_id, error = %err, "session end notification failed");
            }
        });
        Ok(())
    }
}

/// Plain awaited request; used when detached delivery is unavailable.
pub struct AwaitedEndTransport {
    gateway: Arc<ApiGateway>,
}

impl AwaitedEndTransport {
    pub fn new(gateway: Arc<ApiGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl SessionEndTransport for AwaitedEndTransport {
    async fn notify_session_end(&self, session_id: &SessionId) -> Result<(), GatewayError> {
        self.gateway.end_session(session_id).await
    }
}

/// Picks the detached transport when an ambient tokio runtime can carry
/// the spawned delivery, otherwise the awaited fallback.
pub fn preferred_end_transport(gateway: Arc<ApiGateway>) -> Arc<dyn SessionEndTransport> {
    match tokio::runtime::Handle::try_current() {
        Ok(_) => Arc::new(DetachedEndTransport::new(gateway)),
        Err(_) => Arc::new(AwaitedEndTransport::new(gateway)),
    }
}
