//! # Connection Registry
//!
//! Owns the default-connection slot and the strategies for opening new
//! connections. Embedders create one registry per rendering configuration and
//! hand it to template code explicitly.

use super::connection::ConnectionFacade;
use super::driver::Connector;
use crate::error::DriverResult;
use crate::types::TypeCodec;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub struct ConnectionRegistry {
    connector: Arc<dyn Connector>,
    codec: Arc<TypeCodec>,
    default: Mutex<Option<Arc<ConnectionFacade>>>,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry").finish_non_exhaustive()
    }
}

impl ConnectionRegistry {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self::with_codec(connector, Arc::new(TypeCodec::new()))
    }

    pub fn with_codec(connector: Arc<dyn Connector>, codec: Arc<TypeCodec>) -> Self {
        Self {
            connector,
            codec,
            default: Mutex::new(None),
        }
    }

    pub fn codec(&self) -> &Arc<TypeCodec> {
        &self.codec
    }

    /// The default connection, opened with the connector's zero-argument
    /// strategy on first use. A default that has since been closed is
    /// replaced by a fresh one.
    pub async fn default_connection(&self) -> DriverResult<Arc<ConnectionFacade>> {
        let mut slot = self.default.lock().await;
        if let Some(existing) = slot.as_ref().filter(|f| !f.is_closed()) {
            return Ok(existing.clone());
        }

        let facade = self.new_connection().await?;
        info!(
            backend = facade.connection().backend(),
            "Default connection established"
        );
        *slot = Some(facade.clone());
        Ok(facade)
    }

    /// Replace the default connection, returning the previous one
    pub async fn set_default(&self, facade: Arc<ConnectionFacade>) -> Option<Arc<ConnectionFacade>> {
        debug!("Default connection replaced");
        self.default.lock().await.replace(facade)
    }

    /// Empty the default slot without closing anything
    pub async fn clear_default(&self) -> Option<Arc<ConnectionFacade>> {
        debug!("Default connection cleared");
        self.default.lock().await.take()
    }

    /// A new connection from the zero-argument strategy; not stored
    pub async fn new_connection(&self) -> DriverResult<Arc<ConnectionFacade>> {
        let connection = self.connector.connect_default().await?;
        Ok(Arc::new(ConnectionFacade::new(connection, self.codec.clone())))
    }

    /// A new connection to an explicit target; not stored
    pub async fn new_connection_with(
        &self,
        url: &str,
        user: &str,
        password: &str,
    ) -> DriverResult<Arc<ConnectionFacade>> {
        let connection = self.connector.connect(url, user, password).await?;
        debug!(user = %user, backend = connection.backend(), "Opened explicit connection");
        Ok(Arc::new(ConnectionFacade::new(connection, self.codec.clone())))
    }
}
