//! Connection registry and access token providers.

use std::sync::Arc;

use async_trait::async_trait;

use crate::AuthResult;

/// Issues access tokens for one configured connection.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// Exchanges `token` for one carrying `scopes`, on behalf of its subject.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity platform refuses the exchange.
    async fn acquire_token_on_behalf_of(&self, scopes: &[String], token: &str)
    -> AuthResult<String>;

    /// Issues a token for an agentic user.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity platform refuses the request.
    async fn get_agentic_user_token(
        &self,
        tenant_id: &str,
        agentic_instance_id: &str,
        agentic_user_id: &str,
        scopes: &[String],
    ) -> AuthResult<String>;
}

/// Lookup of configured connections.
///
/// Lookups are synchronous; connections are resolved from configuration
/// loaded at startup.
pub trait ConnectionManager: Send + Sync {
    /// Returns the connection named `name`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no such connection exists.
    fn get_connection(&self, name: &str) -> AuthResult<Arc<dyn AccessTokenProvider>>;

    /// Returns the default connection.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no default connection is configured.
    fn get_default_connection(&self) -> AuthResult<Arc<dyn AccessTokenProvider>>;

    /// Returns the connection mapped to an audience and service URL.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no mapping matches.
    fn get_token_provider(
        &self,
        audience: &str,
        service_url: &str,
    ) -> AuthResult<Arc<dyn AccessTokenProvider>>;
}
