//! User token service contract.

use async_trait::async_trait;
use turnauth_core::ConversationReference;

use super::{TokenExchangeRequest, TokenOrSignInResource, UserToken};
use crate::AuthResult;

/// Client of the bot-service user token API.
///
/// Implementations are expected to be cheap to share (`Arc<dyn UserTokenClient>`).
#[async_trait]
pub trait UserTokenClient: Send + Sync {
    /// Returns the user's cached token, or a sign-in resource when there is
    /// none. When `code` is present it is redeemed as a magic code first.
    ///
    /// # Errors
    ///
    /// Returns an error if the token service cannot be reached.
    async fn get_token_or_sign_in_resource(
        &self,
        user_id: &str,
        connection_name: &str,
        channel_id: &str,
        conversation: &ConversationReference,
        relates_to: Option<&ConversationReference>,
        code: Option<&str>,
    ) -> AuthResult<TokenOrSignInResource>;

    /// Exchanges a platform SSO token for a user token.
    ///
    /// `Ok(None)` means the identity provider has not granted consent yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the token service cannot be reached.
    async fn exchange_token(
        &self,
        user_id: &str,
        connection_name: &str,
        channel_id: &str,
        request: &TokenExchangeRequest,
    ) -> AuthResult<Option<UserToken>>;

    /// Signs the user out of a connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the token service cannot be reached.
    async fn sign_out(&self, user_id: &str, connection_name: &str, channel_id: &str)
    -> AuthResult<()>;
}
