//! # turnauth-auth
//!
//! Turn-scoped authorization for conversational agents.
//!
//! An agent receives one activity per turn. Before normal turn handling it
//! asks the [`AuthorizationManager`] whether the user is authorized for the
//! handlers that apply to the activity. Interactive handlers may need several
//! turns to complete sign-in; meanwhile the original activity is kept in a
//! per-user session and replayed once sign-in succeeds.
//!
//! ## Modules
//!
//! - [`config`] - handler settings and environment normalization
//! - [`handlers`] - the handler contract and its variants
//! - [`manager`] - per-turn orchestration
//! - [`storage`] - persistence of in-flight sign-in sessions
//! - [`token`] - token-service contracts and on-behalf-of exchange
//! - [`error`] - error types
//!
//! ## Example
//!
//! ```ignore
//! use turnauth_auth::prelude::*;
//!
//! let options = ConfigLoader::new().with_process_env().load()?;
//! let manager = AuthorizationManager::new(&options, dependencies)?;
//!
//! let result = manager
//!     .process(&mut turn, |_activity| vec!["graph".to_string()])
//!     .await?;
//! if result.authorized {
//!     // continue with the (possibly restored) activity
//! }
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod manager;
pub mod storage;
pub mod token;

pub use config::{AuthorizationOptions, ConfigError, ConfigLoader, HandlerSettings};
pub use error::{AuthError, ErrorCategory};
pub use handlers::{
    AgenticAuthorization, AuthorizationHandler, AuthorizationHandlerStatus, AzureBotAuthorization,
    ConnectorUserAuthorization, HandlerKind, TokenOptions, TokenResponse,
};
pub use manager::{
    AuthorizationDependencies, AuthorizationManager, MAX_REVALIDATIONS, ProcessResult,
};
pub use storage::{ActiveAuthorizationHandler, HandlerStorage, SigninCategory};

/// Result type for authorization operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{AuthorizationOptions, ConfigLoader, HandlerSettings};
    pub use crate::error::AuthError;
    pub use crate::handlers::{AuthorizationHandler, AuthorizationHandlerStatus, TokenOptions};
    pub use crate::manager::{AuthorizationDependencies, AuthorizationManager, ProcessResult};
    pub use crate::token::{AccessTokenProvider, ConnectionManager, UserTokenClient};
}
