//! Authorization handler configuration.
//!
//! [`AuthorizationOptions`] is the single canonical options struct the engine
//! accepts. It maps handler ids to [`HandlerSettings`], whose `type`
//! discriminator selects the handler variant. The [`env`] submodule builds it
//! from constructor options and the two environment-variable schemes.
//!
//! # Example (JSON)
//!
//! ```json
//! {
//!   "handlers": {
//!     "graph": {
//!       "type": "azurebot",
//!       "connectionName": "graph-connection",
//!       "maxAttempts": 3,
//!       "oboScopes": ["api://downstream/.default"]
//!     },
//!     "agent": { "type": "agentic", "scopes": ["https://graph.microsoft.com/.default"] }
//!   }
//! }
//! ```

pub mod env;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use env::ConfigLoader;

/// Root authorization configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthorizationOptions {
    /// Handler settings keyed by handler id (case-sensitive).
    pub handlers: BTreeMap<String, HandlerSettings>,
}

/// Settings of one handler, tagged by handler type.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HandlerSettings {
    /// Interactive OAuth through the bot token service.
    AzureBot(AzureBotSettings),
    /// Headless agentic user tokens.
    Agentic(AgenticSettings),
    /// Token carried by the inbound connector request.
    Connector(ConnectorSettings),
}

impl HandlerSettings {
    /// Type discriminators accepted in configuration.
    pub const TYPES: [&'static str; 3] = ["azurebot", "agentic", "connector"];

    /// Type used when configuration names none.
    pub const DEFAULT_TYPE: &'static str = "azurebot";

    /// Returns the type discriminator.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::AzureBot(_) => "azurebot",
            Self::Agentic(_) => "agentic",
            Self::Connector(_) => "connector",
        }
    }
}

/// Settings for the interactive bot-service OAuth handler.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AzureBotSettings {
    /// OAuth connection name registered on the bot resource.
    pub connection_name: String,

    /// Sign-in card title.
    pub title: String,

    /// Sign-in card text.
    pub text: String,

    /// Number of malformed magic codes tolerated before the flow is rejected.
    pub max_attempts: u32,

    /// Offer the platform-native token exchange when the service supports it.
    pub enable_sso: bool,

    /// Connection used for on-behalf-of exchange. Defaults to the default connection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obo_connection_name: Option<String>,

    /// Scopes requested on-behalf-of the user. Empty disables the exchange.
    pub obo_scopes: Vec<String>,

    /// How long a pending sign-in stays valid.
    #[serde(with = "humantime_serde")]
    pub sign_in_timeout: Duration,

    /// User-facing message templates.
    pub messages: MessageTemplates,
}

impl Default for AzureBotSettings {
    fn default() -> Self {
        Self {
            connection_name: String::new(),
            title: "Sign in".to_string(),
            text: "Please sign in to continue.".to_string(),
            max_attempts: 2,
            enable_sso: true,
            obo_connection_name: None,
            obo_scopes: Vec::new(),
            sign_in_timeout: Duration::from_secs(15 * 60),
            messages: MessageTemplates::default(),
        }
    }
}

/// Message templates for the magic code flow.
///
/// Placeholders: `{code}`, `{attemptsLeft}`, `{maxAttempts}`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MessageTemplates {
    /// Sent when a well-formed code is refused by the token service.
    pub invalid_code: String,

    /// Sent when the input is not a six digit code.
    pub invalid_code_format: String,

    /// Sent when no attempts are left.
    pub max_attempts_exceeded: String,
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            invalid_code: "Invalid **{code}** code entered. Please try again with a new sign-in request."
                .to_string(),
            invalid_code_format: "Please enter a valid **6-digit** code format (_e.g. 123456_).\r\n**{attemptsLeft} attempt(s) left...**"
                .to_string(),
            max_attempts_exceeded: "You have exceeded the maximum number of sign-in attempts ({maxAttempts}). Please try again with a new sign-in request."
                .to_string(),
        }
    }
}

/// Replaces `{name}` placeholders in `template`.
#[must_use]
pub fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    values
        .iter()
        .fold(template.to_string(), |text, (name, value)| {
            text.replace(&format!("{{{name}}}"), value)
        })
}

/// Settings for the headless agentic handler.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgenticSettings {
    /// Scopes requested when the caller passes none. Required.
    pub scopes: Vec<String>,

    /// Connection used instead of the audience/service-url lookup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_blueprint_connection_name: Option<String>,
}

/// Settings for the delegated-identity connector handler.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectorSettings {
    /// Connection used for on-behalf-of exchange. Defaults to the default connection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obo_connection_name: Option<String>,

    /// Scopes requested on-behalf-of the user. Empty disables the exchange.
    pub obo_scopes: Vec<String>,
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// A handler names a type that does not exist.
    #[error("Unknown type '{handler_type}' for authorization handler '{handler_id}'")]
    UnknownHandlerType {
        /// The handler id.
        handler_id: String,
        /// The unrecognized type.
        handler_type: String,
    },

    /// Merged settings could not be parsed.
    #[error("Failed to parse settings of authorization handler '{handler_id}': {message}")]
    Parse {
        /// The handler id.
        handler_id: String,
        /// Parser message.
        message: String,
    },
}

impl AuthorizationOptions {
    /// Adds a handler.
    #[must_use]
    pub fn with_handler(mut self, id: impl Into<String>, settings: HandlerSettings) -> Self {
        self.handlers.insert(id.into(), settings);
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if:
    /// - A handler id is blank
    /// - An interactive handler has no connection name
    /// - An agentic handler has no scopes
    ///
    /// Returns `ConfigError::InvalidValue` if `maxAttempts` or
    /// `signInTimeout` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (id, settings) in &self.handlers {
            if id.trim().is_empty() {
                return Err(ConfigError::Missing("handler id".to_string()));
            }

            match settings {
                HandlerSettings::AzureBot(azure) => {
                    if azure.connection_name.trim().is_empty() {
                        return Err(ConfigError::Missing(format!(
                            "connectionName for handler '{id}'"
                        )));
                    }
                    if azure.max_attempts == 0 {
                        return Err(ConfigError::InvalidValue(format!(
                            "maxAttempts for handler '{id}' must be > 0"
                        )));
                    }
                    if azure.sign_in_timeout.is_zero() {
                        return Err(ConfigError::InvalidValue(format!(
                            "signInTimeout for handler '{id}' must be > 0"
                        )));
                    }
                }
                HandlerSettings::Agentic(agentic) => {
                    if agentic.scopes.iter().all(|s| s.trim().is_empty()) {
                        return Err(ConfigError::Missing(format!("scopes for handler '{id}'")));
                    }
                }
                HandlerSettings::Connector(_) => {}
            }
        }

        Ok(())
    }
}
