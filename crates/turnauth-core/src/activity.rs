//! Inbound activity model.
//!
//! Only the fields the authorization engine reads are modelled; everything
//! else a channel sends is outside this crate.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Activity type names.
pub mod activity_types {
    pub const MESSAGE: &str = "message";
    pub const INVOKE: &str = "invoke";
    pub const EVENT: &str = "event";
}

/// Invoke names used by the sign-in protocols.
pub mod invoke_names {
    /// Platform-native SSO token exchange.
    pub const TOKEN_EXCHANGE: &str = "signin/tokenExchange";
    /// Structured magic-code confirmation.
    pub const VERIFY_STATE: &str = "signin/verifyState";
    /// The client reports that sign-in failed or was abandoned.
    pub const SIGNIN_FAILURE: &str = "signin/failure";
}

/// Recipient roles that mark an agentic (headless) request.
pub mod roles {
    pub const AGENTIC_INSTANCE: &str = "agenticAppInstance";
    pub const AGENTIC_USER: &str = "agenticUser";
}

/// Channel id of Microsoft Teams.
pub const MSTEAMS_CHANNEL: &str = "msteams";

/// A user or agent account on a channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAccount {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Agent application instance id, set on agentic requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agentic_app_id: Option<String>,

    /// Agentic user id, set on agentic requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agentic_user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

impl ChannelAccount {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// The conversation an activity belongs to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationAccount {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_type: Option<String>,
}

impl ConversationAccount {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// Enough of an activity to address a reply to its conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<String>,
    pub user: ChannelAccount,
    pub agent: ChannelAccount,
    pub conversation: ConversationAccount,
    pub channel_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

/// An inbound activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub activity_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub channel_id: String,

    pub from: ChannelAccount,

    #[serde(default)]
    pub recipient: ChannelAccount,

    pub conversation: ConversationAccount,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,

    /// System event / invoke discriminator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relates_to: Option<ConversationReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

impl Activity {
    /// Creates a message activity from `user_id` in `conversation_id`.
    pub fn message(
        channel_id: impl Into<String>,
        user_id: impl Into<String>,
        conversation_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            activity_type: activity_types::MESSAGE.to_string(),
            channel_id: channel_id.into(),
            from: ChannelAccount::new(user_id),
            recipient: ChannelAccount::new("agent"),
            conversation: ConversationAccount::new(conversation_id),
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Creates an invoke activity named `name` carrying `value`.
    pub fn invoke(
        channel_id: impl Into<String>,
        user_id: impl Into<String>,
        conversation_id: impl Into<String>,
        name: impl Into<String>,
        value: Value,
    ) -> Self {
        Self {
            activity_type: activity_types::INVOKE.to_string(),
            channel_id: channel_id.into(),
            from: ChannelAccount::new(user_id),
            recipient: ChannelAccount::new("agent"),
            conversation: ConversationAccount::new(conversation_id),
            name: Some(name.into()),
            value: Some(value),
            ..Default::default()
        }
    }

    pub fn is_message(&self) -> bool {
        self.activity_type == activity_types::MESSAGE
    }

    pub fn is_invoke(&self) -> bool {
        self.activity_type == activity_types::INVOKE
    }

    /// Returns `true` when this activity is an invoke with the given name.
    pub fn is_invoke_named(&self, name: &str) -> bool {
        self.is_invoke() && self.name.as_deref() == Some(name)
    }

    /// Returns `true` if the recipient is an agentic identity.
    pub fn is_agentic_request(&self) -> bool {
        matches!(
            self.recipient.role.as_deref(),
            Some(roles::AGENTIC_INSTANCE) | Some(roles::AGENTIC_USER)
        )
    }

    pub fn agentic_instance_id(&self) -> Option<&str> {
        self.recipient.agentic_app_id.as_deref()
    }

    pub fn agentic_user_id(&self) -> Option<&str> {
        self.recipient.agentic_user_id.as_deref()
    }

    /// Tenant of the request, preferring the recipient's tenant.
    pub fn tenant_id(&self) -> Option<&str> {
        self.recipient
            .tenant_id
            .as_deref()
            .or(self.conversation.tenant_id.as_deref())
    }

    /// Trimmed message text, if any.
    pub fn trimmed_text(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim)
    }

    pub fn conversation_reference(&self) -> ConversationReference {
        ConversationReference {
            activity_id: self.id.clone(),
            user: self.from.clone(),
            agent: self.recipient.clone(),
            conversation: self.conversation.clone(),
            channel_id: self.channel_id.clone(),
            service_url: self.service_url.clone(),
            locale: self.locale.clone(),
        }
    }
}
