//! # turnauth-core
//!
//! Boundary types shared by the turnauth crates: the inbound activity, the
//! caller identity, invoke acknowledgements, sign-in prompt content, and the
//! per-turn [`TurnContext`].

pub mod activity;
pub mod card;
pub mod error;
pub mod identity;
pub mod invoke;
pub mod turn;

pub use activity::{
    Activity, ChannelAccount, ConversationAccount, ConversationReference, MSTEAMS_CHANNEL,
    activity_types, invoke_names, roles,
};
pub use card::{SignInCard, SignInResource, TokenExchangeResource};
pub use error::{CoreError, Result};
pub use identity::ClaimsIdentity;
pub use invoke::{
    InvokeResponse, TokenExchangeInvokeRequest, TokenExchangeInvokeResponse,
    VerifyStateInvokeRequest, status_codes,
};
pub use turn::{TokenCache, TurnContext, TurnSender};
