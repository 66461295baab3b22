//! Persistence of in-progress sign-in sessions.
//!
//! At most one sign-in session exists per (channel, user) pair. The session
//! records which handler owns the flow and a snapshot of the activity that
//! started it, so the original request can resume once sign-in completes.

mod handler;

pub use handler::{ActiveAuthorizationHandler, HandlerStorage, SigninCategory};
