//! External Reasoning Adapter
//!
//! The explanation router and event logger are written against the
//! `ReasoningAdapter` capability, never a concrete transport. Two conforming
//! implementations ship here: `RestAdapter`, where forwarding a log event may
//! itself return an explanation synchronously, and `WsAdapter`, which pushes
//! over a persistent connection and surfaces explanations later through an
//! asynchronous callback channel. `NullAdapter` backs the integrated engine
//! and tests.

pub mod rest;
pub mod snapshot;
pub mod ws;

use anyhow::Result;
use async_trait::async_trait;

pub use rest::RestAdapter;
pub use snapshot::{ContextSnapshot, EnvironmentItem, LogView};
pub use ws::{AdapterCallback, WsAdapter};

/// Capability interface to the external reasoning service.
#[async_trait]
pub trait ReasoningAdapter: Send + Sync {
    /// Forward a logged event plus its enrichment context. A
    /// request/response transport may answer with an explanation right away;
    /// a persistent transport answers `None` and delivers via callback.
    async fn log_event(&self, snapshot: ContextSnapshot) -> Result<Option<String>>;

    /// Synchronous-style explanation request, used in pull and interactive
    /// modes. `user_message` carries an interactive follow-up, if any.
    async fn request_explanation(
        &self,
        session_id: &str,
        user_message: Option<&str>,
    ) -> Result<Option<String>>;
}

/// No-op adapter for `engine = integrated` and for tests: explanations come
/// from canned rule actions, nothing leaves the process.
#[derive(Debug, Default)]
pub struct NullAdapter;

#[async_trait]
impl ReasoningAdapter for NullAdapter {
    async fn log_event(&self, _snapshot: ContextSnapshot) -> Result<Option<String>> {
        Ok(None)
    }

    async fn request_explanation(
        &self,
        _session_id: &str,
        _user_message: Option<&str>,
    ) -> Result<Option<String>> {
        Ok(None)
    }
}
