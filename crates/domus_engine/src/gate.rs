//! Session Gate
//!
//! Validates an inbound event's session and attaches or refreshes the live
//! transport handle before anything else runs. Invalid events are dropped
//! silently: most are stale or duplicate client traffic, not errors.

use anyhow::Result;

use domus_core::Session;

use crate::handler::Orchestrator;

impl Orchestrator {
    /// Returns the session with its socket handle refreshed, or `None` when
    /// the event must be dropped.
    pub(crate) async fn gate(&self, session_id: &str, socket_id: &str) -> Result<Option<Session>> {
        let Some(mut session) = self.store.get_session(session_id).await else {
            tracing::debug!(session = %session_id, "Dropping event for unknown session");
            return Ok(None);
        };
        if session.is_completed {
            tracing::debug!(session = %session_id, "Dropping event for completed session");
            return Ok(None);
        }
        if session.socket_id.as_deref() != Some(socket_id) {
            self.store.set_socket(session_id, socket_id).await?;
            session.socket_id = Some(socket_id.to_string());
        }
        Ok(Some(session))
    }
}
