//! Explanation Delivery Router
//!
//! Given an explanation candidate and the configured trigger mode, either
//! cache it (pull), persist and broadcast it immediately (push), or do the
//! latter while also letting the participant converse with the reasoning
//! engine (interactive). Delivery and rating are independent: a record may
//! be cached, later delivered, then separately rated.

use anyhow::Result;

use domus_core::{
    now_ms, EngineKind, Explanation, LogEntry, LogKind, OutboundEvent, Session, TriggerMode,
};
use domus_store::StoreError;

use crate::handler::Orchestrator;

/// Fallback shown when nothing is available to explain.
pub const NO_EXPLANATION: &str = "No explanation available.";

impl Orchestrator {
    /// Route one candidate according to the configured trigger mode.
    pub(crate) async fn route_explanation(&self, explanation: Explanation) -> Result<()> {
        match self.config.explanation.trigger {
            TriggerMode::Pull => {
                // Single-slot cache; nothing persisted, nothing broadcast yet.
                let session_id = explanation.session_id.clone();
                self.store.cache_explanation(&session_id, explanation).await?;
                Ok(())
            }
            TriggerMode::Push | TriggerMode::Interactive => self.deliver(explanation).await,
        }
    }

    /// Persist and emit one explanation. Dropped silently when the session
    /// has no live transport: no queue, no retry.
    pub(crate) async fn deliver(&self, explanation: Explanation) -> Result<()> {
        self.store.insert_explanation(explanation.clone()).await;
        let delivered = self.notifier.notify(
            &explanation.session_id,
            &OutboundEvent::Explanation {
                session_id: explanation.session_id.clone(),
                explanation_id: explanation.explanation_id.clone(),
                explanation: explanation.explanation.clone(),
                rating_scale: self.config.explanation.rating_scale,
            },
        );
        if !delivered {
            tracing::debug!(
                session = %explanation.session_id,
                "No live transport, explanation dropped after persist"
            );
        }
        Ok(())
    }

    /// An explanation authored by the external reasoning service (a REST
    /// response or a WS callback) enters the same routing as rule-born
    /// candidates.
    pub async fn deliver_external(&self, session_id: &str, text: &str) -> Result<()> {
        let now = now_ms();
        let task = self.store.current_task(session_id, now).await;
        let explanation = Explanation::new(
            text,
            session_id,
            task.as_ref().map(|t| t.task_id.as_str()),
            0,
        );
        self.route_explanation(explanation).await
    }

    /// Pull-mode request: resolve the cache (external engine: ask the
    /// adapter first), persist the resolved record and emit it once. With
    /// nothing available the participant sees the literal fallback and the
    /// explanations store is untouched.
    pub(crate) async fn on_explanation_request(&self, session: Session) -> Result<()> {
        if self.config.explanation.engine == EngineKind::External {
            match self
                .adapter
                .request_explanation(&session.session_id, None)
                .await
            {
                Ok(Some(text)) => {
                    let task = self.store.current_task(&session.session_id, now_ms()).await;
                    let explanation = Explanation::new(
                        &text,
                        &session.session_id,
                        task.as_ref().map(|t| t.task_id.as_str()),
                        0,
                    );
                    return self.deliver(explanation).await;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Reasoning adapter failed on request: {}", e);
                }
            }
        }

        match self
            .store
            .take_cached_explanation(&session.session_id)
            .await?
        {
            Some(cached) => self.deliver(cached).await,
            None => {
                // Not persisted: the fallback is a message, not a record.
                self.notifier.notify(
                    &session.session_id,
                    &OutboundEvent::Explanation {
                        session_id: session.session_id.clone(),
                        explanation_id: String::new(),
                        explanation: NO_EXPLANATION.to_string(),
                        rating_scale: None,
                    },
                );
                Ok(())
            }
        }
    }

    /// Fill the rating slot of a delivered explanation. A rating for an
    /// unknown id is stale client traffic, not an error.
    pub(crate) async fn on_explanation_rating(
        &self,
        session: Session,
        explanation_id: &str,
        rating: i32,
    ) -> Result<()> {
        if self.config.explanation.rating_scale.is_none() {
            tracing::debug!("Rating received but no rating scheme is configured");
            return Ok(());
        }
        match self.store.rate_explanation(explanation_id, rating).await {
            Ok(()) => {
                let entry = LogEntry::new(
                    &session.session_id,
                    None,
                    LogKind::Game,
                    &format!("explanation rated {}", rating),
                )
                .with_payload(serde_json::json!({ "explanationId": explanation_id }));
                self.log_and_forward(entry).await
            }
            Err(StoreError::ExplanationNotFound(_)) => {
                tracing::debug!(id = %explanation_id, "Rating for unknown explanation dropped");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Interactive-mode follow-up: forward the participant's message to the
    /// reasoning engine; its answer re-enters the normal delivery path.
    pub(crate) async fn on_explanation_chat(
        &self,
        session: Session,
        message: &str,
    ) -> Result<()> {
        if self.config.explanation.trigger != TriggerMode::Interactive {
            tracing::debug!("Follow-up message outside interactive mode dropped");
            return Ok(());
        }

        let entry = LogEntry::new(
            &session.session_id,
            None,
            LogKind::Game,
            &format!("follow-up: {}", message),
        );
        self.log_and_forward(entry).await?;

        match self
            .adapter
            .request_explanation(&session.session_id, Some(message))
            .await
        {
            Ok(Some(text)) => self.deliver_external(&session.session_id, &text).await,
            Ok(None) => Ok(()),
            Err(e) => {
                tracing::warn!("Reasoning adapter failed on follow-up: {}", e);
                self.notifier.notify(
                    &session.session_id,
                    &OutboundEvent::Explanation {
                        session_id: session.session_id.clone(),
                        explanation_id: String::new(),
                        explanation: NO_EXPLANATION.to_string(),
                        rating_scale: None,
                    },
                );
                Ok(())
            }
        }
    }
}
