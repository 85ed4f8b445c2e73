//! Action Scheduler
//!
//! Applies or defers each effect a rule pass produced. Zero-delay device
//! writes are persisted and broadcast before the originating handler
//! returns; delayed ones run on independent one-shot timers that outlive
//! the handler. Timers are fire-and-forget: no cancellation, no dedupe
//! against a later interaction touching the same property (known
//! limitation, preserved from the source behavior).

use anyhow::Result;
use std::time::Duration;

use domus_core::OutboundEvent;

use crate::handler::Orchestrator;
use crate::rules::{PendingUpdate, RuleOutcome};

impl Orchestrator {
    /// Apply every pending effect, honoring per-effect delays.
    pub(crate) async fn dispatch_effects(
        &self,
        session_id: &str,
        outcome: RuleOutcome,
    ) -> Result<()> {
        for update in outcome.updates {
            if update.delay_secs == 0 {
                self.apply_update(session_id, &update).await?;
            } else {
                let this = self.clone();
                let session_id = session_id.to_string();
                let delay = Duration::from_secs(update.delay_secs);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(e) = this.apply_update(&session_id, &update).await {
                        tracing::error!("Delayed device update failed: {}", e);
                    }
                });
            }
        }

        for explanation in outcome.explanations {
            if explanation.delay_secs == 0 {
                self.route_explanation(explanation).await?;
            } else {
                let this = self.clone();
                let delay = Duration::from_secs(explanation.delay_secs);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(e) = this.route_explanation(explanation).await {
                        tracing::error!("Delayed explanation routing failed: {}", e);
                    }
                });
            }
        }

        Ok(())
    }

    /// Persist one device-property write and notify the connected client.
    pub(crate) async fn apply_update(
        &self,
        session_id: &str,
        update: &PendingUpdate,
    ) -> Result<()> {
        self.store
            .set_device_property(
                session_id,
                &update.device_id,
                &update.property.name,
                update.property.value.clone(),
            )
            .await?;
        self.notifier.notify(
            session_id,
            &OutboundEvent::DeviceUpdate {
                session_id: session_id.to_string(),
                update: update.as_property_update(),
            },
        );
        Ok(())
    }
}
