//! Persistent-connection reasoning adapter.
//!
//! Holds one WebSocket to the reasoning service, reconnecting with backoff.
//! `log_event` pushes a `user_metadata` frame (context minus history) and a
//! `user_log` frame per forwarded entry; explanations arrive later as
//! `explanation_receival` frames, surfaced through the callback channel the
//! constructor returns so the server can drain them into the router.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use url::Url;

use crate::{ContextSnapshot, ReasoningAdapter};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An explanation pushed back by the reasoning service.
#[derive(Debug, Clone)]
pub struct AdapterCallback {
    pub session_id: String,
    pub explanation: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum EngineFrame {
    ExplanationReceival {
        user_id: String,
        explanation: String,
    },
}

pub struct WsAdapter {
    tx: mpsc::Sender<String>,
}

impl WsAdapter {
    /// Connect to the reasoning service. Returns the adapter plus the
    /// receiver of asynchronous explanation callbacks.
    pub fn new(url: &str) -> Result<(Self, mpsc::Receiver<AdapterCallback>)> {
        let ws_url = Url::parse(url).context("Invalid reasoning engine WS URL")?;
        let (tx, mut rx) = mpsc::channel::<String>(64);
        let (callback_tx, callback_rx) = mpsc::channel::<AdapterCallback>(64);

        tokio::spawn(async move {
            let mut retry_count = 0u32;
            loop {
                tracing::info!("Connecting to reasoning engine at {}...", ws_url);
                match connect_async(&ws_url).await {
                    Ok((stream, _)) => {
                        tracing::info!("Connected to reasoning engine");
                        retry_count = 0;
                        if let Err(e) =
                            Self::handle_connection(stream, &mut rx, &callback_tx).await
                        {
                            tracing::error!("Reasoning engine connection error: {}", e);
                        }
                    }
                    Err(e) => {
                        let wait_secs = 5u64.min(2u64.pow(retry_count));
                        tracing::error!(
                            "Failed to connect to reasoning engine: {}. Retrying in {}s...",
                            e,
                            wait_secs
                        );
                        tokio::time::sleep(tokio::time::Duration::from_secs(wait_secs)).await;
                        if retry_count < 6 {
                            retry_count += 1;
                        }
                    }
                }
                tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
            }
        });

        Ok((Self { tx }, callback_rx))
    }

    async fn handle_connection(
        stream: WsStream,
        rx: &mut mpsc::Receiver<String>,
        callback_tx: &mpsc::Sender<AdapterCallback>,
    ) -> Result<()> {
        let (mut write, mut read) = stream.split();

        loop {
            tokio::select! {
                Some(msg) = read.next() => {
                    let msg = msg?;
                    if let Message::Text(text) = msg {
                        match serde_json::from_str::<EngineFrame>(&text) {
                            Ok(EngineFrame::ExplanationReceival { user_id, explanation }) => {
                                let _ = callback_tx
                                    .send(AdapterCallback { session_id: user_id, explanation })
                                    .await;
                            }
                            Err(_) => {
                                tracing::debug!("Ignored unrecognized reasoning engine frame");
                            }
                        }
                    }
                }
                Some(outgoing) = rx.recv() => {
                    write.send(Message::Text(outgoing)).await?;
                }
                else => break,
            }
        }
        Ok(())
    }

    async fn send(&self, frame: serde_json::Value) -> Result<()> {
        self.tx
            .send(frame.to_string())
            .await
            .context("Reasoning engine connection task is gone")
    }
}

#[async_trait]
impl ReasoningAdapter for WsAdapter {
    async fn log_event(&self, snapshot: ContextSnapshot) -> Result<Option<String>> {
        // Metadata and history travel as separate frames; the service keeps
        // its own log append per user and must not have it clobbered.
        let mut metadata = serde_json::to_value(&snapshot)?;
        let logs = metadata
            .as_object_mut()
            .and_then(|m| m.remove("logs"))
            .unwrap_or_default();
        metadata["event"] = json!("user_metadata");
        self.send(metadata).await?;

        if let Some(latest) = logs.as_array().and_then(|l| l.last()) {
            self.send(json!({
                "event": "user_log",
                "user_id": snapshot.user_id,
                "log": latest,
            }))
            .await?;
        }

        // Explanations arrive via the callback channel, never inline.
        Ok(None)
    }

    async fn request_explanation(
        &self,
        session_id: &str,
        user_message: Option<&str>,
    ) -> Result<Option<String>> {
        self.send(json!({
            "event": "explanation_request",
            "user_id": session_id,
            "message": user_message,
        }))
        .await?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_frame_parses_explanation_receival() {
        let frame: EngineFrame = serde_json::from_str(
            r#"{"event": "explanation_receival", "user_id": "s1", "explanation": "because"}"#,
        )
        .unwrap();
        let EngineFrame::ExplanationReceival { user_id, explanation } = frame;
        assert_eq!(user_id, "s1");
        assert_eq!(explanation, "because");
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(WsAdapter::new("not a url").is_err());
    }
}
