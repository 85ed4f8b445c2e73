//! Live-Socket Registry
//!
//! Maps each session to the outbound half of its WebSocket connection. The
//! engine talks to it only through the `ClientNotifier` capability: a
//! `notify` either hands the serialized event to the connection's writer
//! task or reports that no live transport exists, in which case the caller
//! decides whether dropping is acceptable.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;

use domus_core::{ClientNotifier, OutboundEvent};

/// Outbound half of one connection: the transport's identity plus the
/// channel its writer task drains.
struct ConnectionHandle {
    socket_id: String,
    tx: mpsc::UnboundedSender<String>,
}

/// Session → live connection map, shared between the axum handlers and the
/// engine.
#[derive(Default)]
pub struct SocketRegistry {
    connections: Mutex<HashMap<String, ConnectionHandle>>,
}

impl SocketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a session to a connection. A reconnect simply overwrites the
    /// previous handle; the stale writer task ends when its channel closes.
    pub fn bind(&self, session_id: &str, socket_id: &str, tx: mpsc::UnboundedSender<String>) {
        let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        connections.insert(
            session_id.to_string(),
            ConnectionHandle {
                socket_id: socket_id.to_string(),
                tx,
            },
        );
    }

    /// Drop the binding, but only if it still points at this connection.
    /// A newer connection for the same session must not be unbound by the
    /// old one closing.
    pub fn unbind(&self, session_id: &str, socket_id: &str) {
        let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        if connections
            .get(session_id)
            .is_some_and(|handle| handle.socket_id == socket_id)
        {
            connections.remove(session_id);
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.connections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl ClientNotifier for SocketRegistry {
    fn notify(&self, session_id: &str, event: &OutboundEvent) -> bool {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to serialize outbound event: {}", e);
                return false;
            }
        };
        let connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        match connections.get(session_id) {
            Some(handle) => handle.tx.send(json).is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domus_core::events::PropertyUpdate;
    use domus_core::{Property, Value};

    fn device_update(session_id: &str) -> OutboundEvent {
        OutboundEvent::DeviceUpdate {
            session_id: session_id.into(),
            update: PropertyUpdate {
                device_id: "light-1".into(),
                property: Property {
                    name: "power".into(),
                    value: Value::Bool(true),
                },
            },
        }
    }

    #[tokio::test]
    async fn test_notify_reaches_bound_connection() {
        let registry = SocketRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.bind("s1", "sock-1", tx);

        assert!(registry.notify("s1", &device_update("s1")));
        let json = rx.recv().await.unwrap();
        assert!(json.contains("device_update"), "got: {}", json);
    }

    #[tokio::test]
    async fn test_notify_without_binding_reports_drop() {
        let registry = SocketRegistry::new();
        assert!(!registry.notify("s1", &device_update("s1")));
    }

    #[tokio::test]
    async fn test_stale_connection_cannot_unbind_successor() {
        let registry = SocketRegistry::new();
        let (old_tx, _old_rx) = mpsc::unbounded_channel();
        let (new_tx, mut new_rx) = mpsc::unbounded_channel();
        registry.bind("s1", "sock-old", old_tx);
        registry.bind("s1", "sock-new", new_tx);

        // The old connection's close handler runs after the reconnect.
        registry.unbind("s1", "sock-old");

        assert_eq!(registry.active_sessions(), 1);
        assert!(registry.notify("s1", &device_update("s1")));
        assert!(new_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_notify_after_receiver_dropped_reports_drop() {
        let registry = SocketRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.bind("s1", "sock-1", tx);
        drop(rx);
        assert!(!registry.notify("s1", &device_update("s1")));
    }
}
