use crate::utils::{KilnError, Logger, Result};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use uuid::Uuid;

/// Messages pushed to browsers over the live-update socket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HmrMessage {
    Connected { client: String },
    /// Only stylesheets changed; swap them in place
    CssUpdate { generation: u64, files: Vec<String> },
    FullReload { generation: u64, files: Vec<String> },
}

impl HmrMessage {
    /// What to tell clients after a generation wrote `written`. Nothing changed, nothing sent.
    pub fn for_changes(generation: u64, written: &[String]) -> Option<Self> {
        if written.is_empty() {
            return None;
        }
        let files = written.to_vec();
        if written.iter().all(|f| f.ends_with(".css")) {
            Some(HmrMessage::CssUpdate { generation, files })
        } else {
            Some(HmrMessage::FullReload { generation, files })
        }
    }
}

#[derive(Debug, Clone)]
pub struct HmrClient {
    pub id: String,
    pub connected_at: std::time::SystemTime,
}

/// WebSocket live-update server. Every connected client receives every broadcast.
#[derive(Clone)]
pub struct HmrService {
    clients: Arc<DashMap<String, HmrClient>>,
    sender: broadcast::Sender<HmrMessage>,
}

impl HmrService {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self {
            clients: Arc::new(DashMap::new()),
            sender,
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HmrMessage> {
        self.sender.subscribe()
    }

    /// Returns how many receivers got the message
    pub fn broadcast(&self, message: HmrMessage) -> usize {
        Logger::debug(&format!("🔥 Live update: {:?}", message));
        self.sender.send(message).unwrap_or(0)
    }

    /// Bind `127.0.0.1:port` and accept clients on a background task
    pub async fn start_server(&self, port: u16) -> Result<()> {
        let addr = format!("127.0.0.1:{}", port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| KilnError::Server(format!("live-update server bind failed on {}: {}", addr, e)))?;
        Logger::info(&format!("🔥 Live updates on ws://{}", addr));

        let service = self.clone();
        tokio::spawn(async move {
            while let Ok((stream, peer)) = listener.accept().await {
                let service = service.clone();
                tokio::spawn(async move {
                    if let Err(e) = service.handle_client(stream).await {
                        Logger::warn(&format!("Live-update client {} failed: {}", peer, e));
                    }
                });
            }
        });

        Ok(())
    }

    async fn handle_client(&self, stream: tokio::net::TcpStream) -> Result<()> {
        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| KilnError::Server(format!("WebSocket handshake failed: {}", e)))?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let mut updates = self.subscribe();

        let client_id = Uuid::new_v4().to_string();
        self.clients.insert(
            client_id.clone(),
            HmrClient {
                id: client_id.clone(),
                connected_at: std::time::SystemTime::now(),
            },
        );
        Logger::debug(&format!("🔌 Live-update client connected: {}", client_id));

        let welcome = HmrMessage::Connected {
            client: client_id.clone(),
        };
        if let Ok(text) = serde_json::to_string(&welcome) {
            let _ = ws_sender.send(Message::Text(text)).await;
        }

        loop {
            tokio::select! {
                update = updates.recv() => match update {
                    Ok(message) => {
                        let Ok(text) = serde_json::to_string(&message) else { continue };
                        if ws_sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                incoming = ws_receiver.next() => match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                },
            }
        }

        self.clients.remove(&client_id);
        Logger::debug(&format!("🔌 Live-update client disconnected: {}", client_id));
        Ok(())
    }
}

impl Default for HmrService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_css_only_changes_swap_in_place() {
        let written = vec!["app.css".to_string()];
        assert_eq!(
            HmrMessage::for_changes(3, &written),
            Some(HmrMessage::CssUpdate {
                generation: 3,
                files: written.clone()
            })
        );
        let mixed = vec!["app.css".to_string(), "app.js".to_string()];
        assert!(matches!(
            HmrMessage::for_changes(4, &mixed),
            Some(HmrMessage::FullReload { generation: 4, .. })
        ));
        assert_eq!(HmrMessage::for_changes(5, &[]), None);
    }

    #[test]
    fn test_message_wire_format() {
        let json = serde_json::to_string(&HmrMessage::FullReload {
            generation: 2,
            files: vec!["app.js".to_string()],
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"full-reload","generation":2,"files":["app.js"]}"#);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_subscribers() {
        let hmr = HmrService::new();
        let mut receiver = hmr.subscribe();
        assert_eq!(hmr.client_count(), 0);

        let sent = hmr.broadcast(HmrMessage::CssUpdate {
            generation: 1,
            files: vec!["app.css".to_string()],
        });
        assert_eq!(sent, 1);
        assert!(matches!(receiver.recv().await.unwrap(), HmrMessage::CssUpdate { .. }));
    }
}
