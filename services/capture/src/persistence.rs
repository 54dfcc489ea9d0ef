//! Session persistence with local fallback
//!
//! A save first tries the server and falls back to the local store on any
//! network, HTTP or application failure. Only a failing local store makes
//! `save` return an error. Sessions parked locally can be re-sent later
//! with [`PersistenceClient::flush_pending`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use common::session::Session;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{PersistenceError, TransportError};
use crate::local_store::LocalStore;

/// Prefix of every locally parked session key
pub const LOCAL_SESSION_PREFIX: &str = "keystroke_data_";

/// Body returned by the save endpoint
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerReply {
    pub success: bool,
    pub message: Option<String>,
    pub session_id: Option<String>,
    pub filename: Option<String>,
}

/// Network stage of a save
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Whether the server answers at all
    async fn probe(&self) -> bool;

    /// Deliver one session
    async fn send(&self, session: &Session) -> Result<ServerReply, TransportError>;
}

#[derive(Debug, Serialize)]
struct SaveRequest<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    data: &'a Session,
}

/// reqwest-backed transport talking to the API service
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    probe_timeout: Duration,
}

impl HttpTransport {
    pub fn new(
        base_url: impl Into<String>,
        probe_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            probe_timeout,
        })
    }
}

#[async_trait]
impl SessionTransport for HttpTransport {
    async fn probe(&self) -> bool {
        let response = self
            .client
            .head(&self.base_url)
            .timeout(self.probe_timeout)
            .send()
            .await;

        match response {
            Ok(response) => !response.status().is_server_error(),
            Err(e) => {
                warn!("Server probe failed: {}", e);
                false
            }
        }
    }

    async fn send(&self, session: &Session) -> Result<ServerReply, TransportError> {
        let url = format!("{}/save-data", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&SaveRequest {
                kind: session.context.as_str(),
                data: session,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ServerReply>()
                .await
                .ok()
                .and_then(|reply| reply.message)
                .unwrap_or_else(|| status.to_string());
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<ServerReply>().await?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoredWhere {
    Server,
    Local,
}

/// Outcome of a save
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResult {
    pub success: bool,
    pub message: String,
    pub stored_where: StoredWhere,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_key: Option<String>,
}

/// Outcome of re-sending parked sessions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub sent: usize,
    pub failed: usize,
    pub corrupted: usize,
}

pub struct PersistenceClient {
    transport: Arc<dyn SessionTransport>,
    local: LocalStore,
    probe_first: bool,
}

impl PersistenceClient {
    pub fn new(transport: Arc<dyn SessionTransport>, local: LocalStore, probe_first: bool) -> Self {
        Self {
            transport,
            local,
            probe_first,
        }
    }

    /// Persist a session on the server, or locally when that fails
    pub async fn save(&self, session: &Session) -> Result<SaveResult, PersistenceError> {
        if self.probe_first && !self.transport.probe().await {
            warn!("Server unreachable, saving session {} locally", session.session_id);
            return self
                .save_locally(session, "Server unreachable".to_string())
                .await;
        }

        let reason = match self.transport.send(session).await {
            Ok(reply) if reply.success => {
                info!("Session {} saved on the server", session.session_id);
                return Ok(SaveResult {
                    success: true,
                    message: reply
                        .message
                        .unwrap_or_else(|| "Data saved successfully".to_string()),
                    stored_where: StoredWhere::Server,
                    session_id: session.session_id.clone(),
                    local_key: None,
                });
            }
            Ok(reply) => reply
                .message
                .unwrap_or_else(|| "Server reported a failure".to_string()),
            Err(e) => e.to_string(),
        };

        warn!(
            "Saving session {} on the server failed: {}",
            session.session_id, reason
        );
        self.save_locally(session, reason).await
    }

    async fn save_locally(
        &self,
        session: &Session,
        reason: String,
    ) -> Result<SaveResult, PersistenceError> {
        let key = local_key(session);
        let body = serde_json::to_string(session).map_err(common::error::StorageError::from)?;

        if let Err(e) = self.local.set(&key, &body).await {
            error!("Local fallback failed for session {}: {}", session.session_id, e);
            return Err(e.into());
        }

        Ok(SaveResult {
            success: true,
            message: format!("{}; data saved locally", reason),
            stored_where: StoredWhere::Local,
            session_id: session.session_id.clone(),
            local_key: Some(key),
        })
    }

    /// Re-send every locally parked session, deleting those the server accepts
    pub async fn flush_pending(&self) -> Result<FlushReport, PersistenceError> {
        let keys = self.local.keys(LOCAL_SESSION_PREFIX).await?;
        let mut report = FlushReport::default();

        for key in keys {
            let Some(body) = self.local.get(&key).await? else {
                continue;
            };

            let session: Session = match serde_json::from_str(&body) {
                Ok(session) => session,
                Err(e) => {
                    warn!("Skipping corrupted local record {}: {}", key, e);
                    report.corrupted += 1;
                    continue;
                }
            };

            match self.transport.send(&session).await {
                Ok(reply) if reply.success => {
                    self.local.delete(&key).await?;
                    info!("Re-sent session {} from {}", session.session_id, key);
                    report.sent += 1;
                }
                Ok(reply) => {
                    warn!(
                        "Server refused session {}: {}",
                        session.session_id,
                        reply.message.unwrap_or_default()
                    );
                    report.failed += 1;
                }
                Err(e) => {
                    warn!("Re-sending session {} failed: {}", session.session_id, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

/// `keystroke_data_{context}_{timestamp-with-dashes}_{session prefix}`
pub fn local_key(session: &Session) -> String {
    let stamp = session
        .timestamp
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    let prefix: String = session.session_id.chars().take(8).collect();

    format!(
        "{}{}_{}_{}",
        LOCAL_SESSION_PREFIX, session.context, stamp, prefix
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local_store::LocalStoreConfig;
    use chrono::{TimeZone, Utc};
    use common::emotion::ManualEmotionVector;
    use common::session::{Context, DetectionType, DeviceInfo, Emotions};
    use std::sync::Mutex;

    struct FakeTransport {
        reachable: bool,
        replies: Mutex<Vec<Result<ServerReply, TransportError>>>,
        sent: Mutex<Vec<String>>,
    }

    impl FakeTransport {
        fn new(reachable: bool, replies: Vec<Result<ServerReply, TransportError>>) -> Self {
            Self {
                reachable,
                replies: Mutex::new(replies),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SessionTransport for FakeTransport {
        async fn probe(&self) -> bool {
            self.reachable
        }

        async fn send(&self, session: &Session) -> Result<ServerReply, TransportError> {
            self.sent.lock().unwrap().push(session.session_id.clone());
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                return Ok(ServerReply {
                    success: true,
                    ..Default::default()
                });
            }
            replies.remove(0)
        }
    }

    fn session(id: &str) -> Session {
        let mut emotions = ManualEmotionVector::with_keys(&ManualEmotionVector::MANUAL_KEYS);
        emotions.set("happy", 80);
        Session {
            user_id: "u-1".to_string(),
            session_id: id.to_string(),
            context: Context::Manual,
            text: "hello world".to_string(),
            timings: Vec::new(),
            keystroke_data: Vec::new(),
            emotions: Emotions::Manual(emotions),
            emotion_timeline: Vec::new(),
            session_duration: 0.0,
            keystroke_count: 0,
            typing_speed: 0.0,
            camera_active: false,
            music_id: "None".to_string(),
            device_info: DeviceInfo::default(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 15).unwrap(),
            detection_type: DetectionType::Manual,
            typing_mode: None,
            fixed_text: None,
        }
    }

    async fn local(tmp: &tempfile::TempDir) -> LocalStore {
        LocalStore::new(&LocalStoreConfig {
            root: tmp.path().to_path_buf(),
        })
        .await
        .unwrap()
    }

    #[test]
    fn test_local_key_format() {
        let key = local_key(&session("0123456789abcdef"));
        assert_eq!(key, "keystroke_data_manual_2024-05-01T12-30-15-000Z_01234567");
    }

    #[tokio::test]
    async fn test_unreachable_server_saves_locally_without_sending() {
        let tmp = tempfile::tempdir().unwrap();
        let transport = Arc::new(FakeTransport::new(false, Vec::new()));
        let client = PersistenceClient::new(transport.clone(), local(&tmp).await, true);

        let result = client.save(&session("s-1")).await.unwrap();
        assert!(result.success);
        assert_eq!(result.stored_where, StoredWhere::Local);
        assert!(transport.sent.lock().unwrap().is_empty());

        let stored = client
            .local
            .get(result.local_key.as_deref().unwrap())
            .await
            .unwrap()
            .unwrap();
        let stored: Session = serde_json::from_str(&stored).unwrap();
        assert_eq!(stored.session_id, "s-1");
    }

    #[tokio::test]
    async fn test_application_failure_falls_back_with_server_message() {
        let tmp = tempfile::tempdir().unwrap();
        let transport = Arc::new(FakeTransport::new(
            true,
            vec![Ok(ServerReply {
                success: false,
                message: Some("disk full".to_string()),
                ..Default::default()
            })],
        ));
        let client = PersistenceClient::new(transport, local(&tmp).await, true);

        let result = client.save(&session("s-2")).await.unwrap();
        assert_eq!(result.stored_where, StoredWhere::Local);
        assert!(result.message.contains("disk full"));
    }

    #[tokio::test]
    async fn test_flush_resends_and_skips_corrupted_records() {
        let tmp = tempfile::tempdir().unwrap();
        let store = local(&tmp).await;
        let offline = PersistenceClient::new(
            Arc::new(FakeTransport::new(false, Vec::new())),
            store.clone(),
            true,
        );
        offline.save(&session("s-3")).await.unwrap();
        store
            .set("keystroke_data_manual_broken", "{not json")
            .await
            .unwrap();

        let transport = Arc::new(FakeTransport::new(true, Vec::new()));
        let online = PersistenceClient::new(transport.clone(), store.clone(), true);
        let report = online.flush_pending().await.unwrap();

        assert_eq!(
            report,
            FlushReport {
                sent: 1,
                failed: 0,
                corrupted: 1
            }
        );
        assert_eq!(*transport.sent.lock().unwrap(), vec!["s-3".to_string()]);
        assert_eq!(
            store.keys(LOCAL_SESSION_PREFIX).await.unwrap(),
            vec!["keystroke_data_manual_broken"]
        );
    }
}
