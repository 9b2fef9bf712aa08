//! Fake collaborators for unit tests

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::capture::{CaptureCommand, CaptureError, CaptureSurface};
use crate::coordinator::{Clock, CoordinatorEvent, Observer, ObserverError};
use crate::data::{Platform, RecordingMetadata, RecordingRecord};
use crate::storage::{KeyValueStore, StoreError};
use crate::ui::{Notification, Notifier};
use crate::upload::{ApiError, RemoteApi, RemoteRecording};

pub fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

/// A pending local record with id `local_{n}` and title `Recording {n}`
pub fn local_record(n: u64) -> RecordingRecord {
    let start = epoch() + Duration::minutes(n as i64);
    RecordingRecord {
        id: format!("local_{}", n),
        title: format!("Recording {}", n),
        url: "https://meet.google.com/abc-defg-hij".to_string(),
        duration: 30,
        start_time: start,
        end_time: start + Duration::seconds(30),
        file_size: 3,
        mime_type: "video/webm".to_string(),
        platform: Some(Platform::GoogleMeet),
        is_local: true,
        needs_sync: true,
        payload: Some(vec![1, 2, 3]),
    }
}

#[derive(Default)]
pub struct FakeCapture {
    calls: Mutex<Vec<String>>,
    fail_prepare: AtomicBool,
    fail_commands: AtomicBool,
    prepare_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_fail_prepare(&self, fail: bool) {
        self.fail_prepare.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_commands(&self, fail: bool) {
        self.fail_commands.store(fail, Ordering::SeqCst);
    }

    /// Make the next `prepare` wait until the returned gate is notified
    pub fn hold_prepare(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.prepare_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Yield until `name` has been called at least once
    pub async fn wait_for_call(&self, name: &str) {
        while !self.calls().iter().any(|call| call == name) {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait::async_trait]
impl CaptureSurface for FakeCapture {
    async fn prepare(&self) -> Result<(), CaptureError> {
        self.calls.lock().unwrap().push("prepare".to_string());
        let gate = self.prepare_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_prepare.load(Ordering::SeqCst) {
            return Err(CaptureError::ReadyTimeout(10));
        }
        Ok(())
    }

    async fn send(&self, command: CaptureCommand) -> Result<(), CaptureError> {
        self.calls.lock().unwrap().push(command.name().to_string());
        if self.fail_commands.load(Ordering::SeqCst) {
            return Err(CaptureError::Unreachable("offscreen document closed".to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                path: format!("{}.json", key).into(),
                source: std::io::Error::other("quota exceeded"),
            });
        }
        self.values.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeApi {
    uploads: Mutex<Vec<RecordingMetadata>>,
    fail_all: AtomicBool,
    fail_titles: Mutex<HashSet<String>>,
    delay: Option<std::time::Duration>,
    next_id: AtomicUsize,
    remote: Mutex<Vec<RemoteRecording>>,
    deleted: Mutex<Vec<String>>,
    token: Mutex<Option<String>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    pub fn fail_title(&self, title: &str) {
        self.fail_titles.lock().unwrap().insert(title.to_string());
    }

    pub fn set_remote(&self, recordings: Vec<RemoteRecording>) {
        *self.remote.lock().unwrap() = recordings;
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    pub fn uploaded_titles(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.title.clone())
            .collect()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl RemoteApi for FakeApi {
    async fn upload(
        &self,
        _payload: &[u8],
        metadata: &RecordingMetadata,
    ) -> Result<RemoteRecording, ApiError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.uploads.lock().unwrap().push(metadata.clone());

        if self.fail_all.load(Ordering::SeqCst)
            || self.fail_titles.lock().unwrap().contains(&metadata.title)
        {
            return Err(ApiError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RemoteRecording {
            id: format!("srv_{}", n),
            title: None,
            url: Some(format!("https://recordings.example.com/r/{}", n)),
            duration: None,
            start_time: None,
            end_time: None,
            file_size: None,
            mime_type: None,
            platform: None,
        })
    }

    async fn list(&self) -> Result<Vec<RemoteRecording>, ApiError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(ApiError::Unauthorized);
        }
        Ok(self.remote.lock().unwrap().clone())
    }

    async fn delete(&self, id: &str) -> Result<(), ApiError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(ApiError::Unauthorized);
        }
        self.deleted.lock().unwrap().push(id.to_string());
        Ok(())
    }

    async fn login(&self, email: &str, password: &str) -> Result<String, ApiError> {
        if password.is_empty() {
            return Err(ApiError::Rejected("invalid credentials".to_string()));
        }
        let token = format!("token-for-{}", email);
        self.set_token(Some(token.clone()));
        Ok(token)
    }

    async fn logout(&self) -> Result<(), ApiError> {
        self.set_token(None);
        Ok(())
    }

    fn set_token(&self, token: Option<String>) {
        *self.token.lock().unwrap() = token;
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.notifications.lock().unwrap().push(notification);
    }
}

pub struct RecordingObserver {
    id: String,
    events: Mutex<Vec<CoordinatorEvent>>,
}

impl RecordingObserver {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<CoordinatorEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Observer for RecordingObserver {
    fn id(&self) -> &str {
        &self.id
    }

    async fn deliver(&self, event: &CoordinatorEvent) -> Result<(), ObserverError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub struct FailingObserver {
    id: String,
}

impl FailingObserver {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

#[async_trait::async_trait]
impl Observer for FailingObserver {
    fn id(&self) -> &str {
        &self.id
    }

    async fn deliver(&self, _event: &CoordinatorEvent) -> Result<(), ObserverError> {
        Err(ObserverError::Disconnected(self.id.clone()))
    }
}

/// Clock that only moves when told to
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, secs: i64) {
        let mut now = self.now.lock().unwrap();
        *now = *now + Duration::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
