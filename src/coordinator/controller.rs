//! The coordinator proper
//!
//! Session transitions are accepted synchronously under the session lock
//! and only then is the capture surface driven. A capture failure rolls the
//! accepted transition back, so the session is never left claiming a state
//! the capture surface is not in.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::observers::ObserverRegistry;
use super::session::{Clock, FinishedSession, RecordingSession};
use super::{CoordinatorError, CoordinatorEvent, StatusSnapshot};
use crate::capture::{CaptureCommand, CaptureEvent, CaptureOptions, CaptureSurface, MediaArtifact};
use crate::data::{
    clean_title, detect_meeting, platform_for_url, ApiCredentials, MeetingInfo,
    RecordingMetadata, RecordingRecord, Settings, TabContext,
};
use crate::storage::{Collection, RecordingLibrary};
use crate::sync::{Reconciler, SyncReport};
use crate::ui::{Notification, Notifier};
use crate::upload::RemoteApi;

/// A stop that was accepted and whose artifact has not arrived yet
#[derive(Debug, Clone)]
struct PendingStop {
    generation: u64,
    finished: FinishedSession,
    tab: TabContext,
}

pub struct Coordinator {
    capture: Arc<dyn CaptureSurface>,
    library: Arc<RecordingLibrary>,
    api: Arc<dyn RemoteApi>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    observers: ObserverRegistry,
    reconciler: Reconciler,
    session: Mutex<RecordingSession>,
    pending: Mutex<VecDeque<PendingStop>>,
    context: Mutex<TabContext>,
    /// Serializes capture commands with the broadcasts that follow them
    commands: tokio::sync::Mutex<()>,
    last_local_id: AtomicI64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Coordinator {
    pub fn new(
        capture: Arc<dyn CaptureSurface>,
        library: Arc<RecordingLibrary>,
        api: Arc<dyn RemoteApi>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let reconciler = Reconciler::new(library.clone(), api.clone());
        Self {
            capture,
            library,
            api,
            notifier,
            clock,
            observers: ObserverRegistry::new(),
            reconciler,
            session: Mutex::new(RecordingSession::default()),
            pending: Mutex::new(VecDeque::new()),
            context: Mutex::new(TabContext::default()),
            commands: tokio::sync::Mutex::new(()),
            last_local_id: AtomicI64::new(0),
        }
    }

    /// Restore the stored API token
    pub async fn init(&self) -> Result<(), CoordinatorError> {
        let credentials = self.library.credentials().await?;
        if credentials.token.is_some() {
            info!(
                "Restored session for {}",
                credentials.email.as_deref().unwrap_or("unknown user")
            );
        }
        self.api.set_token(credentials.token);
        Ok(())
    }

    pub fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }

    pub fn status(&self) -> StatusSnapshot {
        lock(&self.session).snapshot(self.clock.now())
    }

    /// Remember the tab a recording belongs to
    pub fn update_context(&self, tab: TabContext) {
        debug!("Tab context updated: {}", tab.url);
        *lock(&self.context) = tab;
    }

    fn context(&self) -> TabContext {
        lock(&self.context).clone()
    }

    pub async fn start(
        &self,
        options: CaptureOptions,
        tab: Option<TabContext>,
    ) -> Result<DateTime<Utc>, CoordinatorError> {
        let now = self.clock.now();
        let generation = lock(&self.session).begin(options.clone(), now)?;
        if let Some(tab) = tab {
            self.update_context(tab);
        }

        info!(
            "Starting recording (screen: {}, audio: {}, system audio: {})",
            options.include_screen, options.include_audio, options.include_system_audio
        );

        if let Err(e) = self.capture.prepare().await {
            if lock(&self.session).rollback(generation) {
                warn!("Capture surface unavailable, start rolled back: {}", e);
            }
            return Err(e.into());
        }

        let _commands = self.commands.lock().await;

        // A stop may have been accepted while the surface was coming up
        if !lock(&self.session).mark_capture_started(generation) {
            info!("Recording was stopped while capture was being prepared");
            return Err(CoordinatorError::StartCancelled);
        }

        if let Err(e) = self.capture.send(CaptureCommand::Start { options }).await {
            if lock(&self.session).rollback(generation) {
                warn!("Start command failed, start rolled back: {}", e);
            }
            return Err(e.into());
        }

        self.broadcast(CoordinatorEvent::Started { start_time: now }).await;
        Ok(now)
    }

    pub async fn pause(&self) -> Result<(), CoordinatorError> {
        let _commands = self.commands.lock().await;
        let generation = {
            let mut session = lock(&self.session);
            if session.is_active() && !session.capture_started() {
                return Err(CoordinatorError::CaptureStarting);
            }
            session.pause(self.clock.now())?
        };

        if let Err(e) = self.capture.send(CaptureCommand::Pause).await {
            lock(&self.session).undo_pause(generation);
            warn!("Pause failed, still recording: {}", e);
            return Err(e.into());
        }

        info!("Recording paused");
        self.broadcast(CoordinatorEvent::Paused).await;
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), CoordinatorError> {
        let _commands = self.commands.lock().await;
        let (generation, segment, paused_at) = {
            let mut session = lock(&self.session);
            if session.is_active() && !session.capture_started() {
                return Err(CoordinatorError::CaptureStarting);
            }
            let paused_at = session.paused_at();
            let (generation, segment) = session.resume(self.clock.now())?;
            (generation, segment, paused_at)
        };

        if let Err(e) = self.capture.send(CaptureCommand::Resume).await {
            if let Some(paused_at) = paused_at {
                lock(&self.session).undo_resume(generation, segment, paused_at);
            }
            warn!("Resume failed, still paused: {}", e);
            return Err(e.into());
        }

        info!("Recording resumed");
        self.broadcast(CoordinatorEvent::Resumed).await;
        Ok(())
    }

    /// Stop the session. The session is idle as soon as this is accepted;
    /// the artifact is finalized when the capture surface delivers it.
    pub async fn stop(&self, tab: Option<TabContext>) -> Result<(), CoordinatorError> {
        let _commands = self.commands.lock().await;
        let (generation, finished, capture_started) = {
            let mut session = lock(&self.session);
            let generation = session.generation();
            let capture_started = session.capture_started();
            (generation, session.finish(self.clock.now())?, capture_started)
        };

        if let Some(tab) = tab {
            self.update_context(tab);
        }

        if !capture_started {
            // The pending start sees the session gone and never sends Start
            info!("Recording stopped before capture started");
            self.broadcast(CoordinatorEvent::Stopped).await;
            return Ok(());
        }

        info!(
            "Recording stopped after {}s ({}s paused)",
            finished.duration_secs, finished.paused_secs
        );

        lock(&self.pending).push_back(PendingStop {
            generation,
            finished,
            tab: self.context(),
        });

        let sent = self.capture.send(CaptureCommand::Stop).await;
        if let Err(e) = &sent {
            error!("Stop command did not reach the capture surface: {}", e);
            lock(&self.pending).retain(|pending| pending.generation != generation);
        }

        self.broadcast(CoordinatorEvent::Stopped).await;
        sent.map_err(CoordinatorError::from)
    }

    /// Consume capture events in arrival order until the channel closes
    pub async fn run_capture_events(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<CaptureEvent>,
    ) {
        while let Some(event) = events.recv().await {
            self.handle_capture_event(event).await;
        }
        debug!("Capture event channel closed");
    }

    pub async fn handle_capture_event(&self, event: CaptureEvent) {
        match event {
            CaptureEvent::Started => debug!("Capture hardware is live"),
            CaptureEvent::CaptureError(error) => self.fail(error, true).await,
            CaptureEvent::RecordingError(error) => self.fail(error, false).await,
            CaptureEvent::Complete(artifact) => {
                let pending = self.take_pending_or_finish().await;
                if let Err(e) = self.finalize(pending, artifact).await {
                    error!("Recording could not be kept: {}", e);
                }
            }
        }
    }

    /// Match a completed artifact to its stop. A completion nobody asked
    /// for (the capture side ended on its own) is still kept.
    async fn take_pending_or_finish(&self) -> PendingStop {
        if let Some(pending) = lock(&self.pending).pop_front() {
            return pending;
        }

        let _commands = self.commands.lock().await;
        let now = self.clock.now();
        let finished = {
            let mut session = lock(&self.session);
            let generation = session.generation();
            if session.capture_started() {
                session.finish(now).ok().map(|finished| (generation, finished))
            } else {
                None
            }
        };

        match finished {
            Some((generation, finished)) => {
                warn!("Capture surface ended the recording without a stop");
                self.broadcast(CoordinatorEvent::Stopped).await;
                PendingStop {
                    generation,
                    finished,
                    tab: self.context(),
                }
            }
            None => {
                warn!("Received a recording with no session, keeping it anyway");
                PendingStop {
                    generation: 0,
                    finished: FinishedSession {
                        start_time: now,
                        end_time: now,
                        paused_secs: 0,
                        duration_secs: 0,
                        options: CaptureOptions::default(),
                    },
                    tab: self.context(),
                }
            }
        }
    }

    /// Attribute a capture failure to the session it belongs to. A start
    /// failure concerns the live session; a recording failure belongs to
    /// the oldest stop still waiting for its artifact, if there is one.
    async fn fail(&self, error: String, while_starting: bool) {
        let _commands = self.commands.lock().await;
        let claimed = if while_starting {
            self.fail_active() || self.fail_pending()
        } else {
            self.fail_pending() || self.fail_active()
        };

        if !claimed {
            debug!("Ignoring capture error with nothing in flight: {}", error);
            return;
        }

        error!("Capture failed: {}", error);
        self.broadcast(CoordinatorEvent::Failed {
            error: error.clone(),
        })
        .await;
        self.notifier.notify(Notification::RecordingError { error });
    }

    fn fail_active(&self) -> bool {
        let mut session = lock(&self.session);
        if session.is_active() && session.capture_started() {
            session.reset();
            true
        } else {
            false
        }
    }

    fn fail_pending(&self) -> bool {
        match lock(&self.pending).pop_front() {
            Some(pending) => {
                debug!(
                    "Capture failure belongs to stopped session {}",
                    pending.generation
                );
                true
            }
            None => false,
        }
    }

    async fn broadcast(&self, event: CoordinatorEvent) {
        let report = self.observers.broadcast(&event).await;
        if !report.failed.is_empty() {
            debug!(
                "Broadcast reached {} observer(s), missed {:?}",
                report.delivered, report.failed
            );
        }
    }

    /// Time-based local id, strictly increasing within this process
    fn next_local_id(&self, now: DateTime<Utc>) -> String {
        let millis = now.timestamp_millis();
        let previous = self
            .last_local_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(millis.max(last + 1))
            })
            .unwrap_or(millis - 1);
        RecordingRecord::local_id(millis.max(previous + 1))
    }

    /// Upload the artifact, falling back to local storage. Exactly one
    /// notification is emitted whatever happens.
    async fn finalize(
        &self,
        pending: PendingStop,
        artifact: MediaArtifact,
    ) -> Result<RecordingRecord, CoordinatorError> {
        let PendingStop { finished, tab, .. } = pending;
        let platform = platform_for_url(&tab.url);
        let metadata = RecordingMetadata {
            title: clean_title(platform, &tab.title, finished.start_time),
            url: tab.url,
            duration: finished.duration_secs,
            start_time: finished.start_time,
            end_time: finished.end_time,
            file_size: if artifact.size > 0 {
                artifact.size
            } else {
                artifact.data.len() as u64
            },
            mime_type: artifact.mime_type,
            platform,
        };

        let auto_upload = match self.library.settings().await {
            Ok(settings) => settings.auto_upload,
            Err(e) => {
                warn!("Could not read settings, uploading by default: {}", e);
                true
            }
        };

        if auto_upload {
            match self.api.upload(&artifact.data, &metadata).await {
                Ok(remote) => {
                    let record = remote.into_record(&metadata);
                    if let Err(e) = self.library.prepend(Collection::Synced, record.clone()).await
                    {
                        // The media is safe remotely; only the local listing lags
                        warn!("Uploaded {} but could not list it locally: {}", record.id, e);
                    }
                    info!("Recording \"{}\" uploaded as {}", record.title, record.id);
                    self.notifier.notify(Notification::RecordingSaved {
                        title: record.title.clone(),
                    });
                    self.announce(&record).await;
                    return Ok(record);
                }
                Err(e) => warn!("Upload failed, keeping recording locally: {}", e),
            }
        } else {
            debug!("Auto upload disabled, keeping recording locally");
        }

        let record = RecordingRecord {
            id: self.next_local_id(self.clock.now()),
            title: metadata.title,
            url: metadata.url,
            duration: metadata.duration,
            start_time: metadata.start_time,
            end_time: metadata.end_time,
            file_size: metadata.file_size,
            mime_type: metadata.mime_type,
            platform: metadata.platform,
            is_local: true,
            needs_sync: true,
            payload: Some(artifact.data),
        };

        match self.library.prepend(Collection::Local, record.clone()).await {
            Ok(()) => {
                info!("Recording \"{}\" saved locally as {}", record.title, record.id);
                self.notifier.notify(Notification::SavedLocally {
                    title: record.title.clone(),
                });
                self.announce(&record).await;
                Ok(record)
            }
            Err(e) => {
                self.notifier.notify(Notification::RecordingError {
                    error: format!("Recording could not be saved: {}", e),
                });
                Err(e.into())
            }
        }
    }

    async fn announce(&self, record: &RecordingRecord) {
        self.broadcast(CoordinatorEvent::RecordingSaved {
            record: record.summary(),
        })
        .await;
    }

    pub async fn sync_pending(&self) -> Result<SyncReport, CoordinatorError> {
        Ok(self.reconciler.sync_pending().await?)
    }

    /// Both collections, without media payloads
    pub async fn recordings(
        &self,
    ) -> Result<(Vec<RecordingRecord>, Vec<RecordingRecord>), CoordinatorError> {
        let summarize = |records: Vec<RecordingRecord>| {
            records.iter().map(RecordingRecord::summary).collect::<Vec<_>>()
        };
        let synced = self.library.records(Collection::Synced).await?;
        let local = self.library.records(Collection::Local).await?;
        Ok((summarize(synced), summarize(local)))
    }

    pub async fn delete_recording(&self, id: &str) -> Result<(), CoordinatorError> {
        let Some((collection, _)) = self.library.find(id).await? else {
            return Err(CoordinatorError::RecordingNotFound(id.to_string()));
        };

        if collection == Collection::Synced {
            self.api.delete(id).await?;
        }
        self.library.remove(collection, id).await?;
        info!("Deleted recording {}", id);
        Ok(())
    }

    /// Replace the synced collection with the server's listing
    pub async fn refresh_recordings(
        &self,
    ) -> Result<(Vec<RecordingRecord>, Vec<RecordingRecord>), CoordinatorError> {
        let remote = self.api.list().await?;
        let records = remote
            .into_iter()
            .map(|recording| recording.into_listed_record())
            .collect();
        self.library.replace(Collection::Synced, records).await?;
        self.recordings().await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(), CoordinatorError> {
        let token = self.api.login(email, password).await?;

        let mut credentials = self.library.credentials().await?;
        credentials.token = Some(token.clone());
        credentials.email = Some(email.to_string());
        self.library.save_credentials(&credentials).await?;
        self.api.set_token(Some(token));

        info!("Signed in as {}", email);
        Ok(())
    }

    pub async fn logout(&self) -> Result<(), CoordinatorError> {
        if let Err(e) = self.api.logout().await {
            warn!("Server logout failed, clearing token anyway: {}", e);
        }

        let credentials = self.library.credentials().await?;
        self.library
            .save_credentials(&ApiCredentials {
                token: None,
                email: None,
                ..credentials
            })
            .await?;
        self.api.set_token(None);

        info!("Signed out");
        Ok(())
    }

    pub async fn settings(&self) -> Result<Settings, CoordinatorError> {
        Ok(self.library.settings().await?)
    }

    pub async fn update_settings(&self, settings: Settings) -> Result<(), CoordinatorError> {
        self.library.save_settings(&settings).await?;
        debug!("Settings updated: {:?}", settings);
        Ok(())
    }

    pub fn detect_meeting(&self, url: &str) -> Option<MeetingInfo> {
        detect_meeting(url)
    }
}
