use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::data::RecordingRecord;
use crate::storage::{Collection, RecordingLibrary, StoreError};
use crate::upload::RemoteApi;

/// Outcome of one reconciliation pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Records that needed syncing when the pass began
    pub attempted: usize,
    pub synced: usize,
    /// Local ids that are still pending
    pub failed: Vec<String>,
}

/// Uploads local recordings that are still pending sync
pub struct Reconciler {
    library: Arc<RecordingLibrary>,
    api: Arc<dyn RemoteApi>,
    /// Held for the whole pass. Keeps uploads whose final write failed,
    /// keyed by local id, so they are committed rather than uploaded twice.
    uncommitted: Mutex<Vec<(String, RecordingRecord)>>,
}

impl Reconciler {
    pub fn new(library: Arc<RecordingLibrary>, api: Arc<dyn RemoteApi>) -> Self {
        Self {
            library,
            api,
            uncommitted: Mutex::new(Vec::new()),
        }
    }

    /// Upload every pending local recording, oldest position last.
    ///
    /// Passes are serialized: a caller arriving mid-pass waits for it and
    /// then only sees what is still pending. A failed upload leaves that
    /// record untouched and never aborts the batch.
    pub async fn sync_pending(&self) -> Result<SyncReport, StoreError> {
        let mut uncommitted = self.uncommitted.lock().await;

        let pending: Vec<_> = self
            .library
            .records(Collection::Local)
            .await?
            .into_iter()
            .filter(|record| record.needs_sync)
            .filter(|record| !uncommitted.iter().any(|(id, _)| *id == record.id))
            .collect();

        let mut report = SyncReport {
            attempted: pending.len() + uncommitted.len(),
            ..SyncReport::default()
        };
        if report.attempted == 0 {
            debug!("No recordings pending sync");
            return Ok(report);
        }

        if !uncommitted.is_empty() {
            info!(
                "Committing {} recording(s) uploaded by an earlier pass",
                uncommitted.len()
            );
        }
        info!("Syncing {} pending recording(s)", pending.len());

        let mut synced = std::mem::take(&mut *uncommitted);
        for mut record in pending {
            let Some(payload) = record.payload.take() else {
                warn!("Recording {} is pending but has no media, skipping", record.id);
                report.failed.push(record.id);
                continue;
            };

            match self.api.upload(&payload, &record.metadata()).await {
                Ok(remote) => {
                    let local_id = record.id.clone();
                    record.mark_synced(remote.id, remote.url);
                    debug!("Synced {} as {}", local_id, record.id);
                    synced.push((local_id, record));
                }
                Err(e) => {
                    warn!("Failed to sync recording {}: {}", record.id, e);
                    report.failed.push(record.id);
                }
            }
        }

        report.synced = synced.len();
        if let Err(e) = self.library.commit_sync(synced.clone()).await {
            error!(
                "Uploaded {} recording(s) but could not update the library: {}",
                synced.len(),
                e
            );
            *uncommitted = synced;
            return Ok(report);
        }

        info!(
            "Sync finished: {} uploaded, {} still pending",
            report.synced,
            report.failed.len()
        );
        Ok(report)
    }
}
