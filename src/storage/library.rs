//! Recording collections on top of the key-value store
//!
//! Both collections are ordered most-recent-first and capped; inserting at
//! the head evicts from the tail. All writes go through one lock so racing
//! handlers cannot lose each other's updates.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    KeyValueStore, StoreError, API_CONFIG_KEY, LOCAL_RECORDINGS_KEY, RECORDINGS_KEY, SETTINGS_KEY,
};
use crate::data::{ApiCredentials, RecordingRecord, Settings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    /// Uploaded recordings
    Synced,
    /// On-device recordings, usually pending sync
    Local,
}

impl Collection {
    fn key(&self) -> &'static str {
        match self {
            Collection::Synced => RECORDINGS_KEY,
            Collection::Local => LOCAL_RECORDINGS_KEY,
        }
    }
}

pub struct RecordingLibrary {
    store: Arc<dyn KeyValueStore>,
    max_synced: usize,
    max_local: usize,
    write_lock: Mutex<()>,
}

impl RecordingLibrary {
    pub fn new(store: Arc<dyn KeyValueStore>, max_synced: usize, max_local: usize) -> Self {
        Self {
            store,
            max_synced: max_synced.max(1),
            max_local: max_local.max(1),
            write_lock: Mutex::new(()),
        }
    }

    fn cap(&self, collection: Collection) -> usize {
        match collection {
            Collection::Synced => self.max_synced,
            Collection::Local => self.max_local,
        }
    }

    async fn read<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, StoreError> {
        match self.store.get(key).await? {
            Some(value) => serde_json::from_value(value).map_err(|source| StoreError::Malformed {
                key: key.to_string(),
                source,
            }),
            None => Ok(T::default()),
        }
    }

    async fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value).map_err(|source| StoreError::Malformed {
            key: key.to_string(),
            source,
        })?;
        self.store.set(key, value).await
    }

    pub async fn records(&self, collection: Collection) -> Result<Vec<RecordingRecord>, StoreError> {
        self.read(collection.key()).await
    }

    /// Insert `record` at the head of `collection`, trimming the tail
    pub async fn prepend(
        &self,
        collection: Collection,
        record: RecordingRecord,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.records(collection).await?;
        records.retain(|existing| existing.id != record.id);
        records.insert(0, record);
        self.trim(collection, &mut records);
        self.write(collection.key(), &records).await
    }

    /// Replace the whole collection (e.g. after listing the remote store)
    pub async fn replace(
        &self,
        collection: Collection,
        mut records: Vec<RecordingRecord>,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.trim(collection, &mut records);
        self.write(collection.key(), &records).await
    }

    /// Remove the record with `id`, returning it if it was present
    pub async fn remove(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<RecordingRecord>, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.records(collection).await?;
        let Some(index) = records.iter().position(|record| record.id == id) else {
            return Ok(None);
        };
        let removed = records.remove(index);
        self.write(collection.key(), &records).await?;
        Ok(Some(removed))
    }

    /// Locate a record by id in either collection
    pub async fn find(
        &self,
        id: &str,
    ) -> Result<Option<(Collection, RecordingRecord)>, StoreError> {
        for collection in [Collection::Local, Collection::Synced] {
            if let Some(record) = self
                .records(collection)
                .await?
                .into_iter()
                .find(|record| record.id == id)
            {
                return Ok(Some((collection, record)));
            }
        }
        Ok(None)
    }

    /// Apply the outcome of a reconciliation pass in one write per
    /// collection. `synced` pairs the local id with the now-synced record.
    /// Returns how many records were moved.
    ///
    /// The local collection is re-read under the lock, so recordings saved
    /// while the uploads were in flight survive, and recordings deleted in
    /// the meantime are not resurrected.
    pub async fn commit_sync(
        &self,
        synced: Vec<(String, RecordingRecord)>,
    ) -> Result<usize, StoreError> {
        if synced.is_empty() {
            return Ok(0);
        }

        let _guard = self.write_lock.lock().await;

        let mut local = self.records(Collection::Local).await?;
        let present: HashSet<&str> = local.iter().map(|record| record.id.as_str()).collect();
        let (synced, gone): (Vec<_>, Vec<_>) = synced
            .into_iter()
            .partition(|(local_id, _)| present.contains(local_id.as_str()));
        for (local_id, record) in &gone {
            info!(
                "Recording {} was deleted during sync, not listing {}",
                local_id, record.id
            );
        }
        if synced.is_empty() {
            return Ok(0);
        }

        // Synced first: a crash between the writes duplicates, never loses
        let mut remote = self.records(Collection::Synced).await?;
        let new_ids: HashSet<&str> = synced.iter().map(|(_, record)| record.id.as_str()).collect();
        remote.retain(|record| !new_ids.contains(record.id.as_str()));
        for (_, record) in synced.iter().rev() {
            remote.insert(0, record.clone());
        }
        self.trim(Collection::Synced, &mut remote);
        self.write(RECORDINGS_KEY, &remote).await?;

        let local_ids: HashSet<&str> = synced.iter().map(|(id, _)| id.as_str()).collect();
        local.retain(|record| !local_ids.contains(record.id.as_str()));
        self.write(LOCAL_RECORDINGS_KEY, &local).await?;

        info!(
            "Committed {} synced recording(s); {} local recording(s) remain",
            synced.len(),
            local.len()
        );
        Ok(synced.len())
    }

    /// Cut `records` down to the collection's cap. Returns the ids of
    /// evicted records whose media was never uploaded.
    fn trim(&self, collection: Collection, records: &mut Vec<RecordingRecord>) -> Vec<String> {
        let cap = self.cap(collection);
        if records.len() <= cap {
            return Vec::new();
        }

        let evicted = records.split_off(cap);
        let unsynced: Vec<String> = evicted
            .iter()
            .filter(|record| record.needs_sync)
            .map(|record| record.id.clone())
            .collect();
        if !unsynced.is_empty() {
            warn!(
                "Evicted {} unsynced recording(s) from {:?}, media lost: {:?}",
                unsynced.len(),
                collection,
                unsynced
            );
        }
        debug!("Evicted {} oldest record(s) from {:?}", evicted.len(), collection);
        unsynced
    }

    pub async fn settings(&self) -> Result<Settings, StoreError> {
        self.read(SETTINGS_KEY).await
    }

    pub async fn save_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.write(SETTINGS_KEY, settings).await
    }

    pub async fn credentials(&self) -> Result<ApiCredentials, StoreError> {
        self.read(API_CONFIG_KEY).await
    }

    pub async fn save_credentials(&self, credentials: &ApiCredentials) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.write(API_CONFIG_KEY, credentials).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{local_record, MemoryStore};

    fn library(max_synced: usize, max_local: usize) -> RecordingLibrary {
        RecordingLibrary::new(Arc::new(MemoryStore::default()), max_synced, max_local)
    }

    #[tokio::test]
    async fn test_prepend_keeps_most_recent_first_and_caps() {
        let library = library(10, 3);
        for n in 0..5 {
            library
                .prepend(Collection::Local, local_record(n))
                .await
                .unwrap();
        }

        let ids: Vec<String> = library
            .records(Collection::Local)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["local_4", "local_3", "local_2"]);
    }

    #[tokio::test]
    async fn test_remove_and_find() {
        let library = library(10, 10);
        library
            .prepend(Collection::Local, local_record(1))
            .await
            .unwrap();

        let (collection, record) = library.find("local_1").await.unwrap().unwrap();
        assert_eq!(collection, Collection::Local);
        assert_eq!(record.id, "local_1");

        assert!(library
            .remove(Collection::Local, "local_1")
            .await
            .unwrap()
            .is_some());
        assert!(library.find("local_1").await.unwrap().is_none());
        assert!(library
            .remove(Collection::Local, "local_1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_commit_sync_moves_records_and_keeps_new_locals() {
        let library = library(10, 10);
        library
            .prepend(Collection::Local, local_record(1))
            .await
            .unwrap();
        library
            .prepend(Collection::Local, local_record(2))
            .await
            .unwrap();

        // Saved while a sync pass was in flight
        library
            .prepend(Collection::Local, local_record(3))
            .await
            .unwrap();

        let mut synced = local_record(2);
        synced.mark_synced("srv_2".to_string(), None);
        library
            .commit_sync(vec![("local_2".to_string(), synced)])
            .await
            .unwrap();

        let local: Vec<String> = library
            .records(Collection::Local)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(local, vec!["local_3", "local_1"]);

        let remote = library.records(Collection::Synced).await.unwrap();
        assert_eq!(remote.len(), 1);
        assert_eq!(remote[0].id, "srv_2");
        assert!(remote[0].payload.is_none());
    }

    #[tokio::test]
    async fn test_commit_sync_skips_records_deleted_mid_pass() {
        let library = library(10, 10);
        library
            .prepend(Collection::Local, local_record(1))
            .await
            .unwrap();
        library.remove(Collection::Local, "local_1").await.unwrap();

        let mut synced = local_record(1);
        synced.mark_synced("srv_1".to_string(), None);
        let moved = library
            .commit_sync(vec![("local_1".to_string(), synced)])
            .await
            .unwrap();

        assert_eq!(moved, 0);
        assert!(library.records(Collection::Synced).await.unwrap().is_empty());
        assert!(library.records(Collection::Local).await.unwrap().is_empty());
    }

    #[test]
    fn test_trim_reports_unsynced_evictions() {
        let library = library(10, 2);
        let mut uploaded = local_record(0);
        uploaded.mark_synced("srv_0".to_string(), None);
        let mut records = vec![local_record(3), local_record(2), local_record(1), uploaded];

        let lost = library.trim(Collection::Local, &mut records);

        assert_eq!(records.len(), 2);
        assert_eq!(lost, vec!["local_1".to_string()]);
        assert!(library.trim(Collection::Local, &mut records).is_empty());
    }

    #[tokio::test]
    async fn test_settings_default_when_missing() {
        let library = library(10, 10);
        assert_eq!(library.settings().await.unwrap(), Settings::default());

        let settings = Settings {
            auto_upload: false,
            ..Settings::default()
        };
        library.save_settings(&settings).await.unwrap();
        assert!(!library.settings().await.unwrap().auto_upload);
    }
}
