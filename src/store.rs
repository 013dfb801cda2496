//! Shared latest-frame store.
//!
//! One record per camera, atomically replaced on every write. Workers are the
//! writers (each owns exactly one key); the display multiplexer and
//! `get_frames()` callers are the readers. Critical sections only copy a
//! record in or out -- pixel buffers are behind `Arc`, so neither `put` nor
//! `get_all` copies pixels while holding the lock.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::frame::{CameraId, FrameRecord};

#[derive(Debug, Default)]
pub struct FrameStore {
    inner: Mutex<HashMap<CameraId, FrameRecord>>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the camera's record. The previous record, if any, is dropped.
    pub fn put(&self, record: FrameRecord) {
        self.lock().insert(record.camera_id, record);
    }

    pub fn get(&self, camera_id: CameraId) -> Option<FrameRecord> {
        self.lock().get(&camera_id).cloned()
    }

    /// Point-in-time snapshot of every camera's latest record.
    ///
    /// The snapshot is decoupled from later writes; records appear fully
    /// formed or not at all.
    pub fn get_all(&self) -> HashMap<CameraId, FrameRecord> {
        self.lock().clone()
    }

    /// Drop the camera's record, marking it not-live.
    pub fn remove(&self, camera_id: CameraId) -> Option<FrameRecord> {
        self.lock().remove(&camera_id)
    }

    /// Ids of cameras whose latest record is at most `max_age` old, sorted.
    pub fn live_ids(&self, max_age: Duration) -> Vec<CameraId> {
        let mut ids: Vec<CameraId> = self
            .lock()
            .iter()
            .filter(|(_, record)| record.age() <= max_age)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CameraId, FrameRecord>> {
        // A poisoned map is still coherent (writes are single insert/remove
        // calls), so keep serving rather than cascading the panic.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
