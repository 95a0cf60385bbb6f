//! # Queue Engine
//!
//! Owns the set of named, append-only queues local to one broker. Mirrors
//! `RDQueue/server/message_queue.py`'s `Queue`/`QueueManager`: cursors are
//! keyed by client id and initialized to zero the first time that client
//! pushes to the queue, not on any explicit subscribe.
//!
//! Durability: every mutating call rewrites a snapshot of the full queue map
//! to disk before returning, using write-temp-then-rename so a crash mid
//! write never leaves a torn snapshot on disk (the source's own
//! implementation overwrites the file in place).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::QueueError;

/// One named, owner-tagged, append-only message log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Queue {
    pub id: String,
    pub name: String,
    pub owner: Option<String>,
    messages: Vec<Vec<u8>>,
    cursors: HashMap<String, usize>,
}

impl Queue {
    fn new(name: String, owner: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            name,
            owner,
            messages: Vec::new(),
            cursors: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn cursor_of(&self, client_id: &str) -> Option<usize> {
        self.cursors.get(client_id).copied()
    }

    fn push(&mut self, sender_id: &str, payload: Vec<u8>) {
        self.messages.push(payload);
        self.cursors.entry(sender_id.to_string()).or_insert(0);
    }

    fn pop(&mut self, client_id: &str, queue_name: &str) -> Result<Vec<u8>, QueueError> {
        let position = *self
            .cursors
            .get(client_id)
            .ok_or_else(|| QueueError::ClientNotRegistered {
                client_id: client_id.to_string(),
                queue: queue_name.to_string(),
            })?;

        if position >= self.messages.len() {
            return Err(QueueError::EndOfStream {
                client_id: client_id.to_string(),
                queue: queue_name.to_string(),
            });
        }

        let value = self.messages[position].clone();
        self.cursors.insert(client_id.to_string(), position + 1);
        Ok(value)
    }
}

/// The on-disk representation of one broker's entire queue map.
type Snapshot = HashMap<String, Queue>;

/// In-memory queue map for one broker, with a snapshot file backing it.
///
/// All mutating methods are `&mut self` and the type is `Send`; callers
/// share one instance behind a `tokio::sync::Mutex` (see
/// [`QueueEngine::shared`]) so that `create_queue`/`push`/`pop` are totally
/// ordered.
pub struct QueueEngine {
    queues: Snapshot,
    snapshot_path: PathBuf,
}

impl QueueEngine {
    /// Loads state from `snapshot_path` if it exists, otherwise starts
    /// empty.
    pub fn new(snapshot_path: impl Into<PathBuf>) -> Result<Self, QueueError> {
        let snapshot_path = snapshot_path.into();
        let queues = if snapshot_path.exists() {
            let bytes = std::fs::read(&snapshot_path)
                .map_err(|e| QueueError::Snapshot(e.to_string()))?;
            bincode::deserialize(&bytes).map_err(|e| QueueError::Snapshot(e.to_string()))?
        } else {
            HashMap::new()
        };

        Ok(Self {
            queues,
            snapshot_path,
        })
    }

    /// Wraps a fresh engine in the `Arc<Mutex<_>>` every broker handler
    /// shares.
    pub fn shared(
        snapshot_path: impl Into<PathBuf>,
    ) -> Result<std::sync::Arc<Mutex<Self>>, QueueError> {
        Ok(std::sync::Arc::new(Mutex::new(Self::new(snapshot_path)?)))
    }

    /// Idempotent on `name`: returns the existing queue if present,
    /// otherwise creates it with `owner` as the creator.
    pub fn create_queue(&mut self, name: &str, owner: Option<String>) -> Result<Queue, QueueError> {
        if let Some(existing) = self.queues.get(name) {
            return Ok(existing.clone());
        }

        let queue = Queue::new(name.to_string(), owner);
        self.queues.insert(name.to_string(), queue.clone());
        self.write_snapshot()?;
        Ok(queue)
    }

    /// Appends `payload` to `queue_name` as `sender_id`, initializing that
    /// client's cursor to zero if this is its first push.
    pub fn push(
        &mut self,
        queue_name: &str,
        sender_id: &str,
        payload: Vec<u8>,
    ) -> Result<(), QueueError> {
        let queue = self
            .queues
            .get_mut(queue_name)
            .ok_or_else(|| QueueError::UnknownQueue {
                name: queue_name.to_string(),
            })?;
        queue.push(sender_id, payload);
        self.write_snapshot()
    }

    /// Reads the next unread message for `client_id` on `queue_name` and
    /// advances its cursor.
    pub fn pop(&mut self, queue_name: &str, client_id: &str) -> Result<Vec<u8>, QueueError> {
        let queue = self
            .queues
            .get_mut(queue_name)
            .ok_or_else(|| QueueError::UnknownQueue {
                name: queue_name.to_string(),
            })?;
        let value = queue.pop(client_id, queue_name)?;
        self.write_snapshot()?;
        Ok(value)
    }

    pub fn get(&self, queue_name: &str) -> Option<&Queue> {
        self.queues.get(queue_name)
    }

    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    /// Writes the full queue map to a temp file in the snapshot directory
    /// and renames it into place, so a crash between the write and the
    /// rename never leaves a partially-written snapshot at `snapshot_path`.
    fn write_snapshot(&self) -> Result<(), QueueError> {
        let parent = self
            .snapshot_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(|e| QueueError::Snapshot(e.to_string()))?;

        let bytes =
            bincode::serialize(&self.queues).map_err(|e| QueueError::Snapshot(e.to_string()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| QueueError::Snapshot(e.to_string()))?;
        use std::io::Write;
        tmp.write_all(&bytes)
            .map_err(|e| QueueError::Snapshot(e.to_string()))?;
        tmp.flush().map_err(|e| QueueError::Snapshot(e.to_string()))?;
        tmp.persist(&self.snapshot_path)
            .map_err(|e| QueueError::Snapshot(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn engine() -> (QueueEngine, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broker.snapshot");
        (QueueEngine::new(path).unwrap(), dir)
    }

    #[test]
    fn create_queue_is_idempotent() {
        let (mut engine, _dir) = engine();
        let a = engine.create_queue("test", Some("owner".into())).unwrap();
        let b = engine.create_queue("test", Some("someone-else".into())).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.owner.as_deref(), Some("owner"));
    }

    #[test]
    fn push_then_pop_in_order() {
        let (mut engine, _dir) = engine();
        engine.create_queue("test", Some("x".into())).unwrap();
        engine.push("test", "x", b"a".to_vec()).unwrap();
        engine.push("test", "x", b"b".to_vec()).unwrap();
        engine.push("test", "x", b"c".to_vec()).unwrap();

        assert_eq!(engine.pop("test", "x").unwrap(), b"a".to_vec());
        assert_eq!(engine.pop("test", "x").unwrap(), b"b".to_vec());
        assert_eq!(engine.pop("test", "x").unwrap(), b"c".to_vec());
        assert!(matches!(
            engine.pop("test", "x"),
            Err(QueueError::EndOfStream { .. })
        ));
    }

    #[test]
    fn pop_without_prior_push_is_client_not_registered() {
        let (mut engine, _dir) = engine();
        engine.create_queue("test", Some("x".into())).unwrap();
        engine.push("test", "x", b"a".to_vec()).unwrap();

        assert!(matches!(
            engine.pop("test", "y"),
            Err(QueueError::ClientNotRegistered { .. })
        ));
    }

    #[test]
    fn cursors_are_independent_per_client() {
        let (mut engine, _dir) = engine();
        engine.create_queue("test", Some("x".into())).unwrap();
        engine.push("test", "x", b"a".to_vec()).unwrap();
        engine.push("test", "y", b"b".to_vec()).unwrap();

        assert_eq!(engine.pop("test", "x").unwrap(), b"a".to_vec());
        assert_eq!(engine.pop("test", "x").unwrap(), b"b".to_vec());
        assert_eq!(engine.pop("test", "y").unwrap(), b"a".to_vec());
        assert_eq!(engine.pop("test", "y").unwrap(), b"b".to_vec());
    }

    #[test]
    fn pop_on_unknown_queue_fails() {
        let (mut engine, _dir) = engine();
        assert!(matches!(
            engine.pop("ghost", "x"),
            Err(QueueError::UnknownQueue { .. })
        ));
    }

    #[test]
    fn snapshot_survives_a_restart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broker.snapshot");

        {
            let mut engine = QueueEngine::new(&path).unwrap();
            engine.create_queue("test", Some("x".into())).unwrap();
            engine.push("test", "x", b"a".to_vec()).unwrap();
            engine.push("test", "x", b"b".to_vec()).unwrap();
            engine.pop("test", "x").unwrap();
        }

        let mut restarted = QueueEngine::new(&path).unwrap();
        assert_eq!(restarted.queue_count(), 1);
        // Cursor was at 1 before "restart"; next pop should yield "b" then
        // end-of-stream.
        assert_eq!(restarted.pop("test", "x").unwrap(), b"b".to_vec());
        assert!(matches!(
            restarted.pop("test", "x"),
            Err(QueueError::EndOfStream { .. })
        ));
    }
}
