//! In-process consumer-group log
//!
//! Mirrors the subset of Redis stream semantics the consumer relies on: groups
//! start at the beginning of the log, `>` reads hand out entries never
//! delivered to the group, delivered entries stay pending until acked.
//! Clones share the same log, so a test can publish and inspect while a
//! consumer owns another handle.

use super::{Message, MqError, MqResult, StreamBackend};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Default)]
struct Group {
    /// Index of the next entry to hand out
    next_index: usize,
    /// Delivered, unacknowledged entry ids and the consumer holding them
    pending: BTreeMap<String, String>,
}

#[derive(Default)]
struct Stream {
    entries: Vec<Message>,
    groups: HashMap<String, Group>,
}

#[derive(Default)]
struct Log {
    streams: HashMap<String, Stream>,
    sequence: u64,
}

/// Process-local stream backend
#[derive(Clone, Default)]
pub struct MemoryBackend {
    log: Arc<Mutex<Log>>,
    appended: Arc<Notify>,
    open: Arc<AtomicBool>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and return its id
    pub fn append(&self, stream: &str, fields: HashMap<String, String>) -> String {
        let id = {
            let mut log = self.log.lock();
            log.sequence += 1;
            let id = format!("{}-0", log.sequence);
            log.streams
                .entry(stream.to_string())
                .or_default()
                .entries
                .push(Message::new(id.clone(), fields));
            id
        };
        self.appended.notify_waiters();
        id
    }

    /// Number of delivered but unacknowledged entries in `group`
    pub fn pending_count(&self, stream: &str, group: &str) -> usize {
        self.log
            .lock()
            .streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map_or(0, |g| g.pending.len())
    }

    /// Ids pending for `consumer` in `group`
    pub fn pending_for(&self, stream: &str, group: &str, consumer: &str) -> Vec<String> {
        self.log
            .lock()
            .streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map(|g| {
                g.pending
                    .iter()
                    .filter(|(_, owner)| owner.as_str() == consumer)
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> MqResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(MqError::NotConnected)
        }
    }

    fn claim_next(&self, stream: &str, group: &str, consumer: &str) -> MqResult<Option<Message>> {
        let mut log = self.log.lock();
        let stream_log = log
            .streams
            .get_mut(stream)
            .ok_or_else(|| MqError::backend(format!("no such stream: {}", stream)))?;
        let group_state = stream_log
            .groups
            .get_mut(group)
            .ok_or_else(|| MqError::backend(format!("no such consumer group: {}", group)))?;

        let Some(message) = stream_log.entries.get(group_state.next_index) else {
            return Ok(None);
        };

        group_state.next_index += 1;
        group_state
            .pending
            .insert(message.id.clone(), consumer.to_string());
        Ok(Some(message.clone()))
    }
}

#[async_trait]
impl StreamBackend for MemoryBackend {
    async fn open(&self) -> MqResult<()> {
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn create_group(&self, stream: &str, group: &str) -> MqResult<()> {
        self.ensure_open()?;

        let mut log = self.log.lock();
        let stream_log = log.streams.entry(stream.to_string()).or_default();
        if stream_log.groups.contains_key(group) {
            return Err(MqError::GroupExists(group.to_string()));
        }
        stream_log.groups.insert(group.to_string(), Group::default());
        Ok(())
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        block: Duration,
    ) -> MqResult<Option<Message>> {
        let deadline = Instant::now() + block;

        loop {
            self.ensure_open()?;

            // Register before checking so an append between the check and the
            // wait is not missed
            let appended = self.appended.notified();

            if let Some(message) = self.claim_next(stream, group, consumer)? {
                return Ok(Some(message));
            }

            if tokio::time::timeout_at(deadline, appended).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, stream: &str, group: &str, id: &str) -> MqResult<()> {
        self.ensure_open()?;

        let mut log = self.log.lock();
        if let Some(group_state) = log
            .streams
            .get_mut(stream)
            .and_then(|s| s.groups.get_mut(group))
        {
            group_state.pending.remove(id);
        }
        Ok(())
    }

    async fn close(&self) -> MqResult<()> {
        self.open.store(false, Ordering::SeqCst);
        self.appended.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(task: &str) -> HashMap<String, String> {
        HashMap::from([("task".to_string(), task.to_string())])
    }

    #[tokio::test]
    async fn test_group_starts_at_beginning_of_log() {
        let backend = MemoryBackend::new();
        backend.open().await.unwrap();
        backend.append("tasks", fields("a"));
        backend.append("tasks", fields("b"));

        backend.create_group("tasks", "workers").await.unwrap();

        let first = backend
            .read_group("tasks", "workers", "w1", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.field("task"), Some("a"));
        assert_eq!(backend.pending_for("tasks", "workers", "w1"), vec![first.id.clone()]);

        let second = backend
            .read_group("tasks", "workers", "w2", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.field("task"), Some("b"));

        backend.ack("tasks", "workers", &first.id).await.unwrap();
        assert_eq!(backend.pending_count("tasks", "workers"), 1);
    }

    #[tokio::test]
    async fn test_existing_group_is_reported() {
        let backend = MemoryBackend::new();
        backend.open().await.unwrap();
        backend.create_group("tasks", "workers").await.unwrap();

        let err = backend.create_group("tasks", "workers").await.unwrap_err();
        assert!(matches!(err, MqError::GroupExists(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_times_out_without_entries() {
        let backend = MemoryBackend::new();
        backend.open().await.unwrap();
        backend.create_group("tasks", "workers").await.unwrap();

        let read = backend
            .read_group("tasks", "workers", "w1", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(read.is_none());
    }

    #[tokio::test]
    async fn test_blocked_read_wakes_on_append() {
        let backend = MemoryBackend::new();
        backend.open().await.unwrap();
        backend.create_group("tasks", "workers").await.unwrap();

        let reader = backend.clone();
        let read = tokio::spawn(async move {
            reader
                .read_group("tasks", "workers", "w1", Duration::from_secs(5))
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        backend.append("tasks", fields("late"));

        let message = read.await.unwrap().unwrap().unwrap();
        assert_eq!(message.field("task"), Some("late"));
    }

    #[tokio::test]
    async fn test_closed_backend_rejects_reads() {
        let backend = MemoryBackend::new();
        let err = backend
            .read_group("tasks", "workers", "w1", Duration::from_millis(1))
            .await
            .unwrap_err();
        assert!(matches!(err, MqError::NotConnected));
    }
}
