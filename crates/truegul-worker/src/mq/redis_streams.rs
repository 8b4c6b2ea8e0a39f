//! Redis streams backend (XGROUP / XREADGROUP / XACK) and the task publisher

use super::{Message, MqError, MqResult, StreamBackend, TASK_FIELD};
use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};
use truegul_core::AnalysisTask;

/// Redis error code for an existing consumer group
const BUSYGROUP: &str = "BUSYGROUP";

/// Stream backend over a single managed Redis connection
pub struct RedisBackend {
    url: String,
    connection: Mutex<Option<ConnectionManager>>,
}

impl RedisBackend {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connection: Mutex::new(None),
        }
    }

    fn connection(&self) -> MqResult<ConnectionManager> {
        self.connection.lock().clone().ok_or(MqError::NotConnected)
    }
}

#[async_trait]
impl StreamBackend for RedisBackend {
    async fn open(&self) -> MqResult<()> {
        let client = redis::Client::open(self.url.as_str())?;
        let manager = ConnectionManager::new(client).await?;
        *self.connection.lock() = Some(manager);
        info!("Connected to Redis at {}", redacted(&self.url));
        Ok(())
    }

    async fn create_group(&self, stream: &str, group: &str) -> MqResult<()> {
        let mut conn = self.connection()?;

        let created: redis::RedisResult<()> = conn.xgroup_create_mkstream(stream, group, "0").await;
        match created {
            Ok(()) => Ok(()),
            Err(e) if e.code() == Some(BUSYGROUP) => Err(MqError::GroupExists(group.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        block: Duration,
    ) -> MqResult<Option<Message>> {
        let mut conn = self.connection()?;

        let options = StreamReadOptions::default()
            .group(group, consumer)
            .count(1)
            .block(block.as_millis() as usize);
        let reply: Option<StreamReadReply> = conn.xread_options(&[stream], &[">"], &options).await?;

        let Some(entry) = reply
            .into_iter()
            .flat_map(|reply| reply.keys)
            .flat_map(|key| key.ids)
            .next()
        else {
            return Ok(None);
        };

        let mut fields = HashMap::with_capacity(entry.map.len());
        for (name, value) in &entry.map {
            match redis::from_redis_value::<String>(value) {
                Ok(value) => {
                    fields.insert(name.clone(), value);
                }
                Err(e) => warn!("Skipping non-string field {} of entry {}: {}", name, entry.id, e),
            }
        }

        Ok(Some(Message::new(entry.id, fields)))
    }

    async fn ack(&self, stream: &str, group: &str, id: &str) -> MqResult<()> {
        let mut conn = self.connection()?;
        let acked: i64 = conn.xack(stream, group, &[id]).await?;
        debug!("XACK {} on {}: {}", id, stream, acked);
        Ok(())
    }

    async fn close(&self) -> MqResult<()> {
        if self.connection.lock().take().is_some() {
            info!("Redis connection closed");
        }
        Ok(())
    }
}

/// Producer side of the task stream
pub struct TaskPublisher {
    connection: ConnectionManager,
    stream: String,
}

impl TaskPublisher {
    pub async fn connect(url: &str, stream: impl Into<String>) -> MqResult<Self> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self {
            connection,
            stream: stream.into(),
        })
    }

    /// Append one task entry; returns the entry id
    pub async fn publish(&self, task: &AnalysisTask) -> MqResult<String> {
        let payload = serde_json::to_string(task)?;
        let mut conn = self.connection.clone();
        let id: String = conn.xadd(&self.stream, "*", &[(TASK_FIELD, payload)]).await?;
        debug!("Published task {} as {}", task.task_id, id);
        Ok(id)
    }
}

/// URL with any password replaced, for logs
fn redacted(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };

    match rest.rsplit_once('@') {
        Some((credentials, host)) => {
            let user = credentials.split_once(':').map_or(credentials, |(user, _)| user);
            format!("{}://{}:***@{}", scheme, user, host)
        }
        None => url.to_string(),
    }
}
