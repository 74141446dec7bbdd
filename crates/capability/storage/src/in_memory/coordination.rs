//! 协调存储内存实现
//!
//! 过期键在访问时惰性清理；发布的消息经进程内广播分发给订阅者。

use crate::error::StorageError;
use crate::traits::CoordinationStore;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

const PUBLISH_CAPACITY: usize = 256;

/// 进程内发布的一条消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub channel: String,
    pub message: String,
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now)
    }
}

pub struct InMemoryCoordinationStore {
    entries: RwLock<HashMap<String, Entry>>,
    published: broadcast::Sender<PublishedMessage>,
}

impl InMemoryCoordinationStore {
    pub fn new() -> Self {
        let (published, _) = broadcast::channel(PUBLISH_CAPACITY);
        Self {
            entries: RwLock::new(HashMap::new()),
            published,
        }
    }

    /// 订阅之后发布的全部消息（不区分频道）
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedMessage> {
        self.published.subscribe()
    }

    /// 键的剩余存活时间；无过期时间时返回 None
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries.read().ok().and_then(|map| {
            map.get(key)
                .filter(|entry| entry.is_live(now))
                .and_then(|entry| entry.expires_at)
                .map(|deadline| deadline.saturating_duration_since(now))
        })
    }
}

impl Default for InMemoryCoordinationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StorageError> {
        let now = Instant::now();
        let mut map = self
            .entries
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if map.get(key).is_some_and(|entry| entry.is_live(now)) {
            return Ok(false);
        }
        map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        let now = Instant::now();
        let mut map = self
            .entries
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|ttl| now + ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let now = Instant::now();
        let mut map = self
            .entries
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        match map.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                map.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let now = Instant::now();
        let mut map = self
            .entries
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.remove(key).is_some_and(|entry| entry.is_live(now)))
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StorageError> {
        let now = Instant::now();
        let mut map = self
            .entries
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        match map.get(key) {
            Some(entry) if entry.is_live(now) && entry.value == expected => {
                map.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let now = Instant::now();
        let map = self
            .entries
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut keys: Vec<String> = map
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<usize, StorageError> {
        // 没有订阅者时 send 返回错误，按 0 个接收者处理
        let receivers = self
            .published
            .send(PublishedMessage {
                channel: channel.to_string(),
                message: message.to_string(),
            })
            .unwrap_or(0);
        Ok(receivers)
    }
}
