//! 读数通知
//!
//! 轮询写入每条读数后发布一次事件。发布失败只记日志，不影响轮询结果。

use async_trait::async_trait;
use domain::Reading;
use fieldpoll_storage::CoordinationStore;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

/// 新读数事件的默认发布频道
pub const READINGS_CHANNEL: &str = "readings:new";

/// 读数事件
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingEvent {
    pub gateway_id: i64,
    pub reading: Reading,
    /// 本次是否新写入（false 表示已存在）
    pub inserted: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notify failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait ReadingNotifier: Send + Sync {
    async fn notify(&self, event: ReadingEvent) -> Result<(), NotifyError>;
}

/// 丢弃所有事件
pub struct NoopNotifier;

#[async_trait]
impl ReadingNotifier for NoopNotifier {
    async fn notify(&self, _event: ReadingEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// 进程内广播；没有订阅者时事件被丢弃。
#[derive(Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<ReadingEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReadingEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl ReadingNotifier for BroadcastNotifier {
    async fn notify(&self, event: ReadingEvent) -> Result<(), NotifyError> {
        if self.sender.receiver_count() == 0 {
            return Ok(());
        }
        self.sender
            .send(event)
            .map(|_| ())
            .map_err(|err| NotifyError::Failed(err.to_string()))
    }
}

/// 经协调存储发布 JSON 事件（Redis 后端即 `PUBLISH`）。
#[derive(Clone)]
pub struct PublishingNotifier {
    store: Arc<dyn CoordinationStore>,
    channel: String,
}

impl PublishingNotifier {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self::with_channel(store, READINGS_CHANNEL)
    }

    pub fn with_channel(store: Arc<dyn CoordinationStore>, channel: impl Into<String>) -> Self {
        Self {
            store,
            channel: channel.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

#[async_trait]
impl ReadingNotifier for PublishingNotifier {
    async fn notify(&self, event: ReadingEvent) -> Result<(), NotifyError> {
        let payload =
            serde_json::to_string(&event).map_err(|err| NotifyError::Failed(err.to_string()))?;
        self.store
            .publish(&self.channel, &payload)
            .await
            .map(|_| ())
            .map_err(|err| NotifyError::Failed(err.to_string()))
    }
}
