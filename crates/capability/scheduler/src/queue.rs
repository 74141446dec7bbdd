//! 轮询任务队列
//!
//! - [`ChannelTaskQueue`]：进程内 tokio mpsc 通道
//! - [`RedisTaskQueue`]：Redis 列表（LPUSH / BRPOP），每个任务只被一个 worker 取走

use crate::error::QueueError;
use async_trait::async_trait;
use fieldpoll_storage::RedisQueue;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const POLL_QUEUE_KEY: &str = "queue:poll";

/// “轮询这个网关”的工作项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollTask {
    pub task_id: String,
    pub gateway_id: i64,
    /// 调度时刻（epoch ms），读数时间由它对齐得到
    pub scheduled_at_ms: i64,
}

impl PollTask {
    pub fn new(gateway_id: i64, scheduled_at_ms: i64) -> Self {
        Self {
            task_id: uuid::Uuid::new_v4().to_string(),
            gateway_id,
            scheduled_at_ms,
        }
    }
}

/// 任务入队端
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task: &PollTask) -> Result<(), QueueError>;
}

/// 任务消费端。`Ok(None)` 表示暂时没有任务，`Err(QueueError::Closed)` 表示不会再有任务。
#[async_trait]
pub trait TaskReceiver: Send {
    async fn recv(&mut self) -> Result<Option<PollTask>, QueueError>;
}

#[derive(Clone)]
pub struct ChannelTaskQueue {
    sender: mpsc::Sender<PollTask>,
}

pub struct ChannelTaskReceiver {
    receiver: mpsc::Receiver<PollTask>,
}

impl ChannelTaskQueue {
    pub fn new(capacity: usize) -> (Self, ChannelTaskReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, ChannelTaskReceiver { receiver })
    }
}

impl ChannelTaskReceiver {
    /// 非阻塞取出一个已入队的任务
    pub fn try_recv(&mut self) -> Option<PollTask> {
        self.receiver.try_recv().ok()
    }
}

#[async_trait]
impl TaskQueue for ChannelTaskQueue {
    async fn enqueue(&self, task: &PollTask) -> Result<(), QueueError> {
        self.sender
            .send(task.clone())
            .await
            .map_err(|_| QueueError::Closed)
    }
}

#[async_trait]
impl TaskReceiver for ChannelTaskReceiver {
    async fn recv(&mut self) -> Result<Option<PollTask>, QueueError> {
        match self.receiver.recv().await {
            Some(task) => Ok(Some(task)),
            None => Err(QueueError::Closed),
        }
    }
}

/// Redis 列表上的任务队列，入队与消费可以在不同进程
#[derive(Clone)]
pub struct RedisTaskQueue {
    queue: Arc<RedisQueue>,
    poll_timeout: Duration,
}

impl RedisTaskQueue {
    pub fn new(queue: RedisQueue) -> Self {
        Self {
            queue: Arc::new(queue),
            poll_timeout: Duration::from_secs(1),
        }
    }

    pub fn connect(redis_url: &str) -> Result<Self, QueueError> {
        Ok(Self::new(RedisQueue::connect(redis_url, POLL_QUEUE_KEY)?))
    }

    pub async fn len(&self) -> Result<usize, QueueError> {
        Ok(self.queue.len().await?)
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn enqueue(&self, task: &PollTask) -> Result<(), QueueError> {
        let payload = serde_json::to_string(task)?;
        self.queue.push(&payload).await?;
        Ok(())
    }
}

#[async_trait]
impl TaskReceiver for RedisTaskQueue {
    async fn recv(&mut self) -> Result<Option<PollTask>, QueueError> {
        match self.queue.pop(self.poll_timeout).await? {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_queue_delivers_in_order_then_closes() {
        let (queue, mut receiver) = ChannelTaskQueue::new(4);
        let first = PollTask::new(1, 1_000);
        let second = PollTask::new(2, 2_000);
        queue.enqueue(&first).await.expect("enqueue");
        queue.enqueue(&second).await.expect("enqueue");
        drop(queue);

        assert_eq!(receiver.recv().await.expect("recv"), Some(first));
        assert_eq!(receiver.recv().await.expect("recv"), Some(second));
        assert!(matches!(receiver.recv().await, Err(QueueError::Closed)));
    }

    #[test]
    fn poll_task_json_shape() {
        let task = PollTask {
            task_id: "t-1".to_string(),
            gateway_id: 3,
            scheduled_at_ms: 60_000,
        };
        let json = serde_json::to_string(&task).expect("json");
        assert_eq!(json, r#"{"task_id":"t-1","gateway_id":3,"scheduled_at_ms":60000}"#);
        let parsed: PollTask = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, task);
    }
}
