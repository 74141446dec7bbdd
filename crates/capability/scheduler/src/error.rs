use fieldpoll_storage::StorageError;

/// 任务队列错误。
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// 队列已关闭（所有发送端或接收端已释放）
    #[error("task queue closed")]
    Closed,
    #[error("malformed task payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("queue backend error: {0}")]
    Backend(#[from] StorageError),
}

/// 调度层错误。
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("schedule state error: {0}")]
    State(String),
}
