//! # 轮询能力模块
//!
//! - [`PollOrchestrator`]：一次网关轮询（连接、逐点读取、解码、写入、健康计数）
//! - [`DuplicateGuard`]：按 (data_point_id, read_at) 恰好一次的读数写入
//! - [`ReadingNotifier`]：读数写入后的事件发布

pub mod guard;
pub mod notifier;
pub mod orchestrator;
pub mod result;

pub use guard::{DuplicateGuard, PersistOutcome};
pub use notifier::{
    BroadcastNotifier, NoopNotifier, NotifyError, PublishingNotifier, READINGS_CHANNEL,
    ReadingEvent, ReadingNotifier,
};
pub use orchestrator::PollOrchestrator;
pub use result::{PointError, PollResult};
