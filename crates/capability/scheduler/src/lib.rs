//! # 可靠调度层
//!
//! 把“哪些网关该轮询”落实为队列任务，并保证多实例部署下的调度正确性：
//!
//! - **锁**（`lock`）：协调存储上的 TTL 咨询锁，持有者 token 比较后释放
//! - **调度记录**（`keys`）：`schedule:gateway:{id}`，TTL 为两个轮询周期
//! - **监督者**（`supervisor`）：启动 / 引导 / 审计 / 校验 / 修复 / 停止 / 状态
//! - **熔断**（`breaker`）：连续失败达到阈值后停用网关
//! - **队列与 worker**（`queue`、`worker`）：任务分发与受限并发执行
//! - **调度循环**（`runner`）：按 tick 调度到期网关，周期性审计与修复
//!
//! ## 协调存储键
//!
//! ```text
//! lock:system              引导与调度 tick 的系统锁（TTL 300s）
//! lock:gateway:{id}        单网关启动锁（TTL 60s）
//! schedule:gateway:{id}    调度记录 JSON（TTL 2 × poll_interval）
//! system:status            最近一次引导快照
//! ```

pub mod breaker;
pub mod error;
pub mod keys;
pub mod lock;
pub mod queue;
pub mod report;
pub mod runner;
pub mod supervisor;
pub mod worker;

pub use breaker::{CircuitBreaker, DEFAULT_BREAKER_THRESHOLD};
pub use error::{QueueError, SchedulerError};
pub use keys::{ScheduleEntry, ScheduleStatus};
pub use lock::LockManager;
pub use queue::{
    ChannelTaskQueue, ChannelTaskReceiver, POLL_QUEUE_KEY, PollTask, RedisTaskQueue, TaskQueue,
    TaskReceiver,
};
pub use report::*;
pub use runner::{SchedulerLoop, SchedulerLoopConfig};
pub use supervisor::{PollingSupervisor, SupervisorConfig, is_due};
pub use worker::PollWorker;
