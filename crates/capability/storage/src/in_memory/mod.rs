//! 内存存储实现模块
//!
//! 用于测试和单进程部署，约束与 PostgreSQL 实现一致。
//!
//! 包含以下实现：
//! - GatewayStore: InMemoryGatewayStore
//! - DataPointStore: InMemoryDataPointStore
//! - ReadingStore: InMemoryReadingStore
//! - CoordinationStore: InMemoryCoordinationStore

pub mod coordination;
pub mod gateway;
pub mod point;
pub mod reading;

pub use coordination::*;
pub use gateway::*;
pub use point::*;
pub use reading::*;
