//! # PostgreSQL 存储实现模块
//!
//! 生产环境使用的实体存储。
//!
//! ## 包含的实现
//!
//! - **GatewayStore** (`gateway.rs`)：网关配置与健康计数器
//! - **DataPointStore** (`point.rs`)：点位配置，写入前校验区间
//! - **ReadingStore** (`reading.rs`)：读数，依赖唯一约束实现幂等
//!
//! ## 数据库模式
//!
//! 见 `migrations/0001_init.sql`：
//! - `gateways`：`unique (host, port, unit_id)`
//! - `data_points`：功能码、地址范围、数量检查约束
//! - `readings`：`unique (data_point_id, read_at)`
//!
//! ## 时间戳
//!
//! 领域模型使用毫秒时间戳，数据库使用 `timestamptz`：
//! 写入 `to_timestamp($n / 1000.0)`，读取 `(extract(epoch from col) * 1000)::bigint`。
//!
//! ## 错误处理
//!
//! - 唯一约束冲突映射为 `StorageErrorKind::Conflict`
//! - 返回 `Option<T>` 表示"可能不存在"（查询、更新）

pub mod gateway;
pub mod point;
pub mod reading;

pub use gateway::*;
pub use point::*;
pub use reading::*;
