//! 存储接口 Trait 定义
//!
//! - GatewayStore：网关配置与健康计数
//! - DataPointStore：点位配置
//! - ReadingStore：读数（(data_point_id, read_at) 唯一）
//! - CoordinationStore：带 TTL 的键值协调存储（锁、调度状态、系统快照）
//!
//! 设计原则：
//! - 所有接口返回 StorageError
//! - 使用 async_trait 支持动态分发

use crate::error::StorageError;
use async_trait::async_trait;
use domain::{
    DataPoint, Gateway, GatewayUpdate, NewDataPoint, NewGateway, NewReading, PollOutcome, Reading,
};
use std::time::Duration;

/// 网关存储接口
#[async_trait]
pub trait GatewayStore: Send + Sync {
    async fn list_gateways(&self) -> Result<Vec<Gateway>, StorageError>;

    /// 列出 is_active = true 的网关
    async fn list_active_gateways(&self) -> Result<Vec<Gateway>, StorageError>;

    async fn find_gateway(&self, gateway_id: i64) -> Result<Option<Gateway>, StorageError>;

    /// 创建网关，(host, port, unit_id) 重复时返回 Conflict
    async fn create_gateway(&self, input: NewGateway) -> Result<Gateway, StorageError>;

    async fn update_gateway(
        &self,
        gateway_id: i64,
        update: GatewayUpdate,
    ) -> Result<Option<Gateway>, StorageError>;

    /// 配置层启停。重新启用时清除熔断标记与连续失败计数。
    async fn set_gateway_active(
        &self,
        gateway_id: i64,
        is_active: bool,
    ) -> Result<Option<Gateway>, StorageError>;

    /// 原子更新健康计数器
    async fn record_poll_outcome(
        &self,
        gateway_id: i64,
        outcome: PollOutcome,
    ) -> Result<Option<Gateway>, StorageError>;

    /// 熔断停用：仅当网关仍处于启用状态时生效，返回是否本次停用
    async fn trip_breaker(&self, gateway_id: i64) -> Result<bool, StorageError>;

    async fn delete_gateway(&self, gateway_id: i64) -> Result<bool, StorageError>;
}

/// 点位存储接口
#[async_trait]
pub trait DataPointStore: Send + Sync {
    async fn list_data_points(&self, gateway_id: i64) -> Result<Vec<DataPoint>, StorageError>;

    /// 按 register_address 排序的已启用点位
    async fn list_enabled_data_points(
        &self,
        gateway_id: i64,
    ) -> Result<Vec<DataPoint>, StorageError>;

    async fn find_data_point(&self, data_point_id: i64)
    -> Result<Option<DataPoint>, StorageError>;

    /// 创建点位：校验配置并拒绝与同网关同功能码的已有区间重叠
    async fn create_data_point(&self, input: NewDataPoint) -> Result<DataPoint, StorageError>;

    async fn set_data_point_enabled(
        &self,
        data_point_id: i64,
        is_enabled: bool,
    ) -> Result<Option<DataPoint>, StorageError>;

    async fn delete_data_point(&self, data_point_id: i64) -> Result<bool, StorageError>;
}

/// 读数存储接口
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// 插入读数；(data_point_id, read_at) 已存在时返回 Conflict
    async fn insert_reading(&self, reading: NewReading) -> Result<Reading, StorageError>;

    async fn find_reading(
        &self,
        data_point_id: i64,
        read_at_ms: i64,
    ) -> Result<Option<Reading>, StorageError>;

    /// 按 read_at 倒序
    async fn list_readings(
        &self,
        data_point_id: i64,
        limit: usize,
    ) -> Result<Vec<Reading>, StorageError>;
}

/// 协调存储接口（TTL 键值）
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// 键不存在时写入，返回是否写入成功
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StorageError>;

    /// 覆盖写入；`ttl` 为 None 时不过期
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>)
    -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// 值等于 `expected` 时删除（持有者校验）
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StorageError>;

    /// 列出前缀匹配的键
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// 向频道发布一条消息，返回收到消息的订阅者数量
    async fn publish(&self, channel: &str, message: &str) -> Result<usize, StorageError>;

    /// 删除前缀匹配的键，返回删除数量
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        let mut removed = 0;
        for key in self.scan_prefix(prefix).await? {
            if self.delete(&key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
