//! 网关内存存储实现
//!
//! 功能：
//! - 网关 CRUD 操作
//! - 端点 (host, port, unit_id) 唯一
//! - 健康计数器原子更新

use crate::error::StorageError;
use crate::traits::GatewayStore;
use domain::{Gateway, GatewayUpdate, NewGateway, PollOutcome, validate_gateway};
use std::collections::HashMap;
use std::sync::RwLock;

/// 网关内存存储
///
/// 使用 RwLock + HashMap 提供线程安全的内存存储。
pub struct InMemoryGatewayStore {
    gateways: RwLock<HashMap<i64, Gateway>>,
    next_id: RwLock<i64>,
}

impl InMemoryGatewayStore {
    pub fn new() -> Self {
        Self {
            gateways: RwLock::new(HashMap::new()),
            next_id: RwLock::new(1),
        }
    }

    /// 直接放入一条完整记录（测试用，保留计数器）
    pub fn insert(&self, gateway: Gateway) -> Result<(), StorageError> {
        let mut map = self
            .gateways
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut next_id = self
            .next_id
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        *next_id = (*next_id).max(gateway.gateway_id + 1);
        map.insert(gateway.gateway_id, gateway);
        Ok(())
    }

    fn update_with<F>(&self, gateway_id: i64, apply: F) -> Result<Option<Gateway>, StorageError>
    where
        F: FnOnce(&mut Gateway),
    {
        let mut map = self
            .gateways
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.get_mut(&gateway_id).map(|gateway| {
            apply(gateway);
            gateway.clone()
        }))
    }
}

impl Default for InMemoryGatewayStore {
    fn default() -> Self {
        Self::new()
    }
}

fn same_endpoint(gateway: &Gateway, host: &str, port: u16, unit_id: u8) -> bool {
    gateway.host == host && gateway.port == port && gateway.unit_id == unit_id
}

#[async_trait::async_trait]
impl GatewayStore for InMemoryGatewayStore {
    async fn list_gateways(&self) -> Result<Vec<Gateway>, StorageError> {
        let mut items: Vec<Gateway> = self
            .gateways
            .read()
            .map_err(|_| StorageError::new("lock failed"))?
            .values()
            .cloned()
            .collect();
        items.sort_by_key(|item| item.gateway_id);
        Ok(items)
    }

    async fn list_active_gateways(&self) -> Result<Vec<Gateway>, StorageError> {
        let mut items = self.list_gateways().await?;
        items.retain(|item| item.is_active);
        Ok(items)
    }

    async fn find_gateway(&self, gateway_id: i64) -> Result<Option<Gateway>, StorageError> {
        let map = self
            .gateways
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.get(&gateway_id).cloned())
    }

    async fn create_gateway(&self, input: NewGateway) -> Result<Gateway, StorageError> {
        validate_gateway(&input)?;
        let mut map = self
            .gateways
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if map
            .values()
            .any(|item| same_endpoint(item, &input.host, input.port, input.unit_id))
        {
            return Err(StorageError::conflict("gateway endpoint exists"));
        }
        let mut next_id = self
            .next_id
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let gateway = Gateway {
            gateway_id: *next_id,
            name: input.name,
            host: input.host,
            port: input.port,
            unit_id: input.unit_id,
            poll_interval_secs: input.poll_interval_secs,
            is_active: input.is_active,
            success_count: 0,
            failure_count: 0,
            consecutive_failures: 0,
            auto_disabled: false,
            last_seen_at_ms: None,
        };
        *next_id += 1;
        map.insert(gateway.gateway_id, gateway.clone());
        Ok(gateway)
    }

    async fn update_gateway(
        &self,
        gateway_id: i64,
        update: GatewayUpdate,
    ) -> Result<Option<Gateway>, StorageError> {
        if update.poll_interval_secs == Some(0) {
            return Err(StorageError::invalid(
                "poll_interval must be at least 1 second",
            ));
        }
        let mut map = self
            .gateways
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(current) = map.get(&gateway_id).cloned() else {
            return Ok(None);
        };
        let host = update.host.clone().unwrap_or(current.host.clone());
        let port = update.port.unwrap_or(current.port);
        let unit_id = update.unit_id.unwrap_or(current.unit_id);
        if map.values().any(|item| {
            item.gateway_id != gateway_id && same_endpoint(item, &host, port, unit_id)
        }) {
            return Err(StorageError::conflict("gateway endpoint exists"));
        }
        let gateway = match map.get_mut(&gateway_id) {
            Some(gateway) => gateway,
            None => return Ok(None),
        };
        if let Some(name) = update.name {
            gateway.name = name;
        }
        gateway.host = host;
        gateway.port = port;
        gateway.unit_id = unit_id;
        if let Some(interval) = update.poll_interval_secs {
            gateway.poll_interval_secs = interval;
        }
        Ok(Some(gateway.clone()))
    }

    async fn set_gateway_active(
        &self,
        gateway_id: i64,
        is_active: bool,
    ) -> Result<Option<Gateway>, StorageError> {
        self.update_with(gateway_id, |gateway| {
            gateway.is_active = is_active;
            if is_active {
                gateway.auto_disabled = false;
                gateway.consecutive_failures = 0;
            }
        })
    }

    async fn record_poll_outcome(
        &self,
        gateway_id: i64,
        outcome: PollOutcome,
    ) -> Result<Option<Gateway>, StorageError> {
        self.update_with(gateway_id, |gateway| {
            if outcome.success {
                gateway.success_count += 1;
                gateway.consecutive_failures = 0;
            } else {
                gateway.failure_count += 1;
                gateway.consecutive_failures += 1;
            }
            if outcome.contacted {
                gateway.last_seen_at_ms = Some(outcome.at_ms);
            }
        })
    }

    async fn trip_breaker(&self, gateway_id: i64) -> Result<bool, StorageError> {
        let mut map = self
            .gateways
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        match map.get_mut(&gateway_id) {
            Some(gateway) if gateway.is_active => {
                gateway.is_active = false;
                gateway.auto_disabled = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_gateway(&self, gateway_id: i64) -> Result<bool, StorageError> {
        let mut map = self
            .gateways
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.remove(&gateway_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    #[tokio::test]
    async fn poisoned_lock_is_reported_on_reads() {
        let store = InMemoryGatewayStore::new();
        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store.gateways.write().expect("lock");
            panic!("writer panicked");
        }));

        assert!(store.list_gateways().await.is_err());
        assert!(store.list_active_gateways().await.is_err());
        assert!(store.find_gateway(1).await.is_err());
    }
}
