//! 连续失败熔断
//!
//! 任意一次成功轮询都会清零 `consecutive_failures`；达到阈值且网关仍处于启用状态时熔断，
//! 网关被停用并标记 `auto_disabled`。不自动恢复，需要通过配置重新启用。

use domain::Gateway;
use fieldpoll_storage::{GatewayStore, StorageError};
use std::sync::Arc;
use tracing::warn;

pub const DEFAULT_BREAKER_THRESHOLD: u64 = 10;

#[derive(Clone)]
pub struct CircuitBreaker {
    gateways: Arc<dyn GatewayStore>,
    threshold: u64,
}

impl CircuitBreaker {
    pub fn new(gateways: Arc<dyn GatewayStore>) -> Self {
        Self::with_threshold(gateways, DEFAULT_BREAKER_THRESHOLD)
    }

    pub fn with_threshold(gateways: Arc<dyn GatewayStore>, threshold: u64) -> Self {
        Self {
            gateways,
            threshold: threshold.max(1),
        }
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn should_trip(&self, gateway: &Gateway) -> bool {
        gateway.is_active && gateway.consecutive_failures >= self.threshold
    }

    /// 评估并在需要时熔断，返回本次是否熔断
    pub async fn evaluate(&self, gateway: &Gateway) -> Result<bool, StorageError> {
        if !self.should_trip(gateway) {
            return Ok(false);
        }
        let tripped = self.gateways.trip_breaker(gateway.gateway_id).await?;
        if tripped {
            fieldpoll_telemetry::record_breaker_trip();
            warn!(
                target: "fieldpoll.scheduler",
                gateway_id = gateway.gateway_id,
                consecutive_failures = gateway.consecutive_failures,
                threshold = self.threshold,
                "circuit_breaker_tripped"
            );
        }
        Ok(tripped)
    }
}
