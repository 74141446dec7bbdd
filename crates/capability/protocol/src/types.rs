//! 客户端配置与探测结果

use crate::codec::CodecOptions;
use domain::ErrorCategory;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 连接重试策略：第 n 次失败后等待 `backoff_base * 2^(n-1)`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(1u32 << exponent)
    }

    /// 单次尝试，不等待
    pub fn single() -> Self {
        Self {
            attempts: 1,
            backoff_base: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}

/// Modbus 客户端配置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub retry: RetryPolicy,
    pub codec: CodecOptions,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
            codec: CodecOptions::default(),
        }
    }
}

/// 连通性探测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub success: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_value: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ErrorCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
        assert_eq!(RetryPolicy::single().delay_after(5), Duration::ZERO);
    }

    #[test]
    fn probe_result_omits_empty_fields() {
        let probe = ProbeResult {
            success: true,
            latency_ms: 12,
            sample_value: Some(7),
            category: None,
            error: None,
        };
        let json = serde_json::to_value(&probe).unwrap();
        assert_eq!(json["sample_value"], 7);
        assert!(json.get("error").is_none());
    }
}
