use serde::{Deserialize, Serialize};

/// Modbus TCP 网关（一个 host:port:unit_id 端点）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gateway {
    pub gateway_id: i64,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub unit_id: u8,
    /// 轮询周期（秒）
    pub poll_interval_secs: u64,
    /// 期望轮询状态
    pub is_active: bool,
    pub success_count: u64,
    pub failure_count: u64,
    /// 连续失败次数，任意一次成功轮询清零（熔断依据）
    pub consecutive_failures: u64,
    /// 是否由熔断器自动停用
    pub auto_disabled: bool,
    pub last_seen_at_ms: Option<i64>,
}

impl Gateway {
    /// 连接缓存键 `host:port`
    pub fn endpoint_key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn poll_interval_ms(&self) -> i64 {
        (self.poll_interval_secs.max(1) as i64).saturating_mul(1000)
    }

    /// 把调度时刻对齐到本网关的轮询网格上，得到名义采样时间。
    pub fn nominal_read_at(&self, scheduled_at_ms: i64) -> i64 {
        let interval = self.poll_interval_ms();
        scheduled_at_ms - scheduled_at_ms.rem_euclid(interval)
    }
}

/// 网关创建输入。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGateway {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub unit_id: u8,
    pub poll_interval_secs: u64,
    pub is_active: bool,
}

/// 网关配置更新输入（计数器不在此列）。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayUpdate {
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub unit_id: Option<u8>,
    pub poll_interval_secs: Option<u64>,
}

/// 一次轮询对健康计数器的影响。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    /// 所有点位均无错误
    pub success: bool,
    /// 连接是否建立（网关是否有响应）；为 true 时刷新 last_seen_at
    pub contacted: bool,
    pub at_ms: i64,
}
