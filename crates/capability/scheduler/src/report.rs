//! 调度层各操作的结构化报告

use serde::{Deserialize, Serialize};

/// 单个网关的调度启动结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StartOutcome {
    /// 已入队
    Started { task_id: String, scheduled_at_ms: i64 },
    /// 网关未启用或已不存在，未做任何事
    Inactive,
    /// 网关锁被其他调度方持有
    Locked,
    Failed { reason: String },
}

impl StartOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, StartOutcome::Started { .. })
    }
}

/// 网关调度状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayState {
    /// 没有调度记录
    Unscheduled,
    Scheduled,
    /// 调度记录长时间未刷新
    Overdue,
    /// 被熔断器停用
    Disabled,
    /// 配置停用
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayFailure {
    pub gateway_id: i64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    /// 系统锁被其他实例持有
    pub skipped: bool,
    pub total_active: usize,
    pub started: Vec<i64>,
    pub locked: Vec<i64>,
    pub inactive: Vec<i64>,
    pub failed: Vec<GatewayFailure>,
    pub at_ms: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub removed_inactive: usize,
    pub removed_unknown: usize,
    pub removed_stale: usize,
    pub removed_malformed: usize,
    pub removed_locks: usize,
    pub at_ms: i64,
}

impl AuditReport {
    pub fn removed_total(&self) -> usize {
        self.removed_inactive
            + self.removed_unknown
            + self.removed_stale
            + self.removed_malformed
            + self.removed_locks
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityIssueKind {
    MissingPolling,
    OverduePolling,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityIssue {
    pub gateway_id: i64,
    pub kind: IntegrityIssueKind,
    pub last_scheduled: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub checked: usize,
    pub issues: Vec<IntegrityIssue>,
    pub at_ms: i64,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub started: Vec<i64>,
    pub locked: Vec<i64>,
    pub failed: Vec<GatewayFailure>,
    /// 删除的停用网关调度记录数
    pub removed_inactive: usize,
    pub at_ms: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StopReport {
    pub schedules_removed: usize,
    pub locks_removed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayStatus {
    pub gateway_id: i64,
    pub name: String,
    pub state: GatewayState,
    pub last_scheduled: Option<i64>,
    pub last_seen_at_ms: Option<i64>,
    pub consecutive_failures: u64,
}

/// `system:status` 中保存的最近一次引导快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapSnapshot {
    pub at_ms: i64,
    pub total_active: usize,
    pub started: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SystemStatus {
    pub total_gateways: usize,
    pub active_gateways: usize,
    pub scheduled: usize,
    pub overdue: usize,
    pub unscheduled: usize,
    pub disabled: usize,
    pub last_bootstrap: Option<BootstrapSnapshot>,
    pub at_ms: i64,
}

/// 调度循环单次 tick 的结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// 系统锁被其他实例持有，本次 tick 未执行
    pub skipped: bool,
    pub scheduled: RepairReport,
    pub audit: Option<AuditReport>,
    pub repair: Option<RepairReport>,
}
