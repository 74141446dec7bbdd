//! 轮询调度监督者
//!
//! 负责把“应当轮询的网关”变成队列中的任务，并维护协调存储中的调度记录：
//! - 启动：网关锁内复查启用状态、入队、写调度记录
//! - 引导：系统锁内启动全部启用网关，写系统状态快照
//! - 审计 / 校验 / 修复：清理无效记录，发现并补齐缺失或超期的调度
//! - 停止：仅按前缀删除本系统的键，不做全库清空

use crate::error::SchedulerError;
use crate::keys::{
    GATEWAY_LOCK_PREFIX, SCHEDULE_PREFIX, SYSTEM_LOCK_KEY, SYSTEM_STATUS_KEY, ScheduleEntry,
    gateway_id_from_schedule_key, gateway_lock_key, schedule_key,
};
use crate::lock::LockManager;
use crate::queue::{PollTask, TaskQueue};
use crate::report::{
    AuditReport, BootstrapReport, BootstrapSnapshot, GatewayFailure, GatewayState, GatewayStatus,
    IntegrityIssue, IntegrityIssueKind, IntegrityReport, RepairReport, StartOutcome, StopReport,
    SystemStatus, TickReport,
};
use domain::{Gateway, now_epoch_ms};
use fieldpoll_storage::{CoordinationStore, GatewayStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub gateway_lock_ttl: Duration,
    pub system_lock_ttl: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            gateway_lock_ttl: Duration::from_secs(60),
            system_lock_ttl: Duration::from_secs(300),
        }
    }
}

/// 协调存储中调度记录的一次扫描结果
#[derive(Debug, Default)]
struct ScheduleScan {
    entries: HashMap<i64, ScheduleEntry>,
    malformed: Vec<String>,
}

#[derive(Clone)]
pub struct PollingSupervisor {
    gateways: Arc<dyn GatewayStore>,
    coordination: Arc<dyn CoordinationStore>,
    queue: Arc<dyn TaskQueue>,
    locks: LockManager,
    config: SupervisorConfig,
}

impl PollingSupervisor {
    pub fn new(
        gateways: Arc<dyn GatewayStore>,
        coordination: Arc<dyn CoordinationStore>,
        queue: Arc<dyn TaskQueue>,
    ) -> Self {
        Self::new_with_config(gateways, coordination, queue, SupervisorConfig::default())
    }

    pub fn new_with_config(
        gateways: Arc<dyn GatewayStore>,
        coordination: Arc<dyn CoordinationStore>,
        queue: Arc<dyn TaskQueue>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            locks: LockManager::new(coordination.clone()),
            gateways,
            coordination,
            queue,
            config,
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// 为一个网关入队一次轮询。
    pub async fn start_gateway_polling(&self, gateway: &Gateway) -> StartOutcome {
        if !gateway.is_active {
            return StartOutcome::Inactive;
        }
        let key = gateway_lock_key(gateway.gateway_id);
        let gateway_id = gateway.gateway_id;
        match self
            .locks
            .with_lock(&key, self.config.gateway_lock_ttl, || {
                self.start_locked(gateway_id)
            })
            .await
        {
            Ok(Some(outcome)) => outcome,
            Ok(None) => {
                debug!(target: "fieldpoll.scheduler", gateway_id, "gateway_start_locked");
                StartOutcome::Locked
            }
            Err(err) => {
                warn!(
                    target: "fieldpoll.scheduler",
                    gateway_id,
                    error = %err,
                    "gateway_lock_failed"
                );
                StartOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }

    async fn start_locked(&self, gateway_id: i64) -> StartOutcome {
        // 锁内以存储中的最新配置为准
        let gateway = match self.gateways.find_gateway(gateway_id).await {
            Ok(Some(gateway)) if gateway.is_active => gateway,
            Ok(_) => return StartOutcome::Inactive,
            Err(err) => {
                return StartOutcome::Failed {
                    reason: err.to_string(),
                };
            }
        };

        let now = now_epoch_ms();
        let task = PollTask::new(gateway_id, now);
        if let Err(err) = self.queue.enqueue(&task).await {
            warn!(
                target: "fieldpoll.scheduler",
                gateway_id,
                error = %err,
                "poll_task_enqueue_failed"
            );
            return StartOutcome::Failed {
                reason: err.to_string(),
            };
        }
        fieldpoll_telemetry::record_task_enqueued();

        if let Err(err) = self.write_schedule(&gateway, now).await {
            warn!(
                target: "fieldpoll.scheduler",
                gateway_id,
                error = %err,
                "schedule_state_write_failed"
            );
            return StartOutcome::Failed {
                reason: err.to_string(),
            };
        }

        info!(
            target: "fieldpoll.scheduler",
            gateway_id,
            task_id = %task.task_id,
            scheduled_at_ms = now,
            "gateway_polling_started"
        );
        StartOutcome::Started {
            task_id: task.task_id,
            scheduled_at_ms: now,
        }
    }

    async fn write_schedule(&self, gateway: &Gateway, now: i64) -> Result<(), SchedulerError> {
        let entry = ScheduleEntry::scheduled(gateway.gateway_id, now, gateway.poll_interval_secs);
        let value = serde_json::to_string(&entry)
            .map_err(|err| SchedulerError::State(err.to_string()))?;
        let ttl = Duration::from_millis(gateway.poll_interval_ms().saturating_mul(2) as u64);
        self.coordination
            .set(&schedule_key(gateway.gateway_id), &value, Some(ttl))
            .await?;
        Ok(())
    }

    /// 系统锁内启动全部启用网关；锁被其他实例持有时返回 `skipped`。
    pub async fn start_reliable_polling(&self) -> Result<BootstrapReport, SchedulerError> {
        let outcome = self
            .locks
            .with_lock(SYSTEM_LOCK_KEY, self.config.system_lock_ttl, || {
                self.bootstrap_locked()
            })
            .await?;
        match outcome {
            Some(report) => report,
            None => {
                info!(target: "fieldpoll.scheduler", "bootstrap_skipped");
                Ok(BootstrapReport {
                    skipped: true,
                    at_ms: now_epoch_ms(),
                    ..BootstrapReport::default()
                })
            }
        }
    }

    async fn bootstrap_locked(&self) -> Result<BootstrapReport, SchedulerError> {
        let active = self.gateways.list_active_gateways().await?;
        let mut report = BootstrapReport {
            total_active: active.len(),
            at_ms: now_epoch_ms(),
            ..BootstrapReport::default()
        };
        for gateway in &active {
            match self.start_gateway_polling(gateway).await {
                StartOutcome::Started { .. } => report.started.push(gateway.gateway_id),
                StartOutcome::Locked => report.locked.push(gateway.gateway_id),
                StartOutcome::Inactive => report.inactive.push(gateway.gateway_id),
                StartOutcome::Failed { reason } => report.failed.push(GatewayFailure {
                    gateway_id: gateway.gateway_id,
                    reason,
                }),
            }
        }

        let snapshot = BootstrapSnapshot {
            at_ms: report.at_ms,
            total_active: report.total_active,
            started: report.started.len(),
            failed: report.failed.len(),
        };
        let value = serde_json::to_string(&snapshot)
            .map_err(|err| SchedulerError::State(err.to_string()))?;
        self.coordination.set(SYSTEM_STATUS_KEY, &value, None).await?;

        info!(
            target: "fieldpoll.scheduler",
            total_active = report.total_active,
            started = report.started.len(),
            locked = report.locked.len(),
            failed = report.failed.len(),
            "bootstrap_completed"
        );
        Ok(report)
    }

    /// 删除停用 / 未知网关、超过 3 个周期未刷新以及无法解析的调度记录，并清空全部网关锁。
    pub async fn audit_and_cleanup(&self) -> Result<AuditReport, SchedulerError> {
        let gateways = self.gateway_index().await?;
        let now = now_epoch_ms();
        let mut report = AuditReport {
            at_ms: now,
            ..AuditReport::default()
        };

        let scan = self.scan_schedules().await?;
        for key in &scan.malformed {
            if self.coordination.delete(key).await? {
                report.removed_malformed += 1;
            }
        }
        for (gateway_id, entry) in &scan.entries {
            let removed = match gateways.get(gateway_id) {
                None => &mut report.removed_unknown,
                Some(gateway) if !gateway.is_active => &mut report.removed_inactive,
                Some(gateway) if entry.age_ms(now) > gateway.poll_interval_ms().saturating_mul(3) => {
                    &mut report.removed_stale
                }
                Some(_) => continue,
            };
            if self.coordination.delete(&schedule_key(*gateway_id)).await? {
                *removed += 1;
            }
        }
        report.removed_locks = self.coordination.delete_prefix(GATEWAY_LOCK_PREFIX).await?;

        info!(
            target: "fieldpoll.scheduler",
            removed_inactive = report.removed_inactive,
            removed_unknown = report.removed_unknown,
            removed_stale = report.removed_stale,
            removed_malformed = report.removed_malformed,
            removed_locks = report.removed_locks,
            "audit_completed"
        );
        Ok(report)
    }

    /// 只读检查：每个启用网关是否有新鲜的调度记录。
    pub async fn validate_polling_integrity(&self) -> Result<IntegrityReport, SchedulerError> {
        let active = self.gateways.list_active_gateways().await?;
        let scan = self.scan_schedules().await?;
        let now = now_epoch_ms();
        let mut report = IntegrityReport {
            checked: active.len(),
            at_ms: now,
            ..IntegrityReport::default()
        };
        for gateway in &active {
            let entry = scan.entries.get(&gateway.gateway_id);
            let kind = match self.classify(gateway, entry, now) {
                GatewayState::Unscheduled => IntegrityIssueKind::MissingPolling,
                GatewayState::Overdue => IntegrityIssueKind::OverduePolling,
                _ => continue,
            };
            report.issues.push(IntegrityIssue {
                gateway_id: gateway.gateway_id,
                kind,
                last_scheduled: entry.map(|entry| entry.last_scheduled),
            });
        }
        if !report.is_healthy() {
            warn!(
                target: "fieldpoll.scheduler",
                checked = report.checked,
                issues = report.issues.len(),
                "polling_integrity_issues"
            );
        }
        Ok(report)
    }

    /// 补齐缺失或超期的启用网关，删除停用网关的调度记录。
    pub async fn ensure_active_gateways_polling(&self) -> Result<RepairReport, SchedulerError> {
        let gateways = self.gateway_index().await?;
        let scan = self.scan_schedules().await?;
        let now = now_epoch_ms();
        let mut report = RepairReport {
            at_ms: now,
            ..RepairReport::default()
        };

        let mut candidates: Vec<&Gateway> = gateways
            .values()
            .filter(|gateway| {
                matches!(
                    self.classify(gateway, scan.entries.get(&gateway.gateway_id), now),
                    GatewayState::Unscheduled | GatewayState::Overdue
                )
            })
            .collect();
        candidates.sort_by_key(|gateway| gateway.gateway_id);
        self.start_all(&candidates, &mut report).await;

        for gateway_id in scan.entries.keys() {
            let orphaned = gateways
                .get(gateway_id)
                .is_none_or(|gateway| !gateway.is_active);
            if orphaned && self.coordination.delete(&schedule_key(*gateway_id)).await? {
                report.removed_inactive += 1;
            }
        }

        info!(
            target: "fieldpoll.scheduler",
            started = report.started.len(),
            locked = report.locked.len(),
            failed = report.failed.len(),
            removed_inactive = report.removed_inactive,
            "repair_completed"
        );
        Ok(report)
    }

    /// 为进入新轮询周期（或没有调度记录）的启用网关入队。
    pub async fn schedule_due_gateways(&self) -> Result<RepairReport, SchedulerError> {
        let active = self.gateways.list_active_gateways().await?;
        let scan = self.scan_schedules().await?;
        let now = now_epoch_ms();
        let mut report = RepairReport {
            at_ms: now,
            ..RepairReport::default()
        };
        let due: Vec<&Gateway> = active
            .iter()
            .filter(|gateway| is_due(gateway, scan.entries.get(&gateway.gateway_id), now))
            .collect();
        self.start_all(&due, &mut report).await;
        if !report.started.is_empty() {
            debug!(
                target: "fieldpoll.scheduler",
                started = report.started.len(),
                "due_gateways_scheduled"
            );
        }
        Ok(report)
    }

    /// 调度循环的一次 tick：系统锁内调度到期网关，按需审计并修复。
    pub async fn run_tick(&self, with_audit: bool) -> Result<TickReport, SchedulerError> {
        let outcome = self
            .locks
            .with_lock(SYSTEM_LOCK_KEY, self.config.system_lock_ttl, || async {
                let scheduled = self.schedule_due_gateways().await?;
                let (audit, repair) = if with_audit {
                    let audit = self.audit_and_cleanup().await?;
                    let repair = self.ensure_active_gateways_polling().await?;
                    (Some(audit), Some(repair))
                } else {
                    (None, None)
                };
                Ok::<_, SchedulerError>(TickReport {
                    skipped: false,
                    scheduled,
                    audit,
                    repair,
                })
            })
            .await?;
        match outcome {
            Some(report) => report,
            None => Ok(TickReport {
                skipped: true,
                ..TickReport::default()
            }),
        }
    }

    /// 停用网关并删除它的调度记录与网关锁。网关不存在时返回 false。
    pub async fn stop_gateway_polling(&self, gateway_id: i64) -> Result<bool, SchedulerError> {
        let stopped = self
            .gateways
            .set_gateway_active(gateway_id, false)
            .await?
            .is_some();
        self.coordination.delete(&schedule_key(gateway_id)).await?;
        self.coordination.delete(&gateway_lock_key(gateway_id)).await?;
        info!(target: "fieldpoll.scheduler", gateway_id, stopped, "gateway_polling_stopped");
        Ok(stopped)
    }

    /// 删除全部调度记录与网关锁（仅按前缀删除）。
    pub async fn stop_all_polling(&self) -> Result<StopReport, SchedulerError> {
        let report = StopReport {
            schedules_removed: self.coordination.delete_prefix(SCHEDULE_PREFIX).await?,
            locks_removed: self.coordination.delete_prefix(GATEWAY_LOCK_PREFIX).await?,
        };
        info!(
            target: "fieldpoll.scheduler",
            schedules_removed = report.schedules_removed,
            locks_removed = report.locks_removed,
            "polling_stopped"
        );
        Ok(report)
    }

    pub async fn polling_status(&self) -> Result<Vec<GatewayStatus>, SchedulerError> {
        let mut gateways = self.gateways.list_gateways().await?;
        gateways.sort_by_key(|gateway| gateway.gateway_id);
        let scan = self.scan_schedules().await?;
        let now = now_epoch_ms();
        Ok(gateways
            .into_iter()
            .map(|gateway| {
                let entry = scan.entries.get(&gateway.gateway_id);
                GatewayStatus {
                    state: self.classify(&gateway, entry, now),
                    last_scheduled: entry.map(|entry| entry.last_scheduled),
                    gateway_id: gateway.gateway_id,
                    name: gateway.name,
                    last_seen_at_ms: gateway.last_seen_at_ms,
                    consecutive_failures: gateway.consecutive_failures,
                }
            })
            .collect())
    }

    pub async fn system_status(&self) -> Result<SystemStatus, SchedulerError> {
        let statuses = self.polling_status().await?;
        let mut status = SystemStatus {
            total_gateways: statuses.len(),
            at_ms: now_epoch_ms(),
            ..SystemStatus::default()
        };
        for gateway in &statuses {
            match gateway.state {
                GatewayState::Scheduled => status.scheduled += 1,
                GatewayState::Overdue => status.overdue += 1,
                GatewayState::Unscheduled => status.unscheduled += 1,
                GatewayState::Disabled => status.disabled += 1,
                GatewayState::Inactive => {}
            }
        }
        status.active_gateways = status.scheduled + status.overdue + status.unscheduled;
        status.last_bootstrap = match self.coordination.get(SYSTEM_STATUS_KEY).await? {
            Some(value) => serde_json::from_str(&value).ok(),
            None => None,
        };
        Ok(status)
    }

    /// 网关的调度状态
    pub fn classify(&self, gateway: &Gateway, entry: Option<&ScheduleEntry>, now_ms: i64) -> GatewayState {
        if !gateway.is_active {
            return if gateway.auto_disabled {
                GatewayState::Disabled
            } else {
                GatewayState::Inactive
            };
        }
        match entry {
            None => GatewayState::Unscheduled,
            Some(entry) if entry.age_ms(now_ms) > gateway.poll_interval_ms() => GatewayState::Overdue,
            Some(_) => GatewayState::Scheduled,
        }
    }

    async fn start_all(&self, gateways: &[&Gateway], report: &mut RepairReport) {
        for gateway in gateways {
            match self.start_gateway_polling(gateway).await {
                StartOutcome::Started { .. } => report.started.push(gateway.gateway_id),
                StartOutcome::Locked => report.locked.push(gateway.gateway_id),
                StartOutcome::Inactive => {}
                StartOutcome::Failed { reason } => report.failed.push(GatewayFailure {
                    gateway_id: gateway.gateway_id,
                    reason,
                }),
            }
        }
    }

    async fn gateway_index(&self) -> Result<HashMap<i64, Gateway>, SchedulerError> {
        Ok(self
            .gateways
            .list_gateways()
            .await?
            .into_iter()
            .map(|gateway| (gateway.gateway_id, gateway))
            .collect())
    }

    async fn scan_schedules(&self) -> Result<ScheduleScan, SchedulerError> {
        let mut scan = ScheduleScan::default();
        for key in self.coordination.scan_prefix(SCHEDULE_PREFIX).await? {
            let Some(gateway_id) = gateway_id_from_schedule_key(&key) else {
                scan.malformed.push(key);
                continue;
            };
            // 扫描与读取之间过期的键直接忽略
            let Some(value) = self.coordination.get(&key).await? else {
                continue;
            };
            match serde_json::from_str::<ScheduleEntry>(&value) {
                Ok(entry) => {
                    scan.entries.insert(gateway_id, entry);
                }
                Err(err) => {
                    debug!(
                        target: "fieldpoll.scheduler",
                        key = %key,
                        error = %err,
                        "schedule_entry_malformed"
                    );
                    scan.malformed.push(key);
                }
            }
        }
        Ok(scan)
    }
}

/// 没有调度记录，或当前时刻已进入比上次调度更新的轮询周期
pub fn is_due(gateway: &Gateway, entry: Option<&ScheduleEntry>, now_ms: i64) -> bool {
    match entry {
        None => true,
        Some(entry) => gateway.nominal_read_at(now_ms) > gateway.nominal_read_at(entry.last_scheduled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(poll_interval_secs: u64) -> Gateway {
        Gateway {
            gateway_id: 1,
            name: "gw".to_string(),
            host: "127.0.0.1".to_string(),
            port: 502,
            unit_id: 1,
            poll_interval_secs,
            is_active: true,
            success_count: 0,
            failure_count: 0,
            consecutive_failures: 0,
            auto_disabled: false,
            last_seen_at_ms: None,
        }
    }

    #[test]
    fn due_when_a_new_grid_cell_starts() {
        let gw = gateway(60);
        let entry = ScheduleEntry::scheduled(1, 120_500, 60);
        assert!(is_due(&gw, None, 120_500));
        assert!(!is_due(&gw, Some(&entry), 179_999));
        assert!(is_due(&gw, Some(&entry), 180_000));
    }
}
