//! 运维接口 handlers
//!
//! - GET /health
//! - GET /api/ops/status - 系统状态与各网关调度状态
//! - GET /api/ops/validate - 只读完整性校验
//! - POST /api/ops/repair - 补齐缺失 / 超期调度
//! - POST /api/ops/audit - 清理无效调度记录与网关锁
//! - POST /api/ops/bootstrap - 系统锁内启动全部启用网关
//! - POST /api/ops/stop-all - 按前缀清除调度记录与网关锁
//! - GET /api/ops/metrics - 进程内计数指标

use crate::AppState;
use crate::utils::{ok, scheduler_error};
use api_contract::HealthDto;
use axum::{extract::State, response::Response};
use fieldpoll_scheduler::{GatewayStatus, SystemStatus};
use fieldpoll_telemetry::metrics;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct OpsStatus {
    pub system: SystemStatus,
    pub gateways: Vec<GatewayStatus>,
}

pub async fn health() -> Response {
    ok(HealthDto {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn ops_status(State(state): State<AppState>) -> Response {
    let system = match state.supervisor.system_status().await {
        Ok(system) => system,
        Err(err) => return scheduler_error(err),
    };
    match state.supervisor.polling_status().await {
        Ok(gateways) => ok(OpsStatus { system, gateways }),
        Err(err) => scheduler_error(err),
    }
}

pub async fn ops_validate(State(state): State<AppState>) -> Response {
    match state.supervisor.validate_polling_integrity().await {
        Ok(report) => ok(report),
        Err(err) => scheduler_error(err),
    }
}

pub async fn ops_repair(State(state): State<AppState>) -> Response {
    match state.supervisor.ensure_active_gateways_polling().await {
        Ok(report) => ok(report),
        Err(err) => scheduler_error(err),
    }
}

pub async fn ops_audit(State(state): State<AppState>) -> Response {
    match state.supervisor.audit_and_cleanup().await {
        Ok(report) => ok(report),
        Err(err) => scheduler_error(err),
    }
}

pub async fn ops_bootstrap(State(state): State<AppState>) -> Response {
    match state.supervisor.start_reliable_polling().await {
        Ok(report) => ok(report),
        Err(err) => scheduler_error(err),
    }
}

pub async fn ops_stop_all(State(state): State<AppState>) -> Response {
    match state.supervisor.stop_all_polling().await {
        Ok(report) => ok(report),
        Err(err) => scheduler_error(err),
    }
}

pub async fn ops_metrics() -> Response {
    ok(metrics().snapshot())
}
