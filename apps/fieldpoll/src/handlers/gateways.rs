//! 网关调度与探测 handlers
//!
//! - POST /api/gateways/{id}/schedule - 立即为网关入队一次轮询
//! - POST /api/gateways/{id}/stop - 停用网关并清除调度记录
//! - POST /api/gateways/{id}/test-connection - 单次连通性探测（不经连接池）

use crate::AppState;
use crate::utils::{not_found_error, ok, probe_to_dto, scheduler_error, storage_error};
use api_contract::TestConnectionRequest;
use axum::{
    Json,
    extract::{Path, State},
    response::Response,
};
use domain::Gateway;
use tracing::info;

const DEFAULT_TEST_REGISTER: u16 = 1;

async fn load_gateway(state: &AppState, gateway_id: i64) -> Result<Gateway, Response> {
    match state.gateways.find_gateway(gateway_id).await {
        Ok(Some(gateway)) => Ok(gateway),
        Ok(None) => Err(gateway_not_found()),
        Err(err) => Err(storage_error(err)),
    }
}

fn gateway_not_found() -> Response {
    not_found_error("GATEWAY.NOT_FOUND", "gateway not found")
}

pub async fn schedule_gateway(
    State(state): State<AppState>,
    Path(gateway_id): Path<i64>,
) -> Response {
    let gateway = match load_gateway(&state, gateway_id).await {
        Ok(gateway) => gateway,
        Err(response) => return response,
    };
    ok(state.supervisor.start_gateway_polling(&gateway).await)
}

pub async fn stop_gateway(State(state): State<AppState>, Path(gateway_id): Path<i64>) -> Response {
    match state.supervisor.stop_gateway_polling(gateway_id).await {
        Ok(true) => ok(serde_json::json!({ "gateway_id": gateway_id, "stopped": true })),
        Ok(false) => gateway_not_found(),
        Err(err) => scheduler_error(err),
    }
}

pub async fn test_gateway_connection(
    State(state): State<AppState>,
    Path(gateway_id): Path<i64>,
    body: Option<Json<TestConnectionRequest>>,
) -> Response {
    let gateway = match load_gateway(&state, gateway_id).await {
        Ok(gateway) => gateway,
        Err(response) => return response,
    };
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let unit_id = request.unit_id.unwrap_or(gateway.unit_id);
    let test_register = request.test_register.unwrap_or(DEFAULT_TEST_REGISTER);

    let probe = state
        .client
        .test_connection(&gateway.host, gateway.port, unit_id, test_register)
        .await;
    info!(
        target: "fieldpoll.app",
        gateway_id,
        success = probe.success,
        latency_ms = probe.latency_ms,
        "gateway_probe"
    );
    ok(probe_to_dto(gateway_id, probe))
}
