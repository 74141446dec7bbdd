//! 路由定义
//!
//! - 健康检查：/health
//! - 运维接口：/api/ops/*
//! - 网关调度与探测：/api/gateways/{id}/*
//! - 读数查询：/api/data-points/{id}/readings

use crate::AppState;
use crate::handlers::*;
use crate::middleware::request_context;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/ops/status", get(ops_status))
        .route("/api/ops/validate", get(ops_validate))
        .route("/api/ops/repair", post(ops_repair))
        .route("/api/ops/audit", post(ops_audit))
        .route("/api/ops/bootstrap", post(ops_bootstrap))
        .route("/api/ops/stop-all", post(ops_stop_all))
        .route("/api/ops/metrics", get(ops_metrics))
        .route("/api/gateways/:gateway_id/schedule", post(schedule_gateway))
        .route("/api/gateways/:gateway_id/stop", post(stop_gateway))
        .route(
            "/api/gateways/:gateway_id/test-connection",
            post(test_gateway_connection),
        )
        .route(
            "/api/data-points/:data_point_id/readings",
            get(list_point_readings),
        )
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                // 注入 request_id/trace_id
                .layer(middleware::from_fn(request_context))
                .layer(TraceLayer::new_for_http()),
        )
}
