//! HTTP 响应辅助函数和 DTO 转换
//!
//! - 错误响应：not_found_error, storage_error, scheduler_error
//! - DTO 转换：reading_to_dto, probe_to_dto

use api_contract::{ApiResponse, ProbeDto, ReadingDto};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::Reading;
use fieldpoll_protocol::ProbeResult;
use fieldpoll_scheduler::SchedulerError;
use fieldpoll_storage::StorageError;
use serde::Serialize;

/// 成功响应
pub fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// 资源未找到错误响应
pub fn not_found_error(code: &str, message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::error(code, message)),
    )
        .into_response()
}

/// 存储错误响应
pub fn storage_error(err: StorageError) -> Response {
    let message = err.to_string();
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::<()>::error("INTERNAL.STORAGE", message)),
    )
        .into_response()
}

/// 调度层错误响应
pub fn scheduler_error(err: SchedulerError) -> Response {
    let message = err.to_string();
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::<()>::error("INTERNAL.SCHEDULER", message)),
    )
        .into_response()
}

/// Reading 转 ReadingDto
pub fn reading_to_dto(reading: Reading) -> ReadingDto {
    ReadingDto {
        reading_id: reading.reading_id,
        data_point_id: reading.data_point_id,
        raw_registers: reading.raw_registers,
        raw_value: reading.raw_value,
        value: reading.value,
        quality: reading.quality.as_str().to_string(),
        read_at: reading.read_at_ms,
        created_at: reading.created_at_ms,
    }
}

/// ProbeResult 转 ProbeDto
pub fn probe_to_dto(gateway_id: i64, probe: ProbeResult) -> ProbeDto {
    ProbeDto {
        gateway_id,
        success: probe.success,
        latency_ms: probe.latency_ms,
        sample_value: probe.sample_value,
        category: probe.category.map(|category| category.as_str().to_string()),
        error: probe.error,
    }
}
