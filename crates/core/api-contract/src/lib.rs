//! 稳定的 DTO 与 API 响应契约。
//!
//! 运维接口的报告体（审计、校验、修复等）由调度层直接序列化，这里只定义
//! 响应封装和面向外部的请求 / 读数结构。

use serde::{Deserialize, Serialize};

/// 标准 API 响应封装。
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// 健康检查返回结构。
#[derive(Debug, Serialize)]
pub struct HealthDto {
    pub status: String,
    pub version: String,
}

/// 网关连通性探测请求体。两项均可省略。
#[derive(Debug, Default, Deserialize)]
pub struct TestConnectionRequest {
    #[serde(default)]
    pub unit_id: Option<u8>,
    /// 1 基寄存器地址，默认 1
    #[serde(default)]
    pub test_register: Option<u16>,
}

/// 探测结果。
#[derive(Debug, Serialize)]
pub struct ProbeDto {
    pub gateway_id: i64,
    pub success: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_value: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 读数查询参数。
#[derive(Debug, Default, Deserialize)]
pub struct ReadingsQuery {
    pub limit: Option<usize>,
}

impl ReadingsQuery {
    pub const DEFAULT_LIMIT: usize = 100;
    pub const MAX_LIMIT: usize = 1_000;

    /// 限制在 1..=MAX_LIMIT 之间
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }
}

/// 读数返回结构。
#[derive(Debug, Serialize)]
pub struct ReadingDto {
    pub reading_id: i64,
    pub data_point_id: i64,
    pub raw_registers: Vec<u16>,
    pub raw_value: Option<f64>,
    pub value: Option<f64>,
    pub quality: String,
    pub read_at: i64,
    pub created_at: i64,
}
