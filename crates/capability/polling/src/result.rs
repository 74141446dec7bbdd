//! 轮询结果与错误报告

use domain::{ErrorCategory, Reading, Severity};
use fieldpoll_protocol::ClientError;
use serde::Serialize;

/// 单个点位（或 `point_id` 为空时整个网关）的错误
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointError {
    pub point_id: Option<i64>,
    pub category: ErrorCategory,
    pub severity: Severity,
    /// 面向用户的消息
    pub message: String,
    /// 内部诊断信息
    pub diagnostic: String,
}

impl PointError {
    pub fn new(point_id: Option<i64>, category: ErrorCategory, diagnostic: impl Into<String>) -> Self {
        let diagnostic = diagnostic.into();
        Self {
            point_id,
            category,
            severity: category.severity(),
            message: category.render(&diagnostic),
            diagnostic,
        }
    }

    pub fn from_client(point_id: Option<i64>, err: &ClientError) -> Self {
        Self::new(point_id, err.category(), err.to_string())
    }
}

/// 一次网关轮询的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollResult {
    pub gateway_id: i64,
    pub success: bool,
    pub readings: Vec<Reading>,
    pub errors: Vec<PointError>,
    pub duration_ms: u64,
    /// 本轮所有读数共享的名义采样时间
    pub read_at: i64,
}

impl PollResult {
    pub(crate) fn new(gateway_id: i64, read_at: i64) -> Self {
        Self {
            gateway_id,
            success: false,
            readings: Vec::new(),
            errors: Vec::new(),
            duration_ms: 0,
            read_at,
        }
    }

    pub fn gateway_errors(&self) -> impl Iterator<Item = &PointError> {
        self.errors.iter().filter(|err| err.point_id.is_none())
    }
}
