//! 采集错误分类
//!
//! 扁平分类，每类带严重级别、重试策略与面向用户的消息模板。
//! 模板中的 `{detail}` 由调用方填入，渲染结果不含调用栈。

use serde::{Deserialize, Serialize};

/// 错误严重级别。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
}

/// 错误分类。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    ConnectionTimeout,
    ConnectionRefused,
    IllegalRegister,
    UnsupportedFunction,
    DecodeFailure,
    InsufficientRegisters,
    DuplicateReading,
    /// 实体存储不可用
    Storage,
    /// 未预期的内部错误
    Internal,
}

impl ErrorCategory {
    pub fn severity(&self) -> Severity {
        match self {
            ErrorCategory::ConnectionTimeout
            | ErrorCategory::ConnectionRefused
            | ErrorCategory::Storage
            | ErrorCategory::Internal => Severity::High,
            ErrorCategory::IllegalRegister | ErrorCategory::UnsupportedFunction => {
                Severity::Medium
            }
            ErrorCategory::DecodeFailure | ErrorCategory::InsufficientRegisters => Severity::Low,
            ErrorCategory::DuplicateReading => Severity::Info,
        }
    }

    /// 连接类错误按退避重试，其余均为配置或数据问题，不重试。
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCategory::ConnectionTimeout | ErrorCategory::ConnectionRefused
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::ConnectionTimeout => "connection_timeout",
            ErrorCategory::ConnectionRefused => "connection_refused",
            ErrorCategory::IllegalRegister => "illegal_register",
            ErrorCategory::UnsupportedFunction => "unsupported_function",
            ErrorCategory::DecodeFailure => "decode_failure",
            ErrorCategory::InsufficientRegisters => "insufficient_registers",
            ErrorCategory::DuplicateReading => "duplicate_reading",
            ErrorCategory::Storage => "storage",
            ErrorCategory::Internal => "internal",
        }
    }

    pub fn message_template(&self) -> &'static str {
        match self {
            ErrorCategory::ConnectionTimeout => {
                "Device did not respond in time ({detail}). Check that it is powered and reachable."
            }
            ErrorCategory::ConnectionRefused => {
                "Device refused the connection ({detail}). Check the port and that the Modbus service is running."
            }
            ErrorCategory::IllegalRegister => {
                "Device rejected the register range ({detail}). Check the configured address and count."
            }
            ErrorCategory::UnsupportedFunction => {
                "Device does not support this function code ({detail}). Try holding (3) or input (4) registers."
            }
            ErrorCategory::DecodeFailure => {
                "Response could not be decoded ({detail}). Check the data type and byte order."
            }
            ErrorCategory::InsufficientRegisters => {
                "Not enough registers for the data type ({detail}). Check the register count."
            }
            ErrorCategory::DuplicateReading => {
                "A reading for this timestamp already exists ({detail})."
            }
            ErrorCategory::Storage => "Reading could not be stored ({detail}).",
            ErrorCategory::Internal => "Unexpected internal error ({detail}).",
        }
    }

    /// 渲染面向用户的消息。
    pub fn render(&self, detail: &str) -> String {
        self.message_template().replace("{detail}", detail)
    }
}
