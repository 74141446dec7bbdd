//! 存储层错误类型
//!
//! 定义统一的存储错误类型，用于封装底层错误：
//! - 唯一约束冲突（读数幂等、网关端点唯一）
//! - 记录不存在
//! - 配置校验失败
//! - SQL / Redis 执行与连接错误

use domain::ConfigViolation;

/// 错误种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// 唯一约束冲突
    Conflict,
    NotFound,
    /// 输入未通过校验
    Invalid,
    /// 后端不可用或执行失败
    Backend,
}

#[derive(Debug)]
pub struct StorageError {
    kind: StorageErrorKind,
    message: String,
}

impl StorageError {
    /// 后端错误
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_kind(StorageErrorKind::Backend, message)
    }

    pub fn with_kind(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::with_kind(StorageErrorKind::Conflict, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_kind(StorageErrorKind::NotFound, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::with_kind(StorageErrorKind::Invalid, message)
    }

    pub fn kind(&self) -> StorageErrorKind {
        self.kind
    }

    pub fn is_conflict(&self) -> bool {
        self.kind == StorageErrorKind::Conflict
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for StorageError {}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::conflict(err.to_string())
            }
            sqlx::Error::RowNotFound => Self::not_found(err.to_string()),
            _ => Self::new(err.to_string()),
        }
    }
}

impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<ConfigViolation> for StorageError {
    fn from(err: ConfigViolation) -> Self {
        Self::invalid(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid(err.to_string())
    }
}
