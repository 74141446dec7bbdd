//! 应用运行配置加载。
//!
//! 全部配置来自 `FIELDPOLL_*` 环境变量；除后端连接串外均有默认值。

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 实体存储（网关、点位、读数）后端。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Postgres,
}

/// 协调存储与任务队列后端。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinationBackend {
    Memory,
    Redis,
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_addr: String,
    pub storage_backend: StorageBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub coordination_backend: CoordinationBackend,
    pub redis_url: Option<String>,
    /// 单次连接超时（毫秒）
    pub connect_timeout_ms: u64,
    /// 单次读取超时（毫秒）
    pub read_timeout_ms: u64,
    pub connect_attempts: u32,
    /// 重试退避基数（毫秒），第 n 次失败后等待 base * 2^(n-1)
    pub connect_backoff_ms: u64,
    /// little_endian 32 位值按完整字节反转解码
    pub strict_little_endian: bool,
    pub breaker_threshold: u64,
    pub max_concurrent_polls: usize,
    pub task_queue_capacity: usize,
    pub scheduler_enabled: bool,
    pub worker_enabled: bool,
    pub scheduler_tick_ms: u64,
    pub audit_every_ticks: u64,
    pub gateway_lock_ttl_seconds: u64,
    pub system_lock_ttl_seconds: u64,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_addr =
            env::var("FIELDPOLL_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());

        let storage_backend = match read_optional("FIELDPOLL_STORAGE") {
            None => StorageBackend::Memory,
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "memory" => StorageBackend::Memory,
                "postgres" => StorageBackend::Postgres,
                _ => return Err(ConfigError::Invalid("FIELDPOLL_STORAGE".to_string(), value)),
            },
        };
        let database_url = read_optional("FIELDPOLL_DATABASE_URL");
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("FIELDPOLL_DATABASE_URL".to_string()));
        }
        let database_max_connections =
            read_u64_with_default("FIELDPOLL_DATABASE_MAX_CONNECTIONS", 10)? as u32;

        let coordination_backend = match read_optional("FIELDPOLL_COORDINATION") {
            None => CoordinationBackend::Memory,
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "memory" => CoordinationBackend::Memory,
                "redis" => CoordinationBackend::Redis,
                _ => {
                    return Err(ConfigError::Invalid(
                        "FIELDPOLL_COORDINATION".to_string(),
                        value,
                    ));
                }
            },
        };
        let redis_url = read_optional("FIELDPOLL_REDIS_URL");
        if coordination_backend == CoordinationBackend::Redis && redis_url.is_none() {
            return Err(ConfigError::Missing("FIELDPOLL_REDIS_URL".to_string()));
        }

        let connect_timeout_ms = read_positive_u64("FIELDPOLL_CONNECT_TIMEOUT_MS", 5_000)?;
        let read_timeout_ms = read_positive_u64("FIELDPOLL_READ_TIMEOUT_MS", 5_000)?;
        let connect_attempts = read_positive_u64("FIELDPOLL_CONNECT_ATTEMPTS", 3)? as u32;
        let connect_backoff_ms = read_u64_with_default("FIELDPOLL_CONNECT_BACKOFF_MS", 1_000)?;
        let strict_little_endian = read_bool_with_default("FIELDPOLL_STRICT_LITTLE_ENDIAN", false);
        let breaker_threshold = read_positive_u64("FIELDPOLL_BREAKER_THRESHOLD", 10)?;
        let max_concurrent_polls = read_positive_u64("FIELDPOLL_MAX_CONCURRENT_POLLS", 16)? as usize;
        let task_queue_capacity =
            read_positive_u64("FIELDPOLL_TASK_QUEUE_CAPACITY", 1_024)? as usize;
        let scheduler_enabled = read_bool_with_default("FIELDPOLL_SCHEDULER", true);
        let worker_enabled = read_bool_with_default("FIELDPOLL_WORKER", true);
        let scheduler_tick_ms = read_positive_u64("FIELDPOLL_SCHEDULER_TICK_MS", 1_000)?;
        let audit_every_ticks = read_positive_u64("FIELDPOLL_AUDIT_EVERY_TICKS", 60)?;
        let gateway_lock_ttl_seconds = read_positive_u64("FIELDPOLL_GATEWAY_LOCK_TTL_SECONDS", 60)?;
        let system_lock_ttl_seconds = read_positive_u64("FIELDPOLL_SYSTEM_LOCK_TTL_SECONDS", 300)?;

        Ok(Self {
            http_addr,
            storage_backend,
            database_url,
            database_max_connections,
            coordination_backend,
            redis_url,
            connect_timeout_ms,
            read_timeout_ms,
            connect_attempts,
            connect_backoff_ms,
            strict_little_endian,
            breaker_threshold,
            max_concurrent_polls,
            task_queue_capacity,
            scheduler_enabled,
            worker_enabled,
            scheduler_tick_ms,
            audit_every_ticks,
            gateway_lock_ttl_seconds,
            system_lock_ttl_seconds,
        })
    }
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

/// 读取必须大于 0 的 u64；缺省时使用默认值。
fn read_positive_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = read_u64_with_default(key, default)?;
    if value == 0 {
        return Err(ConfigError::Invalid(key.to_string(), "0".to_string()));
    }
    Ok(value)
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
