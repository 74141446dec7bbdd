use fieldpoll_config::{AppConfig, ConfigError, CoordinationBackend, StorageBackend};
use std::sync::Mutex;

// 环境变量是进程级共享状态，测试串行执行。
static ENV_LOCK: Mutex<()> = Mutex::new(());

const KEYS: &[&str] = &[
    "FIELDPOLL_HTTP_ADDR",
    "FIELDPOLL_STORAGE",
    "FIELDPOLL_DATABASE_URL",
    "FIELDPOLL_COORDINATION",
    "FIELDPOLL_REDIS_URL",
    "FIELDPOLL_CONNECT_ATTEMPTS",
    "FIELDPOLL_STRICT_LITTLE_ENDIAN",
    "FIELDPOLL_BREAKER_THRESHOLD",
];

fn reset_env() {
    // Rust 2024 中 set_var / remove_var 需要显式标注 unsafe（测试进程内可控）。
    unsafe {
        for key in KEYS {
            std::env::remove_var(key);
        }
    }
}

#[test]
fn defaults_use_in_memory_backends() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
    reset_env();

    let config = AppConfig::from_env().expect("config");
    assert_eq!(config.http_addr, "127.0.0.1:8080");
    assert_eq!(config.storage_backend, StorageBackend::Memory);
    assert_eq!(config.coordination_backend, CoordinationBackend::Memory);
    assert_eq!(config.connect_timeout_ms, 5_000);
    assert_eq!(config.read_timeout_ms, 5_000);
    assert_eq!(config.connect_attempts, 3);
    assert_eq!(config.connect_backoff_ms, 1_000);
    assert_eq!(config.breaker_threshold, 10);
    assert!(!config.strict_little_endian);
    assert!(config.scheduler_enabled);
}

#[test]
fn load_config_from_env() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
    reset_env();
    unsafe {
        std::env::set_var("FIELDPOLL_HTTP_ADDR", "0.0.0.0:9000");
        std::env::set_var("FIELDPOLL_STORAGE", "postgres");
        std::env::set_var("FIELDPOLL_DATABASE_URL", "postgresql://fieldpoll@localhost/fieldpoll");
        std::env::set_var("FIELDPOLL_COORDINATION", "REDIS");
        std::env::set_var("FIELDPOLL_REDIS_URL", "redis://localhost:6379");
        std::env::set_var("FIELDPOLL_STRICT_LITTLE_ENDIAN", "true");
        std::env::set_var("FIELDPOLL_BREAKER_THRESHOLD", "4");
    }

    let config = AppConfig::from_env().expect("config");
    assert_eq!(config.http_addr, "0.0.0.0:9000");
    assert_eq!(config.storage_backend, StorageBackend::Postgres);
    assert_eq!(
        config.database_url.as_deref(),
        Some("postgresql://fieldpoll@localhost/fieldpoll")
    );
    assert_eq!(config.coordination_backend, CoordinationBackend::Redis);
    assert!(config.strict_little_endian);
    assert_eq!(config.breaker_threshold, 4);
    reset_env();
}

#[test]
fn postgres_without_url_is_missing() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
    reset_env();
    unsafe {
        std::env::set_var("FIELDPOLL_STORAGE", "postgres");
    }

    let err = AppConfig::from_env().expect_err("missing url");
    assert!(matches!(err, ConfigError::Missing(key) if key == "FIELDPOLL_DATABASE_URL"));
    reset_env();
}

#[test]
fn invalid_numbers_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|err| err.into_inner());
    reset_env();
    unsafe {
        std::env::set_var("FIELDPOLL_CONNECT_ATTEMPTS", "0");
    }
    assert!(matches!(
        AppConfig::from_env(),
        Err(ConfigError::Invalid(key, _)) if key == "FIELDPOLL_CONNECT_ATTEMPTS"
    ));

    unsafe {
        std::env::set_var("FIELDPOLL_CONNECT_ATTEMPTS", "three");
    }
    assert!(matches!(
        AppConfig::from_env(),
        Err(ConfigError::Invalid(_, value)) if value == "three"
    ));
    reset_env();
}
