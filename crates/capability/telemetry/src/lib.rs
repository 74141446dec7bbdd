//! 追踪、请求 ID 生成与进程内计数指标。

use serde::Serialize;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 指标快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub polls_succeeded: u64,
    pub polls_failed: u64,
    pub point_errors: u64,
    pub readings_inserted: u64,
    pub readings_duplicate: u64,
    pub reading_write_failures: u64,
    pub notify_failures: u64,
    pub breaker_trips: u64,
    pub tasks_enqueued: u64,
    pub lock_contended: u64,
    pub poll_latency_ms_total: u64,
    pub poll_latency_ms_count: u64,
}

/// 进程内计数指标。
#[derive(Default)]
pub struct TelemetryMetrics {
    polls_succeeded: AtomicU64,
    polls_failed: AtomicU64,
    point_errors: AtomicU64,
    readings_inserted: AtomicU64,
    readings_duplicate: AtomicU64,
    reading_write_failures: AtomicU64,
    notify_failures: AtomicU64,
    breaker_trips: AtomicU64,
    tasks_enqueued: AtomicU64,
    lock_contended: AtomicU64,
    poll_latency_ms_total: AtomicU64,
    poll_latency_ms_count: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            polls_succeeded: self.polls_succeeded.load(Ordering::Relaxed),
            polls_failed: self.polls_failed.load(Ordering::Relaxed),
            point_errors: self.point_errors.load(Ordering::Relaxed),
            readings_inserted: self.readings_inserted.load(Ordering::Relaxed),
            readings_duplicate: self.readings_duplicate.load(Ordering::Relaxed),
            reading_write_failures: self.reading_write_failures.load(Ordering::Relaxed),
            notify_failures: self.notify_failures.load(Ordering::Relaxed),
            breaker_trips: self.breaker_trips.load(Ordering::Relaxed),
            tasks_enqueued: self.tasks_enqueued.load(Ordering::Relaxed),
            lock_contended: self.lock_contended.load(Ordering::Relaxed),
            poll_latency_ms_total: self.poll_latency_ms_total.load(Ordering::Relaxed),
            poll_latency_ms_count: self.poll_latency_ms_count.load(Ordering::Relaxed),
        }
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录一次网关轮询结果与耗时（毫秒）。
pub fn record_poll(success: bool, latency_ms: u64) {
    let metrics = metrics();
    if success {
        metrics.polls_succeeded.fetch_add(1, Ordering::Relaxed);
    } else {
        metrics.polls_failed.fetch_add(1, Ordering::Relaxed);
    }
    metrics
        .poll_latency_ms_total
        .fetch_add(latency_ms, Ordering::Relaxed);
    metrics
        .poll_latency_ms_count
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录点位错误次数。
pub fn record_point_errors(count: u64) {
    metrics().point_errors.fetch_add(count, Ordering::Relaxed);
}

/// 记录读数新写入次数。
pub fn record_reading_inserted() {
    metrics().readings_inserted.fetch_add(1, Ordering::Relaxed);
}

/// 记录重复读数（已存在）次数。
pub fn record_reading_duplicate() {
    metrics().readings_duplicate.fetch_add(1, Ordering::Relaxed);
}

/// 记录读数写入失败次数。
pub fn record_reading_write_failure() {
    metrics()
        .reading_write_failures
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录读数通知失败次数。
pub fn record_notify_failure() {
    metrics().notify_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录熔断次数。
pub fn record_breaker_trip() {
    metrics().breaker_trips.fetch_add(1, Ordering::Relaxed);
}

/// 记录入队任务次数。
pub fn record_task_enqueued() {
    metrics().tasks_enqueued.fetch_add(1, Ordering::Relaxed);
}

/// 记录锁竞争失败次数。
pub fn record_lock_contended() {
    metrics().lock_contended.fetch_add(1, Ordering::Relaxed);
}
