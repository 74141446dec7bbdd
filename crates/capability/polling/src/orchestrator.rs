//! 单网关轮询编排
//!
//! 一轮轮询读取网关的全部已启用点位：
//! 1. 建立连接（失败时为每个点位写入 bad 读数，并记一条网关级错误）
//! 2. 逐点读取、解码、缩放；单点失败不影响其它点位
//! 3. 每条读数经去重写入，再发布读数事件
//! 4. 更新健康计数器；建立过连接时刷新 last_seen_at
//! 5. 关闭本轮连接池
//!
//! 所有错误都汇总进 [`PollResult`]，不向调用方传播。

use crate::guard::DuplicateGuard;
use crate::notifier::{NoopNotifier, ReadingEvent, ReadingNotifier};
use crate::result::{PointError, PollResult};
use domain::{
    DataPoint, ErrorCategory, Gateway, NewReading, PollOutcome, Quality, now_epoch_ms,
};
use fieldpoll_protocol::{ClientError, ConnectionPool, ModbusClient, codec};
use fieldpoll_storage::{DataPointStore, GatewayStore, ReadingStore};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct PollOrchestrator {
    client: ModbusClient,
    gateways: Arc<dyn GatewayStore>,
    points: Arc<dyn DataPointStore>,
    guard: DuplicateGuard,
    notifier: Arc<dyn ReadingNotifier>,
}

impl PollOrchestrator {
    pub fn new(
        client: ModbusClient,
        gateways: Arc<dyn GatewayStore>,
        points: Arc<dyn DataPointStore>,
        readings: Arc<dyn ReadingStore>,
    ) -> Self {
        Self::new_with_notifier(client, gateways, points, readings, Arc::new(NoopNotifier))
    }

    pub fn new_with_notifier(
        client: ModbusClient,
        gateways: Arc<dyn GatewayStore>,
        points: Arc<dyn DataPointStore>,
        readings: Arc<dyn ReadingStore>,
        notifier: Arc<dyn ReadingNotifier>,
    ) -> Self {
        Self {
            client,
            gateways,
            points,
            guard: DuplicateGuard::new(readings),
            notifier,
        }
    }

    pub fn client(&self) -> &ModbusClient {
        &self.client
    }

    /// 轮询一个网关。`scheduled_at_ms` 为任务的调度时刻，对齐到轮询网格后作为读数时间。
    pub async fn poll_gateway(&self, gateway: &Gateway, scheduled_at_ms: i64) -> PollResult {
        let started = Instant::now();
        let read_at = gateway.nominal_read_at(scheduled_at_ms);
        let mut result = PollResult::new(gateway.gateway_id, read_at);

        let points = match self
            .points
            .list_enabled_data_points(gateway.gateway_id)
            .await
        {
            Ok(points) => points,
            Err(err) => {
                warn!(
                    target: "fieldpoll.polling",
                    gateway_id = gateway.gateway_id,
                    error = %err,
                    "data_points_load_failed"
                );
                result
                    .errors
                    .push(PointError::new(None, ErrorCategory::Storage, err.to_string()));
                return self.finish(result, started);
            }
        };

        let mut pool = self.client.pool();
        let contacted = match pool.ensure_connected(&gateway.host, gateway.port).await {
            Ok(()) => {
                self.read_points(gateway, &points, read_at, &mut pool, &mut result)
                    .await;
                true
            }
            Err(err) => {
                warn!(
                    target: "fieldpoll.polling",
                    gateway_id = gateway.gateway_id,
                    host = %gateway.host,
                    port = gateway.port,
                    unit_id = gateway.unit_id,
                    success_count = gateway.success_count,
                    failure_count = gateway.failure_count,
                    consecutive_failures = gateway.consecutive_failures,
                    points = points.len(),
                    category = err.category().as_str(),
                    error = %err,
                    "gateway_unreachable"
                );
                result.errors.push(PointError::from_client(None, &err));
                for point in &points {
                    let reading = NewReading::bad(point.data_point_id, Vec::new(), read_at);
                    self.store_reading(gateway.gateway_id, reading, &mut result)
                        .await;
                }
                false
            }
        };
        pool.close_all().await;

        result.success = result.errors.is_empty();
        let outcome = PollOutcome {
            success: result.success,
            contacted,
            at_ms: now_epoch_ms(),
        };
        if let Err(err) = self
            .gateways
            .record_poll_outcome(gateway.gateway_id, outcome)
            .await
        {
            warn!(
                target: "fieldpoll.polling",
                gateway_id = gateway.gateway_id,
                error = %err,
                "poll_outcome_write_failed"
            );
            result
                .errors
                .push(PointError::new(None, ErrorCategory::Storage, err.to_string()));
            result.success = false;
        }

        self.finish(result, started)
    }

    async fn read_points(
        &self,
        gateway: &Gateway,
        points: &[DataPoint],
        read_at: i64,
        pool: &mut ConnectionPool<'_>,
        result: &mut PollResult,
    ) {
        let options = self.client.config().codec;
        for point in points {
            let words = match pool
                .read(
                    &gateway.host,
                    gateway.port,
                    gateway.unit_id,
                    point.function_code,
                    point.register_address,
                    point.register_count,
                )
                .await
            {
                Ok(words) => words,
                Err(err) => {
                    self.point_failed(gateway, point, &err, result);
                    let reading = NewReading::bad(point.data_point_id, Vec::new(), read_at);
                    self.store_reading(gateway.gateway_id, reading, result)
                        .await;
                    continue;
                }
            };

            let reading = match codec::decode_with(
                &words,
                point.data_type,
                point.byte_order,
                options,
            ) {
                Ok(value) => {
                    let raw = value.as_f64();
                    if raw.is_finite() {
                        let scaled = codec::scale(raw, point.scale_factor);
                        NewReading::good(point.data_point_id, words, raw, scaled, read_at)
                    } else {
                        NewReading {
                            data_point_id: point.data_point_id,
                            raw_registers: words,
                            raw_value: None,
                            value: None,
                            quality: Quality::Uncertain,
                            read_at_ms: read_at,
                        }
                    }
                }
                Err(err) => {
                    self.point_failed(gateway, point, &ClientError::from(err), result);
                    NewReading::bad(point.data_point_id, words, read_at)
                }
            };
            self.store_reading(gateway.gateway_id, reading, result)
                .await;
        }
    }

    fn point_failed(
        &self,
        gateway: &Gateway,
        point: &DataPoint,
        err: &ClientError,
        result: &mut PollResult,
    ) {
        info!(
            target: "fieldpoll.polling",
            gateway_id = gateway.gateway_id,
            host = %gateway.host,
            port = gateway.port,
            unit_id = gateway.unit_id,
            data_point_id = point.data_point_id,
            function_code = point.function_code.code(),
            register_address = point.register_address,
            register_count = point.register_count,
            data_type = point.data_type.as_str(),
            byte_order = point.byte_order.as_str(),
            category = err.category().as_str(),
            error = %err,
            "point_read_failed"
        );
        result
            .errors
            .push(PointError::from_client(Some(point.data_point_id), err));
    }

    async fn store_reading(&self, gateway_id: i64, reading: NewReading, result: &mut PollResult) {
        let data_point_id = reading.data_point_id;
        match self.guard.persist(reading).await {
            Ok(outcome) => {
                let inserted = outcome.is_inserted();
                let record = outcome.into_reading();
                let event = ReadingEvent {
                    gateway_id,
                    reading: record.clone(),
                    inserted,
                };
                if let Err(err) = self.notifier.notify(event).await {
                    fieldpoll_telemetry::record_notify_failure();
                    debug!(
                        target: "fieldpoll.polling",
                        data_point_id,
                        error = %err,
                        "reading_notify_failed"
                    );
                }
                result.readings.push(record);
            }
            Err(err) => {
                warn!(
                    target: "fieldpoll.polling",
                    gateway_id,
                    data_point_id,
                    error = %err,
                    "reading_write_failed"
                );
                result.errors.push(PointError::new(
                    Some(data_point_id),
                    ErrorCategory::Storage,
                    err.to_string(),
                ));
            }
        }
    }

    fn finish(&self, mut result: PollResult, started: Instant) -> PollResult {
        result.duration_ms = started.elapsed().as_millis() as u64;
        fieldpoll_telemetry::record_poll(result.success, result.duration_ms);
        fieldpoll_telemetry::record_point_errors(result.errors.len() as u64);
        info!(
            target: "fieldpoll.polling",
            gateway_id = result.gateway_id,
            success = result.success,
            readings = result.readings.len(),
            errors = result.errors.len(),
            duration_ms = result.duration_ms,
            read_at = result.read_at,
            "gateway_polled"
        );
        result
    }
}
