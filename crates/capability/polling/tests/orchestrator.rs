use async_trait::async_trait;
use domain::{
    ByteOrder, DataType, ErrorCategory, FunctionCode, Gateway, NewDataPoint, NewGateway, Quality,
};
use fieldpoll_polling::{BroadcastNotifier, PollOrchestrator, PublishingNotifier, READINGS_CHANNEL};
use fieldpoll_protocol::{
    ClientConfig, ClientError, Connector, ModbusClient, RegisterSession, RetryPolicy, codec,
};
use fieldpoll_storage::{
    DataPointStore, GatewayStore, InMemoryCoordinationStore, InMemoryDataPointStore,
    InMemoryGatewayStore, InMemoryReadingStore, ReadingStore,
};
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// 按 (功能码, PDU 地址) 返回预置寄存器的设备脚本
struct ScriptedDevice {
    registers: HashMap<(u8, u16), Vec<u16>>,
    reachable: bool,
    connects: AtomicUsize,
}

struct ScriptedSession {
    registers: HashMap<(u8, u16), Vec<u16>>,
}

#[async_trait]
impl RegisterSession for ScriptedSession {
    async fn read_registers(
        &mut self,
        _unit_id: u8,
        function: FunctionCode,
        pdu_address: u16,
        _count: u16,
    ) -> Result<Vec<u16>, ClientError> {
        self.registers
            .get(&(function.code(), pdu_address))
            .cloned()
            .ok_or_else(|| ClientError::IllegalRegister(format!("address {pdu_address}")))
    }

    async fn close(&mut self) {}
}

#[async_trait]
impl Connector for ScriptedDevice {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn RegisterSession>, ClientError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.reachable {
            return Err(ClientError::ConnectionRefused {
                endpoint: format!("{host}:{port}"),
                message: "refused".to_string(),
            });
        }
        Ok(Box::new(ScriptedSession {
            registers: self.registers.clone(),
        }))
    }
}

struct Harness {
    orchestrator: PollOrchestrator,
    device: Arc<ScriptedDevice>,
    gateways: Arc<InMemoryGatewayStore>,
    points: Arc<InMemoryDataPointStore>,
    readings: Arc<InMemoryReadingStore>,
    notifier: BroadcastNotifier,
    gateway: Gateway,
}

async fn harness(registers: &[((u8, u16), Vec<u16>)], reachable: bool) -> Harness {
    let device = Arc::new(ScriptedDevice {
        registers: registers.iter().cloned().collect(),
        reachable,
        connects: AtomicUsize::new(0),
    });
    let client = ModbusClient::new(
        device.clone(),
        ClientConfig {
            retry: RetryPolicy {
                attempts: 2,
                backoff_base: Duration::from_millis(1),
            },
            ..ClientConfig::default()
        },
    );
    let gateways = Arc::new(InMemoryGatewayStore::new());
    let points = Arc::new(InMemoryDataPointStore::new());
    let readings = Arc::new(InMemoryReadingStore::new());
    let notifier = BroadcastNotifier::new(64);
    let gateway = gateways
        .create_gateway(NewGateway {
            name: "plc-1".to_string(),
            host: "10.0.0.5".to_string(),
            port: 502,
            unit_id: 1,
            poll_interval_secs: 60,
            is_active: true,
        })
        .await
        .expect("gateway");
    let orchestrator = PollOrchestrator::new_with_notifier(
        client,
        gateways.clone(),
        points.clone(),
        readings.clone(),
        Arc::new(notifier.clone()),
    );
    Harness {
        orchestrator,
        device,
        gateways,
        points,
        readings,
        notifier,
        gateway,
    }
}

fn point(gateway_id: i64, register_address: u32, data_type: DataType, scale_factor: f64) -> NewDataPoint {
    NewDataPoint {
        gateway_id,
        name: format!("reg-{register_address}"),
        function_code: 3,
        register_address,
        register_count: data_type.register_count(),
        data_type,
        byte_order: ByteOrder::BigEndian,
        scale_factor,
        unit: Some("V".to_string()),
        is_enabled: true,
    }
}

const SCHEDULED_AT: i64 = 1_700_000_059_999;
const READ_AT: i64 = 1_700_000_040_000;

#[tokio::test]
async fn healthy_gateway_produces_good_readings() {
    let float_words = codec::encode(230.5, DataType::Float32, ByteOrder::BigEndian).expect("encode");
    let h = harness(&[((3, 99), vec![1234]), ((3, 199), float_words)], true).await;
    let id = h.gateway.gateway_id;
    let voltage = h
        .points
        .create_data_point(point(id, 100, DataType::Int16, 0.1))
        .await
        .expect("point");
    h.points
        .create_data_point(point(id, 200, DataType::Float32, 1.0))
        .await
        .expect("point");
    let mut events = h.notifier.subscribe();

    let result = h.orchestrator.poll_gateway(&h.gateway, SCHEDULED_AT).await;

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.read_at, READ_AT);
    assert_eq!(result.readings.len(), 2);
    let first = &result.readings[0];
    assert_eq!(first.data_point_id, voltage.data_point_id);
    assert_eq!(first.raw_registers, vec![1234]);
    assert_eq!(first.raw_value, Some(1234.0));
    assert!((first.value.expect("value") - 123.4).abs() < 1e-9);
    assert_eq!(first.quality, Quality::Good);
    assert_eq!(result.readings[1].value, Some(230.5));
    assert!(result.readings.iter().all(|reading| reading.read_at_ms == READ_AT));

    let gateway = h.gateways.find_gateway(id).await.expect("find").expect("gateway");
    assert_eq!(gateway.success_count, 1);
    assert_eq!(gateway.consecutive_failures, 0);
    assert!(gateway.last_seen_at_ms.is_some());
    assert_eq!(h.device.connects.load(Ordering::SeqCst), 1);

    let event = events.recv().await.expect("event");
    assert!(event.inserted);
    assert_eq!(event.gateway_id, id);
}

#[tokio::test]
async fn point_failure_does_not_abort_siblings() {
    let h = harness(&[((3, 199), vec![7])], true).await;
    let id = h.gateway.gateway_id;
    let missing = h
        .points
        .create_data_point(point(id, 100, DataType::Uint16, 1.0))
        .await
        .expect("point");
    let present = h
        .points
        .create_data_point(point(id, 200, DataType::Uint16, 1.0))
        .await
        .expect("point");

    let result = h.orchestrator.poll_gateway(&h.gateway, SCHEDULED_AT).await;

    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);
    let error = &result.errors[0];
    assert_eq!(error.point_id, Some(missing.data_point_id));
    assert_eq!(error.category, ErrorCategory::IllegalRegister);
    assert!(!error.message.is_empty());

    let bad = h
        .readings
        .find_reading(missing.data_point_id, READ_AT)
        .await
        .expect("find")
        .expect("bad reading");
    assert_eq!(bad.quality, Quality::Bad);
    assert_eq!(bad.value, None);
    let good = h
        .readings
        .find_reading(present.data_point_id, READ_AT)
        .await
        .expect("find")
        .expect("good reading");
    assert_eq!(good.value, Some(7.0));

    let gateway = h.gateways.find_gateway(id).await.expect("find").expect("gateway");
    assert_eq!(gateway.failure_count, 1);
    assert_eq!(gateway.consecutive_failures, 1);
    assert!(gateway.last_seen_at_ms.is_some());
}

#[tokio::test]
async fn unreachable_gateway_records_bad_readings() {
    let h = harness(&[], false).await;
    let id = h.gateway.gateway_id;
    for address in [100, 200, 300] {
        h.points
            .create_data_point(point(id, address, DataType::Uint16, 1.0))
            .await
            .expect("point");
    }

    let result = h.orchestrator.poll_gateway(&h.gateway, SCHEDULED_AT).await;

    assert!(!result.success);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.gateway_errors().count(), 1);
    assert_eq!(result.errors[0].category, ErrorCategory::ConnectionRefused);
    assert_eq!(result.readings.len(), 3);
    assert!(result.readings.iter().all(|reading| {
        reading.quality == Quality::Bad
            && reading.raw_registers.is_empty()
            && reading.value.is_none()
    }));
    assert_eq!(h.device.connects.load(Ordering::SeqCst), 2);

    let gateway = h.gateways.find_gateway(id).await.expect("find").expect("gateway");
    assert_eq!(gateway.failure_count, 1);
    assert_eq!(gateway.last_seen_at_ms, None);
}

#[tokio::test]
async fn repeated_cycle_does_not_duplicate_readings() {
    let h = harness(&[((3, 99), vec![1])], true).await;
    let id = h.gateway.gateway_id;
    let created = h
        .points
        .create_data_point(point(id, 100, DataType::Uint16, 1.0))
        .await
        .expect("point");

    let first = h.orchestrator.poll_gateway(&h.gateway, SCHEDULED_AT).await;
    // 同一周期内的另一个调度时刻
    let second = h.orchestrator.poll_gateway(&h.gateway, READ_AT + 5).await;

    assert!(first.success && second.success);
    assert_eq!(first.readings[0].reading_id, second.readings[0].reading_id);
    assert_eq!(h.readings.len(), 1);
    let all = h
        .readings
        .list_readings(created.data_point_id, 10)
        .await
        .expect("list");
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn disabled_points_are_skipped() {
    let h = harness(&[((3, 99), vec![1])], true).await;
    let id = h.gateway.gateway_id;
    let disabled = h
        .points
        .create_data_point(point(id, 100, DataType::Uint16, 1.0))
        .await
        .expect("point");
    h.points
        .set_data_point_enabled(disabled.data_point_id, false)
        .await
        .expect("disable");

    let result = h.orchestrator.poll_gateway(&h.gateway, SCHEDULED_AT).await;
    assert!(result.success);
    assert!(result.readings.is_empty());
    assert!(h.readings.is_empty());
}

#[tokio::test]
async fn non_finite_float_is_stored_as_uncertain() {
    let h = harness(&[((3, 99), vec![0x7FC0, 0x0000])], true).await;
    let id = h.gateway.gateway_id;
    let created = h
        .points
        .create_data_point(point(id, 100, DataType::Float32, 1.0))
        .await
        .expect("point");

    let result = h.orchestrator.poll_gateway(&h.gateway, SCHEDULED_AT).await;
    assert!(result.success, "{:?}", result.errors);

    let stored = h
        .readings
        .find_reading(created.data_point_id, READ_AT)
        .await
        .expect("find")
        .expect("reading");
    assert_eq!(stored.quality, Quality::Uncertain);
    assert_eq!(stored.value, None);
    assert_eq!(stored.raw_value, None);
    assert_eq!(stored.raw_registers, vec![0x7FC0, 0x0000]);
}

#[tokio::test]
async fn readings_are_published_on_coordination_channel() {
    let h = harness(&[((3, 99), vec![5])], true).await;
    let id = h.gateway.gateway_id;
    let created = h
        .points
        .create_data_point(point(id, 100, DataType::Uint16, 1.0))
        .await
        .expect("point");
    let coordination = Arc::new(InMemoryCoordinationStore::new());
    let mut messages = coordination.subscribe();
    let orchestrator = PollOrchestrator::new_with_notifier(
        h.orchestrator.client().clone(),
        h.gateways.clone(),
        h.points.clone(),
        h.readings.clone(),
        Arc::new(PublishingNotifier::new(coordination.clone())),
    );

    let result = orchestrator.poll_gateway(&h.gateway, SCHEDULED_AT).await;
    assert!(result.success, "{:?}", result.errors);

    let message = messages.recv().await.expect("message");
    assert_eq!(message.channel, READINGS_CHANNEL);
    let event: serde_json::Value = serde_json::from_str(&message.message).expect("json");
    assert_eq!(event["gateway_id"], id);
    assert_eq!(event["inserted"], true);
    assert_eq!(event["reading"]["data_point_id"], created.data_point_id);
    assert_eq!(event["reading"]["value"], 5.0);
}

/// 收集格式化后的日志输出
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("logs").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl CapturedLogs {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("logs")).into_owned()
    }
}

#[tokio::test]
async fn failure_logs_carry_gateway_and_point_context() {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let h = harness(&[], true).await;
    let id = h.gateway.gateway_id;
    h.points
        .create_data_point(point(id, 100, DataType::Uint16, 1.0))
        .await
        .expect("point");
    h.orchestrator.poll_gateway(&h.gateway, SCHEDULED_AT).await;

    let text = logs.text();
    let line = text
        .lines()
        .find(|line| line.contains("point_read_failed"))
        .expect("point failure logged");
    for needle in ["host=10.0.0.5", "port=502", "function_code=3", "data_type", "uint16", "byte_order", "big_endian"] {
        assert!(line.contains(needle), "missing {needle} in {line}");
    }

    let unreachable = harness(&[], false).await;
    unreachable
        .points
        .create_data_point(point(unreachable.gateway.gateway_id, 100, DataType::Uint16, 1.0))
        .await
        .expect("point");
    unreachable
        .orchestrator
        .poll_gateway(&unreachable.gateway, SCHEDULED_AT)
        .await;
    let text = logs.text();
    let line = text
        .lines()
        .find(|line| line.contains("gateway_unreachable"))
        .expect("gateway failure logged");
    for needle in ["host=10.0.0.5", "port=502", "success_count=0", "failure_count=0"] {
        assert!(line.contains(needle), "missing {needle} in {line}");
    }
}
