use async_trait::async_trait;
use domain::{Gateway, NewGateway, PollOutcome, now_epoch_ms};
use fieldpoll_scheduler::{
    ChannelTaskQueue, ChannelTaskReceiver, CircuitBreaker, GatewayState, IntegrityIssueKind,
    PollTask, PollingSupervisor, QueueError, ScheduleEntry, StartOutcome, TaskQueue,
};
use fieldpoll_storage::{
    CoordinationStore, GatewayStore, InMemoryCoordinationStore, InMemoryGatewayStore,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 入队前停顿一段时间，拉长网关锁的持有时间
#[derive(Default)]
struct SlowQueue {
    tasks: Mutex<Vec<PollTask>>,
}

#[async_trait]
impl TaskQueue for SlowQueue {
    async fn enqueue(&self, task: &PollTask) -> Result<(), QueueError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.tasks.lock().expect("lock").push(task.clone());
        Ok(())
    }
}

struct Fixture {
    supervisor: PollingSupervisor,
    gateways: Arc<InMemoryGatewayStore>,
    coordination: Arc<InMemoryCoordinationStore>,
    receiver: ChannelTaskReceiver,
}

fn fixture() -> Fixture {
    let gateways = Arc::new(InMemoryGatewayStore::new());
    let coordination = Arc::new(InMemoryCoordinationStore::new());
    let (queue, receiver) = ChannelTaskQueue::new(64);
    let supervisor = PollingSupervisor::new(gateways.clone(), coordination.clone(), Arc::new(queue));
    Fixture {
        supervisor,
        gateways,
        coordination,
        receiver,
    }
}

async fn add_gateway(store: &InMemoryGatewayStore, port: u16, is_active: bool) -> Gateway {
    store
        .create_gateway(NewGateway {
            name: format!("gw-{port}"),
            host: "192.168.1.10".to_string(),
            port,
            unit_id: 1,
            poll_interval_secs: 30,
            is_active,
        })
        .await
        .expect("gateway")
}

fn drain(receiver: &mut ChannelTaskReceiver) -> Vec<PollTask> {
    let mut tasks = Vec::new();
    while let Some(task) = receiver.try_recv() {
        tasks.push(task);
    }
    tasks
}

#[tokio::test]
async fn start_enqueues_task_and_writes_schedule_entry() {
    let mut fx = fixture();
    let gateway = add_gateway(&fx.gateways, 502, true).await;

    let outcome = fx.supervisor.start_gateway_polling(&gateway).await;
    assert!(outcome.is_started(), "{outcome:?}");

    let tasks = drain(&mut fx.receiver);
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].gateway_id, gateway.gateway_id);

    let key = format!("schedule:gateway:{}", gateway.gateway_id);
    let raw = fx.coordination.get(&key).await.expect("get").expect("entry");
    let entry: ScheduleEntry = serde_json::from_str(&raw).expect("json");
    assert_eq!(entry.gateway_id, gateway.gateway_id);
    assert_eq!(entry.poll_interval, 30);
    assert_eq!(entry.last_scheduled, tasks[0].scheduled_at_ms);
    let ttl = fx.coordination.ttl(&key).expect("ttl");
    assert!(ttl <= Duration::from_secs(60) && ttl > Duration::from_secs(55));

    let lock = format!("lock:gateway:{}", gateway.gateway_id);
    assert_eq!(fx.coordination.get(&lock).await.expect("get"), None);
}

#[tokio::test]
async fn start_rechecks_activation_inside_lock() {
    let mut fx = fixture();
    let gateway = add_gateway(&fx.gateways, 502, true).await;
    fx.gateways
        .set_gateway_active(gateway.gateway_id, false)
        .await
        .expect("deactivate");

    // 调用方持有的是过期的“已启用”快照
    let outcome = fx.supervisor.start_gateway_polling(&gateway).await;
    assert_eq!(outcome, StartOutcome::Inactive);
    assert!(drain(&mut fx.receiver).is_empty());
    let lock = format!("lock:gateway:{}", gateway.gateway_id);
    assert_eq!(fx.coordination.get(&lock).await.expect("get"), None);
}

#[tokio::test]
async fn held_gateway_lock_reports_locked() {
    let mut fx = fixture();
    let gateway = add_gateway(&fx.gateways, 502, true).await;
    let lock = format!("lock:gateway:{}", gateway.gateway_id);
    fx.coordination
        .set_if_absent(&lock, "other-instance", Duration::from_secs(60))
        .await
        .expect("lock");

    assert_eq!(
        fx.supervisor.start_gateway_polling(&gateway).await,
        StartOutcome::Locked
    );
    assert!(drain(&mut fx.receiver).is_empty());
    assert_eq!(
        fx.coordination.get(&lock).await.expect("get").as_deref(),
        Some("other-instance")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_starts_enqueue_exactly_once() {
    let gateways = Arc::new(InMemoryGatewayStore::new());
    let coordination = Arc::new(InMemoryCoordinationStore::new());
    let queue = Arc::new(SlowQueue::default());
    let supervisor = PollingSupervisor::new(gateways.clone(), coordination, queue.clone());
    let gateway = add_gateway(&gateways, 502, true).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let supervisor = supervisor.clone();
        let gateway = gateway.clone();
        handles.push(tokio::spawn(async move {
            supervisor.start_gateway_polling(&gateway).await
        }));
    }
    let mut started = 0;
    let mut locked = 0;
    for handle in handles {
        match handle.await.expect("join") {
            StartOutcome::Started { .. } => started += 1,
            StartOutcome::Locked => locked += 1,
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    assert_eq!(started, 1);
    assert_eq!(locked, 7);
    assert_eq!(queue.tasks.lock().expect("lock").len(), 1);
}

#[tokio::test]
async fn bootstrap_starts_active_gateways_and_writes_status() {
    let mut fx = fixture();
    let first = add_gateway(&fx.gateways, 502, true).await;
    let second = add_gateway(&fx.gateways, 503, true).await;
    add_gateway(&fx.gateways, 504, false).await;

    let report = fx.supervisor.start_reliable_polling().await.expect("bootstrap");
    assert!(!report.skipped);
    assert_eq!(report.total_active, 2);
    let mut started = report.started.clone();
    started.sort();
    assert_eq!(started, vec![first.gateway_id, second.gateway_id]);
    assert_eq!(drain(&mut fx.receiver).len(), 2);

    let status = fx.supervisor.system_status().await.expect("status");
    assert_eq!(status.total_gateways, 3);
    assert_eq!(status.scheduled, 2);
    let snapshot = status.last_bootstrap.expect("snapshot");
    assert_eq!(snapshot.started, 2);
    assert_eq!(fx.coordination.get("lock:system").await.expect("get"), None);
}

#[tokio::test]
async fn bootstrap_is_skipped_while_system_lock_is_held() {
    let mut fx = fixture();
    add_gateway(&fx.gateways, 502, true).await;
    fx.coordination
        .set_if_absent("lock:system", "peer", Duration::from_secs(300))
        .await
        .expect("lock");

    let report = fx.supervisor.start_reliable_polling().await.expect("bootstrap");
    assert!(report.skipped);
    assert!(report.started.is_empty());
    assert!(drain(&mut fx.receiver).is_empty());
}

#[tokio::test]
async fn repair_restores_integrity() {
    let mut fx = fixture();
    let missing = add_gateway(&fx.gateways, 502, true).await;
    let overdue = add_gateway(&fx.gateways, 503, true).await;
    let inactive = add_gateway(&fx.gateways, 504, false).await;

    let stale = ScheduleEntry::scheduled(overdue.gateway_id, now_epoch_ms() - 50_000, 30);
    fx.coordination
        .set(
            &format!("schedule:gateway:{}", overdue.gateway_id),
            &serde_json::to_string(&stale).expect("json"),
            None,
        )
        .await
        .expect("set");
    let leftover = ScheduleEntry::scheduled(inactive.gateway_id, now_epoch_ms(), 30);
    fx.coordination
        .set(
            &format!("schedule:gateway:{}", inactive.gateway_id),
            &serde_json::to_string(&leftover).expect("json"),
            None,
        )
        .await
        .expect("set");

    let before = fx.supervisor.validate_polling_integrity().await.expect("validate");
    assert_eq!(before.checked, 2);
    assert!(!before.is_healthy());
    let kinds: Vec<(i64, IntegrityIssueKind)> = before
        .issues
        .iter()
        .map(|issue| (issue.gateway_id, issue.kind))
        .collect();
    assert!(kinds.contains(&(missing.gateway_id, IntegrityIssueKind::MissingPolling)));
    assert!(kinds.contains(&(overdue.gateway_id, IntegrityIssueKind::OverduePolling)));

    let repair = fx
        .supervisor
        .ensure_active_gateways_polling()
        .await
        .expect("repair");
    assert_eq!(repair.started, vec![missing.gateway_id, overdue.gateway_id]);
    assert_eq!(repair.removed_inactive, 1);
    assert_eq!(drain(&mut fx.receiver).len(), 2);

    let after = fx.supervisor.validate_polling_integrity().await.expect("validate");
    assert!(after.is_healthy(), "{:?}", after.issues);
}

#[tokio::test]
async fn audit_removes_orphans_stale_entries_and_gateway_locks() {
    let fx = fixture();
    let active = add_gateway(&fx.gateways, 502, true).await;
    let inactive = add_gateway(&fx.gateways, 503, false).await;
    let fresh = add_gateway(&fx.gateways, 505, true).await;
    let now = now_epoch_ms();

    let entries = [
        (inactive.gateway_id, now),
        (9_999, now),
        (active.gateway_id, now - 100_000),
        (fresh.gateway_id, now),
    ];
    for (gateway_id, last_scheduled) in entries {
        let entry = ScheduleEntry::scheduled(gateway_id, last_scheduled, 30);
        fx.coordination
            .set(
                &format!("schedule:gateway:{gateway_id}"),
                &serde_json::to_string(&entry).expect("json"),
                None,
            )
            .await
            .expect("set");
    }
    fx.coordination
        .set("schedule:gateway:broken", "{", None)
        .await
        .expect("set");
    fx.coordination
        .set("lock:gateway:1", "someone", None)
        .await
        .expect("set");
    fx.coordination
        .set("queue:unrelated", "keep", None)
        .await
        .expect("set");

    let report = fx.supervisor.audit_and_cleanup().await.expect("audit");
    assert_eq!(report.removed_inactive, 1);
    assert_eq!(report.removed_unknown, 1);
    assert_eq!(report.removed_stale, 1);
    assert_eq!(report.removed_malformed, 1);
    assert_eq!(report.removed_locks, 1);
    assert_eq!(report.removed_total(), 5);

    let remaining = fx
        .coordination
        .scan_prefix("schedule:gateway:")
        .await
        .expect("scan");
    assert_eq!(remaining, vec![format!("schedule:gateway:{}", fresh.gateway_id)]);
    assert!(fx.coordination.get("queue:unrelated").await.expect("get").is_some());
}

#[tokio::test]
async fn breaker_trip_makes_later_starts_a_no_op() {
    let mut fx = fixture();
    let gateway = add_gateway(&fx.gateways, 502, true).await;
    let breaker = CircuitBreaker::new(fx.gateways.clone());

    let mut current = gateway.clone();
    for attempt in 1..=10 {
        current = fx
            .gateways
            .record_poll_outcome(
                gateway.gateway_id,
                PollOutcome {
                    success: false,
                    contacted: false,
                    at_ms: attempt,
                },
            )
            .await
            .expect("outcome")
            .expect("gateway");
        let tripped = breaker.evaluate(&current).await.expect("evaluate");
        assert_eq!(tripped, attempt == 10, "attempt {attempt}");
    }

    let stored = fx
        .gateways
        .find_gateway(gateway.gateway_id)
        .await
        .expect("find")
        .expect("gateway");
    assert!(!stored.is_active);
    assert!(stored.auto_disabled);
    assert_eq!(stored.consecutive_failures, 10);

    assert_eq!(
        fx.supervisor.start_gateway_polling(&gateway).await,
        StartOutcome::Inactive
    );
    assert!(drain(&mut fx.receiver).is_empty());
    let status = fx.supervisor.polling_status().await.expect("status");
    assert_eq!(status[0].state, GatewayState::Disabled);
}

#[tokio::test]
async fn success_resets_consecutive_failures() {
    let fx = fixture();
    let gateway = add_gateway(&fx.gateways, 502, true).await;
    let breaker = CircuitBreaker::new(fx.gateways.clone());
    for (index, success) in [false; 9].into_iter().chain([true]).chain([false; 9]).enumerate() {
        let updated = fx
            .gateways
            .record_poll_outcome(
                gateway.gateway_id,
                PollOutcome {
                    success,
                    contacted: true,
                    at_ms: index as i64,
                },
            )
            .await
            .expect("outcome")
            .expect("gateway");
        assert!(!breaker.evaluate(&updated).await.expect("evaluate"));
    }
}

#[tokio::test]
async fn stop_all_only_touches_polling_prefixes() {
    let mut fx = fixture();
    let first = add_gateway(&fx.gateways, 502, true).await;
    let second = add_gateway(&fx.gateways, 503, true).await;
    fx.supervisor.start_gateway_polling(&first).await;
    fx.supervisor.start_gateway_polling(&second).await;
    drain(&mut fx.receiver);
    fx.coordination
        .set("lock:gateway:77", "x", None)
        .await
        .expect("set");
    fx.coordination
        .set("session:other", "keep", None)
        .await
        .expect("set");

    let report = fx.supervisor.stop_all_polling().await.expect("stop");
    assert_eq!(report.schedules_removed, 2);
    assert_eq!(report.locks_removed, 1);
    assert!(fx.coordination.get("session:other").await.expect("get").is_some());

    let validation = fx.supervisor.validate_polling_integrity().await.expect("validate");
    assert_eq!(validation.issues.len(), 2);
}

#[tokio::test]
async fn stop_gateway_deactivates_and_clears_keys() {
    let mut fx = fixture();
    let gateway = add_gateway(&fx.gateways, 502, true).await;
    fx.supervisor.start_gateway_polling(&gateway).await;
    drain(&mut fx.receiver);

    assert!(fx
        .supervisor
        .stop_gateway_polling(gateway.gateway_id)
        .await
        .expect("stop"));
    let stored = fx
        .gateways
        .find_gateway(gateway.gateway_id)
        .await
        .expect("find")
        .expect("gateway");
    assert!(!stored.is_active);
    assert!(!stored.auto_disabled);
    let key = format!("schedule:gateway:{}", gateway.gateway_id);
    assert_eq!(fx.coordination.get(&key).await.expect("get"), None);
    assert!(!fx.supervisor.stop_gateway_polling(424_242).await.expect("stop"));
}

#[tokio::test]
async fn tick_schedules_once_per_cycle() {
    let mut fx = fixture();
    add_gateway(&fx.gateways, 502, true).await;

    let first = fx.supervisor.run_tick(true).await.expect("tick");
    assert!(!first.skipped);
    assert_eq!(first.scheduled.started.len(), 1);
    assert!(first.audit.is_some());
    let repair = first.repair.expect("repair");
    assert!(repair.started.is_empty());

    let second = fx.supervisor.run_tick(false).await.expect("tick");
    assert!(second.audit.is_none());
    // 两次 tick 之间恰好跨过周期边界时才会再次入队
    assert!(second.scheduled.started.len() <= 1);
    let total = 1 + second.scheduled.started.len();
    assert_eq!(drain(&mut fx.receiver).len(), total);
    assert_eq!(fx.coordination.get("lock:system").await.expect("get"), None);
}

#[tokio::test]
async fn entry_older_than_one_interval_is_overdue_and_repaired() {
    let mut fx = fixture();
    let gateway = add_gateway(&fx.gateways, 502, true).await;
    let key = format!("schedule:gateway:{}", gateway.gateway_id);
    // 30 秒周期，上次调度在 40 秒前
    let lagging = ScheduleEntry::scheduled(gateway.gateway_id, now_epoch_ms() - 40_000, 30);
    fx.coordination
        .set(&key, &serde_json::to_string(&lagging).expect("json"), None)
        .await
        .expect("set");

    let status = fx.supervisor.polling_status().await.expect("status");
    assert_eq!(status[0].state, GatewayState::Overdue);
    let before = fx.supervisor.validate_polling_integrity().await.expect("validate");
    assert_eq!(before.issues.len(), 1);
    assert_eq!(before.issues[0].kind, IntegrityIssueKind::OverduePolling);

    let repair = fx
        .supervisor
        .ensure_active_gateways_polling()
        .await
        .expect("repair");
    assert_eq!(repair.started, vec![gateway.gateway_id]);
    assert_eq!(drain(&mut fx.receiver).len(), 1);

    let raw = fx.coordination.get(&key).await.expect("get").expect("entry");
    let entry: ScheduleEntry = serde_json::from_str(&raw).expect("json");
    assert!(entry.age_ms(now_epoch_ms()) <= 30_000);
    let after = fx.supervisor.validate_polling_integrity().await.expect("validate");
    assert!(after.is_healthy(), "{:?}", after.issues);
}

#[tokio::test]
async fn cancelled_bootstrap_does_not_block_next_tick() {
    let gateways = Arc::new(InMemoryGatewayStore::new());
    let coordination = Arc::new(InMemoryCoordinationStore::new());
    let queue = Arc::new(SlowQueue::default());
    let supervisor = PollingSupervisor::new(gateways.clone(), coordination.clone(), queue);
    add_gateway(&gateways, 502, true).await;

    // 入队需要 50ms，请求在持锁期间被取消
    let cancelled =
        tokio::time::timeout(Duration::from_millis(10), supervisor.start_reliable_polling()).await;
    assert!(cancelled.is_err());
    tokio::time::sleep(Duration::from_millis(5)).await;

    assert_eq!(coordination.get("lock:system").await.expect("get"), None);
    assert_eq!(coordination.get("lock:gateway:1").await.expect("get"), None);
    let tick = supervisor.run_tick(false).await.expect("tick");
    assert!(!tick.skipped);
}
