//! 按配置装配存储后端、协议客户端、调度层与 worker

use fieldpoll_config::{AppConfig, CoordinationBackend, StorageBackend};
use fieldpoll_polling::{PollOrchestrator, PublishingNotifier};
use fieldpoll_protocol::{ClientConfig, CodecOptions, ModbusClient, RetryPolicy};
use fieldpoll_scheduler::{
    ChannelTaskQueue, ChannelTaskReceiver, CircuitBreaker, PollWorker, PollingSupervisor,
    RedisTaskQueue, SchedulerLoop, SchedulerLoopConfig, SupervisorConfig, TaskQueue,
};
use fieldpoll_storage::{
    CoordinationStore, DataPointStore, GatewayStore, InMemoryCoordinationStore,
    InMemoryDataPointStore, InMemoryGatewayStore, InMemoryReadingStore, PgDataPointStore,
    PgGatewayStore, PgReadingStore, ReadingStore, RedisCoordinationStore, connect_pool,
    run_migrations,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// HTTP 处理器共享状态。
#[derive(Clone)]
pub struct AppState {
    pub gateways: Arc<dyn GatewayStore>,
    pub points: Arc<dyn DataPointStore>,
    pub readings: Arc<dyn ReadingStore>,
    pub supervisor: PollingSupervisor,
    pub client: ModbusClient,
}

/// worker 的任务来源
pub enum TaskSource {
    Channel(ChannelTaskReceiver),
    Redis(RedisTaskQueue),
}

impl TaskSource {
    pub fn spawn(self, worker: PollWorker) -> JoinHandle<()> {
        match self {
            TaskSource::Channel(receiver) => worker.spawn(receiver),
            TaskSource::Redis(queue) => worker.spawn(queue),
        }
    }
}

pub struct Services {
    pub state: AppState,
    pub worker: PollWorker,
    pub task_source: TaskSource,
    pub scheduler: SchedulerLoop,
}

struct EntityStores {
    gateways: Arc<dyn GatewayStore>,
    points: Arc<dyn DataPointStore>,
    readings: Arc<dyn ReadingStore>,
}

pub async fn build(config: &AppConfig) -> Result<Services, Box<dyn std::error::Error>> {
    let stores = match config.storage_backend {
        StorageBackend::Memory => EntityStores {
            gateways: Arc::new(InMemoryGatewayStore::new()),
            points: Arc::new(InMemoryDataPointStore::new()),
            readings: Arc::new(InMemoryReadingStore::new()),
        },
        StorageBackend::Postgres => {
            let url = config.database_url.as_deref().unwrap_or_default();
            let pool = connect_pool(url, config.database_max_connections).await?;
            run_migrations(&pool).await?;
            EntityStores {
                gateways: Arc::new(PgGatewayStore::new(pool.clone())),
                points: Arc::new(PgDataPointStore::new(pool.clone())),
                readings: Arc::new(PgReadingStore::new(pool)),
            }
        }
    };

    let (coordination, queue, task_source): (
        Arc<dyn CoordinationStore>,
        Arc<dyn TaskQueue>,
        TaskSource,
    ) = match config.coordination_backend {
        CoordinationBackend::Memory => {
            let (queue, receiver) = ChannelTaskQueue::new(config.task_queue_capacity);
            (
                Arc::new(InMemoryCoordinationStore::new()) as Arc<dyn CoordinationStore>,
                Arc::new(queue) as Arc<dyn TaskQueue>,
                TaskSource::Channel(receiver),
            )
        }
        CoordinationBackend::Redis => {
            let url = config.redis_url.as_deref().unwrap_or_default();
            let queue = RedisTaskQueue::connect(url)?;
            (
                Arc::new(RedisCoordinationStore::connect(url)?) as Arc<dyn CoordinationStore>,
                Arc::new(queue.clone()) as Arc<dyn TaskQueue>,
                TaskSource::Redis(queue),
            )
        }
    };

    Ok(assemble(config, stores, coordination, queue, task_source))
}

fn assemble(
    config: &AppConfig,
    stores: EntityStores,
    coordination: Arc<dyn CoordinationStore>,
    queue: Arc<dyn TaskQueue>,
    task_source: TaskSource,
) -> Services {
    let client = ModbusClient::tcp(client_config(config));
    let orchestrator = PollOrchestrator::new_with_notifier(
        client.clone(),
        stores.gateways.clone(),
        stores.points.clone(),
        stores.readings.clone(),
        Arc::new(PublishingNotifier::new(coordination.clone())),
    );
    let breaker = CircuitBreaker::with_threshold(stores.gateways.clone(), config.breaker_threshold);
    let worker = PollWorker::new(
        stores.gateways.clone(),
        orchestrator,
        breaker,
        config.max_concurrent_polls,
    );
    let supervisor = PollingSupervisor::new_with_config(
        stores.gateways.clone(),
        coordination,
        queue,
        SupervisorConfig {
            gateway_lock_ttl: Duration::from_secs(config.gateway_lock_ttl_seconds),
            system_lock_ttl: Duration::from_secs(config.system_lock_ttl_seconds),
        },
    );
    let scheduler = SchedulerLoop::new(
        supervisor.clone(),
        SchedulerLoopConfig {
            tick: Duration::from_millis(config.scheduler_tick_ms),
            audit_every: config.audit_every_ticks,
        },
    );

    Services {
        state: AppState {
            gateways: stores.gateways,
            points: stores.points,
            readings: stores.readings,
            supervisor,
            client,
        },
        worker,
        task_source,
        scheduler,
    }
}

pub fn client_config(config: &AppConfig) -> ClientConfig {
    ClientConfig {
        connect_timeout: Duration::from_millis(config.connect_timeout_ms),
        read_timeout: Duration::from_millis(config.read_timeout_ms),
        retry: RetryPolicy {
            attempts: config.connect_attempts,
            backoff_base: Duration::from_millis(config.connect_backoff_ms),
        },
        codec: CodecOptions {
            strict_little_endian: config.strict_little_endian,
        },
    }
}
