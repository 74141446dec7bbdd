//! 轮询 worker：消费任务，受限并发地执行网关轮询，轮询后评估熔断

use crate::breaker::CircuitBreaker;
use crate::error::{QueueError, SchedulerError};
use crate::queue::{PollTask, TaskReceiver};
use fieldpoll_polling::{PollOrchestrator, PollResult};
use fieldpoll_storage::GatewayStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct PollWorker {
    gateways: Arc<dyn GatewayStore>,
    orchestrator: PollOrchestrator,
    breaker: CircuitBreaker,
    permits: Arc<Semaphore>,
}

impl PollWorker {
    pub fn new(
        gateways: Arc<dyn GatewayStore>,
        orchestrator: PollOrchestrator,
        breaker: CircuitBreaker,
        max_concurrent_polls: usize,
    ) -> Self {
        Self {
            gateways,
            orchestrator,
            breaker,
            permits: Arc::new(Semaphore::new(max_concurrent_polls.max(1))),
        }
    }

    /// 执行单个任务。网关已删除或已停用时跳过并返回 `Ok(None)`。
    pub async fn handle_task(&self, task: PollTask) -> Result<Option<PollResult>, SchedulerError> {
        let gateway = match self.gateways.find_gateway(task.gateway_id).await? {
            Some(gateway) if gateway.is_active => gateway,
            Some(_) => {
                debug!(
                    target: "fieldpoll.worker",
                    gateway_id = task.gateway_id,
                    task_id = %task.task_id,
                    "poll_task_skipped_inactive"
                );
                return Ok(None);
            }
            None => {
                debug!(
                    target: "fieldpoll.worker",
                    gateway_id = task.gateway_id,
                    task_id = %task.task_id,
                    "poll_task_skipped_missing"
                );
                return Ok(None);
            }
        };

        let result = self
            .orchestrator
            .poll_gateway(&gateway, task.scheduled_at_ms)
            .await;

        if let Some(updated) = self.gateways.find_gateway(gateway.gateway_id).await? {
            self.breaker.evaluate(&updated).await?;
        }
        Ok(Some(result))
    }

    pub fn spawn<R>(self, receiver: R) -> JoinHandle<()>
    where
        R: TaskReceiver + 'static,
    {
        tokio::spawn(self.run(receiver))
    }

    /// 持续消费任务直到队列关闭。
    pub async fn run<R: TaskReceiver>(self, mut receiver: R) {
        info!(
            target: "fieldpoll.worker",
            max_concurrent_polls = self.permits.available_permits(),
            "poll_worker_started"
        );
        loop {
            let task = match receiver.recv().await {
                Ok(Some(task)) => task,
                Ok(None) => continue,
                Err(QueueError::Closed) => break,
                Err(QueueError::Malformed(err)) => {
                    warn!(target: "fieldpoll.worker", error = %err, "poll_task_malformed");
                    continue;
                }
                Err(err) => {
                    warn!(target: "fieldpoll.worker", error = %err, "poll_task_receive_failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            let Ok(permit) = self.permits.clone().acquire_owned().await else {
                break;
            };
            let worker = self.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let task_id = task.task_id.clone();
                let gateway_id = task.gateway_id;
                if let Err(err) = worker.handle_task(task).await {
                    warn!(
                        target: "fieldpoll.worker",
                        gateway_id,
                        task_id = %task_id,
                        error = %err,
                        "poll_task_failed"
                    );
                }
            });
        }
        info!(target: "fieldpoll.worker", "poll_worker_stopped");
    }
}
