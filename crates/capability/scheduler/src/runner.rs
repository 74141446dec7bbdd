//! 周期调度循环

use crate::supervisor::PollingSupervisor;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct SchedulerLoopConfig {
    pub tick: Duration,
    /// 每隔多少个 tick 执行一次审计与修复
    pub audit_every: u64,
}

impl Default for SchedulerLoopConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            audit_every: 60,
        }
    }
}

pub struct SchedulerLoop {
    supervisor: PollingSupervisor,
    config: SchedulerLoopConfig,
}

impl SchedulerLoop {
    pub fn new(supervisor: PollingSupervisor, config: SchedulerLoopConfig) -> Self {
        Self { supervisor, config }
    }

    /// 第 `tick` 次（从 0 计）是否需要审计
    pub fn audits_on(&self, tick: u64) -> bool {
        tick % self.config.audit_every.max(1) == 0
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        info!(
            target: "fieldpoll.scheduler",
            tick_ms = self.config.tick.as_millis() as u64,
            audit_every = self.config.audit_every,
            "scheduler_loop_started"
        );
        let mut interval = tokio::time::interval(self.config.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut tick = 0u64;
        loop {
            interval.tick().await;
            if let Err(err) = self.supervisor.run_tick(self.audits_on(tick)).await {
                warn!(target: "fieldpoll.scheduler", tick, error = %err, "scheduler_tick_failed");
            }
            tick = tick.wrapping_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::ChannelTaskQueue;
    use fieldpoll_storage::{InMemoryCoordinationStore, InMemoryGatewayStore};
    use std::sync::Arc;

    #[test]
    fn audit_runs_on_first_tick_and_every_nth() {
        let (queue, _receiver) = ChannelTaskQueue::new(1);
        let supervisor = PollingSupervisor::new(
            Arc::new(InMemoryGatewayStore::new()),
            Arc::new(InMemoryCoordinationStore::new()),
            Arc::new(queue),
        );
        let scheduler = SchedulerLoop::new(
            supervisor,
            SchedulerLoopConfig {
                tick: Duration::from_millis(10),
                audit_every: 3,
            },
        );
        assert!(scheduler.audits_on(0));
        assert!(!scheduler.audits_on(1));
        assert!(!scheduler.audits_on(2));
        assert!(scheduler.audits_on(3));
    }
}
