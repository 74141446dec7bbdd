//! 基于协调存储的咨询锁
//!
//! 锁值为随机持有者 token；释放时比较后删除，过期的锁不会误删他人持有的新锁。
//! 持锁的 future 被取消或 panic 时，守卫在 drop 中派发一次释放任务；
//! 只有进程整体退出时才依赖 TTL 过期。

use fieldpoll_storage::{CoordinationStore, StorageError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn CoordinationStore>,
}

impl LockManager {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    /// 在锁内执行 `work`。锁被他人持有时返回 `Ok(None)`。
    pub async fn with_lock<F, Fut, T>(
        &self,
        key: &str,
        ttl: Duration,
        work: F,
    ) -> Result<Option<T>, StorageError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let owner = uuid::Uuid::new_v4().to_string();
        if !self.store.set_if_absent(key, &owner, ttl).await? {
            fieldpoll_telemetry::record_lock_contended();
            debug!(target: "fieldpoll.scheduler", lock = key, "lock_contended");
            return Ok(None);
        }

        let guard = LockGuard {
            store: self.store.clone(),
            key: key.to_string(),
            owner,
            released: false,
        };
        let output = work().await;
        guard.release().await;
        Ok(Some(output))
    }
}

/// 已获取的锁；未正常释放就被丢弃时在后台补做释放。
struct LockGuard {
    store: Arc<dyn CoordinationStore>,
    key: String,
    owner: String,
    released: bool,
}

impl LockGuard {
    async fn release(mut self) {
        release_owned(self.store.as_ref(), &self.key, &self.owner).await;
        self.released = true;
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let store = self.store.clone();
        let key = std::mem::take(&mut self.key);
        let owner = std::mem::take(&mut self.owner);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(target: "fieldpoll.scheduler", lock = %key, "lock_released_on_drop");
                handle.spawn(async move {
                    release_owned(store.as_ref(), &key, &owner).await;
                });
            }
            Err(_) => {
                warn!(target: "fieldpoll.scheduler", lock = %key, "lock_left_to_expire");
            }
        }
    }
}

async fn release_owned(store: &dyn CoordinationStore, key: &str, owner: &str) {
    match store.delete_if_equals(key, owner).await {
        Ok(true) => {}
        Ok(false) => {
            warn!(target: "fieldpoll.scheduler", lock = key, "lock_expired_before_release");
        }
        Err(err) => {
            warn!(
                target: "fieldpoll.scheduler",
                lock = key,
                error = %err,
                "lock_release_failed"
            );
        }
    }
}
