//! 协调存储键与调度状态记录

use serde::{Deserialize, Serialize};

pub const SYSTEM_LOCK_KEY: &str = "lock:system";
pub const SYSTEM_STATUS_KEY: &str = "system:status";
pub const GATEWAY_LOCK_PREFIX: &str = "lock:gateway:";
pub const SCHEDULE_PREFIX: &str = "schedule:gateway:";

pub fn gateway_lock_key(gateway_id: i64) -> String {
    format!("{GATEWAY_LOCK_PREFIX}{gateway_id}")
}

pub fn schedule_key(gateway_id: i64) -> String {
    format!("{SCHEDULE_PREFIX}{gateway_id}")
}

/// 从 `schedule:gateway:{id}` 解析网关 ID
pub fn gateway_id_from_schedule_key(key: &str) -> Option<i64> {
    key.strip_prefix(SCHEDULE_PREFIX)?.parse().ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Scheduled,
}

/// `schedule:gateway:{id}` 的 JSON 值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub gateway_id: i64,
    /// 最近一次入队时间（epoch ms）
    pub last_scheduled: i64,
    /// 写入时的轮询周期（秒）
    pub poll_interval: u64,
    pub status: ScheduleStatus,
}

impl ScheduleEntry {
    pub fn scheduled(gateway_id: i64, last_scheduled: i64, poll_interval: u64) -> Self {
        Self {
            gateway_id,
            last_scheduled,
            poll_interval,
            status: ScheduleStatus::Scheduled,
        }
    }

    pub fn interval_ms(&self) -> i64 {
        (self.poll_interval.max(1) as i64).saturating_mul(1000)
    }

    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.last_scheduled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_key_round_trips_gateway_id() {
        assert_eq!(schedule_key(42), "schedule:gateway:42");
        assert_eq!(gateway_id_from_schedule_key("schedule:gateway:42"), Some(42));
        assert_eq!(gateway_id_from_schedule_key("schedule:gateway:x"), None);
        assert_eq!(gateway_id_from_schedule_key("lock:gateway:42"), None);
    }

    #[test]
    fn entry_serializes_with_snake_case_status() {
        let entry = ScheduleEntry::scheduled(7, 1_000, 30);
        let json = serde_json::to_value(&entry).expect("json");
        assert_eq!(json["status"], "scheduled");
        assert_eq!(json["poll_interval"], 30);
        assert_eq!(entry.interval_ms(), 30_000);
        assert_eq!(entry.age_ms(4_000), 3_000);
    }
}
