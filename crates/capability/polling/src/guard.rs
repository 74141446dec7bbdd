//! 读数去重写入
//!
//! 先插入，冲突后取回已有记录，不做先查后写。并发写入同一
//! (data_point_id, read_at) 时恰好一方得到 `Inserted`，其余得到 `Existing`。

use domain::{NewReading, Reading};
use fieldpoll_storage::{ReadingStore, StorageError};
use std::sync::Arc;
use tracing::debug;

/// 写入结果
#[derive(Debug, Clone, PartialEq)]
pub enum PersistOutcome {
    Inserted(Reading),
    Existing(Reading),
}

impl PersistOutcome {
    pub fn reading(&self) -> &Reading {
        match self {
            PersistOutcome::Inserted(reading) | PersistOutcome::Existing(reading) => reading,
        }
    }

    pub fn into_reading(self) -> Reading {
        match self {
            PersistOutcome::Inserted(reading) | PersistOutcome::Existing(reading) => reading,
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, PersistOutcome::Inserted(_))
    }
}

#[derive(Clone)]
pub struct DuplicateGuard {
    readings: Arc<dyn ReadingStore>,
}

impl DuplicateGuard {
    pub fn new(readings: Arc<dyn ReadingStore>) -> Self {
        Self { readings }
    }

    pub async fn persist(&self, reading: NewReading) -> Result<PersistOutcome, StorageError> {
        let data_point_id = reading.data_point_id;
        let read_at_ms = reading.read_at_ms;
        match self.readings.insert_reading(reading).await {
            Ok(record) => {
                fieldpoll_telemetry::record_reading_inserted();
                Ok(PersistOutcome::Inserted(record))
            }
            Err(err) if err.is_conflict() => {
                debug!(
                    target: "fieldpoll.polling",
                    data_point_id,
                    read_at_ms,
                    "reading_duplicate"
                );
                fieldpoll_telemetry::record_reading_duplicate();
                let existing = self
                    .readings
                    .find_reading(data_point_id, read_at_ms)
                    .await?
                    .ok_or_else(|| {
                        StorageError::not_found(format!(
                            "conflicting reading for data point {data_point_id} at {read_at_ms} not found"
                        ))
                    })?;
                Ok(PersistOutcome::Existing(existing))
            }
            Err(err) => {
                fieldpoll_telemetry::record_reading_write_failure();
                Err(err)
            }
        }
    }
}
