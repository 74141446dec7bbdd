//! 读数内存存储实现
//!
//! 以 (data_point_id, read_at_ms) 为唯一键，重复插入返回 Conflict。

use crate::error::StorageError;
use crate::traits::ReadingStore;
use domain::{NewReading, Reading, now_epoch_ms};
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Default)]
struct ReadingTable {
    rows: BTreeMap<(i64, i64), Reading>,
    next_id: i64,
}

pub struct InMemoryReadingStore {
    table: RwLock<ReadingTable>,
}

impl InMemoryReadingStore {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(ReadingTable {
                rows: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }

    /// 当前行数
    pub fn len(&self) -> usize {
        self.table.read().map(|table| table.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryReadingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ReadingStore for InMemoryReadingStore {
    async fn insert_reading(&self, reading: NewReading) -> Result<Reading, StorageError> {
        let mut table = self
            .table
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let key = (reading.data_point_id, reading.read_at_ms);
        if table.rows.contains_key(&key) {
            return Err(StorageError::conflict(format!(
                "reading exists for data point {} at {}",
                reading.data_point_id, reading.read_at_ms
            )));
        }
        let record = Reading {
            reading_id: table.next_id,
            data_point_id: reading.data_point_id,
            raw_registers: reading.raw_registers,
            raw_value: reading.raw_value,
            value: reading.value,
            quality: reading.quality,
            read_at_ms: reading.read_at_ms,
            created_at_ms: now_epoch_ms(),
        };
        table.next_id += 1;
        table.rows.insert(key, record.clone());
        Ok(record)
    }

    async fn find_reading(
        &self,
        data_point_id: i64,
        read_at_ms: i64,
    ) -> Result<Option<Reading>, StorageError> {
        let table = self
            .table
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(table.rows.get(&(data_point_id, read_at_ms)).cloned())
    }

    async fn list_readings(
        &self,
        data_point_id: i64,
        limit: usize,
    ) -> Result<Vec<Reading>, StorageError> {
        let table = self
            .table
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(table
            .rows
            .range((data_point_id, i64::MIN)..=(data_point_id, i64::MAX))
            .rev()
            .take(limit)
            .map(|(_, reading)| reading.clone())
            .collect())
    }
}
