//! Postgres 读数存储实现
//!
//! 插入不带 `on conflict`：重复 (data_point_id, read_at) 以唯一约束冲突的形式
//! 返回给上层，由去重写入器取回已有记录。

use crate::error::StorageError;
use crate::traits::ReadingStore;
use domain::{NewReading, Quality, Reading};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const READING_COLUMNS: &str = "reading_id, data_point_id, raw_registers, raw_value, value, quality, \
     (extract(epoch from read_at) * 1000)::bigint as read_at_ms, \
     (extract(epoch from created_at) * 1000)::bigint as created_at_ms";

pub struct PgReadingStore {
    pub pool: PgPool,
}

impl PgReadingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn reading_from_row(row: &PgRow) -> Result<Reading, StorageError> {
    let raw_registers: Vec<i32> = row.try_get("raw_registers")?;
    let quality: String = row.try_get("quality")?;
    Ok(Reading {
        reading_id: row.try_get("reading_id")?,
        data_point_id: row.try_get("data_point_id")?,
        raw_registers: raw_registers
            .into_iter()
            .map(|word| u16::try_from(word).map_err(|_| StorageError::new("register out of range")))
            .collect::<Result<_, _>>()?,
        raw_value: row.try_get("raw_value")?,
        value: row.try_get("value")?,
        quality: Quality::parse(&quality)
            .ok_or_else(|| StorageError::new(format!("invalid quality {quality}")))?,
        read_at_ms: row.try_get("read_at_ms")?,
        created_at_ms: row.try_get("created_at_ms")?,
    })
}

#[async_trait::async_trait]
impl ReadingStore for PgReadingStore {
    async fn insert_reading(&self, reading: NewReading) -> Result<Reading, StorageError> {
        let raw_registers: Vec<i32> = reading.raw_registers.iter().map(|word| *word as i32).collect();
        let row = sqlx::query(&format!(
            "insert into readings (data_point_id, raw_registers, raw_value, value, quality, read_at) \
             values ($1, $2, $3, $4, $5, to_timestamp($6 / 1000.0)) \
             returning {READING_COLUMNS}"
        ))
        .bind(reading.data_point_id)
        .bind(raw_registers)
        .bind(reading.raw_value)
        .bind(reading.value)
        .bind(reading.quality.as_str())
        .bind(reading.read_at_ms as f64)
        .fetch_one(&self.pool)
        .await?;
        reading_from_row(&row)
    }

    async fn find_reading(
        &self,
        data_point_id: i64,
        read_at_ms: i64,
    ) -> Result<Option<Reading>, StorageError> {
        let row = sqlx::query(&format!(
            "select {READING_COLUMNS} from readings \
             where data_point_id = $1 and read_at = to_timestamp($2 / 1000.0)"
        ))
        .bind(data_point_id)
        .bind(read_at_ms as f64)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(reading_from_row).transpose()
    }

    async fn list_readings(
        &self,
        data_point_id: i64,
        limit: usize,
    ) -> Result<Vec<Reading>, StorageError> {
        let rows = sqlx::query(&format!(
            "select {READING_COLUMNS} from readings where data_point_id = $1 \
             order by read_at desc limit $2"
        ))
        .bind(data_point_id)
        .bind(limit.min(i64::MAX as usize) as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(reading_from_row).collect()
    }
}
