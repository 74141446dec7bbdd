//! Postgres 网关存储实现
//!
//! 设计要点：
//! - 健康计数器在单条 UPDATE 中原子更新
//! - 端点唯一由 `gateways_endpoint_unique` 约束保证

use crate::error::StorageError;
use crate::traits::GatewayStore;
use domain::{Gateway, GatewayUpdate, NewGateway, PollOutcome, validate_gateway};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const GATEWAY_COLUMNS: &str = "gateway_id, name, host, port, unit_id, poll_interval_secs, \
     is_active, success_count, failure_count, consecutive_failures, auto_disabled, \
     (extract(epoch from last_seen_at) * 1000)::bigint as last_seen_at_ms";

pub struct PgGatewayStore {
    pub pool: PgPool,
}

impl PgGatewayStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 通过数据库 URL 建立连接池
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_pool(database_url, 8).await?;
        Ok(Self { pool })
    }
}

fn gateway_from_row(row: &PgRow) -> Result<Gateway, StorageError> {
    let port: i32 = row.try_get("port")?;
    let unit_id: i16 = row.try_get("unit_id")?;
    let poll_interval_secs: i64 = row.try_get("poll_interval_secs")?;
    let success_count: i64 = row.try_get("success_count")?;
    let failure_count: i64 = row.try_get("failure_count")?;
    let consecutive_failures: i64 = row.try_get("consecutive_failures")?;
    Ok(Gateway {
        gateway_id: row.try_get("gateway_id")?,
        name: row.try_get("name")?,
        host: row.try_get("host")?,
        port: u16::try_from(port).map_err(|_| StorageError::new("port out of range"))?,
        unit_id: u8::try_from(unit_id).map_err(|_| StorageError::new("unit_id out of range"))?,
        poll_interval_secs: poll_interval_secs.max(1) as u64,
        is_active: row.try_get("is_active")?,
        success_count: success_count.max(0) as u64,
        failure_count: failure_count.max(0) as u64,
        consecutive_failures: consecutive_failures.max(0) as u64,
        auto_disabled: row.try_get("auto_disabled")?,
        last_seen_at_ms: row.try_get("last_seen_at_ms")?,
    })
}

#[async_trait::async_trait]
impl GatewayStore for PgGatewayStore {
    async fn list_gateways(&self) -> Result<Vec<Gateway>, StorageError> {
        let rows = sqlx::query(&format!(
            "select {GATEWAY_COLUMNS} from gateways order by gateway_id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(gateway_from_row).collect()
    }

    async fn list_active_gateways(&self) -> Result<Vec<Gateway>, StorageError> {
        let rows = sqlx::query(&format!(
            "select {GATEWAY_COLUMNS} from gateways where is_active order by gateway_id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(gateway_from_row).collect()
    }

    async fn find_gateway(&self, gateway_id: i64) -> Result<Option<Gateway>, StorageError> {
        let row = sqlx::query(&format!(
            "select {GATEWAY_COLUMNS} from gateways where gateway_id = $1"
        ))
        .bind(gateway_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(gateway_from_row).transpose()
    }

    async fn create_gateway(&self, input: NewGateway) -> Result<Gateway, StorageError> {
        validate_gateway(&input)?;
        let row = sqlx::query(&format!(
            "insert into gateways (name, host, port, unit_id, poll_interval_secs, is_active) \
             values ($1, $2, $3, $4, $5, $6) returning {GATEWAY_COLUMNS}"
        ))
        .bind(&input.name)
        .bind(&input.host)
        .bind(input.port as i32)
        .bind(input.unit_id as i16)
        .bind(input.poll_interval_secs as i64)
        .bind(input.is_active)
        .fetch_one(&self.pool)
        .await?;
        gateway_from_row(&row)
    }

    async fn update_gateway(
        &self,
        gateway_id: i64,
        update: GatewayUpdate,
    ) -> Result<Option<Gateway>, StorageError> {
        if update.poll_interval_secs == Some(0) {
            return Err(StorageError::invalid(
                "poll_interval must be at least 1 second",
            ));
        }
        let row = sqlx::query(&format!(
            "update gateways set \
             name = coalesce($1, name), \
             host = coalesce($2, host), \
             port = coalesce($3, port), \
             unit_id = coalesce($4, unit_id), \
             poll_interval_secs = coalesce($5, poll_interval_secs) \
             where gateway_id = $6 \
             returning {GATEWAY_COLUMNS}"
        ))
        .bind(update.name)
        .bind(update.host)
        .bind(update.port.map(|port| port as i32))
        .bind(update.unit_id.map(|unit_id| unit_id as i16))
        .bind(update.poll_interval_secs.map(|secs| secs as i64))
        .bind(gateway_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(gateway_from_row).transpose()
    }

    async fn set_gateway_active(
        &self,
        gateway_id: i64,
        is_active: bool,
    ) -> Result<Option<Gateway>, StorageError> {
        let row = sqlx::query(&format!(
            "update gateways set \
             is_active = $1, \
             auto_disabled = case when $1 then false else auto_disabled end, \
             consecutive_failures = case when $1 then 0 else consecutive_failures end \
             where gateway_id = $2 \
             returning {GATEWAY_COLUMNS}"
        ))
        .bind(is_active)
        .bind(gateway_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(gateway_from_row).transpose()
    }

    async fn record_poll_outcome(
        &self,
        gateway_id: i64,
        outcome: PollOutcome,
    ) -> Result<Option<Gateway>, StorageError> {
        let row = sqlx::query(&format!(
            "update gateways set \
             success_count = success_count + case when $1 then 1 else 0 end, \
             failure_count = failure_count + case when $1 then 0 else 1 end, \
             consecutive_failures = case when $1 then 0 else consecutive_failures + 1 end, \
             last_seen_at = case when $2 then to_timestamp($3 / 1000.0) else last_seen_at end \
             where gateway_id = $4 \
             returning {GATEWAY_COLUMNS}"
        ))
        .bind(outcome.success)
        .bind(outcome.contacted)
        .bind(outcome.at_ms as f64)
        .bind(gateway_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(gateway_from_row).transpose()
    }

    async fn trip_breaker(&self, gateway_id: i64) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "update gateways set is_active = false, auto_disabled = true \
             where gateway_id = $1 and is_active",
        )
        .bind(gateway_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_gateway(&self, gateway_id: i64) -> Result<bool, StorageError> {
        let result = sqlx::query("delete from gateways where gateway_id = $1")
            .bind(gateway_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
