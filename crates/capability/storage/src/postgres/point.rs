//! Postgres 点位存储实现

use crate::error::StorageError;
use crate::traits::DataPointStore;
use crate::validation::ensure_valid_data_point;
use domain::{ByteOrder, DataPoint, DataType, FunctionCode, NewDataPoint};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const POINT_COLUMNS: &str = "data_point_id, gateway_id, name, function_code, register_address, \
     register_count, data_type, byte_order, scale_factor, unit, is_enabled";

pub struct PgDataPointStore {
    pub pool: PgPool,
}

impl PgDataPointStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn point_from_row(row: &PgRow) -> Result<DataPoint, StorageError> {
    let function_code: i16 = row.try_get("function_code")?;
    let register_address: i32 = row.try_get("register_address")?;
    let register_count: i16 = row.try_get("register_count")?;
    let data_type: String = row.try_get("data_type")?;
    let byte_order: String = row.try_get("byte_order")?;
    Ok(DataPoint {
        data_point_id: row.try_get("data_point_id")?,
        gateway_id: row.try_get("gateway_id")?,
        name: row.try_get("name")?,
        function_code: u8::try_from(function_code)
            .ok()
            .and_then(|code| FunctionCode::try_from(code).ok())
            .ok_or_else(|| StorageError::new(format!("invalid function_code {function_code}")))?,
        register_address: u16::try_from(register_address)
            .map_err(|_| StorageError::new("register_address out of range"))?,
        register_count: u16::try_from(register_count)
            .map_err(|_| StorageError::new("register_count out of range"))?,
        data_type: DataType::parse(&data_type)
            .ok_or_else(|| StorageError::new(format!("invalid data_type {data_type}")))?,
        byte_order: ByteOrder::parse(&byte_order)
            .ok_or_else(|| StorageError::new(format!("invalid byte_order {byte_order}")))?,
        scale_factor: row.try_get("scale_factor")?,
        unit: row.try_get("unit")?,
        is_enabled: row.try_get("is_enabled")?,
    })
}

#[async_trait::async_trait]
impl DataPointStore for PgDataPointStore {
    async fn list_data_points(&self, gateway_id: i64) -> Result<Vec<DataPoint>, StorageError> {
        let rows = sqlx::query(&format!(
            "select {POINT_COLUMNS} from data_points where gateway_id = $1 \
             order by register_address, data_point_id"
        ))
        .bind(gateway_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(point_from_row).collect()
    }

    async fn list_enabled_data_points(
        &self,
        gateway_id: i64,
    ) -> Result<Vec<DataPoint>, StorageError> {
        let rows = sqlx::query(&format!(
            "select {POINT_COLUMNS} from data_points where gateway_id = $1 and is_enabled \
             order by register_address, data_point_id"
        ))
        .bind(gateway_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(point_from_row).collect()
    }

    async fn find_data_point(
        &self,
        data_point_id: i64,
    ) -> Result<Option<DataPoint>, StorageError> {
        let row = sqlx::query(&format!(
            "select {POINT_COLUMNS} from data_points where data_point_id = $1"
        ))
        .bind(data_point_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(point_from_row).transpose()
    }

    /// 在事务内锁定所属网关行，串行化同一网关的点位写入后再做重叠检查。
    async fn create_data_point(&self, input: NewDataPoint) -> Result<DataPoint, StorageError> {
        let mut tx = self.pool.begin().await?;
        let gateway = sqlx::query("select gateway_id from gateways where gateway_id = $1 for update")
            .bind(input.gateway_id)
            .fetch_optional(&mut *tx)
            .await?;
        if gateway.is_none() {
            return Err(StorageError::not_found(format!(
                "gateway {} not found",
                input.gateway_id
            )));
        }
        let rows = sqlx::query(&format!(
            "select {POINT_COLUMNS} from data_points where gateway_id = $1"
        ))
        .bind(input.gateway_id)
        .fetch_all(&mut *tx)
        .await?;
        let siblings = rows
            .iter()
            .map(point_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        let function_code = ensure_valid_data_point(&input, &siblings)?;

        let row = sqlx::query(&format!(
            "insert into data_points \
             (gateway_id, name, function_code, register_address, register_count, \
              data_type, byte_order, scale_factor, unit, is_enabled) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             returning {POINT_COLUMNS}"
        ))
        .bind(input.gateway_id)
        .bind(&input.name)
        .bind(function_code.code() as i16)
        .bind(input.register_address as i32)
        .bind(input.register_count as i16)
        .bind(input.data_type.as_str())
        .bind(input.byte_order.as_str())
        .bind(input.scale_factor)
        .bind(&input.unit)
        .bind(input.is_enabled)
        .fetch_one(&mut *tx)
        .await?;
        let point = point_from_row(&row)?;
        tx.commit().await?;
        Ok(point)
    }

    async fn set_data_point_enabled(
        &self,
        data_point_id: i64,
        is_enabled: bool,
    ) -> Result<Option<DataPoint>, StorageError> {
        let row = sqlx::query(&format!(
            "update data_points set is_enabled = $1 where data_point_id = $2 \
             returning {POINT_COLUMNS}"
        ))
        .bind(is_enabled)
        .bind(data_point_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(point_from_row).transpose()
    }

    async fn delete_data_point(&self, data_point_id: i64) -> Result<bool, StorageError> {
        let result = sqlx::query("delete from data_points where data_point_id = $1")
            .bind(data_point_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
