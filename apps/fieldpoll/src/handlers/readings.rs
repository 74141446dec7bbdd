//! 读数查询 handler
//!
//! - GET /api/data-points/{id}/readings?limit=N - 最新的 N 条读数（按 read_at 倒序）

use crate::AppState;
use crate::utils::{not_found_error, ok, reading_to_dto, storage_error};
use api_contract::{ReadingDto, ReadingsQuery};
use axum::{
    extract::{Path, Query, State},
    response::Response,
};

pub async fn list_point_readings(
    State(state): State<AppState>,
    Path(data_point_id): Path<i64>,
    Query(query): Query<ReadingsQuery>,
) -> Response {
    match state.points.find_data_point(data_point_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found_error("DATA_POINT.NOT_FOUND", "data point not found"),
        Err(err) => return storage_error(err),
    }
    match state
        .readings
        .list_readings(data_point_id, query.effective_limit())
        .await
    {
        Ok(items) => {
            let data: Vec<ReadingDto> = items.into_iter().map(reading_to_dto).collect();
            ok(data)
        }
        Err(err) => storage_error(err),
    }
}
