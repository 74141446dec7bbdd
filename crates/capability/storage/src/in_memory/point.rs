//! 点位内存存储实现

use crate::error::StorageError;
use crate::traits::DataPointStore;
use crate::validation::ensure_valid_data_point;
use domain::{DataPoint, NewDataPoint};
use std::collections::HashMap;
use std::sync::RwLock;

pub struct InMemoryDataPointStore {
    points: RwLock<HashMap<i64, DataPoint>>,
    next_id: RwLock<i64>,
}

impl InMemoryDataPointStore {
    pub fn new() -> Self {
        Self {
            points: RwLock::new(HashMap::new()),
            next_id: RwLock::new(1),
        }
    }
}

impl Default for InMemoryDataPointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DataPointStore for InMemoryDataPointStore {
    async fn list_data_points(&self, gateway_id: i64) -> Result<Vec<DataPoint>, StorageError> {
        let mut items: Vec<DataPoint> = self
            .points
            .read()
            .map_err(|_| StorageError::new("lock failed"))?
            .values()
            .filter(|item| item.gateway_id == gateway_id)
            .cloned()
            .collect();
        items.sort_by_key(|item| (item.register_address, item.data_point_id));
        Ok(items)
    }

    async fn list_enabled_data_points(
        &self,
        gateway_id: i64,
    ) -> Result<Vec<DataPoint>, StorageError> {
        let mut items = self.list_data_points(gateway_id).await?;
        items.retain(|item| item.is_enabled);
        Ok(items)
    }

    async fn find_data_point(
        &self,
        data_point_id: i64,
    ) -> Result<Option<DataPoint>, StorageError> {
        let map = self
            .points
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.get(&data_point_id).cloned())
    }

    async fn create_data_point(&self, input: NewDataPoint) -> Result<DataPoint, StorageError> {
        let mut map = self
            .points
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let siblings: Vec<DataPoint> = map
            .values()
            .filter(|item| item.gateway_id == input.gateway_id)
            .cloned()
            .collect();
        let function_code = ensure_valid_data_point(&input, &siblings)?;
        let mut next_id = self
            .next_id
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let point = DataPoint {
            data_point_id: *next_id,
            gateway_id: input.gateway_id,
            name: input.name,
            function_code,
            register_address: input.register_address as u16,
            register_count: input.register_count,
            data_type: input.data_type,
            byte_order: input.byte_order,
            scale_factor: input.scale_factor,
            unit: input.unit,
            is_enabled: input.is_enabled,
        };
        *next_id += 1;
        map.insert(point.data_point_id, point.clone());
        Ok(point)
    }

    async fn set_data_point_enabled(
        &self,
        data_point_id: i64,
        is_enabled: bool,
    ) -> Result<Option<DataPoint>, StorageError> {
        let mut map = self
            .points
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.get_mut(&data_point_id).map(|point| {
            point.is_enabled = is_enabled;
            point.clone()
        }))
    }

    async fn delete_data_point(&self, data_point_id: i64) -> Result<bool, StorageError> {
        let mut map = self
            .points
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.remove(&data_point_id).is_some())
    }
}
