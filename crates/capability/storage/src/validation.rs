//! 点位写入前的校验辅助
//!
//! 提供可复用的校验函数：
//! - ensure_valid_data_point：配置规则 + 与已有点位的区间重叠

use crate::error::StorageError;
use domain::{DataPoint, FunctionCode, NewDataPoint, find_overlap, validate_data_point};

/// 校验点位并返回解析后的功能码
pub fn ensure_valid_data_point(
    input: &NewDataPoint,
    existing: &[DataPoint],
) -> Result<FunctionCode, StorageError> {
    let function_code = validate_data_point(input)?;
    if let Some(other) = find_overlap(input, existing, None) {
        let (start, end) = (
            input.register_address,
            input.register_address + input.register_count as u32 - 1,
        );
        return Err(domain::ConfigViolation::Overlap {
            start,
            end,
            existing_id: other.data_point_id,
        }
        .into());
    }
    Ok(function_code)
}
