//! 配置期校验
//!
//! 点位与网关在写入配置源之前校验；轮询路径不再重复检查：
//! - 功能码 ∈ {3, 4}
//! - 寄存器地址 1..=65535，且整段不越过 65535
//! - 寄存器数量与数据类型匹配（1 / 2 / 4）
//! - 缩放系数非零且有限
//! - 同一网关、同一功能码地址空间内寄存器区间不重叠

use crate::gateway::NewGateway;
use crate::point::{DataPoint, FunctionCode, NewDataPoint};

/// 配置校验错误。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigViolation {
    #[error("unsupported function code {0}, expected 3 or 4")]
    FunctionCode(u8),
    #[error("register address {0} out of range 1-65535")]
    RegisterAddress(u32),
    #[error("register count {got} does not match data type {data_type} (requires {expected})")]
    RegisterCount {
        data_type: &'static str,
        expected: u16,
        got: u16,
    },
    #[error("register range {start}-{end} exceeds 65535")]
    RangeOverflow { start: u32, end: u32 },
    #[error("scale factor must be a non-zero finite number")]
    ScaleFactor,
    #[error("register range {start}-{end} overlaps data point {existing_id}")]
    Overlap { start: u32, end: u32, existing_id: i64 },
    #[error("invalid gateway: {0}")]
    Gateway(String),
}

/// 校验点位配置本身（不含与其它点位的重叠）。
pub fn validate_data_point(point: &NewDataPoint) -> Result<FunctionCode, ConfigViolation> {
    let function_code = FunctionCode::try_from(point.function_code)
        .map_err(|_| ConfigViolation::FunctionCode(point.function_code))?;
    if point.register_address == 0 || point.register_address > u16::MAX as u32 {
        return Err(ConfigViolation::RegisterAddress(point.register_address));
    }
    let expected = point.data_type.register_count();
    if point.register_count != expected {
        return Err(ConfigViolation::RegisterCount {
            data_type: point.data_type.as_str(),
            expected,
            got: point.register_count,
        });
    }
    let end = point.register_address + point.register_count as u32 - 1;
    if end > u16::MAX as u32 {
        return Err(ConfigViolation::RangeOverflow {
            start: point.register_address,
            end,
        });
    }
    if point.scale_factor == 0.0 || !point.scale_factor.is_finite() {
        return Err(ConfigViolation::ScaleFactor);
    }
    Ok(function_code)
}

/// 查找与候选点位区间重叠的已有点位。
///
/// `exclude_id` 用于更新场景，跳过点位自身。
pub fn find_overlap<'a>(
    candidate: &NewDataPoint,
    existing: &'a [DataPoint],
    exclude_id: Option<i64>,
) -> Option<&'a DataPoint> {
    let start = candidate.register_address;
    let end = start + candidate.register_count.max(1) as u32 - 1;
    existing.iter().find(|point| {
        if Some(point.data_point_id) == exclude_id {
            return false;
        }
        if point.gateway_id != candidate.gateway_id
            || point.function_code.code() != candidate.function_code
        {
            return false;
        }
        let (other_start, other_end) = point.register_range();
        start <= other_end && other_start <= end
    })
}

/// 校验网关配置。
pub fn validate_gateway(gateway: &NewGateway) -> Result<(), ConfigViolation> {
    if gateway.host.trim().is_empty() {
        return Err(ConfigViolation::Gateway("host required".to_string()));
    }
    if gateway.port == 0 {
        return Err(ConfigViolation::Gateway("port must be non-zero".to_string()));
    }
    if gateway.poll_interval_secs == 0 {
        return Err(ConfigViolation::Gateway(
            "poll_interval must be at least 1 second".to_string(),
        ));
    }
    Ok(())
}
