//! 领域模型：网关、点位、读数，以及配置期校验规则。
//!
//! 所有模块共享这些类型；存储层、协议层与调度层都以此为准。

pub mod data;
pub mod errors;
pub mod gateway;
pub mod point;
pub mod validation;

pub use data::{NewReading, Quality, Reading};
pub use errors::{ErrorCategory, Severity};
pub use gateway::{Gateway, GatewayUpdate, NewGateway, PollOutcome};
pub use point::{ByteOrder, DataPoint, DataType, FunctionCode, NewDataPoint};
pub use validation::{ConfigViolation, find_overlap, validate_data_point, validate_gateway};

/// 获取当前时间戳（毫秒）
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
