//! 传输层抽象
//!
//! [`Connector`] 打开连接，[`RegisterSession`] 在一条连接上顺序读取寄存器。
//! 超时与重试由 [`crate::ModbusClient`] 统一处理，实现方只负责单次操作。

use crate::error::ClientError;
use async_trait::async_trait;
use domain::FunctionCode;

/// 一条已建立的 Modbus 连接
#[async_trait]
pub trait RegisterSession: Send {
    /// 读取寄存器，`pdu_address` 为 0 基地址。
    async fn read_registers(
        &mut self,
        unit_id: u8,
        function: FunctionCode,
        pdu_address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ClientError>;

    async fn close(&mut self);
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn RegisterSession>, ClientError>;
}
