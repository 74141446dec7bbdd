//! 基于 tokio-modbus 的 TCP 传输实现

use crate::error::ClientError;
use crate::session::{Connector, RegisterSession};
use async_trait::async_trait;
use domain::FunctionCode;
use std::io;
use tokio_modbus::client::{tcp, Context};
use tokio_modbus::prelude::{Reader, Slave, SlaveContext};
use tokio_modbus::ExceptionCode;
use tracing::debug;

/// 真实 Modbus TCP 连接器
#[derive(Debug, Clone, Default)]
pub struct TokioModbusConnector;

#[async_trait]
impl Connector for TokioModbusConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn RegisterSession>, ClientError> {
        let endpoint = format!("{host}:{port}");
        let addr = tokio::net::lookup_host(endpoint.as_str())
            .await
            .map_err(|err| map_transport(&endpoint, err))?
            .next()
            .ok_or_else(|| ClientError::ConnectionRefused {
                endpoint: endpoint.clone(),
                message: "host did not resolve".to_string(),
            })?;

        let ctx = tcp::connect_slave(addr, Slave(1))
            .await
            .map_err(|err| map_transport(&endpoint, err))?;
        debug!(target: "fieldpoll.protocol", endpoint = %endpoint, "modbus_connected");

        Ok(Box::new(TokioModbusSession {
            endpoint,
            ctx: Some(ctx),
        }))
    }
}

struct TokioModbusSession {
    endpoint: String,
    ctx: Option<Context>,
}

#[async_trait]
impl RegisterSession for TokioModbusSession {
    async fn read_registers(
        &mut self,
        unit_id: u8,
        function: FunctionCode,
        pdu_address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ClientError> {
        let endpoint = self.endpoint.clone();
        let ctx = self.ctx.as_mut().ok_or_else(|| ClientError::ConnectionRefused {
            endpoint: endpoint.clone(),
            message: "session closed".to_string(),
        })?;
        ctx.set_slave(Slave(unit_id));

        let response = match function {
            FunctionCode::ReadHoldingRegisters => {
                ctx.read_holding_registers(pdu_address, count).await
            }
            FunctionCode::ReadInputRegisters => ctx.read_input_registers(pdu_address, count).await,
        };

        response
            .map_err(|err| map_modbus_error(&endpoint, err))?
            .map_err(|code| map_exception(function, pdu_address, count, code))
    }

    async fn close(&mut self) {
        if self.ctx.take().is_some() {
            debug!(target: "fieldpoll.protocol", endpoint = %self.endpoint, "modbus_disconnected");
        }
    }
}

fn map_transport(endpoint: &str, err: io::Error) -> ClientError {
    match err.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::BrokenPipe => ClientError::ConnectionRefused {
            endpoint: endpoint.to_string(),
            message: err.to_string(),
        },
        _ => ClientError::Io(err),
    }
}

fn map_modbus_error(endpoint: &str, err: tokio_modbus::Error) -> ClientError {
    match err {
        tokio_modbus::Error::Transport(io_err) => map_transport(endpoint, io_err),
        other => ClientError::Protocol(other.to_string()),
    }
}

/// 设备异常码映射
pub(crate) fn map_exception(
    function: FunctionCode,
    pdu_address: u16,
    count: u16,
    code: ExceptionCode,
) -> ClientError {
    let detail = format!(
        "function {:#04x} address {} count {}: {:?}",
        function.code(),
        pdu_address as u32 + 1,
        count,
        code
    );
    match code {
        ExceptionCode::IllegalDataAddress | ExceptionCode::IllegalDataValue => {
            ClientError::IllegalRegister(detail)
        }
        ExceptionCode::IllegalFunction => ClientError::UnsupportedFunction(detail),
        _ => ClientError::DecodeFailure(detail),
    }
}
