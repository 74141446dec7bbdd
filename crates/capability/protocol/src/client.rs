//! 带超时与重试的 Modbus 客户端
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let client = ModbusClient::tcp(ClientConfig::default());
//! let mut session = client.connect("192.168.1.100", 502).await?;
//! let words = client
//!     .read_registers(session.as_mut(), 1, FunctionCode::ReadHoldingRegisters, 40001, 2)
//!     .await?;
//! ```

use crate::error::ClientError;
use crate::modbus_tcp::TokioModbusConnector;
use crate::pool::ConnectionPool;
use crate::session::{Connector, RegisterSession};
use crate::types::{ClientConfig, ProbeResult, RetryPolicy};
use domain::FunctionCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Modbus 客户端
#[derive(Clone)]
pub struct ModbusClient {
    connector: Arc<dyn Connector>,
    config: ClientConfig,
}

impl ModbusClient {
    pub fn new(connector: Arc<dyn Connector>, config: ClientConfig) -> Self {
        Self { connector, config }
    }

    /// 使用真实 TCP 连接器
    pub fn tcp(config: ClientConfig) -> Self {
        Self::new(Arc::new(TokioModbusConnector), config)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// 新建本轮连接池
    pub fn pool(&self) -> ConnectionPool<'_> {
        ConnectionPool::new(self)
    }

    /// 按默认重试策略建立连接
    pub async fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Box<dyn RegisterSession>, ClientError> {
        self.connect_with(host, port, self.config.retry).await
    }

    /// 建立连接；连接类错误按指数退避重试，重试耗尽返回 `ConnectionFailed`。
    pub async fn connect_with(
        &self,
        host: &str,
        port: u16,
        retry: RetryPolicy,
    ) -> Result<Box<dyn RegisterSession>, ClientError> {
        let endpoint = format!("{host}:{port}");
        let attempts = retry.attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.connect_once(host, port).await {
                Ok(session) => {
                    if attempt > 1 {
                        info!(
                            target: "fieldpoll.protocol",
                            endpoint = %endpoint,
                            attempt,
                            "modbus_connect_recovered"
                        );
                    }
                    return Ok(session);
                }
                Err(err) if attempt < attempts && err.category().is_retryable() => {
                    let delay = retry.delay_after(attempt);
                    warn!(
                        target: "fieldpoll.protocol",
                        endpoint = %endpoint,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "modbus_connect_retry"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    warn!(
                        target: "fieldpoll.protocol",
                        endpoint = %endpoint,
                        attempt,
                        error = %err,
                        "modbus_connect_failed"
                    );
                    return Err(ClientError::ConnectionFailed {
                        endpoint,
                        attempts: attempt,
                        source: Box::new(err),
                    });
                }
            }
        }
    }

    async fn connect_once(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Box<dyn RegisterSession>, ClientError> {
        let timeout = self.config.connect_timeout;
        match tokio::time::timeout(timeout, self.connector.connect(host, port)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout {
                operation: "connect",
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// 读取寄存器。`register_address` 为 1 基地址，发送时转换为 0 基 PDU 地址。
    pub async fn read_registers(
        &self,
        session: &mut dyn RegisterSession,
        unit_id: u8,
        function: FunctionCode,
        register_address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ClientError> {
        if register_address == 0 {
            return Err(ClientError::IllegalRegister(
                "register address must be at least 1".to_string(),
            ));
        }
        if !(1..=4).contains(&count) {
            return Err(ClientError::IllegalRegister(format!(
                "register count {count} outside 1..=4"
            )));
        }
        let pdu_address = register_address - 1;
        let timeout = self.config.read_timeout;

        let words = match tokio::time::timeout(
            timeout,
            session.read_registers(unit_id, function, pdu_address, count),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(ClientError::Timeout {
                    operation: "read",
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        };

        if words.len() != count as usize {
            return Err(ClientError::DecodeFailure(format!(
                "expected {count} registers, device returned {}",
                words.len()
            )));
        }
        debug!(
            target: "fieldpoll.protocol",
            unit_id,
            function = function.code(),
            register_address,
            count,
            "modbus_registers_read"
        );
        Ok(words)
    }

    /// 连通性探测：单次连接，读取一个保持寄存器，然后关闭。不抛错。
    pub async fn test_connection(
        &self,
        host: &str,
        port: u16,
        unit_id: u8,
        test_register: u16,
    ) -> ProbeResult {
        let started = Instant::now();
        let outcome = async {
            let mut session = self.connect_with(host, port, RetryPolicy::single()).await?;
            let result = self
                .read_registers(
                    session.as_mut(),
                    unit_id,
                    FunctionCode::ReadHoldingRegisters,
                    test_register,
                    1,
                )
                .await;
            session.close().await;
            result
        }
        .await;
        let latency_ms = elapsed_ms(started.elapsed());

        match outcome {
            Ok(words) => ProbeResult {
                success: true,
                latency_ms,
                sample_value: words.first().copied(),
                category: None,
                error: None,
            },
            Err(err) => {
                info!(
                    target: "fieldpoll.protocol",
                    host,
                    port,
                    error = %err,
                    "modbus_probe_failed"
                );
                ProbeResult {
                    success: false,
                    latency_ms,
                    sample_value: None,
                    category: Some(err.category()),
                    error: Some(err.user_message()),
                }
            }
        }
    }
}

fn elapsed_ms(elapsed: Duration) -> u64 {
    elapsed.as_millis().min(u64::MAX as u128) as u64
}
