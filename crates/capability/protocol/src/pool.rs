//! 单轮轮询内的连接池
//!
//! 以 `host:port` 为键复用连接。池被丢弃时所有连接随之关闭。

use crate::client::ModbusClient;
use crate::error::ClientError;
use crate::session::RegisterSession;
use crate::types::RetryPolicy;
use domain::FunctionCode;
use std::collections::HashMap;
use tracing::debug;

pub struct ConnectionPool<'a> {
    client: &'a ModbusClient,
    sessions: HashMap<String, Box<dyn RegisterSession>>,
    /// 曾经断开过的端点，再次连接时只尝试一次
    evicted: Vec<String>,
}

impl<'a> ConnectionPool<'a> {
    pub fn new(client: &'a ModbusClient) -> Self {
        Self {
            client,
            sessions: HashMap::new(),
            evicted: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// 确保端点已连接
    pub async fn ensure_connected(&mut self, host: &str, port: u16) -> Result<(), ClientError> {
        let key = format!("{host}:{port}");
        if self.sessions.contains_key(&key) {
            return Ok(());
        }
        let retry = if self.evicted.contains(&key) {
            RetryPolicy::single()
        } else {
            self.client.config().retry
        };
        let session = self.client.connect_with(host, port, retry).await?;
        self.sessions.insert(key, session);
        Ok(())
    }

    /// 通过池内连接读取寄存器；连接层或传输帧错误会让该连接失效，下次读取时重连。
    pub async fn read(
        &mut self,
        host: &str,
        port: u16,
        unit_id: u8,
        function: FunctionCode,
        register_address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ClientError> {
        self.ensure_connected(host, port).await?;
        let key = format!("{host}:{port}");
        let session = self
            .sessions
            .get_mut(&key)
            .ok_or_else(|| ClientError::ConnectionRefused {
                endpoint: key.clone(),
                message: "session missing from pool".to_string(),
            })?;

        let result = self
            .client
            .read_registers(session.as_mut(), unit_id, function, register_address, count)
            .await;

        if let Err(err) = &result {
            if err.is_connection_level() {
                if let Some(mut broken) = self.sessions.remove(&key) {
                    broken.close().await;
                }
                debug!(target: "fieldpoll.protocol", endpoint = %key, "modbus_session_evicted");
                self.evicted.push(key);
            }
        }
        result
    }

    /// 关闭全部连接
    pub async fn close_all(&mut self) {
        for (_, mut session) in self.sessions.drain() {
            session.close().await;
        }
    }
}
