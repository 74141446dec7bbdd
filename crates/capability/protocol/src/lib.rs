//! # 协议通信能力模块
//!
//! Modbus TCP 采集所需的全部协议能力：
//! - **codec**：寄存器与数值之间的编解码（6 种数据类型 × 3 种字节序）
//! - **client**：带连接超时、读取超时与指数退避重试的客户端
//! - **pool**：单轮轮询内按端点复用连接
//! - **modbus_tcp**：基于 tokio-modbus 的传输实现
//!
//! ## 架构设计
//!
//! ```text
//! PollOrchestrator
//!       │
//!       ▼
//! ConnectionPool ──► ModbusClient (超时 / 重试 / 地址换算)
//!                          │
//!                          ▼
//!                    Connector / RegisterSession
//!                          │
//!                          ▼
//!                    TokioModbusConnector
//! ```

pub mod codec;
mod client;
mod error;
mod modbus_tcp;
mod pool;
mod session;
mod types;

pub use client::ModbusClient;
pub use codec::{CodecError, CodecOptions, RegisterValue};
pub use error::ClientError;
pub use modbus_tcp::TokioModbusConnector;
pub use pool::ConnectionPool;
pub use session::{Connector, RegisterSession};
pub use types::*;
