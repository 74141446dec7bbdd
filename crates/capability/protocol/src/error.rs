//! 协议错误类型定义

use crate::codec::CodecError;
use domain::ErrorCategory;
use std::io;

/// Modbus 客户端错误
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// 连接或读取超时
    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// 对端拒绝或断开连接
    #[error("connection refused by {endpoint}: {message}")]
    ConnectionRefused { endpoint: String, message: String },

    /// 设备返回非法地址/非法数据值异常
    #[error("illegal register: {0}")]
    IllegalRegister(String),

    /// 设备不支持该功能码
    #[error("unsupported function: {0}")]
    UnsupportedFunction(String),

    /// 响应格式错误或长度不符
    #[error("decode failure: {0}")]
    DecodeFailure(String),

    /// 传输层帧错误（帧头不匹配、截断等），会话已失步
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// 连接重试耗尽
    #[error("connection to {endpoint} failed after {attempts} attempts: {source}")]
    ConnectionFailed {
        endpoint: String,
        attempts: u32,
        #[source]
        source: Box<ClientError>,
    },
}

impl ClientError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ClientError::Timeout { .. } => ErrorCategory::ConnectionTimeout,
            ClientError::ConnectionRefused { .. } => ErrorCategory::ConnectionRefused,
            ClientError::IllegalRegister(_) => ErrorCategory::IllegalRegister,
            ClientError::UnsupportedFunction(_) => ErrorCategory::UnsupportedFunction,
            ClientError::DecodeFailure(_) | ClientError::Protocol(_) => {
                ErrorCategory::DecodeFailure
            }
            ClientError::Codec(CodecError::InsufficientRegisters { .. }) => {
                ErrorCategory::InsufficientRegisters
            }
            ClientError::Codec(CodecError::ValueOutOfRange { .. }) => ErrorCategory::DecodeFailure,
            ClientError::Io(err) => classify_io(err),
            ClientError::ConnectionFailed { source, .. } => source.category(),
        }
    }

    /// 连接层错误：当前会话已不可再用。设备异常与本地解码错误不在此列。
    pub fn is_connection_level(&self) -> bool {
        match self {
            ClientError::Io(_) | ClientError::Protocol(_) => true,
            other => matches!(
                other.category(),
                ErrorCategory::ConnectionTimeout | ErrorCategory::ConnectionRefused
            ),
        }
    }

    /// 面向用户的消息（不含内部细节）
    pub fn user_message(&self) -> String {
        self.category().render(&self.to_string())
    }
}

pub(crate) fn classify_io(err: &io::Error) -> ErrorCategory {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ErrorCategory::ConnectionTimeout,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::BrokenPipe => ErrorCategory::ConnectionRefused,
        io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => ErrorCategory::DecodeFailure,
        _ => ErrorCategory::ConnectionTimeout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_failed_inherits_source_category() {
        let err = ClientError::ConnectionFailed {
            endpoint: "10.0.0.1:502".to_string(),
            attempts: 3,
            source: Box::new(ClientError::ConnectionRefused {
                endpoint: "10.0.0.1:502".to_string(),
                message: "refused".to_string(),
            }),
        };
        assert_eq!(err.category(), ErrorCategory::ConnectionRefused);
        assert!(err.is_connection_level());
        assert!(err.to_string().contains("3 attempts"));
    }

    #[test]
    fn io_errors_are_classified() {
        let refused = ClientError::Io(io::Error::from(io::ErrorKind::ConnectionReset));
        assert_eq!(refused.category(), ErrorCategory::ConnectionRefused);
        let eof = ClientError::Io(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert_eq!(eof.category(), ErrorCategory::DecodeFailure);
        assert!(eof.is_connection_level());
    }

    #[test]
    fn framing_errors_invalidate_session_but_device_errors_do_not() {
        let framing = ClientError::Protocol("header mismatch".to_string());
        assert_eq!(framing.category(), ErrorCategory::DecodeFailure);
        assert!(framing.is_connection_level());

        assert!(!ClientError::DecodeFailure("slave device busy".to_string()).is_connection_level());
        assert!(!ClientError::IllegalRegister("address 100".to_string()).is_connection_level());
    }

    #[test]
    fn codec_errors_map_to_insufficient_registers() {
        let err = ClientError::from(CodecError::InsufficientRegisters { expected: 2, got: 1 });
        assert_eq!(err.category(), ErrorCategory::InsufficientRegisters);
        assert!(err.user_message().contains("expected 2, got 1"));
    }
}
