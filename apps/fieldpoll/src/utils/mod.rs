//! 工具模块

pub mod response;

pub use response::*;
