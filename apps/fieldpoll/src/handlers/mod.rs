//! Handlers 模块

pub mod gateways;
pub mod ops;
pub mod readings;

pub use gateways::*;
pub use ops::*;
pub use readings::*;
