use serde::{Deserialize, Serialize};

/// Modbus 寄存器数据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// 16位有符号整数
    Int16,
    /// 16位无符号整数
    Uint16,
    /// 32位有符号整数（2个寄存器）
    Int32,
    /// 32位无符号整数（2个寄存器）
    Uint32,
    /// 32位浮点数（2个寄存器）
    Float32,
    /// 64位浮点数（4个寄存器）
    Float64,
}

impl DataType {
    pub const ALL: [DataType; 6] = [
        DataType::Int16,
        DataType::Uint16,
        DataType::Int32,
        DataType::Uint32,
        DataType::Float32,
        DataType::Float64,
    ];

    /// 该类型需要的寄存器（字）数量
    pub fn register_count(&self) -> u16 {
        match self {
            DataType::Int16 | DataType::Uint16 => 1,
            DataType::Int32 | DataType::Uint32 | DataType::Float32 => 2,
            DataType::Float64 => 4,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Int16 => "int16",
            DataType::Uint16 => "uint16",
            DataType::Int32 => "int32",
            DataType::Uint32 => "uint32",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|item| item.as_str() == value)
    }
}

/// 多寄存器值的字节序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    BigEndian,
    LittleEndian,
    WordSwapped,
}

impl ByteOrder {
    pub const ALL: [ByteOrder; 3] = [
        ByteOrder::BigEndian,
        ByteOrder::LittleEndian,
        ByteOrder::WordSwapped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ByteOrder::BigEndian => "big_endian",
            ByteOrder::LittleEndian => "little_endian",
            ByteOrder::WordSwapped => "word_swapped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|item| item.as_str() == value)
    }
}

/// 支持的 Modbus 读功能码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum FunctionCode {
    /// 读保持寄存器 (0x03)
    ReadHoldingRegisters,
    /// 读输入寄存器 (0x04)
    ReadInputRegisters,
}

impl FunctionCode {
    pub fn code(&self) -> u8 {
        match self {
            FunctionCode::ReadHoldingRegisters => 3,
            FunctionCode::ReadInputRegisters => 4,
        }
    }
}

impl TryFrom<u8> for FunctionCode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            3 => Ok(FunctionCode::ReadHoldingRegisters),
            4 => Ok(FunctionCode::ReadInputRegisters),
            other => Err(format!("unsupported function code: {}", other)),
        }
    }
}

impl From<FunctionCode> for u8 {
    fn from(value: FunctionCode) -> Self {
        value.code()
    }
}

/// 点位：网关上的一段寄存器及其解码规则。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub data_point_id: i64,
    pub gateway_id: i64,
    pub name: String,
    pub function_code: FunctionCode,
    /// 寄存器起始地址（1 起始，界面约定）
    pub register_address: u16,
    pub register_count: u16,
    pub data_type: DataType,
    pub byte_order: ByteOrder,
    pub scale_factor: f64,
    pub unit: Option<String>,
    pub is_enabled: bool,
}

impl DataPoint {
    /// 线上使用的 0 起始 PDU 地址
    pub fn pdu_address(&self) -> u16 {
        self.register_address.saturating_sub(1)
    }

    /// 占用的寄存器地址闭区间
    pub fn register_range(&self) -> (u32, u32) {
        let start = self.register_address as u32;
        (start, start + self.register_count.max(1) as u32 - 1)
    }
}

/// 点位创建输入。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDataPoint {
    pub gateway_id: i64,
    pub name: String,
    pub function_code: u8,
    pub register_address: u32,
    pub register_count: u16,
    pub data_type: DataType,
    pub byte_order: ByteOrder,
    pub scale_factor: f64,
    pub unit: Option<String>,
    pub is_enabled: bool,
}
