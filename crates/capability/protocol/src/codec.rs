//! 寄存器编解码
//!
//! 把 1~4 个 16 位寄存器按数据类型与字节序解释为数值，以及反向编码。
//!
//! ## 字节序约定
//!
//! | 字节序 | 32 位 | 64 位 |
//! |---|---|---|
//! | `big_endian` | `w0 w1` | `w0 w1 w2 w3` |
//! | `little_endian` | `w1 w0`（字内字节不变） | `w3 w2 w1 w0`（字内字节不变） |
//! | `word_swapped` | `w1 w0`（字内字节不变） | 整体按字节逆序 |
//!
//! `little_endian` 在现场设备上通常就是字交换。需要严格按字节逆序
//! （DCBA）解释时，打开 [`CodecOptions::strict_little_endian`]。

use domain::{ByteOrder, DataType};

/// 解码结果：整数类型保持整数，浮点类型保持浮点。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegisterValue {
    Int(i64),
    Float(f64),
}

impl RegisterValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            RegisterValue::Int(value) => *value as f64,
            RegisterValue::Float(value) => *value,
        }
    }
}

/// 编解码选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecOptions {
    /// `little_endian` 按整体字节逆序解释
    pub strict_little_endian: bool,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("insufficient registers: expected {expected}, got {got}")]
    InsufficientRegisters { expected: usize, got: usize },

    #[error("value {value} out of range for {data_type}")]
    ValueOutOfRange {
        data_type: &'static str,
        value: f64,
    },
}

pub fn decode(
    words: &[u16],
    data_type: DataType,
    byte_order: ByteOrder,
) -> Result<RegisterValue, CodecError> {
    decode_with(words, data_type, byte_order, CodecOptions::default())
}

/// 解码寄存器。多余的寄存器被忽略。
pub fn decode_with(
    words: &[u16],
    data_type: DataType,
    byte_order: ByteOrder,
    options: CodecOptions,
) -> Result<RegisterValue, CodecError> {
    let expected = data_type.register_count() as usize;
    if words.len() < expected {
        return Err(CodecError::InsufficientRegisters {
            expected,
            got: words.len(),
        });
    }

    let value = match data_type {
        DataType::Int16 => RegisterValue::Int(words[0] as i16 as i64),
        DataType::Uint16 => RegisterValue::Int(words[0] as i64),
        DataType::Int32 => RegisterValue::Int(combine_u32(words, byte_order, options) as i32 as i64),
        DataType::Uint32 => RegisterValue::Int(combine_u32(words, byte_order, options) as i64),
        DataType::Float32 => {
            RegisterValue::Float(f32::from_bits(combine_u32(words, byte_order, options)) as f64)
        }
        DataType::Float64 => RegisterValue::Float(f64::from_bits(combine_u64(words, byte_order))),
    };
    Ok(value)
}

pub fn encode(value: f64, data_type: DataType, byte_order: ByteOrder) -> Result<Vec<u16>, CodecError> {
    encode_with(value, data_type, byte_order, CodecOptions::default())
}

/// 编码为寄存器，与 [`decode_with`] 互逆。整数类型按四舍五入取整并检查范围。
pub fn encode_with(
    value: f64,
    data_type: DataType,
    byte_order: ByteOrder,
    options: CodecOptions,
) -> Result<Vec<u16>, CodecError> {
    let words = match data_type {
        DataType::Int16 => vec![integer_in_range(value, data_type, i16::MIN as f64, i16::MAX as f64)? as i16 as u16],
        DataType::Uint16 => vec![integer_in_range(value, data_type, 0.0, u16::MAX as f64)? as u16],
        DataType::Int32 => {
            let bits = integer_in_range(value, data_type, i32::MIN as f64, i32::MAX as f64)? as i32 as u32;
            split_u32(bits, byte_order, options)
        }
        DataType::Uint32 => {
            let bits = integer_in_range(value, data_type, 0.0, u32::MAX as f64)? as u32;
            split_u32(bits, byte_order, options)
        }
        DataType::Float32 => split_u32((value as f32).to_bits(), byte_order, options),
        DataType::Float64 => split_u64(value.to_bits(), byte_order),
    };
    Ok(words)
}

/// 工程值 = 原始值 × 缩放系数
pub fn scale(raw: f64, factor: f64) -> f64 {
    raw * factor
}

fn integer_in_range(value: f64, data_type: DataType, min: f64, max: f64) -> Result<i64, CodecError> {
    let rounded = value.round();
    if !rounded.is_finite() || rounded < min || rounded > max {
        return Err(CodecError::ValueOutOfRange {
            data_type: data_type.as_str(),
            value,
        });
    }
    Ok(rounded as i64)
}

fn wire_bytes(words: &[u16]) -> Vec<u8> {
    words.iter().flat_map(|word| word.to_be_bytes()).collect()
}

fn combine_u32(words: &[u16], byte_order: ByteOrder, options: CodecOptions) -> u32 {
    let (w0, w1) = (words[0] as u32, words[1] as u32);
    match byte_order {
        ByteOrder::BigEndian => (w0 << 16) | w1,
        ByteOrder::LittleEndian if options.strict_little_endian => {
            let bytes = wire_bytes(&words[..2]);
            u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
        }
        ByteOrder::LittleEndian | ByteOrder::WordSwapped => (w1 << 16) | w0,
    }
}

fn split_u32(bits: u32, byte_order: ByteOrder, options: CodecOptions) -> Vec<u16> {
    let (high, low) = ((bits >> 16) as u16, bits as u16);
    match byte_order {
        ByteOrder::BigEndian => vec![high, low],
        ByteOrder::LittleEndian if options.strict_little_endian => {
            let bytes = bits.to_le_bytes();
            vec![
                u16::from_be_bytes([bytes[0], bytes[1]]),
                u16::from_be_bytes([bytes[2], bytes[3]]),
            ]
        }
        ByteOrder::LittleEndian | ByteOrder::WordSwapped => vec![low, high],
    }
}

fn combine_u64(words: &[u16], byte_order: ByteOrder) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&wire_bytes(&words[..4]));
    match byte_order {
        ByteOrder::BigEndian => u64::from_be_bytes(bytes),
        ByteOrder::LittleEndian => {
            let reversed: Vec<u16> = words[..4].iter().rev().copied().collect();
            bytes.copy_from_slice(&wire_bytes(&reversed));
            u64::from_be_bytes(bytes)
        }
        ByteOrder::WordSwapped => u64::from_le_bytes(bytes),
    }
}

fn split_u64(bits: u64, byte_order: ByteOrder) -> Vec<u16> {
    let bytes = match byte_order {
        ByteOrder::BigEndian => bits.to_be_bytes(),
        ByteOrder::LittleEndian => {
            let be = bits.to_be_bytes();
            let mut swapped = [0u8; 8];
            for (index, chunk) in be.chunks(2).rev().enumerate() {
                swapped[index * 2] = chunk[0];
                swapped[index * 2 + 1] = chunk[1];
            }
            swapped
        }
        ByteOrder::WordSwapped => bits.to_le_bytes(),
    };
    bytes
        .chunks(2)
        .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
        .collect()
}
