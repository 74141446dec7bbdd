use serde::{Deserialize, Serialize};

/// 读数质量标记。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Good,
    Bad,
    Uncertain,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Good => "good",
            Quality::Bad => "bad",
            Quality::Uncertain => "uncertain",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "good" => Some(Quality::Good),
            "bad" => Some(Quality::Bad),
            "uncertain" => Some(Quality::Uncertain),
            _ => None,
        }
    }
}

/// 待写入的读数。
///
/// `read_at_ms` 是名义采样时刻（调度网格上的时间点），不是写库时间；
/// `(data_point_id, read_at_ms)` 在存储层唯一。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReading {
    pub data_point_id: i64,
    pub raw_registers: Vec<u16>,
    pub raw_value: Option<f64>,
    pub value: Option<f64>,
    pub quality: Quality,
    pub read_at_ms: i64,
}

impl NewReading {
    /// 解码成功的读数。
    pub fn good(data_point_id: i64, raw_registers: Vec<u16>, raw_value: f64, value: f64, read_at_ms: i64) -> Self {
        Self {
            data_point_id,
            raw_registers,
            raw_value: Some(raw_value),
            value: Some(value),
            quality: Quality::Good,
            read_at_ms,
        }
    }

    /// 失败的采集尝试：值为空，原始寄存器按收到的内容保留（可能为空）。
    pub fn bad(data_point_id: i64, raw_registers: Vec<u16>, read_at_ms: i64) -> Self {
        Self {
            data_point_id,
            raw_registers,
            raw_value: None,
            value: None,
            quality: Quality::Bad,
            read_at_ms,
        }
    }
}

/// 已持久化的读数。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub reading_id: i64,
    pub data_point_id: i64,
    pub raw_registers: Vec<u16>,
    pub raw_value: Option<f64>,
    pub value: Option<f64>,
    pub quality: Quality,
    pub read_at_ms: i64,
    pub created_at_ms: i64,
}
