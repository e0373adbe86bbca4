//! H.265/HEVC NAL 头部解析.
//!
//! HEVC NAL 头部为 2 字节:
//! - forbidden_zero_bit (1 bit)
//! - nal_unit_type (6 bits)
//! - nuh_layer_id (6 bits)
//! - nuh_temporal_id_plus1 (3 bits)
//!
//! 类型 0~21 为切片段 (含保留值 10~15), 21 (CRA) 是编号最大的切片类型.

use esparse_core::{EsError, EsResult};

/// 编号最大的切片段 NAL 类型 (CRA_NUT)
pub const LAST_SLICE_NAL_TYPE: u8 = 21;

/// HEVC NAL 单元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum HevcNalUnitType {
    /// TRAIL_N / TRAIL_R
    Trail,
    /// TSA_N / TSA_R
    Tsa,
    /// STSA_N / STSA_R
    Stsa,
    /// RADL_N / RADL_R
    Radl,
    /// RASL_N / RASL_R
    Rasl,
    /// BLA_W_LP / BLA_W_RADL / BLA_N_LP
    Bla,
    /// IDR_W_RADL / IDR_N_LP
    Idr,
    /// CRA_NUT
    Cra,
    /// VPS
    Vps,
    /// SPS
    Sps,
    /// PPS
    Pps,
    /// AUD
    Aud,
    /// EOS / EOB
    EndOfSequence,
    /// 填充数据
    FillerData,
    /// PREFIX_SEI / SUFFIX_SEI
    Sei,
    /// 保留或未指定类型
    Unknown(u8),
}

impl HevcNalUnitType {
    /// 从类型编号创建
    pub fn from_type_id(id: u8) -> Self {
        match id {
            0 | 1 => Self::Trail,
            2 | 3 => Self::Tsa,
            4 | 5 => Self::Stsa,
            6 | 7 => Self::Radl,
            8 | 9 => Self::Rasl,
            16..=18 => Self::Bla,
            19 | 20 => Self::Idr,
            21 => Self::Cra,
            32 => Self::Vps,
            33 => Self::Sps,
            34 => Self::Pps,
            35 => Self::Aud,
            36 | 37 => Self::EndOfSequence,
            38 => Self::FillerData,
            39 | 40 => Self::Sei,
            _ => Self::Unknown(id),
        }
    }

    /// 是否为 IRAP (Intra Random Access Point)
    pub fn is_irap(&self) -> bool {
        matches!(self, Self::Bla | Self::Idr | Self::Cra)
    }

    /// 是否为参数集 (VPS/SPS/PPS)
    pub fn is_parameter_set(&self) -> bool {
        matches!(self, Self::Vps | Self::Sps | Self::Pps)
    }
}

impl std::fmt::Display for HevcNalUnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trail => write!(f, "TRAIL"),
            Self::Tsa => write!(f, "TSA"),
            Self::Stsa => write!(f, "STSA"),
            Self::Radl => write!(f, "RADL"),
            Self::Rasl => write!(f, "RASL"),
            Self::Bla => write!(f, "BLA"),
            Self::Idr => write!(f, "IDR"),
            Self::Cra => write!(f, "CRA"),
            Self::Vps => write!(f, "VPS"),
            Self::Sps => write!(f, "SPS"),
            Self::Pps => write!(f, "PPS"),
            Self::Aud => write!(f, "AUD"),
            Self::EndOfSequence => write!(f, "EOS"),
            Self::FillerData => write!(f, "FD"),
            Self::Sei => write!(f, "SEI"),
            Self::Unknown(id) => write!(f, "Unknown({id})"),
        }
    }
}

/// HEVC NAL 头部
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HevcNalHeader {
    /// nal_unit_type 原始编号
    pub type_id: u8,
    /// nuh_layer_id
    pub layer_id: u8,
    /// nuh_temporal_id_plus1
    pub temporal_id_plus1: u8,
}

impl HevcNalHeader {
    /// 从 NAL 数据开头 2 字节解析
    pub fn parse(data: &[u8]) -> EsResult<Self> {
        if data.len() < 2 {
            return Err(EsError::InvalidData("HEVC: NAL 头部不足 2 字节".into()));
        }
        Ok(Self {
            type_id: type_id_of(data[0]),
            layer_id: ((data[0] & 1) << 5) | (data[1] >> 3),
            temporal_id_plus1: data[1] & 0x07,
        })
    }

    /// 解析后的类型
    pub fn nal_type(&self) -> HevcNalUnitType {
        HevcNalUnitType::from_type_id(self.type_id)
    }

    /// 是否为切片段 NAL
    pub fn is_slice(&self) -> bool {
        self.type_id <= LAST_SLICE_NAL_TYPE
    }
}

/// 从 NAL 头部第一个字节提取类型编号
pub fn type_id_of(header_byte: u8) -> u8 {
    (header_byte & 0x7E) >> 1
}
