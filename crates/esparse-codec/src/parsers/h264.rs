//! H.264/AVC NAL 头部与 SPS 摘要解析.
//!
//! # NAL 头部 (1 字节)
//! ```text
//! ┌─────────────────────────────────────┐
//! │ forbidden(1) | ref_idc(2) | type(5) │
//! └─────────────────────────────────────┘
//! ```
//!
//! 切片类 NAL (VCL) 的类型编号为 1~5, 其中 5 (IDR) 是编号最大的切片类型.
//! 分帧器以此为阈值区分切片与参数集/SEI 等非切片 NAL.

use esparse_core::{BitReader, EsError, EsResult};

use super::{find_start_code, remove_emulation_prevention};

/// 编号最大的切片类 NAL 类型 (IDR 切片)
pub const LAST_SLICE_NAL_TYPE: u8 = 5;

/// NAL 单元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum NalUnitType {
    /// 非 IDR 图像切片 (P/B slice)
    Slice,
    /// 数据分区 A (DPA)
    SliceDpa,
    /// 数据分区 B (DPB)
    SliceDpb,
    /// 数据分区 C (DPC)
    SliceDpc,
    /// IDR 图像切片 (关键帧)
    SliceIdr,
    /// 增补增强信息 (SEI)
    Sei,
    /// 序列参数集 (SPS)
    Sps,
    /// 图像参数集 (PPS)
    Pps,
    /// 访问单元分隔符 (AUD)
    Aud,
    /// 序列结束
    EndOfSequence,
    /// 流结束
    EndOfStream,
    /// 填充数据
    FillerData,
    /// 未知类型
    Unknown(u8),
}

impl NalUnitType {
    /// 从 NAL 类型编号创建
    pub fn from_type_id(type_id: u8) -> Self {
        match type_id {
            1 => Self::Slice,
            2 => Self::SliceDpa,
            3 => Self::SliceDpb,
            4 => Self::SliceDpc,
            5 => Self::SliceIdr,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::Aud,
            10 => Self::EndOfSequence,
            11 => Self::EndOfStream,
            12 => Self::FillerData,
            _ => Self::Unknown(type_id),
        }
    }

    /// 从 NAL 头部字节提取类型
    pub fn from_header_byte(header: u8) -> Self {
        Self::from_type_id(header & 0x1F)
    }

    /// 获取类型编号
    pub fn type_id(&self) -> u8 {
        match self {
            Self::Slice => 1,
            Self::SliceDpa => 2,
            Self::SliceDpb => 3,
            Self::SliceDpc => 4,
            Self::SliceIdr => 5,
            Self::Sei => 6,
            Self::Sps => 7,
            Self::Pps => 8,
            Self::Aud => 9,
            Self::EndOfSequence => 10,
            Self::EndOfStream => 11,
            Self::FillerData => 12,
            Self::Unknown(id) => *id,
        }
    }

    /// 是否为 VCL (Video Coding Layer) NAL
    pub fn is_vcl(&self) -> bool {
        matches!(
            self,
            Self::Slice | Self::SliceDpa | Self::SliceDpb | Self::SliceDpc | Self::SliceIdr
        )
    }

    /// 是否为数据分区 B/C
    ///
    /// 这两类 NAL 的载荷以 slice_id 开头, 不携带 first_mb_in_slice.
    pub fn is_secondary_partition(&self) -> bool {
        matches!(self, Self::SliceDpb | Self::SliceDpc)
    }
}

impl std::fmt::Display for NalUnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slice => write!(f, "Slice"),
            Self::SliceDpa => write!(f, "SliceDPA"),
            Self::SliceDpb => write!(f, "SliceDPB"),
            Self::SliceDpc => write!(f, "SliceDPC"),
            Self::SliceIdr => write!(f, "IDR"),
            Self::Sei => write!(f, "SEI"),
            Self::Sps => write!(f, "SPS"),
            Self::Pps => write!(f, "PPS"),
            Self::Aud => write!(f, "AUD"),
            Self::EndOfSequence => write!(f, "EndOfSeq"),
            Self::EndOfStream => write!(f, "EndOfStream"),
            Self::FillerData => write!(f, "Filler"),
            Self::Unknown(id) => write!(f, "Unknown({id})"),
        }
    }
}

// ============================================================
// SPS 摘要
// ============================================================

/// SPS 摘要信息
///
/// 只解析到 VUI 的宽高比字段为止, 足以确定图像尺寸和送流缓冲区大小.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpsSummary {
    /// profile_idc (66=Baseline, 77=Main, 100=High ...)
    pub profile_idc: u8,
    /// level_idc (30=3.0, 41=4.1 ...)
    pub level_idc: u8,
    /// 图像宽度 (像素, 已应用 cropping)
    pub width: u32,
    /// 图像高度 (像素, 已应用 cropping)
    pub height: u32,
    /// 是否为帧编码 (非场编码)
    pub frame_mbs_only: bool,
    /// 像素宽高比 (num, den), 未声明时为 (0, 1)
    pub sar: (u32, u32),
}

/// aspect_ratio_idc 1~16 对应的 SAR 表
const ASPECT_RATIOS: [(u32, u32); 17] = [
    (0, 1),
    (1, 1),
    (12, 11),
    (10, 11),
    (16, 11),
    (40, 33),
    (24, 11),
    (20, 11),
    (32, 11),
    (80, 33),
    (18, 11),
    (15, 11),
    (64, 33),
    (160, 99),
    (4, 3),
    (3, 2),
    (2, 1),
];

/// aspect_ratio_idc 中表示显式 SAR 的取值
const EXTENDED_SAR: u32 = 255;

/// 是否携带色度格式等扩展字段的 profile
fn has_chroma_info(profile_idc: u8) -> bool {
    matches!(
        profile_idc,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
    )
}

/// 跳过 scaling_list 语法
fn skip_scaling_list(br: &mut BitReader, size: usize) -> EsResult<()> {
    let mut last = 8i32;
    let mut next = 8i32;
    for _ in 0..size {
        if next != 0 {
            let delta = br.read_se()?;
            next = (i64::from(last) + i64::from(delta)).rem_euclid(256) as i32;
        }
        if next != 0 {
            last = next;
        }
    }
    Ok(())
}

/// 尺寸类字段超出 u32 范围时报告为码流错误
fn checked_size(value: Option<u32>, field: &str) -> EsResult<u32> {
    value.ok_or_else(|| EsError::InvalidData(format!("H.264: SPS {} 数值溢出", field)))
}

/// 解析 SPS RBSP (不含 NAL 头部字节, 已移除 emulation prevention)
pub fn parse_sps_summary(rbsp: &[u8]) -> EsResult<SpsSummary> {
    if rbsp.len() < 4 {
        return Err(EsError::InvalidData(format!(
            "H.264: SPS 数据太短, len={}",
            rbsp.len()
        )));
    }

    let mut br = BitReader::new(rbsp);
    let profile_idc = br.read_bits(8)? as u8;
    br.skip_bits(8)?; // constraint_set 标志 + reserved
    let level_idc = br.read_bits(8)? as u8;
    br.skip_ue()?; // seq_parameter_set_id

    let mut chroma_format_idc = 1u32;
    if has_chroma_info(profile_idc) {
        chroma_format_idc = br.read_ue()?;
        if chroma_format_idc > 3 {
            return Err(EsError::InvalidData(format!(
                "H.264: chroma_format_idc 非法, value={}",
                chroma_format_idc
            )));
        }
        if chroma_format_idc == 3 {
            // separate_colour_plane_flag
            if br.read_flag()? {
                chroma_format_idc = 0;
            }
        }
        br.skip_ue()?; // bit_depth_luma_minus8
        br.skip_ue()?; // bit_depth_chroma_minus8
        br.skip_bits(1)?; // qpprime_y_zero_transform_bypass_flag
        if br.read_flag()? {
            // seq_scaling_matrix_present_flag
            let count = if chroma_format_idc == 3 { 12 } else { 8 };
            for i in 0..count {
                if br.read_flag()? {
                    skip_scaling_list(&mut br, if i < 6 { 16 } else { 64 })?;
                }
            }
        }
    }

    br.skip_ue()?; // log2_max_frame_num_minus4
    let poc_type = br.read_ue()?;
    match poc_type {
        0 => br.skip_ue()?, // log2_max_pic_order_cnt_lsb_minus4
        1 => {
            br.skip_bits(1)?; // delta_pic_order_always_zero_flag
            br.read_se()?; // offset_for_non_ref_pic
            br.read_se()?; // offset_for_top_to_bottom_field
            let cycle = br.read_ue()?;
            if cycle > 255 {
                return Err(EsError::InvalidData(format!(
                    "H.264: num_ref_frames_in_pic_order_cnt_cycle 非法, value={}",
                    cycle
                )));
            }
            for _ in 0..cycle {
                br.read_se()?;
            }
        }
        _ => {}
    }

    br.skip_ue()?; // max_num_ref_frames
    br.skip_bits(1)?; // gaps_in_frame_num_value_allowed_flag
    let width_mbs = br.read_ue()?;
    let height_map_units = br.read_ue()?;
    let frame_mbs_only = br.read_flag()?;
    if !frame_mbs_only {
        br.skip_bits(1)?; // mb_adaptive_frame_field_flag
    }
    br.skip_bits(1)?; // direct_8x8_inference_flag

    let field_factor = if frame_mbs_only { 1 } else { 2 };
    let mut width = checked_size(
        width_mbs.checked_add(1).and_then(|mbs| mbs.checked_mul(16)),
        "pic_width_in_mbs",
    )?;
    let mut height = checked_size(
        height_map_units
            .checked_add(1)
            .and_then(|units| units.checked_mul(16 * field_factor)),
        "pic_height_in_map_units",
    )?;

    if br.read_flag()? {
        // frame_cropping_flag
        let crop_left = br.read_ue()?;
        let crop_right = br.read_ue()?;
        let crop_top = br.read_ue()?;
        let crop_bottom = br.read_ue()?;

        let (unit_x, unit_y) = match chroma_format_idc {
            0 => (1, field_factor),
            1 => (2, 2 * field_factor),
            2 => (2, field_factor),
            _ => (1, field_factor),
        };
        let crop_w = checked_size(
            crop_left
                .checked_add(crop_right)
                .and_then(|sum| sum.checked_mul(unit_x)),
            "frame_crop_left/right",
        )?;
        let crop_h = checked_size(
            crop_top
                .checked_add(crop_bottom)
                .and_then(|sum| sum.checked_mul(unit_y)),
            "frame_crop_top/bottom",
        )?;
        if crop_w >= width || crop_h >= height {
            return Err(EsError::InvalidData(format!(
                "H.264: SPS cropping 超出图像范围, crop={}x{}, coded={}x{}",
                crop_w, crop_h, width, height
            )));
        }
        width -= crop_w;
        height -= crop_h;
    }

    let mut sar = (0, 1);
    // VUI 截断时保留已解析的尺寸信息
    if br.read_flag().unwrap_or(false) && br.read_flag().unwrap_or(false) {
        let idc = br.read_bits(8)?;
        if idc == EXTENDED_SAR {
            let num = br.read_bits(16)?;
            let den = br.read_bits(16)?;
            sar = (num, den);
        } else if let Some(&ratio) = ASPECT_RATIOS.get(idc as usize) {
            sar = ratio;
        } else {
            log::debug!("H.264: aspect_ratio_idc 超出范围, value={}", idc);
        }
    }

    Ok(SpsSummary {
        profile_idc,
        level_idc,
        width,
        height,
        frame_mbs_only,
        sar,
    })
}

/// 在 Annex B 字节切片中查找第一个 SPS 并解析摘要
///
/// # 返回
/// - `Ok(Some(summary))`: 找到并解析成功
/// - `Ok(None)`: 数据中没有 SPS
pub fn find_sps_summary(data: &[u8]) -> EsResult<Option<SpsSummary>> {
    let mut pos = 0;
    while let Some((offset, zero_count)) = find_start_code(&data[pos..]) {
        let nal_start = pos + offset + zero_count + 1;
        if nal_start >= data.len() {
            break;
        }
        let nal_end = find_start_code(&data[nal_start..])
            .map(|(next, _)| nal_start + next)
            .unwrap_or(data.len());

        if NalUnitType::from_header_byte(data[nal_start]) == NalUnitType::Sps {
            let rbsp = remove_emulation_prevention(&data[nal_start + 1..nal_end]);
            return parse_sps_summary(&rbsp).map(Some);
        }
        pos = nal_end;
    }
    Ok(None)
}
