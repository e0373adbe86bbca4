//! NAL 访问单元边界判定.
//!
//! 只看 NAL 头部及其后一个字节:
//! - H.264: 切片头首个字段 first_mb_in_slice 为 ue(v), 值为 0 时编码为单个 `1` 位,
//!   所以最高位为 1 等价于 first_mb_in_slice == 0, 即新图像的第一个切片.
//! - H.265: 2 字节 NAL 头部之后的第一位就是 first_slice_segment_in_pic_flag.

use esparse_codec::CodecId;
use esparse_codec::parsers::{h264, h265};
use esparse_core::{EsError, EsResult};

use crate::io::IoContext;

/// 单个 NAL 的边界判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuBoundary {
    /// 当前图像的后续切片
    NoBoundary,
    /// 新图像的第一个切片
    Boundary,
    /// 参数集、SEI、分隔符等非切片 NAL
    NonSliceNal,
}

/// 判定 `nal_offset` 处的 NAL 是否开始一个新的访问单元
///
/// 通过预读完成, 游标位置不变. 头部被文件末尾截断或读取失败时返回
/// `EsError::InvalidData`.
pub fn check_access_unit_boundary(
    io: &mut IoContext,
    nal_offset: u64,
    codec: CodecId,
) -> EsResult<AuBoundary> {
    classify_nal(io, nal_offset, codec)?.ok_or_else(|| truncated(nal_offset, codec))
}

/// 同 [`check_access_unit_boundary`], 但头部被文件末尾截断时返回 `Ok(None)`
pub(crate) fn classify_nal(
    io: &mut IoContext,
    nal_offset: u64,
    codec: CodecId,
) -> EsResult<Option<AuBoundary>> {
    let mut header = [0u8; 3];
    let wanted = codec.nal_header_len() + 1;
    if !codec.is_annex_b() {
        return Err(EsError::Unsupported(format!(
            "{} 不是 Annex B 编码",
            codec
        )));
    }

    let available = io
        .peek_at(nal_offset, &mut header[..wanted])
        .map_err(|e| {
            EsError::InvalidData(format!("读取 NAL 头部失败, offset={}: {}", nal_offset, e))
        })?;
    if available == 0 {
        return Ok(None);
    }

    let result = match codec {
        CodecId::H264 => {
            let nal_type = h264::NalUnitType::from_header_byte(header[0]);
            if nal_type.type_id() > h264::LAST_SLICE_NAL_TYPE {
                AuBoundary::NonSliceNal
            } else if nal_type.is_secondary_partition() {
                AuBoundary::NoBoundary
            } else if available < wanted {
                return Ok(None);
            } else {
                first_bit_boundary(header[1])
            }
        }
        _ => {
            if available < 2 {
                return Ok(None);
            }
            let type_id = h265::type_id_of(header[0]);
            if type_id > h265::LAST_SLICE_NAL_TYPE {
                AuBoundary::NonSliceNal
            } else if available < wanted {
                return Ok(None);
            } else {
                first_bit_boundary(header[2])
            }
        }
    };

    log::trace!(
        "NAL 判定: codec={}, offset={}, header={:02X?}, result={:?}",
        codec,
        nal_offset,
        &header[..available],
        result
    );
    Ok(Some(result))
}

fn first_bit_boundary(byte: u8) -> AuBoundary {
    if byte & 0x80 != 0 {
        AuBoundary::Boundary
    } else {
        AuBoundary::NoBoundary
    }
}

fn truncated(nal_offset: u64, codec: CodecId) -> EsError {
    EsError::InvalidData(format!(
        "{}: NAL 头部被文件末尾截断, offset={}",
        codec, nal_offset
    ))
}
