//! 编码标识符.

use std::fmt;

/// 编码标识符
///
/// 标识裸流中承载的压缩编码, 决定分帧器使用的 NAL 头部规则.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecId {
    /// H.264 / AVC
    H264,
    /// H.265 / HEVC
    H265,
    /// Motion JPEG (逐帧 JPEG)
    Mjpeg,
}

impl CodecId {
    /// 获取编码的人类可读名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::H265 => "hevc",
            Self::Mjpeg => "mjpeg",
        }
    }

    /// 是否为 Annex B 起始码分隔的编码
    pub const fn is_annex_b(&self) -> bool {
        matches!(self, Self::H264 | Self::H265)
    }

    /// NAL 头部长度 (字节), 非 Annex B 编码返回 0
    pub const fn nal_header_len(&self) -> usize {
        match self {
            Self::H264 => 1,
            Self::H265 => 2,
            Self::Mjpeg => 0,
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
