//! 裸流格式标识符.

use std::fmt;

use esparse_codec::CodecId;

/// 裸流格式标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FormatId {
    /// H.264 Annex B 裸流
    H264Es,
    /// H.265 Annex B 裸流
    H265Es,
    /// 单张 JPEG 或拼接的 MJPEG
    Jpeg,
}

impl FormatId {
    /// 所有已知格式标识的列表
    pub const ALL: &'static [FormatId] = &[Self::H264Es, Self::H265Es, Self::Jpeg];

    /// 获取格式的人类可读名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::H264Es => "h264",
            Self::H265Es => "hevc",
            Self::Jpeg => "mjpeg",
        }
    }

    /// 获取格式常用的文件扩展名
    pub const fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::H264Es => &["264", "h264", "avc"],
            Self::H265Es => &["265", "h265", "hevc"],
            Self::Jpeg => &["jpg", "jpeg", "mjpg", "mjpeg"],
        }
    }

    /// 该格式承载的编解码器
    pub const fn codec(&self) -> CodecId {
        match self {
            Self::H264Es => CodecId::H264,
            Self::H265Es => CodecId::H265,
            Self::Jpeg => CodecId::Mjpeg,
        }
    }

    /// 根据文件扩展名猜测格式
    ///
    /// # 参数
    /// - `ext`: 文件扩展名 (不含 `.`, 如 "h264", "jpg")
    pub fn from_extension(ext: &str) -> Option<FormatId> {
        let ext_lower = ext.to_lowercase();
        Self::ALL
            .iter()
            .find(|id| id.extensions().contains(&ext_lower.as_str()))
            .copied()
    }

    /// 从文件路径猜测格式
    pub fn from_filename(filename: &str) -> Option<FormatId> {
        let (_, ext) = filename.rsplit_once('.')?;
        Self::from_extension(ext)
    }

    /// 根据名称查找格式 (接受 `name()` 及扩展名)
    pub fn from_name(name: &str) -> Option<FormatId> {
        let lower = name.to_lowercase();
        Self::ALL
            .iter()
            .find(|id| id.name() == lower)
            .copied()
            .or_else(|| Self::from_extension(&lower))
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
