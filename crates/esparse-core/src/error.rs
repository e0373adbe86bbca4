//! 统一错误类型定义.
//!
//! 错误分为三类, 调用方据此决定后续动作:
//! - I/O 错误 ([`EsError::Io`]): 当前调用失败, 不自动重试
//! - 码流格式错误 ([`EsError::InvalidData`]): 当前调用失败, 调用方可跳过或重新同步
//! - 容量错误 ([`EsError::NeedLargerBuffer`]): 扩大目标缓冲区后可重试
//!
//! 流结束不是错误, 由读取接口返回 `Ok(None)` 表示.

use thiserror::Error;

/// esparse 统一错误类型
#[derive(Debug, Error)]
pub enum EsError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 不支持的操作
    #[error("不支持的操作: {0}")]
    Unsupported(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 读取时提前到达流末尾
    #[error("已到达流末尾")]
    Eof,

    /// 无效数据 (码流格式错误)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// 目标缓冲区容量不足以容纳一个完整的帧
    #[error("缓冲区容量不足: 需要 {required} 字节, 当前容量 {capacity} 字节")]
    NeedLargerBuffer {
        /// 所需字节数
        required: usize,
        /// 当前缓冲区容量
        capacity: usize,
    },

    /// 调用方请求中止
    #[error("操作已取消")]
    Cancelled,

    /// 未找到指定的格式
    #[error("未找到格式: {0}")]
    FormatNotFound(String),
}

impl EsError {
    /// 是否可通过扩大缓冲区后重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NeedLargerBuffer { .. })
    }

    /// 是否为码流格式错误 (调用方可跳过当前文件或重新同步)
    pub fn is_format_error(&self) -> bool {
        matches!(self, Self::InvalidData(_))
    }
}

/// esparse 统一 Result 类型
pub type EsResult<T> = Result<T, EsError>;
