//! # esparse
//!
//! 纯 Rust 实现的裸流分帧库, 用于向硬件解码器送流.
//!
//! - **Annex B 分帧**: 把 H.264/H.265 裸流切分为访问单元
//! - **JPEG/MJPEG 分帧**: 切出完整图像, 跳过内嵌缩略图的 EOI
//! - **送流缓冲区**: 线性或环形写入调用方持有的 (DMA) 缓冲区
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use esparse::format::{AnnexBDemuxer, BufferMode, IoContext, StreamBuffer};
//!
//! # fn main() -> esparse::core::EsResult<()> {
//! let mut io = IoContext::open_read("input.264")?;
//! let mut demuxer = AnnexBDemuxer::h264();
//! let mut buffer = StreamBuffer::with_capacity(3 * 1024 * 1024, BufferMode::Ring);
//!
//! while let Some(range) = demuxer.read_access_unit(&mut io)? {
//!     buffer.fill(&mut io, range)?;
//!     // 把 buffer.data_phys_addr() 和 range.len() 交给解码器
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `esparse-core` | 错误类型与比特流读取 |
//! | `esparse-codec` | NAL 头部与 SPS 解析 |
//! | `esparse-format` | I/O 游标、分帧器、送流缓冲区 |

/// 错误类型与比特流读取
pub use esparse_core as core;

/// NAL 头部与参数集解析
pub use esparse_codec as codec;

/// I/O 游标、分帧器与送流缓冲区
pub use esparse_format as format;

/// 获取 esparse 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// 创建已注册所有内置分帧器的注册表
pub fn default_format_registry() -> esparse_format::FormatRegistry {
    let mut registry = esparse_format::FormatRegistry::new();
    esparse_format::register_all(&mut registry);
    log::debug!(
        "已注册分帧器: {:?}",
        registry.list_demuxers()
    );
    registry
}
