//! # esparse-format
//!
//! 裸流分帧库: 从 Annex B (H.264/H.265) 裸流中切出访问单元,
//! 从 JPEG/MJPEG 文件中切出完整图像, 并把数据搬到送流缓冲区.

pub mod demuxer;
pub mod demuxers;
pub mod format_id;
pub mod io;
pub mod probe;
pub mod registry;
pub mod stream_buffer;

// 重导出常用类型
pub use demuxer::{ByteRange, Demuxer};
pub use demuxers::annexb::{AnnexBDemuxer, AuBoundary, StartCode};
pub use demuxers::jpeg::JpegDemuxer;
pub use format_id::FormatId;
pub use io::IoContext;
pub use probe::ProbeResult;
pub use registry::FormatRegistry;
pub use stream_buffer::{BufferMode, StreamBuffer, suggested_capacity};

/// 注册所有内置格式
pub fn register_all(registry: &mut FormatRegistry) {
    demuxers::register_all_demuxers(registry);
}
