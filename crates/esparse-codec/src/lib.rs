//! # esparse-codec
//!
//! 编码标识与码流头部解析.
//!
//! - [`CodecId`]: 裸流携带的编码类型 (H.264 / H.265 / MJPEG)
//! - [`parsers::h264`]: H.264 NAL 头部与 SPS 摘要解析
//! - [`parsers::h265`]: H.265 NAL 头部解析
//! - [`parsers::find_start_code`]: 内存中的 Annex B 起始码搜索

pub mod codec_id;
pub mod parsers;

// 重导出常用类型
pub use codec_id::CodecId;
