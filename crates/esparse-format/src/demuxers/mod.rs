//! 分帧器实现模块.

pub mod annexb;
pub mod jpeg;

use crate::format_id::FormatId;
use crate::registry::FormatRegistry;

/// 注册所有内置分帧器
pub fn register_all_demuxers(registry: &mut FormatRegistry) {
    registry.register_demuxer(FormatId::H264Es, "h264", annexb::AnnexBDemuxer::create_h264);
    registry.register_probe(Box::new(annexb::AnnexBProbe::h264()));

    registry.register_demuxer(FormatId::H265Es, "hevc", annexb::AnnexBDemuxer::create_h265);
    registry.register_probe(Box::new(annexb::AnnexBProbe::h265()));

    registry.register_demuxer(FormatId::Jpeg, "mjpeg", jpeg::JpegDemuxer::create);
    registry.register_probe(Box::new(jpeg::JpegProbe));
}
