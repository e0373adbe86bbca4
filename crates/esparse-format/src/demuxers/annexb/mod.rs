//! H.264/H.265 Annex B 裸流分帧器.
//!
//! 把起始码分隔的 NAL 序列切分为访问单元 (一帧图像对应的全部 NAL).
//!
//! # 切分规则
//! 1. 从游标处找到第一个起始码, 其前面的字节视为无效数据跳过
//! 2. 吸收开头连续的非切片 NAL (SPS/PPS/VPS/SEI/AUD), 它们属于后面的图像
//! 3. 从第一个切片开始向后扫描:
//!    - 同一图像的后续切片: 继续
//!    - 新图像的首切片: 单元在该起始码处结束
//!    - 非切片 NAL: 记住这一串的起点, 若其后是新图像首切片, 单元在串起点处结束,
//!      否则这串 NAL 属于当前图像
//!    - 文件末尾 (包括 NAL 头部被文件末尾截断): 单元在文件末尾结束
//!
//! 输出区间从单元第一个起始码的首个 0 字节开始, 到下一个单元第一个起始码的
//! 首个 0 字节为止, 游标同时被重新定位到区间末尾.

mod boundary;
mod scanner;

use std::io::SeekFrom;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use esparse_codec::CodecId;
use esparse_codec::parsers::{find_start_code, h264, h265};
use esparse_core::{EsError, EsResult};

use crate::demuxer::{ByteRange, Demuxer};
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::probe::{FormatProbe, ProbeScore, SCORE_HEADER, SCORE_MAX, extension_score};

pub use boundary::{AuBoundary, check_access_unit_boundary};
pub use scanner::{StartCode, find_next_start_code};

/// Annex B 访问单元分帧器
///
/// 每个输入文件一个实例, 帧计数和取消标志都保存在实例上.
pub struct AnnexBDemuxer {
    /// 码流编码
    codec: CodecId,
    /// 已输出的访问单元数
    frames_read: u64,
    /// 取消标志, 在每个 NAL 之间检查
    cancel: Option<Arc<AtomicBool>>,
}

impl AnnexBDemuxer {
    /// 创建指定编码的分帧器
    ///
    /// `codec` 必须是 Annex B 编码 (H.264 或 H.265).
    pub fn new(codec: CodecId) -> EsResult<Self> {
        if !codec.is_annex_b() {
            return Err(EsError::InvalidArgument(format!(
                "Annex B 分帧器不支持 {}",
                codec
            )));
        }
        Ok(Self::with_codec(codec))
    }

    /// 创建 H.264 分帧器
    pub fn h264() -> Self {
        Self::with_codec(CodecId::H264)
    }

    /// 创建 H.265 分帧器
    pub fn h265() -> Self {
        Self::with_codec(CodecId::H265)
    }

    fn with_codec(codec: CodecId) -> Self {
        Self {
            codec,
            frames_read: 0,
            cancel: None,
        }
    }

    /// 设置取消标志
    ///
    /// 其他线程把标志置为 `true` 后, 正在进行的 `read_access_unit` 会在
    /// 下一个 NAL 之前返回 `EsError::Cancelled`.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// H.264 工厂函数 (用于注册表)
    pub fn create_h264() -> EsResult<Box<dyn Demuxer>> {
        Ok(Box::new(Self::h264()))
    }

    /// H.265 工厂函数 (用于注册表)
    pub fn create_h265() -> EsResult<Box<dyn Demuxer>> {
        Ok(Box::new(Self::h265()))
    }

    /// 码流编码
    pub fn codec(&self) -> CodecId {
        self.codec
    }

    fn check_cancelled(&self) -> EsResult<()> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(EsError::Cancelled),
            _ => Ok(()),
        }
    }

    /// 头部被文件末尾截断的 NAL 按非切片处理, 当前单元随之在文件末尾结束
    fn classify(&self, io: &mut IoContext, start_code: &StartCode) -> EsResult<AuBoundary> {
        let nal_offset = start_code.nal_offset();
        match boundary::classify_nal(io, nal_offset, self.codec)? {
            Some(result) => Ok(result),
            None => {
                log::warn!(
                    "{}: NAL 头部被文件末尾截断, offset={}, 单元在文件末尾结束",
                    self.codec,
                    nal_offset
                );
                Ok(AuBoundary::NonSliceNal)
            }
        }
    }

    /// 读取下一个访问单元的字节区间
    ///
    /// # 返回
    /// - `Ok(Some(range))`: 下一个访问单元, 游标已位于 `range.end`
    /// - `Ok(None)`: 已到达流末尾
    /// - `Err(EsError::InvalidData)`: 剩余数据中没有起始码, 或 NAL 头部读取失败
    pub fn read_access_unit(&mut self, io: &mut IoContext) -> EsResult<Option<ByteRange>> {
        let origin = io.position()?;

        let Some(first) = find_next_start_code(io)? else {
            let eof = io.position()?;
            if eof > origin {
                return Err(EsError::InvalidData(format!(
                    "{}: 剩余 {} 字节中未找到起始码, offset={}",
                    self.codec,
                    eof - origin,
                    origin
                )));
            }
            return Ok(None);
        };
        if first.offset > origin {
            log::warn!(
                "{}: 跳过起始码前的 {} 字节无效数据, offset={}",
                self.codec,
                first.offset - origin,
                origin
            );
        }
        let start = first.offset;

        // 开头的非切片 NAL 归入其后的图像
        let mut current = first;
        loop {
            self.check_cancelled()?;
            if self.classify(io, &current)? != AuBoundary::NonSliceNal {
                break;
            }
            match find_next_start_code(io)? {
                Some(next) => current = next,
                None => {
                    let eof = io.position()?;
                    return self.complete(io, start, eof);
                }
            }
        }

        let end = 'scan: loop {
            self.check_cancelled()?;
            let Some(next) = find_next_start_code(io)? else {
                break 'scan io.position()?;
            };
            match self.classify(io, &next)? {
                AuBoundary::NoBoundary => continue,
                AuBoundary::Boundary => break 'scan next.offset,
                AuBoundary::NonSliceNal => {
                    let run_start = next.offset;
                    loop {
                        self.check_cancelled()?;
                        let Some(after) = find_next_start_code(io)? else {
                            break 'scan io.position()?;
                        };
                        match self.classify(io, &after)? {
                            AuBoundary::NonSliceNal => continue,
                            AuBoundary::Boundary => break 'scan run_start,
                            AuBoundary::NoBoundary => break,
                        }
                    }
                }
            }
        };

        self.complete(io, start, end)
    }

    fn complete(
        &mut self,
        io: &mut IoContext,
        start: u64,
        end: u64,
    ) -> EsResult<Option<ByteRange>> {
        io.seek(SeekFrom::Start(end))?;
        if end <= start {
            return Ok(None);
        }
        self.frames_read += 1;
        log::debug!(
            "{}: 访问单元 #{}, range=[{}, {}), size={}",
            self.codec,
            self.frames_read,
            start,
            end,
            end - start
        );
        Ok(Some(ByteRange { start, end }))
    }
}

impl Demuxer for AnnexBDemuxer {
    fn format_id(&self) -> FormatId {
        match self.codec {
            CodecId::H265 => FormatId::H265Es,
            _ => FormatId::H264Es,
        }
    }

    fn name(&self) -> &str {
        self.codec.name()
    }

    fn read_frame(&mut self, io: &mut IoContext) -> EsResult<Option<ByteRange>> {
        self.read_access_unit(io)
    }

    fn frames_read(&self) -> u64 {
        self.frames_read
    }
}

/// Annex B 格式探测器
///
/// 根据第一个起始码后的 NAL 类型区分 H.264 与 H.265:
/// - H.264: SPS (`type & 0x1F == 7`) 最可信, AUD/IDR 次之
/// - H.265: 参数集 (VPS `40 01` 等) 最可信, AUD (`46 01`)/IRAP 切片次之
pub struct AnnexBProbe {
    codec: CodecId,
}

impl AnnexBProbe {
    /// H.264 探测器
    pub fn h264() -> Self {
        Self {
            codec: CodecId::H264,
        }
    }

    /// H.265 探测器
    pub fn h265() -> Self {
        Self {
            codec: CodecId::H265,
        }
    }

    fn probe_header(&self, data: &[u8]) -> Option<ProbeScore> {
        let (offset, zero_count) = find_start_code(data)?;
        let nal = data.get(offset + zero_count + 1..)?;
        let b0 = *nal.first()?;
        match self.codec {
            CodecId::H264 => {
                if b0 & 0x80 != 0 {
                    return None;
                }
                match h264::NalUnitType::from_header_byte(b0) {
                    h264::NalUnitType::Sps => Some(SCORE_MAX),
                    h264::NalUnitType::Aud | h264::NalUnitType::SliceIdr => Some(SCORE_HEADER),
                    _ => None,
                }
            }
            _ => {
                let header = h265::HevcNalHeader::parse(nal).ok()?;
                if b0 & 0x80 != 0 || header.layer_id != 0 || header.temporal_id_plus1 == 0 {
                    return None;
                }
                let nal_type = header.nal_type();
                if nal_type.is_parameter_set() {
                    Some(SCORE_MAX)
                } else if nal_type.is_irap() || nal_type == h265::HevcNalUnitType::Aud {
                    Some(SCORE_HEADER)
                } else {
                    None
                }
            }
        }
    }
}

impl FormatProbe for AnnexBProbe {
    fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeScore> {
        self.probe_header(data)
            .or_else(|| extension_score(self.format_id(), filename))
    }

    fn format_id(&self) -> FormatId {
        match self.codec {
            CodecId::H265 => FormatId::H265Es,
            _ => FormatId::H264Es,
        }
    }
}
