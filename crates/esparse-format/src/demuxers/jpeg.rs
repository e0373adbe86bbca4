//! JPEG / MJPEG 分帧器.
//!
//! 从游标处向后扫描, 直到主图像的 EOI (`FF D9`), 拼接的 MJPEG 文件可反复调用逐帧切出.
//!
//! 标记处理:
//! - APP1~APP15 (`E1..=EF`) 和 SOF1~SOF3 / SOF5~SOF11 (`C1..=C3`, `C5..=CB`):
//!   按 2 字节大端长度整段跳过, 其中内嵌的 EXIF 缩略图不会被扫描到
//! - APP0 (`E0`) 携带 JFXX 扩展时, 其后第一个 EOI 属于内嵌缩略图
//! - 其余标记逐字节扫描

use esparse_core::{EsError, EsResult};

use crate::demuxer::{ByteRange, Demuxer};
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::probe::{FormatProbe, ProbeScore, SCORE_MAX, extension_score};

/// SOI 标记
const SOI: [u8; 2] = [0xFF, 0xD8];
/// EOI 标记码
const MARKER_EOI: u8 = 0xD9;
/// APP0 标记码
const MARKER_APP0: u8 = 0xE0;
/// APP0 段长度之后的 JFXX 扩展标识 ("JFXX\0" + 扩展码 0x10)
const JFXX_THUMBNAIL: [u8; 6] = [0x4A, 0x46, 0x58, 0x58, 0x00, 0x10];

/// 带长度字段且需要整段跳过的标记
fn has_skippable_segment(marker: u8) -> bool {
    matches!(marker, 0xE1..=0xEF | 0xC1..=0xC3 | 0xC5..=0xCB)
}

/// JPEG / MJPEG 分帧器
pub struct JpegDemuxer {
    /// 已输出的帧数
    frames_read: u64,
}

impl JpegDemuxer {
    /// 创建分帧器
    pub fn new() -> Self {
        Self { frames_read: 0 }
    }

    /// 工厂函数 (用于注册表)
    pub fn create() -> EsResult<Box<dyn Demuxer>> {
        Ok(Box::new(Self::new()))
    }

    /// 读取下一张完整 JPEG 图像的字节区间
    ///
    /// # 返回
    /// - `Ok(Some(range))`: `range.end` 紧跟主图像 EOI, 游标已位于 `range.end`
    /// - `Ok(None)`: 游标已在文件末尾
    /// - `Err(EsError::InvalidData)`: 段长度越过文件末尾, 或直到文件末尾都没有主图像 EOI
    pub fn read_jpeg_frame(&mut self, io: &mut IoContext) -> EsResult<Option<ByteRange>> {
        if io.is_eof()? {
            return Ok(None);
        }
        let start = io.position()?;

        let mut soi = [0u8; 2];
        if io.peek_at(start, &mut soi)? < 2 || soi != SOI {
            log::warn!("JPEG: offset={} 处不是 SOI 标记, 继续扫描", start);
        }

        let size = io.size();
        let mut pos = start;
        let mut in_thumbnail = false;

        loop {
            if !skip_to_marker_prefix(io, &mut pos)? {
                return Err(EsError::InvalidData(format!(
                    "JPEG: 从 offset={} 到文件末尾没有找到 EOI",
                    start
                )));
            }
            // 连续的 0xFF 是填充字节
            let marker = loop {
                let Some(byte) = next_byte(io, &mut pos)? else {
                    return Err(EsError::InvalidData(format!(
                        "JPEG: 从 offset={} 到文件末尾没有找到 EOI",
                        start
                    )));
                };
                if byte != 0xFF {
                    break byte;
                }
            };

            match marker {
                MARKER_EOI if in_thumbnail => {
                    log::trace!("JPEG: 缩略图结束, offset={}", pos - 2);
                    in_thumbnail = false;
                }
                MARKER_EOI => break,
                MARKER_APP0 => {
                    let mut ext = [0u8; 6];
                    if io.peek_at(pos + 2, &mut ext)? == ext.len() && ext == JFXX_THUMBNAIL {
                        log::trace!("JPEG: 进入 JFXX 缩略图, offset={}", pos - 2);
                        in_thumbnail = true;
                    }
                }
                m if has_skippable_segment(m) => {
                    let length = match io.read_u16_be() {
                        Ok(length) => u64::from(length),
                        Err(EsError::Eof) => return Err(segment_past_eof(m, pos - 2)),
                        Err(e) => return Err(e),
                    };
                    if length < 2 {
                        return Err(EsError::InvalidData(format!(
                            "JPEG: 标记 {:02X} 的段长度非法, length={}, offset={}",
                            m,
                            length,
                            pos - 2
                        )));
                    }
                    let segment_end = pos + length;
                    if size.is_some_and(|size| segment_end > size) {
                        return Err(segment_past_eof(m, pos - 2));
                    }
                    io.skip((length - 2) as usize)?;
                    pos = segment_end;
                }
                _ => {}
            }
        }

        self.frames_read += 1;
        log::debug!(
            "JPEG: 帧 #{}, range=[{}, {}), size={}",
            self.frames_read,
            start,
            pos,
            pos - start
        );
        Ok(Some(ByteRange { start, end: pos }))
    }
}

impl Default for JpegDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

/// 向后扫描到下一个 0xFF 并越过它, 到达文件末尾时返回 false
fn skip_to_marker_prefix(io: &mut IoContext, pos: &mut u64) -> EsResult<bool> {
    loop {
        let chunk = io.fill_buf()?;
        if chunk.is_empty() {
            return Ok(false);
        }
        match chunk.iter().position(|&b| b == 0xFF) {
            Some(i) => {
                io.consume(i + 1);
                *pos += (i + 1) as u64;
                return Ok(true);
            }
            None => {
                let n = chunk.len();
                io.consume(n);
                *pos += n as u64;
            }
        }
    }
}

fn next_byte(io: &mut IoContext, pos: &mut u64) -> EsResult<Option<u8>> {
    let Some(&byte) = io.fill_buf()?.first() else {
        return Ok(None);
    };
    io.consume(1);
    *pos += 1;
    Ok(Some(byte))
}

fn segment_past_eof(marker: u8, offset: u64) -> EsError {
    EsError::InvalidData(format!(
        "JPEG: 标记 {:02X} 的段越过文件末尾, offset={}",
        marker, offset
    ))
}

impl Demuxer for JpegDemuxer {
    fn format_id(&self) -> FormatId {
        FormatId::Jpeg
    }

    fn name(&self) -> &str {
        "mjpeg"
    }

    fn read_frame(&mut self, io: &mut IoContext) -> EsResult<Option<ByteRange>> {
        self.read_jpeg_frame(io)
    }

    fn frames_read(&self) -> u64 {
        self.frames_read
    }
}

/// JPEG 格式探测器 (`FF D8 FF`)
pub struct JpegProbe;

impl FormatProbe for JpegProbe {
    fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeScore> {
        if data.len() >= 3 && data[..2] == SOI && data[2] == 0xFF {
            return Some(SCORE_MAX);
        }
        extension_score(FormatId::Jpeg, filename)
    }

    fn format_id(&self) -> FormatId {
        FormatId::Jpeg
    }
}
