//! 分帧器 (Demuxer) trait 定义.
//!
//! 分帧器从裸流中逐个切出可独立送解码器的单元 (H.264/H.265 访问单元,
//! 或一张完整的 JPEG 图像), 只给出字节区间, 不复制数据.
//! 数据的搬运由 [`crate::StreamBuffer`] 完成.

use std::fmt;

use esparse_core::EsResult;

use crate::format_id::FormatId;
use crate::io::IoContext;

/// 半开字节区间 `[start, end)`, 以文件绝对偏移表示
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    /// 起始偏移 (含)
    pub start: u64,
    /// 结束偏移 (不含)
    pub end: u64,
}

impl ByteRange {
    /// 创建字节区间
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// 区间长度 (字节)
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// 区间是否为空
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// 分帧器 trait
///
/// 使用流程:
/// 1. 通过 `FormatRegistry::open_input()` 或具体类型的构造函数创建
/// 2. 循环调用 `read_frame()` 直到返回 `Ok(None)`
/// 3. 每得到一个区间, 调用 `StreamBuffer::fill()` 把数据搬到送流缓冲区
pub trait Demuxer: Send {
    /// 获取格式标识
    fn format_id(&self) -> FormatId;

    /// 获取格式名称
    fn name(&self) -> &str;

    /// 读取下一个帧的字节区间
    ///
    /// # 返回
    /// - `Ok(Some(range))`: 下一个完整帧, 游标已位于 `range.end`
    /// - `Ok(None)`: 已到达流末尾, 重复调用结果不变
    fn read_frame(&mut self, io: &mut IoContext) -> EsResult<Option<ByteRange>>;

    /// 已输出的帧数
    fn frames_read(&self) -> u64;
}
