//! 送流缓冲区.
//!
//! 把分帧器给出的字节区间从文件搬到调用方持有的目标缓冲区
//! (通常是之后交给硬件解码器的 DMA 缓冲区).
//!
//! # 环形模式
//! ```text
//!  0                  after_fill       capacity
//!  ├── head ──┤            ├──── tail ────┤
//! ```
//! 区间放不进 `[after_fill, capacity)` 时拆成两段: 先写尾部, 再从 0 写头部.
//! 环形模式下 `after_fill` 始终位于 `[0, capacity)`.

use std::io::{self, SeekFrom};

use esparse_core::{EsError, EsResult};

use crate::demuxer::ByteRange;
use crate::io::IoContext;

/// 默认送流缓冲区容量 (3 MB)
pub const DEFAULT_CAPACITY: usize = 3 * 1024 * 1024;

/// 高于 1080p 时的送流缓冲区容量 (32 MB)
pub const HIGH_RES_CAPACITY: usize = 32 * 1024 * 1024;

/// 根据图像尺寸给出建议的缓冲区容量
pub fn suggested_capacity(width: u32, height: u32) -> usize {
    if u64::from(width) * u64::from(height) > 1920 * 1080 {
        HIGH_RES_CAPACITY
    } else {
        DEFAULT_CAPACITY
    }
}

/// 缓冲区写入模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferMode {
    /// 每次从偏移 0 开始写入一个完整单元
    Linear,
    /// 紧接上一次写入位置继续, 到达末尾后回绕
    Ring,
}

/// 送流缓冲区
///
/// `B` 为底层存储, 可以是 `Vec<u8>`, 也可以是映射出来的 DMA 内存切片.
pub struct StreamBuffer<B = Vec<u8>> {
    /// 底层存储 (虚拟地址)
    storage: B,
    /// 存储对应的物理地址
    phys_addr: u64,
    /// 写入模式
    mode: BufferMode,
    /// 最近一次写入的起始偏移
    before_fill: usize,
    /// 最近一次写入之后的偏移
    after_fill: usize,
    /// 最近一次写入的字节数
    last_len: usize,
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> StreamBuffer<B> {
    /// 以指定模式包装已有存储
    pub fn new(storage: B, mode: BufferMode) -> Self {
        Self {
            storage,
            phys_addr: 0,
            mode,
            before_fill: 0,
            after_fill: 0,
            last_len: 0,
        }
    }

    /// 线性模式
    pub fn linear(storage: B) -> Self {
        Self::new(storage, BufferMode::Linear)
    }

    /// 环形模式
    pub fn ring(storage: B) -> Self {
        Self::new(storage, BufferMode::Ring)
    }

    /// 设置存储对应的物理地址
    pub fn with_phys_addr(mut self, phys_addr: u64) -> Self {
        self.phys_addr = phys_addr;
        self
    }

    /// 容量 (字节)
    pub fn capacity(&self) -> usize {
        self.storage.as_ref().len()
    }

    /// 写入模式
    pub fn mode(&self) -> BufferMode {
        self.mode
    }

    /// 存储起始物理地址
    pub fn phys_addr(&self) -> u64 {
        self.phys_addr
    }

    /// 最近一次写入的起始偏移
    pub fn before_fill(&self) -> usize {
        self.before_fill
    }

    /// 最近一次写入之后的偏移
    pub fn after_fill(&self) -> usize {
        self.after_fill
    }

    /// 最近一次写入的数据在物理内存中的起始地址
    pub fn data_phys_addr(&self) -> u64 {
        self.phys_addr + self.before_fill as u64
    }

    /// 整个存储的只读视图
    pub fn as_slice(&self) -> &[u8] {
        self.storage.as_ref()
    }

    /// 清空写入位置
    pub fn reset(&mut self) {
        self.before_fill = 0;
        self.after_fill = 0;
        self.last_len = 0;
    }

    /// 把 `range` 对应的文件数据写入缓冲区
    ///
    /// 返回写入的字节数 (等于 `range.len()`), 完成后游标位于 `range.end`.
    ///
    /// # 错误
    /// - `EsError::NeedLargerBuffer`: 区间长度超过容量, 不写入任何数据, 可扩容后重试
    /// - `EsError::Io` (`UnexpectedEof`): 文件数据不足, 写入位置保持不变
    pub fn fill(&mut self, io: &mut IoContext, range: ByteRange) -> EsResult<usize> {
        let capacity = self.capacity();
        let len = usize::try_from(range.len()).map_err(|_| EsError::NeedLargerBuffer {
            required: usize::MAX,
            capacity,
        })?;
        if len > capacity {
            return Err(EsError::NeedLargerBuffer {
                required: len,
                capacity,
            });
        }

        io.seek(SeekFrom::Start(range.start))?;
        let buf = self.storage.as_mut();
        let (before, after) = match self.mode {
            BufferMode::Linear => {
                read_segment(io, &mut buf[..len])?;
                (0, len)
            }
            BufferMode::Ring => {
                let off = self.after_fill;
                if off + len < capacity {
                    read_segment(io, &mut buf[off..off + len])?;
                    (off, off + len)
                } else {
                    let head = len - (capacity - off);
                    read_segment(io, &mut buf[off..capacity])?;
                    read_segment(io, &mut buf[..head])?;
                    log::trace!(
                        "环形缓冲区回绕: tail={}, head={}",
                        capacity - off,
                        head
                    );
                    (off, head)
                }
            }
        };

        self.before_fill = before;
        self.after_fill = after;
        self.last_len = len;
        Ok(len)
    }

    /// 最近一次写入的数据, 按文件顺序分为 (尾段, 头段)
    ///
    /// 未回绕时头段为空. 两段拼接即为源区间的完整内容.
    pub fn filled_segments(&self) -> (&[u8], &[u8]) {
        let buf = self.storage.as_ref();
        let tail_end = (self.before_fill + self.last_len).min(buf.len());
        let head_len = self.last_len - (tail_end - self.before_fill);
        (&buf[self.before_fill..tail_end], &buf[..head_len])
    }
}

impl StreamBuffer<Vec<u8>> {
    /// 分配指定容量的缓冲区
    pub fn with_capacity(capacity: usize, mode: BufferMode) -> Self {
        Self::new(vec![0u8; capacity], mode)
    }

    /// 扩容到至少 `required` 字节
    ///
    /// 扩容后写入位置清零, 调用方应对同一区间重新调用 `fill`.
    pub fn grow(&mut self, required: usize) {
        if required <= self.capacity() {
            return;
        }
        log::info!(
            "送流缓冲区扩容: {} -> {} 字节",
            self.capacity(),
            required
        );
        self.storage.resize(required, 0);
        self.reset();
    }
}

/// 读满目标段, 不足时返回 `UnexpectedEof`
fn read_segment(io: &mut IoContext, dst: &mut [u8]) -> EsResult<()> {
    let n = io.read_up_to(dst)?;
    if n < dst.len() {
        return Err(EsError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("送流数据不足: 需要 {} 字节, 实际读取 {} 字节", dst.len(), n),
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(len: usize) -> IoContext {
        IoContext::from_bytes((0..len).map(|i| i as u8).collect())
    }

    #[test]
    fn test_suggested_capacity() {
        assert_eq!(suggested_capacity(1920, 1080), DEFAULT_CAPACITY);
        assert_eq!(suggested_capacity(3840, 2160), HIGH_RES_CAPACITY);
        assert_eq!(suggested_capacity(0, 0), DEFAULT_CAPACITY);
    }

    #[test]
    fn test_linear_fill() {
        let mut io = source(64);
        let mut buffer = StreamBuffer::with_capacity(16, BufferMode::Linear);
        assert_eq!(buffer.fill(&mut io, ByteRange::new(10, 20)).unwrap(), 10);
        assert_eq!(io.position().unwrap(), 20);
        assert_eq!(buffer.before_fill(), 0);
        assert_eq!(buffer.after_fill(), 10);

        buffer.fill(&mut io, ByteRange::new(30, 34)).unwrap();
        let (tail, head) = buffer.filled_segments();
        assert_eq!(tail, &[30, 31, 32, 33]);
        assert!(head.is_empty());
    }

    #[test]
    fn test_ring_fill_advances() {
        let mut io = source(64);
        let mut buffer = StreamBuffer::ring(vec![0u8; 16]).with_phys_addr(0x8000_0000);
        buffer.fill(&mut io, ByteRange::new(0, 5)).unwrap();
        buffer.fill(&mut io, ByteRange::new(5, 12)).unwrap();
        assert_eq!(buffer.before_fill(), 5);
        assert_eq!(buffer.after_fill(), 12);
        assert_eq!(buffer.data_phys_addr(), 0x8000_0005);
        assert_eq!(&buffer.as_slice()[..12], &(0..12).collect::<Vec<u8>>()[..]);
    }

    #[test]
    fn test_ring_wrap_matches_linear() {
        let mut io = source(64);
        let mut ring = StreamBuffer::with_capacity(16, BufferMode::Ring);
        ring.fill(&mut io, ByteRange::new(0, 11)).unwrap();
        ring.fill(&mut io, ByteRange::new(20, 30)).unwrap();
        assert_eq!(ring.before_fill(), 11);
        assert_eq!(ring.after_fill(), 5);

        let mut linear = StreamBuffer::with_capacity(64, BufferMode::Linear);
        linear.fill(&mut io, ByteRange::new(20, 30)).unwrap();

        let (tail, head) = ring.filled_segments();
        assert_eq!(tail.len(), 5);
        assert_eq!(head.len(), 5);
        assert_eq!([tail, head].concat(), linear.filled_segments().0);
    }

    #[test]
    fn test_ring_exact_end_wraps_to_zero() {
        let mut io = source(32);
        let mut ring = StreamBuffer::with_capacity(8, BufferMode::Ring);
        ring.fill(&mut io, ByteRange::new(0, 3)).unwrap();
        ring.fill(&mut io, ByteRange::new(3, 8)).unwrap();
        assert_eq!(ring.after_fill(), 0);
        let (tail, head) = ring.filled_segments();
        assert_eq!(tail, &[3, 4, 5, 6, 7]);
        assert!(head.is_empty());
    }

    #[test]
    fn test_capacity_exceeded_no_writes() {
        let mut io = source(64);
        let mut buffer = StreamBuffer::ring(vec![0xAAu8; 8]);
        let err = buffer
            .fill(&mut io, ByteRange::new(0, 9))
            .expect_err("超出容量应返回错误");
        assert!(err.is_retryable());
        assert!(matches!(
            err,
            EsError::NeedLargerBuffer {
                required: 9,
                capacity: 8
            }
        ));
        assert!(buffer.as_slice().iter().all(|&b| b == 0xAA));
        assert_eq!(buffer.after_fill(), 0);
    }

    #[test]
    fn test_short_read_keeps_cursors() {
        let mut io = source(16);
        let mut buffer = StreamBuffer::with_capacity(32, BufferMode::Ring);
        buffer.fill(&mut io, ByteRange::new(0, 4)).unwrap();
        let err = buffer
            .fill(&mut io, ByteRange::new(10, 20))
            .expect_err("文件数据不足应返回错误");
        match err {
            EsError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("应为 I/O 错误, actual={other:?}"),
        }
        assert_eq!(buffer.before_fill(), 0);
        assert_eq!(buffer.after_fill(), 4);
    }

    #[test]
    fn test_grow_then_retry() {
        let mut io = source(64);
        let mut buffer = StreamBuffer::with_capacity(4, BufferMode::Linear);
        let range = ByteRange::new(8, 40);
        let required = match buffer.fill(&mut io, range) {
            Err(EsError::NeedLargerBuffer { required, .. }) => required,
            other => panic!("应提示扩容, actual={other:?}"),
        };
        buffer.grow(required);
        assert_eq!(buffer.capacity(), 32);
        assert_eq!(buffer.fill(&mut io, range).unwrap(), 32);
        assert_eq!(buffer.filled_segments().0[0], 8);
    }
}
