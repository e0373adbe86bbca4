//! I/O 抽象层.
//!
//! 为分帧器提供带缓冲的只读游标. 起始码扫描通过 `fill_buf`/`consume`
//! 直接遍历内部缓冲区, 不会每字节一次系统调用; NAL 头部判定通过
//! `peek_at` 做局部预读, 不改变游标位置.

use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use esparse_core::{EsError, EsResult};

/// I/O 上下文
///
/// 封装底层 I/O 操作, 为分帧器和送流缓冲区提供统一的读取接口.
/// 一个输入文件对应一个上下文, 由单个送流循环独占.
pub struct IoContext {
    /// 内部 I/O 实现
    inner: Box<dyn IoBackend>,
    /// 读缓冲区
    buffer: Vec<u8>,
    /// 缓冲区中的有效数据长度
    buf_len: usize,
    /// 缓冲区当前读取位置
    buf_pos: usize,
}

/// I/O 后端 trait
///
/// 实现此 trait 以支持不同的数据来源 (文件、内存等). 必须可随机访问.
pub trait IoBackend: Send {
    /// 读取数据到缓冲区
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// 定位 (seek)
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;
    /// 获取当前位置
    fn position(&mut self) -> io::Result<u64>;
    /// 获取总大小 (如果可知)
    fn size(&self) -> Option<u64>;
}

/// 默认缓冲区大小 (32 KB)
const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

impl IoContext {
    /// 从 I/O 后端创建上下文
    pub fn new(backend: Box<dyn IoBackend>) -> Self {
        Self::with_buffer_size(backend, DEFAULT_BUFFER_SIZE)
    }

    /// 指定读缓冲区大小创建上下文 (最小 16 字节)
    pub fn with_buffer_size(backend: Box<dyn IoBackend>, buffer_size: usize) -> Self {
        Self {
            inner: backend,
            buffer: vec![0u8; buffer_size.max(16)],
            buf_len: 0,
            buf_pos: 0,
        }
    }

    /// 从文件路径打开 (只读)
    pub fn open_read(path: impl AsRef<Path>) -> EsResult<Self> {
        let file = std::fs::File::open(path)?;
        Ok(Self::new(Box::new(FileBackend::new(file))))
    }

    /// 从内存数据创建
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self::new(Box::new(MemoryBackend::from_data(data)))
    }

    // ========================
    // 缓冲区访问
    // ========================

    /// 返回缓冲区中尚未消耗的数据, 为空时从后端补充
    ///
    /// 返回空切片表示已到达文件末尾.
    pub fn fill_buf(&mut self) -> EsResult<&[u8]> {
        if self.buf_pos >= self.buf_len {
            self.buf_pos = 0;
            self.buf_len = self.inner.read(&mut self.buffer)?;
        }
        Ok(&self.buffer[self.buf_pos..self.buf_len])
    }

    /// 标记 `fill_buf` 返回的数据中前 `count` 字节已消耗
    pub fn consume(&mut self, count: usize) {
        self.buf_pos = (self.buf_pos + count).min(self.buf_len);
    }

    // ========================
    // 读取方法
    // ========================

    /// 尽量读满 `buf`, 返回实际读取的字节数
    ///
    /// 只有到达文件末尾时返回值才会小于 `buf.len()`.
    pub fn read_up_to(&mut self, buf: &mut [u8]) -> EsResult<usize> {
        let mut total_read = 0;
        while total_read < buf.len() {
            let buffered = self.buf_len - self.buf_pos;
            if buffered > 0 {
                let to_copy = buffered.min(buf.len() - total_read);
                buf[total_read..total_read + to_copy]
                    .copy_from_slice(&self.buffer[self.buf_pos..self.buf_pos + to_copy]);
                self.buf_pos += to_copy;
                total_read += to_copy;
            } else if buf.len() - total_read >= self.buffer.len() {
                // 大块读取绕过内部缓冲区, 旧窗口随之失效
                self.buf_pos = 0;
                self.buf_len = 0;
                let n = self.inner.read(&mut buf[total_read..])?;
                if n == 0 {
                    break;
                }
                total_read += n;
            } else {
                self.buf_pos = 0;
                self.buf_len = self.inner.read(&mut self.buffer)?;
                if self.buf_len == 0 {
                    break;
                }
            }
        }
        Ok(total_read)
    }

    /// 读取指定字节数, 不足时返回 `EsError::Eof`
    pub fn read_exact(&mut self, buf: &mut [u8]) -> EsResult<()> {
        if self.read_up_to(buf)? < buf.len() {
            return Err(EsError::Eof);
        }
        Ok(())
    }

    /// 读取 1 个字节
    pub fn read_u8(&mut self) -> EsResult<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    /// 读取 u16 大端
    pub fn read_u16_be(&mut self) -> EsResult<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(BigEndian::read_u16(&buf))
    }

    /// 跳过指定字节数
    pub fn skip(&mut self, count: usize) -> EsResult<()> {
        // 先尝试消耗缓冲区中的数据
        let buffered = self.buf_len - self.buf_pos;
        if count <= buffered {
            self.buf_pos += count;
            return Ok(());
        }

        let remaining = count - buffered;
        self.buf_pos = 0;
        self.buf_len = 0;
        self.inner.seek(SeekFrom::Current(remaining as i64))?;
        Ok(())
    }

    /// 在绝对偏移 `offset` 处预读最多 `buf.len()` 字节, 不改变游标位置
    ///
    /// 目标区间落在读缓冲区内时直接复制, 否则临时 seek 后恢复原位置.
    /// 返回实际读取的字节数 (到达文件末尾时可能小于 `buf.len()`).
    pub fn peek_at(&mut self, offset: u64, buf: &mut [u8]) -> EsResult<usize> {
        let raw_pos = self.inner.position()?;
        let window_start = raw_pos - self.buf_len as u64;
        if offset >= window_start && offset + buf.len() as u64 <= raw_pos {
            let from = (offset - window_start) as usize;
            buf.copy_from_slice(&self.buffer[from..from + buf.len()]);
            return Ok(buf.len());
        }

        let saved = raw_pos - (self.buf_len - self.buf_pos) as u64;
        self.seek(SeekFrom::Start(offset))?;
        let result = self.read_up_to(buf);
        self.seek(SeekFrom::Start(saved))?;
        result
    }

    // ========================
    // 定位方法
    // ========================

    /// 定位 (seek)
    ///
    /// 注意: seek 会清空读缓冲区.
    pub fn seek(&mut self, pos: SeekFrom) -> EsResult<u64> {
        self.buf_pos = 0;
        self.buf_len = 0;
        Ok(self.inner.seek(pos)?)
    }

    /// 获取当前位置
    ///
    /// 考虑读缓冲区中尚未消耗的数据量.
    pub fn position(&mut self) -> EsResult<u64> {
        let raw_pos = self.inner.position()?;
        let buffered = (self.buf_len - self.buf_pos) as u64;
        Ok(raw_pos - buffered)
    }

    /// 获取总大小
    pub fn size(&self) -> Option<u64> {
        self.inner.size()
    }

    /// 游标是否位于文件末尾
    pub fn is_eof(&mut self) -> EsResult<bool> {
        if self.buf_pos < self.buf_len {
            return Ok(false);
        }
        match self.size() {
            Some(size) => Ok(self.position()? >= size),
            None => Ok(self.fill_buf()?.is_empty()),
        }
    }
}

/// 文件 I/O 后端
struct FileBackend {
    file: std::fs::File,
    size: Option<u64>,
}

impl FileBackend {
    fn new(file: std::fs::File) -> Self {
        let size = file.metadata().ok().map(|m| m.len());
        Self { file, size }
    }
}

impl IoBackend for FileBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }

    fn position(&mut self) -> io::Result<u64> {
        self.file.stream_position()
    }

    fn size(&self) -> Option<u64> {
        self.size
    }
}

/// 内存缓冲区 I/O 后端
///
/// 用于测试和内存中处理.
pub struct MemoryBackend {
    /// 数据缓冲区
    data: Vec<u8>,
    /// 当前位置
    pos: usize,
}

impl MemoryBackend {
    /// 从已有数据创建
    pub fn from_data(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }
}

impl IoBackend for MemoryBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.data.len().saturating_sub(self.pos);
        let to_read = buf.len().min(available);
        if to_read == 0 {
            return Ok(0);
        }
        buf[..to_read].copy_from_slice(&self.data[self.pos..self.pos + to_read]);
        self.pos += to_read;
        Ok(to_read)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(offset) => self.data.len() as i64 + offset,
            SeekFrom::Current(offset) => self.pos as i64 + offset,
        };
        if new_pos < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek 位置不能为负",
            ));
        }
        self.pos = new_pos as usize;
        Ok(self.pos as u64)
    }

    fn position(&mut self) -> io::Result<u64> {
        Ok(self.pos as u64)
    }

    fn size(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }
}
