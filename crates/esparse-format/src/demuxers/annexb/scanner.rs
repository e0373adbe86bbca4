//! 基于文件游标的 Annex B 起始码扫描.

use esparse_core::EsResult;

use crate::io::IoContext;

/// 起始码前导 0 的最大计数, 更长的 0 串属于上一个单元的尾部填充
const MAX_LEADING_ZEROS: usize = 3;

/// 一个起始码的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartCode {
    /// 起始码第一个 0 字节的文件偏移
    pub offset: u64,
    /// 前导 0 的个数 (2 或 3)
    pub zero_count: usize,
}

impl StartCode {
    /// NAL 头部第一个字节的文件偏移
    pub fn nal_offset(&self) -> u64 {
        self.offset + self.zero_count as u64 + 1
    }
}

/// 从当前游标位置向后查找下一个起始码 (`00 00 01` 或 `00 00 00 01`)
///
/// 找到时游标停在 NAL 头部第一个字节 (`nal_offset()`).
/// 返回 `Ok(None)` 时游标位于文件末尾.
pub fn find_next_start_code(io: &mut IoContext) -> EsResult<Option<StartCode>> {
    let mut pos = io.position()?;
    let mut zeros = 0usize;

    loop {
        let chunk = io.fill_buf()?;
        if chunk.is_empty() {
            return Ok(None);
        }

        let mut consumed = 0usize;
        let mut found = None;
        for &byte in chunk {
            consumed += 1;
            match byte {
                0x00 => zeros = (zeros + 1).min(MAX_LEADING_ZEROS),
                0x01 if zeros >= 2 => {
                    let one_at = pos + consumed as u64 - 1;
                    found = Some(StartCode {
                        offset: one_at - zeros as u64,
                        zero_count: zeros,
                    });
                    break;
                }
                _ => zeros = 0,
            }
        }

        io.consume(consumed);
        if let Some(start_code) = found {
            log::trace!(
                "起始码: offset={}, zeros={}",
                start_code.offset,
                start_code.zero_count
            );
            return Ok(Some(start_code));
        }
        pos += consumed as u64;
    }
}
