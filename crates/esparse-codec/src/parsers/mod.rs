//! 码流解析工具.
//!
//! 本模块只处理内存中的字节切片. 基于文件游标的流式分帧见 `esparse-format`.

pub mod h264;
pub mod h265;

/// 在字节切片中查找第一个 Annex B 起始码
///
/// 同一位置优先匹配 4 字节形式 (`00 00 00 01`).
///
/// # 返回
/// - `Some((offset, zero_count))`: `offset` 为起始码第一个 0 字节的位置,
///   `zero_count` 为前导 0 的个数 (2 或 3)
/// - `None`: 未找到
pub fn find_start_code(data: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i + 2 < data.len() {
        if data[i] == 0 && data[i + 1] == 0 {
            if i + 3 < data.len() && data[i + 2] == 0 && data[i + 3] == 1 {
                return Some((i, 3));
            }
            if data[i + 2] == 1 {
                return Some((i, 2));
            }
        }
        i += 1;
    }
    None
}

/// 移除 emulation prevention 字节 (`00 00 03` 中的 `03`)
///
/// 得到参数集解析所需的 RBSP 数据.
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0usize;
    for &b in data {
        if zeros >= 2 && b == 0x03 {
            zeros = 0;
            continue;
        }
        if b == 0 {
            zeros += 1;
        } else {
            zeros = 0;
        }
        out.push(b);
    }
    out
}
