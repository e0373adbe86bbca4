//! 送流缓冲区集成测试
//!
//! 访问单元从真实文件切出后写入线性/环形缓冲区.

use esparse::core::EsError;
use esparse::format::{AnnexBDemuxer, BufferMode, ByteRange, IoContext, StreamBuffer};

/// 构造 n 帧的 H.264 码流, 每帧大小不同
fn build_stream(frames: usize) -> Vec<u8> {
    let mut data = vec![0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0xC0, 0x1E];
    data.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, 0x68, 0xCE, 0x3C, 0x80]);
    for i in 0..frames {
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
        data.push(if i == 0 { 0x65 } else { 0x41 });
        data.push(0x9A);
        for j in 0..(7 + i * 5) {
            data.push(((i + j) % 200) as u8 + 2);
        }
    }
    data
}

fn open_temp(data: &[u8]) -> (tempfile::NamedTempFile, IoContext) {
    use std::io::Write;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(data).unwrap();
    file.flush().unwrap();
    let io = IoContext::open_read(file.path()).unwrap();
    (file, io)
}

#[test]
fn test_ring_wrap_matches_linear_fill() {
    let data = build_stream(12);
    let (_file, mut io) = open_temp(&data);
    let mut demuxer = AnnexBDemuxer::h264();

    let mut ring = StreamBuffer::with_capacity(100, BufferMode::Ring);
    let mut linear = StreamBuffer::with_capacity(1024, BufferMode::Linear);
    let mut wraps = 0;
    while let Some(range) = demuxer.read_access_unit(&mut io).unwrap() {
        let written = ring.fill(&mut io, range).unwrap();
        assert_eq!(written as u64, range.len());
        assert!(ring.after_fill() < ring.capacity(), "环形写入位置应小于容量");
        linear.fill(&mut io, range).unwrap();

        let (tail, head) = ring.filled_segments();
        if !head.is_empty() {
            wraps += 1;
        }
        assert_eq!([tail, head].concat(), linear.filled_segments().0);
        // 恢复游标到区间末尾再继续分帧
        assert_eq!(io.position().unwrap(), range.end);
    }
    assert!(wraps > 0, "容量 100 的环形缓冲区应发生回绕");
}

#[test]
fn test_capacity_exceeded_performs_no_writes() {
    let data = build_stream(1);
    let (_file, mut io) = open_temp(&data);
    let range = AnnexBDemuxer::h264()
        .read_access_unit(&mut io)
        .unwrap()
        .unwrap();

    let capacity = range.len() as usize - 1;
    let mut storage = vec![0x5Au8; capacity];
    let mut buffer = StreamBuffer::ring(&mut storage[..]).with_phys_addr(0x4000_0000);
    let err = buffer.fill(&mut io, range).expect_err("超出容量应返回错误");
    assert!(err.is_retryable());
    match err {
        EsError::NeedLargerBuffer { required, capacity: cap } => {
            assert_eq!(required as u64, range.len());
            assert_eq!(cap, capacity);
        }
        other => panic!("应为 NeedLargerBuffer, actual={other:?}"),
    }
    assert_eq!(buffer.after_fill(), 0);
    drop(buffer);
    assert!(storage.iter().all(|&b| b == 0x5A), "目标缓冲区不应被写入");
}

#[test]
fn test_grow_and_retry_same_range() {
    let data = build_stream(3);
    let (_file, mut io) = open_temp(&data);
    let mut demuxer = AnnexBDemuxer::h264();
    let mut buffer = StreamBuffer::with_capacity(16, BufferMode::Linear);

    let mut total = 0u64;
    while let Some(range) = demuxer.read_access_unit(&mut io).unwrap() {
        match buffer.fill(&mut io, range) {
            Ok(_) => {}
            Err(EsError::NeedLargerBuffer { required, .. }) => {
                buffer.grow(required);
                buffer.fill(&mut io, range).unwrap();
            }
            Err(e) => panic!("写入失败: {e}"),
        }
        assert_eq!(
            buffer.filled_segments().0,
            &data[range.start as usize..range.end as usize]
        );
        total += range.len();
    }
    assert_eq!(total, data.len() as u64);
}

#[test]
fn test_range_past_eof_is_io_error() {
    let data = build_stream(1);
    let (_file, mut io) = open_temp(&data);
    let mut buffer = StreamBuffer::with_capacity(1024, BufferMode::Ring);
    let range = ByteRange::new(0, data.len() as u64 + 10);
    let err = buffer.fill(&mut io, range).expect_err("越过文件末尾应返回错误");
    match err {
        EsError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
        other => panic!("应为 I/O 错误, actual={other:?}"),
    }
    assert_eq!(buffer.after_fill(), 0);
}
