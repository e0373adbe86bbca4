//! Annex B 分帧集成测试
//!
//! 码流写入真实的临时文件, 通过文件游标逐个切出访问单元.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use esparse::core::EsError;
use esparse::format::{AnnexBDemuxer, ByteRange, Demuxer, FormatId, IoContext};

const SC4: [u8; 4] = [0x00, 0x00, 0x00, 0x01];
const SC3: [u8; 3] = [0x00, 0x00, 0x01];

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 追加一个 NAL, 返回其起始码的偏移
fn push_nal(out: &mut Vec<u8>, start_code: &[u8], payload: &[u8]) -> u64 {
    let offset = out.len() as u64;
    out.extend_from_slice(start_code);
    out.extend_from_slice(payload);
    offset
}

fn write_temp(dir: &tempfile::TempDir, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, data).expect("写入临时文件失败");
    path
}

fn read_all(demuxer: &mut AnnexBDemuxer, io: &mut IoContext) -> Vec<ByteRange> {
    let mut ranges = Vec::new();
    while let Some(range) = demuxer.read_access_unit(io).expect("分帧失败") {
        ranges.push(range);
    }
    ranges
}

// ============================================================
// H.264
// ============================================================

#[test]
fn test_single_idr_starts_at_leading_zero() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    for prefix in [&[][..], &[0x11, 0x22, 0x33][..], &[0x7F][..]] {
        let mut data = prefix.to_vec();
        let start = push_nal(&mut data, &SC4, &[0x65, 0x88, 0x84, 0x00, 0x21, 0xFF]);
        let path = write_temp(&dir, "idr.264", &data);

        let mut io = IoContext::open_read(&path).unwrap();
        let mut demuxer = AnnexBDemuxer::h264();
        let range = demuxer
            .read_access_unit(&mut io)
            .unwrap()
            .expect("应读到一个访问单元");
        assert_eq!(range.start, start, "区间应从起始码的首个 0 字节开始");
        assert_eq!(range.end, data.len() as u64);
    }
}

#[test]
fn test_end_of_stream_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let mut data = Vec::new();
    push_nal(&mut data, &SC4, &[0x67, 0x42, 0xC0, 0x1E]);
    push_nal(&mut data, &SC4, &[0x65, 0x88, 0x84]);
    push_nal(&mut data, &SC3, &[0x41, 0x9A, 0x02]);
    let path = write_temp(&dir, "two.264", &data);

    let mut io = IoContext::open_read(&path).unwrap();
    let mut demuxer = AnnexBDemuxer::h264();
    assert_eq!(read_all(&mut demuxer, &mut io).len(), 2);
    for _ in 0..3 {
        assert!(
            demuxer.read_access_unit(&mut io).unwrap().is_none(),
            "流结束后应持续返回 None"
        );
    }
    assert_eq!(io.position().unwrap(), data.len() as u64);
}

#[test]
fn test_parameter_sets_attach_to_following_picture() {
    let dir = tempfile::tempdir().unwrap();
    let mut data = Vec::new();
    let sps1 = push_nal(&mut data, &SC4, &[0x67, 0x42, 0xC0, 0x1E, 0xDA]);
    push_nal(&mut data, &SC4, &[0x68, 0xCE, 0x3C, 0x80]);
    push_nal(&mut data, &SC4, &[0x65, 0x88, 0x84, 0x00]);
    push_nal(&mut data, &SC3, &[0x41, 0x40, 0x11, 0x22]);
    let sps2 = push_nal(&mut data, &SC4, &[0x67, 0x42, 0xC0, 0x1E, 0xDA]);
    push_nal(&mut data, &SC4, &[0x68, 0xCE, 0x3C, 0x80]);
    push_nal(&mut data, &SC4, &[0x65, 0xB8, 0x00, 0x04]);
    let path = write_temp(&dir, "gop.264", &data);

    let mut io = IoContext::open_read(&path).unwrap();
    let mut demuxer = AnnexBDemuxer::h264();
    let first = demuxer.read_access_unit(&mut io).unwrap().unwrap();
    let second = demuxer.read_access_unit(&mut io).unwrap().unwrap();
    assert!(demuxer.read_access_unit(&mut io).unwrap().is_none());

    assert_eq!(first, ByteRange::new(sps1, sps2));
    assert_eq!(second, ByteRange::new(sps2, data.len() as u64));
}

#[test]
fn test_units_cover_whole_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut data = Vec::new();
    push_nal(&mut data, &SC4, &[0x09, 0xF0]); // AUD
    push_nal(&mut data, &SC4, &[0x67, 0x64, 0x00, 0x28]);
    push_nal(&mut data, &SC4, &[0x68, 0xEE, 0x3C, 0xB0]);
    push_nal(&mut data, &SC4, &[0x06, 0x05, 0x10, 0x80]); // SEI
    push_nal(&mut data, &SC4, &[0x65, 0x88, 0x80, 0x10]);
    for i in 0..20u8 {
        push_nal(&mut data, &SC4, &[0x09, 0xF0]);
        // 每帧两个切片: 第二个 first_mb_in_slice != 0
        push_nal(&mut data, &SC3, &[0x41, 0x9A, i, 0x00, 0x00, 0x00, 0x00]);
        push_nal(&mut data, &SC3, &[0x41, 0x30, i]);
    }
    let path = write_temp(&dir, "stream.264", &data);

    let mut io = IoContext::open_read(&path).unwrap();
    let mut demuxer = AnnexBDemuxer::h264();
    let ranges = read_all(&mut demuxer, &mut io);
    assert_eq!(ranges.len(), 21);
    assert_eq!(ranges[0].start, 0);
    for pair in ranges.windows(2) {
        assert_eq!(pair[0].end, pair[1].start, "相邻访问单元应首尾相接");
    }
    assert_eq!(ranges[20].end, data.len() as u64);
    assert_eq!(demuxer.frames_read(), 21);
}

#[test]
fn test_garbage_without_start_code_is_format_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_temp(&dir, "junk.264", &[0x12, 0x34, 0x56, 0x00, 0x00, 0x02]);
    let mut io = IoContext::open_read(&path).unwrap();
    let err = AnnexBDemuxer::h264()
        .read_access_unit(&mut io)
        .expect_err("没有起始码应返回错误");
    assert!(err.is_format_error());
    assert!(!err.is_retryable());
}

#[test]
fn test_header_cut_at_eof_closes_last_unit() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let mut data = Vec::new();
    push_nal(&mut data, &SC4, &[0x65, 0x88, 0x84, 0x10]);
    let second = push_nal(&mut data, &SC4, &[0x41, 0x9A, 0x02]);
    push_nal(&mut data, &SC4, &[]); // 写入被中断, 只剩起始码
    let total = data.len() as u64;
    let path = write_temp(&dir, "cut.264", &data);
    let mut io = IoContext::open_read(&path).unwrap();
    let mut demuxer = AnnexBDemuxer::h264();
    let ranges = read_all(&mut demuxer, &mut io);
    assert_eq!(
        ranges,
        vec![ByteRange::new(0, second), ByteRange::new(second, total)]
    );
    assert!(demuxer.read_access_unit(&mut io).unwrap().is_none());
}

// ============================================================
// H.265 / 注册表 / 取消
// ============================================================

#[test]
fn test_h265_open_input_via_registry() {
    let dir = tempfile::tempdir().unwrap();
    let mut data = Vec::new();
    push_nal(&mut data, &SC4, &[0x40, 0x01, 0x0C, 0x01, 0xFF]); // VPS
    push_nal(&mut data, &SC4, &[0x42, 0x01, 0x01, 0x01, 0x60]); // SPS
    push_nal(&mut data, &SC4, &[0x44, 0x01, 0xC1, 0x72, 0xB4]); // PPS
    push_nal(&mut data, &SC4, &[0x4E, 0x01, 0x05, 0x1A]); // PREFIX_SEI
    push_nal(&mut data, &SC4, &[0x26, 0x01, 0xAF, 0x08, 0x40]); // IDR
    let p1 = push_nal(&mut data, &SC4, &[0x02, 0x01, 0xD0, 0x12]); // TRAIL_R
    let p2 = push_nal(&mut data, &SC4, &[0x02, 0x01, 0xD2, 0x34]);
    let path = write_temp(&dir, "clip.bin", &data);

    let registry = esparse::default_format_registry();
    let mut io = IoContext::open_read(&path).unwrap();
    let result = registry.probe_input(&mut io, path.to_str()).unwrap();
    assert_eq!(result.format_id, FormatId::H265Es);

    let mut demuxer = registry.open_input(&mut io, path.to_str()).unwrap();
    assert_eq!(demuxer.name(), "hevc");
    let mut ranges = Vec::new();
    while let Some(range) = demuxer.read_frame(&mut io).unwrap() {
        ranges.push(range);
    }
    assert_eq!(
        ranges,
        vec![
            ByteRange::new(0, p1),
            ByteRange::new(p1, p2),
            ByteRange::new(p2, data.len() as u64)
        ]
    );
}

#[test]
fn test_cancel_from_other_thread() {
    let dir = tempfile::tempdir().unwrap();
    let mut data = Vec::new();
    for _ in 0..1000 {
        push_nal(&mut data, &SC4, &[0x41, 0x9A, 0x00]);
    }
    let path = write_temp(&dir, "long.264", &data);

    let flag = Arc::new(AtomicBool::new(false));
    let mut io = IoContext::open_read(&path).unwrap();
    let mut demuxer = AnnexBDemuxer::h264().with_cancel_flag(Arc::clone(&flag));

    let worker = std::thread::spawn(move || {
        let mut count = 0u32;
        loop {
            match demuxer.read_access_unit(&mut io) {
                Ok(Some(_)) => count += 1,
                Ok(None) => return Ok(count),
                Err(e) => return Err((count, e)),
            }
            if count == 10 {
                flag.store(true, Ordering::Relaxed);
            }
        }
    });

    let (count, err) = worker
        .join()
        .unwrap()
        .expect_err("设置取消标志后应返回错误");
    assert_eq!(count, 10);
    assert!(matches!(err, EsError::Cancelled));
}

#[test]
fn test_version() {
    assert!(!esparse::version().is_empty());
}
