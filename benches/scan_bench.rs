//! esparse 性能基准测试.
//!
//! 覆盖起始码扫描、访问单元切分、JPEG 分帧和环形缓冲区写入.

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use esparse::codec::parsers::find_start_code;
use esparse::format::demuxers::annexb::find_next_start_code;
use esparse::format::{AnnexBDemuxer, BufferMode, IoContext, JpegDemuxer, StreamBuffer};

/// 构造 H.264 码流: SPS/PPS + IDR + (frames - 1) 个 P 帧, 每帧 `frame_size` 字节载荷
fn make_h264_stream(frames: usize, frame_size: usize) -> Vec<u8> {
    let mut data = vec![
        0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0xC0, 0x1E, 0x00, 0x00, 0x00, 0x01, 0x68, 0xCE, 0x3C,
        0x80,
    ];
    for i in 0..frames {
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
        data.push(if i == 0 { 0x65 } else { 0x41 });
        data.push(0x9A);
        data.extend((0..frame_size).map(|j| ((i * 7 + j) % 251) as u8 | 0x02));
    }
    data
}

/// 构造 MJPEG 码流
fn make_mjpeg_stream(frames: usize, frame_size: usize) -> Vec<u8> {
    let mut data = Vec::new();
    for i in 0..frames {
        data.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xE1, 0x00, 0x04, 0x00, 0x00]);
        data.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x02]);
        data.extend((0..frame_size).map(|j| ((i + j) % 0x7F) as u8));
        data.extend_from_slice(&[0xFF, 0xD9]);
    }
    data
}

fn bench_find_start_code_slice(c: &mut Criterion) {
    let data = make_h264_stream(1, 1 << 20);
    let mut group = c.benchmark_group("find_start_code");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("slice_1mb", |b| {
        b.iter(|| find_start_code(black_box(&data[20..])));
    });
    group.finish();
}

fn bench_scan_io(c: &mut Criterion) {
    let data = make_h264_stream(64, 16 * 1024);
    let mut group = c.benchmark_group("annexb");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("scan_start_codes_1mb", |b| {
        b.iter(|| {
            let mut io = IoContext::from_bytes(data.clone());
            let mut count = 0;
            while find_next_start_code(&mut io).unwrap().is_some() {
                count += 1;
            }
            black_box(count)
        });
    });
    group.bench_function("read_access_units_1mb", |b| {
        b.iter(|| {
            let mut io = IoContext::from_bytes(data.clone());
            let mut demuxer = AnnexBDemuxer::h264();
            let mut count = 0;
            while demuxer.read_access_unit(&mut io).unwrap().is_some() {
                count += 1;
            }
            black_box(count)
        });
    });
    group.bench_function("read_and_fill_ring_1mb", |b| {
        b.iter(|| {
            let mut io = IoContext::from_bytes(data.clone());
            let mut demuxer = AnnexBDemuxer::h264();
            let mut buffer = StreamBuffer::with_capacity(100 * 1024, BufferMode::Ring);
            while let Some(range) = demuxer.read_access_unit(&mut io).unwrap() {
                buffer.fill(&mut io, range).unwrap();
            }
            black_box(buffer.after_fill())
        });
    });
    group.finish();
}

fn bench_jpeg(c: &mut Criterion) {
    let data = make_mjpeg_stream(32, 32 * 1024);
    let mut group = c.benchmark_group("jpeg");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("read_jpeg_frames_1mb", |b| {
        b.iter(|| {
            let mut io = IoContext::from_bytes(data.clone());
            let mut demuxer = JpegDemuxer::new();
            let mut count = 0;
            while demuxer.read_jpeg_frame(&mut io).unwrap().is_some() {
                count += 1;
            }
            black_box(count)
        });
    });
    group.finish();
}

criterion_group!(benches, bench_find_start_code_slice, bench_scan_io, bench_jpeg);
criterion_main!(benches);
