//! esparse-probe - 裸流分帧探测工具
//!
//! 识别输入文件格式, 逐帧切分并写入送流缓冲区, 模拟向硬件解码器送流的过程,
//! 最后输出每帧的偏移/大小统计. 可选把每一帧单独保存成文件.

mod logging;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use bytes::BytesMut;
use clap::Parser;
use serde::Serialize;

use esparse_codec::parsers::h264::{SpsSummary, find_sps_summary};
use esparse_core::EsError;
use esparse_format::{
    BufferMode, ByteRange, Demuxer, FormatId, FormatRegistry, IoContext, StreamBuffer,
    suggested_capacity,
};

/// 读取 SPS 时预读的文件头部字节数
const SPS_SEARCH_SIZE: usize = 64 * 1024;

/// esparse 裸流分帧探测工具
#[derive(Parser, Debug)]
#[command(name = "esparse-probe", version, about = "H.264/H.265/MJPEG 裸流分帧探测工具")]
struct Cli {
    /// 输入文件路径
    input: PathBuf,

    /// 强制指定格式 (h264 / hevc / mjpeg), 默认自动探测
    #[arg(short, long)]
    format: Option<String>,

    /// 送流缓冲区容量 (字节), 默认根据分辨率选择
    #[arg(long)]
    buffer_size: Option<usize>,

    /// 使用环形缓冲区模式
    #[arg(long)]
    ring: bool,

    /// 帧超过缓冲区容量时自动扩容并重试
    #[arg(long)]
    auto_grow: bool,

    /// 输出 JSON 格式
    #[arg(long)]
    json: bool,

    /// 列出每一帧的信息
    #[arg(long)]
    show_frames: bool,

    /// 把每一帧保存到该目录 (frame_<n>.<ext>)
    #[arg(long)]
    dump_dir: Option<PathBuf>,

    /// 日志目录
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// 日志详细程度 (-v / -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

// ============================================================
// JSON 输出结构体
// ============================================================

/// 完整探测结果
#[derive(Serialize)]
struct ProbeOutput {
    format: FormatInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<StreamInfo>,
    summary: FrameSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    frames: Option<Vec<FrameInfo>>,
}

/// 格式信息
#[derive(Serialize)]
struct FormatInfo {
    filename: String,
    format_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    probe_score: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_size: Option<u64>,
}

/// 码流参数 (来自 H.264 SPS)
#[derive(Serialize)]
struct StreamInfo {
    profile_idc: u8,
    level_idc: u8,
    width: u32,
    height: u32,
    frame_mbs_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    sample_aspect_ratio: Option<String>,
}

/// 单帧信息
#[derive(Serialize)]
struct FrameInfo {
    index: u64,
    offset: u64,
    size: u64,
    buffer_offset: usize,
    phys_addr: u64,
    wrapped: bool,
}

/// 分帧统计
#[derive(Serialize)]
struct FrameSummary {
    total_frames: u64,
    total_bytes: u64,
    max_frame_size: u64,
    buffer_mode: String,
    buffer_capacity: usize,
    ring_wraps: u64,
    buffer_grows: u64,
}

// ============================================================
// 主逻辑
// ============================================================

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init("esparse-probe", &cli.log_dir, cli.verbose) {
        eprintln!("警告: {e:#}");
    }

    if let Err(e) = run(&cli) {
        log::error!("{e:#}");
        eprintln!("错误: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let filename = cli.input.to_string_lossy().into_owned();
    log::info!("输入文件: {}", filename);

    let mut registry = FormatRegistry::new();
    esparse_format::register_all(&mut registry);

    let mut io = IoContext::open_read(&cli.input)
        .with_context(|| format!("无法打开文件 '{}'", filename))?;

    let (format_id, probe_score) = match &cli.format {
        Some(name) => match FormatId::from_name(name) {
            Some(id) => (id, None),
            None => bail!("未知格式 '{}', 可选: h264 / hevc / mjpeg", name),
        },
        None => {
            let result = registry
                .probe_input(&mut io, Some(&filename))
                .context("无法识别文件格式")?;
            (result.format_id, Some(result.score))
        }
    };
    log::info!("格式: {} (置信度: {:?})", format_id, probe_score);

    let stream = if format_id == FormatId::H264Es {
        read_sps(&mut io)?
    } else {
        None
    };
    let capacity = cli.buffer_size.unwrap_or_else(|| {
        stream
            .as_ref()
            .map_or(esparse_format::stream_buffer::DEFAULT_CAPACITY, |sps| {
                suggested_capacity(sps.width, sps.height)
            })
    });
    let mode = if cli.ring {
        BufferMode::Ring
    } else {
        BufferMode::Linear
    };

    let mut demuxer = registry.create_demuxer(format_id)?;
    let mut buffer = StreamBuffer::with_capacity(capacity, mode);

    if let Some(dir) = &cli.dump_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("创建输出目录失败: {}", dir.display()))?;
    }

    let mut summary = FrameSummary {
        total_frames: 0,
        total_bytes: 0,
        max_frame_size: 0,
        buffer_mode: format!("{mode:?}").to_lowercase(),
        buffer_capacity: capacity,
        ring_wraps: 0,
        buffer_grows: 0,
    };
    let mut frames = Vec::new();

    while let Some(range) = demuxer
        .read_frame(&mut io)
        .with_context(|| format!("第 {} 帧分帧失败", summary.total_frames))?
    {
        let grew = feed_frame(&mut buffer, &mut io, range, cli.auto_grow)?;
        if grew {
            summary.buffer_grows += 1;
            summary.buffer_capacity = buffer.capacity();
        }

        let (tail, head) = buffer.filled_segments();
        let wrapped = !head.is_empty();
        if wrapped {
            summary.ring_wraps += 1;
        }
        if let Some(dir) = &cli.dump_dir {
            let mut frame = BytesMut::with_capacity(tail.len() + head.len());
            frame.extend_from_slice(tail);
            frame.extend_from_slice(head);
            let path = dump_path(dir, summary.total_frames, format_id);
            fs::write(&path, &frame)
                .with_context(|| format!("写入帧文件失败: {}", path.display()))?;
        }

        if cli.show_frames {
            frames.push(FrameInfo {
                index: summary.total_frames,
                offset: range.start,
                size: range.len(),
                buffer_offset: buffer.before_fill(),
                phys_addr: buffer.data_phys_addr(),
                wrapped,
            });
        }
        summary.total_frames += 1;
        summary.total_bytes += range.len();
        summary.max_frame_size = summary.max_frame_size.max(range.len());
    }
    log::info!(
        "分帧完成: {} 帧, {} 字节",
        summary.total_frames,
        summary.total_bytes
    );

    let output = ProbeOutput {
        format: FormatInfo {
            filename,
            format_name: format_id.name().to_string(),
            probe_score,
            file_size: io.size(),
        },
        stream: stream.map(stream_info),
        summary,
        frames: cli.show_frames.then_some(frames),
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("序列化 JSON 失败")?;
        println!("{json}");
    } else {
        print_format_text(&output.format);
        if let Some(ref stream) = output.stream {
            print_stream_text(stream);
        }
        print_summary_text(&output.summary);
        if let Some(ref frames) = output.frames {
            print_frames_text(frames);
        }
    }
    Ok(())
}

/// 从文件头部查找 SPS, 解析失败只记录警告
fn read_sps(io: &mut IoContext) -> anyhow::Result<Option<SpsSummary>> {
    let mut head = vec![0u8; SPS_SEARCH_SIZE];
    let n = io.peek_at(0, &mut head).context("读取文件头部失败")?;
    head.truncate(n);
    match find_sps_summary(&head) {
        Ok(sps) => Ok(sps),
        Err(e) => {
            log::warn!("SPS 解析失败: {}", e);
            Ok(None)
        }
    }
}

/// 把一帧写入送流缓冲区, 返回是否发生了扩容
fn feed_frame(
    buffer: &mut StreamBuffer,
    io: &mut IoContext,
    range: ByteRange,
    auto_grow: bool,
) -> anyhow::Result<bool> {
    match buffer.fill(io, range) {
        Ok(_) => Ok(false),
        Err(EsError::NeedLargerBuffer { required, capacity }) if auto_grow => {
            log::warn!(
                "帧 {} 需要 {} 字节, 超过缓冲区容量 {} 字节, 自动扩容",
                range,
                required,
                capacity
            );
            buffer.grow(required);
            buffer
                .fill(io, range)
                .with_context(|| format!("扩容后写入帧 {} 失败", range))?;
            Ok(true)
        }
        Err(e @ EsError::NeedLargerBuffer { .. }) => {
            Err(e).context("请使用 --buffer-size 增大缓冲区, 或加上 --auto-grow")
        }
        Err(e) => Err(e).with_context(|| format!("写入帧 {} 失败", range)),
    }
}

/// 帧文件路径: `<dir>/frame_<n>.<ext>`
fn dump_path(dir: &Path, index: u64, format_id: FormatId) -> PathBuf {
    let ext = format_id.extensions().first().copied().unwrap_or("bin");
    dir.join(format!("frame_{index:05}.{ext}"))
}

fn stream_info(sps: SpsSummary) -> StreamInfo {
    let (num, den) = sps.sar;
    StreamInfo {
        profile_idc: sps.profile_idc,
        level_idc: sps.level_idc,
        width: sps.width,
        height: sps.height,
        frame_mbs_only: sps.frame_mbs_only,
        sample_aspect_ratio: (num != 0).then(|| format!("{num}/{den}")),
    }
}

/// 文本输出: 格式信息
fn print_format_text(info: &FormatInfo) {
    println!("[FORMAT]");
    println!("  文件名       : {}", info.filename);
    println!("  格式名称     : {}", info.format_name);
    if let Some(size) = info.file_size {
        println!("  文件大小     : {size} 字节");
    }
    if let Some(score) = info.probe_score {
        println!("  探测置信度   : {score}");
    }
    println!("[/FORMAT]");
    println!();
}

/// 文本输出: 码流参数
fn print_stream_text(stream: &StreamInfo) {
    println!("[STREAM]");
    println!("  profile_idc  : {}", stream.profile_idc);
    println!("  level_idc    : {}", stream.level_idc);
    println!("  分辨率       : {}x{}", stream.width, stream.height);
    println!(
        "  扫描方式     : {}",
        if stream.frame_mbs_only { "逐行" } else { "场编码" }
    );
    if let Some(ref sar) = stream.sample_aspect_ratio {
        println!("  SAR          : {sar}");
    }
    println!("[/STREAM]");
    println!();
}

/// 文本输出: 分帧统计
fn print_summary_text(summary: &FrameSummary) {
    println!("[FRAMES]");
    println!("  帧总数       : {}", summary.total_frames);
    println!(
        "  数据总量     : {} 字节 ({:.2} KB)",
        summary.total_bytes,
        summary.total_bytes as f64 / 1024.0
    );
    println!("  最大帧       : {} 字节", summary.max_frame_size);
    println!("  缓冲区模式   : {}", summary.buffer_mode);
    println!("  缓冲区容量   : {} 字节", summary.buffer_capacity);
    if summary.ring_wraps > 0 {
        println!("  环形回绕次数 : {}", summary.ring_wraps);
    }
    if summary.buffer_grows > 0 {
        println!("  扩容次数     : {}", summary.buffer_grows);
    }
    println!("[/FRAMES]");
    println!();
}

/// 文本输出: 逐帧列表
fn print_frames_text(frames: &[FrameInfo]) {
    for frame in frames {
        println!(
            "frame #{:<5} offset={:<10} size={:<8} buf_off={:<8} phys=0x{:X}{}",
            frame.index,
            frame.offset,
            frame.size,
            frame.buffer_offset,
            frame.phys_addr,
            if frame.wrapped { " (wrap)" } else { "" }
        );
    }
}
