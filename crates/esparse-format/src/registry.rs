//! 格式注册表.
//!
//! 管理所有已注册的分帧器, 支持按格式标识查找和自动探测.

use std::collections::HashMap;

use esparse_core::{EsError, EsResult};

use crate::demuxer::Demuxer;
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::probe::{FormatProbe, ProbeResult};

/// 分帧器工厂函数类型
pub type DemuxerFactory = fn() -> EsResult<Box<dyn Demuxer>>;

/// 探测时读取的文件头部字节数
const PROBE_SIZE: usize = 4096;

/// 格式注册表
pub struct FormatRegistry {
    /// 分帧器工厂映射
    demuxers: HashMap<FormatId, DemuxerEntry>,
    /// 格式探测器列表
    probes: Vec<Box<dyn FormatProbe + Send>>,
}

/// 分帧器注册条目
struct DemuxerEntry {
    /// 格式名称
    name: String,
    /// 工厂函数
    factory: DemuxerFactory,
}

impl FormatRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self {
            demuxers: HashMap::new(),
            probes: Vec::new(),
        }
    }

    /// 注册一个分帧器
    pub fn register_demuxer(
        &mut self,
        format_id: FormatId,
        name: impl Into<String>,
        factory: DemuxerFactory,
    ) {
        self.demuxers.insert(
            format_id,
            DemuxerEntry {
                name: name.into(),
                factory,
            },
        );
    }

    /// 注册一个格式探测器
    pub fn register_probe(&mut self, probe: Box<dyn FormatProbe + Send>) {
        self.probes.push(probe);
    }

    /// 创建指定格式的分帧器实例
    pub fn create_demuxer(&self, format_id: FormatId) -> EsResult<Box<dyn Demuxer>> {
        let entry = self.demuxers.get(&format_id).ok_or_else(|| {
            EsError::FormatNotFound(format!("未找到 {} 的分帧器", format_id))
        })?;
        (entry.factory)()
    }

    /// 探测数据的格式
    ///
    /// 遍历所有已注册的探测器, 返回置信度最高的结果.
    pub fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeResult> {
        let mut best: Option<ProbeResult> = None;
        for probe in &self.probes {
            if let Some(score) = probe.probe(data, filename) {
                let is_better = best.as_ref().is_none_or(|b| score > b.score);
                if is_better {
                    best = Some(ProbeResult {
                        format_id: probe.format_id(),
                        score,
                    });
                }
            }
        }
        best
    }

    /// 获取所有已注册的分帧器名称 (按名称排序)
    pub fn list_demuxers(&self) -> Vec<(FormatId, &str)> {
        let mut list: Vec<_> = self
            .demuxers
            .iter()
            .map(|(id, entry)| (*id, entry.name.as_str()))
            .collect();
        list.sort_by_key(|(_, name)| *name);
        list
    }

    /// 探测输入文件格式 (不创建分帧器)
    ///
    /// 通过预读文件头部探测, 游标位置保持不变.
    pub fn probe_input(
        &self,
        io: &mut IoContext,
        filename: Option<&str>,
    ) -> EsResult<ProbeResult> {
        let probe_size = io
            .size()
            .map_or(PROBE_SIZE, |size| (size as usize).min(PROBE_SIZE));
        let mut head = vec![0u8; probe_size];
        let n = io.peek_at(0, &mut head)?;
        head.truncate(n);

        let result = self.probe(&head, filename).ok_or_else(|| {
            EsError::FormatNotFound("无法识别输入文件格式".to_string())
        })?;
        log::debug!(
            "探测结果: format={}, score={}",
            result.format_id,
            result.score
        );
        Ok(result)
    }

    /// 根据文件自动探测格式并创建分帧器
    pub fn open_input(
        &self,
        io: &mut IoContext,
        filename: Option<&str>,
    ) -> EsResult<Box<dyn Demuxer>> {
        let result = self.probe_input(io, filename)?;
        self.create_demuxer(result.format_id)
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}
