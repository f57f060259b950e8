/// 实时报告服务
///
/// 消息传输和持久化由外部实现，这里只定义接口：
/// - [`PositionSink`]：保存定位结果
/// - [`MessagePublisher`]：发布告警消息
///
/// 报告循环从 tokio 通道接收报告，逐条定位并交给 sink。
/// 失败不重试，记录日志后继续处理下一条。

use crate::algorithms::PositionEstimate;
use crate::config::ServiceConfig;
use crate::error::{RadioMapError, RadioMapResult};
use crate::positioning::Positioner;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;

/// 一条入站实时报告
#[derive(Clone, Debug, PartialEq)]
pub struct LiveReport {
    /// 消息主题，例如 `floor/tag-01`
    pub topic: String,
    /// 十六进制报告
    pub payload: String,
}

impl LiveReport {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        LiveReport {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// 带时间戳的定位结果，交给持久化层
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    /// 标签 ID（主题去掉前缀）
    pub tag: String,
    pub x: f64,
    pub y: f64,
    /// 最近参考点名称
    pub label: String,
    pub timestamp: DateTime<Utc>,
}

impl PositionFix {
    pub fn from_estimate(tag: impl Into<String>, estimate: PositionEstimate) -> Self {
        PositionFix {
            tag: tag.into(),
            x: estimate.x,
            y: estimate.y,
            label: estimate.label,
            timestamp: Utc::now(),
        }
    }

    pub fn to_json(&self) -> RadioMapResult<String> {
        serde_json::to_string(self).map_err(|e| RadioMapError::Sink(e.to_string()))
    }
}

// ============================================================================
// 结果输出
// ============================================================================

/// 定位结果持久化接口
pub trait PositionSink {
    fn store(&mut self, fix: &PositionFix) -> RadioMapResult<()>;
}

/// 内存 sink
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    fixes: Vec<PositionFix>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fixes(&self) -> &[PositionFix] {
        &self.fixes
    }
}

impl PositionSink for MemorySink {
    fn store(&mut self, fix: &PositionFix) -> RadioMapResult<()> {
        self.fixes.push(fix.clone());
        Ok(())
    }
}

/// 每行一个 JSON 结果
pub struct JsonLineSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLineSink<W> {
    pub fn new(writer: W) -> Self {
        JsonLineSink { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> PositionSink for JsonLineSink<W> {
    fn store(&mut self, fix: &PositionFix) -> RadioMapResult<()> {
        let line = fix.to_json()?;
        writeln!(self.writer, "{}", line).map_err(|e| RadioMapError::Sink(e.to_string()))?;
        self.writer.flush().map_err(|e| RadioMapError::Sink(e.to_string()))
    }
}

// ============================================================================
// 报告处理
// ============================================================================

/// 报告处理器：主题解析 + 定位
#[derive(Clone, Debug)]
pub struct ReportHandler {
    positioner: Positioner,
    topic_prefix: String,
}

impl ReportHandler {
    pub fn new(positioner: Positioner, topic_prefix: impl Into<String>) -> Self {
        ReportHandler {
            positioner,
            topic_prefix: topic_prefix.into(),
        }
    }

    /// 按配置加载地图并构建处理器；地图不可用时同时返回原因
    pub fn from_config(config: &ServiceConfig) -> (Self, Option<RadioMapError>) {
        let (positioner, error) = Positioner::from_survey(&config.map_path);
        (
            ReportHandler::new(positioner, config.report_topic_prefix.clone()),
            error,
        )
    }

    /// 主题中的标签 ID；主题不带前缀时使用完整主题
    pub fn tag_id<'a>(&self, topic: &'a str) -> &'a str {
        topic.strip_prefix(self.topic_prefix.as_str()).unwrap_or(topic)
    }

    /// 定位一条报告，无法定位时返回 None
    pub fn handle(&self, report: &LiveReport) -> Option<PositionFix> {
        let tag = self.tag_id(&report.topic);
        match self.positioner.locate_report(&report.payload) {
            Some(estimate) => {
                debug!("标签 {} 定位: {}", tag, estimate);
                Some(PositionFix::from_estimate(tag, estimate))
            }
            None => {
                debug!("标签 {} 无法定位，报告: {}", tag, report.payload);
                None
            }
        }
    }
}

/// 报告循环统计
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub received: usize,
    pub fixes: usize,
    pub sink_failures: usize,
}

/// 处理报告直到通道关闭
pub async fn run_report_loop<S: PositionSink>(
    mut reports: mpsc::Receiver<LiveReport>,
    handler: Arc<ReportHandler>,
    sink: &mut S,
) -> LoopStats {
    let mut stats = LoopStats::default();

    while let Some(report) = reports.recv().await {
        stats.received += 1;
        let Some(fix) = handler.handle(&report) else {
            continue;
        };
        stats.fixes += 1;
        if let Err(e) = sink.store(&fix) {
            stats.sink_failures += 1;
            error!("保存标签 {} 的定位结果失败: {}", fix.tag, e);
        }
    }

    info!(
        "报告通道关闭：共 {} 条报告，{} 次定位",
        stats.received, stats.fixes
    );
    stats
}

// ============================================================================
// 告警
// ============================================================================

/// 消息发布接口
#[allow(async_fn_in_trait)]
pub trait MessagePublisher {
    async fn publish(&self, topic: &str, payload: &str) -> RadioMapResult<()>;
}

/// 一条待发布的告警
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alarm {
    pub topic_suffix: String,
    pub message: String,
}

/// 告警入队端，可克隆给多个生产者
#[derive(Clone, Debug)]
pub struct AlarmQueue {
    sender: mpsc::UnboundedSender<Alarm>,
}

impl AlarmQueue {
    /// 入队告警；发布端已停止时返回错误
    pub fn trigger(&self, topic_suffix: impl Into<String>, message: impl Into<String>) -> RadioMapResult<()> {
        self.sender
            .send(Alarm {
                topic_suffix: topic_suffix.into(),
                message: message.into(),
            })
            .map_err(|_| RadioMapError::Sink("告警发布端已停止".to_string()))
    }
}

/// 告警发布端
#[derive(Debug)]
pub struct AlarmPublisher {
    receiver: mpsc::UnboundedReceiver<Alarm>,
    topic_prefix: String,
}

impl AlarmPublisher {
    pub fn topic_prefix(&self) -> &str {
        &self.topic_prefix
    }

    /// 逐条发布告警直到所有入队端被丢弃，返回成功发布数
    pub async fn run<P: MessagePublisher>(mut self, publisher: &P) -> usize {
        let mut sent = 0;
        while let Some(alarm) = self.receiver.recv().await {
            let topic = format!("{}{}", self.topic_prefix, alarm.topic_suffix);
            match publisher.publish(&topic, &alarm.message).await {
                Ok(()) => {
                    sent += 1;
                    debug!("已发送告警: {} -> {}", topic, alarm.message);
                }
                Err(e) => warn!("告警发布失败 {}: {}", topic, e),
            }
        }
        sent
    }
}

/// 创建告警通道
pub fn alarm_channel(topic_prefix: impl Into<String>) -> (AlarmQueue, AlarmPublisher) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        AlarmQueue { sender },
        AlarmPublisher {
            receiver,
            topic_prefix: topic_prefix.into(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::parse_survey;

    fn handler() -> ReportHandler {
        let map = parse_survey("Hall, 2, 3\nAABBCCDDEEFF:-60\n").map;
        ReportHandler::new(Positioner::new(Arc::new(map)), "floor/")
    }

    #[test]
    fn test_tag_id_from_topic() {
        let handler = handler();
        assert_eq!(handler.tag_id("floor/tag-01"), "tag-01");
        assert_eq!(handler.tag_id("other/tag-01"), "other/tag-01");
    }

    #[test]
    fn test_handle_produces_fix() {
        let fix = handler()
            .handle(&LiveReport::new("floor/tag-01", "AABBCCDDEEFFC4"))
            .unwrap();
        assert_eq!(fix.tag, "tag-01");
        assert_eq!(fix.label, "Hall");
        assert_eq!((fix.x, fix.y), (2.0, 3.0));
    }

    #[test]
    fn test_from_config_reports_missing_map() {
        let config = ServiceConfig {
            map_path: "/nonexistent/survey.txt".into(),
            ..Default::default()
        };
        let (handler, error) = ReportHandler::from_config(&config);
        assert!(matches!(error, Some(RadioMapError::MapFileUnavailable { .. })));
        assert!(handler.handle(&LiveReport::new("floor/t", "AABBCCDDEEFFC4")).is_none());
    }

    #[test]
    fn test_handle_no_fix() {
        assert!(handler().handle(&LiveReport::new("floor/tag-01", "zz")).is_none());
    }

    #[test]
    fn test_json_line_sink() {
        let fix = handler()
            .handle(&LiveReport::new("floor/t", "AABBCCDDEEFFC4"))
            .unwrap();
        let mut sink = JsonLineSink::new(Vec::new());
        sink.store(&fix).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        let parsed: PositionFix = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(parsed, fix);
    }
}
