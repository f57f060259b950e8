/// 服务配置
///
/// 从 JSON 文件读取，所有字段都有默认值：
///
/// ```json
/// {
///   "map_path": "scan_results.txt",
///   "report_topic_prefix": "floor/",
///   "tag": { "scan_secs": 5 }
/// }
/// ```

use crate::algorithms::{load_whitelist, DeviceFilter};
use crate::error::{RadioMapError, RadioMapResult};
use crate::radio::CycleTiming;
use crate::service::{alarm_channel, AlarmPublisher, AlarmQueue, LiveReport};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// 勘测文件路径
    pub map_path: PathBuf,
    /// 实时报告主题前缀，去掉前缀后为标签 ID
    pub report_topic_prefix: String,
    /// 告警主题前缀
    pub alarm_topic_prefix: String,
    /// 报告通道容量
    pub channel_capacity: usize,
    pub tag: TagConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            map_path: PathBuf::from("scan_results.txt"),
            report_topic_prefix: "floor/".to_string(),
            alarm_topic_prefix: "alarm/".to_string(),
            channel_capacity: 100,
            tag: TagConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn from_file(path: impl AsRef<Path>) -> RadioMapResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| RadioMapError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> RadioMapResult<Self> {
        let config: ServiceConfig =
            serde_json::from_str(text).map_err(|e| RadioMapError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RadioMapResult<()> {
        if self.channel_capacity == 0 {
            return Err(RadioMapError::Config("channel_capacity 必须大于 0".to_string()));
        }
        if self.tag.adv_period_ms == 0 {
            return Err(RadioMapError::Config("adv_period_ms 必须大于 0".to_string()));
        }
        Ok(())
    }

    /// 容量为 `channel_capacity` 的报告通道
    pub fn report_channel(&self) -> (mpsc::Sender<LiveReport>, mpsc::Receiver<LiveReport>) {
        mpsc::channel(self.channel_capacity)
    }

    /// 发布到 `alarm_topic_prefix` 下的告警通道
    pub fn alarm_channel(&self) -> (AlarmQueue, AlarmPublisher) {
        alarm_channel(self.alarm_topic_prefix.clone())
    }
}

/// 标签端配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagConfig {
    pub scan_secs: u64,
    pub adv_secs: u64,
    pub adv_period_ms: u64,
    /// 信标白名单文件
    pub whitelist_path: Option<PathBuf>,
    /// 设备名称过滤正则
    pub name_pattern: Option<String>,
}

impl Default for TagConfig {
    fn default() -> Self {
        TagConfig {
            scan_secs: 5,
            adv_secs: 1,
            adv_period_ms: 200,
            whitelist_path: None,
            name_pattern: None,
        }
    }
}

impl TagConfig {
    pub fn timing(&self) -> CycleTiming {
        CycleTiming {
            scan: Duration::from_secs(self.scan_secs),
            advertise: Duration::from_secs(self.adv_secs),
            period: Duration::from_millis(self.adv_period_ms),
        }
    }

    /// 根据白名单和名称正则构建设备过滤器
    pub fn device_filter(&self) -> RadioMapResult<DeviceFilter> {
        let whitelist = self
            .whitelist_path
            .as_ref()
            .map(load_whitelist)
            .unwrap_or_default();
        let filter = DeviceFilter::new(whitelist);
        match &self.name_pattern {
            Some(pattern) => filter.with_name_pattern(pattern),
            None => Ok(filter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = ServiceConfig::from_json(r#"{"map_path": "survey.txt", "tag": {"scan_secs": 3}}"#).unwrap();
        assert_eq!(config.map_path, PathBuf::from("survey.txt"));
        assert_eq!(config.report_topic_prefix, "floor/");
        assert_eq!(config.channel_capacity, 100);
        assert_eq!(config.tag.timing().scan, Duration::from_secs(3));
        assert_eq!(config.tag.timing().period, Duration::from_millis(200));
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            ServiceConfig::from_json(r#"{"channel_capacity": 0}"#),
            Err(RadioMapError::Config(_))
        ));
        assert!(ServiceConfig::from_json("not json").is_err());
        assert!(ServiceConfig::from_file("/nonexistent/config.json").is_err());
    }

    #[test]
    fn test_channels_follow_config() {
        let config = ServiceConfig::from_json(r#"{"channel_capacity": 2}"#).unwrap();
        let (tx, _rx) = config.report_channel();
        assert_eq!(tx.max_capacity(), 2);
        assert!(tx.try_send(LiveReport::new("floor/a", "")).is_ok());
        assert!(tx.try_send(LiveReport::new("floor/a", "")).is_ok());
        assert!(tx.try_send(LiveReport::new("floor/a", "")).is_err());

        let config = ServiceConfig::from_json(r#"{"alarm_topic_prefix": "warn/"}"#).unwrap();
        let (_queue, publisher) = config.alarm_channel();
        assert_eq!(publisher.topic_prefix(), "warn/");
    }

    #[test]
    fn test_bad_name_pattern() {
        let tag = TagConfig {
            name_pattern: Some("(".to_string()),
            ..Default::default()
        };
        assert!(tag.device_filter().is_err());
    }
}
