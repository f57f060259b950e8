/// 信标标识符与扫描设备记录

use crate::error::{RadioMapError, RadioMapResult};
use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Eddystone 服务 UUID 片段
pub const EDDYSTONE_UUID_PART: &str = "feaa";

/// 信标标识符：6 字节 MAC 地址
///
/// 规范形式为 12 位大写十六进制字符串（去掉冒号），例如 `AABBCCDDEEFF`。
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct BeaconId(pub [u8; 6]);

impl BeaconId {
    /// 全零标识符，在实时报告中表示数据结束
    pub const SENTINEL: BeaconId = BeaconId([0; 6]);

    /// 解析 MAC 字符串
    ///
    /// 接受 `AA:BB:CC:DD:EE:FF` 或 `aabbccddeeff`，冒号被去除，大小写不敏感。
    pub fn parse(s: &str) -> RadioMapResult<Self> {
        let hex: String = s.trim().chars().filter(|c| *c != ':').collect();
        if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(RadioMapError::InvalidBeaconId(s.to_string()));
        }
        let mut bytes = [0u8; 6];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(|_| RadioMapError::InvalidBeaconId(s.to_string()))?;
        }
        Ok(BeaconId(bytes))
    }

    /// 是否为全零结束标记
    pub fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for BeaconId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for BeaconId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BeaconId({})", self)
    }
}

impl FromStr for BeaconId {
    type Err = RadioMapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for BeaconId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for BeaconId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        BeaconId::parse(&s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// 扫描设备
// ============================================================================

/// 一次蓝牙扫描得到的设备记录
///
/// 各字段都可能缺失，取决于广播内容。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScannedDevice {
    /// 设备 MAC 地址
    pub id: Option<BeaconId>,
    /// 信号强度 (dBm)
    pub rssi: Option<i16>,
    /// 广播名称
    pub name: Option<String>,
    /// 服务 UUID 列表
    pub service_uuids: Vec<String>,
    /// 厂商数据：公司 ID -> 负载
    pub manufacturer_data: BTreeMap<u16, Vec<u8>>,
}

impl ScannedDevice {
    pub fn new(id: BeaconId, rssi: i16) -> Self {
        ScannedDevice {
            id: Some(id),
            rssi: Some(rssi),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_service_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.service_uuids.push(uuid.into());
        self
    }

    pub fn with_manufacturer_data(mut self, company_id: u16, data: Vec<u8>) -> Self {
        self.manufacturer_data.insert(company_id, data);
        self
    }

    /// 是否广播了 Eddystone 服务
    pub fn is_eddystone(&self) -> bool {
        self.service_uuids
            .iter()
            .any(|uuid| uuid.to_lowercase().contains(EDDYSTONE_UUID_PART))
    }
}

// ============================================================================
// 设备过滤
// ============================================================================

/// 定位信标过滤器
///
/// 满足任一条件的设备被保留：
/// - MAC 在白名单中
/// - 广播 Eddystone 服务
/// - 名称匹配正则表达式（如果配置了）
#[derive(Clone, Debug, Default)]
pub struct DeviceFilter {
    whitelist: HashSet<BeaconId>,
    name_pattern: Option<Regex>,
}

impl DeviceFilter {
    pub fn new(whitelist: impl IntoIterator<Item = BeaconId>) -> Self {
        DeviceFilter {
            whitelist: whitelist.into_iter().collect(),
            name_pattern: None,
        }
    }

    /// 追加名称过滤正则
    pub fn with_name_pattern(mut self, pattern: &str) -> RadioMapResult<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| RadioMapError::Config(format!("名称正则无效: {}", e)))?;
        self.name_pattern = Some(regex);
        Ok(self)
    }

    /// 单个设备是否为定位信标
    pub fn accepts(&self, device: &ScannedDevice) -> bool {
        if let Some(id) = &device.id {
            if self.whitelist.contains(id) {
                return true;
            }
        }
        if device.is_eddystone() {
            return true;
        }
        match (&self.name_pattern, &device.name) {
            (Some(pattern), Some(name)) => pattern.is_match(name),
            _ => false,
        }
    }

    /// 选出定位信标，保持输入顺序
    pub fn select(&self, devices: Vec<ScannedDevice>) -> Vec<ScannedDevice> {
        devices.into_iter().filter(|d| self.accepts(d)).collect()
    }

    /// 丢弃没有 RSSI 的设备，并按信号强度从强到弱排序（稳定排序）
    pub fn sort_by_rssi(&self, devices: Vec<ScannedDevice>) -> Vec<ScannedDevice> {
        let mut valid: Vec<_> = devices.into_iter().filter(|d| d.rssi.is_some()).collect();
        valid.sort_by(|a, b| b.rssi.cmp(&a.rssi));
        valid
    }
}

/// 读取信标白名单：每行一个 MAC
///
/// 文件不存在时返回空列表；无法解析的行被跳过。
pub fn load_whitelist(path: impl AsRef<Path>) -> Vec<BeaconId> {
    let path = path.as_ref();
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("白名单 {} 无法读取 ({})，使用空列表", path.display(), e);
            return Vec::new();
        }
    };

    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match BeaconId::parse(line) {
            Ok(id) => Some(id),
            Err(e) => {
                debug!("跳过白名单条目: {}", e);
                None
            }
        })
        .collect()
}
