/// 指纹地图（Radio Map）
///
/// 勘测文件由若干块组成，每块以表头行开始：
///
/// ```text
/// PointA, 1.0, 2.0
/// AABBCCDDEEFF:-65, 112233445566:-72
/// AABBCCDDEEFF:-63
/// PointB, 3.0, 2.0
/// AABBCCDDEEFF:-80
/// ```
///
/// - 表头行不含冒号：`label[, x[, y]]`
/// - 其余行为扫描行：逗号分隔的 `MAC:RSSI` 项
/// - 每块的指纹值为该块内同一信标所有样本的均值（保留两位小数）

use crate::algorithms::{BeaconId, ScannedDevice};
use crate::error::{RadioMapError, RadioMapResult};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// 指纹：信标 -> 期望 RSSI (dBm)
pub type Fingerprint = BTreeMap<BeaconId, f64>;

/// 勘测参考点
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferencePoint {
    /// 位置名称（允许重复）
    pub label: String,
    pub x: f64,
    pub y: f64,
    pub fingerprint: Fingerprint,
}

impl ReferencePoint {
    pub fn new(label: impl Into<String>, x: f64, y: f64, fingerprint: Fingerprint) -> Self {
        ReferencePoint {
            label: label.into(),
            x,
            y,
            fingerprint,
        }
    }

    /// 该点记录的某个信标的期望 RSSI
    pub fn expected_rssi(&self, beacon: &BeaconId) -> Option<f64> {
        self.fingerprint.get(beacon).copied()
    }
}

/// 指纹地图：按勘测顺序排列的参考点，构建后只读
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RadioMap {
    points: Vec<ReferencePoint>,
}

impl RadioMap {
    pub fn new(points: Vec<ReferencePoint>) -> Self {
        RadioMap { points }
    }

    pub fn points(&self) -> &[ReferencePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReferencePoint> {
        self.points.iter()
    }
}

// ============================================================================
// 地图加载
// ============================================================================

/// 一次加载的结果
///
/// 加载永不失败：文件不可用时 `map` 为空，原因放在 `error` 中交给调用方。
#[derive(Debug, Default)]
pub struct MapLoad {
    pub map: RadioMap,
    /// 文件不可用时的原因
    pub error: Option<RadioMapError>,
    /// 被跳过的格式异常项数
    pub anomalies: usize,
}

impl MapLoad {
    pub fn is_available(&self) -> bool {
        self.error.is_none()
    }
}

/// 地图加载能力
pub trait MapLoader {
    fn load(&self, path: &Path) -> MapLoad;
}

/// 文本勘测文件加载器
#[derive(Clone, Copy, Debug, Default)]
pub struct SurveyLoader;

impl MapLoader for SurveyLoader {
    fn load(&self, path: &Path) -> MapLoad {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(source) => {
                let error = RadioMapError::MapFileUnavailable {
                    path: path.to_path_buf(),
                    source,
                };
                warn!("{}，使用空地图", error);
                return MapLoad {
                    map: RadioMap::default(),
                    error: Some(error),
                    anomalies: 0,
                };
            }
        };

        let text = String::from_utf8_lossy(&bytes);
        let load = parse_survey(&text);
        info!(
            "已加载 {} 个地图参考点（{}，跳过 {} 项）",
            load.map.len(),
            path.display(),
            load.anomalies
        );
        load
    }
}

/// 正在累积的勘测块
struct SurveyBlock {
    label: String,
    x: f64,
    y: f64,
    samples: BTreeMap<BeaconId, Vec<f64>>,
}

impl SurveyBlock {
    fn finalize(self) -> ReferencePoint {
        let fingerprint = self
            .samples
            .into_iter()
            .map(|(beacon, values)| {
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                (beacon, round2(mean))
            })
            .collect();
        ReferencePoint::new(self.label, self.x, self.y, fingerprint)
    }
}

/// 解析勘测文本（单次前向扫描）
pub fn parse_survey(text: &str) -> MapLoad {
    let mut points = Vec::new();
    let mut current: Option<SurveyBlock> = None;
    let mut anomalies = 0;

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if !line.contains(':') {
            if let Some(block) = current.take() {
                points.push(block.finalize());
            }
            let (block, ok) = parse_header(line);
            if !ok {
                anomalies += 1;
                debug!(
                    "{}",
                    RadioMapError::MapParseAnomaly {
                        line: line_no,
                        reason: format!("表头坐标无法解析，按 (0, 0) 处理: '{}'", line),
                    }
                );
            }
            current = Some(block);
            continue;
        }

        match current.as_mut() {
            Some(block) => anomalies += parse_scan_line(line, line_no, &mut block.samples),
            None => {
                anomalies += 1;
                debug!(
                    "{}",
                    RadioMapError::MapParseAnomaly {
                        line: line_no,
                        reason: "扫描行出现在任何表头之前".to_string(),
                    }
                );
            }
        }
    }

    if let Some(block) = current.take() {
        points.push(block.finalize());
    }

    MapLoad {
        map: RadioMap::new(points),
        error: None,
        anomalies,
    }
}

/// 解析表头；任一坐标无法解析时两个坐标都取 0.0
fn parse_header(line: &str) -> (SurveyBlock, bool) {
    let mut parts = line.split(',').map(str::trim);
    let label = parts.next().unwrap_or_default().to_string();

    let coord = |field: Option<&str>| -> Option<f64> {
        match field {
            None => Some(0.0),
            Some(text) => text.parse::<f64>().ok(),
        }
    };

    let (x, y, ok) = match (coord(parts.next()), coord(parts.next())) {
        (Some(x), Some(y)) => (x, y, true),
        _ => (0.0, 0.0, false),
    };

    let block = SurveyBlock {
        label,
        x,
        y,
        samples: BTreeMap::new(),
    };
    (block, ok)
}

/// 解析一条扫描行，返回被跳过的项数
fn parse_scan_line(line: &str, line_no: usize, samples: &mut BTreeMap<BeaconId, Vec<f64>>) -> usize {
    let mut skipped = 0;

    for item in line.split(',').map(str::trim).filter(|item| !item.is_empty()) {
        match parse_scan_item(item) {
            Some((beacon, rssi)) => samples.entry(beacon).or_default().push(rssi),
            None => {
                skipped += 1;
                debug!(
                    "{}",
                    RadioMapError::MapParseAnomaly {
                        line: line_no,
                        reason: format!("跳过扫描项 '{}'", item),
                    }
                );
            }
        }
    }

    skipped
}

/// `MAC:RSSI`，最后一个冒号分隔 RSSI
fn parse_scan_item(item: &str) -> Option<(BeaconId, f64)> {
    let (mac, rssi) = item.rsplit_once(':')?;
    let beacon = BeaconId::parse(mac).ok()?;
    let rssi = rssi.trim().parse::<f64>().ok().filter(|v| v.is_finite())?;
    Some((beacon, rssi))
}

/// 保留两位小数，恰好一半时取偶数
fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

// ============================================================================
// 勘测文件写入
// ============================================================================

/// 勘测数据写入器，输出格式与 [`SurveyLoader`] 读取的格式一致
pub struct SurveyWriter<W: Write> {
    writer: W,
}

impl SurveyWriter<fs::File> {
    /// 以追加方式打开勘测文件
    pub fn append(path: impl AsRef<Path>) -> RadioMapResult<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(SurveyWriter::new(file))
    }
}

impl<W: Write> SurveyWriter<W> {
    pub fn new(writer: W) -> Self {
        SurveyWriter { writer }
    }

    /// 写入一个新参考点的表头
    ///
    /// 名称中含冒号、逗号或换行时无法被正确读回，返回 [`RadioMapError::InvalidLabel`]。
    pub fn write_header(&mut self, label: &str, x: f64, y: f64) -> RadioMapResult<()> {
        if label.contains([':', ',', '\n', '\r']) {
            return Err(RadioMapError::InvalidLabel(label.to_string()));
        }
        writeln!(self.writer, "{}, {}, {}", label, x, y)?;
        self.writer.flush()?;
        Ok(())
    }

    /// 写入一次扫描，返回写入的信标数
    ///
    /// 缺少 MAC 或 RSSI 的设备被跳过；没有可写设备时不写任何内容，
    /// 避免产生一行被误读为表头的空扫描。
    pub fn write_scan(&mut self, devices: &[ScannedDevice]) -> RadioMapResult<usize> {
        let items: Vec<String> = devices
            .iter()
            .filter_map(|d| match (d.id, d.rssi) {
                (Some(id), Some(rssi)) => Some(format!("{}:{}", id, rssi)),
                _ => None,
            })
            .collect();

        if items.is_empty() {
            return Ok(0);
        }

        writeln!(self.writer, "{}", items.join(", "))?;
        self.writer.flush()?;
        Ok(items.len())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> BeaconId {
        BeaconId::parse(s).unwrap()
    }

    const SURVEY: &str = "PointA, 1.0, 2.0\n\
                          AABBCCDDEEFF:-65, 112233445566:-72\n\
                          AABBCCDDEEFF:-63\n\
                          PointB, 3.0, 2.0\n\
                          AABBCCDDEEFF:-80\n";

    #[test]
    fn test_parse_survey_example() {
        let load = parse_survey(SURVEY);
        assert_eq!(load.anomalies, 0);
        let points = load.map.points();
        assert_eq!(points.len(), 2);

        assert_eq!(points[0].label, "PointA");
        assert_eq!((points[0].x, points[0].y), (1.0, 2.0));
        assert_eq!(points[0].expected_rssi(&id("AABBCCDDEEFF")), Some(-64.0));
        assert_eq!(points[0].expected_rssi(&id("112233445566")), Some(-72.0));

        assert_eq!(points[1].label, "PointB");
        assert_eq!(points[1].fingerprint.len(), 1);
        assert_eq!(points[1].expected_rssi(&id("AABBCCDDEEFF")), Some(-80.0));
    }

    #[test]
    fn test_mean_rounded_to_two_decimals() {
        let load = parse_survey("P\nAABBCCDDEEFF:-60, AABBCCDDEEFF:-61, AABBCCDDEEFF:-61\n");
        // (-60 - 61 - 61) / 3 = -60.666...
        assert_eq!(load.map.points()[0].expected_rssi(&id("AABBCCDDEEFF")), Some(-60.67));
    }

    #[test]
    fn test_half_rounds_to_even() {
        // 7 × -60 + -61 = -481，均值 -60.125
        let mut survey = String::from("P\n");
        for _ in 0..7 {
            survey.push_str("AABBCCDDEEFF:-60\n");
        }
        survey.push_str("AABBCCDDEEFF:-61\n");
        let load = parse_survey(&survey);
        assert_eq!(load.map.points()[0].expected_rssi(&id("AABBCCDDEEFF")), Some(-60.12));

        assert_eq!(round2(-60.125), -60.12);
        assert_eq!(round2(-60.375), -60.38);
    }

    #[test]
    fn test_colon_separated_mac_and_case() {
        let load = parse_survey("P, 0, 0\naa:bb:cc:dd:ee:ff:-70\n");
        assert_eq!(load.map.points()[0].expected_rssi(&id("AABBCCDDEEFF")), Some(-70.0));
    }

    #[test]
    fn test_header_defaults() {
        let load = parse_survey("OnlyLabel\nPartial, 4.5\nBroken, x, 3\n");
        let points = load.map.points();
        assert_eq!(points.len(), 3);
        assert_eq!((points[0].x, points[0].y), (0.0, 0.0));
        assert_eq!((points[1].x, points[1].y), (4.5, 0.0));
        assert_eq!((points[2].x, points[2].y), (0.0, 0.0));
        assert_eq!(load.anomalies, 1);
    }

    #[test]
    fn test_malformed_items_skipped_individually() {
        let load = parse_survey("P, 1, 1\nAABBCCDDEEFF:-60, garbage:, ZZ:-5, :, 112233445566:abc, 112233445566:-50\n");
        let point = &load.map.points()[0];
        assert_eq!(point.fingerprint.len(), 2);
        assert_eq!(point.expected_rssi(&id("112233445566")), Some(-50.0));
        assert_eq!(load.anomalies, 4);
    }

    #[test]
    fn test_scan_before_header_ignored() {
        let load = parse_survey("AABBCCDDEEFF:-60\nP, 1, 1\n");
        assert_eq!(load.map.len(), 1);
        assert!(load.map.points()[0].fingerprint.is_empty());
    }

    #[test]
    fn test_repeated_labels_are_distinct_points() {
        let load = parse_survey("P, 1, 1\nAABBCCDDEEFF:-60\nP, 1, 1\nAABBCCDDEEFF:-70\n");
        assert_eq!(load.map.len(), 2);
    }

    #[test]
    fn test_missing_file_yields_empty_map() {
        let load = SurveyLoader.load(Path::new("/nonexistent/survey.txt"));
        assert!(load.map.is_empty());
        assert!(matches!(load.error, Some(RadioMapError::MapFileUnavailable { .. })));
    }

    #[test]
    fn test_writer_round_trip() {
        let mut writer = SurveyWriter::new(Vec::new());
        writer.write_header("Kitchen", 2.5, 4.0).unwrap();
        let written = writer
            .write_scan(&[
                ScannedDevice::new(id("AABBCCDDEEFF"), -61),
                ScannedDevice::default(),
            ])
            .unwrap();
        assert_eq!(written, 1);
        assert_eq!(writer.write_scan(&[]).unwrap(), 0);

        let text = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(text, "Kitchen, 2.5, 4\nAABBCCDDEEFF:-61\n");

        let map = parse_survey(&text).map;
        assert_eq!(map.points()[0].label, "Kitchen");
        assert_eq!(map.points()[0].expected_rssi(&id("AABBCCDDEEFF")), Some(-61.0));
    }

    #[test]
    fn test_writer_rejects_unreadable_labels() {
        let mut writer = SurveyWriter::new(Vec::new());
        for label in ["Room:1", "Hall, east", "Line\nbreak", "Carriage\rreturn"] {
            assert!(matches!(
                writer.write_header(label, 1.0, 1.0),
                Err(RadioMapError::InvalidLabel(_))
            ));
        }
        writer.write_header("Room 1", 1.0, 1.0).unwrap();
        assert_eq!(String::from_utf8(writer.into_inner()).unwrap(), "Room 1, 1, 1\n");
    }
}
