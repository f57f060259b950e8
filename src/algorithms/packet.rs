/// 实时报告编解码
///
/// 报告是十六进制字符串，由定长记录拼接而成，每条记录 7 字节：
/// - 6 字节信标 MAC（12 个十六进制字符）
/// - 1 字节有符号 RSSI（补码，2 个十六进制字符）
///
/// 例：`AABBCCDDEEFFC5112233445566BA` -> `[(AABBCCDDEEFF, -59), (112233445566, -70)]`

use crate::algorithms::{BeaconId, Observation, ScannedDevice};
use crate::error::{RadioMapError, RadioMapResult};
use log::debug;

/// 单条记录的十六进制长度
pub const RECORD_HEX_LEN: usize = 14;
/// 单份报告最多包含的记录数
pub const MAX_RECORDS: usize = 3;
/// 广播数据最大长度（传统广播）
pub const ADV_DATA_LEN: usize = 31;
/// 标签广播使用的厂商 ID
pub const TAG_COMPANY_ID: [u8; 2] = [0xFF, 0xFF];
/// 信标转发告警使用的厂商 ID
pub const ALARM_COMPANY_ID: [u8; 2] = [0xFF, 0xFE];

const ADV_FLAGS: [u8; 3] = [0x02, 0x01, 0x06];
const AD_TYPE_MANUFACTURER: u8 = 0xFF;

/// 报告解码能力
pub trait PacketDecoder {
    /// 解码报告，返回按出现顺序排列的 (信标, RSSI)
    fn decode(&self, report: &str) -> Vec<(BeaconId, i16)>;

    /// 解码并转换为观测
    fn decode_observation(&self, report: &str) -> Observation {
        Observation::from_pairs(self.decode(report))
    }
}

/// 十六进制报告解码器
///
/// 遇到以下任一情况时停止并返回已解码部分：
/// - 剩余字符不足一条记录
/// - 记录 MAC 为全零结束标记（该记录不输出）
/// - 已解码 [`MAX_RECORDS`] 条
/// - 出现非十六进制字符
#[derive(Clone, Copy, Debug, Default)]
pub struct HexReportDecoder;

impl PacketDecoder for HexReportDecoder {
    fn decode(&self, report: &str) -> Vec<(BeaconId, i16)> {
        let compact: Vec<char> = report.chars().filter(|c| !c.is_whitespace()).collect();
        let mut decoded = Vec::with_capacity(MAX_RECORDS);
        let mut offset = 0;

        while decoded.len() < MAX_RECORDS {
            let Some(record) = compact.get(offset..offset + RECORD_HEX_LEN) else {
                if offset < compact.len() {
                    debug!(
                        "{}",
                        RadioMapError::ReportDecodeAnomaly {
                            offset,
                            reason: format!("剩余 {} 个字符，不足一条记录", compact.len() - offset),
                        }
                    );
                }
                break;
            };

            let Some(bytes) = decode_record(record) else {
                debug!(
                    "{}",
                    RadioMapError::ReportDecodeAnomaly {
                        offset,
                        reason: "包含非十六进制字符".to_string(),
                    }
                );
                break;
            };

            let mut mac = [0u8; 6];
            mac.copy_from_slice(&bytes[..6]);
            let beacon = BeaconId(mac);
            if beacon.is_sentinel() {
                break;
            }

            decoded.push((beacon, rssi_from_byte(bytes[6])));
            offset += RECORD_HEX_LEN;
        }

        decoded
    }
}

/// 14 个十六进制字符 -> 7 字节
fn decode_record(record: &[char]) -> Option<[u8; 7]> {
    let mut bytes = [0u8; 7];
    for (byte, pair) in bytes.iter_mut().zip(record.chunks(2)) {
        let hi = pair[0].to_digit(16)?;
        let lo = pair[1].to_digit(16)?;
        *byte = (hi * 16 + lo) as u8;
    }
    Some(bytes)
}

/// 补码字节 -> dBm（128..=255 映射为 value - 256）
pub fn rssi_from_byte(byte: u8) -> i16 {
    byte as i8 as i16
}

/// dBm -> 补码字节，超出 i8 范围时饱和到 -128 / 127
pub fn rssi_to_byte(rssi: i16) -> u8 {
    rssi.clamp(i8::MIN as i16, i8::MAX as i16) as i8 as u8
}

// ============================================================================
// 标签端编码
// ============================================================================

/// 前 [`MAX_RECORDS`] 个设备的原始记录字节
///
/// 缺少 MAC 或 RSSI 的设备被跳过，不占名额。
fn encode_records(devices: &[ScannedDevice]) -> Vec<u8> {
    devices
        .iter()
        .filter_map(|d| Some((d.id?, d.rssi?)))
        .take(MAX_RECORDS)
        .flat_map(|(id, rssi)| {
            let mut record = id.as_bytes().to_vec();
            record.push(rssi_to_byte(rssi));
            record
        })
        .collect()
}

/// 编码实时报告（解码的逆过程）
///
/// 输入应已按信号强度排序。
pub fn encode_report(devices: &[ScannedDevice]) -> String {
    encode_records(devices)
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect()
}

/// 构造标签的广播数据
///
/// 布局：长度前缀 + Flags AD + 厂商数据 AD（公司 ID `FFFF` + 记录），
/// 长度前缀之后的部分补零至 [`ADV_DATA_LEN`] 字节。
pub fn advertising_frame(devices: &[ScannedDevice]) -> Vec<u8> {
    manufacturer_frame(TAG_COMPANY_ID, &encode_records(devices))
}

fn manufacturer_frame(company_id: [u8; 2], data: &[u8]) -> Vec<u8> {
    let mut payload = ADV_FLAGS.to_vec();
    payload.push((company_id.len() + 1 + data.len()) as u8);
    payload.push(AD_TYPE_MANUFACTURER);
    payload.extend_from_slice(&company_id);
    payload.extend_from_slice(data);

    let mut frame = Vec::with_capacity(ADV_DATA_LEN.max(payload.len() + 1));
    frame.push(payload.len() as u8);
    frame.extend_from_slice(&payload);
    if frame.len() < ADV_DATA_LEN + 1 {
        frame.resize(ADV_DATA_LEN + 1, 0x00);
    }
    frame
}

// ============================================================================
// 信标端转发
// ============================================================================

/// 厂商数据中的公司 ID 键（小端序，`FFFF` 两种字节序相同）
fn company_key(company_id: [u8; 2]) -> u16 {
    u16::from_le_bytes(company_id)
}

/// 从扫描结果中挑出标签：厂商数据带有 [`TAG_COMPANY_ID`] 的设备
pub fn select_tags(devices: Vec<ScannedDevice>) -> Vec<ScannedDevice> {
    let key = company_key(TAG_COMPANY_ID);
    devices
        .into_iter()
        .filter(|d| d.manufacturer_data.contains_key(&key))
        .collect()
}

/// 告警数据可容纳的最大字节数
pub const MAX_ALARM_DATA_LEN: usize =
    ADV_DATA_LEN - ADV_FLAGS.len() - 2 - ALARM_COMPANY_ID.len();

/// 构造信标转发告警的广播数据
///
/// 与 [`advertising_frame`] 布局相同，公司 ID 为 `FFFE`，数据为十六进制
/// 告警内容（允许空白）。内容不是合法十六进制或超过 [`MAX_ALARM_DATA_LEN`]
/// 字节时返回错误。
pub fn alarm_frame(payload_hex: &str) -> RadioMapResult<Vec<u8>> {
    let data = parse_hex_bytes(payload_hex)?;
    if data.len() > MAX_ALARM_DATA_LEN {
        return Err(RadioMapError::ReportDecodeAnomaly {
            offset: MAX_ALARM_DATA_LEN * 2,
            reason: format!("告警数据 {} 字节，超过 {} 字节上限", data.len(), MAX_ALARM_DATA_LEN),
        });
    }
    Ok(manufacturer_frame(ALARM_COMPANY_ID, &data))
}

fn parse_hex_bytes(text: &str) -> RadioMapResult<Vec<u8>> {
    let digits: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(RadioMapError::ReportDecodeAnomaly {
            offset: digits.len() - 1,
            reason: "十六进制字符数为奇数".to_string(),
        });
    }

    digits
        .chunks(2)
        .enumerate()
        .map(|(i, pair)| match (pair[0].to_digit(16), pair[1].to_digit(16)) {
            (Some(hi), Some(lo)) => Ok((hi * 16 + lo) as u8),
            _ => Err(RadioMapError::ReportDecodeAnomaly {
                offset: i * 2,
                reason: "包含非十六进制字符".to_string(),
            }),
        })
        .collect()
}

/// 以空格分隔的大写十六进制显示
pub fn format_frame(frame: &[u8]) -> String {
    frame
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> BeaconId {
        BeaconId::parse(s).unwrap()
    }

    #[test]
    fn test_decode_example() {
        let decoded = HexReportDecoder.decode("AABBCCDDEEFFC5112233445566BA");
        assert_eq!(
            decoded,
            vec![(id("AABBCCDDEEFF"), -59), (id("112233445566"), -70)]
        );
    }

    #[test]
    fn test_decode_case_and_whitespace() {
        let decoded = HexReportDecoder.decode("aa bb cc dd ee ff c5\n");
        assert_eq!(decoded, vec![(id("AABBCCDDEEFF"), -59)]);
    }

    #[test]
    fn test_decode_truncated_and_garbage() {
        assert!(HexReportDecoder.decode("").is_empty());
        assert!(HexReportDecoder.decode("AABBCCDDEE").is_empty());
        let decoded = HexReportDecoder.decode("AABBCCDDEEFF05XXBBCCDDEEFF05");
        assert_eq!(decoded, vec![(id("AABBCCDDEEFF"), 5)]);
    }

    #[test]
    fn test_encode_skips_incomplete_devices() {
        let mut anonymous = ScannedDevice::default();
        anonymous.rssi = Some(-40);
        let devices = vec![
            anonymous,
            ScannedDevice::new(id("AABBCCDDEEFF"), -59),
            ScannedDevice::new(id("112233445566"), -70),
        ];
        assert_eq!(encode_report(&devices), "AABBCCDDEEFFC5112233445566BA");
    }

    #[test]
    fn test_advertising_frame_layout() {
        let frame = advertising_frame(&[ScannedDevice::new(id("AABBCCDDEEFF"), -59)]);
        assert_eq!(frame.len(), ADV_DATA_LEN + 1);
        assert_eq!(
            format_frame(&frame[..15]),
            "0E 02 01 06 0A FF FF FF AA BB CC DD EE FF C5"
        );
        assert!(frame[15..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_rssi_to_byte_saturates() {
        assert_eq!(rssi_to_byte(-200), 0x80);
        assert_eq!(rssi_to_byte(300), 0x7F);
        assert_eq!(rssi_to_byte(-59), 0xC5);
    }

    #[test]
    fn test_select_tags_by_company_id() {
        let tag = ScannedDevice::new(id("AABBCCDDEEFF"), -59)
            .with_manufacturer_data(0xFFFF, vec![0xAA, 0xBB]);
        let other = ScannedDevice::new(id("112233445566"), -70)
            .with_manufacturer_data(0x004C, vec![0x02, 0x15]);
        let bare = ScannedDevice::new(id("A1A2A3A4A5A6"), -40);

        let tags = select_tags(vec![other, tag.clone(), bare]);
        assert_eq!(tags, vec![tag]);
    }

    #[test]
    fn test_alarm_frame_layout() {
        let frame = alarm_frame("01 02").unwrap();
        assert_eq!(frame.len(), ADV_DATA_LEN + 1);
        assert_eq!(format_frame(&frame[..11]), "09 02 01 06 05 FF FF FE 01 02 00");
        assert!(frame[10..].iter().all(|b| *b == 0));

        let full = alarm_frame(&"AB".repeat(MAX_ALARM_DATA_LEN)).unwrap();
        assert_eq!(full.len(), ADV_DATA_LEN + 1);
        assert_eq!(full[0] as usize, ADV_DATA_LEN);
    }

    #[test]
    fn test_alarm_frame_rejects_bad_payload() {
        assert!(alarm_frame("0G").is_err());
        assert!(alarm_frame("ABC").is_err());
        assert!(alarm_frame(&"AB".repeat(MAX_ALARM_DATA_LEN + 1)).is_err());
    }
}
