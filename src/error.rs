/// 指纹定位错误类型
///
/// 核心路径（加载、解码、定位）上的错误都在本地吸收：记录日志后降级，
/// 不会作为致命错误抛给调用方。此枚举用于需要向调用方报告的场合。

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// 指纹定位操作的结果类型
pub type RadioMapResult<T> = Result<T, RadioMapError>;

#[derive(Error, Debug)]
pub enum RadioMapError {
    /// 勘测文件不存在或无法读取
    #[error("勘测文件不可用: {}: {}", .path.display(), .source)]
    MapFileUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 勘测文件中格式错误的表头或扫描项（仅跳过该项）
    #[error("勘测文件第 {line} 行格式异常: {reason}")]
    MapParseAnomaly { line: usize, reason: String },

    /// 实时报告十六进制串格式错误或被截断
    #[error("实时报告在偏移 {offset} 处解码异常: {reason}")]
    ReportDecodeAnomaly { offset: usize, reason: String },

    /// 信标标识符不是 12 位十六进制
    #[error("无效的信标标识符: '{0}'")]
    InvalidBeaconId(String),

    /// 参考点名称无法写入勘测文件（含冒号、逗号或换行）
    #[error("无效的参考点名称: '{0}'")]
    InvalidLabel(String),

    /// 配置文件读取或解析失败
    #[error("配置错误: {0}")]
    Config(String),

    /// 蓝牙传输层错误（扫描 / 广播）
    #[error("蓝牙传输错误: {0}")]
    Transport(String),

    /// 持久化或发布失败
    #[error("结果输出失败: {0}")]
    Sink(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}
