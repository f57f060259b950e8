/// 蓝牙指纹室内定位入口
///
/// 支持的功能：
/// - 启动时加载勘测文件为只读指纹地图
/// - 将实时报告解码、评分并加权定位
///
/// 地图加载完成后只读，[`Positioner`] 可通过 `Arc` 在多个任务间共享，无需加锁。

use crate::algorithms::{
    HexReportDecoder, Localizer, MapLoad, MapLoader, PacketDecoder, PositionEstimate, RadioMap,
    RmseScorer, ScoreEngine, SurveyLoader,
};
use crate::error::RadioMapError;
use log::debug;
use std::path::Path;
use std::sync::Arc;

/// 加载勘测文件
///
/// 永不失败：文件不可用时 `map` 为空，原因在 [`MapLoad::error`] 中。
pub fn load_map(path: impl AsRef<Path>) -> MapLoad {
    SurveyLoader.load(path.as_ref())
}

/// 用默认解码器和评分器对一份实时报告定位
pub fn locate(map: &RadioMap, report: &str) -> Option<PositionEstimate> {
    let observation = HexReportDecoder.decode_observation(report);
    Localizer::<RmseScorer>::default().locate(map, &observation)
}

/// 绑定一张指纹地图的定位器
#[derive(Clone, Debug)]
pub struct Positioner<D = HexReportDecoder, S = RmseScorer> {
    map: Arc<RadioMap>,
    decoder: D,
    localizer: Localizer<S>,
}

impl Positioner {
    /// 使用默认解码器和 RMSE 评分
    pub fn new(map: Arc<RadioMap>) -> Self {
        Positioner::with_parts(map, HexReportDecoder, RmseScorer)
    }

    /// 从勘测文件构建；文件不可用时使用空地图，并返回原因
    pub fn from_survey(path: impl AsRef<Path>) -> (Self, Option<RadioMapError>) {
        let load = load_map(path);
        (Positioner::new(Arc::new(load.map)), load.error)
    }
}

impl<D: PacketDecoder, S: ScoreEngine> Positioner<D, S> {
    pub fn with_parts(map: Arc<RadioMap>, decoder: D, scorer: S) -> Self {
        Positioner {
            map,
            decoder,
            localizer: Localizer::new(scorer),
        }
    }

    pub fn map(&self) -> &RadioMap {
        &self.map
    }

    /// 解码报告并定位
    pub fn locate_report(&self, report: &str) -> Option<PositionEstimate> {
        let observation = self.decoder.decode_observation(report);
        debug!("报告解码得到 {} 个信标", observation.len());
        self.localizer.locate(&self.map, &observation)
    }
}
