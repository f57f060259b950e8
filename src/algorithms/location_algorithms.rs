/// 指纹定位算法
///
/// - 实时观测（信标 -> RSSI）
/// - 候选参考点排序
/// - k 近邻（k = 3）反误差加权定位

use crate::algorithms::{
    BeaconId, PositionEstimate, RadioMap, RmseScorer, ScoreEngine, ScoredCandidate,
};
use log::debug;

/// 参与加权的参考点数
pub const TOP_K: usize = 3;
/// 误差低于该值视为完全匹配
pub const MIN_ERROR: f64 = 0.001;
/// 完全匹配的权重
pub const PERFECT_MATCH_WEIGHT: f64 = 1000.0;

// ============================================================================
// 实时观测
// ============================================================================

/// 一次实时扫描的观测：每个信标一个 RSSI 读数，保持出现顺序
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Observation {
    readings: Vec<(BeaconId, i16)>,
}

impl Observation {
    pub fn new() -> Self {
        Observation {
            readings: Vec::new(),
        }
    }

    /// 从 (信标, RSSI) 对创建；重复的信标以最后一次读数为准
    pub fn from_pairs(pairs: impl IntoIterator<Item = (BeaconId, i16)>) -> Self {
        let mut observation = Observation::new();
        for (beacon, rssi) in pairs {
            observation.insert(beacon, rssi);
        }
        observation
    }

    /// 添加读数，已存在时覆盖并保留原位置
    pub fn insert(&mut self, beacon: BeaconId, rssi: i16) {
        match self.readings.iter_mut().find(|(b, _)| *b == beacon) {
            Some(entry) => entry.1 = rssi,
            None => self.readings.push((beacon, rssi)),
        }
    }

    pub fn get(&self, beacon: &BeaconId) -> Option<i16> {
        self.readings
            .iter()
            .find(|(b, _)| b == beacon)
            .map(|(_, rssi)| *rssi)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BeaconId, i16)> {
        self.readings.iter().map(|(b, rssi)| (b, *rssi))
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

// ============================================================================
// 定位器
// ============================================================================

/// 指纹定位器
///
/// 对每个参考点评分，取误差最小的 [`TOP_K`] 个做反误差加权平均。
/// 无内部状态，可在多个调用方之间共享。
#[derive(Clone, Debug, Default)]
pub struct Localizer<S = RmseScorer> {
    scorer: S,
}

impl<S: ScoreEngine> Localizer<S> {
    pub fn new(scorer: S) -> Self {
        Localizer { scorer }
    }

    /// 对全部参考点评分并按误差升序排列
    ///
    /// 稳定排序：误差相同时保持地图中的原始顺序。
    pub fn rank<'a>(&self, map: &'a RadioMap, observation: &Observation) -> Vec<ScoredCandidate<'a>> {
        let mut scored: Vec<_> = map
            .iter()
            .map(|point| ScoredCandidate {
                point,
                error: self.scorer.score(observation, point),
            })
            .collect();
        scored.sort_by(|a, b| a.error.total_cmp(&b.error));
        scored
    }

    /// 定位；地图为空、观测为空或总权重为 0 时返回 None
    pub fn locate(&self, map: &RadioMap, observation: &Observation) -> Option<PositionEstimate> {
        if observation.is_empty() {
            debug!("观测为空，无法定位");
            return None;
        }

        let mut ranked = self.rank(map, observation);
        ranked.truncate(TOP_K);
        let estimate = weighted_estimate(&ranked);
        if estimate.is_none() {
            debug!("{} 个候选参考点均无有效权重，无法定位", ranked.len());
        }
        estimate
    }
}

/// 误差 -> 权重
pub fn candidate_weight(error: f64) -> f64 {
    if error > MIN_ERROR {
        1.0 / error
    } else {
        PERFECT_MATCH_WEIGHT
    }
}

/// 对已排序的候选做加权平均，第一个候选提供名称
pub fn weighted_estimate(candidates: &[ScoredCandidate<'_>]) -> Option<PositionEstimate> {
    let closest = candidates.first()?;

    let mut total_weight = 0.0;
    let mut weighted_x = 0.0;
    let mut weighted_y = 0.0;
    for candidate in candidates {
        let weight = candidate_weight(candidate.error);
        weighted_x += candidate.point.x * weight;
        weighted_y += candidate.point.y * weight;
        total_weight += weight;
    }

    if total_weight == 0.0 {
        return None;
    }

    Some(PositionEstimate {
        x: weighted_x / total_weight,
        y: weighted_y / total_weight,
        label: closest.point.label.clone(),
        best_error: closest.error,
        neighbors: candidates.len(),
    })
}
