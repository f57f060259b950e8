/// 信号空间误差度量
///
/// 只比较观测中出现的信标：参考点多出的、本次未扫到的信标不计入误差，
/// 稀疏的实时扫描因此不会被惩罚。观测到但参考点指纹中没有的信标
/// 计固定惩罚 [`PENALTY_SQ`]（相当于 50 dBm 的偏差）。

use crate::algorithms::{Observation, ReferencePoint};

/// 缺失信标的平方误差惩罚
pub const PENALTY_SQ: f64 = 2500.0;

/// 评分能力
pub trait ScoreEngine {
    /// 观测与参考点之间的误差，`>= 0` 或 `+inf`
    fn score(&self, observation: &Observation, point: &ReferencePoint) -> f64;
}

/// 均方根误差评分
#[derive(Clone, Copy, Debug, Default)]
pub struct RmseScorer;

impl ScoreEngine for RmseScorer {
    fn score(&self, observation: &Observation, point: &ReferencePoint) -> f64 {
        if observation.is_empty() {
            return f64::INFINITY;
        }

        let sum: f64 = observation
            .iter()
            .map(|(beacon, rssi)| squared_error(rssi, point.expected_rssi(beacon)))
            .sum();

        (sum / observation.len() as f64).sqrt()
    }
}

/// 单个信标的平方误差
pub fn squared_error(observed: i16, expected: Option<f64>) -> f64 {
    match expected {
        Some(expected) => (observed as f64 - expected).powi(2),
        None => PENALTY_SQ,
    }
}
