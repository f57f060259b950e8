/// 定位结果数据结构

use crate::algorithms::ReferencePoint;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 参与排序的候选参考点
#[derive(Clone, Debug)]
pub struct ScoredCandidate<'a> {
    pub point: &'a ReferencePoint,
    /// 信号空间误差 (dBm)
    pub error: f64,
}

/// 定位结果
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionEstimate {
    /// X 坐标（与勘测文件单位一致）
    pub x: f64,
    /// Y 坐标
    pub y: f64,
    /// 误差最小的参考点名称
    pub label: String,
    /// 最近参考点的误差
    pub best_error: f64,
    /// 参与加权的参考点数量
    pub neighbors: usize,
}

impl PositionEstimate {
    /// 获取 2D 坐标
    pub fn xy(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    /// 与另一结果的 2D 距离
    pub fn distance_to(&self, other: &PositionEstimate) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl fmt::Display for PositionEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.2}, {:.2}) 最近: {} [误差 {:.2} dBm, {} 个参考点]",
            self.x, self.y, self.label, self.best_error, self.neighbors
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_calculation() {
        let a = PositionEstimate {
            x: 0.0,
            y: 0.0,
            label: "A".to_string(),
            best_error: 1.0,
            neighbors: 3,
        };
        let b = PositionEstimate {
            x: 3.0,
            y: 4.0,
            ..a.clone()
        };
        assert_eq!(a.distance_to(&b), 5.0);
        assert_eq!(b.xy(), (3.0, 4.0));
    }
}
