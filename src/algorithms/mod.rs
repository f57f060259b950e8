/// 指纹定位算法模块
///
/// 该模块提供基于 RSSI 指纹的室内定位实现：
/// - 勘测文件解析为指纹地图（radio_map）
/// - 实时报告编解码（packet）
/// - 信号空间误差度量（scoring）
/// - k 近邻加权定位（location_algorithms）

pub mod beacon;
pub mod location_algorithms;
pub mod packet;
pub mod radio_map;
pub mod results;
pub mod scoring;

pub use beacon::*;
pub use location_algorithms::*;
pub use packet::*;
pub use radio_map::*;
pub use results::*;
pub use scoring::*;
