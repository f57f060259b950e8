//! 蓝牙 RSSI 指纹室内定位
//!
//! 运营人员事先在建筑内勘测各位置可见的信标及信号强度，之后任何设备
//! 只需上报一次实时扫描即可估计其二维位置。

pub mod algorithms;
pub mod config;
pub mod error;
pub mod positioning;
pub mod radio;
pub mod service;

pub use error::{RadioMapError, RadioMapResult};
pub use positioning::{load_map, locate, Positioner};
