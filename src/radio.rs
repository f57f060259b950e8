/// 标签端蓝牙无线电调度
///
/// 蓝牙收发本身不在本 crate 内实现，这里只定义传输接口 [`BleTransport`]
/// 和无线电状态机：同一时刻只能处于空闲、扫描、广播三者之一。
/// 状态被占用时新的请求直接跳过本周期，不排队。

use crate::algorithms::{advertising_frame, format_frame, DeviceFilter, ScannedDevice};
use crate::error::RadioMapResult;
use log::{debug, info};
use std::sync::Mutex;
use std::time::Duration;

/// 无线电状态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RadioState {
    Idle,
    Scanning,
    Advertising,
}

/// 无线电状态机
#[derive(Debug)]
pub struct RadioController {
    state: Mutex<RadioState>,
}

impl RadioController {
    pub fn new() -> Self {
        RadioController {
            state: Mutex::new(RadioState::Idle),
        }
    }

    /// 当前状态
    pub fn state(&self) -> RadioState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 从空闲进入扫描；非空闲时返回 None
    pub fn begin_scan(&self) -> Option<RadioSession<'_>> {
        self.enter(RadioState::Scanning)
    }

    /// 从空闲进入广播；非空闲时返回 None
    pub fn begin_advertise(&self) -> Option<RadioSession<'_>> {
        self.enter(RadioState::Advertising)
    }

    fn enter(&self, target: RadioState) -> Option<RadioSession<'_>> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != RadioState::Idle {
            debug!("无线电忙（{:?}），跳过 {:?}", *state, target);
            return None;
        }
        *state = target;
        Some(RadioSession {
            controller: self,
            state: target,
        })
    }

    fn release(&self) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = RadioState::Idle;
    }
}

impl Default for RadioController {
    fn default() -> Self {
        Self::new()
    }
}

/// 占用无线电的会话，析构时回到空闲
#[derive(Debug)]
pub struct RadioSession<'a> {
    controller: &'a RadioController,
    state: RadioState,
}

impl RadioSession<'_> {
    pub fn state(&self) -> RadioState {
        self.state
    }
}

impl Drop for RadioSession<'_> {
    fn drop(&mut self) {
        self.controller.release();
    }
}

// ============================================================================
// 传输接口与标签周期
// ============================================================================

/// 蓝牙传输接口（扫描与广播由外部实现）
#[allow(async_fn_in_trait)]
pub trait BleTransport {
    /// 扫描指定时长，返回看到的设备
    async fn scan(&self, duration: Duration) -> RadioMapResult<Vec<ScannedDevice>>;

    /// 以给定间隔广播数据，持续指定时长
    async fn advertise(&self, frame: &[u8], duration: Duration, period: Duration) -> RadioMapResult<()>;
}

/// 标签周期时长参数
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CycleTiming {
    pub scan: Duration,
    pub advertise: Duration,
    pub period: Duration,
}

impl Default for CycleTiming {
    fn default() -> Self {
        CycleTiming {
            scan: Duration::from_secs(5),
            advertise: Duration::from_secs(1),
            period: Duration::from_millis(200),
        }
    }
}

/// 一个标签周期的结果
#[derive(Clone, Debug, PartialEq)]
pub enum CycleOutcome {
    /// 无线电忙，本周期被跳过
    Skipped,
    /// 没有找到定位信标
    NoBeacons,
    /// 已广播包含若干信标的报告
    Advertised { beacons: usize },
}

/// 执行一个标签周期：扫描 -> 过滤排序 -> 广播最强的信标
pub async fn run_tag_cycle<T: BleTransport>(
    radio: &RadioController,
    transport: &T,
    filter: &DeviceFilter,
    timing: &CycleTiming,
) -> RadioMapResult<CycleOutcome> {
    let devices = {
        let Some(_session) = radio.begin_scan() else {
            return Ok(CycleOutcome::Skipped);
        };
        transport.scan(timing.scan).await?
    };

    let beacons = filter.sort_by_rssi(filter.select(devices));
    if beacons.is_empty() {
        info!("未找到定位信标");
        return Ok(CycleOutcome::NoBeacons);
    }

    let frame = advertising_frame(&beacons);
    let Some(_session) = radio.begin_advertise() else {
        return Ok(CycleOutcome::Skipped);
    };
    debug!("广播数据: {}", format_frame(&frame));
    transport.advertise(&frame, timing.advertise, timing.period).await?;

    info!("找到 {} 个定位信标，广播完成", beacons.len());
    Ok(CycleOutcome::Advertised {
        beacons: beacons.len(),
    })
}
