//! 基于信号指纹的一维室内定位
//!
//! 标定阶段沿走廊逐点扫描，每个发射源的信号强度用增量多项式回归建模，
//! 生成指纹地图；运行阶段用最近指纹搜索估计当前位置。

pub mod algorithms;
pub mod config;
pub mod error;

pub use config::FingerprintConfig;
pub use error::{ConfigError, FitError, MapError, RecordError};
