//! 指纹定位算法模块
//!
//! 数据单向流动：
//! - 采集记录 -> 每个发射源的增量多项式模型 (`curve_fit`, `fingerprint`)
//! - 筛选后的模型 -> 指纹地图 (`fingerprint_map`)
//! - 新的扫描读数 + 指纹地图 -> 位置估计 (`estimator`)

pub mod curve_fit;
pub mod estimator;
pub mod fingerprint;
pub mod fingerprint_map;
pub mod matrix;
pub mod records;
pub mod results;

pub use curve_fit::*;
pub use estimator::*;
pub use fingerprint::*;
pub use fingerprint_map::*;
pub use matrix::*;
pub use records::*;
pub use results::*;
