//! 错误类型定义
//!
//! 回归拟合、指纹地图构建/加载、配置加载、采集记录解析各自一个错误枚举。

use thiserror::Error;

/// 多项式拟合错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    /// 累加矩阵无法分配（阶数过大或内存不足）
    #[error("无法为 {degree} 阶拟合分配累加矩阵")]
    AllocationFailed { degree: usize },

    /// 模型未初始化或初始化失败
    #[error("拟合模型未就绪")]
    NotReady,

    /// 样本不足或 x 分布退化，矩矩阵奇异
    #[error("数据不足: {samples} 个样本, 至少需要 {required} 个互不相同的 x")]
    InsufficientData { samples: usize, required: usize },
}

/// 指纹地图构建与持久化错误
#[derive(Debug, Error)]
pub enum MapError {
    /// 没有任何发射源通过质量筛选
    #[error("没有可用的发射源 (候选 {candidates} 个)")]
    NoUsableEmitters { candidates: usize },

    /// 位置网格为空
    #[error("位置网格为空")]
    EmptyGrid,

    /// 位置范围不是有限值
    #[error("位置范围无效: [{min}, {max}]")]
    InvalidRange { min: f64, max: f64 },

    /// 网格点数超过上限或无法分配
    #[error("位置网格过大: {points} 个点 (上限 {limit})")]
    GridTooLarge { points: f64, limit: usize },

    /// 表格尺寸与网格/发射源列表不一致
    #[error("地图尺寸不一致: {what} 期望 {expected}, 实际 {got}")]
    Shape {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    /// 楼层文本格式解析失败
    #[error("第 {line} 行解析失败: {message}")]
    Parse { line: usize, message: String },

    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("配置 JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("配置文件读取失败: {0}")]
    Io(#[from] std::io::Error),

    /// 参数不合理
    #[error("配置无效: {0}")]
    Invalid(String),
}

/// 采集记录解析错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    /// 字段数量不对
    #[error("第 {line} 行格式错误: {content:?}")]
    Malformed { line: usize, content: String },

    /// 数值字段无法解析
    #[error("第 {line} 行字段 {field} 不是数值: {value:?}")]
    InvalidNumber {
        line: usize,
        field: &'static str,
        value: String,
    },
}
