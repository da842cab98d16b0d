//! 定位结果数据结构
//!
//! 最近指纹搜索的输出：数值位置、超出标定范围或无法判断。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 定位结论
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum PositionEstimate {
    /// 网格内部的最佳位置
    Position(f64),
    /// 最小值落在网格边界，真实位置可能在标定范围之外
    OutOfRange { nearest: f64 },
    /// 没有可匹配的发射源或地图为空
    Unknown,
}

impl PositionEstimate {
    /// 只有可信的数值结果才返回 Some
    pub fn position(&self) -> Option<f64> {
        match self {
            PositionEstimate::Position(x) => Some(*x),
            _ => None,
        }
    }

    pub fn is_out_of_range(&self) -> bool {
        matches!(self, PositionEstimate::OutOfRange { .. })
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, PositionEstimate::Unknown)
    }
}

impl fmt::Display for PositionEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionEstimate::Position(x) => write!(f, "{:.2}", x),
            PositionEstimate::OutOfRange { .. } => write!(f, "far away..."),
            PositionEstimate::Unknown => write!(f, "No idea"),
        }
    }
}

/// 一次定位的完整结果
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PositionResult {
    pub estimate: PositionEstimate,
    /// 同时出现在本批读数和地图中的发射源数量
    pub matched_emitters: usize,
    /// 最小平方和，Unknown 时为 None
    pub residual: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl PositionResult {
    pub fn new(estimate: PositionEstimate, matched_emitters: usize, residual: Option<f64>) -> Self {
        PositionResult {
            estimate,
            matched_emitters,
            residual,
            timestamp: Utc::now(),
        }
    }

    /// 无法定位
    pub fn unknown() -> Self {
        Self::new(PositionEstimate::Unknown, 0, None)
    }

    /// 每个匹配发射源的均方根偏差 (dB)
    pub fn rms_error(&self) -> Option<f64> {
        match (self.residual, self.matched_emitters) {
            (Some(sum), n) if n > 0 => Some((sum / n as f64).sqrt()),
            _ => None,
        }
    }

    /// 获取详细描述
    pub fn detailed_description(&self) -> String {
        format!(
            "结果: {}, 匹配发射源: {}, 偏差: {}, 时间: {}",
            self.estimate,
            self.matched_emitters,
            self.rms_error()
                .map(|e| format!("{:.2} dB", e))
                .unwrap_or_else(|| "-".to_string()),
            self.timestamp.format("%H:%M:%S%.3f")
        )
    }
}

impl fmt::Display for PositionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.estimate, self.matched_emitters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_display() {
        assert_eq!(PositionEstimate::Position(12.5).to_string(), "12.50");
        assert_eq!(PositionEstimate::OutOfRange { nearest: 0.0 }.to_string(), "far away...");
        assert_eq!(PositionEstimate::Unknown.to_string(), "No idea");
    }

    #[test]
    fn test_position_only_for_numeric() {
        assert_eq!(PositionEstimate::Position(-2.0).position(), Some(-2.0));
        assert_eq!(PositionEstimate::OutOfRange { nearest: 3.0 }.position(), None);
        assert!(PositionResult::unknown().estimate.is_unknown());
    }

    #[test]
    fn test_rms_error() {
        let result = PositionResult::new(PositionEstimate::Position(1.0), 4, Some(16.0));
        assert_eq!(result.rms_error(), Some(2.0));
        assert_eq!(PositionResult::unknown().rms_error(), None);
    }
}
