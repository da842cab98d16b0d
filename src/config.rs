//! 标定与定位参数
//!
//! 默认值对应走廊房间查找场景：5 阶多项式描述信号随位置变化，
//! 信号以 dBm 计。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::ConfigError;

/// 指纹标定/定位配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintConfig {
    /// 标定阶段每个发射源的多项式阶数
    pub calibration_degree: usize,
    /// 实时定位阶段用于平均多次扫描的阶数（0 = 平均值）
    pub averaging_degree: usize,
    /// 最少样本数
    pub min_samples: usize,
    /// 估计最小信号下限 (dBm)
    pub min_signal: f64,
    /// 估计最大信号上限 (dBm)
    pub max_signal: f64,
    /// 最小信号幅度跨度 (dB)
    pub min_span: f64,
    /// 标定范围外位置的填充值 (dBm)
    pub out_of_range_signal: f64,
    /// estimate_min_y / estimate_max_y 的采样步数
    pub estimate_steps: usize,
    /// 每个位置单位的网格点数
    pub grid_steps_per_unit: usize,
    /// 标定时最多跟踪的发射源数量
    pub max_emitters: usize,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        FingerprintConfig {
            calibration_degree: 5,
            averaging_degree: 0,
            min_samples: 6,
            min_signal: -95.0,
            max_signal: -25.0,
            min_span: 15.0,
            out_of_range_signal: -95.0,
            estimate_steps: 100,
            grid_steps_per_unit: 2,
            max_emitters: 40,
        }
    }
}

impl FingerprintConfig {
    /// 从 JSON 字符串加载，缺省字段取默认值，加载后验证
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: FingerprintConfig = serde_json::from_str(json)?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// 从 JSON 文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// 验证参数的合理性
    pub fn validate(&self) -> Result<(), String> {
        if self.min_signal >= self.max_signal {
            return Err(format!(
                "信号下限 {} 必须小于上限 {}",
                self.min_signal, self.max_signal
            ));
        }
        // 平均时所有读数都学习在 x = 0 处，只有 0 阶有解
        if self.averaging_degree != 0 {
            return Err(format!("平均阶数必须为 0, 当前为 {}", self.averaging_degree));
        }
        if self.min_span < 0.0 {
            return Err("幅度跨度不能为负".to_string());
        }
        if self.estimate_steps == 0 || self.grid_steps_per_unit == 0 {
            return Err("采样步数和网格密度必须大于 0".to_string());
        }
        if self.max_emitters == 0 {
            return Err("发射源容量必须大于 0".to_string());
        }
        Ok(())
    }
}

impl fmt::Display for FingerprintConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "标定 {} 阶, 样本 >= {}, 信号 [{:.0}, {:.0}] dBm, 跨度 >= {:.0} dB, 网格 {}/单位",
            self.calibration_degree,
            self.min_samples,
            self.min_signal,
            self.max_signal,
            self.min_span,
            self.grid_steps_per_unit
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = FingerprintConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.calibration_degree, 5);
        assert_eq!(config.max_emitters, 40);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = FingerprintConfig::from_json(r#"{"min_span": 10.0, "max_emitters": 8}"#).unwrap();
        assert_eq!(config.min_span, 10.0);
        assert_eq!(config.max_emitters, 8);
        assert_eq!(config.min_samples, 6);
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let config = FingerprintConfig {
            min_signal: -20.0,
            max_signal: -30.0,
            ..FingerprintConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_averaging_degree() {
        let config = FingerprintConfig {
            averaging_degree: 1,
            ..FingerprintConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(matches!(
            FingerprintConfig::from_json(r#"{"averaging_degree": 2}"#),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_errors() {
        assert!(matches!(FingerprintConfig::from_json("{ min_span"), Err(ConfigError::Json(_))));
        let missing = std::env::temp_dir().join("fingerloc-no-such-config.json");
        assert!(matches!(FingerprintConfig::load(&missing), Err(ConfigError::Io(_))));
    }
}
