//! 位置网格与指纹地图
//!
//! 标定结束后，把通过质量筛选的发射源模型在细分的位置网格上采样，
//! 得到 发射源 x 网格位置 的预测信号查找表。地图只读，重新标定时整体替换。

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::algorithms::curve_fit::PolynomialFit;
use crate::algorithms::fingerprint::{FingerprintSet, PositionRange};
use crate::config::FingerprintConfig;
use crate::error::MapError;

/// 单个网格的最大点数
pub const MAX_GRID_POINTS: usize = 100_000;

/// 覆盖 [min_pos, max_pos] 的有序位置网格
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionGrid {
    positions: Vec<f64>,
}

impl PositionGrid {
    /// 按 `steps_per_unit` 的密度细分观测范围
    ///
    /// 点数为 steps_per_unit * round(max - min)，至少 1 个；
    /// 步长按取整后的跨度计算，最后一个点不包含 max 本身。
    /// 点数超过 [`MAX_GRID_POINTS`] 时返回错误。
    pub fn spanning(range: PositionRange, steps_per_unit: usize) -> Result<Self, MapError> {
        if range.is_empty() {
            return Err(MapError::EmptyGrid);
        }
        let units = range.span().round();
        if !range.min.is_finite() || !units.is_finite() {
            return Err(MapError::InvalidRange {
                min: range.min,
                max: range.max,
            });
        }

        let points = units * steps_per_unit as f64;
        if points > MAX_GRID_POINTS as f64 {
            return Err(MapError::GridTooLarge {
                points,
                limit: MAX_GRID_POINTS,
            });
        }
        let count = (points as usize).max(1);
        let step = units / count as f64;

        let mut positions = Vec::new();
        positions
            .try_reserve_exact(count)
            .map_err(|_| MapError::GridTooLarge {
                points,
                limit: MAX_GRID_POINTS,
            })?;
        positions.extend((0..count).map(|i| range.min + i as f64 * step));
        Ok(PositionGrid { positions })
    }

    /// 从已保存的位置序列恢复
    pub fn from_positions(positions: Vec<f64>) -> Result<Self, MapError> {
        if positions.is_empty() {
            return Err(MapError::EmptyGrid);
        }
        Ok(PositionGrid { positions })
    }

    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// 是否为第一个或最后一个网格点
    pub fn is_boundary(&self, index: usize) -> bool {
        index == 0 || index + 1 == self.positions.len()
    }
}

/// 指纹地图：网格 + 发射源列表 + 预测信号表
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FingerprintMap {
    grid: PositionGrid,
    emitters: Vec<String>,
    /// table[e][x]: 发射源 e 在网格点 x 处的预测信号
    table: Vec<Vec<f64>>,
    calibrated_at: DateTime<Utc>,
}

impl FingerprintMap {
    /// 校验尺寸后创建地图
    pub fn new(grid: PositionGrid, emitters: Vec<String>, table: Vec<Vec<f64>>) -> Result<Self, MapError> {
        let map = FingerprintMap {
            grid,
            emitters,
            table,
            calibrated_at: Utc::now(),
        };
        map.validate()?;
        Ok(map)
    }

    fn validate(&self) -> Result<(), MapError> {
        if self.grid.is_empty() {
            return Err(MapError::EmptyGrid);
        }
        if self.table.len() != self.emitters.len() {
            return Err(MapError::Shape {
                what: "表格行数",
                expected: self.emitters.len(),
                got: self.table.len(),
            });
        }
        if let Some(row) = self.table.iter().find(|row| row.len() != self.grid.len()) {
            return Err(MapError::Shape {
                what: "表格列数",
                expected: self.grid.len(),
                got: row.len(),
            });
        }
        Ok(())
    }

    pub fn grid(&self) -> &PositionGrid {
        &self.grid
    }

    /// 保留的发射源（与表格行顺序一致）
    pub fn emitters(&self) -> &[String] {
        &self.emitters
    }

    pub fn table(&self) -> &[Vec<f64>] {
        &self.table
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.emitters.iter().position(|e| e == id)
    }

    /// 某个发射源在所有网格点上的预测信号
    pub fn row(&self, id: &str) -> Option<&[f64]> {
        self.index_of(id).map(|e| self.table[e].as_slice())
    }

    pub fn value(&self, emitter: usize, grid_index: usize) -> Option<f64> {
        self.table.get(emitter)?.get(grid_index).copied()
    }

    pub fn emitter_count(&self) -> usize {
        self.emitters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emitters.is_empty()
    }

    pub fn calibrated_at(&self) -> DateTime<Utc> {
        self.calibrated_at
    }

    pub fn to_json(&self) -> Result<String, MapError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, MapError> {
        let map: FingerprintMap = serde_json::from_str(json)?;
        map.validate()?;
        Ok(map)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), MapError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, MapError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// 楼层数据文本格式
    ///
    /// ```text
    /// n_grid;n_emitters
    /// 每行一个网格位置
    /// 每行一个发射源标识
    /// (空行)
    /// 每个网格位置一行，各发射源的值以分号分隔
    /// ```
    pub fn to_floor_text(&self) -> String {
        let mut out = format!("{};{}\n", self.grid.len(), self.emitters.len());
        for x in self.grid.positions() {
            out.push_str(&format!("{:.6}\n", x));
        }
        for id in &self.emitters {
            out.push_str(id);
            out.push('\n');
        }
        if !self.emitters.is_empty() {
            out.push('\n');
            for x in 0..self.grid.len() {
                let row: Vec<String> = self.table.iter().map(|r| format!("{:.6}", r[x])).collect();
                out.push_str(&row.join(";"));
                out.push('\n');
            }
        }
        out
    }

    /// 解析楼层数据文本，空行被忽略
    pub fn from_floor_text(text: &str) -> Result<Self, MapError> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty());

        let (header_line, header) = lines.next().ok_or(MapError::Parse {
            line: 1,
            message: "缺少表头".to_string(),
        })?;
        let mut dims = header.split(';').map(|v| v.trim().parse::<usize>());
        let (n_grid, n_emitters) = match (dims.next(), dims.next()) {
            (Some(Ok(n)), Some(Ok(m))) => (n, m),
            _ => {
                return Err(MapError::Parse {
                    line: header_line,
                    message: format!("表头格式错误: {:?}", header),
                });
            }
        };

        let mut next_line = |what: &str| {
            lines.next().ok_or_else(|| MapError::Parse {
                line: 0,
                message: format!("文件提前结束，缺少{}", what),
            })
        };

        // 表头中的数量未经验证，不能据此预分配
        let mut positions = Vec::new();
        for _ in 0..n_grid {
            let (number, line) = next_line("网格位置")?;
            positions.push(parse_value(line, number)?);
        }

        let mut emitters = Vec::new();
        for _ in 0..n_emitters {
            let (_, line) = next_line("发射源标识")?;
            emitters.push(line.to_string());
        }

        let mut table = vec![Vec::new(); emitters.len()];
        if n_emitters > 0 {
            for _ in 0..n_grid {
                let (number, line) = next_line("表格行")?;
                let values = line
                    .split(';')
                    .map(|v| parse_value(v, number))
                    .collect::<Result<Vec<_>, _>>()?;
                if values.len() != n_emitters {
                    return Err(MapError::Shape {
                        what: "表格行的值个数",
                        expected: n_emitters,
                        got: values.len(),
                    });
                }
                for (row, value) in table.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }

        Self::new(PositionGrid::from_positions(positions)?, emitters, table)
    }
}

fn parse_value(value: &str, line: usize) -> Result<f64, MapError> {
    value.trim().parse::<f64>().map_err(|_| MapError::Parse {
        line,
        message: format!("不是数值: {:?}", value),
    })
}

/// 发射源未通过质量筛选的原因
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Rejection {
    TooFewSamples { count: usize, required: usize },
    Unsolved,
    TooWeak { min_y: f64 },
    TooStrong { max_y: f64 },
    FlatSpan { span: f64 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::TooFewSamples { count, required } => {
                write!(f, "样本不足 ({} < {})", count, required)
            }
            Rejection::Unsolved => write!(f, "模型无解"),
            Rejection::TooWeak { min_y } => write!(f, "信号过弱 (min {:.1} dBm)", min_y),
            Rejection::TooStrong { max_y } => write!(f, "信号过强 (max {:.1} dBm)", max_y),
            Rejection::FlatSpan { span } => write!(f, "幅度不足 ({:.1} dB)", span),
        }
    }
}

/// 指纹地图构建器
pub struct FingerprintMapBuilder {
    config: FingerprintConfig,
}

impl FingerprintMapBuilder {
    pub fn new(config: FingerprintConfig) -> Self {
        FingerprintMapBuilder { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(FingerprintConfig::default())
    }

    pub fn config(&self) -> &FingerprintConfig {
        &self.config
    }

    /// 检查单个模型是否可用于定位
    ///
    /// 需要：样本数足够、模型有解、估计最小信号不低于下限、
    /// 估计最大信号不高于上限、幅度跨度足够。
    pub fn check(&self, fit: &PolynomialFit) -> Result<(), Rejection> {
        if fit.count() < self.config.min_samples {
            return Err(Rejection::TooFewSamples {
                count: fit.count(),
                required: self.config.min_samples,
            });
        }
        if !fit.is_solved() {
            return Err(Rejection::Unsolved);
        }

        let min_y = fit.estimate_min_y_with(self.config.estimate_steps);
        let max_y = fit.estimate_max_y_with(self.config.estimate_steps);
        if min_y < self.config.min_signal {
            return Err(Rejection::TooWeak { min_y });
        }
        if max_y > self.config.max_signal {
            return Err(Rejection::TooStrong { max_y });
        }
        let span = (max_y - min_y).abs();
        if span < self.config.min_span {
            return Err(Rejection::FlatSpan { span });
        }
        Ok(())
    }

    /// 筛选指纹并生成查找表
    ///
    /// 未通过筛选的指纹被清空并释放槽位。范围外的网格点填充为
    /// `out_of_range_signal`，不做外推。
    pub fn build(&self, set: &mut FingerprintSet, range: PositionRange) -> Result<FingerprintMap, MapError> {
        let grid = PositionGrid::spanning(range, self.config.grid_steps_per_unit)?;
        let candidates = set.assigned_count();

        let mut emitters = Vec::new();
        let mut table = Vec::new();

        for fingerprint in set.slots_mut().iter_mut().filter(|fp| fp.is_assigned()) {
            if let Err(reason) = self.check(&fingerprint.fit) {
                debug!(id = %fingerprint.id, %reason, "emitter rejected");
                fingerprint.unassign();
                continue;
            }

            let row = grid
                .positions()
                .iter()
                .map(|&x| fingerprint.fit.predict_or(x, self.config.out_of_range_signal))
                .collect();
            emitters.push(fingerprint.id.clone());
            table.push(row);
        }

        if emitters.is_empty() {
            warn!(candidates, "no usable emitters after filtering");
            return Err(MapError::NoUsableEmitters { candidates });
        }

        info!(
            candidates,
            retained = emitters.len(),
            grid_points = grid.len(),
            min_pos = range.min,
            max_pos = range.max,
            "fingerprint map built"
        );
        FingerprintMap::new(grid, emitters, table)
    }

    /// 使用集合自身记录的位置范围构建
    pub fn build_from_set(&self, set: &mut FingerprintSet) -> Result<FingerprintMap, MapError> {
        let range = set.position_range();
        self.build(set, range)
    }
}
