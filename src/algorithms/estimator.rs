//! 最近指纹定位
//!
//! 把一批扫描读数（同一发射源可能出现多次）先按发射源求平均，
//! 再在指纹地图的每个网格点上计算与预测信号的平方差之和，取最小者。

use tracing::{debug, warn};

use crate::algorithms::fingerprint::FingerprintSet;
use crate::algorithms::fingerprint_map::FingerprintMap;
use crate::algorithms::results::{PositionEstimate, PositionResult};
use crate::config::FingerprintConfig;

/// 单个读数
#[derive(Clone, Debug, PartialEq)]
pub struct Reading {
    /// 发射源标识
    pub emitter_id: String,
    /// 信号强度 (dBm)
    pub signal: f64,
}

impl Reading {
    pub fn new(emitter_id: impl Into<String>, signal: f64) -> Self {
        Reading {
            emitter_id: emitter_id.into(),
            signal,
        }
    }
}

/// 一批读数，允许同一发射源重复出现（多次扫描）
#[derive(Clone, Debug, Default)]
pub struct ScanBatch {
    readings: Vec<Reading>,
}

impl ScanBatch {
    pub fn new() -> Self {
        ScanBatch {
            readings: Vec::new(),
        }
    }

    /// 从 (emitter_id, signal) 对创建
    pub fn from_pairs(pairs: &[(&str, f64)]) -> Self {
        ScanBatch {
            readings: pairs.iter().map(|(id, s)| Reading::new(*id, *s)).collect(),
        }
    }

    pub fn add(&mut self, emitter_id: impl Into<String>, signal: f64) {
        self.readings.push(Reading::new(emitter_id, signal));
    }

    /// 追加一次完整扫描
    pub fn extend_scan(&mut self, scan: impl IntoIterator<Item = Reading>) {
        self.readings.extend(scan);
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn clear(&mut self) {
        self.readings.clear();
    }
}

impl FromIterator<Reading> for ScanBatch {
    fn from_iter<I: IntoIterator<Item = Reading>>(iter: I) -> Self {
        ScanBatch {
            readings: iter.into_iter().collect(),
        }
    }
}

/// 指纹地图上的位置估计器
pub struct PositionEstimator {
    config: FingerprintConfig,
}

impl PositionEstimator {
    pub fn new(config: FingerprintConfig) -> Self {
        PositionEstimator { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(FingerprintConfig::default())
    }

    /// 按发射源平均读数，顺序与地图中的发射源一致
    ///
    /// 返回 (地图行号, 平均信号)；只出现在一侧的发射源不参与。
    pub fn average(&self, readings: &[Reading], map: &FingerprintMap) -> Vec<(usize, f64)> {
        let mut averages = match FingerprintSet::for_emitters(map.emitters(), self.config.averaging_degree) {
            Ok(set) => set,
            Err(e) => {
                warn!(error = %e, "unable to allocate averaging models");
                return Vec::new();
            }
        };

        for reading in readings {
            if map.index_of(&reading.emitter_id).is_some() {
                averages.learn(&reading.emitter_id, 0.0, reading.signal);
            } else {
                debug!(id = %reading.emitter_id, "reading from unmapped emitter ignored");
            }
        }

        averages
            .assigned()
            .enumerate()
            .filter(|(_, fp)| fp.fit.count() > 0)
            .map(|(row, fp)| (row, fp.fit.predict(0.0)))
            .collect()
    }

    /// 每个网格点上的平方差之和
    pub fn square_sums(&self, observed: &[(usize, f64)], map: &FingerprintMap) -> Vec<f64> {
        let mut sums = vec![0.0; map.grid().len()];
        for &(row, mean) in observed {
            for (sum, expected) in sums.iter_mut().zip(&map.table()[row]) {
                let diff = mean - expected;
                *sum += diff * diff;
            }
        }
        sums
    }

    /// 定位
    ///
    /// 最小值取网格顺序上的第一个；落在第一个或最后一个网格点时报告超出范围。
    pub fn estimate(&self, readings: &[Reading], map: &FingerprintMap) -> PositionResult {
        if map.is_empty() || map.grid().is_empty() {
            return PositionResult::unknown();
        }

        let observed = self.average(readings, map);
        if observed.is_empty() {
            debug!(readings = readings.len(), "no emitter matched the map");
            return PositionResult::unknown();
        }

        let sums = self.square_sums(&observed, map);
        let mut best = 0;
        for (index, sum) in sums.iter().enumerate() {
            if *sum < sums[best] {
                best = index;
            }
        }

        let position = map.grid().positions()[best];
        debug!(
            matched = observed.len(),
            best_index = best,
            position,
            residual = sums[best],
            "nearest fingerprint"
        );

        let estimate = if map.grid().is_boundary(best) {
            PositionEstimate::OutOfRange { nearest: position }
        } else {
            PositionEstimate::Position(position)
        };
        PositionResult::new(estimate, observed.len(), Some(sums[best]))
    }

    /// 对可能缺失的地图定位
    pub fn estimate_with(&self, readings: &[Reading], map: Option<&FingerprintMap>) -> PositionResult {
        match map {
            Some(map) => self.estimate(readings, map),
            None => PositionResult::unknown(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::fingerprint_map::PositionGrid;
    use approx::assert_relative_eq;

    fn synthetic_map() -> FingerprintMap {
        // 5 个网格点，两个发射源信号方向相反
        let grid = PositionGrid::from_positions(vec![0.0, 0.5, 1.0, 1.5, 2.0]).unwrap();
        FingerprintMap::new(
            grid,
            vec!["A".to_string(), "B".to_string()],
            vec![
                vec![-40.0, -50.0, -60.0, -70.0, -80.0],
                vec![-80.0, -70.0, -60.0, -50.0, -40.0],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_repeated_scans_are_averaged() {
        let map = synthetic_map();
        let batch = ScanBatch::from_pairs(&[("A", -48.0), ("B", -70.0), ("A", -52.0), ("X", -10.0)]);
        let averages = PositionEstimator::with_defaults().average(batch.readings(), &map);
        assert_eq!(averages.len(), 2);
        assert_eq!(averages[0].0, 0);
        assert_relative_eq!(averages[0].1, -50.0, epsilon = 1e-12);
        assert_relative_eq!(averages[1].1, -70.0, epsilon = 1e-12);
    }

    #[test]
    fn test_interior_minimum() {
        let map = synthetic_map();
        let batch = ScanBatch::from_pairs(&[("A", -51.0), ("B", -69.0)]);
        let result = PositionEstimator::with_defaults().estimate(batch.readings(), &map);
        assert_eq!(result.estimate, PositionEstimate::Position(0.5));
        assert_eq!(result.matched_emitters, 2);
        assert_relative_eq!(result.residual.unwrap(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_boundary_minimum_is_out_of_range() {
        let map = synthetic_map();
        let batch = ScanBatch::from_pairs(&[("A", -35.0), ("B", -85.0)]);
        let result = PositionEstimator::with_defaults().estimate(batch.readings(), &map);
        assert_eq!(result.estimate, PositionEstimate::OutOfRange { nearest: 0.0 });

        let batch = ScanBatch::from_pairs(&[("B", -41.0)]);
        let result = PositionEstimator::with_defaults().estimate(batch.readings(), &map);
        assert!(result.estimate.is_out_of_range());
    }

    #[test]
    fn test_ties_pick_first_grid_point() {
        let grid = PositionGrid::from_positions(vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        let map = FingerprintMap::new(grid, vec!["A".to_string()], vec![vec![-90.0, -60.0, -60.0, -90.0]]).unwrap();
        let result = PositionEstimator::with_defaults().estimate(&[Reading::new("A", -60.0)], &map);
        assert_eq!(result.estimate, PositionEstimate::Position(1.0));
    }

    #[test]
    fn test_unknown_when_nothing_matches() {
        let map = synthetic_map();
        let estimator = PositionEstimator::with_defaults();
        let result = estimator.estimate(&[Reading::new("Z", -50.0)], &map);
        assert!(result.estimate.is_unknown());
        assert!(estimator.estimate(&[], &map).estimate.is_unknown());
        assert!(estimator.estimate_with(&[Reading::new("A", -50.0)], None).estimate.is_unknown());
    }

    #[test]
    fn test_map_without_emitters_is_unknown() {
        let grid = PositionGrid::from_positions(vec![0.0, 1.0, 2.0]).unwrap();
        let map = FingerprintMap::new(grid, Vec::new(), Vec::new()).unwrap();
        let result = PositionEstimator::with_defaults().estimate(&[Reading::new("A", -50.0)], &map);
        assert!(result.estimate.is_unknown());
    }
}
