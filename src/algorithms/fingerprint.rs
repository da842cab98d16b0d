//! 发射源指纹
//!
//! 每个发射源（例如一个 WiFi 接入点，以 BSSID 标识）持有一个多项式模型，
//! 描述信号强度随位置的变化。

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::algorithms::curve_fit::PolynomialFit;
use crate::algorithms::records::SurveyRecord;
use crate::config::FingerprintConfig;
use crate::error::FitError;

/// 指纹槽位状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FingerprintTag {
    /// 空槽位
    Unassigned,
    /// 已分配给某个发射源，值为槽位序号
    Assigned(usize),
}

/// 单个发射源的指纹
#[derive(Clone, Debug)]
pub struct EmitterFingerprint {
    /// 发射源标识（MAC 地址等）
    pub id: String,
    pub fit: PolynomialFit,
    pub tag: FingerprintTag,
}

impl EmitterFingerprint {
    /// 创建空槽位
    pub fn unassigned(degree: usize) -> Result<Self, FitError> {
        Ok(EmitterFingerprint {
            id: String::new(),
            fit: PolynomialFit::new(degree)?,
            tag: FingerprintTag::Unassigned,
        })
    }

    pub fn is_assigned(&self) -> bool {
        matches!(self.tag, FingerprintTag::Assigned(_))
    }

    /// 清空模型并释放槽位
    pub fn unassign(&mut self) {
        self.fit.reset();
        self.id.clear();
        self.tag = FingerprintTag::Unassigned;
    }

    /// 导出系数与质量统计
    pub fn summary(&self, steps: usize) -> FitSummary {
        FitSummary {
            id: self.id.clone(),
            coefficients: self.fit.coefficients().to_vec(),
            count: self.fit.count(),
            min_x: self.fit.min_x(),
            max_x: self.fit.max_x(),
            min_y: self.fit.estimate_min_y_with(steps),
            max_y: self.fit.estimate_max_y_with(steps),
            solved: self.fit.is_solved(),
        }
    }
}

/// 单个发射源模型的系数、范围和信号统计
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitSummary {
    pub id: String,
    pub coefficients: Vec<f64>,
    pub count: usize,
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub solved: bool,
}

/// 观测到的位置范围
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionRange {
    pub min: f64,
    pub max: f64,
}

impl PositionRange {
    /// 空范围，第一次 observe 之后才有意义
    pub fn empty() -> Self {
        PositionRange {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn new(min: f64, max: f64) -> Self {
        PositionRange { min, max }
    }

    pub fn observe(&mut self, position: f64) {
        self.min = self.min.min(position);
        self.max = self.max.max(position);
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    pub fn span(&self) -> f64 {
        if self.is_empty() { 0.0 } else { self.max - self.min }
    }
}

impl Default for PositionRange {
    fn default() -> Self {
        Self::empty()
    }
}

/// 固定容量的指纹集合
///
/// 新的发射源依次占用空槽位，槽位用完后新发射源被忽略。
#[derive(Clone, Debug)]
pub struct FingerprintSet {
    slots: Vec<EmitterFingerprint>,
    range: PositionRange,
}

impl FingerprintSet {
    /// 创建 `capacity` 个 `degree` 阶的空槽位
    pub fn with_capacity(capacity: usize, degree: usize) -> Result<Self, FitError> {
        let slots = (0..capacity)
            .map(|_| EmitterFingerprint::unassigned(degree))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(FingerprintSet {
            slots,
            range: PositionRange::empty(),
        })
    }

    /// 按给定顺序预先分配发射源
    pub fn for_emitters<S: AsRef<str>>(ids: &[S], degree: usize) -> Result<Self, FitError> {
        let mut set = Self::with_capacity(ids.len(), degree)?;
        for (index, (slot, id)) in set.slots.iter_mut().zip(ids).enumerate() {
            slot.id = id.as_ref().to_string();
            slot.tag = FingerprintTag::Assigned(index);
        }
        Ok(set)
    }

    /// 用标定记录学习每个发射源的信号-位置模型
    pub fn calibrate(records: &[SurveyRecord], config: &FingerprintConfig) -> Result<Self, FitError> {
        let mut set = Self::with_capacity(config.max_emitters, config.calibration_degree)?;
        for record in records {
            set.learn(&record.emitter_id, record.position, record.signal);
        }
        debug!(
            records = records.len(),
            emitters = set.assigned_count(),
            min_pos = set.range.min,
            max_pos = set.range.max,
            "calibration records learned"
        );
        Ok(set)
    }

    /// 让 `id` 对应的模型学习一对 (位置, 信号)
    ///
    /// 未知 `id` 占用下一个空槽位；没有空槽位时返回 false。
    pub fn learn(&mut self, id: &str, position: f64, signal: f64) -> bool {
        self.range.observe(position);

        if let Some(slot) = self.slots.iter_mut().find(|s| s.is_assigned() && s.id == id) {
            slot.fit.learn(position, signal);
            return true;
        }

        match self.slots.iter().position(|s| !s.is_assigned()) {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.id = id.to_string();
                slot.tag = FingerprintTag::Assigned(index);
                slot.fit.learn(position, signal);
                debug!(slot = index, id, "emitter assigned");
                true
            }
            None => {
                warn!(id, capacity = self.slots.len(), "fingerprint set full, emitter ignored");
                false
            }
        }
    }

    /// 查找已分配的指纹
    pub fn get(&self, id: &str) -> Option<&EmitterFingerprint> {
        self.slots.iter().find(|s| s.is_assigned() && s.id == id)
    }

    /// 全部已分配的指纹（按槽位顺序）
    pub fn assigned(&self) -> impl Iterator<Item = &EmitterFingerprint> {
        self.slots.iter().filter(|s| s.is_assigned())
    }

    pub(crate) fn slots_mut(&mut self) -> &mut [EmitterFingerprint] {
        &mut self.slots
    }

    pub fn assigned_count(&self) -> usize {
        self.assigned().count()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// 学习过的位置范围
    pub fn position_range(&self) -> PositionRange {
        self.range
    }

    /// 各发射源的系数与统计
    pub fn summaries(&self, steps: usize) -> Vec<FitSummary> {
        self.assigned().map(|fp| fp.summary(steps)).collect()
    }
}
