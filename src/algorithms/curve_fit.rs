//! 增量多项式回归
//!
//! 不保存原始样本，只累加矩矩阵 M 和向量 b：
//!
//! ```text
//! | N         SUM(x)      ...  SUM(x^k)   |   | a0 |   | SUM(y)       |
//! | SUM(x)    SUM(x^2)    ...  SUM(x^k+1) | * | a1 | = | SUM(x*y)     |
//! | ...                                   |   | .. |   | ...          |
//! | SUM(x^k)  SUM(x^k+1)  ...  SUM(x^2k)  |   | ak |   | SUM(x^k*y)   |
//! ```
//!
//! 每次 learn 之后用克莱姆法则 a_n = det(M_n) / det(M) 重新求出全部系数。
//! 6 阶以上双精度误差会明显变大。

use std::fmt;

use crate::algorithms::matrix::{SquareMatrix, determinant};
use crate::error::FitError;

/// estimate_min_y / estimate_max_y 的默认采样步数
pub const DEFAULT_ESTIMATE_STEPS: usize = 100;

/// 增量多项式拟合模型
#[derive(Clone, Debug)]
pub struct PolynomialFit {
    /// 多项式阶数，None 表示未就绪
    order: Option<usize>,
    /// M[i][j] = SUM(x^(i+j))
    moments: SquareMatrix,
    /// b[n] = SUM(x^n * y)
    rhs: Vec<f64>,
    /// y = a[k]*x^k + ... + a[1]*x + a[0]
    coefficients: Vec<f64>,
    count: usize,
    min_x: f64,
    max_x: f64,
    /// 最近一次求解时矩矩阵是否非奇异
    solved: bool,
}

impl PolynomialFit {
    /// 创建指定阶数的模型
    ///
    /// - 0 阶: 常数（y 的平均值）
    /// - 1 阶: 线性回归
    /// - 2 阶: 抛物线
    pub fn new(degree: usize) -> Result<Self, FitError> {
        let mut fit = Self::uninitialized();
        fit.init(degree)?;
        Ok(fit)
    }

    /// 未分配的模型，learn 不做任何事
    pub fn uninitialized() -> Self {
        PolynomialFit {
            order: None,
            moments: SquareMatrix::zeros(0),
            rhs: Vec::new(),
            coefficients: Vec::new(),
            count: 0,
            min_x: 0.0,
            max_x: 0.0,
            solved: false,
        }
    }

    /// 重新分配累加器并清零，可在运行时改变阶数
    ///
    /// 分配失败时模型标记为未就绪并返回错误。
    pub fn init(&mut self, degree: usize) -> Result<(), FitError> {
        *self = Self::uninitialized();

        let dim = degree
            .checked_add(1)
            .ok_or(FitError::AllocationFailed { degree })?;
        let moments = SquareMatrix::try_zeros(dim).map_err(|_| FitError::AllocationFailed { degree })?;
        let rhs = try_zeroed(dim).ok_or(FitError::AllocationFailed { degree })?;
        let coefficients = try_zeroed(dim).ok_or(FitError::AllocationFailed { degree })?;

        self.order = Some(degree);
        self.moments = moments;
        self.rhs = rhs;
        self.coefficients = coefficients;
        Ok(())
    }

    /// 清除所有累加值和系数，保留阶数
    pub fn reset(&mut self) {
        self.moments.fill_zero();
        self.rhs.iter_mut().for_each(|v| *v = 0.0);
        self.coefficients.iter_mut().for_each(|v| *v = 0.0);
        self.count = 0;
        self.min_x = 0.0;
        self.max_x = 0.0;
        self.solved = false;
    }

    /// 加入一对 (x, y) 并重新求解系数
    pub fn learn(&mut self, x: f64, y: f64) {
        let Some(order) = self.order else {
            return;
        };

        self.count += 1;
        if self.count == 1 {
            self.min_x = x;
            self.max_x = x;
        } else {
            self.min_x = self.min_x.min(x);
            self.max_x = self.max_x.max(x);
        }

        // Hankel 结构：除第一列和每列最后一行外，M[i][j] 直接取已更新的 M[i+1][j-1]
        for j in 0..=order {
            for i in 0..=order {
                if j == 0 {
                    self.moments[(i, 0)] += x.powi(i as i32);
                } else if i < order {
                    self.moments[(i, j)] = self.moments[(i + 1, j - 1)];
                } else {
                    self.moments[(i, j)] += x.powi((i + j) as i32);
                }
            }
        }
        self.moments[(0, 0)] = self.count as f64;

        for (n, b) in self.rhs.iter_mut().enumerate() {
            *b += x.powi(n as i32) * y;
        }

        self.solve(order);
    }

    /// 克莱姆法则求系数；矩阵奇异或接近奇异时系数置零并标记为未求解
    fn solve(&mut self, order: usize) {
        let det_m = if self.count > order {
            determinant(&self.moments)
        } else {
            0.0
        };

        if !self.is_well_conditioned(det_m, order) {
            self.coefficients.iter_mut().for_each(|v| *v = 0.0);
            self.solved = false;
            return;
        }

        for n in 0..=order {
            let det_n = determinant(&self.moments.with_column(n, &self.rhs));
            self.coefficients[n] = det_n / det_m;
        }
        self.solved = true;
    }

    /// M 半正定，det(M) 不超过对角元之积（Hadamard 不等式）。
    /// 比值低于舍入误差量级时，x 的不同取值不足以确定全部系数。
    fn is_well_conditioned(&self, det_m: f64, order: usize) -> bool {
        let diagonal: f64 = (0..=order).map(|i| self.moments[(i, i)]).product();
        let tolerance = (order + 1) as f64 * f64::EPSILON * diagonal;
        det_m.is_finite() && tolerance.is_finite() && det_m > tolerance
    }

    /// 计算 x 处的预测值
    pub fn predict(&self, x: f64) -> f64 {
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, a| acc * x + a)
    }

    /// 计算 x 处的预测值，x 超出已学习范围时返回 `outside`
    pub fn predict_or(&self, x: f64, outside: f64) -> f64 {
        if x > self.max_x || x < self.min_x {
            outside
        } else {
            self.predict(x)
        }
    }

    /// 在 [min_x, max_x] 上均匀采样估计最大 y（启发式，不是真正的极值）
    pub fn estimate_max_y(&self) -> f64 {
        self.estimate_max_y_with(DEFAULT_ESTIMATE_STEPS)
    }

    /// 在 [min_x, max_x] 上均匀采样估计最小 y
    pub fn estimate_min_y(&self) -> f64 {
        self.estimate_min_y_with(DEFAULT_ESTIMATE_STEPS)
    }

    pub fn estimate_max_y_with(&self, steps: usize) -> f64 {
        self.sample_range(steps).fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn estimate_min_y_with(&self, steps: usize) -> f64 {
        self.sample_range(steps).fold(f64::INFINITY, f64::min)
    }

    fn sample_range(&self, steps: usize) -> impl Iterator<Item = f64> + '_ {
        let steps = steps.max(1);
        let width = (self.max_x - self.min_x) / steps as f64;
        (0..=steps).map(move |i| self.predict(self.min_x + i as f64 * width))
    }

    /// 当前系数快照，a[0] 为常数项；reset 之后为零向量
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// 已求解的系数，未就绪或数据不足时返回错误
    pub fn solution(&self) -> Result<&[f64], FitError> {
        let order = self.order.ok_or(FitError::NotReady)?;
        if !self.solved {
            return Err(FitError::InsufficientData {
                samples: self.count,
                required: order + 1,
            });
        }
        Ok(&self.coefficients)
    }

    /// 以字符串输出公式，例如 `(3) y= 2.00x +1.00`
    pub fn formula(&self, decimals: usize) -> String {
        let mut formula = format!("({}) y= ", self.count);
        let Some(order) = self.order else {
            return formula;
        };
        for i in (0..=order).rev() {
            let a = self.coefficients[i];
            if a > 0.0 && i < order {
                formula.push('+');
            }
            match i {
                0 => formula.push_str(&format!("{:.*}", decimals, a)),
                1 => formula.push_str(&format!("{:.*}x ", decimals, a)),
                _ => formula.push_str(&format!("{:.*}x^{} ", decimals, a, i)),
            }
        }
        formula
    }

    /// 阶数，未就绪时为 None
    pub fn order(&self) -> Option<usize> {
        self.order
    }

    pub fn is_ready(&self) -> bool {
        self.order.is_some()
    }

    pub fn is_solved(&self) -> bool {
        self.solved
    }

    /// 已学习的样本数
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn min_x(&self) -> f64 {
        self.min_x
    }

    pub fn max_x(&self) -> f64 {
        self.max_x
    }

    /// 矩矩阵（只读）
    pub fn moments(&self) -> &SquareMatrix {
        &self.moments
    }
}

impl fmt::Display for PolynomialFit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formula(6))
    }
}

fn try_zeroed(len: usize) -> Option<Vec<f64>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).ok()?;
    v.resize(len, 0.0);
    Some(v)
}
