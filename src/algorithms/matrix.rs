//! 方阵与行列式计算
//!
//! 行列式使用带部分主元的高斯消元法，1x1 和 2x2 直接计算。

use std::ops::{Index, IndexMut};

use crate::error::FitError;

/// 行主序存储的方阵，尺寸在构造时确定
#[derive(Clone, Debug, PartialEq)]
pub struct SquareMatrix {
    dim: usize,
    data: Vec<f64>,
}

impl SquareMatrix {
    /// 创建全零方阵
    pub fn zeros(dim: usize) -> Self {
        SquareMatrix {
            dim,
            data: vec![0.0; dim * dim],
        }
    }

    /// 可失败的分配，尺寸溢出或内存不足时返回错误
    pub fn try_zeros(dim: usize) -> Result<Self, FitError> {
        let len = dim
            .checked_mul(dim)
            .ok_or(FitError::AllocationFailed {
                degree: dim.saturating_sub(1),
            })?;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| FitError::AllocationFailed {
                degree: dim.saturating_sub(1),
            })?;
        data.resize(len, 0.0);
        Ok(SquareMatrix { dim, data })
    }

    /// 从行向量构造，行长度不一致时返回 None
    pub fn from_rows(rows: &[Vec<f64>]) -> Option<Self> {
        let dim = rows.len();
        if rows.iter().any(|row| row.len() != dim) {
            return None;
        }
        Some(SquareMatrix {
            dim,
            data: rows.iter().flatten().copied().collect(),
        })
    }

    /// 维数
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// 全部元素置零
    pub fn fill_zero(&mut self) {
        self.data.iter_mut().for_each(|v| *v = 0.0);
    }

    /// 交换两行
    pub fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for k in 0..self.dim {
            self.data.swap(a * self.dim + k, b * self.dim + k);
        }
    }

    /// 复制一份并把第 `col` 列替换为 `column`（克莱姆法则用）
    pub fn with_column(&self, col: usize, column: &[f64]) -> Self {
        assert_eq!(column.len(), self.dim, "替换列长度必须等于矩阵维数");
        let mut out = self.clone();
        for (row, value) in column.iter().enumerate() {
            out[(row, col)] = *value;
        }
        out
    }

    /// 计算行列式
    pub fn determinant(&self) -> f64 {
        determinant(self)
    }
}

impl Index<(usize, usize)> for SquareMatrix {
    type Output = f64;

    fn index(&self, (row, col): (usize, usize)) -> &f64 {
        assert!(row < self.dim && col < self.dim, "矩阵下标越界");
        &self.data[row * self.dim + col]
    }
}

impl IndexMut<(usize, usize)> for SquareMatrix {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut f64 {
        assert!(row < self.dim && col < self.dim, "矩阵下标越界");
        &mut self.data[row * self.dim + col]
    }
}

/// 行列式
///
/// - 0 维（未初始化）返回 0
/// - 1x1 返回唯一元素
/// - 2x2 使用 a11*a22 - a12*a21
/// - 更大的矩阵在副本上做部分主元高斯消元，主元恰好为 0 时直接返回 0
pub fn determinant(matrix: &SquareMatrix) -> f64 {
    let n = matrix.dim();
    match n {
        0 => 0.0,
        1 => matrix[(0, 0)],
        2 => matrix[(0, 0)] * matrix[(1, 1)] - matrix[(0, 1)] * matrix[(1, 0)],
        _ => {
            let mut work = matrix.clone();
            let mut det = 1.0;

            for i in 0..n {
                // 部分主元：本列对角线及以下绝对值最大的元素
                let mut pivot_row = i;
                let mut pivot = work[(i, i)];
                for row in (i + 1)..n {
                    if work[(row, i)].abs() > pivot.abs() {
                        pivot = work[(row, i)];
                        pivot_row = row;
                    }
                }

                if pivot == 0.0 {
                    return 0.0;
                }

                if pivot_row != i {
                    work.swap_rows(i, pivot_row);
                    det = -det;
                }

                det *= pivot;

                for row in (i + 1)..n {
                    let factor = work[(row, i)] / pivot;
                    for col in (i + 1)..n {
                        let delta = factor * work[(i, col)];
                        work[(row, col)] -= delta;
                    }
                }
            }

            det
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn matrix(rows: &[&[f64]]) -> SquareMatrix {
        let rows: Vec<Vec<f64>> = rows.iter().map(|r| r.to_vec()).collect();
        SquareMatrix::from_rows(&rows).unwrap()
    }

    #[test]
    fn test_trivial_sizes() {
        assert_eq!(determinant(&SquareMatrix::zeros(0)), 0.0);
        assert_eq!(determinant(&matrix(&[&[7.5]])), 7.5);
        assert_eq!(determinant(&matrix(&[&[3.0, 8.0], &[4.0, 6.0]])), -14.0);
    }

    #[test]
    fn test_zero_matrix_determinant() {
        for dim in 0..6 {
            assert_eq!(determinant(&SquareMatrix::zeros(dim)), 0.0);
        }
    }

    #[test]
    fn test_gaussian_elimination_with_pivoting() {
        // 首个对角元为 0，需要换行
        let m = matrix(&[&[0.0, 2.0, 1.0], &[1.0, 1.0, 1.0], &[2.0, 1.0, 3.0]]);
        assert_relative_eq!(determinant(&m), -3.0, epsilon = 1e-12);

        let m = matrix(&[
            &[6.0, 1.0, 1.0, 3.0],
            &[4.0, -2.0, 5.0, 1.0],
            &[2.0, 8.0, 7.0, 6.0],
            &[3.0, 1.0, 9.0, 7.0],
        ]);
        assert_relative_eq!(determinant(&m), -1309.0, epsilon = 1e-9);
    }

    #[test]
    fn test_singular_matrix() {
        let m = matrix(&[&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0], &[1.0, 0.0, 1.0]]);
        assert_eq!(determinant(&m), 0.0);
    }

    #[test]
    fn test_with_column_does_not_touch_original() {
        let m = matrix(&[&[1.0, 2.0], &[3.0, 4.0]]);
        let replaced = m.with_column(1, &[9.0, 9.0]);
        assert_eq!(replaced[(0, 1)], 9.0);
        assert_eq!(m[(0, 1)], 2.0);
    }

    #[test]
    fn test_try_zeros_overflow() {
        assert!(SquareMatrix::try_zeros(usize::MAX).is_err());
        assert_eq!(SquareMatrix::try_zeros(3).unwrap().dim(), 3);
    }
}
