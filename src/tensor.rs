//! 参数张量工具
//!
//! 图只负责拓扑和参数放置，张量统一使用 `ndarray::ArrayD<f32>` 表示。

use ndarray::{ArrayD, Axis, IxDyn, Slice};
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::{ElectraError, Result};

/// 参数张量
pub type Tensor = ArrayD<f32>;

/// 参数初始化方式
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Initializer {
    Zeros,
    Ones,
    /// 截断正态分布，超过 2σ 的样本重新采样
    TruncatedNormal { stddev: f32 },
}

impl Initializer {
    /// BERT 默认初始化（σ = 0.02）
    pub fn bert() -> Self {
        Initializer::TruncatedNormal { stddev: 0.02 }
    }

    /// 按给定形状生成初始张量
    ///
    /// `stddev` 为负数或非有限值时返回配置错误。
    pub fn init<R: Rng>(&self, shape: &[usize], rng: &mut R) -> Result<Tensor> {
        match *self {
            Initializer::Zeros => Ok(ArrayD::zeros(IxDyn(shape))),
            Initializer::Ones => Ok(ArrayD::ones(IxDyn(shape))),
            Initializer::TruncatedNormal { stddev } => {
                let normal = Normal::new(0.0, stddev).map_err(|e| {
                    ElectraError::config(format!("invalid initializer stddev {}: {}", stddev, e))
                })?;
                Ok(ArrayD::from_shape_fn(IxDyn(shape), |_| {
                    truncated_normal(&normal, stddev, rng)
                }))
            }
        }
    }
}

/// 截断正态采样，超过 2σ 的样本重新采样
pub fn truncated_normal<R: Rng>(normal: &Normal<f32>, stddev: f32, rng: &mut R) -> f32 {
    loop {
        let z = normal.sample(rng);
        if z.abs() <= 2.0 * stddev {
            return z;
        }
    }
}

/// 张量扩展 trait
pub trait TensorExt {
    /// 取前 `rows` 行；行数不足时返回 None
    fn take_rows(&self, rows: usize) -> Option<Tensor>;

    /// 形状（拥有所有权，便于放进错误信息）
    fn dims(&self) -> Vec<usize>;
}

impl TensorExt for Tensor {
    fn take_rows(&self, rows: usize) -> Option<Tensor> {
        if self.ndim() == 0 || self.shape()[0] < rows {
            return None;
        }
        Some(
            self.slice_axis(Axis(0), Slice::from(0..rows))
                .to_owned(),
        )
    }

    fn dims(&self) -> Vec<usize> {
        self.shape().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_truncated_normal_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let t = Initializer::bert().init(&[64, 32], &mut rng).unwrap();

        assert_eq!(t.shape(), &[64, 32]);
        // 所有值都在 2σ 以内
        assert!(t.iter().all(|v| v.abs() <= 0.04 + 1e-6));
        // 不是全零
        assert!(t.iter().any(|v| *v != 0.0));
    }

    #[test]
    fn test_seeded_init_is_reproducible() {
        let a = Initializer::bert().init(&[8, 8], &mut StdRng::seed_from_u64(1)).unwrap();
        let b = Initializer::bert().init(&[8, 8], &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_ones_and_zeros() {
        let mut rng = StdRng::seed_from_u64(0);
        let ones = Initializer::Ones.init(&[4], &mut rng).unwrap();
        let zeros = Initializer::Zeros.init(&[4], &mut rng).unwrap();
        assert!(ones.iter().all(|v| *v == 1.0));
        assert!(zeros.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_truncated_normal_spread() {
        let mut rng = StdRng::seed_from_u64(11);
        let t = Initializer::TruncatedNormal { stddev: 1.0 }
            .init(&[4000], &mut rng)
            .unwrap();

        let mean = t.mean().unwrap();
        let std = t.std(0.0);
        assert!(mean.abs() < 0.1, "mean {}", mean);
        // 截断到 2σ 后标准差约为 0.88σ
        assert!(std > 0.8 && std < 0.95, "std {}", std);
        assert!(t.iter().all(|v| v.abs() <= 2.0));
    }

    #[test]
    fn test_invalid_stddev_is_config_error() {
        let mut rng = StdRng::seed_from_u64(0);
        let err = Initializer::TruncatedNormal { stddev: -1.0 }
            .init(&[2], &mut rng)
            .unwrap_err();
        assert!(matches!(err, ElectraError::Config(_)));
    }

    #[test]
    fn test_take_rows() {
        let table = ArrayD::from_shape_fn(IxDyn(&[10, 3]), |idx| idx[0] as f32);

        let head = table.take_rows(4).unwrap();
        assert_eq!(head.dims(), vec![4, 3]);
        assert_eq!(head[[3, 2]], 3.0);

        assert_eq!(table.take_rows(10).unwrap(), table);
        assert!(table.take_rows(11).is_none());
    }
}
