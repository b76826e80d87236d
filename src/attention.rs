//! Multi-Head Self-Attention
//!
//! 只描述参数布局：Q、K、V、O 四个投影，各带一个偏置，
//! 顺序与官方检查点中的 query / key / value / output 一致。

use crate::error::{ElectraError, Result};
use crate::layers::ParamSpec;

/// Multi-Head Attention 参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttentionParams {
    /// 模型维度
    pub d_model: usize,
    /// 注意力头数
    pub n_heads: usize,
    /// 每个头的维度
    pub d_k: usize,
}

impl AttentionParams {
    pub fn new(d_model: usize, n_heads: usize) -> Result<Self> {
        if n_heads == 0 || d_model % n_heads != 0 {
            return Err(ElectraError::config(format!(
                "d_model {} must be divisible by n_heads {}",
                d_model, n_heads
            )));
        }

        Ok(Self {
            d_model,
            n_heads,
            d_k: d_model / n_heads,
        })
    }
}

/// Multi-Head Self-Attention 层
///
/// ```text
/// Input → [Q, K, V] → Split into Heads →
///     [Scaled Dot-Product Attention × N] →
///     Concat Heads → Linear → Output
/// ```
///
/// 在图中接收三个输入（query、key、value），自注意力时三者相同。
#[derive(Debug, Clone, PartialEq)]
pub struct MultiHeadSelfAttention {
    pub params: AttentionParams,
    /// 注意力权重上的 dropout
    pub dropout: f32,
}

impl MultiHeadSelfAttention {
    pub fn new(d_model: usize, n_heads: usize, dropout: f32) -> Result<Self> {
        Ok(Self {
            params: AttentionParams::new(d_model, n_heads)?,
            dropout,
        })
    }

    /// 八个参数：w_q, b_q, w_k, b_k, w_v, b_v, w_o, b_o
    pub fn param_specs(&self) -> Vec<ParamSpec> {
        let d = self.params.d_model;
        // 所有头拼在一起：n_heads * d_k == d_model
        let projected = self.params.n_heads * self.params.d_k;
        vec![
            ParamSpec::kernel("w_q", d, projected),
            ParamSpec::bias("b_q", projected),
            ParamSpec::kernel("w_k", d, projected),
            ParamSpec::bias("b_k", projected),
            ParamSpec::kernel("w_v", d, projected),
            ParamSpec::bias("b_v", projected),
            ParamSpec::kernel("w_o", projected, d),
            ParamSpec::bias("b_o", d),
        ]
    }
}
