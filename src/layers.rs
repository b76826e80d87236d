//! 基础层描述
//!
//! 这里的层只声明自己需要哪些参数（形状、初始化方式）以及接收几个输入，
//! 真正的计算交给执行图的运行时。
//!
//! 另外提供两种包装模式：
//! - [`wrap_layer`]：子层 → Dropout → 残差相加 → LayerNorm
//! - [`wrap_embedding`]：子层 → LayerNorm → Dropout

use std::fmt;

use crate::attention::MultiHeadSelfAttention;
use crate::config::Activation;
use crate::embedding::{Embedding, PositionEmbedding};
use crate::error::{ElectraError, Result};
use crate::graph::{GraphBuilder, Port};
use crate::naming::NodeKey;
use crate::tensor::Initializer;

/// 单个参数槽的描述
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub shape: Vec<usize>,
    pub init: Initializer,
}

impl ParamSpec {
    pub fn new(name: &'static str, shape: Vec<usize>, init: Initializer) -> Self {
        Self { name, shape, init }
    }

    /// 权重矩阵 [input_dim, units]
    pub fn kernel(name: &'static str, input_dim: usize, units: usize) -> Self {
        Self::new(name, vec![input_dim, units], Initializer::bert())
    }

    /// 偏置 [units]
    pub fn bias(name: &'static str, units: usize) -> Self {
        Self::new(name, vec![units], Initializer::Zeros)
    }
}

/// Layer Normalization
///
/// ```text
/// y = γ * ((x - μ) / √(σ² + ε)) + β
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LayerNorm {
    pub d_model: usize,
    pub eps: f32,
}

impl LayerNorm {
    pub fn new(d_model: usize) -> Self {
        Self { d_model, eps: 1e-12 }
    }

    pub fn param_specs(&self) -> Vec<ParamSpec> {
        // γ 初始化为 1，β 初始化为 0
        vec![
            ParamSpec::new("gamma", vec![self.d_model], Initializer::Ones),
            ParamSpec::new("beta", vec![self.d_model], Initializer::Zeros),
        ]
    }
}

/// Feed-Forward Network
///
/// ```text
/// FFN(x) = act(xW1 + b1)W2 + b2
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FeedForward {
    pub d_model: usize,
    pub d_ff: usize,
    pub activation: Activation,
}

impl FeedForward {
    pub fn new(d_model: usize, d_ff: usize, activation: Activation) -> Self {
        Self {
            d_model,
            d_ff,
            activation,
        }
    }

    pub fn param_specs(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::kernel("w1", self.d_model, self.d_ff),
            ParamSpec::bias("b1", self.d_ff),
            ParamSpec::kernel("w2", self.d_ff, self.d_model),
            ParamSpec::bias("b2", self.d_model),
        ]
    }
}

/// Dropout，推理时为恒等映射
#[derive(Debug, Clone, PartialEq)]
pub struct Dropout {
    pub rate: f32,
}

impl Dropout {
    pub fn new(rate: f32) -> Self {
        Self { rate }
    }

    /// 只有 0 < rate < 1 时才需要真正插入 Dropout 节点
    pub fn is_active(rate: f32) -> bool {
        0.0 < rate && rate < 1.0
    }
}

/// 全连接层
#[derive(Debug, Clone, PartialEq)]
pub struct Dense {
    pub input_dim: usize,
    pub units: usize,
    pub activation: Activation,
}

impl Dense {
    pub fn new(input_dim: usize, units: usize) -> Self {
        Self {
            input_dim,
            units,
            activation: Activation::Linear,
        }
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn param_specs(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::kernel("kernel", self.input_dim, self.units),
            ParamSpec::bias("bias", self.units),
        ]
    }
}

/// 运算种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Input,
    EmbeddingLookup,
    Add,
    Dense,
    LayerNorm,
    Dropout,
    Attention,
    FeedForward,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpKind::Input => "input",
            OpKind::EmbeddingLookup => "embedding-lookup",
            OpKind::Add => "add",
            OpKind::Dense => "dense",
            OpKind::LayerNorm => "layer-norm",
            OpKind::Dropout => "dropout",
            OpKind::Attention => "attention",
            OpKind::FeedForward => "feed-forward",
        };
        f.write_str(s)
    }
}

/// 图节点上的运算
#[derive(Debug, Clone, PartialEq)]
pub enum LayerOp {
    /// 输入占位符，`seq_len` 为 None 时表示变长
    Input { seq_len: Option<usize> },
    /// 词嵌入：同时输出嵌入序列和原始嵌入表
    TokenEmbedding(Embedding),
    Embedding(Embedding),
    PositionEmbedding(PositionEmbedding),
    Add,
    LayerNorm(LayerNorm),
    Dropout(Dropout),
    Dense(Dense),
    Attention(MultiHeadSelfAttention),
    FeedForward(FeedForward),
}

impl LayerOp {
    pub fn kind(&self) -> OpKind {
        match self {
            LayerOp::Input { .. } => OpKind::Input,
            LayerOp::TokenEmbedding(_)
            | LayerOp::Embedding(_)
            | LayerOp::PositionEmbedding(_) => OpKind::EmbeddingLookup,
            LayerOp::Add => OpKind::Add,
            LayerOp::LayerNorm(_) => OpKind::LayerNorm,
            LayerOp::Dropout(_) => OpKind::Dropout,
            LayerOp::Dense(_) => OpKind::Dense,
            LayerOp::Attention(_) => OpKind::Attention,
            LayerOp::FeedForward(_) => OpKind::FeedForward,
        }
    }

    /// 参数槽列表，顺序即权重绑定顺序
    pub fn param_specs(&self) -> Vec<ParamSpec> {
        match self {
            LayerOp::Input { .. } | LayerOp::Add | LayerOp::Dropout(_) => Vec::new(),
            LayerOp::TokenEmbedding(e) | LayerOp::Embedding(e) => e.param_specs(),
            LayerOp::PositionEmbedding(p) => p.param_specs(),
            LayerOp::LayerNorm(n) => n.param_specs(),
            LayerOp::Dense(d) => d.param_specs(),
            LayerOp::Attention(a) => a.param_specs(),
            LayerOp::FeedForward(f) => f.param_specs(),
        }
    }

    /// 输出个数
    pub fn num_outputs(&self) -> usize {
        match self {
            LayerOp::TokenEmbedding(_) => 2,
            _ => 1,
        }
    }

    /// 是否接受 `n` 个输入
    pub fn accepts_inputs(&self, n: usize) -> bool {
        match self {
            LayerOp::Input { .. } => n == 0,
            LayerOp::Add => n >= 2,
            // query, key, value
            LayerOp::Attention(_) => n == 3,
            _ => n == 1,
        }
    }
}

/// 包装模式中各节点的身份
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrapKeys {
    pub core: NodeKey,
    pub dropout: NodeKey,
    pub add: NodeKey,
    pub norm: NodeKey,
}

/// 子层 → Dropout → 残差相加 → LayerNorm
///
/// 残差分支使用子层收到的输入；当子层收到多个输入时
/// （自注意力的 query = key = value），取第一个。
pub fn wrap_layer(
    builder: &mut GraphBuilder,
    keys: WrapKeys,
    inputs: &[Port],
    core: LayerOp,
    dropout_rate: f32,
    d_model: usize,
) -> Result<Port> {
    let residual = inputs.first().copied().ok_or_else(|| {
        ElectraError::integrity(format!("`{}` wrapped without inputs", keys.core))
    })?;

    let built = builder.add(keys.core, core, inputs)?;
    let dropped = if Dropout::is_active(dropout_rate) {
        builder.add(keys.dropout, LayerOp::Dropout(Dropout::new(dropout_rate)), &[built])?
    } else {
        built
    };
    let added = builder.add(keys.add, LayerOp::Add, &[residual, dropped])?;
    builder.add(keys.norm, LayerOp::LayerNorm(LayerNorm::new(d_model)), &[added])
}

/// 子层 → LayerNorm → Dropout
#[allow(clippy::too_many_arguments)]
pub fn wrap_embedding(
    builder: &mut GraphBuilder,
    core_key: NodeKey,
    norm_key: NodeKey,
    dropout_key: NodeKey,
    input: Port,
    core: LayerOp,
    dropout_rate: f32,
    d_model: usize,
) -> Result<Port> {
    let built = builder.add(core_key, core, &[input])?;
    let normed = builder.add(norm_key, LayerOp::LayerNorm(LayerNorm::new(d_model)), &[built])?;
    if Dropout::is_active(dropout_rate) {
        builder.add(dropout_key, LayerOp::Dropout(Dropout::new(dropout_rate)), &[normed])
    } else {
        Ok(normed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::EncoderPart;

    fn ff_keys() -> WrapKeys {
        WrapKeys {
            core: NodeKey::encoder(0, EncoderPart::FeedForward),
            dropout: NodeKey::encoder(0, EncoderPart::FeedForwardDropout),
            add: NodeKey::encoder(0, EncoderPart::FeedForwardAdd),
            norm: NodeKey::encoder(0, EncoderPart::FeedForwardNorm),
        }
    }

    #[test]
    fn test_feed_forward_params() {
        let ff = FeedForward::new(8, 32, Activation::Gelu);
        let shapes: Vec<Vec<usize>> = ff.param_specs().into_iter().map(|p| p.shape).collect();
        assert_eq!(shapes, vec![vec![8, 32], vec![32], vec![32, 8], vec![8]]);
    }

    #[test]
    fn test_layer_norm_init() {
        let specs = LayerNorm::new(4).param_specs();
        assert_eq!(specs[0].init, Initializer::Ones);
        assert_eq!(specs[1].init, Initializer::Zeros);
    }

    #[test]
    fn test_dropout_is_active() {
        assert!(Dropout::is_active(0.1));
        assert!(!Dropout::is_active(0.0));
        assert!(!Dropout::is_active(1.0));
    }

    #[test]
    fn test_op_arity() {
        assert!(LayerOp::Add.accepts_inputs(2));
        assert!(!LayerOp::Add.accepts_inputs(1));
        assert!(LayerOp::Input { seq_len: None }.accepts_inputs(0));
        assert!(LayerOp::Dense(Dense::new(2, 2)).accepts_inputs(1));
    }

    #[test]
    fn test_wrap_layer_with_dropout() {
        let mut b = GraphBuilder::new(0);
        let x = b.add(NodeKey::InputToken, LayerOp::Input { seq_len: None }, &[]).unwrap();
        let ff = LayerOp::FeedForward(FeedForward::new(8, 16, Activation::Relu));

        let out = wrap_layer(&mut b, ff_keys(), &[x], ff, 0.1, 8).unwrap();

        let add = b.node(b.find("Encoder-0-FeedForward-Add").unwrap());
        assert_eq!(add.inputs()[0], x);
        assert_eq!(b.node(out.node).name(), "Encoder-0-FeedForward-Norm");
        assert!(b.find("Encoder-0-FeedForward-Dropout").is_some());
    }

    #[test]
    fn test_wrap_layer_without_dropout() {
        let mut b = GraphBuilder::new(0);
        let x = b.add(NodeKey::InputToken, LayerOp::Input { seq_len: None }, &[]).unwrap();
        let ff = LayerOp::FeedForward(FeedForward::new(8, 16, Activation::Relu));

        wrap_layer(&mut b, ff_keys(), &[x], ff, 0.0, 8).unwrap();

        assert!(b.find("Encoder-0-FeedForward-Dropout").is_none());
        // 残差直接接在子层输出上
        let core = b.find("Encoder-0-FeedForward").unwrap();
        let add = b.node(b.find("Encoder-0-FeedForward-Add").unwrap());
        assert_eq!(add.inputs()[1].node, core);
    }
}
