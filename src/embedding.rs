//! 输入和嵌入层
//!
//! ```text
//! Input-Token   → Embedding-Token   ┐
//!                                   ├→ Embedding-Add-Token-Segment
//! Input-Segment → Embedding-Segment ┘
//!     → Embedding-Position(add) → Embedding-Norm → Embedding-Dropout
//!     → [Embedding-Map]
//! ```

use tracing::debug;

use crate::config::ElectraConfig;
use crate::error::Result;
use crate::graph::{GraphBuilder, Port};
use crate::layers::{wrap_embedding, Dense, LayerOp, ParamSpec};
use crate::naming::NodeKey;
use crate::tensor::Initializer;

/// 词嵌入 / 类型嵌入查找表
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    /// 词表大小
    pub input_dim: usize,
    /// 嵌入维度
    pub output_dim: usize,
    /// id 为 0 的位置视为 padding
    pub mask_zero: bool,
}

impl Embedding {
    pub fn new(input_dim: usize, output_dim: usize) -> Self {
        Self {
            input_dim,
            output_dim,
            mask_zero: false,
        }
    }

    pub fn with_mask_zero(mut self, mask_zero: bool) -> Self {
        self.mask_zero = mask_zero;
        self
    }

    pub fn param_specs(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::new(
            "embeddings",
            vec![self.input_dim, self.output_dim],
            Initializer::bert(),
        )]
    }
}

/// 可学习的位置嵌入
///
/// 与固定的正弦位置编码不同，这里的位置表是一张 [max_pos, d_model] 的参数，
/// 从检查点加载时只保留前 max_pos 行。位置向量与输入逐元素相加。
#[derive(Debug, Clone, PartialEq)]
pub struct PositionEmbedding {
    /// 最大位置数
    pub input_dim: usize,
    pub output_dim: usize,
}

impl PositionEmbedding {
    pub fn new(input_dim: usize, output_dim: usize) -> Self {
        Self {
            input_dim,
            output_dim,
        }
    }

    pub fn param_specs(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::new(
            "embeddings",
            vec![self.input_dim, self.output_dim],
            Initializer::bert(),
        )]
    }
}

/// 创建两个输入占位符：token ids 和 segment ids
///
/// `seq_len` 为 None 时输入长度可变。
pub fn build_inputs(builder: &mut GraphBuilder, seq_len: Option<usize>) -> Result<(Port, Port)> {
    let token = builder.add(NodeKey::InputToken, LayerOp::Input { seq_len }, &[])?;
    let segment = builder.add(NodeKey::InputSegment, LayerOp::Input { seq_len }, &[])?;
    Ok((token, segment))
}

/// 构建嵌入部分
///
/// # 返回
/// - 嵌入输出（已投影到 hidden_size）
/// - 原始词嵌入表（留给生成器头做权重共享）
pub fn build_embeddings(
    builder: &mut GraphBuilder,
    inputs: (Port, Port),
    config: &ElectraConfig,
) -> Result<(Port, Port)> {
    let (token_ids, segment_ids) = inputs;
    let dim = config.embedding_size;

    let token = builder.add(
        NodeKey::EmbeddingToken,
        LayerOp::TokenEmbedding(Embedding::new(config.vocab_size, dim).with_mask_zero(true)),
        &[token_ids],
    )?;
    let token_table = builder.output(token, 1)?;

    let segment = builder.add(
        NodeKey::EmbeddingSegment,
        LayerOp::Embedding(Embedding::new(config.type_vocab_size, dim)),
        &[segment_ids],
    )?;
    let summed = builder.add(NodeKey::EmbeddingAdd, LayerOp::Add, &[token, segment])?;

    let mut embeddings = wrap_embedding(
        builder,
        NodeKey::EmbeddingPosition,
        NodeKey::EmbeddingNorm,
        NodeKey::EmbeddingDropout,
        summed,
        LayerOp::PositionEmbedding(PositionEmbedding::new(config.max_position_embeddings, dim)),
        config.hidden_dropout_prob,
        dim,
    )?;

    if config.needs_projection() {
        debug!(
            from = dim,
            to = config.hidden_size,
            "projecting embeddings to hidden size"
        );
        embeddings = builder.add(
            NodeKey::EmbeddingMap,
            LayerOp::Dense(Dense::new(dim, config.hidden_size)),
            &[embeddings],
        )?;
    }

    Ok((embeddings, token_table))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_config(embedding_size: usize) -> ElectraConfig {
        ElectraConfig {
            vocab_size: 50,
            type_vocab_size: 2,
            max_position_embeddings: 16,
            hidden_size: 32,
            embedding_size,
            num_hidden_layers: 1,
            num_attention_heads: 4,
            intermediate_size: 64,
            ..ElectraConfig::default()
        }
    }

    #[test]
    fn test_build_inputs() {
        let mut b = GraphBuilder::new(0);
        let (token, segment) = build_inputs(&mut b, Some(8)).unwrap();

        assert_eq!(b.node(token.node).name(), "Input-Token");
        assert_eq!(b.node(segment.node).name(), "Input-Segment");
        assert_eq!(b.node(token.node).op(), &LayerOp::Input { seq_len: Some(8) });
    }

    #[test]
    fn test_token_embedding_has_two_outputs() {
        let mut b = GraphBuilder::new(0);
        let inputs = build_inputs(&mut b, None).unwrap();
        let (_, table) = build_embeddings(&mut b, inputs, &tiny_config(32)).unwrap();

        let token = b.find("Embedding-Token").unwrap();
        assert_eq!(table.node, token);
        assert_eq!(table.output, 1);
        assert_eq!(b.node(token).params()[0].shape(), &[50, 32]);
    }

    #[test]
    fn test_projection_only_when_sizes_differ() {
        let mut b = GraphBuilder::new(0);
        let inputs = build_inputs(&mut b, None).unwrap();
        let (out, _) = build_embeddings(&mut b, inputs, &tiny_config(16)).unwrap();
        assert_eq!(b.node(out.node).name(), "Embedding-Map");
        assert_eq!(b.node(out.node).params()[0].shape(), &[16, 32]);

        let mut b = GraphBuilder::new(0);
        let inputs = build_inputs(&mut b, None).unwrap();
        let (out, _) = build_embeddings(&mut b, inputs, &tiny_config(32)).unwrap();
        assert!(b.find("Embedding-Map").is_none());
        assert_eq!(b.node(out.node).name(), "Embedding-Dropout");
    }

    #[test]
    fn test_position_table_shape() {
        let mut b = GraphBuilder::new(0);
        let inputs = build_inputs(&mut b, None).unwrap();
        build_embeddings(&mut b, inputs, &tiny_config(32)).unwrap();

        let position = b.node(b.find("Embedding-Position").unwrap());
        assert_eq!(position.params()[0].shape(), &[16, 32]);
        // 位置嵌入接在 token + segment 之后
        let add = b.find("Embedding-Add-Token-Segment").unwrap();
        assert_eq!(position.inputs()[0].node, add);
    }
}
