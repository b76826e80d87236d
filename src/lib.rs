//! # Mini ELECTRA
//!
//! 按超参数组装 ELECTRA / BERT 风格的 Encoder 计算图，
//! 并按名字把预训练检查点中的张量绑定到图的参数上。
//!
//! ## 架构概览
//!
//! ```text
//! config.json → ElectraConfig
//!     → GraphBuilder
//!         ├── Input-Token / Input-Segment
//!         ├── Embedding (Token + Segment + Position → Norm → Dropout → [Map])
//!         ├── [Encoder Layer × N]
//!         │   ├── Multi-Head Self-Attention → Add & Norm
//!         │   └── Feed Forward Network → Add & Norm
//!         └── [Discriminator Head]
//!     → Graph
//!
//! Checkpoint (bert/encoder/layer_i/...) → load_weights → Graph（已加载）
//! ```
//!
//! 本 crate 只负责拓扑和参数放置，不做张量计算。

pub mod error;
pub mod config;
pub mod naming;
pub mod tensor;
pub mod embedding;
pub mod attention;
pub mod layers;
pub mod graph;
pub mod transformer;
pub mod electra;
pub mod checkpoint;
pub mod loader;

pub use error::{ElectraError, Result};
pub use config::{Activation, ElectraConfig};
pub use naming::{checkpoint_keys, node_name, EncoderPart, NodeKey};
pub use tensor::{Initializer, Tensor, TensorExt};
pub use embedding::{build_embeddings, build_inputs, Embedding, PositionEmbedding};
pub use attention::{AttentionParams, MultiHeadSelfAttention};
pub use layers::{Dense, Dropout, FeedForward, LayerNorm, LayerOp, OpKind, ParamSpec};
pub use graph::{Graph, GraphBuilder, LayerNode, NodeRef, Parameter, Port};
pub use transformer::{build_encoder_layer, build_encoder_stack};
pub use electra::{
    build, build_discriminator_head, build_electra_model, build_with_seed, count_params,
    ElectraModel, ModelOptions,
};
pub use checkpoint::{CheckpointStore, FnCheckpoint, MemoryCheckpoint, TensorArchive};
pub use loader::load_weights;

/// 预设配置
pub mod configs {
    use super::{Activation, ElectraConfig};

    /// 小型模型（用于快速测试）
    pub fn mini() -> ElectraConfig {
        ElectraConfig {
            vocab_size: 1000,
            type_vocab_size: 2,
            max_position_embeddings: 64,
            hidden_size: 128,
            embedding_size: 64,
            num_hidden_layers: 2,
            num_attention_heads: 4,
            intermediate_size: 512,
            hidden_act: Activation::Gelu,
            attention_probs_dropout_prob: 0.1,
            hidden_dropout_prob: 0.1,
            with_discriminator: false,
            seq_len: None,
        }
    }

    /// ELECTRA-Small
    pub fn electra_small() -> ElectraConfig {
        ElectraConfig {
            vocab_size: 30522,
            type_vocab_size: 2,
            max_position_embeddings: 512,
            hidden_size: 256,
            embedding_size: 128,
            num_hidden_layers: 12,
            num_attention_heads: 4,
            intermediate_size: 1024,
            hidden_act: Activation::Gelu,
            attention_probs_dropout_prob: 0.1,
            hidden_dropout_prob: 0.1,
            with_discriminator: false,
            seq_len: None,
        }
    }

    /// ELECTRA-Base（与 BERT-Base 同尺寸）
    pub fn electra_base() -> ElectraConfig {
        ElectraConfig::default()
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_presets_are_valid() {
            for config in [mini(), electra_small(), electra_base()] {
                config.validate().unwrap();
            }
            assert!(electra_small().needs_projection());
            assert!(!electra_base().needs_projection());
        }
    }
}
