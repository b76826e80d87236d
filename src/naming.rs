//! 命名方案
//!
//! 同一个节点有两套名字：
//! - 图内名字（`node_name`），例如 `Encoder-0-MultiHeadSelfAttention`
//! - 检查点路径（`checkpoint_keys`），例如 `bert/encoder/layer_0/attention/self/query/kernel`
//!
//! 两者必须同步变化，权重绑定才能成功，所以都集中在这里，
//! 并且都以 [`NodeKey`] 为唯一输入。

use std::fmt;

/// Encoder 层内部的子节点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncoderPart {
    Attention,
    AttentionDropout,
    AttentionAdd,
    AttentionNorm,
    FeedForward,
    FeedForwardDropout,
    FeedForwardAdd,
    FeedForwardNorm,
}

/// 图中节点的身份：(组件, 层号, 子部件)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKey {
    InputToken,
    InputSegment,
    EmbeddingToken,
    EmbeddingSegment,
    EmbeddingAdd,
    EmbeddingPosition,
    EmbeddingNorm,
    EmbeddingDropout,
    /// 嵌入维度 ≠ 隐藏维度时的投影层
    EmbeddingMap,
    Encoder { layer: usize, part: EncoderPart },
    DiscriminatorDense,
    DiscriminatorPrediction,
}

impl NodeKey {
    pub fn encoder(layer: usize, part: EncoderPart) -> Self {
        NodeKey::Encoder { layer, part }
    }

    /// 图内名字
    pub fn name(&self) -> String {
        node_name(*self)
    }

    /// 所属 Encoder 层号
    pub fn layer(&self) -> Option<usize> {
        match self {
            NodeKey::Encoder { layer, .. } => Some(*layer),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&node_name(*self))
    }
}

const ATTENTION: &str = "MultiHeadSelfAttention";
const FEED_FORWARD: &str = "FeedForward";

/// 节点在图内的名字
pub fn node_name(key: NodeKey) -> String {
    match key {
        NodeKey::InputToken => "Input-Token".to_string(),
        NodeKey::InputSegment => "Input-Segment".to_string(),
        NodeKey::EmbeddingToken => "Embedding-Token".to_string(),
        NodeKey::EmbeddingSegment => "Embedding-Segment".to_string(),
        NodeKey::EmbeddingAdd => "Embedding-Add-Token-Segment".to_string(),
        NodeKey::EmbeddingPosition => "Embedding-Position".to_string(),
        NodeKey::EmbeddingNorm => "Embedding-Norm".to_string(),
        NodeKey::EmbeddingDropout => "Embedding-Dropout".to_string(),
        NodeKey::EmbeddingMap => "Embedding-Map".to_string(),
        NodeKey::Encoder { layer, part } => {
            let (block, suffix) = match part {
                EncoderPart::Attention => (ATTENTION, ""),
                EncoderPart::AttentionDropout => (ATTENTION, "-Dropout"),
                EncoderPart::AttentionAdd => (ATTENTION, "-Add"),
                EncoderPart::AttentionNorm => (ATTENTION, "-Norm"),
                EncoderPart::FeedForward => (FEED_FORWARD, ""),
                EncoderPart::FeedForwardDropout => (FEED_FORWARD, "-Dropout"),
                EncoderPart::FeedForwardAdd => (FEED_FORWARD, "-Add"),
                EncoderPart::FeedForwardNorm => (FEED_FORWARD, "-Norm"),
            };
            format!("Encoder-{}-{}{}", layer, block, suffix)
        }
        NodeKey::DiscriminatorDense => "Discriminator-Dense".to_string(),
        NodeKey::DiscriminatorPrediction => "Discriminator-Prediction".to_string(),
    }
}

fn encoder_path(layer: usize, tail: &str) -> String {
    format!("bert/encoder/layer_{}/{}", layer, tail)
}

fn pair(prefix: &str, first: &str, second: &str) -> Vec<String> {
    vec![format!("{}/{}", prefix, first), format!("{}/{}", prefix, second)]
}

/// 节点参数在检查点中的路径，顺序与节点参数槽一一对应
///
/// 无参数节点（输入、加法、dropout）返回空列表。
pub fn checkpoint_keys(key: NodeKey) -> Vec<String> {
    match key {
        NodeKey::EmbeddingToken => vec!["bert/embeddings/word_embeddings".to_string()],
        NodeKey::EmbeddingSegment => vec!["bert/embeddings/token_type_embeddings".to_string()],
        NodeKey::EmbeddingPosition => vec!["bert/embeddings/position_embeddings".to_string()],
        NodeKey::EmbeddingNorm => pair("bert/embeddings/LayerNorm", "gamma", "beta"),
        NodeKey::EmbeddingMap => pair("electra/embeddings_project", "kernel", "bias"),
        NodeKey::Encoder { layer, part } => match part {
            EncoderPart::Attention => {
                let mut keys = Vec::with_capacity(8);
                for proj in ["query", "key", "value"] {
                    keys.extend(pair(
                        &encoder_path(layer, &format!("attention/self/{}", proj)),
                        "kernel",
                        "bias",
                    ));
                }
                keys.extend(pair(
                    &encoder_path(layer, "attention/output/dense"),
                    "kernel",
                    "bias",
                ));
                keys
            }
            EncoderPart::AttentionNorm => pair(
                &encoder_path(layer, "attention/output/LayerNorm"),
                "gamma",
                "beta",
            ),
            EncoderPart::FeedForward => {
                let mut keys = pair(&encoder_path(layer, "intermediate/dense"), "kernel", "bias");
                keys.extend(pair(&encoder_path(layer, "output/dense"), "kernel", "bias"));
                keys
            }
            EncoderPart::FeedForwardNorm => {
                pair(&encoder_path(layer, "output/LayerNorm"), "gamma", "beta")
            }
            EncoderPart::AttentionDropout
            | EncoderPart::AttentionAdd
            | EncoderPart::FeedForwardDropout
            | EncoderPart::FeedForwardAdd => Vec::new(),
        },
        NodeKey::DiscriminatorDense => pair("discriminator_predictions/dense", "kernel", "bias"),
        NodeKey::DiscriminatorPrediction => {
            pair("discriminator_predictions/dense_1", "kernel", "bias")
        }
        NodeKey::InputToken
        | NodeKey::InputSegment
        | NodeKey::EmbeddingAdd
        | NodeKey::EmbeddingDropout => Vec::new(),
    }
}
