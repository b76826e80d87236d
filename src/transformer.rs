//! Transformer Encoder
//!
//! 单层结构：
//!
//! ```text
//! x → Attention(x, x, x) → Dropout → Add(x) → Norm
//!   → FeedForward → Dropout → Add → Norm → output
//! ```
//!
//! 第 i 层的输出就是第 i+1 层的输入。

use tracing::debug;

use crate::attention::MultiHeadSelfAttention;
use crate::config::ElectraConfig;
use crate::error::Result;
use crate::graph::{GraphBuilder, Port};
use crate::layers::{wrap_layer, FeedForward, LayerOp, WrapKeys};
use crate::naming::{EncoderPart, NodeKey};

fn attention_keys(layer: usize) -> WrapKeys {
    WrapKeys {
        core: NodeKey::encoder(layer, EncoderPart::Attention),
        dropout: NodeKey::encoder(layer, EncoderPart::AttentionDropout),
        add: NodeKey::encoder(layer, EncoderPart::AttentionAdd),
        norm: NodeKey::encoder(layer, EncoderPart::AttentionNorm),
    }
}

fn feed_forward_keys(layer: usize) -> WrapKeys {
    WrapKeys {
        core: NodeKey::encoder(layer, EncoderPart::FeedForward),
        dropout: NodeKey::encoder(layer, EncoderPart::FeedForwardDropout),
        add: NodeKey::encoder(layer, EncoderPart::FeedForwardAdd),
        norm: NodeKey::encoder(layer, EncoderPart::FeedForwardNorm),
    }
}

/// 构建第 `layer` 个 Encoder 层
///
/// 自注意力收到三份相同的输入，残差分支使用这份输入本身；
/// FFN 的残差分支使用注意力块的输出。
pub fn build_encoder_layer(
    builder: &mut GraphBuilder,
    layer: usize,
    input: Port,
    config: &ElectraConfig,
) -> Result<Port> {
    let d_model = config.hidden_size;

    let attention = MultiHeadSelfAttention::new(
        d_model,
        config.num_attention_heads,
        config.attention_probs_dropout_prob,
    )?;
    let attended = wrap_layer(
        builder,
        attention_keys(layer),
        &[input, input, input],
        LayerOp::Attention(attention),
        config.hidden_dropout_prob,
        d_model,
    )?;

    let feed_forward = FeedForward::new(d_model, config.intermediate_size, config.hidden_act);
    let output = wrap_layer(
        builder,
        feed_forward_keys(layer),
        &[attended],
        LayerOp::FeedForward(feed_forward),
        config.hidden_dropout_prob,
        d_model,
    )?;

    debug!(layer, "built encoder layer");
    Ok(output)
}

/// 顺序堆叠 `n_layers` 个 Encoder 层，层号从 0 开始
pub fn build_encoder_stack(
    builder: &mut GraphBuilder,
    n_layers: usize,
    input: Port,
    config: &ElectraConfig,
) -> Result<Port> {
    let mut x = input;
    for layer in 0..n_layers {
        x = build_encoder_layer(builder, layer, x, config)?;
    }
    Ok(x)
}
