//! 权重绑定
//!
//! 按固定顺序遍历命名方案，对每个带参数的节点：
//! 1. 用 [`checkpoint_keys`] 得到检查点路径
//! 2. 从检查点依次取出张量
//! 3. 校验数量和形状后整体写入节点
//!
//! 顺序：词嵌入 → 类型嵌入 → 位置嵌入（截取前 max_position_embeddings 行）
//! → 嵌入 Norm → [嵌入投影] → 每个 Encoder 层 → [判别器头]。
//!
//! 任何一步失败都会中止整个绑定，此时图处于部分写入状态，调用方应丢弃它。

use tracing::{debug, info};

use crate::checkpoint::CheckpointStore;
use crate::config::ElectraConfig;
use crate::error::{ElectraError, Result};
use crate::graph::Graph;
use crate::naming::{checkpoint_keys, node_name, EncoderPart, NodeKey};
use crate::tensor::TensorExt;

const LAYER_PARTS: [EncoderPart; 4] = [
    EncoderPart::Attention,
    EncoderPart::AttentionNorm,
    EncoderPart::FeedForward,
    EncoderPart::FeedForwardNorm,
];

fn require(graph: &Graph, key: NodeKey) -> Result<String> {
    let name = node_name(key);
    if graph.contains(&name) {
        Ok(name)
    } else {
        Err(ElectraError::integrity(format!("graph has no node `{}`", name)))
    }
}

/// 绑定单个节点
fn bind_node<S: CheckpointStore + ?Sized>(graph: &mut Graph, key: NodeKey, store: &S) -> Result<()> {
    let name = require(graph, key)?;
    let keys = checkpoint_keys(key);
    let values = store.load_many(&keys)?;
    graph.set_weights(&name, values)?;
    debug!(node = %name, tensors = keys.len(), "bound weights");
    Ok(())
}

/// 位置嵌入表可能比配置的更长，只保留前 `max_position_embeddings` 行
fn bind_position<S: CheckpointStore + ?Sized>(
    graph: &mut Graph,
    config: &ElectraConfig,
    store: &S,
) -> Result<()> {
    let key = NodeKey::EmbeddingPosition;
    let name = require(graph, key)?;
    let path = checkpoint_keys(key)
        .into_iter()
        .next()
        .ok_or_else(|| ElectraError::integrity("position embedding has no checkpoint path"))?;

    let stored = store.load(&path)?;
    let rows = config.max_position_embeddings;
    let table = stored
        .take_rows(rows)
        .ok_or_else(|| ElectraError::ShapeMismatch {
            node: name.clone(),
            param: "embeddings".to_string(),
            expected: vec![rows, config.embedding_size],
            actual: stored.dims(),
        })?;

    graph.set_weights(&name, vec![table])?;
    debug!(
        node = %name,
        stored_rows = stored.dims().first().copied().unwrap_or(0),
        rows,
        "bound position embeddings"
    );
    Ok(())
}

/// 把检查点中的权重绑定到图上
///
/// - 图中没有 `Embedding-Map` 时跳过投影层
/// - 某一层的注意力节点不存在时跳过整层（检查点可以比图更深）
/// - 图中存在判别器头时总会绑定，与 `with_discriminator` 无关
/// - 图需要的张量在检查点中缺失时返回 `MissingWeight`
///
/// 对同一个图和检查点重复调用结果相同。
pub fn load_weights<S: CheckpointStore + ?Sized>(
    graph: &mut Graph,
    config: &ElectraConfig,
    store: &S,
) -> Result<()> {
    bind_node(graph, NodeKey::EmbeddingToken, store)?;
    bind_node(graph, NodeKey::EmbeddingSegment, store)?;
    bind_position(graph, config, store)?;
    bind_node(graph, NodeKey::EmbeddingNorm, store)?;

    if graph.contains(&node_name(NodeKey::EmbeddingMap)) {
        bind_node(graph, NodeKey::EmbeddingMap, store)?;
    }

    // 图比配置更深时，多出的层同样需要权重
    let depth = config.num_hidden_layers.max(graph.encoder_depth());
    let mut layers = 0;
    for layer in 0..depth {
        if !graph.contains(&node_name(NodeKey::encoder(layer, EncoderPart::Attention))) {
            continue;
        }
        for part in LAYER_PARTS {
            bind_node(graph, NodeKey::encoder(layer, part), store)?;
        }
        layers += 1;
    }

    // 图中有判别器头就必须绑定；配置要求了却没有则报错
    let discriminator =
        config.with_discriminator || graph.contains(&node_name(NodeKey::DiscriminatorDense));
    if discriminator {
        bind_node(graph, NodeKey::DiscriminatorDense, store)?;
        bind_node(graph, NodeKey::DiscriminatorPrediction, store)?;
    }

    info!(layers, discriminator, "loaded checkpoint weights");
    Ok(())
}
