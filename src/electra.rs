//! ELECTRA 模型组装
//!
//! ```text
//! Input-Token, Input-Segment
//!     → Embeddings → Encoder × N
//!     → [Discriminator-Dense → Discriminator-Prediction]
//! ```
//!
//! 判别器头只在 `with_discriminator` 时追加，否则 Encoder 最后一层即为输出。

use std::path::Path;

use tracing::info;

use crate::checkpoint::TensorArchive;
use crate::config::{Activation, ElectraConfig};
use crate::embedding::{build_embeddings, build_inputs};
use crate::error::Result;
use crate::graph::{Graph, GraphBuilder, Port};
use crate::layers::{Dense, LayerOp};
use crate::loader::load_weights;
use crate::naming::NodeKey;
use crate::transformer::build_encoder_stack;

/// 默认随机种子
pub const DEFAULT_SEED: u64 = 42;

/// 判别器头：隐藏层投影 + 逐 token 的二分类打分
pub fn build_discriminator_head(
    builder: &mut GraphBuilder,
    input: Port,
    config: &ElectraConfig,
) -> Result<Port> {
    let hidden = builder.add(
        NodeKey::DiscriminatorDense,
        LayerOp::Dense(
            Dense::new(config.hidden_size, config.hidden_size).with_activation(config.hidden_act),
        ),
        &[input],
    )?;
    builder.add(
        NodeKey::DiscriminatorPrediction,
        LayerOp::Dense(Dense::new(config.hidden_size, 1).with_activation(Activation::Sigmoid)),
        &[hidden],
    )
}

/// 按配置构建图（默认种子）
pub fn build(config: &ElectraConfig) -> Result<Graph> {
    build_with_seed(config, DEFAULT_SEED)
}

/// 按配置构建图
///
/// 先校验配置，配置非法时不会创建任何节点。
pub fn build_with_seed(config: &ElectraConfig, seed: u64) -> Result<Graph> {
    config.validate()?;

    let mut builder = GraphBuilder::new(seed);
    let inputs = build_inputs(&mut builder, config.seq_len)?;
    let (embeddings, _token_table) = build_embeddings(&mut builder, inputs, config)?;
    let mut output =
        build_encoder_stack(&mut builder, config.num_hidden_layers, embeddings, config)?;
    if config.with_discriminator {
        output = build_discriminator_head(&mut builder, output, config)?;
    }

    let graph = builder.finish([inputs.0, inputs.1], output)?;
    info!(
        nodes = graph.len(),
        layers = graph.encoder_depth(),
        params = graph.param_count(),
        discriminator = config.with_discriminator,
        "built electra graph"
    );
    Ok(graph)
}

/// 按配置算出参数总量，不分配任何张量
///
/// 与 `build(config)?.param_count()` 相同，但适合 base 这类大模型。
pub fn count_params(config: &ElectraConfig) -> Result<usize> {
    config.validate()?;
    let (e, h, i) = (config.embedding_size, config.hidden_size, config.intermediate_size);

    let mut total = (config.vocab_size + config.type_vocab_size + config.max_position_embeddings)
        * e
        + 2 * e;
    if config.needs_projection() {
        total += e * h + h;
    }

    // 注意力 4 个投影 + 2 个 Norm + FFN 两层
    let layer = 4 * (h * h + h) + 2 * (2 * h) + (h * i + i) + (i * h + h);
    total += config.num_hidden_layers * layer;

    if config.with_discriminator {
        total += (h * h + h) + (h + 1);
    }
    Ok(total)
}

/// 构建选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelOptions {
    /// 序列长度上限，用于截短位置嵌入表；输入本身保持变长
    pub seq_len: Option<usize>,
    pub with_discriminator: bool,
    pub seed: u64,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            seq_len: None,
            with_discriminator: false,
            seed: DEFAULT_SEED,
        }
    }
}

/// 已加载权重的模型
#[derive(Debug, Clone)]
pub struct ElectraModel {
    pub config: ElectraConfig,
    pub graph: Graph,
}

impl ElectraModel {
    pub fn config(&self) -> &ElectraConfig {
        &self.config
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn into_graph(self) -> Graph {
        self.graph
    }
}

/// 从 `config.json` 和张量归档构建并加载模型
///
/// 绑定失败时直接返回错误，不会交出半加载的图。
pub fn build_electra_model<P, Q>(
    config_path: P,
    checkpoint_path: Q,
    options: ModelOptions,
) -> Result<ElectraModel>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let mut config = ElectraConfig::from_json_file(config_path)?
        .with_discriminator(options.with_discriminator);
    if let Some(seq_len) = options.seq_len {
        config = config.clamp_positions(seq_len);
    }

    let mut graph = build_with_seed(&config, options.seed)?;
    let archive = TensorArchive::open(checkpoint_path)?;
    load_weights(&mut graph, &config, &archive)?;

    Ok(ElectraModel { config, graph })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ElectraError;
    use crate::layers::OpKind;
    use std::collections::BTreeSet;
    use std::fs;

    fn test_config(embedding_size: usize) -> ElectraConfig {
        ElectraConfig {
            vocab_size: 40,
            type_vocab_size: 2,
            max_position_embeddings: 24,
            hidden_size: 128,
            embedding_size,
            num_hidden_layers: 2,
            num_attention_heads: 4,
            intermediate_size: 64,
            ..ElectraConfig::default()
        }
    }

    fn expected_names(config: &ElectraConfig) -> BTreeSet<String> {
        let mut names: Vec<String> = [
            "Input-Token",
            "Input-Segment",
            "Embedding-Token",
            "Embedding-Segment",
            "Embedding-Add-Token-Segment",
            "Embedding-Position",
            "Embedding-Norm",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let dropout = config.hidden_dropout_prob > 0.0;
        if dropout {
            names.push("Embedding-Dropout".to_string());
        }
        if config.embedding_size != config.hidden_size {
            names.push("Embedding-Map".to_string());
        }
        for i in 0..config.num_hidden_layers {
            for block in ["MultiHeadSelfAttention", "FeedForward"] {
                names.push(format!("Encoder-{}-{}", i, block));
                names.push(format!("Encoder-{}-{}-Add", i, block));
                names.push(format!("Encoder-{}-{}-Norm", i, block));
                if dropout {
                    names.push(format!("Encoder-{}-{}-Dropout", i, block));
                }
            }
        }
        if config.with_discriminator {
            names.push("Discriminator-Dense".to_string());
            names.push("Discriminator-Prediction".to_string());
        }
        names.into_iter().collect()
    }

    fn actual_names(graph: &Graph) -> BTreeSet<String> {
        graph.node_names().into_iter().map(String::from).collect()
    }

    #[test]
    fn test_node_names_match_naming_scheme() {
        for embedding_size in [64, 128] {
            for with_discriminator in [false, true] {
                for dropout in [0.0, 0.1] {
                    let config = ElectraConfig {
                        hidden_dropout_prob: dropout,
                        ..test_config(embedding_size)
                    }
                    .with_discriminator(with_discriminator);
                    let graph = build(&config).unwrap();
                    assert_eq!(actual_names(&graph), expected_names(&config));
                    assert_eq!(graph.len(), expected_names(&config).len());
                }
            }
        }
    }

    #[test]
    fn test_projection_scenario() {
        let graph = build(&test_config(64)).unwrap();
        let map = graph.get("Embedding-Map").unwrap();
        assert_eq!(map.params()[0].shape(), &[64, 128]);

        let graph = build(&test_config(128)).unwrap();
        assert!(graph.get("Embedding-Map").is_none());
    }

    #[test]
    fn test_output_node() {
        let graph = build(&test_config(128)).unwrap();
        assert_eq!(graph.node(graph.output().node).name(), "Encoder-1-FeedForward-Norm");

        let graph = build(&test_config(128).with_discriminator(true)).unwrap();
        let output = graph.node(graph.output().node);
        assert_eq!(output.name(), "Discriminator-Prediction");
        assert_eq!(
            output.op(),
            &LayerOp::Dense(Dense::new(128, 1).with_activation(Activation::Sigmoid))
        );
        assert_eq!(
            graph.get("Discriminator-Dense").unwrap().params()[0].shape(),
            &[128, 128]
        );
    }

    #[test]
    fn test_inputs_are_token_and_segment() {
        let graph = build(&test_config(128).with_seq_len(Some(12))).unwrap();
        let [token, segment] = graph.inputs();
        assert_eq!(graph.node(token.node).name(), "Input-Token");
        assert_eq!(graph.node(segment.node).name(), "Input-Segment");
        assert_eq!(graph.node(token.node).kind(), OpKind::Input);
        assert_eq!(graph.node(token.node).op(), &LayerOp::Input { seq_len: Some(12) });
    }

    #[test]
    fn test_invalid_config_fails_before_building() {
        let config = ElectraConfig {
            num_attention_heads: 5,
            ..test_config(128)
        };
        assert!(matches!(build(&config), Err(ElectraError::Config(_))));

        let config = ElectraConfig {
            vocab_size: 0,
            ..test_config(128)
        };
        assert!(matches!(build(&config), Err(ElectraError::Config(_))));
    }

    #[test]
    fn test_count_params_matches_built_graph() {
        for embedding_size in [64, 128] {
            for with_discriminator in [false, true] {
                let config = test_config(embedding_size).with_discriminator(with_discriminator);
                let graph = build(&config).unwrap();
                assert_eq!(count_params(&config).unwrap(), graph.param_count());
            }
        }
        assert!(count_params(&ElectraConfig {
            vocab_size: 0,
            ..test_config(64)
        })
        .is_err());
    }

    #[test]
    fn test_seeded_build_is_reproducible() {
        let a = build_with_seed(&test_config(64), 7).unwrap();
        let b = build_with_seed(&test_config(64), 7).unwrap();
        let c = build_with_seed(&test_config(64), 8).unwrap();

        let table = |g: &Graph| g.get("Embedding-Token").unwrap().params()[0].value().clone();
        assert_eq!(table(&a), table(&b));
        assert_ne!(table(&a), table(&c));
    }

    #[test]
    fn test_build_electra_model_from_files() {
        let dir = std::env::temp_dir().join("mini_electra_build_model");
        fs::create_dir_all(&dir).unwrap();
        let config_path = dir.join("config.json");
        let checkpoint_path = dir.join("model.bin");

        // 用另一个种子生成“预训练”权重
        let config = test_config(64).with_discriminator(true);
        let source = build_with_seed(&config, 1).unwrap();
        fs::write(&config_path, config.to_json_string().unwrap()).unwrap();
        TensorArchive::from_graph(&source).save(&checkpoint_path).unwrap();

        let options = ModelOptions {
            seq_len: Some(16),
            with_discriminator: true,
            seed: 99,
        };
        let model = build_electra_model(&config_path, &checkpoint_path, options).unwrap();

        assert_eq!(model.config().max_position_embeddings, 16);
        let position = model.graph().get("Embedding-Position").unwrap();
        assert_eq!(position.params()[0].shape(), &[16, 64]);
        assert!(position.is_loaded());

        let bound = model.graph().get("Discriminator-Prediction").unwrap();
        let expected = source.get("Discriminator-Prediction").unwrap();
        assert_eq!(bound.weights(), expected.weights());
        assert!(model.graph().nodes().all(|n| n.params().is_empty() || n.is_loaded()));

        fs::remove_dir_all(&dir).unwrap();
    }
}
