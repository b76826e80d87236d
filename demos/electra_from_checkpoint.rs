//! 从检查点加载 ELECTRA 示例
//!
//! 1. 用一个种子构建图并导出为张量归档（充当“预训练”检查点）
//! 2. 写出 config.json
//! 3. 用 `build_electra_model` 重新构建并绑定权重
//!
//! 运行：`RUST_LOG=debug cargo run --example electra_from_checkpoint`

use std::fs;

use anyhow::Result;
use mini_electra::{
    build_electra_model, build_with_seed, configs, CheckpointStore, ModelOptions, TensorArchive,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("╔════════════════════════════════════════════════╗");
    println!("║   ELECTRA 检查点加载                           ║");
    println!("╚════════════════════════════════════════════════╝\n");

    let dir = std::env::temp_dir().join("mini_electra_demo");
    fs::create_dir_all(&dir)?;
    let config_path = dir.join("config.json");
    let checkpoint_path = dir.join("model.bin");

    // ============ 准备检查点 ============
    println!("📦 生成检查点...");
    let config = configs::mini().with_discriminator(true);
    let pretrained = build_with_seed(&config, 2024)?;
    let archive = TensorArchive::from_graph(&pretrained);
    archive.save(&checkpoint_path)?;
    fs::write(&config_path, config.to_json_string()?)?;

    println!("  张量数: {}", archive.len());
    println!("  参数量: {}", pretrained.param_count());
    println!("  配置: {}", config_path.display());
    println!("  检查点: {}\n", checkpoint_path.display());

    // ============ 构建并加载 ============
    println!("🔧 构建模型并加载权重 (seq_len = 32)...");
    let options = ModelOptions {
        seq_len: Some(32),
        with_discriminator: true,
        ..ModelOptions::default()
    };
    let model = build_electra_model(&config_path, &checkpoint_path, options)?;
    let graph = model.graph();

    let loaded = graph.nodes().filter(|n| n.is_loaded()).count();
    let with_params = graph.nodes().filter(|n| !n.params().is_empty()).count();
    println!("  节点数: {}", graph.len());
    println!("  Encoder 层数: {}", graph.encoder_depth());
    println!("  已加载节点: {}/{}", loaded, with_params);

    let position = graph
        .get("Embedding-Position")
        .ok_or_else(|| anyhow::anyhow!("missing Embedding-Position"))?;
    println!(
        "  位置嵌入: {:?} (检查点中为 {:?})\n",
        position.params()[0].shape(),
        archive.load("bert/embeddings/position_embeddings")?.shape()
    );

    // ============ 校验 ============
    let head = graph
        .get("Discriminator-Prediction")
        .ok_or_else(|| anyhow::anyhow!("missing Discriminator-Prediction"))?;
    let expected = archive.load("discriminator_predictions/dense_1/kernel")?;
    println!(
        "✓ 判别器权重与检查点一致: {}",
        head.weights()[0] == &expected
    );

    fs::remove_dir_all(&dir)?;
    Ok(())
}
