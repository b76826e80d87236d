//! 打印预设模型的图结构
//!
//! 运行：`cargo run --example graph_summary`

use anyhow::Result;
use mini_electra::{build, checkpoint_keys, configs, count_params};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    println!("╔════════════════════════════════════════════════╗");
    println!("║   ELECTRA 计算图结构                           ║");
    println!("╚════════════════════════════════════════════════╝\n");

    let config = configs::mini().with_discriminator(true);
    let graph = build(&config)?;
    println!("{}\n", graph.summary());

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("节点 → 检查点路径");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
    for node in graph.nodes() {
        let keys = checkpoint_keys(node.key());
        if keys.is_empty() {
            continue;
        }
        println!("{}", node.name());
        for (key, param) in keys.iter().zip(node.params()) {
            println!("  {:<6} {:?} ← {}", param.name(), param.shape(), key);
        }
    }

    // 只按形状计算，不构建图：base 模型约 1.1 亿个参数
    println!("\n📊 各预设参数量");
    for (name, config) in [
        ("mini", configs::mini()),
        ("electra-small", configs::electra_small()),
        ("electra-base", configs::electra_base()),
    ] {
        println!(
            "  {:<14} layers={:<3} params={}",
            name,
            config.num_hidden_layers,
            count_params(&config)?
        );
    }

    Ok(())
}
