//! 模型超参数
//!
//! 对应官方 BERT / ELECTRA 的 `config.json`，读取后在构建任何节点之前完成校验。

use crate::error::{ElectraError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// 激活函数类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Gelu,
    GeluNew,
    Relu,
    Tanh,
    Sigmoid,
    Swish,
    Linear,
}

impl Activation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Activation::Gelu => "gelu",
            Activation::GeluNew => "gelu_new",
            Activation::Relu => "relu",
            Activation::Tanh => "tanh",
            Activation::Sigmoid => "sigmoid",
            Activation::Swish => "swish",
            Activation::Linear => "linear",
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Activation {
    type Err = ElectraError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gelu" => Ok(Activation::Gelu),
            "gelu_new" | "gelu_fast" => Ok(Activation::GeluNew),
            "relu" => Ok(Activation::Relu),
            "tanh" => Ok(Activation::Tanh),
            "sigmoid" => Ok(Activation::Sigmoid),
            "swish" | "silu" => Ok(Activation::Swish),
            "linear" | "identity" => Ok(Activation::Linear),
            other => Err(ElectraError::config(format!(
                "unsupported activation `{}`",
                other
            ))),
        }
    }
}

/// 原始 `config.json` 内容，所有字段都可能缺失
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfig {
    vocab_size: Option<usize>,
    type_vocab_size: Option<usize>,
    max_position_embeddings: Option<usize>,
    hidden_size: Option<usize>,
    embedding_size: Option<usize>,
    num_hidden_layers: Option<usize>,
    num_attention_heads: Option<usize>,
    intermediate_size: Option<usize>,
    hidden_act: Option<String>,
    attention_probs_dropout_prob: Option<f32>,
    hidden_dropout_prob: Option<f32>,
}

fn required<T>(value: Option<T>, key: &str) -> Result<T> {
    value.ok_or_else(|| {
        ElectraError::config(format!("missing required hyperparameter `{}`", key))
    })
}

/// ELECTRA 配置
///
/// 字段名与检查点附带的 `config.json` 保持一致。`with_discriminator`
/// 和 `seq_len` 是构建选项，不从 JSON 读取。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawConfig")]
pub struct ElectraConfig {
    /// 词表大小
    pub vocab_size: usize,
    /// 句子类型（segment）数量
    pub type_vocab_size: usize,
    /// 位置嵌入表行数
    pub max_position_embeddings: usize,
    /// 隐藏层维度
    pub hidden_size: usize,
    /// 嵌入维度，与 hidden_size 不同时追加投影层
    pub embedding_size: usize,
    /// Encoder 层数
    pub num_hidden_layers: usize,
    /// 注意力头数
    pub num_attention_heads: usize,
    /// FFN 隐藏层维度
    pub intermediate_size: usize,
    /// FFN 激活函数
    pub hidden_act: Activation,
    pub attention_probs_dropout_prob: f32,
    pub hidden_dropout_prob: f32,
    /// 是否追加判别器头
    #[serde(skip_serializing)]
    pub with_discriminator: bool,
    /// 固定输入长度，None 表示变长
    #[serde(skip_serializing)]
    pub seq_len: Option<usize>,
}

impl TryFrom<RawConfig> for ElectraConfig {
    type Error = ElectraError;

    fn try_from(raw: RawConfig) -> Result<Self> {
        let hidden_size = required(raw.hidden_size, "hidden_size")?;
        let hidden_act = required(raw.hidden_act, "hidden_act")?.parse()?;

        let config = Self {
            vocab_size: required(raw.vocab_size, "vocab_size")?,
            type_vocab_size: required(raw.type_vocab_size, "type_vocab_size")?,
            max_position_embeddings: required(
                raw.max_position_embeddings,
                "max_position_embeddings",
            )?,
            hidden_size,
            embedding_size: raw.embedding_size.unwrap_or(hidden_size),
            num_hidden_layers: required(raw.num_hidden_layers, "num_hidden_layers")?,
            num_attention_heads: required(raw.num_attention_heads, "num_attention_heads")?,
            intermediate_size: required(raw.intermediate_size, "intermediate_size")?,
            hidden_act,
            attention_probs_dropout_prob: required(
                raw.attention_probs_dropout_prob,
                "attention_probs_dropout_prob",
            )?,
            hidden_dropout_prob: required(raw.hidden_dropout_prob, "hidden_dropout_prob")?,
            with_discriminator: false,
            seq_len: None,
        };
        config.validate()?;
        Ok(config)
    }
}

impl Default for ElectraConfig {
    fn default() -> Self {
        Self {
            vocab_size: 30522,
            type_vocab_size: 2,
            max_position_embeddings: 512,
            hidden_size: 768,
            embedding_size: 768,
            num_hidden_layers: 12,
            num_attention_heads: 12,
            intermediate_size: 3072,
            hidden_act: Activation::Gelu,
            attention_probs_dropout_prob: 0.1,
            hidden_dropout_prob: 0.1,
            with_discriminator: false,
            seq_len: None,
        }
    }
}

impl ElectraConfig {
    /// 从 JSON 文本解析
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(json)?;
        Self::try_from(raw)
    }

    /// 从 `config.json` 文件读取
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// 序列化为 `config.json` 格式
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// 校验超参数
    ///
    /// 构建器在创建第一个节点之前调用，失败时不会留下半成品图。
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("vocab_size", self.vocab_size),
            ("type_vocab_size", self.type_vocab_size),
            ("max_position_embeddings", self.max_position_embeddings),
            ("hidden_size", self.hidden_size),
            ("embedding_size", self.embedding_size),
            ("num_hidden_layers", self.num_hidden_layers),
            ("num_attention_heads", self.num_attention_heads),
            ("intermediate_size", self.intermediate_size),
        ];
        for (key, value) in sizes {
            if value == 0 {
                return Err(ElectraError::config(format!("`{}` must be positive", key)));
            }
        }

        if self.hidden_size % self.num_attention_heads != 0 {
            return Err(ElectraError::config(format!(
                "hidden_size {} must be divisible by num_attention_heads {}",
                self.hidden_size, self.num_attention_heads
            )));
        }

        let rates = [
            ("attention_probs_dropout_prob", self.attention_probs_dropout_prob),
            ("hidden_dropout_prob", self.hidden_dropout_prob),
        ];
        for (key, rate) in rates {
            if !(0.0..1.0).contains(&rate) {
                return Err(ElectraError::config(format!(
                    "`{}` must be in [0, 1), got {}",
                    key, rate
                )));
            }
        }

        if self.seq_len == Some(0) {
            return Err(ElectraError::config("`seq_len` must be positive when set"));
        }

        Ok(())
    }

    /// 是否需要嵌入投影层（Embedding-Map）
    pub fn needs_projection(&self) -> bool {
        self.embedding_size != self.hidden_size
    }

    /// 每个注意力头的维度
    pub fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }

    /// 把位置嵌入表截到 `seq_len` 行（不会变大）
    pub fn clamp_positions(mut self, seq_len: usize) -> Self {
        self.max_position_embeddings = self.max_position_embeddings.min(seq_len);
        self
    }

    pub fn with_discriminator(mut self, with_discriminator: bool) -> Self {
        self.with_discriminator = with_discriminator;
        self
    }

    pub fn with_seq_len(mut self, seq_len: Option<usize>) -> Self {
        self.seq_len = seq_len;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_JSON: &str = r#"{
        "vocab_size": 30522,
        "type_vocab_size": 2,
        "max_position_embeddings": 512,
        "hidden_size": 256,
        "embedding_size": 128,
        "num_hidden_layers": 12,
        "num_attention_heads": 4,
        "intermediate_size": 1024,
        "hidden_act": "gelu",
        "attention_probs_dropout_prob": 0.1,
        "hidden_dropout_prob": 0.1,
        "initializer_range": 0.02
    }"#;

    #[test]
    fn test_parse_small_config() {
        let config = ElectraConfig::from_json_str(SMALL_JSON).unwrap();
        assert_eq!(config.hidden_size, 256);
        assert_eq!(config.embedding_size, 128);
        assert_eq!(config.hidden_act, Activation::Gelu);
        assert!(config.needs_projection());
        assert!(!config.with_discriminator);
        assert_eq!(config.head_dim(), 64);
    }

    #[test]
    fn test_embedding_size_defaults_to_hidden() {
        let json = SMALL_JSON.replace("\"embedding_size\": 128,", "");
        let config = ElectraConfig::from_json_str(&json).unwrap();
        assert_eq!(config.embedding_size, 256);
        assert!(!config.needs_projection());
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let json = SMALL_JSON.replace("\"num_hidden_layers\": 12,", "");
        let err = ElectraConfig::from_json_str(&json).unwrap_err();
        match err {
            ElectraError::Config(msg) => assert!(msg.contains("num_hidden_layers")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_activation() {
        let json = SMALL_JSON.replace("\"gelu\"", "\"softplus\"");
        assert!(matches!(
            ElectraConfig::from_json_str(&json),
            Err(ElectraError::Config(_))
        ));
    }

    #[test]
    fn test_validate_heads_divide_hidden() {
        let config = ElectraConfig {
            num_attention_heads: 5,
            ..ElectraConfig::default()
        };
        assert!(matches!(config.validate(), Err(ElectraError::Config(_))));
    }

    #[test]
    fn test_validate_dropout_range() {
        let config = ElectraConfig {
            hidden_dropout_prob: 1.0,
            ..ElectraConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_clamp_positions() {
        let config = ElectraConfig::default().clamp_positions(128);
        assert_eq!(config.max_position_embeddings, 128);

        // 不会放大
        let config = ElectraConfig::default().clamp_positions(4096);
        assert_eq!(config.max_position_embeddings, 512);
    }

    #[test]
    fn test_json_roundtrip_keeps_hyperparameters() {
        let config = ElectraConfig::from_json_str(SMALL_JSON).unwrap();
        let json = config.to_json_string().unwrap();
        assert!(json.contains("\"hidden_act\": \"gelu\""));
        assert!(!json.contains("with_discriminator"));

        let parsed: ElectraConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
