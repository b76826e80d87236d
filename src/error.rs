//! 错误类型
//!
//! 构建与加载过程中可能出现的所有错误。

use thiserror::Error;

/// 统一的 Result 别名
pub type Result<T> = std::result::Result<T, ElectraError>;

/// ELECTRA 构建 / 权重绑定错误
#[derive(Debug, Error)]
pub enum ElectraError {
    /// 超参数缺失或非法，在创建任何节点之前抛出
    #[error("configuration error: {0}")]
    Config(String),

    /// 图的内部不变量被破坏（重名、悬空引用等），说明构建逻辑有 bug
    #[error("graph integrity error: {0}")]
    GraphIntegrity(String),

    /// 检查点中缺少图所需的张量
    #[error("missing weight `{key}` in checkpoint")]
    MissingWeight { key: String },

    /// 张量形状与参数槽不一致
    #[error("shape mismatch for `{node}` parameter `{param}`: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        node: String,
        param: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// 张量数量与参数槽数量不一致
    #[error("`{node}` expects {expected} weights, got {actual}")]
    WeightCount {
        node: String,
        expected: usize,
        actual: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ElectraError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::GraphIntegrity(message.into())
    }

    pub fn missing(key: impl Into<String>) -> Self {
        Self::MissingWeight { key: key.into() }
    }
}

impl From<serde_json::Error> for ElectraError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for ElectraError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<ndarray::ShapeError> for ElectraError {
    fn from(e: ndarray::ShapeError) -> Self {
        Self::Serialization(e.to_string())
    }
}
