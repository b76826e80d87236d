//! 检查点访问
//!
//! 检查点就是一张 路径 → 张量 的表，例如
//! `bert/encoder/layer_0/attention/self/query/kernel`。
//! 这里提供读取接口 [`CheckpointStore`] 以及几种实现：
//! - [`MemoryCheckpoint`]：内存中的 HashMap
//! - [`FnCheckpoint`]：包装任意取张量的函数
//! - [`TensorArchive`]：可保存为 JSON 或二进制文件的张量归档

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ElectraError, Result};
use crate::graph::Graph;
use crate::naming::checkpoint_keys;
use crate::tensor::{Tensor, TensorExt};

/// 只读的检查点
pub trait CheckpointStore {
    /// 按路径读取张量，不存在时返回 `MissingWeight`
    fn load(&self, key: &str) -> Result<Tensor>;

    fn contains(&self, key: &str) -> bool;

    /// 依次读取多个张量，遇到第一个缺失的路径即停止
    fn load_many(&self, keys: &[String]) -> Result<Vec<Tensor>> {
        keys.iter().map(|key| self.load(key)).collect()
    }
}

impl<S: CheckpointStore + ?Sized> CheckpointStore for &S {
    fn load(&self, key: &str) -> Result<Tensor> {
        (**self).load(key)
    }

    fn contains(&self, key: &str) -> bool {
        (**self).contains(key)
    }

    fn load_many(&self, keys: &[String]) -> Result<Vec<Tensor>> {
        (**self).load_many(keys)
    }
}

/// 把图中所有参数按检查点路径导出
///
/// 是权重绑定的逆操作，常用来生成测试夹具。
pub fn export_tensors(graph: &Graph) -> Vec<(String, Tensor)> {
    let mut tensors = Vec::new();
    for node in graph.nodes() {
        let keys = checkpoint_keys(node.key());
        for (key, param) in keys.into_iter().zip(node.params()) {
            tensors.push((key, param.value().clone()));
        }
    }
    tensors
}

/// 内存检查点
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpoint {
    tensors: HashMap<String, Tensor>,
}

impl MemoryCheckpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_graph(graph: &Graph) -> Self {
        export_tensors(graph).into_iter().collect()
    }

    /// 插入或替换张量
    pub fn insert(&mut self, key: impl Into<String>, tensor: Tensor) -> Option<Tensor> {
        self.tensors.insert(key.into(), tensor)
    }

    pub fn remove(&mut self, key: &str) -> Option<Tensor> {
        self.tensors.remove(key)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

impl FromIterator<(String, Tensor)> for MemoryCheckpoint {
    fn from_iter<I: IntoIterator<Item = (String, Tensor)>>(iter: I) -> Self {
        Self {
            tensors: iter.into_iter().collect(),
        }
    }
}

impl CheckpointStore for MemoryCheckpoint {
    fn load(&self, key: &str) -> Result<Tensor> {
        self.tensors
            .get(key)
            .cloned()
            .ok_or_else(|| ElectraError::missing(key))
    }

    fn contains(&self, key: &str) -> bool {
        self.tensors.contains_key(key)
    }
}

/// 用函数充当检查点
///
/// ```ignore
/// let store = FnCheckpoint::new(|key: &str| reader.read_tensor(key));
/// ```
pub struct FnCheckpoint<F> {
    fetch: F,
}

impl<F> FnCheckpoint<F>
where
    F: Fn(&str) -> Result<Tensor>,
{
    pub fn new(fetch: F) -> Self {
        Self { fetch }
    }
}

impl<F> CheckpointStore for FnCheckpoint<F>
where
    F: Fn(&str) -> Result<Tensor>,
{
    fn load(&self, key: &str) -> Result<Tensor> {
        (self.fetch)(key)
    }

    fn contains(&self, key: &str) -> bool {
        (self.fetch)(key).is_ok()
    }
}

/// 可序列化的 N 维数组
///
/// 数据按行优先（逻辑顺序）展平。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializableArray {
    pub data: Vec<f32>,
    pub shape: Vec<usize>,
}

impl SerializableArray {
    pub fn from_array(arr: &Tensor) -> Self {
        Self {
            data: arr.iter().copied().collect(),
            shape: arr.dims(),
        }
    }

    /// 转换为张量，数据长度与形状不符时报错
    pub fn to_array(&self) -> Result<Tensor> {
        Ok(ArrayD::from_shape_vec(
            IxDyn(&self.shape),
            self.data.clone(),
        )?)
    }
}

/// 张量归档文件
///
/// 扩展名为 `.json` 时使用 JSON，其余一律使用 bincode 二进制格式（更紧凑）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TensorArchive {
    tensors: BTreeMap<String, SerializableArray>,
}

impl TensorArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_graph(graph: &Graph) -> Self {
        export_tensors(graph).into_iter().collect()
    }

    pub fn insert(&mut self, key: impl Into<String>, tensor: &Tensor) {
        self.tensors
            .insert(key.into(), SerializableArray::from_array(tensor));
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// 保存为 JSON 格式
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    /// 从 JSON 格式加载
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }

    /// 保存为二进制格式
    pub fn save_binary<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        bincode::serialize_into(writer, self)?;
        Ok(())
    }

    /// 从二进制格式加载
    pub fn load_binary<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        Ok(bincode::deserialize_from(reader)?)
    }

    /// 按扩展名选择格式保存
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if is_json(path) {
            self.save_json(path)?;
        } else {
            self.save_binary(path)?;
        }
        info!(path = %path.display(), tensors = self.len(), "saved tensor archive");
        Ok(())
    }

    /// 按扩展名选择格式打开归档
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let archive = if is_json(path) {
            Self::load_json(path)?
        } else {
            Self::load_binary(path)?
        };
        info!(path = %path.display(), tensors = archive.len(), "loaded tensor archive");
        Ok(archive)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

impl FromIterator<(String, Tensor)> for TensorArchive {
    fn from_iter<I: IntoIterator<Item = (String, Tensor)>>(iter: I) -> Self {
        let mut archive = Self::new();
        for (key, tensor) in iter {
            archive.insert(key, &tensor);
        }
        archive
    }
}

impl CheckpointStore for TensorArchive {
    fn load(&self, key: &str) -> Result<Tensor> {
        self.tensors
            .get(key)
            .ok_or_else(|| ElectraError::missing(key))?
            .to_array()
    }

    fn contains(&self, key: &str) -> bool {
        self.tensors.contains_key(key)
    }
}
