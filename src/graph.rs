//! 计算图
//!
//! 节点按创建顺序存放（天然是拓扑序），同时维护一张 名字 → 节点 的索引，
//! 权重绑定时通过索引查找节点，而不是遍历或反射。

use std::collections::HashMap;
use std::fmt::Write as _;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{ElectraError, Result};
use crate::layers::{LayerOp, OpKind};
use crate::naming::{node_name, EncoderPart, NodeKey};
use crate::tensor::{Tensor, TensorExt};

/// 节点引用（节点在图中的下标）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef(usize);

impl NodeRef {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// 节点的某一个输出
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Port {
    pub node: NodeRef,
    pub output: usize,
}

/// 参数槽
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: &'static str,
    shape: Vec<usize>,
    value: Tensor,
}

impl Parameter {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn value(&self) -> &Tensor {
        &self.value
    }
}

/// 图中的一个命名节点
#[derive(Debug, Clone)]
pub struct LayerNode {
    key: NodeKey,
    name: String,
    op: LayerOp,
    inputs: Vec<Port>,
    params: Vec<Parameter>,
    loaded: bool,
}

impl LayerNode {
    pub fn key(&self) -> NodeKey {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op(&self) -> &LayerOp {
        &self.op
    }

    pub fn kind(&self) -> OpKind {
        self.op.kind()
    }

    pub fn inputs(&self) -> &[Port] {
        &self.inputs
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    /// 当前参数值，顺序与参数槽一致
    pub fn weights(&self) -> Vec<&Tensor> {
        self.params.iter().map(|p| &p.value).collect()
    }

    /// 是否已从检查点加载过权重
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn param_count(&self) -> usize {
        self.params.iter().map(|p| p.value.len()).sum()
    }

    /// 整体替换参数
    ///
    /// 数量和每个张量的形状都必须与参数槽一致；校验全部通过后才写入，
    /// 失败时节点保持原样。
    pub fn set_weights(&mut self, values: Vec<Tensor>) -> Result<()> {
        if values.len() != self.params.len() {
            return Err(ElectraError::WeightCount {
                node: self.name.clone(),
                expected: self.params.len(),
                actual: values.len(),
            });
        }

        for (param, value) in self.params.iter().zip(&values) {
            if value.shape() != param.shape.as_slice() {
                return Err(ElectraError::ShapeMismatch {
                    node: self.name.clone(),
                    param: param.name.to_string(),
                    expected: param.shape.clone(),
                    actual: value.dims(),
                });
            }
        }

        for (param, value) in self.params.iter_mut().zip(values) {
            param.value = value;
        }
        self.loaded = true;
        Ok(())
    }
}

/// 名字索引 + 节点列表，构建期和完成后的图共用
#[derive(Debug, Clone, Default)]
struct NodeTable {
    nodes: Vec<LayerNode>,
    index: HashMap<String, NodeRef>,
}

impl NodeTable {
    fn find(&self, name: &str) -> Option<NodeRef> {
        self.index.get(name).copied()
    }

    fn check_port(&self, port: Port) -> Result<()> {
        let node = self.nodes.get(port.node.0).ok_or_else(|| {
            ElectraError::integrity(format!("dangling reference to node #{}", port.node.0))
        })?;
        if port.output >= node.op.num_outputs() {
            return Err(ElectraError::integrity(format!(
                "`{}` has no output #{}",
                node.name, port.output
            )));
        }
        Ok(())
    }
}

/// 图构建器
///
/// 每个节点在创建时分配参数槽并按初始化方式填充；随机数种子固定，
/// 同样的配置和种子总是得到同样的初始参数。
#[derive(Debug)]
pub struct GraphBuilder {
    table: NodeTable,
    rng: StdRng,
}

impl GraphBuilder {
    pub fn new(seed: u64) -> Self {
        Self {
            table: NodeTable::default(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// 添加节点，返回其第 0 个输出
    pub fn add(&mut self, key: NodeKey, op: LayerOp, inputs: &[Port]) -> Result<Port> {
        let name = node_name(key);
        if self.table.index.contains_key(&name) {
            return Err(ElectraError::integrity(format!("duplicate node name `{}`", name)));
        }
        if !op.accepts_inputs(inputs.len()) {
            return Err(ElectraError::integrity(format!(
                "`{}` ({}) cannot take {} inputs",
                name,
                op.kind(),
                inputs.len()
            )));
        }
        for port in inputs {
            self.table.check_port(*port)?;
        }

        let mut params = Vec::new();
        for spec in op.param_specs() {
            params.push(Parameter {
                name: spec.name,
                value: spec.init.init(&spec.shape, &mut self.rng)?,
                shape: spec.shape,
            });
        }

        let node_ref = NodeRef(self.table.nodes.len());
        self.table.nodes.push(LayerNode {
            key,
            name: name.clone(),
            op,
            inputs: inputs.to_vec(),
            params,
            loaded: false,
        });
        self.table.index.insert(name, node_ref);

        Ok(Port {
            node: node_ref,
            output: 0,
        })
    }

    /// 取节点的第 `output` 个输出
    pub fn output(&self, port: Port, output: usize) -> Result<Port> {
        let port = Port {
            node: port.node,
            output,
        };
        self.table.check_port(port)?;
        Ok(port)
    }

    pub fn find(&self, name: &str) -> Option<NodeRef> {
        self.table.find(name)
    }

    pub fn node(&self, node: NodeRef) -> &LayerNode {
        &self.table.nodes[node.0]
    }

    pub fn len(&self) -> usize {
        self.table.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.nodes.is_empty()
    }

    /// 声明输入输出，得到完整的图
    pub fn finish(self, inputs: [Port; 2], output: Port) -> Result<Graph> {
        for port in inputs {
            self.table.check_port(port)?;
            let node = &self.table.nodes[port.node.0];
            if node.kind() != OpKind::Input {
                return Err(ElectraError::integrity(format!(
                    "`{}` is not an input placeholder",
                    node.name
                )));
            }
        }
        if inputs[0] == inputs[1] {
            return Err(ElectraError::integrity("graph inputs must be distinct"));
        }
        self.table.check_port(output)?;

        Ok(Graph {
            table: self.table,
            inputs,
            output,
        })
    }
}

/// 完整的计算图：两个输入（token ids、segment ids），一个输出
#[derive(Debug, Clone)]
pub struct Graph {
    table: NodeTable,
    inputs: [Port; 2],
    output: Port,
}

impl Graph {
    pub fn inputs(&self) -> [Port; 2] {
        self.inputs
    }

    pub fn output(&self) -> Port {
        self.output
    }

    pub fn node(&self, node: NodeRef) -> &LayerNode {
        &self.table.nodes[node.0]
    }

    /// 按名字查找节点
    pub fn get(&self, name: &str) -> Option<&LayerNode> {
        self.table.find(name).map(|r| &self.table.nodes[r.0])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut LayerNode> {
        match self.table.find(name) {
            Some(r) => Some(&mut self.table.nodes[r.0]),
            None => None,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.index.contains_key(name)
    }

    /// 按拓扑序遍历节点
    pub fn nodes(&self) -> impl Iterator<Item = &LayerNode> {
        self.table.nodes.iter()
    }

    pub fn node_names(&self) -> Vec<&str> {
        self.table.nodes.iter().map(|n| n.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.table.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.nodes.is_empty()
    }

    /// 给指定节点设置参数
    pub fn set_weights(&mut self, name: &str, values: Vec<Tensor>) -> Result<()> {
        self.get_mut(name)
            .ok_or_else(|| ElectraError::integrity(format!("graph has no node `{}`", name)))?
            .set_weights(values)
    }

    /// Encoder 层数（按注意力节点计数）
    pub fn encoder_depth(&self) -> usize {
        self.table
            .nodes
            .iter()
            .filter(|n| {
                matches!(
                    n.key,
                    NodeKey::Encoder {
                        part: EncoderPart::Attention,
                        ..
                    }
                )
            })
            .count()
    }

    /// 总参数数量
    pub fn param_count(&self) -> usize {
        self.table.nodes.iter().map(|n| n.param_count()).sum()
    }

    /// 逐节点的结构摘要
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for node in &self.table.nodes {
            let inputs: Vec<String> = node
                .inputs
                .iter()
                .map(|p| {
                    let name = &self.table.nodes[p.node.0].name;
                    if p.output == 0 {
                        name.clone()
                    } else {
                        format!("{}:{}", name, p.output)
                    }
                })
                .collect();
            let shapes: Vec<String> = node
                .params
                .iter()
                .map(|p| format!("{}{:?}", p.name, p.shape))
                .collect();
            let _ = writeln!(
                out,
                "{:<42} {:<16} <- [{}] {}",
                node.name,
                node.kind().to_string(),
                inputs.join(", "),
                shapes.join(" ")
            );
        }
        let _ = write!(
            out,
            "nodes: {}, encoder layers: {}, total params: {}, output: {}",
            self.len(),
            self.encoder_depth(),
            self.param_count(),
            self.node(self.output.node).name
        );
        out
    }
}
