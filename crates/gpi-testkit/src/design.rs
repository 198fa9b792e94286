//! Elaborated design hierarchy with values.

use std::collections::{HashMap, HashSet};

use crate::error::{Result, TestkitError};

/// Index of a node in a [`Design`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Source language a node was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lang {
    Verilog,
    Vhdl,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Module or entity instance.
    Scope,
    /// One instance of a generate loop, named `label[i]`.
    GenBlock,
    /// Named block or conditional generate, no index.
    Block,
    Package,
    /// Resolved logic vector (wire, std_logic signal).
    Net { width: usize, range: Option<(i64, i64)> },
    /// Unresolved logic variable (reg, logic).
    Reg { width: usize, range: Option<(i64, i64)> },
    Integer,
    Real,
    /// Fixed-length character string.
    Str { len: usize },
    Enum { literals: Vec<String> },
    /// Array whose children are the elements, left bound first.
    Array { range: (i64, i64) },
    Struct,
    /// Integer constant.
    Param,
    /// Process or continuous assignment; has no value.
    Process,
    /// Bit select of a vector node, created on first access.
    Bit { of: NodeId, offset: usize },
}

impl NodeKind {
    fn label(&self) -> &'static str {
        match self {
            Self::Scope => "scope",
            Self::GenBlock => "generate block",
            Self::Block => "block",
            Self::Package => "package",
            Self::Net { .. } => "net",
            Self::Reg { .. } => "reg",
            Self::Integer => "integer",
            Self::Real => "real",
            Self::Str { .. } => "string",
            Self::Enum { .. } => "enum",
            Self::Array { .. } => "array",
            Self::Struct => "struct",
            Self::Param => "parameter",
            Self::Process => "process",
            Self::Bit { .. } => "bit",
        }
    }
}

/// Stored value of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeValue {
    /// One character per bit, most significant first.
    Logic(String),
    Int(i64),
    Real(f64),
    Str(Vec<u8>),
    /// Enumeration position.
    Enum(usize),
}

/// Strength of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drive {
    Deposit,
    Force,
    Release,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
    pub lang: Lang,
    pub children: Vec<NodeId>,
    /// Design unit name and source file.
    pub definition: Option<(String, String)>,
}

const LOGIC_CHARS: &str = "UX01ZWLH-";

fn offset_in(range: (i64, i64), index: i64) -> Option<usize> {
    let (left, right) = range;
    let (lo, hi) = if left <= right { (left, right) } else { (right, left) };
    if index < lo || index > hi {
        return None;
    }
    Some(if left <= right {
        (index - left) as usize
    } else {
        (left - index) as usize
    })
}

#[derive(Debug, Default)]
pub struct Design {
    nodes: Vec<Node>,
    values: HashMap<NodeId, NodeValue>,
    forced: HashSet<NodeId>,
    roots: Vec<NodeId>,
    packages: Vec<NodeId>,
    bits: HashMap<(NodeId, usize), NodeId>,
}

impl Design {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, parent: Option<NodeId>, name: &str, kind: NodeKind, lang: Lang) -> NodeId {
        let id = NodeId(self.nodes.len());
        let initial = match &kind {
            NodeKind::Net { width, .. } | NodeKind::Reg { width, .. } => {
                let fill = match (lang, &kind) {
                    (Lang::Vhdl, _) => 'U',
                    (Lang::Verilog, NodeKind::Net { .. }) => 'Z',
                    _ => 'X',
                };
                Some(NodeValue::Logic(std::iter::repeat(fill).take(*width).collect()))
            }
            NodeKind::Integer | NodeKind::Param => Some(NodeValue::Int(0)),
            NodeKind::Real => Some(NodeValue::Real(0.0)),
            NodeKind::Str { len } => Some(NodeValue::Str(vec![b' '; *len])),
            NodeKind::Enum { .. } => Some(NodeValue::Enum(0)),
            _ => None,
        };
        self.nodes.push(Node {
            name: name.to_string(),
            parent,
            kind,
            lang,
            children: Vec::new(),
            definition: None,
        });
        if let Some(value) = initial {
            self.values.insert(id, value);
        }
        id
    }

    /// Add a toplevel instance.
    pub fn root(&mut self, name: &str, lang: Lang) -> NodeId {
        let id = self.push(None, name, NodeKind::Scope, lang);
        self.roots.push(id);
        id
    }

    pub fn package(&mut self, name: &str) -> NodeId {
        let id = self.push(None, name, NodeKind::Package, Lang::Verilog);
        self.packages.push(id);
        id
    }

    /// Add a child in the parent's language.
    pub fn add(&mut self, parent: NodeId, name: &str, kind: NodeKind) -> NodeId {
        let lang = self.nodes[parent.0].lang;
        self.add_lang(parent, name, kind, lang)
    }

    /// Add a child written in `lang`, e.g. a VHDL entity under a Verilog
    /// module.
    pub fn add_lang(&mut self, parent: NodeId, name: &str, kind: NodeKind, lang: Lang) -> NodeId {
        let id = self.push(Some(parent), name, kind, lang);
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn net(&mut self, parent: NodeId, name: &str, width: usize) -> NodeId {
        let range = (width > 1).then(|| (width as i64 - 1, 0));
        self.add(parent, name, NodeKind::Net { width, range })
    }

    pub fn reg(&mut self, parent: NodeId, name: &str, width: usize) -> NodeId {
        let range = (width > 1).then(|| (width as i64 - 1, 0));
        self.add(parent, name, NodeKind::Reg { width, range })
    }

    /// Add `count` generate blocks `label[0]`.. below `parent`.
    pub fn generate(&mut self, parent: NodeId, label: &str, count: usize) -> Vec<NodeId> {
        (0..count)
            .map(|i| self.add(parent, &format!("{label}[{i}]"), NodeKind::GenBlock))
            .collect()
    }

    /// Add an array `name[0:depth-1]` of `width`-bit variables.
    pub fn memory(&mut self, parent: NodeId, name: &str, depth: usize, width: usize) -> NodeId {
        let array = self.add(
            parent,
            name,
            NodeKind::Array {
                range: (0, depth as i64 - 1),
            },
        );
        for i in 0..depth {
            let range = (width > 1).then(|| (width as i64 - 1, 0));
            self.add(array, &format!("{name}[{i}]"), NodeKind::Reg { width, range });
        }
        array
    }

    pub fn set_definition(&mut self, id: NodeId, unit: &str, file: &str) {
        self.nodes[id.0].definition = Some((unit.to_string(), file.to_string()));
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.node(id).map(|n| &n.kind)
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(|n| n.name.as_str())
    }

    pub fn lang(&self, id: NodeId) -> Option<Lang> {
        self.node(id).map(|n| n.lang)
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn packages(&self) -> &[NodeId] {
        &self.packages
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Direct child called `name`.
    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&c| self.nodes[c.0].name == name)
    }

    /// Resolve a dotted path relative to `scope`.
    pub fn lookup(&self, scope: NodeId, path: &str) -> Option<NodeId> {
        path.split('.')
            .try_fold(scope, |node, part| self.child(node, part))
    }

    /// Hierarchical name: `.` between members, `::` below packages, and a
    /// bare index suffix below arrays and vectors.
    pub fn full_name(&self, id: NodeId) -> String {
        let Some(node) = self.node(id) else {
            return String::new();
        };
        let Some(parent) = node.parent else {
            return node.name.clone();
        };
        let parent_full = self.full_name(parent);
        match &self.nodes[parent.0].kind {
            NodeKind::Package => format!("{parent_full}::{}", node.name),
            NodeKind::Array { .. } | NodeKind::Net { .. } | NodeKind::Reg { .. } => {
                let suffix = node.name.rfind('[').map(|p| &node.name[p..]).unwrap_or("");
                format!("{parent_full}{suffix}")
            }
            _ => format!("{parent_full}.{}", node.name),
        }
    }

    /// Declared `(left, right)` bounds of an array or vector.
    pub fn range(&self, id: NodeId) -> Option<(i64, i64)> {
        match self.kind(id)? {
            NodeKind::Array { range } => Some(*range),
            NodeKind::Net { range, .. } | NodeKind::Reg { range, .. } => *range,
            NodeKind::Str { len } => Some((1, *len as i64)),
            _ => None,
        }
    }

    /// Bit, character or element count of a value node.
    pub fn width(&self, id: NodeId) -> usize {
        match self.kind(id) {
            Some(NodeKind::Net { width, .. } | NodeKind::Reg { width, .. }) => *width,
            Some(NodeKind::Bit { .. }) => 1,
            Some(NodeKind::Integer | NodeKind::Param) => 32,
            Some(NodeKind::Real) => 64,
            Some(NodeKind::Str { len }) => *len,
            Some(NodeKind::Enum { .. }) => 1,
            Some(NodeKind::Array { range }) => {
                (range.0 - range.1).unsigned_abs() as usize + 1
            }
            _ => 0,
        }
    }

    /// Element `index` of an array, or bit `index` of a vector (created on
    /// first access).
    pub fn element(&mut self, parent: NodeId, index: i64) -> Option<NodeId> {
        match self.kind(parent)?.clone() {
            NodeKind::Array { range } => {
                let offset = offset_in(range, index)?;
                self.children(parent).get(offset).copied()
            }
            NodeKind::Net {
                range: Some(range), ..
            }
            | NodeKind::Reg {
                range: Some(range), ..
            } => {
                let offset = offset_in(range, index)?;
                if let Some(&bit) = self.bits.get(&(parent, offset)) {
                    return Some(bit);
                }
                let lang = self.nodes[parent.0].lang;
                let name = format!("{}[{index}]", self.nodes[parent.0].name);
                let bit = self.push(
                    Some(parent),
                    &name,
                    NodeKind::Bit { of: parent, offset },
                    lang,
                );
                self.bits.insert((parent, offset), bit);
                Some(bit)
            }
            _ => None,
        }
    }

    /// Bits of a vector created so far, left to right.
    pub fn bits_of(&self, vector: NodeId) -> Vec<NodeId> {
        let mut bits: Vec<(usize, NodeId)> = self
            .bits
            .iter()
            .filter(|((of, _), _)| *of == vector)
            .map(|((_, offset), id)| (*offset, *id))
            .collect();
        bits.sort();
        bits.into_iter().map(|(_, id)| id).collect()
    }

    pub fn value(&self, id: NodeId) -> Option<NodeValue> {
        match self.kind(id)? {
            NodeKind::Bit { of, offset } => match self.values.get(of)? {
                NodeValue::Logic(bits) => bits
                    .chars()
                    .nth(*offset)
                    .map(|c| NodeValue::Logic(c.to_string())),
                _ => None,
            },
            _ => self.values.get(&id).cloned(),
        }
    }

    pub fn is_forced(&self, id: NodeId) -> bool {
        match self.kind(id) {
            Some(NodeKind::Bit { of, .. }) => self.forced.contains(of),
            _ => self.forced.contains(&id),
        }
    }

    fn check(&self, id: NodeId, value: &NodeValue) -> Result<()> {
        let kind = self.kind(id).ok_or(TestkitError::NoSuchNode(id))?;
        let mismatch = |expected| TestkitError::KindMismatch { node: id, expected };
        match (kind, value) {
            (NodeKind::Net { .. } | NodeKind::Reg { .. } | NodeKind::Bit { .. }, NodeValue::Logic(bits)) => {
                if let Some(bad) = bits.chars().find(|c| !LOGIC_CHARS.contains(*c)) {
                    return Err(TestkitError::BadLogic(bad));
                }
                let width = self.width(id);
                let got = bits.chars().count();
                if got != width {
                    return Err(TestkitError::WidthMismatch { got, width });
                }
                Ok(())
            }
            (NodeKind::Integer | NodeKind::Param, NodeValue::Int(_)) => Ok(()),
            (NodeKind::Real, NodeValue::Real(_)) => Ok(()),
            (NodeKind::Str { len }, NodeValue::Str(bytes)) => {
                if bytes.len() != *len {
                    return Err(TestkitError::WidthMismatch {
                        got: bytes.len(),
                        width: *len,
                    });
                }
                Ok(())
            }
            (NodeKind::Enum { literals }, NodeValue::Enum(pos)) => {
                if *pos >= literals.len() {
                    return Err(mismatch("enum position"));
                }
                Ok(())
            }
            (kind, _) => Err(mismatch(kind.label())),
        }
    }

    /// Write a value. Returns every node whose value changed: the node
    /// itself, the vector of a bit, and any bit selects of a vector.
    pub fn write(&mut self, id: NodeId, value: NodeValue, drive: Drive) -> Result<Vec<NodeId>> {
        self.check(id, &value)?;
        let target = match self.kind(id) {
            Some(NodeKind::Bit { of, .. }) => *of,
            _ => id,
        };
        match drive {
            Drive::Deposit if self.forced.contains(&target) => return Ok(Vec::new()),
            Drive::Deposit => {}
            Drive::Force => {
                self.forced.insert(target);
            }
            Drive::Release => {
                self.forced.remove(&target);
                return Ok(Vec::new());
            }
        }

        let before_bits: Vec<(NodeId, Option<NodeValue>)> = self
            .bits_of(target)
            .into_iter()
            .map(|b| (b, self.value(b)))
            .collect();
        let before = self.values.get(&target).cloned();

        let new_value = match (self.kind(id).cloned(), value) {
            (Some(NodeKind::Bit { offset, .. }), NodeValue::Logic(bit)) => {
                let Some(NodeValue::Logic(current)) = self.values.get(&target) else {
                    return Err(TestkitError::KindMismatch {
                        node: target,
                        expected: "logic vector",
                    });
                };
                let updated: String = current
                    .chars()
                    .enumerate()
                    .map(|(i, c)| if i == offset { bit.chars().next().unwrap_or(c) } else { c })
                    .collect();
                NodeValue::Logic(updated)
            }
            (_, value) => value,
        };
        self.values.insert(target, new_value.clone());

        let mut changed = Vec::new();
        if before.as_ref() != Some(&new_value) {
            if target != id {
                changed.push(id);
            }
            changed.push(target);
            for (bit, old) in before_bits {
                if bit != id && self.value(bit) != old {
                    changed.push(bit);
                }
            }
        }
        Ok(changed)
    }
}
