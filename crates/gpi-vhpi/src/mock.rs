//! [`MockVhpi`]: the VHPI routine set over a [`gpi_testkit::Sim`].
//!
//! Only VHDL nodes have a kind; Verilog instances met in region relations
//! come back as `vhpiUndefined`. Node types are synthesized from the node
//! kind: single-bit nets are `std_ulogic`, vectors `std_logic_vector`,
//! strings arrays of `character`. A scope passed to `vhpi_handle_by_name`
//! must be a handle this mock gave out.

use std::collections::{HashMap, HashSet, VecDeque};

use gpi_core::logic::Logic;
use gpi_core::value::fit_string;
use gpi_core::RawRef;
use gpi_testkit::{Drive, Lang, NodeId, NodeKind, NodeValue, SharedSim, Trigger};

use crate::api::{VhpiApi, VhpiDiagnostic, VhpiValue};
use crate::consts::*;

#[derive(Debug, Clone, PartialEq)]
enum BaseType {
    StdUlogic,
    Character,
    Integer,
    Real,
    Enum(String, usize),
    Record(String),
    Array(String, Box<BaseType>),
}

impl BaseType {
    fn kind(&self) -> i32 {
        match self {
            Self::StdUlogic | Self::Character | Self::Enum(..) => VHPI_ENUM_TYPE_DECL_K,
            Self::Integer => VHPI_INT_TYPE_DECL_K,
            Self::Real => VHPI_FLOAT_TYPE_DECL_K,
            Self::Record(_) => VHPI_RECORD_TYPE_DECL_K,
            Self::Array(..) => VHPI_ARRAY_TYPE_DECL_K,
        }
    }

    fn name(&self) -> String {
        match self {
            Self::StdUlogic => "STD_ULOGIC".to_string(),
            Self::Character => "CHARACTER".to_string(),
            Self::Integer => "INTEGER".to_string(),
            Self::Real => "REAL".to_string(),
            Self::Enum(name, _) | Self::Record(name) | Self::Array(name, _) => name.clone(),
        }
    }

    fn literals(&self) -> i32 {
        match self {
            Self::StdUlogic => 9,
            Self::Character => 256,
            Self::Enum(_, n) => i32::try_from(*n).unwrap_or(i32::MAX),
            _ => 0,
        }
    }
}

/// Objects handed out that are not design nodes.
#[derive(Debug, Clone, PartialEq)]
enum Aux {
    Subtype(NodeId),
    Base(BaseType),
    Constraint(i64, i64),
    Unit(NodeId),
    Tool,
}

#[derive(Debug, Clone, Copy)]
struct Registration {
    token: u64,
    reason: i32,
}

pub struct MockVhpi {
    sim: SharedSim,
    /// Design-object handles given out and not yet released.
    owned: HashSet<RawRef>,
    iterators: HashMap<RawRef, VecDeque<NodeId>>,
    aux: HashMap<RawRef, Aux>,
    callbacks: HashMap<RawRef, Registration>,
    error: Option<VhpiDiagnostic>,
    refused: Vec<i32>,
    sticky: Vec<i32>,
}

impl MockVhpi {
    pub fn new(sim: SharedSim) -> Self {
        Self {
            sim,
            owned: HashSet::new(),
            iterators: HashMap::new(),
            aux: HashMap::new(),
            callbacks: HashMap::new(),
            error: None,
            refused: Vec::new(),
            sticky: Vec::new(),
        }
    }

    /// Report `message` from the next `vhpi_check_error`.
    pub fn inject_error(&mut self, severity: i32, message: &str) {
        self.fail(severity, message);
    }

    /// Make `vhpi_register_cb` refuse `reason`.
    pub fn refuse(&mut self, reason: i32) {
        self.refused.push(reason);
    }

    /// Make `vhpi_remove_cb` fail for registrations of `reason`.
    pub fn make_sticky(&mut self, reason: i32) {
        self.sticky.push(reason);
    }

    pub fn live_iterators(&self) -> usize {
        self.iterators.len()
    }

    pub fn live_callbacks(&self) -> usize {
        self.callbacks.len()
    }

    /// Type and relation objects not yet released.
    pub fn live_aux(&self) -> usize {
        self.aux.len()
    }

    fn fail(&mut self, severity: i32, message: &str) {
        self.error = Some(VhpiDiagnostic {
            severity,
            message: message.to_string(),
            file: Some("mock_vhpi.c".to_string()),
            line: Some(1),
        });
    }

    fn alloc(&mut self, node: NodeId) -> Option<RawRef> {
        let raw = RawRef::new(self.sim.borrow_mut().alloc_node(node))?;
        self.owned.insert(raw);
        Some(raw)
    }

    fn alloc_aux(&mut self, aux: Aux) -> Option<RawRef> {
        let raw = RawRef::new(self.sim.borrow_mut().alloc_other())?;
        self.aux.insert(raw, aux);
        Some(raw)
    }

    fn node(&self, obj: RawRef) -> Option<NodeId> {
        self.sim.borrow().node_of(obj.get())
    }

    /// The node behind `obj`, if it is visible to VHPI.
    fn vhdl_node(&self, obj: RawRef) -> Option<NodeId> {
        let node = self.node(obj)?;
        (self.kind_of(node) != VHPI_UNDEFINED).then_some(node)
    }

    fn kind_of(&self, node: NodeId) -> i32 {
        let sim = self.sim.borrow();
        let design = &sim.design;
        if design.lang(node) != Some(Lang::Vhdl) {
            return VHPI_UNDEFINED;
        }
        let parent_kind = design
            .node(node)
            .and_then(|n| n.parent)
            .and_then(|p| design.kind(p));
        match parent_kind {
            Some(NodeKind::Array { .. }) => return VHPI_INDEXED_NAME_K,
            Some(NodeKind::Struct) => return VHPI_SELECTED_NAME_K,
            _ => {}
        }
        match design.kind(node) {
            Some(NodeKind::Scope) if design.roots().contains(&node) => VHPI_ROOT_INST_K,
            Some(NodeKind::Scope) => VHPI_COMP_INST_STMT_K,
            Some(NodeKind::GenBlock) => VHPI_FOR_GENERATE_K,
            Some(NodeKind::Block) => VHPI_BLOCK_STMT_K,
            Some(NodeKind::Package) => VHPI_PACK_INST_K,
            Some(
                NodeKind::Net { .. }
                | NodeKind::Integer
                | NodeKind::Real
                | NodeKind::Str { .. }
                | NodeKind::Enum { .. }
                | NodeKind::Array { .. }
                | NodeKind::Struct,
            ) => VHPI_SIG_DECL_K,
            Some(NodeKind::Reg { .. }) => VHPI_VAR_DECL_K,
            Some(NodeKind::Param) => VHPI_CONST_DECL_K,
            Some(NodeKind::Process) => VHPI_PROCESS_STMT_K,
            Some(NodeKind::Bit { .. }) => VHPI_INDEXED_NAME_K,
            None => VHPI_UNDEFINED,
        }
    }

    fn base_of(&self, node: NodeId) -> Option<BaseType> {
        let (kind, name, first) = {
            let sim = self.sim.borrow();
            let design = &sim.design;
            (
                design.kind(node)?.clone(),
                design.name(node).unwrap_or_default().to_ascii_uppercase(),
                design.children(node).first().copied(),
            )
        };
        let base = match kind {
            NodeKind::Net { range: None, .. } | NodeKind::Reg { range: None, .. } => {
                BaseType::StdUlogic
            }
            NodeKind::Net { .. } | NodeKind::Reg { .. } => {
                BaseType::Array("STD_LOGIC_VECTOR".into(), Box::new(BaseType::StdUlogic))
            }
            NodeKind::Bit { .. } => BaseType::StdUlogic,
            NodeKind::Integer | NodeKind::Param => BaseType::Integer,
            NodeKind::Real => BaseType::Real,
            NodeKind::Str { .. } => {
                BaseType::Array("STRING".into(), Box::new(BaseType::Character))
            }
            NodeKind::Enum { literals } => BaseType::Enum(format!("{name}_T"), literals.len()),
            NodeKind::Struct => BaseType::Record(format!("{name}_T")),
            NodeKind::Array { .. } => {
                let elem = match first {
                    Some(first) => self.base_of(first)?,
                    None => BaseType::Integer,
                };
                BaseType::Array(format!("{name}_T"), Box::new(elem))
            }
            _ => return None,
        };
        Some(base)
    }

    fn elements(&self, parent: NodeId) -> Vec<NodeId> {
        let mut sim = self.sim.borrow_mut();
        let kind = sim.design.kind(parent).cloned();
        match kind {
            Some(NodeKind::Array { .. }) => sim.design.children(parent).to_vec(),
            Some(NodeKind::Net { .. } | NodeKind::Reg { .. }) => {
                let Some((left, right)) = sim.design.range(parent) else {
                    return Vec::new();
                };
                let indices: Vec<i64> = if left >= right {
                    (right..=left).rev().collect()
                } else {
                    (left..=right).collect()
                };
                indices
                    .into_iter()
                    .filter_map(|i| sim.design.element(parent, i))
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    fn related(&self, relation: i32, parent: NodeId) -> Vec<NodeId> {
        match relation {
            VHPI_INDEXED_NAMES => return self.elements(parent),
            VHPI_SELECTED_NAMES => {
                let sim = self.sim.borrow();
                return match sim.design.kind(parent) {
                    Some(NodeKind::Struct) => sim.design.children(parent).to_vec(),
                    _ => Vec::new(),
                };
            }
            _ => {}
        }
        let children = self.sim.borrow().design.children(parent).to_vec();
        children
            .into_iter()
            .filter(|&c| {
                let kind = self.sim.borrow().design.kind(c).cloned();
                let vhpi_kind = self.kind_of(c);
                match relation {
                    VHPI_SIG_DECLS => vhpi_kind == VHPI_SIG_DECL_K,
                    VHPI_VAR_DECLS => vhpi_kind == VHPI_VAR_DECL_K,
                    VHPI_CONST_DECLS => vhpi_kind == VHPI_CONST_DECL_K,
                    VHPI_PORT_DECLS => vhpi_kind == VHPI_PORT_DECL_K,
                    VHPI_GENERIC_DECLS => vhpi_kind == VHPI_GENERIC_DECL_K,
                    // Instances of either language.
                    VHPI_COMP_INST_STMTS => matches!(kind, Some(NodeKind::Scope)),
                    VHPI_BLOCK_STMTS => vhpi_kind == VHPI_BLOCK_STMT_K,
                    VHPI_INTERNAL_REGIONS => matches!(
                        kind,
                        Some(
                            NodeKind::Scope
                                | NodeKind::GenBlock
                                | NodeKind::Block
                                | NodeKind::Process
                        )
                    ),
                    _ => false,
                }
            })
            .collect()
    }

    fn resolve_path(&self, path: &str) -> Option<NodeId> {
        let sim = self.sim.borrow();
        let design = &sim.design;
        let path = path.trim_start_matches(':').replace(':', ".");
        let (top, rest) = match path.split_once('.') {
            Some((top, rest)) => (top.to_string(), Some(rest.to_string())),
            None => (path.clone(), None),
        };
        let root = design
            .roots()
            .iter()
            .copied()
            .find(|&r| design.name(r).is_some_and(|n| n.eq_ignore_ascii_case(&top)))?;
        match rest {
            Some(rest) => design.lookup(root, &rest),
            None => Some(root),
        }
    }

    fn to_node_value(&self, node: NodeId, value: &VhpiValue) -> Option<NodeValue> {
        let sim = self.sim.borrow();
        let chars = |positions: &[u8]| -> Option<String> {
            positions
                .iter()
                .map(|&p| Logic::from_std_logic_pos(p).map(Logic::to_char))
                .collect()
        };
        let logic = matches!(
            sim.design.kind(node)?,
            NodeKind::Net { .. } | NodeKind::Reg { .. } | NodeKind::Bit { .. }
        );
        let converted = match (sim.design.kind(node)?, value) {
            (_, VhpiValue::Logic(pos)) if logic => NodeValue::Logic(chars(&[*pos])?),
            (_, VhpiValue::LogicVec(positions)) if logic => NodeValue::Logic(chars(positions)?),
            (_, VhpiValue::BinStr(bits)) if logic => NodeValue::Logic(bits.to_uppercase()),
            (NodeKind::Integer, VhpiValue::Int(v)) => NodeValue::Int(i64::from(*v)),
            (NodeKind::Enum { .. }, VhpiValue::Enum(pos)) => {
                NodeValue::Enum(usize::try_from(*pos).ok()?)
            }
            (NodeKind::Real, VhpiValue::Real(v)) => NodeValue::Real(*v),
            (NodeKind::Str { len }, VhpiValue::Str(bytes)) => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                NodeValue::Str(fit_string(&bytes[..end], *len))
            }
            _ => return None,
        };
        Some(converted)
    }
}

fn logic_positions(bits: &str) -> Option<Vec<u8>> {
    bits.chars()
        .map(|c| Logic::from_char(c).map(Logic::std_logic_pos))
        .collect()
}

impl VhpiApi for MockVhpi {
    fn handle_by_name(&mut self, name: &str, scope: Option<RawRef>) -> Option<RawRef> {
        let node = match scope {
            Some(scope) => {
                if !self.owned.contains(&scope) {
                    self.fail(VHPI_ERROR, "vhpi_handle_by_name: scope is not a VHPI handle");
                    return None;
                }
                let parent = self.node(scope)?;
                self.sim.borrow().design.lookup(parent, name)?
            }
            None => self.resolve_path(name)?,
        };
        if self.kind_of(node) == VHPI_UNDEFINED {
            return None;
        }
        self.alloc(node)
    }

    fn handle_by_index(&mut self, relation: i32, parent: RawRef, index: i32) -> Option<RawRef> {
        if let Some(Aux::Subtype(node)) = self.aux.get(&parent).cloned() {
            if relation != VHPI_CONSTRAINTS || index != 0 {
                return None;
            }
            let (left, right) = self.sim.borrow().design.range(node)?;
            return self.alloc_aux(Aux::Constraint(left, right));
        }
        let parent = self.vhdl_node(parent)?;
        let index = usize::try_from(index).ok()?;
        let element = self.related(relation, parent).get(index).copied()?;
        self.alloc(element)
    }

    fn handle(&mut self, relation: i32, obj: Option<RawRef>) -> Option<RawRef> {
        let Some(obj) = obj else {
            return match relation {
                VHPI_ROOT_INST => {
                    let root = {
                        let sim = self.sim.borrow();
                        sim.design
                            .roots()
                            .iter()
                            .copied()
                            .find(|&r| sim.design.lang(r) == Some(Lang::Vhdl))
                    }?;
                    self.alloc(root)
                }
                VHPI_TOOL => self.alloc_aux(Aux::Tool),
                _ => None,
            };
        };
        if let Some(aux) = self.aux.get(&obj).cloned() {
            let related = match (relation, aux) {
                (VHPI_BASE_TYPE, Aux::Subtype(node)) => Aux::Base(self.base_of(node)?),
                (VHPI_ELEM_TYPE, Aux::Base(BaseType::Array(_, elem))) => Aux::Base(*elem),
                _ => return None,
            };
            return self.alloc_aux(related);
        }
        let node = self.vhdl_node(obj)?;
        match relation {
            VHPI_TYPE => {
                self.base_of(node)?;
                self.alloc_aux(Aux::Subtype(node))
            }
            VHPI_DESIGN_UNIT => {
                self.sim.borrow().design.node(node)?.definition.as_ref()?;
                self.alloc_aux(Aux::Unit(node))
            }
            _ => None,
        }
    }

    fn iterator(&mut self, relation: i32, parent: RawRef) -> Option<RawRef> {
        let parent = self.vhdl_node(parent)?;
        let objects: VecDeque<NodeId> = self.related(relation, parent).into();
        if objects.is_empty() {
            return None;
        }
        let iterator = RawRef::new(self.sim.borrow_mut().alloc_other())?;
        self.iterators.insert(iterator, objects);
        Some(iterator)
    }

    fn scan(&mut self, iterator: RawRef) -> Option<RawRef> {
        let next = self.iterators.get_mut(&iterator)?.pop_front();
        match next {
            Some(node) => self.alloc(node),
            None => {
                self.iterators.remove(&iterator);
                self.sim.borrow_mut().free(iterator.get());
                None
            }
        }
    }

    fn release_handle(&mut self, obj: RawRef) -> bool {
        self.owned.remove(&obj);
        self.iterators.remove(&obj);
        self.aux.remove(&obj);
        self.callbacks.remove(&obj);
        self.sim.borrow_mut().free(obj.get())
    }

    fn get(&mut self, property: i32, obj: RawRef) -> i32 {
        match self.aux.get(&obj) {
            Some(Aux::Base(base)) => {
                return match property {
                    VHPI_KIND_P => base.kind(),
                    VHPI_NUM_LITERALS_P => base.literals(),
                    _ => VHPI_UNDEFINED,
                }
            }
            Some(Aux::Constraint(left, right)) => {
                let bound = |v: &i64| i32::try_from(*v).unwrap_or(VHPI_UNDEFINED);
                return match property {
                    VHPI_KIND_P => VHPI_INT_RANGE_K,
                    VHPI_LEFT_BOUND_P => bound(left),
                    VHPI_RIGHT_BOUND_P => bound(right),
                    VHPI_IS_UP_P => i32::from(left <= right),
                    _ => VHPI_UNDEFINED,
                };
            }
            Some(_) => return VHPI_UNDEFINED,
            None => {}
        }
        let Some(node) = self.node(obj) else {
            return VHPI_UNDEFINED;
        };
        match property {
            VHPI_KIND_P => self.kind_of(node),
            VHPI_SIZE_P => {
                let sim = self.sim.borrow();
                match sim.design.kind(node) {
                    Some(NodeKind::Integer | NodeKind::Param | NodeKind::Real) => 1,
                    _ => i32::try_from(sim.design.width(node)).unwrap_or(i32::MAX),
                }
            }
            _ => VHPI_UNDEFINED,
        }
    }

    fn get_str(&mut self, property: i32, obj: RawRef) -> Option<String> {
        if let Some(aux) = self.aux.get(&obj).cloned() {
            let sim = self.sim.borrow();
            return match (aux, property) {
                (Aux::Base(base), VHPI_NAME_P) => Some(base.name()),
                (Aux::Unit(node), VHPI_UNIT_NAME_P) => {
                    sim.design.node(node)?.definition.as_ref().map(|d| d.0.clone())
                }
                (Aux::Unit(node), VHPI_FILE_NAME_P) => {
                    sim.design.node(node)?.definition.as_ref().map(|d| d.1.clone())
                }
                (Aux::Tool, VHPI_NAME_P) => Some(sim.product().to_string()),
                (Aux::Tool, VHPI_TOOL_VERSION_P) => Some(sim.version().to_string()),
                _ => None,
            };
        }
        let node = self.vhdl_node(obj)?;
        let sim = self.sim.borrow();
        let design = &sim.design;
        match property {
            VHPI_CASE_NAME_P => design.name(node).map(str::to_string),
            VHPI_NAME_P => design.name(node).map(str::to_ascii_uppercase),
            VHPI_FULL_NAME_P => Some(format!(":{}", design.full_name(node).replace('.', ":"))),
            _ => None,
        }
    }

    fn get_phys(&mut self, property: i32, obj: Option<RawRef>) -> i64 {
        match (property, obj) {
            (VHPI_RESOLUTION_LIMIT_P, None) => {
                let exponent = self.sim.borrow().precision() + 15;
                10i64.pow(u32::try_from(exponent).unwrap_or(0))
            }
            _ => 0,
        }
    }

    fn get_value(&mut self, obj: RawRef, format: i32) -> Option<VhpiValue> {
        let Some(node) = self.vhdl_node(obj) else {
            self.fail(VHPI_ERROR, "vhpi_get_value: bad object");
            return None;
        };
        let value = self.sim.borrow().read(node);
        let converted = match (value, format) {
            (Some(NodeValue::Logic(bits)), VHPI_BIN_STR_VAL) => Some(VhpiValue::BinStr(bits)),
            (Some(NodeValue::Logic(bits)), VHPI_LOGIC_VAL) if bits.len() == 1 => {
                logic_positions(&bits).map(|p| VhpiValue::Logic(p[0]))
            }
            (Some(NodeValue::Logic(bits)), VHPI_LOGIC_VEC_VAL) => {
                logic_positions(&bits).map(VhpiValue::LogicVec)
            }
            (Some(NodeValue::Int(v)), VHPI_INT_VAL) => i32::try_from(v).ok().map(VhpiValue::Int),
            (Some(NodeValue::Enum(pos)), VHPI_ENUM_VAL) => {
                u32::try_from(pos).ok().map(VhpiValue::Enum)
            }
            (Some(NodeValue::Real(v)), VHPI_REAL_VAL) => Some(VhpiValue::Real(v)),
            (Some(NodeValue::Str(bytes)), VHPI_STR_VAL) => Some(VhpiValue::Str(bytes)),
            _ => None,
        };
        if converted.is_none() {
            self.fail(VHPI_ERROR, "vhpi_get_value: format not supported for object");
        }
        converted
    }

    fn put_value(&mut self, obj: RawRef, value: &VhpiValue, mode: i32) {
        let Some(node) = self.vhdl_node(obj) else {
            self.fail(VHPI_ERROR, "vhpi_put_value: bad object");
            return;
        };
        if matches!(self.sim.borrow().design.kind(node), Some(NodeKind::Param)) {
            self.fail(VHPI_ERROR, "vhpi_put_value: cannot assign to a constant");
            return;
        }
        let drive = match mode {
            VHPI_FORCE_PROPAGATE => Drive::Force,
            VHPI_RELEASE => Drive::Release,
            _ => Drive::Deposit,
        };
        let Some(converted) = self.to_node_value(node, value) else {
            self.fail(VHPI_ERROR, "vhpi_put_value: value does not match object");
            return;
        };
        let written = self.sim.borrow_mut().write(node, converted, drive);
        if let Err(err) = written {
            self.fail(VHPI_ERROR, &format!("vhpi_put_value: {err}"));
        }
    }

    fn register_cb(
        &mut self,
        reason: i32,
        obj: Option<RawRef>,
        delay: u64,
        user_data: u64,
    ) -> Option<RawRef> {
        if self.refused.contains(&reason) {
            self.fail(VHPI_ERROR, &format!("{} not supported", reason_name(reason)));
            return None;
        }
        let trigger = match reason {
            VHPI_CB_VALUE_CHANGE => Trigger::ValueChange(obj.and_then(|o| self.vhdl_node(o))?),
            VHPI_CB_AFTER_DELAY => Trigger::After(delay),
            VHPI_CB_END_OF_PROCESSES => Trigger::ReadWrite,
            VHPI_CB_LAST_KNOWN_DELTA_CYCLE => Trigger::ReadOnly,
            VHPI_CB_NEXT_TIME_STEP => Trigger::NextTimeStep,
            VHPI_CB_START_OF_SIMULATION => Trigger::StartOfSim,
            VHPI_CB_END_OF_SIMULATION => Trigger::EndOfSim,
            _ => {
                self.fail(VHPI_ERROR, "vhpi_register_cb: unknown reason");
                return None;
            }
        };
        let mut sim = self.sim.borrow_mut();
        let token = sim.schedule(trigger, user_data);
        let registration = RawRef::new(sim.alloc_other())?;
        self.callbacks
            .insert(registration, Registration { token, reason });
        Some(registration)
    }

    fn remove_cb(&mut self, cb: RawRef) -> bool {
        let Some(registration) = self.callbacks.get(&cb).copied() else {
            self.fail(VHPI_ERROR, "vhpi_remove_cb: not a callback");
            return false;
        };
        if self.sticky.contains(&registration.reason) {
            self.fail(
                VHPI_ERROR,
                &format!("{} cannot be removed", reason_name(registration.reason)),
            );
            return false;
        }
        self.callbacks.remove(&cb);
        let mut sim = self.sim.borrow_mut();
        sim.free(cb.get());
        sim.cancel(registration.token)
    }

    fn sim_time(&mut self) -> u64 {
        self.sim.borrow().now()
    }

    fn finish(&mut self) {
        self.sim.borrow_mut().request_finish();
    }

    fn check_error(&mut self) -> Option<VhpiDiagnostic> {
        self.error.take()
    }
}
