//! [`MockVpi`]: the VPI routine set over a [`gpi_testkit::Sim`].
//!
//! Only Verilog nodes are visible. A VHDL node met during iteration comes
//! back with no type and no name, the way a foreign-language instance does
//! in a mixed simulation. A scope passed to `vpi_handle_by_name` must be a
//! handle this mock gave out. Writes land immediately whatever the delay
//! mode.

use std::collections::{HashMap, HashSet, VecDeque};

use gpi_core::logic;
use gpi_core::value::fit_string;
use gpi_core::{RawRef, SimInfo};
use gpi_testkit::{Drive, Lang, NodeId, NodeKind, NodeValue, SharedSim, Trigger};

use crate::api::{VpiApi, VpiDiagnostic, VpiValue};
use crate::consts::*;

#[derive(Debug, Clone, Copy)]
struct Registration {
    token: u64,
    reason: i32,
}

pub struct MockVpi {
    sim: SharedSim,
    /// Object handles given out and not yet released.
    owned: HashSet<RawRef>,
    iterators: HashMap<RawRef, VecDeque<NodeId>>,
    /// Range expressions handed out by `vpi_handle`.
    exprs: HashMap<RawRef, i64>,
    callbacks: HashMap<RawRef, Registration>,
    error: Option<VpiDiagnostic>,
    refused: Vec<i32>,
    sticky: Vec<i32>,
}

impl MockVpi {
    pub fn new(sim: SharedSim) -> Self {
        Self {
            sim,
            owned: HashSet::new(),
            iterators: HashMap::new(),
            exprs: HashMap::new(),
            callbacks: HashMap::new(),
            error: None,
            refused: Vec::new(),
            sticky: Vec::new(),
        }
    }

    /// Report `message` from the next `vpi_chk_error`.
    pub fn inject_error(&mut self, level: i32, message: &str) {
        self.fail(level, message);
    }

    /// Make `vpi_register_cb` refuse `reason`.
    pub fn refuse(&mut self, reason: i32) {
        self.refused.push(reason);
    }

    /// Make `vpi_remove_cb` fail for registrations of `reason`.
    pub fn make_sticky(&mut self, reason: i32) {
        self.sticky.push(reason);
    }

    pub fn live_iterators(&self) -> usize {
        self.iterators.len()
    }

    pub fn live_callbacks(&self) -> usize {
        self.callbacks.len()
    }

    fn fail(&mut self, level: i32, message: &str) {
        self.error = Some(VpiDiagnostic {
            level,
            message: message.to_string(),
            file: Some("mock_vpi.c".to_string()),
            line: Some(1),
        });
    }

    fn alloc(&mut self, node: NodeId) -> Option<RawRef> {
        let raw = RawRef::new(self.sim.borrow_mut().alloc_node(node))?;
        self.owned.insert(raw);
        Some(raw)
    }

    fn node(&self, obj: RawRef) -> Option<NodeId> {
        self.sim.borrow().node_of(obj.get())
    }

    /// The node behind `obj`, if it is visible to VPI.
    fn verilog_node(&self, obj: RawRef) -> Option<NodeId> {
        let node = self.node(obj)?;
        (self.sim.borrow().design.lang(node) == Some(Lang::Verilog)).then_some(node)
    }

    fn type_of(&self, node: NodeId) -> i32 {
        let sim = self.sim.borrow();
        let design = &sim.design;
        if design.lang(node) != Some(Lang::Verilog) {
            return VPI_UNDEFINED;
        }
        match design.kind(node) {
            Some(NodeKind::Scope) => VPI_MODULE,
            Some(NodeKind::GenBlock | NodeKind::Block) => VPI_GEN_SCOPE,
            Some(NodeKind::Package) => VPI_PACKAGE,
            Some(NodeKind::Net { .. }) => VPI_NET,
            Some(NodeKind::Reg { .. }) => VPI_REG,
            Some(NodeKind::Integer) => VPI_INTEGER_VAR,
            Some(NodeKind::Real) => VPI_REAL_VAR,
            Some(NodeKind::Str { .. }) => VPI_STRING_VAR,
            Some(NodeKind::Enum { .. }) => VPI_ENUM_VAR,
            Some(NodeKind::Array { .. }) => VPI_REG_ARRAY,
            Some(NodeKind::Struct) => VPI_STRUCT_VAR,
            Some(NodeKind::Param) => VPI_PARAMETER,
            Some(NodeKind::Process) => VPI_ALWAYS,
            Some(NodeKind::Bit { of, .. }) => match design.kind(*of) {
                Some(NodeKind::Net { .. }) => VPI_NET_BIT,
                _ => VPI_REG_BIT,
            },
            None => VPI_UNDEFINED,
        }
    }

    fn bits(&self, vector: NodeId) -> Vec<NodeId> {
        let mut sim = self.sim.borrow_mut();
        let Some((left, right)) = sim.design.range(vector) else {
            return Vec::new();
        };
        let indices: Vec<i64> = if left >= right {
            (right..=left).rev().collect()
        } else {
            (left..=right).collect()
        };
        indices
            .into_iter()
            .filter_map(|i| sim.design.element(vector, i))
            .collect()
    }

    fn related(&self, relation: i32, parent: Option<NodeId>) -> Vec<NodeId> {
        let Some(parent) = parent else {
            let sim = self.sim.borrow();
            return match relation {
                VPI_MODULE => sim
                    .design
                    .roots()
                    .iter()
                    .copied()
                    .filter(|&r| sim.design.lang(r) == Some(Lang::Verilog))
                    .collect(),
                VPI_PACKAGE => sim.design.packages().to_vec(),
                _ => Vec::new(),
            };
        };
        if matches!(relation, VPI_NET_BIT | VPI_REG_BIT) {
            return self.bits(parent);
        }
        let children = self.sim.borrow().design.children(parent).to_vec();
        let kinds: Vec<(NodeId, Option<NodeKind>, i32)> = children
            .into_iter()
            .map(|c| {
                let kind = self.sim.borrow().design.kind(c).cloned();
                (c, kind, self.type_of(c))
            })
            .collect();
        let parent_is_struct =
            matches!(self.sim.borrow().design.kind(parent), Some(NodeKind::Struct));
        kinds
            .into_iter()
            .filter(|(_, kind, vpi_type)| match relation {
                // Instances appear here too, and so do processes.
                VPI_INTERNAL_SCOPE => matches!(
                    kind,
                    Some(
                        NodeKind::GenBlock | NodeKind::Block | NodeKind::Scope | NodeKind::Process
                    )
                ),
                VPI_VARIABLES => matches!(
                    kind,
                    Some(
                        NodeKind::Integer
                            | NodeKind::Real
                            | NodeKind::Str { .. }
                            | NodeKind::Enum { .. }
                            | NodeKind::Struct
                    )
                ),
                VPI_MEMBER => parent_is_struct,
                VPI_MODULE => matches!(kind, Some(NodeKind::Scope)),
                other => *vpi_type == other,
            })
            .map(|(c, _, _)| c)
            .collect()
    }

    fn resolve_path(&self, path: &str) -> Option<NodeId> {
        let sim = self.sim.borrow();
        let design = &sim.design;
        if let Some((pkg, rest)) = path.split_once("::") {
            let scope = design
                .packages()
                .iter()
                .copied()
                .find(|&p| design.name(p) == Some(pkg))?;
            return design.lookup(scope, rest);
        }
        let (top, rest) = match path.split_once('.') {
            Some((top, rest)) => (top, Some(rest)),
            None => (path, None),
        };
        let root = design
            .roots()
            .iter()
            .copied()
            .find(|&r| design.name(r) == Some(top))?;
        match rest {
            Some(rest) => design.lookup(root, rest),
            None => Some(root),
        }
    }

    fn to_node_value(&self, node: NodeId, value: &VpiValue) -> Option<NodeValue> {
        let sim = self.sim.borrow();
        let width = sim.design.width(node);
        let converted = match (sim.design.kind(node)?, value) {
            (NodeKind::Net { .. } | NodeKind::Reg { .. } | NodeKind::Bit { .. }, VpiValue::BinStr(bits)) => {
                NodeValue::Logic(bits.to_uppercase())
            }
            (NodeKind::Net { .. } | NodeKind::Reg { .. } | NodeKind::Bit { .. }, VpiValue::Int(v)) => {
                NodeValue::Logic(logic::int_to_binstr(i64::from(*v), width))
            }
            (NodeKind::Integer, VpiValue::Int(v)) => NodeValue::Int(i64::from(*v)),
            (NodeKind::Integer, VpiValue::BinStr(bits)) => {
                NodeValue::Int(logic::binstr_to_int(bits).ok()? as i32 as i64)
            }
            (NodeKind::Enum { .. }, VpiValue::Int(v)) => NodeValue::Enum(usize::try_from(*v).ok()?),
            (NodeKind::Real, VpiValue::Real(v)) => NodeValue::Real(*v),
            (NodeKind::Str { len }, VpiValue::Str(bytes)) => NodeValue::Str(fit_string(bytes, *len)),
            _ => return None,
        };
        Some(converted)
    }
}

impl VpiApi for MockVpi {
    fn handle_by_name(&mut self, name: &str, scope: Option<RawRef>) -> Option<RawRef> {
        let node = match scope {
            Some(scope) => {
                if !self.owned.contains(&scope) {
                    self.fail(VPI_ERROR, "vpi_handle_by_name: scope is not a VPI handle");
                    return None;
                }
                let parent = self.node(scope)?;
                self.sim.borrow().design.lookup(parent, name)?
            }
            None => self.resolve_path(name)?,
        };
        if self.type_of(node) == VPI_UNDEFINED {
            return None;
        }
        self.alloc(node)
    }

    fn handle_by_index(&mut self, parent: RawRef, index: i32) -> Option<RawRef> {
        let parent = self.verilog_node(parent)?;
        let element = self
            .sim
            .borrow_mut()
            .design
            .element(parent, i64::from(index))?;
        self.alloc(element)
    }

    fn handle(&mut self, relation: i32, obj: RawRef) -> Option<RawRef> {
        let node = self.verilog_node(obj)?;
        let (left, right) = self.sim.borrow().design.range(node)?;
        let bound = match relation {
            VPI_LEFT_RANGE => left,
            VPI_RIGHT_RANGE => right,
            _ => return None,
        };
        let expr = RawRef::new(self.sim.borrow_mut().alloc_other())?;
        self.exprs.insert(expr, bound);
        Some(expr)
    }

    fn iterate(&mut self, relation: i32, parent: Option<RawRef>) -> Option<RawRef> {
        let parent = match parent {
            Some(raw) => Some(self.verilog_node(raw)?),
            None => None,
        };
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
        self.exprs.remove(&obj);
        self.callbacks.remove(&obj);
        self.sim.borrow_mut().free(obj.get())
    }

    fn get(&mut self, property: i32, obj: Option<RawRef>) -> i32 {
        let Some(obj) = obj else {
            return match property {
                VPI_TIME_PRECISION => self.sim.borrow().precision(),
                _ => VPI_UNDEFINED,
            };
        };
        let Some(node) = self.node(obj) else {
            return VPI_UNDEFINED;
        };
        match property {
            VPI_TYPE => self.type_of(node),
            VPI_SIZE => i32::try_from(self.sim.borrow().design.width(node)).unwrap_or(i32::MAX),
            // vpiDecConst
            VPI_CONST_TYPE => 1,
            _ => VPI_UNDEFINED,
        }
    }

    fn get_str(&mut self, property: i32, obj: RawRef) -> Option<String> {
        let node = self.verilog_node(obj)?;
        let sim = self.sim.borrow();
        let design = &sim.design;
        match property {
            VPI_NAME => design.name(node).map(str::to_string),
            VPI_FULL_NAME => Some(design.full_name(node)),
            VPI_DEF_NAME => design.node(node)?.definition.as_ref().map(|d| d.0.clone()),
            VPI_DEF_FILE => design.node(node)?.definition.as_ref().map(|d| d.1.clone()),
            _ => None,
        }
    }

    fn get_value(&mut self, obj: RawRef, format: i32) -> Option<VpiValue> {
        if let Some(&bound) = self.exprs.get(&obj) {
            return i32::try_from(bound).ok().map(VpiValue::Int);
        }
        let Some(node) = self.verilog_node(obj) else {
            self.fail(VPI_ERROR, "vpi_get_value: bad object");
            return None;
        };
        let value = self.sim.borrow().read(node);
        let converted = match (value, format) {
            (Some(NodeValue::Logic(bits)), VPI_BIN_STR_VAL) => Some(VpiValue::BinStr(bits)),
            (Some(NodeValue::Logic(bits)), VPI_INT_VAL) => logic::binstr_to_int(&bits)
                .ok()
                .map(|v| VpiValue::Int(v as i32)),
            (Some(NodeValue::Int(v)), VPI_BIN_STR_VAL) => {
                Some(VpiValue::BinStr(logic::int_to_binstr(v, 32)))
            }
            (Some(NodeValue::Int(v)), VPI_INT_VAL) => Some(VpiValue::Int(v as i32)),
            (Some(NodeValue::Enum(pos)), VPI_INT_VAL) => Some(VpiValue::Int(pos as i32)),
            (Some(NodeValue::Enum(pos)), VPI_BIN_STR_VAL) => {
                Some(VpiValue::BinStr(logic::int_to_binstr(pos as i64, 32)))
            }
            (Some(NodeValue::Real(v)), VPI_REAL_VAL) => Some(VpiValue::Real(v)),
            (Some(NodeValue::Str(bytes)), VPI_STRING_VAL) => Some(VpiValue::Str(bytes)),
            _ => None,
        };
        if converted.is_none() {
            self.fail(VPI_ERROR, "vpi_get_value: format not supported for object");
        }
        converted
    }

    fn put_value(&mut self, obj: RawRef, value: &VpiValue, flags: i32) {
        let Some(node) = self.verilog_node(obj) else {
            self.fail(VPI_ERROR, "vpi_put_value: bad object");
            return;
        };
        if matches!(self.sim.borrow().design.kind(node), Some(NodeKind::Param)) {
            self.fail(VPI_ERROR, "vpi_put_value: cannot assign to a parameter");
            return;
        }
        let drive = match flags {
            VPI_FORCE_FLAG => Drive::Force,
            VPI_RELEASE_FLAG => Drive::Release,
            _ => Drive::Deposit,
        };
        let Some(converted) = self.to_node_value(node, value) else {
            self.fail(VPI_ERROR, "vpi_put_value: value does not match object");
            return;
        };
        let written = self.sim.borrow_mut().write(node, converted, drive);
        if let Err(err) = written {
            self.fail(VPI_ERROR, &format!("vpi_put_value: {err}"));
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
            self.fail(VPI_ERROR, &format!("{} not supported", reason_name(reason)));
            return None;
        }
        let trigger = match reason {
            CB_VALUE_CHANGE => Trigger::ValueChange(obj.and_then(|o| self.node(o))?),
            CB_AFTER_DELAY => Trigger::After(delay),
            CB_READ_WRITE_SYNCH => Trigger::ReadWrite,
            CB_READ_ONLY_SYNCH => Trigger::ReadOnly,
            CB_NEXT_SIM_TIME => Trigger::NextTimeStep,
            CB_START_OF_SIMULATION => Trigger::StartOfSim,
            CB_END_OF_SIMULATION => Trigger::EndOfSim,
            _ => {
                self.fail(VPI_ERROR, "vpi_register_cb: unknown reason");
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
            self.fail(VPI_ERROR, "vpi_remove_cb: not a callback");
            return false;
        };
        if self.sticky.contains(&registration.reason) {
            self.fail(
                VPI_ERROR,
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

    fn info(&mut self) -> SimInfo {
        let sim = self.sim.borrow();
        SimInfo {
            product: sim.product().to_string(),
            version: sim.version().to_string(),
        }
    }

    fn chk_error(&mut self) -> Option<VpiDiagnostic> {
        self.error.take()
    }
}
