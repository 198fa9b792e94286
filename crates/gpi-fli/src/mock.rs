//! [`MockFli`]: the FLI routine set over a [`gpi_testkit::Sim`].
//!
//! Native references are stable: each design node has one for the life of
//! the mock, as FLI region and signal ids do. A reference another mock gave
//! out is not a region id here. VHDL scopes are
//! architectures, Verilog scopes are `accModule` regions the adapter hands
//! on. `Reg` nodes are variables; every other VHDL value node is a signal.
//!
//! Processes and phase callbacks are scheduled on the simulation kernel
//! with a key the [`FliWaker`] maps back to the registered function, so a
//! test delivers kernel events with `run_until(&sim, t, |ud| waker.wake(ud))`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::c_void;
use std::rc::Rc;

use gpi_core::logic::Logic;
use gpi_core::value::fit_string;
use gpi_core::RawRef;
use gpi_testkit::{Drive, Lang, NodeId, NodeKind, NodeValue, SharedSim, Trigger};

use crate::api::{FliApi, FliType, FliValue, ProcessFn};
use crate::consts::*;

#[derive(Debug, Clone, Copy)]
struct Wake {
    func: ProcessFn,
    param: usize,
    process: bool,
}

/// Delivers kernel events to the processes and callbacks registered with a
/// [`MockFli`].
#[derive(Debug, Clone, Default)]
pub struct FliWaker(Rc<RefCell<HashMap<u64, Wake>>>);

impl FliWaker {
    /// Run whatever was registered under `key`.
    pub fn wake(&self, key: u64) {
        let wake = self.0.borrow().get(&key).copied();
        if let Some(wake) = wake {
            (wake.func)(wake.param as *mut c_void);
        }
    }

    /// Processes created so far.
    pub fn processes(&self) -> usize {
        self.0.borrow().values().filter(|w| w.process).count()
    }

    fn register(&self, key: u64, func: ProcessFn, param: *mut c_void, process: bool) {
        self.0.borrow_mut().insert(
            key,
            Wake {
                func,
                param: param as usize,
                process,
            },
        );
    }
}

#[derive(Debug)]
struct Process {
    key: u64,
    priority: i32,
    name: String,
    /// Kernel tokens of the value-change watches.
    watches: Vec<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    LoadDone,
    Quit,
}

#[derive(Debug)]
struct PhaseCb {
    phase: Phase,
    func: usize,
    param: usize,
    token: u64,
}

pub struct MockFli {
    sim: SharedSim,
    raws: HashMap<NodeId, RawRef>,
    processes: HashMap<RawRef, Process>,
    phase_cbs: Vec<PhaseCb>,
    waker: FliWaker,
    refuse_processes: bool,
}

impl MockFli {
    pub fn new(sim: SharedSim) -> Self {
        Self {
            sim,
            raws: HashMap::new(),
            processes: HashMap::new(),
            phase_cbs: Vec::new(),
            waker: FliWaker::default(),
            refuse_processes: false,
        }
    }

    pub fn waker(&self) -> FliWaker {
        self.waker.clone()
    }

    /// Make `mti_CreateProcess` fail.
    pub fn refuse_processes(&mut self) {
        self.refuse_processes = true;
    }

    /// Names of the processes created so far, in creation order.
    pub fn process_names(&self) -> Vec<String> {
        let mut procs: Vec<(u64, &str)> = self
            .processes
            .values()
            .map(|p| (p.key, p.name.as_str()))
            .collect();
        procs.sort();
        procs.into_iter().map(|(_, n)| n.to_string()).collect()
    }

    pub fn live_phase_callbacks(&self) -> usize {
        self.phase_cbs.len()
    }

    fn raw(&mut self, node: NodeId) -> Option<RawRef> {
        if let Some(raw) = self.raws.get(&node) {
            return Some(*raw);
        }
        let raw = RawRef::new(self.sim.borrow_mut().alloc_node(node))?;
        self.raws.insert(node, raw);
        Some(raw)
    }

    fn raws(&mut self, nodes: Vec<NodeId>) -> Vec<RawRef> {
        nodes.into_iter().filter_map(|n| self.raw(n)).collect()
    }

    fn node(&self, obj: RawRef) -> Option<NodeId> {
        self.sim.borrow().node_of(obj.get())
    }

    fn is_vhdl(&self, node: NodeId) -> bool {
        self.sim.borrow().design.lang(node) == Some(Lang::Vhdl)
    }

    fn kind(&self, node: NodeId) -> Option<NodeKind> {
        self.sim.borrow().design.kind(node).cloned()
    }

    fn region_kind_of(&self, node: NodeId) -> Option<i32> {
        let vhdl = self.is_vhdl(node);
        match self.kind(node)? {
            NodeKind::Scope if vhdl => Some(ACC_ARCHITECTURE),
            NodeKind::Scope => Some(ACC_MODULE),
            NodeKind::Package => Some(ACC_PACKAGE),
            NodeKind::GenBlock if vhdl => Some(ACC_FOR_GENERATE),
            NodeKind::Block if vhdl => Some(ACC_BLOCK),
            NodeKind::GenBlock | NodeKind::Block => Some(ACC_MODULE),
            _ => None,
        }
    }

    /// Whether `node` is a VHDL object of the requested family. Elements
    /// and fields belong to the family of what contains them.
    fn is_object(&self, node: NodeId, var: bool) -> bool {
        if !self.is_vhdl(node) {
            return false;
        }
        let sim = self.sim.borrow();
        let design = &sim.design;
        let mut current = node;
        loop {
            let Some(kind) = design.kind(current) else {
                return false;
            };
            let parent = design.node(current).and_then(|n| n.parent);
            let parent_kind = parent.and_then(|p| design.kind(p));
            let contained = matches!(
                (kind, parent_kind),
                (NodeKind::Bit { .. }, _)
                    | (_, Some(NodeKind::Array { .. } | NodeKind::Struct))
            );
            match (contained, parent) {
                (true, Some(parent)) => current = parent,
                _ => {
                    return match kind {
                        NodeKind::Reg { .. } => var,
                        NodeKind::Net { .. }
                        | NodeKind::Integer
                        | NodeKind::Real
                        | NodeKind::Str { .. }
                        | NodeKind::Enum { .. }
                        | NodeKind::Array { .. }
                        | NodeKind::Struct => !var,
                        _ => false,
                    }
                }
            }
        }
    }

    fn object(&self, obj: RawRef, var: bool) -> Option<NodeId> {
        let node = self.node(obj)?;
        self.is_object(node, var).then_some(node)
    }

    fn path(&self, node: NodeId) -> String {
        let sim = self.sim.borrow();
        let design = &sim.design;
        let mut parts = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            parts.push(design.name(id).unwrap_or_default().to_string());
            current = design.node(id).and_then(|n| n.parent);
        }
        parts.reverse();
        format!("/{}", parts.join("/"))
    }

    /// Resolve a `/`-separated path from the top regions.
    fn resolve(&self, path: &str) -> Option<NodeId> {
        let sim = self.sim.borrow();
        let design = &sim.design;
        let mut parts = path.trim_start_matches('/').split('/');
        let top = parts.next()?;
        let tops = design.roots().iter().chain(design.packages().iter());
        let mut node = tops
            .copied()
            .find(|&r| design.name(r).is_some_and(|n| n.eq_ignore_ascii_case(top)))?;
        for part in parts {
            node = design
                .children(node)
                .iter()
                .copied()
                .find(|&c| design.name(c).is_some_and(|n| n.eq_ignore_ascii_case(part)))?;
        }
        Some(node)
    }

    fn type_of_node(&self, node: NodeId) -> Option<FliType> {
        let std_ulogic = || {
            FliType::enumeration(STD_ULOGIC_LITERALS.iter().map(|l| l.to_string()).collect())
        };
        let (kind, first) = {
            let sim = self.sim.borrow();
            (
                sim.design.kind(node)?.clone(),
                sim.design.children(node).first().copied(),
            )
        };
        let ty = match kind {
            NodeKind::Net { range: None, .. }
            | NodeKind::Reg { range: None, .. }
            | NodeKind::Bit { .. } => std_ulogic(),
            NodeKind::Net {
                range: Some((left, right)),
                ..
            }
            | NodeKind::Reg {
                range: Some((left, right)),
                ..
            } => FliType::array(left, right, std_ulogic()),
            NodeKind::Integer | NodeKind::Param => FliType::scalar(MTI_TYPE_SCALAR),
            NodeKind::Real => FliType::scalar(MTI_TYPE_REAL),
            NodeKind::Str { len } => {
                let characters = (0..CHARACTER_LITERALS)
                    .map(|c| format!("'{}'", char::from(c as u8)))
                    .collect();
                FliType::array(1, len as i64, FliType::enumeration(characters))
            }
            NodeKind::Enum { literals } => FliType::enumeration(literals),
            NodeKind::Array { range } => {
                let element = match first {
                    Some(first) => self.type_of_node(first)?,
                    None => FliType::scalar(MTI_TYPE_SCALAR),
                };
                FliType::array(range.0, range.1, element)
            }
            NodeKind::Struct => FliType::scalar(MTI_TYPE_RECORD),
            _ => return None,
        };
        Some(ty)
    }

    fn elements(&self, parent: NodeId) -> Vec<NodeId> {
        let mut sim = self.sim.borrow_mut();
        match sim.design.kind(parent).cloned() {
            Some(NodeKind::Array { .. } | NodeKind::Struct) => sim.design.children(parent).to_vec(),
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

    fn to_node_value(&self, node: NodeId, value: &FliValue) -> Option<NodeValue> {
        let kind = self.kind(node)?;
        let chars = |positions: &[u8]| -> Option<String> {
            positions
                .iter()
                .map(|&p| Logic::from_std_logic_pos(p).map(Logic::to_char))
                .collect()
        };
        let converted = match (kind, value) {
            (NodeKind::Net { .. } | NodeKind::Reg { .. } | NodeKind::Bit { .. }, FliValue::Int(pos)) => {
                NodeValue::Logic(chars(&[u8::try_from(*pos).ok()?])?)
            }
            (NodeKind::Net { .. } | NodeKind::Reg { .. }, FliValue::Bytes(positions)) => {
                NodeValue::Logic(chars(positions)?)
            }
            (NodeKind::Integer, FliValue::Int(v)) => NodeValue::Int(i64::from(i32::try_from(*v).ok()?)),
            (NodeKind::Real, FliValue::Real(v)) => NodeValue::Real(*v),
            (NodeKind::Enum { .. }, FliValue::Int(pos)) => NodeValue::Enum(usize::try_from(*pos).ok()?),
            (NodeKind::Str { len }, FliValue::Bytes(bytes)) => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                NodeValue::Str(fit_string(&bytes[..end], len))
            }
            _ => return None,
        };
        Some(converted)
    }

    /// Parse a VHDL literal as `mti_ForceSignal` would.
    fn parse_literal(&self, node: NodeId, literal: &str) -> Option<NodeValue> {
        let unquote = |s: &str, q: char| {
            s.strip_prefix(q)
                .and_then(|s| s.strip_suffix(q))
                .map(str::to_string)
        };
        let value = match self.kind(node)? {
            NodeKind::Net { range: None, .. }
            | NodeKind::Reg { range: None, .. }
            | NodeKind::Bit { .. } => NodeValue::Logic(unquote(literal, '\'')?.to_uppercase()),
            NodeKind::Net { .. } | NodeKind::Reg { .. } => {
                NodeValue::Logic(unquote(literal, '"')?.to_uppercase())
            }
            NodeKind::Integer => NodeValue::Int(literal.parse().ok()?),
            NodeKind::Real => NodeValue::Real(literal.parse().ok()?),
            NodeKind::Enum { literals } => {
                NodeValue::Enum(literals.iter().position(|l| l.eq_ignore_ascii_case(literal))?)
            }
            NodeKind::Str { .. } => NodeValue::Str(unquote(literal, '"')?.into_bytes()),
            _ => return None,
        };
        Some(value)
    }

    fn write(&mut self, node: NodeId, value: NodeValue, drive: Drive) -> bool {
        self.sim.borrow_mut().write(node, value, drive).is_ok()
    }

    fn process(&self, process: RawRef) -> Option<&Process> {
        self.processes.get(&process)
    }

    fn add_phase(&mut self, phase: Phase, func: ProcessFn, param: *mut c_void) {
        let Some(key) = RawRef::new(self.sim.borrow_mut().alloc_other()) else {
            return;
        };
        let key = key.get() as u64;
        self.waker.register(key, func, param, false);
        let trigger = match phase {
            Phase::LoadDone => Trigger::StartOfSim,
            Phase::Quit => Trigger::EndOfSim,
        };
        let token = self.sim.borrow_mut().schedule(trigger, key);
        self.phase_cbs.push(PhaseCb {
            phase,
            func: func as usize,
            param: param as usize,
            token,
        });
    }

    fn remove_phase(&mut self, phase: Phase, func: ProcessFn, param: *mut c_void) {
        let found = self.phase_cbs.iter().position(|cb| {
            cb.phase == phase && cb.func == func as usize && cb.param == param as usize
        });
        if let Some(index) = found {
            let cb = self.phase_cbs.remove(index);
            self.sim.borrow_mut().cancel(cb.token);
        }
    }
}

fn logic_positions(bits: &str) -> Option<Vec<u8>> {
    bits.chars()
        .map(|c| Logic::from_char(c).map(Logic::std_logic_pos))
        .collect()
}

impl FliApi for MockFli {
    fn top_regions(&mut self) -> Vec<RawRef> {
        let tops: Vec<NodeId> = {
            let sim = self.sim.borrow();
            sim.design
                .roots()
                .iter()
                .chain(sim.design.packages().iter())
                .copied()
                .collect()
        };
        self.raws(tops)
    }

    fn find_region(&mut self, path: &str) -> Option<RawRef> {
        let node = self.resolve(path)?;
        self.region_kind_of(node)?;
        self.raw(node)
    }

    fn child_regions(&mut self, region: RawRef) -> Vec<RawRef> {
        let Some(node) = self.node(region) else {
            return Vec::new();
        };
        let children = self.sim.borrow().design.children(node).to_vec();
        let regions: Vec<NodeId> = children
            .into_iter()
            .filter(|&c| {
                matches!(
                    self.kind(c),
                    Some(NodeKind::Scope | NodeKind::GenBlock | NodeKind::Block)
                )
            })
            .collect();
        self.raws(regions)
    }

    fn region_kind(&mut self, obj: RawRef) -> Option<i32> {
        self.region_kind_of(self.node(obj)?)
    }

    fn region_name(&mut self, region: RawRef) -> Option<String> {
        let node = self.node(region)?;
        self.region_kind_of(node)?;
        self.sim.borrow().design.name(node).map(str::to_string)
    }

    fn region_full_name(&mut self, region: RawRef) -> Option<String> {
        let node = self.node(region)?;
        // Only ids this mock handed out are regions.
        if self.raws.get(&node) != Some(&region) {
            return None;
        }
        self.region_kind_of(node)?;
        Some(self.path(node))
    }

    fn region_source(&mut self, region: RawRef) -> Option<(String, String)> {
        let node = self.node(region)?;
        self.sim.borrow().design.node(node)?.definition.clone()
    }

    fn signals(&mut self, region: RawRef) -> Vec<RawRef> {
        let Some(node) = self.node(region) else {
            return Vec::new();
        };
        let children = self.sim.borrow().design.children(node).to_vec();
        let signals: Vec<NodeId> = children
            .into_iter()
            .filter(|&c| self.is_object(c, false))
            .collect();
        self.raws(signals)
    }

    fn variables(&mut self, region: RawRef) -> Vec<RawRef> {
        let Some(node) = self.node(region) else {
            return Vec::new();
        };
        let children = self.sim.borrow().design.children(node).to_vec();
        let vars: Vec<NodeId> = children
            .into_iter()
            .filter(|&c| self.is_object(c, true))
            .collect();
        self.raws(vars)
    }

    fn find_signal(&mut self, path: &str) -> Option<RawRef> {
        let node = self.resolve(path)?;
        self.is_object(node, false).then_some(())?;
        self.raw(node)
    }

    fn find_var(&mut self, path: &str) -> Option<RawRef> {
        let node = self.resolve(path)?;
        self.is_object(node, true).then_some(())?;
        self.raw(node)
    }

    fn sub_elements(&mut self, obj: RawRef, var: bool) -> Vec<RawRef> {
        let Some(node) = self.object(obj, var) else {
            return Vec::new();
        };
        let elements = self.elements(node);
        self.raws(elements)
    }

    fn object_name(&mut self, obj: RawRef, var: bool) -> Option<String> {
        let node = self.object(obj, var)?;
        self.sim.borrow().design.name(node).map(str::to_string)
    }

    fn type_of(&mut self, obj: RawRef, var: bool) -> Option<FliType> {
        let node = self.object(obj, var)?;
        self.type_of_node(node)
    }

    fn get_value(&mut self, obj: RawRef, var: bool) -> Option<FliValue> {
        let node = self.object(obj, var)?;
        let scalar = matches!(
            self.kind(node)?,
            NodeKind::Net { range: None, .. } | NodeKind::Reg { range: None, .. } | NodeKind::Bit { .. }
        );
        let value = match self.sim.borrow().read(node)? {
            NodeValue::Logic(bits) if scalar => {
                FliValue::Int(i64::from(*logic_positions(&bits)?.first()?))
            }
            NodeValue::Logic(bits) => FliValue::Bytes(logic_positions(&bits)?),
            NodeValue::Int(v) => FliValue::Int(v),
            NodeValue::Real(v) => FliValue::Real(v),
            NodeValue::Str(bytes) => FliValue::Bytes(bytes),
            NodeValue::Enum(pos) => FliValue::Int(i64::try_from(pos).ok()?),
        };
        Some(value)
    }

    fn set_signal(&mut self, signal: RawRef, value: &FliValue) -> bool {
        let Some(node) = self.object(signal, false) else {
            return false;
        };
        match self.to_node_value(node, value) {
            Some(converted) => self.write(node, converted, Drive::Deposit),
            None => false,
        }
    }

    fn set_var(&mut self, var: RawRef, value: &FliValue) -> bool {
        let Some(node) = self.object(var, true) else {
            return false;
        };
        match self.to_node_value(node, value) {
            Some(converted) => self.write(node, converted, Drive::Deposit),
            None => false,
        }
    }

    fn force(&mut self, signal: RawRef, literal: &str) -> bool {
        let Some(node) = self.object(signal, false) else {
            return false;
        };
        match self.parse_literal(node, literal) {
            Some(value) => self.write(node, value, Drive::Force),
            None => false,
        }
    }

    fn release(&mut self, signal: RawRef) -> bool {
        let Some(node) = self.object(signal, false) else {
            return false;
        };
        let Some(current) = self.sim.borrow().read(node) else {
            return false;
        };
        self.write(node, current, Drive::Release)
    }

    fn create_process(
        &mut self,
        name: &str,
        func: ProcessFn,
        param: *mut c_void,
        priority: i32,
    ) -> Option<RawRef> {
        if self.refuse_processes {
            return None;
        }
        let raw = RawRef::new(self.sim.borrow_mut().alloc_other())?;
        let key = raw.get() as u64;
        self.waker.register(key, func, param, true);
        self.processes.insert(
            raw,
            Process {
                key,
                priority,
                name: name.to_string(),
                watches: Vec::new(),
            },
        );
        Some(raw)
    }

    fn sensitize(&mut self, process: RawRef, signal: RawRef) {
        let Some(node) = self.object(signal, false) else {
            return;
        };
        let Some(key) = self.process(process).map(|p| p.key) else {
            return;
        };
        let token = self.sim.borrow_mut().schedule(Trigger::ValueChange(node), key);
        if let Some(p) = self.processes.get_mut(&process) {
            p.watches.push(token);
        }
    }

    fn desensitize(&mut self, process: RawRef) {
        let watches = match self.processes.get_mut(&process) {
            Some(p) => std::mem::take(&mut p.watches),
            None => return,
        };
        let mut sim = self.sim.borrow_mut();
        for token in watches {
            sim.cancel(token);
        }
    }

    fn schedule_wakeup(&mut self, process: RawRef, delay: u64) {
        let Some((key, priority)) = self.process(process).map(|p| (p.key, p.priority)) else {
            return;
        };
        let trigger = match priority {
            MTI_PROC_SYNCH => Trigger::ReadWrite,
            MTI_PROC_POSTPONED => Trigger::ReadOnly,
            MTI_PROC_IMMEDIATE => Trigger::NextTimeStep,
            _ => Trigger::After(delay),
        };
        self.sim.borrow_mut().schedule(trigger, key);
    }

    fn add_load_done_cb(&mut self, func: ProcessFn, param: *mut c_void) {
        self.add_phase(Phase::LoadDone, func, param);
    }

    fn remove_load_done_cb(&mut self, func: ProcessFn, param: *mut c_void) {
        self.remove_phase(Phase::LoadDone, func, param);
    }

    fn add_quit_cb(&mut self, func: ProcessFn, param: *mut c_void) {
        self.add_phase(Phase::Quit, func, param);
    }

    fn remove_quit_cb(&mut self, func: ProcessFn, param: *mut c_void) {
        self.remove_phase(Phase::Quit, func, param);
    }

    fn product(&mut self) -> String {
        let sim = self.sim.borrow();
        format!("{} {}", sim.product(), sim.version())
    }

    fn now(&mut self) -> u64 {
        self.sim.borrow().now()
    }

    fn resolution(&mut self) -> i32 {
        self.sim.borrow().precision()
    }

    fn finish(&mut self) {
        self.sim.borrow_mut().request_finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpi_testkit::{fixture, run_until, Sim};
    use std::cell::Cell;

    thread_local! {
        static WOKEN: Cell<usize> = const { Cell::new(0) };
    }

    extern "C" fn count_wake(param: *mut c_void) {
        WOKEN.with(|w| w.set(w.get() + param as usize));
    }

    #[test]
    fn references_are_stable_per_node() {
        let sim = Sim::new(fixture::vhdl_design()).shared();
        let mut api = MockFli::new(sim.clone());
        let a = api.find_signal("/tb/clk").unwrap();
        let b = api.find_signal("tb/CLK").unwrap();
        assert_eq!(a, b);
        let tb = api.find_region("/tb").unwrap();
        assert_eq!(api.signals(tb).len(), 5);
        assert!(api.find_var("/tb/clk").is_none());
        assert!(api.find_region("/tb/clk").is_none());
        let gen1 = api.find_region("/tb/gen[1]").unwrap();
        assert_eq!(api.region_full_name(gen1).as_deref(), Some("/tb/gen[1]"));
    }

    #[test]
    fn types_follow_nodes() {
        let sim = Sim::new(fixture::mixed_design()).shared();
        let mut api = MockFli::new(sim);
        let top = api.top_regions()[0];
        assert_eq!(api.region_kind(top), Some(ACC_MODULE));
        let vec = api.find_signal("/top/u_vhdl/vec").unwrap();
        let ty = api.type_of(vec, false).unwrap();
        assert_eq!(ty.kind, MTI_TYPE_ARRAY);
        assert_eq!((ty.left, ty.right, ty.descending, ty.length), (3, 0, true, 4));
        assert_eq!(ty.element.unwrap().literals.len(), 9);
        assert!(api.find_signal("/top/clk").is_none());
    }

    #[test]
    fn processes_wake_by_priority() {
        let sim = Sim::new(fixture::vhdl_design()).shared();
        let mut api = MockFli::new(sim.clone());
        let waker = api.waker();
        let timer = api
            .create_process("t", count_wake, 1usize as *mut c_void, MTI_PROC_NORMAL)
            .unwrap();
        let ro = api
            .create_process("ro", count_wake, 10usize as *mut c_void, MTI_PROC_POSTPONED)
            .unwrap();
        api.schedule_wakeup(timer, 5);
        api.schedule_wakeup(ro, 0);
        assert_eq!(sim.borrow().kernel.pending(), 2);
        let delivered = run_until(&sim, 10, |ud| waker.wake(ud));
        assert_eq!(delivered, 2);
        assert_eq!(WOKEN.with(Cell::get), 11);
        assert_eq!(api.process_names(), vec!["t", "ro"]);
        assert_eq!(waker.processes(), 2);
    }
}
