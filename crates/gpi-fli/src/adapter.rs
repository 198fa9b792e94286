//! [`FliAdapter`]: the GPI adapter contract over the proprietary FLI.
//!
//! Regions, signals and variables are separate object families in FLI,
//! with separate routines; the adapter remembers which family each handle
//! it created belongs to. Callbacks are simulator processes drawn from a
//! [`ProcessPool`](crate::pool): a value change sensitizes a process to the
//! signal, everything else schedules a one-shot wakeup at a priority that
//! places it in the right phase of the time step.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, warn};

use gpi_core::adapter::{Adapter, ArmRequest, SimInfo};
use gpi_core::callback::CallbackId;
use gpi_core::config::FliConfig;
use gpi_core::handle::{AdapterId, Definition, HandleMeta, ObjectHandle, RawRef};
use gpi_core::iter::{IterState, NativeWalk, NextChild, Relation, SubIter};
use gpi_core::kind::{ObjectKind, Range, RangeDirection};
use gpi_core::logic::{self, Logic};
use gpi_core::name::{self, Separator};
use gpi_core::value::{terminated_string, SetAction, Value, ValueFormat};
use gpi_core::{GpiError, Result};

use crate::api::{FliApi, FliType, FliValue};
use crate::consts::*;
use crate::pool::{on_wake, ProcessPool, SlotKind, SlotState};

const BACKEND: &str = "fli";

// Traversal relations. FLI has no relation codes of its own; these name
// the routine families walked below a parent.
const REL_SIGNALS: Relation = 1;
const REL_VARIABLES: Relation = 2;
const REL_REGIONS: Relation = 3;
const REL_ELEMENTS: Relation = 4;

/// What the adapter keeps about a signal or variable it handed out.
#[derive(Debug, Clone, Copy)]
struct ObjInfo {
    var: bool,
    /// Logic over `bit`, which only has `'0'` and `'1'`.
    bit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeClass {
    Value { format: ValueFormat, bit: bool },
    Record,
    Array,
}

fn literals_are(ty: &FliType, expected: &[&str]) -> bool {
    ty.literals.len() == expected.len()
        && ty
            .literals
            .iter()
            .zip(expected)
            .all(|(l, e)| l.eq_ignore_ascii_case(e))
}

/// Classify an enumeration used as a scalar or array element.
fn enum_class(ty: &FliType, vector: bool) -> TypeClass {
    let std_logic = literals_are(ty, &STD_ULOGIC_LITERALS);
    let bit = literals_are(ty, &BIT_LITERALS);
    let character = ty.literals.len() == CHARACTER_LITERALS;
    let format = match (std_logic || bit, character, vector) {
        (true, _, false) => ValueFormat::Logic,
        (true, _, true) => ValueFormat::LogicVec,
        (_, true, false) => ValueFormat::Char,
        (_, true, true) => ValueFormat::Str,
        (_, _, false) => ValueFormat::Enum,
        (_, _, true) => ValueFormat::EnumVec,
    };
    TypeClass::Value { format, bit }
}

fn type_class(ty: &FliType) -> Option<TypeClass> {
    let class = match ty.kind {
        MTI_TYPE_ENUM => enum_class(ty, false),
        MTI_TYPE_SCALAR | MTI_TYPE_PHYSICAL | MTI_TYPE_TIME => TypeClass::Value {
            format: ValueFormat::Int,
            bit: false,
        },
        MTI_TYPE_REAL => TypeClass::Value {
            format: ValueFormat::Real,
            bit: false,
        },
        MTI_TYPE_RECORD => TypeClass::Record,
        MTI_TYPE_ARRAY => match ty.element.as_deref() {
            Some(elem) if elem.kind == MTI_TYPE_ENUM => enum_class(elem, true),
            _ => TypeClass::Array,
        },
        _ => return None,
    };
    Some(class)
}

fn range_of(ty: &FliType) -> Range {
    let direction = if ty.descending {
        RangeDirection::Descending
    } else {
        RangeDirection::Ascending
    };
    Range::with_direction(ty.left, ty.right, direction)
}

/// VHDL regions the adapter hands out; anything else (Verilog modules in a
/// mixed design) belongs to another adapter.
fn region_object_kind(kind: i32) -> Option<ObjectKind> {
    match kind {
        ACC_ARCHITECTURE | ACC_ENTITY_VITAL_LEVEL0 | ACC_ARCH_VITAL_LEVEL0
        | ACC_ARCH_VITAL_LEVEL1 | ACC_FOREIGN_ARCH | ACC_FOREIGN_ARCH_MIXED | ACC_BLOCK
        | ACC_GENERATE | ACC_IF_GENERATE | ACC_FOR_GENERATE => Some(ObjectKind::Module),
        ACC_PACKAGE => Some(ObjectKind::Package),
        _ => None,
    }
}

fn separator_for(parent: ObjectKind) -> Separator {
    match parent {
        ObjectKind::Package => Separator::Package,
        ObjectKind::Struct => Separator::Field,
        ObjectKind::Array | ObjectKind::GenArray | ObjectKind::Net | ObjectKind::Register => {
            Separator::Index
        }
        _ => Separator::Member,
    }
}

/// Leaf of an FLI name, with `gen(3)` spelled `gen[3]`.
fn normalize_name(raw: &str) -> String {
    let leaf = raw.rsplit('/').next().unwrap_or(raw);
    match (leaf.rfind('('), leaf.ends_with(')')) {
        (Some(open), true) => format!("{}[{}]", &leaf[..open], &leaf[open + 1..leaf.len() - 1]),
        _ => leaf.to_string(),
    }
}

/// Enumeration positions of a binary string: `std_ulogic` positions, or
/// `bit` positions when only `0` and `1` exist.
fn logic_positions(bits: &str, bit: bool) -> Result<Vec<u8>> {
    logic::parse_binstr(bits)?
        .into_iter()
        .map(|l| match (bit, l) {
            (false, l) => Ok(l.std_logic_pos()),
            (true, Logic::Zero) => Ok(0),
            (true, Logic::One) => Ok(1),
            (true, other) => Err(GpiError::invalid_value(format!(
                "'{}' is not a bit value",
                other.to_char()
            ))),
        })
        .collect()
}

fn logic_char(pos: u8, bit: bool) -> Option<char> {
    match (bit, pos) {
        (true, 0) => Some('0'),
        (true, 1) => Some('1'),
        (true, _) => None,
        (false, pos) => Logic::from_std_logic_pos(pos).map(Logic::to_char),
    }
}

pub struct FliAdapter<A> {
    api: A,
    id: AdapterId,
    objects: HashMap<RawRef, ObjInfo>,
    pool: ProcessPool,
}

impl<A: FliApi> FliAdapter<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            id: AdapterId::from_index(0),
            objects: HashMap::new(),
            pool: ProcessPool::new(FliConfig::default().timer_pool),
        }
    }

    /// Keep at most `limit` idle processes of each callback kind.
    pub fn with_timer_pool(mut self, limit: usize) -> Self {
        self.pool.set_limit(limit);
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn api_mut(&mut self) -> &mut A {
        &mut self.api
    }

    /// Simulator processes created for callbacks so far.
    pub fn processes(&self) -> usize {
        self.pool.processes()
    }

    /// Signal or variable record of a value object this adapter built.
    fn info(&self, raw: RawRef) -> Result<ObjInfo> {
        self.objects
            .get(&raw)
            .copied()
            .ok_or(GpiError::UnknownReference {
                backend: BACKEND,
                raw: raw.get(),
            })
    }

    fn region_path(&mut self, region: RawRef, child: &str) -> Option<String> {
        let parent = self.api.region_full_name(region)?;
        Some(format!("{parent}/{}", child.replace('.', "/")))
    }

    /// `/` path of `child` below `parent`. A scope owned by another adapter
    /// is spelled from its full name; its native reference is not an FLI id.
    fn path_below(&mut self, parent: &ObjectHandle, child: &str) -> Option<String> {
        if parent.adapter() != self.id {
            let full = name::join(parent.full_name(), child, separator_for(parent.kind()));
            return Some(format!("/{}", full.replace("::", "/").replace('.', "/")));
        }
        self.region_path(parent.raw(), child)
    }

    // ---- Handle construction ----

    fn build_region(
        &mut self,
        raw: RawRef,
        kind: ObjectKind,
        name: &str,
        full_name: String,
    ) -> ObjectHandle {
        let definition = self
            .api
            .region_source(raw)
            .map(|(name, file)| Definition {
                name,
                file: Some(file),
            });
        let meta = HandleMeta::new(name, full_name, kind).with_definition(definition);
        ObjectHandle::object(self.id, raw, meta)
    }

    fn build_object(
        &mut self,
        raw: RawRef,
        var: bool,
        name: &str,
        full_name: String,
    ) -> Result<ObjectHandle> {
        let ty = self
            .api
            .type_of(raw, var)
            .ok_or_else(|| GpiError::unsupported(format!("{full_name}: no FLI type")))?;
        let class = type_class(&ty).ok_or_else(|| {
            GpiError::unsupported(format!("{full_name}: FLI type kind {}", ty.kind))
        })?;
        let (format, bit) = match class {
            TypeClass::Value { format, bit } => (format, bit),
            TypeClass::Record => {
                self.objects.insert(raw, ObjInfo { var, bit: false });
                let meta = HandleMeta::new(name, full_name, ObjectKind::Struct)
                    .with_elems(self.api.sub_elements(raw, var).len());
                return Ok(ObjectHandle::object(self.id, raw, meta));
            }
            TypeClass::Array => {
                self.objects.insert(raw, ObjInfo { var, bit: false });
                let meta = HandleMeta::new(name, full_name, ObjectKind::Array)
                    .with_range(range_of(&ty));
                return Ok(ObjectHandle::object(self.id, raw, meta));
            }
        };

        let object_kind = match format {
            ValueFormat::Logic | ValueFormat::LogicVec if var => ObjectKind::Register,
            ValueFormat::Logic | ValueFormat::LogicVec => ObjectKind::Net,
            ValueFormat::Enum | ValueFormat::EnumVec => ObjectKind::Enum,
            ValueFormat::Int => ObjectKind::Integer,
            ValueFormat::Real => ObjectKind::Real,
            ValueFormat::Str | ValueFormat::Char => ObjectKind::String,
        };
        let mut meta = HandleMeta::new(name, full_name, object_kind);
        let width = if matches!(
            format,
            ValueFormat::LogicVec | ValueFormat::EnumVec | ValueFormat::Str
        ) {
            meta = meta.with_range(range_of(&ty));
            ty.length
        } else {
            1
        };
        let handle = ObjectHandle::new_signal(self.id, raw, meta, format, width)?;
        self.objects.insert(raw, ObjInfo { var, bit });
        Ok(handle)
    }

    /// A region, signal or variable below a region, by `/` path.
    fn find_below(
        &mut self,
        parent: &ObjectHandle,
        name: &str,
    ) -> Result<Option<ObjectHandle>> {
        let Some(path) = self.path_below(parent, name) else {
            return Ok(None);
        };
        let leaf = normalize_name(&path);
        let full = name::join(parent.full_name(), name, separator_for(parent.kind()));
        if let Some(raw) = self.api.find_region(&path) {
            let Some(kind) = self.api.region_kind(raw).and_then(region_object_kind) else {
                return Ok(None);
            };
            return Ok(Some(self.build_region(raw, kind, &leaf, full)));
        }
        if let Some(raw) = self.api.find_signal(&path) {
            return self.build_object(raw, false, &leaf, full).map(Some);
        }
        if let Some(raw) = self.api.find_var(&path) {
            return self.build_object(raw, true, &leaf, full).map(Some);
        }
        Ok(None)
    }

    /// Field `name` of a record.
    fn find_field(&mut self, parent: &ObjectHandle, name: &str) -> Result<Option<ObjectHandle>> {
        let var = self.info(parent.raw())?.var;
        for raw in self.api.sub_elements(parent.raw(), var) {
            let matches = self
                .api
                .object_name(raw, var)
                .is_some_and(|n| normalize_name(&n).eq_ignore_ascii_case(name));
            if matches {
                let full = name::join(parent.full_name(), name, Separator::Field);
                return self.build_object(raw, var, name, full).map(Some);
            }
        }
        Ok(None)
    }

    /// Generate block `label[index]` below `region`, in either spelling.
    fn find_block(&mut self, region: RawRef, label: &str, index: i64) -> Option<RawRef> {
        [format!("{label}[{index}]"), format!("{label}({index})")]
            .iter()
            .find_map(|block| {
                let path = self.region_path(region, block)?;
                self.api.find_region(&path)
            })
    }

    fn has_generate_blocks(&mut self, region: RawRef, label: &str) -> bool {
        self.api.child_regions(region).into_iter().any(|raw| {
            self.api.region_kind(raw) == Some(ACC_FOR_GENERATE)
                && self
                    .api
                    .region_name(raw)
                    .is_some_and(|n| name::matches_generate_label(&normalize_name(&n), label))
        })
    }

    fn read(&mut self, handle: &ObjectHandle) -> Result<FliValue> {
        let var = self.info(handle.raw())?.var;
        self.api.get_value(handle.raw(), var).ok_or_else(|| {
            GpiError::rejected(
                BACKEND,
                "get_value",
                format!("no value for {}", handle.full_name()),
            )
        })
    }

    /// VHDL literal for `mti_ForceSignal`.
    fn force_literal(&mut self, handle: &ObjectHandle, value: &Value) -> Result<String> {
        let signal = handle.require_signal()?;
        let (format, width) = (signal.format(), signal.width());
        let literal = match (value, format) {
            (Value::BinStr(bits), ValueFormat::Logic) => {
                logic::check_binstr(bits, 1)?;
                format!("'{}'", bits.to_ascii_uppercase())
            }
            (Value::Int(v), ValueFormat::Logic) => format!("'{}'", logic::int_to_binstr(*v, 1)),
            (Value::BinStr(bits), ValueFormat::LogicVec) => {
                logic::check_binstr(bits, width)?;
                format!("\"{}\"", bits.to_ascii_uppercase())
            }
            (Value::Int(v), ValueFormat::LogicVec) => {
                format!("\"{}\"", logic::int_to_binstr(*v, width))
            }
            (Value::Int(v), ValueFormat::Int) => v.to_string(),
            (Value::Real(v), ValueFormat::Real) => format!("{v:?}"),
            (Value::Int(v), ValueFormat::Enum) => {
                let literals = self
                    .api
                    .type_of(handle.raw(), false)
                    .map(|t| t.literals)
                    .unwrap_or_default();
                usize::try_from(*v)
                    .ok()
                    .and_then(|pos| literals.get(pos).cloned())
                    .ok_or_else(|| {
                        GpiError::invalid_value(format!(
                            "{v} is out of range for {}",
                            handle.full_name()
                        ))
                    })?
            }
            (Value::Str(bytes), ValueFormat::Str) => {
                let fitted = gpi_core::value::fit_string(bytes, width);
                format!("\"{}\"", String::from_utf8_lossy(&fitted))
            }
            _ => {
                return Err(GpiError::invalid_value(format!(
                    "cannot force {} onto {} ({format:?})",
                    value.type_name(),
                    handle.full_name()
                )))
            }
        };
        Ok(literal)
    }

    fn encode(&self, handle: &ObjectHandle, value: &Value) -> Result<FliValue> {
        let signal = handle.require_signal()?;
        let (format, width) = (signal.format(), signal.width());
        let bit = self.info(handle.raw())?.bit;
        let out_of_range = |v: i64| {
            GpiError::invalid_value(format!("{v} is out of range for {}", handle.full_name()))
        };
        let native = match (value, format) {
            (Value::BinStr(bits), ValueFormat::Logic) => {
                logic::check_binstr(bits, 1)?;
                let positions = logic_positions(bits, bit)?;
                FliValue::Int(i64::from(positions.first().copied().unwrap_or(0)))
            }
            (Value::Int(v), ValueFormat::Logic) => {
                let positions = logic_positions(&logic::int_to_binstr(*v, 1), bit)?;
                FliValue::Int(i64::from(positions.first().copied().unwrap_or(0)))
            }
            (Value::BinStr(bits), ValueFormat::LogicVec) => {
                FliValue::Bytes(logic_positions(bits, bit)?)
            }
            (Value::Int(v), ValueFormat::LogicVec) => {
                FliValue::Bytes(logic_positions(&logic::int_to_binstr(*v, width), bit)?)
            }
            (Value::Int(v), ValueFormat::Enum) if *v >= 0 => FliValue::Int(*v),
            (Value::Int(v), ValueFormat::Int) => {
                FliValue::Int(i64::from(i32::try_from(*v).map_err(|_| out_of_range(*v))?))
            }
            (Value::Int(v), ValueFormat::Char) => {
                FliValue::Int(i64::from(u8::try_from(*v).map_err(|_| out_of_range(*v))?))
            }
            (Value::Int(v), ValueFormat::Enum) => return Err(out_of_range(*v)),
            (Value::Real(v), ValueFormat::Real) => FliValue::Real(*v),
            (Value::Str(bytes), ValueFormat::Str) => {
                FliValue::Bytes(terminated_string(bytes, width))
            }
            (Value::Str(bytes), ValueFormat::Char) if bytes.len() == 1 => {
                FliValue::Int(i64::from(bytes[0]))
            }
            _ => {
                return Err(GpiError::invalid_value(format!(
                    "cannot write {} to {} ({format:?})",
                    value.type_name(),
                    handle.full_name()
                )))
            }
        };
        Ok(native)
    }

    fn process_of(slot_process: Option<RawRef>) -> Result<RawRef> {
        slot_process.ok_or_else(|| GpiError::corrupted("pool slot without a process"))
    }
}

fn unexpected(handle: &ObjectHandle, got: &FliValue) -> GpiError {
    GpiError::rejected(
        BACKEND,
        "get_value",
        format!("unexpected value {got:?} for {}", handle.full_name()),
    )
}

impl<A: FliApi> NativeWalk for FliAdapter<A> {
    fn open(&mut self, parent: RawRef, relation: Relation) -> Option<SubIter> {
        let items = match relation {
            REL_SIGNALS => self.api.signals(parent),
            REL_VARIABLES => self.api.variables(parent),
            REL_REGIONS => self.api.child_regions(parent),
            REL_ELEMENTS => {
                let var = self.info(parent).ok()?.var;
                self.api.sub_elements(parent, var)
            }
            _ => Vec::new(),
        };
        (!items.is_empty()).then(|| SubIter::Buffered(VecDeque::from(items)))
    }

    fn scan(&mut self, sub: &mut SubIter) -> Option<RawRef> {
        match sub {
            SubIter::Buffered(queue) => queue.pop_front(),
            SubIter::Native(_) => None,
        }
    }

    // Buffered lists hold no native resources.
    fn close(&mut self, _sub: SubIter) {}
}

impl<A: FliApi> Adapter for FliAdapter<A> {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn attach(&mut self, id: AdapterId) {
        self.id = id;
    }

    fn sim_info(&mut self) -> SimInfo {
        let product = self.api.product();
        match product.trim().rsplit_once(' ') {
            Some((product, version)) => SimInfo {
                product: product.trim().to_string(),
                version: version.to_string(),
            },
            None => SimInfo {
                product: product.trim().to_string(),
                version: String::new(),
            },
        }
    }

    fn root(&mut self, name: Option<&str>) -> Result<Option<ObjectHandle>> {
        for raw in self.api.top_regions() {
            let Some(ObjectKind::Module) = self.api.region_kind(raw).and_then(region_object_kind)
            else {
                continue;
            };
            let found = self
                .api
                .region_name(raw)
                .map(|n| normalize_name(&n))
                .unwrap_or_default();
            if let Some(requested) = name {
                if !requested.eq_ignore_ascii_case(&found) {
                    return Err(GpiError::RootMismatch {
                        requested: requested.to_string(),
                        found,
                    });
                }
            }
            return Ok(Some(self.build_region(
                raw,
                ObjectKind::Module,
                &found,
                found.clone(),
            )));
        }
        Ok(None)
    }

    fn packages(&mut self) -> Result<Vec<ObjectHandle>> {
        let mut packages = Vec::new();
        for raw in self.api.top_regions() {
            if self.api.region_kind(raw) != Some(ACC_PACKAGE) {
                continue;
            }
            let Some(name) = self.api.region_name(raw).map(|n| normalize_name(&n)) else {
                continue;
            };
            let full = format!("{name}::");
            packages.push(self.build_region(raw, ObjectKind::Package, &name, full));
        }
        Ok(packages)
    }

    fn by_name(&mut self, parent: &ObjectHandle, name: &str) -> Result<Option<ObjectHandle>> {
        if parent.adapter() != self.id {
            return match parent.kind() {
                ObjectKind::Module | ObjectKind::Package if !parent.is_pseudo() => {
                    self.find_below(parent, name)
                }
                _ => Ok(None),
            };
        }
        if parent.is_pseudo() {
            if !name::matches_generate_label(name, parent.name()) {
                return Ok(None);
            }
            let index = name::index_suffix(name)
                .and_then(|s| s[1..s.len() - 1].trim().parse::<i64>().ok());
            let Some(raw) = index.and_then(|i| self.find_block(parent.raw(), parent.name(), i))
            else {
                return Ok(None);
            };
            let full = name::join(parent.full_name(), name, Separator::Index);
            return Ok(Some(self.build_region(raw, ObjectKind::Module, name, full)));
        }

        match parent.kind() {
            ObjectKind::Module | ObjectKind::Package => {}
            ObjectKind::Struct => return self.find_field(parent, name),
            _ => return Ok(None),
        }
        if let Some(handle) = self.find_below(parent, name)? {
            return Ok(Some(handle));
        }
        if parent.kind() == ObjectKind::Module && self.has_generate_blocks(parent.raw(), name) {
            debug!(parent = parent.full_name(), label = name, "generate pseudo-region");
            let full = name::join(parent.full_name(), name, Separator::Member);
            return Ok(Some(ObjectHandle::pseudo_region(
                self.id,
                parent.raw(),
                name,
                full,
            )));
        }
        Ok(None)
    }

    fn by_index(&mut self, parent: &ObjectHandle, index: i64) -> Result<Option<ObjectHandle>> {
        if parent.is_pseudo() {
            let Some(raw) = self.find_block(parent.raw(), parent.name(), index) else {
                return Ok(None);
            };
            let block = name::indexed(parent.name(), index);
            let full = name::indexed(parent.full_name(), index);
            return Ok(Some(self.build_region(raw, ObjectKind::Module, &block, full)));
        }

        let Some(offset) = parent.meta().range.and_then(|r| r.offset_of(index)) else {
            return Ok(None);
        };
        let var = self.info(parent.raw())?.var;
        let Some(raw) = self.api.sub_elements(parent.raw(), var).get(offset).copied() else {
            return Ok(None);
        };
        let child = name::indexed(parent.name(), index);
        let full = name::indexed(parent.full_name(), index);
        self.build_object(raw, var, &child, full).map(Some)
    }

    fn by_raw(&mut self, parent: &ObjectHandle, raw: RawRef) -> Result<Option<ObjectHandle>> {
        let name = match self.api.region_kind(raw) {
            Some(kind) if region_object_kind(kind).is_none() => return Ok(None),
            Some(_) => self.api.region_name(raw),
            None => [false, true]
                .into_iter()
                .find_map(|var| self.api.object_name(raw, var)),
        };
        let Some(leaf) = name.map(|n| normalize_name(&n)) else {
            return Ok(None);
        };
        self.find_below(parent, &leaf)
    }

    fn iterate(&mut self, parent: &ObjectHandle) -> Result<Option<IterState>> {
        if parent.is_pseudo() {
            return Ok(Some(IterState::new(parent, vec![REL_REGIONS])));
        }
        let relations = match parent.kind() {
            ObjectKind::Module | ObjectKind::Package => {
                vec![REL_SIGNALS, REL_VARIABLES, REL_REGIONS]
            }
            ObjectKind::Struct | ObjectKind::Array => vec![REL_ELEMENTS],
            _ => match parent.signal().map(|s| s.format()) {
                Some(ValueFormat::LogicVec | ValueFormat::EnumVec) => vec![REL_ELEMENTS],
                _ => return Ok(None),
            },
        };
        Ok(Some(IterState::new(parent, relations)))
    }

    fn next_child(&mut self, state: &mut IterState) -> Result<NextChild> {
        loop {
            let Some(raw) = state.next_raw(self) else {
                return Ok(NextChild::End);
            };
            let relation = state.relation();

            if relation == Some(REL_REGIONS) {
                let kind = self.api.region_kind(raw);
                if state.pseudo_label().is_some() {
                    if kind != Some(ACC_FOR_GENERATE) {
                        continue;
                    }
                    let Some(leaf) = self.api.region_name(raw).map(|n| normalize_name(&n)) else {
                        continue;
                    };
                    if !state.accepts(&leaf) {
                        continue;
                    }
                    let full = name::join(state.parent_full_name(), &leaf, Separator::Index);
                    return Ok(NextChild::Native(self.build_region(
                        raw,
                        ObjectKind::Module,
                        &leaf,
                        full,
                    )));
                }
                let Some(object_kind) = kind.and_then(region_object_kind) else {
                    return Ok(NextChild::Foreign(raw));
                };
                let Some(leaf) = self.api.region_name(raw).map(|n| normalize_name(&n)) else {
                    return Ok(NextChild::Unnamed);
                };
                if kind == Some(ACC_FOR_GENERATE)
                    && state.parent_kind() != ObjectKind::GenArray
                    && name::index_suffix(&leaf).is_some()
                {
                    let label = name::generate_label(&leaf).to_string();
                    let full = name::join(state.parent_full_name(), &label, Separator::Member);
                    return Ok(NextChild::Native(ObjectHandle::pseudo_region(
                        self.id,
                        state.parent_raw(),
                        label,
                        full,
                    )));
                }
                let full = name::join(
                    state.parent_full_name(),
                    &leaf,
                    separator_for(state.parent_kind()),
                );
                return Ok(NextChild::Native(self.build_region(
                    raw,
                    object_kind,
                    &leaf,
                    full,
                )));
            }

            let var = match relation {
                Some(REL_VARIABLES) => true,
                Some(REL_ELEMENTS) => self.info(state.parent_raw())?.var,
                _ => false,
            };
            let Some(leaf) = self.api.object_name(raw, var).map(|n| normalize_name(&n)) else {
                return Ok(NextChild::Unnamed);
            };
            let full = name::join(
                state.parent_full_name(),
                &leaf,
                separator_for(state.parent_kind()),
            );
            match self.build_object(raw, var, &leaf, full) {
                Ok(handle) => return Ok(NextChild::Native(handle)),
                Err(err @ GpiError::Unsupported { .. }) => {
                    warn!(parent = state.parent_full_name(), %err, "skipping child");
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn close_iterator(&mut self, state: IterState) {
        state.close(self);
    }

    /// FLI ids are never freed; only the adapter's bookkeeping goes.
    fn release(&mut self, raw: RawRef) {
        self.objects.remove(&raw);
    }

    fn read_binstr(&mut self, handle: &ObjectHandle) -> Result<String> {
        let format = handle.require_signal()?.format();
        if !matches!(format, ValueFormat::Logic | ValueFormat::LogicVec) {
            return Err(GpiError::unsupported(format!(
                "{} has no binary string form",
                handle.full_name()
            )));
        }
        let bit = self.info(handle.raw())?.bit;
        let positions = match self.read(handle)? {
            FliValue::Int(pos) => vec![u8::try_from(pos).map_err(|_| {
                unexpected(handle, &FliValue::Int(pos))
            })?],
            FliValue::Bytes(positions) => positions,
            other => return Err(unexpected(handle, &other)),
        };
        positions
            .iter()
            .map(|&p| logic_char(p, bit))
            .collect::<Option<String>>()
            .ok_or_else(|| unexpected(handle, &FliValue::Bytes(positions.clone())))
    }

    fn read_str(&mut self, handle: &ObjectHandle) -> Result<Vec<u8>> {
        match self.read(handle)? {
            FliValue::Bytes(bytes) => Ok(bytes),
            FliValue::Int(c) if handle.require_signal()?.format() == ValueFormat::Char => {
                Ok(vec![u8::try_from(c).map_err(|_| unexpected(handle, &FliValue::Int(c)))?])
            }
            other => Err(unexpected(handle, &other)),
        }
    }

    fn read_real(&mut self, handle: &ObjectHandle) -> Result<f64> {
        match self.read(handle)? {
            FliValue::Real(v) => Ok(v),
            other => Err(unexpected(handle, &other)),
        }
    }

    fn read_long(&mut self, handle: &ObjectHandle) -> Result<i64> {
        match handle.require_signal()?.format() {
            ValueFormat::Logic | ValueFormat::LogicVec => {
                let bits = self.read_binstr(handle)?;
                logic::binstr_to_int(&bits)
            }
            _ => match self.read(handle)? {
                FliValue::Int(v) => Ok(v),
                other => Err(unexpected(handle, &other)),
            },
        }
    }

    fn write(&mut self, handle: &ObjectHandle, value: &Value, action: SetAction) -> Result<()> {
        let var = self.info(handle.raw())?.var;
        if var && matches!(action, SetAction::Force | SetAction::Release) {
            return Err(GpiError::unsupported(format!(
                "{}: variables cannot be forced",
                handle.full_name()
            )));
        }
        let (operation, accepted) = match action {
            // The FLI has no inertial deposit distinct from an immediate one.
            SetAction::Deposit | SetAction::NoDelay => {
                let native = self.encode(handle, value)?;
                if var {
                    ("set_var", self.api.set_var(handle.raw(), &native))
                } else {
                    ("set_signal", self.api.set_signal(handle.raw(), &native))
                }
            }
            SetAction::Force => {
                let literal = self.force_literal(handle, value)?;
                ("force", self.api.force(handle.raw(), &literal))
            }
            SetAction::Release => ("release", self.api.release(handle.raw())),
        };
        if accepted {
            Ok(())
        } else {
            Err(GpiError::rejected(
                BACKEND,
                operation,
                format!("{} refused the value", handle.full_name()),
            ))
        }
    }

    fn arm(&mut self, token: CallbackId, request: ArmRequest<'_>) -> Result<RawRef> {
        let kind = match request {
            ArmRequest::ValueChange(handle) => {
                if self.info(handle.raw())?.var {
                    return Err(GpiError::unsupported(format!(
                        "{}: variables have no events",
                        handle.full_name()
                    )));
                }
                SlotKind::ValueChange
            }
            ArmRequest::Timer(_) => SlotKind::Timer,
            ArmRequest::ReadWrite => SlotKind::ReadWrite,
            ArmRequest::ReadOnly => SlotKind::ReadOnly,
            ArmRequest::NextTimeStep => SlotKind::NextTimeStep,
            ArmRequest::StartOfSim => SlotKind::StartOfSim,
            ArmRequest::EndOfSim => SlotKind::EndOfSim,
        };
        let slot = self
            .pool
            .acquire(&mut self.api, kind, token)
            .ok_or_else(|| {
                GpiError::rejected(BACKEND, "create_process", "no process for the callback")
            })?;
        match request {
            ArmRequest::ValueChange(handle) => {
                let process = Self::process_of(slot.process())?;
                self.api.sensitize(process, handle.raw());
            }
            ArmRequest::Timer(delay) => {
                let process = Self::process_of(slot.process())?;
                self.api.schedule_wakeup(process, delay);
            }
            ArmRequest::ReadWrite | ArmRequest::ReadOnly | ArmRequest::NextTimeStep => {
                let process = Self::process_of(slot.process())?;
                self.api.schedule_wakeup(process, 0);
            }
            ArmRequest::StartOfSim => self.api.add_load_done_cb(on_wake, slot.param()),
            ArmRequest::EndOfSim => self.api.add_quit_cb(on_wake, slot.param()),
        }
        slot.registration()
            .ok_or_else(|| GpiError::corrupted("pool slot at a null address"))
    }

    fn disarm(&mut self, registration: RawRef, fired: bool) -> Result<()> {
        let slot = self.pool.find(registration).ok_or_else(|| {
            GpiError::rejected(BACKEND, "disarm", "not a callback registration")
        })?;
        if !matches!(slot.state(), SlotState::Armed(_)) {
            return Err(GpiError::rejected(
                BACKEND,
                "disarm",
                format!("{:?} registration is not live", slot.kind()),
            ));
        }
        match slot.kind() {
            SlotKind::ValueChange => {
                let process = Self::process_of(slot.process())?;
                self.api.desensitize(process);
                self.pool.release(slot, false);
            }
            SlotKind::StartOfSim => {
                if !fired {
                    self.api.remove_load_done_cb(on_wake, slot.param());
                }
                self.pool.release(slot, false);
            }
            SlotKind::EndOfSim => {
                if !fired {
                    self.api.remove_quit_cb(on_wake, slot.param());
                }
                self.pool.release(slot, false);
            }
            _ => self.pool.release(slot, !fired),
        }
        Ok(())
    }

    fn sim_time(&mut self) -> u64 {
        self.api.now()
    }

    fn sim_precision(&mut self) -> i32 {
        self.api.resolution()
    }

    fn finish(&mut self) {
        self.api.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FliWaker, MockFli};
    use gpi_core::callback::{CallbackKind, Edge, UserFn};
    use gpi_core::{global, Gpi, GpiConfig, HandleId};
    use gpi_testkit::{fixture, run_until, Design, Drive, Lang, NodeValue, SharedSim, Sim};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn sim() -> SharedSim {
        Sim::new(fixture::vhdl_design()).shared()
    }

    fn gpi_over(adapter: FliAdapter<MockFli>) -> Gpi {
        let mut gpi = Gpi::new(GpiConfig::default());
        gpi.register_adapter(Box::new(adapter)).unwrap();
        gpi
    }

    fn names(gpi: &mut Gpi, parent: HandleId) -> Vec<String> {
        let mut out = Vec::new();
        let Some(iter) = gpi.iterate(parent).unwrap() else {
            return out;
        };
        while let Some(child) = gpi.next(iter).unwrap() {
            out.push(gpi.handle(child).unwrap().full_name().to_string());
            gpi.release(child).unwrap();
        }
        out
    }

    fn counter(count: &Rc<Cell<u32>>) -> UserFn {
        let count = count.clone();
        Box::new(move || {
            count.set(count.get() + 1);
            0
        })
    }

    /// Install a GPI over the FLI mock as this thread's instance.
    fn installed(adapter: FliAdapter<MockFli>) -> (Rc<RefCell<Gpi>>, FliWaker) {
        let waker = adapter.api().waker();
        (global::install(gpi_over(adapter)), waker)
    }

    fn clk_node(sim: &SharedSim) -> gpi_testkit::NodeId {
        let sim = sim.borrow();
        let tb = sim.design.roots()[0];
        sim.design.lookup(tb, "clk").unwrap()
    }

    #[test]
    fn generate_names_use_brackets() {
        assert_eq!(normalize_name("/tb/gen(2)"), "gen[2]");
        assert_eq!(normalize_name("gen(2)"), "gen[2]");
        assert_eq!(normalize_name("clk"), "clk");
    }

    #[test]
    fn types_classify_by_literals() {
        let std_logic =
            FliType::enumeration(STD_ULOGIC_LITERALS.iter().map(|l| l.to_string()).collect());
        let bit = FliType::enumeration(BIT_LITERALS.iter().map(|l| l.to_string()).collect());
        let chars = FliType::enumeration((0..256).map(|c| format!("c{c}")).collect());
        let states = FliType::enumeration(vec!["IDLE".into(), "RUN".into()]);

        let format = |ty: &FliType| match type_class(ty) {
            Some(TypeClass::Value { format, bit }) => Some((format, bit)),
            _ => None,
        };
        assert_eq!(format(&std_logic), Some((ValueFormat::Logic, false)));
        assert_eq!(format(&bit), Some((ValueFormat::Logic, true)));
        assert_eq!(format(&chars), Some((ValueFormat::Char, false)));
        assert_eq!(format(&states), Some((ValueFormat::Enum, false)));
        assert_eq!(
            format(&FliType::array(7, 0, bit.clone())),
            Some((ValueFormat::LogicVec, true))
        );
        assert_eq!(
            format(&FliType::array(1, 4, chars)),
            Some((ValueFormat::Str, false))
        );
        assert_eq!(
            format(&FliType::array(0, 3, states)),
            Some((ValueFormat::EnumVec, false))
        );
        assert_eq!(
            format(&FliType::scalar(MTI_TYPE_TIME)),
            Some((ValueFormat::Int, false))
        );
        let nested = FliType::array(0, 1, FliType::array(3, 0, std_logic));
        assert_eq!(type_class(&nested), Some(TypeClass::Array));
        assert_eq!(type_class(&FliType::scalar(MTI_TYPE_ACCESS)), None);
    }

    #[test]
    fn bit_values_have_two_positions() {
        assert_eq!(logic_positions("10", true).unwrap(), vec![1, 0]);
        assert_eq!(logic_positions("1Z", false).unwrap(), vec![3, 4]);
        assert!(logic_positions("X", true).is_err());
        assert_eq!(logic_char(1, true), Some('1'));
        assert_eq!(logic_char(2, true), None);
        assert_eq!(logic_char(2, false), Some('0'));
    }

    #[test]
    fn root_is_matched_without_case() {
        let mut fli = FliAdapter::new(MockFli::new(sim()));
        let err = fli.root(Some("top")).unwrap_err();
        assert!(matches!(err, GpiError::RootMismatch { ref found, .. } if found == "tb"));

        let tb = fli.root(Some("TB")).unwrap().unwrap();
        assert_eq!(tb.kind(), ObjectKind::Module);
        let definition = tb.meta().definition.clone().unwrap();
        assert_eq!(definition.name, "tb");
        assert_eq!(definition.file.as_deref(), Some("tb.vhd"));
    }

    #[test]
    fn no_vhdl_toplevel_in_a_verilog_design() {
        let sim = Sim::new(fixture::mixed_design()).shared();
        let mut fli = FliAdapter::new(MockFli::new(sim));
        assert!(fli.root(None).unwrap().is_none());
        let packages = fli.packages().unwrap();
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].full_name(), "pkg::");
    }

    #[test]
    fn objects_are_classified_by_type() {
        let mut gpi = gpi_over(FliAdapter::new(MockFli::new(sim())));
        let tb = gpi.root(None).unwrap();
        let mut lookup = |name: &str| {
            let id = gpi.handle_by_name(tb, name).unwrap();
            let h = gpi.handle(id).unwrap();
            (
                h.kind(),
                h.signal().map(|s| (s.format(), s.width())),
                h.meta().clone(),
            )
        };

        assert_eq!(lookup("clk").1, Some((ValueFormat::Logic, 1)));
        let (kind, signal, meta) = lookup("bus");
        assert_eq!(kind, ObjectKind::Net);
        assert_eq!(signal, Some((ValueFormat::LogicVec, 8)));
        let range = meta.range.unwrap();
        assert_eq!((range.left, range.right), (7, 0));
        assert_eq!(range.direction, RangeDirection::Descending);

        assert_eq!(lookup("count").1, Some((ValueFormat::Int, 1)));
        assert_eq!(lookup("state").0, ObjectKind::Enum);
        let (kind, signal, meta) = lookup("name");
        assert_eq!(kind, ObjectKind::String);
        assert_eq!(signal, Some((ValueFormat::Str, 6)));
        assert_eq!(meta.range.unwrap().direction, RangeDirection::Ascending);

        let (kind, _, meta) = lookup("u_inst");
        assert_eq!(kind, ObjectKind::Module);
        assert!(meta.definition.is_none());
        assert_eq!(lookup("u_inst.busy").2.full_name, "tb.u_inst.busy");
    }

    #[test]
    fn region_traversal_lists_signals_then_regions() {
        let mut gpi = gpi_over(FliAdapter::new(MockFli::new(sim())));
        let tb = gpi.root(None).unwrap();
        let first = names(&mut gpi, tb);
        assert_eq!(
            first,
            vec![
                "tb.clk",
                "tb.bus",
                "tb.count",
                "tb.state",
                "tb.name",
                "tb.gen",
                "tb.u_inst",
            ]
        );
        assert_eq!(names(&mut gpi, tb), first);
    }

    #[test]
    fn for_generate_is_a_pseudo_region() {
        let mut gpi = gpi_over(FliAdapter::new(MockFli::new(sim())));
        let tb = gpi.root(None).unwrap();
        let gen = gpi.handle_by_name(tb, "gen").unwrap();
        assert!(gpi.handle(gen).unwrap().is_pseudo());
        assert_eq!(
            names(&mut gpi, gen),
            vec!["tb.gen[0]", "tb.gen[1]", "tb.gen[2]"]
        );
        let second = gpi.handle_by_index(gen, 1).unwrap();
        let s = gpi.handle_by_name(second, "s").unwrap();
        assert_eq!(gpi.handle(s).unwrap().full_name(), "tb.gen[1].s");
        let by_name = gpi.handle_by_name(gen, "gen[2]").unwrap();
        assert_eq!(gpi.handle(by_name).unwrap().full_name(), "tb.gen[2]");
        assert!(gpi.handle_by_index(gen, 3).is_err());
    }

    #[test]
    fn vectors_index_by_declared_bound() {
        let mut gpi = gpi_over(FliAdapter::new(MockFli::new(sim())));
        let tb = gpi.root(None).unwrap();
        let bus = gpi.handle_by_name(tb, "bus").unwrap();
        gpi.write(bus, &Value::BinStr("10000001".into()), SetAction::Deposit)
            .unwrap();
        let msb = gpi.handle_by_index(bus, 7).unwrap();
        assert_eq!(gpi.handle(msb).unwrap().full_name(), "tb.bus[7]");
        assert_eq!(gpi.read_binstr(msb).unwrap(), "1");
        let bit1 = gpi.handle_by_index(bus, 1).unwrap();
        assert_eq!(gpi.read_binstr(bit1).unwrap(), "0");
        assert!(gpi.handle_by_index(bus, 8).is_err());

        let bits = names(&mut gpi, bus);
        assert_eq!(bits.len(), 8);
        assert_eq!(bits[0], "tb.bus[7]");
    }

    #[test]
    fn values_round_trip() {
        let mut gpi = gpi_over(FliAdapter::new(MockFli::new(sim())));
        let tb = gpi.root(None).unwrap();
        let bus = gpi.handle_by_name(tb, "bus").unwrap();
        assert_eq!(gpi.read_binstr(bus).unwrap(), "UUUUUUUU");
        gpi.write(bus, &Value::BinStr("01XZWLH-".into()), SetAction::Deposit)
            .unwrap();
        assert_eq!(gpi.read_binstr(bus).unwrap(), "01XZWLH-");
        gpi.write(bus, &Value::Int(0x3C), SetAction::NoDelay).unwrap();
        assert_eq!(gpi.read_long(bus).unwrap(), 0x3C);

        let count = gpi.handle_by_name(tb, "count").unwrap();
        gpi.write(count, &Value::Int(-42), SetAction::Deposit).unwrap();
        assert_eq!(gpi.read_long(count).unwrap(), -42);
        assert!(gpi
            .write(count, &Value::Int(1 << 40), SetAction::Deposit)
            .is_err());

        let state = gpi.handle_by_name(tb, "state").unwrap();
        gpi.write(state, &Value::Int(2), SetAction::Deposit).unwrap();
        assert_eq!(gpi.read_long(state).unwrap(), 2);
        assert!(gpi
            .write(state, &Value::Int(9), SetAction::Deposit)
            .is_err());

        let name = gpi.handle_by_name(tb, "name").unwrap();
        gpi.write(name, &Value::Str(b"overlong".to_vec()), SetAction::Deposit)
            .unwrap();
        assert_eq!(gpi.read_str(name).unwrap(), b"overlo".to_vec());
        gpi.write(name, &Value::Str(b"ab".to_vec()), SetAction::Deposit)
            .unwrap();
        assert_eq!(gpi.read_str(name).unwrap(), b"ab    ".to_vec());
    }

    #[test]
    fn unknown_reference_is_an_error() {
        let mut fli = FliAdapter::new(MockFli::new(sim()));
        let raw = RawRef::new(0x999).unwrap();
        let stranger = ObjectHandle::new_signal(
            AdapterId::from_index(0),
            raw,
            HandleMeta::new("x", "tb.x", ObjectKind::Net),
            ValueFormat::Logic,
            1,
        )
        .unwrap();
        assert!(matches!(
            fli.write(&stranger, &Value::BinStr("1".into()), SetAction::Deposit),
            Err(GpiError::UnknownReference { raw: 0x999, .. })
        ));
        assert!(matches!(
            fli.read_binstr(&stranger),
            Err(GpiError::UnknownReference { .. })
        ));
    }

    #[test]
    fn force_and_release() {
        let mut gpi = gpi_over(FliAdapter::new(MockFli::new(sim())));
        let tb = gpi.root(None).unwrap();
        let clk = gpi.handle_by_name(tb, "clk").unwrap();
        gpi.write(clk, &Value::BinStr("1".into()), SetAction::Force)
            .unwrap();
        gpi.write(clk, &Value::BinStr("0".into()), SetAction::Deposit)
            .unwrap();
        assert_eq!(gpi.read_binstr(clk).unwrap(), "1");
        gpi.write(clk, &Value::Int(0), SetAction::Release).unwrap();
        gpi.write(clk, &Value::BinStr("0".into()), SetAction::Deposit)
            .unwrap();
        assert_eq!(gpi.read_binstr(clk).unwrap(), "0");

        let state = gpi.handle_by_name(tb, "state").unwrap();
        gpi.write(state, &Value::Int(3), SetAction::Force).unwrap();
        assert_eq!(gpi.read_long(state).unwrap(), 3);
    }

    #[test]
    fn variables_cannot_be_forced_or_watched() {
        let mut d = Design::new();
        let tb = d.root("tb", Lang::Vhdl);
        d.reg(tb, "v", 4);
        let mut gpi = gpi_over(FliAdapter::new(MockFli::new(Sim::new(d).shared())));
        let tb = gpi.root(None).unwrap();
        assert_eq!(names(&mut gpi, tb), vec!["tb.v"]);
        let v = gpi.handle_by_name(tb, "v").unwrap();
        assert_eq!(gpi.handle(v).unwrap().kind(), ObjectKind::Register);
        gpi.write(v, &Value::BinStr("1010".into()), SetAction::Deposit)
            .unwrap();
        assert_eq!(gpi.read_long(v).unwrap(), 0b1010);
        assert!(matches!(
            gpi.write(v, &Value::BinStr("1111".into()), SetAction::Force),
            Err(GpiError::Unsupported { .. })
        ));
        let watch = gpi.register_callback(
            CallbackKind::ValueChange {
                signal: v,
                edge: Edge::Any,
            },
            Box::new(|| 0),
        );
        assert!(watch.is_err());
    }

    #[test]
    fn timers_reuse_their_process() {
        let sim = sim();
        let (gpi, waker) = installed(FliAdapter::new(MockFli::new(sim.clone())));
        let fired = Rc::new(Cell::new(0));
        let timer = |delay| {
            gpi.borrow_mut()
                .register_callback(CallbackKind::Timer { delay }, counter(&fired))
                .unwrap()
        };

        timer(5);
        assert_eq!(run_until(&sim, 5, |ud| waker.wake(ud)), 1);
        timer(5);
        assert_eq!(run_until(&sim, 10, |ud| waker.wake(ud)), 1);
        assert_eq!(fired.get(), 2);
        assert_eq!(waker.processes(), 1);

        // A removed timer's wakeup is still on its way; its process stays
        // parked until the wakeup arrives.
        let cancelled = timer(10);
        gpi.borrow_mut().remove_callback(cancelled).unwrap();
        timer(15);
        assert_eq!(waker.processes(), 2);
        assert_eq!(run_until(&sim, 30, |ud| waker.wake(ud)), 2);
        assert_eq!(fired.get(), 3);

        timer(5);
        assert_eq!(waker.processes(), 2);
        global::uninstall();
    }

    #[test]
    fn idle_processes_are_bounded() {
        let sim = sim();
        let (gpi, waker) = installed(FliAdapter::new(MockFli::new(sim.clone())).with_timer_pool(1));
        let fired = Rc::new(Cell::new(0));
        for delay in 1..=3 {
            gpi.borrow_mut()
                .register_callback(CallbackKind::Timer { delay }, counter(&fired))
                .unwrap();
        }
        assert_eq!(waker.processes(), 3);
        assert_eq!(run_until(&sim, 10, |ud| waker.wake(ud)), 3);
        assert_eq!(fired.get(), 3);

        // One process was kept; the other two retired.
        gpi.borrow_mut()
            .register_callback(CallbackKind::Timer { delay: 1 }, counter(&fired))
            .unwrap();
        assert_eq!(waker.processes(), 3);
        gpi.borrow_mut()
            .register_callback(CallbackKind::Timer { delay: 1 }, counter(&fired))
            .unwrap();
        assert_eq!(waker.processes(), 4);
        global::uninstall();
    }

    #[test]
    fn rising_edges_until_removed() {
        let sim = sim();
        let (gpi, waker) = installed(FliAdapter::new(MockFli::new(sim.clone())));
        let clk = {
            let mut g = gpi.borrow_mut();
            let tb = g.root(None).unwrap();
            g.handle_by_name(tb, "clk").unwrap()
        };
        let rises = Rc::new(Cell::new(0));
        let watch = gpi
            .borrow_mut()
            .register_callback(
                CallbackKind::ValueChange {
                    signal: clk,
                    edge: Edge::Rising,
                },
                counter(&rises),
            )
            .unwrap();

        let node = clk_node(&sim);
        let mut toggle = |bit: &str| {
            sim.borrow_mut()
                .write(node, NodeValue::Logic(bit.into()), Drive::Deposit)
                .unwrap();
            run_until(&sim, 0, |ud| waker.wake(ud))
        };
        for bit in ["1", "0", "1"] {
            assert_eq!(toggle(bit), 1);
        }
        assert_eq!(rises.get(), 2);

        gpi.borrow_mut().remove_callback(watch).unwrap();
        assert_eq!(toggle("0"), 0);
        assert_eq!(toggle("1"), 0);
        assert_eq!(rises.get(), 2);
        global::uninstall();
    }

    #[test]
    fn phase_callbacks() {
        let sim = sim();
        let (gpi, waker) = installed(FliAdapter::new(MockFli::new(sim.clone())));
        let started = Rc::new(Cell::new(0));
        let ended = Rc::new(Cell::new(0));
        let register = |kind, count: &Rc<Cell<u32>>| {
            gpi.borrow_mut()
                .register_callback(kind, counter(count))
                .unwrap()
        };
        register(CallbackKind::StartOfSim, &started);
        let dropped = register(CallbackKind::StartOfSim, &started);
        register(CallbackKind::EndOfSim, &ended);
        gpi.borrow_mut().remove_callback(dropped).unwrap();

        gpi_testkit::sim::start(&sim, |ud| waker.wake(ud));
        assert_eq!(started.get(), 1);
        assert_eq!(ended.get(), 0);
        gpi_testkit::sim::finish(&sim, |ud| waker.wake(ud));
        assert_eq!(ended.get(), 1);
        global::uninstall();
    }

    #[test]
    fn refused_process_fails_registration() {
        let mut api = MockFli::new(sim());
        api.refuse_processes();
        let mut gpi = gpi_over(FliAdapter::new(api));
        let err = gpi
            .register_callback(CallbackKind::ReadOnly, Box::new(|| 0))
            .unwrap_err();
        assert!(matches!(
            err,
            GpiError::BackendRejected {
                backend: "fli",
                operation: "create_process",
                ..
            }
        ));
    }

    #[test]
    fn tool_identity_and_precision() {
        let sim = Sim::new(fixture::vhdl_design())
            .with_identity("ModelSim DE", "2024.1")
            .with_precision(-12)
            .shared();
        let mut gpi = gpi_over(FliAdapter::new(MockFli::new(sim.clone())));
        let info = gpi.sim_info().unwrap();
        assert_eq!(info.product, "ModelSim DE");
        assert_eq!(info.version, "2024.1");
        assert_eq!(gpi.sim_precision().unwrap(), -12);
        gpi.sim_end().unwrap();
        assert!(sim.borrow().finish_requested());
    }
}
