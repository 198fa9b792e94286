//! [`VhpiAdapter`]: the GPI adapter contract over the VHPI routine set.
//!
//! VHDL objects are classified by their base type: `std_ulogic` and `bit`
//! enumerations (and arrays of them) are logic, `character` arrays are
//! strings, other enumerations are read by position. Records and arrays of
//! anything else are composite objects with children.

use std::collections::HashMap;

use tracing::{debug, warn};

use gpi_core::adapter::{Adapter, ArmRequest, SimInfo};
use gpi_core::callback::CallbackId;
use gpi_core::handle::{AdapterId, Definition, HandleMeta, ObjectHandle, RawRef};
use gpi_core::iter::{IterState, NativeWalk, NextChild, Relation, SubIter};
use gpi_core::kind::{ObjectKind, Range, RangeDirection};
use gpi_core::log::{self, Severity};
use gpi_core::logic::{self, Logic};
use gpi_core::name::{self, Separator};
use gpi_core::value::{terminated_string, SetAction, Value, ValueFormat};
use gpi_core::{GpiError, Result};

use crate::api::{VhpiApi, VhpiValue};
use crate::consts::*;

const BACKEND: &str = "vhpi";
const LOGGER: &str = "gpi.vhpi";

/// Relations walked below an instance, block or generate region.
/// `vhpiInternalRegions` repeats the instances; the traversal drops them.
const REGION_RELATIONS: &[Relation] = &[
    VHPI_SIG_DECLS,
    VHPI_PORT_DECLS,
    VHPI_VAR_DECLS,
    VHPI_CONST_DECLS,
    VHPI_GENERIC_DECLS,
    VHPI_COMP_INST_STMTS,
    VHPI_BLOCK_STMTS,
    VHPI_INTERNAL_REGIONS,
];

/// Enumeration types read and written as logic.
const LOGIC_TYPES: &[&str] = &["STD_ULOGIC", "STD_LOGIC", "BIT"];

/// How values of a VHDL type cross the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeClass {
    Value(ValueFormat),
    Record,
    Array,
}

fn region_kind(kind: i32) -> Option<ObjectKind> {
    match kind {
        VHPI_ROOT_INST_K | VHPI_COMP_INST_STMT_K | VHPI_BLOCK_STMT_K | VHPI_FOR_GENERATE_K
        | VHPI_IF_GENERATE_K => Some(ObjectKind::Module),
        VHPI_PACK_INST_K => Some(ObjectKind::Package),
        _ => None,
    }
}

fn is_object(kind: i32) -> bool {
    matches!(
        kind,
        VHPI_SIG_DECL_K
            | VHPI_PORT_DECL_K
            | VHPI_VAR_DECL_K
            | VHPI_CONST_DECL_K
            | VHPI_GENERIC_DECL_K
            | VHPI_INDEXED_NAME_K
            | VHPI_SELECTED_NAME_K
    )
}

fn is_known(kind: i32) -> bool {
    region_kind(kind).is_some() || is_object(kind)
}

/// Processes and concurrent statements are regions without objects the GPI
/// hands out.
fn is_skipped(kind: i32) -> bool {
    matches!(
        kind,
        VHPI_PROCESS_STMT_K
            | VHPI_SIMPLE_SIG_ASSIGN_STMT_K
            | VHPI_COND_SIG_ASSIGN_STMT_K
            | VHPI_SELECT_SIG_ASSIGN_STMT_K
            | VHPI_CONC_ASSERT_STMT_K
            | VHPI_CONC_PROC_CALL_STMT_K
    )
}

fn severity_of(severity: i32) -> Severity {
    match severity {
        VHPI_NOTE => Severity::Info,
        VHPI_WARNING => Severity::Warning,
        VHPI_ERROR => Severity::Error,
        VHPI_FAILURE | VHPI_SYSTEM | VHPI_INTERNAL => Severity::Critical,
        _ => Severity::Debug,
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

/// Some simulators report generate blocks as `gen(3)`; GPI names use
/// brackets throughout.
fn normalize_name(raw: &str) -> String {
    let leaf = raw.rsplit(['.', ':']).next().unwrap_or(raw);
    match (leaf.rfind('('), leaf.ends_with(')')) {
        (Some(open), true) => format!("{}[{}]", &leaf[..open], &leaf[open + 1..leaf.len() - 1]),
        _ => leaf.to_string(),
    }
}

fn value_format_code(format: ValueFormat) -> i32 {
    match format {
        ValueFormat::Logic => VHPI_LOGIC_VAL,
        ValueFormat::LogicVec => VHPI_LOGIC_VEC_VAL,
        ValueFormat::Enum => VHPI_ENUM_VAL,
        ValueFormat::EnumVec => VHPI_ENUM_VEC_VAL,
        ValueFormat::Int => VHPI_INT_VAL,
        ValueFormat::Real => VHPI_REAL_VAL,
        ValueFormat::Str => VHPI_STR_VAL,
        ValueFormat::Char => VHPI_CHAR_VAL,
    }
}

/// `std_ulogic` positions of a binary string.
fn logic_positions(bits: &str) -> Result<Vec<u8>> {
    Ok(logic::parse_binstr(bits)?
        .into_iter()
        .map(Logic::std_logic_pos)
        .collect())
}

/// Power-of-ten exponent of a resolution given in femtoseconds.
fn precision_exponent(femtoseconds: i64) -> i32 {
    let mut value = femtoseconds.max(1);
    let mut exponent = -15;
    while value >= 10 && value % 10 == 0 {
        value /= 10;
        exponent += 1;
    }
    exponent
}

pub struct VhpiAdapter<A> {
    api: A,
    id: AdapterId,
    /// Live callback registrations and their reasons.
    registrations: HashMap<RawRef, i32>,
}

impl<A: VhpiApi> VhpiAdapter<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            id: AdapterId::from_index(0),
            registrations: HashMap::new(),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn api_mut(&mut self) -> &mut A {
        &mut self.api
    }

    /// Number of native callback registrations still outstanding.
    pub fn armed(&self) -> usize {
        self.registrations.len()
    }

    // ---- Native call wrappers ----

    fn poll(&mut self) -> Option<(Severity, String)> {
        let diag = self.api.check_error()?;
        let severity = severity_of(diag.severity);
        log::native_diagnostic(
            LOGGER,
            severity,
            &diag.message,
            diag.file.as_deref(),
            diag.line,
        );
        Some((severity, diag.message))
    }

    fn check(&mut self, operation: &'static str) -> Result<()> {
        match self.poll() {
            Some((severity, message)) if severity >= Severity::Error => {
                Err(GpiError::rejected(BACKEND, operation, message))
            }
            _ => Ok(()),
        }
    }

    fn get(&mut self, property: i32, obj: RawRef) -> i32 {
        let value = self.api.get(property, obj);
        self.poll();
        value
    }

    fn get_str(&mut self, property: i32, obj: RawRef) -> Option<String> {
        let value = self.api.get_str(property, obj);
        self.poll();
        value
    }

    fn related(&mut self, relation: i32, obj: Option<RawRef>) -> Option<RawRef> {
        let raw = self.api.handle(relation, obj);
        self.poll();
        raw
    }

    fn lookup(&mut self, name: &str, scope: Option<RawRef>) -> Option<RawRef> {
        let raw = self.api.handle_by_name(name, scope);
        self.poll();
        raw
    }

    /// Child of a scope owned by another adapter, found by its full name
    /// with no scope handle.
    fn by_path(&mut self, parent: &ObjectHandle, name: &str) -> Result<Option<ObjectHandle>> {
        if parent.is_pseudo() {
            return Ok(None);
        }
        let full = name::join(parent.full_name(), name, separator_for(parent.kind()));
        let Some(raw) = self.lookup(&full, None) else {
            return Ok(None);
        };
        let child = self.name_of(raw).unwrap_or_else(|| normalize_name(name));
        self.create(raw, &child, full).map(Some)
    }

    fn iterator(&mut self, relation: i32, parent: RawRef) -> Option<RawRef> {
        let iterator = self.api.iterator(relation, parent);
        self.poll();
        iterator
    }

    fn next_in(&mut self, iterator: RawRef) -> Option<RawRef> {
        let obj = self.api.scan(iterator);
        self.poll();
        obj
    }

    fn free(&mut self, obj: RawRef) {
        self.api.release_handle(obj);
        self.poll();
    }

    /// Name as the GPI spells it.
    fn name_of(&mut self, obj: RawRef) -> Option<String> {
        let name = self
            .get_str(VHPI_CASE_NAME_P, obj)
            .or_else(|| self.get_str(VHPI_NAME_P, obj))?;
        Some(normalize_name(&name))
    }

    // ---- Types ----

    fn is_logic_type(&mut self, ty: RawRef) -> bool {
        self.get_str(VHPI_NAME_P, ty)
            .is_some_and(|n| LOGIC_TYPES.contains(&n.to_ascii_uppercase().as_str()))
    }

    fn is_character_type(&mut self, ty: RawRef) -> bool {
        self.get_str(VHPI_NAME_P, ty)
            .is_some_and(|n| n.eq_ignore_ascii_case("character"))
    }

    /// Classify an enumeration type used as a scalar or array element.
    fn enum_class(&mut self, ty: RawRef, vector: bool) -> ValueFormat {
        match (self.is_logic_type(ty), self.is_character_type(ty), vector) {
            (true, _, false) => ValueFormat::Logic,
            (true, _, true) => ValueFormat::LogicVec,
            (_, true, false) => ValueFormat::Char,
            (_, true, true) => ValueFormat::Str,
            (_, _, false) => ValueFormat::Enum,
            (_, _, true) => ValueFormat::EnumVec,
        }
    }

    fn type_class(&mut self, obj: RawRef) -> Option<TypeClass> {
        let subtype = self.related(VHPI_TYPE, Some(obj))?;
        let base = self.related(VHPI_BASE_TYPE, Some(subtype));
        self.free(subtype);
        let base = base?;
        let class = match self.get(VHPI_KIND_P, base) {
            VHPI_ENUM_TYPE_DECL_K => Some(TypeClass::Value(self.enum_class(base, false))),
            VHPI_INT_TYPE_DECL_K => Some(TypeClass::Value(ValueFormat::Int)),
            VHPI_FLOAT_TYPE_DECL_K => Some(TypeClass::Value(ValueFormat::Real)),
            VHPI_RECORD_TYPE_DECL_K => Some(TypeClass::Record),
            VHPI_ARRAY_TYPE_DECL_K => match self.related(VHPI_ELEM_TYPE, Some(base)) {
                Some(elem) => {
                    let class = if self.get(VHPI_KIND_P, elem) == VHPI_ENUM_TYPE_DECL_K {
                        TypeClass::Value(self.enum_class(elem, true))
                    } else {
                        TypeClass::Array
                    };
                    self.free(elem);
                    Some(class)
                }
                None => Some(TypeClass::Array),
            },
            _ => None,
        };
        self.free(base);
        class
    }

    /// Index constraint of an object's subtype.
    fn range_of(&mut self, obj: RawRef) -> Option<Range> {
        let subtype = self.related(VHPI_TYPE, Some(obj))?;
        let constraint = self.api.handle_by_index(VHPI_CONSTRAINTS, subtype, 0);
        self.poll();
        self.free(subtype);
        let constraint = constraint?;
        let left = i64::from(self.get(VHPI_LEFT_BOUND_P, constraint));
        let right = i64::from(self.get(VHPI_RIGHT_BOUND_P, constraint));
        let direction = if self.get(VHPI_IS_UP_P, constraint) == 1 {
            RangeDirection::Ascending
        } else {
            RangeDirection::Descending
        };
        self.free(constraint);
        Some(Range::with_direction(left, right, direction))
    }

    fn definition(&mut self, region: RawRef) -> Option<Definition> {
        let unit = self.related(VHPI_DESIGN_UNIT, Some(region))?;
        let name = self.get_str(VHPI_UNIT_NAME_P, unit);
        let file = self.get_str(VHPI_FILE_NAME_P, unit);
        self.free(unit);
        Some(Definition { name: name?, file })
    }

    // ---- Handle construction ----

    /// Wrap `raw` in a handle. The caller keeps ownership of `raw` on
    /// failure.
    fn build(&mut self, raw: RawRef, name: &str, full_name: String) -> Result<ObjectHandle> {
        let kind = self.get(VHPI_KIND_P, raw);
        if let Some(object_kind) = region_kind(kind) {
            let definition = self.definition(raw);
            let meta = HandleMeta::new(name, full_name, object_kind).with_definition(definition);
            return Ok(ObjectHandle::object(self.id, raw, meta));
        }
        if !is_object(kind) {
            return Err(GpiError::unsupported(format!(
                "{full_name}: VHPI object kind {kind}"
            )));
        }

        let class = self
            .type_class(raw)
            .ok_or_else(|| GpiError::unsupported(format!("{full_name}: unknown VHDL type")))?;
        let is_const = matches!(kind, VHPI_CONST_DECL_K | VHPI_GENERIC_DECL_K);
        let format = match class {
            TypeClass::Value(format) => format,
            TypeClass::Record => {
                let meta = HandleMeta::new(name, full_name, ObjectKind::Struct).constant(is_const);
                return Ok(ObjectHandle::object(self.id, raw, meta));
            }
            TypeClass::Array => {
                let mut meta =
                    HandleMeta::new(name, full_name, ObjectKind::Array).constant(is_const);
                if let Some(range) = self.range_of(raw) {
                    meta = meta.with_range(range);
                }
                return Ok(ObjectHandle::object(self.id, raw, meta));
            }
        };

        let object_kind = match format {
            ValueFormat::Logic | ValueFormat::LogicVec if kind == VHPI_VAR_DECL_K => {
                ObjectKind::Register
            }
            ValueFormat::Logic | ValueFormat::LogicVec => ObjectKind::Net,
            ValueFormat::Enum | ValueFormat::EnumVec => ObjectKind::Enum,
            ValueFormat::Int => ObjectKind::Integer,
            ValueFormat::Real => ObjectKind::Real,
            ValueFormat::Str | ValueFormat::Char => ObjectKind::String,
        };
        let mut meta = HandleMeta::new(name, full_name, object_kind).constant(is_const);
        if matches!(
            format,
            ValueFormat::LogicVec | ValueFormat::EnumVec | ValueFormat::Str
        ) {
            if let Some(range) = self.range_of(raw) {
                meta = meta.with_range(range);
            }
        }
        let width = usize::try_from(self.get(VHPI_SIZE_P, raw)).unwrap_or(0);
        ObjectHandle::new_signal(self.id, raw, meta, format, width)
    }

    fn create(&mut self, raw: RawRef, name: &str, full_name: String) -> Result<ObjectHandle> {
        match self.build(raw, name, full_name) {
            Ok(handle) => Ok(handle),
            Err(err) => {
                self.free(raw);
                Err(err)
            }
        }
    }

    /// Whether `region` holds for-generate blocks labelled `label`.
    fn has_generate_blocks(&mut self, region: RawRef, label: &str) -> bool {
        let Some(iterator) = self.iterator(VHPI_INTERNAL_REGIONS, region) else {
            return false;
        };
        while let Some(obj) = self.next_in(iterator) {
            let found = self.get(VHPI_KIND_P, obj) == VHPI_FOR_GENERATE_K
                && self
                    .name_of(obj)
                    .is_some_and(|n| name::matches_generate_label(&n, label));
            self.free(obj);
            if found {
                self.free(iterator);
                return true;
            }
        }
        false
    }

    fn read(&mut self, handle: &ObjectHandle, format: i32) -> Result<VhpiValue> {
        let value = self.api.get_value(handle.raw(), format);
        self.check("get_value")?;
        value.ok_or_else(|| {
            GpiError::rejected(
                BACKEND,
                "get_value",
                format!("no value for {}", handle.full_name()),
            )
        })
    }
}

fn unexpected(handle: &ObjectHandle, got: &VhpiValue) -> GpiError {
    GpiError::rejected(
        BACKEND,
        "get_value",
        format!("unexpected value {got:?} for {}", handle.full_name()),
    )
}

impl<A: VhpiApi> NativeWalk for VhpiAdapter<A> {
    fn open(&mut self, parent: RawRef, relation: Relation) -> Option<SubIter> {
        self.iterator(relation, parent).map(SubIter::Native)
    }

    fn scan(&mut self, sub: &mut SubIter) -> Option<RawRef> {
        match sub {
            SubIter::Native(iterator) => self.next_in(*iterator),
            SubIter::Buffered(queue) => queue.pop_front(),
        }
    }

    fn close(&mut self, sub: SubIter) {
        if let SubIter::Native(iterator) = sub {
            self.free(iterator);
        }
    }
}

impl<A: VhpiApi> Adapter for VhpiAdapter<A> {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn attach(&mut self, id: AdapterId) {
        self.id = id;
    }

    fn sim_info(&mut self) -> SimInfo {
        let Some(tool) = self.related(VHPI_TOOL, None) else {
            return SimInfo::default();
        };
        let info = SimInfo {
            product: self.get_str(VHPI_NAME_P, tool).unwrap_or_default(),
            version: self.get_str(VHPI_TOOL_VERSION_P, tool).unwrap_or_default(),
        };
        self.free(tool);
        info
    }

    fn root(&mut self, name: Option<&str>) -> Result<Option<ObjectHandle>> {
        let Some(root) = self.related(VHPI_ROOT_INST, None) else {
            return Ok(None);
        };
        let found = self.name_of(root).unwrap_or_default();
        if let Some(requested) = name {
            if !requested.eq_ignore_ascii_case(&found) {
                self.free(root);
                return Err(GpiError::RootMismatch {
                    requested: requested.to_string(),
                    found,
                });
            }
        }
        self.create(root, &found, found.clone()).map(Some)
    }

    fn by_name(&mut self, parent: &ObjectHandle, name: &str) -> Result<Option<ObjectHandle>> {
        if parent.adapter() != self.id {
            return self.by_path(parent, name);
        }
        if parent.is_pseudo() {
            if !name::matches_generate_label(name, parent.name()) {
                return Ok(None);
            }
            let Some(raw) = self.lookup(name, Some(parent.raw())) else {
                return Ok(None);
            };
            let full = name::join(parent.full_name(), name, Separator::Index);
            return self.create(raw, name, full).map(Some);
        }

        if let Some(raw) = self.lookup(name, Some(parent.raw())) {
            let child = self.name_of(raw).unwrap_or_else(|| normalize_name(name));
            let full = name::join(parent.full_name(), name, separator_for(parent.kind()));
            return self.create(raw, &child, full).map(Some);
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
            let block = name::indexed(parent.name(), index);
            let Some(raw) = self.lookup(&block, Some(parent.raw())) else {
                return Ok(None);
            };
            let full = name::indexed(parent.full_name(), index);
            return self.create(raw, &block, full).map(Some);
        }

        // VHPI indexes by position from the left bound.
        let Some(offset) = parent.meta().range.and_then(|r| r.offset_of(index)) else {
            return Ok(None);
        };
        let Ok(offset) = i32::try_from(offset) else {
            return Ok(None);
        };
        let raw = self
            .api
            .handle_by_index(VHPI_INDEXED_NAMES, parent.raw(), offset);
        self.poll();
        let Some(raw) = raw else {
            return Ok(None);
        };
        let child = name::indexed(parent.name(), index);
        let full = name::indexed(parent.full_name(), index);
        self.create(raw, &child, full).map(Some)
    }

    fn by_raw(&mut self, parent: &ObjectHandle, raw: RawRef) -> Result<Option<ObjectHandle>> {
        if !is_known(self.get(VHPI_KIND_P, raw)) {
            return Ok(None);
        }
        let Some(leaf) = self.name_of(raw) else {
            return Ok(None);
        };
        self.by_path(parent, &leaf)
    }

    fn iterate(&mut self, parent: &ObjectHandle) -> Result<Option<IterState>> {
        if parent.is_pseudo() {
            return Ok(Some(IterState::new(parent, vec![VHPI_INTERNAL_REGIONS])));
        }
        let relations: &[Relation] = match parent.kind() {
            ObjectKind::Module | ObjectKind::Package => REGION_RELATIONS,
            ObjectKind::Struct => &[VHPI_SELECTED_NAMES],
            ObjectKind::Array => &[VHPI_INDEXED_NAMES],
            _ => match parent.signal().map(|s| s.format()) {
                Some(ValueFormat::LogicVec | ValueFormat::EnumVec) => &[VHPI_INDEXED_NAMES],
                _ => return Ok(None),
            },
        };
        Ok(Some(IterState::new(parent, relations.to_vec())))
    }

    fn next_child(&mut self, state: &mut IterState) -> Result<NextChild> {
        loop {
            let Some(raw) = state.next_raw(self) else {
                return Ok(NextChild::End);
            };
            let kind = self.get(VHPI_KIND_P, raw);
            let in_pseudo = state.pseudo_label().is_some();
            if is_skipped(kind) || (in_pseudo && kind != VHPI_FOR_GENERATE_K) {
                self.free(raw);
                continue;
            }
            if !is_known(kind) {
                return Ok(NextChild::Foreign(raw));
            }
            let Some(leaf) = self.name_of(raw) else {
                self.free(raw);
                return Ok(NextChild::Unnamed);
            };

            if in_pseudo {
                if !state.accepts(&leaf) {
                    self.free(raw);
                    continue;
                }
                let full = name::join(state.parent_full_name(), &leaf, Separator::Index);
                return self.create(raw, &leaf, full).map(NextChild::Native);
            }

            if kind == VHPI_FOR_GENERATE_K
                && state.parent_kind() != ObjectKind::GenArray
                && name::index_suffix(&leaf).is_some()
            {
                let label = name::generate_label(&leaf).to_string();
                self.free(raw);
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
            match self.create(raw, &leaf, full) {
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

    fn release(&mut self, raw: RawRef) {
        self.free(raw);
    }

    fn read_binstr(&mut self, handle: &ObjectHandle) -> Result<String> {
        match self.read(handle, VHPI_BIN_STR_VAL)? {
            VhpiValue::BinStr(bits) => Ok(bits),
            other => Err(unexpected(handle, &other)),
        }
    }

    fn read_str(&mut self, handle: &ObjectHandle) -> Result<Vec<u8>> {
        let char_format = handle
            .signal()
            .is_some_and(|s| s.format() == ValueFormat::Char);
        let format = if char_format {
            VHPI_CHAR_VAL
        } else {
            VHPI_STR_VAL
        };
        match self.read(handle, format)? {
            VhpiValue::Str(bytes) => Ok(bytes),
            VhpiValue::Char(c) => Ok(vec![c]),
            other => Err(unexpected(handle, &other)),
        }
    }

    fn read_real(&mut self, handle: &ObjectHandle) -> Result<f64> {
        match self.read(handle, VHPI_REAL_VAL)? {
            VhpiValue::Real(v) => Ok(v),
            other => Err(unexpected(handle, &other)),
        }
    }

    fn read_long(&mut self, handle: &ObjectHandle) -> Result<i64> {
        let format = handle.require_signal()?.format();
        match format {
            ValueFormat::Logic | ValueFormat::LogicVec => {
                let bits = self.read_binstr(handle)?;
                logic::binstr_to_int(&bits)
            }
            ValueFormat::Enum => match self.read(handle, VHPI_ENUM_VAL)? {
                VhpiValue::Enum(pos) => Ok(i64::from(pos)),
                other => Err(unexpected(handle, &other)),
            },
            ValueFormat::Char => match self.read(handle, VHPI_CHAR_VAL)? {
                VhpiValue::Char(c) => Ok(i64::from(c)),
                other => Err(unexpected(handle, &other)),
            },
            _ => match self.read(handle, VHPI_INT_VAL)? {
                VhpiValue::Int(v) => Ok(i64::from(v)),
                other => Err(unexpected(handle, &other)),
            },
        }
    }

    fn write(&mut self, handle: &ObjectHandle, value: &Value, action: SetAction) -> Result<()> {
        let signal = handle.require_signal()?;
        let format = signal.format();
        let width = signal.width();
        let out_of_range = |v: i64| {
            GpiError::invalid_value(format!("{v} is out of range for {}", handle.full_name()))
        };
        let native = match (value, format) {
            (Value::BinStr(bits), ValueFormat::Logic) => {
                let positions = logic_positions(bits)?;
                VhpiValue::Logic(positions.first().copied().unwrap_or(0))
            }
            (Value::BinStr(bits), ValueFormat::LogicVec) => {
                VhpiValue::LogicVec(logic_positions(bits)?)
            }
            (Value::Int(v), ValueFormat::Logic) => {
                let bits = logic::int_to_binstr(*v, 1);
                VhpiValue::Logic(logic_positions(&bits)?.first().copied().unwrap_or(0))
            }
            (Value::Int(v), ValueFormat::LogicVec) => {
                VhpiValue::LogicVec(logic_positions(&logic::int_to_binstr(*v, width))?)
            }
            (Value::Int(v), ValueFormat::Enum) => {
                VhpiValue::Enum(u32::try_from(*v).map_err(|_| out_of_range(*v))?)
            }
            (Value::Int(v), ValueFormat::Int) => {
                VhpiValue::Int(i32::try_from(*v).map_err(|_| out_of_range(*v))?)
            }
            (Value::Int(v), ValueFormat::Char) => {
                VhpiValue::Char(u8::try_from(*v).map_err(|_| out_of_range(*v))?)
            }
            (Value::Real(v), ValueFormat::Real) => VhpiValue::Real(*v),
            // Fixed-length: truncate or pad, then terminate.
            (Value::Str(bytes), ValueFormat::Str) => {
                VhpiValue::Str(terminated_string(bytes, width))
            }
            (Value::Str(bytes), ValueFormat::Char) if bytes.len() == 1 => {
                VhpiValue::Char(bytes[0])
            }
            _ => {
                return Err(GpiError::invalid_value(format!(
                    "cannot write {} to {} ({format:?})",
                    value.type_name(),
                    handle.full_name()
                )))
            }
        };

        let (native, mode) = match action {
            SetAction::Deposit => (native, VHPI_DEPOSIT_PROPAGATE),
            SetAction::NoDelay => (native, VHPI_DEPOSIT),
            SetAction::Force => (native, VHPI_FORCE_PROPAGATE),
            SetAction::Release => (self.read(handle, value_format_code(format))?, VHPI_RELEASE),
        };
        self.api.put_value(handle.raw(), &native, mode);
        self.check("put_value")
    }

    fn arm(&mut self, token: CallbackId, request: ArmRequest<'_>) -> Result<RawRef> {
        let (reason, obj, delay) = match request {
            ArmRequest::ValueChange(handle) => (VHPI_CB_VALUE_CHANGE, Some(handle.raw()), 0),
            ArmRequest::Timer(delay) => (VHPI_CB_AFTER_DELAY, None, delay),
            ArmRequest::ReadWrite => (VHPI_CB_END_OF_PROCESSES, None, 0),
            ArmRequest::ReadOnly => (VHPI_CB_LAST_KNOWN_DELTA_CYCLE, None, 0),
            ArmRequest::NextTimeStep => (VHPI_CB_NEXT_TIME_STEP, None, 0),
            ArmRequest::StartOfSim => (VHPI_CB_START_OF_SIMULATION, None, 0),
            ArmRequest::EndOfSim => (VHPI_CB_END_OF_SIMULATION, None, 0),
        };
        let registration = self.api.register_cb(reason, obj, delay, token.raw());
        if let Err(err) = self.check("register_cb") {
            if let Some(registration) = registration {
                self.api.remove_cb(registration);
                self.poll();
            }
            return Err(err);
        }
        let registration = registration.ok_or_else(|| {
            GpiError::rejected(
                BACKEND,
                "register_cb",
                format!("{} refused", reason_name(reason)),
            )
        })?;
        self.registrations.insert(registration, reason);
        Ok(registration)
    }

    fn disarm(&mut self, registration: RawRef, fired: bool) -> Result<()> {
        if fired {
            self.registrations.remove(&registration);
            self.free(registration);
            return Ok(());
        }
        let reason = self.registrations.get(&registration).copied().unwrap_or(0);
        let removed = self.api.remove_cb(registration);
        self.check("remove_cb")?;
        if !removed {
            return Err(GpiError::rejected(
                BACKEND,
                "remove_cb",
                format!("{} registration is not live", reason_name(reason)),
            ));
        }
        self.registrations.remove(&registration);
        Ok(())
    }

    fn sim_time(&mut self) -> u64 {
        let now = self.api.sim_time();
        self.poll();
        now
    }

    fn sim_precision(&mut self) -> i32 {
        let limit = self.api.get_phys(VHPI_RESOLUTION_LIMIT_P, None);
        self.poll();
        precision_exponent(limit)
    }

    fn finish(&mut self) {
        self.api.finish();
        self.poll();
    }
}
