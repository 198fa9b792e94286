//! [`VpiAdapter`]: the GPI adapter contract over the VPI routine set.
//!
//! Every VPI call is followed by a `vpi_chk_error` poll; diagnostics are
//! logged at the severity the simulator reported, and an error-level
//! diagnostic after a read or write fails that operation.

use std::collections::HashMap;

use tracing::{debug, warn};

use gpi_core::adapter::{Adapter, ArmRequest, SimInfo};
use gpi_core::callback::CallbackId;
use gpi_core::handle::{AdapterId, Definition, HandleMeta, ObjectHandle, RawRef};
use gpi_core::iter::{IterState, NativeWalk, NextChild, Relation, SubIter};
use gpi_core::kind::{ObjectKind, Range};
use gpi_core::log::{self, Severity};
use gpi_core::logic;
use gpi_core::name::{self, Separator};
use gpi_core::value::{SetAction, Value, ValueFormat};
use gpi_core::{GpiError, Result};

use crate::api::{VpiApi, VpiValue};
use crate::consts::*;

const BACKEND: &str = "vpi";
const LOGGER: &str = "gpi.vpi";

/// Relations walked below a module, interface or generate scope. Some
/// overlap (`vpiVariables` covers `vpiIntegerVar`); the traversal drops
/// the repeats.
const MODULE_RELATIONS: &[Relation] = &[
    VPI_NET,
    VPI_NET_ARRAY,
    VPI_REG,
    VPI_REG_ARRAY,
    VPI_MEMORY,
    VPI_INTEGER_VAR,
    VPI_REAL_VAR,
    VPI_STRUCT_VAR,
    VPI_VARIABLES,
    VPI_PARAMETER,
    VPI_MODULE,
    VPI_GEN_SCOPE_ARRAY,
    VPI_INTERNAL_SCOPE,
];

const PACKAGE_RELATIONS: &[Relation] = &[VPI_PARAMETER, VPI_NET, VPI_REG, VPI_VARIABLES];

/// GPI view of a native object type.
#[derive(Debug, Clone, Copy)]
struct Class {
    kind: ObjectKind,
    format: Option<ValueFormat>,
    is_const: bool,
}

fn classify(vpi_type: i32) -> Option<Class> {
    let object = |kind| Class {
        kind,
        format: None,
        is_const: false,
    };
    let signal = |kind, format| Class {
        kind,
        format: Some(format),
        is_const: false,
    };
    let class = match vpi_type {
        VPI_MODULE | VPI_INTERFACE | VPI_GEN_SCOPE | VPI_NAMED_BEGIN | VPI_NAMED_FORK => {
            object(ObjectKind::Module)
        }
        VPI_NET | VPI_NET_BIT => signal(ObjectKind::Net, ValueFormat::LogicVec),
        VPI_REG | VPI_REG_BIT | VPI_MEMORY_WORD | VPI_BIT_VAR => {
            signal(ObjectKind::Register, ValueFormat::LogicVec)
        }
        VPI_INTEGER_VAR | VPI_INT_VAR | VPI_LONG_INT_VAR | VPI_SHORT_INT_VAR | VPI_BYTE_VAR => {
            signal(ObjectKind::Integer, ValueFormat::Int)
        }
        VPI_ENUM_VAR => signal(ObjectKind::Enum, ValueFormat::Int),
        VPI_REAL_VAR | VPI_SHORT_REAL_VAR => signal(ObjectKind::Real, ValueFormat::Real),
        VPI_STRING_VAR => signal(ObjectKind::String, ValueFormat::Str),
        // Refined from vpiConstType once the object is in hand.
        VPI_PARAMETER | VPI_CONSTANT => Class {
            kind: ObjectKind::Integer,
            format: Some(ValueFormat::LogicVec),
            is_const: true,
        },
        VPI_NET_ARRAY | VPI_REG_ARRAY | VPI_MEMORY => object(ObjectKind::Array),
        VPI_STRUCT_VAR | VPI_STRUCT_NET | VPI_UNION_VAR => object(ObjectKind::Struct),
        VPI_GEN_SCOPE_ARRAY => object(ObjectKind::GenArray),
        VPI_PACKAGE => object(ObjectKind::Package),
        _ => return None,
    };
    Some(class)
}

/// Processes and assignments show up in scope relations but are not
/// objects the GPI hands out.
fn is_skipped(vpi_type: i32) -> bool {
    matches!(
        vpi_type,
        VPI_ALWAYS | VPI_INITIAL | VPI_CONT_ASSIGN | VPI_ASSIGN_STMT
    )
}

fn is_scope_type(vpi_type: i32) -> bool {
    matches!(
        vpi_type,
        VPI_MODULE | VPI_INTERFACE | VPI_GEN_SCOPE | VPI_NAMED_BEGIN | VPI_NAMED_FORK
    )
}

fn severity_of(level: i32) -> Severity {
    match level {
        VPI_WARNING => Severity::Warning,
        VPI_ERROR => Severity::Error,
        VPI_SYSTEM | VPI_INTERNAL => Severity::Critical,
        _ => Severity::Info,
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

/// Some simulators report `vpiName` with the enclosing path.
fn leaf_name(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

fn value_format_code(format: ValueFormat) -> i32 {
    match format {
        ValueFormat::Logic | ValueFormat::LogicVec => VPI_BIN_STR_VAL,
        ValueFormat::Real => VPI_REAL_VAL,
        ValueFormat::Str => VPI_STRING_VAL,
        ValueFormat::Int | ValueFormat::Enum | ValueFormat::EnumVec | ValueFormat::Char => {
            VPI_INT_VAL
        }
    }
}

pub struct VpiAdapter<A> {
    api: A,
    id: AdapterId,
    /// Live callback registrations and their reasons.
    registrations: HashMap<RawRef, i32>,
}

impl<A: VpiApi> VpiAdapter<A> {
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

    /// Drain the simulator's error state into the log.
    fn poll(&mut self) -> Option<(Severity, String)> {
        let diag = self.api.chk_error()?;
        let severity = severity_of(diag.level);
        log::native_diagnostic(
            LOGGER,
            severity,
            &diag.message,
            diag.file.as_deref(),
            diag.line,
        );
        Some((severity, diag.message))
    }

    /// Poll, failing `operation` on an error-level diagnostic.
    fn check(&mut self, operation: &'static str) -> Result<()> {
        match self.poll() {
            Some((severity, message)) if severity >= Severity::Error => {
                Err(GpiError::rejected(BACKEND, operation, message))
            }
            _ => Ok(()),
        }
    }

    fn get(&mut self, property: i32, obj: Option<RawRef>) -> i32 {
        let value = self.api.get(property, obj);
        self.poll();
        value
    }

    fn get_str(&mut self, property: i32, obj: RawRef) -> Option<String> {
        let value = self.api.get_str(property, obj);
        self.poll();
        value
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
        let child = self
            .get_str(VPI_NAME, raw)
            .map(|n| leaf_name(&n).to_string())
            .unwrap_or_else(|| leaf_name(name).to_string());
        self.create(raw, &child, full).map(Some)
    }

    fn iterate_raw(&mut self, relation: i32, parent: Option<RawRef>) -> Option<RawRef> {
        let iterator = self.api.iterate(relation, parent);
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

    fn bound(&mut self, relation: i32, obj: RawRef) -> Option<i64> {
        let expr = self.api.handle(relation, obj);
        self.poll();
        let expr = expr?;
        let value = self.api.get_value(expr, VPI_INT_VAL);
        self.poll();
        self.free(expr);
        match value? {
            VpiValue::Int(v) => Some(i64::from(v)),
            _ => None,
        }
    }

    fn range_of(&mut self, obj: RawRef) -> Option<Range> {
        let left = self.bound(VPI_LEFT_RANGE, obj)?;
        let right = self.bound(VPI_RIGHT_RANGE, obj)?;
        Some(Range::from_bounds(left, right))
    }

    fn definition(&mut self, obj: RawRef) -> Option<Definition> {
        let name = self.get_str(VPI_DEF_NAME, obj)?;
        let file = self.get_str(VPI_DEF_FILE, obj);
        Some(Definition { name, file })
    }

    // ---- Handle construction ----

    /// Wrap `raw` in a handle. The caller keeps ownership of `raw` on
    /// failure.
    fn build(&mut self, raw: RawRef, name: &str, full_name: String) -> Result<ObjectHandle> {
        let vpi_type = self.get(VPI_TYPE, Some(raw));
        let mut class = classify(vpi_type).ok_or_else(|| {
            GpiError::unsupported(format!("{full_name}: VPI object type {vpi_type}"))
        })?;
        if class.is_const {
            let (kind, format) = match self.get(VPI_CONST_TYPE, Some(raw)) {
                VPI_REAL_CONST => (ObjectKind::Real, ValueFormat::Real),
                VPI_STRING_CONST => (ObjectKind::String, ValueFormat::Str),
                _ => (ObjectKind::Integer, ValueFormat::LogicVec),
            };
            class.kind = kind;
            class.format = Some(format);
        }

        let mut meta = HandleMeta::new(name, full_name, class.kind).constant(class.is_const);
        if class.kind == ObjectKind::Module {
            let definition = self.definition(raw);
            meta = meta.with_definition(definition);
        }

        let Some(format) = class.format else {
            if matches!(class.kind, ObjectKind::Array | ObjectKind::GenArray) {
                match self.range_of(raw) {
                    Some(range) => meta = meta.with_range(range),
                    None => {
                        let size = self.get(VPI_SIZE, Some(raw));
                        meta = meta.with_elems(usize::try_from(size).unwrap_or(0));
                        meta.indexable = true;
                    }
                }
            }
            return Ok(ObjectHandle::object(self.id, raw, meta));
        };

        let width = usize::try_from(self.get(VPI_SIZE, Some(raw))).unwrap_or(0);
        let format = match format {
            ValueFormat::LogicVec if width == 1 && !class.is_const => ValueFormat::Logic,
            other => other,
        };
        // SystemVerilog strings are dynamic; an empty one still has a value.
        let width = if format == ValueFormat::Str {
            width.max(1)
        } else {
            width
        };
        if format == ValueFormat::LogicVec && !class.is_const {
            if let Some(range) = self.range_of(raw) {
                meta = meta.with_range(range);
            }
        }
        ObjectHandle::new_signal(self.id, raw, meta, format, width)
    }

    /// [`Self::build`], freeing `raw` on failure.
    fn create(&mut self, raw: RawRef, name: &str, full_name: String) -> Result<ObjectHandle> {
        match self.build(raw, name, full_name) {
            Ok(handle) => Ok(handle),
            Err(err) => {
                self.free(raw);
                Err(err)
            }
        }
    }

    /// Whether `scope` holds generate blocks labelled `label`.
    fn has_generate_blocks(&mut self, scope: RawRef, label: &str) -> bool {
        let Some(iterator) = self.iterate_raw(VPI_INTERNAL_SCOPE, Some(scope)) else {
            return false;
        };
        while let Some(obj) = self.next_in(iterator) {
            let found = self.get(VPI_TYPE, Some(obj)) == VPI_GEN_SCOPE
                && self
                    .get_str(VPI_NAME, obj)
                    .is_some_and(|n| name::matches_generate_label(&n, label));
            self.free(obj);
            if found {
                self.free(iterator);
                return true;
            }
        }
        false
    }

    fn read(&mut self, handle: &ObjectHandle, format: i32) -> Result<VpiValue> {
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

fn unexpected(handle: &ObjectHandle, got: &VpiValue) -> GpiError {
    GpiError::rejected(
        BACKEND,
        "get_value",
        format!("unexpected value {got:?} for {}", handle.full_name()),
    )
}

impl<A: VpiApi> NativeWalk for VpiAdapter<A> {
    fn open(&mut self, parent: RawRef, relation: Relation) -> Option<SubIter> {
        self.iterate_raw(relation, Some(parent)).map(SubIter::Native)
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

impl<A: VpiApi> Adapter for VpiAdapter<A> {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn attach(&mut self, id: AdapterId) {
        self.id = id;
    }

    fn sim_info(&mut self) -> SimInfo {
        self.api.info()
    }

    fn root(&mut self, name: Option<&str>) -> Result<Option<ObjectHandle>> {
        let Some(iterator) = self.iterate_raw(VPI_MODULE, None) else {
            return Ok(None);
        };
        let Some(top) = self.next_in(iterator) else {
            return Ok(None);
        };
        // Only the first toplevel is used.
        self.free(iterator);

        let found = self.get_str(VPI_NAME, top).unwrap_or_default();
        if let Some(requested) = name {
            if requested != found {
                self.free(top);
                return Err(GpiError::RootMismatch {
                    requested: requested.to_string(),
                    found,
                });
            }
        }
        self.create(top, &found, found.clone()).map(Some)
    }

    fn packages(&mut self) -> Result<Vec<ObjectHandle>> {
        let mut packages = Vec::new();
        let Some(iterator) = self.iterate_raw(VPI_PACKAGE, None) else {
            return Ok(packages);
        };
        while let Some(raw) = self.next_in(iterator) {
            let Some(name) = self.get_str(VPI_NAME, raw) else {
                self.free(raw);
                continue;
            };
            let scope = format!("{}::", name.trim_end_matches("::"));
            match self.create(raw, &scope, scope.clone()) {
                Ok(handle) => packages.push(handle),
                Err(err) => warn!(package = %scope, %err, "skipping package"),
            }
        }
        Ok(packages)
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
            return self.create(raw, leaf_name(name), full).map(Some);
        }

        if let Some(raw) = self.lookup(name, Some(parent.raw())) {
            let full = name::join(parent.full_name(), name, separator_for(parent.kind()));
            let child = self
                .get_str(VPI_NAME, raw)
                .map(|n| leaf_name(&n).to_string())
                .unwrap_or_else(|| leaf_name(name).to_string());
            return self.create(raw, &child, full).map(Some);
        }

        // A generate loop has no object of its own, only labelled blocks.
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

        let Ok(native_index) = i32::try_from(index) else {
            return Ok(None);
        };
        let raw = self.api.handle_by_index(parent.raw(), native_index);
        self.poll();
        let Some(raw) = raw else {
            return Ok(None);
        };
        let child = self
            .get_str(VPI_NAME, raw)
            .map(|n| leaf_name(&n).to_string())
            .unwrap_or_else(|| name::indexed(parent.name(), index));
        let full = name::indexed(parent.full_name(), index);
        self.create(raw, &child, full).map(Some)
    }

    fn by_raw(&mut self, parent: &ObjectHandle, raw: RawRef) -> Result<Option<ObjectHandle>> {
        let vpi_type = self.get(VPI_TYPE, Some(raw));
        if classify(vpi_type).is_none() {
            return Ok(None);
        }
        let Some(name) = self.get_str(VPI_NAME, raw) else {
            return Ok(None);
        };
        self.by_path(parent, leaf_name(&name))
    }

    fn iterate(&mut self, parent: &ObjectHandle) -> Result<Option<IterState>> {
        if parent.is_pseudo() {
            return Ok(Some(IterState::new(parent, vec![VPI_INTERNAL_SCOPE])));
        }
        let wide = parent.signal().is_some_and(|s| s.width() > 1);
        let relations: &[Relation] = match self.get(VPI_TYPE, Some(parent.raw())) {
            t if is_scope_type(t) => MODULE_RELATIONS,
            VPI_PACKAGE => PACKAGE_RELATIONS,
            VPI_NET if wide => &[VPI_NET_BIT],
            VPI_REG if wide => &[VPI_REG_BIT],
            VPI_NET_ARRAY => &[VPI_NET],
            VPI_REG_ARRAY => &[VPI_REG],
            VPI_MEMORY => &[VPI_MEMORY_WORD],
            VPI_STRUCT_VAR | VPI_STRUCT_NET | VPI_UNION_VAR => &[VPI_MEMBER],
            VPI_GEN_SCOPE_ARRAY => &[VPI_INTERNAL_SCOPE],
            _ => return Ok(None),
        };
        Ok(Some(IterState::new(parent, relations.to_vec())))
    }

    fn next_child(&mut self, state: &mut IterState) -> Result<NextChild> {
        loop {
            let Some(raw) = state.next_raw(self) else {
                return Ok(NextChild::End);
            };
            let vpi_type = self.get(VPI_TYPE, Some(raw));
            let in_pseudo = state.pseudo_label().is_some();
            if is_skipped(vpi_type) || (in_pseudo && vpi_type != VPI_GEN_SCOPE) {
                self.free(raw);
                continue;
            }
            if classify(vpi_type).is_none() {
                return Ok(NextChild::Foreign(raw));
            }
            let Some(name) = self.get_str(VPI_NAME, raw) else {
                self.free(raw);
                return Ok(NextChild::Unnamed);
            };
            let leaf = leaf_name(&name).to_string();

            if in_pseudo {
                if !state.accepts(&leaf) {
                    self.free(raw);
                    continue;
                }
                let full = name::join(state.parent_full_name(), &leaf, Separator::Index);
                return self.create(raw, &leaf, full).map(NextChild::Native);
            }

            if vpi_type == VPI_GEN_SCOPE
                && state.parent_kind() != ObjectKind::GenArray
                && name::index_suffix(&leaf).is_some()
            {
                // Stand in for the generate loop; repeats collapse by name.
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
        match self.read(handle, VPI_BIN_STR_VAL)? {
            VpiValue::BinStr(bits) => Ok(bits),
            other => Err(unexpected(handle, &other)),
        }
    }

    fn read_str(&mut self, handle: &ObjectHandle) -> Result<Vec<u8>> {
        match self.read(handle, VPI_STRING_VAL)? {
            VpiValue::Str(bytes) => Ok(bytes),
            other => Err(unexpected(handle, &other)),
        }
    }

    fn read_real(&mut self, handle: &ObjectHandle) -> Result<f64> {
        match self.read(handle, VPI_REAL_VAL)? {
            VpiValue::Real(v) => Ok(v),
            other => Err(unexpected(handle, &other)),
        }
    }

    fn read_long(&mut self, handle: &ObjectHandle) -> Result<i64> {
        let logic = handle
            .signal()
            .is_some_and(|s| matches!(s.format(), ValueFormat::Logic | ValueFormat::LogicVec));
        if logic {
            // Wider than vpiIntVal can carry.
            let bits = self.read_binstr(handle)?;
            return logic::binstr_to_int(&bits);
        }
        match self.read(handle, VPI_INT_VAL)? {
            VpiValue::Int(v) => Ok(i64::from(v)),
            other => Err(unexpected(handle, &other)),
        }
    }

    fn write(&mut self, handle: &ObjectHandle, value: &Value, action: SetAction) -> Result<()> {
        let signal = handle.require_signal()?;
        let format = signal.format();
        let mismatch = || {
            GpiError::invalid_value(format!(
                "cannot write {} to {} ({format:?})",
                value.type_name(),
                handle.full_name()
            ))
        };
        let native = match (value, format) {
            (Value::BinStr(bits), _) => VpiValue::BinStr(bits.clone()),
            (Value::Int(v), ValueFormat::Logic | ValueFormat::LogicVec) => {
                VpiValue::BinStr(logic::int_to_binstr(*v, signal.width()))
            }
            (Value::Int(v), ValueFormat::Int | ValueFormat::Enum) => {
                VpiValue::Int(i32::try_from(*v).map_err(|_| {
                    GpiError::invalid_value(format!(
                        "{v} does not fit the 32-bit object {}",
                        handle.full_name()
                    ))
                })?)
            }
            (Value::Real(v), ValueFormat::Real) => VpiValue::Real(*v),
            (Value::Str(bytes), ValueFormat::Str) => VpiValue::Str(bytes.clone()),
            _ => return Err(mismatch()),
        };

        let (native, flags) = match action {
            SetAction::Deposit if format == ValueFormat::Str => (native, VPI_NO_DELAY),
            SetAction::Deposit => (native, VPI_INERTIAL_DELAY),
            SetAction::NoDelay => (native, VPI_NO_DELAY),
            SetAction::Force => (native, VPI_FORCE_FLAG),
            // Release takes the value the object holds right now.
            SetAction::Release => (
                self.read(handle, value_format_code(format))?,
                VPI_RELEASE_FLAG,
            ),
        };
        self.api.put_value(handle.raw(), &native, flags);
        self.check("put_value")
    }

    fn arm(&mut self, token: CallbackId, request: ArmRequest<'_>) -> Result<RawRef> {
        let (reason, obj, delay) = match request {
            ArmRequest::ValueChange(handle) => (CB_VALUE_CHANGE, Some(handle.raw()), 0),
            ArmRequest::Timer(delay) => (CB_AFTER_DELAY, None, delay),
            ArmRequest::ReadWrite => (CB_READ_WRITE_SYNCH, None, 0),
            ArmRequest::ReadOnly => (CB_READ_ONLY_SYNCH, None, 0),
            ArmRequest::NextTimeStep => (CB_NEXT_SIM_TIME, None, 0),
            ArmRequest::StartOfSim => (CB_START_OF_SIMULATION, None, 0),
            ArmRequest::EndOfSim => (CB_END_OF_SIMULATION, None, 0),
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
        self.get(VPI_TIME_PRECISION, None)
    }

    fn finish(&mut self) {
        self.api.finish();
        self.poll();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockVpi;
    use gpi_core::callback::{CallbackKind, Edge};
    use gpi_core::kind::RangeDirection;
    use gpi_core::{dispatch, Fired, Gpi, GpiConfig, HandleId};
    use gpi_testkit::{fixture, run_until, SharedSim, Sim};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn sim() -> SharedSim {
        Sim::new(fixture::mixed_design()).shared()
    }

    fn gpi_over(api: MockVpi) -> Gpi {
        let mut gpi = Gpi::new(GpiConfig::default());
        gpi.register_adapter(Box::new(VpiAdapter::new(api))).unwrap();
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

    fn counter() -> (Rc<Cell<u32>>, gpi_core::UserFn) {
        let hits = Rc::new(Cell::new(0));
        let seen = hits.clone();
        (
            hits,
            Box::new(move || {
                seen.set(seen.get() + 1);
                0
            }),
        )
    }

    #[test]
    fn root_mismatch_frees_what_it_opened() {
        let sim = sim();
        let mut vpi = VpiAdapter::new(MockVpi::new(sim.clone()));
        let err = vpi.root(Some("tb")).unwrap_err();
        assert!(matches!(err, GpiError::RootMismatch { ref found, .. } if found == "top"));
        assert_eq!(sim.borrow().live_nodes(), 0);
        assert_eq!(vpi.api().live_iterators(), 0);

        let top = vpi.root(Some("top")).unwrap().unwrap();
        assert_eq!(top.kind(), ObjectKind::Module);
        let definition = top.meta().definition.clone().unwrap();
        assert_eq!(definition.name, "top");
        assert_eq!(definition.file.as_deref(), Some("top.sv"));
    }

    #[test]
    fn objects_are_classified() {
        let mut gpi = gpi_over(MockVpi::new(sim()));
        let top = gpi.root(None).unwrap();
        let mut lookup = |name: &str| {
            let id = gpi.handle_by_name(top, name).unwrap();
            let h = gpi.handle(id).unwrap();
            (
                h.kind(),
                h.signal().map(|s| (s.format(), s.width())),
                h.meta().clone(),
            )
        };

        let (kind, signal, _) = lookup("clk");
        assert_eq!(kind, ObjectKind::Net);
        assert_eq!(signal, Some((ValueFormat::Logic, 1)));

        let (kind, signal, meta) = lookup("data");
        assert_eq!(kind, ObjectKind::Net);
        assert_eq!(signal, Some((ValueFormat::LogicVec, 8)));
        let range = meta.range.unwrap();
        assert_eq!((range.left, range.right), (7, 0));
        assert_eq!(range.direction, RangeDirection::Descending);

        assert_eq!(lookup("rst_n").0, ObjectKind::Register);
        assert_eq!(lookup("count").1, Some((ValueFormat::Int, 32)));
        assert_eq!(lookup("temp").0, ObjectKind::Real);
        assert_eq!(lookup("msg").1, Some((ValueFormat::Str, 8)));

        let (kind, _, meta) = lookup("mem");
        assert_eq!(kind, ObjectKind::Array);
        assert_eq!(meta.num_elems, 4);
        assert_eq!(meta.range.unwrap().direction, RangeDirection::Ascending);

        assert_eq!(lookup("pkt").0, ObjectKind::Struct);
        let (kind, _, meta) = lookup("WIDTH");
        assert_eq!(kind, ObjectKind::Integer);
        assert!(meta.is_const);

        let (kind, _, meta) = lookup("u_sub");
        assert_eq!(kind, ObjectKind::Module);
        assert_eq!(meta.definition.unwrap().name, "sub");
        assert_eq!(lookup("u_sub.state").2.full_name, "top.u_sub.state");
        assert_eq!(lookup("cond_blk").0, ObjectKind::Module);
    }

    #[test]
    fn vhdl_objects_are_invisible() {
        let mut gpi = gpi_over(MockVpi::new(sim()));
        let top = gpi.root(None).unwrap();
        assert!(gpi.handle_by_name(top, "u_vhdl").unwrap_err().is_not_found());
    }

    #[test]
    fn generate_loop_is_a_pseudo_region() {
        let mut gpi = gpi_over(MockVpi::new(sim()));
        let top = gpi.root(None).unwrap();
        let lp = gpi.handle_by_name(top, "loop").unwrap();
        {
            let h = gpi.handle(lp).unwrap();
            assert!(h.is_pseudo());
            assert_eq!(h.kind(), ObjectKind::GenArray);
            assert_eq!(h.full_name(), "top.loop");
        }
        let third = gpi.handle_by_index(lp, 2).unwrap();
        assert_eq!(gpi.handle(third).unwrap().full_name(), "top.loop[2]");
        let q = gpi.handle_by_name(third, "q").unwrap();
        assert_eq!(gpi.handle(q).unwrap().full_name(), "top.loop[2].q");
        let first = gpi.handle_by_name(lp, "loop[0]").unwrap();
        assert_eq!(gpi.handle(first).unwrap().full_name(), "top.loop[0]");
        assert!(gpi.handle_by_name(lp, "other[0]").is_err());

        assert_eq!(
            names(&mut gpi, lp),
            vec!["top.loop[0]", "top.loop[1]", "top.loop[2]", "top.loop[3]"]
        );
    }

    #[test]
    fn scope_traversal_is_deduplicated_and_stable() {
        let sim = sim();
        let mut gpi = gpi_over(MockVpi::new(sim.clone()));
        let top = gpi.root(None).unwrap();
        let first = names(&mut gpi, top);
        assert_eq!(
            first,
            vec![
                "top.clk",
                "top.data",
                "top.rst_n",
                "top.counter",
                "top.mem",
                "top.count",
                "top.temp",
                "top.pkt",
                "top.msg",
                "top.WIDTH",
                "top.u_sub",
                "top.loop",
                "top.cond_blk",
            ]
        );
        assert_eq!(names(&mut gpi, top), first);

        gpi.release(top).unwrap();
        assert_eq!(sim.borrow().live_nodes(), 0);
    }

    #[test]
    fn vectors_arrays_and_structs_have_children() {
        let mut gpi = gpi_over(MockVpi::new(sim()));
        let top = gpi.root(None).unwrap();
        let data = gpi.handle_by_name(top, "data").unwrap();
        let bits = names(&mut gpi, data);
        assert_eq!(bits.len(), 8);
        assert_eq!(bits[0], "top.data[7]");
        assert_eq!(bits[7], "top.data[0]");

        let mem = gpi.handle_by_name(top, "mem").unwrap();
        assert_eq!(names(&mut gpi, mem).len(), 4);
        let word = gpi.handle_by_index(mem, 2).unwrap();
        let h = gpi.handle(word).unwrap();
        assert_eq!(h.full_name(), "top.mem[2]");
        assert_eq!(h.signal().unwrap().width(), 8);
        assert!(gpi.handle_by_index(mem, 4).is_err());

        let pkt = gpi.handle_by_name(top, "pkt").unwrap();
        assert_eq!(names(&mut gpi, pkt), vec!["top.pkt.valid", "top.pkt.payload"]);

        let clk = gpi.handle_by_name(top, "clk").unwrap();
        assert!(gpi.iterate(clk).unwrap().is_none());
    }

    #[test]
    fn packages_are_scopes() {
        let mut gpi = gpi_over(MockVpi::new(sim()));
        let packages = gpi.packages().unwrap();
        assert_eq!(packages.len(), 1);
        assert_eq!(gpi.handle(packages[0]).unwrap().full_name(), "pkg::");
        assert_eq!(names(&mut gpi, packages[0]), vec!["pkg::DEPTH"]);
        let depth = gpi.handle_by_name(packages[0], "DEPTH").unwrap();
        assert_eq!(gpi.read_long(depth).unwrap(), 16);
    }

    #[test]
    fn values_round_trip() {
        let mut gpi = gpi_over(MockVpi::new(sim()));
        let top = gpi.root(None).unwrap();
        let data = gpi.handle_by_name(top, "data").unwrap();
        gpi.write(data, &Value::Int(0xA5), SetAction::Deposit).unwrap();
        assert_eq!(gpi.read_binstr(data).unwrap(), "10100101");
        assert_eq!(gpi.read_long(data).unwrap(), 0xA5);

        let clk = gpi.handle_by_name(top, "clk").unwrap();
        gpi.write(clk, &Value::BinStr("1".into()), SetAction::NoDelay)
            .unwrap();
        assert_eq!(gpi.read_binstr(clk).unwrap(), "1");

        let count = gpi.handle_by_name(top, "count").unwrap();
        gpi.write(count, &Value::Int(-5), SetAction::Deposit).unwrap();
        assert_eq!(gpi.read_long(count).unwrap(), -5);
        assert!(matches!(
            gpi.write(count, &Value::Int(1 << 40), SetAction::Deposit),
            Err(GpiError::InvalidValue { .. })
        ));

        let temp = gpi.handle_by_name(top, "temp").unwrap();
        gpi.write(temp, &Value::Real(2.5), SetAction::Deposit).unwrap();
        assert_eq!(gpi.read_real(temp).unwrap(), 2.5);

        let msg = gpi.handle_by_name(top, "msg").unwrap();
        gpi.write(msg, &Value::Str(b"hi".to_vec()), SetAction::Deposit)
            .unwrap();
        assert_eq!(gpi.read_str(msg).unwrap(), b"hi      ".to_vec());

        let width = gpi.handle_by_name(top, "WIDTH").unwrap();
        assert!(matches!(
            gpi.write(width, &Value::Int(1), SetAction::Deposit),
            Err(GpiError::Unsupported { .. })
        ));
        assert!(matches!(
            gpi.write(data, &Value::BinStr("0101".into()), SetAction::Deposit),
            Err(GpiError::InvalidValue { .. })
        ));
        assert!(matches!(
            gpi.write(data, &Value::Real(1.0), SetAction::Deposit),
            Err(GpiError::InvalidValue { .. })
        ));
    }

    #[test]
    fn four_state_binstr_reads_back() {
        let mut gpi = gpi_over(MockVpi::new(sim()));
        let top = gpi.root(None).unwrap();
        let data = gpi.handle_by_name(top, "data").unwrap();
        gpi.write(data, &Value::BinStr("01XZ10XZ".into()), SetAction::Deposit)
            .unwrap();
        assert_eq!(gpi.read_binstr(data).unwrap(), "01XZ10XZ");
        assert!(gpi.read_long(data).is_err());

        let counter = gpi.handle_by_name(top, "counter").unwrap();
        gpi.write(counter, &Value::BinStr("zzzzxxxx".into()), SetAction::NoDelay)
            .unwrap();
        assert_eq!(gpi.read_binstr(counter).unwrap(), "ZZZZXXXX");
    }

    #[test]
    fn force_holds_until_release() {
        let mut gpi = gpi_over(MockVpi::new(sim()));
        let top = gpi.root(None).unwrap();
        let data = gpi.handle_by_name(top, "data").unwrap();
        gpi.write(data, &Value::BinStr("11110000".into()), SetAction::Force)
            .unwrap();
        gpi.write(data, &Value::Int(0), SetAction::Deposit).unwrap();
        assert_eq!(gpi.read_binstr(data).unwrap(), "11110000");
        gpi.write(data, &Value::Int(0), SetAction::Release).unwrap();
        assert_eq!(gpi.read_binstr(data).unwrap(), "11110000");
        gpi.write(data, &Value::Int(3), SetAction::Deposit).unwrap();
        assert_eq!(gpi.read_binstr(data).unwrap(), "00000011");
    }

    #[test]
    fn error_diagnostics_fail_the_call() {
        let mut vpi = VpiAdapter::new(MockVpi::new(sim()));
        let top = vpi.root(None).unwrap().unwrap();
        let clk = vpi.by_name(&top, "clk").unwrap().unwrap();

        vpi.api_mut().inject_error(VPI_WARNING, "slow path");
        vpi.write(&clk, &Value::Int(1), SetAction::Deposit).unwrap();

        vpi.api_mut().inject_error(VPI_ERROR, "write refused");
        let err = vpi
            .write(&clk, &Value::Int(0), SetAction::Deposit)
            .unwrap_err();
        assert!(matches!(
            err,
            GpiError::BackendRejected { backend: "vpi", operation: "put_value", .. }
        ));
    }

    #[test]
    fn timer_fires_once_at_its_time() {
        let sim = sim();
        let gpi = RefCell::new(gpi_over(MockVpi::new(sim.clone())));
        let fired_at = Rc::new(Cell::new(0));
        let at = fired_at.clone();
        let clock = sim.clone();
        let id = gpi
            .borrow_mut()
            .register_callback(
                CallbackKind::Timer { delay: 10 },
                Box::new(move || {
                    at.set(clock.borrow().now());
                    0
                }),
            )
            .unwrap();
        let deliver = |ud: u64| {
            dispatch(&gpi, gpi_core::CallbackId::from_raw(ud)).unwrap();
        };
        assert_eq!(run_until(&sim, 5, deliver), 0);
        assert_eq!(run_until(&sim, 20, deliver), 1);
        assert_eq!(fired_at.get(), 10);
        assert_eq!(gpi.borrow_mut().sim_time().unwrap(), (0, 20));
        assert_eq!(
            gpi.borrow().callback(id).unwrap().state(),
            gpi_core::CbState::PostCall
        );
    }

    #[test]
    fn rising_edge_filter() {
        let sim = sim();
        let gpi = RefCell::new(gpi_over(MockVpi::new(sim.clone())));
        let clk = {
            let mut g = gpi.borrow_mut();
            let top = g.root(None).unwrap();
            g.handle_by_name(top, "clk").unwrap()
        };
        let (hits, func) = counter();
        gpi.borrow_mut()
            .register_callback(
                CallbackKind::ValueChange {
                    signal: clk,
                    edge: Edge::Rising,
                },
                func,
            )
            .unwrap();
        let mut results = Vec::new();
        for bit in ["0", "1", "0", "1"] {
            gpi.borrow_mut()
                .write(clk, &Value::BinStr(bit.into()), SetAction::Deposit)
                .unwrap();
            run_until(&sim, 0, |ud| {
                results.push(dispatch(&gpi, gpi_core::CallbackId::from_raw(ud)).unwrap());
            });
        }
        assert_eq!(hits.get(), 2);
        assert_eq!(
            results,
            vec![Fired::Filtered, Fired::Called(0), Fired::Filtered, Fired::Called(0)]
        );
    }

    #[test]
    fn removed_callback_never_fires() {
        let sim = sim();
        let gpi = RefCell::new(gpi_over(MockVpi::new(sim.clone())));
        let (hits, func) = counter();
        let id = gpi
            .borrow_mut()
            .register_callback(CallbackKind::Timer { delay: 5 }, func)
            .unwrap();
        gpi.borrow_mut().remove_callback(id).unwrap();
        assert_eq!(sim.borrow().kernel.pending(), 0);
        run_until(&sim, 10, |ud| {
            dispatch(&gpi, gpi_core::CallbackId::from_raw(ud)).unwrap();
        });
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn unremovable_end_of_sim_callback_is_squashed() {
        let sim = sim();
        let mut api = MockVpi::new(sim.clone());
        api.make_sticky(CB_END_OF_SIMULATION);
        let gpi = RefCell::new(gpi_over(api));
        let (hits, func) = counter();
        let id = gpi
            .borrow_mut()
            .register_callback(CallbackKind::EndOfSim, func)
            .unwrap();
        gpi.borrow_mut().remove_callback(id).unwrap();

        let mut results = Vec::new();
        gpi_testkit::sim::finish(&sim, |ud| {
            results.push(dispatch(&gpi, gpi_core::CallbackId::from_raw(ud)).unwrap());
        });
        assert_eq!(results, vec![Fired::Squashed]);
        assert_eq!(hits.get(), 0);
        assert!(gpi.borrow().callback(id).is_none());
    }

    #[test]
    fn self_removal_refused_by_simulator_is_squashed() {
        let sim = sim();
        let mut api = MockVpi::new(sim.clone());
        api.make_sticky(CB_VALUE_CHANGE);
        let gpi = Rc::new(RefCell::new(gpi_over(api)));
        let clk = {
            let mut g = gpi.borrow_mut();
            let top = g.root(None).unwrap();
            g.handle_by_name(top, "clk").unwrap()
        };
        let slot: Rc<Cell<Option<gpi_core::CallbackId>>> = Rc::new(Cell::new(None));
        let hits = Rc::new(Cell::new(0u32));
        let (g, s, h) = (Rc::clone(&gpi), Rc::clone(&slot), Rc::clone(&hits));
        let id = gpi
            .borrow_mut()
            .register_callback(
                CallbackKind::ValueChange {
                    signal: clk,
                    edge: Edge::Any,
                },
                Box::new(move || {
                    h.set(h.get() + 1);
                    g.borrow_mut().remove_callback(s.get().unwrap()).unwrap();
                    0
                }),
            )
            .unwrap();
        slot.set(Some(id));

        let mut results = Vec::new();
        for bit in ["1", "0"] {
            gpi.borrow_mut()
                .write(clk, &Value::BinStr(bit.into()), SetAction::Deposit)
                .unwrap();
            run_until(&sim, 0, |ud| {
                results.push(dispatch(&gpi, gpi_core::CallbackId::from_raw(ud)).unwrap());
            });
        }
        assert_eq!(results, vec![Fired::Called(0), Fired::Squashed]);
        assert_eq!(hits.get(), 1);
        assert!(gpi.borrow().callback(id).is_some());
    }

    #[test]
    fn simulator_identity_and_control() {
        let sim = Sim::new(fixture::mixed_design())
            .with_identity("mocksim", "1.2")
            .with_precision(-9)
            .shared();
        let mut gpi = gpi_over(MockVpi::new(sim.clone()));
        let info = gpi.sim_info().unwrap();
        assert_eq!(info.product, "mocksim");
        assert_eq!(info.version, "1.2");
        assert_eq!(gpi.sim_precision().unwrap(), -9);
        gpi.sim_end().unwrap();
        gpi.sim_end().unwrap();
        assert!(sim.borrow().finish_requested());
    }
}
