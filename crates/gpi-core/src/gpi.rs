//! Backend registrar and dispatcher.
//!
//! [`Gpi`] owns the registered adapters and every live handle, iterator and
//! callback. Requests carry ids; each is routed to the adapter recorded on
//! the object it concerns. Root lookup goes to the first adapter that
//! resolves a toplevel; name lookup asks the parent's own adapter first and
//! then every other adapter, so a mixed-language design can be walked across
//! the language boundary.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, error, info, warn};

use crate::adapter::{Adapter, ArmRequest, SimInfo};
use crate::callback::{
    AfterCall, CallbackHandle, CallbackId, CallbackKind, CallbackTable, CbState, RemoveAction,
    UserFn,
};
use crate::config::GpiConfig;
use crate::error::{GpiError, Result};
use crate::handle::{AdapterId, HandleId, HandleTable, ObjectHandle, RawRef};
use crate::iter::{IterState, NextChild};
use crate::logic;
use crate::value::{SetAction, Value, ValueFormat};

/// Identifier of an active traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IterId(u64);

impl IterId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for IterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "iter#{}", self.0)
    }
}

#[derive(Debug)]
struct ActiveIter {
    adapter: AdapterId,
    parent: HandleId,
    state: IterState,
}

/// Receiver of the two process-level notifications.
pub trait LifecycleListener {
    /// The simulator started; delivered once.
    fn attached(&self, info: &SimInfo);

    /// The simulator is shutting down; delivered once.
    fn shutdown(&self);
}

struct Lifecycle {
    listener: Box<dyn LifecycleListener>,
    attached: Cell<bool>,
    shut_down: Cell<bool>,
}

impl Lifecycle {
    fn notify_attach(&self, info: &SimInfo) {
        if !self.attached.replace(true) {
            self.listener.attached(info);
        }
    }

    fn notify_shutdown(&self) {
        if !self.shut_down.replace(true) {
            self.listener.shutdown();
        }
    }
}

/// A user function taken out of its callback for the duration of a call.
pub struct PendingCall {
    id: CallbackId,
    func: UserFn,
}

impl PendingCall {
    pub fn id(&self) -> CallbackId {
        self.id
    }

    pub fn call(&mut self) -> i32 {
        (self.func)()
    }
}

/// First half of a callback dispatch.
pub enum Dispatch {
    /// Run the user function, then hand it back with
    /// [`Gpi::finish_dispatch`].
    Call(PendingCall),
    /// Edge condition not met; the registration stays in place.
    Filtered,
    /// Stale or locally removed registration; nothing to run.
    Squashed,
}

/// Outcome of [`dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fired {
    Called(i32),
    Filtered,
    Squashed,
}

fn adapter_of(
    adapters: &mut [Box<dyn Adapter>],
    id: AdapterId,
) -> Result<&mut (dyn Adapter + 'static)> {
    adapters
        .get_mut(id.0)
        .map(|adapter| adapter.as_mut())
        .ok_or_else(|| GpiError::corrupted(format!("no adapter with index {}", id.0)))
}

/// The owner's adapter first, then every other one in registration order.
fn search_order(count: usize, owner: AdapterId) -> impl Iterator<Item = usize> {
    std::iter::once(owner.0).chain((0..count).filter(move |&index| index != owner.0))
}

/// Registrar and dispatcher for one simulator process.
pub struct Gpi {
    config: GpiConfig,
    adapters: Vec<Box<dyn Adapter>>,
    handles: HandleTable,
    iterators: HashMap<IterId, ActiveIter>,
    next_iter: u64,
    callbacks: CallbackTable,
    lifecycle: Option<Rc<Lifecycle>>,
    ending: bool,
}

impl Gpi {
    pub fn new(config: GpiConfig) -> Self {
        Self {
            config,
            adapters: Vec::new(),
            handles: HandleTable::new(),
            iterators: HashMap::new(),
            next_iter: 0,
            callbacks: CallbackTable::new(),
            lifecycle: None,
            ending: false,
        }
    }

    pub fn config(&self) -> &GpiConfig {
        &self.config
    }

    // ---- Backend registration ----

    /// Add an adapter. The first one registered is the primary adapter:
    /// it receives callbacks that target no particular object.
    pub fn register_adapter(&mut self, mut adapter: Box<dyn Adapter>) -> Result<AdapterId> {
        let name = adapter.name();
        if self.adapters.iter().any(|a| a.name() == name) {
            return Err(GpiError::rejected(
                name,
                "register",
                "an adapter with this name is already registered",
            ));
        }
        let id = AdapterId(self.adapters.len());
        adapter.attach(id);
        self.adapters.push(adapter);
        info!(adapter = name, index = id.0, "adapter registered");
        Ok(id)
    }

    pub fn adapter_names(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    fn primary(&self) -> Result<AdapterId> {
        if self.adapters.is_empty() {
            Err(GpiError::unsupported("no adapter registered"))
        } else {
            Ok(AdapterId(0))
        }
    }

    fn free_native(&mut self, adapter: AdapterId, raw: RawRef) {
        if let Some(adapter) = self.adapters.get_mut(adapter.0) {
            adapter.release(raw);
        }
    }

    fn unpin(&mut self, id: HandleId) {
        if let Some((adapter, raw)) = self.handles.unpin(id) {
            self.free_native(adapter, raw);
        }
    }

    // ---- Simulator ----

    pub fn sim_info(&mut self) -> Result<SimInfo> {
        let primary = self.primary()?;
        Ok(adapter_of(&mut self.adapters, primary)?.sim_info())
    }

    /// Current simulation time split into high and low 32-bit words.
    pub fn sim_time(&mut self) -> Result<(u32, u32)> {
        let primary = self.primary()?;
        let now = adapter_of(&mut self.adapters, primary)?.sim_time();
        Ok(((now >> 32) as u32, now as u32))
    }

    pub fn sim_precision(&mut self) -> Result<i32> {
        let primary = self.primary()?;
        Ok(adapter_of(&mut self.adapters, primary)?.sim_precision())
    }

    /// Ask the simulator to finish. Repeated requests are ignored.
    pub fn sim_end(&mut self) -> Result<()> {
        if self.ending {
            return Ok(());
        }
        let primary = self.primary()?;
        self.ending = true;
        info!("simulation end requested");
        adapter_of(&mut self.adapters, primary)?.finish();
        Ok(())
    }

    pub fn is_ending(&self) -> bool {
        self.ending
    }

    // ---- Handle abstraction ----

    /// Resolve the toplevel. Without a name the configured toplevel, if
    /// any, filters the result.
    pub fn root(&mut self, name: Option<&str>) -> Result<HandleId> {
        let requested = name
            .map(str::to_string)
            .or_else(|| self.config.toplevel.clone());
        let mut failure = None;
        for adapter in self.adapters.iter_mut() {
            match adapter.root(requested.as_deref()) {
                Ok(Some(handle)) => {
                    info!(adapter = adapter.name(), root = handle.full_name(), "toplevel resolved");
                    return Ok(self.handles.insert(handle));
                }
                Ok(None) => {}
                Err(err) => {
                    debug!(adapter = adapter.name(), %err, "toplevel lookup failed");
                    failure.get_or_insert(err);
                }
            }
        }
        Err(failure.unwrap_or_else(|| {
            GpiError::not_found(format!(
                "toplevel {}",
                requested.as_deref().unwrap_or("(any)")
            ))
        }))
    }

    /// Top-level package scopes of every adapter.
    pub fn packages(&mut self) -> Result<Vec<HandleId>> {
        let mut found = Vec::new();
        for adapter in self.adapters.iter_mut() {
            match adapter.packages() {
                Ok(list) => found.extend(list),
                Err(err) => warn!(adapter = adapter.name(), %err, "package scan failed"),
            }
        }
        Ok(found
            .into_iter()
            .map(|handle| self.handles.insert(handle))
            .collect())
    }

    pub fn handle_by_name(&mut self, parent: HandleId, name: &str) -> Result<HandleId> {
        let parent_handle = self.handles.get(parent)?;
        let owner = parent_handle.adapter();
        let mut found = None;
        let mut failure = None;
        for index in search_order(self.adapters.len(), owner) {
            let adapter = &mut self.adapters[index];
            match adapter.by_name(parent_handle, name) {
                Ok(Some(handle)) => {
                    found = Some(handle);
                    break;
                }
                Ok(None) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    warn!(adapter = adapter.name(), %err, "name lookup failed");
                    failure.get_or_insert(err);
                }
            }
        }
        let Some(handle) = found else {
            let what = format!("{}.{name}", parent_handle.full_name());
            debug!(name = %what, "no such object");
            return Err(failure.unwrap_or_else(|| GpiError::not_found(what)));
        };
        Ok(self.handles.insert(handle))
    }

    /// Element `index` of an indexable object. Only the parent's own
    /// adapter is asked.
    pub fn handle_by_index(&mut self, parent: HandleId, index: i64) -> Result<HandleId> {
        let parent_handle = self.handles.get(parent)?;
        let adapter = adapter_of(&mut self.adapters, parent_handle.adapter())?;
        match adapter.by_index(parent_handle, index)? {
            Some(handle) => Ok(self.handles.insert(handle)),
            None => Err(GpiError::not_found(format!(
                "{}[{index}]",
                parent_handle.full_name()
            ))),
        }
    }

    pub fn handle(&self, id: HandleId) -> Result<&ObjectHandle> {
        self.handles.get(id)
    }

    /// Release a handle. Its native reference is freed once no other live
    /// handle, iterator or callback holds it.
    pub fn release(&mut self, id: HandleId) -> Result<()> {
        if let Some((adapter, raw)) = self.handles.release(id)? {
            self.free_native(adapter, raw);
        }
        Ok(())
    }

    pub fn live_handles(&self) -> usize {
        self.handles.len()
    }

    // ---- Iteration ----

    /// Start walking the children of `parent`. `None` when it has none
    /// this backend can enumerate.
    pub fn iterate(&mut self, parent: HandleId) -> Result<Option<IterId>> {
        let handle = self.handles.get(parent)?;
        let owner = handle.adapter();
        let adapter = adapter_of(&mut self.adapters, owner)?;
        let state = match adapter.iterate(handle) {
            Ok(Some(state)) => state,
            Ok(None) => return Ok(None),
            Err(err @ GpiError::Unsupported { .. }) => {
                warn!(object = handle.full_name(), %err, "treating as leaf");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        self.handles.pin(parent)?;
        self.next_iter += 1;
        let id = IterId(self.next_iter);
        self.iterators.insert(
            id,
            ActiveIter {
                adapter: owner,
                parent,
                state,
            },
        );
        Ok(Some(id))
    }

    /// Next child of a traversal; `None` once it is exhausted, after which
    /// the iterator id is no longer valid.
    pub fn next(&mut self, iter: IterId) -> Result<Option<HandleId>> {
        let Some(mut active) = self.iterators.remove(&iter) else {
            return Err(GpiError::not_found(format!("{iter}")));
        };
        loop {
            let step = match self.adapters.get_mut(active.adapter.0) {
                Some(adapter) => adapter.next_child(&mut active.state),
                None => Err(GpiError::corrupted(format!("{iter} has no adapter"))),
            };
            let child = match step {
                Ok(NextChild::Native(handle)) => handle,
                Ok(NextChild::Foreign(raw)) => match self.resolve_foreign(&active, raw) {
                    Some(handle) => {
                        self.free_native(active.adapter, raw);
                        handle
                    }
                    None => {
                        warn!(
                            parent = active.state.parent_full_name(),
                            "skipping child that no adapter can resolve"
                        );
                        self.free_native(active.adapter, raw);
                        continue;
                    }
                },
                Ok(NextChild::Unnamed) => {
                    warn!(
                        parent = active.state.parent_full_name(),
                        "skipping unnamed child"
                    );
                    continue;
                }
                Ok(NextChild::End) => {
                    self.finish_iterator(active);
                    return Ok(None);
                }
                Err(err) => {
                    self.finish_iterator(active);
                    return Err(err);
                }
            };
            if !active.state.first_sighting(child.full_name()) {
                debug!(child = child.full_name(), "skipping duplicate child");
                let duplicate = self.handles.insert(child);
                if let Ok(Some((adapter, raw))) = self.handles.release(duplicate) {
                    self.free_native(adapter, raw);
                }
                continue;
            }
            let id = self.handles.insert(child);
            self.iterators.insert(iter, active);
            return Ok(Some(id));
        }
    }

    /// Ask every other adapter whether it owns a raw reference yielded
    /// during a traversal.
    fn resolve_foreign(&mut self, active: &ActiveIter, raw: RawRef) -> Option<ObjectHandle> {
        let parent = self.handles.get_pinned_mut(active.parent).ok()?;
        for (index, adapter) in self.adapters.iter_mut().enumerate() {
            if index == active.adapter.0 {
                continue;
            }
            match adapter.by_raw(parent, raw) {
                Ok(Some(handle)) => return Some(handle),
                Ok(None) => {}
                Err(err) => debug!(adapter = adapter.name(), %err, "raw lookup failed"),
            }
        }
        None
    }

    fn finish_iterator(&mut self, active: ActiveIter) {
        if let Some(adapter) = self.adapters.get_mut(active.adapter.0) {
            adapter.close_iterator(active.state);
        }
        self.unpin(active.parent);
    }

    /// Abandon a traversal before it is exhausted.
    pub fn release_iterator(&mut self, iter: IterId) -> Result<()> {
        let active = self
            .iterators
            .remove(&iter)
            .ok_or_else(|| GpiError::not_found(format!("{iter}")))?;
        self.finish_iterator(active);
        Ok(())
    }

    // ---- Values ----

    /// Logic value as one character per bit, most significant first.
    pub fn read_binstr(&mut self, id: HandleId) -> Result<&str> {
        let handle = self.handles.get_mut(id)?;
        handle.require_signal()?;
        let adapter = adapter_of(&mut self.adapters, handle.adapter())?;
        let value = adapter.read_binstr(handle)?;
        let signal = handle
            .signal_mut()
            .ok_or_else(|| GpiError::corrupted(format!("{id} lost its signal data")))?;
        Ok(signal.store_binstr(&value))
    }

    pub fn read_str(&mut self, id: HandleId) -> Result<Vec<u8>> {
        let handle = self.handles.get(id)?;
        handle.require_signal()?;
        adapter_of(&mut self.adapters, handle.adapter())?.read_str(handle)
    }

    pub fn read_real(&mut self, id: HandleId) -> Result<f64> {
        let handle = self.handles.get(id)?;
        handle.require_signal()?;
        adapter_of(&mut self.adapters, handle.adapter())?.read_real(handle)
    }

    pub fn read_long(&mut self, id: HandleId) -> Result<i64> {
        let handle = self.handles.get(id)?;
        handle.require_signal()?;
        adapter_of(&mut self.adapters, handle.adapter())?.read_long(handle)
    }

    pub fn write(&mut self, id: HandleId, value: &Value, action: SetAction) -> Result<()> {
        let handle = self.handles.get(id)?;
        let signal = handle.require_signal()?;
        if handle.meta().is_const {
            return Err(GpiError::unsupported(format!(
                "{} is a constant",
                handle.full_name()
            )));
        }
        if let (Value::BinStr(bits), ValueFormat::Logic | ValueFormat::LogicVec) =
            (value, signal.format())
        {
            logic::check_binstr(bits, signal.width())?;
        }
        let adapter = adapter_of(&mut self.adapters, handle.adapter())?;
        adapter.write(handle, value, action).inspect_err(|err| {
            error!(
                object = handle.full_name(),
                value = value.type_name(),
                ?action,
                %err,
                "write failed"
            )
        })
    }

    // ---- Callbacks ----

    /// Register a callback and arm it with the backend.
    ///
    /// Failing to arm a start- or end-of-simulation callback is logged and
    /// the callback is kept, unarmed.
    pub fn register_callback(&mut self, kind: CallbackKind, func: UserFn) -> Result<CallbackId> {
        let adapter = match kind {
            CallbackKind::ValueChange { signal, .. } => {
                let handle = self.handles.get(signal)?;
                handle.require_signal()?;
                let owner = handle.adapter();
                self.handles.pin(signal)?;
                owner
            }
            _ => self.primary()?,
        };
        let id = self.callbacks.insert(adapter, kind, func);
        match self.arm(id) {
            Ok(()) => {
                debug!(%id, kind = kind.label(), "callback registered");
                Ok(id)
            }
            Err(err) if kind.is_sim_boundary() => {
                warn!(%id, kind = kind.label(), %err, "registration failed; continuing");
                Ok(id)
            }
            Err(err) => {
                error!(%id, kind = kind.label(), %err, "registration failed");
                self.drop_callback(id);
                Err(err)
            }
        }
    }

    /// Re-arm a callback that fired or failed to register.
    pub fn prime_callback(&mut self, id: CallbackId) -> Result<()> {
        let entry = self
            .callbacks
            .get(id)
            .ok_or_else(|| GpiError::not_found(format!("{id}")))?;
        match entry.state() {
            CbState::Primed => Ok(()),
            CbState::PendingDelete => Err(GpiError::not_found(format!("{id} was removed"))),
            CbState::PreCall if entry.registration().is_some() => Ok(()),
            CbState::Free | CbState::PreCall | CbState::PostCall => self.arm(id),
        }
    }

    fn arm(&mut self, id: CallbackId) -> Result<()> {
        let entry = self
            .callbacks
            .get(id)
            .ok_or_else(|| GpiError::not_found(format!("{id}")))?;
        let kind = *entry.kind();
        let adapter = adapter_of(&mut self.adapters, entry.adapter())?;
        let registration = match kind {
            CallbackKind::ValueChange { signal, .. } => {
                let handle = self.handles.get_pinned_mut(signal)?;
                adapter.arm(id, ArmRequest::ValueChange(handle))?
            }
            CallbackKind::Timer { delay } => adapter.arm(id, ArmRequest::Timer(delay))?,
            CallbackKind::ReadOnly => adapter.arm(id, ArmRequest::ReadOnly)?,
            CallbackKind::ReadWrite => adapter.arm(id, ArmRequest::ReadWrite)?,
            CallbackKind::NextTimeStep => adapter.arm(id, ArmRequest::NextTimeStep)?,
            CallbackKind::StartOfSim => adapter.arm(id, ArmRequest::StartOfSim)?,
            CallbackKind::EndOfSim => adapter.arm(id, ArmRequest::EndOfSim)?,
        };
        match self.callbacks.get_mut(id) {
            Some(entry) => entry.set_primed(registration),
            None => Err(GpiError::corrupted(format!("{id} vanished while arming"))),
        }
    }

    /// Remove a callback. Once this returns, its user function will not be
    /// called again. Removal from inside the callback's own call takes
    /// effect when the call returns.
    pub fn remove_callback(&mut self, id: CallbackId) -> Result<()> {
        let entry = self
            .callbacks
            .get_mut(id)
            .ok_or_else(|| GpiError::not_found(format!("{id}")))?;
        let kind = *entry.kind();
        let owner = entry.adapter();
        let in_call = entry.in_call();
        match entry.request_remove() {
            RemoveAction::DropNow => {
                self.drop_callback(id);
                Ok(())
            }
            RemoveAction::Deferred | RemoveAction::AlreadyPending => Ok(()),
            RemoveAction::Disarm(registration) => {
                let outcome = adapter_of(&mut self.adapters, owner)?.disarm(registration, false);
                match outcome {
                    Ok(()) if in_call => {
                        if let Some(entry) = self.callbacks.get_mut(id) {
                            let _ = entry.take_registration();
                            entry.set_orphaned();
                        }
                        Ok(())
                    }
                    Ok(()) => {
                        self.drop_callback(id);
                        Ok(())
                    }
                    Err(err) => {
                        // Keep the entry so a late native fire is recognised
                        // and squashed.
                        if let Some(entry) = self.callbacks.get_mut(id) {
                            entry.set_orphaned();
                        }
                        if kind.is_sim_boundary() {
                            warn!(%id, kind = kind.label(), %err, "backend kept the registration; removed locally");
                            Ok(())
                        } else {
                            error!(%id, kind = kind.label(), %err, "removal failed");
                            Err(err)
                        }
                    }
                }
            }
        }
    }

    fn drop_callback(&mut self, id: CallbackId) {
        if let Some(entry) = self.callbacks.remove(id) {
            if let CallbackKind::ValueChange { signal, .. } = entry.kind() {
                self.unpin(*signal);
            }
        }
    }

    pub fn callback(&self, id: CallbackId) -> Option<&CallbackHandle> {
        self.callbacks.get(id)
    }

    /// Handle a native fire carrying `id`. On [`Dispatch::Call`] the caller
    /// runs the user function without holding any borrow of `self`, then
    /// calls [`Gpi::finish_dispatch`].
    pub fn begin_dispatch(&mut self, id: CallbackId) -> Result<Dispatch> {
        let Some(entry) = self.callbacks.get_mut(id) else {
            return Err(GpiError::corrupted(format!(
                "{id} fired with no associated context"
            )));
        };
        if entry.in_call() {
            debug!(%id, "re-entrant fire squashed");
            return Ok(Dispatch::Squashed);
        }
        let kind = *entry.kind();
        let owner = entry.adapter();
        match entry.state() {
            CbState::Primed => {}
            CbState::PendingDelete => {
                // A fired one-shot is spent whatever the backend answers; a
                // value-change registration it keeps refusing stays tracked.
                let fired = kind.is_one_shot();
                let mut retained = false;
                if let Some(registration) = entry.registration() {
                    if let Err(err) = adapter_of(&mut self.adapters, owner)?.disarm(registration, fired) {
                        debug!(%id, %err, "late removal failed");
                        retained = !fired;
                    }
                }
                debug!(%id, kind = kind.label(), "squashed fire of removed callback");
                if !retained {
                    self.drop_callback(id);
                }
                return Ok(Dispatch::Squashed);
            }
            CbState::Free | CbState::PostCall | CbState::PreCall => {
                debug!(%id, state = ?entry.state(), "stale fire squashed");
                return Ok(Dispatch::Squashed);
            }
        }

        if let CallbackKind::ValueChange { signal, edge } = kind {
            if !matches!(edge, crate::callback::Edge::Any) {
                let handle = self.handles.get_pinned_mut(signal)?;
                let sampled = adapter_of(&mut self.adapters, owner)?.read_binstr(handle)?;
                if !edge.accepts(&sampled) {
                    return Ok(Dispatch::Filtered);
                }
            }
        }

        if kind.is_one_shot() {
            let registration = self
                .callbacks
                .get_mut(id)
                .and_then(|entry| entry.take_registration());
            if let Some(registration) = registration {
                if let Err(err) = adapter_of(&mut self.adapters, owner)?.disarm(registration, true) {
                    warn!(%id, %err, "releasing fired registration failed");
                }
            }
        }

        let entry = self
            .callbacks
            .get_mut(id)
            .ok_or_else(|| GpiError::corrupted(format!("{id} vanished during dispatch")))?;
        let func = entry.begin_call()?;
        Ok(Dispatch::Call(PendingCall { id, func }))
    }

    /// Second half of a dispatch: put the user function back and apply any
    /// removal requested during the call.
    pub fn finish_dispatch(&mut self, call: PendingCall) -> Result<()> {
        let PendingCall { id, func } = call;
        let entry = self
            .callbacks
            .get_mut(id)
            .ok_or_else(|| GpiError::corrupted(format!("{id} vanished during its call")))?;
        let owner = entry.adapter();
        if entry.end_call(func) == AfterCall::Delete {
            if let Some(registration) = entry.registration() {
                if let Err(err) = adapter_of(&mut self.adapters, owner)?.disarm(registration, false) {
                    // Still registered natively: keep the entry so the next
                    // fire is squashed.
                    warn!(%id, %err, "deferred removal refused; removed locally");
                    return Ok(());
                }
            }
            self.drop_callback(id);
        }
        Ok(())
    }

    // ---- Lifecycle ----

    /// Register the internal start- and end-of-simulation callbacks that
    /// deliver the attach and shutdown notifications.
    pub fn install_lifecycle(&mut self, listener: Box<dyn LifecycleListener>) -> Result<()> {
        let lifecycle = Rc::new(Lifecycle {
            listener,
            attached: Cell::new(false),
            shut_down: Cell::new(false),
        });
        let info = self.sim_info()?;
        let on_start = Rc::clone(&lifecycle);
        self.register_callback(
            CallbackKind::StartOfSim,
            Box::new(move || {
                on_start.notify_attach(&info);
                0
            }),
        )?;
        let on_end = Rc::clone(&lifecycle);
        self.register_callback(
            CallbackKind::EndOfSim,
            Box::new(move || {
                on_end.notify_shutdown();
                0
            }),
        )?;
        self.lifecycle = Some(lifecycle);
        Ok(())
    }

    /// Deliver the shutdown notification now, if it has not been.
    pub fn notify_shutdown(&self) {
        if let Some(lifecycle) = &self.lifecycle {
            lifecycle.notify_shutdown();
        }
    }

    /// Free every iterator, callback and handle still alive.
    pub fn teardown(&mut self) {
        let iters: Vec<IterId> = self.iterators.keys().copied().collect();
        for iter in iters {
            if let Some(active) = self.iterators.remove(&iter) {
                self.finish_iterator(active);
            }
        }
        // Every entry goes, whatever its state, so pinned signals are freed.
        for id in self.callbacks.ids() {
            let Some(entry) = self.callbacks.get_mut(id) else {
                continue;
            };
            let owner = entry.adapter();
            if let Some(registration) = entry.take_registration() {
                let outcome = adapter_of(&mut self.adapters, owner)
                    .and_then(|adapter| adapter.disarm(registration, false));
                if let Err(err) = outcome {
                    debug!(%id, %err, "teardown removal failed");
                }
            }
            self.drop_callback(id);
        }
        for (adapter, raw) in self.handles.drain() {
            self.free_native(adapter, raw);
        }
        debug!("GPI state torn down");
    }
}

/// Deliver a native fire to `gpi`, calling the user function with no
/// borrow held so it may use the GPI itself.
pub fn dispatch(gpi: &RefCell<Gpi>, id: CallbackId) -> Result<Fired> {
    let step = gpi
        .try_borrow_mut()
        .map_err(|_| GpiError::corrupted(format!("{id} delivered while the GPI was busy")))?
        .begin_dispatch(id)?;
    match step {
        Dispatch::Call(mut call) => {
            let ret = call.call();
            gpi.try_borrow_mut()
                .map_err(|_| GpiError::corrupted(format!("{id} returned while the GPI was busy")))?
                .finish_dispatch(call)?;
            Ok(Fired::Called(ret))
        }
        Dispatch::Filtered => Ok(Fired::Filtered),
        Dispatch::Squashed => Ok(Fired::Squashed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::Edge;
    use crate::handle::HandleMeta;
    use crate::kind::ObjectKind;
    use crate::iter::{NativeWalk, SubIter};
    use std::collections::VecDeque;

    /// What the fake backend saw.
    #[derive(Default)]
    struct Log {
        armed: HashMap<RawRef, (CallbackId, &'static str)>,
        disarmed: Vec<(RawRef, bool)>,
        released: Vec<usize>,
        closed: usize,
        finished: bool,
    }

    enum Child {
        Named(&'static str),
        Foreign(usize),
        Unnamed,
    }

    struct Fake {
        name: &'static str,
        id: Option<AdapterId>,
        top: &'static str,
        base: usize,
        children: Vec<Child>,
        /// Names this adapter resolves below any parent, with raw refs.
        members: Vec<(&'static str, usize)>,
        values: HashMap<usize, String>,
        refuse_boundary: bool,
        /// Refuse to remove value-change registrations that have not fired.
        refuse_value_change: bool,
        next_reg: usize,
        log: Rc<RefCell<Log>>,
    }

    impl Fake {
        fn new(name: &'static str, top: &'static str, base: usize) -> (Self, Rc<RefCell<Log>>) {
            let log = Rc::new(RefCell::new(Log::default()));
            (
                Self {
                    name,
                    id: None,
                    top,
                    base,
                    children: Vec::new(),
                    members: Vec::new(),
                    values: HashMap::new(),
                    refuse_boundary: false,
                    refuse_value_change: false,
                    next_reg: 0,
                    log: Rc::clone(&log),
                },
                log,
            )
        }

        fn raw(v: usize) -> RawRef {
            RawRef::new(v).unwrap()
        }

        fn member(&self, parent: &ObjectHandle, name: &str, raw: usize) -> ObjectHandle {
            let full = crate::name::join(parent.full_name(), name, crate::name::Separator::Member);
            let meta = HandleMeta::new(name, full, ObjectKind::Net);
            ObjectHandle::new_signal(self.id.unwrap(), Self::raw(raw), meta, ValueFormat::LogicVec, 1)
                .unwrap()
        }
    }

    struct Walk;

    impl NativeWalk for Walk {
        fn open(&mut self, _parent: RawRef, relation: i32) -> Option<SubIter> {
            let n = relation as usize;
            Some(SubIter::Buffered((1..=n).map(|i| Fake::raw(i)).collect::<VecDeque<_>>()))
        }

        fn scan(&mut self, sub: &mut SubIter) -> Option<RawRef> {
            match sub {
                SubIter::Buffered(queue) => queue.pop_front(),
                SubIter::Native(_) => None,
            }
        }

        fn close(&mut self, _sub: SubIter) {}
    }

    impl Adapter for Fake {
        fn name(&self) -> &'static str {
            self.name
        }

        fn attach(&mut self, id: AdapterId) {
            self.id = Some(id);
        }

        fn sim_info(&mut self) -> SimInfo {
            SimInfo {
                product: "fake".to_string(),
                version: "1.0".to_string(),
            }
        }

        fn root(&mut self, name: Option<&str>) -> Result<Option<ObjectHandle>> {
            if let Some(name) = name {
                if name != self.top {
                    return Err(GpiError::RootMismatch {
                        requested: name.to_string(),
                        found: self.top.to_string(),
                    });
                }
            }
            let meta = HandleMeta::new(self.top, self.top, ObjectKind::Module);
            Ok(Some(ObjectHandle::object(self.id.unwrap(), Self::raw(self.base), meta)))
        }

        fn by_name(&mut self, parent: &ObjectHandle, name: &str) -> Result<Option<ObjectHandle>> {
            let raw = self.members.iter().find(|(n, _)| *n == name).map(|(_, r)| *r);
            Ok(raw.map(|raw| self.member(parent, name, raw)))
        }

        fn by_index(&mut self, parent: &ObjectHandle, index: i64) -> Result<Option<ObjectHandle>> {
            if index < 0 || index > 3 {
                return Ok(None);
            }
            let name = crate::name::indexed(parent.name(), index);
            Ok(Some(self.member(parent, &name, self.base + 100 + index as usize)))
        }

        fn by_raw(&mut self, parent: &ObjectHandle, raw: RawRef) -> Result<Option<ObjectHandle>> {
            let name = self.members.iter().find(|(_, r)| *r == raw.get()).map(|(n, _)| *n);
            Ok(name.map(|name| self.member(parent, name, raw.get() + 1000)))
        }

        fn iterate(&mut self, parent: &ObjectHandle) -> Result<Option<IterState>> {
            if self.children.is_empty() {
                return Ok(None);
            }
            Ok(Some(IterState::new(parent, vec![self.children.len() as i32])))
        }

        fn next_child(&mut self, state: &mut IterState) -> Result<NextChild> {
            let Some(pos) = state.next_raw(&mut Walk) else {
                return Ok(NextChild::End);
            };
            Ok(match &self.children[pos.get() - 1] {
                Child::Named(name) => {
                    let full = format!("{}.{name}", state.parent_full_name());
                    let meta = HandleMeta::new(*name, full, ObjectKind::Net);
                    NextChild::Native(
                        ObjectHandle::new_signal(
                            self.id.unwrap(),
                            Self::raw(self.base + 10 + pos.get()),
                            meta,
                            ValueFormat::Logic,
                            1,
                        )
                        .unwrap(),
                    )
                }
                Child::Foreign(raw) => NextChild::Foreign(Self::raw(*raw)),
                Child::Unnamed => NextChild::Unnamed,
            })
        }

        fn close_iterator(&mut self, state: IterState) {
            self.log.borrow_mut().closed += 1;
            state.close(&mut Walk);
        }

        fn release(&mut self, raw: RawRef) {
            self.log.borrow_mut().released.push(raw.get());
        }

        fn read_binstr(&mut self, handle: &ObjectHandle) -> Result<String> {
            Ok(self
                .values
                .get(&handle.raw().get())
                .cloned()
                .unwrap_or_else(|| "X".to_string()))
        }

        fn read_str(&mut self, handle: &ObjectHandle) -> Result<Vec<u8>> {
            Ok(self.read_binstr(handle)?.into_bytes())
        }

        fn read_real(&mut self, _handle: &ObjectHandle) -> Result<f64> {
            Ok(0.5)
        }

        fn read_long(&mut self, handle: &ObjectHandle) -> Result<i64> {
            logic::binstr_to_int(&self.read_binstr(handle)?)
        }

        fn write(&mut self, handle: &ObjectHandle, value: &Value, _action: SetAction) -> Result<()> {
            let width = handle.require_signal()?.width();
            let bits = match value {
                Value::BinStr(bits) => bits.clone(),
                Value::Int(v) => logic::int_to_binstr(*v, width),
                other => return Err(GpiError::invalid_value(other.type_name())),
            };
            self.values.insert(handle.raw().get(), bits);
            Ok(())
        }

        fn arm(&mut self, token: CallbackId, request: ArmRequest<'_>) -> Result<RawRef> {
            if self.refuse_boundary && matches!(request, ArmRequest::StartOfSim) {
                return Err(GpiError::rejected(self.name, "register_cb", "not now"));
            }
            self.next_reg += 1;
            let reg = Self::raw(5000 + self.next_reg);
            self.log.borrow_mut().armed.insert(reg, (token, request.label()));
            Ok(reg)
        }

        fn disarm(&mut self, registration: RawRef, fired: bool) -> Result<()> {
            let mut log = self.log.borrow_mut();
            let label = log.armed.get(&registration).map(|(_, label)| *label);
            if self.refuse_boundary && !fired && label == Some("end-of-simulation") {
                return Err(GpiError::rejected(self.name, "remove_cb", "refused"));
            }
            if self.refuse_value_change && !fired && label == Some("value-change") {
                return Err(GpiError::rejected(self.name, "remove_cb", "still watching"));
            }
            log.armed.remove(&registration);
            log.disarmed.push((registration, fired));
            Ok(())
        }

        fn sim_time(&mut self) -> u64 {
            (3u64 << 32) | 7
        }

        fn sim_precision(&mut self) -> i32 {
            -12
        }

        fn finish(&mut self) {
            self.log.borrow_mut().finished = true;
        }
    }

    fn single(fake: Fake) -> Gpi {
        let mut gpi = Gpi::new(GpiConfig::default());
        gpi.register_adapter(Box::new(fake)).unwrap();
        gpi
    }

    fn token_for(log: &Rc<RefCell<Log>>, label: &str) -> CallbackId {
        log.borrow()
            .armed
            .values()
            .find(|(_, l)| *l == label)
            .map(|(token, _)| *token)
            .unwrap()
    }

    #[test]
    fn root_name_mismatch_is_not_found() {
        let (fake, _) = Fake::new("vpi", "top", 1);
        let mut gpi = single(fake);
        let err = gpi.root(Some("dut")).unwrap_err();
        assert!(err.is_not_found());
        assert!(matches!(err, GpiError::RootMismatch { .. }));
        let root = gpi.root(Some("top")).unwrap();
        assert_eq!(gpi.handle(root).unwrap().full_name(), "top");
    }

    #[test]
    fn first_adapter_resolving_a_root_wins() {
        let (vpi, _) = Fake::new("vpi", "top", 1);
        let (vhpi, _) = Fake::new("vhpi", "top_vhdl", 1000);
        let mut gpi = Gpi::new(GpiConfig::default());
        gpi.register_adapter(Box::new(vpi)).unwrap();
        gpi.register_adapter(Box::new(vhpi)).unwrap();
        let root = gpi.root(Some("top_vhdl")).unwrap();
        assert_eq!(gpi.handle(root).unwrap().adapter().index(), 1);
    }

    #[test]
    fn duplicate_adapter_names_are_rejected() {
        let (a, _) = Fake::new("vpi", "top", 1);
        let (b, _) = Fake::new("vpi", "top", 2);
        let mut gpi = single(a);
        assert!(gpi.register_adapter(Box::new(b)).is_err());
    }

    #[test]
    fn name_lookup_falls_back_to_other_adapters() {
        let (vpi, _) = Fake::new("vpi", "top", 1);
        let (mut vhpi, _) = Fake::new("vhpi", "top", 1000);
        vhpi.members.push(("vhdl_inst", 1001));
        let mut gpi = Gpi::new(GpiConfig::default());
        gpi.register_adapter(Box::new(vpi)).unwrap();
        gpi.register_adapter(Box::new(vhpi)).unwrap();
        let root = gpi.root(None).unwrap();
        let child = gpi.handle_by_name(root, "vhdl_inst").unwrap();
        let handle = gpi.handle(child).unwrap();
        assert_eq!(handle.adapter().index(), 1);
        assert_eq!(handle.full_name(), "top.vhdl_inst");
        assert!(gpi.handle_by_name(root, "nope").unwrap_err().is_not_found());
    }

    #[test]
    fn index_lookup() {
        let (fake, _) = Fake::new("vpi", "top", 1);
        let mut gpi = single(fake);
        let root = gpi.root(None).unwrap();
        let elem = gpi.handle_by_index(root, 2).unwrap();
        assert_eq!(gpi.handle(elem).unwrap().full_name(), "top.top[2]");
        assert!(gpi.handle_by_index(root, 9).unwrap_err().is_not_found());
    }

    #[test]
    fn traversal_skips_duplicates_and_unresolvable_children() {
        let (mut vpi, vpi_log) = Fake::new("vpi", "top", 1);
        vpi.children = vec![
            Child::Named("a"),
            Child::Named("a"),
            Child::Unnamed,
            Child::Foreign(2001),
            Child::Foreign(2002),
            Child::Named("b"),
        ];
        let (mut vhpi, _) = Fake::new("vhpi", "other", 2000);
        vhpi.members.push(("vhd", 2001));
        let mut gpi = Gpi::new(GpiConfig::default());
        gpi.register_adapter(Box::new(vpi)).unwrap();
        gpi.register_adapter(Box::new(vhpi)).unwrap();

        let root = gpi.root(Some("top")).unwrap();
        let walk = |gpi: &mut Gpi| {
            let iter = gpi.iterate(root).unwrap().unwrap();
            let mut names = Vec::new();
            while let Some(child) = gpi.next(iter).unwrap() {
                names.push(gpi.handle(child).unwrap().full_name().to_string());
                gpi.release(child).unwrap();
            }
            assert!(gpi.next(iter).is_err());
            names
        };
        let first = walk(&mut gpi);
        assert_eq!(first, vec!["top.a", "top.vhd", "top.b"]);
        assert_eq!(walk(&mut gpi), first);
        assert_eq!(vpi_log.borrow().closed, 2);
        // Both foreign references go back to the adapter that yielded them.
        let log = vpi_log.borrow();
        let released = &log.released;
        assert_eq!(released.iter().filter(|&&r| r == 2001).count(), 2);
        assert_eq!(released.iter().filter(|&&r| r == 2002).count(), 2);
    }

    #[test]
    fn leaf_has_no_iterator() {
        let (fake, _) = Fake::new("vpi", "top", 1);
        let mut gpi = single(fake);
        let root = gpi.root(None).unwrap();
        assert!(gpi.iterate(root).unwrap().is_none());
    }

    #[test]
    fn abandoned_iterator_releases_parent_pin() {
        let (mut fake, log) = Fake::new("vpi", "top", 1);
        fake.children = vec![Child::Named("a"), Child::Named("b")];
        let mut gpi = single(fake);
        let root = gpi.root(None).unwrap();
        let iter = gpi.iterate(root).unwrap().unwrap();
        let a = gpi.next(iter).unwrap().unwrap();
        gpi.release(a).unwrap();
        gpi.release(root).unwrap();
        // The iterator still pins the root.
        assert!(!log.borrow().released.contains(&1));
        gpi.release_iterator(iter).unwrap();
        assert!(log.borrow().released.contains(&1));
        assert_eq!(log.borrow().closed, 1);
    }

    #[test]
    fn release_twice_is_an_error() {
        let (fake, _) = Fake::new("vpi", "top", 1);
        let mut gpi = single(fake);
        let root = gpi.root(None).unwrap();
        gpi.release(root).unwrap();
        assert!(matches!(gpi.release(root), Err(GpiError::InvalidHandle(_))));
    }

    #[test]
    fn binstr_and_integer_paths() {
        let (mut fake, _) = Fake::new("vpi", "top", 1);
        fake.members.push(("bus", 50));
        let mut gpi = single(fake);
        let root = gpi.root(None).unwrap();
        let sig = gpi.handle_by_name(root, "bus").unwrap();
        gpi.write(sig, &Value::BinStr("X".to_string()), SetAction::Deposit)
            .unwrap();
        assert_eq!(gpi.read_binstr(sig).unwrap(), "X");
        assert!(gpi.read_long(sig).is_err());
        gpi.write(sig, &Value::Int(1), SetAction::Deposit).unwrap();
        assert_eq!(gpi.read_long(sig).unwrap(), 1);
        let err = gpi
            .write(sig, &Value::BinStr("01".to_string()), SetAction::Deposit)
            .unwrap_err();
        assert!(matches!(err, GpiError::InvalidValue { .. }));
        assert!(gpi.read_binstr(root).is_err());
    }

    #[test]
    fn time_is_split_into_words() {
        let (fake, _) = Fake::new("vpi", "top", 1);
        let mut gpi = single(fake);
        assert_eq!(gpi.sim_time().unwrap(), (3, 7));
        assert_eq!(gpi.sim_precision().unwrap(), -12);
    }

    #[test]
    fn sim_end_is_requested_once() {
        let (fake, log) = Fake::new("vpi", "top", 1);
        let mut gpi = single(fake);
        gpi.sim_end().unwrap();
        assert!(log.borrow().finished);
        assert!(gpi.is_ending());
        gpi.sim_end().unwrap();
    }

    fn counter() -> (Rc<Cell<u32>>, UserFn) {
        let hits = Rc::new(Cell::new(0));
        let inner = Rc::clone(&hits);
        (
            hits,
            Box::new(move || {
                inner.set(inner.get() + 1);
                0
            }),
        )
    }

    #[test]
    fn removed_before_fire_is_never_called() {
        let (fake, log) = Fake::new("vpi", "top", 1);
        let gpi = RefCell::new(single(fake));
        let (hits, func) = counter();
        let id = gpi
            .borrow_mut()
            .register_callback(CallbackKind::Timer { delay: 5 }, func)
            .unwrap();
        gpi.borrow_mut().remove_callback(id).unwrap();
        assert_eq!(log.borrow().disarmed.len(), 1);
        assert!(gpi.borrow().callback(id).is_none());
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn one_shot_fires_once_and_can_be_reprimed() {
        let (fake, log) = Fake::new("vpi", "top", 1);
        let gpi = RefCell::new(single(fake));
        let (hits, func) = counter();
        let id = gpi
            .borrow_mut()
            .register_callback(CallbackKind::Timer { delay: 5 }, func)
            .unwrap();
        assert_eq!(dispatch(&gpi, id).unwrap(), Fired::Called(0));
        assert_eq!(hits.get(), 1);
        assert_eq!(gpi.borrow().callback(id).unwrap().state(), CbState::PostCall);
        // The fired registration was released exactly once.
        assert_eq!(log.borrow().disarmed.len(), 1);
        assert!(log.borrow().disarmed[0].1);
        // A second native fire of the consumed registration does nothing.
        assert_eq!(dispatch(&gpi, id).unwrap(), Fired::Squashed);
        assert_eq!(hits.get(), 1);

        gpi.borrow_mut().prime_callback(id).unwrap();
        assert_eq!(gpi.borrow().callback(id).unwrap().state(), CbState::Primed);
        assert_eq!(dispatch(&gpi, id).unwrap(), Fired::Called(0));
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn removal_inside_own_call_is_deferred() {
        let (fake, log) = Fake::new("vpi", "top", 1);
        let gpi = Rc::new(RefCell::new(single(fake)));
        let slot: Rc<Cell<Option<CallbackId>>> = Rc::new(Cell::new(None));
        let (g, s) = (Rc::clone(&gpi), Rc::clone(&slot));
        let id = gpi
            .borrow_mut()
            .register_callback(
                CallbackKind::ReadWrite,
                Box::new(move || {
                    let own = s.get().unwrap();
                    g.borrow_mut().remove_callback(own).unwrap();
                    assert_eq!(g.borrow().callback(own).unwrap().state(), CbState::PendingDelete);
                    0
                }),
            )
            .unwrap();
        slot.set(Some(id));
        assert_eq!(dispatch(&gpi, id).unwrap(), Fired::Called(0));
        assert!(gpi.borrow().callback(id).is_none());
        assert_eq!(log.borrow().disarmed.len(), 1);
    }

    #[test]
    fn rearm_then_remove_inside_call() {
        let (fake, log) = Fake::new("vpi", "top", 1);
        let gpi = Rc::new(RefCell::new(single(fake)));
        let slot: Rc<Cell<Option<CallbackId>>> = Rc::new(Cell::new(None));
        let (g, s) = (Rc::clone(&gpi), Rc::clone(&slot));
        let id = gpi
            .borrow_mut()
            .register_callback(
                CallbackKind::Timer { delay: 1 },
                Box::new(move || {
                    let own = s.get().unwrap();
                    g.borrow_mut().prime_callback(own).unwrap();
                    g.borrow_mut().remove_callback(own).unwrap();
                    0
                }),
            )
            .unwrap();
        slot.set(Some(id));
        dispatch(&gpi, id).unwrap();
        assert!(gpi.borrow().callback(id).is_none());
        assert!(log.borrow().armed.is_empty());
        assert_eq!(log.borrow().disarmed.len(), 2);
    }

    #[test]
    fn refused_removal_inside_own_call_squashes_later_fires() {
        let (mut fake, log) = Fake::new("vpi", "top", 1);
        fake.members.push(("clk", 60));
        fake.refuse_value_change = true;
        let gpi = Rc::new(RefCell::new(single(fake)));
        let root = gpi.borrow_mut().root(None).unwrap();
        let clk = gpi.borrow_mut().handle_by_name(root, "clk").unwrap();
        let slot: Rc<Cell<Option<CallbackId>>> = Rc::new(Cell::new(None));
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

        assert_eq!(dispatch(&gpi, id).unwrap(), Fired::Called(0));
        assert_eq!(gpi.borrow().callback(id).unwrap().state(), CbState::PendingDelete);
        // The backend keeps firing the registration it would not remove.
        for _ in 0..2 {
            assert_eq!(dispatch(&gpi, id).unwrap(), Fired::Squashed);
        }
        assert_eq!(hits.get(), 1);

        // The signal stays pinned until the entry finally goes.
        gpi.borrow_mut().release(clk).unwrap();
        assert!(!log.borrow().released.contains(&60));
        gpi.borrow_mut().teardown();
        assert!(gpi.borrow().callback(id).is_none());
        assert!(log.borrow().released.contains(&60));
    }

    #[test]
    fn rising_edge_filter() {
        let (mut fake, _) = Fake::new("vpi", "top", 1);
        fake.members.push(("clk", 60));
        let gpi = RefCell::new(single(fake));
        let root = gpi.borrow_mut().root(None).unwrap();
        let clk = gpi.borrow_mut().handle_by_name(root, "clk").unwrap();
        let (hits, func) = counter();
        let id = gpi
            .borrow_mut()
            .register_callback(
                CallbackKind::ValueChange {
                    signal: clk,
                    edge: Edge::Rising,
                },
                func,
            )
            .unwrap();
        for (value, expect) in [("1", true), ("0", false), ("X", false), ("Z", false), ("1", true)] {
            gpi.borrow_mut()
                .write(clk, &Value::BinStr(value.to_string()), SetAction::NoDelay)
                .unwrap();
            let fired = dispatch(&gpi, id).unwrap();
            assert_eq!(fired == Fired::Called(0), expect, "value {value}");
        }
        assert_eq!(hits.get(), 2);
        assert_eq!(gpi.borrow().callback(id).unwrap().state(), CbState::Primed);
    }

    #[test]
    fn value_change_pins_its_signal() {
        let (mut fake, log) = Fake::new("vpi", "top", 1);
        fake.members.push(("clk", 60));
        let mut gpi = single(fake);
        let root = gpi.root(None).unwrap();
        let clk = gpi.handle_by_name(root, "clk").unwrap();
        let (_, func) = counter();
        let id = gpi
            .register_callback(
                CallbackKind::ValueChange {
                    signal: clk,
                    edge: Edge::Any,
                },
                func,
            )
            .unwrap();
        gpi.release(clk).unwrap();
        assert!(!log.borrow().released.contains(&60));
        gpi.remove_callback(id).unwrap();
        assert!(log.borrow().released.contains(&60));
    }

    #[test]
    fn boundary_failures_are_absorbed() {
        let (mut fake, log) = Fake::new("vpi", "top", 1);
        fake.refuse_boundary = true;
        let gpi = RefCell::new(single(fake));
        let (start_hits, start) = counter();
        let start_id = gpi
            .borrow_mut()
            .register_callback(CallbackKind::StartOfSim, start)
            .unwrap();
        assert_eq!(gpi.borrow().callback(start_id).unwrap().state(), CbState::Free);
        assert_eq!(start_hits.get(), 0);

        let (end_hits, end) = counter();
        let end_id = gpi
            .borrow_mut()
            .register_callback(CallbackKind::EndOfSim, end)
            .unwrap();
        gpi.borrow_mut().remove_callback(end_id).unwrap();
        assert_eq!(
            gpi.borrow().callback(end_id).unwrap().state(),
            CbState::PendingDelete
        );
        // The backend kept it and fires anyway: squashed.
        let token = token_for(&log, "end-of-simulation");
        assert_eq!(dispatch(&gpi, token).unwrap(), Fired::Squashed);
        assert_eq!(end_hits.get(), 0);
        assert!(gpi.borrow().callback(end_id).is_none());
    }

    #[test]
    fn fire_without_context_is_corruption() {
        let (fake, _) = Fake::new("vpi", "top", 1);
        let gpi = RefCell::new(single(fake));
        let err = dispatch(&gpi, CallbackId::from_raw(42)).unwrap_err();
        assert!(matches!(err, GpiError::Corrupted { .. }));
    }

    struct Recorder(Rc<RefCell<Vec<String>>>);

    impl LifecycleListener for Recorder {
        fn attached(&self, info: &SimInfo) {
            self.0.borrow_mut().push(format!("attach {}", info.product));
        }

        fn shutdown(&self) {
            self.0.borrow_mut().push("shutdown".to_string());
        }
    }

    #[test]
    fn lifecycle_notifications_fire_once() {
        let (fake, log) = Fake::new("vpi", "top", 1);
        let gpi = RefCell::new(single(fake));
        let events = Rc::new(RefCell::new(Vec::new()));
        gpi.borrow_mut()
            .install_lifecycle(Box::new(Recorder(Rc::clone(&events))))
            .unwrap();
        let start = token_for(&log, "start-of-simulation");
        let end = token_for(&log, "end-of-simulation");
        dispatch(&gpi, start).unwrap();
        dispatch(&gpi, end).unwrap();
        gpi.borrow().notify_shutdown();
        assert_eq!(*events.borrow(), vec!["attach fake", "shutdown"]);
    }

    #[test]
    fn teardown_frees_everything() {
        let (mut fake, log) = Fake::new("vpi", "top", 1);
        fake.children = vec![Child::Named("a")];
        let mut gpi = single(fake);
        let root = gpi.root(None).unwrap();
        gpi.iterate(root).unwrap().unwrap();
        let (_, func) = counter();
        gpi.register_callback(CallbackKind::ReadOnly, func).unwrap();
        gpi.teardown();
        assert_eq!(gpi.live_handles(), 0);
        assert!(log.borrow().armed.is_empty());
        assert!(log.borrow().released.contains(&1));
    }

    #[test]
    fn teardown_drops_callbacks_awaiting_removal() {
        let (mut fake, log) = Fake::new("vpi", "top", 1);
        fake.members.push(("clk", 60));
        fake.refuse_value_change = true;
        let mut gpi = single(fake);
        let root = gpi.root(None).unwrap();
        let clk = gpi.handle_by_name(root, "clk").unwrap();
        let (_, func) = counter();
        let id = gpi
            .register_callback(
                CallbackKind::ValueChange {
                    signal: clk,
                    edge: Edge::Any,
                },
                func,
            )
            .unwrap();
        gpi.release(clk).unwrap();
        assert!(gpi.remove_callback(id).is_err());
        assert_eq!(gpi.callback(id).unwrap().state(), CbState::PendingDelete);

        gpi.teardown();
        assert!(gpi.callback(id).is_none());
        assert_eq!(gpi.live_handles(), 0);
        assert!(log.borrow().released.contains(&60));
    }
}
